//! [`ActionRunner`] that hands each command line to a shell.
//!
//! An action `"eww open snackbar"` with shell `["bash", "-c"]` runs
//! `bash -c "eww open snackbar"` and waits for it to exit.

use crate::traits::{Action, ActionRunner};
use log::debug;
use std::process::Command;

/// Runs actions through a command interpreter.
#[derive(Debug, Clone)]
pub struct ShellRunner {
    default_shell: Vec<String>,
}

/// Errors from spawning or running a shell command.
#[derive(Debug, thiserror::Error)]
pub enum ShellError {
    #[error("empty shell prefix")]
    EmptyShell,
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },
    #[error("`{command}` exited with {status}")]
    Status {
        command: String,
        status: std::process::ExitStatus,
    },
}

impl Default for ShellRunner {
    fn default() -> Self {
        Self::new(platform_shell())
    }
}

impl ShellRunner {
    /// Use `default_shell` for actions that do not carry their own prefix.
    pub fn new(default_shell: Vec<String>) -> Self {
        Self { default_shell }
    }

    pub fn default_shell(&self) -> &[String] {
        &self.default_shell
    }
}

/// `bash -c` on Unix, `powershell.exe -c` on Windows.
pub fn platform_shell() -> Vec<String> {
    if cfg!(windows) {
        vec!["powershell.exe".into(), "-c".into()]
    } else {
        vec!["bash".into(), "-c".into()]
    }
}

impl ActionRunner for ShellRunner {
    type Error = ShellError;

    fn run(&self, action: &Action) -> Result<(), ShellError> {
        let shell = action.shell.as_deref().unwrap_or(&self.default_shell);
        let (program, args) = shell.split_first().ok_or(ShellError::EmptyShell)?;

        debug!("running {:?} {:?} {:?}", program, args, action.command);
        let status = Command::new(program)
            .args(args)
            .arg(&action.command)
            .status()
            .map_err(|e| ShellError::Spawn {
                program: program.clone(),
                source: e,
            })?;

        if status.success() {
            Ok(())
        } else {
            Err(ShellError::Status {
                command: action.command.clone(),
                status,
            })
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn sh() -> Option<Vec<String>> {
        Some(vec!["sh".into(), "-c".into()])
    }

    #[test]
    fn runs_command_through_shell() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("opened");
        let runner = ShellRunner::default();
        let action = Action::new(format!("echo hi > '{}'", marker.display()), sh());
        runner.run(&action).unwrap();
        assert_eq!(std::fs::read_to_string(&marker).unwrap().trim(), "hi");
    }

    #[test]
    fn non_zero_exit_is_an_error() {
        let runner = ShellRunner::default();
        let err = runner.run(&Action::new("exit 3", sh())).unwrap_err();
        assert!(matches!(err, ShellError::Status { .. }));
    }

    #[test]
    fn missing_interpreter_is_spawn_error() {
        let runner = ShellRunner::new(vec!["/nonexistent/shell".into(), "-c".into()]);
        let err = runner.run(&Action::new("true", None)).unwrap_err();
        assert!(matches!(err, ShellError::Spawn { .. }));
    }

    #[test]
    fn empty_prefix_is_rejected() {
        let runner = ShellRunner::new(Vec::new());
        let err = runner.run(&Action::new("true", None)).unwrap_err();
        assert!(matches!(err, ShellError::EmptyShell));
    }

    #[test]
    fn platform_default_is_bash() {
        assert_eq!(ShellRunner::default().default_shell(), ["bash", "-c"]);
    }
}
