//! The seam between the daemon and whatever actually shows the snackbar.
//!
//! The [`Dispatcher`](crate::daemon::Dispatcher) never interprets the
//! commands in the configuration; it hands them to an [`ActionRunner`].
//! The production runner lives in [`shell`](crate::shell) and spawns a
//! command interpreter; tests use a recorder instead.

use std::fmt;

/// One opaque command line to execute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Action {
    pub command: String,
    /// Interpreter prefix, e.g. `["bash", "-c"]`.  `None` lets the runner
    /// choose.
    pub shell: Option<Vec<String>>,
}

impl Action {
    pub fn new(command: impl Into<String>, shell: Option<Vec<String>>) -> Self {
        Self {
            command: command.into(),
            shell,
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.command)
    }
}

/// Executes [`Action`]s.
///
/// Implementations must be shareable across threads: the auto-close timer
/// runs the close action from its own thread.
///
/// # Contract
///
/// * [`run`](ActionRunner::run) blocks until the action has finished.
/// * A returned error is logged by the caller and otherwise ignored; it
///   never changes the daemon's response.
/// * The auto-close action runs while the scheduler lock is held.  A close
///   command that itself talks to the daemon (say, `snackdaemon update`)
///   stalls the daemon's loop until that client gives up on its reply, so
///   such a command must run with a short client timeout or in the
///   background.
pub trait ActionRunner: Send + Sync + 'static {
    /// The error type produced by this runner.
    type Error: std::error::Error + Send + 'static;

    fn run(&self, action: &Action) -> Result<(), Self::Error>;
}

#[cfg(test)]
pub(crate) mod testing {
    //! A record-keeping [`ActionRunner`] shared by the daemon tests.

    use super::*;
    use std::sync::{Arc, Mutex};

    #[derive(Debug, Default, Clone)]
    pub struct RecorderRunner {
        log: Arc<Mutex<Vec<String>>>,
    }

    #[derive(Debug, thiserror::Error)]
    #[error("recorder error")]
    pub struct RecorderErr;

    impl RecorderRunner {
        pub fn commands(&self) -> Vec<String> {
            self.log.lock().unwrap().clone()
        }

        pub fn count(&self, command: &str) -> usize {
            self.commands().iter().filter(|c| *c == command).count()
        }

        pub fn clear(&self) {
            self.log.lock().unwrap().clear();
        }
    }

    impl ActionRunner for RecorderRunner {
        type Error = RecorderErr;

        fn run(&self, action: &Action) -> Result<(), RecorderErr> {
            self.log.lock().unwrap().push(action.command.clone());
            // Commands starting with "fail" report an error after recording.
            if action.command.starts_with("fail") {
                return Err(RecorderErr);
            }
            Ok(())
        }
    }

    #[test]
    fn recorder_records_in_order() {
        let runner = RecorderRunner::default();
        runner.run(&Action::new("a", None)).unwrap();
        assert!(runner.run(&Action::new("fail b", None)).is_err());
        assert_eq!(runner.commands(), vec!["a", "fail b"]);
        assert_eq!(runner.count("a"), 1);
    }
}
