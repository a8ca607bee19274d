//! Application configuration.
//!
//! The configuration is a JSON document, by default at
//! `$XDG_CONFIG_HOME/snackdaemon/snackdaemon.json`.
//!
//! # Example
//!
//! ```json
//! {
//!   "timeout": "2s",
//!   "openCommand": "eww open snackbar",
//!   "updateCommand": "eww update snackbarIndex=%d",
//!   "closeCommand": "eww close snackbar",
//!   "options": ["volume", "player", "screenbrightness", "powerprofiles"],
//!   "shell": ["bash", "-c"]
//! }
//! ```
//!
//! `timeout` uses the familiar `1h2m3.5s` / `500ms` duration syntax.
//! `updateCommand` must contain exactly one `%d`, which is replaced by the
//! index of the requested option (`%%` is a literal percent sign).

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// The configuration document as it appears on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigFile {
    pub timeout: String,
    pub open_command: String,
    pub update_command: String,
    pub close_command: String,
    #[serde(default)]
    pub options: Vec<String>,
    /// Interpreter plus flag, e.g. `["bash", "-c"]`.  When absent the
    /// action runner picks a platform default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shell: Option<Vec<String>>,
}

/// A validated configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// How long the snackbar stays open after the last update.
    pub idle_timeout: Duration,
    pub open_command: String,
    /// Contains exactly one `%d` placeholder.
    pub update_command: String,
    pub close_command: String,
    pub options: Vec<String>,
    pub shell: Option<Vec<String>>,
}

impl Config {
    /// Load and validate the configuration at `path`.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            source: e,
        })?;
        let file: ConfigFile = serde_json::from_str(&contents).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::try_from(file)
    }

    /// Index of `option` in [`options`](Self::options).  First match wins.
    pub fn option_index(&self, option: &str) -> Option<usize> {
        self.options.iter().position(|o| o == option)
    }

    /// The update command with `index` substituted.
    pub fn update_command_for(&self, index: usize) -> String {
        render_update(&self.update_command, index)
    }

    /// The configuration written by `snackdaemon generate-config`.
    pub fn example() -> ConfigFile {
        ConfigFile {
            timeout: "2s".into(),
            open_command: "eww open snackbar".into(),
            update_command: "eww update snackbarIndex=%d".into(),
            close_command: "eww close snackbar".into(),
            options: vec![
                "volume".into(),
                "player".into(),
                "screenbrightness".into(),
                "powerprofiles".into(),
            ],
            shell: None,
        }
    }
}

impl TryFrom<ConfigFile> for Config {
    type Error = ConfigError;

    fn try_from(file: ConfigFile) -> Result<Self, ConfigError> {
        let idle_timeout = parse_duration(&file.timeout)?;
        let placeholders = count_placeholders(&file.update_command);
        if placeholders != 1 {
            return Err(ConfigError::Template(placeholders));
        }
        Ok(Self {
            idle_timeout,
            open_command: file.open_command,
            update_command: file.update_command,
            close_command: file.close_command,
            options: file.options,
            shell: file.shell,
        })
    }
}

impl fmt::Display for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "timeout: {:?}", self.idle_timeout)?;
        writeln!(f, "open command: {}", self.open_command)?;
        writeln!(f, "update command: {}", self.update_command)?;
        writeln!(f, "close command: {}", self.close_command)?;
        write!(f, "options: {:?}", self.options)?;
        if let Some(shell) = &self.shell {
            write!(f, "\nshell: {:?}", shell)?;
        }
        Ok(())
    }
}

/// Error from loading or validating a configuration file.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("invalid timeout {0:?}")]
    Timeout(String),
    #[error("updateCommand must contain exactly one %d placeholder, found {0}")]
    Template(usize),
}

//  Templates

/// Number of `%d` placeholders in `template`, skipping `%%` escapes.
fn count_placeholders(template: &str) -> usize {
    let mut count = 0;
    let mut chars = template.chars();
    while let Some(c) = chars.next() {
        if c == '%' {
            match chars.next() {
                Some('d') => count += 1,
                Some(_) | None => {}
            }
        }
    }
    count
}

/// Substitute `index` for the `%d` placeholder and collapse `%%` to `%`.
///
/// Any other `%` sequence is copied through untouched.
pub fn render_update(template: &str, index: usize) -> String {
    let mut out = String::with_capacity(template.len() + 4);
    let mut chars = template.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        match chars.peek() {
            Some('d') => {
                chars.next();
                out.push_str(&index.to_string());
            }
            Some('%') => {
                chars.next();
                out.push('%');
            }
            _ => out.push('%'),
        }
    }
    out
}

//  Durations

/// Largest duration [`parse_duration`] accepts: `i64::MAX` nanoseconds.
pub const MAX_DURATION_NANOS: u128 = i64::MAX as u128;

/// Parse a duration such as `2s`, `500ms`, `1.5h` or `1m30s`.
///
/// Accepted units are `ns`, `us` (or `µs`), `ms`, `s`, `m` and `h`.  A
/// bare `0` is allowed; negative durations are not.  The total must fit in
/// [`MAX_DURATION_NANOS`] (a little over 2562047 hours).
pub fn parse_duration(text: &str) -> Result<Duration, ConfigError> {
    let invalid = || ConfigError::Timeout(text.to_owned());

    let s = text.strip_prefix('+').unwrap_or(text);
    if s == "0" {
        return Ok(Duration::ZERO);
    }
    if s.is_empty() || s.starts_with('-') {
        return Err(invalid());
    }

    let mut total: u128 = 0;
    let mut rest = s;
    while !rest.is_empty() {
        let int_end = rest.find(|c: char| !c.is_ascii_digit()).unwrap_or(rest.len());
        let (int_part, after_int) = rest.split_at(int_end);

        let (frac_part, after_frac) = match after_int.strip_prefix('.') {
            Some(tail) => {
                let frac_end = tail.find(|c: char| !c.is_ascii_digit()).unwrap_or(tail.len());
                tail.split_at(frac_end)
            }
            None => ("", after_int),
        };
        if int_part.is_empty() && frac_part.is_empty() {
            return Err(invalid());
        }

        let unit_end = after_frac
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(after_frac.len());
        let (unit, tail) = after_frac.split_at(unit_end);
        let scale: u128 = match unit {
            "ns" => 1,
            "us" | "µs" | "μs" => 1_000,
            "ms" => 1_000_000,
            "s" => 1_000_000_000,
            "m" => 60 * 1_000_000_000,
            "h" => 3_600 * 1_000_000_000,
            _ => return Err(invalid()),
        };

        let whole: u128 = if int_part.is_empty() {
            0
        } else {
            int_part.parse().map_err(|_| invalid())?
        };
        let mut nanos = whole.checked_mul(scale).ok_or_else(invalid)?;

        // Fractional digits beyond nanosecond precision are truncated.
        let mut place = scale;
        for digit in frac_part.chars() {
            place /= 10;
            if place == 0 {
                break;
            }
            nanos += u128::from(digit.to_digit(10).unwrap_or(0)) * place;
        }

        total = total.checked_add(nanos).ok_or_else(invalid)?;
        rest = tail;
    }

    if total > MAX_DURATION_NANOS {
        return Err(invalid());
    }
    let secs = u64::try_from(total / 1_000_000_000).map_err(|_| invalid())?;
    // Always < 1e9.
    let subsec = (total % 1_000_000_000) as u32;
    Ok(Duration::new(secs, subsec))
}

//  Defaults

/// `$XDG_CONFIG_HOME/snackdaemon/snackdaemon.json`, falling back to
/// `$HOME/.config/...`.
pub fn default_config_path() -> PathBuf {
    let base = std::env::var("XDG_CONFIG_HOME").unwrap_or_else(|_| {
        let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".into());
        format!("{}/.config", home)
    });
    PathBuf::from(base).join("snackdaemon").join("snackdaemon.json")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(json: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(json.as_bytes()).unwrap();
        file
    }

    const FULL: &str = r#"{
        "timeout": "2s",
        "openCommand": "eww open snackbar",
        "updateCommand": "eww update snackbarIndex=%d",
        "closeCommand": "eww close snackbar",
        "options": ["volume", "player"],
        "shell": ["sh", "-c"]
    }"#;

    #[test]
    fn load_full_config() {
        let file = write_config(FULL);
        let cfg = Config::load(file.path()).unwrap();
        assert_eq!(cfg.idle_timeout, Duration::from_secs(2));
        assert_eq!(cfg.open_command, "eww open snackbar");
        assert_eq!(cfg.close_command, "eww close snackbar");
        assert_eq!(cfg.options, vec!["volume", "player"]);
        assert_eq!(cfg.shell, Some(vec!["sh".to_string(), "-c".to_string()]));
        assert_eq!(cfg.update_command_for(1), "eww update snackbarIndex=1");
    }

    #[test]
    fn shell_and_options_are_optional() {
        let json = r#"{
            "timeout": "500ms",
            "openCommand": "o",
            "updateCommand": "u %d",
            "closeCommand": "c"
        }"#;
        let cfg = Config::load(write_config(json).path()).unwrap();
        assert!(cfg.options.is_empty());
        assert!(cfg.shell.is_none());
        assert_eq!(cfg.option_index("volume"), None);
    }

    #[test]
    fn missing_file_is_read_error() {
        let err = Config::load(Path::new("/nonexistent/snackdaemon.json")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn malformed_json_is_parse_error() {
        let err = Config::load(write_config("{ not json").path()).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn bad_timeout_is_rejected() {
        let json = FULL.replace("\"2s\"", "\"two seconds\"");
        let err = Config::load(write_config(&json).path()).unwrap_err();
        assert!(matches!(err, ConfigError::Timeout(t) if t == "two seconds"));
    }

    #[test]
    fn template_needs_exactly_one_placeholder() {
        let none = FULL.replace("=%d", "=0");
        assert!(matches!(
            Config::load(write_config(&none).path()),
            Err(ConfigError::Template(0))
        ));
        let two = FULL.replace("=%d", "=%d,%d");
        assert!(matches!(
            Config::load(write_config(&two).path()),
            Err(ConfigError::Template(2))
        ));
        let escaped = FULL.replace("=%d", "=%d %%d");
        assert!(Config::load(write_config(&escaped).path()).is_ok());
    }

    #[test]
    fn option_lookup_first_match_wins() {
        let json = FULL.replace(r#"["volume", "player"]"#, r#"["a", "b", "a"]"#);
        let cfg = Config::load(write_config(&json).path()).unwrap();
        assert_eq!(cfg.option_index("a"), Some(0));
        assert_eq!(cfg.option_index("b"), Some(1));
        assert_eq!(cfg.option_index("A"), None);
    }

    #[test]
    fn render_update_substitutes_index() {
        assert_eq!(render_update("set idx=%d", 3), "set idx=3");
        assert_eq!(render_update("%d%%", 12), "12%");
        assert_eq!(render_update("printf '%s' %d", 0), "printf '%s' 0");
        assert_eq!(render_update("trailing %", 1), "trailing %");
    }

    #[test]
    fn parse_simple_durations() {
        assert_eq!(parse_duration("2s").unwrap(), Duration::from_secs(2));
        assert_eq!(parse_duration("500ms").unwrap(), Duration::from_millis(500));
        assert_eq!(parse_duration("1m30s").unwrap(), Duration::from_secs(90));
        assert_eq!(parse_duration("1h").unwrap(), Duration::from_secs(3600));
        assert_eq!(parse_duration("1.5s").unwrap(), Duration::from_millis(1500));
        assert_eq!(parse_duration(".5s").unwrap(), Duration::from_millis(500));
        assert_eq!(parse_duration("10us").unwrap(), Duration::from_micros(10));
        assert_eq!(parse_duration("10µs").unwrap(), Duration::from_micros(10));
        assert_eq!(parse_duration("7ns").unwrap(), Duration::from_nanos(7));
        assert_eq!(parse_duration("+3s").unwrap(), Duration::from_secs(3));
        assert_eq!(parse_duration("0").unwrap(), Duration::ZERO);
        assert_eq!(parse_duration("0s").unwrap(), Duration::ZERO);
    }

    #[test]
    fn parse_caps_at_i64_nanoseconds() {
        assert_eq!(
            parse_duration("2562047h").unwrap(),
            Duration::from_secs(2_562_047 * 3600)
        );
        assert_eq!(
            parse_duration("9223372036854775807ns").unwrap(),
            Duration::from_nanos(i64::MAX as u64)
        );
        let huge = [
            "9223372036854775808ns",
            "2562048h",
            "3000000000000000h",
            "99999999999999999999999h",
        ];
        for huge in huge {
            let err = parse_duration(huge).unwrap_err();
            assert!(matches!(err, ConfigError::Timeout(ref t) if t == huge), "{huge:?}: {err}");
        }
    }

    #[test]
    fn load_rejects_out_of_range_timeout() {
        let file = write_config(
            r#"{
                "timeout": "3000000000000000h",
                "openCommand": "open",
                "updateCommand": "update %d",
                "closeCommand": "close",
                "options": ["volume"]
            }"#,
        );
        let err = Config::load(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Timeout(_)), "{err}");
    }

    #[test]
    fn parse_rejects_garbage() {
        for bad in ["", "s", "2", "2x", "-1s", "1.s.", "1..5s", "ms", "2 s", "1e3s"] {
            assert!(parse_duration(bad).is_err(), "{bad:?} should be rejected");
        }
    }

    #[test]
    fn example_config_is_valid() {
        let example = Config::example();
        let json = serde_json::to_string_pretty(&example).unwrap();
        assert!(json.contains("\"openCommand\""));
        assert!(!json.contains("shell"));
        let cfg = Config::try_from(example).unwrap();
        assert_eq!(cfg.idle_timeout, Duration::from_secs(2));
        assert_eq!(cfg.option_index("player"), Some(1));
    }

    #[test]
    fn display_lists_every_field() {
        let cfg = Config::load(write_config(FULL).path()).unwrap();
        let text = cfg.to_string();
        assert!(text.contains("timeout: 2s"));
        assert!(text.contains("options: [\"volume\", \"player\"]"));
        assert!(text.contains("shell: [\"sh\", \"-c\"]"));
    }
}
