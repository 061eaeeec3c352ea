//! Settings for the command scaffold
//!
//! Settings come from an optional TOML file named with `--settings` or the
//! `CMDRIG_SETTINGS` environment variable. Every section has defaults, so an
//! application runs without any file.

use crate::error::{CommandError, Result};
use serde::Deserialize;
use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
    time::Duration,
};
use tracing::{debug, instrument};

/// Environment variable naming the settings file when `--settings` is absent
pub const SETTINGS_ENV: &str = "CMDRIG_SETTINGS";

/// Main settings structure
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    /// Default arguments per command, split with shell quoting rules
    pub default_args: BTreeMap<String, String>,
    /// Variables added to the environment of external commands
    pub env: BTreeMap<String, String>,
    /// Health-check configuration
    pub health_check: HealthCheckSettings,
    /// Executor configuration
    pub executor: ExecutorSettings,
    /// External commands declared in settings
    pub commands: BTreeMap<String, CommandSettings>,
}

/// Health-check configuration
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HealthCheckSettings {
    /// Upper bound of the random first backoff delay, in milliseconds
    pub max_initial_delay_ms: u64,
    /// Executables that must be on `PATH` before a command runs
    pub require: Vec<String>,
}

/// Executor configuration
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ExecutorSettings {
    /// Time to wait for a child after killing it on a second interrupt
    pub kill_timeout_secs: u64,
}

/// External command declared in settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CommandSettings {
    /// One-line help for the command list
    pub help: Option<String>,
    /// Steps run in order; passthrough arguments are appended to the last one
    pub run: Vec<String>,
    /// Let the wrapped tool handle `--help`
    pub no_help: bool,
}

impl Default for HealthCheckSettings {
    fn default() -> Self {
        Self {
            max_initial_delay_ms: 1000,
            require: Vec::new(),
        }
    }
}

impl Default for ExecutorSettings {
    fn default() -> Self {
        Self {
            kill_timeout_secs: 5,
        }
    }
}

impl HealthCheckSettings {
    #[must_use]
    pub const fn max_initial_delay(&self) -> Duration {
        Duration::from_millis(self.max_initial_delay_ms)
    }
}

impl ExecutorSettings {
    #[must_use]
    pub const fn kill_timeout(&self) -> Duration {
        Duration::from_secs(self.kill_timeout_secs)
    }
}

impl Settings {
    /// Resolve the settings file from an explicit path or the environment
    pub fn locate(explicit: Option<&Path>) -> Option<PathBuf> {
        explicit
            .map(Path::to_path_buf)
            .or_else(|| std::env::var_os(SETTINGS_ENV).map(PathBuf::from))
            .filter(|path| !path.as_os_str().is_empty())
    }

    /// Load settings from `path`, or defaults when there is none
    #[instrument]
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            debug!("No settings file, using defaults");
            return Ok(Self::default());
        };

        let content = fs::read_to_string(path).map_err(|e| {
            CommandError::settings_file(
                format!("cannot read settings file {}", path.display()),
                path,
                e,
            )
        })?;
        let settings = Self::from_toml(&content).map_err(|e| match e {
            CommandError::Settings {
                message, source, ..
            } => CommandError::Settings {
                message: format!("{}: {message}", path.display()),
                path: Some(path.to_path_buf()),
                source,
            },
            other => other,
        })?;

        debug!("Loaded settings from {}", path.display());
        Ok(settings)
    }

    /// Parse and validate settings from TOML text
    pub fn from_toml(content: &str) -> Result<Self> {
        let settings: Self = toml::from_str(content).map_err(|e| CommandError::Settings {
            message: format!("invalid settings: {}", e.message()),
            path: None,
            source: Some(Box::new(e)),
        })?;
        settings.validate()?;
        Ok(settings)
    }

    /// Validate settings
    pub fn validate(&self) -> Result<()> {
        for (name, args) in &self.default_args {
            shell_words::split(args).map_err(|e| CommandError::Settings {
                message: format!("default arguments for {name} are not valid shell words"),
                path: None,
                source: Some(Box::new(e)),
            })?;
        }

        for (name, command) in &self.commands {
            if command.run.is_empty() {
                return Err(CommandError::settings(format!(
                    "command {name} has no steps to run"
                )));
            }
            for step in &command.run {
                let words = shell_words::split(step).map_err(|e| CommandError::Settings {
                    message: format!("step {step:?} of command {name} is not valid shell words"),
                    path: None,
                    source: Some(Box::new(e)),
                })?;
                if words.is_empty() {
                    return Err(CommandError::settings(format!(
                        "command {name} has an empty step"
                    )));
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert!(settings.default_args.is_empty());
        assert_eq!(
            settings.health_check.max_initial_delay(),
            Duration::from_secs(1)
        );
        assert_eq!(settings.executor.kill_timeout(), Duration::from_secs(5));
    }

    #[test]
    fn test_parse_full_settings() {
        let settings = Settings::from_toml(
            r#"
            [default_args]
            test = "--workspace -- --nocapture"

            [env]
            RUST_BACKTRACE = "1"

            [health_check]
            max_initial_delay_ms = 10
            require = ["sh"]

            [executor]
            kill_timeout_secs = 2

            [commands.release]
            help = "Build a release"
            run = ["cargo build --release", "tar czf dist.tgz target/release"]
            "#,
        )
        .unwrap();

        assert_eq!(settings.default_args["test"], "--workspace -- --nocapture");
        assert_eq!(settings.env["RUST_BACKTRACE"], "1");
        assert_eq!(settings.health_check.require, vec!["sh"]);
        assert_eq!(
            settings.health_check.max_initial_delay(),
            Duration::from_millis(10)
        );
        assert_eq!(settings.executor.kill_timeout(), Duration::from_secs(2));
        let release = &settings.commands["release"];
        assert_eq!(release.run.len(), 2);
        assert!(!release.no_help);
    }

    #[test]
    fn test_rejects_invalid_settings() {
        for content in [
            "unknown_section = 1",
            "[default_args]\ntest = \"'unterminated\"",
            "[commands.empty]\nrun = []",
            "[commands.blank]\nrun = [\"  \"]",
        ] {
            let err = Settings::from_toml(content).unwrap_err();
            assert!(
                matches!(err, CommandError::Settings { .. }),
                "unexpected error for {content:?}: {err}"
            );
        }
    }

    #[test]
    fn test_load_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[default_args]\nfoo = \"-v\"").unwrap();

        let settings = Settings::load(Some(file.path())).unwrap();
        assert_eq!(settings.default_args["foo"], "-v");

        assert_eq!(Settings::load(None).unwrap(), Settings::default());
    }

    #[test]
    fn test_load_missing_file() {
        let err = Settings::load(Some(Path::new("/nonexistent/settings.toml"))).unwrap_err();
        match err {
            CommandError::Settings { path, .. } => {
                assert_eq!(path.unwrap(), Path::new("/nonexistent/settings.toml"));
            }
            other => panic!("Expected settings error, got {other}"),
        }
    }

    #[test]
    fn test_locate_prefers_explicit_path() {
        let path = Settings::locate(Some(Path::new("explicit.toml")));
        assert_eq!(path.unwrap(), Path::new("explicit.toml"));
    }
}
