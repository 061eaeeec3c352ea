//! Extensions composed into the application shell
//!
//! Extensions are applied in the order they were added: each may add
//! top-level arguments and contribute environment variables for external
//! commands.

use crate::config::Settings;
use clap::ArgMatches;

/// What an extension can see when contributing environment variables
pub struct ExtensionContext<'a> {
    pub settings: &'a Settings,
    /// Top-level matches, including arguments added by extensions
    pub matches: &'a ArgMatches,
}

/// Hook composed into the application shell
pub trait Extension {
    /// Name used in log messages
    fn name(&self) -> &str;

    /// Add top-level arguments to the parser
    fn contribute_arguments(&self, parser: clap::Command) -> clap::Command {
        parser
    }

    /// Environment variables for external commands
    fn contribute_env(&self, _ctx: &ExtensionContext<'_>) -> anyhow::Result<Vec<(String, String)>> {
        Ok(Vec::new())
    }
}

/// Passes the `[env]` table of the settings to external commands
#[derive(Debug, Default)]
pub struct SettingsEnv;

impl Extension for SettingsEnv {
    fn name(&self) -> &str {
        "settings env"
    }

    fn contribute_env(&self, ctx: &ExtensionContext<'_>) -> anyhow::Result<Vec<(String, String)>> {
        Ok(ctx
            .settings
            .env
            .iter()
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_env() {
        let settings = Settings::from_toml("[env]\nFOO = \"bar\"").unwrap();
        let matches = clap::Command::new("app").get_matches_from(["app"]);
        let ctx = ExtensionContext {
            settings: &settings,
            matches: &matches,
        };

        let env = SettingsEnv.contribute_env(&ctx).unwrap();
        assert_eq!(env, vec![("FOO".to_string(), "bar".to_string())]);
        assert_eq!(SettingsEnv.name(), "settings env");
    }
}
