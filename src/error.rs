//! Error types for command registration, building and settings
//!
//! Execution failures are not errors: a nonzero return code is an ordinary
//! outcome and travels as data. Everything here aborts the process before a
//! command runs.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for the command scaffold
#[derive(Error, Debug)]
pub enum CommandError {
    /// The requested command is not registered
    #[error("Unknown command: {name}")]
    WrongCommand { name: String },

    /// A command with the same name is already registered
    #[error("Command already registered: {name}")]
    DuplicateRegistration { name: String },

    /// Command names must be usable as subcommand names
    #[error("Invalid command name: {name:?}")]
    InvalidName { name: String },

    /// A declared argument cannot be turned into a parser argument
    #[error("Invalid argument spec for command {command}: {message}")]
    InvalidArgumentSpec { command: String, message: String },

    /// Settings could not be read, parsed or validated
    #[error("Settings error: {message}")]
    Settings {
        message: String,
        path: Option<PathBuf>,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// An external command handler failed to produce its invocations
    #[error("Failed to build command {command}: {message}")]
    Build {
        command: String,
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// An external command handler produced an empty argument vector
    #[error("Command {command} produced an empty invocation at position {index}")]
    EmptyInvocation { command: String, index: usize },

    /// The command line could not be parsed, or help/version was requested
    #[error(transparent)]
    Usage(#[from] clap::Error),
}

impl CommandError {
    /// Create a new unknown command error
    pub fn wrong_command(name: impl Into<String>) -> Self {
        Self::WrongCommand { name: name.into() }
    }

    /// Create a new duplicate registration error
    pub fn duplicate(name: impl Into<String>) -> Self {
        Self::DuplicateRegistration { name: name.into() }
    }

    /// Create a new argument spec error
    pub fn invalid_argument_spec(command: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidArgumentSpec {
            command: command.into(),
            message: message.into(),
        }
    }

    /// Create a new settings error
    pub fn settings(message: impl Into<String>) -> Self {
        Self::Settings {
            message: message.into(),
            path: None,
            source: None,
        }
    }

    /// Create a new settings error tied to a settings file
    pub fn settings_file<P: Into<PathBuf>>(
        message: impl Into<String>,
        path: P,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Settings {
            message: message.into(),
            path: Some(path.into()),
            source: Some(Box::new(source)),
        }
    }

    /// Create a new build error from a failed handler
    pub fn build(command: impl Into<String>, source: anyhow::Error) -> Self {
        Self::Build {
            command: command.into(),
            message: format!("{source:#}"),
            source: Some(source.into()),
        }
    }
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, CommandError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        assert_eq!(
            CommandError::wrong_command("foo").to_string(),
            "Unknown command: foo"
        );
        assert_eq!(
            CommandError::duplicate("foo").to_string(),
            "Command already registered: foo"
        );
        assert_eq!(
            CommandError::invalid_argument_spec("foo", "no flags").to_string(),
            "Invalid argument spec for command foo: no flags"
        );
    }

    #[test]
    fn test_build_error_keeps_handler_message() {
        let err = CommandError::build("dist", anyhow::anyhow!("missing version"));
        assert_eq!(
            err.to_string(),
            "Failed to build command dist: missing version"
        );
    }
}
