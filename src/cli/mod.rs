//! Command-line interface module
//!
//! Provides the application shell, argument parsing and extensions.

pub mod app;
pub mod args;
pub mod extension;

pub use app::{App, ParsedCommand};
pub use args::{GlobalArgs, HealthArgs};
pub use extension::{Extension, ExtensionContext, SettingsEnv};
