//! Utility modules for common functionality
//!
//! Provides process execution and environment handling.

pub mod env;
pub mod process;

pub use env::EnvVars;
pub use process::ProcessRunner;
