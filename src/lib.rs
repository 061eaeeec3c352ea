//! # cmdrig
//!
//! A scaffold for command-line tools. Commands are registered by name, either
//! as in-process callables or as external process invocations, and exposed
//! as subcommands of a generated `clap` parser.
//!
//! ## Features
//!
//! - Registry of named commands with declarative or callback argument specs
//! - Default arguments per command from a TOML settings file
//! - Fail-fast execution of multi-step commands, with dry-run support
//! - Interrupt forwarding to child processes, escalating to a kill
//! - Health-check gate with exponential backoff before running a command
//!
//! ## Example
//!
//! ```no_run
//! use cmdrig::{cli::App, core::CommandEntry};
//!
//! let mut app = App::new("tasks");
//! app.register(
//!     CommandEntry::external("lint", |inv| {
//!         let mut clippy = vec!["cargo".to_string(), "clippy".to_string()];
//!         clippy.extend(inv.args.iter().cloned());
//!         Ok(vec![clippy])
//!     })
//!     .help("Run clippy"),
//! )?;
//! let code = app.run_from(["tasks", "lint", "--", "-D", "warnings"])?;
//! std::process::exit(code);
//! # Ok::<(), cmdrig::error::CommandError>(())
//! ```

pub mod cli;
pub mod config;
pub mod core;
pub mod error;
pub mod utils;

use anyhow::Result;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Log level for the given verbosity flags
#[must_use]
pub const fn log_level(quiet: bool, verbose: u8) -> &'static str {
    match (quiet, verbose) {
        (true, _) => "error",
        (false, 0) => "info",
        (false, 1) => "debug",
        (false, _) => "trace",
    }
}

/// Initialize logging with appropriate verbosity
pub fn setup_logging(quiet: bool, verbose: u8) -> Result<()> {
    let filter = EnvFilter::new(log_level(quiet, verbose));

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_level(true)
                .with_writer(std::io::stderr)
                .compact(),
        )
        .with(filter)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    Ok(())
}
