#![allow(clippy::cargo_common_metadata)]
use anyhow::Result;
use cmdrig::{
    cli::{App, SettingsEnv},
    error::CommandError,
    setup_logging,
};
use std::{ffi::OsString, process::ExitCode};

fn main() -> Result<ExitCode> {
    let argv: Vec<OsString> = std::env::args_os().collect();

    let mut app = App::new("cmdrig")
        .about("Run the commands declared in a settings file");
    app.extension(Box::new(SettingsEnv));

    // Settings may declare commands, so they are loaded before parsing
    app.load_settings(&argv)?;

    let parsed = match app.parse(&argv) {
        Ok(parsed) => parsed,
        Err(CommandError::Usage(e)) => e.exit(),
        Err(e) => return Err(e.into()),
    };

    // Setup logging based on verbosity flags
    setup_logging(parsed.globals.quiet, parsed.globals.verbose)?;

    let code = app.execute(&parsed)?;
    Ok(ExitCode::from(u8::try_from(code).unwrap_or(1)))
}
