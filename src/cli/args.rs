//! Command-line argument parsing
//!
//! Top-level options are declared with clap's derive API; subcommands are
//! generated from the registry at runtime.

use crate::{
    core::{
        arguments::PASSTHROUGH_ID,
        invocation::{KwValue, Kwargs},
        registry::{CommandEntry, CommandKind, Registry},
    },
    error::Result,
};
use clap::{Arg, ArgAction, ArgMatches, Args, Command};
use std::{ffi::OsString, path::PathBuf};

/// Options available to every application
#[derive(Args, Debug, Clone, Default, PartialEq, Eq)]
pub struct GlobalArgs {
    /// Settings file (TOML); defaults to $CMDRIG_SETTINGS
    #[arg(short = 's', long = "settings", value_name = "PATH")]
    pub settings: Option<PathBuf>,

    /// Only log errors
    #[arg(short = 'q', long = "quiet", conflicts_with = "verbose")]
    pub quiet: bool,

    /// More logging, repeat for more
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count)]
    pub verbose: u8,

    /// Report what would run without running it
    #[arg(long = "dry-run")]
    pub dry_run: bool,
}

/// Options added when a health check is composed in
#[derive(Args, Debug, Clone, PartialEq, Eq)]
pub struct HealthArgs {
    /// Health check attempts before running the command, 0 disables it
    #[arg(
        short = 'r',
        long = "retry",
        default_value_t = crate::core::health::DEFAULT_RETRY,
        value_parser = clap::value_parser!(u8).range(0..=i64::from(crate::core::health::MAX_RETRY))
    )]
    pub retry: u8,

    /// Skip the health check
    #[arg(long = "skip-check")]
    pub skip_check: bool,
}

impl GlobalArgs {
    /// Top-level options as keyword arguments for handlers
    pub fn to_kwargs(&self) -> Kwargs {
        let mut kwargs = Kwargs::new()
            .with("quiet", KwValue::Flag(self.quiet))
            .with("verbose", KwValue::Count(self.verbose))
            .with("dry_run", KwValue::Flag(self.dry_run));
        if let Some(settings) = &self.settings {
            kwargs.insert("settings", KwValue::Value(settings.display().to_string()));
        }
        kwargs
    }
}

impl HealthArgs {
    pub fn to_kwargs(&self) -> Kwargs {
        Kwargs::new()
            .with("retry", KwValue::Value(self.retry.to_string()))
            .with("skip_check", KwValue::Flag(self.skip_check))
    }
}

/// Build the sub-parser of one registered command
pub fn subcommand_for(entry: &CommandEntry) -> Result<Command> {
    let options = entry.options();
    let mut sub = Command::new(entry.name().to_string());

    if let Some(help) = &options.help {
        sub = sub.about(help.clone());
    }
    if let Some(long_help) = &options.long_help {
        sub = sub.long_about(long_help.clone());
    }
    if !options.aliases.is_empty() {
        sub = sub.visible_aliases(options.aliases.clone());
    }
    if entry.kind() == CommandKind::ExternalNoHelp {
        sub = sub.disable_help_flag(true);
    }

    sub = entry.argument_spec().apply(entry.name(), sub)?;

    let has_positionals = sub.get_positionals().next().is_some();
    let passthrough = Arg::new(PASSTHROUGH_ID)
        .value_name("ARGS")
        .help("Arguments passed through to the command")
        .num_args(0..)
        .action(ArgAction::Append)
        .allow_hyphen_values(true);
    let passthrough = if has_positionals {
        passthrough.last(true)
    } else {
        passthrough.trailing_var_arg(true)
    };

    Ok(sub.arg(passthrough))
}

/// Build the full parser: top-level options plus one subcommand per entry
pub fn build_parser(
    name: &str,
    about: Option<&str>,
    registry: &Registry,
    with_health: bool,
) -> Result<Command> {
    let mut parser = Command::new(name.to_string())
        .subcommand_required(true)
        .arg_required_else_help(true)
        .disable_help_subcommand(true)
        .subcommand_help_heading("Commands");
    if let Some(about) = about {
        parser = parser.about(about.to_string());
    }

    parser = GlobalArgs::augment_args(parser);
    if with_health {
        parser = HealthArgs::augment_args(parser);
    }

    for entry in registry.iter() {
        parser = parser.subcommand(subcommand_for(entry)?);
    }

    Ok(parser)
}

/// Keyword arguments of a matched subcommand
///
/// `sub` must be the built subcommand the matches came from.
pub fn kwargs_from_matches(sub: &Command, matches: &ArgMatches) -> Kwargs {
    let mut kwargs = Kwargs::new();

    for arg in sub.get_arguments() {
        let id = arg.get_id().as_str();
        if id == PASSTHROUGH_ID {
            continue;
        }

        let value = match arg.get_action() {
            ArgAction::SetTrue | ArgAction::SetFalse => matches
                .try_get_one::<bool>(id)
                .ok()
                .flatten()
                .map(|flag| KwValue::Flag(*flag)),
            ArgAction::Count => matches
                .try_get_one::<u8>(id)
                .ok()
                .flatten()
                .map(|count| KwValue::Count(*count)),
            ArgAction::Set | ArgAction::Append => {
                matches.try_get_raw(id).ok().flatten().map(|raw| {
                    let values: Vec<String> = raw
                        .map(|value| value.to_string_lossy().into_owned())
                        .collect();
                    let multiple = matches!(arg.get_action(), ArgAction::Append)
                        || arg.get_num_args().is_some_and(|range| range.max_values() > 1);
                    match (multiple, values.as_slice()) {
                        (false, [single]) => KwValue::Value(single.clone()),
                        _ => KwValue::List(values),
                    }
                })
            }
            _ => None,
        };

        if let Some(value) = value {
            kwargs.insert(id, value);
        }
    }

    kwargs
}

/// Passthrough arguments of a matched subcommand
pub fn passthrough_args(matches: &ArgMatches) -> Vec<String> {
    matches
        .try_get_raw(PASSTHROUGH_ID)
        .ok()
        .flatten()
        .map(|raw| {
            raw.map(|value| value.to_string_lossy().into_owned())
                .collect()
        })
        .unwrap_or_default()
}

/// Read `-s/--settings` from `argv` with a lenient copy of `parser`
///
/// Settings can declare commands, so they are read before the final parser
/// exists. Parse errors are ignored; an unknown subcommand is fine here.
pub fn probe_settings<I, T>(parser: Command, argv: I) -> Option<PathBuf>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    parser
        .disable_help_flag(true)
        .ignore_errors(true)
        .allow_external_subcommands(true)
        .try_get_matches_from(argv)
        .ok()
        .and_then(|matches| matches.get_one::<PathBuf>("settings").cloned())
}
