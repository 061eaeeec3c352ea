//! Application shell
//!
//! Ties the pieces together: builds the parser from the registry, loads
//! settings, runs extensions and the health-check gate, then builds and
//! executes the selected command.

use crate::{
    cli::{
        args::{self, GlobalArgs, HealthArgs},
        extension::{Extension, ExtensionContext},
    },
    config::{CommandSettings, Settings},
    core::{
        arguments::COMMAND_ID,
        builder::CommandBuilder,
        executor::Executor,
        health::{AllChecks, ExecutablesOnPath, HealthCheck, HealthGate},
        invocation::{KwValue, Kwargs},
        registry::{CommandEntry, Registry},
    },
    error::{CommandError, Result},
    utils::{env::EnvVars, process::ProcessRunner},
};
use clap::{ArgMatches, FromArgMatches};
use std::{ffi::OsString, path::PathBuf};
use tracing::{debug, error, info, instrument};

/// Return code reported when the health check fails
pub const EXIT_UNHEALTHY: i32 = 1;

const SEPARATOR: &str =
    "----------------------------------------------------------------------";

/// Parsed command line, ready to execute
#[derive(Debug, Clone)]
pub struct ParsedCommand {
    /// Top-level options
    pub globals: GlobalArgs,
    /// Health-check options, when a health check is composed in
    pub health: Option<HealthArgs>,
    /// Selected command
    pub command: String,
    /// Passthrough positional arguments
    pub args: Vec<String>,
    /// Options of the command's sub-parser
    pub kwargs: Kwargs,
    /// Raw top-level matches, for extensions
    pub matches: ArgMatches,
}

/// Command-line application built from registered commands
pub struct App {
    name: String,
    about: Option<String>,
    registry: Registry,
    extensions: Vec<Box<dyn Extension>>,
    checks: AllChecks,
    settings: Settings,
    settings_path: Option<PathBuf>,
}

impl App {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            about: None,
            registry: Registry::new(),
            extensions: Vec::new(),
            checks: AllChecks::new(),
            settings: Settings::default(),
            settings_path: None,
        }
    }

    #[must_use]
    pub fn about(mut self, about: impl Into<String>) -> Self {
        self.about = Some(about.into());
        self
    }

    /// Register a command
    pub fn register(&mut self, entry: CommandEntry) -> Result<()> {
        self.registry.register(entry)
    }

    pub const fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Append an extension; extensions run in the order they were added
    pub fn extension(&mut self, extension: Box<dyn Extension>) {
        debug!("Adding extension: {}", extension.name());
        self.extensions.push(extension);
    }

    /// Add a health check; with at least one, the gate and its options are enabled
    pub fn health_check(&mut self, check: Box<dyn HealthCheck>) {
        debug!("Adding health check: {}", check.name());
        self.checks.push(check);
    }

    pub fn has_health_check(&self) -> bool {
        !self.checks.is_empty()
    }

    pub const fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Use `settings` and register what they declare
    pub fn with_settings(&mut self, settings: Settings, path: Option<PathBuf>) -> Result<()> {
        for (name, command) in &settings.commands {
            self.register(settings_command(name, command)?)?;
        }
        if !settings.health_check.require.is_empty() {
            self.health_check(Box::new(ExecutablesOnPath::new(
                settings.health_check.require.clone(),
            )));
        }

        self.settings = settings;
        self.settings_path = path;
        Ok(())
    }

    /// Locate and load the settings named on the command line or in the environment
    pub fn load_settings<I, T>(&mut self, argv: I) -> Result<()>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        // Health options are accepted even before settings add a check
        let explicit = args::probe_settings(self.build_parser(true)?, argv);
        let path = Settings::locate(explicit.as_deref());
        let settings = Settings::load(path.as_deref())?;
        self.with_settings(settings, path)
    }

    /// Build the argument parser
    pub fn parser(&self) -> Result<clap::Command> {
        self.build_parser(self.has_health_check())
    }

    fn build_parser(&self, with_health: bool) -> Result<clap::Command> {
        let parser = args::build_parser(
            &self.name,
            self.about.as_deref(),
            &self.registry,
            with_health,
        )?;

        Ok(self
            .extensions
            .iter()
            .fold(parser, |parser, extension| extension.contribute_arguments(parser)))
    }

    /// Parse `argv` into the command to run
    pub fn parse<I, T>(&self, argv: I) -> Result<ParsedCommand>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        let mut parser = self.parser()?;
        let matches = parser.try_get_matches_from_mut(argv)?;

        let globals = GlobalArgs::from_arg_matches(&matches)?;
        let health = if self.has_health_check() {
            Some(HealthArgs::from_arg_matches(&matches)?)
        } else {
            None
        };

        let (command, sub_matches) = matches
            .subcommand()
            .ok_or_else(|| CommandError::wrong_command(""))?;
        let sub = parser
            .find_subcommand(command)
            .ok_or_else(|| CommandError::wrong_command(command))?;

        // Command options win over top-level ones of the same name
        let mut kwargs = globals.to_kwargs();
        if let Some(health) = &health {
            kwargs.extend(health.to_kwargs());
        }
        kwargs.extend(args::kwargs_from_matches(sub, sub_matches));
        kwargs.insert(COMMAND_ID, KwValue::Value(command.to_string()));

        Ok(ParsedCommand {
            command: command.to_string(),
            args: args::passthrough_args(sub_matches),
            kwargs,
            globals,
            health,
            matches: matches.clone(),
        })
    }

    /// Run the parsed command and return its return code
    #[instrument(skip_all, fields(command = %parsed.command))]
    pub fn execute(&self, parsed: &ParsedCommand) -> Result<i32> {
        let settings_label = self
            .settings_path
            .as_deref()
            .map_or_else(|| "<defaults>".to_string(), |path| path.display().to_string());
        print_header(&[("Command", &parsed.command), ("Settings", &settings_label)]);

        let built = CommandBuilder::new(&self.registry)
            .with_default_args(&self.settings.default_args)
            .build(&parsed.command, &parsed.args, &parsed.kwargs)?;

        let code = if self.gate(parsed) {
            let env = self.collect_env(&parsed.matches)?;
            let runner = ProcessRunner::new()
                .with_env(env.into_vec())
                .with_kill_timeout(self.settings.executor.kill_timeout());
            Executor::new(runner)
                .dry_run(parsed.globals.dry_run)
                .execute(&built)
        } else {
            EXIT_UNHEALTHY
        };

        print_return(code);
        Ok(code)
    }

    /// Parse and execute `argv`
    pub fn run_from<I, T>(&self, argv: I) -> Result<i32>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        let parsed = self.parse(argv)?;
        self.execute(&parsed)
    }

    fn gate(&self, parsed: &ParsedCommand) -> bool {
        let Some(health) = &parsed.health else {
            return true;
        };

        let mut gate = HealthGate::new(health.retry)
            .skip(health.skip_check)
            .max_initial_delay(self.settings.health_check.max_initial_delay());
        let outcome = gate.run(&self.checks);
        debug!(
            "Health check {} after {} attempt(s)",
            outcome.state, outcome.attempts
        );
        outcome.is_healthy()
    }

    fn collect_env(&self, matches: &ArgMatches) -> Result<EnvVars> {
        let ctx = ExtensionContext {
            settings: &self.settings,
            matches,
        };

        let mut env = EnvVars::new();
        for extension in &self.extensions {
            let vars = extension.contribute_env(&ctx).map_err(|e| CommandError::Settings {
                message: format!("extension {} failed: {e:#}", extension.name()),
                path: None,
                source: Some(e.into()),
            })?;
            env.extend(extension.name(), vars);
        }
        Ok(env)
    }
}

/// External command declared in settings
fn settings_command(name: &str, command: &CommandSettings) -> Result<CommandEntry> {
    let steps = command
        .run
        .iter()
        .map(|step| shell_words::split(step))
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| CommandError::Settings {
            message: format!("command {name} has a step that is not valid shell words"),
            path: None,
            source: Some(Box::new(e)),
        })?;

    let mut entry = CommandEntry::external(name, move |inv| {
        let mut steps = steps.clone();
        if let Some(last) = steps.last_mut() {
            last.extend(inv.args.iter().cloned());
        }
        Ok(steps)
    });
    if let Some(help) = &command.help {
        entry = entry.help(help.clone());
    }
    if command.no_help {
        entry = entry.without_help();
    }

    Ok(entry)
}

fn print_header(fields: &[(&str, &str)]) {
    let width = fields.iter().map(|(key, _)| key.len()).max().unwrap_or(0);
    let mut lines = vec![SEPARATOR.to_string()];
    lines.extend(
        fields
            .iter()
            .map(|(key, value)| format!("{key:<width$}: {value}")),
    );
    lines.push(SEPARATOR.to_string());
    info!("\n{}", lines.join("\n"));
}

fn print_return(code: i32) {
    if code == 0 {
        info!("Return code: {}", code);
    } else {
        error!("Return code: {}", code);
    }
}
