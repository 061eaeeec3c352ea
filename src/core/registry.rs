//! Command registry
//!
//! Append-only store of command entries keyed by name. Entries are created
//! at startup, never mutated afterwards and enumerated in name order so the
//! generated help text is reproducible.

use crate::{
    core::{arguments::ArgumentSpec, invocation::Invocation},
    error::{CommandError, Result},
};
use regex::Regex;
use std::{
    collections::BTreeMap,
    fmt,
    sync::{Arc, LazyLock},
};
use tracing::{debug, instrument};

static NAME_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z][A-Za-z0-9_-]*$").expect("command name pattern is valid")
});

/// How a command is executed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    /// Called in the current process
    InProcess,
    /// Expands to external process invocations
    External,
    /// Like `External`, but the wrapped tool handles `--help` itself
    ExternalNoHelp,
}

impl CommandKind {
    #[must_use]
    pub const fn is_external(self) -> bool {
        matches!(self, Self::External | Self::ExternalNoHelp)
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::InProcess => "in-process",
            Self::External => "external",
            Self::ExternalNoHelp => "external (no help)",
        })
    }
}

/// In-process handler; the returned code is the command's return code
pub type InProcessFn = dyn Fn(&Invocation) -> anyhow::Result<i32> + Send + Sync;

/// External handler; returns the argument vectors to run, in order
pub type ExternalFn = dyn Fn(&Invocation) -> anyhow::Result<Vec<Vec<String>>> + Send + Sync;

/// Callable behind a command
#[derive(Clone)]
pub enum Handler {
    InProcess(Arc<InProcessFn>),
    External(Arc<ExternalFn>),
}

impl Handler {
    /// Whether both handlers point at the same callable
    #[must_use]
    pub fn same_as(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::InProcess(a), Self::InProcess(b)) => Arc::ptr_eq(a, b),
            (Self::External(a), Self::External(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InProcess(_) => f.write_str("InProcess(..)"),
            Self::External(_) => f.write_str("External(..)"),
        }
    }
}

/// Options for the generated sub-parser
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParserOptions {
    /// One-line help shown in the command list
    pub help: Option<String>,
    /// Longer description shown by the subcommand's own help
    pub long_help: Option<String>,
    /// Alternative names accepted on the command line
    pub aliases: Vec<String>,
}

impl ParserOptions {
    #[must_use]
    pub fn help(help: impl Into<String>) -> Self {
        Self {
            help: Some(help.into()),
            ..Self::default()
        }
    }
}

/// Registered metadata of one command
#[derive(Debug, Clone)]
pub struct CommandEntry {
    name: String,
    kind: CommandKind,
    handler: Handler,
    target: String,
    arguments: ArgumentSpec,
    parser_options: ParserOptions,
}

impl CommandEntry {
    /// Command called in the current process
    pub fn in_process<F>(name: impl Into<String>, handler: F) -> Self
    where
        F: Fn(&Invocation) -> anyhow::Result<i32> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            kind: CommandKind::InProcess,
            target: std::any::type_name::<F>().to_string(),
            handler: Handler::InProcess(Arc::new(handler)),
            arguments: ArgumentSpec::none(),
            parser_options: ParserOptions::default(),
        }
    }

    /// Command expanding to one or more external process invocations
    pub fn external<F>(name: impl Into<String>, handler: F) -> Self
    where
        F: Fn(&Invocation) -> anyhow::Result<Vec<Vec<String>>> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            kind: CommandKind::External,
            target: std::any::type_name::<F>().to_string(),
            handler: Handler::External(Arc::new(handler)),
            arguments: ArgumentSpec::none(),
            parser_options: ParserOptions::default(),
        }
    }

    /// Leave `--help` to the wrapped external tool
    ///
    /// Has no effect on in-process commands.
    #[must_use]
    pub fn without_help(mut self) -> Self {
        if self.kind.is_external() {
            self.kind = CommandKind::ExternalNoHelp;
        }
        self
    }

    #[must_use]
    pub fn arguments(mut self, arguments: impl Into<ArgumentSpec>) -> Self {
        self.arguments = arguments.into();
        self
    }

    #[must_use]
    pub fn parser_options(mut self, options: ParserOptions) -> Self {
        self.parser_options = options;
        self
    }

    #[must_use]
    pub fn help(mut self, help: impl Into<String>) -> Self {
        self.parser_options.help = Some(help.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub const fn kind(&self) -> CommandKind {
        self.kind
    }

    pub const fn handler(&self) -> &Handler {
        &self.handler
    }

    /// Type name of the handler, for tracing
    pub fn target(&self) -> &str {
        &self.target
    }

    pub const fn argument_spec(&self) -> &ArgumentSpec {
        &self.arguments
    }

    pub const fn options(&self) -> &ParserOptions {
        &self.parser_options
    }
}

/// Registry of all commands known to the application
#[derive(Debug, Default)]
pub struct Registry {
    entries: BTreeMap<String, CommandEntry>,
}

impl Registry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a command; fails if the name is taken or malformed
    #[instrument(skip(self, entry), fields(name = %entry.name, kind = %entry.kind))]
    pub fn register(&mut self, entry: CommandEntry) -> Result<()> {
        if !NAME_PATTERN.is_match(&entry.name) {
            return Err(CommandError::InvalidName { name: entry.name });
        }
        if self.entries.contains_key(&entry.name) {
            return Err(CommandError::duplicate(entry.name));
        }

        debug!("Registered command");
        self.entries.insert(entry.name.clone(), entry);
        Ok(())
    }

    /// Look a command up by name
    pub fn lookup(&self, name: &str) -> Result<&CommandEntry> {
        self.entries
            .get(name)
            .ok_or_else(|| CommandError::wrong_command(name))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// All entries in name order
    pub fn all(&self) -> Vec<&CommandEntry> {
        self.iter().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &CommandEntry> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop every entry
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
