//! Declarative argument specs for command sub-parsers
//!
//! A command either declares its arguments as a list of `(flags, options)`
//! pairs or hands over a configurator that edits its `clap::Command` directly.
//! Declarations are validated when the parser is built, before any command
//! runs.

use crate::error::{CommandError, Result};
use clap::builder::{PossibleValue, PossibleValuesParser};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

/// Id reserved for the passthrough positional arguments of every subcommand
pub const PASSTHROUGH_ID: &str = "args";
/// Keyword under which handlers receive the selected command name
pub const COMMAND_ID: &str = "command";

/// What the parser does with an argument occurrence
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Action {
    /// Store the value(s) of the last occurrence
    #[default]
    Store,
    /// Collect values across occurrences
    Append,
    /// Boolean switch, true when present
    StoreTrue,
    /// Boolean switch, false when present
    StoreFalse,
    /// Count occurrences
    Count,
}

impl Action {
    const fn takes_values(self) -> bool {
        matches!(self, Self::Store | Self::Append)
    }
}

/// How many values an argument occurrence consumes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Nargs {
    Exactly(usize),
    Optional,
    ZeroOrMore,
    OneOrMore,
}

/// Options of one declared argument
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArgOptions {
    pub help: Option<String>,
    pub action: Action,
    pub nargs: Option<Nargs>,
    pub defaults: Vec<String>,
    pub choices: Vec<String>,
    pub required: bool,
    pub metavar: Option<String>,
    pub dest: Option<String>,
}

/// One `(flags, options)` pair of a declarative argument spec
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArgumentDecl {
    pub flags: Vec<String>,
    pub options: ArgOptions,
}

impl ArgumentDecl {
    /// Declare an argument from its flag names, e.g. `["-b", "--bar"]` or `["version"]`
    pub fn new<I, S>(flags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            flags: flags.into_iter().map(Into::into).collect(),
            options: ArgOptions::default(),
        }
    }

    #[must_use]
    pub fn help(mut self, help: impl Into<String>) -> Self {
        self.options.help = Some(help.into());
        self
    }

    #[must_use]
    pub const fn action(mut self, action: Action) -> Self {
        self.options.action = action;
        self
    }

    #[must_use]
    pub const fn nargs(mut self, nargs: Nargs) -> Self {
        self.options.nargs = Some(nargs);
        self
    }

    #[must_use]
    pub fn default_value(mut self, value: impl Into<String>) -> Self {
        self.options.defaults.push(value.into());
        self
    }

    #[must_use]
    pub fn choices<I, S>(mut self, choices: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.options.choices = choices.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub const fn required(mut self, required: bool) -> Self {
        self.options.required = required;
        self
    }

    #[must_use]
    pub fn metavar(mut self, metavar: impl Into<String>) -> Self {
        self.options.metavar = Some(metavar.into());
        self
    }

    #[must_use]
    pub fn dest(mut self, dest: impl Into<String>) -> Self {
        self.options.dest = Some(dest.into());
        self
    }

    fn is_positional(&self) -> bool {
        self.flags.iter().any(|flag| !flag.starts_with('-'))
    }

    /// Keyword id under which the parsed value reaches the handler
    pub fn id(&self) -> Option<String> {
        if let Some(dest) = &self.options.dest {
            return Some(dest.clone());
        }
        if self.is_positional() {
            return self.flags.first().cloned();
        }
        self.flags
            .iter()
            .find_map(|flag| flag.strip_prefix("--"))
            .or_else(|| self.flags.iter().find_map(|flag| flag.strip_prefix('-')))
            .map(|name| name.replace('-', "_"))
    }

    /// Validate the declaration and turn it into a `clap::Arg`
    pub fn to_arg(&self, command: &str) -> Result<clap::Arg> {
        let invalid = |message: String| CommandError::invalid_argument_spec(command, message);

        if self.flags.is_empty() {
            return Err(invalid("argument declared without flags".to_string()));
        }

        let positional = self.is_positional();
        if positional && self.flags.len() > 1 {
            return Err(invalid(format!(
                "positional argument must have exactly one name, got {:?}",
                self.flags
            )));
        }

        let id = self
            .id()
            .filter(|id| !id.is_empty())
            .ok_or_else(|| invalid(format!("cannot derive an id from {:?}", self.flags)))?;
        if id == PASSTHROUGH_ID || id == COMMAND_ID {
            return Err(invalid(format!("argument id {id:?} is reserved")));
        }

        let opts = &self.options;
        if !opts.action.takes_values() {
            if positional {
                return Err(invalid(format!(
                    "positional argument {id} cannot use {:?}",
                    opts.action
                )));
            }
            if opts.nargs.is_some()
                || !opts.defaults.is_empty()
                || !opts.choices.is_empty()
                || opts.metavar.is_some()
            {
                return Err(invalid(format!(
                    "switch {id} takes no values, drop nargs/defaults/choices/metavar"
                )));
            }
        }
        if opts.nargs == Some(Nargs::Exactly(0)) {
            return Err(invalid(format!("argument {id} must take at least one value")));
        }

        let mut arg = clap::Arg::new(id.clone());

        if !positional {
            for flag in &self.flags {
                arg = match flag.strip_prefix("--") {
                    Some(long) if !long.is_empty() => arg.long(long.to_string()),
                    Some(_) => return Err(invalid(format!("empty long flag in {:?}", self.flags))),
                    None => {
                        let mut chars = flag.chars().skip(1);
                        match (chars.next(), chars.next()) {
                            (Some(short), None) if short != '-' => arg.short(short),
                            _ => {
                                return Err(invalid(format!(
                                    "short flag {flag:?} must be a dash and a single character"
                                )));
                            }
                        }
                    }
                };
            }
        }

        arg = arg.action(match opts.action {
            Action::Store => clap::ArgAction::Set,
            Action::Append => clap::ArgAction::Append,
            Action::StoreTrue => clap::ArgAction::SetTrue,
            Action::StoreFalse => clap::ArgAction::SetFalse,
            Action::Count => clap::ArgAction::Count,
        });

        if let Some(nargs) = opts.nargs {
            arg = match nargs {
                Nargs::Exactly(n) => arg.num_args(n),
                Nargs::Optional => arg.num_args(0..=1),
                Nargs::ZeroOrMore => arg.num_args(0..),
                Nargs::OneOrMore => arg.num_args(1..),
            };
        }

        if let Some(help) = &opts.help {
            arg = arg.help(help.clone());
        }
        if let Some(metavar) = &opts.metavar {
            arg = arg.value_name(metavar.clone());
        }
        if !opts.choices.is_empty() {
            let values: Vec<PossibleValue> = opts
                .choices
                .iter()
                .map(|choice| PossibleValue::new(choice.clone()))
                .collect();
            arg = arg.value_parser(PossibleValuesParser::new(values));
        }
        if !opts.defaults.is_empty() {
            arg = arg.default_values(opts.defaults.clone());
        }

        let needs_value = !matches!(opts.nargs, Some(Nargs::Optional | Nargs::ZeroOrMore));
        let required = opts.required || (positional && needs_value && opts.defaults.is_empty());

        Ok(arg.required(required))
    }
}

/// Callback editing a command's sub-parser directly
pub type Configurator = Arc<dyn Fn(clap::Command) -> clap::Command + Send + Sync>;

/// Argument specification of a command
#[derive(Clone)]
pub enum ArgumentSpec {
    Declarative(Vec<ArgumentDecl>),
    Configurator(Configurator),
}

impl ArgumentSpec {
    /// Spec that adds no arguments
    #[must_use]
    pub const fn none() -> Self {
        Self::Declarative(Vec::new())
    }

    /// Wrap a configurator callback
    pub fn configure<F>(f: F) -> Self
    where
        F: Fn(clap::Command) -> clap::Command + Send + Sync + 'static,
    {
        Self::Configurator(Arc::new(f))
    }

    /// Add the declared arguments to `parser`
    ///
    /// Declarations may not reuse an id or flag, including ones already on
    /// `parser` and its help flag.
    pub fn apply(&self, command: &str, parser: clap::Command) -> Result<clap::Command> {
        match self {
            Self::Declarative(decls) => {
                let mut claimed = Claimed::from_parser(&parser);
                decls.iter().try_fold(parser, |parser, decl| {
                    let arg = decl.to_arg(command)?;
                    claimed.claim(command, &arg)?;
                    Ok(parser.arg(arg))
                })
            }
            Self::Configurator(configure) => Ok(configure(parser)),
        }
    }
}

/// Ids and flags in use on a sub-parser
#[derive(Debug, Default)]
struct Claimed {
    ids: HashSet<String>,
    shorts: HashSet<char>,
    longs: HashSet<String>,
}

impl Claimed {
    fn from_parser(parser: &clap::Command) -> Self {
        let mut claimed = Self::default();
        if !parser.is_disable_help_flag_set() {
            claimed.ids.insert("help".to_string());
            claimed.shorts.insert('h');
            claimed.longs.insert("help".to_string());
        }
        for arg in parser.get_arguments() {
            claimed.ids.insert(arg.get_id().as_str().to_string());
            claimed.shorts.extend(arg.get_short());
            claimed.longs.extend(arg.get_long().map(str::to_string));
        }
        claimed
    }

    fn claim(&mut self, command: &str, arg: &clap::Arg) -> Result<()> {
        let taken = |what: String| {
            CommandError::invalid_argument_spec(command, format!("{what} is already in use"))
        };

        let id = arg.get_id().as_str().to_string();
        if !self.ids.insert(id.clone()) {
            return Err(taken(format!("argument id {id:?}")));
        }
        if let Some(short) = arg.get_short() {
            if !self.shorts.insert(short) {
                return Err(taken(format!("flag -{short}")));
            }
        }
        if let Some(long) = arg.get_long() {
            if !self.longs.insert(long.to_string()) {
                return Err(taken(format!("flag --{long}")));
            }
        }
        Ok(())
    }
}

impl Default for ArgumentSpec {
    fn default() -> Self {
        Self::none()
    }
}

impl fmt::Debug for ArgumentSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Declarative(decls) => f.debug_tuple("Declarative").field(decls).finish(),
            Self::Configurator(_) => f.write_str("Configurator(..)"),
        }
    }
}

impl From<Vec<ArgumentDecl>> for ArgumentSpec {
    fn from(decls: Vec<ArgumentDecl>) -> Self {
        Self::Declarative(decls)
    }
}
