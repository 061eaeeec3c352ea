//! Command building
//!
//! Resolves a command name and caller arguments into the ordered list of
//! units the executor runs.

use crate::{
    core::{
        invocation::{Invocation, Kwargs},
        registry::{CommandKind, Handler, InProcessFn, Registry},
    },
    error::{CommandError, Result},
};
use std::{collections::BTreeMap, fmt, sync::Arc};
use tracing::{debug, instrument};

/// Deferred call of an in-process handler with its arguments bound
#[derive(Clone)]
pub struct BoundCall {
    target: String,
    handler: Arc<InProcessFn>,
    invocation: Invocation,
}

impl BoundCall {
    /// Type name of the bound handler
    pub fn target(&self) -> &str {
        &self.target
    }

    pub const fn invocation(&self) -> &Invocation {
        &self.invocation
    }

    /// Run the handler
    pub fn call(&self) -> anyhow::Result<i32> {
        (self.handler)(&self.invocation)
    }
}

impl fmt::Debug for BoundCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoundCall")
            .field("target", &self.target)
            .field("invocation", &self.invocation)
            .finish_non_exhaustive()
    }
}

/// One runnable step of a command
#[derive(Debug, Clone)]
pub enum ExecutableUnit {
    /// External process argument vector, program first
    Argv(Vec<String>),
    /// In-process call
    Call(BoundCall),
}

impl fmt::Display for ExecutableUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Argv(argv) => f.write_str(&shell_words::join(argv)),
            Self::Call(call) => f.write_str(call.target()),
        }
    }
}

/// Output of the builder
#[derive(Debug, Clone)]
pub struct BuiltCommand {
    pub units: Vec<ExecutableUnit>,
    pub kind: CommandKind,
}

/// Builds commands from the registry, falling back to configured default arguments
pub struct CommandBuilder<'a> {
    registry: &'a Registry,
    default_args: Option<&'a BTreeMap<String, String>>,
}

impl<'a> CommandBuilder<'a> {
    #[must_use]
    pub const fn new(registry: &'a Registry) -> Self {
        Self {
            registry,
            default_args: None,
        }
    }

    /// Use `defaults` when a command is built without positional arguments
    #[must_use]
    pub const fn with_default_args(mut self, defaults: &'a BTreeMap<String, String>) -> Self {
        self.default_args = Some(defaults);
        self
    }

    /// Default arguments of `name`, split with shell quoting rules
    pub fn default_args_for(&self, name: &str) -> Result<Vec<String>> {
        let Some(raw) = self.default_args.and_then(|defaults| defaults.get(name)) else {
            return Ok(Vec::new());
        };

        shell_words::split(raw).map_err(|e| CommandError::Settings {
            message: format!("default arguments for {name} are not valid shell words: {raw:?}"),
            path: None,
            source: Some(Box::new(e)),
        })
    }

    /// Build `name` with the given positional and keyword arguments
    #[instrument(skip(self, args, kwargs))]
    pub fn build(&self, name: &str, args: &[String], kwargs: &Kwargs) -> Result<BuiltCommand> {
        let entry = self.registry.lookup(name)?;

        let args = if args.is_empty() {
            let defaults = self.default_args_for(name)?;
            if !defaults.is_empty() {
                debug!("Using default arguments: {:?}", defaults);
            }
            defaults
        } else {
            args.to_vec()
        };
        let invocation = Invocation::new(args, kwargs.clone());

        let units = match entry.handler() {
            Handler::InProcess(handler) => vec![ExecutableUnit::Call(BoundCall {
                target: entry.target().to_string(),
                handler: Arc::clone(handler),
                invocation,
            })],
            Handler::External(handler) => {
                let argvs = handler(&invocation).map_err(|e| CommandError::build(name, e))?;
                if let Some(index) = argvs.iter().position(Vec::is_empty) {
                    return Err(CommandError::EmptyInvocation {
                        command: name.to_string(),
                        index,
                    });
                }
                argvs.into_iter().map(ExecutableUnit::Argv).collect()
            }
        };

        debug!("Built {} unit(s) for {} command", units.len(), entry.kind());
        Ok(BuiltCommand {
            units,
            kind: entry.kind(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{invocation::KwValue, registry::CommandEntry};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn argv(unit: &ExecutableUnit) -> &[String] {
        match unit {
            ExecutableUnit::Argv(argv) => argv,
            ExecutableUnit::Call(_) => panic!("Expected argv unit"),
        }
    }

    fn registry() -> Registry {
        let mut registry = Registry::new();
        registry
            .register(CommandEntry::external("pytest", |inv| {
                let mut tests = vec!["pytest".to_string()];
                tests.extend(inv.args.iter().cloned());
                Ok(vec![vec!["coverage".to_string(), "erase".to_string()], tests])
            }))
            .unwrap();
        registry
            .register(CommandEntry::external("dist", |inv| {
                let version = inv
                    .kwargs
                    .get_str("version")
                    .ok_or_else(|| anyhow::anyhow!("missing version"))?;
                Ok(vec![
                    shell_words::split("rm -rf dist")?,
                    shell_words::split(&format!("bumpversion {version}"))?,
                ])
            }))
            .unwrap();
        registry
    }

    #[test]
    fn test_build_unknown_command() {
        let registry = Registry::new();
        let err = CommandBuilder::new(&registry)
            .build("nope", &[], &Kwargs::new())
            .unwrap_err();
        assert!(matches!(err, CommandError::WrongCommand { .. }));
    }

    #[test]
    fn test_build_external() {
        let registry = registry();
        let built = CommandBuilder::new(&registry)
            .build("pytest", &["-x".to_string()], &Kwargs::new())
            .unwrap();

        assert_eq!(built.kind, CommandKind::External);
        assert_eq!(built.units.len(), 2);
        assert_eq!(argv(&built.units[0]), ["coverage", "erase"]);
        assert_eq!(argv(&built.units[1]), ["pytest", "-x"]);
    }

    #[test]
    fn test_build_external_from_kwargs() {
        let registry = registry();
        let kwargs = Kwargs::new().with("version", KwValue::Value("minor".to_string()));
        let built = CommandBuilder::new(&registry)
            .build("dist", &[], &kwargs)
            .unwrap();
        assert_eq!(argv(&built.units[1]), ["bumpversion", "minor"]);

        let err = CommandBuilder::new(&registry)
            .build("dist", &[], &Kwargs::new())
            .unwrap_err();
        assert!(matches!(err, CommandError::Build { .. }));
    }

    #[test]
    fn test_default_args_apply_only_without_explicit_args() {
        let registry = registry();
        let defaults = BTreeMap::from([("pytest".to_string(), "-v 'tests dir'".to_string())]);
        let builder = CommandBuilder::new(&registry).with_default_args(&defaults);

        let built = builder.build("pytest", &[], &Kwargs::new()).unwrap();
        assert_eq!(argv(&built.units[1]), ["pytest", "-v", "tests dir"]);

        let built = builder
            .build("pytest", &["-x".to_string()], &Kwargs::new())
            .unwrap();
        assert_eq!(argv(&built.units[1]), ["pytest", "-x"]);
    }

    #[test]
    fn test_malformed_default_args() {
        let registry = registry();
        let defaults = BTreeMap::from([("pytest".to_string(), "'unterminated".to_string())]);
        let err = CommandBuilder::new(&registry)
            .with_default_args(&defaults)
            .build("pytest", &[], &Kwargs::new())
            .unwrap_err();
        assert!(matches!(err, CommandError::Settings { .. }));
    }

    #[test]
    fn test_in_process_is_deferred() {
        static CALLS: AtomicUsize = AtomicUsize::new(0);

        let mut registry = Registry::new();
        registry
            .register(CommandEntry::in_process("test_module", |inv| {
                CALLS.fetch_add(1, Ordering::SeqCst);
                Ok(i32::try_from(inv.args.len())?)
            }))
            .unwrap();
        let defaults = BTreeMap::from([("test_module".to_string(), "-v".to_string())]);

        let built = CommandBuilder::new(&registry)
            .with_default_args(&defaults)
            .build("test_module", &[], &Kwargs::new())
            .unwrap();
        assert_eq!(built.kind, CommandKind::InProcess);
        assert_eq!(built.units.len(), 1);
        assert_eq!(CALLS.load(Ordering::SeqCst), 0);

        let ExecutableUnit::Call(call) = &built.units[0] else {
            panic!("Expected call unit");
        };
        assert_eq!(call.invocation().args, ["-v"]);
        assert_eq!(call.call().unwrap(), 1);
        assert_eq!(CALLS.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_empty_invocation_is_rejected() {
        let mut registry = Registry::new();
        registry
            .register(CommandEntry::external("broken", |_| {
                Ok(vec![vec!["echo".to_string()], vec![]])
            }))
            .unwrap();

        let err = CommandBuilder::new(&registry)
            .build("broken", &[], &Kwargs::new())
            .unwrap_err();
        assert!(matches!(err, CommandError::EmptyInvocation { index: 1, .. }));
    }
}
