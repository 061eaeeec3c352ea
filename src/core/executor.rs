//! Command execution
//!
//! Runs the units of a built command in order and stops at the first
//! nonzero return code. In dry-run mode nothing is spawned or called and
//! every unit reports 0.

use crate::{
    core::builder::{BoundCall, BuiltCommand, ExecutableUnit},
    utils::process::ProcessRunner,
};
use tracing::{debug, error, info, instrument};

/// Return code used when an in-process handler fails with an error
pub const EXIT_HANDLER_ERROR: i32 = 1;

/// Runs built commands
#[derive(Debug, Clone, Default)]
pub struct Executor {
    dry_run: bool,
    runner: ProcessRunner,
}

impl Executor {
    #[must_use]
    pub const fn new(runner: ProcessRunner) -> Self {
        Self {
            dry_run: false,
            runner,
        }
    }

    #[must_use]
    pub const fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub const fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    /// Run every unit in order; the first nonzero return code is the result
    #[instrument(skip_all, fields(kind = %command.kind, units = command.units.len()))]
    pub fn execute(&self, command: &BuiltCommand) -> i32 {
        if !command.units.is_empty() {
            debug!("Running commands:");
        }

        for (i, unit) in command.units.iter().enumerate() {
            let code = self.run_unit(unit);
            debug!(
                "Unit {} of {} returned {}",
                i + 1,
                command.units.len(),
                code
            );

            if code != 0 {
                if i + 1 < command.units.len() {
                    debug!("Skipping {} remaining unit(s)", command.units.len() - i - 1);
                }
                return code;
            }
        }

        0
    }

    fn run_unit(&self, unit: &ExecutableUnit) -> i32 {
        match unit {
            ExecutableUnit::Call(call) => self.run_call(call),
            ExecutableUnit::Argv(argv) => self.run_argv(argv),
        }
    }

    fn run_call(&self, call: &BoundCall) -> i32 {
        debug!("- [In-process] {}", call.target());

        if self.dry_run {
            info!("Would call {}", call.target());
            return 0;
        }

        match call.call() {
            Ok(code) => code,
            Err(e) => {
                error!("{} failed: {:#}", call.target(), e);
                EXIT_HANDLER_ERROR
            }
        }
    }

    fn run_argv(&self, argv: &[String]) -> i32 {
        let line = shell_words::join(argv);
        debug!("- [External] {}", line);

        if self.dry_run {
            info!("Would run: {}", line);
            return 0;
        }

        info!("+ {}", line);
        self.runner.run(argv)
    }
}
