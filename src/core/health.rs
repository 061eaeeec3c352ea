//! Health-check gate
//!
//! Optional readiness check run before a command. Failed checks are retried
//! with exponential backoff starting from a random delay; when every attempt
//! fails the command is not run.

use crate::utils::process::command_exists;
use std::{fmt, thread, time::Duration};
use tracing::{error, info, instrument, warn};

/// Highest accepted retry count
pub const MAX_RETRY: u8 = 10;
/// Retry count used when none is given
pub const DEFAULT_RETRY: u8 = 5;
/// Default upper bound of the first backoff delay
pub const DEFAULT_MAX_INITIAL_DELAY: Duration = Duration::from_secs(1);

/// Readiness predicate supplied by the application
pub trait HealthCheck {
    /// Name used in log messages
    fn name(&self) -> &str;

    /// Whether the environment is ready
    fn check(&self) -> bool;
}

/// Adapter turning a closure into a [`HealthCheck`]
pub struct FnCheck<F> {
    name: String,
    check: F,
}

impl<F: Fn() -> bool> FnCheck<F> {
    pub fn new(name: impl Into<String>, check: F) -> Self {
        Self {
            name: name.into(),
            check,
        }
    }
}

impl<F: Fn() -> bool> HealthCheck for FnCheck<F> {
    fn name(&self) -> &str {
        &self.name
    }

    fn check(&self) -> bool {
        (self.check)()
    }
}

/// Passes when all of the given executables are found on `PATH`
#[derive(Debug, Clone)]
pub struct ExecutablesOnPath {
    programs: Vec<String>,
}

impl ExecutablesOnPath {
    #[must_use]
    pub const fn new(programs: Vec<String>) -> Self {
        Self { programs }
    }
}

impl HealthCheck for ExecutablesOnPath {
    fn name(&self) -> &str {
        "executables on PATH"
    }

    fn check(&self) -> bool {
        let missing: Vec<&str> = self
            .programs
            .iter()
            .map(String::as_str)
            .filter(|program| !command_exists(program))
            .collect();

        if !missing.is_empty() {
            warn!("Missing executables: {}", missing.join(", "));
        }
        missing.is_empty()
    }
}

/// Checks composed in order; healthy only when every check passes
#[derive(Default)]
pub struct AllChecks {
    checks: Vec<Box<dyn HealthCheck>>,
}

impl AllChecks {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, check: Box<dyn HealthCheck>) {
        self.checks.push(check);
    }

    pub fn is_empty(&self) -> bool {
        self.checks.is_empty()
    }
}

impl HealthCheck for AllChecks {
    fn name(&self) -> &str {
        "all checks"
    }

    fn check(&self) -> bool {
        // Short-circuits: later checks only run once earlier ones pass
        self.checks.iter().all(|check| {
            let healthy = check.check();
            if !healthy {
                warn!("Health check '{}' failed", check.name());
            }
            healthy
        })
    }
}

/// Gate state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateState {
    NotStarted,
    Checking,
    Healthy,
    Failed,
}

impl fmt::Display for GateState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::NotStarted => "not started",
            Self::Checking => "checking",
            Self::Healthy => "healthy",
            Self::Failed => "failed",
        })
    }
}

/// Result of running the gate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GateOutcome {
    pub state: GateState,
    /// Number of times the check was called
    pub attempts: u8,
}

impl GateOutcome {
    #[must_use]
    pub const fn is_healthy(&self) -> bool {
        matches!(self.state, GateState::Healthy)
    }

    /// Failed attempts that were followed by another try
    #[must_use]
    pub const fn retries(&self) -> u8 {
        match self.state {
            GateState::Healthy => self.attempts.saturating_sub(1),
            _ => self.attempts,
        }
    }
}

/// Delays between failed attempts: a jittered first delay, doubling after each
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    next: Duration,
}

impl Backoff {
    /// First delay is `max_initial_delay` scaled by `jitter`, clamped to `0.0..=1.0`
    #[must_use]
    pub fn new(max_initial_delay: Duration, jitter: f64) -> Self {
        let jitter = if jitter.is_nan() { 0.0 } else { jitter.clamp(0.0, 1.0) };
        Self {
            next: max_initial_delay.mul_f64(jitter),
        }
    }

    /// Backoff with a random first delay up to `max_initial_delay`
    #[must_use]
    pub fn random(max_initial_delay: Duration) -> Self {
        Self::new(max_initial_delay, rand::random::<f64>())
    }
}

impl Iterator for Backoff {
    type Item = Duration;

    fn next(&mut self) -> Option<Duration> {
        let delay = self.next;
        self.next = delay.saturating_mul(2);
        Some(delay)
    }
}

/// Retry loop around a [`HealthCheck`]
#[derive(Debug, Clone)]
pub struct HealthGate {
    retry: u8,
    skip: bool,
    max_initial_delay: Duration,
    state: GateState,
}

impl HealthGate {
    /// Gate making up to `retry` attempts; values above [`MAX_RETRY`] are clamped
    #[must_use]
    pub fn new(retry: u8) -> Self {
        Self {
            retry: retry.min(MAX_RETRY),
            skip: false,
            max_initial_delay: DEFAULT_MAX_INITIAL_DELAY,
            state: GateState::NotStarted,
        }
    }

    #[must_use]
    pub const fn skip(mut self, skip: bool) -> Self {
        self.skip = skip;
        self
    }

    /// Upper bound of the random first delay
    #[must_use]
    pub const fn max_initial_delay(mut self, delay: Duration) -> Self {
        self.max_initial_delay = delay;
        self
    }

    pub const fn state(&self) -> GateState {
        self.state
    }

    pub const fn retry(&self) -> u8 {
        self.retry
    }

    pub const fn is_disabled(&self) -> bool {
        self.skip || self.retry == 0
    }

    /// Run the check until it passes or the attempts run out
    pub fn run(&mut self, check: &dyn HealthCheck) -> GateOutcome {
        self.run_with(check, thread::sleep)
    }

    /// Like [`HealthGate::run`], waiting between attempts with `sleep`
    #[instrument(skip_all, fields(check = check.name(), retry = self.retry))]
    pub fn run_with<S>(&mut self, check: &dyn HealthCheck, mut sleep: S) -> GateOutcome
    where
        S: FnMut(Duration),
    {
        if self.is_disabled() {
            self.state = GateState::Healthy;
            return GateOutcome {
                state: self.state,
                attempts: 0,
            };
        }

        info!("Performing health check...");
        self.state = GateState::Checking;
        let mut delays = Backoff::random(self.max_initial_delay);
        let mut attempts = 0;

        while attempts < self.retry {
            attempts += 1;
            if check.check() {
                self.state = GateState::Healthy;
                return GateOutcome {
                    state: self.state,
                    attempts,
                };
            }
            if attempts == self.retry {
                break;
            }

            let delay = delays.next().unwrap_or(self.max_initial_delay);
            warn!(
                "Health check failed, retrying in {:?} ({}/{})",
                delay, attempts, self.retry
            );
            sleep(delay);
        }

        error!("Retry attempts exceeded, health check failed");
        self.state = GateState::Failed;
        GateOutcome {
            state: self.state,
            attempts,
        }
    }
}

impl Default for HealthGate {
    fn default() -> Self {
        Self::new(DEFAULT_RETRY)
    }
}
