//! Process execution utilities
//!
//! Spawns external commands with inherited stdio and waits for them while
//! keeping terminal interrupts away from the parent. The first interrupt is a
//! stop request for the child; it is only sent on when the terminal did not
//! already deliver it. The second one kills the child.

use std::{
    io,
    path::{Path, PathBuf},
    process::{Child, Command, ExitStatus, Stdio},
    thread,
    time::{Duration, Instant},
};
use tracing::{debug, error, info, instrument, warn};

/// Default time to wait for a killed child to be reaped
pub const DEFAULT_KILL_TIMEOUT: Duration = Duration::from_secs(5);

/// Return code when the program cannot be found
pub const EXIT_NOT_FOUND: i32 = 127;
/// Return code when the program exists but cannot be started
pub const EXIT_NOT_EXECUTABLE: i32 = 126;
/// Return code when a killed child could not be reaped in time
pub const EXIT_KILLED: i32 = 128 + 9;

const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// What to do with the child on the n-th interrupt received while waiting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterruptAction {
    /// Pass the interrupt on and keep waiting
    Forward,
    /// Kill the child and wait for it with a deadline
    Kill,
    /// Already killing, nothing more to do
    Ignore,
}

impl InterruptAction {
    /// Action for the `count`-th interrupt, starting at 1
    #[must_use]
    pub const fn for_count(count: u32) -> Self {
        match count {
            0 | 1 => Self::Forward,
            2 => Self::Kill,
            _ => Self::Ignore,
        }
    }
}

/// How an interrupt caught while waiting reaches the child
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// The child is in the terminal's foreground group and got it directly
    Terminal,
    /// The parent has to send it on
    Forward,
}

impl Delivery {
    /// Delivery for a child in process group `child` while `foreground` owns the terminal
    #[must_use]
    pub fn for_groups(child: Option<i32>, foreground: Option<i32>) -> Self {
        match (child, foreground) {
            (Some(child), Some(foreground)) if child == foreground => Self::Terminal,
            _ => Self::Forward,
        }
    }
}

/// Utility for running external processes in the foreground
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    env: Vec<(String, String)>,
    kill_timeout: Duration,
}

impl ProcessRunner {
    /// Create a new process runner
    #[must_use]
    pub const fn new() -> Self {
        Self {
            env: Vec::new(),
            kill_timeout: DEFAULT_KILL_TIMEOUT,
        }
    }

    /// Environment variables added to every spawned process
    #[must_use]
    pub fn with_env(mut self, env: Vec<(String, String)>) -> Self {
        self.env = env;
        self
    }

    #[must_use]
    pub const fn with_kill_timeout(mut self, kill_timeout: Duration) -> Self {
        self.kill_timeout = kill_timeout;
        self
    }

    pub fn env(&self) -> &[(String, String)] {
        &self.env
    }

    /// Run `argv` with inherited stdio and return its exit code
    ///
    /// Spawn failures are reported as 127 (not found) or 126 (not startable).
    /// A child terminated by a signal yields 128 plus the signal number.
    #[instrument(skip(self))]
    pub fn run(&self, argv: &[String]) -> i32 {
        let Some((program, args)) = argv.split_first() else {
            error!("Refusing to run an empty command");
            return EXIT_NOT_FOUND;
        };

        let mut cmd = Command::new(program);
        cmd.args(args)
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit());
        for (key, value) in &self.env {
            cmd.env(key, value);
        }

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                error!("Command not found: {}", program);
                return EXIT_NOT_FOUND;
            }
            Err(e) => {
                error!("Failed to execute {}: {}", program, e);
                return EXIT_NOT_EXECUTABLE;
            }
        };
        debug!("Spawned {} with pid {}", program, child.id());

        match self.wait(&mut child, program) {
            Ok(Some(status)) => exit_code(status),
            Ok(None) => {
                error!(
                    "{} did not exit within {:?} after being killed",
                    program, self.kill_timeout
                );
                EXIT_KILLED
            }
            Err(e) => {
                error!("Failed waiting for {}: {}", program, e);
                // Best effort, the child may already be gone
                let _ = child.kill();
                let _ = child.wait();
                EXIT_KILLED
            }
        }
    }

    /// Wait for `child`, handling interrupts; `None` when the kill deadline passed
    #[cfg(unix)]
    fn wait(&self, child: &mut Child, program: &str) -> io::Result<Option<ExitStatus>> {
        let interrupts = InterruptGuard::install()?;
        let delivery = delivery_for(child);
        debug!("Interrupts reach {} via {:?}", program, delivery);
        self.wait_with(child, program, delivery, || interrupts.take())
    }

    /// Poll `child` until it exits, asking `interrupted` between polls
    #[cfg(unix)]
    fn wait_with<F>(
        &self,
        child: &mut Child,
        program: &str,
        delivery: Delivery,
        mut interrupted: F,
    ) -> io::Result<Option<ExitStatus>>
    where
        F: FnMut() -> bool,
    {
        let mut count = 0;
        let mut kill_deadline: Option<Instant> = None;

        loop {
            if let Some(status) = child.try_wait()? {
                return Ok(Some(status));
            }

            if interrupted() {
                count += 1;
                match (InterruptAction::for_count(count), delivery) {
                    (InterruptAction::Forward, Delivery::Terminal) => {
                        info!("Interrupt received, waiting for {} to stop", program);
                    }
                    (InterruptAction::Forward, Delivery::Forward) => {
                        info!("Interrupt received, forwarding to {}", program);
                        forward_interrupt(child);
                    }
                    (InterruptAction::Kill, _) => {
                        warn!("Second interrupt received, killing {}", program);
                        child.kill()?;
                        kill_deadline = Some(Instant::now() + self.kill_timeout);
                    }
                    (InterruptAction::Ignore, _) => debug!("Kill already in progress"),
                }
            }

            if kill_deadline.is_some_and(|deadline| Instant::now() >= deadline) {
                return Ok(None);
            }

            thread::sleep(POLL_INTERVAL);
        }
    }

    #[cfg(not(unix))]
    fn wait(&self, child: &mut Child, _program: &str) -> io::Result<Option<ExitStatus>> {
        child.wait().map(Some)
    }
}

impl Default for ProcessRunner {
    fn default() -> Self {
        Self::new()
    }
}

/// Check whether `program` can be resolved to an executable file
#[instrument]
pub fn command_exists(program: &str) -> bool {
    let exists = if program.contains(std::path::MAIN_SEPARATOR) {
        is_executable(Path::new(program))
    } else {
        std::env::var_os("PATH").is_some_and(|paths| {
            std::env::split_paths(&paths)
                .map(|dir| dir.join(program))
                .any(|candidate: PathBuf| is_executable(&candidate))
        })
    };

    debug!("Command '{}' exists: {}", program, exists);
    exists
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;

    path.metadata()
        .is_ok_and(|meta| meta.is_file() && meta.permissions().mode() & 0o111 != 0)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

fn exit_code(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }

    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }

    1
}

#[cfg(unix)]
fn delivery_for(child: &Child) -> Delivery {
    use nix::unistd::{Pid, getpgid, tcgetpgrp};

    let child_group = i32::try_from(child.id())
        .ok()
        .and_then(|pid| getpgid(Some(Pid::from_raw(pid))).ok())
        .map(Pid::as_raw);
    // Fails when stdin is not a terminal; nothing delivers interrupts then
    let foreground = tcgetpgrp(io::stdin()).ok().map(Pid::as_raw);

    Delivery::for_groups(child_group, foreground)
}

#[cfg(unix)]
fn forward_interrupt(child: &Child) {
    use nix::{
        sys::signal::{Signal, kill},
        unistd::Pid,
    };

    let Ok(pid) = i32::try_from(child.id()) else {
        return;
    };
    if let Err(e) = kill(Pid::from_raw(pid), Signal::SIGINT) {
        debug!("Could not forward interrupt to pid {}: {}", pid, e);
    }
}

/// Captures SIGINT for as long as it is alive
#[cfg(unix)]
struct InterruptGuard {
    flag: std::sync::Arc<std::sync::atomic::AtomicBool>,
    id: signal_hook::SigId,
}

#[cfg(unix)]
impl InterruptGuard {
    fn install() -> io::Result<Self> {
        let flag = std::sync::Arc::new(std::sync::atomic::AtomicBool::new(false));
        let id = signal_hook::flag::register(
            signal_hook::consts::SIGINT,
            std::sync::Arc::clone(&flag),
        )?;
        Ok(Self { flag, id })
    }

    /// Whether an interrupt arrived since the last call
    fn take(&self) -> bool {
        self.flag.swap(false, std::sync::atomic::Ordering::SeqCst)
    }
}

#[cfg(unix)]
impl Drop for InterruptGuard {
    fn drop(&mut self) {
        signal_hook::low_level::unregister(self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn argv(parts: &[&str]) -> Vec<String> {
        parts.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn test_run_simple_command() {
        let runner = ProcessRunner::new();
        assert_eq!(runner.run(&argv(&["echo", "hello"])), 0);
    }

    #[test]
    fn test_run_failing_command() {
        let runner = ProcessRunner::default();
        assert_eq!(runner.run(&argv(&["sh", "-c", "exit 3"])), 3);
    }

    #[test]
    fn test_run_missing_command() {
        let runner = ProcessRunner::new();
        assert_eq!(
            runner.run(&argv(&["nonexistent_command_12345"])),
            EXIT_NOT_FOUND
        );
        assert_eq!(runner.run(&[]), EXIT_NOT_FOUND);
    }

    #[cfg(unix)]
    #[test]
    fn test_signal_exit_code() {
        let runner = ProcessRunner::new();
        assert_eq!(runner.run(&argv(&["sh", "-c", "kill -TERM $$"])), 128 + 15);
    }

    #[test]
    fn test_run_with_env() {
        let runner = ProcessRunner::new().with_env(vec![(
            "CMDRIG_TEST_VAR".to_string(),
            "test_value".to_string(),
        )]);
        let code = runner.run(&argv(&["sh", "-c", "test \"$CMDRIG_TEST_VAR\" = test_value"]));
        assert_eq!(code, 0);
    }

    #[test]
    fn test_interrupt_escalation() {
        assert_eq!(InterruptAction::for_count(1), InterruptAction::Forward);
        assert_eq!(InterruptAction::for_count(2), InterruptAction::Kill);
        assert_eq!(InterruptAction::for_count(3), InterruptAction::Ignore);
    }

    #[test]
    fn test_delivery_for_groups() {
        assert_eq!(Delivery::for_groups(Some(7), Some(7)), Delivery::Terminal);
        assert_eq!(Delivery::for_groups(Some(7), Some(8)), Delivery::Forward);
        assert_eq!(Delivery::for_groups(Some(7), None), Delivery::Forward);
        assert_eq!(Delivery::for_groups(None, None), Delivery::Forward);
    }

    /// Reports an interrupt on the given polls, counting from 1
    #[cfg(unix)]
    fn interrupts_at(polls: &'static [u32]) -> impl FnMut() -> bool {
        let mut poll = 0;
        move || {
            poll += 1;
            polls.contains(&poll)
        }
    }

    #[cfg(unix)]
    fn spawn_sh(script: &str) -> Child {
        Command::new("sh").args(["-c", script]).spawn().unwrap()
    }

    #[cfg(unix)]
    #[test]
    fn test_first_interrupt_is_forwarded() {
        let dir = tempfile::TempDir::new().unwrap();
        let log = dir.path().join("log");
        let mut child = spawn_sh(&format!(
            "trap 'echo INT >> {}; exit 5' INT; while :; do sleep 0.05; done",
            log.display()
        ));

        // Leave the shell time to install its trap
        let status = ProcessRunner::new()
            .wait_with(&mut child, "sh", Delivery::Forward, interrupts_at(&[25]))
            .unwrap()
            .unwrap();
        assert_eq!(exit_code(status), 5);
        assert_eq!(std::fs::read_to_string(&log).unwrap(), "INT\n");
    }

    #[cfg(unix)]
    #[test]
    fn test_terminal_interrupt_is_not_sent_again() {
        let dir = tempfile::TempDir::new().unwrap();
        let log = dir.path().join("log");
        let mut child = spawn_sh(&format!(
            "trap 'echo INT >> {}' INT; sleep 0.5",
            log.display()
        ));

        let status = ProcessRunner::new()
            .wait_with(&mut child, "sh", Delivery::Terminal, interrupts_at(&[5]))
            .unwrap()
            .unwrap();
        assert_eq!(exit_code(status), 0);
        assert!(!log.exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_second_interrupt_kills() {
        let mut child = spawn_sh("trap '' INT; sleep 5");

        let started = Instant::now();
        let status = ProcessRunner::new()
            .wait_with(&mut child, "sh", Delivery::Forward, interrupts_at(&[25, 26, 27]))
            .unwrap()
            .unwrap();
        assert_eq!(exit_code(status), EXIT_KILLED);
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[cfg(unix)]
    #[test]
    fn test_kill_deadline() {
        let mut child = spawn_sh("trap '' INT; sleep 5");

        let status = ProcessRunner::new()
            .with_kill_timeout(Duration::ZERO)
            .wait_with(&mut child, "sh", Delivery::Forward, interrupts_at(&[25, 26]))
            .unwrap();
        assert!(status.is_none());
        child.wait().unwrap();
    }

    #[test]
    fn test_command_exists() {
        assert!(command_exists("sh"));
        assert!(!command_exists("nonexistent_command_12345"));
        assert!(!command_exists("/nonexistent/dir/sh"));
    }
}
