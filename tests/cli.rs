use assert_cmd::Command;
use predicates::prelude::*;
use std::{fs, path::Path};
use tempfile::TempDir;

fn settings(dir: &TempDir, content: &str) -> String {
    let path = dir.path().join("settings.toml");
    fs::write(&path, content).unwrap();
    path.to_string_lossy().into_owned()
}

fn cmdrig() -> Command {
    let mut cmd = Command::cargo_bin("cmdrig").unwrap();
    cmd.env_remove("CMDRIG_SETTINGS");
    cmd
}

fn log_line(path: &Path) -> String {
    format!("sh -c 'echo $0 >> {}'", path.display())
}

#[test]
fn test_runs_steps_in_order() {
    let dir = TempDir::new().unwrap();
    let log = dir.path().join("log");
    let settings = settings(
        &dir,
        &format!(
            "[commands.both]\nrun = [\"{0} a\", \"{0} b\"]\n",
            log_line(&log)
        ),
    );

    cmdrig().args(["-s", &settings, "both"]).assert().success();
    assert_eq!(fs::read_to_string(&log).unwrap(), "a\nb\n");
}

#[test]
fn test_failing_step_stops_and_sets_exit_code() {
    let dir = TempDir::new().unwrap();
    let log = dir.path().join("log");
    let settings = settings(
        &dir,
        &format!(
            "[commands.broken]\nrun = [\"sh -c 'exit 3'\", \"{} never\"]\n",
            log_line(&log)
        ),
    );

    cmdrig()
        .args(["-s", &settings, "broken"])
        .assert()
        .code(3)
        .stderr(predicate::str::contains("Return code: 3"));
    assert!(!log.exists());
}

#[test]
fn test_dry_run_runs_nothing() {
    let dir = TempDir::new().unwrap();
    let log = dir.path().join("log");
    let settings = settings(
        &dir,
        &format!("[commands.write]\nrun = [\"{} a\"]\n", log_line(&log)),
    );

    cmdrig()
        .args(["--dry-run", "-s", &settings, "write"])
        .assert()
        .success()
        .stderr(predicate::str::contains("Would run"));
    assert!(!log.exists());
}

#[test]
fn test_default_args_and_passthrough() {
    let dir = TempDir::new().unwrap();
    let settings = settings(
        &dir,
        "[default_args]\nsay = \"'hello world'\"\n\n[commands.say]\nrun = [\"echo\"]\n",
    );

    cmdrig()
        .args(["-s", &settings, "say"])
        .assert()
        .success()
        .stdout("hello world\n");

    cmdrig()
        .args(["-s", &settings, "say", "-n", "bye"])
        .assert()
        .success()
        .stdout("bye");
}

#[test]
fn test_settings_from_environment() {
    let dir = TempDir::new().unwrap();
    let settings = settings(&dir, "[commands.ok]\nrun = [\"true\"]\n");

    cmdrig()
        .env("CMDRIG_SETTINGS", &settings)
        .arg("ok")
        .assert()
        .success();
}

#[test]
fn test_env_is_passed_to_commands() {
    let dir = TempDir::new().unwrap();
    let settings = settings(
        &dir,
        "[env]\nGREETING = \"hi\"\n\n[commands.greet]\nrun = [\"sh -c 'echo $GREETING'\"]\n",
    );

    cmdrig()
        .args(["-q", "-s", &settings, "greet"])
        .assert()
        .success()
        .stdout("hi\n");
}

#[test]
fn test_no_help_command_forwards_help() {
    let dir = TempDir::new().unwrap();
    let settings = settings(
        &dir,
        r#"[commands.show]
run = ["sh -c 'echo \"$@\"' show"]
no_help = true
"#,
    );

    cmdrig()
        .args(["-s", &settings, "show", "--help"])
        .assert()
        .success()
        .stdout("--help\n");
}

#[test]
fn test_health_check_failure() {
    let dir = TempDir::new().unwrap();
    let log = dir.path().join("log");
    let settings = settings(
        &dir,
        &format!(
            "[health_check]\nmax_initial_delay_ms = 0\nrequire = [\"nonexistent_command_12345\"]\n\n[commands.write]\nrun = [\"{} a\"]\n",
            log_line(&log)
        ),
    );

    cmdrig()
        .args(["-r", "2", "-s", &settings, "write"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("health check failed"));
    assert!(!log.exists());

    cmdrig()
        .args(["--skip-check", "-s", &settings, "write"])
        .assert()
        .success();
    assert_eq!(fs::read_to_string(&log).unwrap(), "a\n");
}

#[test]
fn test_invalid_settings_abort() {
    let dir = TempDir::new().unwrap();
    let settings = settings(&dir, "[commands.empty]\nrun = []\n");

    cmdrig()
        .args(["-s", &settings, "empty"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Settings error"));
}

#[test]
fn test_missing_subcommand() {
    cmdrig().assert().failure();
}

#[test]
fn test_unknown_subcommand() {
    let dir = TempDir::new().unwrap();
    let settings = settings(&dir, "[commands.ok]\nrun = [\"true\"]\n");

    cmdrig()
        .args(["-s", &settings, "nope"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("nope"));
}
