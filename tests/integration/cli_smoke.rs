//! Smoke tests for the line console binary.

use assert_cmd::Command;
use predicates::prelude::*;

fn switchboard(data_dir: &std::path::Path) -> Command {
    let mut cmd = Command::cargo_bin("switchboard").unwrap();
    cmd.arg("--data-dir").arg(data_dir).env_remove("RUST_LOG");
    cmd
}

#[test]
fn test_console_tab_commands() {
    let dir = tempfile::tempdir().unwrap();
    switchboard(dir.path())
        .write_stdin("open room r1 General\nopen dm d1\nsub 1 agent a1 Reviewer\nnext\ntabs\nclose 1\ntabs\nquit\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("switchboard ready"))
        .stdout(predicate::str::contains("* 2 direct_message:d1 [direct_message:d1]"))
        .stdout(predicate::str::contains("Reviewer [agent:a1]"))
        .stdout(predicate::str::contains("closed 2 tab(s)"))
        .stdout(predicate::str::contains("selected direct_message:d1"));

    assert!(dir.path().join("config.toml").exists());
    assert!(dir.path().join("logs").join("switchboard.log").exists());
}

#[test]
fn test_console_invoke_with_echo_host() {
    let dir = tempfile::tempdir().unwrap();
    switchboard(dir.path())
        .arg("--echo-host")
        .write_stdin("invoke echo say {\"text\": \"hi\"}\ninvoke echo say {\"error\": \"nope\"}\nquit\n")
        .assert()
        .success()
        .stdout(predicate::str::contains(r#""text":"hi""#))
        .stdout(predicate::str::contains("error: Tool execution failed: nope"));
}

#[test]
fn test_console_without_host_reports_unavailable() {
    let dir = tempfile::tempdir().unwrap();
    switchboard(dir.path())
        .write_stdin("invoke echo say\nbogus\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("Tool executor unavailable"))
        .stdout(predicate::str::contains("unrecognized command"));
}

#[test]
fn test_invalid_config_file_fails() {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("custom.toml");
    std::fs::write(&config, "[tabs]\nmax_tabs = 0\n").unwrap();

    switchboard(dir.path())
        .arg("--config")
        .arg(&config)
        .write_stdin("quit\n")
        .assert()
        .failure()
        .stderr(predicate::str::contains("max_tabs"));
}
