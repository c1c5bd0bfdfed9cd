#[path = "common/mod.rs"]
mod common;

use std::fs;

use assert_cmd::Command;
use common::{is_process_alive, wait_for_pid, wait_for_process_exit, write_config};
use predicates::str::contains;
use tempfile::tempdir;

fn srvctl() -> Command {
    Command::new(assert_cmd::cargo::cargo_bin!("srvctl"))
}

#[test]
fn unknown_action_fails_without_crashing() {
    let temp = tempdir().expect("failed to create tempdir");
    let config_path = write_config(temp.path(), "port: 19700\n");

    srvctl()
        .arg("server")
        .arg("bounce")
        .arg("--config")
        .arg(&config_path)
        .assert()
        .code(1)
        .stderr(contains("invalid action 'bounce'"));
}

#[test]
fn stop_and_reload_without_pid_file_report_not_running() {
    let temp = tempdir().expect("failed to create tempdir");
    let config_path = write_config(temp.path(), "port: 19701\n");

    for action in ["stop", "reload"] {
        srvctl()
            .args(["server", action, "--config"])
            .arg(&config_path)
            .assert()
            .code(1)
            .stderr(contains("no server process running"));
    }
    assert!(!temp.path().join("server.pid_19701").exists());
}

#[test]
fn start_without_command_reports_failure() {
    let temp = tempdir().expect("failed to create tempdir");
    let config_path = write_config(temp.path(), "port: 19702\n");

    srvctl()
        .args(["server", "start", "--config"])
        .arg(&config_path)
        .assert()
        .code(1)
        .stderr(contains("no server command configured"));
}

#[test]
fn foreground_start_waits_for_server() {
    let temp = tempdir().expect("failed to create tempdir");
    let dir = temp.path();
    let marker = dir.join("ran");
    let config_path = write_config(
        dir,
        &format!("command: 'echo \"$SERVER_PORT\" > {}'\n", marker.display()),
    );

    srvctl()
        .args(["server", "--port", "19703", "--config"])
        .arg(&config_path)
        .assert()
        .success()
        .stdout(contains("Starting server..."));

    assert_eq!(fs::read_to_string(&marker).unwrap().trim(), "19703");
}

#[cfg(unix)]
#[test]
fn daemon_start_already_running_then_stop() {
    let temp = tempdir().expect("failed to create tempdir");
    let dir = temp.path();
    let config_path = write_config(
        dir,
        "port: 19704\ncommand: 'echo $$ > \"$SERVER_PID_FILE\"; exec sleep 30'\n",
    );
    let pid_file = dir.join("server.pid_19704");

    srvctl()
        .args(["server", "start", "-d", "--config"])
        .arg(&config_path)
        .assert()
        .success();

    let pid = wait_for_pid(&pid_file);
    assert!(is_process_alive(pid));

    srvctl()
        .args(["server", "start", "-d", "--config"])
        .arg(&config_path)
        .assert()
        .code(1)
        .stderr(contains("already running"));
    assert_eq!(fs::read_to_string(&pid_file).unwrap().trim(), pid.to_string());

    srvctl()
        .args(["server", "stop", "--config"])
        .arg(&config_path)
        .assert()
        .success()
        .stdout(contains("> success"));

    assert!(!pid_file.exists());
    wait_for_process_exit(pid);
}

#[test]
fn port_flag_selects_its_own_pid_file() {
    let temp = tempdir().expect("failed to create tempdir");
    let dir = temp.path();
    let config_path = write_config(dir, "port: 19705\n");
    fs::write(dir.join("server.pid_19706"), "not-a-pid").unwrap();

    srvctl()
        .args(["server", "stop", "-p", "19706", "--config"])
        .arg(&config_path)
        .assert()
        .code(1)
        .stderr(contains("no server process running"));

    assert_eq!(
        fs::read_to_string(dir.join("server.pid_19706")).unwrap(),
        "not-a-pid"
    );
}
