//! Stop and reload against real processes recorded in a PID file.

#[path = "common/mod.rs"]
mod common;

use std::{
    os::unix::process::ExitStatusExt,
    process::{Child, Command},
};

use common::{is_process_alive, resolve, wait_for_lines, wait_for_path, write_config};
use srvctl::{
    config::Overrides,
    controller::LifecycleController,
    error::LifecycleError,
    pidfile::ProcessProbe,
    signals::NixSignalDispatcher,
    test_utils::{RecordingHooks, RecordingLauncher},
};
use tempfile::tempdir;

fn spawn_server(script: &str) -> Child {
    Command::new("sh")
        .arg("-c")
        .arg(script)
        .spawn()
        .expect("failed to spawn server stand-in")
}

#[test]
fn stop_terminates_recorded_process() {
    let temp = tempdir().expect("failed to create tempdir");
    let config_path = write_config(temp.path(), "port: 19600\n");
    let (_, config) = resolve(&config_path, &Overrides::default());

    let mut child = spawn_server("exec sleep 30");
    let probe = ProcessProbe::new(&config.pid_file_path);
    probe.write_pid(child.id()).expect("write pid");

    let launcher = RecordingLauncher::default();
    let hooks = RecordingHooks::default();
    let controller = LifecycleController::new(config, NixSignalDispatcher, &launcher, &hooks);

    assert_eq!(controller.stop().expect("stop"), child.id());
    assert!(!probe.path().exists());

    let status = child.wait().expect("wait for server");
    assert_eq!(status.signal(), Some(libc::SIGTERM));

    assert!(matches!(controller.stop(), Err(LifecycleError::NotRunning)));
}

#[test]
fn reload_delivers_usr1_and_keeps_process() {
    let temp = tempdir().expect("failed to create tempdir");
    let dir = temp.path();
    let config_path = write_config(dir, "port: 19601\n");
    let (_, config) = resolve(&config_path, &Overrides::default());

    let ready = dir.join("ready");
    let reloads = dir.join("reloads.log");
    let mut child = spawn_server(&format!(
        "trap 'echo reloaded >> {}' USR1; touch {}; while :; do sleep 0.1; done",
        reloads.display(),
        ready.display()
    ));
    wait_for_path(&ready);

    let probe = ProcessProbe::new(&config.pid_file_path);
    probe.write_pid(child.id()).expect("write pid");

    let launcher = RecordingLauncher::default();
    let hooks = RecordingHooks::default();
    let controller = LifecycleController::new(config, NixSignalDispatcher, &launcher, &hooks);

    assert_eq!(controller.reload().expect("reload"), child.id());

    let lines = wait_for_lines(&reloads, 1);
    assert_eq!(lines, vec!["reloaded".to_string()]);
    assert!(is_process_alive(child.id()));
    assert_eq!(probe.read_pid(), child.id());
    assert_eq!(hooks.names(), vec!["reload"]);

    child.kill().expect("kill server stand-in");
    child.wait().expect("reap server stand-in");
}

#[test]
fn exited_process_reads_as_stopped() {
    let temp = tempdir().expect("failed to create tempdir");
    let config_path = write_config(temp.path(), "port: 19602\n");
    let (_, config) = resolve(&config_path, &Overrides::default());

    let mut child = spawn_server("exit 0");
    let pid = child.id();
    child.wait().expect("reap");

    let probe = ProcessProbe::new(&config.pid_file_path);
    probe.write_pid(pid).expect("write pid");

    let launcher = RecordingLauncher::default();
    let hooks = RecordingHooks::default();
    let controller = LifecycleController::new(config, NixSignalDispatcher, &launcher, &hooks);

    assert_eq!(controller.running_pid(), None);
    assert!(matches!(controller.reload(), Err(LifecycleError::NotRunning)));
    assert!(probe.path().exists());
    assert!(hooks.events().is_empty());
}
