#[path = "common/mod.rs"]
mod common;

use common::{resolve, wait_for_lines, write_config};
use srvctl::{
    config::Overrides,
    controller::LifecycleController,
    hooks::HookRegistry,
    test_utils::{RecordingLauncher, RecordingSignals},
};
use tempfile::tempdir;

#[test]
fn configured_hooks_run_for_their_events() {
    let temp = tempdir().expect("failed to create tempdir");
    let dir = temp.path();
    let hook_log = dir.join("hooks.log");

    let config_yaml = format!(
        r#"
port: 9700
hooks:
  before_start: "echo start:$SERVER_PID >> {log}"
  before_stop:
    command: "echo $SERVER_EVENT:$SERVER_PID >> {log}"
    timeout: "5s"
  reload: "echo reload:$SERVER_PID >> {log}"
"#,
        log = hook_log.display()
    );
    let config_path = write_config(dir, &config_yaml);
    let (persisted, config) = resolve(&config_path, &Overrides::default());
    assert!(config.server_settings.get("hooks").is_none());

    let hooks = HookRegistry::from_config(&persisted, &config.app_path);
    assert_eq!(hooks.len(), 3);

    let signals = RecordingSignals::default();
    let launcher = RecordingLauncher::writing_pid(2468, signals.clone());
    let controller = LifecycleController::new(config, &signals, &launcher, &hooks);

    controller.start().expect("start");
    controller.reload().expect("reload");
    controller.stop().expect("stop");

    let lines = wait_for_lines(&hook_log, 3);
    assert_eq!(
        lines,
        vec![
            "start:0".to_string(),
            "reload:2468".to_string(),
            "before_stop:2468".to_string(),
        ]
    );
}

#[test]
fn failing_hook_does_not_block_the_action() {
    let temp = tempdir().expect("failed to create tempdir");
    let dir = temp.path();
    let config_path = write_config(dir, "hooks:\n  before_start: \"exit 7\"\n");
    let (persisted, config) = resolve(&config_path, &Overrides::default());
    let hooks = HookRegistry::from_config(&persisted, &config.app_path);

    let signals = RecordingSignals::default();
    let launcher = RecordingLauncher::writing_pid(99, signals.clone());
    let controller = LifecycleController::new(config, &signals, &launcher, &hooks);

    controller.start().expect("start despite failing hook");
    assert_eq!(launcher.launch_count(), 1);
}
