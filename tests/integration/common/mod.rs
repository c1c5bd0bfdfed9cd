#![allow(dead_code)]

use std::{
    fs,
    path::{Path, PathBuf},
    thread,
    time::{Duration, Instant},
};

use srvctl::{
    config::{ConfigResolver, Overrides, PersistedConfig, ServerConfig},
    pidfile::ProcessProbe,
    signals::NixSignalDispatcher,
};

/// Writes `yaml` as `server.yaml` in `dir` and returns its path.
pub fn write_config(dir: &Path, yaml: &str) -> PathBuf {
    let path = dir.join("server.yaml");
    fs::write(&path, yaml).expect("failed to write config");
    path
}

/// Loads the config at `path` and resolves it the way one invocation would.
pub fn resolve(path: &Path, overrides: &Overrides) -> (PersistedConfig, ServerConfig) {
    let persisted = PersistedConfig::load(path).expect("load config");
    let config = ConfigResolver::new(&persisted).resolve(overrides);
    (persisted, config)
}

pub fn wait_for_lines(path: &Path, expected: usize) -> Vec<String> {
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        if let Ok(content) = fs::read_to_string(path) {
            let lines: Vec<_> = content.lines().map(|line| line.to_string()).collect();
            if lines.len() >= expected {
                return lines;
            }
        }

        if Instant::now() >= deadline {
            panic!("Timed out waiting for {expected} lines in {:?}", path);
        }

        thread::sleep(Duration::from_millis(100));
    }
}

pub fn wait_for_path(path: &Path) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if path.exists() {
            return;
        }
        thread::sleep(Duration::from_millis(100));
    }
    panic!("Timed out waiting for {:?} to exist", path);
}

/// Waits until the PID file at `path` records a PID and returns it.
pub fn wait_for_pid(path: &Path) -> u32 {
    let probe = ProcessProbe::new(path);
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        let pid = probe.read_pid();
        if pid != 0 {
            return pid;
        }

        if Instant::now() >= deadline {
            panic!("Timed out waiting for a PID in {:?}", path);
        }

        thread::sleep(Duration::from_millis(100));
    }
}

pub fn is_process_alive(pid: u32) -> bool {
    ProcessProbe::new("/dev/null").is_running(pid, &NixSignalDispatcher) && !is_zombie(pid)
}

#[cfg(target_os = "linux")]
fn is_zombie(pid: u32) -> bool {
    // The third field in /proc/{pid}/stat is the state character.
    let Ok(stat) = fs::read_to_string(format!("/proc/{pid}/stat")) else {
        return false;
    };
    stat.rfind(')')
        .and_then(|end| stat[end + 1..].trim().chars().next())
        .is_some_and(|state| state == 'Z' || state == 'X')
}

#[cfg(not(target_os = "linux"))]
fn is_zombie(_pid: u32) -> bool {
    false
}

pub fn wait_for_process_exit(pid: u32) {
    let deadline = Instant::now() + Duration::from_secs(10);
    while Instant::now() < deadline {
        if !is_process_alive(pid) {
            return;
        }
        thread::sleep(Duration::from_millis(100));
    }
    panic!("Timed out waiting for PID {pid} to exit");
}
