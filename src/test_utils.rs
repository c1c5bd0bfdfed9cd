//! Recording fakes for the controller's collaborators, shared by unit and integration tests.
use std::{
    collections::HashSet,
    sync::{Arc, Mutex, MutexGuard, OnceLock},
};

use crate::{
    config::ServerConfig,
    error::{LaunchError, SignalError},
    hooks::{EventHookRegistry, LifecycleEvent},
    launcher::ServerLauncher,
    pidfile::ProcessProbe,
    signals::{ServerSignal, SignalDispatcher},
};

/// Global lock for environment variable modifications in tests.
pub static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

pub fn env_lock() -> MutexGuard<'static, ()> {
    ENV_LOCK
        .get_or_init(|| Mutex::new(()))
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[derive(Debug, Default)]
struct SignalState {
    alive: HashSet<u32>,
    sent: Vec<(u32, ServerSignal)>,
    refuse: Option<ServerSignal>,
}

/// Pretends to signal processes. PIDs in the alive set answer probes; a
/// delivered `Terminate` removes the PID from the set.
#[derive(Debug, Default, Clone)]
pub struct RecordingSignals {
    state: Arc<Mutex<SignalState>>,
}

impl RecordingSignals {
    /// Fake where `pids` are live processes.
    pub fn alive(pids: &[u32]) -> Self {
        let signals = Self::default();
        for pid in pids {
            signals.mark_alive(*pid);
        }
        signals
    }

    pub fn mark_alive(&self, pid: u32) {
        lock(&self.state).alive.insert(pid);
    }

    /// Makes every delivery of `signal` fail with `EPERM`.
    pub fn refuse(&self, signal: ServerSignal) {
        lock(&self.state).refuse = Some(signal);
    }

    /// Every send attempt, probes included.
    pub fn sent(&self) -> Vec<(u32, ServerSignal)> {
        lock(&self.state).sent.clone()
    }

    /// Send attempts other than liveness probes.
    pub fn delivered(&self) -> Vec<(u32, ServerSignal)> {
        self.sent()
            .into_iter()
            .filter(|(_, signal)| *signal != ServerSignal::Probe)
            .collect()
    }
}

impl SignalDispatcher for RecordingSignals {
    fn send(&self, pid: u32, signal: ServerSignal) -> Result<(), SignalError> {
        let mut state = lock(&self.state);
        state.sent.push((pid, signal));

        if state.refuse == Some(signal) {
            return Err(SignalError::Failed {
                signal,
                pid,
                source: nix::errno::Errno::EPERM,
            });
        }
        if !state.alive.contains(&pid) {
            return Err(SignalError::Failed {
                signal,
                pid,
                source: nix::errno::Errno::ESRCH,
            });
        }
        if signal == ServerSignal::Terminate {
            state.alive.remove(&pid);
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
struct LauncherState {
    launched: Vec<ServerConfig>,
    next_pid: Option<u32>,
    fail: bool,
}

/// Records launches. Optionally plays the server's part by writing a PID file
/// and registering the PID as alive with a [`RecordingSignals`].
#[derive(Debug, Default, Clone)]
pub struct RecordingLauncher {
    state: Arc<Mutex<LauncherState>>,
    signals: Option<RecordingSignals>,
}

impl RecordingLauncher {
    /// Launcher whose server records `pid` in the PID file and stays alive.
    pub fn writing_pid(pid: u32, signals: RecordingSignals) -> Self {
        let launcher = Self {
            state: Arc::default(),
            signals: Some(signals),
        };
        lock(&launcher.state).next_pid = Some(pid);
        launcher
    }

    /// Launcher that always fails.
    pub fn failing() -> Self {
        let launcher = Self::default();
        lock(&launcher.state).fail = true;
        launcher
    }

    pub fn launched(&self) -> Vec<ServerConfig> {
        lock(&self.state).launched.clone()
    }

    pub fn launch_count(&self) -> usize {
        lock(&self.state).launched.len()
    }
}

impl ServerLauncher for RecordingLauncher {
    fn launch(&self, config: &ServerConfig) -> Result<(), LaunchError> {
        let mut state = lock(&self.state);
        state.launched.push(config.clone());

        if state.fail {
            return Err(LaunchError::MissingCommand);
        }
        if let Some(pid) = state.next_pid {
            ProcessProbe::new(&config.pid_file_path).write_pid(pid)?;
            if let Some(signals) = &self.signals {
                signals.mark_alive(pid);
            }
        }
        Ok(())
    }
}

/// Records every lifecycle notification.
#[derive(Debug, Default, Clone)]
pub struct RecordingHooks {
    events: Arc<Mutex<Vec<LifecycleEvent>>>,
}

impl RecordingHooks {
    pub fn events(&self) -> Vec<LifecycleEvent> {
        lock(&self.events).clone()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.events().iter().map(|event| event.kind.into()).collect()
    }
}

impl EventHookRegistry for RecordingHooks {
    fn notify(&self, event: &LifecycleEvent) {
        lock(&self.events).push(event.clone());
    }
}
