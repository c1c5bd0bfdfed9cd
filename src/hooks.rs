//! Lifecycle events and the observers that receive them.
use std::{
    fmt,
    path::{Path, PathBuf},
    process::{Child, Command, ExitStatus},
    str::FromStr,
    thread,
    time::{Duration, Instant},
};

use serde::Deserialize;
use strum_macros::{AsRefStr, Display, EnumString, IntoStaticStr};
use tracing::{debug, error, warn};

use crate::config::PersistedConfig;

/// The points in a lifecycle action at which observers are notified.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, AsRefStr, EnumString, IntoStaticStr,
)]
#[strum(serialize_all = "snake_case")]
pub enum LifecycleEventKind {
    BeforeStart,
    BeforeStop,
    BeforeRestart,
    Reload,
}

/// A lifecycle notification: which point was reached and the PID involved (0 if none).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LifecycleEvent {
    pub kind: LifecycleEventKind,
    pub pid: u32,
}

impl LifecycleEvent {
    pub fn new(kind: LifecycleEventKind, pid: u32) -> Self {
        Self { kind, pid }
    }

    /// The event name, e.g. `before_start`.
    pub fn name(&self) -> &'static str {
        self.kind.into()
    }
}

/// Receives lifecycle events from the controller.
pub trait EventHookRegistry {
    fn notify(&self, event: &LifecycleEvent);
}

impl<T: EventHookRegistry + ?Sized> EventHookRegistry for &T {
    fn notify(&self, event: &LifecycleEvent) {
        (**self).notify(event)
    }
}

type Observer = Box<dyn Fn(&LifecycleEvent) + Send + Sync>;

/// In-process observer list. Observers run in subscription order.
#[derive(Default)]
pub struct HookRegistry {
    observers: Vec<Observer>,
}

impl HookRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an observer for every event.
    pub fn subscribe<F>(&mut self, observer: F)
    where
        F: Fn(&LifecycleEvent) + Send + Sync + 'static,
    {
        self.observers.push(Box::new(observer));
    }

    /// Adds a shell-command hook that only fires for its own event.
    pub fn subscribe_command(&mut self, hook: CommandHook) {
        self.subscribe(move |event| {
            if event.kind == hook.event {
                hook.run(event);
            }
        });
    }

    /// Builds a registry from the `hooks` section of the persisted configuration.
    pub fn from_config(persisted: &PersistedConfig, working_dir: &Path) -> Self {
        let mut registry = Self::new();
        for hook in command_hooks(persisted, working_dir) {
            registry.subscribe_command(hook);
        }
        registry
    }

    pub fn len(&self) -> usize {
        self.observers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }
}

impl fmt::Debug for HookRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HookRegistry")
            .field("observers", &self.observers.len())
            .finish()
    }
}

impl EventHookRegistry for HookRegistry {
    fn notify(&self, event: &LifecycleEvent) {
        debug!(
            "Dispatching {} (PID {}) to {} observer(s)",
            event.name(),
            event.pid,
            self.observers.len()
        );
        for observer in &self.observers {
            observer(event);
        }
    }
}

/// A hook command, written either as a bare string or as `{ command, timeout }`.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum HookAction {
    Command(String),
    Detailed {
        command: String,
        timeout: Option<String>,
    },
}

impl HookAction {
    pub fn command(&self) -> &str {
        match self {
            HookAction::Command(command) => command,
            HookAction::Detailed { command, .. } => command,
        }
    }

    pub fn timeout(&self) -> Option<&str> {
        match self {
            HookAction::Command(_) => None,
            HookAction::Detailed { timeout, .. } => timeout.as_deref(),
        }
    }
}

/// Runs a shell command when its event fires, with `SERVER_EVENT` and `SERVER_PID` set.
#[derive(Debug, Clone)]
pub struct CommandHook {
    event: LifecycleEventKind,
    action: HookAction,
    working_dir: PathBuf,
}

impl CommandHook {
    pub fn new(event: LifecycleEventKind, action: HookAction, working_dir: PathBuf) -> Self {
        Self {
            event,
            action,
            working_dir,
        }
    }

    pub fn event(&self) -> LifecycleEventKind {
        self.event
    }

    /// Runs the hook to completion or until its timeout expires.
    ///
    /// Failures are logged and never propagated.
    pub fn run(&self, event: &LifecycleEvent) {
        let label = event.name();
        let command = self.action.command();
        debug!("Running {label} hook: `{command}`");

        let timeout = match self.action.timeout() {
            Some(raw) => match parse_duration(raw) {
                Ok(duration) => Some(duration),
                Err(err) => {
                    error!("Invalid timeout '{raw}' for {label} hook: {err}");
                    None
                }
            },
            None => None,
        };

        let mut cmd = Command::new("sh");
        cmd.arg("-c")
            .arg(command)
            .current_dir(&self.working_dir)
            .env("SERVER_EVENT", label)
            .env("SERVER_PID", event.pid.to_string());

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(err) => {
                error!("Failed to run {label} hook: {err}");
                return;
            }
        };

        let wait_result = match timeout {
            Some(duration) => wait_with_timeout(&mut child, duration),
            None => child.wait().map(Some),
        };

        match wait_result {
            Ok(Some(status)) if status.success() => {
                debug!("{label} hook completed successfully.");
            }
            Ok(Some(status)) => {
                warn!("{label} hook exited with status: {status}");
            }
            Ok(None) => {
                warn!("{label} hook timed out after {timeout:?}. Terminating hook process.");
                if let Err(err) = child.kill() {
                    error!("Failed to terminate timed-out {label} hook: {err}");
                }
                let _ = child.wait();
            }
            Err(err) => {
                error!("Failed while waiting for {label} hook: {err}");
            }
        }
    }
}

/// Reads the `hooks` mapping of the persisted configuration.
///
/// Unknown event names and malformed entries are skipped with a warning.
pub fn command_hooks(persisted: &PersistedConfig, working_dir: &Path) -> Vec<CommandHook> {
    let Some(serde_yaml::Value::Mapping(hooks)) = persisted.get("hooks") else {
        return Vec::new();
    };

    let mut parsed = Vec::new();
    for (name, action) in hooks {
        let Some(name) = name.as_str() else {
            warn!("Ignoring hook with non-string event name: {name:?}");
            continue;
        };
        let Ok(event) = LifecycleEventKind::from_str(name) else {
            warn!("Ignoring hook for unknown event '{name}'");
            continue;
        };
        match serde_yaml::from_value::<HookAction>(action.clone()) {
            Ok(action) => {
                parsed.push(CommandHook::new(event, action, working_dir.to_path_buf()))
            }
            Err(err) => warn!("Ignoring malformed '{name}' hook: {err}"),
        }
    }
    parsed
}

/// Wait for a child process with a timeout, returning `Ok(None)` on timeout.
fn wait_with_timeout(
    child: &mut Child,
    timeout: Duration,
) -> std::io::Result<Option<ExitStatus>> {
    let deadline = Instant::now() + timeout;

    loop {
        match child.try_wait()? {
            Some(status) => return Ok(Some(status)),
            None => {
                if Instant::now() >= deadline {
                    return Ok(None);
                }
                thread::sleep(Duration::from_millis(50));
            }
        }
    }
}

/// Parses a user-facing duration string in the format `<number>[s|m|h]`.
pub fn parse_duration(raw: &str) -> Result<Duration, String> {
    let value = raw.trim();
    if value.is_empty() {
        return Err("duration value cannot be empty".into());
    }

    let (amount, multiplier) = if let Some(stripped) = value.strip_suffix('s') {
        (stripped.trim(), 1)
    } else if let Some(stripped) = value.strip_suffix('m') {
        (stripped.trim(), 60)
    } else if let Some(stripped) = value.strip_suffix('h') {
        (stripped.trim(), 3600)
    } else {
        (value, 1)
    };

    let amount: u64 = amount
        .parse()
        .map_err(|_| format!("invalid duration value: '{raw}'"))?;

    Ok(Duration::from_secs(amount.saturating_mul(multiplier)))
}
