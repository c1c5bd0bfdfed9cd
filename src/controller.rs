//! The start / stop / restart / reload state machine.
//!
//! Running or stopped is never remembered: every action re-reads the PID file and
//! probes the recorded process before deciding what to do.
use std::str::FromStr;

use strum_macros::{AsRefStr, Display, EnumString};
use tracing::{error, info, warn};

use crate::{
    config::ServerConfig,
    error::LifecycleError,
    hooks::{EventHookRegistry, LifecycleEvent, LifecycleEventKind},
    launcher::ServerLauncher,
    pidfile::ProcessProbe,
    signals::{ServerSignal, SignalDispatcher},
};

/// A lifecycle action requested by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, AsRefStr, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum Action {
    Start,
    Stop,
    Restart,
    Reload,
}

impl Action {
    /// Parses an action name, rejecting anything outside `start|stop|restart|reload`.
    pub fn parse(raw: &str) -> Result<Self, LifecycleError> {
        Self::from_str(raw).map_err(|_| LifecycleError::InvalidAction(raw.to_string()))
    }
}

/// What a successful action did.
#[derive(Debug)]
pub enum Outcome {
    /// The launcher returned successfully.
    Started,
    /// `pid` was sent SIGTERM and its PID file removed.
    Stopped { pid: u32 },
    /// `pid` was sent SIGUSR1.
    Reloaded { pid: u32 },
    Restarted(RestartOutcome),
}

/// Result of the stop phase of a restart whose start phase succeeded.
#[derive(Debug, Default)]
pub struct RestartOutcome {
    /// A running server was stopped first.
    pub stopped: bool,
    /// The stop phase failed; start was attempted anyway.
    pub stop_error: Option<LifecycleError>,
}

/// Drives one server instance through its lifecycle.
#[derive(Debug)]
pub struct LifecycleController<S, L, H> {
    config: ServerConfig,
    probe: ProcessProbe,
    signals: S,
    launcher: L,
    hooks: H,
}

impl<S, L, H> LifecycleController<S, L, H>
where
    S: SignalDispatcher,
    L: ServerLauncher,
    H: EventHookRegistry,
{
    pub fn new(config: ServerConfig, signals: S, launcher: L, hooks: H) -> Self {
        let probe = ProcessProbe::new(config.pid_file_path.clone());
        Self {
            config,
            probe,
            signals,
            launcher,
            hooks,
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn probe(&self) -> &ProcessProbe {
        &self.probe
    }

    /// Returns the recorded PID when that process is alive.
    pub fn running_pid(&self) -> Option<u32> {
        let pid = self.probe.read_pid();
        self.probe.is_running(pid, &self.signals).then_some(pid)
    }

    /// Runs `action`.
    pub fn execute(&self, action: Action) -> Result<Outcome, LifecycleError> {
        info!("Executing '{action}' for {}", self.config.url());
        match action {
            Action::Start => self.start().map(|()| Outcome::Started),
            Action::Stop => self.stop().map(|pid| Outcome::Stopped { pid }),
            Action::Reload => self.reload().map(|pid| Outcome::Reloaded { pid }),
            Action::Restart => self.restart().map(Outcome::Restarted),
        }
    }

    /// Launches the server unless the recorded process is alive.
    pub fn start(&self) -> Result<(), LifecycleError> {
        let pid = self.probe.read_pid();
        if self.probe.is_running(pid, &self.signals) {
            warn!("Server already running with PID {pid}");
            return Err(LifecycleError::AlreadyRunning { pid });
        }

        self.notify(LifecycleEventKind::BeforeStart, pid);

        println!("Starting server...");
        println!("Server starting: <{}>", self.config.url());
        if !self.config.daemonize {
            println!("You can exit with `CTRL-C`");
        }

        self.launcher.launch(&self.config)?;
        info!(
            "Server launched; PID file {:?}",
            self.config.pid_file_path
        );
        Ok(())
    }

    /// Sends SIGTERM to the running server and removes its PID file.
    ///
    /// Returns the PID that was stopped.
    pub fn stop(&self) -> Result<u32, LifecycleError> {
        let pid = self.probe.read_pid();
        if !self.probe.is_running(pid, &self.signals) {
            return Err(LifecycleError::NotRunning);
        }

        self.notify(LifecycleEventKind::BeforeStop, pid);

        println!("Stopping server...");
        self.signals.send(pid, ServerSignal::Terminate)?;
        self.probe
            .remove_pid_file()
            .map_err(LifecycleError::PidFile)?;

        info!("Sent SIGTERM to PID {pid}");
        println!("> success");
        Ok(pid)
    }

    /// Sends SIGUSR1 to the running server. The PID file is left as it is.
    ///
    /// Returns the PID that was signalled.
    pub fn reload(&self) -> Result<u32, LifecycleError> {
        let pid = self.probe.read_pid();
        if !self.probe.is_running(pid, &self.signals) {
            return Err(LifecycleError::NotRunning);
        }

        println!("Reloading server...");
        self.signals.send(pid, ServerSignal::Reload)?;
        info!("Sent SIGUSR1 to PID {pid}");
        println!("> success");

        self.notify(LifecycleEventKind::Reload, pid);
        Ok(pid)
    }

    /// Stops the server if it is running, then starts it.
    ///
    /// A failed stop is reported in the outcome and logged; start is attempted regardless.
    /// When start fails as well, both errors come back in [`LifecycleError::Restart`].
    pub fn restart(&self) -> Result<RestartOutcome, LifecycleError> {
        let pid = self.probe.read_pid();
        self.notify(LifecycleEventKind::BeforeRestart, pid);

        let mut outcome = RestartOutcome::default();
        if self.probe.is_running(pid, &self.signals) {
            match self.stop() {
                Ok(_) => outcome.stopped = true,
                Err(err) => {
                    error!("Stop phase of restart failed: {err}");
                    outcome.stop_error = Some(err);
                }
            }
        }

        match (self.start(), outcome.stop_error.take()) {
            (Ok(()), stop_error) => {
                outcome.stop_error = stop_error;
                Ok(outcome)
            }
            (Err(start), Some(stop)) => Err(LifecycleError::Restart {
                stop: Box::new(stop),
                start: Box::new(start),
            }),
            (Err(start), None) => Err(start),
        }
    }

    fn notify(&self, kind: LifecycleEventKind, pid: u32) {
        self.hooks.notify(&LifecycleEvent::new(kind, pid));
    }
}
