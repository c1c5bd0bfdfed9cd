//! Error handling for srvctl.
use std::process::ExitStatus;

use thiserror::Error;

use crate::signals::ServerSignal;

/// Defines every way a lifecycle action can fail.
///
/// None of these are fatal to the caller: the binary turns each one into a
/// status line and a non-zero exit code.
#[derive(Debug, Error)]
pub enum LifecycleError {
    /// `start` was requested while the recorded process is alive.
    #[error("server process is already running (PID {pid})")]
    AlreadyRunning {
        /// The live PID read from the PID file.
        pid: u32,
    },

    /// `stop` or `reload` was requested while no live process is recorded.
    #[error("no server process running")]
    NotRunning,

    /// The action string is outside `start|stop|restart|reload`.
    #[error("invalid action '{0}', expected start|stop|restart|reload")]
    InvalidAction(String),

    /// Delivering a stop or reload signal failed.
    #[error(transparent)]
    Signal(#[from] SignalError),

    /// The PID file exists but could not be removed.
    #[error("failed to remove PID file: {0}")]
    PidFile(#[source] std::io::Error),

    /// The server launcher failed.
    #[error(transparent)]
    Launch(#[from] LaunchError),

    /// Both phases of a restart failed.
    #[error("restart failed: could not stop the running server ({stop}); start then failed: {start}")]
    Restart {
        /// Why the running server could not be stopped.
        stop: Box<LifecycleError>,
        /// Why the following start failed.
        start: Box<LifecycleError>,
    },
}

/// Error type for signal delivery.
#[derive(Debug, Error)]
pub enum SignalError {
    /// The operating system refused or could not deliver the signal.
    #[error("failed to send {signal} to PID {pid}: {source}")]
    Failed {
        /// The signal that was being sent.
        signal: ServerSignal,
        /// The target process.
        pid: u32,
        /// The errno reported by `kill(2)`.
        #[source]
        source: nix::errno::Errno,
    },

    /// The PID cannot address a single process (zero or outside `pid_t`).
    #[error("refusing to signal invalid PID {0}")]
    InvalidPid(u32),
}

/// Error type for the server launcher.
#[derive(Debug, Error)]
pub enum LaunchError {
    /// No `command` configured for the server.
    #[error("no server command configured (set `command` in the config file)")]
    MissingCommand,

    /// The server command could not be spawned.
    #[error("failed to spawn server: {0}")]
    Spawn(#[from] std::io::Error),

    /// The settings could not be encoded for the server environment.
    #[error("failed to encode server settings: {0}")]
    Settings(#[from] serde_json::Error),

    /// A foreground server exited unsuccessfully.
    #[error("server exited with status {0}")]
    Exited(ExitStatus),
}

/// Error type for loading the persisted configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Error reading the configuration file.
    #[error("Failed to read config file: {0}")]
    Read(#[from] std::io::Error),

    /// Error parsing YAML configuration.
    #[error("Invalid YAML format: {0}")]
    Parse(#[from] serde_yaml::Error),
}
