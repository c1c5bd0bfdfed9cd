//! Signal delivery to the supervised server.
use nix::{
    sys::signal::{Signal, kill},
    unistd::Pid,
};
use strum_macros::{AsRefStr, Display};
use tracing::debug;

use crate::error::SignalError;

/// The signals the supervisor ever sends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, AsRefStr)]
pub enum ServerSignal {
    /// Signal 0: checks existence and permission, delivers nothing.
    #[strum(serialize = "signal 0")]
    Probe,
    /// Asks the master process to shut down.
    #[strum(serialize = "SIGTERM")]
    Terminate,
    /// Asks the master process to reload its workers in place.
    #[strum(serialize = "SIGUSR1")]
    Reload,
}

impl ServerSignal {
    /// The `nix` signal to deliver, `None` for the probe.
    pub fn as_nix(self) -> Option<Signal> {
        match self {
            ServerSignal::Probe => None,
            ServerSignal::Terminate => Some(Signal::SIGTERM),
            ServerSignal::Reload => Some(Signal::SIGUSR1),
        }
    }
}

/// Sends a signal to a process. One attempt, no retries.
pub trait SignalDispatcher {
    /// Delivers `signal` to `pid`, reporting failure once.
    fn send(&self, pid: u32, signal: ServerSignal) -> Result<(), SignalError>;
}

impl<T: SignalDispatcher + ?Sized> SignalDispatcher for &T {
    fn send(&self, pid: u32, signal: ServerSignal) -> Result<(), SignalError> {
        (**self).send(pid, signal)
    }
}

/// Signals real processes through `kill(2)`.
#[derive(Debug, Default, Clone, Copy)]
pub struct NixSignalDispatcher;

impl SignalDispatcher for NixSignalDispatcher {
    fn send(&self, pid: u32, signal: ServerSignal) -> Result<(), SignalError> {
        let target = to_nix_pid(pid)?;
        debug!("Sending {signal} to PID {pid}");
        kill(target, signal.as_nix()).map_err(|source| SignalError::Failed {
            signal,
            pid,
            source,
        })
    }
}

/// Converts a recorded PID into a `nix` PID that addresses exactly one process.
///
/// Zero and anything above `pid_t::MAX` would turn `kill(2)` into a process-group
/// or broadcast send, so both are rejected.
fn to_nix_pid(pid: u32) -> Result<Pid, SignalError> {
    match libc::pid_t::try_from(pid) {
        Ok(raw) if raw > 0 => Ok(Pid::from_raw(raw)),
        _ => Err(SignalError::InvalidPid(pid)),
    }
}
