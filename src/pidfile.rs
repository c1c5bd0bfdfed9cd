//! PID file access and liveness probing for the supervised server.
use std::{
    fs, io,
    path::{Path, PathBuf},
};

use tracing::{debug, warn};

use crate::signals::{ServerSignal, SignalDispatcher};

/// Reads, writes and removes the single-line PID file of one server instance.
///
/// The file is the only record of the master PID; nothing is cached between calls.
#[derive(Debug, Clone)]
pub struct ProcessProbe {
    path: PathBuf,
}

impl ProcessProbe {
    /// Creates a probe for the PID file at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Returns the PID file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the recorded PID, or 0 when none is recorded.
    ///
    /// A missing file, an unreadable file, and content that is not a positive
    /// decimal integer all read as 0.
    pub fn read_pid(&self) -> u32 {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return 0,
            Err(err) => {
                warn!("Failed to read PID file {:?}: {err}", self.path);
                return 0;
            }
        };

        parse_pid(&contents).unwrap_or_else(|| {
            debug!(
                "Ignoring malformed PID file {:?}: {:?}",
                self.path,
                contents.trim()
            );
            0
        })
    }

    /// Returns `true` when `pid` names a live process we are allowed to signal.
    pub fn is_running(&self, pid: u32, signals: &impl SignalDispatcher) -> bool {
        if pid == 0 {
            return false;
        }

        match signals.send(pid, ServerSignal::Probe) {
            Ok(()) => true,
            Err(err) => {
                debug!("PID {pid} is not running: {err}");
                false
            }
        }
    }

    /// Records `pid` as plain decimal text. Used by servers and tests, never by the controller.
    pub fn write_pid(&self, pid: u32) -> io::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, pid.to_string())
    }

    /// Deletes the PID file. Removing an absent file succeeds.
    pub fn remove_pid_file(&self) -> io::Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err),
        }
    }
}

/// Parses PID file content; only a positive value that fits `pid_t` is a PID.
fn parse_pid(contents: &str) -> Option<u32> {
    contents
        .trim()
        .parse::<libc::pid_t>()
        .ok()
        .filter(|pid| *pid > 0)
        .and_then(|pid| u32::try_from(pid).ok())
}
