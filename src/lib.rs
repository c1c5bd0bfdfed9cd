//! srvctl supervises the lifecycle of a long-running network server: it starts the
//! server, stops it cleanly, restarts it, and asks it to reload in place. Every
//! decision is taken from the server's PID file and a liveness probe, so separate
//! invocations agree on the server's state without sharing memory.

/// CLI interface.
pub mod cli;

/// Configuration management.
pub mod config;

/// Lifecycle state machine.
pub mod controller;

/// Error handling.
pub mod error;

/// Lifecycle events and observers.
pub mod hooks;

/// Server engine launching.
pub mod launcher;

/// PID file access and liveness probing.
pub mod pidfile;

/// Signal delivery.
pub mod signals;

/// Recording fakes for tests.
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
