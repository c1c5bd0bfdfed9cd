//! Command-line interface for srvctl.
use std::{path::PathBuf, str::FromStr};

use clap::{Parser, Subcommand};
use tracing::level_filters::LevelFilter;

use crate::config::Overrides;

/// Wrapper around `LevelFilter` so clap can parse log levels from either
/// string names ("info", "debug", etc.) or numeric shorthands (0-5).
#[derive(Clone, Copy, Debug)]
pub struct LogLevelArg(LevelFilter);

impl LogLevelArg {
    /// String representation suitable for `RUST_LOG`.
    pub fn as_str(&self) -> &'static str {
        match self.0 {
            LevelFilter::OFF => "off",
            LevelFilter::ERROR => "error",
            LevelFilter::WARN => "warn",
            LevelFilter::INFO => "info",
            LevelFilter::DEBUG => "debug",
            LevelFilter::TRACE => "trace",
        }
    }
}

impl FromStr for LogLevelArg {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err("log level cannot be empty".into());
        }

        if let Ok(number) = trimmed.parse::<u8>() {
            let level = match number {
                0 => LevelFilter::OFF,
                1 => LevelFilter::ERROR,
                2 => LevelFilter::WARN,
                3 => LevelFilter::INFO,
                4 => LevelFilter::DEBUG,
                5 => LevelFilter::TRACE,
                _ => {
                    return Err(format!(
                        "unsupported log level number '{number}' (expected 0-5)"
                    ));
                }
            };

            return Ok(LogLevelArg(level));
        }

        let lowercase = trimmed.to_ascii_lowercase();
        let level = match lowercase.as_str() {
            "off" => Some(LevelFilter::OFF),
            "error" | "err" => Some(LevelFilter::ERROR),
            "warn" | "warning" => Some(LevelFilter::WARN),
            "info" | "information" => Some(LevelFilter::INFO),
            "debug" => Some(LevelFilter::DEBUG),
            "trace" => Some(LevelFilter::TRACE),
            _ => None,
        }
        .ok_or_else(|| format!("invalid log level '{trimmed}'"))?;

        Ok(LogLevelArg(level))
    }
}

/// Command-line interface for srvctl.
#[derive(Parser, Debug)]
#[command(name = "srvctl", version, author)]
#[command(about = "Supervise a long-running server through its PID file", long_about = None)]
pub struct Cli {
    /// Override the logging verbosity for this invocation only.
    #[arg(long, value_name = "LEVEL", global = true)]
    pub log_level: Option<LogLevelArg>,

    /// Path to the configuration file.
    #[arg(short, long, global = true, default_value = "server.yaml")]
    pub config: PathBuf,

    /// The command to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands for srvctl.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Control the server: start|stop|restart|reload.
    Server {
        /// Lifecycle action to perform.
        #[arg(default_value = "start")]
        action: String,

        /// The host the server listens on.
        #[arg(short = 'H', long)]
        host: Option<String>,

        /// The port the server listens on.
        #[arg(short, long)]
        port: Option<u16>,

        /// Run the server in daemon mode.
        #[arg(short, long)]
        daemon: bool,
    },
}

impl Commands {
    /// The explicit overrides carried by the command.
    pub fn overrides(&self) -> Overrides {
        match self {
            Commands::Server {
                host, port, daemon, ..
            } => Overrides {
                host: host.clone(),
                port: *port,
                daemonize: *daemon,
            },
        }
    }
}

/// Parses command-line arguments and returns a `Cli` struct.
pub fn parse_args() -> Cli {
    Cli::parse()
}
