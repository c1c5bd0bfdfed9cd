//! Launching the server engine.
use std::{
    fs::{File, OpenOptions},
    os::unix::process::CommandExt,
    path::Path,
    process::{Command, Stdio},
};

use tracing::{debug, error, info};

use crate::{config::ServerConfig, error::LaunchError};

/// Starts the server engine with a resolved configuration.
///
/// The launched server, not the launcher, records its PID at
/// [`ServerConfig::pid_file_path`].
pub trait ServerLauncher {
    fn launch(&self, config: &ServerConfig) -> Result<(), LaunchError>;
}

impl<T: ServerLauncher + ?Sized> ServerLauncher for &T {
    fn launch(&self, config: &ServerConfig) -> Result<(), LaunchError> {
        (**self).launch(config)
    }
}

/// Runs the configured `command` through `sh -c` inside the application directory.
///
/// In the foreground the call blocks until the server exits. With `daemonize` the
/// server is moved into its own session and the call returns once it is spawned.
#[derive(Debug, Default, Clone, Copy)]
pub struct CommandLauncher;

impl CommandLauncher {
    /// Builds the command without spawning it.
    pub fn command(&self, config: &ServerConfig) -> Result<Command, LaunchError> {
        let script = config.command.as_deref().ok_or(LaunchError::MissingCommand)?;

        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(script);
        if config.app_path.is_dir() {
            cmd.current_dir(&config.app_path);
        }

        for (key, value) in server_env(config)? {
            cmd.env(key, value);
        }

        if config.daemonize {
            let (stdout, stderr) = match config
                .server_settings
                .get("log_file")
                .and_then(|value| value.as_str())
            {
                Some(log_file) => {
                    let log = open_log(&config.app_path.join(log_file))?;
                    (Stdio::from(log.try_clone()?), Stdio::from(log))
                }
                None => (Stdio::null(), Stdio::null()),
            };
            cmd.stdin(Stdio::null()).stdout(stdout).stderr(stderr);

            unsafe {
                cmd.pre_exec(|| {
                    if libc::setsid() < 0 {
                        return Err(std::io::Error::last_os_error());
                    }
                    Ok(())
                });
            }
        }

        Ok(cmd)
    }
}

impl ServerLauncher for CommandLauncher {
    fn launch(&self, config: &ServerConfig) -> Result<(), LaunchError> {
        let mut cmd = self.command(config)?;
        debug!("Executing command: {cmd:?}");

        let mut child = cmd.spawn().map_err(|err| {
            error!("Failed to start server: {err}");
            LaunchError::Spawn(err)
        })?;
        debug!("Server spawned with PID {}", child.id());

        if config.daemonize {
            info!("Server detached (PID {})", child.id());
            return Ok(());
        }

        let status = child.wait()?;
        if status.success() {
            info!("Server exited");
            Ok(())
        } else {
            Err(LaunchError::Exited(status))
        }
    }
}

/// Environment describing the resolved configuration to the server process.
pub fn server_env(config: &ServerConfig) -> Result<Vec<(&'static str, String)>, LaunchError> {
    let settings = serde_json::to_string(&config.server_settings)?;

    let mut env = vec![
        ("SERVER_HOST", config.host.clone()),
        ("SERVER_PORT", config.port.to_string()),
        (
            "SERVER_PID_FILE",
            config.pid_file_path.to_string_lossy().into_owned(),
        ),
        ("SERVER_DAEMONIZE", flag(config.daemonize)),
        ("SERVER_MODE", config.mode.to_string()),
        ("SERVER_SOCK_TYPE", config.sock_type.to_string()),
        ("SERVER_SSL", flag(config.ssl)),
        ("SERVER_SETTINGS", settings),
    ];

    if let Some(monitor) = &config.monitor {
        env.push(("SERVER_MONITOR_INTERVAL", monitor.interval.to_string()));
        env.push(("SERVER_MONITOR_PATHS", monitor.paths.join(":")));
    }

    if let Some(tables) = &config.tables {
        let tables = serde_json::to_string(tables)?;
        env.push(("SERVER_TABLES", tables));
    }

    Ok(env)
}

fn flag(value: bool) -> String {
    let flag = if value { "1" } else { "0" };
    flag.to_string()
}

fn open_log(path: &Path) -> std::io::Result<File> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    OpenOptions::new().create(true).append(true).open(path)
}
