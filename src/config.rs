//! Configuration management for srvctl.
//!
//! [`PersistedConfig`] is the YAML file as written by the operator. [`ConfigResolver`]
//! merges it with command-line [`Overrides`] into the immutable [`ServerConfig`] that
//! one invocation works from.
use std::{
    env,
    ffi::OsString,
    fs, io,
    path::{Path, PathBuf},
    str::FromStr,
    sync::OnceLock,
};

use regex::Regex;
use serde::de::Error as _;
use serde_yaml::{Mapping, Value};
use strum_macros::{AsRefStr, Display, EnumString};
use tracing::{debug, warn};

use crate::error::ConfigError;

/// Host used when neither the command line nor the config file names one.
pub const DEFAULT_HOST: &str = "0.0.0.0";

/// Port used when neither the command line nor the config file names one.
pub const DEFAULT_PORT: u16 = 9501;

/// File name of the default PID file inside the application directory.
pub const DEFAULT_PID_FILE_NAME: &str = "server.pid";

/// Seconds between file-monitor scans when `file_monitor_interval` is absent.
pub const DEFAULT_MONITOR_INTERVAL: u64 = 2;

/// Keys that configure collaborators and never reach the server settings.
const EPHEMERAL_KEYS: [&str; 5] = [
    "table",
    "file_monitor",
    "file_monitor_interval",
    "file_monitor_path",
    "hooks",
];

/// Server process topology.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Display, AsRefStr, EnumString)]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum ServerMode {
    /// Single reactor, requests handled in the reactor process.
    Base,
    /// Master, manager and worker processes.
    #[default]
    Process,
}

impl ServerMode {
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::String(name) => Self::from_str(name.trim()).ok(),
            Value::Number(number) => match number.as_u64()? {
                1 => Some(ServerMode::Base),
                2 => Some(ServerMode::Process),
                _ => None,
            },
            _ => None,
        }
    }
}

/// Listening socket type.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Display, AsRefStr, EnumString)]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum SockType {
    #[default]
    Tcp,
    Tcp6,
    Udp,
    Udp6,
    UnixStream,
    UnixDgram,
    /// TCP with TLS; forced whenever SSL is active.
    TcpSsl,
}

impl SockType {
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::String(name) => Self::from_str(name.trim()).ok(),
            Value::Number(number) => match number.as_u64()? {
                1 => Some(SockType::Tcp),
                2 => Some(SockType::Udp),
                3 => Some(SockType::Tcp6),
                4 => Some(SockType::Udp6),
                5 => Some(SockType::UnixDgram),
                6 => Some(SockType::UnixStream),
                513 => Some(SockType::TcpSsl),
                _ => None,
            },
            _ => None,
        }
    }
}

/// File-monitor settings handed through to the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitorConfig {
    /// Seconds between scans.
    pub interval: u64,
    /// Paths to watch; empty means the server's own default.
    pub paths: Vec<String>,
}

/// Values given explicitly on the command line.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Overrides {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub daemonize: bool,
}

/// The effective configuration for one invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub mode: ServerMode,
    pub sock_type: SockType,
    pub ssl: bool,
    pub daemonize: bool,
    /// Always ends in `_<port>`.
    pub pid_file_path: PathBuf,
    /// Application directory; the server's working directory.
    pub app_path: PathBuf,
    /// Engine settings, opaque to the supervisor.
    pub server_settings: Mapping,
    pub monitor: Option<MonitorConfig>,
    /// Shared-memory table definitions, opaque to the supervisor.
    pub tables: Option<Value>,
    /// Shell command that runs the server.
    pub command: Option<String>,
}

impl ServerConfig {
    /// `http://host:port` as announced on start.
    pub fn url(&self) -> String {
        let scheme = if self.ssl { "https" } else { "http" };
        format!("{scheme}://{}:{}", self.host, self.port)
    }
}

/// The configuration file contents, a YAML mapping.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PersistedConfig {
    values: Mapping,
    base_dir: PathBuf,
}

impl PersistedConfig {
    /// Loads the configuration file, expanding `${VAR}` references first.
    ///
    /// A missing file is an empty configuration rooted at the file's directory.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let base_dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => env::current_dir()?,
        };

        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                debug!("Config file {:?} not found; using defaults", path);
                return Ok(Self {
                    values: Mapping::new(),
                    base_dir,
                });
            }
            Err(err) => {
                return Err(ConfigError::Read(io::Error::new(
                    err.kind(),
                    format!("{} ({})", err, path.display()),
                )));
            }
        };

        let mut config = Self::from_yaml_str(&expand_env_vars(&content))?;
        config.base_dir = base_dir;
        Ok(config)
    }

    /// Parses YAML text; an empty document is an empty configuration.
    pub fn from_yaml_str(content: &str) -> Result<Self, ConfigError> {
        let values = match serde_yaml::from_str::<Value>(content)? {
            Value::Null => Mapping::new(),
            Value::Mapping(values) => values,
            _ => {
                return Err(ConfigError::Parse(serde_yaml::Error::custom(
                    "top-level configuration must be a mapping",
                )));
            }
        };

        Ok(Self {
            values,
            base_dir: PathBuf::from("."),
        })
    }

    /// Builds a configuration from an existing mapping rooted at `base_dir`.
    pub fn from_mapping(values: Mapping, base_dir: impl Into<PathBuf>) -> Self {
        Self {
            values,
            base_dir: base_dir.into(),
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// `true` when `key` is present and non-empty.
    pub fn is_truthy(&self, key: &str) -> bool {
        self.get(key).is_some_and(is_truthy)
    }

    /// Directory the configuration was loaded from.
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// The application directory: `app_path` if set, else the config directory.
    pub fn app_path(&self) -> PathBuf {
        match self.get("app_path").and_then(non_empty_str) {
            Some(path) => self.base_dir.join(path),
            None => self.base_dir.clone(),
        }
    }
}

/// Merges overrides, persisted values and defaults into a [`ServerConfig`].
#[derive(Debug, Clone, Copy)]
pub struct ConfigResolver<'a> {
    persisted: &'a PersistedConfig,
}

impl<'a> ConfigResolver<'a> {
    pub fn new(persisted: &'a PersistedConfig) -> Self {
        Self { persisted }
    }

    /// Produces the effective configuration. Never fails: malformed values fall back
    /// to their defaults.
    pub fn resolve(&self, overrides: &Overrides) -> ServerConfig {
        let persisted = self.persisted;
        let host = self.host(overrides);
        let port = self.port(overrides);
        let app_path = persisted.app_path();
        let pid_file_path = self.pid_file_path(port);

        let mode = persisted
            .get("mode")
            .and_then(ServerMode::from_value)
            .unwrap_or_default();

        let ssl = persisted.is_truthy("ssl") || persisted.is_truthy("open_http2_protocol");
        let sock_type = if ssl {
            SockType::TcpSsl
        } else {
            persisted
                .get("sock_type")
                .and_then(SockType::from_value)
                .unwrap_or_default()
        };

        let monitor = (persisted.is_truthy("app_debug") || persisted.is_truthy("file_monitor"))
            .then(|| self.monitor());

        let mut server_settings = match persisted.get("server_setting") {
            Some(Value::Mapping(settings)) => settings.clone(),
            _ => Mapping::new(),
        };
        for key in EPHEMERAL_KEYS {
            server_settings.remove(key);
        }

        let daemonize = overrides.daemonize
            || server_settings.get("daemonize").is_some_and(is_truthy);
        server_settings.insert("daemonize".into(), Value::Bool(daemonize));
        server_settings.insert(
            "pid_file".into(),
            Value::String(pid_file_path.to_string_lossy().into_owned()),
        );

        let tables = persisted.get("table").filter(|value| is_truthy(value)).cloned();
        let command = persisted
            .get("command")
            .and_then(non_empty_str)
            .map(str::to_string);

        ServerConfig {
            host,
            port,
            mode,
            sock_type,
            ssl,
            daemonize,
            pid_file_path,
            app_path,
            server_settings,
            monitor,
            tables,
            command,
        }
    }

    /// Explicit host, then persisted `host`, then [`DEFAULT_HOST`].
    pub fn host(&self, overrides: &Overrides) -> String {
        overrides
            .host
            .as_deref()
            .filter(|host| !host.is_empty())
            .or_else(|| self.persisted.get("host").and_then(non_empty_str))
            .unwrap_or(DEFAULT_HOST)
            .to_string()
    }

    /// Explicit port, then persisted `port`, then [`DEFAULT_PORT`].
    pub fn port(&self, overrides: &Overrides) -> u16 {
        overrides
            .port
            .filter(|port| *port != 0)
            .or_else(|| self.persisted.get("port").and_then(port_value))
            .unwrap_or(DEFAULT_PORT)
    }

    /// Persisted `pid_file` (or `<app_path>/server.pid`) suffixed with `_<port>`.
    pub fn pid_file_path(&self, port: u16) -> PathBuf {
        let app_path = self.persisted.app_path();
        let base = match self.persisted.get("pid_file").and_then(non_empty_str) {
            Some(path) => app_path.join(path),
            None => app_path.join(DEFAULT_PID_FILE_NAME),
        };
        port_scoped_path(&base, port)
    }

    fn monitor(&self) -> MonitorConfig {
        let interval = self
            .persisted
            .get("file_monitor_interval")
            .and_then(|value| match value {
                Value::Number(number) => number.as_u64(),
                Value::String(raw) => raw.trim().parse().ok(),
                _ => None,
            })
            .filter(|interval| *interval > 0)
            .unwrap_or(DEFAULT_MONITOR_INTERVAL);

        let paths = match self.persisted.get("file_monitor_path") {
            Some(Value::Sequence(paths)) => paths
                .iter()
                .filter_map(non_empty_str)
                .map(str::to_string)
                .collect(),
            Some(value) => non_empty_str(value).map(str::to_string).into_iter().collect(),
            None => Vec::new(),
        };

        MonitorConfig { interval, paths }
    }
}

/// Appends the literal `_<port>` to `base`, keeping PID files of different ports apart.
pub fn port_scoped_path(base: &Path, port: u16) -> PathBuf {
    let mut path = OsString::from(base.as_os_str());
    path.push(format!("_{port}"));
    PathBuf::from(path)
}

/// Non-empty rule: null, `false`, zero, `""`, `"0"` and empty collections are falsy.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(flag) => *flag,
        Value::Number(number) => number.as_f64().is_some_and(|n| n != 0.0),
        Value::String(text) => !text.is_empty() && text != "0",
        Value::Sequence(items) => !items.is_empty(),
        Value::Mapping(entries) => !entries.is_empty(),
        Value::Tagged(tagged) => is_truthy(&tagged.value),
    }
}

fn non_empty_str(value: &Value) -> Option<&str> {
    value.as_str().map(str::trim).filter(|text| !text.is_empty())
}

fn port_value(value: &Value) -> Option<u16> {
    let port = match value {
        Value::Number(number) => u16::try_from(number.as_u64()?).ok()?,
        Value::String(raw) => raw.trim().parse::<u16>().ok()?,
        _ => return None,
    };
    (port != 0).then_some(port)
}

fn env_var_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("valid env var pattern")
    })
}

/// Expands `${VAR}` references. Unset variables expand to nothing.
///
/// Bare `$VAR` is left alone so hook commands can read `$SERVER_PID` at run time.
fn expand_env_vars(input: &str) -> String {
    env_var_pattern()
        .replace_all(input, |caps: &regex::Captures| {
            let name = &caps[1];
            env::var(name).unwrap_or_else(|_| {
                warn!("Environment variable '{name}' is not set; expanding to empty");
                String::new()
            })
        })
        .into_owned()
}
