//! Configuration for the `taskline` client.
//!
//! Supports layered configuration with the following priority (highest first):
//! 1. CLI arguments
//! 2. Environment variables (via clap `env` attribute)
//! 3. TOML config file (`~/.config/taskline/config.toml`)
//! 4. Compiled defaults
//!
//! Missing config file is not an error (defaults are used). An explicit
//! `--config` path that doesn't exist is an error.

pub mod endpoint;

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::NaiveDate;

pub use endpoint::Endpoint;

use crate::client::DEFAULT_CONNECT_TIMEOUT;
use crate::store::TaskView;

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config file {path}: {source}")]
    ReadFile {
        /// Path that was attempted.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Failed to parse the TOML configuration.
    #[error("failed to parse config file: {0}")]
    ParseToml(#[from] toml::de::Error),
}

// ---------------------------------------------------------------------------
// TOML file structs (all fields Option for partial overrides)
// ---------------------------------------------------------------------------

#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct ConfigFile {
    peer: PeerFileConfig,
    storage: StorageFileConfig,
    engine: EngineFileConfig,
}

/// `[peer]` section.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct PeerFileConfig {
    endpoint: Option<String>,
    endpoint_file: Option<PathBuf>,
    connect_timeout_secs: Option<u64>,
}

/// `[storage]` section.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct StorageFileConfig {
    state_file: Option<PathBuf>,
}

/// `[engine]` section.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct EngineFileConfig {
    channel_capacity: Option<usize>,
}

// ---------------------------------------------------------------------------
// Resolved configuration
// ---------------------------------------------------------------------------

/// Fully resolved client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Remote peer address.
    pub endpoint: Endpoint,
    /// Bound on establishing each connection.
    pub connect_timeout: Duration,
    /// JSON file holding the local task list.
    pub state_file: PathBuf,
    /// Capacity of the engine inbox and event channel.
    pub channel_capacity: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            endpoint: Endpoint::default(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            state_file: default_state_file(),
            channel_capacity: 64,
        }
    }
}

impl ClientConfig {
    /// Load configuration by merging CLI args, env vars, and a TOML file.
    ///
    /// If `--config` is given and the file does not exist, returns an error.
    /// Otherwise the default path (`~/.config/taskline/config.toml`) is tried
    /// and silently ignored if missing.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the config file cannot be read or parsed.
    pub fn load(cli: &CliArgs) -> Result<Self, ConfigError> {
        let file = load_config_file(cli.config.as_deref())?;
        Ok(Self::resolve(cli, &file))
    }

    /// Priority: CLI > file > default. Separate from `load()` so it can be
    /// tested without CLI parsing.
    fn resolve(cli: &CliArgs, file: &ConfigFile) -> Self {
        let defaults = Self::default();

        let endpoint = if let Some(text) = &cli.endpoint {
            Endpoint::parse_or_default(text, "--endpoint")
        } else if let Some(path) = &cli.endpoint_file {
            Endpoint::load_file(path)
        } else if let Some(text) = &file.peer.endpoint {
            Endpoint::parse_or_default(text, "[peer] endpoint")
        } else if let Some(path) = &file.peer.endpoint_file {
            Endpoint::load_file(path)
        } else {
            defaults.endpoint
        };

        Self {
            endpoint,
            connect_timeout: file
                .peer
                .connect_timeout_secs
                .map_or(defaults.connect_timeout, Duration::from_secs),
            state_file: cli
                .state_file
                .clone()
                .or_else(|| file.storage.state_file.clone())
                .unwrap_or(defaults.state_file),
            channel_capacity: file
                .engine
                .channel_capacity
                .filter(|c| *c > 0)
                .unwrap_or(defaults.channel_capacity),
        }
    }
}

/// `<data dir>/taskline/tasks.json`, or the temp dir when there is no data
/// dir.
fn default_state_file() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("taskline")
        .join("tasks.json")
}

// ---------------------------------------------------------------------------
// CLI
// ---------------------------------------------------------------------------

/// CLI arguments parsed by clap.
#[derive(clap::Parser, Debug, Default)]
#[command(version, about = "Offline-first task list synced with a remote peer")]
pub struct CliArgs {
    /// Remote peer as `<address>:<port>`.
    #[arg(long, env = "TASKLINE_ENDPOINT")]
    pub endpoint: Option<String>,

    /// File whose first line is the `<address>:<port>` of the peer.
    #[arg(long, env = "TASKLINE_ENDPOINT_FILE")]
    pub endpoint_file: Option<PathBuf>,

    /// Local task list (default: `<data dir>/taskline/tasks.json`).
    #[arg(long, env = "TASKLINE_STATE_FILE")]
    pub state_file: Option<PathBuf>,

    /// Path to config file (default: `~/.config/taskline/config.toml`).
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Log level filter (trace, debug, info, warn, error).
    #[arg(long, default_value = "info", env = "TASKLINE_LOG")]
    pub log_level: String,

    /// Path to log file (default: `$TMPDIR/taskline.log`).
    #[arg(long)]
    pub log_file: Option<PathBuf>,

    /// What to do; defaults to `list`.
    #[command(subcommand)]
    pub command: Option<CliCommand>,
}

/// Subcommands of the `taskline` binary.
#[derive(clap::Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum CliCommand {
    /// Show tasks.
    List {
        /// Which days to show.
        #[arg(long, value_enum, default_value = "all")]
        view: ViewArg,
    },
    /// Add a task.
    Add {
        /// Task name.
        name: String,
        /// Day as `YYYY-MM-DD` (default: today).
        #[arg(long)]
        date: Option<NaiveDate>,
    },
    /// Mark a task done.
    Done {
        /// Task name.
        name: String,
        /// Day as `YYYY-MM-DD` (default: today).
        #[arg(long)]
        date: Option<NaiveDate>,
    },
    /// Mark a task not done.
    Undo {
        /// Task name.
        name: String,
        /// Day as `YYYY-MM-DD` (default: today).
        #[arg(long)]
        date: Option<NaiveDate>,
    },
    /// Delete a task.
    Rm {
        /// Task name.
        name: String,
        /// Day as `YYYY-MM-DD` (default: today).
        #[arg(long)]
        date: Option<NaiveDate>,
    },
    /// Replay queued changes and refresh from the peer.
    Sync,
}

/// `--view` values.
#[derive(clap::ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewArg {
    /// Every task.
    All,
    /// Tasks dated today.
    Today,
    /// Tasks dated before today.
    Past,
    /// Tasks dated after today.
    Future,
}

impl From<ViewArg> for TaskView {
    fn from(view: ViewArg) -> Self {
        match view {
            ViewArg::All => Self::All,
            ViewArg::Today => Self::Today,
            ViewArg::Past => Self::Past,
            ViewArg::Future => Self::Future,
        }
    }
}

// ---------------------------------------------------------------------------
// Internal helpers
// ---------------------------------------------------------------------------

/// Load and parse a TOML config file.
///
/// If `explicit_path` is `Some`, the file must exist (error if not).
/// If `explicit_path` is `None`, the default path is tried and missing file
/// is treated as empty config.
fn load_config_file(explicit_path: Option<&Path>) -> Result<ConfigFile, ConfigError> {
    if let Some(p) = explicit_path {
        let contents = std::fs::read_to_string(p).map_err(|e| ConfigError::ReadFile {
            path: p.to_path_buf(),
            source: e,
        })?;
        return Ok(toml::from_str(&contents)?);
    }

    let Some(config_dir) = dirs::config_dir() else {
        return Ok(ConfigFile::default());
    };
    let path = config_dir.join("taskline").join("config.toml");
    match std::fs::read_to_string(&path) {
        Ok(contents) => Ok(toml::from_str(&contents)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(ConfigFile::default()),
        Err(e) => Err(ConfigError::ReadFile { path, source: e }),
    }
}
