//! Settings for `taskline-peer`.
//!
//! Command-line flags (and their environment variables) win over
//! `~/.config/taskline-peer/config.toml`, which wins over built-in values.
//!
//! ```toml
//! [server]
//! bind_addr = "0.0.0.0:5000"
//! max_request_size = 65536
//!
//! [storage]
//! state_file = "/var/lib/taskline/peer.json"
//! ```

use std::path::{Path, PathBuf};

use crate::server::DEFAULT_MAX_REQUEST_SIZE;

/// Address the peer listens on when nothing else is configured.
pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:5000";

/// Problems with the peer's TOML file.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("cannot read {path}: {source}")]
    ReadFile {
        /// File that was read.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The file is not valid TOML for these settings.
    #[error("invalid peer config: {0}")]
    ParseToml(#[from] toml::de::Error),
}

// ----- file layout -----

#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct PeerFileConfig {
    server: ServerSection,
    storage: StorageSection,
}

#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct ServerSection {
    bind_addr: Option<String>,
    max_request_size: Option<usize>,
}

#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct StorageSection {
    state_file: Option<PathBuf>,
}

// ----- command line -----

/// Flags of the `taskline-peer` binary.
#[derive(clap::Parser, Debug, Default)]
#[command(version, about = "Reference remote store for taskline clients")]
pub struct PeerCliArgs {
    /// `<address>:<port>` to accept clients on.
    #[arg(short, long, env = "TASKLINE_PEER_ADDR")]
    pub bind: Option<String>,

    /// TOML settings file.
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Keep the table in this JSON file instead of only in memory.
    #[arg(long, env = "TASKLINE_PEER_STATE")]
    pub state_file: Option<PathBuf>,

    /// Requests longer than this many bytes are dropped.
    #[arg(long)]
    pub max_request_size: Option<usize>,

    /// Tracing filter, e.g. `debug` or `taskline_peer=trace`.
    #[arg(long, default_value = "info", env = "TASKLINE_PEER_LOG")]
    pub log_level: String,
}

/// Settings the peer runs with.
#[derive(Debug, Clone)]
pub struct PeerConfig {
    /// Listen address.
    pub bind_addr: String,
    /// Backing file for the table; `None` keeps it in memory.
    pub state_file: Option<PathBuf>,
    /// Request size cap in bytes.
    pub max_request_size: usize,
    /// Tracing filter.
    pub log_level: String,
}

impl Default for PeerConfig {
    fn default() -> Self {
        Self {
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
            state_file: None,
            max_request_size: DEFAULT_MAX_REQUEST_SIZE,
            log_level: "info".to_string(),
        }
    }
}

impl PeerConfig {
    /// Reads the TOML file (the `--config` one, or the per-user default if
    /// it exists) and layers the flags over it.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if a file that should be read cannot be read
    /// or parsed.
    pub fn load(cli: &PeerCliArgs) -> Result<Self, ConfigError> {
        let file = read_file_config(cli.config.as_deref())?;
        Ok(Self::resolve(cli, &file))
    }

    fn resolve(cli: &PeerCliArgs, file: &PeerFileConfig) -> Self {
        let defaults = Self::default();

        // A zero cap would reject every request.
        let max_request_size = cli
            .max_request_size
            .or(file.server.max_request_size)
            .filter(|size| *size > 0)
            .unwrap_or(defaults.max_request_size);

        Self {
            bind_addr: cli
                .bind
                .clone()
                .or_else(|| file.server.bind_addr.clone())
                .unwrap_or(defaults.bind_addr),
            state_file: cli
                .state_file
                .clone()
                .or_else(|| file.storage.state_file.clone()),
            max_request_size,
            log_level: if cli.log_level.is_empty() {
                defaults.log_level
            } else {
                cli.log_level.clone()
            },
        }
    }
}

fn read_file_config(explicit: Option<&Path>) -> Result<PeerFileConfig, ConfigError> {
    let (path, required) = match explicit {
        Some(p) => (p.to_path_buf(), true),
        None => match dirs::config_dir() {
            Some(dir) => (dir.join("taskline-peer").join("config.toml"), false),
            None => return Ok(PeerFileConfig::default()),
        },
    };

    match std::fs::read_to_string(&path) {
        Ok(contents) => Ok(toml::from_str(&contents)?),
        Err(e) if !required && e.kind() == std::io::ErrorKind::NotFound => {
            Ok(PeerFileConfig::default())
        }
        Err(source) => Err(ConfigError::ReadFile { path, source }),
    }
}
