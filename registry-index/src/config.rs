//! # Configuration Management
//!
//! Configuration for the index server, loaded from a JSON file with the
//! built-in `config.json` as fallback.
//!
//! - [`ServerConfig`]: bind address and advertised registry endpoints
//! - [`StorageConfig`]: content store backend and data directory
//! - [`SearchConfig`]: search backend name
//! - [`MirroringConfig`]: optional upstream index to mirror
//!
//! ```rust,no_run
//! # use registry_index::config::Config;
//! let config = Config::load_or_default("index.json")?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use crate::error::{AppError, AppResult};
use crate::search::UpstreamConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration structure for the index server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub mirroring: MirroringConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host/IP address to bind to
    pub host: String,
    /// Port number to listen on
    pub port: u16,
    /// Value of `X-Docker-Endpoints`; the request `Host` header when unset
    #[serde(default)]
    pub endpoints: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// `local` or `memory`
    pub backend: String,
    /// Root directory of the `local` backend
    pub data_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Name of the search backend, see `search::SEARCH_BACKENDS`
    pub backend: String,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            backend: "memory".to_string(),
        }
    }
}

/// Mirroring is enabled when `source_index` is set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MirroringConfig {
    pub source_index: Option<String>,
    #[serde(default = "default_mirror_timeout")]
    pub timeout_secs: u64,
}

fn default_mirror_timeout() -> u64 {
    10
}

impl Default for MirroringConfig {
    fn default() -> Self {
        Self {
            source_index: None,
            timeout_secs: default_mirror_timeout(),
        }
    }
}

impl MirroringConfig {
    pub fn is_enabled(&self) -> bool {
        self.source_index
            .as_deref()
            .is_some_and(|source| !source.trim().is_empty())
    }

    /// Upstream client settings, or `None` when not mirroring.
    pub fn upstream_config(&self) -> Option<UpstreamConfig> {
        if !self.is_enabled() {
            return None;
        }
        Some(UpstreamConfig {
            source_index: self.source_index.clone().unwrap_or_default(),
            timeout: Duration::from_secs(self.timeout_secs),
            enabled: true,
        })
    }
}

impl Config {
    /// Load configuration from a JSON file.
    ///
    /// # Errors
    ///
    /// Fails if the file cannot be read or does not match the expected format.
    pub fn load<P: AsRef<Path>>(path: P) -> AppResult<Self> {
        let config_str = fs::read_to_string(path)?;
        let config = serde_json::from_str(&config_str)?;
        Ok(config)
    }

    /// Load configuration from file with fallback to defaults.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> AppResult<Self> {
        if path.as_ref().exists() {
            Self::load(path)
        } else {
            Self::embedded()
        }
    }

    fn embedded() -> AppResult<Self> {
        serde_json::from_str(include_str!("../config.json"))
            .map_err(|e| AppError::InternalError(format!("Embedded config.json is invalid: {e}")))
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 5000,
                endpoints: None,
            },
            storage: StorageConfig {
                backend: "local".to_string(),
                data_dir: PathBuf::from("./data"),
            },
            search: SearchConfig::default(),
            mirroring: MirroringConfig::default(),
        }
    }
}
