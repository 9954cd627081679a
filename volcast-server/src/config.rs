//! Service configuration.
//!
//! Layers, lowest to highest precedence: built-in defaults, an optional TOML
//! file, a `.env` file in the working directory, the process environment.
//! `PRIVATE_KEY` is only ever read from the environment.

use serde::{Deserialize, Serialize};
use std::env;
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("read config {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("parse config {path}: {reason}")]
    Parse { path: PathBuf, reason: String },
}

#[derive(Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServiceConfig {
    pub bind: String,
    pub port: u16,
    pub alpha_api_key: String,
    pub alpha_base_url: String,
    pub data_dir: PathBuf,
    pub model_directory: PathBuf,
    /// Ticker used when a CLI command omits one.
    pub test_ticker: String,
    pub testnet_rpc: String,
    pub mainnet_rpc: String,
    pub cors_origins: Vec<String>,
    #[serde(skip)]
    pub private_key: Option<String>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1".into(),
            port: 8008,
            alpha_api_key: "YOUR_API_KEY".into(),
            alpha_base_url: volcast_core::data::alpha_vantage::DEFAULT_BASE_URL.into(),
            data_dir: PathBuf::from("data"),
            model_directory: PathBuf::from("models"),
            test_ticker: "SHOPERSTOP.BSE".into(),
            testnet_rpc: "https://rpc.testnet.mantle.xyz".into(),
            mainnet_rpc: "https://rpc.mantle.xyz".into(),
            cors_origins: vec![
                "http://localhost:3000".into(),
                "http://127.0.0.1:3000".into(),
            ],
            private_key: None,
        }
    }
}

impl fmt::Debug for ServiceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceConfig")
            .field("bind", &self.bind)
            .field("port", &self.port)
            .field("alpha_base_url", &self.alpha_base_url)
            .field("data_dir", &self.data_dir)
            .field("model_directory", &self.model_directory)
            .field("test_ticker", &self.test_ticker)
            .field("testnet_rpc", &self.testnet_rpc)
            .field("mainnet_rpc", &self.mainnet_rpc)
            .field("cors_origins", &self.cors_origins)
            .field("alpha_api_key", &"<redacted>")
            .field(
                "private_key",
                &self.private_key.as_ref().map(|_| "<redacted>"),
            )
            .finish()
    }
}

impl ServiceConfig {
    /// Full layered load. `path` is the optional TOML file.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut cfg = match path {
            Some(path) => Self::from_toml_file(path)?,
            None => Self::default(),
        };
        dotenv::dotenv().ok();
        cfg.apply_overrides(|name| env::var(name).ok());
        Ok(cfg)
    }

    pub fn from_toml_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    /// Apply variable overrides; blank values are ignored.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let get = |name: &str| {
            lookup(name)
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
        };

        if let Some(v) = get("VOLCAST_BIND") {
            self.bind = v;
        }
        if let Some(port) = get("VOLCAST_PORT").and_then(|v| v.parse().ok()) {
            self.port = port;
        }
        if let Some(v) = get("ALPHA_API_KEY") {
            self.alpha_api_key = v;
        }
        if let Some(v) = get("ALPHA_BASE_URL") {
            self.alpha_base_url = v;
        }
        if let Some(v) = get("DATA_DIR") {
            self.data_dir = PathBuf::from(v);
        }
        if let Some(v) = get("MODEL_DIRECTORY") {
            self.model_directory = PathBuf::from(v);
        }
        if let Some(v) = get("TEST_TICKER") {
            self.test_ticker = v;
        }
        if let Some(v) = get("MANTLE_TESTNET_RPC") {
            self.testnet_rpc = v;
        }
        if let Some(v) = get("MANTLE_MAINNET_RPC") {
            self.mainnet_rpc = v;
        }
        if let Some(v) = get("CORS_ORIGINS") {
            self.cors_origins = v
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }
        if let Some(v) = get("PRIVATE_KEY") {
            self.private_key = Some(v);
        }
    }

    pub fn socket_addr(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }
}
