//! Client configuration.
//!
//! Values come from serde defaults, optionally overridden by environment
//! variables:
//!
//! - `ARENA_API_BASE_URL`: REST base URL, e.g. `https://arena.example.com`
//! - `ARENA_SOCKET_BASE_URL`: socket base URL when it differs from the REST host
//! - `ARENA_DATA_DIR`: directory holding the persisted credential file
//! - `ARENA_REQUEST_TIMEOUT_SECS`: HTTP and socket connect timeout

use std::path::PathBuf;
use std::time::Duration;

use reqwest::Url;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_API_BASE_URL: &str = "http://localhost:8000";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid URL {url:?}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("invalid value for {key}: {value:?}")]
    InvalidValue { key: &'static str, value: String },
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ClientConfig {
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
    #[serde(default)]
    pub socket_base_url: Option<String>,
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_api_base_url() -> String {
    DEFAULT_API_BASE_URL.to_string()
}

fn default_data_dir() -> PathBuf {
    PathBuf::from(".arena")
}

fn default_request_timeout_secs() -> u64 {
    30
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_base_url: default_api_base_url(),
            socket_base_url: None,
            data_dir: default_data_dir(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl ClientConfig {
    /// Build a config from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(url) = lookup("ARENA_API_BASE_URL") {
            config.api_base_url = url;
        }
        if let Some(url) = lookup("ARENA_SOCKET_BASE_URL") {
            config.socket_base_url = Some(url);
        }
        if let Some(dir) = lookup("ARENA_DATA_DIR") {
            config.data_dir = PathBuf::from(dir);
        }
        if let Some(raw) = lookup("ARENA_REQUEST_TIMEOUT_SECS") {
            config.request_timeout_secs = raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
                key: "ARENA_REQUEST_TIMEOUT_SECS",
                value: raw.clone(),
            })?;
        }

        config.socket_base()?;
        Ok(config)
    }

    /// `None` when timeouts are disabled (zero seconds).
    pub fn request_timeout(&self) -> Option<Duration> {
        (self.request_timeout_secs > 0).then(|| Duration::from_secs(self.request_timeout_secs))
    }

    /// Base URL for room sockets, with the scheme upgraded to its socket
    /// counterpart (`http` to `ws`, `https` to `wss`).
    pub fn socket_base(&self) -> Result<Url, ConfigError> {
        let raw = self
            .socket_base_url
            .as_deref()
            .unwrap_or(&self.api_base_url);

        let mut url = Url::parse(raw).map_err(|e| ConfigError::InvalidUrl {
            url: raw.to_string(),
            reason: e.to_string(),
        })?;

        let scheme = match url.scheme() {
            "http" | "ws" => "ws",
            "https" | "wss" => "wss",
            other => {
                return Err(ConfigError::InvalidUrl {
                    url: raw.to_string(),
                    reason: format!("unsupported scheme {other:?}"),
                });
            }
        };

        url.set_scheme(scheme).map_err(|_| ConfigError::InvalidUrl {
            url: raw.to_string(),
            reason: "cannot change scheme".to_string(),
        })?;

        Ok(url)
    }
}
