//! Server configuration
//!
//! `RawConfig` mirrors the JSON file / CLI surface where every field may be
//! missing. `ServerConfig` is the validated, immutable value the server runs
//! with; nothing optional reaches the connection path.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use crate::crypto::{CipherError, CipherKind};

pub const DEFAULT_LISTEN_ADDR: &str = "127.0.0.1";
pub const DEFAULT_LISTEN_PORT: u16 = 1080;
pub const DEFAULT_CIPHER: &str = "aes-256-cfb";
pub const DEFAULT_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),

    #[error(transparent)]
    UnsupportedCipher(#[from] CipherError),
}

/// Which destinations go through the relay
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProxyMode {
    /// Every non-local destination is relayed
    #[default]
    Global,
    /// Destinations matching the blacklist connect directly
    Blacklist,
    /// Destinations matching the whitelist are relayed
    Whitelist,
}

/// Config as written in a file; every field optional
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RawConfig {
    pub server_addr: Option<String>,
    pub server_port: Option<u16>,
    pub listen_addr: Option<String>,
    pub listen_port: Option<u16>,
    pub cipher_algorithm: Option<String>,
    pub password: Option<String>,
    /// Per-read timeout in seconds
    pub timeout: Option<u64>,
    pub bypass_local: Option<bool>,
    pub black_list: Option<Vec<String>>,
    pub white_list: Option<Vec<String>>,
    pub proxy_mode: Option<ProxyMode>,
}

impl RawConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Fields set in `other` win
    pub fn merge(self, other: RawConfig) -> RawConfig {
        RawConfig {
            server_addr: other.server_addr.or(self.server_addr),
            server_port: other.server_port.or(self.server_port),
            listen_addr: other.listen_addr.or(self.listen_addr),
            listen_port: other.listen_port.or(self.listen_port),
            cipher_algorithm: other.cipher_algorithm.or(self.cipher_algorithm),
            password: other.password.or(self.password),
            timeout: other.timeout.or(self.timeout),
            bypass_local: other.bypass_local.or(self.bypass_local),
            black_list: other.black_list.or(self.black_list),
            white_list: other.white_list.or(self.white_list),
            proxy_mode: other.proxy_mode.or(self.proxy_mode),
        }
    }
}

/// Validated configuration of one running server
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub server_addr: String,
    pub server_port: u16,
    pub listen_addr: String,
    pub listen_port: u16,
    pub cipher: CipherKind,
    pub password: String,
    pub timeout: Duration,
    pub bypass_local: bool,
    pub black_list: Vec<String>,
    pub white_list: Vec<String>,
    pub proxy_mode: ProxyMode,
}

impl ServerConfig {
    /// Config for `server_addr:server_port` with defaults for everything else
    pub fn new(server_addr: impl Into<String>, server_port: u16, password: impl Into<String>) -> Self {
        Self {
            server_addr: server_addr.into(),
            server_port,
            listen_addr: DEFAULT_LISTEN_ADDR.to_string(),
            listen_port: DEFAULT_LISTEN_PORT,
            cipher: CipherKind::Aes256Cfb,
            password: password.into(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            bypass_local: true,
            black_list: Vec::new(),
            white_list: Vec::new(),
            proxy_mode: ProxyMode::Global,
        }
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        RawConfig::load(path)?.try_into()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server_addr.trim().is_empty() {
            return Err(ConfigError::Invalid("server address is empty".into()));
        }
        if self.server_port == 0 {
            return Err(ConfigError::Invalid("server port must be non-zero".into()));
        }
        if self.listen_addr.trim().is_empty() {
            return Err(ConfigError::Invalid("listen address is empty".into()));
        }
        if self.password.is_empty() {
            return Err(ConfigError::Invalid("password is empty".into()));
        }
        if self.timeout.is_zero() {
            return Err(ConfigError::Invalid("timeout must be positive".into()));
        }
        Ok(())
    }
}

impl TryFrom<RawConfig> for ServerConfig {
    type Error = ConfigError;

    fn try_from(raw: RawConfig) -> Result<Self, Self::Error> {
        let server_addr = raw
            .server_addr
            .ok_or_else(|| ConfigError::Invalid("missing server address".into()))?;
        let server_port = raw
            .server_port
            .ok_or_else(|| ConfigError::Invalid("missing server port".into()))?;
        let password = raw
            .password
            .ok_or_else(|| ConfigError::Invalid("missing password".into()))?;
        let cipher = raw
            .cipher_algorithm
            .as_deref()
            .unwrap_or(DEFAULT_CIPHER)
            .parse::<CipherKind>()?;

        let config = ServerConfig {
            server_addr,
            server_port,
            listen_addr: raw
                .listen_addr
                .unwrap_or_else(|| DEFAULT_LISTEN_ADDR.to_string()),
            listen_port: raw.listen_port.unwrap_or(DEFAULT_LISTEN_PORT),
            cipher,
            password,
            timeout: Duration::from_secs(raw.timeout.unwrap_or(DEFAULT_TIMEOUT_SECS)),
            bypass_local: raw.bypass_local.unwrap_or(true),
            black_list: raw.black_list.unwrap_or_default(),
            white_list: raw.white_list.unwrap_or_default(),
            proxy_mode: raw.proxy_mode.unwrap_or_default(),
        };
        config.validate()?;
        Ok(config)
    }
}

/// Two entries are the same server when endpoints and credentials match
impl PartialEq for ServerConfig {
    fn eq(&self, other: &Self) -> bool {
        self.server_addr == other.server_addr
            && self.server_port == other.server_port
            && self.listen_addr == other.listen_addr
            && self.listen_port == other.listen_port
            && self.cipher == other.cipher
            && self.password == other.password
    }
}

impl Eq for ServerConfig {}
