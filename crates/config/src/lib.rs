//! Caller-controlled configuration for a HAP client.
//!
//! Three sources, in priority order: `HAP_*`-prefixed environment
//! variables, a `hap.toml` file (current directory, then
//! `~/.config/hap/hap.toml`), then the defaults below.
//!
//! ```toml
//! use_persistent_connections = true
//! subscriptions_use_same_connection = true
//! operation_timeout_secs = 45
//! pair_setup_method = 0
//! pair_setup_flags = 0
//! ```
//!
//! ```bash
//! export HAP_OPERATION_TIMEOUT_SECS=10
//! ```

use hap_pairing::Method;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("configuration file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("failed to read config file {path}: {source}")]
    ReadError { path: PathBuf, source: std::io::Error },

    #[error("failed to parse toml in {path}: {source}")]
    ParseError { path: PathBuf, source: toml::de::Error },

    #[error("invalid configuration: {0}")]
    ValidationError(String),
}

/// Connection-reuse policy, timeouts, and pairing defaults controlled
/// by the caller rather than inferred by the client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Keep the verified default connection open across operations
    /// instead of reconnecting per operation.
    pub use_persistent_connections: bool,
    /// Multiplex the event stream over the default connection instead
    /// of opening a dedicated subscription connection.
    pub subscriptions_use_same_connection: bool,
    /// Watchdog applied to every BLE operation; on IP this bounds the
    /// underlying TCP/HTTP round trip.
    pub operation_timeout_secs: u64,
    /// `Method` used by `pairSetup`'s convenience composition when the
    /// caller does not specify one explicitly.
    pub pair_setup_method: PairSetupMethodConfig,
    /// `Flags` combined with bitwise OR and sent in Pair-Setup M1.
    pub pair_setup_flags: u32,
}

/// Serializable stand-in for [`hap_pairing::Method`] (which carries no
/// `serde` impls of its own, being a protocol wire value rather than a
/// config value).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PairSetupMethodConfig {
    PairSetup,
    PairSetupWithAuth,
}

impl From<PairSetupMethodConfig> for Method {
    fn from(value: PairSetupMethodConfig) -> Self {
        match value {
            PairSetupMethodConfig::PairSetup => Method::PairSetup,
            PairSetupMethodConfig::PairSetupWithAuth => Method::PairSetupWithAuth,
        }
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            use_persistent_connections: false,
            subscriptions_use_same_connection: false,
            operation_timeout_secs: 30,
            pair_setup_method: PairSetupMethodConfig::PairSetup,
            pair_setup_flags: 0,
        }
    }
}

impl ClientConfig {
    pub fn operation_timeout(&self) -> Duration {
        Duration::from_secs(self.operation_timeout_secs)
    }

    /// Load with priority env > file > defaults.
    ///
    /// # Errors
    /// Returns an error if a discovered `hap.toml` exists but can't be
    /// read or parsed, or if the resulting configuration fails
    /// [`Self::validate`].
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = match Self::find_config_file() {
            Some(path) => Self::load_from_file(&path)?,
            None => Self::default(),
        };
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// # Arguments
    /// - `path`: path to a `hap.toml`-shaped file
    ///
    /// # Errors
    /// Returns an error if `path` doesn't exist, can't be read, or
    /// doesn't parse as the expected TOML shape.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.to_path_buf()));
        }
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::ReadError {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::ParseError { path: path.to_path_buf(), source })
    }

    fn find_config_file() -> Option<PathBuf> {
        let local = PathBuf::from("hap.toml");
        if local.exists() {
            return Some(local);
        }
        let user = dirs::home_dir()?.join(".config").join("hap").join("hap.toml");
        user.exists().then_some(user)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("HAP_USE_PERSISTENT_CONNECTIONS") {
            if let Ok(v) = v.parse() {
                self.use_persistent_connections = v;
            }
        }
        if let Ok(v) = std::env::var("HAP_SUBSCRIPTIONS_USE_SAME_CONNECTION") {
            if let Ok(v) = v.parse() {
                self.subscriptions_use_same_connection = v;
            }
        }
        if let Ok(v) = std::env::var("HAP_OPERATION_TIMEOUT_SECS") {
            if let Ok(v) = v.parse() {
                self.operation_timeout_secs = v;
            }
        }
    }

    /// # Errors
    /// Returns an error if `operation_timeout_secs` is zero.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.operation_timeout_secs == 0 {
            return Err(ConfigError::ValidationError("operation_timeout_secs must be non-zero".to_string()));
        }
        Ok(())
    }
}
