//! Configuration system for Coffer.
//!
//! Resolution order: environment variables → config file → defaults.
//!
//! Config file location:
//!   1. $COFFER_CONFIG (explicit override)
//!   2. $XDG_CONFIG_HOME/coffer/config.toml
//!   3. ~/.config/coffer/config.toml

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CofferConfig {
    pub connection: ConnectionConfig,
    pub transfer: TransferSettings,
    pub backend: BackendSettings,
}

/// Identity used by `Connection::from_config`.
#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    pub user_id: String,
    /// Hex-encoded X25519 private key.
    pub private_key: String,
}

impl std::fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("user_id", &self.user_id)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransferSettings {
    /// Chunk size used by the upload helpers.
    pub write_chunk_size: usize,
    /// Chunk size used by the download helpers.
    pub read_chunk_size: usize,
    /// Compare the downloaded content against the checksum recorded at
    /// finalization.
    pub verify_checksums: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendSettings {
    /// Largest chunk accepted per read or write call. Announced at open time.
    pub max_chunk_size: usize,
}

// ── Defaults ──────────────────────────────────────────────────────────────────

impl Default for TransferSettings {
    fn default() -> Self {
        Self {
            write_chunk_size: 256 * 1024,
            read_chunk_size: 256 * 1024,
            verify_checksums: true,
        }
    }
}

impl Default for BackendSettings {
    fn default() -> Self {
        Self {
            max_chunk_size: 1024 * 1024, // 1 MiB
        }
    }
}

// ── Path helpers ──────────────────────────────────────────────────────────────

/// Environment lookup. Tests pass a fixed map in place of the process
/// environment.
type Env<'a> = &'a dyn Fn(&str) -> Option<String>;

fn process_env(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

fn config_dir(env: Env<'_>) -> PathBuf {
    env("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|| {
            env("HOME")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("/tmp"))
                .join(".config")
        })
        .join("coffer")
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {0}: {1}")]
    ReadFailed(PathBuf, std::io::Error),
    #[error("failed to parse {0}: {1}")]
    ParseFailed(PathBuf, toml::de::Error),
    #[error("failed to write {0}: {1}")]
    WriteFailed(PathBuf, std::io::Error),
    #[error("failed to serialize: {0}")]
    SerializeFailed(toml::ser::Error),
    #[error("invalid setting {0}: {1}")]
    Invalid(&'static str, String),
}

// ── Loading ───────────────────────────────────────────────────────────────────

impl CofferConfig {
    /// Load config: env vars → file → defaults.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_with_env(&process_env)
    }

    fn load_with_env(env: Env<'_>) -> Result<Self, ConfigError> {
        let mut config = Self::load_from(&Self::path_from_env(env))?;
        config.apply_env_overrides(env);
        config.validate()?;
        Ok(config)
    }

    /// Load from an explicit path without env overrides. A missing file
    /// yields defaults.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(CofferConfig::default());
        }
        let text = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadFailed(path.to_path_buf(), e))?;
        toml::from_str(&text).map_err(|e| ConfigError::ParseFailed(path.to_path_buf(), e))
    }

    /// Config file path.
    pub fn file_path() -> PathBuf {
        Self::path_from_env(&process_env)
    }

    fn path_from_env(env: Env<'_>) -> PathBuf {
        env("COFFER_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|| config_dir(env).join("config.toml"))
    }

    /// Write the default config to `path` unless a file is already there.
    /// Returns true if a file was written.
    pub fn write_default_if_missing(path: &Path) -> Result<bool, ConfigError> {
        if path.exists() {
            return Ok(false);
        }
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| ConfigError::WriteFailed(path.to_path_buf(), e))?;
        }
        let text =
            toml::to_string_pretty(&CofferConfig::default()).map_err(ConfigError::SerializeFailed)?;
        std::fs::write(path, text).map_err(|e| ConfigError::WriteFailed(path.to_path_buf(), e))?;
        Ok(true)
    }

    /// Chunk sizes must be non-zero and fit under the backend maximum.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let max = self.backend.max_chunk_size;
        if max == 0 {
            return Err(ConfigError::Invalid("backend.max_chunk_size", "must be > 0".into()));
        }
        for (name, size) in [
            ("transfer.write_chunk_size", self.transfer.write_chunk_size),
            ("transfer.read_chunk_size", self.transfer.read_chunk_size),
        ] {
            if size == 0 || size > max {
                return Err(ConfigError::Invalid(
                    name,
                    format!("{size} is outside 1..={max}"),
                ));
            }
        }
        Ok(())
    }

    /// Apply COFFER_SECTION__KEY env var overrides. Unparseable numbers are
    /// ignored.
    fn apply_env_overrides(&mut self, env: Env<'_>) {
        if let Some(v) = env("COFFER_CONNECTION__USER_ID") {
            self.connection.user_id = v;
        }
        if let Some(v) = env("COFFER_CONNECTION__PRIVATE_KEY") {
            self.connection.private_key = v;
        }
        if let Some(n) = env("COFFER_TRANSFER__WRITE_CHUNK_SIZE").and_then(|v| v.parse().ok()) {
            self.transfer.write_chunk_size = n;
        }
        if let Some(n) = env("COFFER_TRANSFER__READ_CHUNK_SIZE").and_then(|v| v.parse().ok()) {
            self.transfer.read_chunk_size = n;
        }
        if let Some(v) = env("COFFER_TRANSFER__VERIFY_CHECKSUMS") {
            self.transfer.verify_checksums = v == "true" || v == "1";
        }
        if let Some(n) = env("COFFER_BACKEND__MAX_CHUNK_SIZE").and_then(|v| v.parse().ok()) {
            self.backend.max_chunk_size = n;
        }
    }
}
