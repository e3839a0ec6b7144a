//! Configuration system for Convoy.
//!
//! Resolution order: environment variables → config file → defaults.
//!
//! Config file location:
//!   1. $CONVOY_CONFIG (explicit override)
//!   2. $XDG_CONFIG_HOME/convoy/config.toml
//!   3. ~/.config/convoy/config.toml

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConvoyConfig {
    pub network: NetworkConfig,
    pub auth: AuthConfig,
    pub log: LogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Port shared by all four endpoints (TCP/UDP × IPv4/IPv6).
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Consecutive failed logins before a client is blocked.
    pub max_failed_attempts: u32,
    /// Phrase that lifts an emergency block.
    pub emergency_secret_phrase: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Append-only event log file.
    pub event_log_path: PathBuf,
}

// ── Defaults ──────────────────────────────────────────────────────────────────

impl Default for ConvoyConfig {
    fn default() -> Self {
        Self {
            network: NetworkConfig::default(),
            auth: AuthConfig::default(),
            log: LogConfig::default(),
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self { port: 4950 }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            max_failed_attempts: 3,
            emergency_secret_phrase: "emergencyUnlock".to_string(),
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            event_log_path: data_dir().join("system.log"),
        }
    }
}

// ── Path helpers ──────────────────────────────────────────────────────────────

fn config_dir() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| dirs_or_home().join(".config"))
        .join("convoy")
}

fn data_dir() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| dirs_or_home().join(".local").join("share"))
        .join("convoy")
}

fn dirs_or_home() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/tmp"))
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
}

// ── Loading ───────────────────────────────────────────────────────────────────

impl ConvoyConfig {
    /// Load config: env vars → file → defaults.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::file_path();
        let mut config = if path.exists() {
            let text = std::fs::read_to_string(&path)
                .map_err(|e| ConfigError::ReadFailed(path.clone(), e))?;
            toml::from_str(&text).map_err(|e| ConfigError::ParseFailed(path.clone(), e))?
        } else {
            ConvoyConfig::default()
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Config file path.
    pub fn file_path() -> PathBuf {
        std::env::var("CONVOY_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| config_dir().join("config.toml"))
    }

    /// Write default config if none exists. Returns the path.
    pub fn write_default_if_missing() -> Result<PathBuf, ConfigError> {
        let path = Self::file_path();
        if !path.exists() {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| ConfigError::WriteFailed(path.clone(), e))?;
            }
            let text = toml::to_string_pretty(&ConvoyConfig::default())
                .map_err(ConfigError::SerializeFailed)?;
            std::fs::write(&path, text).map_err(|e| ConfigError::WriteFailed(path.clone(), e))?;
        }
        Ok(path)
    }

    /// Apply CONVOY_* env var overrides.
    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("CONVOY_NETWORK__PORT") {
            if let Ok(p) = v.parse() {
                self.network.port = p;
            }
        }
        if let Ok(v) = std::env::var("CONVOY_AUTH__MAX_FAILED_ATTEMPTS") {
            if let Ok(n) = v.parse() {
                self.auth.max_failed_attempts = n;
            }
        }
        if let Ok(v) = std::env::var("CONVOY_AUTH__EMERGENCY_SECRET_PHRASE") {
            self.auth.emergency_secret_phrase = v;
        }
        if let Ok(v) = std::env::var("CONVOY_LOG__EVENT_LOG_PATH") {
            self.log.event_log_path = PathBuf::from(v);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_sane() {
        let config = ConvoyConfig::default();
        assert_eq!(config.network.port, 4950);
        assert_eq!(config.auth.max_failed_attempts, 3);
        assert!(!config.auth.emergency_secret_phrase.is_empty());
    }

    #[test]
    fn toml_round_trip() {
        let config = ConvoyConfig::default();
        let text = toml::to_string_pretty(&config).unwrap();
        let parsed: ConvoyConfig = toml::from_str(&text).unwrap();
        assert_eq!(parsed.network.port, config.network.port);
        assert_eq!(
            parsed.auth.emergency_secret_phrase,
            config.auth.emergency_secret_phrase
        );
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let parsed: ConvoyConfig = toml::from_str("[network]\nport = 9999\n").unwrap();
        assert_eq!(parsed.network.port, 9999);
        assert_eq!(parsed.auth.max_failed_attempts, 3);
    }
}
