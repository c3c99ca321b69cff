//! Configuration loading for tether-relay.
//!
//! Configuration is loaded from a TOML file (default: `relay.toml`). Every
//! section and every field is optional; anything missing takes its default.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;
use tether_core::{HeartbeatPolicy, RelayConfig};

/// Root configuration for tether-relay.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Listener configuration.
    #[serde(default)]
    pub server: ServerConfig,
    /// Per-session relay tunables.
    #[serde(default)]
    pub session: SessionConfig,
    /// Storage configuration.
    #[serde(default)]
    pub storage: StorageConfig,
    /// Pairing mediator configuration.
    #[serde(default)]
    pub pairing: PairingConfig,
    /// Rate limiting configuration.
    #[serde(default)]
    pub limits: LimitsConfig,
    /// Bearer token configuration.
    #[serde(default)]
    pub auth: AuthConfig,
    /// HTTP endpoints configuration.
    #[serde(default)]
    pub http: HttpConfig,
    /// Cleanup task configuration.
    #[serde(default)]
    pub cleanup: CleanupConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Bind address for WebSocket and HTTP traffic (default: 0.0.0.0:8080).
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    /// Largest accepted WebSocket message in bytes (default: 1MB).
    #[serde(default = "default_max_message_size")]
    pub max_message_size: usize,
}

/// Per-session relay tunables.
#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    /// Seconds between heartbeat sweeps (default: 30).
    #[serde(default = "default_heartbeat_interval")]
    pub heartbeat_interval_secs: u64,
    /// Seconds of silence before a peer is closed (default: 90).
    #[serde(default = "default_heartbeat_timeout")]
    pub heartbeat_timeout_secs: u64,
    /// Messages held for an absent producer (default: 100).
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    /// Seconds a queued message stays deliverable (default: 300).
    #[serde(default = "default_queue_max_age")]
    pub queue_max_age_secs: u64,
    /// Depth of each session actor's command channel (default: 256).
    #[serde(default = "default_command_buffer")]
    pub command_buffer: usize,
    /// Frames buffered per socket before a slow reader is dropped (default: 1024).
    #[serde(default = "default_outbound_buffer")]
    pub outbound_buffer: usize,
}

/// Storage configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Path to SQLite database file.
    #[serde(default = "default_database_path")]
    pub database: PathBuf,
    /// Seconds a detached session record is kept (default: 7 days).
    #[serde(default = "default_retention")]
    pub retention_secs: u64,
}

/// Pairing mediator configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct PairingConfig {
    /// Seconds a pairing code stays usable (default: 600).
    #[serde(default = "default_pairing_ttl")]
    pub ttl_secs: u64,
    /// Longest accepted device name (default: 128).
    #[serde(default = "default_max_device_name_len")]
    pub max_device_name_len: usize,
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LimitsConfig {
    /// WebSocket upgrades per IP per minute (default: 60).
    #[serde(default = "default_connections_per_minute")]
    pub connections_per_minute: u32,
    /// Pairing registrations per IP per minute (default: 10).
    #[serde(default = "default_pairing_per_minute")]
    pub pairing_per_minute: u32,
}

/// Bearer token configuration.
///
/// Maps each accepted token to the user it identifies. An empty table
/// rejects every authenticated request.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuthConfig {
    /// token -> user id.
    #[serde(default)]
    pub tokens: HashMap<String, String>,
}

/// HTTP endpoints configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    /// Enable metrics endpoint (default: true).
    #[serde(default = "default_metrics_enabled")]
    pub metrics_enabled: bool,
}

/// Cleanup task configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct CleanupConfig {
    /// Cleanup interval in seconds (default: 60).
    #[serde(default = "default_cleanup_interval")]
    pub interval_secs: u64,
    /// Enable cleanup task (default: true).
    #[serde(default = "default_cleanup_enabled")]
    pub enabled: bool,
}

// Default value functions
fn default_bind_address() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_max_message_size() -> usize {
    1024 * 1024 // 1MB
}

fn default_heartbeat_interval() -> u64 {
    30
}

fn default_heartbeat_timeout() -> u64 {
    90
}

fn default_queue_capacity() -> usize {
    100
}

fn default_queue_max_age() -> u64 {
    5 * 60
}

fn default_command_buffer() -> usize {
    256
}

fn default_outbound_buffer() -> usize {
    1024
}

fn default_database_path() -> PathBuf {
    PathBuf::from("relay.db")
}

fn default_retention() -> u64 {
    7 * 24 * 60 * 60 // 7 days in seconds
}

fn default_pairing_ttl() -> u64 {
    10 * 60
}

fn default_max_device_name_len() -> usize {
    128
}

fn default_connections_per_minute() -> u32 {
    60
}

fn default_pairing_per_minute() -> u32 {
    10
}

fn default_metrics_enabled() -> bool {
    true
}

fn default_cleanup_interval() -> u64 {
    60
}

fn default_cleanup_enabled() -> bool {
    true
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            max_message_size: default_max_message_size(),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval_secs: default_heartbeat_interval(),
            heartbeat_timeout_secs: default_heartbeat_timeout(),
            queue_capacity: default_queue_capacity(),
            queue_max_age_secs: default_queue_max_age(),
            command_buffer: default_command_buffer(),
            outbound_buffer: default_outbound_buffer(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database: default_database_path(),
            retention_secs: default_retention(),
        }
    }
}

impl Default for PairingConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_pairing_ttl(),
            max_device_name_len: default_max_device_name_len(),
        }
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            connections_per_minute: default_connections_per_minute(),
            pairing_per_minute: default_pairing_per_minute(),
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            metrics_enabled: default_metrics_enabled(),
        }
    }
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_cleanup_interval(),
            enabled: default_cleanup_enabled(),
        }
    }
}

impl SessionConfig {
    /// Tunables handed to every session's [`tether_core::Relay`].
    pub fn relay_config(&self) -> RelayConfig {
        RelayConfig {
            heartbeat: HeartbeatPolicy::new(
                Duration::from_secs(self.heartbeat_interval_secs),
                Duration::from_secs(self.heartbeat_timeout_secs),
            ),
            queue_capacity: self.queue_capacity,
            queue_max_age: Duration::from_secs(self.queue_max_age_secs),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed or validated.
    pub fn from_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            source: e,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the relay cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let session = &self.session;
        if session.heartbeat_interval_secs == 0 {
            return Err(ConfigError::invalid(
                "session.heartbeat_interval_secs",
                "must be greater than zero",
            ));
        }
        if session.heartbeat_timeout_secs < session.heartbeat_interval_secs {
            return Err(ConfigError::invalid(
                "session.heartbeat_timeout_secs",
                "must not be shorter than the heartbeat interval",
            ));
        }
        if session.command_buffer == 0 {
            return Err(ConfigError::invalid(
                "session.command_buffer",
                "must be greater than zero",
            ));
        }
        if session.outbound_buffer == 0 {
            return Err(ConfigError::invalid(
                "session.outbound_buffer",
                "must be greater than zero",
            ));
        }
        if self.limits.connections_per_minute == 0 {
            return Err(ConfigError::invalid(
                "limits.connections_per_minute",
                "must be greater than zero",
            ));
        }
        if self.limits.pairing_per_minute == 0 {
            return Err(ConfigError::invalid(
                "limits.pairing_per_minute",
                "must be greater than zero",
            ));
        }
        if self.pairing.ttl_secs == 0 {
            return Err(ConfigError::invalid(
                "pairing.ttl_secs",
                "must be greater than zero",
            ));
        }
        if self.cleanup.enabled && self.cleanup.interval_secs == 0 {
            return Err(ConfigError::invalid(
                "cleanup.interval_secs",
                "must be greater than zero",
            ));
        }
        Ok(())
    }
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[error("failed to read config file {path}: {source}")]
    ReadError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// Failed to parse configuration file.
    #[error("failed to parse config file {path}: {source}")]
    ParseError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying TOML parse error.
        source: toml::de::Error,
    },
    /// A value is out of range.
    #[error("invalid value for {field}: {reason}")]
    Invalid {
        /// Dotted field name.
        field: &'static str,
        /// What is wrong with it.
        reason: &'static str,
    },
}

impl ConfigError {
    fn invalid(field: &'static str, reason: &'static str) -> Self {
        Self::Invalid { field, reason }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = Config::default();
        assert_eq!(config.server.bind_address, "0.0.0.0:8080");
        assert_eq!(config.session.heartbeat_interval_secs, 30);
        assert_eq!(config.session.heartbeat_timeout_secs, 90);
        assert_eq!(config.session.queue_capacity, 100);
        assert_eq!(config.pairing.ttl_secs, 600);
        assert!(config.auth.tokens.is_empty());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn config_from_toml_string() {
        let toml = r#"
[server]
bind_address = "127.0.0.1:5000"

[session]
heartbeat_interval_secs = 10
heartbeat_timeout_secs = 30
queue_capacity = 20

[storage]
database = "/data/relay.db"

[auth.tokens]
"secret-1" = "alice"

[http]
metrics_enabled = false

[cleanup]
interval_secs = 1800
"#;

        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.server.bind_address, "127.0.0.1:5000");
        assert_eq!(config.session.heartbeat_interval_secs, 10);
        assert_eq!(config.session.queue_capacity, 20);
        assert_eq!(config.storage.database, PathBuf::from("/data/relay.db"));
        assert_eq!(config.auth.tokens.get("secret-1").unwrap(), "alice");
        assert!(!config.http.metrics_enabled);
        assert_eq!(config.cleanup.interval_secs, 1800);
    }

    #[test]
    fn config_missing_sections_use_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.session.queue_max_age_secs, 300);
        assert_eq!(config.storage.retention_secs, 7 * 24 * 60 * 60);
        assert_eq!(config.limits.pairing_per_minute, 10);
        assert!(config.http.metrics_enabled);
    }

    #[test]
    fn relay_config_converts_units() {
        let relay = SessionConfig::default().relay_config();
        assert_eq!(relay, RelayConfig::default());
    }

    #[test]
    fn timeout_shorter_than_interval_rejected() {
        let mut config = Config::default();
        config.session.heartbeat_timeout_secs = 5;

        let err = config.validate().unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid {
                field: "session.heartbeat_timeout_secs",
                ..
            }
        ));
    }

    #[test]
    fn zero_outbound_buffer_rejected() {
        let mut config = Config::default();
        config.session.outbound_buffer = 0;

        let err = config.validate().unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid {
                field: "session.outbound_buffer",
                ..
            }
        ));
    }

    #[test]
    fn zero_rate_rejected() {
        let mut config = Config::default();
        config.limits.pairing_per_minute = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn from_file_reports_missing_file() {
        let err = Config::from_file(std::path::Path::new("/nonexistent/relay.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::ReadError { .. }));
    }

    #[test]
    fn from_file_reads_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("relay.toml");
        std::fs::write(&path, "[pairing]\nttl_secs = 120\n").unwrap();

        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.pairing.ttl_secs, 120);
    }
}
