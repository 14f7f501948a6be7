//! Settings types.
//!
//! Every section is `#[serde(default)]` so a settings file only needs the
//! keys it overrides.

use relay_core::logging::LogFormat;
use relay_core::retry::RetryConfig;
use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Root settings object.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RelaySettings {
    /// HTTP/WebSocket listener and per-connection limits.
    pub server: ServerSettings,
    /// Live delivery worker pool.
    pub dispatch: DispatchSettings,
    /// Persistence worker pool and retry policy.
    pub persistence: PersistenceSettings,
    /// History paging limits.
    pub history: HistorySettings,
    /// Message store backend.
    pub storage: StorageSettings,
    /// Log output.
    pub logging: LoggingSettings,
}

impl RelaySettings {
    /// Reject values that would make a pool or buffer unusable.
    pub fn validate(&self) -> Result<()> {
        let checks = [
            (self.server.connection_buffer == 0, "server.connectionBuffer must be at least 1"),
            (self.dispatch.workers == 0, "dispatch.workers must be at least 1"),
            (self.dispatch.queue_depth == 0, "dispatch.queueDepth must be at least 1"),
            (self.persistence.workers == 0, "persistence.workers must be at least 1"),
            (self.persistence.queue_depth == 0, "persistence.queueDepth must be at least 1"),
            (self.history.max_page_size == 0, "history.maxPageSize must be at least 1"),
            (
                self.history.default_page_size > self.history.max_page_size,
                "history.defaultPageSize exceeds history.maxPageSize",
            ),
        ];
        match checks.iter().find(|(failed, _)| *failed) {
            Some((_, reason)) => Err(SettingsError::InvalidValue((*reason).to_owned())),
            None => Ok(()),
        }
    }
}

/// Listener and connection settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// Bind address.
    pub host: String,
    /// Listen port (`0` picks a free port).
    pub port: u16,
    /// Outbound buffer capacity per live connection.
    pub connection_buffer: usize,
    /// Ping interval in seconds.
    pub heartbeat_interval_secs: u64,
    /// Seconds without a pong before a connection is closed.
    pub heartbeat_timeout_secs: u64,
    /// Maximum inbound WebSocket frame size in bytes.
    pub max_message_size: usize,
    /// Grace period for draining pools on shutdown, in seconds.
    pub shutdown_timeout_secs: u64,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            connection_buffer: 256,
            heartbeat_interval_secs: 30,
            heartbeat_timeout_secs: 90,
            max_message_size: 64 * 1024,
            shutdown_timeout_secs: 10,
        }
    }
}

/// Live delivery pool sizing.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DispatchSettings {
    /// Number of delivery workers.
    pub workers: usize,
    /// Capacity of the shared job queue.
    pub queue_depth: usize,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            workers: 4,
            queue_depth: 1024,
        }
    }
}

/// Persistence pool sizing and retry policy.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PersistenceSettings {
    /// Number of persistence workers.
    pub workers: usize,
    /// Capacity of the shared job queue.
    pub queue_depth: usize,
    /// Attempts and linear backoff per job.
    pub retry: RetryConfig,
}

impl Default for PersistenceSettings {
    fn default() -> Self {
        Self {
            workers: 4,
            queue_depth: 1024,
            retry: RetryConfig::default(),
        }
    }
}

/// History paging.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HistorySettings {
    /// Page size used when the request gives none (or an invalid one).
    pub default_page_size: usize,
    /// Upper bound on the requested page size.
    pub max_page_size: usize,
}

impl Default for HistorySettings {
    fn default() -> Self {
        Self {
            default_page_size: 50,
            max_page_size: 100,
        }
    }
}

/// Store backend selection.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StorageSettings {
    /// SQLite database file. `None` keeps messages in memory.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub db_path: Option<String>,
}

/// Log output settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Default filter directive when `RUST_LOG` is unset.
    pub level: String,
    /// Compact text or JSON lines.
    pub format: LogFormat,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Compact,
        }
    }
}
