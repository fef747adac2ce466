//! Configuration data structures for the wagate portal core.
//!
//! This module defines the schema for the application settings: the
//! realtime channel endpoint and retry tuning, response cache limits,
//! encrypted session storage, logging and the local status endpoint.
//!
//! Author: kelexine (<https://github.com/kelexine>)

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// The root configuration object for the application.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    /// Realtime (WebSocket) channel settings.
    #[serde(default)]
    pub realtime: RealtimeConfig,

    /// In-memory response cache settings.
    #[serde(default)]
    pub cache: CacheConfig,

    /// Durable session storage settings.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Logging and observability settings.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Local status endpoint settings.
    #[serde(default)]
    pub server: ServerConfig,
}

/// Settings for the reconnecting realtime channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RealtimeConfig {
    /// Explicit WebSocket endpoint (`ws://` or `wss://`).
    /// Takes precedence over `origin` when set.
    #[serde(default)]
    pub ws_url: Option<String>,

    /// Portal origin (`http(s)://host[:port]`) used to derive the
    /// WebSocket endpoint when `ws_url` is absent.
    #[serde(default)]
    pub origin: Option<String>,

    /// Path appended to a derived endpoint.
    /// Default: `/ws`
    #[serde(default = "default_ws_path")]
    pub path: String,

    /// Fixed delay between reconnection attempts, in milliseconds.
    /// Default: `3000`
    #[serde(default = "default_reconnect_delay")]
    pub reconnect_delay_ms: u64,

    /// Consecutive failures tolerated before the channel gives up.
    /// Default: `5`
    #[serde(default = "default_max_reconnect_attempts")]
    pub max_reconnect_attempts: u32,

    /// Keepalive ping interval while open, in milliseconds.
    /// Default: `30000`
    #[serde(default = "default_heartbeat_interval")]
    pub heartbeat_interval_ms: u64,

    /// Inbound messages buffered per subscriber. A subscriber that falls
    /// further behind skips the oldest messages.
    /// Default: `256`
    #[serde(default = "default_inbound_buffer")]
    pub inbound_buffer: usize,
}

/// Settings for the bounded TTL cache.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Maximum number of live entries.
    /// Default: `50`
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,

    /// TTL applied when `set` is called without one, in milliseconds.
    /// Default: `300000` (5 minutes)
    #[serde(default = "default_ttl")]
    pub default_ttl_ms: u64,
}

/// Settings for the encrypted session store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Path of the JSON key/value file.
    /// Default: `~/.wagate/storage.json`
    #[serde(default = "default_storage_path")]
    pub path: String,

    /// Secret the token encryption key is derived from.
    #[serde(default = "default_encryption_secret")]
    pub encryption_secret: String,
}

/// Settings for application logging and output format.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Minimum log level (`trace`, `debug`, `info`, `warn`, `error`).
    /// Default: `info`
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format for logs (`pretty`, `json`).
    /// Default: `pretty`
    #[serde(default = "default_log_format")]
    pub format: String,

    /// Whether to mask tokens in logged URLs and messages.
    /// Default: `true`
    #[serde(default = "default_true")]
    pub sanitize_tokens: bool,
}

/// Settings for the local `/health` + `/metrics` endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

impl RealtimeConfig {
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }
}

impl CacheConfig {
    pub fn default_ttl(&self) -> Duration {
        Duration::from_millis(self.default_ttl_ms)
    }
}

// Default trait implementations linking to custom logic

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            ws_url: None,
            origin: None,
            path: default_ws_path(),
            reconnect_delay_ms: default_reconnect_delay(),
            max_reconnect_attempts: default_max_reconnect_attempts(),
            heartbeat_interval_ms: default_heartbeat_interval(),
            inbound_buffer: default_inbound_buffer(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: default_max_entries(),
            default_ttl_ms: default_ttl(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: default_storage_path(),
            encryption_secret: default_encryption_secret(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            sanitize_tokens: true,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Built-in secret; the binary warns when it is still in use.
pub const DEFAULT_ENCRYPTION_SECRET: &str = "wagate-portal-local-secret";

// Helper functions for serde defaults and shared constants
fn default_ws_path() -> String {
    "/ws".to_string()
}

fn default_reconnect_delay() -> u64 {
    3000
}

fn default_max_reconnect_attempts() -> u32 {
    5
}

fn default_heartbeat_interval() -> u64 {
    30000
}

fn default_inbound_buffer() -> usize {
    256
}

fn default_max_entries() -> usize {
    50
}

fn default_ttl() -> u64 {
    300_000 // 5 minutes
}

fn default_storage_path() -> String {
    dirs::home_dir()
        .unwrap_or_else(|| std::path::PathBuf::from("."))
        .join(".wagate")
        .join("storage.json")
        .to_string_lossy()
        .to_string()
}

fn default_encryption_secret() -> String {
    DEFAULT_ENCRYPTION_SECRET.to_string()
}

fn default_true() -> bool {
    true
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    9464
}
