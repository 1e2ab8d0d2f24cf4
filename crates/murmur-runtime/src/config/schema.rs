//! Configuration schema definitions.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use murmur_core::QueueConfig;
use serde::{Deserialize, Serialize};

use crate::connection::ReconnectPolicy;

/// Endpoint used when no URL is configured.
pub const DEFAULT_URL: &str = "wss://eventsub.wss.twitch.tv/ws";

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MurmurConfig {
    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub connection: ConnectionConfig,

    #[serde(default)]
    pub queue: QueueSettings,

    #[serde(default)]
    pub commands: CommandsConfig,
}

// =============================================================================
// Logging
// =============================================================================

/// Log verbosity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }

    pub fn to_tracing_level(self) -> tracing::Level {
        match self {
            Self::Trace => tracing::Level::TRACE,
            Self::Debug => tracing::Level::DEBUG,
            Self::Info => tracing::Level::INFO,
            Self::Warn => tracing::Level::WARN,
            Self::Error => tracing::Level::ERROR,
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Log line layout.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Compact,
    Full,
    Pretty,
    /// Requires the `json-log` feature.
    #[cfg(feature = "json-log")]
    Json,
}

/// Where log lines go.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogOutput {
    #[default]
    Stdout,
    Stderr,
    /// Requires `file_path`.
    File,
}

/// Logging configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default)]
    pub level: LogLevel,

    #[serde(default)]
    pub format: LogFormat,

    #[serde(default)]
    pub output: LogOutput,

    /// Log file for `output = "file"`.
    #[serde(default)]
    pub file_path: Option<PathBuf>,

    /// Include thread ids.
    #[serde(default)]
    pub thread_ids: bool,

    /// Include file name and line number.
    #[serde(default)]
    pub file_location: bool,

    /// Per-module levels, e.g. `murmur_core = "debug"`.
    #[serde(default)]
    pub filters: HashMap<String, LogLevel>,
}

// =============================================================================
// Connection
// =============================================================================

/// Connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// WebSocket endpoint.
    #[serde(default = "default_url")]
    pub url: String,

    /// Only channel lines sent by this user are surfaced.
    #[serde(default)]
    pub bot_user_id: Option<String>,

    /// Only channel lines in this broadcaster's channel are surfaced.
    #[serde(default)]
    pub streamer_user_id: Option<String>,

    /// How long to wait for the transport to report open, in milliseconds.
    #[serde(default = "default_open_timeout_ms")]
    pub open_timeout_ms: u64,

    #[serde(default)]
    pub reconnect: ReconnectConfig,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            bot_user_id: None,
            streamer_user_id: None,
            open_timeout_ms: default_open_timeout_ms(),
            reconnect: ReconnectConfig::default(),
        }
    }
}

fn default_url() -> String {
    DEFAULT_URL.to_string()
}

fn default_open_timeout_ms() -> u64 {
    10_000
}

/// Reconnect behaviour after an unexpected close.
///
/// The defaults make exactly one immediate attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconnectConfig {
    /// Attempts after a close; `0` disables reconnecting.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay before the first attempt in milliseconds.
    #[serde(default)]
    pub initial_delay_ms: u64,

    /// Upper bound for the delay in milliseconds.
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    /// Exponential backoff multiplier.
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay_ms: 0,
            max_delay_ms: default_max_delay_ms(),
            backoff_multiplier: default_backoff_multiplier(),
        }
    }
}

impl ReconnectConfig {
    pub fn to_policy(&self) -> ReconnectPolicy {
        ReconnectPolicy {
            max_attempts: self.max_attempts,
            initial_delay: Duration::from_millis(self.initial_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms),
            multiplier: self.backoff_multiplier,
        }
    }
}

fn default_max_attempts() -> u32 {
    1
}

fn default_max_delay_ms() -> u64 {
    30_000
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

// =============================================================================
// Queue
// =============================================================================

/// Outbound pacing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueSettings {
    /// Pump cadence in milliseconds.
    #[serde(default = "default_rate_ms")]
    pub rate_ms: u64,

    #[serde(default = "default_per_second")]
    pub per_second: usize,

    #[serde(default = "default_per_minute")]
    pub per_minute: usize,
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self {
            rate_ms: default_rate_ms(),
            per_second: default_per_second(),
            per_minute: default_per_minute(),
        }
    }
}

impl QueueSettings {
    pub fn to_queue_config(&self) -> QueueConfig {
        QueueConfig {
            rate: Duration::from_millis(self.rate_ms),
            per_second: self.per_second,
            per_minute: self.per_minute,
        }
    }
}

fn default_rate_ms() -> u64 {
    250
}

fn default_per_second() -> usize {
    3
}

fn default_per_minute() -> usize {
    100
}

// =============================================================================
// Commands
// =============================================================================

/// Command configuration asset and manual command history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandsConfig {
    /// JSON command document.
    #[serde(default)]
    pub path: Option<PathBuf>,

    /// Manually issued commands kept in the persisted history.
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
}

impl Default for CommandsConfig {
    fn default() -> Self {
        Self {
            path: None,
            history_limit: default_history_limit(),
        }
    }
}

fn default_history_limit() -> usize {
    50
}
