//! Configuration validation utilities.

use super::error::{ConfigError, ConfigResult};
use super::schema::{ConnectionConfig, LoggingConfig, MurmurConfig, QueueSettings, ReconnectConfig};

/// Validates the entire configuration.
pub fn validate_config(config: &MurmurConfig) -> ConfigResult<()> {
    validate_logging_config(&config.logging)?;
    validate_connection_config(&config.connection)?;
    validate_queue_config(&config.queue)?;

    if config.commands.history_limit == 0 {
        return Err(ConfigError::validation(
            "Command history limit must be greater than 0",
        ));
    }
    Ok(())
}

fn validate_logging_config(logging: &LoggingConfig) -> ConfigResult<()> {
    if logging.filters.keys().any(|module| module.trim().is_empty()) {
        return Err(ConfigError::validation("Log filter module names must not be empty"));
    }
    Ok(())
}

fn validate_connection_config(connection: &ConnectionConfig) -> ConfigResult<()> {
    validate_ws_url(&connection.url)?;

    if connection.open_timeout_ms == 0 {
        return Err(ConfigError::validation("Open timeout must be greater than 0"));
    }

    for (field, value) in [
        ("connection.bot_user_id", &connection.bot_user_id),
        ("connection.streamer_user_id", &connection.streamer_user_id),
    ] {
        if value.as_deref().is_some_and(|id| id.trim().is_empty()) {
            return Err(ConfigError::validation(format!("{field} must not be empty")));
        }
    }

    validate_reconnect_config(&connection.reconnect)
}

/// Validates reconnect backoff settings.
fn validate_reconnect_config(reconnect: &ReconnectConfig) -> ConfigResult<()> {
    if reconnect.max_delay_ms < reconnect.initial_delay_ms {
        return Err(ConfigError::validation(
            "Max reconnect delay must be greater than or equal to initial delay",
        ));
    }

    if reconnect.backoff_multiplier < 1.0 {
        return Err(ConfigError::validation(
            "Backoff multiplier must be at least 1.0",
        ));
    }

    Ok(())
}

fn validate_queue_config(queue: &QueueSettings) -> ConfigResult<()> {
    if queue.rate_ms == 0 {
        return Err(ConfigError::validation("Queue rate must be greater than 0"));
    }
    if queue.per_second == 0 || queue.per_minute == 0 {
        return Err(ConfigError::validation(
            "Queue caps must be greater than 0",
        ));
    }
    if queue.per_minute < queue.per_second {
        return Err(ConfigError::validation(format!(
            "Per-minute cap ({}) must not be lower than per-second cap ({})",
            queue.per_minute, queue.per_second
        )));
    }
    Ok(())
}

/// Validates a WebSocket URL.
fn validate_ws_url(url: &str) -> ConfigResult<()> {
    if url.is_empty() {
        return Err(ConfigError::invalid_url(url, "URL cannot be empty"));
    }

    if !url.starts_with("ws://") && !url.starts_with("wss://") {
        return Err(ConfigError::invalid_url(
            url,
            "WebSocket URL must start with ws:// or wss://",
        ));
    }

    Ok(())
}
