//! Configuration module for the murmur runtime.
//!
//! Layered loading (defaults, profile file, main file, `MURMUR_*` environment,
//! programmatic overrides) and validation of connection, queue, command and
//! logging settings.

pub mod error;
pub mod loader;
pub mod schema;
pub mod validation;

pub use error::{ConfigError, ConfigResult};
pub use loader::{ConfigLoader, Profile, load_config, load_config_from_file};
pub use schema::{
    CommandsConfig, ConnectionConfig, DEFAULT_URL, LogFormat, LogLevel, LogOutput, LoggingConfig,
    MurmurConfig, QueueSettings, ReconnectConfig,
};
pub use validation::validate_config;
