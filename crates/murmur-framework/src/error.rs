//! Error types for the murmur framework.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while translating or compiling a response pattern.
#[derive(Debug, Clone, Error)]
pub enum PatternError {
    /// The pattern ends with a lone backslash.
    #[error("pattern '{pattern}' ends with a dangling escape")]
    TrailingEscape { pattern: String },

    /// A `(?<name>` opener has no closing `>`.
    #[error("pattern '{pattern}' has an unterminated group name")]
    UnterminatedGroupName { pattern: String },

    /// A group name is empty or contains non-word characters.
    #[error("pattern '{pattern}' has an invalid group name '{name}'")]
    InvalidGroupName { pattern: String, name: String },

    /// The same group name appears twice.
    #[error("pattern '{pattern}' declares group '{name}' more than once")]
    DuplicateGroupName { pattern: String, name: String },

    /// The translated pattern was rejected by the regex engine.
    #[error("pattern '{pattern}' failed to compile: {source}")]
    Compile {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

/// Result type for pattern operations.
pub type PatternResult<T> = Result<T, PatternError>;

/// Errors raised while loading the command configuration.
///
/// All of these are fatal at load time: a registry is either fully valid or
/// not built at all.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// The document is not valid JSON or does not fit the schema.
    #[error("invalid command document: {0}")]
    Json(#[from] serde_json::Error),

    /// The document could not be read.
    #[error("failed to read command document '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The document declares a version this build does not understand.
    #[error("unsupported command document version {found} (expected {expected})")]
    UnsupportedVersion { found: u32, expected: u32 },

    /// A pattern leaf failed to compile.
    #[error("invalid pattern at '{location}': {source}")]
    Pattern {
        location: String,
        #[source]
        source: PatternError,
    },

    /// A subgroup names a container group the response pattern does not define.
    #[error("subgroup at '{location}' refers to unknown container group '{container}'")]
    UnknownContainer { location: String, container: String },

    /// A group, command, category or message name cannot be used in a dotted key.
    #[error("invalid name '{name}' at '{location}'")]
    InvalidName { location: String, name: String },
}

impl RegistryError {
    /// Wraps a pattern error with the dotted location of its leaf.
    pub fn pattern(location: impl Into<String>, source: PatternError) -> Self {
        Self::Pattern {
            location: location.into(),
            source,
        }
    }
}

/// Result type for registry operations.
pub type RegistryResult<T> = Result<T, RegistryError>;

/// Errors returned by the command service.
///
/// These indicate programmer errors (a widget asking for a key that the
/// configuration does not define), not runtime faults.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ServiceError {
    /// No response set is registered under this key.
    #[error("unknown response key '{0}'")]
    UnknownResponseKey(String),

    /// The response set exists but has no such result key.
    #[error("response key '{key}' has no result '{result}'")]
    UnknownResultKey { key: String, result: String },

    /// No command is registered for this group/command pair.
    #[error("unknown command '{group}.{command}'")]
    UnknownCommand { group: String, command: String },

    /// Rendering left `{param}` placeholders unfilled.
    #[error("command '{command}' is missing parameters: {}", params.join(", "))]
    UnresolvedParams { command: String, params: Vec<String> },
}

/// Result type for service operations.
pub type ServiceResult<T> = Result<T, ServiceError>;
