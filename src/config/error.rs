//! Configuration error types

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while reading the `dbless` section of the migration config.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The file could not be read or is not valid INI
    #[error("Failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: ini::Error,
    },

    /// The requested section does not exist
    #[error("Section `{section}` does not exist in {}", path.display())]
    MissingSection { section: String, path: PathBuf },

    /// A required key is absent from the section
    #[error("Section `{section}` is missing required key `{key}`")]
    MissingKey { section: String, key: String },

    /// A `%` reference in a value could not be expanded
    #[error("Cannot interpolate `{key}`: {reason}")]
    Interpolation { key: String, reason: String },

    /// A `key=value;` list could not be parsed
    #[error("Malformed `{field}` entry {entry:?}: {reason}")]
    MalformedList {
        field: String,
        entry: String,
        reason: String,
    },

    /// A port mapping value is not a valid port number
    #[error("Invalid host port {value:?} for container port {container_port}")]
    InvalidPort {
        container_port: String,
        value: String,
    },

    /// The engine URL uses a dialect the readiness probe cannot connect with
    #[error("Unsupported engine url scheme `{scheme}` (expected postgresql or mysql)")]
    UnsupportedDialect { scheme: String },

    /// The engine URL has no `scheme://` prefix
    #[error("Invalid engine url: {url}")]
    InvalidUrl { url: String },

    /// The temporary tool config could not be written
    #[error("Failed to write tool config: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for configuration operations
pub type ConfigResult<T> = Result<T, ConfigError>;
