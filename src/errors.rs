//! Error taxonomy for a dbless run.
//!
//! Every variant is fatal. Container teardown failures are never represented
//! here; they are logged and swallowed so they cannot mask the primary error.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::config::ConfigError;

#[derive(Error, Debug)]
pub enum DblessError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Failed to start container from image {image}: {source}")]
    ContainerStart {
        image: String,
        #[source]
        source: bollard::errors::Error,
    },

    #[error("Database did not accept connections within {}s", timeout.as_secs())]
    ReadinessTimeout { timeout: Duration },

    #[error("Alembic already ran on this database (current revision: {revision}), will not run")]
    AlreadyMigrated { revision: String },

    #[error("Applying migrations failed: {0}")]
    MigrationApply(String),

    #[error("Generating migration failed: {0}")]
    MigrationGenerate(String),

    #[error("Could not launch {}: {source}", program.display())]
    ToolSpawn {
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Interrupted")]
    Interrupted,
}

impl DblessError {
    pub fn migration_apply(msg: impl Into<String>) -> Self {
        DblessError::MigrationApply(msg.into())
    }

    pub fn migration_generate(msg: impl Into<String>) -> Self {
        DblessError::MigrationGenerate(msg.into())
    }
}

pub type DblessResult<T> = Result<T, DblessError>;
