//! CLI argument definitions.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::config::DEFAULT_SECTION;
use crate::services::alembic::DEFAULT_ALEMBIC_BIN;

/// Autogenerate Alembic migrations against a throwaway database container
#[derive(Parser, Debug)]
#[command(name = "dbless")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Alembic config file holding the dbless section
    #[arg(long, global = true, default_value = "alembic.ini", env = "DBLESS_ALEMBIC_INI")]
    pub alembic_ini: PathBuf,

    /// Name of the config section to read
    #[arg(long, global = true, default_value = DEFAULT_SECTION)]
    pub section: String,

    /// Alembic executable
    #[arg(long, global = true, default_value = DEFAULT_ALEMBIC_BIN, env = "DBLESS_ALEMBIC_BIN")]
    pub alembic_bin: PathBuf,

    /// Seconds to wait for the database to accept connections
    #[arg(
        long,
        global = true,
        default_value_t = 60,
        value_parser = clap::value_parser!(u64).range(..=86_400)
    )]
    pub ready_timeout: u64,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the container and upgrade it to head, leaving it running
    Start,

    /// Stop and remove the container
    Stop,

    /// Start, upgrade, autogenerate a revision, then stop
    Auto {
        /// Revision message
        message: String,

        /// Keep the revision even if it contains no operations
        #[arg(long)]
        keep_empty: bool,
    },
}
