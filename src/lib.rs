//! Autogenerate Alembic migrations against a throwaway database container.

pub mod cli;
pub mod config;
pub mod db;
pub mod errors;
pub mod models;
pub mod services;
