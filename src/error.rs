// src/error.rs

use std::path::PathBuf;
use thiserror::Error;

/// Core error types for pkgsack
#[derive(Error, Debug)]
pub enum Error {
    /// Database-related errors
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Database initialization error
    #[error("Failed to initialize database: {0}")]
    InitError(String),

    /// Database not found
    #[error("Database not found at path: {0}")]
    DatabaseNotFound(String),

    /// A query that needs at least one package found none
    #[error("No package matching {0}")]
    NotFound(String),

    /// The native record behind a package handle has moved or vanished
    #[error("Package database changed underneath us (header index {0})")]
    StaleHandle(i64),

    /// Attribute store could not be created or written
    #[error("Attribute store is read-only: {0}")]
    ReadOnly(PathBuf),

    /// RPM file could not be parsed
    #[error("Failed to parse RPM: {0}")]
    RpmParse(String),
}

/// Result type alias using pkgsack's Error type
pub type Result<T> = std::result::Result<T, Error>;
