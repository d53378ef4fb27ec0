// src/db/schema.rs

//! Schema definitions and migrations for the installed-package database
//!
//! The native store keeps one row per installed header plus its
//! provides/requires/conflicts/obsoletes entries and owned file paths.

use crate::error::Result;
use rusqlite::{Connection, OptionalExtension};
use tracing::{debug, info};

type Migration = fn(&Connection) -> Result<()>;

/// Migrations in order; entry `i` brings the schema to version `i + 1`
const MIGRATIONS: &[Migration] = &[migrate_v1];

/// Current schema version
pub const SCHEMA_VERSION: i32 = MIGRATIONS.len() as i32;

/// Get the current schema version from the database, 0 when fresh
pub fn get_schema_version(conn: &Connection) -> Result<i32> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    let version = conn
        .query_row("SELECT MAX(version) FROM schema_version", [], |row| {
            row.get::<_, Option<i32>>(0)
        })
        .optional()?
        .flatten();
    Ok(version.unwrap_or(0))
}

/// Apply all pending migrations, each in its own transaction
pub fn migrate(conn: &Connection) -> Result<()> {
    let current = get_schema_version(conn)?;
    debug!("Current schema version: {}", current);

    let pending = MIGRATIONS.iter().zip(1..).skip(current.max(0) as usize);
    for (migration, version) in pending {
        info!("Applying migration to version {}", version);
        let tx = conn.unchecked_transaction()?;
        migration(&tx)?;
        tx.execute("INSERT INTO schema_version (version) VALUES (?1)", [version])?;
        tx.commit()?;
    }

    Ok(())
}

/// Initial schema - Version 1
///
/// - packages: one row per installed header; ids are never reused so a
///   handle to a removed package cannot silently point at a new one
/// - dependencies: provides/requires/conflicts/obsoletes entries
/// - files: owned file paths
fn migrate_v1(conn: &Connection) -> Result<()> {
    debug!("Creating schema version 1");

    conn.execute_batch(
        "
        CREATE TABLE packages (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            epoch INTEGER,
            version TEXT NOT NULL,
            release TEXT NOT NULL,
            arch TEXT NOT NULL,
            pkgid TEXT NOT NULL,
            url TEXT,
            sourcerpm TEXT,
            installed_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        );

        CREATE INDEX idx_packages_name ON packages(name);
        CREATE INDEX idx_packages_arch ON packages(arch);

        CREATE TABLE dependencies (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            package_id INTEGER NOT NULL,
            kind TEXT NOT NULL CHECK(kind IN ('provides', 'requires', 'conflicts', 'obsoletes')),
            name TEXT NOT NULL,
            sense INTEGER NOT NULL DEFAULT 0,
            epoch TEXT,
            version TEXT,
            release TEXT,
            FOREIGN KEY (package_id) REFERENCES packages(id) ON DELETE CASCADE
        );

        CREATE INDEX idx_dependencies_kind_name ON dependencies(kind, name);
        CREATE INDEX idx_dependencies_package_id ON dependencies(package_id);

        CREATE TABLE files (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            package_id INTEGER NOT NULL,
            path TEXT NOT NULL,
            FOREIGN KEY (package_id) REFERENCES packages(id) ON DELETE CASCADE
        );

        CREATE INDEX idx_files_path ON files(path);
        CREATE INDEX idx_files_package_id ON files(package_id);
        ",
    )?;
    Ok(())
}
