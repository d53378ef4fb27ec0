// src/db/mod.rs

//! Native installed-package database
//!
//! The index layer only sees this module through two traits:
//! - [`NativeDatabase`] opens handles and names the file whose
//!   modification time stands in for "the database changed"
//! - [`NativeHandle`] streams headers for full or tag-filtered scans and
//!   refetches the details of a single header by its index
//!
//! [`SqliteDatabase`] is the concrete store: one SQLite file holding
//! headers, dependency entries and owned files.

pub mod models;
pub mod schema;

use crate::error::{Error, Result};
use models::{DependencyEntry, FileEntry};
use rusqlite::{Connection, params};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub use models::{DepKind, Header, HeaderDetails};

/// Position of a header inside the native database
pub type HeaderIndex = i64;

/// Header fields a scan can be narrowed by
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tag {
    Name,
    Arch,
    ProvideName,
    RequireName,
    ConflictName,
    ObsoleteName,
    /// Full path of an owned file
    BaseName,
}

impl Tag {
    /// Tag that indexes the names of a dependency relation
    pub fn for_kind(kind: DepKind) -> Self {
        match kind {
            DepKind::Provides => Tag::ProvideName,
            DepKind::Requires => Tag::RequireName,
            DepKind::Conflicts => Tag::ConflictName,
            DepKind::Obsoletes => Tag::ObsoleteName,
        }
    }

    fn dep_kind(&self) -> Option<DepKind> {
        match self {
            Tag::ProvideName => Some(DepKind::Provides),
            Tag::RequireName => Some(DepKind::Requires),
            Tag::ConflictName => Some(DepKind::Conflicts),
            Tag::ObsoleteName => Some(DepKind::Obsoletes),
            _ => None,
        }
    }
}

/// Which headers a scan visits
#[derive(Debug, Clone, Copy)]
pub enum ScanFilter<'a> {
    All,
    /// Exact match on a tag value
    Tag(Tag, &'a str),
    /// Shell-style glob on a tag value
    TagGlob(Tag, &'a str),
}

/// Callback receiving each scanned header
pub type Visitor<'v> = dyn FnMut(HeaderIndex, Header) -> Result<()> + 'v;

/// An open, read-only view of the native database
pub trait NativeHandle {
    /// Stream every header selected by `filter` into `visit`.
    ///
    /// Nothing is excluded; callers filter pseudo-packages themselves.
    fn scan(&self, filter: ScanFilter<'_>, visit: &mut Visitor<'_>) -> Result<()>;

    /// Refetch the lazily loaded part of one header.
    ///
    /// Returns `None` if the header no longer exists.
    fn details(&self, index: HeaderIndex) -> Result<Option<HeaderDetails>>;
}

/// Something that can open handles onto an installed-package database
pub trait NativeDatabase {
    fn open(&self) -> Result<Box<dyn NativeHandle>>;

    /// File whose mtime changes whenever the installed set changes
    fn db_file(&self) -> &Path;
}

/// Initialize a new package database at the specified path
///
/// Creates the database file and sets up the schema.
/// This is idempotent - calling it on an existing database is safe.
pub fn init(db_path: impl AsRef<Path>) -> Result<()> {
    let db_path = db_path.as_ref();
    debug!("Initializing database at: {}", db_path.display());

    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| Error::InitError(format!("Failed to create database directory: {}", e)))?;
    }

    let conn = Connection::open(db_path)?;

    // Rollback journal rather than WAL: every commit must touch the main
    // file's mtime, which the version stamp compares against.
    conn.execute_batch(
        "
        PRAGMA journal_mode = DELETE;
        PRAGMA synchronous = NORMAL;
        PRAGMA foreign_keys = ON;
        PRAGMA busy_timeout = 5000;
        ",
    )?;

    schema::migrate(&conn)?;

    info!("Database initialized successfully");
    Ok(())
}

/// Open an existing package database
pub fn open(db_path: impl AsRef<Path>) -> Result<Connection> {
    let db_path = db_path.as_ref();
    if !db_path.exists() {
        return Err(Error::DatabaseNotFound(db_path.display().to_string()));
    }

    let conn = Connection::open(db_path)?;

    conn.execute_batch(
        "
        PRAGMA foreign_keys = ON;
        PRAGMA busy_timeout = 5000;
        ",
    )?;

    Ok(conn)
}

/// Record an installed package with its dependency entries and files
pub fn install(conn: &Connection, header: &mut Header, details: &HeaderDetails) -> Result<i64> {
    let tx = conn.unchecked_transaction()?;

    let id = header.insert(&tx)?;
    for kind in DepKind::ALL {
        for entry in details.entries(kind) {
            let mut entry = DependencyEntry {
                id: None,
                package_id: id,
                kind,
                ..entry.clone()
            };
            entry.insert(&tx)?;
        }
    }
    for path in &details.files {
        FileEntry::new(id, path).insert(&tx)?;
    }

    tx.commit()?;
    debug!("Recorded {} as header {}", header.name, id);
    Ok(id)
}

/// Remove an installed package; returns false if it was not present
pub fn erase(conn: &Connection, id: HeaderIndex) -> Result<bool> {
    let removed = conn.execute("DELETE FROM packages WHERE id = ?1", [id])?;
    Ok(removed > 0)
}

/// SQLite-backed native database
#[derive(Debug, Clone)]
pub struct SqliteDatabase {
    path: PathBuf,
}

impl SqliteDatabase {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl NativeDatabase for SqliteDatabase {
    fn open(&self) -> Result<Box<dyn NativeHandle>> {
        debug!("Opening package database {}", self.path.display());
        let conn = open(&self.path)?;
        Ok(Box::new(SqliteHandle { conn }))
    }

    fn db_file(&self) -> &Path {
        &self.path
    }
}

/// Open connection onto a [`SqliteDatabase`]
pub struct SqliteHandle {
    conn: Connection,
}

impl SqliteHandle {
    fn where_clause(filter: &ScanFilter<'_>) -> (String, Option<String>) {
        let (tag, value, op) = match *filter {
            ScanFilter::All => return (String::new(), None),
            ScanFilter::Tag(tag, value) => (tag, value, "="),
            ScanFilter::TagGlob(tag, value) => (tag, value, "GLOB"),
        };

        let clause = match tag {
            Tag::Name => format!("WHERE name {} ?1", op),
            Tag::Arch => format!("WHERE arch {} ?1", op),
            Tag::BaseName => format!(
                "WHERE id IN (SELECT package_id FROM files WHERE path {} ?1)",
                op
            ),
            dep => format!(
                "WHERE id IN (SELECT package_id FROM dependencies WHERE kind = '{}' AND name {} ?1)",
                dep.dep_kind().map(|k| k.as_str()).unwrap_or_default(),
                op
            ),
        };
        (clause, Some(value.to_string()))
    }
}

impl NativeHandle for SqliteHandle {
    fn scan(&self, filter: ScanFilter<'_>, visit: &mut Visitor<'_>) -> Result<()> {
        let (clause, value) = Self::where_clause(&filter);
        let sql = format!(
            "SELECT {} FROM packages {} ORDER BY id",
            Header::columns(),
            clause
        );
        let mut stmt = self.conn.prepare(&sql)?;

        let mut rows = match &value {
            Some(value) => stmt.query(params![value])?,
            None => stmt.query([])?,
        };
        while let Some(row) = rows.next()? {
            let header = Header::from_row(row)?;
            let index = header.id.unwrap_or_default();
            visit(index, header)?;
        }

        Ok(())
    }

    fn details(&self, index: HeaderIndex) -> Result<Option<HeaderDetails>> {
        HeaderDetails::load(&self.conn, index)
    }
}
