// src/db/models.rs

//! Row models for the installed-package database
//!
//! This module defines Rust structs that correspond to database tables
//! and provides methods for creating, reading and deleting records.

use crate::error::Result;
use rusqlite::{Connection, OptionalExtension, Row, params};
use std::str::FromStr;

/// Which dependency relation an entry belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DepKind {
    Provides,
    Requires,
    Conflicts,
    Obsoletes,
}

impl DepKind {
    pub const ALL: [DepKind; 4] = [
        DepKind::Provides,
        DepKind::Requires,
        DepKind::Conflicts,
        DepKind::Obsoletes,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DepKind::Provides => "provides",
            DepKind::Requires => "requires",
            DepKind::Conflicts => "conflicts",
            DepKind::Obsoletes => "obsoletes",
        }
    }
}

impl FromStr for DepKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "provides" => Ok(DepKind::Provides),
            "requires" => Ok(DepKind::Requires),
            "conflicts" => Ok(DepKind::Conflicts),
            "obsoletes" => Ok(DepKind::Obsoletes),
            _ => Err(format!("Invalid dependency kind: {}", s)),
        }
    }
}

const HEADER_COLUMNS: &str =
    "id, name, epoch, version, release, arch, pkgid, url, sourcerpm, installed_at";

/// Summary fields of one installed package header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    pub id: Option<i64>,
    pub name: String,
    pub epoch: Option<u32>,
    pub version: String,
    pub release: String,
    pub arch: String,
    /// Stable package id (digest of the package payload)
    pub pkgid: String,
    pub url: Option<String>,
    pub sourcerpm: Option<String>,
    pub installed_at: Option<String>,
}

impl Header {
    /// Create a new Header
    pub fn new(name: &str, version: &str, release: &str, arch: &str, pkgid: &str) -> Self {
        Self {
            id: None,
            name: name.to_string(),
            epoch: None,
            version: version.to_string(),
            release: release.to_string(),
            arch: arch.to_string(),
            pkgid: pkgid.to_string(),
            url: None,
            sourcerpm: None,
            installed_at: None,
        }
    }

    /// Insert this header into the database
    pub fn insert(&mut self, conn: &Connection) -> Result<i64> {
        conn.execute(
            "INSERT INTO packages (name, epoch, version, release, arch, pkgid, url, sourcerpm)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                &self.name,
                &self.epoch,
                &self.version,
                &self.release,
                &self.arch,
                &self.pkgid,
                &self.url,
                &self.sourcerpm,
            ],
        )?;

        let id = conn.last_insert_rowid();
        self.id = Some(id);
        Ok(id)
    }

    /// Find a header by ID
    pub fn find_by_id(conn: &Connection, id: i64) -> Result<Option<Self>> {
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM packages WHERE id = ?1",
            HEADER_COLUMNS
        ))?;

        let header = stmt.query_row([id], Self::from_row).optional()?;

        Ok(header)
    }

    /// Find headers by name
    pub fn find_by_name(conn: &Connection, name: &str) -> Result<Vec<Self>> {
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM packages WHERE name = ?1 ORDER BY id",
            HEADER_COLUMNS
        ))?;

        let headers = stmt
            .query_map([name], Self::from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(headers)
    }

    /// List all headers
    pub fn list_all(conn: &Connection) -> Result<Vec<Self>> {
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM packages ORDER BY id",
            HEADER_COLUMNS
        ))?;

        let headers = stmt
            .query_map([], Self::from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(headers)
    }

    /// Delete a header by ID; dependencies and files cascade
    pub fn delete(conn: &Connection, id: i64) -> Result<()> {
        conn.execute("DELETE FROM packages WHERE id = ?1", [id])?;
        Ok(())
    }

    /// Column list in the order `from_row` expects
    pub fn columns() -> &'static str {
        HEADER_COLUMNS
    }

    /// Convert a database row to a Header
    pub fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: Some(row.get(0)?),
            name: row.get(1)?,
            epoch: row.get(2)?,
            version: row.get(3)?,
            release: row.get(4)?,
            arch: row.get(5)?,
            pkgid: row.get(6)?,
            url: row.get(7)?,
            sourcerpm: row.get(8)?,
            installed_at: row.get(9)?,
        })
    }
}

/// One provides/requires/conflicts/obsoletes entry of a package
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyEntry {
    pub id: Option<i64>,
    pub package_id: i64,
    pub kind: DepKind,
    pub name: String,
    /// RPM sense bits; only the comparison bits are interpreted
    pub sense: u32,
    pub epoch: Option<String>,
    pub version: Option<String>,
    pub release: Option<String>,
}

impl DependencyEntry {
    /// Create an unversioned entry
    pub fn new(kind: DepKind, name: &str) -> Self {
        Self {
            id: None,
            package_id: 0,
            kind,
            name: name.to_string(),
            sense: 0,
            epoch: None,
            version: None,
            release: None,
        }
    }

    /// Create a versioned entry from a sense value and an `[e:]v[-r]` string
    pub fn versioned(kind: DepKind, name: &str, sense: u32, evr: &str) -> Self {
        let parsed = crate::version::Evr::parse(evr);
        Self {
            sense,
            epoch: parsed.epoch.map(|s| s.to_string()),
            version: parsed.version.map(|s| s.to_string()),
            release: parsed.release.map(|s| s.to_string()),
            ..Self::new(kind, name)
        }
    }

    /// Insert this entry into the database
    pub fn insert(&mut self, conn: &Connection) -> Result<i64> {
        conn.execute(
            "INSERT INTO dependencies (package_id, kind, name, sense, epoch, version, release)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                &self.package_id,
                self.kind.as_str(),
                &self.name,
                &self.sense,
                &self.epoch,
                &self.version,
                &self.release,
            ],
        )?;

        let id = conn.last_insert_rowid();
        self.id = Some(id);
        Ok(id)
    }

    /// Find all entries of a package, in declaration order
    pub fn find_by_package(conn: &Connection, package_id: i64) -> Result<Vec<Self>> {
        let mut stmt = conn.prepare(
            "SELECT id, package_id, kind, name, sense, epoch, version, release
             FROM dependencies WHERE package_id = ?1 ORDER BY id",
        )?;

        let entries = stmt
            .query_map([package_id], Self::from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(entries)
    }

    /// Convert a database row to a DependencyEntry
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        let kind_str: String = row.get(2)?;
        let kind = kind_str.parse::<DepKind>().map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(
                2,
                rusqlite::types::Type::Text,
                Box::new(std::io::Error::new(std::io::ErrorKind::InvalidData, e)),
            )
        })?;

        Ok(Self {
            id: Some(row.get(0)?),
            package_id: row.get(1)?,
            kind,
            name: row.get(3)?,
            sense: row.get(4)?,
            epoch: row.get(5)?,
            version: row.get(6)?,
            release: row.get(7)?,
        })
    }
}

/// A file owned by an installed package
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    pub id: Option<i64>,
    pub package_id: i64,
    pub path: String,
}

impl FileEntry {
    pub fn new(package_id: i64, path: &str) -> Self {
        Self {
            id: None,
            package_id,
            path: path.to_string(),
        }
    }

    /// Insert this file into the database
    pub fn insert(&mut self, conn: &Connection) -> Result<i64> {
        conn.execute(
            "INSERT INTO files (package_id, path) VALUES (?1, ?2)",
            params![&self.package_id, &self.path],
        )?;

        let id = conn.last_insert_rowid();
        self.id = Some(id);
        Ok(id)
    }

    /// Find all paths owned by a package
    pub fn find_by_package(conn: &Connection, package_id: i64) -> Result<Vec<Self>> {
        let mut stmt =
            conn.prepare("SELECT id, package_id, path FROM files WHERE package_id = ?1 ORDER BY id")?;

        let files = stmt
            .query_map([package_id], |row| {
                Ok(Self {
                    id: Some(row.get(0)?),
                    package_id: row.get(1)?,
                    path: row.get(2)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(files)
    }
}

/// Lazily fetched part of a header: dependency relations and file list
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderDetails {
    pub provides: Vec<DependencyEntry>,
    pub requires: Vec<DependencyEntry>,
    pub conflicts: Vec<DependencyEntry>,
    pub obsoletes: Vec<DependencyEntry>,
    pub files: Vec<String>,
}

impl HeaderDetails {
    /// Load the details of a package, or `None` if the package row is gone
    pub fn load(conn: &Connection, package_id: i64) -> Result<Option<Self>> {
        if Header::find_by_id(conn, package_id)?.is_none() {
            return Ok(None);
        }

        let mut details = Self::default();
        for entry in DependencyEntry::find_by_package(conn, package_id)? {
            details.entries_mut(entry.kind).push(entry);
        }
        details.files = FileEntry::find_by_package(conn, package_id)?
            .into_iter()
            .map(|f| f.path)
            .collect();

        Ok(Some(details))
    }

    pub fn entries(&self, kind: DepKind) -> &[DependencyEntry] {
        match kind {
            DepKind::Provides => &self.provides,
            DepKind::Requires => &self.requires,
            DepKind::Conflicts => &self.conflicts,
            DepKind::Obsoletes => &self.obsoletes,
        }
    }

    pub fn entries_mut(&mut self, kind: DepKind) -> &mut Vec<DependencyEntry> {
        match kind {
            DepKind::Provides => &mut self.provides,
            DepKind::Requires => &mut self.requires,
            DepKind::Conflicts => &mut self.conflicts,
            DepKind::Obsoletes => &mut self.obsoletes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::schema;
    use tempfile::NamedTempFile;

    fn create_test_db() -> (NamedTempFile, Connection) {
        let temp_file = NamedTempFile::new().unwrap();
        let conn = Connection::open(temp_file.path()).unwrap();
        conn.execute("PRAGMA foreign_keys = ON", []).unwrap();
        schema::migrate(&conn).unwrap();
        (temp_file, conn)
    }

    #[test]
    fn test_header_crud() {
        let (_temp, conn) = create_test_db();

        let mut header = Header::new("bash", "5.2.26", "1.fc40", "x86_64", "abc123");
        header.epoch = Some(1);
        header.url = Some("https://www.gnu.org/software/bash".to_string());

        let id = header.insert(&conn).unwrap();
        assert!(id > 0);
        assert_eq!(header.id, Some(id));

        let found = Header::find_by_id(&conn, id).unwrap().unwrap();
        assert_eq!(found.name, "bash");
        assert_eq!(found.epoch, Some(1));
        assert!(found.installed_at.is_some());

        let by_name = Header::find_by_name(&conn, "bash").unwrap();
        assert_eq!(by_name.len(), 1);

        assert_eq!(Header::list_all(&conn).unwrap().len(), 1);

        Header::delete(&conn, id).unwrap();
        assert!(Header::find_by_id(&conn, id).unwrap().is_none());
    }

    #[test]
    fn test_details_load_and_cascade() {
        let (_temp, conn) = create_test_db();

        let mut header = Header::new("bash", "5.2.26", "1.fc40", "x86_64", "abc123");
        let id = header.insert(&conn).unwrap();

        let mut req = DependencyEntry::versioned(DepKind::Requires, "glibc", 12, "2.39");
        req.package_id = id;
        req.insert(&conn).unwrap();
        let mut prov = DependencyEntry::new(DepKind::Provides, "/bin/sh");
        prov.package_id = id;
        prov.insert(&conn).unwrap();
        FileEntry::new(id, "/usr/bin/bash").insert(&conn).unwrap();

        let details = HeaderDetails::load(&conn, id).unwrap().unwrap();
        assert_eq!(details.requires.len(), 1);
        assert_eq!(details.requires[0].version.as_deref(), Some("2.39"));
        assert_eq!(details.requires[0].sense, 12);
        assert_eq!(details.provides[0].name, "/bin/sh");
        assert_eq!(details.files, vec!["/usr/bin/bash".to_string()]);

        Header::delete(&conn, id).unwrap();
        assert!(HeaderDetails::load(&conn, id).unwrap().is_none());
        assert!(DependencyEntry::find_by_package(&conn, id).unwrap().is_empty());
        assert!(FileEntry::find_by_package(&conn, id).unwrap().is_empty());
    }

    #[test]
    fn test_dep_kind_round_trip() {
        for kind in DepKind::ALL {
            assert_eq!(kind.as_str().parse::<DepKind>().unwrap(), kind);
        }
        assert!("suggests".parse::<DepKind>().is_err());
    }

    #[test]
    fn test_dep_kind_name_outlives_value() {
        let name = Some(DepKind::Obsoletes).map(|k| k.as_str());
        assert_eq!(name, Some("obsoletes"));
    }
}
