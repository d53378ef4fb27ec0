// src/cache/version.rs

//! Aggregate digest of the installed set and its one-line stamp file
//!
//! The stamp (`version` in the cache directory) holds only the last
//! computed fingerprint. It is trusted without recomputation whenever the
//! native database file is not newer than the stamp.

use super::{CacheCodec, Fingerprint, LineReader, LineWriter};
use crate::index::record::PackageIdentity;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::Path;
use tracing::debug;

/// The stamp file has no body: just the fingerprint line
#[derive(Debug)]
pub struct VersionCodec;

impl CacheCodec for VersionCodec {
    type Payload = ();
    const FILE_NAME: &'static str = "version";

    fn encode(_payload: &Self::Payload, _out: &mut LineWriter) {}

    fn decode(_input: &mut LineReader<'_>) -> Option<Self::Payload> {
        Some(())
    }
}

/// Running digest over packages fed in sorted order
#[derive(Clone, Default)]
pub struct SackDigest {
    count: usize,
    hasher: Sha256,
}

impl fmt::Debug for SackDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SackDigest")
            .field("count", &self.count)
            .field("fingerprint", &self.fingerprint())
            .finish()
    }
}

impl SackDigest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one package and its recorded payload checksum, if any
    ///
    /// The checksum halves are the raw attribute contents.
    pub fn update(&mut self, id: &PackageIdentity, checksum: Option<(&[u8], &[u8])>) {
        self.count += 1;
        self.hasher.update(id.nevra().as_bytes());
        if let Some((kind, data)) = checksum {
            self.hasher.update(kind);
            self.hasher.update(data);
        }
    }

    pub fn count(&self) -> usize {
        self.count
    }

    /// `<count>:<sha256 hex>`
    pub fn fingerprint(&self) -> Fingerprint {
        Fingerprint::new(format!("{}:{:x}", self.count, self.hasher.clone().finalize()))
    }
}

/// Digest of one origin repository, overall and per recorded revision
#[derive(Debug, Clone, Default)]
pub struct OriginVersion {
    pub all: SackDigest,
    pub revisions: BTreeMap<String, SackDigest>,
}

/// Result of `Index::simple_version`
#[derive(Debug, Clone)]
pub struct SackVersion {
    pub main: Fingerprint,
    /// Keyed by `@<from_repo>`, or `installed` when the origin is unknown;
    /// empty when only the main digest was requested
    pub origins: BTreeMap<String, OriginVersion>,
}

/// Is the database file provably unchanged since the stamp was written?
pub fn stamp_is_fresh(stamp: &Path, db_file: &Path) -> bool {
    let (Ok(stamp_meta), Ok(db_meta)) = (fs::metadata(stamp), fs::metadata(db_file)) else {
        return false;
    };
    match (stamp_meta.modified(), db_meta.modified()) {
        (Ok(stamp_mtime), Ok(db_mtime)) => {
            let fresh = db_mtime <= stamp_mtime;
            if !fresh {
                debug!("Package database is newer than {}", stamp.display());
            }
            fresh
        }
        _ => false,
    }
}
