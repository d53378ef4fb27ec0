// src/cache/staging.rs

//! Cache payloads computed during an in-flight transaction
//!
//! While a transaction is being planned the caller already knows what the
//! conflicts and file-requires caches will contain once it completes. The
//! payloads wait here until the caller confirms the fingerprint the
//! database actually reached, and are dropped if the transaction is reset.

use super::{CacheStore, ConflictsCodec, Fingerprint, FileRequiresCodec, FileRequiresData};
use crate::error::Result;
use crate::index::record::PackageIdentity;
use tracing::debug;

#[derive(Debug, Default)]
pub struct TransactionStagingCache {
    conflicts: Option<Vec<PackageIdentity>>,
    file_requires: Option<FileRequiresData>,
}

impl TransactionStagingCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace any staged conflicts payload
    pub fn stage_conflicts(&mut self, packages: Vec<PackageIdentity>) {
        self.conflicts = Some(packages);
    }

    /// Replace any staged file-requires payload
    pub fn stage_file_requires(&mut self, data: FileRequiresData) {
        self.file_requires = Some(data);
    }

    pub fn is_empty(&self) -> bool {
        self.conflicts.is_none() && self.file_requires.is_none()
    }

    /// Persist everything staged against the realized fingerprint, then clear
    pub fn confirm(
        &mut self,
        fingerprint: &Fingerprint,
        conflicts: &CacheStore<ConflictsCodec>,
        file_requires: &CacheStore<FileRequiresCodec>,
    ) -> Result<()> {
        let staged_conflicts = self.conflicts.take();
        let staged_file_requires = self.file_requires.take();

        if let Some(packages) = staged_conflicts {
            debug!("Committing staged conflicts cache for {}", fingerprint);
            conflicts.write(&packages, fingerprint)?;
        }
        if let Some(data) = staged_file_requires {
            debug!("Committing staged file-requires cache for {}", fingerprint);
            file_requires.write(&data, fingerprint)?;
        }
        Ok(())
    }

    /// Drop everything staged
    pub fn reset(&mut self) {
        if !self.is_empty() {
            debug!("Discarding staged cache payloads");
        }
        self.conflicts = None;
        self.file_requires = None;
    }
}
