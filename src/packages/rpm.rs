// src/packages/rpm.rs

//! RPM package file reader
//!
//! Turns an `.rpm` file into the header and detail rows the native
//! database records for an installed package.

use crate::db::models::{DependencyEntry, Header, HeaderDetails};
use crate::db::DepKind;
use crate::error::{Error, Result};
use rpm::{Dependency, Package};
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use tracing::debug;

/// Checksum type recorded for imported packages
pub const CHECKSUM_TYPE: &str = "sha256";

/// A parsed RPM file ready to be recorded as installed
#[derive(Debug, Clone)]
pub struct RpmPackage {
    header: Header,
    details: HeaderDetails,
    /// Hex SHA-256 of the whole file; doubles as the package id
    checksum: String,
}

impl RpmPackage {
    /// Parse an RPM file from the given path
    pub fn parse(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        debug!("Parsing RPM package: {}", path.display());

        let checksum = Self::file_checksum(path)?;

        let file = File::open(path)
            .map_err(|e| Error::RpmParse(format!("Failed to open RPM file: {}", e)))?;
        let mut buf_reader = BufReader::new(file);
        let pkg = Package::parse(&mut buf_reader)
            .map_err(|e| Error::RpmParse(format!("Failed to parse RPM: {}", e)))?;
        let md = &pkg.metadata;

        let field = |what: &str, value: std::result::Result<&str, rpm::Error>| {
            value
                .map(str::to_string)
                .map_err(|e| Error::RpmParse(format!("Failed to get package {}: {}", what, e)))
        };
        let name = field("name", md.get_name())?;
        let version = field("version", md.get_version())?;
        let release = field("release", md.get_release())?;
        // Source packages carry no arch tag
        let arch = md.get_arch().unwrap_or("noarch").to_string();

        let mut header = Header::new(&name, &version, &release, &arch, &checksum);
        header.epoch = md.get_epoch().ok();
        header.url = md.get_url().ok().map(str::to_string);
        header.sourcerpm = md.get_source_rpm().ok().map(str::to_string);

        let mut details = HeaderDetails::default();
        let relations = [
            (DepKind::Provides, md.get_provides()),
            (DepKind::Requires, md.get_requires()),
            (DepKind::Conflicts, md.get_conflicts()),
            (DepKind::Obsoletes, md.get_obsoletes()),
        ];
        for (kind, deps) in relations {
            if let Ok(deps) = deps {
                details
                    .entries_mut(kind)
                    .extend(deps.iter().map(|d| dependency_entry(kind, d)));
            }
        }
        if let Ok(paths) = md.get_file_paths() {
            details.files = paths
                .iter()
                .map(|p| p.to_string_lossy().into_owned())
                .collect();
        }

        debug!(
            "Parsed RPM: {}-{}-{}.{} ({} files, {} requires)",
            name,
            version,
            release,
            arch,
            details.files.len(),
            details.requires.len()
        );

        Ok(Self {
            header,
            details,
            checksum,
        })
    }

    fn file_checksum(path: &Path) -> Result<String> {
        let mut file = File::open(path)
            .map_err(|e| Error::RpmParse(format!("Failed to open RPM file: {}", e)))?;
        let mut hasher = Sha256::new();
        let mut buf = [0u8; 64 * 1024];
        loop {
            let n = file.read(&mut buf)?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
        }
        Ok(format!("{:x}", hasher.finalize()))
    }

    pub fn header(&self) -> &Header {
        &self.header
    }

    pub fn details(&self) -> &HeaderDetails {
        &self.details
    }

    pub fn checksum(&self) -> &str {
        &self.checksum
    }

    pub fn into_parts(self) -> (Header, HeaderDetails) {
        (self.header, self.details)
    }
}

/// Convert one RPM dependency into a database entry
fn dependency_entry(kind: DepKind, dep: &Dependency) -> DependencyEntry {
    if dep.version.is_empty() {
        let mut entry = DependencyEntry::new(kind, &dep.name);
        entry.sense = dep.flags.bits();
        entry
    } else {
        DependencyEntry::versioned(kind, &dep.name, dep.flags.bits(), &dep.version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::version::DepFlag;

    #[test]
    fn test_parse_nonexistent_file() {
        let result = RpmPackage::parse("/nonexistent/file.rpm");
        assert!(matches!(result, Err(Error::RpmParse(_))));
    }

    #[test]
    fn test_parse_garbage_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("bogus.rpm");
        std::fs::write(&path, b"not an rpm").unwrap();
        assert!(matches!(RpmPackage::parse(&path), Err(Error::RpmParse(_))));
    }

    #[test]
    fn test_dependency_conversion() {
        let entry = dependency_entry(DepKind::Requires, &Dependency::greater_eq("glibc", "2.34-1"));
        assert_eq!(entry.name, "glibc");
        assert_eq!(DepFlag::from_sense(entry.sense), Some(DepFlag::Ge));
        assert_eq!(entry.version.as_deref(), Some("2.34"));
        assert_eq!(entry.release.as_deref(), Some("1"));

        let entry = dependency_entry(DepKind::Provides, &Dependency::any("webserver"));
        assert_eq!(DepFlag::from_sense(entry.sense), None);
        assert_eq!(entry.version, None);
    }
}
