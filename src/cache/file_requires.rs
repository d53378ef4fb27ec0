// src/cache/file_requires.rs

//! Cache of installed file requirements and their providers
//!
//! ```text
//! <fingerprint>
//! <package count>
//!   name / arch / epoch / version / release
//!   <file count>
//!   path                                   (file count times)
//! <path count>
//!   path
//!   <provider count>
//!   name / arch / epoch / version / release (provider count times)
//! ```
//!
//! Unresolved requirements are never persisted: a result with any is
//! not written in the first place, so a cache hit has none.

use super::{CacheCodec, LineReader, LineWriter};
use crate::index::record::PackageIdentity;
use std::collections::{BTreeMap, BTreeSet};

/// File-path requirements of the installed set
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileRequiresData {
    /// Package -> file paths it requires
    pub requires: BTreeMap<PackageIdentity, BTreeSet<String>>,
    /// Required paths nothing installed provides
    pub unresolved: BTreeSet<String>,
    /// Required path -> packages providing it
    pub providers: BTreeMap<String, BTreeSet<PackageIdentity>>,
}

impl FileRequiresData {
    /// Every required path, across all packages
    pub fn required_paths(&self) -> BTreeSet<&str> {
        self.requires
            .values()
            .flat_map(|paths| paths.iter().map(String::as_str))
            .collect()
    }
}

#[derive(Debug)]
pub struct FileRequiresCodec;

impl CacheCodec for FileRequiresCodec {
    type Payload = FileRequiresData;
    const FILE_NAME: &'static str = "file-requires";

    fn encode(payload: &Self::Payload, out: &mut LineWriter) {
        out.count(payload.requires.len());
        for (id, paths) in &payload.requires {
            out.identity(id);
            out.count(paths.len());
            for path in paths {
                out.line(path);
            }
        }

        out.count(payload.providers.len());
        for (path, ids) in &payload.providers {
            out.line(path);
            out.count(ids.len());
            for id in ids {
                out.identity(id);
            }
        }
    }

    fn decode(input: &mut LineReader<'_>) -> Option<Self::Payload> {
        let mut data = FileRequiresData::default();

        let packages = input.count()?;
        for _ in 0..packages {
            let id = input.identity()?;
            let files = input.count()?;
            let entry = data.requires.entry(id).or_default();
            for _ in 0..files {
                entry.insert(input.line()?.to_string());
            }
        }

        let paths = input.count()?;
        for _ in 0..paths {
            let path = input.line()?.to_string();
            let providers = input.count()?;
            let entry = data.providers.entry(path).or_default();
            for _ in 0..providers {
                entry.insert(input.identity()?);
            }
        }

        Some(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{CacheStore, Fingerprint};
    use std::fs;
    use tempfile::TempDir;

    fn sample() -> FileRequiresData {
        let bash = PackageIdentity::new("bash", "x86_64", "0", "5.2", "1");
        let script = PackageIdentity::new("initscripts", "noarch", "0", "10.0", "1");

        let mut data = FileRequiresData::default();
        data.requires.insert(
            script.clone(),
            ["/bin/sh".to_string(), "/usr/bin/bash".to_string()].into(),
        );
        data.providers
            .insert("/bin/sh".to_string(), [bash.clone()].into());
        data.providers
            .insert("/usr/bin/bash".to_string(), [bash].into());
        data
    }

    #[test]
    fn test_round_trip() {
        let dir = TempDir::new().unwrap();
        let store: CacheStore<FileRequiresCodec> = CacheStore::new(dir.path());
        let fp = Fingerprint::from("2:cafe");

        let data = sample();
        store.write(&data, &fp).unwrap();
        assert_eq!(store.read(&fp), Some(data.clone()));
        assert_eq!(
            data.required_paths().into_iter().collect::<Vec<_>>(),
            vec!["/bin/sh", "/usr/bin/bash"]
        );
    }

    #[test]
    fn test_truncated_providers_is_miss() {
        let dir = TempDir::new().unwrap();
        let store: CacheStore<FileRequiresCodec> = CacheStore::new(dir.path());
        let fp = Fingerprint::from("2:cafe");
        store.write(&sample(), &fp).unwrap();

        let content = fs::read_to_string(store.path()).unwrap();
        let truncated: String = content
            .lines()
            .take(content.lines().count() - 3)
            .map(|l| format!("{}\n", l))
            .collect();
        fs::write(store.path(), truncated).unwrap();

        assert!(store.read(&fp).is_none());
    }
}
