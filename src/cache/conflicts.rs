// src/cache/conflicts.rs

//! Cache of the packages that declare at least one conflict
//!
//! ```text
//! <fingerprint>
//! <count>
//! name / arch / epoch / version / release     (count times)
//! ```

use super::{CacheCodec, LineReader, LineWriter};
use crate::index::record::PackageIdentity;

#[derive(Debug)]
pub struct ConflictsCodec;

impl CacheCodec for ConflictsCodec {
    type Payload = Vec<PackageIdentity>;
    const FILE_NAME: &'static str = "conflicts";

    fn encode(payload: &Self::Payload, out: &mut LineWriter) {
        let mut sorted: Vec<&PackageIdentity> = payload.iter().collect();
        sorted.sort();
        out.count(sorted.len());
        for id in sorted {
            out.identity(id);
        }
    }

    fn decode(input: &mut LineReader<'_>) -> Option<Self::Payload> {
        let n = input.count()?;
        let mut ids = Vec::with_capacity(n.min(4096));
        for _ in 0..n {
            ids.push(input.identity()?);
        }
        Some(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{CacheStore, Fingerprint};
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_sorted_on_disk() {
        let dir = TempDir::new().unwrap();
        let store: CacheStore<ConflictsCodec> = CacheStore::new(dir.path());
        let fp = Fingerprint::from("2:feed");

        let ids = vec![
            PackageIdentity::new("zsh", "x86_64", "0", "5.9", "1"),
            PackageIdentity::new("bash", "x86_64", "0", "5.2", "1"),
        ];
        store.write(&ids, &fp).unwrap();

        let content = fs::read_to_string(store.path()).unwrap();
        assert_eq!(
            content,
            "2:feed\n2\nbash\nx86_64\n0\n5.2\n1\nzsh\nx86_64\n0\n5.9\n1\n"
        );

        let back = store.read(&fp).unwrap();
        assert_eq!(back[0].name.as_ref(), "bash");
        assert_eq!(back[1].name.as_ref(), "zsh");
    }

    #[test]
    fn test_bad_epoch_is_miss() {
        let dir = TempDir::new().unwrap();
        let store: CacheStore<ConflictsCodec> = CacheStore::new(dir.path());
        fs::write(store.path(), "1:x\n1\nbash\nx86_64\nnone\n5.2\n1\n").unwrap();
        assert!(store.read(&Fingerprint::from("1:x")).is_none());
    }
}
