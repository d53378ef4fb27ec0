// src/index/derived.rs

//! Derived analyses of the installed set, gated by the persisted caches

use super::{Index, NevraQuery};
use crate::cache::version::{OriginVersion, stamp_is_fresh};
use crate::cache::{Fingerprint, FileRequiresData, SackDigest, SackVersion};
use crate::error::Result;
use crate::index::record::{PackageIdentity, PkgRef};
use crate::resolver::Problem;
use std::collections::BTreeMap;
use tracing::{debug, warn};

const ATTR_CHECKSUM_TYPE: &str = "checksum_type";
const ATTR_CHECKSUM_DATA: &str = "checksum_data";
const ATTR_FROM_REPO: &str = "from_repo";
const ATTR_FROM_REPO_REVISION: &str = "from_repo_revision";

impl Index {
    /// Fingerprint of the current installed set
    pub fn fingerprint(&mut self) -> Result<Fingerprint> {
        Ok(self.simple_version(true)?.main)
    }

    /// Aggregate digest of every installed package
    ///
    /// With `main_only` the version stamp is trusted when the database
    /// file has not changed since it was written. Otherwise the digest is
    /// also broken down by origin repository.
    pub fn simple_version(&mut self, main_only: bool) -> Result<SackVersion> {
        if let Some(cached) = &self.cached_version {
            if main_only || !cached.origins.is_empty() {
                return Ok(cached.clone());
            }
        }

        if main_only && self.config.cache_enabled {
            if let Some((main, ())) = self.caches.version.peek() {
                if stamp_is_fresh(&self.caches.version.path(), self.database.db_file()) {
                    debug!("Using stamped installed version {}", main);
                    let version = SackVersion {
                        main,
                        origins: BTreeMap::new(),
                    };
                    self.cached_version = Some(version.clone());
                    return Ok(version);
                }
            }
        }

        let mut main = SackDigest::new();
        let mut origins: BTreeMap<String, OriginVersion> = BTreeMap::new();
        for pkg in self.all_packages()? {
            let key = pkg.attr_key();
            let checksum_type = self.attrdb.get(key, ATTR_CHECKSUM_TYPE)?;
            let checksum_data = self.attrdb.get(key, ATTR_CHECKSUM_DATA)?;
            let checksum = checksum_type.as_deref().zip(checksum_data.as_deref());
            main.update(&pkg.identity, checksum);

            if main_only {
                continue;
            }
            let origin = match self.attrdb.get_text(key, ATTR_FROM_REPO)? {
                Some(repo) => format!("@{}", repo),
                None => "installed".to_string(),
            };
            let entry = origins.entry(origin).or_default();
            entry.all.update(&pkg.identity, checksum);
            if let Some(revision) = self.attrdb.get_text(key, ATTR_FROM_REPO_REVISION)? {
                entry
                    .revisions
                    .entry(revision)
                    .or_default()
                    .update(&pkg.identity, checksum);
            }
        }

        let version = SackVersion {
            main: main.fingerprint(),
            origins,
        };
        if self.config.cache_enabled {
            self.write_cache_logged("version", |caches| caches.version.write(&(), &version.main));
        }
        self.cached_version = Some(version.clone());
        Ok(version)
    }

    fn write_cache_logged<F>(&self, what: &str, write: F)
    where
        F: FnOnce(&crate::cache::SackCaches) -> Result<()>,
    {
        if let Err(e) = write(&self.caches) {
            warn!("Failed to write {} cache: {}", what, e);
        }
    }

    fn packages_for(&mut self, ids: &[PackageIdentity]) -> Result<Vec<PkgRef>> {
        let mut pkgs = Vec::with_capacity(ids.len());
        for id in ids {
            pkgs.extend(self.search(&NevraQuery::from(id))?);
        }
        pkgs.sort();
        pkgs.dedup();
        Ok(pkgs)
    }

    /// Installed packages that declare any conflicts
    pub fn return_conflict_packages(&mut self) -> Result<Vec<PkgRef>> {
        if let Some(cached) = &self.cached_conflicts {
            return Ok(cached.clone());
        }

        let fingerprint = self.fingerprint()?;
        if self.config.cache_enabled {
            if let Some(ids) = self.caches.conflicts.read(&fingerprint) {
                debug!("Conflicts cache hit ({} packages)", ids.len());
                let pkgs = self.packages_for(&ids)?;
                self.cached_conflicts = Some(pkgs.clone());
                return Ok(pkgs);
            }
        }

        let mut pkgs = Vec::new();
        for pkg in self.all_packages()? {
            if !self.details(&pkg)?.conflicts.is_empty() {
                pkgs.push(pkg);
            }
        }

        if self.config.cache_enabled {
            let ids: Vec<PackageIdentity> = pkgs.iter().map(|p| p.identity.clone()).collect();
            self.write_cache_logged("conflicts", |caches| caches.conflicts.write(&ids, &fingerprint));
        }
        self.cached_conflicts = Some(pkgs.clone());
        Ok(pkgs)
    }

    /// File requirements of every package and who provides them
    ///
    /// Persisted only when every required path resolved.
    pub fn file_requires_data(&mut self) -> Result<FileRequiresData> {
        let fingerprint = self.fingerprint()?;
        if self.config.cache_enabled {
            if let Some(data) = self.caches.file_requires.read(&fingerprint) {
                debug!("File-requires cache hit");
                return Ok(data);
            }
        }

        let mut data = FileRequiresData::default();
        for pkg in self.all_packages()? {
            let details = self.details(&pkg)?;
            let paths: Vec<String> = details
                .requires
                .iter()
                .filter(|req| req.is_file())
                .map(|req| req.name.to_string())
                .collect();
            if !paths.is_empty() {
                data.requires
                    .entry(pkg.identity.clone())
                    .or_default()
                    .extend(paths);
            }
        }

        let required: Vec<String> = data.required_paths().into_iter().map(String::from).collect();
        for path in required {
            let providers = self.deps().get_provides(&path, None, None)?;
            if providers.is_empty() {
                data.unresolved.insert(path);
            } else {
                data.providers
                    .insert(path, providers.keys().map(|p| p.identity.clone()).collect());
            }
        }

        if self.config.cache_enabled && data.unresolved.is_empty() {
            self.write_cache_logged("file-requires", |caches| {
                caches.file_requires.write(&data, &fingerprint)
            });
        }
        Ok(data)
    }

    /// Stage the conflicts payload the pending transaction will produce
    pub fn transaction_cache_conflict_packages(&mut self, pkgs: &[PackageIdentity]) {
        if self.config.cache_enabled {
            self.caches.staging.stage_conflicts(pkgs.to_vec());
        }
    }

    /// Stage the file-requires payload the pending transaction will produce
    ///
    /// Ignored when anything is unresolved or any problem was found.
    pub fn transaction_cache_file_requires(&mut self, data: FileRequiresData, problems: &[Problem]) {
        if !self.config.cache_enabled || !problems.is_empty() || !data.unresolved.is_empty() {
            debug!("Not staging file-requires cache");
            return;
        }
        self.caches.staging.stage_file_requires(data);
    }

    /// The transaction finished and the database reached `fingerprint`
    pub fn transaction_result_version(&mut self, fingerprint: &Fingerprint) -> Result<()> {
        if !self.config.cache_enabled {
            return Ok(());
        }
        let caches = &mut self.caches;
        caches
            .staging
            .confirm(fingerprint, &caches.conflicts, &caches.file_requires)?;
        caches.version.write(&(), fingerprint)?;
        self.cached_version = None;
        Ok(())
    }

    /// The transaction was abandoned
    pub fn transaction_reset(&mut self) {
        self.caches.staging.reset();
    }

    pub fn has_staged_caches(&self) -> bool {
        !self.caches.staging.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::Fixture;
    use crate::db::DepKind;
    use crate::cache::{CacheStore, ConflictsCodec, FileRequiresCodec};
    use std::fs::File;
    use std::time::{Duration, SystemTime};

    fn bump_mtime(path: &std::path::Path, secs: u64) {
        let when = SystemTime::now() + Duration::from_secs(secs);
        File::options()
            .write(true)
            .open(path)
            .unwrap()
            .set_modified(when)
            .unwrap();
    }

    #[test]
    fn test_simple_version_by_origin() {
        let fx = Fixture::new();
        fx.add("bash", "x86_64", "5.2", &[], &[]);
        fx.add("zsh", "x86_64", "5.9", &[], &[]);

        let mut index = fx.index();
        let zsh = index.search(&super::NevraQuery::name("zsh")).unwrap().remove(0);
        index.attrdb().set(zsh.attr_key(), "from_repo", "fedora").unwrap();
        index
            .attrdb()
            .set(zsh.attr_key(), "from_repo_revision", "1700000000")
            .unwrap();

        let version = index.simple_version(false).unwrap();
        assert!(version.main.as_str().starts_with("2:"));
        assert_eq!(version.origins.len(), 2);
        assert_eq!(version.origins["@fedora"].all.count(), 1);
        assert_eq!(version.origins["installed"].all.count(), 1);
        assert_eq!(version.origins["@fedora"].revisions["1700000000"].count(), 1);
    }

    #[test]
    fn test_checksums_feed_the_digest() {
        let fx = Fixture::new();
        fx.add("bash", "x86_64", "5.2", &[], &[]);

        let mut index = fx.index();
        let before = index.simple_version(true).unwrap().main;

        let bash = index.all_packages().unwrap().remove(0);
        index.attrdb().set(bash.attr_key(), "checksum_type", "sha256").unwrap();
        index.attrdb().set(bash.attr_key(), "checksum_data", "00ff").unwrap();
        index.drop_cached_data();
        // Stamp would otherwise short-circuit
        bump_mtime(&fx.config.db_file(), 10);

        let after = index.simple_version(true).unwrap().main;
        assert_ne!(before, after);
    }

    #[test]
    fn test_binary_checksum_attribute() {
        let fx = Fixture::new();
        fx.add("bash", "x86_64", "5.2", &[], &[]);

        let mut index = fx.index();
        let bash = index.all_packages().unwrap().remove(0);
        index.attrdb().set(bash.attr_key(), "checksum_type", "sha256").unwrap();
        index
            .attrdb()
            .set(bash.attr_key(), "checksum_data", [0xff_u8, 0xfe, 0x00])
            .unwrap();

        let version = index.simple_version(false).unwrap();
        assert!(version.main.as_str().starts_with("1:"));
        assert_eq!(version.origins["installed"].all.count(), 1);
        assert_eq!(index.return_conflict_packages().unwrap().len(), 0);
    }

    #[test]
    fn test_stamp_fast_path() {
        let fx = Fixture::new();
        fx.add("bash", "x86_64", "5.2", &[], &[]);

        let mut index = fx.index();
        let computed = index.simple_version(true).unwrap().main;
        let stamp = fx.config.cache_dir().join("version");
        assert!(stamp.exists());

        // Database unchanged: the stamp is trusted even though it lies
        std::fs::write(&stamp, "bogus\n").unwrap();
        bump_mtime(&stamp, 10);
        index.drop_cached_data();
        assert_eq!(index.simple_version(true).unwrap().main.as_str(), "bogus");

        // Database newer than the stamp: recomputed
        bump_mtime(&fx.config.db_file(), 20);
        index.drop_cached_data();
        assert_eq!(index.simple_version(true).unwrap().main, computed);
    }

    #[test]
    fn test_conflicts_cache_round_trip() {
        let fx = Fixture::new();
        fx.add("sendmail", "x86_64", "8.18", &[(DepKind::Conflicts, "postfix")], &[]);
        fx.add("bash", "x86_64", "5.2", &[], &[]);

        let mut index = fx.index();
        let pkgs = index.return_conflict_packages().unwrap();
        assert_eq!(pkgs.len(), 1);
        assert_eq!(pkgs[0].name(), "sendmail");

        let fingerprint = index.fingerprint().unwrap();
        let store = CacheStore::<ConflictsCodec>::new(fx.config.cache_dir());
        let ids = store.read(&fingerprint).unwrap();
        assert_eq!(ids.len(), 1);

        index.drop_cached_data();
        let again = index.return_conflict_packages().unwrap();
        assert_eq!(again[0].name(), "sendmail");
    }

    #[test]
    fn test_file_requires_written_only_when_resolved() {
        let fx = Fixture::new();
        fx.add("bash", "x86_64", "5.2", &[], &["/usr/bin/bash"]);
        fx.add("script", "noarch", "1.0", &[(DepKind::Requires, "/usr/bin/bash")], &[]);

        let mut index = fx.index();
        let data = index.file_requires_data().unwrap();
        assert!(data.unresolved.is_empty());
        assert_eq!(data.providers["/usr/bin/bash"].len(), 1);
        let fingerprint = index.fingerprint().unwrap();
        let store = CacheStore::<FileRequiresCodec>::new(fx.config.cache_dir());
        assert!(store.read(&fingerprint).is_some());

        fx.add("tool", "noarch", "1.0", &[(DepKind::Requires, "/usr/bin/python3")], &[]);
        bump_mtime(&fx.config.db_file(), 10);
        index.drop_cached_data();
        let data = index.file_requires_data().unwrap();
        assert!(data.unresolved.contains("/usr/bin/python3"));
        let fingerprint = index.fingerprint().unwrap();
        assert!(store.read(&fingerprint).is_none());
    }

    #[test]
    fn test_transaction_staging() {
        let fx = Fixture::new();
        fx.add("bash", "x86_64", "5.2", &[], &[]);
        let mut index = fx.index();
        let store = CacheStore::<ConflictsCodec>::new(fx.config.cache_dir());
        let bash = index.all_packages().unwrap().remove(0);

        index.transaction_cache_conflict_packages(&[bash.identity.clone()]);
        assert!(index.has_staged_caches());
        index.transaction_reset();
        assert!(!index.has_staged_caches());

        index.transaction_cache_conflict_packages(&[bash.identity.clone()]);
        let future = crate::cache::Fingerprint::new("9:feed");
        index.transaction_result_version(&future).unwrap();
        assert!(!index.has_staged_caches());
        assert_eq!(store.read(&future).unwrap(), vec![bash.identity.clone()]);
    }

    #[test]
    fn test_problems_block_file_requires_staging() {
        let fx = Fixture::new();
        fx.add("bash", "x86_64", "5.2", &[(DepKind::Requires, "libmissing")], &[]);
        let mut index = fx.index();

        let problems = index.deps().check_dependencies(None).unwrap();
        assert_eq!(problems.len(), 1);
        let data = index.file_requires_data().unwrap();
        index.transaction_cache_file_requires(data.clone(), &problems);
        assert!(!index.has_staged_caches());
        index.transaction_cache_file_requires(data, &[]);
        assert!(index.has_staged_caches());
    }
}
