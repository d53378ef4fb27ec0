// src/index/mod.rs

//! In-memory index over the installed package set
//!
//! Records are created lazily from native database scans. Point queries
//! use targeted tag scans until a full scan has been seen, after which
//! everything is answered from memory. All memoized state, including the
//! dependency matcher's, lives here and is cleared by
//! [`Index::drop_cached_data`].

mod derived;
pub mod intern;
pub mod patterns;
pub mod record;

use crate::cache::{SackCaches, SackVersion};
use crate::config::{GPG_PUBKEY, SackConfig};
use crate::db::models::DependencyEntry;
use crate::db::{
    DepKind, Header, HeaderDetails, HeaderIndex, NativeDatabase, NativeHandle, ScanFilter,
    SqliteDatabase, Tag,
};
use crate::error::{Error, Result};
use crate::resolver::{DependencyMatcher, Matches};
use crate::sidecar::SidecarStore;
use crate::version::{DepFlag, DependencyTuple, Evr, compare_evr};
use intern::StringPool;
use patterns::PackagePatterns;
use record::{PackageDetails, PackageIdentity, PackageRecord, PkgRef, normalize_epoch};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::rc::Rc;
use tracing::{debug, info};

/// NEVRA constraints for [`Index::search`]; `None` fields match anything
#[derive(Debug, Clone, Copy, Default)]
pub struct NevraQuery<'a> {
    pub name: Option<&'a str>,
    pub arch: Option<&'a str>,
    pub epoch: Option<&'a str>,
    pub version: Option<&'a str>,
    pub release: Option<&'a str>,
}

impl<'a> NevraQuery<'a> {
    pub fn name(name: &'a str) -> Self {
        Self {
            name: Some(name),
            ..Self::default()
        }
    }

    pub fn arch(mut self, arch: &'a str) -> Self {
        self.arch = Some(arch);
        self
    }

    pub fn evr(mut self, epoch: &'a str, version: &'a str, release: &'a str) -> Self {
        self.epoch = Some(epoch);
        self.version = Some(version);
        self.release = Some(release);
        self
    }

    fn matches(&self, id: &PackageIdentity) -> bool {
        fn field(want: Option<&str>, have: &str) -> bool {
            want.is_none_or(|w| w == have)
        }
        field(self.name, &id.name)
            && field(self.arch, &id.arch)
            && field(self.epoch.map(normalize_epoch), &id.epoch)
            && field(self.version, &id.version)
            && field(self.release, &id.release)
    }

    /// The identity this query pins down, when every field is given
    fn full_identity(&self) -> Option<PackageIdentity> {
        Some(PackageIdentity::new(
            self.name?,
            self.arch?,
            self.epoch?,
            self.version?,
            self.release?,
        ))
    }
}

impl<'a> From<&'a PackageIdentity> for NevraQuery<'a> {
    fn from(id: &'a PackageIdentity) -> Self {
        Self {
            name: Some(&id.name),
            arch: Some(&id.arch),
            epoch: Some(&id.epoch),
            version: Some(&id.version),
            release: Some(&id.release),
        }
    }
}

/// Header fields searched by [`Index::search_primary_fields`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrimaryField {
    Name,
    Url,
    SourceRpm,
}

impl PrimaryField {
    fn value<'p>(&self, pkg: &'p PackageRecord) -> Option<&'p str> {
        match self {
            PrimaryField::Name => Some(pkg.name()),
            PrimaryField::Url => pkg.url.as_deref(),
            PrimaryField::SourceRpm => pkg.sourcerpm.as_deref(),
        }
    }
}

/// The installed package set
pub struct Index {
    config: SackConfig,
    database: Box<dyn NativeDatabase>,
    handle: Option<Rc<dyn NativeHandle>>,

    pool: StringPool,
    idx2pkg: HashMap<HeaderIndex, PkgRef>,
    name2pkg: HashMap<Rc<str>, Vec<PkgRef>>,
    tup2pkg: HashMap<PackageIdentity, PkgRef>,
    completely_loaded: bool,
    simple_pkgtup_list: Option<Vec<PackageIdentity>>,
    prco_cache: HashMap<(DepKind, String), Vec<PkgRef>>,
    file_cache: HashMap<String, Vec<PkgRef>>,
    provides_memo: HashMap<DependencyTuple, Rc<Matches>>,
    requires_memo: HashMap<DependencyTuple, Rc<Matches>>,

    cached_version: Option<SackVersion>,
    cached_conflicts: Option<Vec<PkgRef>>,
    caches: SackCaches,
    attrdb: SidecarStore,
}

impl Index {
    /// Open the index over the SQLite database named by `config`
    pub fn open(config: SackConfig) -> Self {
        let database = SqliteDatabase::new(config.db_file());
        Self::with_database(config, Box::new(database))
    }

    /// Open the index over any native database
    pub fn with_database(config: SackConfig, database: Box<dyn NativeDatabase>) -> Self {
        let caches = SackCaches::new(&config.cache_dir());
        let attrdb = SidecarStore::open(config.attrdb_dir());
        debug!(
            "Index over {} (caches in {})",
            database.db_file().display(),
            config.cache_dir().display()
        );

        Self {
            config,
            database,
            handle: None,
            pool: StringPool::new(),
            idx2pkg: HashMap::new(),
            name2pkg: HashMap::new(),
            tup2pkg: HashMap::new(),
            completely_loaded: false,
            simple_pkgtup_list: None,
            prco_cache: HashMap::new(),
            file_cache: HashMap::new(),
            provides_memo: HashMap::new(),
            requires_memo: HashMap::new(),
            cached_version: None,
            cached_conflicts: None,
            caches,
            attrdb,
        }
    }

    pub fn config(&self) -> &SackConfig {
        &self.config
    }

    /// Per-package attribute store
    pub fn attrdb(&mut self) -> &mut SidecarStore {
        &mut self.attrdb
    }

    /// Dependency queries over this index
    pub fn deps(&mut self) -> DependencyMatcher<'_> {
        DependencyMatcher::new(self)
    }

    pub fn is_completely_loaded(&self) -> bool {
        self.completely_loaded
    }

    /// Number of records built so far
    pub fn loaded_count(&self) -> usize {
        self.idx2pkg.len()
    }

    fn read_only_handle(&mut self) -> Result<Rc<dyn NativeHandle>> {
        if let Some(handle) = &self.handle {
            return Ok(Rc::clone(handle));
        }
        let handle: Rc<dyn NativeHandle> = Rc::from(self.database.open()?);
        self.handle = Some(Rc::clone(&handle));
        Ok(handle)
    }

    /// End of one logical operation
    fn release_handle(&mut self) {
        if self.config.auto_close {
            self.handle = None;
        }
    }

    /// Close the native handle; the next query reopens it
    pub fn close(&mut self) {
        self.handle = None;
    }

    fn identity_of(&mut self, header: &Header) -> PackageIdentity {
        let epoch = header.epoch.map(|e| e.to_string());
        PackageIdentity {
            name: self.pool.intern(&header.name),
            arch: self.pool.intern(&header.arch),
            epoch: self.pool.intern(normalize_epoch(epoch.as_deref().unwrap_or_default())),
            version: self.pool.intern(&header.version),
            release: self.pool.intern(&header.release),
        }
    }

    /// The record for a header, built at most once per native index
    fn make_record(&mut self, index: HeaderIndex, header: Header, identity: PackageIdentity) -> PkgRef {
        if let Some(existing) = self.idx2pkg.get(&index) {
            return Rc::clone(existing);
        }

        let pkg = Rc::new(PackageRecord::new(
            identity,
            index,
            header.pkgid,
            header.url,
            header.sourcerpm,
        ));
        self.idx2pkg.insert(index, Rc::clone(&pkg));
        self.name2pkg
            .entry(Rc::clone(&pkg.identity.name))
            .or_default()
            .push(Rc::clone(&pkg));
        pkg
    }

    /// Scan the native database, building records for headers `keep` accepts
    fn scan_records<F>(&mut self, filter: ScanFilter<'_>, mut keep: F) -> Result<Vec<PkgRef>>
    where
        F: FnMut(&PackageIdentity) -> bool,
    {
        let handle = self.read_only_handle()?;
        let mut found = Vec::new();
        let scanned = handle.scan(filter, &mut |index, header| {
            let identity = self.identity_of(&header);
            if keep(&identity) {
                found.push(self.make_record(index, header, identity));
            }
            Ok(())
        });
        self.release_handle();
        scanned?;
        Ok(found)
    }

    fn not_pseudo(id: &PackageIdentity) -> bool {
        &*id.name != GPG_PUBKEY
    }

    /// Build records for every installed package except signing keys
    pub fn load_all(&mut self) -> Result<()> {
        if self.completely_loaded {
            return Ok(());
        }
        let loaded = self.scan_records(ScanFilter::All, Self::not_pseudo)?;
        self.completely_loaded = true;
        debug!("Loaded {} installed packages", loaded.len());
        Ok(())
    }

    /// Packages matching every given NEVRA field, sorted
    pub fn search(&mut self, query: &NevraQuery<'_>) -> Result<Vec<PkgRef>> {
        let full = query.full_identity();
        if let Some(pkg) = full.as_ref().and_then(|id| self.tup2pkg.get(id)) {
            return Ok(vec![Rc::clone(pkg)]);
        }

        let wants_pseudo = query.name == Some(GPG_PUBKEY);
        let mut found: Vec<PkgRef> = if self.completely_loaded && !wants_pseudo {
            let candidates: Vec<PkgRef> = match query.name {
                Some(name) => self.name2pkg.get(name).cloned().unwrap_or_default(),
                None => self.idx2pkg.values().cloned().collect(),
            };
            candidates
                .into_iter()
                .filter(|pkg| query.matches(&pkg.identity))
                .collect()
        } else {
            let filter = match (query.name, query.arch) {
                (Some(name), _) => ScanFilter::Tag(Tag::Name, name),
                (None, Some(arch)) => ScanFilter::Tag(Tag::Arch, arch),
                (None, None) => ScanFilter::All,
            };
            let full_scan = matches!(filter, ScanFilter::All);
            let scanned =
                self.scan_records(filter, |id| wants_pseudo || Self::not_pseudo(id))?;
            if full_scan {
                self.completely_loaded = true;
            }
            scanned
                .into_iter()
                .filter(|pkg| query.matches(&pkg.identity))
                .collect()
        };
        found.sort();

        if let (Some(id), [pkg]) = (full, found.as_slice()) {
            self.tup2pkg.insert(id, Rc::clone(pkg));
        }
        Ok(found)
    }

    /// [`Index::search`] with positional NEVRA fields
    pub fn search_nevra(
        &mut self,
        name: Option<&str>,
        epoch: Option<&str>,
        version: Option<&str>,
        release: Option<&str>,
        arch: Option<&str>,
    ) -> Result<Vec<PkgRef>> {
        self.search(&NevraQuery {
            name,
            arch,
            epoch,
            version,
            release,
        })
    }

    /// Packages with any of the given names
    pub fn search_names<S: AsRef<str>>(&mut self, names: &[S]) -> Result<Vec<PkgRef>> {
        let mut found = Vec::new();
        for name in names {
            found.extend(self.search(&NevraQuery::name(name.as_ref()))?);
        }
        found.sort();
        found.dedup();
        Ok(found)
    }

    /// Is anything matching `query` installed?
    pub fn installed(&mut self, query: &NevraQuery<'_>) -> Result<bool> {
        Ok(!self.search(query)?.is_empty())
    }

    /// The highest-versioned packages of `name`, one per arch when versions tie
    pub fn return_newest_by_name(&mut self, name: &str) -> Result<Vec<PkgRef>> {
        self.newest(NevraQuery::name(name))
    }

    pub fn return_newest_by_name_arch(&mut self, name: &str, arch: &str) -> Result<Vec<PkgRef>> {
        self.newest(NevraQuery::name(name).arch(arch))
    }

    fn newest(&mut self, query: NevraQuery<'_>) -> Result<Vec<PkgRef>> {
        let pkgs = self.search(&query)?;
        let Some(newest) = pkgs
            .iter()
            .max_by(|a, b| compare_evr(&a.identity.evr(), &b.identity.evr()))
            .map(|pkg| pkg.identity.evr())
        else {
            return Err(Error::NotFound(query.name.unwrap_or_default().to_string()));
        };

        Ok(pkgs
            .into_iter()
            .filter(|pkg| compare_evr(&pkg.identity.evr(), &newest) == Ordering::Equal)
            .collect())
    }

    /// Every installed package (signing keys excluded), sorted
    pub fn all_packages(&mut self) -> Result<Vec<PkgRef>> {
        self.return_packages::<&str>(None, false)
    }

    /// Installed packages, optionally narrowed by shell-style patterns
    ///
    /// Without a full load, up to `patterns_max` patterns prefilter the
    /// scan so only matching headers become records.
    pub fn return_packages<S: AsRef<str>>(
        &mut self,
        patterns: Option<&[S]>,
        ignore_case: bool,
    ) -> Result<Vec<PkgRef>> {
        let patterns = patterns.filter(|p| !p.is_empty());

        if !self.completely_loaded {
            match patterns {
                None => self.load_all()?,
                Some(pats) => {
                    let prefilter =
                        PackagePatterns::compile(pats, ignore_case, self.config.patterns_max);
                    self.scan_records(ScanFilter::All, |id| {
                        Self::not_pseudo(id) && prefilter.as_ref().is_none_or(|p| p.matches(id))
                    })?;
                }
            }
        }

        let mut pkgs: Vec<PkgRef> = self
            .idx2pkg
            .values()
            .filter(|pkg| Self::not_pseudo(&pkg.identity))
            .cloned()
            .collect();
        if let Some(compiled) = patterns.and_then(|p| PackagePatterns::compile(p, ignore_case, usize::MAX)) {
            pkgs.retain(|pkg| compiled.matches(&pkg.identity));
        }
        pkgs.sort();
        Ok(pkgs)
    }

    /// Identities of every installed package, without building records
    pub fn simple_pkg_list(&mut self) -> Result<Vec<PackageIdentity>> {
        if let Some(list) = &self.simple_pkgtup_list {
            return Ok(list.clone());
        }

        let mut list: Vec<PackageIdentity> = if self.completely_loaded {
            self.idx2pkg
                .values()
                .filter(|pkg| Self::not_pseudo(&pkg.identity))
                .map(|pkg| pkg.identity.clone())
                .collect()
        } else {
            let handle = self.read_only_handle()?;
            let mut ids = Vec::new();
            let scanned = handle.scan(ScanFilter::All, &mut |_, header| {
                if header.name != GPG_PUBKEY {
                    ids.push(self.identity_of(&header));
                }
                Ok(())
            });
            self.release_handle();
            scanned?;
            ids
        };
        list.sort();

        self.simple_pkgtup_list = Some(list.clone());
        Ok(list)
    }

    /// Packages owning the file `path`
    pub fn search_files(&mut self, path: &str) -> Result<Vec<PkgRef>> {
        if let Some(hit) = self.file_cache.get(path) {
            return Ok(hit.clone());
        }
        let mut found = self.scan_records(ScanFilter::Tag(Tag::BaseName, path), |_| true)?;
        found.sort();
        self.file_cache.insert(path.to_string(), found.clone());
        Ok(found)
    }

    /// Packages with a `kind` entry named `name`
    ///
    /// Provides of a path also include every owner of that file.
    pub fn search_prco(&mut self, name: &str, kind: DepKind) -> Result<Vec<PkgRef>> {
        let key = (kind, name.to_string());
        if let Some(hit) = self.prco_cache.get(&key) {
            return Ok(hit.clone());
        }

        let mut found = self.scan_records(ScanFilter::Tag(Tag::for_kind(kind), name), |_| true)?;
        if kind == DepKind::Provides && name.starts_with('/') {
            found.extend(self.search_files(name)?);
        }
        found.sort();
        found.dedup();

        self.prco_cache.insert(key, found.clone());
        Ok(found)
    }

    pub fn search_provides(&mut self, name: &str) -> Result<Vec<PkgRef>> {
        self.search_prco(name, DepKind::Provides)
    }

    pub fn search_requires(&mut self, name: &str) -> Result<Vec<PkgRef>> {
        self.search_prco(name, DepKind::Requires)
    }

    pub fn search_conflicts(&mut self, name: &str) -> Result<Vec<PkgRef>> {
        self.search_prco(name, DepKind::Conflicts)
    }

    pub fn search_obsoletes(&mut self, name: &str) -> Result<Vec<PkgRef>> {
        self.search_prco(name, DepKind::Obsoletes)
    }

    /// Packages with a provide name or owned file matching a glob
    pub fn search_all(&mut self, pattern: &str) -> Result<Vec<PkgRef>> {
        let mut found =
            self.scan_records(ScanFilter::TagGlob(Tag::ProvideName, pattern), |_| true)?;
        found.extend(self.scan_records(ScanFilter::TagGlob(Tag::BaseName, pattern), |_| true)?);
        found.sort();
        found.dedup();
        Ok(found)
    }

    /// Case-insensitive substring search over header fields
    ///
    /// Each hit carries how many of `needles` matched; best hits first.
    pub fn search_primary_fields<S: AsRef<str>>(
        &mut self,
        fields: &[PrimaryField],
        needles: &[S],
    ) -> Result<Vec<(PkgRef, usize)>> {
        let needles: Vec<String> = needles.iter().map(|s| s.as_ref().to_lowercase()).collect();
        let mut hits = Vec::new();

        for pkg in self.all_packages()? {
            let values: Vec<String> = fields
                .iter()
                .filter_map(|f| f.value(&pkg))
                .map(str::to_lowercase)
                .collect();
            let count = needles
                .iter()
                .filter(|needle| values.iter().any(|v| v.contains(needle.as_str())))
                .count();
            if count > 0 {
                hits.push((pkg, count));
            }
        }

        hits.sort_by(|(a, ca), (b, cb)| cb.cmp(ca).then_with(|| a.cmp(b)));
        Ok(hits)
    }

    /// The signing-key pseudo-packages
    pub fn return_gpg_pubkey_packages(&mut self) -> Result<Vec<PkgRef>> {
        let mut found =
            self.scan_records(ScanFilter::Tag(Tag::Name, GPG_PUBKEY), |_| true)?;
        found.sort();
        Ok(found)
    }

    fn tuple_of(&mut self, entry: &DependencyEntry) -> DependencyTuple {
        DependencyTuple {
            name: self.pool.intern(&entry.name),
            flag: DepFlag::from_sense(entry.sense),
            evr: Evr {
                epoch: self.pool.intern_opt(entry.epoch.as_deref()),
                version: self.pool.intern_opt(entry.version.as_deref()),
                release: self.pool.intern_opt(entry.release.as_deref()),
            },
        }
    }

    fn convert_details(&mut self, raw: HeaderDetails) -> PackageDetails {
        let mut tuples = |entries: &[DependencyEntry]| -> Vec<DependencyTuple> {
            entries.iter().map(|e| self.tuple_of(e)).collect()
        };
        PackageDetails {
            provides: tuples(&raw.provides),
            requires: tuples(&raw.requires),
            conflicts: tuples(&raw.conflicts),
            obsoletes: tuples(&raw.obsoletes),
            files: raw.files,
        }
    }

    /// Dependency entries and files of `pkg`, fetched on first use
    ///
    /// Fails with [`Error::StaleHandle`] if the header is gone from the
    /// native database.
    pub fn details(&mut self, pkg: &PackageRecord) -> Result<Rc<PackageDetails>> {
        if let Some(details) = pkg.cached_details() {
            return Ok(details);
        }

        let handle = self.read_only_handle()?;
        let fetched = handle.details(pkg.handle);
        self.release_handle();
        let Some(raw) = fetched? else {
            return Err(Error::StaleHandle(pkg.handle));
        };

        let details = Rc::new(self.convert_details(raw));
        *pkg.details.borrow_mut() = Some(Rc::clone(&details));
        Ok(details)
    }

    /// Drop the lazily fetched fields of `pkg` and fetch them again
    pub fn refresh(&mut self, pkg: &PackageRecord) -> Result<Rc<PackageDetails>> {
        pkg.details.replace(None);
        self.details(pkg)
    }

    pub(crate) fn dep_memo(&mut self, kind: DepKind) -> &mut HashMap<DependencyTuple, Rc<Matches>> {
        match kind {
            DepKind::Requires => &mut self.requires_memo,
            _ => &mut self.provides_memo,
        }
    }

    /// Forget every record and memoized answer; on-disk caches stay
    pub fn drop_cached_data(&mut self) {
        self.handle = None;
        self.pool.clear();
        self.idx2pkg.clear();
        self.name2pkg.clear();
        self.tup2pkg.clear();
        self.completely_loaded = false;
        self.simple_pkgtup_list = None;
        self.prco_cache.clear();
        self.file_cache.clear();
        self.provides_memo.clear();
        self.requires_memo.clear();
        self.cached_version = None;
        self.cached_conflicts = None;
        info!("Dropped cached installed-package data");
    }
}
