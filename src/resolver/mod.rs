// src/resolver/mod.rs

//! Dependency matching over the installed set
//!
//! Provides/requires queries are answered from the name-indexed scans of
//! the [`Index`] and compared with RPM range semantics. Answers are
//! memoized in the index per canonical query tuple, so they live exactly
//! as long as its other cached data.

pub mod multilib;
pub mod problems;

use crate::config::RPMLIB_PREFIX;
use crate::db::DepKind;
use crate::error::Result;
use crate::index::Index;
use crate::index::record::{PackageIdentity, PackageRecord, PkgRef};
use crate::version::{DepFlag, DependencyTuple, Evr, range_compare};
use std::collections::{BTreeMap, HashSet};
use std::rc::Rc;
use tracing::debug;

pub use problems::Problem;

/// Each matching package with the entries of it that satisfied the query
pub type Matches = BTreeMap<PkgRef, Vec<DependencyTuple>>;

/// Dependency queries borrowing an [`Index`]; see [`Index::deps`]
pub struct DependencyMatcher<'a> {
    index: &'a mut Index,
}

impl<'a> DependencyMatcher<'a> {
    pub(crate) fn new(index: &'a mut Index) -> Self {
        Self { index }
    }

    /// Packages providing `name`, optionally within a version range
    pub fn get_provides(
        &mut self,
        name: &str,
        flag: Option<DepFlag>,
        evr: Option<&Evr>,
    ) -> Result<Rc<Matches>> {
        self.get(DepKind::Provides, name, flag, evr)
    }

    /// Packages requiring `name`, optionally within a version range
    pub fn get_requires(
        &mut self,
        name: &str,
        flag: Option<DepFlag>,
        evr: Option<&Evr>,
    ) -> Result<Rc<Matches>> {
        self.get(DepKind::Requires, name, flag, evr)
    }

    fn get(
        &mut self,
        kind: DepKind,
        name: &str,
        flag: Option<DepFlag>,
        evr: Option<&Evr>,
    ) -> Result<Rc<Matches>> {
        let query = DependencyTuple::new(name, flag, evr.cloned().unwrap_or_default());
        if let Some(hit) = self.index.dep_memo(kind).get(&query) {
            return Ok(Rc::clone(hit));
        }

        let mut result = Matches::new();
        for pkg in self.index.search_prco(name, kind)? {
            let hits = self.matching_prcos(&pkg, kind, &query)?;
            if !hits.is_empty() {
                result.insert(pkg, hits);
            }
        }

        // An unversioned path is satisfied by whoever owns the file
        if kind == DepKind::Provides && query.is_file() && query.evr.is_empty() {
            let hit = DependencyTuple::unversioned(name);
            for pkg in self.index.search_files(name)? {
                let hits = result.entry(pkg).or_default();
                if !hits.contains(&hit) {
                    hits.push(hit.clone());
                }
            }
        }

        debug!("{} {}: {} packages", kind.as_str(), query, result.len());
        let result = Rc::new(result);
        self.index.dep_memo(kind).insert(query, Rc::clone(&result));
        Ok(result)
    }

    /// The `kind` entries of `pkg` that satisfy `req`
    ///
    /// A provide without an exact version is compared as if it carried the
    /// package's own epoch, version and release.
    pub fn matching_prcos(
        &mut self,
        pkg: &PackageRecord,
        kind: DepKind,
        req: &DependencyTuple,
    ) -> Result<Vec<DependencyTuple>> {
        let details = self.index.details(pkg)?;
        let mut hits = Vec::new();

        for entry in details.prco(kind) {
            if entry.name != req.name {
                continue;
            }
            let mut candidate = entry.clone();
            if kind == DepKind::Provides && entry.flag != Some(DepFlag::Eq) {
                let id = &pkg.identity;
                let evr = &mut candidate.evr;
                evr.epoch.get_or_insert_with(|| Rc::clone(&id.epoch));
                evr.version.get_or_insert_with(|| Rc::clone(&id.version));
                evr.release.get_or_insert_with(|| Rc::clone(&id.release));
            }
            if range_compare(req, &candidate) {
                hits.push(candidate);
            }
        }

        Ok(hits)
    }

    pub fn what_provides(
        &mut self,
        name: &str,
        flag: Option<DepFlag>,
        evr: Option<&Evr>,
    ) -> Result<Vec<PackageIdentity>> {
        let matches = self.get_provides(name, flag, evr)?;
        Ok(matches.keys().map(|pkg| pkg.identity.clone()).collect())
    }

    pub fn what_requires(
        &mut self,
        name: &str,
        flag: Option<DepFlag>,
        evr: Option<&Evr>,
    ) -> Result<Vec<PackageIdentity>> {
        let matches = self.get_requires(name, flag, evr)?;
        Ok(matches.keys().map(|pkg| pkg.identity.clone()).collect())
    }

    /// Unsatisfied requires and satisfied conflicts of `pkgs` (default: all)
    pub fn check_dependencies(&mut self, pkgs: Option<Vec<PkgRef>>) -> Result<Vec<Problem>> {
        let mut pkgs = match pkgs {
            Some(pkgs) => pkgs,
            None => self.index.all_packages()?,
        };
        pkgs.sort();

        let mut providers: HashSet<DependencyTuple> = HashSet::new();
        let mut problems = Vec::new();

        for pkg in &pkgs {
            let details = self.index.details(pkg)?;

            for req in &details.requires {
                if req.name.starts_with(RPMLIB_PREFIX) || providers.contains(req) {
                    continue;
                }
                if !self.get_provides(&req.name, req.flag, Some(&req.evr))?.is_empty() {
                    providers.insert(req.clone());
                    continue;
                }
                problems.push(Problem::MissingRequires {
                    package: pkg.identity.clone(),
                    missing: req.to_string(),
                });
            }

            for conflict in &details.conflicts {
                if conflict.name.starts_with(RPMLIB_PREFIX) {
                    continue;
                }
                let found = self.get_provides(&conflict.name, conflict.flag, Some(&conflict.evr))?;
                if found.is_empty() {
                    continue;
                }
                problems.push(Problem::Conflicts {
                    package: pkg.identity.clone(),
                    found: conflict.to_string(),
                    conflicts: found.keys().map(|p| p.identity.clone()).collect(),
                });
            }
        }

        debug!("Dependency check found {} problems", problems.len());
        Ok(problems)
    }

    /// Version-equal installs of one name, minus `ignore` and multilib pairs
    pub fn check_duplicates<S: AsRef<str>>(&mut self, ignore: &[S]) -> Result<Vec<Problem>> {
        let pkgs = self.index.all_packages()?;
        let mut problems = Vec::new();
        let mut last: Option<&PkgRef> = None;

        for pkg in &pkgs {
            if ignore.iter().any(|n| n.as_ref() == pkg.name()) {
                continue;
            }
            if let Some(prev) = last.filter(|prev| prev.name() == pkg.name()) {
                if prev.identity.ver_eq(&pkg.identity)
                    && !multilib::is_duplicate_exception(prev.arch(), pkg.arch())
                {
                    problems.push(Problem::Duplicate {
                        package: pkg.identity.clone(),
                        duplicate: prev.identity.clone(),
                    });
                }
            }
            last = Some(pkg);
        }

        Ok(problems)
    }
}
