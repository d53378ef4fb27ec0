// src/index/record.rs

//! Package identity and the per-package record kept by the index

use crate::db::{DepKind, HeaderIndex};
use crate::version::{DependencyTuple, Evr, compare_evr};
use serde::{Serialize, Serializer};
use std::cell::RefCell;
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::Rc;

/// Shared reference to a record owned by an [`crate::Index`]
pub type PkgRef = Rc<PackageRecord>;

/// (name, arch, epoch, version, release) of an installed package
///
/// The epoch is always materialized; a header without one gets `"0"`.
/// Field order matches the on-disk cache layout and the sort order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PackageIdentity {
    pub name: Rc<str>,
    pub arch: Rc<str>,
    pub epoch: Rc<str>,
    pub version: Rc<str>,
    pub release: Rc<str>,
}

impl PackageIdentity {
    pub fn new(name: &str, arch: &str, epoch: &str, version: &str, release: &str) -> Self {
        Self {
            name: Rc::from(name),
            arch: Rc::from(arch),
            epoch: Rc::from(normalize_epoch(epoch)),
            version: Rc::from(version),
            release: Rc::from(release),
        }
    }

    pub fn evr(&self) -> Evr {
        Evr {
            epoch: Some(Rc::clone(&self.epoch)),
            version: Some(Rc::clone(&self.version)),
            release: Some(Rc::clone(&self.release)),
        }
    }

    /// `name-version-release.arch`, with `epoch:` before the version when non-zero
    pub fn nevra(&self) -> String {
        self.to_string()
    }

    /// Same name and epoch/version/release; arch is ignored
    pub fn ver_eq(&self, other: &Self) -> bool {
        self.name == other.name && compare_evr(&self.evr(), &other.evr()) == Ordering::Equal
    }
}

/// Missing or placeholder epochs become `"0"`
pub fn normalize_epoch(epoch: &str) -> &str {
    match epoch {
        "" | "(none)" => "0",
        e => e,
    }
}

impl fmt::Display for PackageIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if &*self.epoch == "0" {
            write!(f, "{}-{}-{}.{}", self.name, self.version, self.release, self.arch)
        } else {
            write!(
                f,
                "{}-{}:{}-{}.{}",
                self.name, self.epoch, self.version, self.release, self.arch
            )
        }
    }
}

impl Serialize for PackageIdentity {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Dependency relations and owned files, fetched on first use
#[derive(Debug, Clone, Default)]
pub struct PackageDetails {
    pub provides: Vec<DependencyTuple>,
    pub requires: Vec<DependencyTuple>,
    pub conflicts: Vec<DependencyTuple>,
    pub obsoletes: Vec<DependencyTuple>,
    pub files: Vec<String>,
}

impl PackageDetails {
    pub fn prco(&self, kind: DepKind) -> &[DependencyTuple] {
        match kind {
            DepKind::Provides => &self.provides,
            DepKind::Requires => &self.requires,
            DepKind::Conflicts => &self.conflicts,
            DepKind::Obsoletes => &self.obsoletes,
        }
    }
}

/// One installed package as seen by the index
///
/// Equality and hashing go by native handle: two records are the same
/// package exactly when they point at the same header.
#[derive(Debug)]
pub struct PackageRecord {
    pub identity: PackageIdentity,
    pub handle: HeaderIndex,
    pub pkgid: String,
    pub url: Option<String>,
    pub sourcerpm: Option<String>,
    pub(crate) details: RefCell<Option<Rc<PackageDetails>>>,
}

impl PackageRecord {
    pub fn new(
        identity: PackageIdentity,
        handle: HeaderIndex,
        pkgid: String,
        url: Option<String>,
        sourcerpm: Option<String>,
    ) -> Self {
        Self {
            identity,
            handle,
            pkgid,
            url,
            sourcerpm,
            details: RefCell::new(None),
        }
    }

    pub fn name(&self) -> &str {
        &self.identity.name
    }

    pub fn arch(&self) -> &str {
        &self.identity.arch
    }

    /// Details if they have already been fetched
    pub fn cached_details(&self) -> Option<Rc<PackageDetails>> {
        self.details.borrow().clone()
    }

    /// Key of this package in the attribute store
    pub fn attr_key(&self) -> crate::sidecar::AttrKey<'_> {
        crate::sidecar::AttrKey {
            pkgid: &self.pkgid,
            identity: &self.identity,
        }
    }
}

impl PartialEq for PackageRecord {
    fn eq(&self, other: &Self) -> bool {
        self.handle == other.handle
    }
}

impl Eq for PackageRecord {}

impl Hash for PackageRecord {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.handle.hash(state);
    }
}

impl PartialOrd for PackageRecord {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Name, then version (epoch first), then arch; the handle breaks ties
impl Ord for PackageRecord {
    fn cmp(&self, other: &Self) -> Ordering {
        if self.handle == other.handle {
            return Ordering::Equal;
        }
        self.identity
            .name
            .cmp(&other.identity.name)
            .then_with(|| compare_evr(&self.identity.evr(), &other.identity.evr()))
            .then_with(|| self.identity.arch.cmp(&other.identity.arch))
            .then_with(|| self.handle.cmp(&other.handle))
    }
}

impl fmt::Display for PackageRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.identity.fmt(f)
    }
}
