// src/sidecar.rs

//! Per-package attribute store kept next to the package database
//!
//! Facts the native database cannot hold (origin repository, install
//! reason, payload checksum, ...) live on disk as one file per attribute:
//!
//! ```text
//! <root>/<first char of name>/<pkgid>-<name>-<version>-<release>-<arch>/<attribute>
//! ```
//!
//! A file's contents are the attribute's value, byte for byte. A missing
//! file means the attribute is undefined. Writes go through a `.tmp` file
//! renamed into place.

use crate::cache::shared_tempfile;
use crate::error::{Error, Result};
use crate::index::record::PackageIdentity;
use std::collections::{BTreeSet, HashMap};
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

const TMP_SUFFIX: &str = ".tmp";

fn is_absent(e: &std::io::Error) -> bool {
    matches!(e.kind(), ErrorKind::NotFound | ErrorKind::NotADirectory)
}

/// Strip path separators and home-directory markers from a path component
pub fn sanitize(component: &str) -> String {
    component.replace(['/', '~'], "")
}

/// Identifies one package's attribute directory
#[derive(Debug, Clone, Copy)]
pub struct AttrKey<'a> {
    pub pkgid: &'a str,
    pub identity: &'a PackageIdentity,
}

/// Attribute files of one package plus what has been read or written so far
#[derive(Debug)]
pub struct SidecarRecord {
    dir: PathBuf,
    cache: HashMap<String, Vec<u8>>,
}

impl SidecarRecord {
    fn new(dir: PathBuf) -> Self {
        Self {
            dir,
            cache: HashMap::new(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Raw contents of an attribute file
    pub fn get(&mut self, attr: &str) -> Result<Option<Vec<u8>>> {
        let attr = sanitize(attr);
        if attr.is_empty() || attr.ends_with(TMP_SUFFIX) {
            return Ok(None);
        }
        if let Some(value) = self.cache.get(&attr) {
            return Ok(Some(value.clone()));
        }

        match fs::read(self.dir.join(&attr)) {
            Ok(value) => {
                self.cache.insert(attr, value.clone());
                Ok(Some(value))
            }
            Err(e) if is_absent(&e) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set(&mut self, attr: &str, value: &[u8]) -> Result<()> {
        let attr = sanitize(attr);
        if attr.is_empty() || attr.ends_with(TMP_SUFFIX) {
            return Err(Error::Io(std::io::Error::new(
                ErrorKind::InvalidInput,
                format!("invalid attribute name {:?}", attr),
            )));
        }

        fs::create_dir_all(&self.dir)?;
        self.cache.remove(&attr);

        let mut tmp = shared_tempfile(&self.dir, &attr, TMP_SUFFIX)?;
        tmp.write_all(value)?;
        tmp.flush()?;
        tmp.persist(self.dir.join(&attr)).map_err(|e| Error::Io(e.error))?;

        self.cache.insert(attr, value.to_vec());
        Ok(())
    }

    pub fn delete(&mut self, attr: &str) -> Result<()> {
        let attr = sanitize(attr);
        self.cache.remove(&attr);
        if attr.is_empty() {
            return Ok(());
        }

        match fs::remove_file(self.dir.join(&attr)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Names of all known attributes; `.tmp` leftovers only with `show_hidden`
    pub fn enumerate(&self, show_hidden: bool) -> Result<BTreeSet<String>> {
        let mut names: BTreeSet<String> = self.cache.keys().cloned().collect();

        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if is_absent(&e) => return Ok(names),
            Err(e) => return Err(e.into()),
        };
        for entry in entries {
            let name = entry?.file_name().to_string_lossy().into_owned();
            if !show_hidden && name.ends_with(TMP_SUFFIX) {
                continue;
            }
            names.insert(name);
        }

        Ok(names)
    }

    pub fn clean(&mut self) -> Result<()> {
        for attr in self.enumerate(true)? {
            self.delete(&attr)?;
        }
        match fs::remove_dir(&self.dir) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// The attribute store for every installed package
#[derive(Debug)]
pub struct SidecarStore {
    root: PathBuf,
    writable: bool,
    /// pkgid -> package directory, discovered on open or computed on demand
    packages: HashMap<String, PathBuf>,
    records: HashMap<String, SidecarRecord>,
}

impl SidecarStore {
    /// Open the store, creating `root` if needed
    ///
    /// Never fails: if the root cannot be created or written the store is
    /// read-only and every `set` reports [`Error::ReadOnly`].
    pub fn open(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let mut store = Self {
            writable: false,
            packages: HashMap::new(),
            records: HashMap::new(),
            root,
        };

        if let Err(e) = fs::create_dir_all(&store.root) {
            warn!(
                "Cannot create attribute store {}: {}",
                store.root.display(),
                e
            );
            return store;
        }
        store.writable = tempfile::tempfile_in(&store.root).is_ok();
        if !store.writable {
            debug!("Attribute store {} is read-only", store.root.display());
        }

        store.discover();
        store
    }

    fn discover(&mut self) {
        let pattern = format!("{}/*/*/", glob::Pattern::escape(&self.root.to_string_lossy()));
        let Ok(paths) = glob::glob(&pattern) else {
            return;
        };
        for dir in paths.flatten() {
            let Some(base) = dir.file_name().map(|n| n.to_string_lossy().into_owned()) else {
                continue;
            };
            let pkgid = base.split('-').next().unwrap_or_default().to_string();
            if !pkgid.is_empty() {
                self.packages.insert(pkgid, dir);
            }
        }
        debug!(
            "Found {} package directories under {}",
            self.packages.len(),
            self.root.display()
        );
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn is_writable(&self) -> bool {
        self.writable
    }

    /// Directory holding the attributes of `key`
    pub fn package_dir(&mut self, key: AttrKey<'_>) -> PathBuf {
        if let Some(dir) = self.packages.get(key.pkgid) {
            return dir.clone();
        }
        let id = key.identity;
        let name = sanitize(&id.name);
        let first: String = name.chars().take(1).collect();
        let dir = self.root.join(first).join(format!(
            "{}-{}-{}-{}-{}",
            sanitize(key.pkgid),
            name,
            sanitize(&id.version),
            sanitize(&id.release),
            sanitize(&id.arch)
        ));
        self.packages.insert(key.pkgid.to_string(), dir.clone());
        dir
    }

    /// Attribute record of a package, created on first use
    pub fn package(&mut self, key: AttrKey<'_>) -> &mut SidecarRecord {
        let dir = (!self.records.contains_key(key.pkgid)).then(|| self.package_dir(key));
        self.records
            .entry(key.pkgid.to_string())
            .or_insert_with(|| SidecarRecord::new(dir.unwrap_or_default()))
    }

    pub fn get(&mut self, key: AttrKey<'_>, attr: &str) -> Result<Option<Vec<u8>>> {
        self.package(key).get(attr)
    }

    /// Attribute as text; invalid UTF-8 is replaced, never an error
    pub fn get_text(&mut self, key: AttrKey<'_>, attr: &str) -> Result<Option<String>> {
        Ok(self
            .get(key, attr)?
            .map(|raw| String::from_utf8_lossy(&raw).into_owned()))
    }

    pub fn get_or(&mut self, key: AttrKey<'_>, attr: &str, default: &str) -> Result<String> {
        Ok(self
            .get_text(key, attr)?
            .unwrap_or_else(|| default.to_string()))
    }

    pub fn set(&mut self, key: AttrKey<'_>, attr: &str, value: impl AsRef<[u8]>) -> Result<()> {
        if !self.writable {
            return Err(Error::ReadOnly(self.root.clone()));
        }
        let written = self.package(key).set(attr, value.as_ref());
        written.map_err(|e| self.write_failed(e))
    }

    /// Permission failures make the whole store read-only
    fn write_failed(&mut self, e: Error) -> Error {
        match e {
            Error::Io(io) if io.kind() == ErrorKind::PermissionDenied => {
                warn!(
                    "Attribute store {} is no longer writable: {}",
                    self.root.display(),
                    io
                );
                self.writable = false;
                Error::ReadOnly(self.root.clone())
            }
            other => other,
        }
    }

    pub fn delete(&mut self, key: AttrKey<'_>, attr: &str) -> Result<()> {
        self.package(key).delete(attr)
    }

    pub fn enumerate(&mut self, key: AttrKey<'_>) -> Result<BTreeSet<String>> {
        self.package(key).enumerate(false)
    }

    /// Remove every attribute of a package and its directory
    pub fn clean(&mut self, key: AttrKey<'_>) -> Result<()> {
        self.package(key).clean()?;
        self.records.remove(key.pkgid);
        self.packages.remove(key.pkgid);
        Ok(())
    }
}
