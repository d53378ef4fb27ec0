// src/cache/mod.rs

//! Fingerprint-gated persisted caches
//!
//! Every expensive derived result (packages with conflicts, file
//! requires/provides, the installed-set digest) is stored as one text file
//! in the cache directory:
//!
//! ```text
//! <fingerprint>
//! <kind-specific records, one field per line>
//! ```
//!
//! A stored payload is only handed back when its fingerprint equals the
//! caller's current one. Anything odd about the file (missing, truncated,
//! bad counts or epochs, trailing bytes) is a miss, never an error.
//! Writes go to a temporary file in the same directory and are renamed
//! into place, so readers see either the old or the new file.

pub mod conflicts;
pub mod file_requires;
pub mod staging;
pub mod version;

use crate::error::{Error, Result};
use crate::index::record::PackageIdentity;
use std::fmt;
use std::fs;
use std::io::{ErrorKind, Write};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::debug;

pub use conflicts::ConflictsCodec;
pub use file_requires::{FileRequiresCodec, FileRequiresData};
pub use staging::TransactionStagingCache;
pub use version::{SackDigest, SackVersion, VersionCodec};

/// Token summarizing the state of the installed-package set
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for Fingerprint {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for Fingerprint {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Newline-delimited record writer used by codecs
#[derive(Debug, Default)]
pub struct LineWriter {
    buf: String,
}

impl LineWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn line(&mut self, value: impl fmt::Display) {
        use std::fmt::Write as _;
        let _ = writeln!(self.buf, "{}", value);
    }

    pub fn count(&mut self, n: usize) {
        self.line(n);
    }

    /// The five identity fields in cache order: name, arch, epoch, version, release
    pub fn identity(&mut self, id: &PackageIdentity) {
        self.line(&id.name);
        self.line(&id.arch);
        self.line(&id.epoch);
        self.line(&id.version);
        self.line(&id.release);
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.buf.as_bytes()
    }
}

/// Strict reader over a cache file's contents
///
/// Every accessor returns `None` on malformed input, which codecs pass
/// straight up as a cache miss.
#[derive(Debug)]
pub struct LineReader<'a> {
    rest: &'a str,
}

impl<'a> LineReader<'a> {
    pub fn new(content: &'a str) -> Self {
        Self { rest: content }
    }

    /// Next newline-terminated line; an unterminated tail is malformed
    pub fn line(&mut self) -> Option<&'a str> {
        let end = self.rest.find('\n')?;
        let line = &self.rest[..end];
        self.rest = &self.rest[end + 1..];
        Some(line)
    }

    pub fn count(&mut self) -> Option<usize> {
        self.line()?.parse().ok()
    }

    pub fn identity(&mut self) -> Option<PackageIdentity> {
        let name = self.line()?;
        let arch = self.line()?;
        let epoch = self.line()?;
        let version = self.line()?;
        let release = self.line()?;
        epoch.parse::<u64>().ok()?;
        Some(PackageIdentity::new(name, arch, epoch, version, release))
    }

    pub fn is_at_end(&self) -> bool {
        self.rest.is_empty()
    }
}

/// Serializer/deserializer pair for one cache kind
///
/// Codecs own everything after the fingerprint line and must write
/// deterministically (sorted, fixed field order).
pub trait CacheCodec {
    type Payload;

    /// File name inside the cache directory
    const FILE_NAME: &'static str;

    fn encode(payload: &Self::Payload, out: &mut LineWriter);

    fn decode(input: &mut LineReader<'_>) -> Option<Self::Payload>;
}

/// Temporary file in `dir` that stays world-readable once renamed into place
///
/// `tempfile` creates owner-only files; caches and attributes written by
/// root must still be readable by unprivileged queries.
pub(crate) fn shared_tempfile(dir: &Path, prefix: &str, suffix: &str) -> std::io::Result<NamedTempFile> {
    let tmp = tempfile::Builder::new()
        .prefix(prefix)
        .suffix(suffix)
        .tempfile_in(dir)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tmp.as_file().set_permissions(fs::Permissions::from_mode(0o644))?;
    }
    Ok(tmp)
}

/// One cache file of kind `C`
#[derive(Debug)]
pub struct CacheStore<C: CacheCodec> {
    dir: PathBuf,
    _codec: PhantomData<C>,
}

impl<C: CacheCodec> CacheStore<C> {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            _codec: PhantomData,
        }
    }

    pub fn path(&self) -> PathBuf {
        self.dir.join(C::FILE_NAME)
    }

    fn load_content(&self) -> Option<String> {
        match fs::read_to_string(self.path()) {
            Ok(content) => Some(content),
            Err(e) => {
                if e.kind() != ErrorKind::NotFound {
                    debug!("Ignoring unreadable cache {}: {}", self.path().display(), e);
                }
                None
            }
        }
    }

    fn decode_body(&self, reader: &mut LineReader<'_>) -> Option<C::Payload> {
        let payload = C::decode(reader);
        if payload.is_none() || !reader.is_at_end() {
            debug!("Cache {} is malformed, ignoring it", self.path().display());
            return None;
        }
        payload
    }

    /// Stored payload, if it was written for `current`
    pub fn read(&self, current: &Fingerprint) -> Option<C::Payload> {
        let content = self.load_content()?;
        let mut reader = LineReader::new(&content);
        let stored = reader.line()?;
        if stored.is_empty() || stored != current.as_str() {
            debug!(
                "Cache {} is stale ({} != {})",
                self.path().display(),
                stored,
                current
            );
            return None;
        }
        self.decode_body(&mut reader)
    }

    /// Stored fingerprint and payload without any gate
    pub fn peek(&self) -> Option<(Fingerprint, C::Payload)> {
        let content = self.load_content()?;
        let mut reader = LineReader::new(&content);
        let stored = reader.line()?;
        if stored.is_empty() {
            return None;
        }
        let payload = self.decode_body(&mut reader)?;
        Some((Fingerprint::from(stored), payload))
    }

    /// Persist `payload` for `fingerprint`; a no-op if the directory is not writable
    pub fn write(&self, payload: &C::Payload, fingerprint: &Fingerprint) -> Result<()> {
        match self.stage(payload, fingerprint)? {
            Some(pending) => pending.commit(),
            None => Ok(()),
        }
    }

    /// Write the new contents next to the cache file without replacing it yet
    ///
    /// Returns `None` if the cache directory cannot be created or written.
    pub fn stage(&self, payload: &C::Payload, fingerprint: &Fingerprint) -> Result<Option<PendingWrite>> {
        let mut out = LineWriter::new();
        out.line(fingerprint);
        C::encode(payload, &mut out);

        if let Err(e) = fs::create_dir_all(&self.dir) {
            debug!("Cache directory {} unavailable: {}", self.dir.display(), e);
            return Ok(None);
        }
        let mut tmp = match shared_tempfile(&self.dir, C::FILE_NAME, ".tmp") {
            Ok(tmp) => tmp,
            Err(e) => {
                debug!("Cache directory {} not writable: {}", self.dir.display(), e);
                return Ok(None);
            }
        };

        tmp.write_all(out.as_bytes())?;
        tmp.flush()?;

        Ok(Some(PendingWrite {
            tmp,
            target: self.path(),
        }))
    }
}

/// A fully written temporary file waiting to be renamed over its target
///
/// Dropping it without [`PendingWrite::commit`] removes the temporary
/// file and leaves the existing cache untouched.
#[derive(Debug)]
pub struct PendingWrite {
    tmp: NamedTempFile,
    target: PathBuf,
}

impl PendingWrite {
    pub fn commit(self) -> Result<()> {
        let target = self.target;
        self.tmp
            .persist(&target)
            .map_err(|e| Error::Io(e.error))?;
        debug!("Wrote cache {}", target.display());
        Ok(())
    }

    pub fn target(&self) -> &Path {
        &self.target
    }
}

/// The cache files of one index plus its transaction staging area
#[derive(Debug)]
pub struct SackCaches {
    pub conflicts: CacheStore<ConflictsCodec>,
    pub file_requires: CacheStore<FileRequiresCodec>,
    pub version: CacheStore<VersionCodec>,
    pub staging: TransactionStagingCache,
}

impl SackCaches {
    pub fn new(dir: &Path) -> Self {
        Self {
            conflicts: CacheStore::new(dir),
            file_requires: CacheStore::new(dir),
            version: CacheStore::new(dir),
            staging: TransactionStagingCache::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    /// Newline-separated list of words, count first
    struct WordsCodec;

    impl CacheCodec for WordsCodec {
        type Payload = Vec<String>;
        const FILE_NAME: &'static str = "words";

        fn encode(payload: &Self::Payload, out: &mut LineWriter) {
            out.count(payload.len());
            for word in payload {
                out.line(word);
            }
        }

        fn decode(input: &mut LineReader<'_>) -> Option<Self::Payload> {
            let n = input.count()?;
            (0..n).map(|_| input.line().map(str::to_string)).collect()
        }
    }

    fn words(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_round_trip_and_gate() {
        let dir = TempDir::new().unwrap();
        let store: CacheStore<WordsCodec> = CacheStore::new(dir.path());
        let fp = Fingerprint::from("12:abc");

        store.write(&words(&["alpha", "beta"]), &fp).unwrap();
        assert_eq!(store.read(&fp), Some(words(&["alpha", "beta"])));
        assert_eq!(store.read(&Fingerprint::from("13:def")), None);

        let (stored, _) = store.peek().unwrap();
        assert_eq!(stored, fp);
    }

    #[test]
    fn test_missing_file_is_miss() {
        let dir = TempDir::new().unwrap();
        let store: CacheStore<WordsCodec> = CacheStore::new(dir.path());
        assert_eq!(store.read(&Fingerprint::from("1:x")), None);
        assert!(store.peek().is_none());
    }

    #[test]
    fn test_malformed_files_are_misses() {
        let dir = TempDir::new().unwrap();
        let store: CacheStore<WordsCodec> = CacheStore::new(dir.path());
        let fp = Fingerprint::from("1:x");

        for content in [
            "1:x\n2\nalpha\n",          // count too large
            "1:x\n1\nalpha\nbeta\n",    // trailing record
            "1:x\nnope\n",              // bad count
            "1:x\n1\nalpha",            // unterminated line
            "1:x\n1\nalpha\n\n",        // trailing blank line
            "",                         // empty file
        ] {
            fs::write(store.path(), content).unwrap();
            assert_eq!(store.read(&fp), None, "content {:?}", content);
        }

        fs::write(store.path(), "1:x\n1\nalpha\n").unwrap();
        assert_eq!(store.read(&fp), Some(words(&["alpha"])));
    }

    #[test]
    fn test_interrupted_write_leaves_old_file() {
        let dir = TempDir::new().unwrap();
        let store: CacheStore<WordsCodec> = CacheStore::new(dir.path());
        let fp = Fingerprint::from("1:x");

        store.write(&words(&["alpha"]), &fp).unwrap();
        let before = fs::read(store.path()).unwrap();

        let pending = store
            .stage(&words(&["beta", "gamma"]), &Fingerprint::from("2:y"))
            .unwrap()
            .unwrap();
        assert_eq!(pending.target(), store.path());
        drop(pending);

        assert_eq!(fs::read(store.path()).unwrap(), before);
        let leftovers: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(leftovers.len(), 1);
    }

    #[cfg(unix)]
    #[test]
    fn test_written_cache_is_world_readable() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let store: CacheStore<WordsCodec> = CacheStore::new(dir.path());
        store.write(&words(&["alpha"]), &Fingerprint::from("1:x")).unwrap();

        let mode = fs::metadata(store.path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o644);
    }

    #[test]
    fn test_unwritable_directory_is_noop() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("blocker");
        fs::write(&blocker, "not a directory").unwrap();

        let store: CacheStore<WordsCodec> = CacheStore::new(blocker.join("installed"));
        store
            .write(&words(&["alpha"]), &Fingerprint::from("1:x"))
            .unwrap();
        assert!(!store.path().exists());
    }

    #[test]
    fn test_identity_lines_check_epoch() {
        let mut reader = LineReader::new("bash\nx86_64\n0\n5.2\n1\n");
        let id = reader.identity().unwrap();
        assert_eq!(id.to_string(), "bash-5.2-1.x86_64");
        assert!(reader.is_at_end());

        let mut reader = LineReader::new("bash\nx86_64\nzero\n5.2\n1\n");
        assert!(reader.identity().is_none());
    }
}
