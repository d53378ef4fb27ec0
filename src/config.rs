// src/config.rs

//! Index configuration
//!
//! There are no configuration files: callers build a [`SackConfig`]
//! (the CLI does it from flags) and hand it to [`crate::Index::open`].

use std::path::{Path, PathBuf};

/// Name of the reserved pseudo-package that carries signing keys
pub const GPG_PUBKEY: &str = "gpg-pubkey";

/// Requires in this namespace are satisfied by the package manager itself
pub const RPMLIB_PREFIX: &str = "rpmlib(";

/// Default cap on the number of patterns compiled for a listing
pub const PATTERNS_MAX: usize = 200;

#[derive(Debug, Clone)]
pub struct SackConfig {
    /// Installation root every other path is resolved under
    pub root: PathBuf,
    /// Native database file, relative to `root`
    pub dbpath: PathBuf,
    /// Cache base directory, relative to `root`
    pub cachedir: PathBuf,
    /// Persistent state directory, relative to `root`
    pub persistdir: PathBuf,
    /// Close the native handle after every logical operation
    pub auto_close: bool,
    /// Use the on-disk caches at all
    pub cache_enabled: bool,
    /// Above this many patterns, listings skip pattern pre-filtering
    pub patterns_max: usize,
}

impl Default for SackConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("/"),
            dbpath: PathBuf::from("var/lib/pkgsack/packages.db"),
            cachedir: PathBuf::from("var/cache/pkgsack"),
            persistdir: PathBuf::from("var/lib/pkgsack"),
            auto_close: false,
            cache_enabled: true,
            patterns_max: PATTERNS_MAX,
        }
    }
}

impl SackConfig {
    /// Default layout under a different installation root
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            ..Self::default()
        }
    }

    fn rooted(&self, path: &Path) -> PathBuf {
        self.root.join(path.strip_prefix("/").unwrap_or(path))
    }

    pub fn db_file(&self) -> PathBuf {
        self.rooted(&self.dbpath)
    }

    /// Directory holding the fingerprint-gated caches
    pub fn cache_dir(&self) -> PathBuf {
        self.rooted(&self.cachedir).join("installed")
    }

    /// Root of the per-package attribute store
    pub fn attrdb_dir(&self) -> PathBuf {
        self.rooted(&self.persistdir).join("attrdb")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_layout() {
        let config = SackConfig::default();
        assert_eq!(config.db_file(), PathBuf::from("/var/lib/pkgsack/packages.db"));
        assert_eq!(config.cache_dir(), PathBuf::from("/var/cache/pkgsack/installed"));
        assert_eq!(config.attrdb_dir(), PathBuf::from("/var/lib/pkgsack/attrdb"));
    }

    #[test]
    fn test_absolute_paths_stay_under_root() {
        let mut config = SackConfig::with_root("/mnt/sysimage");
        config.dbpath = PathBuf::from("/var/lib/other.db");
        assert_eq!(config.db_file(), PathBuf::from("/mnt/sysimage/var/lib/other.db"));
        assert_eq!(
            config.cache_dir(),
            PathBuf::from("/mnt/sysimage/var/cache/pkgsack/installed")
        );
    }
}
