// tests/integration_test.rs

//! Integration tests for pkgsack
//!
//! These tests verify end-to-end behavior across the database, index,
//! caches and attribute store.

use pkgsack::cache::{CacheStore, ConflictsCodec, Fingerprint};
use pkgsack::db::models::{DependencyEntry, Header, HeaderDetails};
use pkgsack::db::{self, DepKind};
use pkgsack::index::record::PackageIdentity;
use pkgsack::sidecar::SidecarStore;
use pkgsack::{Error, Index, NevraQuery, Problem, SackConfig};
use rusqlite::Connection;
use std::fs::File;
use std::path::Path;
use std::time::{Duration, SystemTime};
use tempfile::TempDir;

struct Root {
    _dir: TempDir,
    config: SackConfig,
    conn: Connection,
}

fn setup() -> Root {
    let dir = tempfile::tempdir().unwrap();
    let config = SackConfig::with_root(dir.path());
    db::init(config.db_file()).unwrap();
    let conn = db::open(config.db_file()).unwrap();
    Root {
        _dir: dir,
        config,
        conn,
    }
}

fn install(root: &Root, name: &str, arch: &str, version: &str, deps: &[(DepKind, &str)]) -> i64 {
    let pkgid = format!("{}{}{}", name, version, arch).replace(['.', '-'], "");
    let mut header = Header::new(name, version, "1.fc40", arch, &pkgid);
    let mut details = HeaderDetails::default();
    for (kind, dep) in deps {
        details.entries_mut(*kind).push(DependencyEntry::new(*kind, dep));
    }
    db::install(&root.conn, &mut header, &details).unwrap()
}

/// Push a file's mtime past anything written in the same tick
fn bump_mtime(path: &Path, secs: u64) {
    File::options()
        .write(true)
        .open(path)
        .unwrap()
        .set_modified(SystemTime::now() + Duration::from_secs(secs))
        .unwrap();
}

fn touch_db(root: &Root) {
    bump_mtime(&root.config.db_file(), 30);
}

#[test]
fn test_database_lifecycle() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("var/lib/pkgsack/packages.db");

    db::init(&db_path).unwrap();
    assert!(db_path.exists(), "Database file should exist after init");

    let conn = db::open(&db_path).unwrap();
    let journal_mode: String = conn
        .query_row("PRAGMA journal_mode", [], |row| row.get(0))
        .unwrap();
    assert_eq!(journal_mode.to_lowercase(), "delete", "commits must land in the main file");

    let foreign_keys: i32 = conn
        .query_row("PRAGMA foreign_keys", [], |row| row.get(0))
        .unwrap();
    assert_eq!(foreign_keys, 1, "Foreign keys should be enabled");
}

#[test]
fn test_open_missing_database() {
    let dir = tempfile::tempdir().unwrap();
    let result = db::open(dir.path().join("missing.db"));
    assert!(matches!(result, Err(Error::DatabaseNotFound(_))));
}

#[test]
fn test_search_after_load_all_finds_each_package_once() {
    let root = setup();
    for (name, arch) in [("bash", "x86_64"), ("glibc", "x86_64"), ("glibc", "i686"), ("tzdata", "noarch")] {
        install(&root, name, arch, "1.0", &[]);
    }
    install(&root, "gpg-pubkey", "(none)", "deadbeef", &[]);

    let mut index = Index::open(root.config.clone());
    index.load_all().unwrap();

    let all = index.all_packages().unwrap();
    assert_eq!(all.len(), 4, "signing keys are not packages");
    for pkg in &all {
        let hits = index.search(&NevraQuery::from(&pkg.identity)).unwrap();
        assert_eq!(hits.len(), 1, "{} should be found exactly once", pkg);
        assert_eq!(&hits[0], pkg);

        let by_name = index.search(&NevraQuery::name(pkg.name())).unwrap();
        assert_eq!(by_name.iter().filter(|p| *p == pkg).count(), 1);
    }
}

#[test]
fn test_missing_requires_resolved_by_new_provider() {
    let root = setup();
    install(&root, "app", "x86_64", "1.0", &[(DepKind::Requires, "libfoo")]);

    let mut index = Index::open(root.config.clone());
    let problems = index.deps().check_dependencies(None).unwrap();
    assert_eq!(problems.len(), 1);
    assert_eq!(problems[0].package().name.as_ref(), "app");
    assert!(matches!(problems[0], Problem::MissingRequires { .. }));

    install(&root, "foo", "x86_64", "1.0", &[(DepKind::Provides, "libfoo")]);
    index.drop_cached_data();
    assert!(index.deps().check_dependencies(None).unwrap().is_empty());
}

#[test]
fn test_duplicate_detection() {
    let root = setup();
    install(&root, "tzdata", "x86_64", "2024a", &[]);
    install(&root, "tzdata", "noarch", "2024a", &[]);
    install(&root, "zlib", "x86_64", "1.3", &[]);
    install(&root, "zlib", "i686", "1.3", &[]);

    let mut index = Index::open(root.config.clone());
    let problems = index.deps().check_duplicates::<&str>(&[]).unwrap();
    assert_eq!(problems.len(), 1);
    match &problems[0] {
        Problem::Duplicate { package, duplicate } => {
            assert_eq!(package.name.as_ref(), "zlib");
            assert_eq!(duplicate.name.as_ref(), "zlib");
            assert_ne!(package.arch, duplicate.arch);
        }
        other => panic!("unexpected problem: {}", other),
    }
}

#[test]
fn test_stale_handle_after_erase() {
    let root = setup();
    let id = install(&root, "bash", "x86_64", "5.2", &[]);

    let mut index = Index::open(root.config.clone());
    let bash = index.search(&NevraQuery::name("bash")).unwrap().remove(0);
    db::erase(&root.conn, id).unwrap();

    match index.details(&bash) {
        Err(Error::StaleHandle(handle)) => assert_eq!(handle, id),
        other => panic!("expected a stale handle, got {:?}", other.map(|_| ())),
    }
}

#[test]
fn test_conflict_cache_invalidated_by_database_change() {
    let root = setup();
    install(&root, "sendmail", "x86_64", "8.18", &[(DepKind::Conflicts, "postfix")]);

    let mut index = Index::open(root.config.clone());
    let before = index.fingerprint().unwrap();
    assert_eq!(index.return_conflict_packages().unwrap().len(), 1);

    let store = CacheStore::<ConflictsCodec>::new(root.config.cache_dir());
    assert!(store.read(&before).is_some());

    install(&root, "exim", "x86_64", "4.97", &[(DepKind::Conflicts, "sendmail")]);
    touch_db(&root);
    index.drop_cached_data();

    let after = index.fingerprint().unwrap();
    assert_ne!(before, after);
    assert!(store.read(&after).is_none(), "old payload must not satisfy the new fingerprint");
    assert_eq!(index.return_conflict_packages().unwrap().len(), 2);
    assert_eq!(store.read(&after).unwrap().len(), 2);
}

#[test]
fn test_caches_disabled() {
    let root = setup();
    install(&root, "bash", "x86_64", "5.2", &[]);

    let mut config = root.config.clone();
    config.cache_enabled = false;
    let mut index = Index::open(config);
    index.simple_version(true).unwrap();
    index.return_conflict_packages().unwrap();

    assert!(!root.config.cache_dir().join("version").exists());
    assert!(!root.config.cache_dir().join("conflicts").exists());
}

#[test]
fn test_transaction_confirm_and_reset() {
    let root = setup();
    install(&root, "bash", "x86_64", "5.2", &[]);
    let mut index = Index::open(root.config.clone());
    let store = CacheStore::<ConflictsCodec>::new(root.config.cache_dir());

    let staged = vec![PackageIdentity::new("bash", "x86_64", "0", "5.2", "1.fc40")];
    index.transaction_cache_conflict_packages(&staged);
    index.transaction_reset();
    let discarded = Fingerprint::new("1:aa");
    index.transaction_result_version(&discarded).unwrap();
    assert!(store.read(&discarded).is_none());

    index.transaction_cache_conflict_packages(&staged);
    let realized = Fingerprint::new("1:bb");
    index.transaction_result_version(&realized).unwrap();
    assert_eq!(store.read(&realized).unwrap(), staged);
}

#[test]
fn test_attributes_follow_packages() {
    let root = setup();
    install(&root, "bash", "x86_64", "5.2", &[]);

    let mut index = Index::open(root.config.clone());
    let bash = index.search(&NevraQuery::name("bash")).unwrap().remove(0);
    index.attrdb().set(bash.attr_key(), "from_repo", "fedora").unwrap();
    index.attrdb().set(bash.attr_key(), "reason", "user").unwrap();

    // A fresh store sees the same values
    let mut store = SidecarStore::open(root.config.attrdb_dir());
    assert_eq!(
        store.get_text(bash.attr_key(), "from_repo").unwrap().as_deref(),
        Some("fedora")
    );

    let dir = store.package_dir(bash.attr_key());
    store.clean(bash.attr_key()).unwrap();
    assert!(store.enumerate(bash.attr_key()).unwrap().is_empty());
    assert!(!Path::new(&dir).exists());
}

#[test]
fn test_version_stamp_tracks_database() {
    let root = setup();
    install(&root, "bash", "x86_64", "5.2", &[]);

    let mut index = Index::open(root.config.clone());
    let first = index.simple_version(true).unwrap().main;
    assert!(first.as_str().starts_with("1:"));

    install(&root, "zsh", "x86_64", "5.9", &[]);
    touch_db(&root);
    index.drop_cached_data();
    let second = index.simple_version(true).unwrap().main;
    assert!(second.as_str().starts_with("2:"));

    // A database no newer than the stamp is not rescanned
    bump_mtime(&root.config.cache_dir().join("version"), 60);
    install(&root, "fish", "x86_64", "3.7", &[]);
    let mut fresh = Index::open(root.config.clone());
    assert_eq!(fresh.simple_version(true).unwrap().main, second);

    // A full breakdown always rescans
    let full = fresh.simple_version(false).unwrap();
    assert!(full.main.as_str().starts_with("3:"));
    assert!(full.origins.contains_key("installed"));
}
