// src/main.rs

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser, Subcommand};
use pkgsack::db::{self, DepKind};
use pkgsack::index::record::PkgRef;
use pkgsack::packages::rpm::{CHECKSUM_TYPE, RpmPackage};
use pkgsack::version::{DepFlag, Evr};
use pkgsack::{Index, NevraQuery, SackConfig};
use std::io::Write;
use std::path::PathBuf;
use tracing::info;

#[derive(Parser)]
#[command(name = "pkgsack")]
#[command(author, version, about = "Query and check the installed package set", long_about = None)]
struct Cli {
    /// Installation root
    #[arg(short, long, global = true, default_value = "/")]
    root: PathBuf,

    /// Package database path, relative to the root
    #[arg(short, long, global = true)]
    db_path: Option<PathBuf>,

    /// Cache directory, relative to the root
    #[arg(long, global = true)]
    cachedir: Option<PathBuf>,

    /// Ignore and never write the on-disk caches
    #[arg(long, global = true)]
    no_cache: bool,

    /// Close the database after every operation
    #[arg(long, global = true)]
    auto_close: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the package database
    Init,
    /// Record RPM files as installed
    Import {
        /// Paths to the package files
        #[arg(required = true)]
        package_paths: Vec<PathBuf>,
        /// Repository the packages came from
        #[arg(long)]
        repo: Option<String>,
        /// Why the packages were installed
        #[arg(long, default_value = "user")]
        reason: String,
    },
    /// Remove installed packages matching a pattern
    Remove {
        /// Package name or pattern
        pattern: String,
    },
    /// List installed packages
    List {
        /// Shell-style patterns (all packages if omitted)
        patterns: Vec<String>,
        /// Match patterns case-insensitively
        #[arg(short, long)]
        ignore_case: bool,
    },
    /// Show details of installed packages
    Info {
        /// Package name or pattern
        pattern: String,
    },
    /// Show which packages provide a capability
    Provides {
        /// Capability name or file path
        name: String,
        /// Comparison operator (<, <=, =, >=, >)
        op: Option<String>,
        /// [epoch:]version[-release]
        evr: Option<String>,
    },
    /// Show which packages require a capability
    Whatrequires {
        /// Capability name
        name: String,
        /// Comparison operator (<, <=, =, >=, >)
        op: Option<String>,
        /// [epoch:]version[-release]
        evr: Option<String>,
    },
    /// Check installed packages for dependency problems and duplicates
    Check {
        /// Print problems as JSON
        #[arg(long)]
        json: bool,
        /// Package names to skip in the duplicate check
        #[arg(long)]
        ignore: Vec<String>,
    },
    /// Print the installed-set version digest
    Version {
        /// Also break it down by origin repository
        #[arg(long)]
        all: bool,
    },
    /// Read or write per-package attributes
    Attr {
        #[command(subcommand)]
        command: AttrCommands,
    },
    /// Generate shell completion scripts
    Completions {
        shell: clap_complete::Shell,
    },
}

#[derive(Subcommand)]
enum AttrCommands {
    /// Print one attribute
    Get { package: String, attr: String },
    /// Set one attribute
    Set {
        package: String,
        attr: String,
        value: String,
    },
    /// Delete one attribute
    Del { package: String, attr: String },
    /// List attribute names
    List { package: String },
}

impl Cli {
    fn config(&self) -> SackConfig {
        let mut config = SackConfig::with_root(&self.root);
        if let Some(db_path) = &self.db_path {
            config.dbpath = db_path.clone();
        }
        if let Some(cachedir) = &self.cachedir {
            config.cachedir = cachedir.clone();
        }
        config.cache_enabled = !self.no_cache;
        config.auto_close = self.auto_close;
        config
    }
}

fn dependency_query(op: Option<&str>, evr: Option<&str>) -> Result<(Option<DepFlag>, Option<Evr>)> {
    match (op, evr) {
        (Some(op), Some(evr)) => {
            let flag = op.parse::<DepFlag>().map_err(anyhow::Error::msg)?;
            Ok((Some(flag), Some(Evr::parse(evr))))
        }
        (None, None) => Ok((None, None)),
        _ => Err(anyhow::anyhow!("An operator needs a version and vice versa")),
    }
}

/// Resolve a pattern to exactly one installed package
fn single_package(index: &mut Index, pattern: &str) -> Result<PkgRef> {
    let patterns = [pattern];
    let mut pkgs = index.return_packages(Some(&patterns[..]), false)?;
    match pkgs.len() {
        0 => Err(anyhow::anyhow!("Package '{}' is not installed", pattern)),
        1 => Ok(pkgs.remove(0)),
        _ => {
            println!("Multiple packages match '{}':", pattern);
            for pkg in &pkgs {
                println!("  - {}", pkg);
            }
            Err(anyhow::anyhow!("Please specify the full name-version-release.arch"))
        }
    }
}

fn main() -> Result<()> {
    // Initialize tracing subscriber for logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = cli.config();

    match cli.command {
        Commands::Init => {
            let db_file = config.db_file();
            info!("Initializing package database at: {}", db_file.display());
            db::init(&db_file)?;
            println!("Database initialized successfully at: {}", db_file.display());
            Ok(())
        }
        Commands::Import {
            package_paths,
            repo,
            reason,
        } => {
            let conn = db::open(config.db_file())?;
            let mut imported = Vec::new();

            for path in &package_paths {
                let rpm = RpmPackage::parse(path)
                    .with_context(|| format!("Cannot import {}", path.display()))?;
                let checksum = rpm.checksum().to_string();
                let (mut header, details) = rpm.into_parts();

                let existing = db::Header::find_by_name(&conn, &header.name)?;
                if existing.iter().any(|h| h.pkgid == header.pkgid) {
                    return Err(anyhow::anyhow!(
                        "Package {}-{}-{}.{} is already installed",
                        header.name,
                        header.version,
                        header.release,
                        header.arch
                    ));
                }

                let id = db::install(&conn, &mut header, &details)?;
                info!("Recorded {} as header {}", path.display(), id);
                imported.push((header, checksum));
            }

            let mut index = Index::open(config);
            for (header, checksum) in &imported {
                let epoch = header.epoch.map(|e| e.to_string()).unwrap_or_default();
                let query = NevraQuery::name(&header.name)
                    .arch(&header.arch)
                    .evr(&epoch, &header.version, &header.release);
                for pkg in index.search(&query)? {
                    if pkg.pkgid != *checksum {
                        continue;
                    }
                    let key = pkg.attr_key();
                    let attrdb = index.attrdb();
                    attrdb.set(key, "checksum_type", CHECKSUM_TYPE)?;
                    attrdb.set(key, "checksum_data", checksum)?;
                    attrdb.set(key, "reason", &reason)?;
                    if let Some(repo) = &repo {
                        attrdb.set(key, "from_repo", repo)?;
                    }
                    println!("Imported package: {}", pkg);
                }
            }
            Ok(())
        }
        Commands::Remove { pattern } => {
            let mut index = Index::open(config.clone());
            let pkg = single_package(&mut index, &pattern)?;
            let conn = db::open(config.db_file())?;

            if !db::erase(&conn, pkg.handle)? {
                return Err(anyhow::anyhow!("Package '{}' vanished during removal", pkg));
            }
            index.attrdb().clean(pkg.attr_key())?;
            index.drop_cached_data();

            println!("Removed package: {}", pkg);
            Ok(())
        }
        Commands::List {
            patterns,
            ignore_case,
        } => {
            let mut index = Index::open(config);
            let pkgs = if patterns.is_empty() {
                index.all_packages()?
            } else {
                index.return_packages(Some(&patterns[..]), ignore_case)?
            };

            if pkgs.is_empty() {
                println!("No packages found.");
            } else {
                for pkg in &pkgs {
                    println!("{}", pkg);
                }
                println!("\nTotal: {} package(s)", pkgs.len());
            }
            Ok(())
        }
        Commands::Info { pattern } => {
            let mut index = Index::open(config);
            let pkg = single_package(&mut index, &pattern)?;
            let details = index.details(&pkg)?;

            println!("Package: {}", pkg);
            println!("  Package id: {}", pkg.pkgid);
            if let Some(url) = &pkg.url {
                println!("  URL: {}", url);
            }
            if let Some(sourcerpm) = &pkg.sourcerpm {
                println!("  Source RPM: {}", sourcerpm);
            }
            for kind in DepKind::ALL {
                let entries = details.prco(kind);
                if entries.is_empty() {
                    continue;
                }
                println!("  {}:", kind.as_str());
                for entry in entries {
                    println!("    {}", entry);
                }
            }
            println!("  Files: {}", details.files.len());

            let key = pkg.attr_key();
            for attr in index.attrdb().enumerate(key)? {
                if let Some(value) = index.attrdb().get_text(key, &attr)? {
                    println!("  @{}: {}", attr, value.trim_end());
                }
            }
            Ok(())
        }
        Commands::Provides { name, op, evr } => {
            let (flag, evr) = dependency_query(op.as_deref(), evr.as_deref())?;
            let mut index = Index::open(config);
            let matches = index.deps().get_provides(&name, flag, evr.as_ref())?;

            if matches.is_empty() {
                println!("No package provides {}", name);
            }
            for (pkg, hits) in matches.iter() {
                let hits: Vec<String> = hits.iter().map(|h| h.to_string()).collect();
                println!("{}: {}", pkg, hits.join(", "));
            }
            Ok(())
        }
        Commands::Whatrequires { name, op, evr } => {
            let (flag, evr) = dependency_query(op.as_deref(), evr.as_deref())?;
            let mut index = Index::open(config);
            let pkgs = index.deps().what_requires(&name, flag, evr.as_ref())?;

            if pkgs.is_empty() {
                println!("No package requires {}", name);
            }
            for pkg in &pkgs {
                println!("{}", pkg);
            }
            Ok(())
        }
        Commands::Check { json, ignore } => {
            let mut index = Index::open(config);
            let mut problems = index.deps().check_dependencies(None)?;
            problems.extend(index.deps().check_duplicates(&ignore[..])?);

            if json {
                println!("{}", serde_json::to_string_pretty(&problems)?);
            } else if problems.is_empty() {
                println!("No problems found.");
            } else {
                for problem in &problems {
                    println!("{}", problem);
                }
            }

            if problems.is_empty() {
                Ok(())
            } else {
                Err(anyhow::anyhow!("{} problem(s) found", problems.len()))
            }
        }
        Commands::Version { all } => {
            let mut index = Index::open(config);
            let version = index.simple_version(!all)?;
            println!("{}", version.main);

            for (origin, digest) in &version.origins {
                println!("  {}: {}", origin, digest.all.fingerprint());
                for (revision, digest) in &digest.revisions {
                    println!("    {}: {}", revision, digest.fingerprint());
                }
            }
            Ok(())
        }
        Commands::Attr { command } => {
            let mut index = Index::open(config);
            match command {
                AttrCommands::Get { package, attr } => {
                    let pkg = single_package(&mut index, &package)?;
                    match index.attrdb().get(pkg.attr_key(), &attr)? {
                        Some(value) => std::io::stdout().write_all(&value)?,
                        None => return Err(anyhow::anyhow!("{} has no attribute {}", pkg, attr)),
                    }
                }
                AttrCommands::Set {
                    package,
                    attr,
                    value,
                } => {
                    let pkg = single_package(&mut index, &package)?;
                    index.attrdb().set(pkg.attr_key(), &attr, &value)?;
                }
                AttrCommands::Del { package, attr } => {
                    let pkg = single_package(&mut index, &package)?;
                    index.attrdb().delete(pkg.attr_key(), &attr)?;
                }
                AttrCommands::List { package } => {
                    let pkg = single_package(&mut index, &package)?;
                    for attr in index.attrdb().enumerate(pkg.attr_key())? {
                        println!("{}", attr);
                    }
                }
            }
            Ok(())
        }
        Commands::Completions { shell } => {
            clap_complete::generate(shell, &mut Cli::command(), "pkgsack", &mut std::io::stdout());
            Ok(())
        }
    }
}
