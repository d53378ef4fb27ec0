// src/lib.rs

//! Pkgsack: index and caches over the installed package set
//!
//! Sits between a native installed-package database and the code that
//! asks questions about it.
//!
//! # Architecture
//!
//! - [`Index`]: lazily populated records with point queries and full scans
//! - [`resolver::DependencyMatcher`]: provides/requires matching with memoization
//! - [`cache`]: derived results persisted behind a fingerprint of the installed set
//! - [`sidecar`]: per-package attributes the native database cannot hold
//! - [`db`]: the native database seam and its SQLite implementation

pub mod cache;
pub mod config;
pub mod db;
mod error;
pub mod index;
pub mod packages;
pub mod resolver;
pub mod sidecar;
pub mod version;

pub use config::SackConfig;
pub use error::{Error, Result};
pub use index::{Index, NevraQuery};
pub use resolver::Problem;
