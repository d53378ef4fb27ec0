// src/packages/mod.rs

//! Package file support
//!
//! Only RPM files can be imported into the native database.

pub mod rpm;

pub use rpm::RpmPackage;
