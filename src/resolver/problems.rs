// src/resolver/problems.rs

//! Consistency problems found in the installed set

use crate::index::record::PackageIdentity;
use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Problem {
    /// A requirement nothing installed provides
    MissingRequires {
        package: PackageIdentity,
        missing: String,
    },
    /// A declared conflict that installed packages satisfy
    Conflicts {
        package: PackageIdentity,
        found: String,
        conflicts: Vec<PackageIdentity>,
    },
    /// Two version-equal packages of the same name
    Duplicate {
        package: PackageIdentity,
        duplicate: PackageIdentity,
    },
}

impl Problem {
    /// The package the problem is reported against
    pub fn package(&self) -> &PackageIdentity {
        match self {
            Problem::MissingRequires { package, .. }
            | Problem::Conflicts { package, .. }
            | Problem::Duplicate { package, .. } => package,
        }
    }
}

impl fmt::Display for Problem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Problem::MissingRequires { package, missing } => {
                write!(f, "{} has missing requires of {}", package, missing)
            }
            Problem::Conflicts {
                package,
                found,
                conflicts,
            } => {
                let with: Vec<String> = conflicts.iter().map(|c| c.to_string()).collect();
                write!(
                    f,
                    "{} has installed conflicts {}: {}",
                    package,
                    found,
                    with.join(", ")
                )
            }
            Problem::Duplicate { package, duplicate } => {
                write!(f, "{} is a duplicate with {}", package, duplicate)
            }
        }
    }
}
