// src/index/patterns.rs

//! Shell-style package patterns
//!
//! A pattern matches a package if it matches any of its canonical
//! renderings: `name`, `name-version-release.arch`, `name.arch`,
//! `name-version`, `name-version-release`,
//! `epoch:name-version-release.arch` and `name-epoch:version-release.arch`.

use crate::index::record::PackageIdentity;
use glob::{MatchOptions, Pattern};
use tracing::debug;

#[derive(Debug)]
struct CompiledPattern {
    /// First character of the pattern when it is not a wildcard
    quick: Option<char>,
    pattern: Pattern,
}

/// A set of patterns compiled once and matched against many packages
#[derive(Debug)]
pub struct PackagePatterns {
    patterns: Vec<CompiledPattern>,
    ignore_case: bool,
}

fn first_char(s: &str, ignore_case: bool) -> Option<char> {
    let c = s.chars().next()?;
    Some(if ignore_case { c.to_ascii_lowercase() } else { c })
}

/// `**` has a path meaning in glob syntax; for package names it is just `*`
fn collapse_stars(pat: &str) -> String {
    let mut out = String::with_capacity(pat.len());
    for c in pat.chars() {
        if c == '*' && out.ends_with('*') {
            continue;
        }
        out.push(c);
    }
    out
}

impl PackagePatterns {
    /// Compile `patterns`; `None` when there are none or more than `max`
    ///
    /// Empty patterns are skipped. A pattern that is not valid glob syntax
    /// is matched literally.
    pub fn compile<S: AsRef<str>>(patterns: &[S], ignore_case: bool, max: usize) -> Option<Self> {
        if patterns.is_empty() || patterns.len() > max {
            return None;
        }

        let mut compiled = Vec::with_capacity(patterns.len());
        for pat in patterns.iter().map(AsRef::as_ref) {
            if pat.is_empty() {
                continue;
            }
            let quick = first_char(pat, ignore_case).filter(|c| !matches!(c, '*' | '?' | '['));
            let pattern = Pattern::new(&collapse_stars(pat)).or_else(|e| {
                debug!("Pattern {:?} is not a valid glob ({}), matching literally", pat, e);
                Pattern::new(&Pattern::escape(pat))
            });
            if let Ok(pattern) = pattern {
                compiled.push(CompiledPattern { quick, pattern });
            }
        }

        Some(Self {
            patterns: compiled,
            ignore_case,
        })
    }

    fn options(&self) -> MatchOptions {
        MatchOptions {
            case_sensitive: !self.ignore_case,
            require_literal_separator: false,
            require_literal_leading_dot: false,
        }
    }

    /// Does any pattern match any rendering of this package?
    pub fn matches(&self, id: &PackageIdentity) -> bool {
        let options = self.options();
        let qname = first_char(&id.name, self.ignore_case);
        let qepoch = id.epoch.chars().next();
        let renderings = Renderings::new(id);

        self.patterns.iter().any(|p| {
            if let Some(q) = p.quick {
                if Some(q) != qname && Some(q) != qepoch {
                    return false;
                }
            }
            renderings
                .iter()
                .any(|candidate| p.pattern.matches_with(candidate, options))
        })
    }
}

struct Renderings {
    forms: [String; 7],
}

impl Renderings {
    fn new(id: &PackageIdentity) -> Self {
        let PackageIdentity {
            name,
            arch,
            epoch,
            version,
            release,
        } = id;
        Self {
            forms: [
                name.to_string(),
                format!("{}-{}-{}.{}", name, version, release, arch),
                format!("{}.{}", name, arch),
                format!("{}-{}", name, version),
                format!("{}-{}-{}", name, version, release),
                format!("{}:{}-{}-{}.{}", epoch, name, version, release, arch),
                format!("{}-{}:{}-{}.{}", name, epoch, version, release, arch),
            ],
        }
    }

    fn iter(&self) -> impl Iterator<Item = &str> {
        self.forms.iter().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(name: &str) -> PackageIdentity {
        PackageIdentity::new(name, "x86_64", "0", "1.2", "3.fc40")
    }

    fn matches(pattern: &str, ignore_case: bool, target: &PackageIdentity) -> bool {
        PackagePatterns::compile(&[pattern], ignore_case, 10)
            .unwrap()
            .matches(target)
    }

    #[test]
    fn test_case_sensitivity() {
        assert!(matches("foo*", false, &id("foobar")));
        assert!(!matches("foo*", false, &id("FooBar")));
        assert!(matches("foo*", true, &id("foobar")));
        assert!(matches("foo*", true, &id("FooBar")));
    }

    #[test]
    fn test_all_renderings() {
        let pkg = PackageIdentity::new("bash", "x86_64", "1", "5.2", "1");
        for pattern in [
            "bash",
            "bash-5.2-1.x86_64",
            "bash.x86_64",
            "bash-5.2",
            "bash-5.2-1",
            "1:bash-5.2-1.x86_64",
            "bash-1:5.2-1.x86_64",
        ] {
            assert!(matches(pattern, false, &pkg), "{} should match", pattern);
        }
        assert!(!matches("bash-5.3", false, &pkg));
        assert!(!matches("bash.i686", false, &pkg));
    }

    #[test]
    fn test_quick_reject_allows_epoch_prefix() {
        let pkg = PackageIdentity::new("bash", "x86_64", "2", "5.2", "1");
        assert!(matches("2:bash-*", false, &pkg));
        assert!(!matches("3:bash-*", false, &pkg));
    }

    #[test]
    fn test_wildcards() {
        assert!(matches("?ash", false, &id("bash")));
        assert!(matches("[bc]ash", false, &id("cash")));
        assert!(matches("*-1.2-*", false, &id("zlib")));
        assert!(matches("lib**", false, &id("libfoo")));
    }

    #[test]
    fn test_invalid_glob_is_literal() {
        assert!(matches("foo[", false, &id("foo[")));
        assert!(!matches("foo[", false, &id("foob")));
    }

    #[test]
    fn test_compile_limits() {
        assert!(PackagePatterns::compile::<&str>(&[], false, 10).is_none());
        assert!(PackagePatterns::compile(&["a", "b", "c"], false, 2).is_none());
        assert!(PackagePatterns::compile(&["a", "", "c"], false, 3).is_some());
    }
}
