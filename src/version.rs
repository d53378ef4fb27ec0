// src/version.rs

//! RPM-style version comparison and dependency range matching
//!
//! Versions are compared segment by segment the way `rpmvercmp` does it:
//! numeric runs compare numerically, alphabetic runs lexically, `~` sorts
//! before everything (pre-releases) and `^` sorts after the end of the
//! string but before anything else (post-release snapshots).

use std::cmp::Ordering;
use std::fmt;
use std::rc::Rc;
use std::str::FromStr;

/// Comparison operator attached to a versioned dependency
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DepFlag {
    Lt,
    Gt,
    Eq,
    Le,
    Ge,
}

const SENSE_LESS: u32 = 1 << 1;
const SENSE_GREATER: u32 = 1 << 2;
const SENSE_EQUAL: u32 = 1 << 3;

impl DepFlag {
    /// Decode the comparison bits of an RPM dependency sense value.
    ///
    /// Returns `None` for unversioned dependencies.
    pub fn from_sense(sense: u32) -> Option<Self> {
        let less = sense & SENSE_LESS != 0;
        let greater = sense & SENSE_GREATER != 0;
        let equal = sense & SENSE_EQUAL != 0;
        match (less, greater, equal) {
            (true, false, false) => Some(DepFlag::Lt),
            (false, true, false) => Some(DepFlag::Gt),
            (false, false, true) => Some(DepFlag::Eq),
            (true, false, true) => Some(DepFlag::Le),
            (false, true, true) => Some(DepFlag::Ge),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DepFlag::Lt => "LT",
            DepFlag::Gt => "GT",
            DepFlag::Eq => "EQ",
            DepFlag::Le => "LE",
            DepFlag::Ge => "GE",
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            DepFlag::Lt => "<",
            DepFlag::Gt => ">",
            DepFlag::Eq => "=",
            DepFlag::Le => "<=",
            DepFlag::Ge => ">=",
        }
    }

    fn includes_less(&self) -> bool {
        matches!(self, DepFlag::Lt | DepFlag::Le)
    }

    fn includes_greater(&self) -> bool {
        matches!(self, DepFlag::Gt | DepFlag::Ge)
    }

    fn includes_equal(&self) -> bool {
        matches!(self, DepFlag::Eq | DepFlag::Le | DepFlag::Ge)
    }
}

impl FromStr for DepFlag {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "LT" | "<" => Ok(DepFlag::Lt),
            "GT" | ">" => Ok(DepFlag::Gt),
            "EQ" | "=" | "==" => Ok(DepFlag::Eq),
            "LE" | "<=" => Ok(DepFlag::Le),
            "GE" | ">=" => Ok(DepFlag::Ge),
            _ => Err(format!("Invalid dependency flag: {}", s)),
        }
    }
}

/// Epoch, version and release, any of which may be absent in a dependency
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Evr {
    pub epoch: Option<Rc<str>>,
    pub version: Option<Rc<str>>,
    pub release: Option<Rc<str>>,
}

impl Evr {
    pub fn new(epoch: Option<&str>, version: Option<&str>, release: Option<&str>) -> Self {
        Self {
            epoch: epoch.map(Rc::from),
            version: version.map(Rc::from),
            release: release.map(Rc::from),
        }
    }

    /// Parse `[epoch:]version[-release]`
    ///
    /// A non-numeric epoch is dropped rather than rejected.
    pub fn parse(s: &str) -> Self {
        let (epoch, rest) = match s.find(':') {
            Some(i) => {
                let e = &s[..i];
                let epoch = e.parse::<u64>().ok().map(|_| e);
                (epoch, &s[i + 1..])
            }
            None => (None, s),
        };
        let (version, release) = match rest.rfind('-') {
            Some(j) => (&rest[..j], Some(&rest[j + 1..])),
            None => (rest, None),
        };
        let version = if version.is_empty() { None } else { Some(version) };
        Self::new(epoch, version, release)
    }

    pub fn is_empty(&self) -> bool {
        self.epoch.is_none() && self.version.is_none() && self.release.is_none()
    }
}

impl fmt::Display for Evr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(epoch) = &self.epoch {
            write!(f, "{}:", epoch)?;
        }
        if let Some(version) = &self.version {
            write!(f, "{}", version)?;
        }
        if let Some(release) = &self.release {
            write!(f, "-{}", release)?;
        }
        Ok(())
    }
}

/// Canonical (name, flag, evr) dependency tuple
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DependencyTuple {
    pub name: Rc<str>,
    pub flag: Option<DepFlag>,
    pub evr: Evr,
}

impl DependencyTuple {
    pub fn new(name: &str, flag: Option<DepFlag>, evr: Evr) -> Self {
        Self {
            name: Rc::from(name),
            flag,
            evr,
        }
    }

    /// Unversioned dependency on `name`
    pub fn unversioned(name: &str) -> Self {
        Self::new(name, None, Evr::default())
    }

    pub fn is_file(&self) -> bool {
        self.name.starts_with('/')
    }
}

impl fmt::Display for DependencyTuple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)?;
        if let Some(flag) = self.flag {
            if !self.evr.is_empty() {
                write!(f, " {} {}", flag.symbol(), self.evr)?;
            }
        }
        Ok(())
    }
}

fn is_separator(c: u8) -> bool {
    !c.is_ascii_alphanumeric() && c != b'~' && c != b'^'
}

/// Compare two version (or release) strings like `rpmvercmp`
pub fn rpmvercmp(a: &str, b: &str) -> Ordering {
    if a == b {
        return Ordering::Equal;
    }

    let one = a.as_bytes();
    let two = b.as_bytes();
    let (mut i, mut j) = (0usize, 0usize);

    while i < one.len() || j < two.len() {
        while i < one.len() && is_separator(one[i]) {
            i += 1;
        }
        while j < two.len() && is_separator(two[j]) {
            j += 1;
        }

        let c1 = one.get(i).copied();
        let c2 = two.get(j).copied();

        if c1 == Some(b'~') || c2 == Some(b'~') {
            if c1 != Some(b'~') {
                return Ordering::Greater;
            }
            if c2 != Some(b'~') {
                return Ordering::Less;
            }
            i += 1;
            j += 1;
            continue;
        }

        if c1 == Some(b'^') || c2 == Some(b'^') {
            if c1.is_none() {
                return Ordering::Less;
            }
            if c2.is_none() {
                return Ordering::Greater;
            }
            if c1 != Some(b'^') {
                return Ordering::Greater;
            }
            if c2 != Some(b'^') {
                return Ordering::Less;
            }
            i += 1;
            j += 1;
            continue;
        }

        let (Some(first), Some(_)) = (c1, c2) else {
            break;
        };

        let numeric = first.is_ascii_digit();
        let segment = |s: &[u8], start: usize| -> usize {
            let mut end = start;
            while end < s.len()
                && (if numeric {
                    s[end].is_ascii_digit()
                } else {
                    s[end].is_ascii_alphabetic()
                })
            {
                end += 1;
            }
            end
        };
        let end1 = segment(one, i);
        let end2 = segment(two, j);

        // Numeric segments always beat alphabetic ones
        if end2 == j {
            return if numeric {
                Ordering::Greater
            } else {
                Ordering::Less
            };
        }

        let mut seg1 = &one[i..end1];
        let mut seg2 = &two[j..end2];
        if numeric {
            while seg1.len() > 1 && seg1[0] == b'0' {
                seg1 = &seg1[1..];
            }
            while seg2.len() > 1 && seg2[0] == b'0' {
                seg2 = &seg2[1..];
            }
            match seg1.len().cmp(&seg2.len()) {
                Ordering::Equal => {}
                other => return other,
            }
        }
        match seg1.cmp(seg2) {
            Ordering::Equal => {}
            other => return other,
        }

        i = end1;
        j = end2;
    }

    match (i >= one.len(), j >= two.len()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Less,
        _ => Ordering::Greater,
    }
}

fn cmp_opt(a: Option<&str>, b: Option<&str>) -> Ordering {
    rpmvercmp(a.unwrap_or(""), b.unwrap_or(""))
}

/// Compare full epoch/version/release triples; a missing epoch is `0`
pub fn compare_evr(a: &Evr, b: &Evr) -> Ordering {
    let e1 = a.epoch.as_deref().unwrap_or("0");
    let e2 = b.epoch.as_deref().unwrap_or("0");
    rpmvercmp(e1, e2)
        .then_with(|| cmp_opt(a.version.as_deref(), b.version.as_deref()))
        .then_with(|| cmp_opt(a.release.as_deref(), b.release.as_deref()))
}

/// Does the provided tuple `prov` satisfy the requested tuple `req`?
///
/// An unversioned side on either end always satisfies. Components the
/// request leaves out are dropped from the provider before comparing, and a
/// provider without a release matches any requested release.
pub fn range_compare(req: &DependencyTuple, prov: &DependencyTuple) -> bool {
    if req.name != prov.name {
        return false;
    }
    let (Some(reqf), Some(f)) = (req.flag, prov.flag) else {
        return true;
    };

    let mut pevr = prov.evr.clone();
    let mut revr = req.evr.clone();
    if revr.release.is_none() {
        pevr.release = None;
    }
    if revr.epoch.is_none() {
        pevr.epoch = None;
    }
    if revr.version.is_none() {
        pevr.version = None;
    }
    if pevr.release.is_none() {
        revr.release = None;
    }

    match compare_evr(&pevr, &revr) {
        Ordering::Greater => reqf.includes_greater() || f.includes_less(),
        // At the boundary the ranges overlap when they extend the same way
        Ordering::Equal => {
            (reqf.includes_greater() && f.includes_greater())
                || (reqf.includes_less() && f.includes_less())
                || (reqf.includes_equal() && f.includes_equal())
        }
        Ordering::Less => reqf.includes_less() || f.includes_greater(),
    }
}
