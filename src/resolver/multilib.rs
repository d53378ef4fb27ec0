// src/resolver/multilib.rs

//! Architectures that install side by side with a `noarch` build

const NOARCH: &str = "noarch";

/// 64-bit arches of the multilib pairings (the 32-bit half is the other side)
const MULTILIB_ARCHES: &[&str] = &[
    "x86_64", "amd64", "ia32e", "ppc64", "ppc64p7", "s390x", "sparc64", "sparc64v",
];

pub fn is_multilib_arch(arch: &str) -> bool {
    MULTILIB_ARCHES.contains(&arch)
}

/// One side is `noarch` and the other a multilib arch
///
/// Such a pair of version-equal packages is tolerated rather than
/// reported as a duplicate.
pub fn is_duplicate_exception(a: &str, b: &str) -> bool {
    (a == NOARCH && is_multilib_arch(b)) || (b == NOARCH && is_multilib_arch(a))
}
