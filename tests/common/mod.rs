// tests/common/mod.rs

//! Shared test utilities and helpers for integration tests.

#![allow(dead_code)]

use arbor::{
    CompilationSpec, InMemoryCatalog, Package, PackageSelector, PackagesAssertions,
};

/// Parse a selector, panicking on malformed test input
pub fn sel(s: &str) -> PackageSelector {
    PackageSelector::parse(s).unwrap()
}

/// Uncategorized package with requirements given as selector strings
pub fn pkg(name: &str, version: &str, requires: &[&str]) -> Package {
    Package::parse("", name, version)
        .unwrap()
        .with_requires(requires.iter().map(|r| sel(r)).collect())
}

/// Same as [`pkg`] with a conflict list
pub fn pkg_conflicting(name: &str, version: &str, requires: &[&str], conflicts: &[&str]) -> Package {
    pkg(name, version, requires).with_conflicts(conflicts.iter().map(|c| sel(c)).collect())
}

pub fn catalog(packages: Vec<Package>) -> InMemoryCatalog {
    InMemoryCatalog::from_packages(packages)
}

/// A chain a -> b -> d -> h -> g plus a standalone c
///
/// Returns (definitions, installed) with c installed.
pub fn chain_catalogs() -> (InMemoryCatalog, InMemoryCatalog) {
    let c = pkg("c", "1", &[]);
    let definitions = catalog(vec![
        pkg("a", "1", &["b"]),
        pkg("b", "1", &["d"]),
        c.clone(),
        pkg("d", "1", &["h"]),
        pkg("h", "1", &["g"]),
        pkg("g", "1", &[]),
    ]);
    (definitions, catalog(vec![c]))
}

/// Fingerprints of the selected assertions, sorted
pub fn selected_sorted(assertions: &PackagesAssertions) -> Vec<String> {
    let mut fps = assertions.selected_fingerprints();
    fps.sort();
    fps
}

/// Fingerprints of every assertion, in list order
pub fn fingerprints(assertions: &PackagesAssertions) -> Vec<String> {
    assertions.iter().map(|a| a.fingerprint()).collect()
}

/// A spec for an uncategorized package
pub fn spec(name: &str, version: &str, requires: &[&str]) -> CompilationSpec {
    CompilationSpec::new(pkg(name, version, requires))
}
