// src/package/catalog.rs

//! Read-only package catalogs
//!
//! The solver, ordering and hashing layers never own package storage. They
//! query an injected [`PackageCatalog`], which only has to enumerate its
//! packages; every lookup has a provided default built on `world()` that
//! implementations may override with an index.

use super::{Package, PackageSelector};
use std::collections::{BTreeMap, BTreeSet, VecDeque};

/// Read-only lookup of packages by fingerprint or selector
pub trait PackageCatalog: Send + Sync {
    /// Every package in the catalog, ordered by fingerprint
    fn world(&self) -> Vec<&Package>;

    /// Look up a concrete package by fingerprint
    fn get_package(&self, fingerprint: &str) -> Option<&Package> {
        self.world()
            .into_iter()
            .find(|p| p.fingerprint() == fingerprint)
    }

    /// All versions of `category/name`, highest version first
    fn find_package_versions(&self, category: &str, name: &str) -> Vec<&Package> {
        let mut versions: Vec<&Package> = self
            .world()
            .into_iter()
            .filter(|p| p.category == category && p.name == name)
            .collect();
        versions.sort_by(|a, b| b.version.cmp(&a.version));
        versions
    }

    /// Packages whose `provides` answer `selector`, highest version first
    fn find_providers(&self, selector: &PackageSelector) -> Vec<&Package> {
        let mut providers: Vec<&Package> = self
            .world()
            .into_iter()
            .filter(|p| !p.matches(selector) && p.provides_for(selector))
            .collect();
        providers.sort_by(|a, b| b.version.cmp(&a.version).then_with(|| a.key().cmp(&b.key())));
        providers
    }

    /// Highest version matching `selector` directly
    fn find_package(&self, selector: &PackageSelector) -> Option<&Package> {
        self.find_package_versions(&selector.category, &selector.name)
            .into_iter()
            .find(|p| p.matches(selector))
    }

    /// Every package answering `selector`, in preference order
    ///
    /// Direct matches come first (highest version first), followed by
    /// packages that provide the selector.
    fn find_packages(&self, selector: &PackageSelector) -> Vec<&Package> {
        let mut found: Vec<&Package> = self
            .find_package_versions(&selector.category, &selector.name)
            .into_iter()
            .filter(|p| p.matches(selector))
            .collect();
        found.extend(self.find_providers(selector));
        found
    }

    /// The preferred package answering `selector`
    fn find_package_candidate(&self, selector: &PackageSelector) -> Option<&Package> {
        self.find_packages(selector).into_iter().next()
    }

    /// Transitive reverse dependencies of `package`, ordered by fingerprint
    fn get_revdeps(&self, package: &Package) -> Vec<&Package> {
        let world = self.world();
        let root = package.fingerprint();
        let mut seen: BTreeSet<String> = BTreeSet::new();
        let mut found: BTreeMap<String, &Package> = BTreeMap::new();
        let mut queue = VecDeque::new();

        seen.insert(root.clone());
        queue.push_back(package);

        while let Some(current) = queue.pop_front() {
            for &candidate in &world {
                if candidate.depends_on(current) {
                    let fp = candidate.fingerprint();
                    if seen.insert(fp.clone()) {
                        found.insert(fp, candidate);
                        queue.push_back(candidate);
                    }
                }
            }
        }

        found.into_values().collect()
    }
}

/// Catalog backed by an in-memory map
#[derive(Debug, Clone, Default)]
pub struct InMemoryCatalog {
    /// fingerprint → package
    packages: BTreeMap<String, Package>,
    /// `category/name` → fingerprints of every version
    versions: BTreeMap<String, BTreeSet<String>>,
}

impl InMemoryCatalog {
    /// Create an empty catalog
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a catalog from packages; later duplicates replace earlier ones
    pub fn from_packages(packages: impl IntoIterator<Item = Package>) -> Self {
        let mut catalog = Self::new();
        for package in packages {
            catalog.add(package);
        }
        catalog
    }

    /// Insert a package, returning the one it replaced
    pub fn add(&mut self, package: Package) -> Option<Package> {
        let fp = package.fingerprint();
        self.versions
            .entry(package.key())
            .or_default()
            .insert(fp.clone());
        self.packages.insert(fp, package)
    }

    /// Remove a package by fingerprint
    pub fn remove(&mut self, fingerprint: &str) -> Option<Package> {
        let package = self.packages.remove(fingerprint)?;
        if let Some(fps) = self.versions.get_mut(&package.key()) {
            fps.remove(fingerprint);
            if fps.is_empty() {
                self.versions.remove(&package.key());
            }
        }
        Some(package)
    }

    pub fn contains(&self, fingerprint: &str) -> bool {
        self.packages.contains_key(fingerprint)
    }

    pub fn len(&self) -> usize {
        self.packages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }
}

impl PackageCatalog for InMemoryCatalog {
    fn world(&self) -> Vec<&Package> {
        self.packages.values().collect()
    }

    fn get_package(&self, fingerprint: &str) -> Option<&Package> {
        self.packages.get(fingerprint)
    }

    fn find_package_versions(&self, category: &str, name: &str) -> Vec<&Package> {
        let key = super::identity_key(category, name);
        let mut versions: Vec<&Package> = self
            .versions
            .get(&key)
            .into_iter()
            .flatten()
            .filter_map(|fp| self.packages.get(fp))
            .collect();
        versions.sort_by(|a, b| b.version.cmp(&a.version));
        versions
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sel(s: &str) -> PackageSelector {
        PackageSelector::parse(s).unwrap()
    }

    fn pkg(category: &str, name: &str, version: &str) -> Package {
        Package::parse(category, name, version).unwrap()
    }

    fn sample() -> InMemoryCatalog {
        InMemoryCatalog::from_packages(vec![
            pkg("lib", "ssl", "1.1.1"),
            pkg("lib", "ssl", "3.0.0"),
            pkg("lib", "libressl", "3.8.0").with_provides(vec![sel("lib/ssl@3.0.1")]),
            pkg("net", "curl", "8.5.0").with_requires(vec![sel("lib/ssl >= 3.0")]),
            pkg("app", "browser", "1.0").with_requires(vec![sel("net/curl")]),
        ])
    }

    #[test]
    fn test_find_package_prefers_highest_version() {
        let catalog = sample();
        let found = catalog.find_package(&sel("lib/ssl")).unwrap();
        assert_eq!(found.fingerprint(), "lib/ssl@3.0.0");
        let old = catalog.find_package(&sel("lib/ssl < 3.0")).unwrap();
        assert_eq!(old.fingerprint(), "lib/ssl@1.1.1");
    }

    #[test]
    fn test_find_packages_lists_providers_after_direct_matches() {
        let catalog = sample();
        let found: Vec<String> = catalog
            .find_packages(&sel("lib/ssl >= 3.0"))
            .iter()
            .map(|p| p.fingerprint())
            .collect();
        assert_eq!(found, vec!["lib/ssl@3.0.0", "lib/libressl@3.8.0"]);

        let only_provider = catalog.find_package_candidate(&sel("lib/ssl > 3.0.0")).unwrap();
        assert_eq!(only_provider.fingerprint(), "lib/libressl@3.8.0");
    }

    #[test]
    fn test_get_revdeps_is_transitive() {
        let catalog = sample();
        let ssl = catalog.get_package("lib/ssl@3.0.0").unwrap();
        let revdeps: Vec<String> = catalog
            .get_revdeps(ssl)
            .iter()
            .map(|p| p.fingerprint())
            .collect();
        assert_eq!(revdeps, vec!["app/browser@1.0", "net/curl@8.5.0"]);

        let old = catalog.get_package("lib/ssl@1.1.1").unwrap();
        assert!(catalog.get_revdeps(old).is_empty());
    }

    #[test]
    fn test_remove_updates_version_index() {
        let mut catalog = sample();
        assert!(catalog.remove("lib/ssl@3.0.0").is_some());
        assert_eq!(catalog.find_package_versions("lib", "ssl").len(), 1);
        assert!(!catalog.contains("lib/ssl@3.0.0"));
        assert_eq!(catalog.len(), 4);
    }
}
