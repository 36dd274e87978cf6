// src/assertions/mod.rs

//! Solver output: assertions, deterministic ordering and content hashes
//!
//! A solution is a list of [`PackageAssert`] decisions. Straight out of the
//! solver the list is a set; [`PackagesAssertions::order`] turns it into a
//! dependency-consistent sequence, after which position matters.
//!
//! # Hash chain
//!
//! Hashes are computed bottom-up over the dependency edges among selected
//! packages, each package folding in the hashes of its direct dependencies:
//!
//! ```text
//! build_hash(p)   = H("build",   fp(p), salt(p), [dep_fp = package_hash(dep)]...)
//! package_hash(p) = H("package", fp(p), build_hash(p))
//! ```
//!
//! Dependencies are folded in fingerprint order, so identical subtrees hash
//! identically regardless of the root they are reached from.

use crate::error::{Error, Result};
use crate::hash::Hasher;
use crate::package::{Package, PackageCatalog};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::debug;

/// Salts keyed by package fingerprint
pub type Salts = BTreeMap<String, String>;

/// The two cumulative hashes of a package
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PackageHash {
    /// Identifies the full build context of the package
    pub build_hash: String,
    /// Content-addressed identity of the built package
    pub package_hash: String,
}

/// One boolean decision of a solution
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageAssert {
    pub package: Package,
    pub value: bool,
    #[serde(default)]
    pub hash: PackageHash,
}

impl PackageAssert {
    pub fn new(package: Package, value: bool) -> Self {
        Self {
            package,
            value,
            hash: PackageHash::default(),
        }
    }

    pub fn fingerprint(&self) -> String {
        self.package.fingerprint()
    }

    /// Canonical `fingerprint:value` form used by the assertion hash
    pub fn to_line(&self) -> String {
        format!("{}:{}", self.fingerprint(), self.value)
    }
}

/// An ordered list of package decisions
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PackagesAssertions(Vec<PackageAssert>);

impl PackagesAssertions {
    pub fn new(assertions: Vec<PackageAssert>) -> Self {
        Self(assertions)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, PackageAssert> {
        self.0.iter()
    }

    pub fn as_slice(&self) -> &[PackageAssert] {
        &self.0
    }

    pub fn into_inner(self) -> Vec<PackageAssert> {
        self.0
    }

    /// Find the assertion for a fingerprint
    pub fn search(&self, fingerprint: &str) -> Option<&PackageAssert> {
        self.0.iter().find(|a| a.fingerprint() == fingerprint)
    }

    /// Assertions with value true, in list order
    pub fn selected(&self) -> impl Iterator<Item = &PackageAssert> {
        self.0.iter().filter(|a| a.value)
    }

    /// Fingerprints of the selected packages, in list order
    pub fn selected_fingerprints(&self) -> Vec<String> {
        self.selected().map(|a| a.fingerprint()).collect()
    }

    /// Direct dependency edges among selected packages
    ///
    /// `p -> q` when some requirement of `p` is answered by `q`, directly or
    /// through `provides`.
    pub fn dependency_edges(&self) -> BTreeMap<String, BTreeSet<String>> {
        let selected: BTreeMap<String, &Package> = self
            .selected()
            .map(|a| (a.fingerprint(), &a.package))
            .collect();

        selected
            .iter()
            .map(|(fp, package)| {
                let deps = selected
                    .iter()
                    .filter(|(other_fp, other)| *other_fp != fp && package.depends_on(other))
                    .map(|(other_fp, _)| other_fp.clone())
                    .collect();
                (fp.clone(), deps)
            })
            .collect()
    }

    /// Order the solution topologically, starting from `root`
    ///
    /// Dependencies always precede their dependents. The root's subtree is
    /// emitted first (depth-first post-order, children by fingerprint),
    /// then the remaining selected packages in fingerprint order, then the
    /// rejected assertions sorted by fingerprint. Calling `order` on its own
    /// output returns the same sequence.
    pub fn order(&self, catalog: &dyn PackageCatalog, root: &str) -> Result<Self> {
        let selected: BTreeMap<String, &PackageAssert> =
            self.selected().map(|a| (a.fingerprint(), a)).collect();

        if !selected.contains_key(root) {
            return Err(Error::Lookup(format!(
                "{} is not selected in the solution",
                root
            )));
        }

        for (fp, assertion) in &selected {
            for requirement in &assertion.package.requires {
                let in_set = selected.values().any(|a| a.package.satisfies(requirement));
                if !in_set && catalog.find_package_candidate(requirement).is_none() {
                    return Err(Error::Lookup(format!(
                        "{} requires {}, which cannot be resolved",
                        fp, requirement
                    )));
                }
            }
        }

        let edges = self.dependency_edges();
        let mut walk = PostOrder::new(&edges);
        walk.visit(root)?;
        for fp in selected.keys() {
            walk.visit(fp)?;
        }

        let mut ordered: Vec<PackageAssert> = walk
            .output
            .iter()
            .filter_map(|fp| selected.get(fp).map(|a| (*a).clone()))
            .collect();

        let mut rejected: Vec<&PackageAssert> = self.0.iter().filter(|a| !a.value).collect();
        rejected.sort_by_key(|a| a.fingerprint());
        rejected.dedup_by_key(|a| a.fingerprint());
        ordered.extend(rejected.into_iter().cloned());

        debug!("Ordered {} assertions from {}", ordered.len(), root);
        Ok(Self(ordered))
    }

    /// The package plus everything it transitively depends on, in list order
    pub fn cut(&self, fingerprint: &str) -> Self {
        let edges = self.dependency_edges();
        if !edges.contains_key(fingerprint) {
            return Self::default();
        }

        let mut reachable = BTreeSet::new();
        let mut stack = vec![fingerprint.to_string()];
        while let Some(fp) = stack.pop() {
            if reachable.insert(fp.clone())
                && let Some(deps) = edges.get(&fp)
            {
                stack.extend(deps.iter().cloned());
            }
        }

        Self(
            self.0
                .iter()
                .filter(|a| a.value && reachable.contains(&a.fingerprint()))
                .cloned()
                .collect(),
        )
    }

    /// The solution without `fingerprint`
    pub fn drop_package(&self, fingerprint: &str) -> Self {
        Self(
            self.0
                .iter()
                .filter(|a| a.fingerprint() != fingerprint)
                .cloned()
                .collect(),
        )
    }

    /// Order-independent hash of the decisions in this solution
    pub fn assertion_hash(&self) -> String {
        let lines: BTreeSet<String> = self.0.iter().map(|a| a.to_line()).collect();
        let mut hasher = Hasher::with_domain("assertions");
        for line in &lines {
            hasher.field("assert", line);
        }
        hasher.finalize()
    }

    /// BuildHash and PackageHash of every selected package
    pub fn tree_hashes(&self, salts: &Salts) -> Result<BTreeMap<String, PackageHash>> {
        let edges = self.dependency_edges();
        let mut chain = HashChain {
            edges: &edges,
            salts,
            memo: BTreeMap::new(),
            stack: Vec::new(),
        };
        for fp in edges.keys() {
            chain.hash(fp)?;
        }
        Ok(chain.memo)
    }

    /// Hashes of `fingerprint` computed over its own sub-solution
    pub fn package_hash(&self, fingerprint: &str, salts: &Salts) -> Result<PackageHash> {
        let cut = self.cut(fingerprint);
        if cut.is_empty() {
            return Err(Error::Lookup(format!(
                "{} is not selected in the solution",
                fingerprint
            )));
        }
        let mut hashes = cut.tree_hashes(salts)?;
        hashes.remove(fingerprint).ok_or_else(|| {
            Error::InvariantViolation(format!("no hash computed for {}", fingerprint))
        })
    }

    /// Unsalted PackageHash of `fingerprint`'s sub-solution
    pub fn hash_from(&self, fingerprint: &str) -> Result<String> {
        self.salted_hash_from(fingerprint, &Salts::new())
    }

    /// PackageHash of `fingerprint`'s sub-solution with per-package salts
    pub fn salted_hash_from(&self, fingerprint: &str, salts: &Salts) -> Result<String> {
        Ok(self.package_hash(fingerprint, salts)?.package_hash)
    }

    /// BuildHash of `fingerprint`'s sub-solution with per-package salts
    pub fn build_hash_from(&self, fingerprint: &str, salts: &Salts) -> Result<String> {
        Ok(self.package_hash(fingerprint, salts)?.build_hash)
    }

    /// A copy with the hash field of every selected assertion filled in
    pub fn with_hashes(&self, salts: &Salts) -> Result<Self> {
        let mut hashes = self.tree_hashes(salts)?;
        Ok(Self(
            self.0
                .iter()
                .map(|a| {
                    let mut a = a.clone();
                    if a.value
                        && let Some(hash) = hashes.remove(&a.fingerprint())
                    {
                        a.hash = hash;
                    }
                    a
                })
                .collect(),
        ))
    }
}

impl IntoIterator for PackagesAssertions {
    type Item = PackageAssert;
    type IntoIter = std::vec::IntoIter<PackageAssert>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a PackagesAssertions {
    type Item = &'a PackageAssert;
    type IntoIter = std::slice::Iter<'a, PackageAssert>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl FromIterator<PackageAssert> for PackagesAssertions {
    fn from_iter<I: IntoIterator<Item = PackageAssert>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Visiting,
    Done,
}

/// Depth-first post-order walk with cycle detection
struct PostOrder<'e> {
    edges: &'e BTreeMap<String, BTreeSet<String>>,
    marks: HashMap<String, Mark>,
    path: Vec<String>,
    output: Vec<String>,
}

impl<'e> PostOrder<'e> {
    fn new(edges: &'e BTreeMap<String, BTreeSet<String>>) -> Self {
        Self {
            edges,
            marks: HashMap::new(),
            path: Vec::new(),
            output: Vec::new(),
        }
    }

    fn visit(&mut self, fp: &str) -> Result<()> {
        match self.marks.get(fp) {
            Some(Mark::Done) => return Ok(()),
            Some(Mark::Visiting) => return Err(cycle_error(&self.path, fp)),
            None => {}
        }

        self.marks.insert(fp.to_string(), Mark::Visiting);
        self.path.push(fp.to_string());
        let edges = self.edges;
        if let Some(deps) = edges.get(fp) {
            for dep in deps {
                self.visit(dep)?;
            }
        }
        self.path.pop();
        self.marks.insert(fp.to_string(), Mark::Done);
        self.output.push(fp.to_string());
        Ok(())
    }
}

fn cycle_error(path: &[String], fp: &str) -> Error {
    let start = path.iter().position(|p| p == fp).unwrap_or(0);
    let mut cycle: Vec<String> = path[start..].to_vec();
    cycle.push(fp.to_string());
    Error::CircularDependency(cycle)
}

/// Memoized bottom-up evaluation of the hash chain
struct HashChain<'e> {
    edges: &'e BTreeMap<String, BTreeSet<String>>,
    salts: &'e Salts,
    memo: BTreeMap<String, PackageHash>,
    stack: Vec<String>,
}

impl HashChain<'_> {
    fn hash(&mut self, fp: &str) -> Result<String> {
        if let Some(done) = self.memo.get(fp) {
            return Ok(done.package_hash.clone());
        }
        if self.stack.iter().any(|p| p == fp) {
            return Err(cycle_error(&self.stack, fp));
        }

        self.stack.push(fp.to_string());
        let edges = self.edges;
        let mut deps = Vec::new();
        if let Some(children) = edges.get(fp) {
            for dep in children {
                let hash = self.hash(dep)?;
                deps.push(format!("{}={}", dep, hash));
            }
        }
        self.stack.pop();

        let mut build = Hasher::with_domain("build");
        build.field("package", fp);
        build.field("salt", self.salts.get(fp).map(String::as_str).unwrap_or(""));
        for dep in &deps {
            build.field("dep", dep);
        }
        let build_hash = build.finalize();

        let mut package = Hasher::with_domain("package");
        package.field("package", fp).field("build", &build_hash);
        let package_hash = package.finalize();

        self.memo.insert(
            fp.to_string(),
            PackageHash {
                build_hash,
                package_hash: package_hash.clone(),
            },
        );
        Ok(package_hash)
    }
}
