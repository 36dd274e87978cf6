// src/compiler/mod.rs

//! Compilation specs and the compiler collaborator
//!
//! The build backend itself lives outside arbor. What arbor needs from it
//! is captured by the [`Compiler`] trait: the dependency tree of a spec and
//! the spec of any package in that tree. [`SpecCompiler`] is the in-memory
//! implementation used by the CLI and tests.
//!
//! Only the hash-relevant part of a spec ([`BuildInstructions`] plus the
//! package identity and requirements) feeds [`CompilationSpec::hash`].
//! Output locations and unpack flags never change a hash.

pub mod hashtree;
pub mod levels;

pub use hashtree::{ImageHashTree, PackageImageHashTree};
pub use levels::{BuildLevels, LevelGroup};

use crate::assertions::PackagesAssertions;
use crate::error::{Error, Result};
use crate::hash::hash_bytes;
use crate::package::{Package, PackageCatalog, PackageSelector};
use crate::solver::{Solver, SolverOptions};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use tracing::debug;

/// Hash-relevant build description
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildInstructions {
    /// Commands run in the build stage
    pub steps: Vec<String>,
    /// Commands run while preparing the builder image
    pub prelude: Vec<String>,
    pub env: BTreeMap<String, String>,
    /// Explicit external source image
    pub image: Option<String>,
    /// File patterns kept in the package
    pub includes: Vec<String>,
    /// File patterns dropped from the package
    pub excludes: Vec<String>,
    /// Build-time requirements on top of the package's own requirements
    pub requires: Vec<PackageSelector>,
    /// Digest of build-relevant file content (sources, patches)
    pub source_digest: Option<String>,
}

/// A package together with how to build it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompilationSpec {
    pub package: Package,
    #[serde(flatten)]
    pub build: BuildInstructions,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_path: Option<PathBuf>,
    #[serde(default)]
    pub unpack: bool,
}

impl CompilationSpec {
    /// A spec with no build instructions
    pub fn new(package: Package) -> Self {
        Self {
            package,
            build: BuildInstructions::default(),
            output_path: None,
            unpack: false,
        }
    }

    pub fn with_build(mut self, build: BuildInstructions) -> Self {
        self.build = build;
        self
    }

    pub fn fingerprint(&self) -> String {
        self.package.fingerprint()
    }

    /// Whether the spec names an explicit external source image
    pub fn has_image(&self) -> bool {
        self.build
            .image
            .as_deref()
            .is_some_and(|image| !image.trim().is_empty())
    }

    /// The package as seen by the solver at build time
    ///
    /// Its requirements are the runtime requirements followed by the
    /// build-time ones, without duplicates.
    pub fn build_package(&self) -> Package {
        let mut package = self.package.clone();
        for requirement in &self.build.requires {
            if !package.requires.contains(requirement) {
                package.requires.push(requirement.clone());
            }
        }
        package
    }

    /// Canonical hash-relevant view of the spec
    pub fn signature(&self) -> serde_json::Value {
        let sorted = |items: &[String]| -> Vec<String> {
            let set: BTreeSet<&String> = items.iter().collect();
            set.into_iter().cloned().collect()
        };
        let selectors = |items: &[PackageSelector]| -> Vec<String> {
            let set: BTreeSet<String> = items.iter().map(|s| s.to_string()).collect();
            set.into_iter().collect()
        };

        json!({
            "package": self.fingerprint(),
            "requires": selectors(&self.package.requires),
            "conflicts": selectors(&self.package.conflicts),
            "provides": selectors(&self.package.provides),
            "build_requires": selectors(&self.build.requires),
            "steps": self.build.steps,
            "prelude": self.build.prelude,
            "env": self.build.env,
            "image": self.build.image,
            "includes": sorted(&self.build.includes),
            "excludes": sorted(&self.build.excludes),
            "source_digest": self.build.source_digest,
        })
    }

    /// SHA-256 of the canonical signature
    pub fn hash(&self) -> Result<String> {
        let bytes = serde_json::to_vec(&self.signature())?;
        Ok(hash_bytes(&bytes))
    }
}

/// Build backend as seen by the hashing layer
pub trait Compiler: Send + Sync {
    /// Ordered dependency tree of `spec`, target included
    fn compute_dep_tree(
        &self,
        spec: &CompilationSpec,
        catalog: &dyn PackageCatalog,
    ) -> Result<PackagesAssertions>;

    /// Compilation spec of a package in a dependency tree
    fn from_package(&self, package: &Package) -> Result<CompilationSpec>;
}

/// Solve the build-time dependencies of `spec` and order them
///
/// The tree is computed against an empty installed set, so it only
/// depends on the catalog and the spec.
pub fn compute_dep_tree(
    catalog: &dyn PackageCatalog,
    spec: &CompilationSpec,
    options: &SolverOptions,
) -> Result<PackagesAssertions> {
    let empty = crate::package::InMemoryCatalog::new();
    let solver = Solver::with_options(catalog, &empty, options.clone());
    let package = spec.build_package();
    let root = package.fingerprint();

    let solution = solver.install_packages(vec![package])?;
    let ordered = solution.order(catalog, &root)?;
    debug!(
        "Dependency tree of {} has {} selected packages",
        root,
        ordered.selected().count()
    );
    Ok(ordered)
}

/// In-memory spec registry implementing [`Compiler`]
#[derive(Debug, Clone, Default)]
pub struct SpecCompiler {
    specs: BTreeMap<String, CompilationSpec>,
    options: SolverOptions,
}

impl SpecCompiler {
    pub fn new(options: SolverOptions) -> Self {
        Self {
            specs: BTreeMap::new(),
            options,
        }
    }

    /// Register a spec, replacing any spec for the same package
    pub fn add(&mut self, spec: CompilationSpec) -> Option<CompilationSpec> {
        self.specs.insert(spec.fingerprint(), spec)
    }

    pub fn get(&self, fingerprint: &str) -> Option<&CompilationSpec> {
        self.specs.get(fingerprint)
    }

    pub fn specs(&self) -> impl Iterator<Item = &CompilationSpec> {
        self.specs.values()
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }

    /// Build-time dependency map of every registered spec
    ///
    /// Each requirement resolves to the catalog's preferred candidate.
    pub fn build_graph(
        &self,
        catalog: &dyn PackageCatalog,
    ) -> Result<BTreeMap<String, BTreeSet<String>>> {
        let mut graph = BTreeMap::new();
        for (fp, spec) in &self.specs {
            let mut deps = BTreeSet::new();
            for requirement in &spec.build_package().requires {
                let dep = catalog.find_package_candidate(requirement).ok_or_else(|| {
                    Error::Lookup(format!("{} requires {}, which cannot be resolved", fp, requirement))
                })?;
                deps.insert(dep.fingerprint());
            }
            graph.insert(fp.clone(), deps);
        }
        Ok(graph)
    }
}

impl Compiler for SpecCompiler {
    fn compute_dep_tree(
        &self,
        spec: &CompilationSpec,
        catalog: &dyn PackageCatalog,
    ) -> Result<PackagesAssertions> {
        compute_dep_tree(catalog, spec, &self.options)
    }

    /// Packages without a registered spec get an empty one
    fn from_package(&self, package: &Package) -> Result<CompilationSpec> {
        Ok(self
            .specs
            .get(&package.fingerprint())
            .cloned()
            .unwrap_or_else(|| CompilationSpec::new(package.clone())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::package::InMemoryCatalog;

    fn spec(name: &str) -> CompilationSpec {
        CompilationSpec::new(Package::parse("app", name, "1.0").unwrap())
    }

    #[test]
    fn test_hash_ignores_output_settings() {
        let base = spec("a");
        let mut moved = base.clone();
        moved.output_path = Some(PathBuf::from("/tmp/out"));
        moved.unpack = true;
        assert_eq!(base.hash().unwrap(), moved.hash().unwrap());
    }

    #[test]
    fn test_hash_tracks_build_instructions() {
        let base = spec("a");
        let mut stepped = base.clone();
        stepped.build.steps.push("make".to_string());
        let mut imaged = base.clone();
        imaged.build.image = Some("alpine:3.19".to_string());
        let mut digested = base.clone();
        digested.build.source_digest = Some("abc".to_string());

        let hashes: BTreeSet<String> = [&base, &stepped, &imaged, &digested]
            .iter()
            .map(|s| s.hash().unwrap())
            .collect();
        assert_eq!(hashes.len(), 4);
    }

    #[test]
    fn test_include_order_is_irrelevant() {
        let mut a = spec("a");
        a.build.includes = vec!["/usr/bin".into(), "/etc".into()];
        let mut b = spec("a");
        b.build.includes = vec!["/etc".into(), "/usr/bin".into()];
        assert_eq!(a.hash().unwrap(), b.hash().unwrap());
    }

    #[test]
    fn test_build_package_merges_build_requires() {
        let mut s = spec("a");
        s.package.requires = vec![PackageSelector::parse("lib/x").unwrap()];
        s.build.requires = vec![
            PackageSelector::parse("lib/x").unwrap(),
            PackageSelector::parse("dev/cc").unwrap(),
        ];
        let requires: Vec<String> = s.build_package().requires.iter().map(|r| r.to_string()).collect();
        assert_eq!(requires, vec!["lib/x", "dev/cc"]);
    }

    #[test]
    fn test_build_graph_resolves_candidates() {
        let catalog = InMemoryCatalog::from_packages(vec![
            Package::parse("lib", "x", "1.0").unwrap(),
            Package::parse("lib", "x", "2.0").unwrap(),
        ]);
        let mut compiler = SpecCompiler::default();
        let mut s = spec("a");
        s.build.requires = vec![PackageSelector::parse("lib/x").unwrap()];
        compiler.add(s);

        let graph = compiler.build_graph(&catalog).unwrap();
        assert_eq!(
            graph["app/a@1.0"].iter().cloned().collect::<Vec<_>>(),
            vec!["lib/x@2.0"]
        );

        let mut broken = spec("b");
        broken.build.requires = vec![PackageSelector::parse("ghost").unwrap()];
        compiler.add(broken);
        assert!(matches!(compiler.build_graph(&catalog), Err(Error::Lookup(_))));
    }

    #[test]
    fn test_spec_deserializes_flattened_instructions() {
        let spec: CompilationSpec = toml::from_str(
            r#"
            steps = ["make install"]
            image = "alpine:3.19"

            [package]
            name = "a"
            category = "app"
            version = "1.0"
            "#,
        )
        .unwrap();
        assert_eq!(spec.build.steps, vec!["make install"]);
        assert!(spec.has_image());
        assert!(!spec.unpack);
    }
}
