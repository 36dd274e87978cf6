// src/compiler/hashtree.rs

//! Image hash tree: reproducible identifiers for a compilation target
//!
//! A query resolves the target's dependency tree, hashes every member's
//! compilation spec into a salt, and computes BuildHash/PackageHash for
//! each member over its own sub-solution. From those it derives the
//! builder image tag of every dependency and of the target itself.
//!
//! Unchanged dependency graphs and unchanged specs produce identical
//! identifiers, which is what lets a build backend reuse cached images.

use super::{CompilationSpec, Compiler};
use crate::assertions::{PackageAssert, PackageHash, PackagesAssertions, Salts};
use crate::error::{Error, Result};
use crate::hash::Hasher;
use crate::package::{Package, PackageCatalog};
use crate::solver::SolverOptions;
use rayon::prelude::*;
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{debug, info};

/// Computes [`PackageImageHashTree`]s against a catalog
pub struct ImageHashTree<'c> {
    catalog: &'c dyn PackageCatalog,
    options: SolverOptions,
}

impl<'c> ImageHashTree<'c> {
    pub fn new(catalog: &'c dyn PackageCatalog) -> Self {
        Self {
            catalog,
            options: SolverOptions::default(),
        }
    }

    /// Parallelism used for spec and subtree hashing
    pub fn with_options(mut self, options: SolverOptions) -> Self {
        self.options = options;
        self
    }

    /// Resolve and hash the full tree of `spec`
    pub fn query(
        &self,
        compiler: &dyn Compiler,
        spec: &CompilationSpec,
    ) -> Result<PackageImageHashTree> {
        let target_fp = spec.fingerprint();
        let tree = compiler.compute_dep_tree(spec, self.catalog)?;
        let selected: Vec<&PackageAssert> = tree.selected().collect();
        let pool = self.options.thread_pool()?;

        // spec hash of every member, plus whether it pins an external image
        let specs: BTreeMap<String, (String, bool)> = pool.install(|| {
            selected
                .par_iter()
                .map(|assertion| -> Result<(String, (String, bool))> {
                    let fp = assertion.fingerprint();
                    let member = if fp == target_fp {
                        spec.clone()
                    } else {
                        compiler.from_package(&assertion.package)?
                    };
                    Ok((fp, (member.hash()?, member.has_image())))
                })
                .collect::<Result<_>>()
        })?;
        let salts: Salts = specs
            .iter()
            .map(|(fp, (hash, _))| (fp.clone(), hash.clone()))
            .collect();

        let hashes: BTreeMap<String, PackageHash> = pool.install(|| {
            selected
                .par_iter()
                .map(|assertion| -> Result<(String, PackageHash)> {
                    let fp = assertion.fingerprint();
                    let hash = tree.package_hash(&fp, &salts)?;
                    Ok((fp, hash))
                })
                .collect::<Result<_>>()
        })?;

        let solution: PackagesAssertions = tree
            .iter()
            .map(|assertion| {
                let mut assertion = assertion.clone();
                if let Some(hash) = hashes.get(&assertion.fingerprint()) {
                    assertion.hash = hash.clone();
                }
                assertion
            })
            .collect();

        let target = solution.search(&target_fp).cloned().ok_or_else(|| {
            Error::InvariantViolation(format!(
                "{} is missing from its own dependency tree",
                target_fp
            ))
        })?;

        let dependencies: PackagesAssertions = solution
            .selected()
            .filter(|a| a.fingerprint() != target_fp)
            .cloned()
            .collect();

        let mut dependency_images = BTreeMap::new();
        for dependency in &dependencies {
            let fp = dependency.fingerprint();
            let hash = hashes.get(&fp).ok_or_else(|| {
                Error::InvariantViolation(format!("no hash computed for dependency {}", fp))
            })?;
            let explicit_image = specs.get(&fp).is_some_and(|(_, image)| *image);
            let tag = if explicit_image {
                hash.build_hash.clone()
            } else {
                builder_tag(&fp, &target.hash.package_hash)
            };
            debug!("Builder image of {} is {}", fp, tag);
            dependency_images.insert(fp, tag);
        }

        let builder_image_hash = builder_tag(&target_fp, &target.hash.package_hash);
        let source_hash = dependencies
            .as_slice()
            .last()
            .map(|a| a.hash.package_hash.clone());

        info!(
            "Hashed {} with {} dependencies",
            target_fp,
            dependencies.len()
        );

        Ok(PackageImageHashTree {
            target,
            dependencies,
            solution,
            dependency_images,
            source_hash,
            builder_image_hash,
        })
    }
}

/// `builder-` tag of a package, salted with a PackageHash
pub fn builder_tag(fingerprint: &str, salt: &str) -> String {
    let mut hasher = Hasher::with_domain("builder");
    hasher.field("package", fingerprint).field("salt", salt);
    format!("builder-{}", hasher.finalize())
}

/// Result of an [`ImageHashTree`] query
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PackageImageHashTree {
    target: PackageAssert,
    dependencies: PackagesAssertions,
    solution: PackagesAssertions,
    dependency_images: BTreeMap<String, String>,
    source_hash: Option<String>,
    builder_image_hash: String,
}

impl PackageImageHashTree {
    /// The target's assertion, hashes included
    pub fn target(&self) -> &PackageAssert {
        &self.target
    }

    /// Selected dependencies in build order, target excluded
    pub fn dependencies(&self) -> &PackagesAssertions {
        &self.dependencies
    }

    /// The full ordered and hashed solution
    pub fn solution(&self) -> &PackagesAssertions {
        &self.solution
    }

    /// PackageHash of the last dependency in build order
    pub fn source_hash(&self) -> Option<&str> {
        self.source_hash.as_deref()
    }

    pub fn builder_image_hash(&self) -> &str {
        &self.builder_image_hash
    }

    /// Builder image tag of a dependency
    pub fn dependency_build_image(&self, package: &Package) -> Result<String> {
        let fp = package.fingerprint();
        if self.dependencies.search(&fp).is_none() {
            return Err(Error::Lookup(format!(
                "{} is not a dependency of {}",
                fp,
                self.target.fingerprint()
            )));
        }
        self.dependency_images
            .get(&fp)
            .cloned()
            .ok_or_else(|| Error::InvariantViolation(format!("no builder image for {}", fp)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_tag_shape() {
        let tag = builder_tag("app/a@1.0", "salt");
        assert!(tag.starts_with("builder-"));
        assert_eq!(tag.len(), "builder-".len() + crate::hash::HEX_LEN);
        assert_ne!(tag, builder_tag("app/a@1.0", "other"));
    }
}
