// src/lib.rs

//! Arbor dependency engine
//!
//! Dependency resolution and reproducible build planning for package trees.
//!
//! # Architecture
//!
//! - Solver: requests become a boolean constraint system, decided by a
//!   pluggable backend, with explanations or relaxation on failure
//! - Assertions: solutions are ordered depth-first and hashed so identical
//!   dependency graphs get identical identifiers
//! - Levels: build graphs are partitioned into levels that can be built in
//!   parallel
//! - Hash trees: per-package builder image tags derived from spec hashes and
//!   the hash chain of the dependency tree
//!
//! The library performs no I/O; catalogs and specs are handed in by the
//! caller.

pub mod assertions;
pub mod compiler;
pub mod config;
mod error;
pub mod hash;
pub mod package;
pub mod solver;
pub mod version;

pub use assertions::{PackageAssert, PackageHash, PackagesAssertions, Salts};
pub use compiler::{
    BuildInstructions, BuildLevels, CompilationSpec, Compiler, ImageHashTree, LevelGroup,
    PackageImageHashTree, SpecCompiler,
};
pub use config::{Config, LoggingConfig};
pub use error::{Error, Result};
pub use hash::Hasher;
pub use package::{InMemoryCatalog, Package, PackageCatalog, PackageSelector};
pub use solver::{
    ConstraintSolver, Dpll, PackageResolver, Request, ResolverKind, Solver, SolverOptions,
};
pub use version::{PackageVersion, VersionSelector};
