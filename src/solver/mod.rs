// src/solver/mod.rs

//! SAT-backed dependency solver
//!
//! The solver turns a request (install, uninstall, upgrade) against a
//! catalog of package definitions and a catalog of installed packages into
//! a consistent set of [`PackageAssert`] decisions.
//!
//! # Pipeline
//!
//! 1. [`encode`]: every reachable package becomes a variable, relations
//!    become clauses tagged with their origin
//! 2. [`sat`]: a [`ConstraintSolver`] decides the clauses
//! 3. [`resolver`]: if there is no solution, a [`PackageResolver`] either
//!    explains the conflict or relaxes the request
//!
//! The solver never mutates its catalogs, so one instance may serve
//! concurrent callers.

pub mod encode;
pub mod explain;
pub mod resolver;
pub mod sat;

pub use encode::{Clause, ClauseOrigin, Formula, Literal};
pub use explain::{Explanation, minimal_unsatisfiable_subset};
pub use resolver::{Explainer, GreedyRelaxation, PackageResolver, ResolverKind, StrictFail};
pub use sat::{ConstraintSolver, Dpll};

use crate::assertions::{PackageAssert, PackagesAssertions};
use crate::error::{Error, Result};
use crate::package::{InMemoryCatalog, Package, PackageCatalog, PackageSelector};
use encode::Encoder;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::Arc;
use tracing::{debug, info};

/// Tuning knobs for the solver
///
/// `concurrency` only sizes the thread pools of parallel searches; it never
/// changes a result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverOptions {
    pub concurrency: usize,
    pub resolver: ResolverKind,
}

impl Default for SolverOptions {
    fn default() -> Self {
        Self {
            concurrency: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
            resolver: ResolverKind::default(),
        }
    }
}

impl SolverOptions {
    pub fn validate(&self) -> Result<()> {
        if self.concurrency == 0 {
            return Err(Error::Config("concurrency must be at least 1".to_string()));
        }
        Ok(())
    }

    /// A rayon pool sized by `concurrency`
    pub fn thread_pool(&self) -> Result<rayon::ThreadPool> {
        self.validate()?;
        rayon::ThreadPoolBuilder::new()
            .num_threads(self.concurrency)
            .build()
            .map_err(|e| Error::Config(format!("failed to build thread pool: {}", e)))
    }
}

/// Raw solver input
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Request {
    /// Packages that must be selected
    pub install: Vec<Package>,
    /// Packages that must not be selected
    pub remove: Vec<Package>,
    /// Assert every installed package (except removals) as selected
    pub assume_installed: bool,
}

impl Request {
    /// Install `packages` on top of the installed set
    pub fn new(install: Vec<Package>) -> Self {
        Self {
            install,
            remove: Vec::new(),
            assume_installed: true,
        }
    }
}

/// Dependency solver over a definitions catalog and an installed catalog
pub struct Solver<'a> {
    definitions: &'a dyn PackageCatalog,
    installed: &'a dyn PackageCatalog,
    backend: Arc<dyn ConstraintSolver>,
    resolver: Option<Arc<dyn PackageResolver>>,
    options: SolverOptions,
}

impl<'a> Solver<'a> {
    /// Create a solver with the embedded backend and no resolver
    ///
    /// Without a resolver an unsatisfiable request fails with a decoded
    /// explanation.
    pub fn new(definitions: &'a dyn PackageCatalog, installed: &'a dyn PackageCatalog) -> Self {
        Self {
            definitions,
            installed,
            backend: Arc::new(Dpll),
            resolver: None,
            options: SolverOptions::default(),
        }
    }

    /// Create a solver configured by `options`, including its resolver
    pub fn with_options(
        definitions: &'a dyn PackageCatalog,
        installed: &'a dyn PackageCatalog,
        options: SolverOptions,
    ) -> Self {
        let mut solver = Self::new(definitions, installed);
        solver.resolver = Some(options.resolver.build());
        solver.options = options;
        solver
    }

    /// Replace the constraint solving backend
    pub fn with_backend(mut self, backend: Arc<dyn ConstraintSolver>) -> Self {
        self.backend = backend;
        self
    }

    /// Install a fallback strategy for unsatisfiable requests
    pub fn set_resolver(&mut self, resolver: Arc<dyn PackageResolver>) {
        self.resolver = Some(resolver);
    }

    pub fn backend(&self) -> &dyn ConstraintSolver {
        self.backend.as_ref()
    }

    pub fn options(&self) -> &SolverOptions {
        &self.options
    }

    pub fn definitions(&self) -> &'a dyn PackageCatalog {
        self.definitions
    }

    pub fn installed(&self) -> &'a dyn PackageCatalog {
        self.installed
    }

    /// Same configuration over different catalogs
    fn derive<'b>(
        &self,
        definitions: &'b dyn PackageCatalog,
        installed: &'b dyn PackageCatalog,
    ) -> Solver<'b> {
        Solver {
            definitions,
            installed,
            backend: Arc::clone(&self.backend),
            resolver: self.resolver.clone(),
            options: self.options.clone(),
        }
    }

    /// Encode a request without solving it
    pub fn encode(&self, request: &Request) -> Result<Formula> {
        Encoder::new(self.definitions, self.installed).encode(request)
    }

    fn decide(&self, formula: &Formula) -> Option<PackagesAssertions> {
        let model = self.backend.solve(formula.num_vars(), formula.clauses())?;
        Some(
            model
                .into_iter()
                .enumerate()
                .map(|(var, value)| PackageAssert::new(formula.package(var).clone(), value))
                .collect(),
        )
    }

    /// Solve a request without consulting the resolver
    pub fn try_solve(&self, request: &Request) -> Result<PackagesAssertions> {
        let formula = self.encode(request)?;
        self.decide(&formula).ok_or_else(|| Error::Unsatisfiable {
            explanation: "no solution satisfies the request".to_string(),
        })
    }

    /// Solve a request, falling back to the resolver when unsatisfiable
    pub fn solve(&self, request: &Request) -> Result<PackagesAssertions> {
        let formula = self.encode(request)?;
        if let Some(assertions) = self.decide(&formula) {
            return Ok(assertions);
        }

        debug!("Request is unsatisfiable, consulting resolver");
        match &self.resolver {
            Some(resolver) => resolver.resolve(self, request, &formula),
            None => Explainer.resolve(self, request, &formula),
        }
    }

    /// Preferred package for a selector, definitions first
    fn lookup(&self, selector: &PackageSelector) -> Result<Package> {
        self.definitions
            .find_package_candidate(selector)
            .or_else(|| self.installed.find_package_candidate(selector))
            .cloned()
            .ok_or_else(|| Error::Lookup(format!("no package matches {}", selector)))
    }

    /// Install `selectors` on top of the installed set
    ///
    /// Returns one assertion per reached package: the requested packages,
    /// their transitive requirements and the installed packages.
    pub fn install(&self, selectors: &[PackageSelector]) -> Result<PackagesAssertions> {
        let packages = selectors
            .iter()
            .map(|s| self.lookup(s))
            .collect::<Result<Vec<_>>>()?;
        self.install_packages(packages)
    }

    /// Install concrete packages on top of the installed set
    pub fn install_packages(&self, packages: Vec<Package>) -> Result<PackagesAssertions> {
        let requested = packages.len();
        let assertions = self.solve(&Request::new(packages))?;
        info!(
            "Resolved {} requested packages to {} selected",
            requested,
            assertions.selected().count()
        );
        Ok(assertions)
    }

    /// Packages that must be removed to uninstall `candidates`
    ///
    /// With `full`, installed dependencies of the candidates that nothing
    /// else still requires are removed too. With `check_conflicts`, the
    /// call fails if a package that stays installed still needs a
    /// candidate.
    pub fn uninstall(
        &self,
        check_conflicts: bool,
        full: bool,
        candidates: &[PackageSelector],
    ) -> Result<Vec<Package>> {
        let targets = candidates
            .iter()
            .map(|s| {
                self.installed
                    .find_package_candidate(s)
                    .cloned()
                    .ok_or_else(|| Error::Lookup(format!("{} is not installed", s)))
            })
            .collect::<Result<Vec<_>>>()?;

        let mut removal: BTreeMap<String, Package> =
            targets.iter().map(|p| (p.fingerprint(), p.clone())).collect();

        if full {
            for package in self.installed_closure(&targets) {
                removal.entry(package.fingerprint()).or_insert(package);
            }
            self.retain_still_required(&mut removal, &targets);
        }

        if check_conflicts {
            let keep: Vec<Package> = self
                .installed
                .world()
                .into_iter()
                .filter(|p| !removal.contains_key(&p.fingerprint()))
                .cloned()
                .collect();
            let empty = InMemoryCatalog::new();
            let installed_only = self.derive(self.installed, &empty);

            for target in &targets {
                if installed_only.conflicts_with(target, &keep)? {
                    let blockers: Vec<String> = self
                        .installed
                        .get_revdeps(target)
                        .into_iter()
                        .map(|p| p.fingerprint())
                        .filter(|fp| !removal.contains_key(fp))
                        .collect();
                    return Err(Error::Unsatisfiable {
                        explanation: format!(
                            "cannot remove {}: required by {}",
                            target.fingerprint(),
                            blockers.join(", ")
                        ),
                    });
                }
            }
        }

        info!("Uninstall removes {} packages", removal.len());
        Ok(removal.into_values().collect())
    }

    /// Installed packages reachable through requirements of `roots`
    fn installed_closure(&self, roots: &[Package]) -> Vec<Package> {
        let mut seen: BTreeSet<String> = roots.iter().map(|p| p.fingerprint()).collect();
        let mut queue: VecDeque<Package> = roots.iter().cloned().collect();
        let mut closure = Vec::new();

        while let Some(package) = queue.pop_front() {
            for requirement in &package.requires {
                for dep in self.installed.find_packages(requirement) {
                    if seen.insert(dep.fingerprint()) {
                        closure.push(dep.clone());
                        queue.push_back(dep.clone());
                    }
                }
            }
        }

        closure
    }

    /// Keep closure members that a staying package still depends on
    fn retain_still_required(&self, removal: &mut BTreeMap<String, Package>, targets: &[Package]) {
        let targets: BTreeSet<String> = targets.iter().map(|p| p.fingerprint()).collect();
        loop {
            let staying: Vec<&Package> = self
                .installed
                .world()
                .into_iter()
                .filter(|p| !removal.contains_key(&p.fingerprint()))
                .collect();

            let needed: Vec<String> = removal
                .iter()
                .filter(|(fp, package)| {
                    !targets.contains(*fp) && staying.iter().any(|s| s.depends_on(package))
                })
                .map(|(fp, _)| fp.clone())
                .collect();

            if needed.is_empty() {
                return;
            }
            for fp in needed {
                removal.remove(&fp);
            }
        }
    }

    /// Whether removing `package` breaks `set`
    ///
    /// True when selecting every other member of `set` is satisfiable but
    /// becomes unsatisfiable once `package` is forbidden.
    pub fn conflicts_with(&self, package: &Package, set: &[Package]) -> Result<bool> {
        let fp = package.fingerprint();
        let others: Vec<Package> = set
            .iter()
            .filter(|p| p.fingerprint() != fp)
            .cloned()
            .collect();

        let baseline = Request {
            install: others.clone(),
            remove: Vec::new(),
            assume_installed: false,
        };
        if self.decide(&self.encode(&baseline)?).is_none() {
            return Ok(false);
        }

        let without = Request {
            install: others,
            remove: vec![package.clone()],
            assume_installed: false,
        };
        Ok(self.decide(&self.encode(&without)?).is_none())
    }

    /// Whether removing `package` breaks the installed set
    pub fn conflicts_with_installed(&self, package: &Package) -> Result<bool> {
        let installed: Vec<Package> = self.installed.world().into_iter().cloned().collect();
        let empty = InMemoryCatalog::new();
        self.derive(self.installed, &empty)
            .conflicts_with(package, &installed)
    }

    /// Whether some member of `set` transitively depends on `package`
    pub fn conflicts(&self, package: &Package, set: &[Package]) -> bool {
        let catalog = InMemoryCatalog::from_packages(set.iter().cloned());
        !catalog.get_revdeps(package).is_empty()
    }

    /// Newer replacement for an installed package
    ///
    /// A higher version of the same package wins; if the package vanished
    /// from the definitions, a package that now provides it replaces it.
    fn replacement_for(&self, package: &Package) -> Option<&'a Package> {
        let definitions = self.definitions;
        let versions = definitions.find_package_versions(&package.category, &package.name);
        if let Some(newest) = versions.first() {
            return (newest.version > package.version).then_some(*newest);
        }

        let selector = PackageSelector::any(&package.category, &package.name);
        definitions
            .find_providers(&selector)
            .into_iter()
            .find(|p| p.fingerprint() != package.fingerprint())
    }

    /// Upgrade installed packages to their newest definitions
    ///
    /// Returns the packages removed and the assertions of the new install.
    pub fn upgrade(
        &self,
        check_conflicts: bool,
        full: bool,
    ) -> Result<(Vec<Package>, PackagesAssertions)> {
        let mut outdated = Vec::new();
        let mut replacements = Vec::new();
        for package in self.installed.world() {
            if let Some(newer) = self.replacement_for(package) {
                debug!("{} is replaced by {}", package, newer);
                outdated.push(package.selector());
                replacements.push(newer.clone());
            }
        }

        if outdated.is_empty() {
            info!("All installed packages are up to date");
            return Ok((Vec::new(), PackagesAssertions::default()));
        }

        let removed = self.uninstall(false, full, &outdated)?;
        let removed_fps: BTreeSet<String> = removed.iter().map(|p| p.fingerprint()).collect();
        let remaining = InMemoryCatalog::from_packages(
            self.installed
                .world()
                .into_iter()
                .filter(|p| !removed_fps.contains(&p.fingerprint()))
                .cloned(),
        );

        let upgraded = self.derive(self.definitions, &remaining);
        let assertions = upgraded.solve(&Request {
            install: replacements,
            remove: Vec::new(),
            assume_installed: check_conflicts,
        })?;

        info!("Upgrade replaces {} packages", removed.len());
        Ok((removed, assertions))
    }

    /// Recompute the whole installed universe against the definitions
    ///
    /// Outdated packages are swapped for their replacements in one formula.
    /// With `drop_removed`, installed packages that vanished from the
    /// definitions without a provider are forbidden too. Returns the
    /// installed packages the solution rejects and the full assertions.
    pub fn upgrade_universe(
        &self,
        drop_removed: bool,
    ) -> Result<(Vec<Package>, PackagesAssertions)> {
        let mut request = Request::new(Vec::new());
        for package in self.installed.world() {
            match self.replacement_for(package) {
                Some(newer) => {
                    request.remove.push(package.clone());
                    request.install.push(newer.clone());
                }
                None if drop_removed
                    && self
                        .definitions
                        .find_package_versions(&package.category, &package.name)
                        .is_empty() =>
                {
                    debug!("{} is no longer defined", package);
                    request.remove.push(package.clone());
                }
                None => {}
            }
        }

        let assertions = self.solve(&request)?;
        let marked: Vec<Package> = self
            .installed
            .world()
            .into_iter()
            .filter(|p| {
                assertions
                    .search(&p.fingerprint())
                    .is_some_and(|a| !a.value)
            })
            .cloned()
            .collect();

        info!(
            "Universe upgrade installs {} and removes {} packages",
            request.install.len(),
            marked.len()
        );
        Ok((marked, assertions))
    }
}
