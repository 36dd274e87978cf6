// src/solver/encode.rs

//! CNF encoding of a solver request
//!
//! Every concrete package reachable from the request becomes one boolean
//! variable. Relations become clauses:
//!
//! | Relation | Clause |
//! |----------|--------|
//! | `p` requested | `p` |
//! | `p` installed (and not being removed) | `p` |
//! | `p` being removed | `!p` |
//! | `p` requires `s`, candidates `c1..cn` | `!p | c1 | ... | cn` |
//! | `p` requires `s`, no candidate | `!p` |
//! | `p` conflicts with `q` | `!p | !q` |
//! | `p`, `q` versions of the same package | `!p | !q` |
//!
//! Each clause remembers where it came from so an unsatisfiable core can be
//! explained in package names.

use super::Request;
use crate::error::Result;
use crate::package::{Package, PackageCatalog, PackageSelector};
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::fmt;
use tracing::debug;

/// A possibly negated variable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Literal {
    pub var: usize,
    pub positive: bool,
}

impl Literal {
    pub fn pos(var: usize) -> Self {
        Self { var, positive: true }
    }

    pub fn neg(var: usize) -> Self {
        Self {
            var,
            positive: false,
        }
    }

    pub fn negate(self) -> Self {
        Self {
            var: self.var,
            positive: !self.positive,
        }
    }
}

/// The relation a clause was derived from, in package names
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClauseOrigin {
    Requested {
        package: String,
    },
    Installed {
        package: String,
    },
    Removed {
        package: String,
    },
    Requires {
        package: String,
        selector: String,
        candidates: Vec<String>,
    },
    Missing {
        package: String,
        selector: String,
    },
    Conflicts {
        package: String,
        other: String,
    },
    SingleVersion {
        first: String,
        second: String,
    },
}

impl fmt::Display for ClauseOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Requested { package } => write!(f, "{} is requested", package),
            Self::Installed { package } => write!(f, "{} is installed", package),
            Self::Removed { package } => write!(f, "{} is marked for removal", package),
            Self::Requires {
                package,
                selector,
                candidates,
            } => write!(
                f,
                "{} requires {} (satisfied by {})",
                package,
                selector,
                candidates.join(" or ")
            ),
            Self::Missing { package, selector } => write!(
                f,
                "{} requires {}, which no known package provides",
                package, selector
            ),
            Self::Conflicts { package, other } => {
                write!(f, "{} conflicts with {}", package, other)
            }
            Self::SingleVersion { first, second } => write!(
                f,
                "{} and {} are versions of the same package",
                first, second
            ),
        }
    }
}

/// A disjunction of literals
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Clause {
    pub literals: Vec<Literal>,
    pub origin: ClauseOrigin,
}

impl Clause {
    pub fn new(literals: Vec<Literal>, origin: ClauseOrigin) -> Self {
        Self { literals, origin }
    }
}

/// An encoded request: variables mapped to packages plus the clause list
#[derive(Debug, Clone, Default)]
pub struct Formula {
    packages: Vec<Package>,
    index: HashMap<String, usize>,
    clauses: Vec<Clause>,
}

impl Formula {
    pub fn num_vars(&self) -> usize {
        self.packages.len()
    }

    /// Package behind a variable
    pub fn package(&self, var: usize) -> &Package {
        &self.packages[var]
    }

    pub fn packages(&self) -> &[Package] {
        &self.packages
    }

    /// Variable of a fingerprint, if it was reached
    pub fn var_of(&self, fingerprint: &str) -> Option<usize> {
        self.index.get(fingerprint).copied()
    }

    pub fn clauses(&self) -> &[Clause] {
        &self.clauses
    }

    /// Render a clause as a boolean disjunction of fingerprints
    pub fn render(&self, clause: &Clause) -> String {
        let literals: Vec<String> = clause
            .literals
            .iter()
            .map(|lit| {
                let fp = self.packages[lit.var].fingerprint();
                if lit.positive { fp } else { format!("!{}", fp) }
            })
            .collect();
        format!("({})", literals.join(" | "))
    }

    fn intern(&mut self, package: &Package) -> (usize, bool) {
        let fp = package.fingerprint();
        if let Some(&var) = self.index.get(&fp) {
            return (var, false);
        }
        let var = self.packages.len();
        self.packages.push(package.clone());
        self.index.insert(fp, var);
        (var, true)
    }

    fn push(&mut self, literals: Vec<Literal>, origin: ClauseOrigin) {
        self.clauses.push(Clause::new(literals, origin));
    }
}

/// Builds a [`Formula`] from a request against two catalogs
pub(crate) struct Encoder<'a> {
    definitions: &'a dyn PackageCatalog,
    installed: &'a dyn PackageCatalog,
    formula: Formula,
    pending: VecDeque<usize>,
}

impl<'a> Encoder<'a> {
    pub(crate) fn new(
        definitions: &'a dyn PackageCatalog,
        installed: &'a dyn PackageCatalog,
    ) -> Self {
        Self {
            definitions,
            installed,
            formula: Formula::default(),
            pending: VecDeque::new(),
        }
    }

    /// Packages answering `selector`, definitions first, without duplicates
    pub(crate) fn candidates(&self, selector: &PackageSelector) -> Vec<&'a Package> {
        let (definitions, installed) = (self.definitions, self.installed);
        let mut seen = HashSet::new();
        definitions
            .find_packages(selector)
            .into_iter()
            .chain(installed.find_packages(selector))
            .filter(|p| seen.insert(p.fingerprint()))
            .collect()
    }

    fn reach(&mut self, package: &Package) -> usize {
        let (var, fresh) = self.formula.intern(package);
        if fresh {
            self.pending.push_back(var);
        }
        var
    }

    pub(crate) fn encode(mut self, request: &Request) -> Result<Formula> {
        let removed: HashSet<String> = request.remove.iter().map(|p| p.fingerprint()).collect();

        for package in &request.install {
            let var = self.reach(package);
            self.formula.push(
                vec![Literal::pos(var)],
                ClauseOrigin::Requested {
                    package: package.fingerprint(),
                },
            );
        }

        for package in &request.remove {
            let var = self.reach(package);
            self.formula.push(
                vec![Literal::neg(var)],
                ClauseOrigin::Removed {
                    package: package.fingerprint(),
                },
            );
        }

        if request.assume_installed {
            let installed = self.installed;
            for package in installed.world() {
                let fp = package.fingerprint();
                if removed.contains(&fp) {
                    continue;
                }
                let var = self.reach(package);
                self.formula
                    .push(vec![Literal::pos(var)], ClauseOrigin::Installed { package: fp });
            }
        }

        while let Some(var) = self.pending.pop_front() {
            self.expand_requires(var);
        }

        self.encode_conflicts();
        self.encode_single_version();

        debug!(
            "Encoded request: {} variables, {} clauses",
            self.formula.num_vars(),
            self.formula.clauses.len()
        );

        Ok(self.formula)
    }

    fn expand_requires(&mut self, var: usize) {
        let package = self.formula.packages[var].clone();
        let fp = package.fingerprint();

        for requirement in &package.requires {
            let candidates = self.candidates(requirement);
            if candidates.is_empty() {
                self.formula.push(
                    vec![Literal::neg(var)],
                    ClauseOrigin::Missing {
                        package: fp.clone(),
                        selector: requirement.to_string(),
                    },
                );
                continue;
            }

            let mut literals = vec![Literal::neg(var)];
            let mut names = Vec::with_capacity(candidates.len());
            for candidate in candidates {
                literals.push(Literal::pos(self.reach(candidate)));
                names.push(candidate.fingerprint());
            }
            self.formula.push(
                literals,
                ClauseOrigin::Requires {
                    package: fp.clone(),
                    selector: requirement.to_string(),
                    candidates: names,
                },
            );
        }
    }

    /// Conflicts only constrain packages that are already variables
    fn encode_conflicts(&mut self) {
        let mut seen: HashSet<(usize, usize)> = HashSet::new();
        let mut clauses = Vec::new();

        for (var, package) in self.formula.packages.iter().enumerate() {
            for selector in &package.conflicts {
                for (other, candidate) in self.formula.packages.iter().enumerate() {
                    if other == var || !candidate.satisfies(selector) {
                        continue;
                    }
                    if seen.insert((var.min(other), var.max(other))) {
                        clauses.push(Clause::new(
                            vec![Literal::neg(var), Literal::neg(other)],
                            ClauseOrigin::Conflicts {
                                package: package.fingerprint(),
                                other: candidate.fingerprint(),
                            },
                        ));
                    }
                }
            }
        }

        self.formula.clauses.extend(clauses);
    }

    fn encode_single_version(&mut self) {
        let mut by_key: BTreeMap<String, Vec<usize>> = BTreeMap::new();
        for (var, package) in self.formula.packages.iter().enumerate() {
            by_key.entry(package.key()).or_default().push(var);
        }

        for vars in by_key.values() {
            for (i, &first) in vars.iter().enumerate() {
                for &second in &vars[i + 1..] {
                    let origin = ClauseOrigin::SingleVersion {
                        first: self.formula.packages[first].fingerprint(),
                        second: self.formula.packages[second].fingerprint(),
                    };
                    self.formula
                        .push(vec![Literal::neg(first), Literal::neg(second)], origin);
                }
            }
        }
    }
}
