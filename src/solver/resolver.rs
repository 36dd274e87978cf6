// src/solver/resolver.rs

//! Fallback strategies for unsatisfiable requests
//!
//! A [`PackageResolver`] is consulted only after the direct encoding of a
//! request turned out to be unsatisfiable.

use super::explain::Explanation;
use super::{Formula, Request, Solver};
use crate::assertions::PackagesAssertions;
use crate::error::{Error, Result};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use std::sync::Arc;
use tracing::{info, warn};

/// Strategy invoked when a request has no exact solution
pub trait PackageResolver: Send + Sync + Debug {
    fn resolve(
        &self,
        solver: &Solver<'_>,
        request: &Request,
        formula: &Formula,
    ) -> Result<PackagesAssertions>;
}

/// Fails with a generic message
#[derive(Debug, Clone, Copy, Default)]
pub struct StrictFail;

impl PackageResolver for StrictFail {
    fn resolve(
        &self,
        _solver: &Solver<'_>,
        _request: &Request,
        _formula: &Formula,
    ) -> Result<PackagesAssertions> {
        Err(Error::Unsatisfiable {
            explanation: "no solution satisfies the request".to_string(),
        })
    }
}

/// Fails with a decoded minimal unsatisfiable subset
#[derive(Debug, Clone, Copy, Default)]
pub struct Explainer;

impl PackageResolver for Explainer {
    fn resolve(
        &self,
        solver: &Solver<'_>,
        _request: &Request,
        formula: &Formula,
    ) -> Result<PackagesAssertions> {
        let explanation = Explanation::new(solver.backend(), formula);
        Err(Error::Unsatisfiable {
            explanation: explanation.to_string(),
        })
    }
}

/// Installs the largest satisfiable part of the request
///
/// Each round tries the request with one target left out, the least
/// recently added first; the first satisfiable attempt by position wins.
/// When no single omission helps, the least recently added target is
/// dropped for good and the next round starts. Every round shrinks the
/// target list, so the search terminates.
#[derive(Debug, Clone, Copy, Default)]
pub struct GreedyRelaxation;

impl PackageResolver for GreedyRelaxation {
    fn resolve(
        &self,
        solver: &Solver<'_>,
        request: &Request,
        formula: &Formula,
    ) -> Result<PackagesAssertions> {
        let pool = solver.options().thread_pool()?;
        let mut kept = request.install.clone();

        while !kept.is_empty() {
            let attempt = pool.install(|| {
                (0..kept.len()).into_par_iter().find_map_first(|skip| {
                    let mut trial = request.clone();
                    trial.install = kept
                        .iter()
                        .enumerate()
                        .filter(|&(i, _)| i != skip)
                        .map(|(_, p)| p.clone())
                        .collect();
                    solver.try_solve(&trial).ok().map(|found| (skip, found))
                })
            });

            if let Some((skip, assertions)) = attempt {
                warn!("Omitting {}: it cannot be installed with the rest of the request", kept[skip]);
                info!(
                    "Relaxed request to {} of {} packages",
                    kept.len() - 1,
                    request.install.len()
                );
                return Ok(assertions);
            }

            let dropped = kept.remove(0);
            warn!("Omitting {}: it cannot be installed with the rest of the request", dropped);
        }

        Explainer.resolve(solver, request, formula)
    }
}

/// Resolver selection for configuration files
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResolverKind {
    Strict,
    #[default]
    Explain,
    Greedy,
}

impl ResolverKind {
    pub fn build(self) -> Arc<dyn PackageResolver> {
        match self {
            Self::Strict => Arc::new(StrictFail),
            Self::Explain => Arc::new(Explainer),
            Self::Greedy => Arc::new(GreedyRelaxation),
        }
    }
}

impl std::str::FromStr for ResolverKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "strict" => Ok(Self::Strict),
            "explain" => Ok(Self::Explain),
            "greedy" => Ok(Self::Greedy),
            other => Err(Error::Config(format!("unknown resolver '{}'", other))),
        }
    }
}
