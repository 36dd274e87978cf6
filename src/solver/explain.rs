// src/solver/explain.rs

//! Conflict explanations from minimal unsatisfiable subsets
//!
//! The explanation is extracted by deletion: starting from every clause,
//! each clause is dropped in turn and kept out whenever the rest is still
//! unsatisfiable. What remains is minimal: removing any single clause makes
//! it satisfiable.

use super::encode::{Clause, Formula};
use super::sat::ConstraintSolver;
use std::fmt;
use tracing::debug;

/// Indices of a minimal unsatisfiable subset of `clauses`
///
/// Returns an empty list when the clauses are satisfiable.
pub fn minimal_unsatisfiable_subset(
    backend: &dyn ConstraintSolver,
    num_vars: usize,
    clauses: &[Clause],
) -> Vec<usize> {
    if backend.solve(num_vars, clauses).is_some() {
        return Vec::new();
    }

    let mut core: Vec<usize> = (0..clauses.len()).collect();
    let mut i = 0;
    while i < core.len() {
        let trial: Vec<Clause> = core
            .iter()
            .enumerate()
            .filter(|&(pos, _)| pos != i)
            .map(|(_, &idx)| clauses[idx].clone())
            .collect();

        if backend.solve(num_vars, &trial).is_none() {
            core.remove(i);
        } else {
            i += 1;
        }
    }

    debug!(
        "Reduced {} clauses to a core of {}",
        clauses.len(),
        core.len()
    );
    core
}

/// Decoded explanation of an unsatisfiable formula
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Explanation {
    lines: Vec<ExplanationLine>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct ExplanationLine {
    reason: String,
    clause: String,
}

impl Explanation {
    /// Explain why `formula` has no solution
    pub fn new(backend: &dyn ConstraintSolver, formula: &Formula) -> Self {
        let core = minimal_unsatisfiable_subset(backend, formula.num_vars(), formula.clauses());
        let lines = core
            .into_iter()
            .map(|idx| {
                let clause = &formula.clauses()[idx];
                ExplanationLine {
                    reason: clause.origin.to_string(),
                    clause: formula.render(clause),
                }
            })
            .collect();
        Self { lines }
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Human-readable reasons, one per clause in the core
    pub fn reasons(&self) -> impl Iterator<Item = &str> {
        self.lines.iter().map(|line| line.reason.as_str())
    }
}

impl fmt::Display for Explanation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.lines.is_empty() {
            return write!(f, "no conflicting constraints found");
        }
        writeln!(f, "conflicting constraints:")?;
        for (i, line) in self.lines.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "  - {} {}", line.reason, line.clause)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::solver::encode::{ClauseOrigin, Literal};
    use crate::solver::sat::Dpll;

    fn clause(literals: Vec<Literal>, tag: &str) -> Clause {
        Clause::new(
            literals,
            ClauseOrigin::Requested {
                package: tag.to_string(),
            },
        )
    }

    #[test]
    fn test_core_drops_irrelevant_clauses() {
        let clauses = vec![
            clause(vec![Literal::pos(0)], "a"),
            clause(vec![Literal::pos(2)], "unrelated"),
            clause(vec![Literal::neg(0), Literal::pos(1)], "a->b"),
            clause(vec![Literal::neg(1)], "not b"),
        ];
        let core = minimal_unsatisfiable_subset(&Dpll, 3, &clauses);
        assert_eq!(core, vec![0, 2, 3]);
    }

    #[test]
    fn test_satisfiable_has_empty_core() {
        let clauses = vec![clause(vec![Literal::pos(0)], "a")];
        assert!(minimal_unsatisfiable_subset(&Dpll, 1, &clauses).is_empty());
    }
}
