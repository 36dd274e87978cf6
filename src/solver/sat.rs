// src/solver/sat.rs

//! Boolean satisfiability backends
//!
//! The encoder only produces clauses; deciding them is the job of a
//! [`ConstraintSolver`]. [`Dpll`] is the embedded backend: unit propagation
//! over two watched literals, first-UIP clause learning and non-chronological
//! backjumping.
//!
//! Decisions only ever set a variable to true, and only to answer a clause
//! whose remaining free literals are all positive, such as the requirement
//! of a package that is already selected. The first free literal of the
//! first such clause wins, so the candidate order chosen by the encoder is
//! the preference order. When no clause needs a positive choice every
//! remaining variable is set to false, which satisfies the rest: nothing is
//! installed that is not needed.

use super::encode::{Clause, Literal};

/// Decides a clause set over `num_vars` variables
pub trait ConstraintSolver: Send + Sync {
    /// A satisfying assignment, or `None` when the clauses are unsatisfiable
    fn solve(&self, num_vars: usize, clauses: &[Clause]) -> Option<Vec<bool>>;
}

/// Embedded conflict-driven solver
#[derive(Debug, Clone, Copy, Default)]
pub struct Dpll;

impl ConstraintSolver for Dpll {
    fn solve(&self, num_vars: usize, clauses: &[Clause]) -> Option<Vec<bool>> {
        Search::new(num_vars, clauses).run()
    }
}

/// Index of a literal in the watch lists
fn code(literal: Literal) -> usize {
    literal.var * 2 + usize::from(literal.positive)
}

fn value_of(assignment: &[Option<bool>], literal: Literal) -> Option<bool> {
    assignment[literal.var].map(|v| v == literal.positive)
}

/// Outcome of visiting a clause whose watched literal became false
enum Watch {
    Kept,
    Moved,
    Unit(Literal),
    Conflict,
}

struct Search<'a> {
    input: &'a [Clause],
    /// Input clauses followed by learned ones; the first two literals are watched
    clauses: Vec<Vec<Literal>>,
    watches: Vec<Vec<usize>>,
    assignment: Vec<Option<bool>>,
    level: Vec<usize>,
    reason: Vec<Option<usize>>,
    trail: Vec<Literal>,
    /// Trail length at the start of each decision level
    levels: Vec<usize>,
    head: usize,
}

impl<'a> Search<'a> {
    fn new(num_vars: usize, input: &'a [Clause]) -> Self {
        Self {
            input,
            clauses: Vec::with_capacity(input.len()),
            watches: vec![Vec::new(); num_vars * 2],
            assignment: vec![None; num_vars],
            level: vec![0; num_vars],
            reason: vec![None; num_vars],
            trail: Vec::new(),
            levels: Vec::new(),
            head: 0,
        }
    }

    fn value(&self, literal: Literal) -> Option<bool> {
        value_of(&self.assignment, literal)
    }

    fn enqueue(&mut self, literal: Literal, reason: Option<usize>) {
        self.assignment[literal.var] = Some(literal.positive);
        self.level[literal.var] = self.levels.len();
        self.reason[literal.var] = reason;
        self.trail.push(literal);
    }

    /// Copy the input clauses and queue the units; false on a trivial conflict
    fn load(&mut self) -> bool {
        let input = self.input;
        for (idx, clause) in input.iter().enumerate() {
            let mut literals: Vec<Literal> = Vec::with_capacity(clause.literals.len());
            for &literal in &clause.literals {
                if !literals.contains(&literal) {
                    literals.push(literal);
                }
            }

            match literals.as_slice() {
                [] => return false,
                [unit] => match self.value(*unit) {
                    Some(false) => return false,
                    Some(true) => {}
                    None => self.enqueue(*unit, Some(idx)),
                },
                [first, second, ..] => {
                    self.watches[code(*first)].push(idx);
                    self.watches[code(*second)].push(idx);
                }
            }
            self.clauses.push(literals);
        }
        true
    }

    /// Propagate the trail to fixpoint; the falsified clause on conflict
    fn propagate(&mut self) -> Option<usize> {
        while self.head < self.trail.len() {
            let falsified = self.trail[self.head].negate();
            self.head += 1;

            let mut watchers = std::mem::take(&mut self.watches[code(falsified)]);
            let mut conflict = None;
            let mut i = 0;
            while i < watchers.len() {
                let idx = watchers[i];
                match self.rewatch(idx, falsified) {
                    Watch::Kept => i += 1,
                    Watch::Moved => {
                        watchers.swap_remove(i);
                    }
                    Watch::Unit(literal) => {
                        self.enqueue(literal, Some(idx));
                        i += 1;
                    }
                    Watch::Conflict => {
                        conflict = Some(idx);
                        break;
                    }
                }
            }
            self.watches[code(falsified)] = watchers;

            if conflict.is_some() {
                return conflict;
            }
        }
        None
    }

    fn rewatch(&mut self, idx: usize, falsified: Literal) -> Watch {
        let assignment = &self.assignment;
        let clause = &mut self.clauses[idx];
        if clause[0] == falsified {
            clause.swap(0, 1);
        }

        let other = clause[0];
        if value_of(assignment, other) == Some(true) {
            return Watch::Kept;
        }

        let replacement =
            (2..clause.len()).find(|&k| value_of(assignment, clause[k]) != Some(false));
        if let Some(k) = replacement {
            clause.swap(1, k);
            let watched = clause[1];
            self.watches[code(watched)].push(idx);
            return Watch::Moved;
        }

        match value_of(assignment, other) {
            None => Watch::Unit(other),
            _ => Watch::Conflict,
        }
    }

    /// First-UIP learned clause and the level to jump back to
    ///
    /// The asserting literal comes first, followed by the literal assigned
    /// at the jump level.
    fn analyze(&self, conflict: usize) -> (Vec<Literal>, usize) {
        let current = self.levels.len();
        let mut seen = vec![false; self.assignment.len()];
        let mut learned = Vec::new();
        let mut pending = 0usize;
        let mut index = self.trail.len();
        let mut clause = conflict;

        loop {
            for &literal in &self.clauses[clause] {
                let var = literal.var;
                if seen[var] || self.level[var] == 0 {
                    continue;
                }
                seen[var] = true;
                if self.level[var] == current {
                    pending += 1;
                } else {
                    learned.push(literal);
                }
            }

            let literal = loop {
                index -= 1;
                let literal = self.trail[index];
                if seen[literal.var] {
                    break literal;
                }
            };
            pending -= 1;

            match self.reason[literal.var] {
                Some(reason) if pending > 0 => clause = reason,
                _ => {
                    learned.insert(0, literal.negate());
                    break;
                }
            }
        }

        if let Some(pos) = (1..learned.len()).max_by_key(|&i| self.level[learned[i].var]) {
            learned.swap(1, pos);
        }
        let jump = learned.get(1).map_or(0, |l| self.level[l.var]);
        (learned, jump)
    }

    fn backjump(&mut self, level: usize) {
        let Some(&start) = self.levels.get(level) else {
            return;
        };
        for literal in self.trail.drain(start..) {
            self.assignment[literal.var] = None;
            self.reason[literal.var] = None;
        }
        self.levels.truncate(level);
        self.head = start;
    }

    fn learn(&mut self, learned: Vec<Literal>) {
        let Some(&asserting) = learned.first() else {
            return;
        };
        let idx = self.clauses.len();
        if let [first, second, ..] = learned.as_slice() {
            self.watches[code(*first)].push(idx);
            self.watches[code(*second)].push(idx);
        }
        self.clauses.push(learned);
        self.enqueue(asserting, Some(idx));
    }

    /// First free literal of the first input clause that needs a positive choice
    fn next_decision(&self) -> Option<Literal> {
        self.input.iter().find_map(|clause| {
            let mut choice = None;
            for &literal in &clause.literals {
                match self.value(literal) {
                    Some(true) => return None,
                    Some(false) => {}
                    None if literal.positive => {
                        choice.get_or_insert(literal);
                    }
                    None => return None,
                }
            }
            choice
        })
    }

    fn run(mut self) -> Option<Vec<bool>> {
        if !self.load() {
            return None;
        }

        loop {
            if let Some(conflict) = self.propagate() {
                if self.levels.is_empty() {
                    return None;
                }
                let (learned, level) = self.analyze(conflict);
                self.backjump(level);
                self.learn(learned);
                continue;
            }

            match self.next_decision() {
                Some(literal) => {
                    self.levels.push(self.trail.len());
                    self.enqueue(literal, None);
                }
                None => {
                    return Some(self.assignment.iter().map(|v| v.unwrap_or(false)).collect());
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::solver::encode::ClauseOrigin;

    fn clause(literals: &[(usize, bool)]) -> Clause {
        Clause::new(
            literals
                .iter()
                .map(|&(var, positive)| Literal { var, positive })
                .collect(),
            ClauseOrigin::Requested {
                package: "test".to_string(),
            },
        )
    }

    fn satisfies(model: &[bool], clauses: &[Clause]) -> bool {
        clauses.iter().all(|c| {
            c.literals
                .iter()
                .any(|lit| model[lit.var] == lit.positive)
        })
    }

    #[test]
    fn test_unit_propagation_chain() {
        // a, a -> b, b -> c
        let clauses = vec![
            clause(&[(0, true)]),
            clause(&[(0, false), (1, true)]),
            clause(&[(1, false), (2, true)]),
        ];
        let model = Dpll.solve(4, &clauses).unwrap();
        assert_eq!(model, vec![true, true, true, false]);
    }

    #[test]
    fn test_prefers_first_candidate() {
        // a, a -> (b | c)
        let clauses = vec![clause(&[(0, true)]), clause(&[(0, false), (1, true), (2, true)])];
        let model = Dpll.solve(3, &clauses).unwrap();
        assert_eq!(model, vec![true, true, false]);
    }

    #[test]
    fn test_backtracks_to_second_candidate() {
        // a, a -> (b | c), b -> d, !d
        let clauses = vec![
            clause(&[(0, true)]),
            clause(&[(0, false), (1, true), (2, true)]),
            clause(&[(1, false), (3, true)]),
            clause(&[(3, false)]),
        ];
        let model = Dpll.solve(4, &clauses).unwrap();
        assert_eq!(model, vec![true, false, true, false]);
        assert!(satisfies(&model, &clauses));
    }

    #[test]
    fn test_unneeded_implication_does_not_reject_preferred_candidate() {
        // p2 -> z and p1 -> z come first, a -> (p2 | p1) last
        let clauses = vec![
            clause(&[(2, false), (3, true)]),
            clause(&[(1, false), (3, true)]),
            clause(&[(0, true)]),
            clause(&[(0, false), (2, true), (1, true)]),
        ];
        let model = Dpll.solve(4, &clauses).unwrap();
        assert_eq!(model, vec![true, false, true, true]);
    }

    /// `a` needs one of two variables per choice, then one `s` and one `t`
    ///
    /// Every `s` excludes `t1`, and `s1` also excludes `t2`.
    fn choices_then_conflict(choices: usize, s2_excludes_t2: bool) -> (usize, Vec<Clause>) {
        let s = 1 + choices * 2;
        let t = s + 2;
        let mut clauses = vec![clause(&[(0, true)])];
        for i in 0..choices {
            clauses.push(clause(&[(0, false), (1 + i * 2, true), (2 + i * 2, true)]));
        }
        clauses.push(clause(&[(0, false), (s, true), (s + 1, true)]));
        clauses.push(clause(&[(0, false), (t, true), (t + 1, true)]));
        clauses.push(clause(&[(s, false), (t, false)]));
        clauses.push(clause(&[(s, false), (t + 1, false)]));
        clauses.push(clause(&[(s + 1, false), (t, false)]));
        if s2_excludes_t2 {
            clauses.push(clause(&[(s + 1, false), (t + 1, false)]));
        }
        (t + 2, clauses)
    }

    #[test]
    fn test_learning_skips_unrelated_choices() {
        let (num_vars, clauses) = choices_then_conflict(40, true);
        assert!(Dpll.solve(num_vars, &clauses).is_none());
    }

    #[test]
    fn test_backjump_keeps_preferred_choices() {
        let (num_vars, clauses) = choices_then_conflict(40, false);
        let model = Dpll.solve(num_vars, &clauses).unwrap();
        assert!(satisfies(&model, &clauses));

        // every independent choice keeps its first candidate
        for i in 0..40 {
            assert!(model[1 + i * 2]);
            assert!(!model[2 + i * 2]);
        }
        let s = 81;
        assert_eq!(&model[s..s + 4], &[false, true, false, true]);
    }

    #[test]
    fn test_unsatisfiable() {
        let clauses = vec![
            clause(&[(0, true)]),
            clause(&[(0, false), (1, true)]),
            clause(&[(1, false), (2, false)]),
            clause(&[(2, true)]),
        ];
        assert!(Dpll.solve(3, &clauses).is_none());
    }

    #[test]
    fn test_empty_clause_is_unsatisfiable() {
        assert!(Dpll.solve(1, &[clause(&[])]).is_none());
        assert_eq!(Dpll.solve(2, &[]), Some(vec![false, false]));
    }

    #[test]
    fn test_pigeonhole_needs_search() {
        // three pigeons, two holes: var = pigeon * 2 + hole
        let mut clauses = Vec::new();
        for pigeon in 0..3 {
            clauses.push(clause(&[(pigeon * 2, true), (pigeon * 2 + 1, true)]));
        }
        for hole in 0..2 {
            for p1 in 0..3 {
                for p2 in (p1 + 1)..3 {
                    clauses.push(clause(&[(p1 * 2 + hole, false), (p2 * 2 + hole, false)]));
                }
            }
        }
        assert!(Dpll.solve(6, &clauses).is_none());
        // dropping one pigeon makes it solvable
        let relaxed: Vec<Clause> = clauses.into_iter().skip(1).collect();
        let model = Dpll.solve(6, &relaxed).unwrap();
        assert!(satisfies(&model, &relaxed));
    }
}
