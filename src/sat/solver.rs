// src/sat/solver.rs

//! DPLL search over the package formula
//!
//! The solver is deliberately simple: unit propagation to a fixed point,
//! branching on the first unsatisfied root or active requires clause,
//! chronological backtracking through recorded alternatives. Clause
//! learning is unnecessary at the size of a reduced universe. All decisions
//! run in clause order, so identical inputs always produce the identical
//! assignment.

use crate::cancel::CancelToken;

/// A literal: positive var id means "install", negative "do not install".
/// Var ids are 1-based.
pub type Literal = i32;

/// Why a clause exists, carried for diagnostics
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClauseKind {
    /// At least one package of a required name must be installed
    Root { name: String },
    /// Package (var id) needs one of the providers of a capability
    Requires { package: usize, capability: String },
    /// Two packages cannot be installed together
    Conflict { a: usize, b: usize },
    /// At most one version of a name may be installed
    NameExclusion { name: String },
}

#[derive(Debug, Clone)]
pub struct Clause {
    pub literals: Vec<Literal>,
    pub kind: ClauseKind,
}

#[derive(Debug)]
pub enum SolveError {
    Cancelled,
    /// The clause that could not be satisfied when the search space ran out
    Unsatisfiable(ClauseKind),
}

/// One open branch point with its untried alternatives
struct Frame {
    trail_len: usize,
    alternatives: Vec<usize>,
}

pub struct Solver {
    clauses: Vec<Clause>,
    /// None = undecided; final model maps undecided to false
    assignment: Vec<Option<bool>>,
    trail: Vec<usize>,
    frames: Vec<Frame>,
}

impl Solver {
    pub fn new(num_vars: usize, clauses: Vec<Clause>) -> Self {
        Self {
            clauses,
            assignment: vec![None; num_vars],
            trail: Vec::new(),
            frames: Vec::new(),
        }
    }

    /// Run the search; the result maps each var to its installed state
    pub fn solve(&mut self, cancel: &CancelToken) -> Result<Vec<bool>, SolveError> {
        self.eliminate_pure_negatives();

        loop {
            if cancel.is_cancelled() {
                return Err(SolveError::Cancelled);
            }

            if let Some(conflict) = self.propagate() {
                self.backtrack(conflict)?;
                continue;
            }

            match self.select_branch() {
                Some(candidates) => {
                    let chosen = candidates[0];
                    self.frames.push(Frame {
                        trail_len: self.trail.len(),
                        alternatives: candidates[1..].to_vec(),
                    });
                    self.assign(chosen, true);
                }
                None => {
                    return Ok(self
                        .assignment
                        .iter()
                        .map(|a| a.unwrap_or(false))
                        .collect());
                }
            }
        }
    }

    fn value(&self, lit: Literal) -> Option<bool> {
        let var = lit.unsigned_abs() as usize - 1;
        self.assignment[var].map(|v| if lit > 0 { v } else { !v })
    }

    fn assign(&mut self, var: usize, value: bool) {
        self.assignment[var] = Some(value);
        self.trail.push(var);
    }

    fn assign_lit(&mut self, lit: Literal) {
        let var = lit.unsigned_abs() as usize - 1;
        self.assign(var, lit > 0);
    }

    fn retract_to(&mut self, trail_len: usize) {
        while self.trail.len() > trail_len {
            if let Some(var) = self.trail.pop() {
                self.assignment[var] = None;
            }
        }
    }

    /// Vars that never occur positively can only hurt; fix them to false
    fn eliminate_pure_negatives(&mut self) {
        let mut positive = vec![false; self.assignment.len()];
        for clause in &self.clauses {
            for &lit in &clause.literals {
                if lit > 0 {
                    positive[lit as usize - 1] = true;
                }
            }
        }
        for var in 0..self.assignment.len() {
            if !positive[var] && self.assignment[var].is_none() {
                self.assign(var, false);
            }
        }
    }

    /// Unit propagation to a fixed point; returns a conflicting clause index
    fn propagate(&mut self) -> Option<usize> {
        loop {
            let mut changed = false;
            for ci in 0..self.clauses.len() {
                let mut satisfied = false;
                let mut unassigned = None;
                let mut open = 0;

                for &lit in &self.clauses[ci].literals {
                    match self.value(lit) {
                        Some(true) => {
                            satisfied = true;
                            break;
                        }
                        Some(false) => {}
                        None => {
                            open += 1;
                            if open == 1 {
                                unassigned = Some(lit);
                            }
                        }
                    }
                }

                if satisfied {
                    continue;
                }
                match (open, unassigned) {
                    (0, _) => return Some(ci),
                    (1, Some(lit)) => {
                        self.assign_lit(lit);
                        changed = true;
                    }
                    _ => {}
                }
            }
            if !changed {
                return None;
            }
        }
    }

    /// Revert to the most recent frame with an untried alternative
    fn backtrack(&mut self, conflict: usize) -> Result<(), SolveError> {
        loop {
            match self.frames.last_mut() {
                None => {
                    return Err(SolveError::Unsatisfiable(self.clauses[conflict].kind.clone()))
                }
                Some(frame) => {
                    let trail_len = frame.trail_len;
                    match frame.alternatives.first().copied() {
                        Some(alt) => {
                            frame.alternatives.remove(0);
                            self.retract_to(trail_len);
                            self.assign(alt, true);
                            return Ok(());
                        }
                        None => {
                            self.frames.pop();
                            self.retract_to(trail_len);
                        }
                    }
                }
            }
        }
    }

    /// Find the next clause to branch on, in deterministic clause order
    ///
    /// Root clauses branch when unsatisfied; requires clauses branch only
    /// once their source package is installed. The returned candidates are
    /// undecided install choices in preference order.
    fn select_branch(&self) -> Option<Vec<usize>> {
        for clause in &self.clauses {
            match clause.kind {
                ClauseKind::Root { .. } => {}
                ClauseKind::Requires { package, .. } => {
                    if self.assignment[package] != Some(true) {
                        continue;
                    }
                }
                _ => continue,
            }

            let mut candidates = Vec::new();
            let mut satisfied = false;
            for &lit in &clause.literals {
                match self.value(lit) {
                    Some(true) => {
                        satisfied = true;
                        break;
                    }
                    Some(false) => {}
                    None => {
                        if lit > 0 {
                            candidates.push(lit as usize - 1);
                        }
                    }
                }
            }

            if !satisfied && !candidates.is_empty() {
                return Some(candidates);
            }
        }
        None
    }
}
