//! SAT backend for [`Model`], built on varisat.
//!
//! Integer variables are one-hot encoded, allowed-assignment tables use one
//! selector literal per row, and cardinality/weighted sums go through
//! sequential counters. The objective is maximized by re-solving under an
//! assumption that it beats the best value found so far.

use crate::model::{Assignment, Constraint, Engine, IntVar, Model, Status, Term};
use itertools::Itertools;
use varisat::{ExtendFormula, Lit, Solver};

/// Cross-platform time tracker for timeout handling
#[derive(Clone, Copy)]
struct TimeTracker {
    #[cfg(not(target_arch = "wasm32"))]
    start: std::time::Instant,
    #[cfg(target_arch = "wasm32")]
    start_ms: f64,
    limit_ms: u64,
}

impl TimeTracker {
    fn new(limit_ms: u64) -> Self {
        Self {
            #[cfg(not(target_arch = "wasm32"))]
            start: std::time::Instant::now(),
            #[cfg(target_arch = "wasm32")]
            start_ms: Self::now_ms(),
            limit_ms,
        }
    }

    #[cfg(target_arch = "wasm32")]
    fn now_ms() -> f64 {
        web_sys::window()
            .and_then(|window| window.performance())
            .map(|performance| performance.now())
            .unwrap_or_else(js_sys::Date::now)
    }

    fn is_expired(&self) -> bool {
        #[cfg(not(target_arch = "wasm32"))]
        {
            self.start.elapsed() >= std::time::Duration::from_millis(self.limit_ms)
        }
        #[cfg(target_arch = "wasm32")]
        {
            (Self::now_ms() - self.start_ms) >= self.limit_ms as f64
        }
    }
}

/// Engine backed by the varisat CDCL solver.
///
/// `max_ms` bounds the optimization loop. It is checked between solver
/// calls, so a single call is never interrupted.
#[derive(Debug, Clone, Copy)]
pub struct SatEngine {
    pub max_ms: u64,
}

impl SatEngine {
    pub fn new(max_ms: u64) -> Self {
        SatEngine { max_ms }
    }
}

impl Default for SatEngine {
    fn default() -> Self {
        SatEngine::new(5_000)
    }
}

impl Engine for SatEngine {
    fn solve(&self, model: &Model) -> Assignment {
        let timer = TimeTracker::new(self.max_ms);
        let mut solver = Solver::new();
        let encoding = Encoding::new(&mut solver, model);

        let objective: Vec<(u32, Lit)> = model
            .objective()
            .iter()
            .map(|&(weight, var)| (weight, encoding.bools[var.index()]))
            .collect();
        let total: u32 = objective.iter().map(|&(weight, _)| weight).sum();
        let reach = encode_sum_reach(&mut solver, &objective, total, encoding.top);

        log::debug!(
            "encoded model: {} int vars, {} bool vars, {} constraints, objective bound {}",
            model.int_count(),
            model.bool_count(),
            model.constraints().len(),
            total
        );

        let mut best: Option<Assignment> = None;
        let gave_up = |best: &Option<Assignment>| {
            if best.is_some() {
                Status::Feasible
            } else {
                Status::Unknown
            }
        };

        let status = loop {
            match solver.solve() {
                Ok(true) => {
                    let Some(lits) = solver.model() else {
                        log::warn!("SAT solver reported a solution without a model");
                        break gave_up(&best);
                    };
                    let found = encoding.read(model, &lits);
                    let value = found.objective;
                    log::debug!("found solution with objective {}", value);
                    best = Some(found);

                    if value >= total {
                        break Status::Optimal;
                    }
                    if timer.is_expired() {
                        break Status::Feasible;
                    }
                    solver.assume(&[reach[(value + 1) as usize]]);
                }
                Ok(false) => {
                    break if best.is_some() {
                        Status::Optimal
                    } else {
                        Status::Infeasible
                    };
                }
                Err(err) => {
                    log::warn!("SAT solver failed: {:?}", err);
                    break gave_up(&best);
                }
            }
        };

        match best {
            Some(mut assignment) if status.has_solution() => {
                assignment.status = status;
                assignment
            }
            _ => Assignment::without_solution(status),
        }
    }
}

/// Literals standing for model variables.
struct Encoding {
    /// Per integer variable: (value, literal) for each domain value
    values: Vec<Vec<(u8, Lit)>>,
    bools: Vec<Lit>,
    /// Literal fixed to true
    top: Lit,
}

impl Encoding {
    fn new(solver: &mut Solver, model: &Model) -> Self {
        let top = solver.new_lit();
        solver.add_clause(&[top]);

        let mut values = Vec::with_capacity(model.int_count());
        for var in model.int_vars() {
            let lits: Vec<(u8, Lit)> = model
                .domain(var)
                .iter()
                .map(|&value| (value, solver.new_lit()))
                .collect();

            // Exactly one value
            let clause: Vec<Lit> = lits.iter().map(|&(_, lit)| lit).collect();
            solver.add_clause(&clause);
            for (a, b) in clause.iter().tuple_combinations() {
                solver.add_clause(&[!*a, !*b]);
            }
            values.push(lits);
        }

        let bools = (0..model.bool_count()).map(|_| solver.new_lit()).collect();

        let encoding = Encoding { values, bools, top };
        for constraint in model.constraints() {
            encoding.add_constraint(solver, constraint);
        }
        encoding
    }

    fn value_lit(&self, var: IntVar, value: u8) -> Option<Lit> {
        self.values[var.index()]
            .iter()
            .find(|&&(v, _)| v == value)
            .map(|&(_, lit)| lit)
    }

    fn term_lit(&self, term: Term) -> Lit {
        match term {
            Term::NonZero(var) => match self.value_lit(var, 0) {
                Some(zero) => !zero,
                None => self.top,
            },
            Term::Bool(var) => self.bools[var.index()],
        }
    }

    fn add_constraint(&self, solver: &mut Solver, constraint: &Constraint) {
        match constraint {
            Constraint::AllowedAssignments { vars, tuples } => {
                self.add_allowed_assignments(solver, vars, tuples);
            }
            Constraint::Supported { term, supports } => {
                let mut clause = vec![!self.term_lit(*term)];
                clause.extend(supports.iter().map(|&s| self.term_lit(s)));
                solver.add_clause(&clause);
            }
            Constraint::AtMost { terms, bound } => {
                let lits: Vec<Lit> = terms.iter().map(|&t| self.term_lit(t)).collect();
                encode_at_most(solver, &lits, *bound as usize, self.top);
            }
            Constraint::AtLeast { terms, bound } => {
                let weighted: Vec<(u32, Lit)> = terms
                    .iter()
                    .map(|&(weight, t)| (weight, self.term_lit(t)))
                    .collect();
                let reach = encode_sum_reach(solver, &weighted, *bound, self.top);
                solver.add_clause(&[reach[*bound as usize]]);
            }
            Constraint::Forbidden { assignment } => {
                let clause: Option<Vec<Lit>> = assignment
                    .iter()
                    .map(|&(var, value)| self.value_lit(var, value).map(|lit| !lit))
                    .collect();
                // a value outside the domain can never be taken
                if let Some(clause) = clause {
                    solver.add_clause(&clause);
                }
            }
        }
    }

    /// Exactly one row selector is true, and the variables equal that row.
    ///
    /// Rows only force their nonzero entries; a variable that takes a nonzero
    /// value must be backed by a selected row with that value, which keeps the
    /// remaining entries of the selected row at zero.
    fn add_allowed_assignments(&self, solver: &mut Solver, vars: &[IntVar], tuples: &[Vec<u8>]) {
        let selectors: Vec<Lit> = tuples.iter().map(|_| solver.new_lit()).collect();
        solver.add_clause(&selectors);
        encode_at_most_one(solver, &selectors);

        for (tuple, &selector) in tuples.iter().zip(&selectors) {
            for (&var, &value) in vars.iter().zip(tuple) {
                match self.value_lit(var, value) {
                    Some(lit) if value != 0 => solver.add_clause(&[!selector, lit]),
                    Some(_) => {}
                    None => solver.add_clause(&[!selector]),
                }
            }
        }

        for (position, &var) in vars.iter().enumerate() {
            for &(value, lit) in &self.values[var.index()] {
                if value == 0 {
                    continue;
                }
                let mut clause = vec![!lit];
                clause.extend(
                    tuples
                        .iter()
                        .zip(&selectors)
                        .filter(|(tuple, _)| tuple[position] == value)
                        .map(|(_, &selector)| selector),
                );
                solver.add_clause(&clause);
            }
        }
    }

    fn read(&self, model: &Model, lits: &[Lit]) -> Assignment {
        let mut truth = Vec::new();
        for lit in lits {
            let index = lit.var().index();
            if index >= truth.len() {
                truth.resize(index + 1, false);
            }
            truth[index] = lit.is_positive();
        }
        let holds = |lit: Lit| truth.get(lit.var().index()).copied().unwrap_or(false) == lit.is_positive();

        let ints: Vec<u8> = self
            .values
            .iter()
            .map(|lits| {
                lits.iter()
                    .find(|&&(_, lit)| holds(lit))
                    .map_or(0, |&(value, _)| value)
            })
            .collect();
        let bools: Vec<bool> = self.bools.iter().map(|&lit| holds(lit)).collect();
        let objective = model
            .objective()
            .iter()
            .filter(|&&(_, var)| bools[var.index()])
            .map(|&(weight, _)| weight)
            .sum();

        Assignment {
            status: Status::Feasible,
            ints,
            bools,
            objective,
        }
    }
}

/// Ladder encoding of "at most one of `lits`"
fn encode_at_most_one(solver: &mut Solver, lits: &[Lit]) {
    if lits.len() <= 4 {
        for (a, b) in lits.iter().tuple_combinations() {
            solver.add_clause(&[!*a, !*b]);
        }
        return;
    }

    // `seen` holds when some literal up to the current one is true
    let mut seen = lits[0];
    for &lit in &lits[1..] {
        solver.add_clause(&[!seen, !lit]);
        let next = solver.new_lit();
        solver.add_clause(&[!seen, next]);
        solver.add_clause(&[!lit, next]);
        seen = next;
    }
}

/// Encodes "at most k of `lits`"
fn encode_at_most(solver: &mut Solver, lits: &[Lit], k: usize, top: Lit) {
    if k >= lits.len() {
        return;
    }

    if lits.len() <= 10 {
        // Every (k+1)-subset has a false literal
        for combo in lits.iter().copied().combinations(k + 1) {
            let clause: Vec<Lit> = combo.iter().map(|&lit| !lit).collect();
            solver.add_clause(&clause);
        }
        return;
    }

    // At most k true means at least n-k false
    let negated: Vec<(u32, Lit)> = lits.iter().map(|&lit| (1, !lit)).collect();
    let bound = (lits.len() - k) as u32;
    let reach = encode_sum_reach(solver, &negated, bound, top);
    solver.add_clause(&[reach[bound as usize]]);
}

/// Sequential weighted counter.
///
/// Returns `bound + 1` literals where `reach[s]` implies
/// `sum(weight * lit) >= s`. `reach[0]` is `top`. Asserting (or assuming)
/// `reach[s]` therefore enforces the sum to reach `s`.
fn encode_sum_reach(solver: &mut Solver, terms: &[(u32, Lit)], bound: u32, top: Lit) -> Vec<Lit> {
    let bound = bound as usize;
    let bottom = !top;
    let mut prev: Vec<Lit> = (0..=bound).map(|s| if s == 0 { top } else { bottom }).collect();

    for &(weight, lit) in terms {
        let weight = weight as usize;
        if weight == 0 {
            continue;
        }
        let mut next = Vec::with_capacity(bound + 1);
        next.push(top);
        for s in 1..=bound {
            let reached = solver.new_lit();
            // reached -> prev[s] or lit
            solver.add_clause(&[!reached, prev[s], lit]);
            // reached -> prev[s] or prev[s - weight]
            if s > weight {
                solver.add_clause(&[!reached, prev[s], prev[s - weight]]);
            }
            next.push(reached);
        }
        prev = next;
    }

    prev
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::BoolVar;

    fn engine() -> SatEngine {
        SatEngine::new(10_000)
    }

    /// A boolean that can only be true when `var` is nonzero, weighted 1 in the objective
    fn reward_nonzero(model: &mut Model, var: IntVar) -> BoolVar {
        let flag = model.new_bool_var();
        model.add_supported(Term::Bool(flag), vec![Term::NonZero(var)]);
        flag
    }

    #[test]
    fn test_allowed_assignments_pick_a_row() {
        let mut model = Model::new();
        let a = model.new_int_var(&[0, 1, 2]);
        let b = model.new_int_var(&[0, 1, 2]);
        model.add_allowed_assignments(vec![a, b], vec![vec![0, 0], vec![1, 2], vec![2, 1]]);
        let p = reward_nonzero(&mut model, a);
        model.maximize(vec![(1, p)]);

        let result = engine().solve(&model);
        assert_eq!(result.status, Status::Optimal);
        assert_eq!(result.objective, 1);
        let pair = (result.value(a), result.value(b));
        assert!(pair == (1, 2) || pair == (2, 1), "unexpected pair {:?}", pair);
    }

    #[test]
    fn test_allowed_assignments_rows_do_not_mix() {
        let mut model = Model::new();
        let a = model.new_int_var(&[0, 3]);
        let b = model.new_int_var(&[0, 3]);
        let c = model.new_int_var(&[0, 3]);
        // Either a or b, never both; c free
        model.add_allowed_assignments(
            vec![a, b],
            vec![vec![0, 0], vec![3, 0], vec![0, 3]],
        );
        let pa = reward_nonzero(&mut model, a);
        let pb = reward_nonzero(&mut model, b);
        let pc = reward_nonzero(&mut model, c);
        model.maximize(vec![(1, pa), (1, pb), (1, pc)]);

        let result = engine().solve(&model);
        assert_eq!(result.status, Status::Optimal);
        assert_eq!(result.objective, 2);
        assert_eq!(result.value(c), 3);
        assert!(result.value(a) == 0 || result.value(b) == 0);
    }

    #[test]
    fn test_allowed_assignments_with_many_rows() {
        // Enough rows to use the ladder encoding
        let mut model = Model::new();
        let vars: Vec<IntVar> = (0..6).map(|_| model.new_int_var(&[0, 1])).collect();
        let tuples: Vec<Vec<u8>> = (0..6)
            .map(|i| (0..6).map(|j| u8::from(i == j)).collect())
            .collect();
        model.add_allowed_assignments(vars.clone(), tuples);
        let flags: Vec<(u32, BoolVar)> = vars
            .iter()
            .map(|&v| (1, reward_nonzero(&mut model, v)))
            .collect();
        model.maximize(flags);

        let result = engine().solve(&model);
        assert_eq!(result.status, Status::Optimal);
        assert_eq!(result.objective, 1);
        assert_eq!(vars.iter().filter(|&&v| result.value(v) == 1).count(), 1);
    }

    #[test]
    fn test_empty_table_is_infeasible() {
        let mut model = Model::new();
        let a = model.new_int_var(&[0, 1]);
        model.add_allowed_assignments(vec![a], vec![]);

        let result = engine().solve(&model);
        assert_eq!(result.status, Status::Infeasible);
        assert!(result.ints.is_empty());
    }

    #[test]
    fn test_forbidden_assignment_moves_the_optimum() {
        let mut model = Model::new();
        let a = model.new_int_var(&[0, 1, 2]);
        let b = model.new_int_var(&[0, 1, 2]);
        model.add_allowed_assignments(vec![a, b], vec![vec![0, 0], vec![1, 2], vec![2, 0]]);
        let pa = reward_nonzero(&mut model, a);
        let pb = reward_nonzero(&mut model, b);
        model.maximize(vec![(1, pa), (1, pb)]);

        let best = engine().solve(&model);
        assert_eq!(best.objective, 2);

        model.add_forbidden(vec![(a, 1), (b, 2)]);
        let next = engine().solve(&model);
        assert_eq!(next.status, Status::Optimal);
        assert_eq!(next.objective, 1);
        assert_eq!((next.value(a), next.value(b)), (2, 0));

        // Values outside the domain exclude nothing
        model.add_forbidden(vec![(a, 7)]);
        assert_eq!(engine().solve(&model).objective, 1);

        model.add_forbidden(vec![(a, 2)]);
        model.add_forbidden(vec![(a, 0), (b, 0)]);
        assert_eq!(engine().solve(&model).status, Status::Infeasible);
    }

    #[test]
    fn test_supported_requires_a_support() {
        let mut model = Model::new();
        let a = model.new_int_var(&[0, 1]);
        let b = model.new_int_var(&[0, 1]);
        // b can never be used, so a cannot either
        model.add_allowed_assignments(vec![b], vec![vec![0]]);
        model.add_supported(Term::NonZero(a), vec![Term::NonZero(b)]);
        let p = reward_nonzero(&mut model, a);
        model.maximize(vec![(1, p)]);

        let result = engine().solve(&model);
        assert_eq!(result.status, Status::Optimal);
        assert_eq!(result.objective, 0);
        assert_eq!(result.value(a), 0);
    }

    #[test]
    fn test_at_most_small_and_large() {
        for count in [6usize, 14] {
            let mut model = Model::new();
            let flags: Vec<BoolVar> = (0..count).map(|_| model.new_bool_var()).collect();
            model.add_at_most(flags.iter().map(|&f| Term::Bool(f)).collect(), 4);
            model.maximize(flags.iter().map(|&f| (1, f)).collect());

            let result = engine().solve(&model);
            assert_eq!(result.status, Status::Optimal, "count {}", count);
            assert_eq!(result.objective, 4, "count {}", count);
        }
    }

    #[test]
    fn test_weighted_at_least() {
        let mut model = Model::new();
        let x = model.new_bool_var();
        let y = model.new_bool_var();
        let z = model.new_bool_var();
        let terms = vec![(13, Term::Bool(x)), (9, Term::Bool(y)), (8, Term::Bool(z))];
        model.add_at_least(terms.clone(), 30);

        let result = engine().solve(&model);
        assert_eq!(result.status, Status::Optimal);
        assert!(result.is_true(x) && result.is_true(y) && result.is_true(z));

        // Dropping any one tile leaves the sum below 30
        model.add_at_most(terms.iter().map(|&(_, t)| t).collect(), 2);
        let result = engine().solve(&model);
        assert_eq!(result.status, Status::Infeasible);
    }

    #[test]
    fn test_weighted_objective() {
        let mut model = Model::new();
        let flags: Vec<BoolVar> = (0..3).map(|_| model.new_bool_var()).collect();
        model.add_at_most(flags.iter().map(|&f| Term::Bool(f)).collect(), 1);
        model.maximize(vec![(2, flags[0]), (7, flags[1]), (5, flags[2])]);

        let result = engine().solve(&model);
        assert_eq!(result.status, Status::Optimal);
        assert_eq!(result.objective, 7);
        assert!(result.is_true(flags[1]));
    }

    #[test]
    fn test_zero_budget_still_returns_a_solution() {
        let mut model = Model::new();
        let flags: Vec<BoolVar> = (0..12).map(|_| model.new_bool_var()).collect();
        model.add_at_most(flags.iter().map(|&f| Term::Bool(f)).collect(), 5);
        model.maximize(flags.iter().map(|&f| (1, f)).collect());

        let result = SatEngine::new(0).solve(&model);
        assert!(result.status.has_solution());
        assert!(result.objective <= 5);
    }
}
