//! Solver-independent constraint model.
//!
//! The hint builder only talks to this module; any backend that implements
//! [`Engine`] can solve the resulting [`Model`].

/// Handle to a bounded integer variable
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct IntVar(usize);

/// Handle to a boolean variable
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BoolVar(usize);

impl IntVar {
    pub fn index(self) -> usize {
        self.0
    }
}

impl BoolVar {
    pub fn index(self) -> usize {
        self.0
    }
}

/// A 0/1 quantity usable in linear constraints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Term {
    /// 1 when the integer variable takes a value other than 0
    NonZero(IntVar),
    /// 1 when the boolean variable is true
    Bool(BoolVar),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Constraint {
    /// The vector of variable values must equal one of the tuples
    AllowedAssignments { vars: Vec<IntVar>, tuples: Vec<Vec<u8>> },
    /// `term <= sum(supports)`
    Supported { term: Term, supports: Vec<Term> },
    /// `sum(terms) <= bound`
    AtMost { terms: Vec<Term>, bound: u32 },
    /// `sum(weight * term) >= bound`
    AtLeast { terms: Vec<(u32, Term)>, bound: u32 },
    /// At least one variable differs from its listed value
    Forbidden { assignment: Vec<(IntVar, u8)> },
}

/// Variables, constraints and a linear objective to maximize.
#[derive(Debug, Clone, Default)]
pub struct Model {
    domains: Vec<Vec<u8>>,
    bool_count: usize,
    constraints: Vec<Constraint>,
    objective: Vec<(u32, BoolVar)>,
}

impl Model {
    pub fn new() -> Self {
        Self::default()
    }

    /// New integer variable restricted to the given values
    pub fn new_int_var(&mut self, domain: &[u8]) -> IntVar {
        let mut domain = domain.to_vec();
        domain.sort_unstable();
        domain.dedup();
        self.domains.push(domain);
        IntVar(self.domains.len() - 1)
    }

    pub fn new_bool_var(&mut self) -> BoolVar {
        self.bool_count += 1;
        BoolVar(self.bool_count - 1)
    }

    pub fn add_allowed_assignments(&mut self, vars: Vec<IntVar>, tuples: Vec<Vec<u8>>) {
        debug_assert!(tuples.iter().all(|t| t.len() == vars.len()));
        self.constraints
            .push(Constraint::AllowedAssignments { vars, tuples });
    }

    pub fn add_supported(&mut self, term: Term, supports: Vec<Term>) {
        self.constraints.push(Constraint::Supported { term, supports });
    }

    pub fn add_at_most(&mut self, terms: Vec<Term>, bound: u32) {
        self.constraints.push(Constraint::AtMost { terms, bound });
    }

    pub fn add_at_least(&mut self, terms: Vec<(u32, Term)>, bound: u32) {
        self.constraints.push(Constraint::AtLeast { terms, bound });
    }

    /// Exclude every solution in which all listed variables take their value
    pub fn add_forbidden(&mut self, assignment: Vec<(IntVar, u8)>) {
        self.constraints.push(Constraint::Forbidden { assignment });
    }

    /// Replace the objective with `maximize sum(weight * var)`
    pub fn maximize(&mut self, terms: Vec<(u32, BoolVar)>) {
        self.objective = terms;
    }

    pub fn int_vars(&self) -> impl Iterator<Item = IntVar> {
        (0..self.domains.len()).map(IntVar)
    }

    pub fn domain(&self, var: IntVar) -> &[u8] {
        &self.domains[var.0]
    }

    pub fn int_count(&self) -> usize {
        self.domains.len()
    }

    pub fn bool_count(&self) -> usize {
        self.bool_count
    }

    pub fn constraints(&self) -> &[Constraint] {
        &self.constraints
    }

    pub fn objective(&self) -> &[(u32, BoolVar)] {
        &self.objective
    }
}

/// Outcome of a solve call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// Best objective value proven
    Optimal,
    /// A solution was found but not proven best
    Feasible,
    /// No assignment satisfies the constraints
    Infeasible,
    /// The engine gave up without finding a solution
    Unknown,
}

impl Status {
    pub fn has_solution(self) -> bool {
        matches!(self, Status::Optimal | Status::Feasible)
    }
}

/// Variable values returned by an engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assignment {
    pub status: Status,
    pub ints: Vec<u8>,
    pub bools: Vec<bool>,
    pub objective: u32,
}

impl Assignment {
    /// An assignment without values, for `Infeasible` and `Unknown`
    pub fn without_solution(status: Status) -> Self {
        Assignment {
            status,
            ints: Vec::new(),
            bools: Vec::new(),
            objective: 0,
        }
    }

    pub fn value(&self, var: IntVar) -> u8 {
        self.ints.get(var.0).copied().unwrap_or(0)
    }

    pub fn is_true(&self, var: BoolVar) -> bool {
        self.bools.get(var.0).copied().unwrap_or(false)
    }

    pub fn term(&self, term: Term) -> bool {
        match term {
            Term::NonZero(var) => self.value(var) != 0,
            Term::Bool(var) => self.is_true(var),
        }
    }
}

/// A constraint solver able to maximize a [`Model`].
pub trait Engine {
    fn solve(&self, model: &Model) -> Assignment;
}
