//! Solver port for mixed-integer linear models.

use crate::domain::{LinearModel, LinearPolynomial, Solution};
use crate::error::Result;

/// Mixed-integer solver backend.
///
/// Implementations translate every token of the model into a decision
/// variable (bounds and integrality taken from the variable kind and range)
/// and every named constraint into a row.
pub trait Solver {
    /// Return the solver name for logging and configuration.
    fn name(&self) -> &'static str;

    /// Solve `model`, optimizing `objective` when one is given and otherwise
    /// looking for any feasible point.
    ///
    /// # Errors
    ///
    /// `SolverError::Infeasible` or `SolverError::Unbounded` for the
    /// corresponding outcomes, `SolverError::Backend` for anything else the
    /// backend reports, and `ModelError::UnknownVariable` when the objective
    /// reads a variable the model does not know.
    fn solve(&self, model: &LinearModel, objective: Option<&Objective>) -> Result<SolveOutcome>;
}

/// Optimization direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectiveSense {
    Minimize,
    Maximize,
}

/// A linear objective; symbols inside the polynomial are flattened.
#[derive(Debug, Clone)]
pub struct Objective {
    pub sense: ObjectiveSense,
    pub polynomial: LinearPolynomial,
}

impl Objective {
    #[must_use]
    pub fn minimize(polynomial: impl Into<LinearPolynomial>) -> Self {
        Self {
            sense: ObjectiveSense::Minimize,
            polynomial: polynomial.into(),
        }
    }

    #[must_use]
    pub fn maximize(polynomial: impl Into<LinearPolynomial>) -> Self {
        Self {
            sense: ObjectiveSense::Maximize,
            polynomial: polynomial.into(),
        }
    }
}

/// An optimal point of a solved model.
#[derive(Debug, Clone)]
pub struct SolveOutcome {
    /// Value of every registered variable.
    pub solution: Solution,

    /// Objective value at `solution`, `0` without an objective.
    pub objective: f64,
}
