//! HiGHS solver implementation via good_lp.
//!
//! HiGHS is a high-performance open-source linear/mixed-integer programming solver.
//! This implementation wraps it using the good_lp crate for ergonomic Rust usage.

use std::collections::HashMap;

use good_lp::solvers::highs::highs;
use good_lp::{
    constraint, variable, variables, Expression, ResolutionError, Solution as _, SolverModel,
};
use tracing::debug;

use crate::domain::{ConstraintSense, LinearModel, Solution, VariableId};
use crate::error::{ModelError, Result, SolverError};
use crate::port::{Objective, ObjectiveSense, SolveOutcome, Solver};

/// HiGHS-based MIP solver.
#[derive(Debug, Default, Clone)]
pub struct HighsSolver;

impl HighsSolver {
    /// Create a new HiGHS solver instance.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Solver for HighsSolver {
    fn name(&self) -> &'static str {
        "highs"
    }

    fn solve(&self, model: &LinearModel, objective: Option<&Objective>) -> Result<SolveOutcome> {
        let tokens = model.tokens();
        debug!(
            solver = self.name(),
            variables = tokens.len(),
            constraints = model.constraints().len(),
            "solving linear model"
        );

        let objective_cells = objective.map(|o| o.polynomial.cells());
        if let Some(cells) = &objective_cells {
            if let Some(variable) = cells.variables().find(|v| !tokens.contains(v)) {
                return Err(ModelError::UnknownVariable {
                    variable: variable.name().to_string(),
                    constraint: "objective".to_string(),
                }
                .into());
            }
        }
        let constant = objective_cells.as_ref().map_or(0.0, |cells| cells.constant);

        // Handle empty model
        if tokens.is_empty() {
            return Ok(SolveOutcome {
                solution: Solution::new(),
                objective: constant,
            });
        }

        let mut vars = variables!();
        let mut columns = HashMap::with_capacity(tokens.len());
        for token in tokens.variables() {
            let range = token.range();
            let mut v = variable().name(token.name());
            // Infinite bounds are left to the backend's defaults.
            if range.lower().is_finite() {
                v = v.min(range.lower());
            }
            if range.upper().is_finite() {
                v = v.max(range.upper());
            }
            if token.discrete() {
                v = v.integer();
            }
            columns.insert(token.id(), (token.clone(), vars.add(v)));
        }

        let expression = |terms: &mut dyn Iterator<Item = (VariableId, f64)>| -> Expression {
            terms
                .filter_map(|(id, coefficient)| columns.get(&id).map(|(_, v)| coefficient * *v))
                .sum()
        };

        let goal: Expression = match &objective_cells {
            Some(cells) => expression(
                &mut cells
                    .terms
                    .iter()
                    .map(|(id, (_, coefficient))| (*id, *coefficient)),
            ),
            None => Expression::from_other_affine(0.0),
        };
        let mut problem = match objective.map(|o| o.sense) {
            Some(ObjectiveSense::Maximize) => vars.maximise(&goal).using(highs),
            _ => vars.minimise(&goal).using(highs),
        };

        for named in model.constraints() {
            let row = &named.constraint;
            let lhs = expression(
                &mut row
                    .terms
                    .iter()
                    .map(|(variable, coefficient)| (variable.id(), *coefficient)),
            );
            let rhs = row.rhs;
            problem = match row.sense {
                ConstraintSense::GreaterEqual => problem.with(constraint!(lhs >= rhs)),
                ConstraintSense::LessEqual => problem.with(constraint!(lhs <= rhs)),
                ConstraintSense::Equal => problem.with(constraint!(lhs == rhs)),
            };
        }

        let solved = problem.solve().map_err(|err| match err {
            ResolutionError::Infeasible => SolverError::Infeasible,
            ResolutionError::Unbounded => SolverError::Unbounded,
            other => SolverError::Backend(other.to_string()),
        })?;

        let mut solution = Solution::new();
        for (token, column) in columns.values() {
            let value = solved.value(*column);
            // Integral columns come back with round-off.
            let value = if token.discrete() { value.round() } else { value };
            solution.set(token, value);
        }
        let objective = objective_cells
            .as_ref()
            .and_then(|cells| cells.evaluate(&solution))
            .unwrap_or(0.0);
        debug!(solver = self.name(), objective, "model solved");

        Ok(SolveOutcome {
            solution,
            objective,
        })
    }
}
