use mipform::adapter::HighsSolver;
use mipform::domain::{LinearModel, ValueRange, Variable};
use mipform::port::{Objective, SolveOutcome, Solver};
use mipform::symbol::{FunctionSymbol, SymbolRef};

use super::assertions::assert_near;
use super::model::integer_points;

/// Operand ranges narrowed to a single point for the lifetime of the guard.
struct Pinned<'a> {
    saved: Vec<(&'a Variable, ValueRange)>,
}

impl<'a> Pinned<'a> {
    fn new(operands: &[&'a Variable], point: &[f64]) -> Self {
        let saved = operands
            .iter()
            .zip(point)
            .map(|(operand, value)| {
                let range = operand.range();
                operand.set_range(ValueRange::point(*value));
                (*operand, range)
            })
            .collect();
        Self { saved }
    }
}

impl Drop for Pinned<'_> {
    fn drop(&mut self) {
        for (operand, range) in &self.saved {
            operand.set_range(*range);
        }
    }
}

fn solve_pinned(
    model: &LinearModel,
    objective: &Objective,
    operands: &[&Variable],
    point: &[f64],
) -> SolveOutcome {
    let _pinned = Pinned::new(operands, point);
    HighsSolver::new()
        .solve(model, Some(objective))
        .unwrap_or_else(|err| panic!("no feasible encoding at {point:?}: {err}"))
}

/// For every integer point of the operands, pin the operands and let HiGHS
/// push the symbol's encoded value both ways. Both extremes must equal the
/// directly evaluated value, so every feasible completion of the auxiliaries
/// encodes the same number.
///
/// Returns `(point, value)` pairs in enumeration order.
pub fn assert_encoding_forced(
    model: &LinearModel,
    symbol: &SymbolRef,
    operands: &[&Variable],
) -> Vec<(Vec<f64>, f64)> {
    let mut seen = Vec::new();
    for point in integer_points(operands) {
        let lowest = solve_pinned(model, &Objective::minimize(symbol), operands, &point);
        let highest = solve_pinned(model, &Objective::maximize(symbol), operands, &point);
        let expected = symbol
            .calculate_value(&lowest.solution, false)
            .unwrap_or_else(|| panic!("no value at {point:?}"));
        assert_near(lowest.objective, expected, 1e-5);
        assert_near(highest.objective, expected, 1e-5);
        seen.push((point, expected));
    }
    seen
}

/// Penalty symbols are only exact at their minimum: pin the operands and
/// require the smallest encoded value to equal direct evaluation.
pub fn assert_encoding_minimal(model: &LinearModel, symbol: &SymbolRef, operands: &[&Variable]) {
    for point in integer_points(operands) {
        let lowest = solve_pinned(model, &Objective::minimize(symbol), operands, &point);
        let expected = symbol
            .calculate_value(&lowest.solution, false)
            .unwrap_or_else(|| panic!("no value at {point:?}"));
        assert_near(lowest.objective, expected, 1e-5);
    }
}
