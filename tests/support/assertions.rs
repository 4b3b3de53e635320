use mipform::domain::{LinearModel, Solution, Variable};
use mipform::symbol::{FunctionSymbol, SymbolRef};

use super::model::integer_points;

pub fn assert_near(actual: f64, expected: f64, tolerance: f64) {
    assert!(
        (actual - expected).abs() <= tolerance,
        "expected {} ± {}, got {}",
        expected,
        tolerance,
        actual
    );
}

/// For every integer point of the operands: seed the auxiliaries through
/// `prepare`, require the warm start to satisfy the model and require the
/// encoded polynomial to agree with direct evaluation.
///
/// Returns `(point, value)` pairs in enumeration order.
pub fn assert_encoding_matches(
    model: &mut LinearModel,
    symbol: &SymbolRef,
    operands: &[&Variable],
) -> Vec<(Vec<f64>, f64)> {
    let mut seen = Vec::new();
    for point in integer_points(operands) {
        let mut solution = Solution::new();
        for (operand, value) in operands.iter().zip(&point) {
            solution.set(operand, *value);
        }
        model.tokens_mut().load_solution(solution.clone());

        let mut warm = solution.clone();
        let value = symbol
            .prepare_and_cache(None, model.tokens(), &mut warm)
            .unwrap_or_else(|| panic!("no value prepared at {point:?}"));

        let violated = model.check(&warm);
        assert!(
            violated.is_empty(),
            "warm start at {point:?} violates {violated:?}"
        );

        let encoded = symbol
            .polynomial()
            .cells()
            .evaluate(&warm)
            .unwrap_or_else(|| panic!("auxiliary left unseeded at {point:?}"));
        assert_near(encoded, value, 1e-6);
        assert_eq!(symbol.calculate_value(&solution, false), Some(value));
        assert!(
            symbol.range().contains(value),
            "value {value} at {point:?} escapes range {}",
            symbol.range()
        );
        seen.push((point, value));
    }
    seen
}
