use mipform::domain::{LinearModel, Variable};
use mipform::symbol::SymbolRef;

/// A model holding `operands` and the registered `symbol`.
pub fn model_with(symbol: &SymbolRef, operands: &[&Variable]) -> LinearModel {
    let mut model = LinearModel::new();
    model
        .tokens_mut()
        .add_all(operands.iter().copied())
        .expect("operands register once");
    model.add_symbol(symbol).expect("symbol registers");
    model
}

/// Every integer point of the operands' (finite) ranges.
pub fn integer_points(operands: &[&Variable]) -> Vec<Vec<f64>> {
    let mut points = vec![Vec::new()];
    for operand in operands {
        let (lower, upper) = (operand.lower_bound(), operand.upper_bound());
        assert!(
            lower.is_finite() && upper.is_finite(),
            "{} needs finite bounds to enumerate",
            operand.name()
        );
        let values: Vec<f64> = (lower.ceil() as i64..=upper.floor() as i64)
            .map(|v| v as f64)
            .collect();
        points = points
            .into_iter()
            .flat_map(|point| {
                values.iter().map(move |v| {
                    let mut next = point.clone();
                    next.push(*v);
                    next
                })
            })
            .collect();
    }
    points
}
