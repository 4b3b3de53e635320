//! Registration, flush and caching behavior shared by every symbol kind.

mod support;

use mipform::domain::{FixedValues, LinearModel, Solution, ValueRange, Variable};
use mipform::error::{Error, SymbolError};
use mipform::symbol::{
    AbsFunction, AndFunction, BinaryzationFunction, FunctionSymbol, IntoSymbol, SlackFunction,
    SymbolRef,
};

use support::model::model_with;

fn auxiliary_names(symbol: &SymbolRef) -> Vec<String> {
    symbol
        .auxiliary_variables()
        .iter()
        .map(|v| v.name().to_string())
        .collect()
}

#[test]
fn test_registering_twice_adds_no_variables() {
    let x = Variable::integer("x").with_range(-2.0, 4.0);
    let abs = AbsFunction::new(&x, "abs_x").into_symbol();
    let mut model = model_with(&abs, &[&x]);
    let variables = model.tokens().len();
    let constraints = model.constraints().len();

    model.add_symbol(&abs).unwrap();
    assert_eq!(model.tokens().len(), variables);
    assert_eq!(model.constraints().len(), constraints);

    abs.register_tokens(model.tokens_mut()).unwrap();
    assert_eq!(model.tokens().len(), variables);
}

#[test]
fn test_flush_keeps_auxiliary_identity() {
    let x = Variable::integer("x").with_range(-2.0, 4.0);
    let abs = AbsFunction::new(&x, "abs_x").into_symbol();
    let _model = model_with(&abs, &[&x]);
    let before = auxiliary_names(&abs);
    assert_eq!(abs.range(), ValueRange::spanning(0.0, 4.0));

    x.set_range(ValueRange::spanning(-1.0, 3.0));
    abs.flush(true);

    assert_eq!(auxiliary_names(&abs), before);
    assert_eq!(abs.range(), ValueRange::spanning(0.0, 3.0));
}

#[test]
fn test_never_zero_operand_short_circuits_binaryzation() {
    let x = Variable::integer("x").with_range(5.0, 10.0);
    let bin = BinaryzationFunction::new(&x, "bin").into_symbol();
    assert_eq!(bin.range(), ValueRange::point(1.0));

    let model = model_with(&bin, &[&x]);
    assert!(bin.auxiliary_variables().is_empty());
    assert_eq!(model.tokens().len(), 1);
    assert!(model.constraints().is_empty());
}

#[test]
fn test_negative_operand_fails_registration() {
    let x = Variable::integer("x").with_range(-1.0, 1.0);
    let and = AndFunction::new([&x], "and").into_symbol();
    let mut model = LinearModel::new();
    model.tokens_mut().add(&x).unwrap();

    match model.add_symbol(&and) {
        Err(Error::Symbol(SymbolError::ApplicationFailed { symbol, reason })) => {
            assert_eq!(symbol, "and");
            assert!(reason.contains('x'), "reason should name the operand: {reason}");
        }
        other => panic!("expected ApplicationFailed, got {other:?}"),
    }
}

#[test]
fn test_prepare_computes_once_per_loaded_solution() {
    let x = Variable::integer("x").with_range(-2.0, 4.0);
    let abs = AbsFunction::new(&x, "abs_x").into_symbol();
    let mut model = model_with(&abs, &[&x]);

    let mut warm = Solution::new();
    assert_eq!(abs.prepare_and_cache(None, model.tokens(), &mut warm), None);

    let mut solution = Solution::new();
    solution.set(&x, -2.0);
    model.tokens_mut().load_solution(solution);
    assert_eq!(abs.prepare_and_cache(None, model.tokens(), &mut warm), Some(2.0));
    assert_eq!(abs.prepare_and_cache(None, model.tokens(), &mut warm), None);
    assert_eq!(model.tokens().cached_value("abs_x", None), Some(2.0));
}

#[test]
fn test_fixed_registration_pins_auxiliaries() {
    let x = Variable::integer("x").with_range(0.0, 5.0);
    let y = Variable::integer("y").with_range(0.0, 5.0);
    let slack = SlackFunction::new(&x, &y, "gap").into_symbol();
    let mut model = LinearModel::new();
    model.tokens_mut().add_all([&x, &y]).unwrap();

    let mut fixed = FixedValues::new();
    fixed.insert("x".into(), 1.0);
    fixed.insert("y".into(), 4.0);
    model.add_symbol_fixed(&slack, &fixed).unwrap();

    assert!(model
        .constraints()
        .iter()
        .all(|c| c.name.ends_with("_fixed") && c.from.as_deref() == Some("gap")));

    let mut warm = Solution::new();
    assert_eq!(
        slack.prepare_and_cache(Some(&fixed), model.tokens(), &mut warm),
        Some(3.0)
    );
    assert!(model.check(&warm).is_empty());
}
