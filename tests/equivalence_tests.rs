//! Every feasible completion of a registered encoding carries the directly
//! evaluated value. Operands are pinned one integer point at a time and HiGHS
//! pushes the encoded value to both extremes.

mod support;

use mipform::config::SymbolConfig;
use mipform::domain::{LinearPolynomial, ValueRange, Variable};
use mipform::symbol::{
    AbsFunction, AndFunction, BinaryzationFunction, DivisionFunction, ExtremumFunction,
    FirstFunction, FunctionSymbol, IfFunction, IntoSymbol, MaskingFunction, NotFunction,
    OrFunction, SatisfiedAmountFunction, SatisfiedAmountInequalityFunction, SemiFunction,
    SlackFunction, XorFunction,
};

use support::equivalence::{assert_encoding_forced, assert_encoding_minimal};
use support::model::model_with;

/// Integer operands only need a separation well inside one unit.
fn coarse() -> SymbolConfig {
    SymbolConfig {
        epsilon: 0.5,
        ..SymbolConfig::default()
    }
}

#[test]
fn test_abs_split_is_forced() {
    let x = Variable::integer("x").with_range(-3.0, 5.0);
    let abs = AbsFunction::new(&x, "abs_x").into_symbol();
    let model = model_with(&abs, &[&x]);
    let seen = assert_encoding_forced(&model, &abs, &[&x]);
    assert_eq!(seen.first(), Some(&(vec![-3.0], 3.0)));
}

#[test]
fn test_abs_stays_exact_after_flush_of_a_registered_split() {
    let x = Variable::integer("x").with_range(-3.0, 8.0);
    let abs = AbsFunction::new(&x, "abs_x").into_symbol();
    let model = model_with(&abs, &[&x]);

    x.set_range(ValueRange::spanning(-2.0, 2.0));
    abs.flush(false);
    assert_eq!(abs.range(), ValueRange::spanning(0.0, 2.0));

    let values: Vec<f64> = assert_encoding_forced(&model, &abs, &[&x])
        .into_iter()
        .map(|(_, value)| value)
        .collect();
    assert_eq!(values, vec![2.0, 1.0, 0.0, 1.0, 2.0]);
}

#[test]
fn test_connectives_over_small_integers() {
    let a = Variable::uinteger("a").with_range(0.0, 2.0);
    let b = Variable::uinteger("b").with_range(0.0, 2.0);
    let c = Variable::uinteger("c").with_range(0.0, 1.0);

    let and = AndFunction::new([&a, &b], "and").into_symbol();
    assert_encoding_forced(&model_with(&and, &[&a, &b]), &and, &[&a, &b]);

    let or = OrFunction::new([&a, &b], "or").into_symbol();
    assert_encoding_forced(&model_with(&or, &[&a, &b]), &or, &[&a, &b]);

    let xor = XorFunction::new([&a, &b], "xor").into_symbol();
    assert_encoding_forced(&model_with(&xor, &[&a, &b]), &xor, &[&a, &b]);

    let xor3 = XorFunction::new([&a, &b, &c], "xor3").into_symbol();
    let seen = assert_encoding_forced(&model_with(&xor3, &[&a, &b, &c]), &xor3, &[&a, &b, &c]);
    for (point, value) in seen {
        let zeros = point.iter().filter(|v| **v == 0.0).count();
        let expected = if zeros > 0 && zeros < 3 { 1.0 } else { 0.0 };
        assert_eq!(value, expected, "xor at {point:?}");
    }
}

#[test]
fn test_indicators_over_integers() {
    let x = Variable::uinteger("x").with_range(0.0, 3.0);

    let bin = BinaryzationFunction::new(&x, "bin").into_symbol();
    assert_encoding_forced(&model_with(&bin, &[&x]), &bin, &[&x]);

    let not = NotFunction::new(&x, "not").into_symbol();
    let values: Vec<f64> = assert_encoding_forced(&model_with(&not, &[&x]), &not, &[&x])
        .into_iter()
        .map(|(_, value)| value)
        .collect();
    assert_eq!(values, vec![1.0, 0.0, 0.0, 0.0]);
}

#[test]
fn test_division_modes_are_forced() {
    let x = Variable::integer("x").with_range(-4.0, 7.0);
    let symbols = [
        DivisionFunction::floor(&x, 3.0, "floor").into_symbol(),
        DivisionFunction::ceiling(&x, 3.0, "ceil").into_symbol(),
        DivisionFunction::round(&x, 3.0, "round").into_symbol(),
        DivisionFunction::modulo(&x, 3.0, "mod").into_symbol(),
    ];
    for symbol in &symbols {
        assert_encoding_forced(&model_with(symbol, &[&x]), symbol, &[&x]);
    }
}

#[test]
fn test_exact_extremes_are_forced() {
    let a = Variable::integer("a").with_range(0.0, 3.0);
    let b = Variable::integer("b").with_range(1.0, 2.0);

    let max = ExtremumFunction::exact_max([&a, &b], "max").into_symbol();
    assert_encoding_forced(&model_with(&max, &[&a, &b]), &max, &[&a, &b]);

    let min = ExtremumFunction::exact_min([&a, &b], "min").into_symbol();
    assert_encoding_forced(&model_with(&min, &[&a, &b]), &min, &[&a, &b]);
}

#[test]
fn test_first_index_is_forced() {
    let a = Variable::uinteger("a").with_range(0.0, 2.0);
    let b = Variable::binary("b");
    let first = FirstFunction::new([&a, &b], "first").into_symbol();
    assert_encoding_forced(&model_with(&first, &[&a, &b]), &first, &[&a, &b]);
}

#[test]
fn test_satisfied_amount_is_forced() {
    let p = [
        Variable::binary("p1"),
        Variable::binary("p2"),
        Variable::binary("p3"),
    ];
    let operands = [&p[0], &p[1], &p[2]];
    let at_least = SatisfiedAmountFunction::at_least(&p, 2, "two").into_symbol();
    assert_encoding_forced(&model_with(&at_least, &operands), &at_least, &operands);

    let count = SatisfiedAmountFunction::numerable(&p, "count").into_symbol();
    assert_encoding_forced(&model_with(&count, &operands), &count, &operands);
}

#[test]
fn test_inequality_count_matches_every_inequality() {
    let x = Variable::integer("x").with_range(0.0, 8.0);

    let window = SatisfiedAmountInequalityFunction::numerable(
        vec![LinearPolynomial::from(&x).leq(4.0), LinearPolynomial::from(&x).geq(2.0)],
        "window",
    )
    .with_config(coarse())
    .into_symbol();
    let seen = assert_encoding_forced(&model_with(&window, &[&x]), &window, &[&x]);
    assert_eq!(seen[3], (vec![3.0], 2.0));

    let strict = SatisfiedAmountInequalityFunction::numerable(
        vec![LinearPolynomial::from(&x).less(4.0)],
        "strict",
    )
    .with_config(coarse())
    .into_symbol();
    let seen = assert_encoding_forced(&model_with(&strict, &[&x]), &strict, &[&x]);
    assert_eq!(seen[3], (vec![3.0], 1.0));
    assert_eq!(seen[4], (vec![4.0], 0.0));

    let two = SatisfiedAmountInequalityFunction::at_least(
        vec![
            LinearPolynomial::from(&x).leq(4.0),
            LinearPolynomial::from(&x).geq(2.0),
            LinearPolynomial::from(&x).equals(5.0),
        ],
        2,
        "two",
    )
    .with_config(coarse())
    .into_symbol();
    assert_encoding_forced(&model_with(&two, &[&x]), &two, &[&x]);
}

#[test]
fn test_if_indicator_is_forced() {
    let x = Variable::integer("x").with_range(0.0, 8.0);
    let inequalities = [
        LinearPolynomial::from(&x).leq(4.0),
        LinearPolynomial::from(&x).less(4.0),
        LinearPolynomial::from(&x).greater(4.0),
        LinearPolynomial::from(&x).equals(5.0),
    ];
    for (i, inequality) in inequalities.into_iter().enumerate() {
        let check = IfFunction::new(inequality, format!("if_{i}"))
            .with_config(coarse())
            .into_symbol();
        assert_encoding_forced(&model_with(&check, &[&x]), &check, &[&x]);
    }
}

#[test]
fn test_masking_and_semi_follow_their_flag() {
    let x = Variable::integer("x").with_range(-2.0, 3.0);
    let m = Variable::binary("m");
    let masked = MaskingFunction::new(&x, Some(LinearPolynomial::from(&m)), "masked").into_symbol();
    assert_encoding_forced(&model_with(&masked, &[&x, &m]), &masked, &[&x, &m]);

    let z = Variable::uinteger("z").with_range(0.0, 3.0);
    let f = Variable::binary("f");
    let semi = SemiFunction::new(&z, Some(LinearPolynomial::from(&f)), "semi").into_symbol();
    assert_encoding_forced(&model_with(&semi, &[&z, &f]), &semi, &[&z, &f]);
}

#[test]
fn test_slack_is_exact_at_its_minimum() {
    let x = Variable::integer("x").with_range(0.0, 6.0);

    let slack = SlackFunction::new(&x, LinearPolynomial::from(4.0), "gap").into_symbol();
    assert_encoding_minimal(&model_with(&slack, &[&x]), &slack, &[&x]);

    let short =
        SlackFunction::threshold(&x, LinearPolynomial::from(4.0), false, "short").into_symbol();
    assert_encoding_minimal(&model_with(&short, &[&x]), &short, &[&x]);
}
