//! End-to-end solves through the HiGHS backend.

mod support;

use mipform::adapter::HighsSolver;
use mipform::domain::{LinearPolynomial, Variable};
use mipform::port::{Objective, Solver};
use mipform::symbol::{
    AbsFunction, ExtremumFunction, FunctionSymbol, IntoSymbol, SatisfiedAmountFunction,
};

use support::assertions::assert_near;
use support::model::model_with;

#[test]
fn test_abs_lower_bound_pushes_operand_to_the_negative_end() {
    let x = Variable::integer("x").with_range(-3.0, 5.0);
    let abs = AbsFunction::new(&x, "abs_x").into_symbol();
    let mut model = model_with(&abs, &[&x]);
    model
        .add_constraint(LinearPolynomial::from(&abs).geq(3.0), "abs_at_least", None)
        .unwrap();

    let outcome = HighsSolver::new()
        .solve(&model, Some(&Objective::minimize(&x)))
        .unwrap();

    assert_eq!(outcome.solution.get(&x), Some(-3.0));
    let encoded = abs.polynomial().cells().evaluate(&outcome.solution).unwrap();
    assert_near(encoded, 3.0, 1e-6);
    assert_eq!(abs.calculate_value(&outcome.solution, false), Some(3.0));
}

#[test]
fn test_at_least_two_of_three_is_enforced_by_the_solver() {
    let p = [
        Variable::binary("p1"),
        Variable::binary("p2"),
        Variable::binary("p3"),
    ];
    let at_least = SatisfiedAmountFunction::at_least(&p, 2, "two_of_three").into_symbol();
    let mut model = model_with(&at_least, &[&p[0], &p[1], &p[2]]);
    model
        .add_constraint(LinearPolynomial::from(&at_least).equals(1.0), "hold", None)
        .unwrap();

    let objective = Objective::minimize(p.iter().sum::<LinearPolynomial>());
    let outcome = HighsSolver::new().solve(&model, Some(&objective)).unwrap();

    assert_near(outcome.objective, 2.0, 1e-6);
    assert_eq!(at_least.calculate_value(&outcome.solution, false), Some(1.0));
    assert!(model.check(&outcome.solution).is_empty());
}

#[test]
fn test_exact_maximum_matches_evaluation_at_the_optimum() {
    let a = Variable::integer("a").with_range(0.0, 6.0);
    let b = Variable::integer("b").with_range(0.0, 6.0);
    let max = ExtremumFunction::exact_max([&a, &b], "max").into_symbol();
    let mut model = model_with(&max, &[&a, &b]);
    model
        .add_constraint((LinearPolynomial::from(&a) + &b).equals(7.0), "total", None)
        .unwrap();

    let outcome = HighsSolver::new()
        .solve(&model, Some(&Objective::minimize(&max)))
        .unwrap();

    assert_near(outcome.objective, 4.0, 1e-6);
    let value = max.calculate_value(&outcome.solution, false).unwrap();
    assert_near(value, outcome.objective, 1e-6);
}
