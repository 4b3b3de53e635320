//! Indicators of linear inequalities and the conditionals built on them.

use std::cell::{Cell, OnceCell};

use tracing::debug;

use super::indicator::BinaryzationFunction;
use super::logic::{AndFunction, OrFunction};
use super::{
    application_failed, auxiliaries_of, bool_value, dependencies_of, prepare_all, prepare_owned,
    prepare_with, Assignment, FunctionSymbol, Header, IntoSymbol, SymbolRef,
};
use crate::config::SymbolConfig;
use crate::domain::{
    FixedValues, LinearInequality, LinearModel, LinearPolynomial, NormalizedInequality, Sign,
    Solution, TokenTable, ValueRange, ValueSource, Variable,
};
use crate::error::Result;

fn judged_range(truth: Option<bool>) -> ValueRange {
    truth.map_or(ValueRange::UNIT, |truth| ValueRange::point(bool_value(truth)))
}

enum Built {
    Constant(f64),
    Linked {
        y: Variable,
        /// Weights of `L`, `c` and `U`.
        k: [Variable; 3],
        /// Side of `c` for equalities.
        side: Option<Variable>,
    },
}

/// `1` iff a linear inequality holds.
///
/// With `poly ⋈ c` normalized and `poly ∈ [L, U]`, the polynomial is written
/// as `L·k₀ + c·k₁ + U·k₂` over percentage weights, and `y` decides which
/// weights may be positive. Strict sides are separated by epsilon.
pub struct IfFunction {
    header: Header,
    inequality: LinearInequality,
    config: SymbolConfig,
    range: Cell<ValueRange>,
    built: OnceCell<Built>,
}

impl IfFunction {
    pub fn new(inequality: LinearInequality, name: impl Into<String>) -> Self {
        let range = Cell::new(judged_range(inequality.judge()));
        Self {
            header: Header::new(name),
            inequality,
            config: SymbolConfig::default(),
            range,
            built: OnceCell::new(),
        }
    }

    #[must_use]
    pub fn with_config(mut self, config: SymbolConfig) -> Self {
        self.config = config;
        self
    }

    #[must_use]
    pub fn inequality(&self) -> &LinearInequality {
        &self.inequality
    }

    fn build(&self) -> &Built {
        self.built.get_or_init(|| match self.inequality.judge() {
            Some(truth) => {
                debug!(symbol = %self.header.name, truth, "inequality decided by bounds");
                Built::Constant(bool_value(truth))
            }
            None => {
                debug!(symbol = %self.header.name, inequality = %self.inequality, "linking inequality indicator");
                let weight = |suffix: &str| Variable::percentage(self.header.child(suffix));
                Built::Linked {
                    y: Variable::binary(self.header.child("y")),
                    k: [weight("k_lb"), weight("k_c"), weight("k_ub")],
                    side: (self.inequality.sign == Sign::Equal)
                        .then(|| Variable::binary(self.header.child("s"))),
                }
            }
        })
    }

    fn normalized(&self) -> NormalizedInequality {
        self.inequality.normalize()
    }

    fn assignment(&self, source: &dyn ValueSource) -> Option<Assignment> {
        let truth = self.inequality.is_true(source, false)?;
        let value = bool_value(truth);
        let mut assignment = Assignment::new(value);
        if let Built::Linked { y, k, side } = self.build() {
            let normalized = self.normalized();
            let v = normalized.poly.evaluate(source, false)?;
            let (c, lower, upper) = (
                normalized.threshold,
                normalized.poly.lower_bound(),
                normalized.poly.upper_bound(),
            );
            let mut weights = [0.0, 1.0, 0.0];
            if v < c && c - lower > 0.0 {
                weights[0] = ((c - v) / (c - lower)).clamp(0.0, 1.0);
                weights[1] = 1.0 - weights[0];
            } else if v > c && upper - c > 0.0 {
                weights[2] = ((v - c) / (upper - c)).clamp(0.0, 1.0);
                weights[1] = 1.0 - weights[2];
            }
            assignment.push(y, value);
            for (variable, weight) in k.iter().zip(weights) {
                assignment.push(variable, weight);
            }
            if let Some(side) = side {
                assignment.push(side, bool_value(v < c));
            }
        }
        Some(assignment)
    }
}

header_builders!(IfFunction);

impl FunctionSymbol for IfFunction {
    header_accessors!();

    fn discrete(&self) -> bool {
        true
    }

    fn range(&self) -> ValueRange {
        self.range.get()
    }

    fn dependencies(&self) -> Vec<SymbolRef> {
        self.inequality.dependencies()
    }

    fn polynomial(&self) -> LinearPolynomial {
        match self.build() {
            Built::Constant(value) => LinearPolynomial::from(*value),
            Built::Linked { y, .. } => LinearPolynomial::from(y),
        }
    }

    fn auxiliary_variables(&self) -> Vec<Variable> {
        match self.built.get() {
            Some(Built::Linked { y, k, side }) => std::iter::once(y)
                .chain(k.iter())
                .chain(side.as_ref())
                .cloned()
                .collect(),
            _ => Vec::new(),
        }
    }

    fn flush(&self, force: bool) {
        self.inequality.flush(force);
        self.range.set(judged_range(self.inequality.judge()));
    }

    fn prepare(
        &self,
        fixed: Option<&FixedValues>,
        tokens: &TokenTable,
        warm_start: &mut Solution,
    ) -> Option<f64> {
        prepare_with(&self.header.name, fixed, tokens, warm_start, |source| {
            self.assignment(source)
        })
    }

    fn register_tokens(&self, tokens: &mut TokenTable) -> Result<()> {
        let Built::Linked { y, k, side } = self.build() else {
            return Ok(());
        };
        if self.inequality.sign == Sign::Unequal {
            return Err(application_failed(
                &self.header.name,
                "inequality indicator does not support !=",
            ));
        }
        let normalized = self.normalized();
        if !normalized.poly.range().is_finite() {
            return Err(application_failed(
                &self.header.name,
                format!("{} needs finite bounds, range is {}", normalized.poly, normalized.poly.range()),
            ));
        }
        tokens.add(y)?;
        tokens.add_all(k)?;
        if let Some(side) = side {
            tokens.add(side)?;
        }
        Ok(())
    }

    fn register_model(&self, model: &mut LinearModel) -> Result<()> {
        let Built::Linked { y, k, side } = self.build() else {
            return Ok(());
        };
        let origin = Some(self.header.origin());
        let normalized = self.normalized();
        let (c, lower, upper) = (
            normalized.threshold,
            normalized.poly.lower_bound(),
            normalized.poly.upper_bound(),
        );
        let epsilon = self.config.epsilon;
        let [k_lower, k_c, k_upper] = k;
        let on = LinearPolynomial::from(y);
        let off = LinearPolynomial::from(1.0) - y;

        model.add_constraint(
            normalized
                .poly
                .clone()
                .equals(lower * k_lower + c * k_c + upper * k_upper),
            self.header.child("poly"),
            origin,
        )?;
        model.add_constraint(
            k.iter().sum::<LinearPolynomial>().equals(1.0),
            self.header.child("k"),
            origin,
        )?;

        let mut add = |inequality: LinearInequality, suffix: &str| {
            model.add_constraint(inequality, self.header.child(suffix), origin)
        };
        match normalized.sign {
            Sign::LessEqual => {
                add(LinearPolynomial::from(k_lower).leq(on.clone()), "lb")?;
                add(LinearPolynomial::from(k_upper).leq(off.clone()), "ub")?;
                add(((upper - c) * k_upper).geq(epsilon * off), "gap")?;
            }
            Sign::Less => {
                add(LinearPolynomial::from(k_lower).leq(on.clone()), "lb")?;
                add(LinearPolynomial::from(k_upper).leq(off), "ub")?;
                add(((c - lower) * k_lower).geq(epsilon * on), "gap")?;
            }
            Sign::GreaterEqual => {
                add(LinearPolynomial::from(k_lower).leq(off.clone()), "lb")?;
                add(LinearPolynomial::from(k_upper).leq(on), "ub")?;
                add(((c - lower) * k_lower).geq(epsilon * off), "gap")?;
            }
            Sign::Greater => {
                add(LinearPolynomial::from(k_lower).leq(off), "lb")?;
                add(LinearPolynomial::from(k_upper).leq(on.clone()), "ub")?;
                add(((upper - c) * k_upper).geq(epsilon * on), "gap")?;
            }
            Sign::Equal => {
                if let Some(side) = side {
                    add(LinearPolynomial::from(k_lower).leq(side), "lb")?;
                    add(
                        LinearPolynomial::from(k_upper).leq(LinearPolynomial::from(1.0) - side),
                        "ub",
                    )?;
                }
                add(LinearPolynomial::from(k_c).geq(on), "eq")?;
                add(
                    ((c - lower) * k_lower + (upper - c) * k_upper).geq(epsilon * off),
                    "gap",
                )?;
            }
            Sign::Unequal => {}
        }
        Ok(())
    }

    fn register_model_fixed(&self, model: &mut LinearModel, fixed: &FixedValues) -> Result<()> {
        match self.assignment(fixed) {
            Some(assignment) => assignment.pin(model, &self.header),
            None => self.register_model(model),
        }
    }

    fn calculate_value(&self, source: &dyn ValueSource, zero_if_none: bool) -> Option<f64> {
        self.inequality
            .is_true(source, zero_if_none)
            .map(bool_value)
    }
}

pub(super) fn register_tokens_all(symbols: &[SymbolRef], tokens: &mut TokenTable) -> Result<()> {
    symbols.iter().try_for_each(|symbol| symbol.register_tokens(tokens))
}

pub(super) fn register_model_all(symbols: &[SymbolRef], model: &mut LinearModel) -> Result<()> {
    symbols.iter().try_for_each(|symbol| symbol.register_model(model))
}

pub(super) fn register_model_fixed_all(symbols: &[SymbolRef], model: &mut LinearModel, fixed: &FixedValues) -> Result<()> {
    symbols
        .iter()
        .try_for_each(|symbol| symbol.register_model_fixed(model, fixed))
}

/// `1` iff `lb ≤ x ≤ ub`.
pub struct IfInFunction {
    header: Header,
    x: LinearPolynomial,
    checks: Vec<SymbolRef>,
    both: AndFunction,
}

impl IfInFunction {
    pub fn new(
        x: impl Into<LinearPolynomial>,
        lower: impl Into<LinearPolynomial>,
        upper: impl Into<LinearPolynomial>,
        name: impl Into<String>,
    ) -> Self {
        let header = Header::new(name);
        let x = x.into();
        let checks = vec![
            IfFunction::new(x.clone().geq(lower), header.child("lb"))
                .with_parent(header.name.clone())
                .into_symbol(),
            IfFunction::new(x.clone().leq(upper), header.child("ub"))
                .with_parent(header.name.clone())
                .into_symbol(),
        ];
        let both = AndFunction::new(checks.iter(), header.child("and")).with_parent(header.name.clone());
        Self {
            header,
            x,
            checks,
            both,
        }
    }

    #[must_use]
    pub fn operand(&self) -> &LinearPolynomial {
        &self.x
    }
}

header_builders!(IfInFunction);

impl FunctionSymbol for IfInFunction {
    header_accessors!();

    fn discrete(&self) -> bool {
        true
    }

    fn range(&self) -> ValueRange {
        self.both.range()
    }

    fn dependencies(&self) -> Vec<SymbolRef> {
        let mut found = self.x.dependencies();
        for check in &self.checks {
            for symbol in check.dependencies() {
                if !found.iter().any(|s| std::rc::Rc::ptr_eq(s, &symbol)) {
                    found.push(symbol);
                }
            }
        }
        found
    }

    fn polynomial(&self) -> LinearPolynomial {
        self.both.polynomial()
    }

    fn auxiliary_variables(&self) -> Vec<Variable> {
        let mut variables = auxiliaries_of(&self.checks);
        variables.extend(self.both.auxiliary_variables());
        variables
    }

    fn flush(&self, force: bool) {
        for check in &self.checks {
            check.flush(force);
        }
        self.both.flush(force);
    }

    fn prepare(
        &self,
        fixed: Option<&FixedValues>,
        tokens: &TokenTable,
        warm_start: &mut Solution,
    ) -> Option<f64> {
        prepare_all(&self.checks, fixed, tokens, warm_start);
        prepare_owned(&self.both, fixed, tokens, warm_start);
        prepare_with(&self.header.name, fixed, tokens, warm_start, |source| {
            self.calculate_value(source, false).map(Assignment::new)
        })
    }

    fn register_tokens(&self, tokens: &mut TokenTable) -> Result<()> {
        register_tokens_all(&self.checks, tokens)?;
        self.both.register_tokens(tokens)
    }

    fn register_model(&self, model: &mut LinearModel) -> Result<()> {
        register_model_all(&self.checks, model)?;
        self.both.register_model(model)
    }

    fn register_model_fixed(&self, model: &mut LinearModel, fixed: &FixedValues) -> Result<()> {
        register_model_fixed_all(&self.checks, model, fixed)?;
        self.both.register_model_fixed(model, fixed)
    }

    fn calculate_value(&self, source: &dyn ValueSource, zero_if_none: bool) -> Option<f64> {
        self.both.calculate_value(source, zero_if_none)
    }
}

fn implication_range(premise: &LinearInequality, conclusion: &LinearInequality) -> ValueRange {
    match (premise.judge(), conclusion.judge()) {
        (Some(false), _) | (_, Some(true)) => ValueRange::point(1.0),
        (Some(true), Some(false)) => ValueRange::point(0.0),
        _ => ValueRange::UNIT,
    }
}

/// `p ⇒ q` over two inequalities.
///
/// As a constraint the implication is enforced (`[p] ≤ [q]`) and the value is
/// always 1; as a function the value is `[ [q] − [p] + 1 ≠ 0 ]`.
pub struct IfThenFunction {
    header: Header,
    premise: LinearInequality,
    conclusion: LinearInequality,
    checks: Vec<SymbolRef>,
    implication: Option<BinaryzationFunction>,
    range: Cell<ValueRange>,
}

impl IfThenFunction {
    fn build(premise: LinearInequality, conclusion: LinearInequality, enforce: bool, name: impl Into<String>) -> Self {
        let header = Header::new(name);
        let checks = vec![
            IfFunction::new(premise.clone(), header.child("p"))
                .with_parent(header.name.clone())
                .into_symbol(),
            IfFunction::new(conclusion.clone(), header.child("q"))
                .with_parent(header.name.clone())
                .into_symbol(),
        ];
        let implication = (!enforce).then(|| {
            let sum = LinearPolynomial::from(&checks[1]) - &checks[0] + 1.0;
            BinaryzationFunction::new(sum, header.child("imply")).with_parent(header.name.clone())
        });
        let range = Cell::new(if enforce {
            ValueRange::point(1.0)
        } else {
            implication_range(&premise, &conclusion)
        });
        Self {
            header,
            premise,
            conclusion,
            checks,
            implication,
            range,
        }
    }

    /// Implication as a function of its operands.
    pub fn new(premise: LinearInequality, conclusion: LinearInequality, name: impl Into<String>) -> Self {
        Self::build(premise, conclusion, false, name)
    }

    /// Implication enforced on the model.
    pub fn constraint(premise: LinearInequality, conclusion: LinearInequality, name: impl Into<String>) -> Self {
        Self::build(premise, conclusion, true, name)
    }

    #[must_use]
    pub fn is_constraint(&self) -> bool {
        self.implication.is_none()
    }

    fn truth(&self, source: &dyn ValueSource, zero_if_none: bool) -> Option<bool> {
        let premise = self.premise.is_true(source, zero_if_none)?;
        let conclusion = self.conclusion.is_true(source, zero_if_none)?;
        Some(!premise || conclusion)
    }
}

header_builders!(IfThenFunction);

impl FunctionSymbol for IfThenFunction {
    header_accessors!();

    fn discrete(&self) -> bool {
        true
    }

    fn range(&self) -> ValueRange {
        self.range.get()
    }

    fn dependencies(&self) -> Vec<SymbolRef> {
        let mut found = self.premise.dependencies();
        for symbol in self.conclusion.dependencies() {
            if !found.iter().any(|s| std::rc::Rc::ptr_eq(s, &symbol)) {
                found.push(symbol);
            }
        }
        found
    }

    fn polynomial(&self) -> LinearPolynomial {
        match &self.implication {
            Some(implication) => implication.polynomial(),
            None => LinearPolynomial::from(1.0),
        }
    }

    fn auxiliary_variables(&self) -> Vec<Variable> {
        let mut variables = auxiliaries_of(&self.checks);
        if let Some(implication) = &self.implication {
            variables.extend(implication.auxiliary_variables());
        }
        variables
    }

    fn flush(&self, force: bool) {
        for check in &self.checks {
            check.flush(force);
        }
        if let Some(implication) = &self.implication {
            implication.flush(force);
            self.range.set(implication_range(&self.premise, &self.conclusion));
        }
    }

    fn prepare(
        &self,
        fixed: Option<&FixedValues>,
        tokens: &TokenTable,
        warm_start: &mut Solution,
    ) -> Option<f64> {
        prepare_all(&self.checks, fixed, tokens, warm_start);
        if let Some(implication) = &self.implication {
            prepare_owned(implication, fixed, tokens, warm_start);
        }
        prepare_with(&self.header.name, fixed, tokens, warm_start, |source| {
            self.calculate_value(source, false).map(Assignment::new)
        })
    }

    fn register_tokens(&self, tokens: &mut TokenTable) -> Result<()> {
        register_tokens_all(&self.checks, tokens)?;
        match &self.implication {
            Some(implication) => implication.register_tokens(tokens),
            None => Ok(()),
        }
    }

    fn register_model(&self, model: &mut LinearModel) -> Result<()> {
        register_model_all(&self.checks, model)?;
        match &self.implication {
            Some(implication) => implication.register_model(model),
            None => model.add_constraint(
                LinearPolynomial::from(&self.checks[0]).leq(&self.checks[1]),
                self.header.child("imply"),
                Some(self.header.origin()),
            ),
        }
    }

    fn register_model_fixed(&self, model: &mut LinearModel, fixed: &FixedValues) -> Result<()> {
        register_model_fixed_all(&self.checks, model, fixed)?;
        match &self.implication {
            Some(implication) => implication.register_model_fixed(model, fixed),
            None => model.add_constraint(
                LinearPolynomial::from(&self.checks[0]).leq(&self.checks[1]),
                self.header.child("imply"),
                Some(self.header.origin()),
            ),
        }
    }

    fn calculate_value(&self, source: &dyn ValueSource, zero_if_none: bool) -> Option<f64> {
        if self.implication.is_none() {
            return Some(1.0);
        }
        self.truth(source, zero_if_none).map(bool_value)
    }
}

fn agreement_range(inequalities: &[LinearInequality]) -> ValueRange {
    let judged: Option<Vec<bool>> = inequalities.iter().map(LinearInequality::judge).collect();
    match judged {
        Some(truths) => {
            let all = truths.iter().all(|t| *t);
            let none = truths.iter().all(|t| !*t);
            ValueRange::point(bool_value(all || none))
        }
        None => ValueRange::UNIT,
    }
}

/// `1` iff every inequality has the same truth value.
///
/// `y = 1 − any + all` over the inequality indicators.
pub struct SameAsFunction {
    header: Header,
    inequalities: Vec<LinearInequality>,
    checks: Vec<SymbolRef>,
    all: AndFunction,
    any: OrFunction,
    range: Cell<ValueRange>,
}

impl SameAsFunction {
    pub fn new(inequalities: Vec<LinearInequality>, name: impl Into<String>) -> Self {
        let header = Header::new(name);
        let checks: Vec<SymbolRef> = inequalities
            .iter()
            .enumerate()
            .map(|(i, inequality)| {
                IfFunction::new(inequality.clone(), header.child(format_args!("u_{i}")))
                    .with_parent(header.name.clone())
                    .into_symbol()
            })
            .collect();
        let all = AndFunction::new(checks.iter(), header.child("all")).with_parent(header.name.clone());
        let any = OrFunction::new(checks.iter(), header.child("any")).with_parent(header.name.clone());
        let range = Cell::new(agreement_range(&inequalities));
        Self {
            header,
            inequalities,
            checks,
            all,
            any,
            range,
        }
    }
}

header_builders!(SameAsFunction);

impl FunctionSymbol for SameAsFunction {
    header_accessors!();

    fn discrete(&self) -> bool {
        true
    }

    fn range(&self) -> ValueRange {
        self.range.get()
    }

    fn dependencies(&self) -> Vec<SymbolRef> {
        let operands: Vec<LinearPolynomial> = self
            .inequalities
            .iter()
            .flat_map(|inequality| [inequality.lhs.clone(), inequality.rhs.clone()])
            .collect();
        dependencies_of(&operands)
    }

    fn polynomial(&self) -> LinearPolynomial {
        LinearPolynomial::from(1.0) - self.any.polynomial() + self.all.polynomial()
    }

    fn auxiliary_variables(&self) -> Vec<Variable> {
        let mut variables = auxiliaries_of(&self.checks);
        variables.extend(self.all.auxiliary_variables());
        variables.extend(self.any.auxiliary_variables());
        variables
    }

    fn flush(&self, force: bool) {
        for check in &self.checks {
            check.flush(force);
        }
        self.all.flush(force);
        self.any.flush(force);
        self.range.set(agreement_range(&self.inequalities));
    }

    fn prepare(
        &self,
        fixed: Option<&FixedValues>,
        tokens: &TokenTable,
        warm_start: &mut Solution,
    ) -> Option<f64> {
        prepare_all(&self.checks, fixed, tokens, warm_start);
        prepare_owned(&self.all, fixed, tokens, warm_start);
        prepare_owned(&self.any, fixed, tokens, warm_start);
        prepare_with(&self.header.name, fixed, tokens, warm_start, |source| {
            self.calculate_value(source, false).map(Assignment::new)
        })
    }

    fn register_tokens(&self, tokens: &mut TokenTable) -> Result<()> {
        register_tokens_all(&self.checks, tokens)?;
        self.all.register_tokens(tokens)?;
        self.any.register_tokens(tokens)
    }

    fn register_model(&self, model: &mut LinearModel) -> Result<()> {
        register_model_all(&self.checks, model)?;
        self.all.register_model(model)?;
        self.any.register_model(model)
    }

    fn register_model_fixed(&self, model: &mut LinearModel, fixed: &FixedValues) -> Result<()> {
        register_model_fixed_all(&self.checks, model, fixed)?;
        self.all.register_model_fixed(model, fixed)?;
        self.any.register_model_fixed(model, fixed)
    }

    fn calculate_value(&self, source: &dyn ValueSource, zero_if_none: bool) -> Option<f64> {
        let mut truths = Vec::with_capacity(self.inequalities.len());
        for inequality in &self.inequalities {
            truths.push(inequality.is_true(source, zero_if_none)?);
        }
        let agree = truths.iter().all(|t| *t) || truths.iter().all(|t| !*t);
        Some(bool_value(agree))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbol::testing::Harness;

    #[test]
    fn test_if_decided_by_bounds_is_constant() {
        let x = Variable::integer("x").with_range(0.0, 3.0);
        let check = IfFunction::new(LinearPolynomial::from(&x).leq(5.0), "check");
        assert_eq!(check.range(), ValueRange::point(1.0));
        assert_eq!(check.polynomial().constant(), 1.0);
    }

    #[test]
    fn test_if_each_sign_matches_evaluation() {
        let x = Variable::integer("x").with_range(0.0, 10.0);
        for sign in [
            Sign::LessEqual,
            Sign::Less,
            Sign::GreaterEqual,
            Sign::Greater,
            Sign::Equal,
        ] {
            let inequality = LinearPolynomial::from(&x).with_sign(sign, 4.0);
            let check = IfFunction::new(inequality, "check").into_symbol();
            let mut harness = Harness::new(check, &[&x]);
            for value in [0.0, 3.0, 4.0, 5.0, 10.0] {
                let expected = bool_value(sign.holds(value, 4.0));
                assert_eq!(harness.at(&[(&x, value)]), expected, "{sign} at {value}");
            }
        }
    }

    #[test]
    fn test_if_unequal_fails_when_undecided() {
        let x = Variable::integer("x").with_range(0.0, 10.0);
        let check = IfFunction::new(LinearPolynomial::from(&x).with_sign(Sign::Unequal, 4.0), "check");
        let mut tokens = TokenTable::new();
        assert!(check.register_tokens(&mut tokens).unwrap_err().is_application_failed());
    }

    #[test]
    fn test_if_unbounded_fails() {
        let x = Variable::integer("x");
        let check = IfFunction::new(LinearPolynomial::from(&x).leq(4.0), "check");
        let mut tokens = TokenTable::new();
        assert!(check.register_tokens(&mut tokens).unwrap_err().is_application_failed());
    }

    #[test]
    fn test_if_in_interval() {
        let x = Variable::integer("x").with_range(0.0, 10.0);
        let inside = IfInFunction::new(&x, 3.0, 6.0, "inside").into_symbol();
        let mut harness = Harness::new(inside, &[&x]);
        assert_eq!(harness.at(&[(&x, 2.0)]), 0.0);
        assert_eq!(harness.at(&[(&x, 3.0)]), 1.0);
        assert_eq!(harness.at(&[(&x, 6.0)]), 1.0);
        assert_eq!(harness.at(&[(&x, 7.0)]), 0.0);
    }

    #[test]
    fn test_if_then_function() {
        let x = Variable::integer("x").with_range(0.0, 10.0);
        let y = Variable::integer("y").with_range(0.0, 10.0);
        let imply = IfThenFunction::new(
            LinearPolynomial::from(&x).geq(5.0),
            LinearPolynomial::from(&y).geq(2.0),
            "imply",
        )
        .into_symbol();
        let mut harness = Harness::new(imply, &[&x, &y]);
        assert_eq!(harness.at(&[(&x, 6.0), (&y, 1.0)]), 0.0);
        assert_eq!(harness.at(&[(&x, 6.0), (&y, 3.0)]), 1.0);
        assert_eq!(harness.at(&[(&x, 1.0), (&y, 0.0)]), 1.0);
    }

    #[test]
    fn test_if_then_constraint_forbids_violation() {
        let x = Variable::integer("x").with_range(0.0, 10.0);
        let y = Variable::integer("y").with_range(0.0, 10.0);
        let imply = IfThenFunction::constraint(
            LinearPolynomial::from(&x).geq(5.0),
            LinearPolynomial::from(&y).geq(2.0),
            "imply",
        );
        assert!(imply.is_constraint());
        let imply = imply.into_symbol();
        let mut model = LinearModel::new();
        model.tokens_mut().add_all([&x, &y]).unwrap();
        model.add_symbol(&imply).unwrap();

        let mut solution = Solution::new();
        solution.set(&x, 6.0);
        solution.set(&y, 1.0);
        model.tokens_mut().load_solution(solution.clone());
        let mut warm = solution;
        imply.prepare_and_cache(None, model.tokens(), &mut warm);
        assert_eq!(model.check(&warm), vec!["imply_imply".to_string()]);
    }

    #[test]
    fn test_same_as() {
        let x = Variable::integer("x").with_range(0.0, 10.0);
        let y = Variable::integer("y").with_range(0.0, 10.0);
        let same = SameAsFunction::new(
            vec![
                LinearPolynomial::from(&x).geq(5.0),
                LinearPolynomial::from(&y).leq(2.0),
            ],
            "same",
        )
        .into_symbol();
        let mut harness = Harness::new(same, &[&x, &y]);
        assert_eq!(harness.at(&[(&x, 6.0), (&y, 1.0)]), 1.0);
        assert_eq!(harness.at(&[(&x, 1.0), (&y, 5.0)]), 1.0);
        assert_eq!(harness.at(&[(&x, 6.0), (&y, 5.0)]), 0.0);
    }
}
