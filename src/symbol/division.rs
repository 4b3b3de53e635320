//! Integer division by a constant, written as the Euclidean constraint
//! `x = d·q ± r`.

use std::cell::{Cell, OnceCell};

use tracing::debug;

use super::{
    application_failed, prepare_owned, prepare_with, Assignment, FunctionSymbol, Header,
    SymbolRef,
};
use crate::config::SymbolConfig;
use crate::domain::range::{is_integer, TOLERANCE};
use crate::domain::{
    FixedValues, LinearModel, LinearPolynomial, Solution, TokenTable, ValueRange, ValueSource,
    Variable,
};
use crate::error::Result;

/// What the division returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DivisionMode {
    /// `⌊x / d⌋`.
    Floor,
    /// `⌈x / d⌉`.
    Ceiling,
    /// `⌊x / d + 1/2⌋`.
    Round,
    /// `x − d·⌊x / d⌋`.
    Mod,
}

impl DivisionMode {
    fn quotient(self, ratio: f64) -> f64 {
        match self {
            DivisionMode::Floor | DivisionMode::Mod => (ratio + TOLERANCE).floor(),
            DivisionMode::Ceiling => (ratio - TOLERANCE).ceil(),
            DivisionMode::Round => (ratio + 0.5 + TOLERANCE).floor(),
        }
    }
}

struct Built {
    quotient: Variable,
    remainder: Variable,
}

/// `x` divided by the constant `d`, per [`DivisionMode`].
pub struct DivisionFunction {
    header: Header,
    x: LinearPolynomial,
    divisor: f64,
    mode: DivisionMode,
    epsilon: f64,
    range: Cell<ValueRange>,
    built: OnceCell<Built>,
}

impl DivisionFunction {
    pub fn new(
        x: impl Into<LinearPolynomial>,
        divisor: f64,
        mode: DivisionMode,
        name: impl Into<String>,
    ) -> Self {
        let mut function = Self {
            header: Header::new(name),
            x: x.into(),
            divisor,
            mode,
            epsilon: SymbolConfig::default().epsilon,
            range: Cell::new(ValueRange::ZERO),
            built: OnceCell::new(),
        };
        function.range = Cell::new(function.value_range());
        function
    }

    pub fn floor(x: impl Into<LinearPolynomial>, divisor: f64, name: impl Into<String>) -> Self {
        Self::new(x, divisor, DivisionMode::Floor, name)
    }

    pub fn ceiling(x: impl Into<LinearPolynomial>, divisor: f64, name: impl Into<String>) -> Self {
        Self::new(x, divisor, DivisionMode::Ceiling, name)
    }

    pub fn round(x: impl Into<LinearPolynomial>, divisor: f64, name: impl Into<String>) -> Self {
        Self::new(x, divisor, DivisionMode::Round, name)
    }

    pub fn modulo(x: impl Into<LinearPolynomial>, divisor: f64, name: impl Into<String>) -> Self {
        Self::new(x, divisor, DivisionMode::Mod, name)
    }

    #[must_use]
    pub fn with_config(mut self, config: SymbolConfig) -> Self {
        self.epsilon = config.epsilon;
        self.range.set(self.value_range());
        self
    }

    #[must_use]
    pub fn mode(&self) -> DivisionMode {
        self.mode
    }

    /// The quotient variable `q`.
    pub fn quotient(&self) -> Variable {
        self.build().quotient.clone()
    }

    /// The remainder variable `r`.
    pub fn remainder(&self) -> Variable {
        self.build().remainder.clone()
    }

    fn quotient_range(&self) -> ValueRange {
        let range = self.x.range();
        if self.divisor == 0.0 {
            return ValueRange::ZERO;
        }
        ValueRange::spanning(
            self.mode.quotient(range.lower() / self.divisor),
            self.mode.quotient(range.upper() / self.divisor),
        )
    }

    fn remainder_range(&self) -> ValueRange {
        let (d, epsilon) = (self.divisor, self.epsilon);
        match self.mode {
            DivisionMode::Floor | DivisionMode::Mod | DivisionMode::Ceiling if d > 0.0 => {
                ValueRange::spanning(0.0, d - epsilon)
            }
            DivisionMode::Floor | DivisionMode::Mod | DivisionMode::Ceiling => {
                ValueRange::spanning(d + epsilon, 0.0)
            }
            DivisionMode::Round if d > 0.0 => ValueRange::spanning(-d / 2.0, d / 2.0 - epsilon),
            DivisionMode::Round => ValueRange::spanning(d / 2.0 + epsilon, -d / 2.0),
        }
    }

    fn value_range(&self) -> ValueRange {
        match self.mode {
            DivisionMode::Mod if self.discrete() => {
                let d = self.divisor;
                if d > 0.0 {
                    ValueRange::spanning(0.0, d - 1.0)
                } else {
                    ValueRange::spanning(d + 1.0, 0.0)
                }
            }
            DivisionMode::Mod => self.remainder_range(),
            _ => self.quotient_range(),
        }
    }

    fn build(&self) -> &Built {
        self.built.get_or_init(|| {
            let quotient = Variable::integer(self.header.child("q"));
            quotient.set_range(self.quotient_range());
            let remainder = Variable::real(self.header.child("r"));
            remainder.set_range(self.remainder_range());
            debug!(
                symbol = %self.header.name,
                mode = ?self.mode,
                divisor = self.divisor,
                quotient = %quotient.range(),
                "built division"
            );
            Built {
                quotient,
                remainder,
            }
        })
    }

    /// Quotient and remainder of a concrete dividend.
    fn divide(&self, x: f64) -> (f64, f64) {
        let q = self.mode.quotient(x / self.divisor);
        let r = match self.mode {
            DivisionMode::Ceiling => self.divisor * q - x,
            _ => x - self.divisor * q,
        };
        (q, r)
    }

    fn result(&self, x: f64) -> f64 {
        let (q, r) = self.divide(x);
        match self.mode {
            DivisionMode::Mod => r,
            _ => q,
        }
    }

    fn assignment(&self, source: &dyn ValueSource) -> Option<Assignment> {
        if self.divisor == 0.0 {
            return None;
        }
        let x = self.x.evaluate(source, false)?;
        let (q, r) = self.divide(x);
        let built = self.build();
        Some(
            Assignment::new(self.result(x))
                .with(&built.quotient, q)
                .with(&built.remainder, r),
        )
    }
}

header_builders!(DivisionFunction);

impl FunctionSymbol for DivisionFunction {
    header_accessors!();

    fn discrete(&self) -> bool {
        match self.mode {
            DivisionMode::Mod => self.x.discrete() && is_integer(self.divisor),
            _ => true,
        }
    }

    fn range(&self) -> ValueRange {
        self.range.get()
    }

    fn dependencies(&self) -> Vec<SymbolRef> {
        self.x.dependencies()
    }

    fn polynomial(&self) -> LinearPolynomial {
        let built = self.build();
        match self.mode {
            DivisionMode::Mod => LinearPolynomial::from(&built.remainder),
            _ => LinearPolynomial::from(&built.quotient),
        }
    }

    fn auxiliary_variables(&self) -> Vec<Variable> {
        self.built
            .get()
            .map(|built| vec![built.quotient.clone(), built.remainder.clone()])
            .unwrap_or_default()
    }

    fn flush(&self, force: bool) {
        self.x.flush(force);
        if let Some(built) = self.built.get() {
            built.quotient.set_range(self.quotient_range());
        }
        self.range.set(self.value_range());
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
        if self.divisor == 0.0 || !self.divisor.is_finite() {
            return Err(application_failed(
                &self.header.name,
                format!("divisor must be finite and nonzero, got {}", self.divisor),
            ));
        }
        let built = self.build();
        tokens.add_all([&built.quotient, &built.remainder])?;
        Ok(())
    }

    fn register_model(&self, model: &mut LinearModel) -> Result<()> {
        let built = self.build();
        let scaled = self.divisor * &built.quotient;
        let rhs = match self.mode {
            DivisionMode::Ceiling => scaled - &built.remainder,
            _ => scaled + &built.remainder,
        };
        model.add_constraint(
            self.x.clone().equals(rhs),
            self.header.child("div"),
            Some(self.header.origin()),
        )
    }

    fn register_model_fixed(&self, model: &mut LinearModel, fixed: &FixedValues) -> Result<()> {
        match self.assignment(fixed) {
            Some(assignment) => assignment.pin(model, &self.header),
            None => self.register_model(model),
        }
    }

    fn calculate_value(&self, source: &dyn ValueSource, zero_if_none: bool) -> Option<f64> {
        if self.divisor == 0.0 {
            return None;
        }
        self.x.evaluate(source, zero_if_none).map(|x| self.result(x))
    }
}

/// `lb + step·⌊(ub − lb) / step⌋`: the largest `lb + k·step` not above `ub`.
pub struct InStepRangeFunction {
    header: Header,
    lower: LinearPolynomial,
    upper: LinearPolynomial,
    step: f64,
    steps: DivisionFunction,
    range: Cell<ValueRange>,
}

impl InStepRangeFunction {
    pub fn new(
        lower: impl Into<LinearPolynomial>,
        upper: impl Into<LinearPolynomial>,
        step: f64,
        name: impl Into<String>,
    ) -> Self {
        let header = Header::new(name);
        let lower = lower.into();
        let upper = upper.into();
        let steps = DivisionFunction::floor(upper.clone() - lower.clone(), step, header.child("steps"))
            .with_parent(header.name.clone());
        let range = Cell::new(Self::value_range(&lower, &upper, step));
        Self {
            header,
            lower,
            upper,
            step,
            steps,
            range,
        }
    }

    /// The value never exceeds `ub` and stays above `ub − step`; it is at
    /// least `lb` only while `lb ≤ ub`.
    fn value_range(lower: &LinearPolynomial, upper: &LinearPolynomial, step: f64) -> ValueRange {
        let floor = if upper.lower_bound() >= lower.upper_bound() {
            lower.lower_bound()
        } else {
            lower.lower_bound().min(upper.lower_bound() - step)
        };
        ValueRange::spanning(floor, upper.upper_bound())
    }

    fn value(&self, source: &dyn ValueSource, zero_if_none: bool) -> Option<f64> {
        let lower = self.lower.evaluate(source, zero_if_none)?;
        let steps = self.steps.calculate_value(source, zero_if_none)?;
        Some(lower + steps * self.step)
    }
}

header_builders!(InStepRangeFunction);

impl FunctionSymbol for InStepRangeFunction {
    header_accessors!();

    fn discrete(&self) -> bool {
        self.lower.discrete() && self.upper.discrete() && is_integer(self.step)
    }

    fn range(&self) -> ValueRange {
        self.range.get()
    }

    fn dependencies(&self) -> Vec<SymbolRef> {
        super::dependencies_of([&self.lower, &self.upper])
    }

    fn polynomial(&self) -> LinearPolynomial {
        self.lower.clone() + self.step * self.steps.polynomial()
    }

    fn auxiliary_variables(&self) -> Vec<Variable> {
        self.steps.auxiliary_variables()
    }

    fn flush(&self, force: bool) {
        self.lower.flush(force);
        self.upper.flush(force);
        self.steps.flush(force);
        self.range.set(Self::value_range(&self.lower, &self.upper, self.step));
    }

    fn prepare(
        &self,
        fixed: Option<&FixedValues>,
        tokens: &TokenTable,
        warm_start: &mut Solution,
    ) -> Option<f64> {
        prepare_owned(&self.steps, fixed, tokens, warm_start);
        prepare_with(&self.header.name, fixed, tokens, warm_start, |source| {
            self.value(source, false).map(Assignment::new)
        })
    }

    fn register_tokens(&self, tokens: &mut TokenTable) -> Result<()> {
        if !(self.step > 0.0) {
            return Err(application_failed(
                &self.header.name,
                format!("step must be positive, got {}", self.step),
            ));
        }
        self.steps.register_tokens(tokens)
    }

    fn register_model(&self, model: &mut LinearModel) -> Result<()> {
        self.steps.register_model(model)
    }

    fn register_model_fixed(&self, model: &mut LinearModel, fixed: &FixedValues) -> Result<()> {
        self.steps.register_model_fixed(model, fixed)
    }

    fn calculate_value(&self, source: &dyn ValueSource, zero_if_none: bool) -> Option<f64> {
        self.value(source, zero_if_none)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbol::testing::Harness;
    use crate::symbol::IntoSymbol;

    #[test]
    fn test_ceiling_bounds_and_value() {
        let x = Variable::integer("x").with_range(0.0, 10.0);
        let ceil = DivisionFunction::ceiling(&x, 3.0, "ceil");
        let (q, r) = (ceil.quotient(), ceil.remainder());
        assert_eq!(q.range(), ValueRange::spanning(0.0, 4.0));
        assert_eq!(r.range(), ValueRange::spanning(0.0, 3.0 - 1e-6));

        let mut harness = Harness::new(ceil.into_symbol(), &[&x]);
        assert_eq!(harness.at(&[(&x, 7.0)]), 3.0);
        assert_eq!(harness.at(&[(&x, 9.0)]), 3.0);
        assert_eq!(harness.at(&[(&x, 0.0)]), 0.0);
    }

    #[test]
    fn test_floor_with_negative_divisor() {
        let x = Variable::integer("x").with_range(-6.0, 6.0);
        let floor = DivisionFunction::floor(&x, -4.0, "floor");
        let mut harness = Harness::new(floor.into_symbol(), &[&x]);
        assert_eq!(harness.at(&[(&x, 5.0)]), -2.0);
        assert_eq!(harness.at(&[(&x, -5.0)]), 1.0);
    }

    #[test]
    fn test_mod_is_floor_remainder() {
        let x = Variable::integer("x").with_range(-10.0, 10.0);
        let m = DivisionFunction::modulo(&x, 4.0, "mod");
        assert!(m.discrete());
        assert_eq!(m.range(), ValueRange::spanning(0.0, 3.0));
        let mut harness = Harness::new(m.into_symbol(), &[&x]);
        assert_eq!(harness.at(&[(&x, 7.0)]), 3.0);
        assert_eq!(harness.at(&[(&x, -7.0)]), 1.0);
    }

    #[test]
    fn test_round_half_up() {
        let x = Variable::real("x").with_range(0.0, 10.0);
        let mut harness = Harness::new(DivisionFunction::round(&x, 2.0, "round").into_symbol(), &[&x]);
        assert_eq!(harness.at(&[(&x, 3.0)]), 2.0);
        assert_eq!(harness.at(&[(&x, 2.9)]), 1.0);
    }

    #[test]
    fn test_zero_divisor_fails() {
        let x = Variable::integer("x").with_range(0.0, 10.0);
        let div = DivisionFunction::floor(&x, 0.0, "div");
        let mut tokens = TokenTable::new();
        assert!(div.register_tokens(&mut tokens).unwrap_err().is_application_failed());
    }

    #[test]
    fn test_in_step_range_snaps_down() {
        let lower = Variable::integer("lower").with_range(0.0, 5.0);
        let upper = Variable::integer("upper").with_range(5.0, 20.0);
        let snap = InStepRangeFunction::new(&lower, &upper, 4.0, "snap").into_symbol();
        assert!(snap.discrete());
        let mut harness = Harness::new(snap, &[&lower, &upper]);
        assert_eq!(harness.at(&[(&lower, 1.0), (&upper, 11.0)]), 9.0);
        assert_eq!(harness.at(&[(&lower, 2.0), (&upper, 10.0)]), 10.0);
    }

    #[test]
    fn test_in_step_range_below_lower_bound() {
        let lower = Variable::integer("lower").with_range(3.0, 6.0);
        let upper = Variable::integer("upper").with_range(0.0, 8.0);
        let snap = InStepRangeFunction::new(&lower, &upper, 4.0, "snap").into_symbol();
        assert_eq!(snap.range(), ValueRange::spanning(-4.0, 8.0));
        let mut harness = Harness::new(snap.clone(), &[&lower, &upper]);
        let value = harness.at(&[(&lower, 5.0), (&upper, 0.0)]);
        assert_eq!(value, -3.0);
        assert!(snap.range().contains(value));
    }

    #[test]
    fn test_in_step_range_needs_positive_step() {
        let lower = Variable::integer("lower").with_range(0.0, 5.0);
        let upper = Variable::integer("upper").with_range(5.0, 20.0);
        let snap = InStepRangeFunction::new(&lower, &upper, -2.0, "snap");
        let mut tokens = TokenTable::new();
        assert!(snap.register_tokens(&mut tokens).unwrap_err().is_application_failed());
    }
}
