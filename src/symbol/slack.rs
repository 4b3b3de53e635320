//! Deviation variables between a polynomial and a target or a band.

use std::cell::{Cell, OnceCell};

use tracing::debug;

use super::{
    application_failed, dependencies_of, prepare_with, Assignment, FunctionSymbol, Header,
    SymbolRef,
};
use crate::domain::{
    FixedValues, LinearModel, LinearPolynomial, Solution, TokenTable, ValueRange, ValueSource,
    Variable,
};
use crate::error::Result;

fn slack_variable(name: String, discrete: bool, upper: f64) -> Variable {
    let variable = if discrete {
        Variable::uinteger(name)
    } else {
        Variable::ureal(name)
    };
    variable.set_range(ValueRange::spanning(0.0, upper.max(0.0)));
    variable
}

struct Parts {
    /// Shortfall of `x` below the target.
    negative: Option<Variable>,
    /// Excess of `x` above the target.
    positive: Option<Variable>,
}

impl Parts {
    fn polynomial(&self) -> LinearPolynomial {
        self.negative
            .iter()
            .chain(self.positive.iter())
            .sum()
    }

    fn variables(&self) -> Vec<Variable> {
        self.negative
            .iter()
            .chain(self.positive.iter())
            .cloned()
            .collect()
    }
}

/// Deviation of `x` from `y`: `x + neg − pos = y`.
///
/// With one side only the value is the one-sided deviation. Threshold mode
/// relaxes the equality so only the kept side is penalized:
///
/// - shortfall (`neg` kept): `x + neg ≥ y`, so `neg ≥ y − x` and `x` above
///   `y` is free;
/// - excess (`pos` kept): `x − pos ≤ y`, so `pos ≥ x − y` and `x` below `y`
///   is free.
pub struct SlackFunction {
    header: Header,
    x: LinearPolynomial,
    y: LinearPolynomial,
    with_negative: bool,
    with_positive: bool,
    threshold: bool,
    constraint: bool,
    range: Cell<ValueRange>,
    built: OnceCell<Parts>,
}

impl SlackFunction {
    pub fn new(
        x: impl Into<LinearPolynomial>,
        y: impl Into<LinearPolynomial>,
        name: impl Into<String>,
    ) -> Self {
        let slack = Self {
            header: Header::new(name),
            x: x.into(),
            y: y.into(),
            with_negative: true,
            with_positive: true,
            threshold: false,
            constraint: true,
            range: Cell::new(ValueRange::ZERO),
            built: OnceCell::new(),
        };
        slack.range.set(slack.value_range());
        slack
    }

    /// One-sided threshold slack: the excess over `threshold` when
    /// `with_positive` (`x − pos ≤ threshold`), the shortfall below it
    /// otherwise (`x + neg ≥ threshold`).
    pub fn threshold(
        x: impl Into<LinearPolynomial>,
        threshold: impl Into<LinearPolynomial>,
        with_positive: bool,
        name: impl Into<String>,
    ) -> Self {
        Self::new(x, threshold, name)
            .with_sides(!with_positive, with_positive)
            .as_threshold()
    }

    #[must_use]
    pub fn with_sides(mut self, negative: bool, positive: bool) -> Self {
        self.with_negative = negative;
        self.with_positive = positive;
        self.range.set(self.value_range());
        self
    }

    #[must_use]
    pub fn as_threshold(mut self) -> Self {
        self.threshold = true;
        self
    }

    /// Keep the slack variables but emit no linking constraint.
    #[must_use]
    pub fn without_constraint(mut self) -> Self {
        self.constraint = false;
        self
    }

    /// The shortfall variable, if that side is kept.
    pub fn negative(&self) -> Option<&Variable> {
        self.build().negative.as_ref()
    }

    /// The excess variable, if that side is kept.
    pub fn positive(&self) -> Option<&Variable> {
        self.build().positive.as_ref()
    }

    fn difference(&self) -> LinearPolynomial {
        self.x.clone() - self.y.clone()
    }

    /// Bounds of the deviation, `None` when `x` can never reach `y`.
    fn bounds(&self) -> Option<ValueRange> {
        self.x.range().intersect(&self.y.range())?;
        let difference = self.difference().range();
        let (low, high) = (difference.lower(), difference.upper());
        let shortfall = ValueRange::spanning((-high).max(0.0), (-low).max(0.0));
        let excess = ValueRange::spanning(low.max(0.0), high.max(0.0));
        Some(match (self.with_negative, self.with_positive) {
            (true, true) => shortfall.union(&excess),
            (true, false) => shortfall,
            (false, true) => excess,
            (false, false) => ValueRange::ZERO,
        })
    }

    fn value_range(&self) -> ValueRange {
        self.bounds().unwrap_or(ValueRange::ZERO)
    }

    fn build(&self) -> &Parts {
        self.built.get_or_init(|| {
            let difference = self.difference();
            let discrete = difference.discrete();
            let range = difference.range();
            debug!(
                symbol = %self.header.name,
                negative = self.with_negative,
                positive = self.with_positive,
                threshold = self.threshold,
                "building slack"
            );
            Parts {
                negative: self
                    .with_negative
                    .then(|| slack_variable(self.header.child("neg"), discrete, -range.lower())),
                positive: self
                    .with_positive
                    .then(|| slack_variable(self.header.child("pos"), discrete, range.upper())),
            }
        })
    }

    fn deviation(&self, x: f64, y: f64) -> f64 {
        match (self.with_negative, self.with_positive) {
            (true, true) => (x - y).abs(),
            (true, false) => (y - x).max(0.0),
            (false, true) => (x - y).max(0.0),
            (false, false) => 0.0,
        }
    }

    fn assignment(&self, source: &dyn ValueSource) -> Option<Assignment> {
        let x = self.x.evaluate(source, false)?;
        let y = self.y.evaluate(source, false)?;
        let mut assignment = Assignment::new(self.deviation(x, y));
        let parts = self.build();
        if let Some(negative) = &parts.negative {
            assignment.push(negative, (y - x).max(0.0));
        }
        if let Some(positive) = &parts.positive {
            assignment.push(positive, (x - y).max(0.0));
        }
        Some(assignment)
    }
}

header_builders!(SlackFunction);

impl FunctionSymbol for SlackFunction {
    header_accessors!();

    fn discrete(&self) -> bool {
        self.difference().discrete()
    }

    fn range(&self) -> ValueRange {
        self.range.get()
    }

    fn dependencies(&self) -> Vec<SymbolRef> {
        dependencies_of([&self.x, &self.y])
    }

    fn polynomial(&self) -> LinearPolynomial {
        self.build().polynomial()
    }

    fn auxiliary_variables(&self) -> Vec<Variable> {
        self.built.get().map(Parts::variables).unwrap_or_default()
    }

    fn flush(&self, force: bool) {
        self.x.flush(force);
        self.y.flush(force);
        self.range.set(self.value_range());
        if let Some(parts) = self.built.get() {
            let range = self.difference().range();
            if let Some(negative) = &parts.negative {
                negative.set_range(ValueRange::spanning(0.0, (-range.lower()).max(0.0)));
            }
            if let Some(positive) = &parts.positive {
                positive.set_range(ValueRange::spanning(0.0, range.upper().max(0.0)));
            }
        }
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
        if !self.with_negative && !self.with_positive {
            return Err(application_failed(&self.header.name, "needs at least one slack side"));
        }
        if self.bounds().is_none() {
            return Err(application_failed(
                &self.header.name,
                format!(
                    "domain of {} does not intersect domain of {}",
                    self.x, self.y
                ),
            ));
        }
        tokens.add_all(&self.build().variables())?;
        Ok(())
    }

    fn register_model(&self, model: &mut LinearModel) -> Result<()> {
        if !self.constraint {
            return Ok(());
        }
        let parts = self.build();
        let mut lhs = self.x.clone();
        if let Some(negative) = &parts.negative {
            lhs = lhs + negative;
        }
        if let Some(positive) = &parts.positive {
            lhs = lhs - positive;
        }
        let inequality = match (self.threshold, self.with_negative, self.with_positive) {
            (true, true, false) => lhs.geq(self.y.clone()),
            (true, false, true) => lhs.leq(self.y.clone()),
            _ => lhs.equals(self.y.clone()),
        };
        model.add_constraint(inequality, self.header.child("slack"), Some(self.header.origin()))
    }

    fn register_model_fixed(&self, model: &mut LinearModel, fixed: &FixedValues) -> Result<()> {
        match self.assignment(fixed) {
            Some(assignment) => assignment.pin(model, &self.header),
            None => self.register_model(model),
        }
    }

    fn calculate_value(&self, source: &dyn ValueSource, zero_if_none: bool) -> Option<f64> {
        let x = self.x.evaluate(source, zero_if_none)?;
        let y = self.y.evaluate(source, zero_if_none)?;
        Some(self.deviation(x, y))
    }
}

/// Distance of `x` from the band `[lb, ub]`: `lb ≤ x + neg − pos ≤ ub`.
pub struct SlackRangeFunction {
    header: Header,
    x: LinearPolynomial,
    lower: LinearPolynomial,
    upper: LinearPolynomial,
    constraint: bool,
    range: Cell<ValueRange>,
    built: OnceCell<Parts>,
}

impl SlackRangeFunction {
    pub fn new(
        x: impl Into<LinearPolynomial>,
        lower: impl Into<LinearPolynomial>,
        upper: impl Into<LinearPolynomial>,
        name: impl Into<String>,
    ) -> Self {
        let x = x.into();
        let lower = lower.into();
        let upper = upper.into();
        let range = Cell::new(Self::value_range(&x, &lower, &upper));
        Self {
            header: Header::new(name),
            x,
            lower,
            upper,
            constraint: true,
            range,
            built: OnceCell::new(),
        }
    }

    #[must_use]
    pub fn without_constraint(mut self) -> Self {
        self.constraint = false;
        self
    }

    fn shortfall_bound(x: &LinearPolynomial, lower: &LinearPolynomial) -> f64 {
        (lower.upper_bound() - x.lower_bound()).max(0.0)
    }

    fn excess_bound(x: &LinearPolynomial, upper: &LinearPolynomial) -> f64 {
        (x.upper_bound() - upper.lower_bound()).max(0.0)
    }

    fn value_range(x: &LinearPolynomial, lower: &LinearPolynomial, upper: &LinearPolynomial) -> ValueRange {
        ValueRange::spanning(
            0.0,
            Self::shortfall_bound(x, lower).max(Self::excess_bound(x, upper)),
        )
    }

    fn discrete_operands(&self) -> bool {
        self.x.discrete() && self.lower.discrete() && self.upper.discrete()
    }

    fn build(&self) -> &Parts {
        self.built.get_or_init(|| {
            let discrete = self.discrete_operands();
            Parts {
                negative: Some(slack_variable(
                    self.header.child("neg"),
                    discrete,
                    Self::shortfall_bound(&self.x, &self.lower),
                )),
                positive: Some(slack_variable(
                    self.header.child("pos"),
                    discrete,
                    Self::excess_bound(&self.x, &self.upper),
                )),
            }
        })
    }

    fn distance(x: f64, lower: f64, upper: f64) -> (f64, f64) {
        if x < lower {
            (lower - x, 0.0)
        } else if x > upper {
            (0.0, x - upper)
        } else {
            (0.0, 0.0)
        }
    }

    fn assignment(&self, source: &dyn ValueSource) -> Option<Assignment> {
        let x = self.x.evaluate(source, false)?;
        let lower = self.lower.evaluate(source, false)?;
        let upper = self.upper.evaluate(source, false)?;
        let (shortfall, excess) = Self::distance(x, lower, upper);
        let mut assignment = Assignment::new(shortfall + excess);
        let parts = self.build();
        if let Some(negative) = &parts.negative {
            assignment.push(negative, shortfall);
        }
        if let Some(positive) = &parts.positive {
            assignment.push(positive, excess);
        }
        Some(assignment)
    }
}

header_builders!(SlackRangeFunction);

impl FunctionSymbol for SlackRangeFunction {
    header_accessors!();

    fn discrete(&self) -> bool {
        self.discrete_operands()
    }

    fn range(&self) -> ValueRange {
        self.range.get()
    }

    fn dependencies(&self) -> Vec<SymbolRef> {
        dependencies_of([&self.x, &self.lower, &self.upper])
    }

    fn polynomial(&self) -> LinearPolynomial {
        self.build().polynomial()
    }

    fn auxiliary_variables(&self) -> Vec<Variable> {
        self.built.get().map(Parts::variables).unwrap_or_default()
    }

    fn flush(&self, force: bool) {
        for operand in [&self.x, &self.lower, &self.upper] {
            operand.flush(force);
        }
        self.range
            .set(Self::value_range(&self.x, &self.lower, &self.upper));
        if let Some(parts) = self.built.get() {
            if let Some(negative) = &parts.negative {
                negative.set_range(ValueRange::spanning(0.0, Self::shortfall_bound(&self.x, &self.lower)));
            }
            if let Some(positive) = &parts.positive {
                positive.set_range(ValueRange::spanning(0.0, Self::excess_bound(&self.x, &self.upper)));
            }
        }
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
        let band = ValueRange::new(self.lower.lower_bound(), self.upper.upper_bound());
        if band.and_then(|band| self.x.range().intersect(&band)).is_none() {
            return Err(application_failed(
                &self.header.name,
                format!(
                    "domain of {} does not intersect [{}, {}]",
                    self.x, self.lower, self.upper
                ),
            ));
        }
        tokens.add_all(&self.build().variables())?;
        Ok(())
    }

    fn register_model(&self, model: &mut LinearModel) -> Result<()> {
        if !self.constraint {
            return Ok(());
        }
        let parts = self.build();
        let origin = Some(self.header.origin());
        let mut shifted = self.x.clone();
        if let Some(negative) = &parts.negative {
            shifted = shifted + negative;
        }
        if let Some(positive) = &parts.positive {
            shifted = shifted - positive;
        }
        model.add_constraint(shifted.clone().leq(self.upper.clone()), self.header.child("ub"), origin)?;
        model.add_constraint(shifted.geq(self.lower.clone()), self.header.child("lb"), origin)
    }

    fn register_model_fixed(&self, model: &mut LinearModel, fixed: &FixedValues) -> Result<()> {
        match self.assignment(fixed) {
            Some(assignment) => assignment.pin(model, &self.header),
            None => self.register_model(model),
        }
    }

    fn calculate_value(&self, source: &dyn ValueSource, zero_if_none: bool) -> Option<f64> {
        let x = self.x.evaluate(source, zero_if_none)?;
        let lower = self.lower.evaluate(source, zero_if_none)?;
        let upper = self.upper.evaluate(source, zero_if_none)?;
        let (shortfall, excess) = Self::distance(x, lower, upper);
        Some(shortfall + excess)
    }
}
