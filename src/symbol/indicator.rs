//! Indicators of a nonzero operand over `x ∈ [0, ∞)`.
//!
//! `Binaryzation(x) = 1` iff `x ≠ 0`; `Not(x)` is its complement. Both share
//! [`IndicatorCore`], which owns the selected encoding and its auxiliaries.

use std::cell::{Cell, OnceCell};

use tracing::debug;

use super::piecewise::UnivariatePiecewiseFunction;
use super::selection::{self, IndicatorEncoding, OperandProfile};
use super::{
    bool_value, prepare_owned, prepare_with, require_finite, require_non_negative, Assignment,
    FunctionSymbol, Header, SymbolRef,
};
use crate::config::SymbolConfig;
use crate::domain::range::{is_zero, DECIMAL_PRECISION};
use crate::domain::{
    FixedValues, LinearModel, LinearPolynomial, Point2, Solution, TokenTable, ValueRange,
    ValueSource, Variable,
};
use crate::error::Result;

/// Range of `[x ≠ 0]` under the current bounds of `x`.
pub(crate) fn indicator_range(x: &LinearPolynomial) -> ValueRange {
    let profile = OperandProfile::of(x);
    let lower = if profile.never_zero() { 1.0 } else { 0.0 };
    let upper = if profile.always_zero() { 0.0 } else { 1.0 };
    ValueRange::spanning(lower, upper)
}

enum Built {
    Constant(f64),
    Identity,
    BigM { y: Variable },
    Weighted { y: Variable, b: Variable },
    Piecewise { ramp: UnivariatePiecewiseFunction },
}

/// Encoding state shared by [`BinaryzationFunction`] and [`NotFunction`].
pub(crate) struct IndicatorCore {
    x: LinearPolynomial,
    config: SymbolConfig,
    encoding: Option<IndicatorEncoding>,
    built: OnceCell<Built>,
}

impl IndicatorCore {
    pub(crate) fn new(x: LinearPolynomial) -> Self {
        Self {
            x,
            config: SymbolConfig::default(),
            encoding: None,
            built: OnceCell::new(),
        }
    }

    pub(crate) fn operand(&self) -> &LinearPolynomial {
        &self.x
    }

    fn selected(&self) -> IndicatorEncoding {
        self.encoding
            .unwrap_or_else(|| selection::indicator(&OperandProfile::of(&self.x), &self.config))
    }

    fn encoding(&self) -> IndicatorEncoding {
        match self.built.get() {
            Some(Built::Constant(value)) => IndicatorEncoding::Constant(*value),
            Some(Built::Identity) => IndicatorEncoding::Identity,
            Some(Built::BigM { .. }) => IndicatorEncoding::BigM,
            Some(Built::Weighted { .. }) => IndicatorEncoding::Weighted,
            Some(Built::Piecewise { .. }) => IndicatorEncoding::Piecewise,
            None => self.selected(),
        }
    }

    fn build(&self, header: &Header) -> &Built {
        self.built.get_or_init(|| {
            let encoding = self.selected();
            debug!(symbol = %header.name, ?encoding, operand = %self.x, "selected indicator encoding");
            match encoding {
                IndicatorEncoding::Constant(value) => Built::Constant(value),
                IndicatorEncoding::Identity => Built::Identity,
                IndicatorEncoding::BigM => {
                    let y = Variable::binary(header.child("y"));
                    y.set_range(indicator_range(&self.x));
                    Built::BigM { y }
                }
                IndicatorEncoding::Weighted => {
                    let y = Variable::binary(header.child("y"));
                    y.set_range(indicator_range(&self.x));
                    let b = Variable::percentage(header.child("b"));
                    Built::Weighted { y, b }
                }
                IndicatorEncoding::Piecewise => {
                    let epsilon = self.config.epsilon;
                    let upper = self.x.upper_bound().max(epsilon + DECIMAL_PRECISION);
                    let points = vec![
                        Point2::new(0.0, 0.0),
                        Point2::new(epsilon - DECIMAL_PRECISION, 0.0),
                        Point2::new(epsilon, 1.0),
                        Point2::new(upper, 1.0),
                    ];
                    let ramp = UnivariatePiecewiseFunction::new(
                        self.x.clone(),
                        points,
                        header.child("piecewise"),
                    )
                    .with_parent(header.origin());
                    Built::Piecewise { ramp }
                }
            }
        })
    }

    /// `[x ≠ 0]` as a polynomial.
    fn indicator(&self, header: &Header) -> LinearPolynomial {
        match self.build(header) {
            Built::Constant(value) => LinearPolynomial::from(*value),
            Built::Identity => self.x.clone(),
            Built::BigM { y } | Built::Weighted { y, .. } => LinearPolynomial::from(y),
            Built::Piecewise { ramp } => ramp
                .segment_indicators()
                .last()
                .map(LinearPolynomial::from)
                .unwrap_or_default(),
        }
    }

    fn auxiliary_variables(&self) -> Vec<Variable> {
        match self.built.get() {
            None | Some(Built::Constant(_) | Built::Identity) => Vec::new(),
            Some(Built::BigM { y }) => vec![y.clone()],
            Some(Built::Weighted { y, b }) => vec![y.clone(), b.clone()],
            Some(Built::Piecewise { ramp }) => ramp.auxiliary_variables(),
        }
    }

    fn flush(&self, force: bool) {
        self.x.flush(force);
        match self.built.get() {
            Some(Built::BigM { y } | Built::Weighted { y, .. }) => {
                y.set_range(indicator_range(&self.x));
            }
            Some(Built::Piecewise { ramp }) => ramp.flush(force),
            _ => {}
        }
    }

    fn truth(&self, source: &dyn ValueSource, zero_if_none: bool) -> Option<bool> {
        let value = self.x.evaluate(source, zero_if_none)?;
        Some(!is_zero(value))
    }

    fn assignment(
        &self,
        header: &Header,
        negate: bool,
        source: &dyn ValueSource,
    ) -> Option<Assignment> {
        let x = self.x.evaluate(source, false)?;
        let truth = !is_zero(x);
        let value = if negate {
            1.0 - bool_value(truth)
        } else {
            bool_value(truth)
        };
        let mut assignment = Assignment::new(value);
        match self.build(header) {
            Built::BigM { y } => assignment.push(y, bool_value(truth)),
            Built::Weighted { y, b } => {
                let upper = self.x.upper_bound();
                assignment.push(y, bool_value(truth));
                assignment.push(b, if upper > 0.0 { x / upper } else { 0.0 });
            }
            _ => {}
        }
        Some(assignment)
    }

    fn prepare(
        &self,
        header: &Header,
        negate: bool,
        fixed: Option<&FixedValues>,
        tokens: &TokenTable,
        warm_start: &mut Solution,
    ) -> Option<f64> {
        if let Built::Piecewise { ramp } = self.build(header) {
            prepare_owned(ramp, fixed, tokens, warm_start);
        }
        prepare_with(&header.name, fixed, tokens, warm_start, |source| {
            self.assignment(header, negate, source)
        })
    }

    fn register_tokens(&self, header: &Header, tokens: &mut TokenTable) -> Result<()> {
        require_non_negative(&header.name, &self.x)?;
        match self.build(header) {
            Built::Constant(_) | Built::Identity => {}
            Built::BigM { y } => {
                require_finite(&header.name, &self.x)?;
                tokens.add(y)?;
            }
            Built::Weighted { y, b } => {
                require_finite(&header.name, &self.x)?;
                tokens.add_all([y, b])?;
            }
            Built::Piecewise { ramp } => {
                require_finite(&header.name, &self.x)?;
                ramp.register_tokens(tokens)?;
            }
        }
        Ok(())
    }

    fn register_model(&self, header: &Header, model: &mut LinearModel) -> Result<()> {
        let origin = Some(header.origin());
        match self.build(header) {
            Built::Constant(_) | Built::Identity => Ok(()),
            Built::BigM { y } => {
                let upper = self.x.upper_bound();
                model.add_constraint((upper * y).geq(&self.x), header.child("lb"), origin)?;
                if self.config.extract {
                    model.add_constraint(
                        LinearPolynomial::from(y).leq(&self.x),
                        header.child("ub"),
                        origin,
                    )?;
                }
                Ok(())
            }
            Built::Weighted { y, b } => {
                let upper = self.x.upper_bound();
                model.add_constraint(self.x.clone().equals(upper * b), header.child("xb"), origin)?;
                model.add_constraint(LinearPolynomial::from(y).geq(b), header.child("lb"), origin)?;
                model.add_constraint(
                    LinearPolynomial::from(y).leq((1.0 / self.config.epsilon) * b),
                    header.child("ub"),
                    origin,
                )
            }
            Built::Piecewise { ramp } => ramp.register_model(model),
        }
    }

    fn register_model_fixed(
        &self,
        header: &Header,
        negate: bool,
        model: &mut LinearModel,
        fixed: &FixedValues,
    ) -> Result<()> {
        let Some(assignment) = self.assignment(header, negate, fixed) else {
            return self.register_model(header, model);
        };
        if let Built::Piecewise { ramp } = self.build(header) {
            ramp.register_model_fixed(model, fixed)?;
        }
        assignment.pin(model, header)
    }
}

/// `1` iff the operand is nonzero.
pub struct BinaryzationFunction {
    header: Header,
    core: IndicatorCore,
    range: Cell<ValueRange>,
}

impl BinaryzationFunction {
    pub fn new(x: impl Into<LinearPolynomial>, name: impl Into<String>) -> Self {
        let x = x.into();
        let range = Cell::new(indicator_range(&x));
        Self {
            header: Header::new(name),
            core: IndicatorCore::new(x),
            range,
        }
    }

    #[must_use]
    pub fn with_config(mut self, config: SymbolConfig) -> Self {
        self.core.config = config;
        self
    }

    /// Bypass encoding selection.
    #[must_use]
    pub fn with_encoding(mut self, encoding: IndicatorEncoding) -> Self {
        self.core.encoding = Some(encoding);
        self
    }

    /// The frozen encoding once built, otherwise the one selection would pick.
    #[must_use]
    pub fn encoding(&self) -> IndicatorEncoding {
        self.core.encoding()
    }

    #[must_use]
    pub fn operand(&self) -> &LinearPolynomial {
        self.core.operand()
    }
}

header_builders!(BinaryzationFunction);

impl FunctionSymbol for BinaryzationFunction {
    header_accessors!();

    fn discrete(&self) -> bool {
        true
    }

    fn range(&self) -> ValueRange {
        self.range.get()
    }

    fn dependencies(&self) -> Vec<SymbolRef> {
        self.core.x.dependencies()
    }

    fn polynomial(&self) -> LinearPolynomial {
        self.core.indicator(&self.header)
    }

    fn auxiliary_variables(&self) -> Vec<Variable> {
        self.core.auxiliary_variables()
    }

    fn flush(&self, force: bool) {
        self.core.flush(force);
        self.range.set(indicator_range(&self.core.x));
    }

    fn prepare(
        &self,
        fixed: Option<&FixedValues>,
        tokens: &TokenTable,
        warm_start: &mut Solution,
    ) -> Option<f64> {
        self.core
            .prepare(&self.header, false, fixed, tokens, warm_start)
    }

    fn register_tokens(&self, tokens: &mut TokenTable) -> Result<()> {
        self.core.register_tokens(&self.header, tokens)
    }

    fn register_model(&self, model: &mut LinearModel) -> Result<()> {
        self.core.register_model(&self.header, model)
    }

    fn register_model_fixed(&self, model: &mut LinearModel, fixed: &FixedValues) -> Result<()> {
        self.core
            .register_model_fixed(&self.header, false, model, fixed)
    }

    fn calculate_value(&self, source: &dyn ValueSource, zero_if_none: bool) -> Option<f64> {
        self.core.truth(source, zero_if_none).map(bool_value)
    }
}

/// `1` iff the operand is zero.
pub struct NotFunction {
    header: Header,
    core: IndicatorCore,
    range: Cell<ValueRange>,
}

fn complement(range: ValueRange) -> ValueRange {
    ValueRange::spanning(1.0 - range.upper(), 1.0 - range.lower())
}

impl NotFunction {
    pub fn new(x: impl Into<LinearPolynomial>, name: impl Into<String>) -> Self {
        let x = x.into();
        let range = Cell::new(complement(indicator_range(&x)));
        Self {
            header: Header::new(name),
            core: IndicatorCore::new(x),
            range,
        }
    }

    #[must_use]
    pub fn with_config(mut self, config: SymbolConfig) -> Self {
        self.core.config = config;
        self
    }

    #[must_use]
    pub fn with_encoding(mut self, encoding: IndicatorEncoding) -> Self {
        self.core.encoding = Some(encoding);
        self
    }

    #[must_use]
    pub fn encoding(&self) -> IndicatorEncoding {
        self.core.encoding()
    }
}

header_builders!(NotFunction);

impl FunctionSymbol for NotFunction {
    header_accessors!();

    fn discrete(&self) -> bool {
        true
    }

    fn range(&self) -> ValueRange {
        self.range.get()
    }

    fn dependencies(&self) -> Vec<SymbolRef> {
        self.core.x.dependencies()
    }

    fn polynomial(&self) -> LinearPolynomial {
        LinearPolynomial::from(1.0) - self.core.indicator(&self.header)
    }

    fn auxiliary_variables(&self) -> Vec<Variable> {
        self.core.auxiliary_variables()
    }

    fn flush(&self, force: bool) {
        self.core.flush(force);
        self.range.set(complement(indicator_range(&self.core.x)));
    }

    fn prepare(
        &self,
        fixed: Option<&FixedValues>,
        tokens: &TokenTable,
        warm_start: &mut Solution,
    ) -> Option<f64> {
        self.core
            .prepare(&self.header, true, fixed, tokens, warm_start)
    }

    fn register_tokens(&self, tokens: &mut TokenTable) -> Result<()> {
        self.core.register_tokens(&self.header, tokens)
    }

    fn register_model(&self, model: &mut LinearModel) -> Result<()> {
        self.core.register_model(&self.header, model)
    }

    fn register_model_fixed(&self, model: &mut LinearModel, fixed: &FixedValues) -> Result<()> {
        self.core
            .register_model_fixed(&self.header, true, model, fixed)
    }

    fn calculate_value(&self, source: &dyn ValueSource, zero_if_none: bool) -> Option<f64> {
        self.core
            .truth(source, zero_if_none)
            .map(|truth| 1.0 - bool_value(truth))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbol::testing::Harness;
    use crate::symbol::IntoSymbol;

    #[test]
    fn test_known_nonzero_operand_needs_no_auxiliaries() {
        let x = Variable::integer("x").with_range(5.0, 10.0);
        let bin = BinaryzationFunction::new(&x, "bin").into_symbol();
        assert_eq!(bin.range(), ValueRange::point(1.0));

        let mut harness = Harness::new(bin.clone(), &[&x]);
        assert!(bin.auxiliary_variables().is_empty());
        assert!(harness.model.constraints().is_empty());
        assert_eq!(harness.at(&[(&x, 7.0)]), 1.0);
    }

    #[test]
    fn test_binary_operand_is_reused() {
        let x = Variable::binary("x");
        let bin = BinaryzationFunction::new(&x, "bin");
        assert_eq!(bin.encoding(), IndicatorEncoding::Identity);
        assert_eq!(bin.polynomial().cells().variables().count(), 1);
    }

    #[test]
    fn test_big_m_matches_evaluation() {
        let x = Variable::uinteger("x").with_range(0.0, 4.0);
        let bin = BinaryzationFunction::new(&x, "bin").into_symbol();
        let mut harness = Harness::new(bin, &[&x]);
        for value in 0..=4 {
            let expected = if value == 0 { 0.0 } else { 1.0 };
            assert_eq!(harness.at(&[(&x, f64::from(value))]), expected);
        }
    }

    #[test]
    fn test_weighted_matches_evaluation() {
        let x = Variable::ureal("x").with_range(0.0, 8.0);
        let bin = BinaryzationFunction::new(&x, "bin");
        assert_eq!(bin.encoding(), IndicatorEncoding::Weighted);
        let mut harness = Harness::new(bin.into_symbol(), &[&x]);
        assert_eq!(harness.at(&[(&x, 0.0)]), 0.0);
        assert_eq!(harness.at(&[(&x, 2.5)]), 1.0);
        assert_eq!(harness.at(&[(&x, 8.0)]), 1.0);
    }

    #[test]
    fn test_piecewise_ramp_matches_evaluation() {
        let config = SymbolConfig {
            epsilon: 1e-3,
            ..SymbolConfig::default()
        };
        let x = Variable::ureal("x").with_range(0.0, 8.0);
        let bin = BinaryzationFunction::new(&x, "bin").with_config(config);
        assert_eq!(bin.encoding(), IndicatorEncoding::Piecewise);
        let mut harness = Harness::new(bin.into_symbol(), &[&x]);
        assert_eq!(harness.at(&[(&x, 0.0)]), 0.0);
        assert_eq!(harness.at(&[(&x, 3.0)]), 1.0);
        assert_eq!(harness.at(&[(&x, 8.0)]), 1.0);
    }

    #[test]
    fn test_negative_operand_fails() {
        let x = Variable::integer("x").with_range(-1.0, 3.0);
        let bin = BinaryzationFunction::new(&x, "bin");
        let mut tokens = TokenTable::new();
        tokens.add(&x).unwrap();
        let err = bin.register_tokens(&mut tokens).unwrap_err();
        assert!(err.is_application_failed());
    }

    #[test]
    fn test_not_complements_binaryzation() {
        let x = Variable::uinteger("x").with_range(0.0, 3.0);
        let not = NotFunction::new(&x, "not").into_symbol();
        assert_eq!(not.range(), ValueRange::UNIT);
        let mut harness = Harness::new(not, &[&x]);
        assert_eq!(harness.at(&[(&x, 0.0)]), 1.0);
        assert_eq!(harness.at(&[(&x, 2.0)]), 0.0);
    }

    #[test]
    fn test_not_of_binary_is_one_minus_operand() {
        let x = Variable::binary("x");
        let not = NotFunction::new(&x, "not");
        let cells = not.polynomial().cells();
        assert_eq!(cells.constant, 1.0);
        assert_eq!(cells.terms.get(&x.id()).map(|t| t.1), Some(-1.0));
    }

    #[test]
    fn test_flush_keeps_identity_and_updates_range() {
        let x = Variable::uinteger("x").with_range(0.0, 4.0);
        let bin = BinaryzationFunction::new(&x, "bin");
        let before: Vec<String> = {
            let _ = bin.polynomial();
            bin.auxiliary_variables()
                .iter()
                .map(|v| v.name().to_string())
                .collect()
        };
        x.set_range(ValueRange::new(2.0, 4.0).unwrap());
        bin.flush(true);
        let after: Vec<String> = bin
            .auxiliary_variables()
            .iter()
            .map(|v| v.name().to_string())
            .collect();
        assert_eq!(before, after);
        assert_eq!(bin.range(), ValueRange::point(1.0));
    }

    #[test]
    fn test_fixed_registration_pins_indicator() {
        let x = Variable::uinteger("x").with_range(0.0, 4.0);
        let bin = BinaryzationFunction::new(&x, "bin").into_symbol();
        let mut model = LinearModel::new();
        model.tokens_mut().add(&x).unwrap();
        let mut fixed = FixedValues::new();
        fixed.insert("x".into(), 3.0);
        model.add_symbol_fixed(&bin, &fixed).unwrap();
        assert_eq!(model.constraints().len(), 1);
        assert_eq!(model.constraints()[0].name, "bin_y_fixed");
    }
}
