//! Sign of an operand: `-1`, `0` or `1`.

use std::cell::{Cell, OnceCell};

use tracing::debug;

use super::piecewise::UnivariatePiecewiseFunction;
use super::selection::{self, OperandProfile, TernaryEncoding};
use super::{
    bool_value, prepare_owned, prepare_with, require_finite, Assignment, FunctionSymbol, Header,
    SymbolRef,
};
use crate::config::SymbolConfig;
use crate::domain::range::{DECIMAL_PRECISION, TOLERANCE};
use crate::domain::{
    FixedValues, LinearModel, LinearPolynomial, Point2, Solution, TokenTable, ValueRange,
    ValueSource, Variable,
};
use crate::error::Result;

fn sign(value: f64) -> f64 {
    if value > TOLERANCE {
        1.0
    } else if value < -TOLERANCE {
        -1.0
    } else {
        0.0
    }
}

fn sign_range(x: &LinearPolynomial) -> ValueRange {
    let range = x.range();
    ValueRange::spanning(sign(range.lower()), sign(range.upper()))
}

enum Built {
    Constant(f64),
    Identity,
    BigM { negative: Variable, positive: Variable },
    Weighted {
        negative: Variable,
        positive: Variable,
        lower: Variable,
        upper: Variable,
    },
    Piecewise { ramp: UnivariatePiecewiseFunction },
}

/// `sign(x)` over a bounded operand.
pub struct BalanceTernaryzationFunction {
    header: Header,
    x: LinearPolynomial,
    config: SymbolConfig,
    encoding: Option<TernaryEncoding>,
    range: Cell<ValueRange>,
    built: OnceCell<Built>,
}

impl BalanceTernaryzationFunction {
    pub fn new(x: impl Into<LinearPolynomial>, name: impl Into<String>) -> Self {
        let x = x.into();
        let range = Cell::new(sign_range(&x));
        Self {
            header: Header::new(name),
            x,
            config: SymbolConfig::default(),
            encoding: None,
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
    pub fn with_encoding(mut self, encoding: TernaryEncoding) -> Self {
        self.encoding = Some(encoding);
        self
    }

    #[must_use]
    pub fn encoding(&self) -> TernaryEncoding {
        match self.built.get() {
            Some(Built::Constant(value)) => TernaryEncoding::Constant(*value),
            Some(Built::Identity) => TernaryEncoding::Identity,
            Some(Built::BigM { .. }) => TernaryEncoding::BigM,
            Some(Built::Weighted { .. }) => TernaryEncoding::Weighted,
            Some(Built::Piecewise { .. }) => TernaryEncoding::Piecewise,
            None => self.selected(),
        }
    }

    fn selected(&self) -> TernaryEncoding {
        self.encoding
            .unwrap_or_else(|| selection::ternary(&OperandProfile::of(&self.x), &self.config))
    }

    fn selector_pair(&self) -> (Variable, Variable) {
        let negative = Variable::binary(self.header.child("y_neg"));
        let positive = Variable::binary(self.header.child("y_pos"));
        self.bound_selectors(&negative, &positive);
        (negative, positive)
    }

    fn bound_selectors(&self, negative: &Variable, positive: &Variable) {
        let range = self.x.range();
        negative.set_range(ValueRange::spanning(0.0, bool_value(range.lower() < -TOLERANCE)));
        positive.set_range(ValueRange::spanning(0.0, bool_value(range.upper() > TOLERANCE)));
    }

    fn build(&self) -> &Built {
        self.built.get_or_init(|| {
            let encoding = self.selected();
            debug!(symbol = %self.header.name, ?encoding, operand = %self.x, "selected ternary encoding");
            match encoding {
                TernaryEncoding::Constant(value) => Built::Constant(value),
                TernaryEncoding::Identity => Built::Identity,
                TernaryEncoding::BigM => {
                    let (negative, positive) = self.selector_pair();
                    Built::BigM { negative, positive }
                }
                TernaryEncoding::Weighted => {
                    let (negative, positive) = self.selector_pair();
                    Built::Weighted {
                        negative,
                        positive,
                        lower: Variable::percentage(self.header.child("b_neg")),
                        upper: Variable::percentage(self.header.child("b_pos")),
                    }
                }
                TernaryEncoding::Piecewise => {
                    let epsilon = self.config.epsilon;
                    let range = self.x.range();
                    let points = vec![
                        Point2::new(range.lower(), -1.0),
                        Point2::new(-epsilon, -1.0),
                        Point2::new(-epsilon + DECIMAL_PRECISION, 0.0),
                        Point2::new(epsilon - DECIMAL_PRECISION, 0.0),
                        Point2::new(epsilon, 1.0),
                        Point2::new(range.upper(), 1.0),
                    ];
                    let ramp = UnivariatePiecewiseFunction::new(
                        self.x.clone(),
                        points,
                        self.header.child("piecewise"),
                    )
                    .with_parent(self.header.origin());
                    Built::Piecewise { ramp }
                }
            }
        })
    }

    fn assignment(&self, source: &dyn ValueSource) -> Option<Assignment> {
        let x = self.x.evaluate(source, false)?;
        let value = sign(x);
        let mut assignment = Assignment::new(value);
        match self.build() {
            Built::BigM { negative, positive } => {
                assignment.push(negative, bool_value(value < 0.0));
                assignment.push(positive, bool_value(value > 0.0));
            }
            Built::Weighted {
                negative,
                positive,
                lower,
                upper,
            } => {
                let range = self.x.range();
                let (below, above) = if x < 0.0 {
                    (x / range.lower(), 0.0)
                } else if x > 0.0 {
                    (0.0, x / range.upper())
                } else {
                    (0.0, 0.0)
                };
                assignment.push(negative, bool_value(value < 0.0));
                assignment.push(positive, bool_value(value > 0.0));
                assignment.push(lower, below);
                assignment.push(upper, above);
            }
            _ => {}
        }
        Some(assignment)
    }
}

header_builders!(BalanceTernaryzationFunction);

impl FunctionSymbol for BalanceTernaryzationFunction {
    header_accessors!();

    fn discrete(&self) -> bool {
        true
    }

    fn range(&self) -> ValueRange {
        self.range.get()
    }

    fn dependencies(&self) -> Vec<SymbolRef> {
        self.x.dependencies()
    }

    fn polynomial(&self) -> LinearPolynomial {
        match self.build() {
            Built::Constant(value) => LinearPolynomial::from(*value),
            Built::Identity => self.x.clone(),
            Built::BigM { negative, positive } | Built::Weighted { negative, positive, .. } => {
                LinearPolynomial::from(positive) - negative
            }
            Built::Piecewise { ramp } => {
                let segments = ramp.segment_indicators();
                match (segments.first(), segments.last()) {
                    (Some(first), Some(last)) => LinearPolynomial::from(last) - first,
                    _ => LinearPolynomial::new(),
                }
            }
        }
    }

    fn auxiliary_variables(&self) -> Vec<Variable> {
        match self.built.get() {
            None | Some(Built::Constant(_) | Built::Identity) => Vec::new(),
            Some(Built::BigM { negative, positive }) => vec![negative.clone(), positive.clone()],
            Some(Built::Weighted {
                negative,
                positive,
                lower,
                upper,
            }) => vec![negative.clone(), positive.clone(), lower.clone(), upper.clone()],
            Some(Built::Piecewise { ramp }) => ramp.auxiliary_variables(),
        }
    }

    fn flush(&self, force: bool) {
        self.x.flush(force);
        match self.built.get() {
            Some(Built::BigM { negative, positive } | Built::Weighted { negative, positive, .. }) => {
                self.bound_selectors(negative, positive);
            }
            Some(Built::Piecewise { ramp }) => ramp.flush(force),
            _ => {}
        }
        self.range.set(sign_range(&self.x));
    }

    fn prepare(
        &self,
        fixed: Option<&FixedValues>,
        tokens: &TokenTable,
        warm_start: &mut Solution,
    ) -> Option<f64> {
        if let Built::Piecewise { ramp } = self.build() {
            prepare_owned(ramp, fixed, tokens, warm_start);
        }
        prepare_with(&self.header.name, fixed, tokens, warm_start, |source| {
            self.assignment(source)
        })
    }

    fn register_tokens(&self, tokens: &mut TokenTable) -> Result<()> {
        match self.build() {
            Built::Constant(_) | Built::Identity => Ok(()),
            Built::BigM { negative, positive } => {
                require_finite(&self.header.name, &self.x)?;
                tokens.add_all([negative, positive])?;
                Ok(())
            }
            Built::Weighted {
                negative,
                positive,
                lower,
                upper,
            } => {
                require_finite(&self.header.name, &self.x)?;
                tokens.add_all([negative, positive, lower, upper])?;
                Ok(())
            }
            Built::Piecewise { ramp } => {
                require_finite(&self.header.name, &self.x)?;
                ramp.register_tokens(tokens)
            }
        }
    }

    fn register_model(&self, model: &mut LinearModel) -> Result<()> {
        let origin = Some(self.header.origin());
        let range = self.x.range();
        let (lower, upper) = (range.lower(), range.upper());
        match self.build() {
            Built::Constant(_) | Built::Identity => Ok(()),
            Built::BigM { negative, positive } => {
                model.add_constraint((upper * positive).geq(&self.x), self.header.child("pos_ub"), origin)?;
                model.add_constraint((lower * negative).leq(&self.x), self.header.child("neg_lb"), origin)?;
                if self.config.extract {
                    model.add_constraint(
                        self.x
                            .clone()
                            .geq((1.0 - lower) * positive + lower),
                        self.header.child("pos_lb"),
                        origin,
                    )?;
                    model.add_constraint(
                        self.x
                            .clone()
                            .leq(LinearPolynomial::from(upper) - (upper + 1.0) * negative),
                        self.header.child("neg_ub"),
                        origin,
                    )?;
                    model.add_constraint(
                        (LinearPolynomial::from(negative) + positive).leq(1.0),
                        self.header.child("one_side"),
                        origin,
                    )?;
                }
                Ok(())
            }
            Built::Weighted {
                negative,
                positive,
                lower: below,
                upper: above,
            } => {
                let epsilon = self.config.epsilon;
                model.add_constraint(
                    self.x.clone().equals(lower * below + upper * above),
                    self.header.child("xb"),
                    origin,
                )?;
                model.add_constraint(LinearPolynomial::from(positive).geq(above), self.header.child("pos_lb"), origin)?;
                model.add_constraint(
                    LinearPolynomial::from(positive).leq((1.0 / epsilon) * above),
                    self.header.child("pos_ub"),
                    origin,
                )?;
                model.add_constraint(LinearPolynomial::from(negative).geq(below), self.header.child("neg_lb"), origin)?;
                model.add_constraint(
                    LinearPolynomial::from(negative).leq((1.0 / epsilon) * below),
                    self.header.child("neg_ub"),
                    origin,
                )?;
                model.add_constraint(
                    (LinearPolynomial::from(below) + positive).leq(1.0),
                    self.header.child("pos_excl"),
                    origin,
                )?;
                model.add_constraint(
                    (LinearPolynomial::from(above) + negative).leq(1.0),
                    self.header.child("neg_excl"),
                    origin,
                )
            }
            Built::Piecewise { ramp } => ramp.register_model(model),
        }
    }

    fn register_model_fixed(&self, model: &mut LinearModel, fixed: &FixedValues) -> Result<()> {
        let Some(assignment) = self.assignment(fixed) else {
            return self.register_model(model);
        };
        if let Built::Piecewise { ramp } = self.build() {
            ramp.register_model_fixed(model, fixed)?;
        }
        assignment.pin(model, &self.header)
    }

    fn calculate_value(&self, source: &dyn ValueSource, zero_if_none: bool) -> Option<f64> {
        self.x.evaluate(source, zero_if_none).map(sign)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbol::testing::Harness;
    use crate::symbol::IntoSymbol;

    #[test]
    fn test_range_follows_operand_signs() {
        let x = Variable::integer("x").with_range(-3.0, 5.0);
        let t = BalanceTernaryzationFunction::new(&x, "t");
        assert_eq!(t.range(), ValueRange::spanning(-1.0, 1.0));

        let y = Variable::integer("y").with_range(0.0, 5.0);
        assert_eq!(
            BalanceTernaryzationFunction::new(&y, "t").range(),
            ValueRange::spanning(0.0, 1.0)
        );
    }

    #[test]
    fn test_constant_when_sign_is_known() {
        let x = Variable::integer("x").with_range(2.0, 5.0);
        let t = BalanceTernaryzationFunction::new(&x, "t");
        assert_eq!(t.encoding(), TernaryEncoding::Constant(1.0));
    }

    #[test]
    fn test_big_m_for_integer_operand() {
        let x = Variable::integer("x").with_range(-3.0, 5.0);
        let t = BalanceTernaryzationFunction::new(&x, "t");
        assert_eq!(t.encoding(), TernaryEncoding::BigM);
        let mut harness = Harness::new(t.into_symbol(), &[&x]);
        for value in -3..=5 {
            let expected = f64::from(value).signum() * bool_value(value != 0);
            assert_eq!(harness.at(&[(&x, f64::from(value))]), expected);
        }
    }

    #[test]
    fn test_weighted_for_continuous_operand() {
        let x = Variable::real("x").with_range(-4.0, 2.0);
        let t = BalanceTernaryzationFunction::new(&x, "t");
        assert_eq!(t.encoding(), TernaryEncoding::Weighted);
        let mut harness = Harness::new(t.into_symbol(), &[&x]);
        assert_eq!(harness.at(&[(&x, -1.5)]), -1.0);
        assert_eq!(harness.at(&[(&x, 0.0)]), 0.0);
        assert_eq!(harness.at(&[(&x, 0.5)]), 1.0);
    }

    #[test]
    fn test_piecewise_when_epsilon_is_coarse() {
        let config = SymbolConfig {
            epsilon: 1e-2,
            ..SymbolConfig::default()
        };
        let x = Variable::real("x").with_range(-4.0, 2.0);
        let t = BalanceTernaryzationFunction::new(&x, "t").with_config(config);
        assert_eq!(t.encoding(), TernaryEncoding::Piecewise);
        let mut harness = Harness::new(t.into_symbol(), &[&x]);
        assert_eq!(harness.at(&[(&x, -3.0)]), -1.0);
        assert_eq!(harness.at(&[(&x, 0.0)]), 0.0);
        assert_eq!(harness.at(&[(&x, 1.0)]), 1.0);
    }

    #[test]
    fn test_unbounded_operand_fails() {
        let x = Variable::integer("x");
        let t = BalanceTernaryzationFunction::new(&x, "t");
        let mut tokens = TokenTable::new();
        assert!(t.register_tokens(&mut tokens).unwrap_err().is_application_failed());
    }
}
