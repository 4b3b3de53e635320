//! Absolute value.

use std::cell::{Cell, OnceCell, RefCell};

use tracing::{debug, warn};

use super::selection::{self, AbsEncoding};
use super::{prepare_with, require_finite, Assignment, FunctionSymbol, Header, SymbolRef};
use crate::config::SymbolConfig;
use crate::domain::{
    FixedValues, LinearModel, LinearPolynomial, Solution, TokenTable, ValueRange, ValueSource,
    Variable,
};
use crate::error::Result;

fn abs_range(range: ValueRange) -> ValueRange {
    match selection::abs(&range) {
        AbsEncoding::Identity => range,
        AbsEncoding::Negated => range.scale(-1.0),
        AbsEncoding::Split => ValueRange::spanning(0.0, range.magnitude()),
    }
}

struct Split {
    positive: Variable,
    negative: Variable,
    /// Selects the positive part when extraction is on.
    side: Option<Variable>,
    magnitude: Cell<f64>,
    /// Set once the split row is in a model; the scale is frozen from then on.
    registered: Cell<bool>,
    output: RefCell<LinearPolynomial>,
}

impl Split {
    fn output_for(&self, magnitude: f64) -> LinearPolynomial {
        magnitude * (LinearPolynomial::from(&self.positive) + &self.negative)
    }
}

enum Built {
    Identity,
    Negated,
    Split(Split),
}

/// `|x|`.
///
/// A sign-changing operand is split into positive and negative parts
/// `x = M·pos − M·neg` with `M = max(|lb|, |ub|)`; the value is `M·(pos + neg)`.
/// `flush` rescales `M` until the split row is registered and keeps the
/// registered `M` afterwards.
pub struct AbsFunction {
    header: Header,
    x: LinearPolynomial,
    config: SymbolConfig,
    range: Cell<ValueRange>,
    built: OnceCell<Built>,
}

impl AbsFunction {
    pub fn new(x: impl Into<LinearPolynomial>, name: impl Into<String>) -> Self {
        let x = x.into();
        let range = Cell::new(abs_range(x.range()));
        Self {
            header: Header::new(name),
            x,
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
    pub fn encoding(&self) -> AbsEncoding {
        match self.built.get() {
            Some(Built::Identity) => AbsEncoding::Identity,
            Some(Built::Negated) => AbsEncoding::Negated,
            Some(Built::Split(_)) => AbsEncoding::Split,
            None => selection::abs(&self.x.range()),
        }
    }

    fn build(&self) -> &Built {
        self.built.get_or_init(|| {
            let encoding = selection::abs(&self.x.range());
            debug!(symbol = %self.header.name, ?encoding, operand = %self.x, "selected abs encoding");
            match encoding {
                AbsEncoding::Identity => Built::Identity,
                AbsEncoding::Negated => Built::Negated,
                AbsEncoding::Split => {
                    let magnitude = self.x.range().magnitude();
                    let split = Split {
                        positive: Variable::percentage(self.header.child("pos")),
                        negative: Variable::percentage(self.header.child("neg")),
                        side: self
                            .config
                            .extract
                            .then(|| Variable::binary(self.header.child("p"))),
                        magnitude: Cell::new(magnitude),
                        registered: Cell::new(false),
                        output: RefCell::new(LinearPolynomial::new()),
                    };
                    split.output.replace(split.output_for(magnitude));
                    Built::Split(split)
                }
            }
        })
    }

    fn assignment(&self, source: &dyn ValueSource) -> Option<Assignment> {
        let x = self.x.evaluate(source, false)?;
        let mut assignment = Assignment::new(x.abs());
        if let Built::Split(split) = self.build() {
            let magnitude = split.magnitude.get();
            let (positive, negative) = if magnitude > 0.0 {
                ((x.max(0.0)) / magnitude, (-x).max(0.0) / magnitude)
            } else {
                (0.0, 0.0)
            };
            assignment.push(&split.positive, positive);
            assignment.push(&split.negative, negative);
            if let Some(side) = &split.side {
                assignment.push(side, if x > 0.0 { 1.0 } else { 0.0 });
            }
        }
        Some(assignment)
    }
}

header_builders!(AbsFunction);

impl FunctionSymbol for AbsFunction {
    header_accessors!();

    fn discrete(&self) -> bool {
        self.x.discrete()
    }

    fn range(&self) -> ValueRange {
        self.range.get()
    }

    fn dependencies(&self) -> Vec<SymbolRef> {
        self.x.dependencies()
    }

    fn polynomial(&self) -> LinearPolynomial {
        match self.build() {
            Built::Identity => self.x.clone(),
            Built::Negated => -self.x.clone(),
            Built::Split(split) => split.output.borrow().clone(),
        }
    }

    fn auxiliary_variables(&self) -> Vec<Variable> {
        match self.built.get() {
            Some(Built::Split(split)) => [&split.positive, &split.negative]
                .into_iter()
                .chain(split.side.as_ref())
                .cloned()
                .collect(),
            _ => Vec::new(),
        }
    }

    fn flush(&self, force: bool) {
        self.x.flush(force);
        let range = self.x.range();
        if let Some(Built::Split(split)) = self.built.get() {
            let magnitude = range.magnitude();
            if split.registered.get() {
                if magnitude > split.magnitude.get() {
                    warn!(
                        symbol = %self.header.name,
                        registered = split.magnitude.get(),
                        operand = magnitude,
                        "operand outgrew the registered abs scale"
                    );
                }
            } else if force || magnitude != split.magnitude.get() {
                debug!(
                    symbol = %self.header.name,
                    from = split.magnitude.get(),
                    to = magnitude,
                    "rescaling abs split"
                );
                split.magnitude.set(magnitude);
                split.output.replace(split.output_for(magnitude));
            }
            self.range.set(ValueRange::spanning(0.0, magnitude));
        } else {
            self.range.set(abs_range(range));
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
        if let Built::Split(split) = self.build() {
            require_finite(&self.header.name, &self.x)?;
            tokens.add_all([&split.positive, &split.negative])?;
            if let Some(side) = &split.side {
                tokens.add(side)?;
            }
        }
        Ok(())
    }

    fn register_model(&self, model: &mut LinearModel) -> Result<()> {
        let Built::Split(split) = self.build() else {
            return Ok(());
        };
        let origin = Some(self.header.origin());
        let magnitude = split.magnitude.get();
        split.registered.set(true);
        model.add_constraint(
            self.x
                .clone()
                .equals(magnitude * &split.positive - magnitude * &split.negative),
            self.header.child("split"),
            origin,
        )?;
        if let Some(side) = &split.side {
            model.add_constraint(
                (LinearPolynomial::from(&split.positive) + &split.negative).leq(1.0),
                self.header.child("parts"),
                origin,
            )?;
            model.add_constraint(
                LinearPolynomial::from(&split.negative).leq(LinearPolynomial::from(1.0) - side),
                self.header.child("neg"),
                origin,
            )?;
            model.add_constraint(
                LinearPolynomial::from(&split.positive).leq(side),
                self.header.child("pos"),
                origin,
            )?;
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
        self.x.evaluate(source, zero_if_none).map(f64::abs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbol::testing::Harness;
    use crate::symbol::IntoSymbol;

    #[test]
    fn test_non_negative_operand_is_identity() {
        let x = Variable::real("x").with_range(0.0, 5.0);
        let abs = AbsFunction::new(&x, "abs").into_symbol();
        let harness = Harness::new(abs.clone(), &[&x]);
        assert_eq!(abs.range(), ValueRange::spanning(0.0, 5.0));
        assert!(abs.auxiliary_variables().is_empty());
        assert!(harness.model.constraints().is_empty());
    }

    #[test]
    fn test_non_positive_operand_is_negated() {
        let x = Variable::integer("x").with_range(-4.0, 0.0);
        let abs = AbsFunction::new(&x, "abs");
        assert_eq!(abs.encoding(), AbsEncoding::Negated);
        let mut harness = Harness::new(abs.into_symbol(), &[&x]);
        assert_eq!(harness.at(&[(&x, -3.0)]), 3.0);
    }

    #[test]
    fn test_split_matches_evaluation() {
        let x = Variable::real("x").with_range(-3.0, 8.0);
        let abs = AbsFunction::new(&x, "abs").into_symbol();
        assert_eq!(abs.range(), ValueRange::spanning(0.0, 8.0));
        let mut harness = Harness::new(abs, &[&x]);
        assert_eq!(harness.at(&[(&x, -2.0)]), 2.0);
        assert_eq!(harness.at(&[(&x, 0.0)]), 0.0);
        assert_eq!(harness.at(&[(&x, 6.0)]), 6.0);
    }

    #[test]
    fn test_flush_rescales_without_new_variables() {
        let x = Variable::real("x").with_range(-3.0, 8.0);
        let abs = AbsFunction::new(&x, "abs");
        let before = {
            let _ = abs.polynomial();
            abs.auxiliary_variables()
        };
        x.set_range(ValueRange::spanning(-10.0, 2.0));
        abs.flush(false);
        assert_eq!(abs.auxiliary_variables(), before);
        assert_eq!(abs.range(), ValueRange::spanning(0.0, 10.0));
        let cells = abs.polynomial().cells();
        assert!(cells.terms.values().all(|(_, c)| (*c - 10.0).abs() < 1e-12));
    }

    #[test]
    fn test_flush_after_registration_keeps_split_consistent() {
        let x = Variable::real("x").with_range(-3.0, 8.0);
        let abs = AbsFunction::new(&x, "abs").into_symbol();
        let mut harness = Harness::new(abs.clone(), &[&x]);
        let aux = abs.auxiliary_variables();
        let (positive, negative) = (aux[0].clone(), aux[1].clone());

        x.set_range(ValueRange::spanning(-2.0, 2.0));
        abs.flush(false);
        assert_eq!(abs.range(), ValueRange::spanning(0.0, 2.0));
        assert_eq!(harness.at(&[(&x, -2.0)]), 2.0);

        // Any point the registered split admits encodes |x|.
        let mut solution = Solution::new();
        solution.set(&x, -2.0);
        solution.set(&positive, 0.0);
        solution.set(&negative, 0.25);
        if let Some(side) = aux.get(2) {
            solution.set(side, 0.0);
        }
        assert!(harness.model.check(&solution).is_empty());
        let encoded = abs.polynomial().cells().evaluate(&solution).unwrap();
        assert!((encoded - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_split_needs_finite_bounds() {
        let x = Variable::real("x");
        let abs = AbsFunction::new(&x, "abs");
        let mut tokens = TokenTable::new();
        assert!(abs.register_tokens(&mut tokens).unwrap_err().is_application_failed());
    }
}
