//! Masking: a value switched off by a 0/1 mask.

use std::cell::{Cell, OnceCell};

use tracing::debug;

use super::{
    bool_value, dependencies_of, prepare_with, require_finite, require_unit_interval, Assignment,
    FunctionSymbol, Header, SymbolRef,
};
use crate::domain::range::is_zero;
use crate::domain::{
    FixedValues, LinearModel, LinearPolynomial, Solution, TokenTable, ValueRange, ValueSource,
    Variable,
};
use crate::error::Result;

/// Mask of a masking symbol: given by the caller, or a free binary owned by
/// the symbol.
pub(crate) enum Mask {
    External(LinearPolynomial),
    Internal(OnceCell<Variable>),
}

impl Mask {
    pub(crate) fn new(mask: Option<LinearPolynomial>) -> Self {
        match mask {
            Some(mask) => Mask::External(mask),
            None => Mask::Internal(OnceCell::new()),
        }
    }

    pub(crate) fn polynomial(&self, header: &Header) -> LinearPolynomial {
        match self {
            Mask::External(mask) => mask.clone(),
            Mask::Internal(cell) => {
                LinearPolynomial::from(cell.get_or_init(|| Variable::binary(header.child("u"))))
            }
        }
    }

    pub(crate) fn internal(&self) -> Option<&Variable> {
        match self {
            Mask::External(_) => None,
            Mask::Internal(cell) => cell.get(),
        }
    }

    /// Whether the mask is on. An internal mask without a value counts as on.
    pub(crate) fn state(&self, header: &Header, source: &dyn ValueSource) -> Option<bool> {
        match self {
            Mask::External(mask) => Some(!is_zero(mask.evaluate(source, false)?)),
            Mask::Internal(_) => {
                let value = self.polynomial(header).evaluate(source, false).unwrap_or(1.0);
                Some(!is_zero(value))
            }
        }
    }

    pub(crate) fn flush(&self, force: bool) {
        if let Mask::External(mask) = self {
            mask.flush(force);
        }
    }

    pub(crate) fn register_tokens(&self, header: &Header, tokens: &mut TokenTable) -> Result<()> {
        let mask = self.polynomial(header);
        require_unit_interval(&header.name, &mask)?;
        if let Some(u) = self.internal() {
            tokens.add(u)?;
        }
        Ok(())
    }
}

fn with_zero(range: ValueRange) -> ValueRange {
    range.union(&ValueRange::ZERO)
}

/// `x` where the mask is on, `0` where it is off.
///
/// ```text
/// y ≤ x + M(1 − mask)    y ≥ x − M(1 − mask)
/// y ≤ M·mask             y ≥ −M·mask
/// ```
/// with `M = max(|lb(x)|, |ub(x)|)`.
pub struct MaskingFunction {
    header: Header,
    x: LinearPolynomial,
    mask: Mask,
    range: Cell<ValueRange>,
    y: OnceCell<Variable>,
}

impl MaskingFunction {
    pub fn new(
        x: impl Into<LinearPolynomial>,
        mask: Option<LinearPolynomial>,
        name: impl Into<String>,
    ) -> Self {
        let x = x.into();
        let range = Cell::new(with_zero(x.range()));
        Self {
            header: Header::new(name),
            x,
            mask: Mask::new(mask),
            range,
            y: OnceCell::new(),
        }
    }

    /// The mask as a polynomial, creating the internal binary if needed.
    pub fn mask(&self) -> LinearPolynomial {
        self.mask.polynomial(&self.header)
    }

    #[must_use]
    pub fn operand(&self) -> &LinearPolynomial {
        &self.x
    }

    fn output(&self) -> &Variable {
        self.y.get_or_init(|| {
            let y = if self.x.discrete() {
                Variable::integer(self.header.child("y"))
            } else {
                Variable::real(self.header.child("y"))
            };
            y.set_range(self.range.get());
            debug!(symbol = %self.header.name, range = %y.range(), "built masking output");
            y
        })
    }

    /// Assignment with the mask forced to `on`.
    pub(crate) fn assignment_with(&self, on: bool, source: &dyn ValueSource) -> Option<Assignment> {
        let value = if on { self.x.evaluate(source, false)? } else { 0.0 };
        let mut assignment = Assignment::new(value);
        if let Some(u) = self.mask.internal() {
            assignment.push(u, bool_value(on));
        }
        assignment.push(self.output(), value);
        Some(assignment)
    }

    /// Mask state under `source`, `None` for an internal mask with no value.
    pub(crate) fn mask_state(&self, source: &dyn ValueSource) -> Option<bool> {
        self.mask()
            .evaluate(source, false)
            .map(|value| !is_zero(value))
    }

    fn assignment(&self, source: &dyn ValueSource) -> Option<Assignment> {
        let on = self.mask.state(&self.header, source)?;
        self.assignment_with(on, source)
    }
}

header_builders!(MaskingFunction);

impl FunctionSymbol for MaskingFunction {
    header_accessors!();

    fn discrete(&self) -> bool {
        self.x.discrete()
    }

    fn range(&self) -> ValueRange {
        self.range.get()
    }

    fn dependencies(&self) -> Vec<SymbolRef> {
        match &self.mask {
            Mask::External(mask) => dependencies_of([&self.x, mask]),
            Mask::Internal(_) => self.x.dependencies(),
        }
    }

    fn polynomial(&self) -> LinearPolynomial {
        LinearPolynomial::from(self.output())
    }

    fn auxiliary_variables(&self) -> Vec<Variable> {
        self.y
            .get()
            .into_iter()
            .chain(self.mask.internal())
            .cloned()
            .collect()
    }

    fn flush(&self, force: bool) {
        self.x.flush(force);
        self.mask.flush(force);
        let range = with_zero(self.x.range());
        self.range.set(range);
        if let Some(y) = self.y.get() {
            y.set_range(range);
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
        require_finite(&self.header.name, &self.x)?;
        self.mask.register_tokens(&self.header, tokens)?;
        tokens.add(self.output())?;
        Ok(())
    }

    fn register_model(&self, model: &mut LinearModel) -> Result<()> {
        let origin = Some(self.header.origin());
        let y = self.output();
        let mask = self.mask();
        let big_m = self.x.range().magnitude();
        let off = big_m * (LinearPolynomial::from(1.0) - mask.clone());
        model.add_constraint(
            LinearPolynomial::from(y).leq(self.x.clone() + off.clone()),
            self.header.child("x_ub"),
            origin,
        )?;
        model.add_constraint(
            LinearPolynomial::from(y).geq(self.x.clone() - off),
            self.header.child("x_lb"),
            origin,
        )?;
        model.add_constraint(
            LinearPolynomial::from(y).leq(big_m * mask.clone()),
            self.header.child("mask_ub"),
            origin,
        )?;
        model.add_constraint(
            LinearPolynomial::from(y).geq(-big_m * mask),
            self.header.child("mask_lb"),
            origin,
        )
    }

    fn register_model_fixed(&self, model: &mut LinearModel, fixed: &FixedValues) -> Result<()> {
        match self.assignment(fixed) {
            Some(assignment) if matches!(self.mask, Mask::External(_)) => {
                assignment.pin(model, &self.header)
            }
            _ => self.register_model(model),
        }
    }

    fn calculate_value(&self, source: &dyn ValueSource, zero_if_none: bool) -> Option<f64> {
        let mask = self.mask().evaluate(source, zero_if_none)?;
        if is_zero(mask) {
            Some(0.0)
        } else {
            self.x.evaluate(source, zero_if_none)
        }
    }
}

/// A free value in `[lb, ub]` where the mask is on, `0` where it is off:
/// `lb·mask ≤ y ≤ ub·mask`.
pub struct MaskingRangeFunction {
    header: Header,
    mask: Mask,
    lower: f64,
    upper: f64,
    y: OnceCell<Variable>,
}

impl MaskingRangeFunction {
    pub fn new(mask: Option<LinearPolynomial>, lower: f64, upper: f64, name: impl Into<String>) -> Self {
        Self {
            header: Header::new(name),
            mask: Mask::new(mask),
            lower,
            upper,
            y: OnceCell::new(),
        }
    }

    pub fn mask(&self) -> LinearPolynomial {
        self.mask.polynomial(&self.header)
    }

    fn value_range(&self) -> ValueRange {
        with_zero(ValueRange::spanning(self.lower, self.upper))
    }

    fn output(&self) -> &Variable {
        self.y.get_or_init(|| {
            let y = Variable::real(self.header.child("y"));
            y.set_range(self.value_range());
            y
        })
    }

    fn assignment(&self, source: &dyn ValueSource) -> Option<Assignment> {
        let on = self.mask.state(&self.header, source)?;
        let mut assignment = Assignment::new(0.0);
        if let Some(u) = self.mask.internal() {
            assignment.push(u, bool_value(on));
        }
        let value = if on {
            source
                .variable_value(self.output())
                .unwrap_or_else(|| 0.0_f64.clamp(self.lower.min(self.upper), self.upper.max(self.lower)))
        } else {
            0.0
        };
        assignment.value = value;
        assignment.push(self.output(), value);
        Some(assignment)
    }
}

header_builders!(MaskingRangeFunction);

impl FunctionSymbol for MaskingRangeFunction {
    header_accessors!();

    fn discrete(&self) -> bool {
        false
    }

    fn range(&self) -> ValueRange {
        self.value_range()
    }

    fn dependencies(&self) -> Vec<SymbolRef> {
        match &self.mask {
            Mask::External(mask) => mask.dependencies(),
            Mask::Internal(_) => Vec::new(),
        }
    }

    fn polynomial(&self) -> LinearPolynomial {
        LinearPolynomial::from(self.output())
    }

    fn auxiliary_variables(&self) -> Vec<Variable> {
        self.y
            .get()
            .into_iter()
            .chain(self.mask.internal())
            .cloned()
            .collect()
    }

    fn flush(&self, force: bool) {
        self.mask.flush(force);
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
        self.mask.register_tokens(&self.header, tokens)?;
        tokens.add(self.output())?;
        Ok(())
    }

    fn register_model(&self, model: &mut LinearModel) -> Result<()> {
        let origin = Some(self.header.origin());
        let y = self.output();
        let mask = self.mask();
        model.add_constraint(
            LinearPolynomial::from(y).leq(self.upper * mask.clone()),
            self.header.child("ub"),
            origin,
        )?;
        model.add_constraint(
            LinearPolynomial::from(y).geq(self.lower * mask),
            self.header.child("lb"),
            origin,
        )
    }

    fn calculate_value(&self, source: &dyn ValueSource, zero_if_none: bool) -> Option<f64> {
        let mask = self.mask().evaluate(source, zero_if_none)?;
        if is_zero(mask) {
            Some(0.0)
        } else {
            LinearPolynomial::from(self.output()).evaluate(source, zero_if_none)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbol::testing::Harness;
    use crate::symbol::IntoSymbol;

    #[test]
    fn test_masking_with_external_mask() {
        let x = Variable::real("x").with_range(-2.0, 6.0);
        let m = Variable::binary("m");
        let masked = MaskingFunction::new(&x, Some(LinearPolynomial::from(&m)), "masked").into_symbol();
        assert_eq!(masked.range(), ValueRange::spanning(-2.0, 6.0));
        let mut harness = Harness::new(masked, &[&x, &m]);
        assert_eq!(harness.at(&[(&x, 4.0), (&m, 1.0)]), 4.0);
        assert_eq!(harness.at(&[(&x, -1.5), (&m, 1.0)]), -1.5);
        assert_eq!(harness.at(&[(&x, 4.0), (&m, 0.0)]), 0.0);
    }

    #[test]
    fn test_masking_range_includes_zero() {
        let x = Variable::real("x").with_range(3.0, 6.0);
        let masked = MaskingFunction::new(&x, None, "masked");
        assert_eq!(masked.range(), ValueRange::spanning(0.0, 6.0));
    }

    #[test]
    fn test_internal_mask_is_an_auxiliary() {
        let x = Variable::real("x").with_range(0.0, 6.0);
        let masked = MaskingFunction::new(&x, None, "masked").into_symbol();
        let mut model = LinearModel::new();
        model.tokens_mut().add(&x).unwrap();
        model.add_symbol(&masked).unwrap();
        let names: Vec<String> = masked
            .auxiliary_variables()
            .iter()
            .map(|v| v.name().to_string())
            .collect();
        assert_eq!(names, vec!["masked_y", "masked_u"]);
        assert_eq!(model.constraints().len(), 4);
    }

    #[test]
    fn test_mask_outside_unit_interval_fails() {
        let x = Variable::real("x").with_range(0.0, 6.0);
        let m = Variable::uinteger("m").with_range(0.0, 2.0);
        let masked = MaskingFunction::new(&x, Some(LinearPolynomial::from(&m)), "masked");
        let mut tokens = TokenTable::new();
        assert!(masked.register_tokens(&mut tokens).unwrap_err().is_application_failed());
    }

    #[test]
    fn test_masking_range_warm_start() {
        let m = Variable::binary("m");
        let slot = MaskingRangeFunction::new(Some(LinearPolynomial::from(&m)), 2.0, 5.0, "slot").into_symbol();
        let mut model = LinearModel::new();
        model.tokens_mut().add(&m).unwrap();
        model.add_symbol(&slot).unwrap();

        let mut solution = Solution::new();
        solution.set(&m, 1.0);
        model.tokens_mut().load_solution(solution.clone());
        let mut warm = solution;
        assert_eq!(slot.prepare_and_cache(None, model.tokens(), &mut warm), Some(2.0));
        assert!(model.check(&warm).is_empty());
    }
}
