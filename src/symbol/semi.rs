//! Semi-continuous values and the rectifier.

use std::cell::{Cell, OnceCell};

use tracing::debug;

use super::masking::Mask;
use super::selection::{self, ReluEncoding};
use super::{
    bool_value, dependencies_of, prepare_with, require_finite, require_non_negative, Assignment,
    FunctionSymbol, Header, SymbolRef,
};
use crate::domain::range::is_zero;
use crate::domain::{
    FixedValues, LinearModel, LinearPolynomial, Solution, TokenTable, ValueRange, ValueSource,
    Variable,
};
use crate::error::Result;

fn output_variable(name: String, discrete: bool, range: ValueRange) -> Variable {
    let y = if discrete {
        Variable::uinteger(name)
    } else {
        Variable::ureal(name)
    };
    y.set_range(range);
    y
}

/// `x` when the flag is on, `0` otherwise, for `x ≥ 0`.
///
/// Without a flag the symbol owns a binary `u`, leaving the solver free to
/// switch the value off.
pub struct SemiFunction {
    header: Header,
    x: LinearPolynomial,
    flag: Mask,
    range: Cell<ValueRange>,
    y: OnceCell<Variable>,
}

impl SemiFunction {
    pub fn new(
        x: impl Into<LinearPolynomial>,
        flag: Option<LinearPolynomial>,
        name: impl Into<String>,
    ) -> Self {
        let x = x.into();
        let flag = Mask::new(flag);
        let header = Header::new(name);
        let range = Cell::new(Self::value_range(&x, &flag, &header));
        Self {
            header,
            x,
            flag,
            range,
            y: OnceCell::new(),
        }
    }

    pub fn flag(&self) -> LinearPolynomial {
        self.flag.polynomial(&self.header)
    }

    fn value_range(x: &LinearPolynomial, flag: &Mask, header: &Header) -> ValueRange {
        let flag = match flag {
            Mask::External(_) => flag.polynomial(header).range(),
            Mask::Internal(_) => ValueRange::UNIT,
        };
        ValueRange::spanning(flag.lower() * x.lower_bound(), flag.upper() * x.upper_bound())
    }

    fn output(&self) -> &Variable {
        self.y.get_or_init(|| {
            output_variable(self.header.child("y"), self.x.discrete(), self.range.get())
        })
    }

    fn assignment(&self, source: &dyn ValueSource) -> Option<Assignment> {
        let on = self.flag.state(&self.header, source)?;
        let value = if on { self.x.evaluate(source, false)? } else { 0.0 };
        let mut assignment = Assignment::new(value);
        if let Some(u) = self.flag.internal() {
            assignment.push(u, bool_value(on));
        }
        assignment.push(self.output(), value);
        Some(assignment)
    }
}

header_builders!(SemiFunction);

impl FunctionSymbol for SemiFunction {
    header_accessors!();

    fn discrete(&self) -> bool {
        self.x.discrete()
    }

    fn range(&self) -> ValueRange {
        self.range.get()
    }

    fn dependencies(&self) -> Vec<SymbolRef> {
        match &self.flag {
            Mask::External(flag) => dependencies_of([&self.x, flag]),
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
            .chain(self.flag.internal())
            .cloned()
            .collect()
    }

    fn flush(&self, force: bool) {
        self.x.flush(force);
        self.flag.flush(force);
        let range = Self::value_range(&self.x, &self.flag, &self.header);
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
        require_non_negative(&self.header.name, &self.x)?;
        require_finite(&self.header.name, &self.x)?;
        self.flag.register_tokens(&self.header, tokens)?;
        tokens.add(self.output())?;
        Ok(())
    }

    fn register_model(&self, model: &mut LinearModel) -> Result<()> {
        let origin = Some(self.header.origin());
        let y = LinearPolynomial::from(self.output());
        let flag = self.flag();
        let (lower, upper) = (self.x.lower_bound(), self.x.upper_bound());
        model.add_constraint(y.clone().leq(self.x.clone()), self.header.child("x"), origin)?;
        model.add_constraint(
            y.clone()
                .geq(self.x.clone() - upper * (LinearPolynomial::from(1.0) - flag.clone())),
            self.header.child("xu"),
            origin,
        )?;
        model.add_constraint(y.clone().geq(lower * flag.clone()), self.header.child("lb"), origin)?;
        model.add_constraint(y.leq(upper * flag), self.header.child("ub"), origin)
    }

    fn register_model_fixed(&self, model: &mut LinearModel, fixed: &FixedValues) -> Result<()> {
        match self.assignment(fixed) {
            Some(assignment) if matches!(self.flag, Mask::External(_)) => {
                assignment.pin(model, &self.header)
            }
            _ => self.register_model(model),
        }
    }

    fn calculate_value(&self, source: &dyn ValueSource, zero_if_none: bool) -> Option<f64> {
        let flag = self.flag().evaluate(source, zero_if_none)?;
        if is_zero(flag) {
            Some(0.0)
        } else {
            self.x.evaluate(source, zero_if_none)
        }
    }
}

struct Rectifier {
    y: Variable,
    /// On when `x > 0`.
    u: Variable,
}

enum Built {
    Identity,
    Zero,
    Binary(Rectifier),
}

/// `max(x, 0)`.
///
/// ```text
/// y ≥ x    y ≤ x − lb(x)·(1 − u)    y ≤ ub(x)·u    y ≥ 0
/// ```
pub struct ReluFunction {
    header: Header,
    x: LinearPolynomial,
    range: Cell<ValueRange>,
    built: OnceCell<Built>,
}

impl ReluFunction {
    pub fn new(x: impl Into<LinearPolynomial>, name: impl Into<String>) -> Self {
        let x = x.into();
        let range = Cell::new(Self::value_range(&x));
        Self {
            header: Header::new(name),
            x,
            range,
            built: OnceCell::new(),
        }
    }

    #[must_use]
    pub fn encoding(&self) -> ReluEncoding {
        match self.built.get() {
            Some(Built::Identity) => ReluEncoding::Identity,
            Some(Built::Zero) => ReluEncoding::Zero,
            Some(Built::Binary(_)) => ReluEncoding::Binary,
            None => selection::relu(&self.x.range()),
        }
    }

    fn value_range(x: &LinearPolynomial) -> ValueRange {
        ValueRange::spanning(x.lower_bound().max(0.0), x.upper_bound().max(0.0))
    }

    fn build(&self) -> &Built {
        self.built.get_or_init(|| {
            let encoding = selection::relu(&self.x.range());
            debug!(symbol = %self.header.name, ?encoding, operand = %self.x, "selected relu encoding");
            match encoding {
                ReluEncoding::Identity => Built::Identity,
                ReluEncoding::Zero => Built::Zero,
                ReluEncoding::Binary => Built::Binary(Rectifier {
                    y: output_variable(self.header.child("y"), self.x.discrete(), self.range.get()),
                    u: Variable::binary(self.header.child("u")),
                }),
            }
        })
    }

    fn assignment(&self, source: &dyn ValueSource) -> Option<Assignment> {
        let x = self.x.evaluate(source, false)?;
        let value = x.max(0.0);
        let mut assignment = Assignment::new(value);
        if let Built::Binary(rectifier) = self.build() {
            assignment.push(&rectifier.y, value);
            assignment.push(&rectifier.u, bool_value(x > 0.0));
        }
        Some(assignment)
    }
}

header_builders!(ReluFunction);

impl FunctionSymbol for ReluFunction {
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
            Built::Zero => LinearPolynomial::new(),
            Built::Binary(rectifier) => LinearPolynomial::from(&rectifier.y),
        }
    }

    fn auxiliary_variables(&self) -> Vec<Variable> {
        match self.built.get() {
            Some(Built::Binary(rectifier)) => vec![rectifier.y.clone(), rectifier.u.clone()],
            _ => Vec::new(),
        }
    }

    fn flush(&self, force: bool) {
        self.x.flush(force);
        let range = Self::value_range(&self.x);
        self.range.set(range);
        if let Some(Built::Binary(rectifier)) = self.built.get() {
            rectifier.y.set_range(range);
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
        if let Built::Binary(rectifier) = self.build() {
            require_finite(&self.header.name, &self.x)?;
            tokens.add_all([&rectifier.y, &rectifier.u])?;
        }
        Ok(())
    }

    fn register_model(&self, model: &mut LinearModel) -> Result<()> {
        let Built::Binary(rectifier) = self.build() else {
            return Ok(());
        };
        let origin = Some(self.header.origin());
        let y = LinearPolynomial::from(&rectifier.y);
        let off = LinearPolynomial::from(1.0) - &rectifier.u;
        model.add_constraint(y.clone().geq(self.x.clone()), self.header.child("x"), origin)?;
        model.add_constraint(
            y.clone().leq(self.x.clone() - self.x.lower_bound() * off),
            self.header.child("xu"),
            origin,
        )?;
        model.add_constraint(
            y.leq(self.x.upper_bound() * &rectifier.u),
            self.header.child("ub"),
            origin,
        )
    }

    fn register_model_fixed(&self, model: &mut LinearModel, fixed: &FixedValues) -> Result<()> {
        match self.assignment(fixed) {
            Some(assignment) => assignment.pin(model, &self.header),
            None => self.register_model(model),
        }
    }

    fn calculate_value(&self, source: &dyn ValueSource, zero_if_none: bool) -> Option<f64> {
        self.x
            .evaluate(source, zero_if_none)
            .map(|x| x.max(0.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbol::testing::Harness;
    use crate::symbol::IntoSymbol;

    #[test]
    fn test_semi_with_flag() {
        let x = Variable::real("x").with_range(0.0, 8.0);
        let on = Variable::binary("on");
        let semi = SemiFunction::new(&x, Some(LinearPolynomial::from(&on)), "semi").into_symbol();
        assert_eq!(semi.range(), ValueRange::spanning(0.0, 8.0));
        let mut harness = Harness::new(semi, &[&x, &on]);
        assert_eq!(harness.at(&[(&x, 5.5), (&on, 1.0)]), 5.5);
        assert_eq!(harness.at(&[(&x, 5.5), (&on, 0.0)]), 0.0);
    }

    #[test]
    fn test_semi_owns_flag_without_one() {
        let x = Variable::uinteger("x").with_range(2.0, 6.0);
        let semi = SemiFunction::new(&x, None, "semi").into_symbol();
        let mut model = LinearModel::new();
        model.tokens_mut().add(&x).unwrap();
        model.add_symbol(&semi).unwrap();
        let names: Vec<String> = semi
            .auxiliary_variables()
            .iter()
            .map(|v| v.name().to_string())
            .collect();
        assert_eq!(names, vec!["semi_y", "semi_u"]);
        assert_eq!(semi.range(), ValueRange::spanning(0.0, 6.0));
    }

    #[test]
    fn test_semi_needs_non_negative_operand() {
        let x = Variable::real("x").with_range(-1.0, 3.0);
        let semi = SemiFunction::new(&x, None, "semi");
        let mut tokens = TokenTable::new();
        assert!(semi.register_tokens(&mut tokens).unwrap_err().is_application_failed());
    }

    #[test]
    fn test_relu_selection() {
        let pos = Variable::real("pos").with_range(0.0, 3.0);
        let neg = Variable::real("neg").with_range(-3.0, 0.0);
        let both = Variable::real("both").with_range(-3.0, 3.0);
        assert_eq!(ReluFunction::new(&pos, "a").encoding(), ReluEncoding::Identity);
        assert_eq!(ReluFunction::new(&neg, "b").encoding(), ReluEncoding::Zero);
        assert_eq!(ReluFunction::new(&both, "c").encoding(), ReluEncoding::Binary);
    }

    #[test]
    fn test_relu_binary_encoding() {
        let x = Variable::integer("x").with_range(-4.0, 6.0);
        let relu = ReluFunction::new(&x, "relu").into_symbol();
        assert_eq!(relu.range(), ValueRange::spanning(0.0, 6.0));
        let mut harness = Harness::new(relu, &[&x]);
        assert_eq!(harness.at(&[(&x, -3.0)]), 0.0);
        assert_eq!(harness.at(&[(&x, 0.0)]), 0.0);
        assert_eq!(harness.at(&[(&x, 5.0)]), 5.0);
    }
}
