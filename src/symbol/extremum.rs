//! Maximum and minimum of several operands.

use std::cell::{Cell, OnceCell};

use tracing::debug;

use super::selection::{self, ExtremumEncoding};
use super::{
    application_failed, dependencies_of, prepare_with, require_finite, Assignment, FunctionSymbol,
    Header, SymbolRef,
};
use crate::domain::{
    FixedValues, LinearModel, LinearPolynomial, Solution, TokenTable, ValueRange, ValueSource,
    Variable,
};
use crate::error::Result;

/// Which extremum.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Extremum {
    Max,
    Min,
}

impl Extremum {
    fn pick(self, a: f64, b: f64) -> f64 {
        match self {
            Extremum::Max => a.max(b),
            Extremum::Min => a.min(b),
        }
    }
}

enum Built {
    Identity,
    /// `selectors` is empty for the inexact encoding.
    Linked { y: Variable, selectors: Vec<Variable> },
}

/// `max(xᵢ)` or `min(xᵢ)`.
///
/// The inexact encoding only bounds `y` from one side and is meant for
/// objectives that push `y` against that side. The exact encoding adds one
/// selector binary per operand.
pub struct ExtremumFunction {
    header: Header,
    kind: Extremum,
    operands: Vec<LinearPolynomial>,
    exact: bool,
    range: Cell<ValueRange>,
    built: OnceCell<Built>,
}

impl ExtremumFunction {
    pub fn new<I, P>(kind: Extremum, operands: I, exact: bool, name: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<LinearPolynomial>,
    {
        let operands: Vec<LinearPolynomial> = operands.into_iter().map(Into::into).collect();
        let range = Cell::new(Self::value_range(kind, &operands));
        Self {
            header: Header::new(name),
            kind,
            operands,
            exact,
            range,
            built: OnceCell::new(),
        }
    }

    pub fn max<I, P>(operands: I, name: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<LinearPolynomial>,
    {
        Self::new(Extremum::Max, operands, false, name)
    }

    pub fn min<I, P>(operands: I, name: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<LinearPolynomial>,
    {
        Self::new(Extremum::Min, operands, false, name)
    }

    pub fn exact_max<I, P>(operands: I, name: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<LinearPolynomial>,
    {
        Self::new(Extremum::Max, operands, true, name)
    }

    pub fn exact_min<I, P>(operands: I, name: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<LinearPolynomial>,
    {
        Self::new(Extremum::Min, operands, true, name)
    }

    #[must_use]
    pub fn kind(&self) -> Extremum {
        self.kind
    }

    #[must_use]
    pub fn encoding(&self) -> ExtremumEncoding {
        selection::extremum(self.operands.len(), self.exact)
    }

    fn value_range(kind: Extremum, operands: &[LinearPolynomial]) -> ValueRange {
        operands
            .iter()
            .map(LinearPolynomial::range)
            .reduce(|acc, r| {
                ValueRange::spanning(kind.pick(acc.lower(), r.lower()), kind.pick(acc.upper(), r.upper()))
            })
            .unwrap_or(ValueRange::ZERO)
    }

    fn build(&self) -> &Built {
        self.built.get_or_init(|| {
            let encoding = self.encoding();
            debug!(symbol = %self.header.name, ?encoding, kind = ?self.kind, "selected extremum encoding");
            match encoding {
                ExtremumEncoding::Identity => Built::Identity,
                ExtremumEncoding::Inexact | ExtremumEncoding::Exact => {
                    let y = if self.discrete() {
                        Variable::integer(self.header.child("y"))
                    } else {
                        Variable::real(self.header.child("y"))
                    };
                    y.set_range(self.range.get());
                    let selectors = if encoding == ExtremumEncoding::Exact {
                        (0..self.operands.len())
                            .map(|i| Variable::binary(self.header.child(format_args!("u_{i}"))))
                            .collect()
                    } else {
                        Vec::new()
                    };
                    Built::Linked { y, selectors }
                }
            }
        })
    }

    /// Index of the first operand attaining the extremum, and its value.
    fn attained(&self, source: &dyn ValueSource, zero_if_none: bool) -> Option<(usize, f64)> {
        let mut best: Option<(usize, f64)> = None;
        for (i, operand) in self.operands.iter().enumerate() {
            let value = operand.evaluate(source, zero_if_none)?;
            best = match best {
                Some((_, current)) if self.kind.pick(current, value) == current => best,
                _ => Some((i, value)),
            };
        }
        best
    }

    fn assignment(&self, source: &dyn ValueSource) -> Option<Assignment> {
        let (index, value) = self.attained(source, false)?;
        let mut assignment = Assignment::new(value);
        if let Built::Linked { y, selectors } = self.build() {
            assignment.push(y, value);
            for (i, selector) in selectors.iter().enumerate() {
                assignment.push(selector, if i == index { 1.0 } else { 0.0 });
            }
        }
        Some(assignment)
    }
}

header_builders!(ExtremumFunction);

impl FunctionSymbol for ExtremumFunction {
    header_accessors!();

    fn discrete(&self) -> bool {
        self.operands.iter().all(LinearPolynomial::discrete)
    }

    fn range(&self) -> ValueRange {
        self.range.get()
    }

    fn dependencies(&self) -> Vec<SymbolRef> {
        dependencies_of(&self.operands)
    }

    fn polynomial(&self) -> LinearPolynomial {
        match self.build() {
            Built::Identity => self.operands.first().cloned().unwrap_or_default(),
            Built::Linked { y, .. } => LinearPolynomial::from(y),
        }
    }

    fn auxiliary_variables(&self) -> Vec<Variable> {
        match self.built.get() {
            None | Some(Built::Identity) => Vec::new(),
            Some(Built::Linked { y, selectors }) => {
                std::iter::once(y.clone()).chain(selectors.iter().cloned()).collect()
            }
        }
    }

    fn flush(&self, force: bool) {
        for operand in &self.operands {
            operand.flush(force);
        }
        let range = Self::value_range(self.kind, &self.operands);
        self.range.set(range);
        if let Some(Built::Linked { y, .. }) = self.built.get() {
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
        if self.operands.is_empty() {
            return Err(application_failed(&self.header.name, "needs at least one operand"));
        }
        match self.build() {
            Built::Identity => Ok(()),
            Built::Linked { y, selectors } => {
                if !selectors.is_empty() {
                    for operand in &self.operands {
                        require_finite(&self.header.name, operand)?;
                    }
                }
                tokens.add(y)?;
                tokens.add_all(selectors)?;
                Ok(())
            }
        }
    }

    fn register_model(&self, model: &mut LinearModel) -> Result<()> {
        let Built::Linked { y, selectors } = self.build() else {
            return Ok(());
        };
        let origin = Some(self.header.origin());
        let range = self.range.get();
        for (i, operand) in self.operands.iter().enumerate() {
            let bound = match self.kind {
                Extremum::Max => LinearPolynomial::from(y).geq(operand),
                Extremum::Min => LinearPolynomial::from(y).leq(operand),
            };
            model.add_constraint(bound, self.header.child(format_args!("bound_{i}")), origin)?;
        }
        if selectors.is_empty() {
            return Ok(());
        }
        for (i, (operand, selector)) in self.operands.iter().zip(selectors).enumerate() {
            let name = self.header.child(format_args!("select_{i}"));
            let off = LinearPolynomial::from(1.0) - selector;
            let inequality = match self.kind {
                Extremum::Max => {
                    let big_m = range.upper() - operand.lower_bound();
                    LinearPolynomial::from(y).leq(operand.clone() + big_m * off)
                }
                Extremum::Min => {
                    let big_m = operand.upper_bound() - range.lower();
                    LinearPolynomial::from(y).geq(operand.clone() - big_m * off)
                }
            };
            model.add_constraint(inequality, name, origin)?;
        }
        model.add_constraint(
            selectors.iter().sum::<LinearPolynomial>().equals(1.0),
            self.header.child("select"),
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
        self.attained(source, zero_if_none).map(|(_, value)| value)
    }
}
