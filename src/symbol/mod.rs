//! Function symbols and their linear reformulation.
//!
//! A function symbol represents a nonlinear or logical relation over linear
//! polynomials (absolute value, min/max, rounding, boolean logic, piecewise
//! interpolation, ...). Every symbol can:
//!
//! - report its value range and whether it is discrete,
//! - introduce auxiliary variables and constraints that reproduce the
//!   relation inside a mixed-integer program,
//! - evaluate its value from a concrete assignment without being registered.
//!
//! # Lifecycle
//!
//! ```text
//! construct ─► build (once) ─► register_tokens / register_model
//!     │             ▲                       │
//!     └─ flush ─────┘              prepare (warm start + cache)
//! ```
//!
//! `build` creates the auxiliary variables behind a `OnceCell`; their
//! identity is frozen from then on. `flush` refreshes ranges and big-M
//! constants from the current operand bounds. `register_*` is the only
//! fallible step and reports domain violations as
//! [`SymbolError::ApplicationFailed`](crate::error::SymbolError).
//!
//! # Kinds
//!
//! The closed set of kinds is the [`Symbol`] enum. Kinds with several valid
//! encodings pick one through the pure functions of [`selection`].

use std::rc::Rc;

use tracing::{debug, trace, warn};

use crate::domain::{
    FixedValues, LinearModel, LinearPolynomial, Solution, TokenTable, ValueRange, ValueSource,
    ValueView, Variable,
};
use crate::error::{Error, Result, SymbolError};

/// Accessors shared by every symbol's `FunctionSymbol` impl.
macro_rules! header_accessors {
    () => {
        fn name(&self) -> &str {
            &self.header.name
        }

        fn display_name(&self) -> Option<&str> {
            self.header.display_name.as_deref()
        }

        fn parent(&self) -> Option<&str> {
            self.header.parent.as_deref()
        }
    };
}

/// Builder methods shared by every symbol struct.
macro_rules! header_builders {
    ($ty:ty) => {
        impl $ty {
            /// Set the pretty-printing name.
            #[must_use]
            pub fn with_display_name(mut self, display_name: impl Into<String>) -> Self {
                self.header.display_name = Some(display_name.into());
                self
            }

            /// Name the symbol that emitted constraints are attributed to.
            #[must_use]
            pub fn with_parent(mut self, parent: impl Into<String>) -> Self {
                self.header.parent = Some(parent.into());
                self
            }
        }
    };
}

mod abs;
mod bivariate;
mod branch;
mod condition;
mod counting;
mod division;
mod extremum;
mod first;
mod indicator;
mod logic;
mod masking;
mod piecewise;
pub mod selection;
mod semi;
mod slack;
mod ternary;

pub use abs::AbsFunction;
pub use bivariate::BivariatePiecewiseFunction;
pub use branch::{Branch, OneOfFunction};
pub use condition::{IfFunction, IfInFunction, IfThenFunction, SameAsFunction};
pub use counting::{SatisfiedAmountFunction, SatisfiedAmountInequalityFunction};
pub use division::{DivisionFunction, DivisionMode, InStepRangeFunction};
pub use extremum::{Extremum, ExtremumFunction};
pub use first::FirstFunction;
pub use indicator::{BinaryzationFunction, NotFunction};
pub use logic::{AndFunction, OrFunction, XorFunction};
pub use masking::{MaskingFunction, MaskingRangeFunction};
pub use piecewise::{SigmoidFunction, SigmoidPrecision, UnivariatePiecewiseFunction};
pub use semi::{ReluFunction, SemiFunction};
pub use slack::{SlackFunction, SlackRangeFunction};
pub use ternary::BalanceTernaryzationFunction;

/// Shared handle to a symbol. Composite symbols and polynomials hold these.
pub type SymbolRef = Rc<Symbol>;

/// Expression category of a symbol's encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    Linear,
}

/// Contract every function symbol obeys.
pub trait FunctionSymbol {
    /// Unique name within a model; prefix of every auxiliary variable name.
    fn name(&self) -> &str;

    fn display_name(&self) -> Option<&str>;

    /// Name of the symbol emitted constraints are attributed to.
    fn parent(&self) -> Option<&str>;

    fn category(&self) -> Category {
        Category::Linear
    }

    /// True iff every possible value is an integer.
    fn discrete(&self) -> bool;

    /// Superset of every value the symbol can take under the operand bounds
    /// seen by the last `flush` (or construction).
    fn range(&self) -> ValueRange;

    fn lower_bound(&self) -> f64 {
        self.range().lower()
    }

    fn upper_bound(&self) -> f64 {
        self.range().upper()
    }

    /// Symbols read by the operands, transitively.
    fn dependencies(&self) -> Vec<SymbolRef>;

    /// The symbol's value in terms of auxiliary variables (and operands).
    /// Builds the auxiliary state on first use.
    fn polynomial(&self) -> LinearPolynomial;

    /// Auxiliary variables created so far, including those of owned
    /// sub-symbols. Empty before the first build.
    fn auxiliary_variables(&self) -> Vec<Variable>;

    /// Refresh range, auxiliary bounds and big-M constants from the current
    /// operand bounds. Never changes auxiliary identity.
    fn flush(&self, force: bool);

    /// Seed warm-start values of the auxiliary variables into `warm_start`
    /// and return the symbol's value, when a solution is loaded (or `fixed`
    /// is non-empty) and the value is not cached yet.
    fn prepare(
        &self,
        fixed: Option<&FixedValues>,
        tokens: &TokenTable,
        warm_start: &mut Solution,
    ) -> Option<f64>;

    /// Add the auxiliary variables to the token table.
    ///
    /// # Errors
    ///
    /// `ApplicationFailed` when a domain precondition does not hold;
    /// `DuplicateVariable` on a name clash.
    fn register_tokens(&self, tokens: &mut TokenTable) -> Result<()>;

    /// Emit the constraints.
    ///
    /// # Errors
    ///
    /// `ApplicationFailed` when a domain precondition does not hold; any
    /// model error from `add_constraint`.
    fn register_model(&self, model: &mut LinearModel) -> Result<()>;

    /// [`FunctionSymbol::register_tokens`] with some operand values pinned.
    ///
    /// # Errors
    ///
    /// As [`FunctionSymbol::register_tokens`].
    fn register_tokens_fixed(&self, tokens: &mut TokenTable, _fixed: &FixedValues) -> Result<()> {
        self.register_tokens(tokens)
    }

    /// Emit a cheaper, fully determined encoding when the operands evaluate
    /// under `fixed`; otherwise fall back to [`FunctionSymbol::register_model`].
    ///
    /// # Errors
    ///
    /// As [`FunctionSymbol::register_model`].
    fn register_model_fixed(&self, model: &mut LinearModel, _fixed: &FixedValues) -> Result<()> {
        self.register_model(model)
    }

    /// Value computed from operand values only.
    fn calculate_value(&self, source: &dyn ValueSource, zero_if_none: bool) -> Option<f64>;
}

/// Closed set of symbol kinds.
pub enum Symbol {
    Abs(AbsFunction),
    And(AndFunction),
    Or(OrFunction),
    Not(NotFunction),
    Xor(XorFunction),
    Binaryzation(BinaryzationFunction),
    BalanceTernaryzation(BalanceTernaryzationFunction),
    Extremum(ExtremumFunction),
    Division(DivisionFunction),
    InStepRange(InStepRangeFunction),
    If(IfFunction),
    IfIn(IfInFunction),
    IfThen(IfThenFunction),
    SameAs(SameAsFunction),
    Masking(MaskingFunction),
    MaskingRange(MaskingRangeFunction),
    OneOf(OneOfFunction),
    First(FirstFunction),
    SatisfiedAmount(SatisfiedAmountFunction),
    SatisfiedAmountInequality(SatisfiedAmountInequalityFunction),
    Slack(SlackFunction),
    SlackRange(SlackRangeFunction),
    Semi(SemiFunction),
    Relu(ReluFunction),
    Sigmoid(SigmoidFunction),
    UnivariatePiecewise(UnivariatePiecewiseFunction),
    BivariatePiecewise(BivariatePiecewiseFunction),
}

macro_rules! dispatch {
    ($value:expr, $s:ident => $body:expr) => {
        match $value {
            Symbol::Abs($s) => $body,
            Symbol::And($s) => $body,
            Symbol::Or($s) => $body,
            Symbol::Not($s) => $body,
            Symbol::Xor($s) => $body,
            Symbol::Binaryzation($s) => $body,
            Symbol::BalanceTernaryzation($s) => $body,
            Symbol::Extremum($s) => $body,
            Symbol::Division($s) => $body,
            Symbol::InStepRange($s) => $body,
            Symbol::If($s) => $body,
            Symbol::IfIn($s) => $body,
            Symbol::IfThen($s) => $body,
            Symbol::SameAs($s) => $body,
            Symbol::Masking($s) => $body,
            Symbol::MaskingRange($s) => $body,
            Symbol::OneOf($s) => $body,
            Symbol::First($s) => $body,
            Symbol::SatisfiedAmount($s) => $body,
            Symbol::SatisfiedAmountInequality($s) => $body,
            Symbol::Slack($s) => $body,
            Symbol::SlackRange($s) => $body,
            Symbol::Semi($s) => $body,
            Symbol::Relu($s) => $body,
            Symbol::Sigmoid($s) => $body,
            Symbol::UnivariatePiecewise($s) => $body,
            Symbol::BivariatePiecewise($s) => $body,
        }
    };
}

macro_rules! symbol_from {
    ($($variant:ident($ty:ty)),* $(,)?) => {
        $(
            impl From<$ty> for Symbol {
                fn from(value: $ty) -> Self {
                    Symbol::$variant(value)
                }
            }
        )*
    };
}

symbol_from!(
    Abs(AbsFunction),
    And(AndFunction),
    Or(OrFunction),
    Not(NotFunction),
    Xor(XorFunction),
    Binaryzation(BinaryzationFunction),
    BalanceTernaryzation(BalanceTernaryzationFunction),
    Extremum(ExtremumFunction),
    Division(DivisionFunction),
    InStepRange(InStepRangeFunction),
    If(IfFunction),
    IfIn(IfInFunction),
    IfThen(IfThenFunction),
    SameAs(SameAsFunction),
    Masking(MaskingFunction),
    MaskingRange(MaskingRangeFunction),
    OneOf(OneOfFunction),
    First(FirstFunction),
    SatisfiedAmount(SatisfiedAmountFunction),
    SatisfiedAmountInequality(SatisfiedAmountInequalityFunction),
    Slack(SlackFunction),
    SlackRange(SlackRangeFunction),
    Semi(SemiFunction),
    Relu(ReluFunction),
    Sigmoid(SigmoidFunction),
    UnivariatePiecewise(UnivariatePiecewiseFunction),
    BivariatePiecewise(BivariatePiecewiseFunction),
);

impl FunctionSymbol for Symbol {
    fn name(&self) -> &str {
        dispatch!(self, s => s.name())
    }

    fn display_name(&self) -> Option<&str> {
        dispatch!(self, s => s.display_name())
    }

    fn parent(&self) -> Option<&str> {
        dispatch!(self, s => s.parent())
    }

    fn category(&self) -> Category {
        dispatch!(self, s => s.category())
    }

    fn discrete(&self) -> bool {
        dispatch!(self, s => s.discrete())
    }

    fn range(&self) -> ValueRange {
        dispatch!(self, s => s.range())
    }

    fn dependencies(&self) -> Vec<SymbolRef> {
        dispatch!(self, s => s.dependencies())
    }

    fn polynomial(&self) -> LinearPolynomial {
        dispatch!(self, s => s.polynomial())
    }

    fn auxiliary_variables(&self) -> Vec<Variable> {
        dispatch!(self, s => s.auxiliary_variables())
    }

    fn flush(&self, force: bool) {
        dispatch!(self, s => s.flush(force))
    }

    fn prepare(
        &self,
        fixed: Option<&FixedValues>,
        tokens: &TokenTable,
        warm_start: &mut Solution,
    ) -> Option<f64> {
        dispatch!(self, s => s.prepare(fixed, tokens, warm_start))
    }

    fn register_tokens(&self, tokens: &mut TokenTable) -> Result<()> {
        dispatch!(self, s => s.register_tokens(tokens))
    }

    fn register_model(&self, model: &mut LinearModel) -> Result<()> {
        dispatch!(self, s => s.register_model(model))
    }

    fn register_tokens_fixed(&self, tokens: &mut TokenTable, fixed: &FixedValues) -> Result<()> {
        dispatch!(self, s => s.register_tokens_fixed(tokens, fixed))
    }

    fn register_model_fixed(&self, model: &mut LinearModel, fixed: &FixedValues) -> Result<()> {
        dispatch!(self, s => s.register_model_fixed(model, fixed))
    }

    fn calculate_value(&self, source: &dyn ValueSource, zero_if_none: bool) -> Option<f64> {
        dispatch!(self, s => s.calculate_value(source, zero_if_none))
    }
}

impl Symbol {
    /// Short kind tag used in logs.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Symbol::Abs(_) => "abs",
            Symbol::And(_) => "and",
            Symbol::Or(_) => "or",
            Symbol::Not(_) => "not",
            Symbol::Xor(_) => "xor",
            Symbol::Binaryzation(_) => "binaryzation",
            Symbol::BalanceTernaryzation(_) => "balance_ternaryzation",
            Symbol::Extremum(_) => "extremum",
            Symbol::Division(_) => "division",
            Symbol::InStepRange(_) => "in_step_range",
            Symbol::If(_) => "if",
            Symbol::IfIn(_) => "if_in",
            Symbol::IfThen(_) => "if_then",
            Symbol::SameAs(_) => "same_as",
            Symbol::Masking(_) => "masking",
            Symbol::MaskingRange(_) => "masking_range",
            Symbol::OneOf(_) => "one_of",
            Symbol::First(_) => "first",
            Symbol::SatisfiedAmount(_) => "satisfied_amount",
            Symbol::SatisfiedAmountInequality(_) => "satisfied_amount_inequality",
            Symbol::Slack(_) => "slack",
            Symbol::SlackRange(_) => "slack_range",
            Symbol::Semi(_) => "semi",
            Symbol::Relu(_) => "relu",
            Symbol::Sigmoid(_) => "sigmoid",
            Symbol::UnivariatePiecewise(_) => "univariate_piecewise",
            Symbol::BivariatePiecewise(_) => "bivariate_piecewise",
        }
    }

    /// Value of the symbol: an already-known value from `source` if any,
    /// otherwise [`FunctionSymbol::calculate_value`].
    #[must_use]
    pub fn evaluate(&self, source: &dyn ValueSource, zero_if_none: bool) -> Option<f64> {
        source
            .symbol_value(self.name())
            .or_else(|| self.calculate_value(source, zero_if_none))
    }

    /// [`FunctionSymbol::prepare`], storing the computed value in the token
    /// table's cache.
    pub fn prepare_and_cache(
        &self,
        fixed: Option<&FixedValues>,
        tokens: &TokenTable,
        warm_start: &mut Solution,
    ) -> Option<f64> {
        let value = self.prepare(fixed, tokens, warm_start)?;
        tokens.cache(self.name(), fixed, value);
        Some(value)
    }
}

/// Wrap a symbol struct into a shared [`SymbolRef`].
pub trait IntoSymbol: Into<Symbol> {
    fn into_symbol(self) -> SymbolRef {
        Rc::new(self.into())
    }
}

impl<T: Into<Symbol>> IntoSymbol for T {}

/// Identity of a symbol instance.
#[derive(Debug, Clone)]
pub(crate) struct Header {
    pub(crate) name: String,
    pub(crate) display_name: Option<String>,
    pub(crate) parent: Option<String>,
}

impl Header {
    pub(crate) fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            display_name: None,
            parent: None,
        }
    }

    /// The name emitted constraints are attributed to.
    pub(crate) fn origin(&self) -> &str {
        self.parent.as_deref().unwrap_or(&self.name)
    }

    /// `<name>_<suffix>`, for auxiliary variables and constraints.
    pub(crate) fn child(&self, suffix: impl std::fmt::Display) -> String {
        format!("{}_{}", self.name, suffix)
    }
}

pub(crate) fn application_failed(symbol: &str, reason: impl Into<String>) -> Error {
    let reason = reason.into();
    warn!(symbol, %reason, "symbol domain unsatisfied");
    SymbolError::ApplicationFailed {
        symbol: symbol.to_string(),
        reason,
    }
    .into()
}

pub(crate) fn require_non_negative(symbol: &str, operand: &LinearPolynomial) -> Result<()> {
    if operand.lower_bound() < 0.0 {
        return Err(application_failed(
            symbol,
            format!("operand {operand} must be non-negative, lower bound is {}", operand.lower_bound()),
        ));
    }
    Ok(())
}

pub(crate) fn require_unit_interval(symbol: &str, operand: &LinearPolynomial) -> Result<()> {
    if !operand.range().within(&ValueRange::UNIT) {
        return Err(application_failed(
            symbol,
            format!("operand {operand} must lie in [0, 1], range is {}", operand.range()),
        ));
    }
    Ok(())
}

pub(crate) fn require_finite(symbol: &str, operand: &LinearPolynomial) -> Result<()> {
    if !operand.range().is_finite() {
        return Err(application_failed(
            symbol,
            format!("operand {operand} needs finite bounds, range is {}", operand.range()),
        ));
    }
    Ok(())
}

/// Whether `prepare` should compute a fresh value.
pub(crate) fn needs_value(symbol: &str, fixed: Option<&FixedValues>, tokens: &TokenTable) -> bool {
    tokens.cached(symbol, fixed) == Some(false)
}

/// A symbol's value together with auxiliary values consistent with it.
#[derive(Debug, Clone)]
pub(crate) struct Assignment {
    pub(crate) value: f64,
    pub(crate) auxiliaries: Vec<(Variable, f64)>,
}

impl Assignment {
    pub(crate) fn new(value: f64) -> Self {
        Self {
            value,
            auxiliaries: Vec::new(),
        }
    }

    pub(crate) fn with(mut self, variable: &Variable, value: f64) -> Self {
        self.push(variable, value);
        self
    }

    pub(crate) fn push(&mut self, variable: &Variable, value: f64) {
        self.auxiliaries.push((variable.clone(), value));
    }

    /// Write the auxiliary values into a warm start.
    pub(crate) fn seed(&self, symbol: &str, warm_start: &mut Solution) {
        for (variable, value) in &self.auxiliaries {
            trace!(symbol, variable = variable.name(), value, "seeding warm start");
            warm_start.set(variable, *value);
        }
    }

    /// Emit `variable = value` for every auxiliary.
    pub(crate) fn pin(&self, model: &mut LinearModel, header: &Header) -> Result<()> {
        debug!(
            symbol = %header.name,
            value = self.value,
            pinned = self.auxiliaries.len(),
            "operands fixed, pinning auxiliaries"
        );
        for (variable, value) in &self.auxiliaries {
            model.add_constraint(
                LinearPolynomial::from(variable).equals(*value),
                format!("{}_fixed", variable.name()),
                Some(header.origin()),
            )?;
        }
        Ok(())
    }
}

/// Shared body of `prepare`: compute an assignment from the current view
/// when the cache asks for one, seed it and return the value.
pub(crate) fn prepare_with<F>(
    symbol: &str,
    fixed: Option<&FixedValues>,
    tokens: &TokenTable,
    warm_start: &mut Solution,
    assign: F,
) -> Option<f64>
where
    F: FnOnce(&dyn ValueSource) -> Option<Assignment>,
{
    if !needs_value(symbol, fixed, tokens) {
        return None;
    }
    let view = ValueView::new(fixed, tokens);
    let assignment = assign(&view)?;
    assignment.seed(symbol, warm_start);
    Some(assignment.value)
}

/// [`FunctionSymbol::prepare`] on an owned sub-symbol, caching its value.
pub(crate) fn prepare_owned<S: FunctionSymbol + ?Sized>(
    symbol: &S,
    fixed: Option<&FixedValues>,
    tokens: &TokenTable,
    warm_start: &mut Solution,
) {
    if let Some(value) = symbol.prepare(fixed, tokens, warm_start) {
        tokens.cache(symbol.name(), fixed, value);
    }
}

pub(crate) fn prepare_all(
    symbols: &[SymbolRef],
    fixed: Option<&FixedValues>,
    tokens: &TokenTable,
    warm_start: &mut Solution,
) {
    for symbol in symbols {
        symbol.prepare_and_cache(fixed, tokens, warm_start);
    }
}

pub(crate) fn auxiliaries_of(symbols: &[SymbolRef]) -> Vec<Variable> {
    symbols
        .iter()
        .flat_map(|symbol| symbol.auxiliary_variables())
        .collect()
}

pub(crate) fn bool_value(value: bool) -> f64 {
    if value {
        1.0
    } else {
        0.0
    }
}

/// Operand dependencies without duplicates.
pub(crate) fn dependencies_of<'a, I>(operands: I) -> Vec<SymbolRef>
where
    I: IntoIterator<Item = &'a LinearPolynomial>,
{
    let mut found: Vec<SymbolRef> = Vec::new();
    for operand in operands {
        for symbol in operand.dependencies() {
            if !found.iter().any(|s| Rc::ptr_eq(s, &symbol)) {
                found.push(symbol);
            }
        }
    }
    found
}
