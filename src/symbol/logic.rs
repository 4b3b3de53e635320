//! Boolean connectives over non-negative operands, reading `x ≠ 0` as true.

use std::cell::{Cell, OnceCell};

use tracing::debug;

use super::extremum::ExtremumFunction;
use super::indicator::BinaryzationFunction;
use super::selection::{self, LogicEncoding, OperandProfile, XorEncoding};
use super::{
    bool_value, dependencies_of, prepare_owned, prepare_with, require_non_negative, Assignment,
    FunctionSymbol, Header, IntoSymbol, SymbolRef,
};
use crate::config::SymbolConfig;
use crate::domain::range::is_zero;
use crate::domain::{
    FixedValues, LinearModel, LinearPolynomial, Solution, TokenTable, ValueRange, ValueSource,
    Variable,
};
use crate::error::Result;

/// A 0/1 view of one operand: the operand itself when already binary,
/// otherwise an owned indicator.
pub(crate) enum Literal {
    Direct(LinearPolynomial),
    Indicator(BinaryzationFunction),
}

impl Literal {
    pub(crate) fn of(x: &LinearPolynomial, name: String, origin: &str, config: SymbolConfig) -> Self {
        if OperandProfile::of(x).is_binary() {
            Literal::Direct(x.clone())
        } else {
            Literal::Indicator(
                BinaryzationFunction::new(x.clone(), name)
                    .with_config(config)
                    .with_parent(origin),
            )
        }
    }

    pub(crate) fn polynomial(&self) -> LinearPolynomial {
        match self {
            Literal::Direct(x) => x.clone(),
            Literal::Indicator(bin) => bin.polynomial(),
        }
    }

    pub(crate) fn truth(&self, source: &dyn ValueSource, zero_if_none: bool) -> Option<bool> {
        let x = match self {
            Literal::Direct(x) => x,
            Literal::Indicator(bin) => bin.operand(),
        };
        x.evaluate(source, zero_if_none).map(|value| !is_zero(value))
    }

    pub(crate) fn auxiliary_variables(&self) -> Vec<Variable> {
        match self {
            Literal::Direct(_) => Vec::new(),
            Literal::Indicator(bin) => bin.auxiliary_variables(),
        }
    }

    pub(crate) fn flush(&self, force: bool) {
        match self {
            Literal::Direct(x) => x.flush(force),
            Literal::Indicator(bin) => bin.flush(force),
        }
    }

    pub(crate) fn prepare(&self, fixed: Option<&FixedValues>, tokens: &TokenTable, warm_start: &mut Solution) {
        if let Literal::Indicator(bin) = self {
            prepare_owned(bin, fixed, tokens, warm_start);
        }
    }

    pub(crate) fn register_tokens(&self, tokens: &mut TokenTable) -> Result<()> {
        match self {
            Literal::Direct(_) => Ok(()),
            Literal::Indicator(bin) => bin.register_tokens(tokens),
        }
    }

    pub(crate) fn register_model(&self, model: &mut LinearModel) -> Result<()> {
        match self {
            Literal::Direct(_) => Ok(()),
            Literal::Indicator(bin) => bin.register_model(model),
        }
    }

    pub(crate) fn register_model_fixed(&self, model: &mut LinearModel, fixed: &FixedValues) -> Result<()> {
        match self {
            Literal::Direct(_) => Ok(()),
            Literal::Indicator(bin) => bin.register_model_fixed(model, fixed),
        }
    }
}

pub(crate) fn literal_sum(literals: &[Literal]) -> LinearPolynomial {
    literals.iter().map(Literal::polynomial).sum()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Connective {
    And,
    Or,
}

enum Built {
    Constant(f64),
    /// The result is a single literal.
    Single(Literal),
    /// `y` linked to one literal per operand.
    Linked { y: Variable, literals: Vec<Literal> },
}

struct ConnectiveCore {
    connective: Connective,
    operands: Vec<LinearPolynomial>,
    config: SymbolConfig,
    encoding: Option<LogicEncoding>,
    built: OnceCell<(LogicEncoding, Built)>,
}

impl ConnectiveCore {
    fn new(connective: Connective, operands: Vec<LinearPolynomial>) -> Self {
        Self {
            connective,
            operands,
            config: SymbolConfig::default(),
            encoding: None,
            built: OnceCell::new(),
        }
    }

    fn profiles(&self) -> Vec<OperandProfile> {
        self.operands.iter().map(OperandProfile::of).collect()
    }

    fn selected(&self) -> LogicEncoding {
        self.encoding.unwrap_or_else(|| {
            let profiles = self.profiles();
            match self.connective {
                Connective::And => selection::conjunction(&profiles),
                Connective::Or => selection::disjunction(&profiles),
            }
        })
    }

    fn encoding(&self) -> LogicEncoding {
        self.built.get().map_or_else(|| self.selected(), |(encoding, _)| *encoding)
    }

    fn value_range(&self) -> ValueRange {
        match self.selected() {
            LogicEncoding::Constant(value) => ValueRange::point(value),
            _ => ValueRange::UNIT,
        }
    }

    fn build(&self, header: &Header) -> &Built {
        let (_, built) = self.built.get_or_init(|| {
            let encoding = self.selected();
            debug!(symbol = %header.name, ?encoding, connective = ?self.connective, "selected logic encoding");
            let literal = |i: usize, x: &LinearPolynomial| {
                Literal::of(x, header.child(format_args!("u_{i}")), header.origin(), self.config)
            };
            let built = match encoding {
                LogicEncoding::Constant(value) => Built::Constant(value),
                LogicEncoding::Single => match self.operands.first() {
                    Some(x) => Built::Single(literal(0, x)),
                    None => Built::Constant(bool_value(self.connective == Connective::And)),
                },
                LogicEncoding::General if self.connective == Connective::Or => {
                    let total: LinearPolynomial = self.operands.iter().cloned().sum();
                    Built::Single(Literal::Indicator(
                        BinaryzationFunction::new(total, header.child("any"))
                            .with_config(self.config)
                            .with_parent(header.origin()),
                    ))
                }
                LogicEncoding::Binary | LogicEncoding::General => Built::Linked {
                    y: Variable::binary(header.child("y")),
                    literals: self
                        .operands
                        .iter()
                        .enumerate()
                        .map(|(i, x)| literal(i, x))
                        .collect(),
                },
            };
            (encoding, built)
        });
        built
    }

    fn polynomial(&self, header: &Header) -> LinearPolynomial {
        match self.build(header) {
            Built::Constant(value) => LinearPolynomial::from(*value),
            Built::Single(literal) => literal.polynomial(),
            Built::Linked { y, .. } => LinearPolynomial::from(y),
        }
    }

    fn auxiliary_variables(&self) -> Vec<Variable> {
        match self.built.get().map(|(_, built)| built) {
            None | Some(Built::Constant(_)) => Vec::new(),
            Some(Built::Single(literal)) => literal.auxiliary_variables(),
            Some(Built::Linked { y, literals }) => std::iter::once(y.clone())
                .chain(literals.iter().flat_map(Literal::auxiliary_variables))
                .collect(),
        }
    }

    fn flush(&self, force: bool) {
        for operand in &self.operands {
            operand.flush(force);
        }
        match self.built.get().map(|(_, built)| built) {
            Some(Built::Single(literal)) => literal.flush(force),
            Some(Built::Linked { literals, .. }) => {
                for literal in literals {
                    literal.flush(force);
                }
            }
            _ => {}
        }
    }

    fn truth(&self, source: &dyn ValueSource, zero_if_none: bool) -> Option<bool> {
        let mut truths = Vec::with_capacity(self.operands.len());
        for operand in &self.operands {
            truths.push(!is_zero(operand.evaluate(source, zero_if_none)?));
        }
        Some(match self.connective {
            Connective::And => truths.iter().all(|t| *t),
            Connective::Or => truths.iter().any(|t| *t),
        })
    }

    fn assignment(&self, header: &Header, source: &dyn ValueSource) -> Option<Assignment> {
        let value = bool_value(self.truth(source, false)?);
        let mut assignment = Assignment::new(value);
        if let Built::Linked { y, .. } = self.build(header) {
            assignment.push(y, value);
        }
        Some(assignment)
    }

    fn prepare(
        &self,
        header: &Header,
        fixed: Option<&FixedValues>,
        tokens: &TokenTable,
        warm_start: &mut Solution,
    ) -> Option<f64> {
        match self.build(header) {
            Built::Single(literal) => literal.prepare(fixed, tokens, warm_start),
            Built::Linked { literals, .. } => {
                for literal in literals {
                    literal.prepare(fixed, tokens, warm_start);
                }
            }
            Built::Constant(_) => {}
        }
        prepare_with(&header.name, fixed, tokens, warm_start, |source| {
            self.assignment(header, source)
        })
    }

    fn register_tokens(&self, header: &Header, tokens: &mut TokenTable) -> Result<()> {
        for operand in &self.operands {
            require_non_negative(&header.name, operand)?;
        }
        match self.build(header) {
            Built::Constant(_) => Ok(()),
            Built::Single(literal) => literal.register_tokens(tokens),
            Built::Linked { y, literals } => {
                tokens.add(y)?;
                literals.iter().try_for_each(|literal| literal.register_tokens(tokens))
            }
        }
    }

    fn register_model(&self, header: &Header, model: &mut LinearModel) -> Result<()> {
        let origin = Some(header.origin());
        match self.build(header) {
            Built::Constant(_) => Ok(()),
            Built::Single(literal) => literal.register_model(model),
            Built::Linked { y, literals } => {
                for literal in literals {
                    literal.register_model(model)?;
                }
                for (i, literal) in literals.iter().enumerate() {
                    let inequality = match self.connective {
                        Connective::And => LinearPolynomial::from(y).leq(literal.polynomial()),
                        Connective::Or => LinearPolynomial::from(y).geq(literal.polynomial()),
                    };
                    model.add_constraint(inequality, header.child(format_args!("u_{i}")), origin)?;
                }
                if self.config.extract {
                    let total = literal_sum(literals);
                    let inequality = match self.connective {
                        Connective::And => {
                            let slack = literals.len() as f64 - 1.0;
                            LinearPolynomial::from(y).geq(total - slack)
                        }
                        Connective::Or => LinearPolynomial::from(y).leq(total),
                    };
                    model.add_constraint(inequality, header.child("sum"), origin)?;
                }
                Ok(())
            }
        }
    }

    fn register_model_fixed(&self, header: &Header, model: &mut LinearModel, fixed: &FixedValues) -> Result<()> {
        let Some(assignment) = self.assignment(header, fixed) else {
            return self.register_model(header, model);
        };
        match self.build(header) {
            Built::Single(literal) => literal.register_model_fixed(model, fixed)?,
            Built::Linked { literals, .. } => {
                for literal in literals {
                    literal.register_model_fixed(model, fixed)?;
                }
            }
            Built::Constant(_) => {}
        }
        assignment.pin(model, header)
    }
}

macro_rules! connective_symbol {
    ($(#[$meta:meta])* $name:ident, $connective:expr) => {
        $(#[$meta])*
        pub struct $name {
            header: Header,
            core: ConnectiveCore,
            range: Cell<ValueRange>,
        }

        impl $name {
            pub fn new<I, P>(operands: I, name: impl Into<String>) -> Self
            where
                I: IntoIterator<Item = P>,
                P: Into<LinearPolynomial>,
            {
                let core = ConnectiveCore::new($connective, operands.into_iter().map(Into::into).collect());
                let range = Cell::new(core.value_range());
                Self {
                    header: Header::new(name),
                    core,
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
            pub fn with_encoding(mut self, encoding: LogicEncoding) -> Self {
                self.core.encoding = Some(encoding);
                self.range.set(self.core.value_range());
                self
            }

            #[must_use]
            pub fn encoding(&self) -> LogicEncoding {
                self.core.encoding()
            }

            #[must_use]
            pub fn operands(&self) -> &[LinearPolynomial] {
                &self.core.operands
            }
        }

        header_builders!($name);

        impl FunctionSymbol for $name {
            header_accessors!();

            fn discrete(&self) -> bool {
                true
            }

            fn range(&self) -> ValueRange {
                self.range.get()
            }

            fn dependencies(&self) -> Vec<SymbolRef> {
                dependencies_of(&self.core.operands)
            }

            fn polynomial(&self) -> LinearPolynomial {
                self.core.polynomial(&self.header)
            }

            fn auxiliary_variables(&self) -> Vec<Variable> {
                self.core.auxiliary_variables()
            }

            fn flush(&self, force: bool) {
                self.core.flush(force);
                self.range.set(self.core.value_range());
            }

            fn prepare(
                &self,
                fixed: Option<&FixedValues>,
                tokens: &TokenTable,
                warm_start: &mut Solution,
            ) -> Option<f64> {
                self.core.prepare(&self.header, fixed, tokens, warm_start)
            }

            fn register_tokens(&self, tokens: &mut TokenTable) -> Result<()> {
                self.core.register_tokens(&self.header, tokens)
            }

            fn register_model(&self, model: &mut LinearModel) -> Result<()> {
                self.core.register_model(&self.header, model)
            }

            fn register_model_fixed(&self, model: &mut LinearModel, fixed: &FixedValues) -> Result<()> {
                self.core.register_model_fixed(&self.header, model, fixed)
            }

            fn calculate_value(&self, source: &dyn ValueSource, zero_if_none: bool) -> Option<f64> {
                self.core.truth(source, zero_if_none).map(bool_value)
            }
        }
    };
}

connective_symbol!(
    /// `1` iff every operand is nonzero.
    AndFunction,
    Connective::And
);

connective_symbol!(
    /// `1` iff some operand is nonzero.
    OrFunction,
    Connective::Or
);

enum XorBuilt {
    Constant(f64),
    Linked {
        y: Variable,
        literals: Vec<Literal>,
        /// Exact max and min, when the literals read them.
        extremes: Vec<SymbolRef>,
    },
}

/// `1` iff some operands are zero and some are not.
///
/// Two operands get one indicator each; more are reduced to the indicators
/// of their exact maximum and exact minimum.
pub struct XorFunction {
    header: Header,
    operands: Vec<LinearPolynomial>,
    config: SymbolConfig,
    range: Cell<ValueRange>,
    built: OnceCell<XorBuilt>,
}

impl XorFunction {
    pub fn new<I, P>(operands: I, name: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<LinearPolynomial>,
    {
        let operands: Vec<LinearPolynomial> = operands.into_iter().map(Into::into).collect();
        let range = Cell::new(Self::value_range(&operands));
        Self {
            header: Header::new(name),
            operands,
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
    pub fn encoding(&self) -> XorEncoding {
        selection::xor(&self.operands.iter().map(OperandProfile::of).collect::<Vec<_>>())
    }

    fn value_range(operands: &[LinearPolynomial]) -> ValueRange {
        let profiles: Vec<OperandProfile> = operands.iter().map(OperandProfile::of).collect();
        match selection::xor(&profiles) {
            XorEncoding::Constant(value) => ValueRange::point(value),
            _ => ValueRange::UNIT,
        }
    }

    fn build(&self) -> &XorBuilt {
        self.built.get_or_init(|| {
            let encoding = self.encoding();
            debug!(symbol = %self.header.name, ?encoding, operands = self.operands.len(), "selected xor encoding");
            let origin = self.header.origin();
            let literal = |i: usize, x: &LinearPolynomial| {
                Literal::of(x, self.header.child(format_args!("u_{i}")), origin, self.config)
            };
            match encoding {
                XorEncoding::Constant(value) => XorBuilt::Constant(value),
                XorEncoding::PerOperand => XorBuilt::Linked {
                    y: Variable::binary(self.header.child("y")),
                    literals: self
                        .operands
                        .iter()
                        .enumerate()
                        .map(|(i, x)| literal(i, x))
                        .collect(),
                    extremes: Vec::new(),
                },
                XorEncoding::Extremes => {
                    let max = ExtremumFunction::exact_max(self.operands.clone(), self.header.child("max"))
                        .with_parent(origin)
                        .into_symbol();
                    let min = ExtremumFunction::exact_min(self.operands.clone(), self.header.child("min"))
                        .with_parent(origin)
                        .into_symbol();
                    let literals = vec![
                        literal(0, &LinearPolynomial::from(&max)),
                        literal(1, &LinearPolynomial::from(&min)),
                    ];
                    XorBuilt::Linked {
                        y: Variable::binary(self.header.child("y")),
                        literals,
                        extremes: vec![max, min],
                    }
                }
            }
        })
    }

    fn truth(&self, source: &dyn ValueSource, zero_if_none: bool) -> Option<bool> {
        let mut any_zero = false;
        let mut any_nonzero = false;
        for operand in &self.operands {
            if is_zero(operand.evaluate(source, zero_if_none)?) {
                any_zero = true;
            } else {
                any_nonzero = true;
            }
        }
        Some(any_zero && any_nonzero)
    }

    fn assignment(&self, source: &dyn ValueSource) -> Option<Assignment> {
        let value = bool_value(self.truth(source, false)?);
        let mut assignment = Assignment::new(value);
        if let XorBuilt::Linked { y, .. } = self.build() {
            assignment.push(y, value);
        }
        Some(assignment)
    }
}

header_builders!(XorFunction);

impl FunctionSymbol for XorFunction {
    header_accessors!();

    fn discrete(&self) -> bool {
        true
    }

    fn range(&self) -> ValueRange {
        self.range.get()
    }

    fn dependencies(&self) -> Vec<SymbolRef> {
        dependencies_of(&self.operands)
    }

    fn polynomial(&self) -> LinearPolynomial {
        match self.build() {
            XorBuilt::Constant(value) => LinearPolynomial::from(*value),
            XorBuilt::Linked { y, .. } => LinearPolynomial::from(y),
        }
    }

    fn auxiliary_variables(&self) -> Vec<Variable> {
        match self.built.get() {
            None | Some(XorBuilt::Constant(_)) => Vec::new(),
            Some(XorBuilt::Linked {
                y,
                literals,
                extremes,
            }) => std::iter::once(y.clone())
                .chain(literals.iter().flat_map(Literal::auxiliary_variables))
                .chain(extremes.iter().flat_map(|s| s.auxiliary_variables()))
                .collect(),
        }
    }

    fn flush(&self, force: bool) {
        for operand in &self.operands {
            operand.flush(force);
        }
        if let Some(XorBuilt::Linked {
            literals, extremes, ..
        }) = self.built.get()
        {
            for extreme in extremes {
                extreme.flush(force);
            }
            for literal in literals {
                literal.flush(force);
            }
        }
        self.range.set(Self::value_range(&self.operands));
    }

    fn prepare(
        &self,
        fixed: Option<&FixedValues>,
        tokens: &TokenTable,
        warm_start: &mut Solution,
    ) -> Option<f64> {
        if let XorBuilt::Linked {
            literals, extremes, ..
        } = self.build()
        {
            for extreme in extremes {
                extreme.prepare_and_cache(fixed, tokens, warm_start);
            }
            for literal in literals {
                literal.prepare(fixed, tokens, warm_start);
            }
        }
        prepare_with(&self.header.name, fixed, tokens, warm_start, |source| {
            self.assignment(source)
        })
    }

    fn register_tokens(&self, tokens: &mut TokenTable) -> Result<()> {
        for operand in &self.operands {
            require_non_negative(&self.header.name, operand)?;
        }
        match self.build() {
            XorBuilt::Constant(_) => Ok(()),
            XorBuilt::Linked {
                y,
                literals,
                extremes,
            } => {
                tokens.add(y)?;
                for extreme in extremes {
                    extreme.register_tokens(tokens)?;
                }
                literals.iter().try_for_each(|literal| literal.register_tokens(tokens))
            }
        }
    }

    fn register_model(&self, model: &mut LinearModel) -> Result<()> {
        let XorBuilt::Linked {
            y,
            literals,
            extremes,
        } = self.build()
        else {
            return Ok(());
        };
        let origin = Some(self.header.origin());
        for extreme in extremes {
            extreme.register_model(model)?;
        }
        for literal in literals {
            literal.register_model(model)?;
        }
        let total = literal_sum(literals);
        for (i, literal) in literals.iter().enumerate() {
            let others = total.clone() - literal.polynomial();
            model.add_constraint(
                LinearPolynomial::from(y).geq(literal.polynomial() - others),
                self.header.child(format_args!("u_{i}")),
                origin,
            )?;
        }
        model.add_constraint(LinearPolynomial::from(y).leq(total.clone()), self.header.child("any"), origin)?;
        model.add_constraint(
            LinearPolynomial::from(y).leq(LinearPolynomial::from(2.0) - total),
            self.header.child("not_all"),
            origin,
        )
    }

    fn register_model_fixed(&self, model: &mut LinearModel, fixed: &FixedValues) -> Result<()> {
        let Some(assignment) = self.assignment(fixed) else {
            return self.register_model(model);
        };
        if let XorBuilt::Linked {
            literals, extremes, ..
        } = self.build()
        {
            for extreme in extremes {
                extreme.register_model_fixed(model, fixed)?;
            }
            for literal in literals {
                literal.register_model_fixed(model, fixed)?;
            }
        }
        assignment.pin(model, &self.header)
    }

    fn calculate_value(&self, source: &dyn ValueSource, zero_if_none: bool) -> Option<f64> {
        self.truth(source, zero_if_none).map(bool_value)
    }
}
