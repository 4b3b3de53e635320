//! How many operands (or inequalities) hold, and threshold tests on that count.

use std::cell::{Cell, OnceCell};

use tracing::debug;

use super::condition::{register_model_all, register_model_fixed_all, register_tokens_all, IfFunction};
use super::logic::{literal_sum, Literal};
use super::selection::{self, CountingEncoding, OperandProfile};
use super::{
    application_failed, auxiliaries_of, bool_value, dependencies_of, prepare_all, prepare_with,
    require_finite, require_non_negative, Assignment, FunctionSymbol, Header, IntoSymbol,
    SymbolRef,
};
use crate::config::SymbolConfig;
use crate::domain::range::is_zero;
use crate::domain::{
    FixedValues, LinearInequality, LinearModel, LinearPolynomial, Sign, Solution, TokenTable,
    ValueRange, ValueSource, Variable,
};
use crate::error::Result;

/// Range of a count in `[min, max]`, or of its threshold test.
fn counting_range(min: usize, max: usize, amount: Option<usize>) -> ValueRange {
    match amount {
        None => ValueRange::spanning(min as f64, max as f64),
        Some(k) if min >= k => ValueRange::point(1.0),
        Some(k) if max < k => ValueRange::point(0.0),
        Some(_) => ValueRange::UNIT,
    }
}

fn negate_range(range: ValueRange) -> ValueRange {
    ValueRange::spanning(1.0 - range.upper(), 1.0 - range.lower())
}

fn check_amount(symbol: &str, amount: Option<usize>, operands: usize) -> Result<()> {
    match amount {
        Some(0) => Err(application_failed(symbol, "amount must be positive")),
        Some(k) if k > operands => Err(application_failed(
            symbol,
            format!("amount {k} exceeds the {operands} operands"),
        )),
        _ => Ok(()),
    }
}

fn count_outcome(count: usize, amount: Option<usize>) -> f64 {
    match amount {
        Some(k) => bool_value(count >= k),
        None => count as f64,
    }
}

enum Built {
    Constant(f64),
    Numerable(Vec<Literal>),
    Linked {
        y: Variable,
        literals: Vec<Literal>,
        encoding: CountingEncoding,
    },
}

/// Number of nonzero operands, or whether at least `amount` of them are
/// nonzero. Operands must be non-negative.
pub struct SatisfiedAmountFunction {
    header: Header,
    operands: Vec<LinearPolynomial>,
    amount: Option<usize>,
    /// `1 − result`, for "not all".
    negated: bool,
    config: SymbolConfig,
    range: Cell<ValueRange>,
    built: OnceCell<Built>,
}

impl SatisfiedAmountFunction {
    fn with_amount<I, P>(operands: I, amount: Option<usize>, negated: bool, name: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<LinearPolynomial>,
    {
        let operands: Vec<LinearPolynomial> = operands.into_iter().map(Into::into).collect();
        let range = Cell::new(Self::value_range(&operands, amount, negated));
        Self {
            header: Header::new(name),
            operands,
            amount,
            negated,
            config: SymbolConfig::default(),
            range,
            built: OnceCell::new(),
        }
    }

    /// The count itself.
    pub fn numerable<I, P>(operands: I, name: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<LinearPolynomial>,
    {
        Self::with_amount(operands, None, false, name)
    }

    pub fn at_least<I, P>(operands: I, amount: usize, name: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<LinearPolynomial>,
    {
        Self::with_amount(operands, Some(amount), false, name)
    }

    pub fn any<I, P>(operands: I, name: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<LinearPolynomial>,
    {
        Self::with_amount(operands, Some(1), false, name)
    }

    pub fn all<I, P>(operands: I, name: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<LinearPolynomial>,
    {
        let operands: Vec<LinearPolynomial> = operands.into_iter().map(Into::into).collect();
        let amount = operands.len();
        Self::with_amount(operands, Some(amount), false, name)
    }

    pub fn not_all<I, P>(operands: I, name: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<LinearPolynomial>,
    {
        let operands: Vec<LinearPolynomial> = operands.into_iter().map(Into::into).collect();
        let amount = operands.len();
        Self::with_amount(operands, Some(amount), true, name)
    }

    #[must_use]
    pub fn with_config(mut self, config: SymbolConfig) -> Self {
        self.config = config;
        self
    }

    #[must_use]
    pub fn amount(&self) -> Option<usize> {
        self.amount
    }

    #[must_use]
    pub fn encoding(&self) -> CountingEncoding {
        match self.built.get() {
            Some(Built::Constant(value)) => CountingEncoding::Constant(*value),
            Some(Built::Numerable(_)) => CountingEncoding::Numerable,
            Some(Built::Linked { encoding, .. }) => *encoding,
            None => self.selected(),
        }
    }

    fn selected(&self) -> CountingEncoding {
        let profiles: Vec<OperandProfile> = self.operands.iter().map(OperandProfile::of).collect();
        selection::counting(&profiles, self.amount)
    }

    fn value_range(operands: &[LinearPolynomial], amount: Option<usize>, negated: bool) -> ValueRange {
        let profiles: Vec<OperandProfile> = operands.iter().map(OperandProfile::of).collect();
        let (min, max) = selection::amount_bounds(&profiles);
        let range = counting_range(min, max, amount);
        if negated {
            negate_range(range)
        } else {
            range
        }
    }

    fn literals(&self) -> Vec<Literal> {
        self.operands
            .iter()
            .enumerate()
            .map(|(i, x)| {
                Literal::of(x, self.header.child(format_args!("b_{i}")), self.header.origin(), self.config)
            })
            .collect()
    }

    fn build(&self) -> &Built {
        self.built.get_or_init(|| {
            let encoding = self.selected();
            debug!(symbol = %self.header.name, ?encoding, amount = ?self.amount, "selected counting encoding");
            match encoding {
                CountingEncoding::Constant(value) => Built::Constant(value),
                CountingEncoding::Numerable => Built::Numerable(self.literals()),
                _ => Built::Linked {
                    y: Variable::binary(self.header.child("y")),
                    literals: self.literals(),
                    encoding,
                },
            }
        })
    }

    fn built_literals(&self) -> &[Literal] {
        match self.build() {
            Built::Constant(_) => &[],
            Built::Numerable(literals) | Built::Linked { literals, .. } => literals,
        }
    }

    fn count(&self, source: &dyn ValueSource, zero_if_none: bool) -> Option<usize> {
        let mut count = 0;
        for x in &self.operands {
            if !is_zero(x.evaluate(source, zero_if_none)?) {
                count += 1;
            }
        }
        Some(count)
    }

    fn outcome(&self, count: usize) -> f64 {
        let value = count_outcome(count, self.amount);
        if self.negated {
            1.0 - value
        } else {
            value
        }
    }

    fn assignment(&self, source: &dyn ValueSource) -> Option<Assignment> {
        let count = self.count(source, false)?;
        let mut assignment = Assignment::new(self.outcome(count));
        if let Built::Linked { y, .. } = self.build() {
            assignment.push(y, count_outcome(count, self.amount));
        }
        Some(assignment)
    }
}

header_builders!(SatisfiedAmountFunction);

impl FunctionSymbol for SatisfiedAmountFunction {
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
        let value = match self.build() {
            Built::Constant(value) => LinearPolynomial::from(*value),
            Built::Numerable(literals) => literal_sum(literals),
            Built::Linked { y, .. } => LinearPolynomial::from(y),
        };
        if self.negated {
            LinearPolynomial::from(1.0) - value
        } else {
            value
        }
    }

    fn auxiliary_variables(&self) -> Vec<Variable> {
        match self.built.get() {
            None | Some(Built::Constant(_)) => Vec::new(),
            Some(Built::Numerable(literals)) => {
                literals.iter().flat_map(Literal::auxiliary_variables).collect()
            }
            Some(Built::Linked { y, literals, .. }) => literals
                .iter()
                .flat_map(Literal::auxiliary_variables)
                .chain(std::iter::once(y.clone()))
                .collect(),
        }
    }

    fn flush(&self, force: bool) {
        for x in &self.operands {
            x.flush(force);
        }
        if self.built.get().is_some() {
            for literal in self.built_literals() {
                literal.flush(force);
            }
        }
        let range = Self::value_range(&self.operands, self.amount, self.negated);
        self.range.set(range);
        if let Some(Built::Linked { y, .. }) = self.built.get() {
            let raw = if self.negated { negate_range(range) } else { range };
            y.set_range(raw);
        }
    }

    fn prepare(
        &self,
        fixed: Option<&FixedValues>,
        tokens: &TokenTable,
        warm_start: &mut Solution,
    ) -> Option<f64> {
        for literal in self.built_literals() {
            literal.prepare(fixed, tokens, warm_start);
        }
        prepare_with(&self.header.name, fixed, tokens, warm_start, |source| {
            self.assignment(source)
        })
    }

    fn register_tokens(&self, tokens: &mut TokenTable) -> Result<()> {
        check_amount(&self.header.name, self.amount, self.operands.len())?;
        for x in &self.operands {
            require_non_negative(&self.header.name, x)?;
        }
        for literal in self.built_literals() {
            literal.register_tokens(tokens)?;
        }
        if let Built::Linked { y, .. } = self.build() {
            tokens.add(y)?;
        }
        Ok(())
    }

    fn register_model(&self, model: &mut LinearModel) -> Result<()> {
        for literal in self.built_literals() {
            literal.register_model(model)?;
        }
        let Built::Linked { y, literals, encoding } = self.build() else {
            return Ok(());
        };
        let origin = Some(self.header.origin());
        let n = literals.len() as f64;
        let sum = literal_sum(literals);
        let extract = self.config.extract;
        match encoding {
            CountingEncoding::Disjunction => {
                for (i, literal) in literals.iter().enumerate() {
                    model.add_constraint(
                        LinearPolynomial::from(y).geq(literal.polynomial()),
                        self.header.child(format_args!("u_{i}")),
                        origin,
                    )?;
                }
                if extract {
                    model.add_constraint(LinearPolynomial::from(y).leq(sum), self.header.child("sum"), origin)?;
                }
            }
            CountingEncoding::Conjunction => {
                for (i, literal) in literals.iter().enumerate() {
                    model.add_constraint(
                        LinearPolynomial::from(y).leq(literal.polynomial()),
                        self.header.child(format_args!("u_{i}")),
                        origin,
                    )?;
                }
                if extract {
                    model.add_constraint(
                        LinearPolynomial::from(y).geq(sum - (n - 1.0)),
                        self.header.child("sum"),
                        origin,
                    )?;
                }
            }
            _ => {
                let k = self.amount.unwrap_or(1) as f64;
                model.add_constraint(
                    LinearPolynomial::from(y).geq((1.0 / n) * (sum.clone() - (k - 1.0))),
                    self.header.child("lb"),
                    origin,
                )?;
                if extract {
                    model.add_constraint(
                        LinearPolynomial::from(y).leq((1.0 / k) * sum),
                        self.header.child("ub"),
                        origin,
                    )?;
                }
            }
        }
        Ok(())
    }

    fn register_model_fixed(&self, model: &mut LinearModel, fixed: &FixedValues) -> Result<()> {
        match self.assignment(fixed) {
            Some(assignment) => {
                for literal in self.built_literals() {
                    literal.register_model_fixed(model, fixed)?;
                }
                assignment.pin(model, &self.header)
            }
            None => self.register_model(model),
        }
    }

    fn calculate_value(&self, source: &dyn ValueSource, zero_if_none: bool) -> Option<f64> {
        self.count(source, zero_if_none).map(|count| self.outcome(count))
    }
}

struct Indicators {
    /// One exact indicator per inequality.
    checks: Vec<SymbolRef>,
    y: Option<Variable>,
}

/// Counting over linear inequalities.
///
/// Each inequality gets its own [`IfFunction`], so `uᵢ = 1` iff inequality
/// `i` holds, strict sides included. The count is `Σu`; a threshold test
/// links a binary `y` to it.
pub struct SatisfiedAmountInequalityFunction {
    header: Header,
    inequalities: Vec<LinearInequality>,
    amount: Option<usize>,
    config: SymbolConfig,
    range: Cell<ValueRange>,
    built: OnceCell<Indicators>,
}

impl SatisfiedAmountInequalityFunction {
    fn with_amount(inequalities: Vec<LinearInequality>, amount: Option<usize>, name: impl Into<String>) -> Self {
        let range = Cell::new(Self::value_range(&inequalities, amount));
        Self {
            header: Header::new(name),
            inequalities,
            amount,
            config: SymbolConfig::default(),
            range,
            built: OnceCell::new(),
        }
    }

    pub fn numerable(inequalities: Vec<LinearInequality>, name: impl Into<String>) -> Self {
        Self::with_amount(inequalities, None, name)
    }

    pub fn at_least(inequalities: Vec<LinearInequality>, amount: usize, name: impl Into<String>) -> Self {
        Self::with_amount(inequalities, Some(amount), name)
    }

    pub fn any(inequalities: Vec<LinearInequality>, name: impl Into<String>) -> Self {
        Self::with_amount(inequalities, Some(1), name)
    }

    pub fn all(inequalities: Vec<LinearInequality>, name: impl Into<String>) -> Self {
        let amount = inequalities.len();
        Self::with_amount(inequalities, Some(amount), name)
    }

    #[must_use]
    pub fn with_config(mut self, config: SymbolConfig) -> Self {
        self.config = config;
        self
    }

    #[must_use]
    pub fn inequalities(&self) -> &[LinearInequality] {
        &self.inequalities
    }

    fn value_range(inequalities: &[LinearInequality], amount: Option<usize>) -> ValueRange {
        let judged: Vec<Option<bool>> = inequalities.iter().map(LinearInequality::judge).collect();
        let min = judged.iter().filter(|truth| **truth == Some(true)).count();
        let max = judged.iter().filter(|truth| **truth != Some(false)).count();
        counting_range(min, max, amount)
    }

    fn build(&self) -> &Indicators {
        self.built.get_or_init(|| {
            debug!(
                symbol = %self.header.name,
                inequalities = self.inequalities.len(),
                amount = ?self.amount,
                "building inequality indicators"
            );
            let checks = self
                .inequalities
                .iter()
                .enumerate()
                .map(|(i, inequality)| {
                    IfFunction::new(inequality.clone(), self.header.child(format_args!("u_{i}")))
                        .with_config(self.config)
                        .with_parent(self.header.origin().to_string())
                        .into_symbol()
                })
                .collect();
            let y = self.amount.map(|_| {
                let y = Variable::binary(self.header.child("y"));
                y.set_range(self.range.get());
                y
            });
            Indicators { checks, y }
        })
    }

    fn count(&self, source: &dyn ValueSource, zero_if_none: bool) -> Option<usize> {
        let mut count = 0;
        for inequality in &self.inequalities {
            if inequality.is_true(source, zero_if_none)? {
                count += 1;
            }
        }
        Some(count)
    }

    fn assignment(&self, source: &dyn ValueSource) -> Option<Assignment> {
        let count = self.count(source, false)?;
        let mut assignment = Assignment::new(count_outcome(count, self.amount));
        if let Some(y) = &self.build().y {
            assignment.push(y, assignment.value);
        }
        Some(assignment)
    }

    fn sum(&self) -> LinearPolynomial {
        self.build().checks.iter().map(LinearPolynomial::from).sum()
    }
}

header_builders!(SatisfiedAmountInequalityFunction);

impl FunctionSymbol for SatisfiedAmountInequalityFunction {
    header_accessors!();

    fn discrete(&self) -> bool {
        true
    }

    fn range(&self) -> ValueRange {
        self.range.get()
    }

    fn dependencies(&self) -> Vec<SymbolRef> {
        dependencies_of(
            self.inequalities
                .iter()
                .flat_map(|inequality| [&inequality.lhs, &inequality.rhs]),
        )
    }

    fn polynomial(&self) -> LinearPolynomial {
        match &self.build().y {
            Some(y) => LinearPolynomial::from(y),
            None => self.sum(),
        }
    }

    fn auxiliary_variables(&self) -> Vec<Variable> {
        self.built
            .get()
            .map(|built| {
                let mut variables = auxiliaries_of(&built.checks);
                variables.extend(built.y.iter().cloned());
                variables
            })
            .unwrap_or_default()
    }

    fn flush(&self, force: bool) {
        for inequality in &self.inequalities {
            inequality.flush(force);
        }
        let range = Self::value_range(&self.inequalities, self.amount);
        self.range.set(range);
        if let Some(built) = self.built.get() {
            for check in &built.checks {
                check.flush(force);
            }
            if let Some(y) = &built.y {
                y.set_range(range);
            }
        }
    }

    fn prepare(
        &self,
        fixed: Option<&FixedValues>,
        tokens: &TokenTable,
        warm_start: &mut Solution,
    ) -> Option<f64> {
        prepare_all(&self.build().checks, fixed, tokens, warm_start);
        prepare_with(&self.header.name, fixed, tokens, warm_start, |source| {
            self.assignment(source)
        })
    }

    fn register_tokens(&self, tokens: &mut TokenTable) -> Result<()> {
        check_amount(&self.header.name, self.amount, self.inequalities.len())?;
        for inequality in &self.inequalities {
            if inequality.sign == Sign::Unequal {
                return Err(application_failed(
                    &self.header.name,
                    format!("inequality sign unsupported: {inequality}"),
                ));
            }
            require_finite(&self.header.name, &inequality.normalize().poly)?;
        }
        let built = self.build();
        register_tokens_all(&built.checks, tokens)?;
        if let Some(y) = &built.y {
            tokens.add(y)?;
        }
        Ok(())
    }

    fn register_model(&self, model: &mut LinearModel) -> Result<()> {
        let built = self.build();
        register_model_all(&built.checks, model)?;
        let (Some(y), Some(k)) = (&built.y, self.amount) else {
            return Ok(());
        };
        let origin = Some(self.header.origin());
        let n = built.checks.len() as f64;
        let k = k as f64;
        model.add_constraint(
            LinearPolynomial::from(y).geq((1.0 / n) * (self.sum() - (k - 1.0))),
            self.header.child("lb"),
            origin,
        )?;
        if self.config.extract {
            model.add_constraint(
                LinearPolynomial::from(y).leq((1.0 / k) * self.sum()),
                self.header.child("ub"),
                origin,
            )?;
        }
        Ok(())
    }

    fn register_model_fixed(&self, model: &mut LinearModel, fixed: &FixedValues) -> Result<()> {
        match self.assignment(fixed) {
            Some(assignment) => {
                register_model_fixed_all(&self.build().checks, model, fixed)?;
                assignment.pin(model, &self.header)
            }
            None => self.register_model(model),
        }
    }

    fn calculate_value(&self, source: &dyn ValueSource, zero_if_none: bool) -> Option<f64> {
        self.count(source, zero_if_none)
            .map(|count| count_outcome(count, self.amount))
    }
}
