//! Index of the first nonzero operand.

use std::cell::{Cell, OnceCell};

use tracing::debug;

use super::logic::Literal;
use super::selection::OperandProfile;
use super::{
    application_failed, bool_value, dependencies_of, prepare_with, require_non_negative,
    Assignment, FunctionSymbol, Header, SymbolRef,
};
use crate::config::SymbolConfig;
use crate::domain::range::is_zero;
use crate::domain::{
    FixedValues, LinearModel, LinearPolynomial, Solution, TokenTable, ValueRange, ValueSource,
    Variable,
};
use crate::error::Result;

struct Built {
    literals: Vec<Literal>,
    /// One-hot marker of the first true literal.
    hits: Vec<Variable>,
}

/// 0-based index of the first nonzero operand, `-1` when all are zero.
///
/// ```text
/// fᵢ ≤ bᵢ    Σ_{j≤i} fⱼ ≥ bᵢ    Σf ≤ 1    y = Σ (i+1)·fᵢ − 1
/// ```
pub struct FirstFunction {
    header: Header,
    operands: Vec<LinearPolynomial>,
    config: SymbolConfig,
    range: Cell<ValueRange>,
    built: OnceCell<Built>,
}

impl FirstFunction {
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

    fn value_range(operands: &[LinearPolynomial]) -> ValueRange {
        let profiles: Vec<OperandProfile> = operands.iter().map(OperandProfile::of).collect();
        let possible = |p: &OperandProfile| !p.always_zero();
        let certain = profiles.iter().position(OperandProfile::never_zero);
        let lower = match certain {
            Some(_) => profiles.iter().position(possible).map_or(-1.0, |i| i as f64),
            None => -1.0,
        };
        let upper = match certain {
            Some(i) => i as f64,
            None => profiles.iter().rposition(possible).map_or(-1.0, |i| i as f64),
        };
        ValueRange::spanning(lower, upper)
    }

    fn build(&self) -> &Built {
        self.built.get_or_init(|| {
            debug!(symbol = %self.header.name, operands = self.operands.len(), "building first-index markers");
            let literals = self
                .operands
                .iter()
                .enumerate()
                .map(|(i, x)| {
                    Literal::of(x, self.header.child(format_args!("b_{i}")), self.header.origin(), self.config)
                })
                .collect();
            let hits = (0..self.operands.len())
                .map(|i| Variable::binary(self.header.child(format_args!("f_{i}"))))
                .collect();
            Built { literals, hits }
        })
    }

    /// Index of the first nonzero operand; stops at the first unknown one.
    fn first(&self, source: &dyn ValueSource, zero_if_none: bool) -> Option<Option<usize>> {
        for (i, x) in self.operands.iter().enumerate() {
            if !is_zero(x.evaluate(source, zero_if_none)?) {
                return Some(Some(i));
            }
        }
        Some(None)
    }

    fn assignment(&self, source: &dyn ValueSource) -> Option<Assignment> {
        let first = self.first(source, false)?;
        let value = first.map_or(-1.0, |i| i as f64);
        let mut assignment = Assignment::new(value);
        for (i, hit) in self.build().hits.iter().enumerate() {
            assignment.push(hit, bool_value(first == Some(i)));
        }
        Some(assignment)
    }
}

header_builders!(FirstFunction);

impl FunctionSymbol for FirstFunction {
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
        let hits = &self.build().hits;
        LinearPolynomial::weighted(hits.iter().enumerate().map(|(i, f)| ((i + 1) as f64, f))) - 1.0
    }

    fn auxiliary_variables(&self) -> Vec<Variable> {
        match self.built.get() {
            Some(built) => built
                .literals
                .iter()
                .flat_map(Literal::auxiliary_variables)
                .chain(built.hits.iter().cloned())
                .collect(),
            None => Vec::new(),
        }
    }

    fn flush(&self, force: bool) {
        match self.built.get() {
            Some(built) => built.literals.iter().for_each(|literal| literal.flush(force)),
            None => self.operands.iter().for_each(|x| x.flush(force)),
        }
        self.range.set(Self::value_range(&self.operands));
    }

    fn prepare(
        &self,
        fixed: Option<&FixedValues>,
        tokens: &TokenTable,
        warm_start: &mut Solution,
    ) -> Option<f64> {
        for literal in &self.build().literals {
            literal.prepare(fixed, tokens, warm_start);
        }
        prepare_with(&self.header.name, fixed, tokens, warm_start, |source| {
            self.assignment(source)
        })
    }

    fn register_tokens(&self, tokens: &mut TokenTable) -> Result<()> {
        if self.operands.is_empty() {
            return Err(application_failed(&self.header.name, "needs at least one operand"));
        }
        for x in &self.operands {
            require_non_negative(&self.header.name, x)?;
        }
        let built = self.build();
        for literal in &built.literals {
            literal.register_tokens(tokens)?;
        }
        tokens.add_all(&built.hits)?;
        Ok(())
    }

    fn register_model(&self, model: &mut LinearModel) -> Result<()> {
        let built = self.build();
        let origin = Some(self.header.origin());
        for literal in &built.literals {
            literal.register_model(model)?;
        }
        let mut prefix = LinearPolynomial::new();
        for (i, (literal, hit)) in built.literals.iter().zip(&built.hits).enumerate() {
            prefix = prefix + hit;
            model.add_constraint(
                LinearPolynomial::from(hit).leq(literal.polynomial()),
                self.header.child(format_args!("hit_{i}")),
                origin,
            )?;
            model.add_constraint(
                prefix.clone().geq(literal.polynomial()),
                self.header.child(format_args!("prefix_{i}")),
                origin,
            )?;
        }
        model.add_constraint(
            built.hits.iter().sum::<LinearPolynomial>().leq(1.0),
            self.header.child("once"),
            origin,
        )
    }

    fn register_model_fixed(&self, model: &mut LinearModel, fixed: &FixedValues) -> Result<()> {
        match self.assignment(fixed) {
            Some(assignment) => {
                for literal in &self.build().literals {
                    literal.register_model_fixed(model, fixed)?;
                }
                assignment.pin(model, &self.header)
            }
            None => self.register_model(model),
        }
    }

    fn calculate_value(&self, source: &dyn ValueSource, zero_if_none: bool) -> Option<f64> {
        self.first(source, zero_if_none)
            .map(|first| first.map_or(-1.0, |i| i as f64))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbol::testing::Harness;
    use crate::symbol::IntoSymbol;

    #[test]
    fn test_range_follows_certain_operand() {
        let a = Variable::binary("a");
        let b = Variable::integer("b").with_range(2.0, 4.0);
        let c = Variable::binary("c");
        let first = FirstFunction::new([&a, &b, &c], "first");
        assert_eq!(first.range(), ValueRange::spanning(0.0, 1.0));

        let open = FirstFunction::new([&a, &c], "open");
        assert_eq!(open.range(), ValueRange::spanning(-1.0, 1.0));
    }

    #[test]
    fn test_first_over_binaries() {
        let a = Variable::binary("a");
        let b = Variable::binary("b");
        let c = Variable::binary("c");
        let first = FirstFunction::new([&a, &b, &c], "first").into_symbol();
        let mut harness = Harness::new(first, &[&a, &b, &c]);
        assert_eq!(harness.at(&[(&a, 0.0), (&b, 1.0), (&c, 1.0)]), 1.0);
        assert_eq!(harness.at(&[(&a, 1.0), (&b, 0.0), (&c, 1.0)]), 0.0);
        assert_eq!(harness.at(&[(&a, 0.0), (&b, 0.0), (&c, 0.0)]), -1.0);
    }

    #[test]
    fn test_integer_operands_use_indicators() {
        let a = Variable::uinteger("a").with_range(0.0, 5.0);
        let b = Variable::uinteger("b").with_range(0.0, 5.0);
        let first = FirstFunction::new([&a, &b], "first").into_symbol();
        let mut harness = Harness::new(first.clone(), &[&a, &b]);
        assert_eq!(harness.at(&[(&a, 0.0), (&b, 3.0)]), 1.0);
        assert_eq!(first.auxiliary_variables().len(), 4);
    }

    #[test]
    fn test_negative_operand_fails() {
        let a = Variable::integer("a").with_range(-1.0, 1.0);
        let first = FirstFunction::new([&a], "first");
        let mut tokens = TokenTable::new();
        assert!(first.register_tokens(&mut tokens).unwrap_err().is_application_failed());
    }
}
