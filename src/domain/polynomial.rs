//! Linear polynomials over variables and function symbols.
//!
//! A [`LinearPolynomial`] is `Σ cᵢ·itemᵢ + constant` where each item is a
//! decision variable or a function symbol. Symbols contribute their current
//! range to bound propagation and expand into their own output polynomial
//! when the polynomial is flattened into [`Cells`] for a constraint.

use std::collections::BTreeMap;
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, Mul, Neg, Sub};
use std::rc::Rc;

use super::inequality::{LinearInequality, Sign};
use super::range::{is_integer, ValueRange};
use super::token::ValueSource;
use super::variable::{Variable, VariableId};
use crate::symbol::{FunctionSymbol, SymbolRef};

/// A term operand.
#[derive(Clone)]
pub enum Item {
    Variable(Variable),
    Symbol(SymbolRef),
}

impl Item {
    #[must_use]
    pub fn range(&self) -> ValueRange {
        match self {
            Item::Variable(variable) => variable.range(),
            Item::Symbol(symbol) => symbol.range(),
        }
    }

    #[must_use]
    pub fn discrete(&self) -> bool {
        match self {
            Item::Variable(variable) => variable.discrete(),
            Item::Symbol(symbol) => symbol.discrete(),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Item::Variable(variable) => variable.name(),
            Item::Symbol(symbol) => symbol.name(),
        }
    }

    fn same(&self, other: &Item) -> bool {
        match (self, other) {
            (Item::Variable(a), Item::Variable(b)) => a == b,
            (Item::Symbol(a), Item::Symbol(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }

    fn evaluate(&self, source: &dyn ValueSource, zero_if_none: bool) -> Option<f64> {
        let value = match self {
            Item::Variable(variable) => source.variable_value(variable),
            Item::Symbol(symbol) => symbol.evaluate(source, zero_if_none),
        };
        match value {
            Some(value) => Some(value),
            None if zero_if_none => Some(0.0),
            None => None,
        }
    }
}

/// `coefficient · item`.
#[derive(Clone)]
pub struct Monomial {
    pub coefficient: f64,
    pub item: Item,
}

/// Affine combination of variables and symbols.
#[derive(Clone, Default)]
pub struct LinearPolynomial {
    monomials: Vec<Monomial>,
    constant: f64,
}

/// A polynomial flattened to decision variables only.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Cells {
    pub terms: BTreeMap<VariableId, (Variable, f64)>,
    pub constant: f64,
}

impl Cells {
    fn add_term(&mut self, variable: &Variable, coefficient: f64) {
        let entry = self
            .terms
            .entry(variable.id())
            .or_insert_with(|| (variable.clone(), 0.0));
        entry.1 += coefficient;
    }

    /// Value under an assignment of the flattened variables.
    #[must_use]
    pub fn evaluate(&self, source: &dyn ValueSource) -> Option<f64> {
        let mut total = self.constant;
        for (variable, coefficient) in self.terms.values() {
            total += coefficient * source.variable_value(variable)?;
        }
        Some(total)
    }

    /// Every flattened variable with a non-zero coefficient.
    pub fn variables(&self) -> impl Iterator<Item = &Variable> {
        self.terms
            .values()
            .filter(|(_, coefficient)| *coefficient != 0.0)
            .map(|(variable, _)| variable)
    }
}

impl LinearPolynomial {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// `coefficient · item`.
    #[must_use]
    pub fn term(coefficient: f64, item: Item) -> Self {
        let mut poly = Self::new();
        poly.push(coefficient, item);
        poly
    }

    /// Sum of `coefficient · variable` pairs.
    #[must_use]
    pub fn weighted<'a, I>(terms: I) -> Self
    where
        I: IntoIterator<Item = (f64, &'a Variable)>,
    {
        let mut poly = Self::new();
        for (coefficient, variable) in terms {
            poly.push(coefficient, Item::Variable(variable.clone()));
        }
        poly
    }

    fn push(&mut self, coefficient: f64, item: Item) {
        if coefficient == 0.0 {
            return;
        }
        if let Some(existing) = self.monomials.iter_mut().find(|m| m.item.same(&item)) {
            existing.coefficient += coefficient;
        } else {
            self.monomials.push(Monomial { coefficient, item });
        }
        self.monomials.retain(|m| m.coefficient != 0.0);
    }

    #[must_use]
    pub fn monomials(&self) -> &[Monomial] {
        &self.monomials
    }

    #[must_use]
    pub fn constant(&self) -> f64 {
        self.constant
    }

    /// True when no variable or symbol appears.
    #[must_use]
    pub fn is_constant(&self) -> bool {
        self.monomials.is_empty()
    }

    /// The polynomial without its constant.
    #[must_use]
    pub fn without_constant(&self) -> Self {
        Self {
            monomials: self.monomials.clone(),
            constant: 0.0,
        }
    }

    #[must_use]
    pub fn range(&self) -> ValueRange {
        self.monomials
            .iter()
            .fold(ValueRange::point(self.constant), |acc, m| {
                acc.add(&m.item.range().scale(m.coefficient))
            })
    }

    #[must_use]
    pub fn lower_bound(&self) -> f64 {
        self.range().lower()
    }

    #[must_use]
    pub fn upper_bound(&self) -> f64 {
        self.range().upper()
    }

    /// True iff every possible value is an integer.
    #[must_use]
    pub fn discrete(&self) -> bool {
        is_integer(self.constant)
            && self
                .monomials
                .iter()
                .all(|m| is_integer(m.coefficient) && m.item.discrete())
    }

    /// Symbols this polynomial reads, transitively, without duplicates.
    #[must_use]
    pub fn dependencies(&self) -> Vec<SymbolRef> {
        let mut found: Vec<SymbolRef> = Vec::new();
        for monomial in &self.monomials {
            if let Item::Symbol(symbol) = &monomial.item {
                let mut candidates = vec![symbol.clone()];
                candidates.extend(symbol.dependencies());
                for candidate in candidates {
                    if !found.iter().any(|s| Rc::ptr_eq(s, &candidate)) {
                        found.push(candidate);
                    }
                }
            }
        }
        found
    }

    /// Flatten to decision variables, expanding every symbol into its output
    /// polynomial. Builds the auxiliary state of symbols not yet built.
    #[must_use]
    pub fn cells(&self) -> Cells {
        let mut cells = Cells {
            terms: BTreeMap::new(),
            constant: self.constant,
        };
        for monomial in &self.monomials {
            match &monomial.item {
                Item::Variable(variable) => cells.add_term(variable, monomial.coefficient),
                Item::Symbol(symbol) => {
                    let inner = symbol.polynomial().cells();
                    cells.constant += monomial.coefficient * inner.constant;
                    for (variable, coefficient) in inner.terms.values() {
                        cells.add_term(variable, monomial.coefficient * coefficient);
                    }
                }
            }
        }
        cells
    }

    /// Value under `source`; unknown items make the result unknown unless
    /// `zero_if_none` is set.
    #[must_use]
    pub fn evaluate(&self, source: &dyn ValueSource, zero_if_none: bool) -> Option<f64> {
        let mut total = self.constant;
        for monomial in &self.monomials {
            total += monomial.coefficient * monomial.item.evaluate(source, zero_if_none)?;
        }
        Some(total)
    }

    /// Refresh the ranges of every symbol read by this polynomial.
    pub fn flush(&self, force: bool) {
        for monomial in &self.monomials {
            if let Item::Symbol(symbol) = &monomial.item {
                symbol.flush(force);
            }
        }
    }

    /// Multiply every coefficient and the constant in place.
    pub fn scale(&mut self, factor: f64) {
        if factor == 0.0 {
            self.monomials.clear();
            self.constant = 0.0;
            return;
        }
        for monomial in &mut self.monomials {
            monomial.coefficient *= factor;
        }
        self.constant *= factor;
    }

    pub fn with_sign(self, sign: Sign, rhs: impl Into<LinearPolynomial>) -> LinearInequality {
        LinearInequality::new(self, sign, rhs.into())
    }

    /// `self ≤ rhs`.
    pub fn leq(self, rhs: impl Into<LinearPolynomial>) -> LinearInequality {
        self.with_sign(Sign::LessEqual, rhs)
    }

    /// `self ≥ rhs`.
    pub fn geq(self, rhs: impl Into<LinearPolynomial>) -> LinearInequality {
        self.with_sign(Sign::GreaterEqual, rhs)
    }

    /// `self = rhs`.
    pub fn equals(self, rhs: impl Into<LinearPolynomial>) -> LinearInequality {
        self.with_sign(Sign::Equal, rhs)
    }

    /// `self < rhs`.
    pub fn less(self, rhs: impl Into<LinearPolynomial>) -> LinearInequality {
        self.with_sign(Sign::Less, rhs)
    }

    /// `self > rhs`.
    pub fn greater(self, rhs: impl Into<LinearPolynomial>) -> LinearInequality {
        self.with_sign(Sign::Greater, rhs)
    }
}

impl fmt::Debug for LinearPolynomial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl fmt::Display for LinearPolynomial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.monomials.is_empty() {
            return write!(f, "{}", self.constant);
        }
        for (i, m) in self.monomials.iter().enumerate() {
            if i > 0 {
                f.write_str(if m.coefficient < 0.0 { " - " } else { " + " })?;
            } else if m.coefficient < 0.0 {
                f.write_str("-")?;
            }
            let magnitude = m.coefficient.abs();
            if magnitude == 1.0 {
                write!(f, "{}", m.item.name())?;
            } else {
                write!(f, "{}*{}", magnitude, m.item.name())?;
            }
        }
        if self.constant != 0.0 {
            let sign = if self.constant < 0.0 { "-" } else { "+" };
            write!(f, " {} {}", sign, self.constant.abs())?;
        }
        Ok(())
    }
}

impl From<f64> for LinearPolynomial {
    fn from(constant: f64) -> Self {
        Self {
            monomials: Vec::new(),
            constant,
        }
    }
}

impl From<Variable> for LinearPolynomial {
    fn from(variable: Variable) -> Self {
        Self::term(1.0, Item::Variable(variable))
    }
}

impl From<&Variable> for LinearPolynomial {
    fn from(variable: &Variable) -> Self {
        Self::term(1.0, Item::Variable(variable.clone()))
    }
}

impl From<SymbolRef> for LinearPolynomial {
    fn from(symbol: SymbolRef) -> Self {
        Self::term(1.0, Item::Symbol(symbol))
    }
}

impl From<&SymbolRef> for LinearPolynomial {
    fn from(symbol: &SymbolRef) -> Self {
        Self::term(1.0, Item::Symbol(symbol.clone()))
    }
}

impl From<&LinearPolynomial> for LinearPolynomial {
    fn from(poly: &LinearPolynomial) -> Self {
        poly.clone()
    }
}

impl<T: Into<LinearPolynomial>> Add<T> for LinearPolynomial {
    type Output = LinearPolynomial;

    fn add(mut self, rhs: T) -> Self::Output {
        let rhs = rhs.into();
        for monomial in rhs.monomials {
            self.push(monomial.coefficient, monomial.item);
        }
        self.constant += rhs.constant;
        self
    }
}

impl<T: Into<LinearPolynomial>> Sub<T> for LinearPolynomial {
    type Output = LinearPolynomial;

    fn sub(self, rhs: T) -> Self::Output {
        self + (-rhs.into())
    }
}

impl Neg for LinearPolynomial {
    type Output = LinearPolynomial;

    fn neg(mut self) -> Self::Output {
        self.scale(-1.0);
        self
    }
}

impl Mul<f64> for LinearPolynomial {
    type Output = LinearPolynomial;

    fn mul(mut self, rhs: f64) -> Self::Output {
        self.scale(rhs);
        self
    }
}

impl Mul<LinearPolynomial> for f64 {
    type Output = LinearPolynomial;

    fn mul(self, rhs: LinearPolynomial) -> Self::Output {
        rhs * self
    }
}

impl<T: Into<LinearPolynomial>> Add<T> for Variable {
    type Output = LinearPolynomial;

    fn add(self, rhs: T) -> Self::Output {
        LinearPolynomial::from(self) + rhs
    }
}

impl<T: Into<LinearPolynomial>> Sub<T> for Variable {
    type Output = LinearPolynomial;

    fn sub(self, rhs: T) -> Self::Output {
        LinearPolynomial::from(self) - rhs
    }
}

impl Neg for Variable {
    type Output = LinearPolynomial;

    fn neg(self) -> Self::Output {
        -LinearPolynomial::from(self)
    }
}

impl Mul<f64> for Variable {
    type Output = LinearPolynomial;

    fn mul(self, rhs: f64) -> Self::Output {
        LinearPolynomial::term(rhs, Item::Variable(self))
    }
}

impl Mul<Variable> for f64 {
    type Output = LinearPolynomial;

    fn mul(self, rhs: Variable) -> Self::Output {
        LinearPolynomial::term(self, Item::Variable(rhs))
    }
}

impl Mul<&Variable> for f64 {
    type Output = LinearPolynomial;

    fn mul(self, rhs: &Variable) -> Self::Output {
        LinearPolynomial::term(self, Item::Variable(rhs.clone()))
    }
}

impl Sum for LinearPolynomial {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(LinearPolynomial::new(), |acc, poly| acc + poly)
    }
}

impl<'a> Sum<&'a Variable> for LinearPolynomial {
    fn sum<I: Iterator<Item = &'a Variable>>(iter: I) -> Self {
        iter.fold(LinearPolynomial::new(), |acc, variable| acc + variable)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::token::Solution;

    #[test]
    fn test_range_propagates_through_coefficients() {
        let x = Variable::real("x").with_range(-3.0, 5.0);
        let y = Variable::binary("y");
        let poly = 2.0 * &x - y + 1.0;
        assert_eq!(poly.range(), ValueRange::new(-6.0, 11.0).unwrap());
    }

    #[test]
    fn test_like_terms_merge() {
        let x = Variable::real("x");
        let poly = x.clone() + x.clone() * 2.0 - x.clone() * 3.0;
        assert!(poly.is_constant());
    }

    #[test]
    fn test_discrete_requires_integral_coefficients() {
        let i = Variable::integer("i");
        assert!((2.0 * &i + 1.0).discrete());
        assert!(!(0.5 * &i).discrete());
        assert!(!LinearPolynomial::from(Variable::real("r")).discrete());
    }

    #[test]
    fn test_evaluate_missing_value() {
        let x = Variable::real("x");
        let poly = LinearPolynomial::from(&x) + 2.0;
        let solution = Solution::new();
        assert_eq!(poly.evaluate(&solution, false), None);
        assert_eq!(poly.evaluate(&solution, true), Some(2.0));
    }

    #[test]
    fn test_cells_flatten_variables() {
        let x = Variable::real("x");
        let y = Variable::real("y");
        let cells = (x.clone() * 2.0 + y.clone() - x.clone() + 4.0).cells();
        assert_eq!(cells.constant, 4.0);
        assert_eq!(cells.terms.get(&x.id()).map(|t| t.1), Some(1.0));
        assert_eq!(cells.terms.get(&y.id()).map(|t| t.1), Some(1.0));
    }

    #[test]
    fn test_display() {
        let x = Variable::real("x");
        let y = Variable::real("y");
        let poly = x.clone() * 2.0 - y + 3.0;
        assert_eq!(poly.to_string(), "2*x - y + 3");
    }
}
