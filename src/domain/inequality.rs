//! Linear inequalities `lhs ⋈ rhs`.

use std::fmt;

use super::polynomial::LinearPolynomial;
use super::range::{ValueRange, TOLERANCE};
use super::token::ValueSource;
use crate::symbol::SymbolRef;

/// Comparison operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Sign {
    Less,
    LessEqual,
    Equal,
    Unequal,
    GreaterEqual,
    Greater,
}

impl Sign {
    /// Whether `lhs ⋈ rhs` holds, within [`TOLERANCE`].
    #[must_use]
    pub fn holds(self, lhs: f64, rhs: f64) -> bool {
        match self {
            Sign::Less => lhs < rhs - TOLERANCE,
            Sign::LessEqual => lhs <= rhs + TOLERANCE,
            Sign::Equal => (lhs - rhs).abs() <= TOLERANCE,
            Sign::Unequal => (lhs - rhs).abs() > TOLERANCE,
            Sign::GreaterEqual => lhs >= rhs - TOLERANCE,
            Sign::Greater => lhs > rhs + TOLERANCE,
        }
    }

    /// The sign after swapping both sides.
    #[must_use]
    pub fn reversed(self) -> Self {
        match self {
            Sign::Less => Sign::Greater,
            Sign::LessEqual => Sign::GreaterEqual,
            Sign::GreaterEqual => Sign::LessEqual,
            Sign::Greater => Sign::Less,
            other => other,
        }
    }

    /// The sign of the negated relation.
    #[must_use]
    pub fn negated(self) -> Self {
        match self {
            Sign::Less => Sign::GreaterEqual,
            Sign::LessEqual => Sign::Greater,
            Sign::Equal => Sign::Unequal,
            Sign::Unequal => Sign::Equal,
            Sign::GreaterEqual => Sign::Less,
            Sign::Greater => Sign::LessEqual,
        }
    }

    #[must_use]
    pub const fn symbol(self) -> &'static str {
        match self {
            Sign::Less => "<",
            Sign::LessEqual => "<=",
            Sign::Equal => "=",
            Sign::Unequal => "!=",
            Sign::GreaterEqual => ">=",
            Sign::Greater => ">",
        }
    }

    /// Truth value of `v ⋈ threshold` that holds for every `v` in `range`,
    /// or `None` when it depends on `v`.
    #[must_use]
    pub fn judge(self, range: &ValueRange, threshold: f64) -> Option<bool> {
        let (lower, upper) = (range.lower(), range.upper());
        let always = |sign: Sign| sign.holds(lower, threshold) && sign.holds(upper, threshold);
        match self {
            Sign::Equal if range.fixed_value().is_some() => Some(self.holds(lower, threshold)),
            Sign::Equal | Sign::Unequal => {
                if !range.contains(threshold) {
                    Some(self == Sign::Unequal)
                } else if range.fixed_value().is_some() {
                    Some(self == Sign::Equal)
                } else {
                    None
                }
            }
            _ if always(self) => Some(true),
            _ if always(self.negated()) => Some(false),
            _ => None,
        }
    }
}

impl fmt::Display for Sign {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// `lhs ⋈ rhs`.
#[derive(Clone, Debug)]
pub struct LinearInequality {
    pub lhs: LinearPolynomial,
    pub sign: Sign,
    pub rhs: LinearPolynomial,
}

/// `poly ⋈ threshold` with every variable on the left and the constant on
/// the right.
#[derive(Clone, Debug)]
pub struct NormalizedInequality {
    pub poly: LinearPolynomial,
    pub sign: Sign,
    pub threshold: f64,
}

impl LinearInequality {
    #[must_use]
    pub fn new(lhs: LinearPolynomial, sign: Sign, rhs: LinearPolynomial) -> Self {
        Self { lhs, sign, rhs }
    }

    /// Move everything to the left and the constant to the right.
    #[must_use]
    pub fn normalize(&self) -> NormalizedInequality {
        let difference = self.lhs.clone() - self.rhs.clone();
        NormalizedInequality {
            threshold: -difference.constant(),
            poly: difference.without_constant(),
            sign: self.sign,
        }
    }

    /// Truth value under `source`.
    #[must_use]
    pub fn is_true(&self, source: &dyn ValueSource, zero_if_none: bool) -> Option<bool> {
        let lhs = self.lhs.evaluate(source, zero_if_none)?;
        let rhs = self.rhs.evaluate(source, zero_if_none)?;
        Some(self.sign.holds(lhs, rhs))
    }

    /// Truth value implied by the current bounds alone.
    #[must_use]
    pub fn judge(&self) -> Option<bool> {
        let normalized = self.normalize();
        normalized
            .sign
            .judge(&normalized.poly.range(), normalized.threshold)
    }

    #[must_use]
    pub fn dependencies(&self) -> Vec<SymbolRef> {
        let mut found = self.lhs.dependencies();
        for symbol in self.rhs.dependencies() {
            if !found.iter().any(|s| std::rc::Rc::ptr_eq(s, &symbol)) {
                found.push(symbol);
            }
        }
        found
    }

    pub fn flush(&self, force: bool) {
        self.lhs.flush(force);
        self.rhs.flush(force);
    }
}

impl fmt::Display for LinearInequality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.lhs, self.sign, self.rhs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::token::Solution;
    use crate::domain::variable::Variable;

    #[test]
    fn test_normalize_moves_constant() {
        let x = Variable::real("x");
        let ineq = (x.clone() + 2.0).leq(5.0);
        let normalized = ineq.normalize();
        assert_eq!(normalized.threshold, 3.0);
        assert_eq!(normalized.poly.constant(), 0.0);
    }

    #[test]
    fn test_judge_from_bounds() {
        let x = Variable::real("x").with_range(0.0, 10.0);
        assert_eq!(LinearPolynomial::from(&x).leq(10.0).judge(), Some(true));
        assert_eq!(LinearPolynomial::from(&x).greater(10.0).judge(), Some(false));
        assert_eq!(LinearPolynomial::from(&x).leq(5.0).judge(), None);
        assert_eq!(LinearPolynomial::from(&x).equals(11.0).judge(), Some(false));
        assert_eq!(LinearPolynomial::from(&x).less(0.0).judge(), Some(false));
    }

    #[test]
    fn test_is_true() {
        let x = Variable::real("x");
        let mut solution = Solution::new();
        solution.set(&x, 4.0);
        assert_eq!(LinearPolynomial::from(&x).geq(4.0).is_true(&solution, false), Some(true));
        assert_eq!(LinearPolynomial::from(&x).greater(4.0).is_true(&solution, false), Some(false));
        assert_eq!(
            LinearPolynomial::from(&Variable::real("z")).geq(0.0).is_true(&solution, false),
            None
        );
    }

    #[test]
    fn test_negated_sign() {
        assert!(Sign::Less.negated().holds(3.0, 3.0));
        assert!(!Sign::LessEqual.negated().holds(3.0, 3.0));
    }
}
