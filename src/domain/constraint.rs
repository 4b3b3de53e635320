//! Flattened linear constraints as handed to a solver.
//!
//! A [`LinearConstraint`] is the variable-only form of a
//! [`LinearInequality`](super::inequality::LinearInequality) after every
//! symbol has been expanded.

use super::inequality::{LinearInequality, Sign};
use super::range::TOLERANCE;
use super::token::ValueSource;
use super::variable::Variable;

/// A single linear constraint: `sum(coefficient[i] * x[i]) {>=, <=, =} rhs`.
#[derive(Debug, Clone)]
pub struct LinearConstraint {
    /// Variables with their coefficients.
    pub terms: Vec<(Variable, f64)>,
    /// Constraint sense (>=, <=, =).
    pub sense: ConstraintSense,
    /// Right-hand side value.
    pub rhs: f64,
}

impl LinearConstraint {
    /// Create a >= constraint.
    #[must_use]
    pub const fn geq(terms: Vec<(Variable, f64)>, rhs: f64) -> Self {
        Self {
            terms,
            sense: ConstraintSense::GreaterEqual,
            rhs,
        }
    }

    /// Create a <= constraint.
    #[must_use]
    pub const fn leq(terms: Vec<(Variable, f64)>, rhs: f64) -> Self {
        Self {
            terms,
            sense: ConstraintSense::LessEqual,
            rhs,
        }
    }

    /// Create an = constraint.
    #[must_use]
    pub const fn eq(terms: Vec<(Variable, f64)>, rhs: f64) -> Self {
        Self {
            terms,
            sense: ConstraintSense::Equal,
            rhs,
        }
    }

    /// Flatten an inequality. Strict signs relax to their closed form;
    /// `≠` has no linear form and yields `None`.
    #[must_use]
    pub fn from_inequality(inequality: &LinearInequality) -> Option<Self> {
        let sense = ConstraintSense::from_sign(inequality.sign)?;
        let cells = (inequality.lhs.clone() - inequality.rhs.clone()).cells();
        let terms = cells
            .terms
            .into_values()
            .filter(|(_, coefficient)| *coefficient != 0.0)
            .collect();
        Some(Self {
            terms,
            sense,
            rhs: -cells.constant,
        })
    }

    /// True when every coefficient and the right-hand side are finite.
    #[must_use]
    pub fn is_finite(&self) -> bool {
        self.rhs.is_finite() && self.terms.iter().all(|(_, c)| c.is_finite())
    }

    /// Left-hand side value, or `None` when a variable has no value.
    #[must_use]
    pub fn lhs_value(&self, source: &dyn ValueSource) -> Option<f64> {
        self.terms.iter().try_fold(0.0, |acc, (variable, coefficient)| {
            Some(acc + coefficient * source.variable_value(variable)?)
        })
    }

    /// Whether the constraint holds under `source` within `tolerance`.
    /// A missing variable value counts as a violation.
    #[must_use]
    pub fn is_satisfied(&self, source: &dyn ValueSource, tolerance: f64) -> bool {
        let Some(lhs) = self.lhs_value(source) else {
            return false;
        };
        match self.sense {
            ConstraintSense::GreaterEqual => lhs >= self.rhs - tolerance,
            ConstraintSense::LessEqual => lhs <= self.rhs + tolerance,
            ConstraintSense::Equal => (lhs - self.rhs).abs() <= tolerance.max(TOLERANCE),
        }
    }
}

/// Constraint sense (comparison operator).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstraintSense {
    /// Greater than or equal (>=).
    GreaterEqual,
    /// Less than or equal (<=).
    LessEqual,
    /// Equal (=).
    Equal,
}

impl ConstraintSense {
    #[must_use]
    pub const fn from_sign(sign: Sign) -> Option<Self> {
        match sign {
            Sign::Less | Sign::LessEqual => Some(ConstraintSense::LessEqual),
            Sign::Greater | Sign::GreaterEqual => Some(ConstraintSense::GreaterEqual),
            Sign::Equal => Some(ConstraintSense::Equal),
            Sign::Unequal => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::polynomial::LinearPolynomial;
    use crate::domain::token::Solution;

    #[test]
    fn test_from_inequality_moves_constants_right() {
        let x = Variable::real("x");
        let y = Variable::real("y");
        let ineq = (x.clone() * 2.0 + 1.0).leq(y.clone() + 4.0);
        let constraint = LinearConstraint::from_inequality(&ineq).unwrap();

        assert_eq!(constraint.sense, ConstraintSense::LessEqual);
        assert_eq!(constraint.rhs, 3.0);
        assert_eq!(constraint.terms.len(), 2);
    }

    #[test]
    fn test_unequal_has_no_linear_form() {
        let x = Variable::real("x");
        let ineq = LinearPolynomial::from(&x).with_sign(Sign::Unequal, 1.0);
        assert!(LinearConstraint::from_inequality(&ineq).is_none());
    }

    #[test]
    fn test_is_satisfied() {
        let x = Variable::real("x");
        let constraint = LinearConstraint::geq(vec![(x.clone(), 1.0)], 2.0);
        let mut solution = Solution::new();
        assert!(!constraint.is_satisfied(&solution, 1e-6));
        solution.set(&x, 2.0);
        assert!(constraint.is_satisfied(&solution, 1e-6));
        solution.set(&x, 1.5);
        assert!(!constraint.is_satisfied(&solution, 1e-6));
    }
}
