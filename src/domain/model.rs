//! Linear mechanism model: token table plus named constraints.

use std::collections::HashSet;

use tracing::debug;

use super::constraint::LinearConstraint;
use super::inequality::LinearInequality;
use super::token::{FixedValues, Solution, TokenTable, ValueSource};
use crate::error::{ModelError, Result};
use crate::symbol::{FunctionSymbol, SymbolRef};

/// Default absolute tolerance of [`LinearModel::check`].
pub const CHECK_TOLERANCE: f64 = 1e-6;

/// A constraint with its name and the symbol that emitted it.
#[derive(Debug, Clone)]
pub struct NamedConstraint {
    pub name: String,
    pub from: Option<String>,
    pub constraint: LinearConstraint,
}

/// MIP container accepting constraints.
#[derive(Default)]
pub struct LinearModel {
    tokens: TokenTable,
    constraints: Vec<NamedConstraint>,
    registered: HashSet<String>,
}

impl LinearModel {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn tokens(&self) -> &TokenTable {
        &self.tokens
    }

    pub fn tokens_mut(&mut self) -> &mut TokenTable {
        &mut self.tokens
    }

    #[must_use]
    pub fn constraints(&self) -> &[NamedConstraint] {
        &self.constraints
    }

    /// Constraints emitted by the symbol `from`.
    pub fn constraints_from<'a>(
        &'a self,
        from: &'a str,
    ) -> impl Iterator<Item = &'a NamedConstraint> + 'a {
        self.constraints
            .iter()
            .filter(move |c| c.from.as_deref() == Some(from))
    }

    /// Flatten and append a constraint.
    ///
    /// # Errors
    ///
    /// - `UnsupportedSign` for `≠`
    /// - `UnknownVariable` when a flattened variable is not in the token table
    /// - `NonFinite` when a coefficient or the right-hand side is infinite
    pub fn add_constraint(
        &mut self,
        inequality: LinearInequality,
        name: impl Into<String>,
        from: Option<&str>,
    ) -> Result<()> {
        let name = name.into();
        let constraint = LinearConstraint::from_inequality(&inequality).ok_or_else(|| {
            ModelError::UnsupportedSign {
                constraint: name.clone(),
                sign: inequality.sign.symbol(),
            }
        })?;
        if let Some((variable, _)) = constraint
            .terms
            .iter()
            .find(|(variable, _)| !self.tokens.contains(variable))
        {
            return Err(ModelError::UnknownVariable {
                variable: variable.name().to_string(),
                constraint: name,
            }
            .into());
        }
        if !constraint.is_finite() {
            return Err(ModelError::NonFinite { constraint: name }.into());
        }
        self.constraints.push(NamedConstraint {
            name,
            from: from.map(str::to_string),
            constraint,
        });
        Ok(())
    }

    /// Register a symbol's auxiliary variables and constraints.
    ///
    /// A symbol already added to this model is skipped.
    ///
    /// # Errors
    ///
    /// Forwards the symbol's registration failure unchanged.
    pub fn add_symbol(&mut self, symbol: &SymbolRef) -> Result<()> {
        if self.registered.contains(symbol.name()) {
            debug!(symbol = symbol.name(), "symbol already registered");
            return Ok(());
        }
        symbol.register_tokens(&mut self.tokens)?;
        symbol.register_model(self)?;
        self.registered.insert(symbol.name().to_string());
        Ok(())
    }

    /// Register a symbol with some operand values pinned.
    ///
    /// # Errors
    ///
    /// Forwards the symbol's registration failure unchanged.
    pub fn add_symbol_fixed(&mut self, symbol: &SymbolRef, fixed: &FixedValues) -> Result<()> {
        if self.registered.contains(symbol.name()) {
            debug!(symbol = symbol.name(), "symbol already registered");
            return Ok(());
        }
        symbol.register_tokens_fixed(&mut self.tokens, fixed)?;
        symbol.register_model_fixed(self, fixed)?;
        self.registered.insert(symbol.name().to_string());
        Ok(())
    }

    /// Names of constraints and variable bounds violated by `source`.
    ///
    /// Bound violations are reported as `bound:<variable>`; integrality
    /// violations as `integer:<variable>`. Variables without a value are
    /// skipped here and surface through the constraints that read them.
    #[must_use]
    pub fn check(&self, source: &dyn ValueSource) -> Vec<String> {
        self.check_with_tolerance(source, CHECK_TOLERANCE)
    }

    #[must_use]
    pub fn check_with_tolerance(&self, source: &dyn ValueSource, tolerance: f64) -> Vec<String> {
        let mut violated = Vec::new();
        for variable in self.tokens.variables() {
            let Some(value) = source.variable_value(variable) else {
                continue;
            };
            let range = variable.range();
            if value < range.lower() - tolerance || value > range.upper() + tolerance {
                violated.push(format!("bound:{}", variable.name()));
            }
            if variable.discrete() && (value - value.round()).abs() > tolerance {
                violated.push(format!("integer:{}", variable.name()));
            }
        }
        for named in &self.constraints {
            if !named.constraint.is_satisfied(source, tolerance) {
                violated.push(named.name.clone());
            }
        }
        violated
    }

    /// True when [`LinearModel::check`] reports nothing.
    #[must_use]
    pub fn is_feasible(&self, solution: &Solution) -> bool {
        self.check(solution).is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::polynomial::LinearPolynomial;
    use crate::domain::variable::Variable;
    use crate::error::Error;

    #[test]
    fn test_add_constraint_requires_registered_variables() {
        let mut model = LinearModel::new();
        let x = Variable::real("x");
        let result = model.add_constraint(LinearPolynomial::from(&x).leq(1.0), "c", None);
        assert!(matches!(
            result,
            Err(Error::Model(ModelError::UnknownVariable { .. }))
        ));

        model.tokens_mut().add(&x).unwrap();
        model
            .add_constraint(LinearPolynomial::from(&x).leq(1.0), "c", Some("s"))
            .unwrap();
        assert_eq!(model.constraints().len(), 1);
        assert_eq!(model.constraints_from("s").count(), 1);
    }

    #[test]
    fn test_rejects_infinite_coefficient() {
        let mut model = LinearModel::new();
        let x = Variable::real("x");
        model.tokens_mut().add(&x).unwrap();
        let result = model.add_constraint((f64::INFINITY * &x).leq(1.0), "c", None);
        assert!(matches!(result, Err(Error::Model(ModelError::NonFinite { .. }))));
    }

    #[test]
    fn test_check_reports_bounds_and_constraints() {
        let mut model = LinearModel::new();
        let b = Variable::binary("b");
        let x = Variable::real("x");
        model.tokens_mut().add_all([&b, &x]).unwrap();
        model
            .add_constraint(LinearPolynomial::from(&x).leq(&b), "x_le_b", None)
            .unwrap();

        let mut solution = Solution::new();
        solution.set(&b, 0.5);
        solution.set(&x, 1.0);
        let violated = model.check(&solution);
        assert!(violated.contains(&"integer:b".to_string()));
        assert!(violated.contains(&"x_le_b".to_string()));

        solution.set(&b, 1.0);
        assert!(model.is_feasible(&solution));
    }
}
