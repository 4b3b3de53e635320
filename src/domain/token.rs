//! Token table: variable registry, loaded solution and symbol value cache.
//!
//! # Overview
//!
//! - [`TokenTable`]: registry of variables plus the solution currently loaded
//!   and a per-symbol value cache
//! - [`Solution`]: explicit `VariableId → f64` map, used both for loaded
//!   solutions and for warm starts written by `prepare`
//! - [`ValueSource`]: anything that can answer variable (and optionally
//!   symbol) values during evaluation
//! - [`FixedValues`]: operand values pinned by name during branch-and-bound
//!   style fixing

use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};

use super::variable::{Variable, VariableId};
use crate::error::ModelError;

/// Values pinned by variable or symbol name.
pub type FixedValues = BTreeMap<String, f64>;

/// Source of concrete values for evaluation.
pub trait ValueSource {
    /// Value of a decision variable, if known.
    fn variable_value(&self, variable: &Variable) -> Option<f64>;

    /// Already-known value of a symbol, if any.
    fn symbol_value(&self, _name: &str) -> Option<f64> {
        None
    }
}

/// Explicit assignment of values to variables.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Solution {
    values: HashMap<VariableId, f64>,
}

impl Solution {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, variable: &Variable, value: f64) {
        self.values.insert(variable.id(), value);
    }

    #[must_use]
    pub fn get(&self, variable: &Variable) -> Option<f64> {
        self.values.get(&variable.id()).copied()
    }

    #[must_use]
    pub fn contains(&self, variable: &Variable) -> bool {
        self.values.contains_key(&variable.id())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Copy every value of `other` into `self`, overwriting on conflict.
    pub fn extend(&mut self, other: &Solution) {
        self.values.extend(other.values.iter().map(|(k, v)| (*k, *v)));
    }
}

impl ValueSource for Solution {
    fn variable_value(&self, variable: &Variable) -> Option<f64> {
        self.get(variable)
    }
}

/// Pinned values answer both variable and symbol lookups by name.
impl ValueSource for FixedValues {
    fn variable_value(&self, variable: &Variable) -> Option<f64> {
        self.get(variable.name()).copied()
    }

    fn symbol_value(&self, name: &str) -> Option<f64> {
        self.get(name).copied()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    symbol: String,
    fixed: Option<Vec<(String, u64)>>,
}

impl CacheKey {
    fn new(symbol: &str, fixed: Option<&FixedValues>) -> Self {
        Self {
            symbol: symbol.to_string(),
            fixed: fixed.filter(|values| !values.is_empty()).map(|values| {
                values
                    .iter()
                    .map(|(name, value)| (name.clone(), value.to_bits()))
                    .collect()
            }),
        }
    }
}

/// View of a registered variable together with its loaded result.
#[derive(Debug, Clone, Copy)]
pub struct Token<'a> {
    pub variable: &'a Variable,
    pub result: Option<f64>,
}

/// Registry of model variables.
#[derive(Default)]
pub struct TokenTable {
    variables: Vec<Variable>,
    by_name: HashMap<String, usize>,
    by_id: HashMap<VariableId, usize>,
    solution: Option<Solution>,
    cache: RefCell<HashMap<CacheKey, f64>>,
}

impl TokenTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a variable.
    ///
    /// Adding the same variable twice is a no-op.
    ///
    /// # Errors
    ///
    /// Returns `DuplicateVariable` when a different variable already uses the
    /// name.
    pub fn add(&mut self, variable: &Variable) -> Result<(), ModelError> {
        if self.by_id.contains_key(&variable.id()) {
            return Ok(());
        }
        if self.by_name.contains_key(variable.name()) {
            return Err(ModelError::DuplicateVariable {
                name: variable.name().to_string(),
            });
        }
        let index = self.variables.len();
        self.by_name.insert(variable.name().to_string(), index);
        self.by_id.insert(variable.id(), index);
        self.variables.push(variable.clone());
        Ok(())
    }

    /// Register several variables, stopping at the first failure.
    ///
    /// # Errors
    ///
    /// See [`TokenTable::add`].
    pub fn add_all<'a, I>(&mut self, variables: I) -> Result<(), ModelError>
    where
        I: IntoIterator<Item = &'a Variable>,
    {
        for variable in variables {
            self.add(variable)?;
        }
        Ok(())
    }

    #[must_use]
    pub fn contains(&self, variable: &Variable) -> bool {
        self.by_id.contains_key(&variable.id())
    }

    /// Look a registered variable up, together with its loaded result.
    #[must_use]
    pub fn find(&self, variable: &Variable) -> Option<Token<'_>> {
        let index = *self.by_id.get(&variable.id())?;
        let variable = &self.variables[index];
        Some(Token {
            variable,
            result: self.solution.as_ref().and_then(|s| s.get(variable)),
        })
    }

    #[must_use]
    pub fn find_by_name(&self, name: &str) -> Option<&Variable> {
        self.by_name.get(name).map(|index| &self.variables[*index])
    }

    pub fn variables(&self) -> impl Iterator<Item = &Variable> {
        self.variables.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.variables.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.variables.is_empty()
    }

    /// Load a solution. Every cached symbol value becomes stale.
    pub fn load_solution(&mut self, solution: Solution) {
        self.solution = Some(solution);
        self.cache.borrow_mut().clear();
    }

    /// Drop the loaded solution and the cache.
    pub fn clear_solution(&mut self) {
        self.solution = None;
        self.cache.borrow_mut().clear();
    }

    #[must_use]
    pub fn solution(&self) -> Option<&Solution> {
        self.solution.as_ref()
    }

    /// True once a solution has been loaded.
    #[must_use]
    pub fn cached_solution(&self) -> bool {
        self.solution.is_some()
    }

    /// Cache state of a symbol.
    ///
    /// `None` when caching does not apply (no solution loaded and no fixed
    /// values), `Some(true)` when a value is stored for the current solution
    /// (or fixed assignment), `Some(false)` when it still has to be computed.
    #[must_use]
    pub fn cached(&self, symbol: &str, fixed: Option<&FixedValues>) -> Option<bool> {
        let fixing = fixed.is_some_and(|values| !values.is_empty());
        if !fixing && !self.cached_solution() {
            return None;
        }
        Some(
            self.cache
                .borrow()
                .contains_key(&CacheKey::new(symbol, fixed)),
        )
    }

    /// Store a symbol value for the current solution (or fixed assignment).
    pub fn cache(&self, symbol: &str, fixed: Option<&FixedValues>, value: f64) {
        self.cache
            .borrow_mut()
            .insert(CacheKey::new(symbol, fixed), value);
    }

    #[must_use]
    pub fn cached_value(&self, symbol: &str, fixed: Option<&FixedValues>) -> Option<f64> {
        self.cache
            .borrow()
            .get(&CacheKey::new(symbol, fixed))
            .copied()
    }
}

impl ValueSource for TokenTable {
    fn variable_value(&self, variable: &Variable) -> Option<f64> {
        self.solution.as_ref().and_then(|s| s.get(variable))
    }

    fn symbol_value(&self, name: &str) -> Option<f64> {
        self.cached_value(name, None)
    }
}

/// Evaluation view used while preparing or registering under fixed values.
///
/// Fixed values win over the token table; symbol lookups go to the cache slot
/// of the same fixed assignment.
#[derive(Clone, Copy)]
pub enum ValueView<'a> {
    Table(&'a TokenTable),
    Fixed {
        fixed: &'a FixedValues,
        tokens: &'a TokenTable,
    },
}

impl<'a> ValueView<'a> {
    /// Pick the fixed view when `fixed` is non-empty.
    #[must_use]
    pub fn new(fixed: Option<&'a FixedValues>, tokens: &'a TokenTable) -> Self {
        match fixed {
            Some(fixed) if !fixed.is_empty() => ValueView::Fixed { fixed, tokens },
            _ => ValueView::Table(tokens),
        }
    }

    #[must_use]
    pub fn fixed(&self) -> Option<&'a FixedValues> {
        match self {
            ValueView::Table(_) => None,
            ValueView::Fixed { fixed, .. } => Some(fixed),
        }
    }
}

impl ValueSource for ValueView<'_> {
    fn variable_value(&self, variable: &Variable) -> Option<f64> {
        match self {
            ValueView::Table(tokens) => tokens.variable_value(variable),
            ValueView::Fixed { fixed, tokens } => fixed
                .get(variable.name())
                .copied()
                .or_else(|| tokens.variable_value(variable)),
        }
    }

    fn symbol_value(&self, name: &str) -> Option<f64> {
        match self {
            ValueView::Table(tokens) => tokens.symbol_value(name),
            ValueView::Fixed { fixed, tokens } => fixed
                .get(name)
                .copied()
                .or_else(|| tokens.cached_value(name, Some(fixed))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_is_idempotent_for_same_variable() {
        let mut tokens = TokenTable::new();
        let x = Variable::real("x");
        tokens.add(&x).unwrap();
        tokens.add(&x).unwrap();
        assert_eq!(tokens.len(), 1);
    }

    #[test]
    fn test_add_rejects_name_clash() {
        let mut tokens = TokenTable::new();
        tokens.add(&Variable::real("x")).unwrap();
        let result = tokens.add(&Variable::real("x"));
        assert!(matches!(result, Err(ModelError::DuplicateVariable { .. })));
    }

    #[test]
    fn test_cache_states() {
        let mut tokens = TokenTable::new();
        assert_eq!(tokens.cached("s", None), None);

        tokens.load_solution(Solution::new());
        assert_eq!(tokens.cached("s", None), Some(false));

        tokens.cache("s", None, 2.0);
        assert_eq!(tokens.cached("s", None), Some(true));
        assert_eq!(tokens.symbol_value("s"), Some(2.0));

        tokens.load_solution(Solution::new());
        assert_eq!(tokens.cached("s", None), Some(false));
    }

    #[test]
    fn test_fixed_cache_is_keyed_by_assignment() {
        let tokens = TokenTable::new();
        let mut fixed = FixedValues::new();
        fixed.insert("x".into(), 1.0);
        assert_eq!(tokens.cached("s", Some(&fixed)), Some(false));

        tokens.cache("s", Some(&fixed), 3.0);
        assert_eq!(tokens.cached("s", Some(&fixed)), Some(true));

        fixed.insert("x".into(), 2.0);
        assert_eq!(tokens.cached("s", Some(&fixed)), Some(false));
    }

    #[test]
    fn test_fixed_view_prefers_fixed_values() {
        let mut tokens = TokenTable::new();
        let x = Variable::real("x");
        tokens.add(&x).unwrap();
        let mut solution = Solution::new();
        solution.set(&x, 1.0);
        tokens.load_solution(solution);

        let mut fixed = FixedValues::new();
        fixed.insert("x".into(), 5.0);
        assert_eq!(ValueView::new(Some(&fixed), &tokens).variable_value(&x), Some(5.0));
        assert_eq!(ValueView::new(None, &tokens).variable_value(&x), Some(1.0));
        assert_eq!(tokens.find(&x).and_then(|t| t.result), Some(1.0));
    }
}
