//! Discriminated union of branches: exactly one branch is active.

use std::cell::{Cell, OnceCell};

use tracing::debug;

use super::masking::MaskingFunction;
use super::{
    application_failed, dependencies_of, prepare_owned, prepare_with, Assignment, FunctionSymbol,
    Header, SymbolRef,
};
use crate::domain::range::is_zero;
use crate::domain::{
    FixedValues, LinearModel, LinearPolynomial, Solution, TokenTable, ValueRange, ValueSource,
    Variable,
};
use crate::error::Result;

/// One arm of a [`OneOfFunction`].
///
/// A branch without a condition is selected by a binary owned by the
/// branch's masking symbol.
#[derive(Debug, Clone)]
pub struct Branch {
    pub condition: Option<LinearPolynomial>,
    pub value: LinearPolynomial,
}

impl Branch {
    pub fn new(condition: impl Into<LinearPolynomial>, value: impl Into<LinearPolynomial>) -> Self {
        Self {
            condition: Some(condition.into()),
            value: value.into(),
        }
    }

    /// A branch the solver is free to select.
    pub fn free(value: impl Into<LinearPolynomial>) -> Self {
        Self {
            condition: None,
            value: value.into(),
        }
    }
}

/// The value of the single active branch.
///
/// Every branch value passes through a masking symbol; the masks sum to one
/// and the result is the sum of the masked values.
pub struct OneOfFunction {
    header: Header,
    branches: Vec<Branch>,
    range: Cell<ValueRange>,
    built: OnceCell<Vec<MaskingFunction>>,
}

impl OneOfFunction {
    pub fn new(branches: Vec<Branch>, name: impl Into<String>) -> Self {
        let range = Cell::new(Self::value_range(&branches));
        Self {
            header: Header::new(name),
            branches,
            range,
            built: OnceCell::new(),
        }
    }

    /// `then` when `condition` is 1, `otherwise` when it is 0.
    pub fn if_else(
        condition: impl Into<LinearPolynomial>,
        then: impl Into<LinearPolynomial>,
        otherwise: impl Into<LinearPolynomial>,
        name: impl Into<String>,
    ) -> Self {
        let condition = condition.into();
        let negated = LinearPolynomial::from(1.0) - condition.clone();
        Self::new(
            vec![Branch::new(condition, then), Branch::new(negated, otherwise)],
            name,
        )
    }

    #[must_use]
    pub fn branches(&self) -> &[Branch] {
        &self.branches
    }

    fn value_range(branches: &[Branch]) -> ValueRange {
        branches
            .iter()
            .map(|branch| branch.value.range())
            .reduce(|acc, range| acc.union(&range))
            .unwrap_or(ValueRange::ZERO)
    }

    fn build(&self) -> &[MaskingFunction] {
        self.built.get_or_init(|| {
            debug!(symbol = %self.header.name, branches = self.branches.len(), "building branch masks");
            self.branches
                .iter()
                .enumerate()
                .map(|(i, branch)| {
                    MaskingFunction::new(
                        branch.value.clone(),
                        branch.condition.clone(),
                        self.header.child(format_args!("branch_{i}")),
                    )
                    .with_parent(self.header.origin())
                })
                .collect()
        })
    }

    /// Index of the first branch whose mask is on. Branches with a free mask
    /// and no value are taken when no earlier branch is known to be on.
    fn active(&self, source: &dyn ValueSource) -> Option<usize> {
        let mut free = None;
        for (i, masking) in self.build().iter().enumerate() {
            match masking.mask_state(source) {
                Some(true) => return Some(i),
                Some(false) => {}
                None if self.branches[i].condition.is_none() => {
                    free.get_or_insert(i);
                }
                None => return None,
            }
        }
        free
    }

    fn assignment(&self, source: &dyn ValueSource) -> Option<Assignment> {
        let active = self.active(source)?;
        let mut assignment = Assignment::new(0.0);
        for (i, masking) in self.build().iter().enumerate() {
            let part = masking.assignment_with(i == active, source)?;
            if i == active {
                assignment.value = part.value;
            }
            assignment.auxiliaries.extend(part.auxiliaries);
        }
        Some(assignment)
    }
}

header_builders!(OneOfFunction);

impl FunctionSymbol for OneOfFunction {
    header_accessors!();

    fn discrete(&self) -> bool {
        self.branches.iter().all(|branch| branch.value.discrete())
    }

    fn range(&self) -> ValueRange {
        self.range.get()
    }

    fn dependencies(&self) -> Vec<SymbolRef> {
        dependencies_of(
            self.branches
                .iter()
                .flat_map(|branch| branch.condition.iter().chain(std::iter::once(&branch.value))),
        )
    }

    fn polynomial(&self) -> LinearPolynomial {
        self.build().iter().map(|masking| masking.polynomial()).sum()
    }

    fn auxiliary_variables(&self) -> Vec<Variable> {
        self.built
            .get()
            .map(|maskings| {
                maskings
                    .iter()
                    .flat_map(|masking| masking.auxiliary_variables())
                    .collect()
            })
            .unwrap_or_default()
    }

    fn flush(&self, force: bool) {
        for masking in self.build() {
            masking.flush(force);
        }
        self.range.set(Self::value_range(&self.branches));
    }

    fn prepare(
        &self,
        fixed: Option<&FixedValues>,
        tokens: &TokenTable,
        warm_start: &mut Solution,
    ) -> Option<f64> {
        let maskings = self.build();
        for masking in maskings {
            prepare_owned(masking, fixed, tokens, warm_start);
        }
        let value = prepare_with(&self.header.name, fixed, tokens, warm_start, |source| {
            self.assignment(source)
        })?;
        // Free masks only get a state once a branch is chosen.
        for masking in maskings {
            if let Some(part) = masking.polynomial().evaluate(&*warm_start, false) {
                tokens.cache(masking.name(), fixed, part);
            }
        }
        Some(value)
    }

    fn register_tokens(&self, tokens: &mut TokenTable) -> Result<()> {
        if self.branches.is_empty() {
            return Err(application_failed(&self.header.name, "needs at least one branch"));
        }
        for masking in self.build() {
            masking.register_tokens(tokens)?;
        }
        Ok(())
    }

    fn register_model(&self, model: &mut LinearModel) -> Result<()> {
        let maskings = self.build();
        for masking in maskings {
            masking.register_model(model)?;
        }
        model.add_constraint(
            maskings
                .iter()
                .map(MaskingFunction::mask)
                .sum::<LinearPolynomial>()
                .equals(1.0),
            self.header.child("one"),
            Some(self.header.origin()),
        )
    }

    fn register_model_fixed(&self, model: &mut LinearModel, fixed: &FixedValues) -> Result<()> {
        match self.assignment(fixed) {
            Some(assignment) => assignment.pin(model, &self.header),
            None => self.register_model(model),
        }
    }

    fn calculate_value(&self, source: &dyn ValueSource, zero_if_none: bool) -> Option<f64> {
        for (branch, masking) in self.branches.iter().zip(self.build()) {
            let mask = masking.mask().evaluate(source, zero_if_none)?;
            if !is_zero(mask) {
                return branch.value.evaluate(source, zero_if_none);
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbol::testing::Harness;
    use crate::symbol::IntoSymbol;

    #[test]
    fn test_if_else_picks_by_condition() {
        let c = Variable::binary("c");
        let a = Variable::integer("a").with_range(0.0, 10.0);
        let b = Variable::integer("b").with_range(-5.0, 5.0);
        let choice = OneOfFunction::if_else(&c, &a, &b, "choice").into_symbol();
        assert_eq!(choice.range(), ValueRange::spanning(-5.0, 10.0));
        let mut harness = Harness::new(choice, &[&c, &a, &b]);
        assert_eq!(harness.at(&[(&c, 1.0), (&a, 7.0), (&b, -3.0)]), 7.0);
        assert_eq!(harness.at(&[(&c, 0.0), (&a, 7.0), (&b, -3.0)]), -3.0);
    }

    #[test]
    fn test_explicit_conditions_sum_to_one() {
        let p = Variable::binary("p");
        let q = Variable::binary("q");
        let x = Variable::real("x").with_range(1.0, 2.0);
        let union = OneOfFunction::new(
            vec![Branch::new(&p, &x), Branch::new(&q, LinearPolynomial::from(4.0))],
            "union",
        )
        .into_symbol();
        let mut harness = Harness::new(union, &[&p, &q, &x]);
        assert_eq!(harness.at(&[(&p, 0.0), (&q, 1.0), (&x, 1.5)]), 4.0);
        assert!(harness
            .model
            .constraints()
            .iter()
            .any(|c| c.name == "union_one"));
    }

    #[test]
    fn test_free_branches_warm_start_first() {
        let x = Variable::real("x").with_range(0.0, 3.0);
        let union = OneOfFunction::new(
            vec![Branch::free(&x), Branch::free(LinearPolynomial::from(2.0))],
            "union",
        )
        .into_symbol();
        let mut model = LinearModel::new();
        model.tokens_mut().add(&x).unwrap();
        model.add_symbol(&union).unwrap();

        let mut solution = Solution::new();
        solution.set(&x, 1.0);
        model.tokens_mut().load_solution(solution.clone());
        let mut warm = solution;
        assert_eq!(union.prepare_and_cache(None, model.tokens(), &mut warm), Some(1.0));
        assert!(model.check(&warm).is_empty());
        assert_eq!(union.calculate_value(&warm, false), Some(1.0));
        assert_eq!(model.tokens().cached_value("union_branch_0", None), Some(1.0));
        assert_eq!(model.tokens().cached_value("union_branch_1", None), Some(0.0));
    }

    #[test]
    fn test_prepare_caches_branch_masks() {
        let c = Variable::binary("c");
        let a = Variable::integer("a").with_range(0.0, 10.0);
        let b = Variable::integer("b").with_range(-5.0, 5.0);
        let choice = OneOfFunction::if_else(&c, &a, &b, "choice").into_symbol();
        let mut model = LinearModel::new();
        model.tokens_mut().add_all([&c, &a, &b]).unwrap();
        model.add_symbol(&choice).unwrap();

        let mut solution = Solution::new();
        solution.set(&c, 0.0);
        solution.set(&a, 7.0);
        solution.set(&b, -3.0);
        model.tokens_mut().load_solution(solution.clone());
        let mut warm = solution;
        assert_eq!(choice.prepare_and_cache(None, model.tokens(), &mut warm), Some(-3.0));
        assert_eq!(model.tokens().cached_value("choice_branch_0", None), Some(0.0));
        assert_eq!(model.tokens().cached_value("choice_branch_1", None), Some(-3.0));
        assert!(model.check(&warm).is_empty());
    }

    #[test]
    fn test_condition_outside_unit_interval_fails() {
        let c = Variable::uinteger("c").with_range(0.0, 3.0);
        let x = Variable::real("x").with_range(0.0, 1.0);
        let union = OneOfFunction::new(vec![Branch::new(&c, &x)], "union");
        let mut tokens = TokenTable::new();
        assert!(union.register_tokens(&mut tokens).unwrap_err().is_application_failed());
    }
}
