//! Univariate piecewise-linear functions (lambda method) and the sigmoid
//! approximation built on them.

use std::cell::{Cell, OnceCell};

use tracing::debug;

use super::{
    application_failed, prepare_owned, prepare_with, Assignment, FunctionSymbol, Header,
    SymbolRef,
};
use crate::domain::range::TOLERANCE;
use crate::domain::{
    FixedValues, LinearModel, LinearPolynomial, Point2, Solution, TokenTable, ValueRange,
    ValueSource, Variable,
};
use crate::error::Result;

struct Built {
    /// One weight per breakpoint.
    k: Vec<Variable>,
    /// One selector per segment.
    b: Vec<Variable>,
}

/// `y = f(x)` for `f` linear between consecutive breakpoints.
///
/// Encoded with one percentage weight per breakpoint and one binary per
/// segment: `x = Σ kᵢ·xᵢ`, `y = Σ kᵢ·yᵢ`, `Σk = 1`, `Σb = 1`, and
/// `kᵢ ≤ bᵢ₋₁ + bᵢ` so only the two ends of the selected segment carry weight.
pub struct UnivariatePiecewiseFunction {
    header: Header,
    x: LinearPolynomial,
    points: Vec<Point2>,
    range: Cell<ValueRange>,
    built: OnceCell<Built>,
}

fn points_range(points: &[Point2]) -> ValueRange {
    points
        .iter()
        .map(|p| ValueRange::point(p.y))
        .reduce(|acc, r| acc.union(&r))
        .unwrap_or(ValueRange::ZERO)
}

impl UnivariatePiecewiseFunction {
    /// Breakpoints are sorted by `x`.
    pub fn new(x: impl Into<LinearPolynomial>, points: Vec<Point2>, name: impl Into<String>) -> Self {
        let mut points = points;
        points.sort_by(|a, b| a.x.total_cmp(&b.x));
        let range = Cell::new(points_range(&points));
        Self {
            header: Header::new(name),
            x: x.into(),
            points,
            range,
            built: OnceCell::new(),
        }
    }

    #[must_use]
    pub fn points(&self) -> &[Point2] {
        &self.points
    }

    fn build(&self) -> &Built {
        self.built.get_or_init(|| {
            let k = (0..self.points.len())
                .map(|i| Variable::percentage(self.header.child(format_args!("k_{i}"))))
                .collect();
            let b = (0..self.points.len().saturating_sub(1))
                .map(|i| Variable::binary(self.header.child(format_args!("b_{i}"))))
                .collect();
            debug!(
                symbol = %self.header.name,
                breakpoints = self.points.len(),
                "built piecewise weights"
            );
            Built { k, b }
        })
    }

    /// Breakpoint weights `k`.
    pub fn weights(&self) -> Vec<Variable> {
        self.build().k.clone()
    }

    /// Segment selectors `b`, in breakpoint order.
    pub fn segment_indicators(&self) -> Vec<Variable> {
        self.build().b.clone()
    }

    /// Segment containing `x` and the position inside it.
    fn segment(&self, x: f64) -> Option<(usize, f64)> {
        let n = self.points.len();
        if n < 2 {
            return None;
        }
        if x < self.points[0].x - TOLERANCE || x > self.points[n - 1].x + TOLERANCE {
            return None;
        }
        let i = self
            .points
            .iter()
            .rposition(|p| p.x <= x + TOLERANCE)
            .unwrap_or(0)
            .min(n - 2);
        let (p, q) = (self.points[i], self.points[i + 1]);
        let width = q.x - p.x;
        let t = if width > TOLERANCE {
            ((x - p.x) / width).clamp(0.0, 1.0)
        } else {
            0.0
        };
        Some((i, t))
    }

    fn interpolate(&self, x: f64) -> Option<f64> {
        let (i, t) = self.segment(x)?;
        let (p, q) = (self.points[i], self.points[i + 1]);
        Some(p.y + t * (q.y - p.y))
    }

    fn assignment(&self, source: &dyn ValueSource) -> Option<Assignment> {
        let x = self.x.evaluate(source, false)?;
        let (segment, t) = self.segment(x)?;
        let built = self.build();
        let mut assignment = Assignment::new(self.interpolate(x)?);
        for (i, k) in built.k.iter().enumerate() {
            let weight = if i == segment {
                1.0 - t
            } else if i == segment + 1 {
                t
            } else {
                0.0
            };
            assignment.push(k, weight);
        }
        for (i, b) in built.b.iter().enumerate() {
            assignment.push(b, if i == segment { 1.0 } else { 0.0 });
        }
        Some(assignment)
    }

    fn validate(&self) -> Result<()> {
        if self.points.len() < 2 {
            return Err(application_failed(
                &self.header.name,
                format!("needs at least two breakpoints, got {}", self.points.len()),
            ));
        }
        if let Some(pair) = self
            .points
            .windows(2)
            .find(|pair| pair[1].x - pair[0].x <= TOLERANCE)
        {
            return Err(application_failed(
                &self.header.name,
                format!("duplicate breakpoint at x = {}", pair[0].x),
            ));
        }
        if self.points.iter().any(|p| !p.x.is_finite() || !p.y.is_finite()) {
            return Err(application_failed(
                &self.header.name,
                "breakpoints must be finite",
            ));
        }
        Ok(())
    }
}

header_builders!(UnivariatePiecewiseFunction);

impl FunctionSymbol for UnivariatePiecewiseFunction {
    header_accessors!();

    fn discrete(&self) -> bool {
        false
    }

    fn range(&self) -> ValueRange {
        self.range.get()
    }

    fn dependencies(&self) -> Vec<SymbolRef> {
        self.x.dependencies()
    }

    fn polynomial(&self) -> LinearPolynomial {
        let built = self.build();
        LinearPolynomial::weighted(self.points.iter().zip(&built.k).map(|(p, k)| (p.y, k)))
    }

    fn auxiliary_variables(&self) -> Vec<Variable> {
        self.built
            .get()
            .map(|built| built.k.iter().chain(&built.b).cloned().collect())
            .unwrap_or_default()
    }

    fn flush(&self, force: bool) {
        self.x.flush(force);
        self.range.set(points_range(&self.points));
    }

    fn prepare(
        &self,
        fixed: Option<&FixedValues>,
        tokens: &TokenTable,
        warm_start: &mut Solution,
    ) -> Option<f64> {
        prepare_with(&self.header.name, fixed, tokens, warm_start, |source| {
            self.assignment(source)
        })
    }

    fn register_tokens(&self, tokens: &mut TokenTable) -> Result<()> {
        self.validate()?;
        let built = self.build();
        tokens.add_all(&built.k)?;
        tokens.add_all(&built.b)?;
        Ok(())
    }

    fn register_model(&self, model: &mut LinearModel) -> Result<()> {
        let built = self.build();
        let origin = Some(self.header.origin());
        let xs = LinearPolynomial::weighted(self.points.iter().zip(&built.k).map(|(p, k)| (p.x, k)));
        model.add_constraint(self.x.clone().equals(xs), self.header.child("x"), origin)?;
        model.add_constraint(
            built.k.iter().sum::<LinearPolynomial>().equals(1.0),
            self.header.child("k"),
            origin,
        )?;
        model.add_constraint(
            built.b.iter().sum::<LinearPolynomial>().equals(1.0),
            self.header.child("b"),
            origin,
        )?;
        let last = built.b.len();
        for (i, k) in built.k.iter().enumerate() {
            let mut adjacent = LinearPolynomial::new();
            if i > 0 {
                adjacent = adjacent + &built.b[i - 1];
            }
            if i < last {
                adjacent = adjacent + &built.b[i];
            }
            model.add_constraint(
                LinearPolynomial::from(k).leq(adjacent),
                self.header.child(format_args!("adj_{i}")),
                origin,
            )?;
        }
        Ok(())
    }

    fn register_model_fixed(&self, model: &mut LinearModel, fixed: &FixedValues) -> Result<()> {
        match self.assignment(fixed) {
            Some(assignment) => assignment.pin(model, &self.header),
            None => self.register_model(model),
        }
    }

    fn calculate_value(&self, source: &dyn ValueSource, zero_if_none: bool) -> Option<f64> {
        let x = self.x.evaluate(source, zero_if_none)?;
        self.interpolate(x)
    }
}

/// Breakpoint set of [`SigmoidFunction`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SigmoidPrecision {
    /// Eleven breakpoints.
    #[default]
    Full,
    /// Seven breakpoints.
    Half,
}

/// Default distance from 0 and 1 of the outermost sampled sigmoid values.
pub const SIGMOID_DECIMAL_PRECISION: f64 = 1e-5;

fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

fn logit(y: f64) -> f64 {
    -((1.0 - y) / y).ln()
}

/// Piecewise-linear approximation of `1 / (1 + e^{-x})`.
pub struct SigmoidFunction {
    header: Header,
    x: LinearPolynomial,
    inner: UnivariatePiecewiseFunction,
}

impl SigmoidFunction {
    pub fn new(x: impl Into<LinearPolynomial>, precision: SigmoidPrecision, name: impl Into<String>) -> Self {
        let header = Header::new(name);
        let x = x.into();
        let inner = UnivariatePiecewiseFunction::new(
            x.clone(),
            Self::points(precision, SIGMOID_DECIMAL_PRECISION),
            header.child("piecewise"),
        )
        .with_parent(header.name.clone());
        Self { header, x, inner }
    }

    /// Breakpoints for a precision level. `decimal_precision` is the distance
    /// of the outermost sampled values from 0 and 1.
    #[must_use]
    pub fn points(precision: SigmoidPrecision, decimal_precision: f64) -> Vec<Point2> {
        let reach = 1.0 / decimal_precision;
        match precision {
            SigmoidPrecision::Full => vec![
                Point2::new(-reach, 0.0),
                Point2::new(logit(decimal_precision), decimal_precision),
                Point2::new(-4.0, sigmoid(-4.0)),
                Point2::new(-2.0, sigmoid(-2.0)),
                Point2::new(logit(0.2), 0.2),
                Point2::new(0.0, 0.5),
                Point2::new(logit(0.8), 0.8),
                Point2::new(2.0, sigmoid(2.0)),
                Point2::new(4.0, sigmoid(4.0)),
                Point2::new(logit(1.0 - decimal_precision), 1.0 - decimal_precision),
                Point2::new(reach, 1.0),
            ],
            SigmoidPrecision::Half => vec![
                Point2::new(-reach, 0.0),
                Point2::new(-4.0, sigmoid(-4.0)),
                Point2::new(-2.0, sigmoid(-2.0)),
                Point2::new(0.0, 0.5),
                Point2::new(2.0, sigmoid(2.0)),
                Point2::new(4.0, sigmoid(4.0)),
                Point2::new(reach, 1.0),
            ],
        }
    }
}

header_builders!(SigmoidFunction);

impl FunctionSymbol for SigmoidFunction {
    header_accessors!();

    fn discrete(&self) -> bool {
        false
    }

    fn range(&self) -> ValueRange {
        self.inner.range()
    }

    fn dependencies(&self) -> Vec<SymbolRef> {
        self.x.dependencies()
    }

    fn polynomial(&self) -> LinearPolynomial {
        self.inner.polynomial()
    }

    fn auxiliary_variables(&self) -> Vec<Variable> {
        self.inner.auxiliary_variables()
    }

    fn flush(&self, force: bool) {
        self.inner.flush(force);
    }

    fn prepare(
        &self,
        fixed: Option<&FixedValues>,
        tokens: &TokenTable,
        warm_start: &mut Solution,
    ) -> Option<f64> {
        prepare_owned(&self.inner, fixed, tokens, warm_start);
        prepare_with(&self.header.name, fixed, tokens, warm_start, |source| {
            self.calculate_value(source, false).map(Assignment::new)
        })
    }

    fn register_tokens(&self, tokens: &mut TokenTable) -> Result<()> {
        self.inner.register_tokens(tokens)
    }

    fn register_model(&self, model: &mut LinearModel) -> Result<()> {
        self.inner.register_model(model)
    }

    fn register_model_fixed(&self, model: &mut LinearModel, fixed: &FixedValues) -> Result<()> {
        self.inner.register_model_fixed(model, fixed)
    }

    fn calculate_value(&self, source: &dyn ValueSource, zero_if_none: bool) -> Option<f64> {
        self.inner.calculate_value(source, zero_if_none)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbol::testing::Harness;
    use crate::symbol::IntoSymbol;

    fn tent(x: &Variable) -> UnivariatePiecewiseFunction {
        UnivariatePiecewiseFunction::new(
            x,
            vec![
                Point2::new(4.0, 0.0),
                Point2::new(0.0, 0.0),
                Point2::new(2.0, 4.0),
            ],
            "tent",
        )
    }

    #[test]
    fn test_points_are_sorted() {
        let x = Variable::real("x").with_range(0.0, 4.0);
        let f = tent(&x);
        let xs: Vec<f64> = f.points().iter().map(|p| p.x).collect();
        assert_eq!(xs, vec![0.0, 2.0, 4.0]);
        assert_eq!(f.range(), ValueRange::new(0.0, 4.0).unwrap());
    }

    #[test]
    fn test_interpolation_matches_encoding() {
        let x = Variable::real("x").with_range(0.0, 4.0);
        let mut harness = Harness::new(tent(&x).into_symbol(), &[&x]);
        assert_eq!(harness.at(&[(&x, 0.0)]), 0.0);
        assert_eq!(harness.at(&[(&x, 1.0)]), 2.0);
        assert_eq!(harness.at(&[(&x, 2.0)]), 4.0);
        assert_eq!(harness.at(&[(&x, 3.0)]), 2.0);
        assert_eq!(harness.at(&[(&x, 4.0)]), 0.0);
    }

    #[test]
    fn test_outside_breakpoints_is_unknown() {
        let x = Variable::real("x");
        let f = tent(&x);
        let mut solution = Solution::new();
        solution.set(&x, 5.0);
        assert_eq!(f.calculate_value(&solution, false), None);
    }

    #[test]
    fn test_duplicate_breakpoint_fails() {
        let x = Variable::real("x");
        let f = UnivariatePiecewiseFunction::new(
            &x,
            vec![Point2::new(0.0, 0.0), Point2::new(0.0, 1.0)],
            "dup",
        );
        let mut tokens = TokenTable::new();
        assert!(f.register_tokens(&mut tokens).unwrap_err().is_application_failed());
    }

    #[test]
    fn test_sigmoid_breakpoints() {
        let full = SigmoidFunction::points(SigmoidPrecision::Full, SIGMOID_DECIMAL_PRECISION);
        let half = SigmoidFunction::points(SigmoidPrecision::Half, SIGMOID_DECIMAL_PRECISION);
        assert_eq!(full.len(), 11);
        assert_eq!(half.len(), 7);
        assert!(full.windows(2).all(|w| w[0].x < w[1].x));
        assert!(full.windows(2).all(|w| w[0].y <= w[1].y));
    }

    #[test]
    fn test_sigmoid_value_at_breakpoints() {
        let x = Variable::real("x").with_range(-10.0, 10.0);
        let sig = SigmoidFunction::new(&x, SigmoidPrecision::Half, "sig").into_symbol();
        let mut harness = Harness::new(sig, &[&x]);
        assert!((harness.at(&[(&x, 0.0)]) - 0.5).abs() < 1e-12);
        assert!((harness.at(&[(&x, 2.0)]) - sigmoid(2.0)).abs() < 1e-12);
    }
}
