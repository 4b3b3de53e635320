//! Piecewise-linear surfaces over a triangulation of the `(x, y)` plane.

use std::cell::OnceCell;

use tracing::debug;

use super::{
    application_failed, dependencies_of, prepare_with, Assignment, FunctionSymbol, Header,
    SymbolRef,
};
use crate::domain::geometry::AffineForm;
use crate::domain::{
    grid_triangles, FixedValues, LinearModel, LinearPolynomial, Solution, TokenTable, Triangle3,
    ValueRange, ValueSource, Variable,
};
use crate::error::Result;

struct Piece {
    /// Barycentric weight of `p2`.
    u: Variable,
    /// Barycentric weight of `p3`.
    v: Variable,
    /// Selects this triangle.
    w: Variable,
}

struct Built {
    pieces: Vec<Piece>,
    big_m: f64,
}

/// `z(x, y)` interpolated linearly inside the triangle containing `(x, y)`.
///
/// Per triangle `t` with barycentric forms `fu`, `fv`:
///
/// ```text
/// |u_t − fu(x, y)| ≤ M(1 − w_t)    |v_t − fv(x, y)| ≤ M(1 − w_t)
/// u_t + v_t ≤ w_t                  Σ w = 1
/// z = Σ p1.z·w_t + (p2.z − p1.z)·u_t + (p3.z − p1.z)·v_t
/// ```
/// `M` bounds every form over the bounding box of the vertices.
pub struct BivariatePiecewiseFunction {
    header: Header,
    x: LinearPolynomial,
    y: LinearPolynomial,
    triangles: Vec<Triangle3>,
    built: OnceCell<Built>,
}

impl BivariatePiecewiseFunction {
    pub fn new(
        x: impl Into<LinearPolynomial>,
        y: impl Into<LinearPolynomial>,
        triangles: Vec<Triangle3>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            header: Header::new(name),
            x: x.into(),
            y: y.into(),
            triangles,
            built: OnceCell::new(),
        }
    }

    /// Surface through `f` sampled on the grid `xs × ys`.
    pub fn grid<F>(
        x: impl Into<LinearPolynomial>,
        y: impl Into<LinearPolynomial>,
        xs: &[f64],
        ys: &[f64],
        f: F,
        name: impl Into<String>,
    ) -> Self
    where
        F: Fn(f64, f64) -> f64,
    {
        Self::new(x, y, grid_triangles(xs, ys, f), name)
    }

    #[must_use]
    pub fn triangles(&self) -> &[Triangle3] {
        &self.triangles
    }

    fn forms(&self) -> Vec<(AffineForm, AffineForm)> {
        self.triangles
            .iter()
            .filter_map(Triangle3::barycentric_forms)
            .collect()
    }

    /// `max |form|` over the corners of the vertices' bounding box, plus one.
    fn big_m(&self) -> f64 {
        let vertices = self.triangles.iter().flat_map(Triangle3::vertices);
        let (mut min_x, mut max_x, mut min_y, mut max_y) =
            (f64::INFINITY, f64::NEG_INFINITY, f64::INFINITY, f64::NEG_INFINITY);
        for p in vertices {
            min_x = min_x.min(p.x);
            max_x = max_x.max(p.x);
            min_y = min_y.min(p.y);
            max_y = max_y.max(p.y);
        }
        let corners = [(min_x, min_y), (min_x, max_y), (max_x, min_y), (max_x, max_y)];
        let bound = self
            .forms()
            .iter()
            .flat_map(|(u, v)| [u, v])
            .flat_map(|form| corners.iter().map(move |&(x, y)| form.at(x, y).abs()))
            .fold(0.0, f64::max);
        bound + 1.0
    }

    fn build(&self) -> &Built {
        self.built.get_or_init(|| {
            let big_m = self.big_m();
            debug!(
                symbol = %self.header.name,
                triangles = self.triangles.len(),
                big_m,
                "building triangulated surface"
            );
            let pieces = (0..self.triangles.len())
                .map(|i| Piece {
                    u: Variable::percentage(self.header.child(format_args!("u_{i}"))),
                    v: Variable::percentage(self.header.child(format_args!("v_{i}"))),
                    w: Variable::binary(self.header.child(format_args!("w_{i}"))),
                })
                .collect();
            Built { pieces, big_m }
        })
    }

    /// Index of the first triangle containing `(x, y)`.
    fn locate(&self, x: f64, y: f64) -> Option<usize> {
        self.triangles
            .iter()
            .position(|triangle| triangle.contains(x, y))
    }

    /// Operand values and the index of the triangle holding them.
    fn containing(
        &self,
        source: &dyn ValueSource,
        zero_if_none: bool,
    ) -> Option<(usize, f64, f64)> {
        let x = self.x.evaluate(source, zero_if_none)?;
        let y = self.y.evaluate(source, zero_if_none)?;
        let index = self.locate(x, y)?;
        Some((index, x, y))
    }

    fn assignment(&self, source: &dyn ValueSource) -> Option<Assignment> {
        let (index, x, y) = self.containing(source, false)?;
        let triangle = &self.triangles[index];
        let value = triangle.interpolate(x, y)?;
        let (u, v) = triangle.barycentric(x, y)?;
        let mut assignment = Assignment::new(value);
        for (i, piece) in self.build().pieces.iter().enumerate() {
            let selected = i == index;
            assignment.push(&piece.u, if selected { u.max(0.0) } else { 0.0 });
            assignment.push(&piece.v, if selected { v.max(0.0) } else { 0.0 });
            assignment.push(&piece.w, if selected { 1.0 } else { 0.0 });
        }
        Some(assignment)
    }
}

header_builders!(BivariatePiecewiseFunction);

impl FunctionSymbol for BivariatePiecewiseFunction {
    header_accessors!();

    fn discrete(&self) -> bool {
        false
    }

    fn range(&self) -> ValueRange {
        self.triangles
            .iter()
            .flat_map(Triangle3::vertices)
            .map(|p| ValueRange::point(p.z))
            .reduce(|acc, range| acc.union(&range))
            .unwrap_or(ValueRange::ZERO)
    }

    fn dependencies(&self) -> Vec<SymbolRef> {
        dependencies_of([&self.x, &self.y])
    }

    fn polynomial(&self) -> LinearPolynomial {
        let pieces = &self.build().pieces;
        let mut z = LinearPolynomial::new();
        for (triangle, piece) in self.triangles.iter().zip(pieces) {
            z = z
                + triangle.p1.z * &piece.w
                + (triangle.p2.z - triangle.p1.z) * &piece.u
                + (triangle.p3.z - triangle.p1.z) * &piece.v;
        }
        z
    }

    fn auxiliary_variables(&self) -> Vec<Variable> {
        self.built
            .get()
            .map(|built| {
                built
                    .pieces
                    .iter()
                    .flat_map(|piece| [piece.u.clone(), piece.v.clone(), piece.w.clone()])
                    .collect()
            })
            .unwrap_or_default()
    }

    fn flush(&self, force: bool) {
        self.x.flush(force);
        self.y.flush(force);
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
        if self.triangles.is_empty() {
            return Err(application_failed(&self.header.name, "needs at least one triangle"));
        }
        if let Some(i) = self.triangles.iter().position(Triangle3::is_degenerate) {
            return Err(application_failed(
                &self.header.name,
                format!("triangle {i} is degenerate"),
            ));
        }
        for piece in &self.build().pieces {
            tokens.add_all([&piece.u, &piece.v, &piece.w])?;
        }
        Ok(())
    }

    fn register_model(&self, model: &mut LinearModel) -> Result<()> {
        let built = self.build();
        let origin = Some(self.header.origin());
        let big_m = built.big_m;
        let forms = self.forms();
        for (i, ((form_u, form_v), piece)) in forms.into_iter().zip(&built.pieces).enumerate() {
            let slack = big_m * (LinearPolynomial::from(1.0) - &piece.w);
            for (name, weight, form) in [("u", &piece.u, form_u), ("v", &piece.v, form_v)] {
                let at = form.a * self.x.clone() + form.b * self.y.clone() + form.c;
                let gap = LinearPolynomial::from(weight) - at;
                model.add_constraint(
                    gap.clone().leq(slack.clone()),
                    self.header.child(format_args!("{name}_{i}_ub")),
                    origin,
                )?;
                model.add_constraint(
                    gap.geq(-1.0 * slack.clone()),
                    self.header.child(format_args!("{name}_{i}_lb")),
                    origin,
                )?;
            }
            model.add_constraint(
                (LinearPolynomial::from(&piece.u) + &piece.v).leq(&piece.w),
                self.header.child(format_args!("uv_{i}")),
                origin,
            )?;
        }
        model.add_constraint(
            built.pieces.iter().map(|piece| &piece.w).sum::<LinearPolynomial>().equals(1.0),
            self.header.child("w"),
            origin,
        )
    }

    fn register_model_fixed(&self, model: &mut LinearModel, fixed: &FixedValues) -> Result<()> {
        match self.assignment(fixed) {
            Some(assignment) => assignment.pin(model, &self.header),
            None => self.register_model(model),
        }
    }

    fn calculate_value(&self, source: &dyn ValueSource, zero_if_none: bool) -> Option<f64> {
        let (index, x, y) = self.containing(source, zero_if_none)?;
        self.triangles[index].interpolate(x, y)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Point3;
    use crate::symbol::testing::Harness;
    use crate::symbol::IntoSymbol;

    #[test]
    fn test_planar_surface_is_exact() {
        let x = Variable::real("x").with_range(0.0, 2.0);
        let y = Variable::real("y").with_range(0.0, 1.0);
        let surface =
            BivariatePiecewiseFunction::grid(&x, &y, &[0.0, 1.0, 2.0], &[0.0, 1.0], |x, y| {
                x + 2.0 * y
            }, "plane")
            .into_symbol();
        assert_eq!(surface.range(), ValueRange::spanning(0.0, 4.0));
        let mut harness = Harness::new(surface, &[&x, &y]);
        assert!((harness.at(&[(&x, 0.5), (&y, 0.5)]) - 1.5).abs() < 1e-9);
        assert!((harness.at(&[(&x, 2.0), (&y, 1.0)]) - 4.0).abs() < 1e-9);
        assert!((harness.at(&[(&x, 1.25), (&y, 0.1)]) - 1.45).abs() < 1e-9);
    }

    #[test]
    fn test_vertices_of_curved_surface() {
        let x = Variable::real("x").with_range(0.0, 2.0);
        let y = Variable::real("y").with_range(0.0, 2.0);
        let grid = [0.0, 1.0, 2.0];
        let surface = BivariatePiecewiseFunction::grid(&x, &y, &grid, &grid, |x, y| x * y, "product")
            .into_symbol();
        let mut harness = Harness::new(surface.clone(), &[&x, &y]);
        assert!((harness.at(&[(&x, 1.0), (&y, 1.0)]) - 1.0).abs() < 1e-9);
        assert!((harness.at(&[(&x, 2.0), (&y, 2.0)]) - 4.0).abs() < 1e-9);
        assert_eq!(surface.auxiliary_variables().len(), 8 * 3);
    }

    #[test]
    fn test_point_outside_has_no_value() {
        let x = Variable::real("x");
        let y = Variable::real("y");
        let triangle = Triangle3::new(
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 1.0),
            Point3::new(0.0, 1.0, 2.0),
        );
        let surface = BivariatePiecewiseFunction::new(&x, &y, vec![triangle], "tri");
        let mut solution = Solution::new();
        solution.set(&x, 0.9);
        solution.set(&y, 0.9);
        assert_eq!(surface.calculate_value(&solution, false), None);
        solution.set(&y, 0.1);
        assert!((surface.calculate_value(&solution, false).unwrap() - 1.1).abs() < 1e-9);
    }

    #[test]
    fn test_degenerate_triangle_fails() {
        let x = Variable::real("x");
        let y = Variable::real("y");
        let flat = Triangle3::new(
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 1.0, 1.0),
            Point3::new(2.0, 2.0, 2.0),
        );
        let surface = BivariatePiecewiseFunction::new(&x, &y, vec![flat], "flat");
        let mut tokens = TokenTable::new();
        assert!(surface.register_tokens(&mut tokens).unwrap_err().is_application_failed());
    }
}
