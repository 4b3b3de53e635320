//! Modeling collaborators consumed by the function symbols.

pub mod constraint;
pub mod geometry;
pub mod inequality;
pub mod model;
pub mod polynomial;
pub mod range;
pub mod token;
pub mod variable;

pub use constraint::{ConstraintSense, LinearConstraint};
pub use geometry::{grid_triangles, Point2, Point3, Triangle3};
pub use inequality::{LinearInequality, NormalizedInequality, Sign};
pub use model::{LinearModel, NamedConstraint};
pub use polynomial::{Cells, Item, LinearPolynomial, Monomial};
pub use range::ValueRange;
pub use token::{FixedValues, Solution, Token, TokenTable, ValueSource, ValueView};
pub use variable::{Variable, VariableId, VariableKind};
