//! Trait definitions for the backends a [`LinearModel`](crate::domain::LinearModel)
//! is handed to.
//!
//! Symbols only emit variables and constraints; solving is delegated to an
//! adapter implementing [`Solver`].

mod solver;

pub use solver::{Objective, ObjectiveSense, SolveOutcome, Solver};
