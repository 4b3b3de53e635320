//! mipform - linear reformulation of function symbols for mixed-integer models.
//!
//! A function symbol (absolute value, min/max, floor, boolean logic,
//! conditionals, piecewise functions, counting predicates, ...) is an object
//! over linear polynomials that can
//!
//! - report its value range and whether it is discrete,
//! - lazily introduce the auxiliary variables and constraints that reproduce
//!   its semantics inside a MIP,
//! - evaluate itself on a concrete assignment without a solver.
//!
//! # Modules
//!
//! - [`config`] - Logging setup and numeric symbol defaults loaded from TOML
//! - [`domain`] - Ranges, variables, polynomials, inequalities, token table
//!   and the linear model symbols register into
//! - [`symbol`] - The [`FunctionSymbol`](symbol::FunctionSymbol) contract and
//!   every symbol kind
//! - [`port`] - The [`Solver`](port::Solver) trait
//! - [`adapter`] - HiGHS backend via good_lp
//! - [`error`] - Error types for the crate
//!
//! # Example
//!
//! ```no_run
//! use mipform::domain::{LinearModel, Variable};
//! use mipform::symbol::{AbsFunction, IntoSymbol};
//!
//! let x = Variable::integer("x").with_range(-5.0, 5.0);
//! let abs = AbsFunction::new(&x, "abs_x").into_symbol();
//!
//! let mut model = LinearModel::new();
//! model.tokens_mut().add(&x)?;
//! model.add_symbol(&abs)?;
//! # Ok::<(), mipform::error::Error>(())
//! ```

pub mod adapter;
pub mod config;
pub mod domain;
pub mod error;
pub mod port;
pub mod symbol;
