//! Implementations of ports.

mod highs;

pub use highs::HighsSolver;
