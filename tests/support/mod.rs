#![allow(dead_code)]

pub mod assertions;
pub mod equivalence;
pub mod model;
