//! Numerical routines underlying validation and sampling.

pub mod integrate;
pub mod probability;
pub mod histogram;
