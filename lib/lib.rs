#![allow(non_snake_case)]
#![allow(clippy::needless_return)]

//! Checks user-supplied probability densities on $`[0, 1]`$ and draws samples
//! from them by inverse-CDF search.
//!
//! A density is accepted only if its midpoint-rule integral over the unit
//! interval is within a small tolerance of one (see [`validate`]). Accepted
//! densities can be sampled by walking the same quadrature forward from zero
//! until a uniform draw is reached (see [`math::probability`]), and the draws
//! binned for comparison against the density itself (see
//! [`math::histogram`]). [`session::Session`] ties these together for
//! interactive use.

pub mod error;
pub mod expr;
pub mod math;
pub mod validate;
pub mod settings;
pub mod status;
pub mod curve;
pub mod session;

#[cfg(feature = "config")]
pub mod config;
