//! Tunable parameters shared by validation, sampling, and display.
//!
//! Values default to those of the interactive tool; see [`crate::config`] for
//! loading them from a file.

use std::{
    fmt,
    str::FromStr,
};
use serde::{ Deserialize, Serialize };
use crate::{
    math::{
        integrate::DEFAULT_STEP,
        probability::InverseOptions,
    },
    mkerr,
    validate::{
        ValidateOptions,
        DEFAULT_TOLERANCE,
    },
};

mkerr!(
    PolicyError : {
        UnknownPolicy => "stale-sample policy must be one of 'keep', 'clear', or 'filter'",
    }
);

/// What happens to previously drawn samples when the density changes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StalePolicy {
    /// Samples from every density accumulate together.
    Keep,

    /// Samples are discarded whenever a new density is accepted.
    Clear,

    /// Samples are kept but only those drawn from the current density are
    /// binned.
    Filter,
}

impl FromStr for StalePolicy {
    type Err = PolicyError;

    fn from_str(s: &str) -> Result<Self, PolicyError> {
        return match s {
            "keep" => Ok(Self::Keep),
            "clear" => Ok(Self::Clear),
            "filter" => Ok(Self::Filter),
            _ => Err(PolicyError::UnknownPolicy),
        };
    }
}

impl fmt::Display for StalePolicy {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        return f.write_str(
            match self {
                Self::Keep => "keep",
                Self::Clear => "clear",
                Self::Filter => "filter",
            }
        );
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Settings {
    /// Midpoint-rule step for validation and sampling.
    pub step: f64,

    /// Allowed deviation of the integral over $`[0, 1]`$ from one.
    pub tolerance: f64,

    /// Inverse-CDF searches give up past this point.
    pub max_x: f64,

    /// Inverse-CDF searches give up after this many steps.
    pub max_iters: usize,

    /// Draws per chunk of a sampling batch.
    pub chunk_size: usize,

    /// Seed for the sampling RNG; drawn from the OS when absent.
    pub seed: Option<u64>,

    pub stale: StalePolicy,

    /// Initial histogram bucket count.
    pub buckets: usize,

    /// Upper end of the displayed density curve.
    pub curve_end: f64,
}

impl Default for Settings {
    fn default() -> Self {
        return Self {
            step: DEFAULT_STEP,
            tolerance: DEFAULT_TOLERANCE,
            max_x: 2.0,
            max_iters: 1_000_000,
            chunk_size: 1000,
            seed: None,
            stale: StalePolicy::Clear,
            buckets: 20,
            curve_end: 1.1,
        };
    }
}

impl Settings {
    pub fn validate_options(&self) -> ValidateOptions {
        return ValidateOptions { step: self.step, tolerance: self.tolerance };
    }

    pub fn inverse_options(&self) -> InverseOptions {
        return InverseOptions {
            step: self.step,
            max_x: self.max_x,
            max_iters: self.max_iters,
        };
    }
}
