//! Checks that a candidate density integrates to one over $`[0, 1]`$.
//!
//! Nothing that goes wrong while compiling or evaluating the candidate escapes
//! [`validate`]: every failure is folded into an [`Invalid`] outcome.

use std::time::{
    Duration,
    Instant,
};
use serde::Serialize;
use thiserror::Error;
use tracing::{
    debug,
    info,
};
use crate::{
    expr::{
        CompileError,
        Compiler,
        EvalError,
        Evaluator,
    },
    math::integrate::{
        self,
        IntegrateError,
        DEFAULT_STEP,
    },
};

/// Largest accepted deviation of the integral from one.
pub const DEFAULT_TOLERANCE: f64 = 1e-3;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ValidateOptions {
    /// Integration step (default 0.01)
    pub step: f64,

    /// Largest accepted value of $`|I - 1|`$ (default 0.001)
    pub tolerance: f64,
}

impl Default for ValidateOptions {
    fn default() -> Self {
        Self { step: DEFAULT_STEP, tolerance: DEFAULT_TOLERANCE }
    }
}

/// Reasons a candidate is rejected.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum Invalid {
    #[error("could not parse: {0}")]
    Parse(#[from] CompileError),

    #[error("{0}")]
    Eval(#[from] EvalError),

    #[error("integral [0,1] is not finite: {integral}")]
    NonFinite { integral: f64 },

    #[error("integral [0,1] = {integral}")]
    NotNormalized { integral: f64 },

    #[error("{0}")]
    Quadrature(#[from] IntegrateError),
}

/// An accepted density.
#[derive(Clone, Debug)]
pub struct Valid<T> {
    pub density: T,
    pub integral: f64,

    /// Wall-clock time taken by the whole check, compilation included.
    pub elapsed: Duration,
}

#[derive(Clone, Debug)]
pub enum Validation<T> {
    Valid(Valid<T>),
    Invalid(Invalid),
}

/// Display-ready summary of a [`Validation`].
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Report {
    pub ok: bool,
    pub message: String,
    pub integral: Option<f64>,
    pub elapsed_ms: Option<f64>,
}

impl<T> Validation<T> {
    pub fn is_valid(&self) -> bool { matches!(self, Self::Valid(_)) }

    pub fn into_result(self) -> Result<Valid<T>, Invalid> {
        return match self {
            Self::Valid(valid) => Ok(valid),
            Self::Invalid(invalid) => Err(invalid),
        };
    }

    pub fn report(&self) -> Report {
        return match self {
            Self::Valid(valid) => {
                let ms: f64 = valid.elapsed.as_secs_f64() * 1e3;
                Report {
                    ok: true,
                    message: format!("Ok {:.3} ms", ms),
                    integral: Some(valid.integral),
                    elapsed_ms: Some(ms),
                }
            },
            Self::Invalid(invalid) => {
                let integral: Option<f64>
                    = match invalid {
                        Invalid::NonFinite { integral }
                            | Invalid::NotNormalized { integral }
                            => Some(*integral),
                        _ => None,
                    };
                Report {
                    ok: false,
                    message: invalid.to_string(),
                    integral,
                    elapsed_ms: None,
                }
            },
        };
    }
}

/// Integrate `density` over $`[0, 1]`$ and return the integral if it is
/// within `opts.tolerance` of one.
pub fn check_normalization<E>(density: &E, opts: &ValidateOptions)
    -> Result<f64, Invalid>
where E: Evaluator + ?Sized
{
    let integral: f64
        = integrate::try_integrate(
            |x| density.evaluate(x).map_err(Invalid::from),
            0.0,
            1.0,
            opts.step,
        )?;
    if !integral.is_finite() {
        return Err(Invalid::NonFinite { integral });
    }
    if (integral - 1.0).abs() > opts.tolerance {
        return Err(Invalid::NotNormalized { integral });
    }
    return Ok(integral);
}

/// Compile `text` and check that the result is a normalized density on
/// $`[0, 1]`$.
pub fn validate<C>(compiler: &C, text: &str, opts: &ValidateOptions)
    -> Validation<C::Output>
where C: Compiler
{
    let t0: Instant = Instant::now();
    let density: C::Output
        = match compiler.compile(text) {
            Ok(density) => density,
            Err(err) => {
                debug!(text, %err, "expression rejected by compiler");
                return Validation::Invalid(Invalid::Parse(err));
            },
        };
    return match check_normalization(&density, opts) {
        Ok(integral) => {
            let elapsed: Duration = t0.elapsed();
            info!(text, integral, ?elapsed, "density accepted");
            Validation::Valid(Valid { density, integral, elapsed })
        },
        Err(invalid) => {
            debug!(text, %invalid, "density rejected");
            Validation::Invalid(invalid)
        },
    };
}
