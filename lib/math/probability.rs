//! Provides tools to draw random values from a continuous density given only
//! as a function, by numerically inverting its cumulative distribution.
//!
//! The density supplied by the user is taken at face value: its normalization
//! is not re-checked here (see [`crate::validate`] for that) and the search for
//! each sample simply walks the midpoint rule forward from zero until the
//! accumulated mass reaches the target. Because such a walk need not end for an
//! arbitrary function, it is bounded by [`InverseOptions`] and every way in
//! which a single draw can go wrong is reported as a [`SampleError`] rather
//! than a panic.

use std::fmt;
use rand::Rng;
use thiserror::Error;
use crate::{
    expr::{
        EvalError,
        Evaluator,
    },
    math::integrate::{
        MidpointSteps,
        DEFAULT_STEP,
    },
    mkerr,
};

mkerr!(
    ProbError : {
        BadProbability => "probabilities must be between 0 and 1",
    }
);
pub type ProbResult<T> = Result<T, ProbError>;

/// Represents a `f64` in the range $`[0, 1]`$.
///
/// The only ways to instantiate a `Probability` require that this condition be
/// satisfied; thus it is guaranteed to hold for any such object.
#[derive(Clone, Copy, PartialEq, PartialOrd, Debug)]
pub struct Probability {
    p: f64
}

impl Eq for Probability { }

impl Ord for Probability {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        // NaN is excluded by construction
        return self.p.total_cmp(&other.p);
    }
}

macro_rules! impl_probability_try_from(
    ( $type:ident ) => {
        impl TryFrom<$type> for Probability {
            type Error = ProbError;

            fn try_from(p: $type) -> ProbResult<Self> {
                return if (0.0..=1.0).contains(&p) {
                    Ok(Probability { p: p.into() })
                } else {
                    Err(ProbError::BadProbability)
                };
            }
        }

        impl TryFrom<&$type> for Probability {
            type Error = ProbError;

            fn try_from(p: &$type) -> ProbResult<Self> {
                return (*p).try_into();
            }
        }
    }
);
impl_probability_try_from!(f64);
impl_probability_try_from!(f32);

impl Probability {
    /// Create a new `Probability`. `p` must be between zero and one
    /// (inclusive).
    pub fn new<P>(p: P) -> ProbResult<Self>
    where P: TryInto<Probability, Error = ProbError>
    {
        return p.try_into();
    }

    /// Generate a `Probability` uniformly sampled over $`[0, 1)`$ from a
    /// given source.
    pub fn random_rng<R>(rng: &mut R) -> Self
    where R: Rng + ?Sized
    {
        return Probability { p: rng.gen::<f64>() };
    }

    /// Access the stored numerical value.
    pub fn p(&self) -> f64 { self.p }
}

impl fmt::Display for Probability {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        return write!(f, "P:{}", self.p());
    }
}

/// Ways in which a single inverse-CDF draw can fail.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum SampleError {
    #[error("sample: evaluation failed at x = {x}: {source}")]
    Eval { x: f64, source: EvalError },

    #[error("sample: density is not finite at x = {x}")]
    NonFinite { x: f64 },

    #[error(
        "sample: accumulated mass {acc} did not reach {target} before x = {x}"
    )]
    Exhausted { target: f64, acc: f64, x: f64 },

    #[error("sample: step size must be positive and finite")]
    BadStep,
}
pub type SampleResult<T> = Result<T, SampleError>;

/// Options to bound the forward walk of [`invert_cdf`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct InverseOptions {
    /// Integration step (default 0.01)
    pub step: f64,

    /// Give up once the walk passes this point (default 2.0)
    pub max_x: f64,

    /// Give up after this many sub-intervals (default 1000000)
    pub max_iters: usize,
}

impl Default for InverseOptions {
    fn default() -> Self {
        Self { step: DEFAULT_STEP, max_x: 2.0, max_iters: 1_000_000 }
    }
}

/// Find the point $`x`$ at which the running integral of `f` from zero first
/// reaches `target`.
///
/// The integral is accumulated with the midpoint rule, one sub-interval of
/// width `opts.step` at a time, and the right edge of the sub-interval on which
/// the target is met or passed is returned. A target of zero therefore gives
/// zero without evaluating `f`.
pub fn invert_cdf<F>(mut f: F, target: Probability, opts: &InverseOptions)
    -> SampleResult<f64>
where F: FnMut(f64) -> Result<f64, EvalError>
{
    if !opts.step.is_finite() || opts.step <= 0.0 {
        return Err(SampleError::BadStep);
    }
    let tgt: f64 = target.p();
    let mut walk = MidpointSteps::unbounded(
        |t: f64| -> SampleResult<f64> {
            let ft: f64
                = f(t).map_err(|source| SampleError::Eval { x: t, source })?;
            return if ft.is_finite() {
                Ok(ft)
            } else {
                Err(SampleError::NonFinite { x: t })
            };
        },
        0.0,
        opts.step,
    );
    let mut iters: usize = 0;
    while tgt - walk.total() > 0.0 {
        if iters >= opts.max_iters || walk.position() >= opts.max_x {
            return Err(
                SampleError::Exhausted {
                    target: tgt,
                    acc: walk.total(),
                    x: walk.position(),
                }
            );
        }
        // an unbounded walk only stops yielding after an error
        if let Some(s) = walk.next() {
            s?;
        }
        iters += 1;
    }
    return Ok(walk.position());
}

/// Provides methods for sampling a random continuous variable according to some
/// distribution.
pub trait RandomContinuous {
    fn sample_rng<R>(&self, rng: &mut R) -> SampleResult<f64>
    where R: Rng + ?Sized;
}

/// A random continuous variable whose density is an [`Evaluator`], sampled by
/// inverting the CDF with [`invert_cdf`].
#[derive(Clone, Debug)]
pub struct InverseCdf<E>
where E: Evaluator
{
    density: E,
    opts: InverseOptions,
}

impl<E> InverseCdf<E>
where E: Evaluator
{
    pub fn new(density: E, opts: InverseOptions) -> Self {
        return Self { density, opts };
    }

    /// Pass-through method to access the density.
    pub fn pdf(&self, x: f64) -> Result<f64, EvalError> {
        return self.density.evaluate(x);
    }

    /// Find the value at a given cumulative probability.
    pub fn quantile(&self, target: Probability) -> SampleResult<f64> {
        return invert_cdf(|x| self.density.evaluate(x), target, &self.opts);
    }

    pub fn options(&self) -> &InverseOptions { &self.opts }
}

impl<E> RandomContinuous for InverseCdf<E>
where E: Evaluator
{
    fn sample_rng<R>(&self, rng: &mut R) -> SampleResult<f64>
    where R: Rng + ?Sized
    {
        return self.quantile(Probability::random_rng(rng));
    }
}
