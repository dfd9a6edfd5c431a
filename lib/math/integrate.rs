//! Provides fixed-step midpoint-rule integration of functions of one variable.
//!
//! Functions are intended to compute integrals of the forms
//! ```math
//! \int_a^b f(x) \,dx
//! ```
//! (the first kind) or, walking forward without a fixed upper bound,
//! ```math
//! \int_a^x f(x') \,dx'
//! ```
//! (the second kind, see [`MidpointSteps::unbounded`]).
//!
//! The interval is split into consecutive sub-intervals of width `step`
//! starting from the lower bound; the last sub-interval is truncated at the
//! upper bound when `step` does not divide the interval evenly. No attempt is
//! made to estimate or bound the truncation error.

use std::convert::Infallible;
use num_traits::Float;
use crate::mkerr;

mkerr!(
    IntegrateError : {
        BadStep => "integrate: step size must be positive and finite",
        BadBounds => "integrate: bounds must be finite and ordered",
    }
);
pub type IntegrateResult<T> = Result<T, IntegrateError>;

/// Step size used when none is otherwise configured.
pub const DEFAULT_STEP: f64 = 0.01;

/// A single sub-interval visited by [`MidpointSteps`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MidpointStep<V> {
    /// Right edge of the sub-interval.
    pub x: V,

    /// Value of the integrand at the midpoint of the sub-interval.
    pub fx: V,

    /// Running total of the integral up to `x`.
    pub acc: V,
}

/// Walks the midpoint rule one sub-interval at a time, yielding the running
/// integral after each.
///
/// The integrand is fallible; the first `Err` it returns is yielded and the
/// iterator is fused afterward. Non-finite values are passed through untouched.
#[derive(Clone, Debug)]
pub struct MidpointSteps<V, F> {
    f: F,
    left: V,
    end: Option<V>,
    step: V,
    acc: V,
    fused: bool,
}

// sub-intervals whose left edge lands within this distance of the upper bound
// are treated as lying past it; this absorbs drift in the running position
fn edge_tol<V>(step: V) -> V
where V: Float
{
    return step * V::epsilon().sqrt();
}

impl<V, F> MidpointSteps<V, F>
where V: Float
{
    /// Walk over $`[start, end)`$.
    pub fn bounded(f: F, start: V, end: V, step: V) -> Self {
        return Self {
            f,
            left: start,
            end: Some(end),
            step,
            acc: V::zero(),
            fused: false,
        };
    }

    /// Walk forward from `start` indefinitely. Callers are responsible for
    /// stopping the iteration.
    pub fn unbounded(f: F, start: V, step: V) -> Self {
        return Self {
            f,
            left: start,
            end: None,
            step,
            acc: V::zero(),
            fused: false,
        };
    }

    /// Left edge of the next sub-interval to be visited.
    pub fn position(&self) -> V { self.left }

    /// Integral accumulated so far.
    pub fn total(&self) -> V { self.acc }
}

impl<V, F, E> Iterator for MidpointSteps<V, F>
where
    V: Float,
    F: FnMut(V) -> Result<V, E>,
{
    type Item = Result<MidpointStep<V>, E>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.fused {
            return None;
        }
        let two: V = V::one() + V::one();
        let mut right: V = self.left + self.step;
        if let Some(end) = self.end {
            if self.left >= end - edge_tol(self.step) {
                self.fused = true;
                return None;
            }
            if right > end {
                right = end;
            }
        }
        let fx: V
            = match (self.f)((self.left + right) / two) {
                Ok(fx) => fx,
                Err(err) => {
                    self.fused = true;
                    return Some(Err(err));
                },
            };
        self.acc = self.acc + fx * (right - self.left);
        self.left = right;
        return Some(Ok(MidpointStep { x: right, fx, acc: self.acc }));
    }
}

fn check_args<V>(start: V, end: V, step: V) -> IntegrateResult<()>
where V: Float
{
    if !step.is_finite() || step <= V::zero() {
        return Err(IntegrateError::BadStep);
    }
    if !start.is_finite() || !end.is_finite() || start > end {
        return Err(IntegrateError::BadBounds);
    }
    return Ok(());
}

/// Integrate `f` over $`[start, end)`$ with the midpoint rule.
///
/// Non-finite values returned by `f` propagate into the result. An invalid
/// step size gives `NaN` and an empty or reversed interval gives zero; use
/// [`try_integrate`] to have these reported as errors instead.
pub fn integrate<V, F>(mut f: F, start: V, end: V, step: V) -> V
where
    V: Float,
    F: FnMut(V) -> V,
{
    if !step.is_finite() || step <= V::zero() {
        return V::nan();
    }
    if !(start < end) {
        return V::zero();
    }
    let mut total: V = V::zero();
    for s in MidpointSteps::bounded(|x| Ok::<V, Infallible>(f(x)), start, end, step) {
        match s {
            Ok(s) => { total = s.acc; },
            Err(never) => match never { },
        }
    }
    return total;
}

/// Integrate a fallible `f` over $`[start, end)`$ with the midpoint rule,
/// stopping at the first evaluation error.
///
/// Bad arguments are reported through `E`'s conversion from
/// [`IntegrateError`]. As with [`integrate`], non-finite values are not
/// treated as errors here.
pub fn try_integrate<V, F, E>(f: F, start: V, end: V, step: V) -> Result<V, E>
where
    V: Float,
    F: FnMut(V) -> Result<V, E>,
    E: From<IntegrateError>,
{
    check_args(start, end, step)?;
    let mut total: V = V::zero();
    for s in MidpointSteps::bounded(f, start, end, step) {
        total = s?.acc;
    }
    return Ok(total);
}
