//! Samples a density on an even grid for plotting.

use ndarray as nd;
use serde::Serialize;
use tracing::debug;
use crate::expr::Evaluator;

/// Grid spacing of the plotted curve.
pub const CURVE_SPACING: f64 = 0.01;

/// Points of a plotted density.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct Curve {
    pub points: Vec<(f64, f64)>,

    /// Grid points left out because evaluation failed or was not finite.
    pub skipped: usize,
}

/// Evaluate `density` on an evenly spaced grid from zero to `end` inclusive.
///
/// The number of points is chosen so that the spacing is as close as possible
/// to `spacing`. Failed or non-finite evaluations are dropped from the curve
/// and counted in [`Curve::skipped`].
pub fn sample_curve<E>(density: &E, end: f64, spacing: f64) -> Curve
where E: Evaluator + ?Sized
{
    if !(end > 0.0) || !(spacing > 0.0) || !end.is_finite() {
        return Curve::default();
    }
    let n: usize = (end / spacing).round() as usize + 1;
    let grid: nd::Array1<f64> = nd::Array1::linspace(0.0, end, n);
    let mut curve = Curve::default();
    for &x in grid.iter() {
        match density.evaluate(x) {
            Ok(y) if y.is_finite() => { curve.points.push((x, y)); },
            Ok(y) => {
                debug!(x, y, "dropping non-finite curve point");
                curve.skipped += 1;
            },
            Err(err) => {
                debug!(x, %err, "dropping curve point");
                curve.skipped += 1;
            },
        }
    }
    return curve;
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use crate::expr::{ Expr, FnDensity };

    #[test]
    fn grid_covers_display_range() {
        let curve = sample_curve(&FnDensity(|x: f64| 2.0 * x), 1.1, CURVE_SPACING);
        assert_eq!(curve.points.len(), 111);
        assert_eq!(curve.skipped, 0);
        assert_eq!(curve.points[0], (0.0, 0.0));
        let (x, y) = *curve.points.last().unwrap();
        assert_abs_diff_eq!(x, 1.1, epsilon = 1e-12);
        assert_abs_diff_eq!(y, 2.2, epsilon = 1e-12);
        assert_abs_diff_eq!(curve.points[50].0, 0.5, epsilon = 1e-12);
    }

    #[test]
    fn failed_points_are_skipped() {
        let expr: Expr = "1 / sqrt(x - 0.5)".parse().unwrap();
        let curve = sample_curve(&expr, 1.0, 0.1);
        // x < 0.5 fails, x = 0.5 divides by zero
        assert_eq!(curve.skipped, 6);
        assert_eq!(curve.points.len(), 5);
        assert!(curve.points.iter().all(|(x, _)| *x > 0.5));
    }

    #[test]
    fn empty_range_gives_empty_curve() {
        assert_eq!(sample_curve(&FnDensity(|_: f64| 1.0), 0.0, 0.01), Curve::default());
        assert_eq!(sample_curve(&FnDensity(|_: f64| 1.0), 1.0, 0.0), Curve::default());
    }
}
