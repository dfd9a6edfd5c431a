//! Bins samples drawn on $`[0, 1]`$ into equal-width buckets for comparison
//! against the density they were drawn from.

use itertools::Itertools;
use crate::mkerr;

mkerr!(
    HistError : {
        NoBuckets => "histogram: bucket count must be at least 1",
    }
);
pub type HistResult<T> = Result<T, HistError>;

/// Count `samples` into `buckets` equal-width bins over $`[0, 1]`$ and return
/// `(right edge, fraction of samples)` for each bin, in order.
///
/// A sample of exactly 1 is counted in the last bin; anything else outside the
/// unit interval is clamped into the nearest end bin. Non-finite samples are
/// ignored entirely, so the fractions always sum to one when at least one
/// sample is counted. With nothing to count, every fraction is zero.
pub fn histogram(samples: &[f64], buckets: usize) -> HistResult<Vec<(f64, f64)>> {
    if buckets == 0 {
        return Err(HistError::NoBuckets);
    }
    let mut counts: Vec<usize> = vec![0; buckets];
    let mut total: usize = 0;
    for s in samples.iter().filter(|s| s.is_finite()) {
        let k: usize = (s * buckets as f64).floor().max(0.0) as usize;
        counts[k.min(buckets - 1)] += 1;
        total += 1;
    }
    let hist: Vec<(f64, f64)>
        = counts.into_iter().enumerate()
        .map(|(k, n)| {
            let frac: f64 = if total == 0 { 0.0 } else { n as f64 / total as f64 };
            ((k + 1) as f64 / buckets as f64, frac)
        })
        .collect();
    return Ok(hist);
}

/// Render a histogram as aligned `x  fraction` rows, one per bin.
pub fn format_rows(hist: &[(f64, f64)]) -> String {
    return hist.iter()
        .map(|(x, frac)| format!("{:>8.4}  {:.6}", x, frac))
        .join("\n");
}
