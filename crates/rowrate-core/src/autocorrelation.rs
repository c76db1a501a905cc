//! Autocorrelation based periodicity detection
//!
//! A copy of the window is slid over itself one sample at a time and every
//! offset (lag) is scored by the normalized correlation of the shifted and
//! fixed samples. The dominant lag is the number of samples per stroke.
//!
//! Indexing wraps around the full window (circular autocorrelation), so every
//! lag sums over all N samples rather than only the overlapping part. This
//! biases long lags slightly; downstream thresholds are tuned against it.
//!
//! Cost is O(N²/4) per pass. The estimator runs it about once per second over
//! a few hundred samples.

extern crate alloc;
use alloc::vec::Vec;

/// Default for the shortest window that is scored.
pub const MIN_WINDOW: usize = 10;

/// Score every lag in `0..samples.len() / 2`.
///
/// Returns an empty table when the window is shorter than `min_window` (at
/// least 2) or has no variance (the normalization would divide by zero).
pub fn frequency_scores(samples: &[f64], min_window: usize) -> Vec<f64> {
    let n = samples.len();
    if n < min_window.max(2) {
        return Vec::new();
    }

    let mean = samples.iter().sum::<f64>() / n as f64;
    let variance: f64 = samples.iter().map(|x| (x - mean) * (x - mean)).sum();
    if !(variance > 0.0) {
        return Vec::new();
    }

    (0..n / 2)
        .map(|shift| {
            let correlation: f64 = samples
                .iter()
                .enumerate()
                .map(|(index, x)| (x - mean) * (samples[(index + shift) % n] - mean))
                .sum();
            correlation / variance
        })
        .collect()
}

/// Offset of the best-correlated lag at or above `min_lag`.
///
/// `min_lag` keeps the trivial zero-lag peak and implausibly fast harmonics
/// out of the running. Ties go to the lowest lag. `None` when no lag
/// qualifies.
pub fn best_lag(scores: &[f64], min_lag: usize) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (lag, &score) in scores.iter().enumerate().skip(min_lag) {
        match best {
            Some((_, best_score)) if !(score > best_score) => {}
            _ if score.is_nan() => {}
            _ => best = Some((lag, score)),
        }
    }
    best.map(|(lag, _)| lag)
}
