//! Saturation-aware statistics over masked pixel samples.

use serde::{Deserialize, Serialize};

/// Summary statistics of one masked, positivity-filtered pixel sample.
///
/// An empty sample (zero strictly-positive pixels under the mask) yields NaN
/// for every statistic except `n` and `sum` — a per-well data-quality signal
/// for the reviewer, not an error.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SampleStats {
    /// Number of strictly-positive pixels sampled.
    pub n: usize,
    pub median: f32,
    pub mean: f32,
    pub std: f32,
    pub sum: f32,
    /// Fraction of sampled pixels at the saturation sentinel.
    pub saturated_frac: f32,
}

impl SampleStats {
    /// Compute statistics over the strictly-positive subset of `values`.
    ///
    /// Zero is "masked out", not a valid intensity, so non-positive values
    /// are dropped before any aggregation.
    pub fn from_samples(values: &[f32], saturation_level: f32) -> Self {
        let mut positive: Vec<f32> = values.iter().copied().filter(|&v| v > 0.0).collect();
        let n = positive.len();
        if n == 0 {
            return Self::empty();
        }

        let sum: f32 = positive.iter().sum();
        let mean = sum / n as f32;
        let std = if n > 1 {
            let ss: f32 = positive.iter().map(|v| (v - mean) * (v - mean)).sum();
            (ss / (n - 1) as f32).sqrt()
        } else {
            0.0
        };
        let saturated = positive.iter().filter(|&&v| v == saturation_level).count();

        positive.sort_by(f32::total_cmp);
        let median = if n % 2 == 1 {
            positive[n / 2]
        } else {
            0.5 * (positive[n / 2 - 1] + positive[n / 2])
        };

        Self {
            n,
            median,
            mean,
            std,
            sum,
            saturated_frac: saturated as f32 / n as f32,
        }
    }

    /// The undefined-statistics record for an empty sample.
    pub fn empty() -> Self {
        Self {
            n: 0,
            median: f32::NAN,
            mean: f32::NAN,
            std: f32::NAN,
            sum: 0.0,
            saturated_frac: f32::NAN,
        }
    }

    /// True when the sample was empty and the statistics are undefined.
    pub fn is_undefined(&self) -> bool {
        self.n == 0
    }

    /// Scale the reported sum by a mask-area ratio.
    ///
    /// Background sums are normalized by `fg_area / bg_area` so foreground
    /// and background totals compare directly regardless of mask pixel
    /// counts.
    pub fn with_area_normalized_sum(mut self, fg_area: usize, bg_area: usize) -> Self {
        if bg_area > 0 {
            self.sum *= fg_area as f32 / bg_area as f32;
        }
        self
    }
}
