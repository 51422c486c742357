//! Global chromatogram properties: the working smoothed trace, a slow baseline,
//! and the noise floor left over once that baseline is removed.
use std::ops::Deref;

use log::debug;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::arrayops::{median, median_mut, minmax};
use crate::pool::SamplePool;
use crate::sample::{PooledSeries, Sample, SampleSeries};
use crate::smooth::SmoothingMethod;

/// The level of each of the two light smoothing passes producing the working trace
pub const WORKING_SMOOTHING_LEVEL: usize = 1;
/// The level of the heavy smoothing pass that approximates the baseline
pub const BASELINE_SMOOTHING_LEVEL: usize = 20;

/// Estimates a [`GlobalChromatogramProperty`] from a raw series
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct BaselineEstimator {
    /// The number of samples in each noise estimation bin
    pub noise_estimate_bin: usize,
    /// The number of bins with non-zero spread required to trust the binned
    /// noise estimate
    pub min_noise_window_size: usize,
    /// The noise floor to fall back to when there are too few usable bins
    pub min_noise_level: f64,
    /// The multiplier applied to the noise floor to produce the noise level
    pub noise_factor: f64,
}

impl Default for BaselineEstimator {
    fn default() -> Self {
        Self {
            noise_estimate_bin: 50,
            min_noise_window_size: 10,
            min_noise_level: 1.0,
            noise_factor: 3.0,
        }
    }
}

/// Summary statistics of a whole chromatogram along with the derived series
/// used for peak detection.
///
/// The derived series are borrowed from the [`SamplePool`] the estimate was made
/// with and are returned to it together when this is dropped.
#[derive(Debug)]
pub struct GlobalChromatogramProperty<'p> {
    pub max_intensity: f64,
    pub min_intensity: f64,
    /// The median raw intensity
    pub baseline_median: f64,
    pub noise_floor: f64,
    /// `noise_floor * noise_factor`
    pub noise: f64,
    /// Whether the typical intensity sits closer to the maximum than the minimum
    pub is_high_baseline: bool,
    /// Whether `noise_floor` is the configured minimum because the series was too
    /// short or too flat to estimate it
    pub noise_from_fallback: bool,
    smoothed: PooledSeries<'p>,
    baseline: PooledSeries<'p>,
    baseline_corrected: PooledSeries<'p>,
}

impl<'p> GlobalChromatogramProperty<'p> {
    /// The doubly smoothed working trace peak detection runs on
    pub fn smoothed(&self) -> &PooledSeries<'p> {
        &self.smoothed
    }

    pub fn baseline(&self) -> &PooledSeries<'p> {
        &self.baseline
    }

    /// `max(0, smoothed - baseline)`
    pub fn baseline_corrected(&self) -> &PooledSeries<'p> {
        &self.baseline_corrected
    }
}

impl BaselineEstimator {
    pub fn new(
        noise_estimate_bin: usize,
        min_noise_window_size: usize,
        min_noise_level: f64,
        noise_factor: f64,
    ) -> Self {
        Self {
            noise_estimate_bin,
            min_noise_window_size,
            min_noise_level,
            noise_factor,
        }
    }

    /// The median spread of the non-flat bins of `corrected`, if there are enough
    /// of them
    pub fn binned_noise_floor(&self, corrected: &[Sample]) -> Option<f64> {
        let bin = self.noise_estimate_bin.max(1);
        let mut spreads: Vec<f64> = corrected
            .chunks(bin)
            .filter_map(|chunk| {
                let (lo, hi) = chunk
                    .iter()
                    .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), s| {
                        (lo.min(s.intensity), hi.max(s.intensity))
                    });
                let spread = hi - lo;
                (spread > 0.0).then_some(spread)
            })
            .collect();
        if spreads.len() >= self.min_noise_window_size {
            Some(median_mut(&mut spreads))
        } else {
            None
        }
    }

    pub fn estimate<'p, S: Deref<Target = [Sample]>>(
        &self,
        series: &SampleSeries<S>,
        pool: &'p SamplePool,
    ) -> GlobalChromatogramProperty<'p> {
        let lwma = SmoothingMethod::LinearWeightedMovingAverage;
        let smoothed = {
            let first_pass = lwma.smooth_pooled(series, WORKING_SMOOTHING_LEVEL, pool);
            lwma.smooth_pooled(&first_pass, WORKING_SMOOTHING_LEVEL, pool)
        };
        let baseline = lwma.smooth_pooled(series, BASELINE_SMOOTHING_LEVEL, pool);

        let mut baseline_corrected = pool.checkout_series(&smoothed);
        for (s, b) in baseline_corrected.as_mut_slice().iter_mut().zip(baseline.iter()) {
            s.intensity = (s.intensity - b.intensity).max(0.0);
        }

        let (noise_floor, noise_from_fallback) =
            match self.binned_noise_floor(baseline_corrected.as_slice()) {
                Some(floor) => (floor, false),
                None => (self.min_noise_level, true),
            };

        let raw: Vec<f64> = series.intensities().collect();
        let (min_intensity, max_intensity) = if raw.is_empty() {
            (0.0, 0.0)
        } else {
            minmax(&raw)
        };
        let baseline_median = median(&raw);
        let is_high_baseline = baseline_median > (max_intensity + min_intensity) / 2.0;
        let noise = noise_floor * self.noise_factor;

        debug!(
            "Estimated noise floor {noise_floor} (fallback: {noise_from_fallback}), noise {noise}, baseline median {baseline_median}, high baseline: {is_high_baseline}"
        );

        GlobalChromatogramProperty {
            max_intensity,
            min_intensity,
            baseline_median,
            noise_floor,
            noise,
            is_high_baseline,
            noise_from_fallback,
            smoothed,
            baseline,
            baseline_corrected,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::smooth::linear_weighted_moving_average;
    use crate::test_data::{gaussian_series, noisy_gaussian_series, series_from_intensities};

    #[test_log::test]
    fn test_smoothed_is_double_lwma() {
        let series = noisy_gaussian_series(300, &[(150.0, 8.0, 1000.0)], 50.0, 10.0, 42);
        let pool = SamplePool::new();
        let prop = BaselineEstimator::default().estimate(&series, &pool);
        let expected =
            linear_weighted_moving_average(&linear_weighted_moving_average(&series, 1), 1);
        assert_eq!(prop.smoothed().as_slice(), expected.as_slice());
        let expected_baseline = linear_weighted_moving_average(&series, 20);
        assert_eq!(prop.baseline().as_slice(), expected_baseline.as_slice());
    }

    #[test_log::test]
    fn test_corrected_non_negative() {
        let series = noisy_gaussian_series(1000, &[(300.0, 8.0, 5000.0)], 100.0, 10.0, 1);
        let pool = SamplePool::new();
        let prop = BaselineEstimator::default().estimate(&series, &pool);
        assert!(prop.baseline_corrected().iter().all(|s| s.intensity >= 0.0));
        assert!(!prop.noise_from_fallback);
        assert!(prop.noise_floor > 0.0);
        assert_eq!(prop.noise, prop.noise_floor * 3.0);
        assert!(!prop.is_high_baseline);
    }

    #[test_log::test]
    fn test_fallback_noise() {
        let series = gaussian_series(200, &[(60.0, 5.0, 1000.0)], 0.05);
        let pool = SamplePool::new();
        let prop = BaselineEstimator::default().estimate(&series, &pool);
        assert!(prop.noise_from_fallback);
        assert_eq!(prop.noise_floor, 1.0);
        assert_eq!(prop.noise, 3.0);
    }

    #[test_log::test]
    fn test_high_baseline() {
        let ys: Vec<f64> = (0..300)
            .map(|i| {
                let d = (i as f64 - 150.0).powi(2);
                1000.0 - 900.0 * (-d / 2000.0).exp() + 300.0 * (-d / 20.0).exp()
            })
            .collect();
        let series = series_from_intensities(&ys);
        let pool = SamplePool::new();
        let prop = BaselineEstimator::default().estimate(&series, &pool);
        assert!(prop.is_high_baseline);
        assert!(prop.baseline_median > 900.0);
    }

    #[test]
    fn test_binned_noise_floor() {
        let estimator = BaselineEstimator {
            noise_estimate_bin: 2,
            min_noise_window_size: 2,
            ..Default::default()
        };
        let series = series_from_intensities(&[0.0, 1.0, 5.0, 5.0, 2.0, 5.0, 0.0]);
        // Bins [0, 1], [5, 5], [2, 5], [0] keep the spreads 1 and 3
        assert_eq!(estimator.binned_noise_floor(series.as_slice()), Some(2.0));
        let strict = BaselineEstimator {
            min_noise_window_size: 3,
            ..estimator
        };
        assert_eq!(strict.binned_noise_floor(series.as_slice()), None);
    }

    #[test]
    fn test_buffers_return_to_pool() {
        let series = gaussian_series(100, &[(50.0, 5.0, 100.0)], 0.05);
        let pool = SamplePool::new();
        {
            let _prop = BaselineEstimator::default().estimate(&series, &pool);
            assert_eq!(pool.outstanding(), 3);
        }
        assert_eq!(pool.outstanding(), 0);
        assert_eq!(pool.available(), 3);
        let empty = series_from_intensities(&[]);
        let prop = BaselineEstimator::default().estimate(&empty, &pool);
        assert_eq!(prop.max_intensity, 0.0);
        assert!(prop.smoothed().is_empty());
    }
}
