//! Detect chromatographic peaks in a [`SampleSeries`].
//!
//! [`PeakDetector`] ties the pipeline together: it estimates the chromatogram's
//! baseline and noise floor, differentiates the smoothed trace, walks it with an
//! [`EdgeSearcher`] to produce candidate windows, scores each candidate with a
//! [`PeakScorer`] and finally ranks the surviving peaks by apex intensity.
use std::cmp::Ordering;
use std::ops::Deref;

use cfg_if::cfg_if;
use log::debug;
use thiserror::Error;

#[cfg(feature = "parallelism")]
use rayon::prelude::*;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::baseline::BaselineEstimator;
use crate::differential::{differentiate, NoiseEstimate};
use crate::edge_search::{first_apex, EdgeSearchThresholds, EdgeSearcher, PeakCandidate};
use crate::peak::PeakDetectionResult;
use crate::peak_scorer::PeakScorer;
use crate::pool::SamplePool;
use crate::sample::{Sample, SampleSeries};
use crate::smooth::SmoothingMethod;

/// Series shorter than this can not fit both a start trigger and the derivative
/// stencil margins, so they are scored as a single window
const SHORT_SERIES_LENGTH: usize = 10;
/// Series shorter than this never hold a peak
const MINIMUM_SERIES_LENGTH: usize = 4;

/// All the ways peak detection can fail
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PeakDetectionError {
    #[error("Cannot detect peaks in an empty series")]
    EmptySeries,
    #[error("The index range {0}..={1} is not valid for a series of length {2}")]
    InvalidRange(usize, usize, usize),
    #[error("The time range {0}..={1} is empty")]
    InvalidTimeRange(f64, f64),
    #[error("Invalid value for parameter {0}: {1}")]
    InvalidParameter(&'static str, f64),
}

/// The parameters for chromatographic peak detection
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PeakDetector {
    /// The number of samples per noise estimation bin
    pub noise_estimate_bin: usize,
    /// The number of non-flat bins needed to trust the binned noise floor
    pub min_noise_window_size: usize,
    /// The noise floor used when it can not be estimated
    pub min_noise_level: f64,
    pub noise_factor: f64,
    /// The largest distance, in samples, between a peak's apex and its edges
    pub average_peak_width: usize,
    pub amplitude_noise_fold: f64,
    pub slope_noise_fold: f64,
    /// The smallest number of samples a peak may span. Values below 1.5 also
    /// enable detection of very sharp tops and shallow valleys.
    pub minimum_datapoints: f64,
    pub minimum_amplitude: f64,
    /// Smoothing applied to the input before detection
    pub smoothing: Option<(SmoothingMethod, usize)>,
}

impl Default for PeakDetector {
    fn default() -> Self {
        Self {
            noise_estimate_bin: 50,
            min_noise_window_size: 10,
            min_noise_level: 1.0,
            noise_factor: 3.0,
            average_peak_width: 20,
            amplitude_noise_fold: 4.0,
            slope_noise_fold: 2.0,
            minimum_datapoints: 5.0,
            minimum_amplitude: 1.0,
            smoothing: None,
        }
    }
}

/// A builder for configuring [`PeakDetector`]
#[derive(Debug, Clone, Default)]
pub struct PeakDetectorBuilder {
    detector: PeakDetector,
}

impl PeakDetectorBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn noise_estimate_bin(mut self, noise_estimate_bin: usize) -> Self {
        self.detector.noise_estimate_bin = noise_estimate_bin;
        self
    }

    pub fn min_noise_window_size(mut self, min_noise_window_size: usize) -> Self {
        self.detector.min_noise_window_size = min_noise_window_size;
        self
    }

    pub fn min_noise_level(mut self, min_noise_level: f64) -> Self {
        self.detector.min_noise_level = min_noise_level;
        self
    }

    pub fn noise_factor(mut self, noise_factor: f64) -> Self {
        self.detector.noise_factor = noise_factor;
        self
    }

    pub fn average_peak_width(mut self, average_peak_width: usize) -> Self {
        self.detector.average_peak_width = average_peak_width;
        self
    }

    pub fn amplitude_noise_fold(mut self, amplitude_noise_fold: f64) -> Self {
        self.detector.amplitude_noise_fold = amplitude_noise_fold;
        self
    }

    pub fn slope_noise_fold(mut self, slope_noise_fold: f64) -> Self {
        self.detector.slope_noise_fold = slope_noise_fold;
        self
    }

    pub fn minimum_datapoints(mut self, minimum_datapoints: f64) -> Self {
        self.detector.minimum_datapoints = minimum_datapoints;
        self
    }

    pub fn minimum_amplitude(mut self, minimum_amplitude: f64) -> Self {
        self.detector.minimum_amplitude = minimum_amplitude;
        self
    }

    pub fn smoothing(mut self, method: SmoothingMethod, level: usize) -> Self {
        self.detector.smoothing = Some((method, level));
        self
    }

    pub fn build(self) -> PeakDetector {
        self.detector
    }
}

impl From<PeakDetectorBuilder> for PeakDetector {
    fn from(value: PeakDetectorBuilder) -> Self {
        value.build()
    }
}

/// The peaks of one pass along with what was learned about the noise
struct Detection {
    peaks: Vec<PeakDetectionResult>,
    noise_from_fallback: bool,
}

impl PeakDetector {
    pub fn builder() -> PeakDetectorBuilder {
        PeakDetectorBuilder::new()
    }

    /// Check that every parameter is in its meaningful range
    pub fn validate(&self) -> Result<(), PeakDetectionError> {
        let non_negative = [
            ("min_noise_level", self.min_noise_level),
            ("amplitude_noise_fold", self.amplitude_noise_fold),
            ("slope_noise_fold", self.slope_noise_fold),
            ("minimum_datapoints", self.minimum_datapoints),
            ("minimum_amplitude", self.minimum_amplitude),
        ];
        for (name, value) in non_negative {
            if !value.is_finite() || value < 0.0 {
                return Err(PeakDetectionError::InvalidParameter(name, value));
            }
        }
        if !self.noise_factor.is_finite() || self.noise_factor <= 0.0 {
            return Err(PeakDetectionError::InvalidParameter(
                "noise_factor",
                self.noise_factor,
            ));
        }
        if self.noise_estimate_bin == 0 {
            return Err(PeakDetectionError::InvalidParameter("noise_estimate_bin", 0.0));
        }
        if self.average_peak_width == 0 {
            return Err(PeakDetectionError::InvalidParameter("average_peak_width", 0.0));
        }
        Ok(())
    }

    pub fn baseline_estimator(&self) -> BaselineEstimator {
        BaselineEstimator::new(
            self.noise_estimate_bin,
            self.min_noise_window_size,
            self.min_noise_level,
            self.noise_factor,
        )
    }

    pub fn scorer(&self) -> PeakScorer {
        PeakScorer::new(
            self.average_peak_width,
            self.minimum_amplitude,
            self.amplitude_noise_fold,
            self.noise_factor,
        )
    }

    pub fn thresholds(&self, noise: &NoiseEstimate) -> EdgeSearchThresholds {
        EdgeSearchThresholds::new(
            noise,
            self.slope_noise_fold,
            self.amplitude_noise_fold,
            self.minimum_datapoints,
        )
    }

    /// Detect peaks across all of `series`.
    ///
    /// Peaks are returned in the order they were found, with their
    /// amplitude rank and score filled in.
    pub fn detect<S: Deref<Target = [Sample]>>(
        &self,
        series: &SampleSeries<S>,
    ) -> Result<Vec<PeakDetectionResult>, PeakDetectionError> {
        let pool = SamplePool::new();
        self.detect_with_pool(series, &pool)
    }

    /// As [`PeakDetector::detect`], drawing scratch buffers from `pool`
    pub fn detect_with_pool<S: Deref<Target = [Sample]>>(
        &self,
        series: &SampleSeries<S>,
        pool: &SamplePool,
    ) -> Result<Vec<PeakDetectionResult>, PeakDetectionError> {
        self.validate()?;
        if series.is_empty() {
            return Err(PeakDetectionError::EmptySeries);
        }
        Ok(self.run(series, pool).peaks)
    }

    /// Detect peaks within the inclusive index range `left..=right` of `series`.
    ///
    /// The range is analyzed on its own, and the reported indices are positions
    /// in the full series. When the range is too short to estimate its own noise
    /// floor but the full series is not, the noise level and signal to noise
    /// ratio of each peak are recomputed from the full series' noise floor.
    pub fn detect_in_range<S: Deref<Target = [Sample]>>(
        &self,
        series: &SampleSeries<S>,
        left: usize,
        right: usize,
    ) -> Result<Vec<PeakDetectionResult>, PeakDetectionError> {
        self.validate()?;
        if series.is_empty() {
            return Err(PeakDetectionError::EmptySeries);
        }
        if left > right || right >= series.len() {
            return Err(PeakDetectionError::InvalidRange(left, right, series.len()));
        }
        let pool = SamplePool::new();
        let detection = {
            let sub_series = SampleSeries::from_storage(
                pool.checkout_copy(&series[left..=right]),
                series.axis_type,
                series.axis_unit,
            );
            self.run(&sub_series, &pool)
        };
        let mut peaks = detection.peaks;
        peaks.iter_mut().for_each(|p| p.offset_indices(left));

        if detection.noise_from_fallback && !peaks.is_empty() {
            let full = self.baseline_estimator().estimate(series, &pool);
            if !full.noise_from_fallback {
                let estimated_noise = (full.noise / self.noise_factor).max(1.0);
                debug!(
                    "Refining noise of {} peaks in {left}..={right} to {estimated_noise}",
                    peaks.len()
                );
                peaks
                    .iter_mut()
                    .for_each(|p| p.refine_noise(estimated_noise));
            }
        }
        Ok(peaks)
    }

    /// Detect peaks between the samples nearest `start_time` and `end_time`,
    /// see [`PeakDetector::detect_in_range`]
    pub fn detect_in_time_range<S: Deref<Target = [Sample]>>(
        &self,
        series: &SampleSeries<S>,
        start_time: f64,
        end_time: f64,
    ) -> Result<Vec<PeakDetectionResult>, PeakDetectionError> {
        if start_time.is_nan() || end_time.is_nan() || start_time > end_time {
            return Err(PeakDetectionError::InvalidTimeRange(start_time, end_time));
        }
        match (series.nearest_index(start_time), series.nearest_index(end_time)) {
            (Some(left), Some(right)) => self.detect_in_range(series, left, right),
            _ => Err(PeakDetectionError::EmptySeries),
        }
    }

    /// Detect peaks in each of many independent chromatograms, in parallel when
    /// the `parallelism` feature is enabled
    pub fn detect_many(
        &self,
        series: &[SampleSeries],
    ) -> Vec<Result<Vec<PeakDetectionResult>, PeakDetectionError>> {
        cfg_if! {
            if #[cfg(feature = "parallelism")] {
                series.par_iter().map(|s| self.detect(s)).collect()
            } else {
                series.iter().map(|s| self.detect(s)).collect()
            }
        }
    }

    fn run<S: Deref<Target = [Sample]>>(
        &self,
        series: &SampleSeries<S>,
        pool: &SamplePool,
    ) -> Detection {
        if series.len() < MINIMUM_SERIES_LENGTH {
            debug!("Series of length {} is too short to hold a peak", series.len());
            return Detection {
                peaks: Vec::new(),
                noise_from_fallback: true,
            };
        }
        match self.smoothing {
            Some((method, level)) => {
                let method = method.for_axis(series.axis_type);
                let smoothed = method.smooth_pooled(series, level, pool);
                self.run_on(&smoothed, pool)
            }
            None => self.run_on(series, pool),
        }
    }

    fn run_on<S: Deref<Target = [Sample]>>(
        &self,
        series: &SampleSeries<S>,
        pool: &SamplePool,
    ) -> Detection {
        let n = series.len();
        let property = self.baseline_estimator().estimate(series, pool);
        let smoothed = property.smoothed().as_slice();
        let coefficients = differentiate(smoothed);
        let noise = coefficients.estimate_noise(smoothed);
        debug!(
            "Noise levels: amplitude {}, slope {}, peak top {}",
            noise.amplitude_noise, noise.slope_noise, noise.peak_top_noise
        );

        let thresholds = self.thresholds(&noise);
        let candidates: Vec<PeakCandidate> = if n < SHORT_SERIES_LENGTH {
            let whole = PeakCandidate::new(0, first_apex(smoothed, 0, n - 1), n - 1);
            if thresholds.is_wide_enough(&whole) {
                vec![whole]
            } else {
                debug!("Series of length {n} is narrower than the minimum peak width");
                Vec::new()
            }
        } else {
            let mut searcher = EdgeSearcher::new(smoothed, &coefficients, thresholds);
            let candidates: Vec<PeakCandidate> = searcher.by_ref().collect();
            if searcher.is_halted() {
                debug!("Edge search stopped early by the loop guard");
            }
            candidates
        };

        let scorer = self.scorer().with_chromatogram(&property, &noise);
        let mut peaks: Vec<PeakDetectionResult> = candidates
            .iter()
            .filter_map(|c| scorer.score_candidate(smoothed, c))
            .collect();
        for (i, peak) in peaks.iter_mut().enumerate() {
            peak.peak_id = i;
        }
        rank_by_amplitude(&mut peaks);
        debug!(
            "Accepted {} of {} candidate peaks from {} samples",
            peaks.len(),
            candidates.len(),
            n
        );
        Detection {
            peaks,
            noise_from_fallback: property.noise_from_fallback,
        }
    }
}

/// Rank `peaks` by descending apex intensity, keeping their order.
///
/// Sets each peak's 1-based `amplitude_order_value`, with ties ranked in their
/// existing order, and its `amplitude_score_value`, the apex intensity relative
/// to the most intense peak. Only one peak scores `1.0` unless several share the
/// highest apex, in which case all of them do and only the first is ranked 1.
pub fn rank_by_amplitude(peaks: &mut [PeakDetectionResult]) {
    let mut order: Vec<usize> = (0..peaks.len()).collect();
    order.sort_by(|a, b| {
        peaks[*b]
            .top_intensity
            .partial_cmp(&peaks[*a].top_intensity)
            .unwrap_or(Ordering::Equal)
    });
    let max_intensity = match order.first() {
        Some(i) => peaks[*i].top_intensity,
        None => return,
    };
    for (rank, i) in order.into_iter().enumerate() {
        let peak = &mut peaks[i];
        peak.amplitude_order_value = rank + 1;
        peak.amplitude_score_value = if max_intensity > 0.0 {
            peak.top_intensity / max_intensity
        } else {
            0.0
        };
    }
}

/// A convenience function that uses the default detection parameters to find
/// peaks in `series`
pub fn detect_peaks<S: Deref<Target = [Sample]>>(
    series: &SampleSeries<S>,
) -> Result<Vec<PeakDetectionResult>, PeakDetectionError> {
    PeakDetector::default().detect(series)
}
