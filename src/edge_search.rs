//! Locate candidate peak windows by walking the derivative trace of a smoothed
//! chromatogram.
//!
//! An [`EdgeSearcher`] scans forward for two consecutive steep rises, walks back
//! to the start of the rise, climbs until it finds a top, descends until the
//! signal flattens out or turns upward, and nudges the end point onto the local
//! minimum before emitting a [`PeakCandidate`]. It is an [`Iterator`], carrying
//! its cursor and loop guard between candidates.
use log::{debug, trace};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::differential::{DifferentialCoefficients, NoiseEstimate};
use crate::sample::Sample;

/// How many steps edge refinement may take in either direction
const REFINEMENT_STEPS: usize = 5;
/// Repeated backwards refinement to the same point this close to the end of the
/// series halts the scan
const LOOP_GUARD_TAIL: usize = 10;
/// `minimum_datapoints` below this switches on the broad top and bottom tests
const LOW_DATAPOINT_LIMIT: f64 = 1.5;

/// The thresholds an [`EdgeSearcher`] compares derivatives and intensity steps to
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct EdgeSearchThresholds {
    /// A rise steeper than this starts a peak, and a fall shallower than its
    /// negation ends one
    pub slope_threshold: f64,
    /// Two successive intensity steps smaller than this mean the signal is flat
    pub amplitude_threshold: f64,
    /// A top requires curvature below the negation of this
    pub peak_top_noise: f64,
    /// The smallest number of samples a candidate may span
    pub minimum_datapoints: f64,
}

impl EdgeSearchThresholds {
    pub fn new(
        noise: &NoiseEstimate,
        slope_noise_fold: f64,
        amplitude_noise_fold: f64,
        minimum_datapoints: f64,
    ) -> Self {
        Self {
            slope_threshold: noise.slope_noise * slope_noise_fold,
            amplitude_threshold: noise.amplitude_noise * amplitude_noise_fold,
            peak_top_noise: noise.peak_top_noise,
            minimum_datapoints,
        }
    }

    /// Whether very narrow peaks are expected, enabling the broad top and broad
    /// bottom tests
    pub fn is_low_datapoint_mode(&self) -> bool {
        self.minimum_datapoints < LOW_DATAPOINT_LIMIT
    }

    /// Whether `candidate` spans at least `minimum_datapoints` samples
    pub fn is_wide_enough(&self, candidate: &PeakCandidate) -> bool {
        candidate.end >= candidate.start && candidate.width() as f64 >= self.minimum_datapoints
    }
}

/// A window that may hold a peak, with inclusive bounds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PeakCandidate {
    pub start: usize,
    /// The flagged top, or the most intense point when none was flagged
    pub top: usize,
    pub end: usize,
}

impl PeakCandidate {
    pub fn new(start: usize, top: usize, end: usize) -> Self {
        Self { start, top, end }
    }

    /// The number of samples spanned, counting both ends
    pub fn width(&self) -> usize {
        (self.end + 1).saturating_sub(self.start)
    }
}

/// Which side of a peak the scan is on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanPhase {
    Ascending,
    Descending { top: usize },
}

/// Scans a smoothed series for [`PeakCandidate`]s
#[derive(Debug, Clone)]
pub struct EdgeSearcher<'a> {
    samples: &'a [Sample],
    coefficients: &'a DifferentialCoefficients,
    thresholds: EdgeSearchThresholds,
    cursor: usize,
    last_resolved: Option<usize>,
    halted: bool,
}

impl<'a> EdgeSearcher<'a> {
    pub fn new(
        samples: &'a [Sample],
        coefficients: &'a DifferentialCoefficients,
        thresholds: EdgeSearchThresholds,
    ) -> Self {
        debug_assert_eq!(samples.len(), coefficients.len());
        Self {
            samples,
            coefficients,
            thresholds,
            cursor: 0,
            last_resolved: None,
            halted: false,
        }
    }

    /// Begin scanning at `index` instead of the start of the series
    pub fn search_from(mut self, index: usize) -> Self {
        self.cursor = index;
        self
    }

    /// Whether the loop guard stopped the scan early
    pub fn is_halted(&self) -> bool {
        self.halted
    }

    pub fn thresholds(&self) -> &EdgeSearchThresholds {
        &self.thresholds
    }

    #[inline]
    fn intensity(&self, i: usize) -> f64 {
        self.samples[i].intensity
    }

    fn is_scan_exhausted(&self, i: usize) -> bool {
        i as f64 >= self.samples.len() as f64 - 1.0 - self.thresholds.minimum_datapoints
    }

    fn is_peak_start(&self, i: usize) -> bool {
        let fd = &self.coefficients.first_diff;
        i + 1 < fd.len()
            && fd[i] > self.thresholds.slope_threshold
            && fd[i + 1] > self.thresholds.slope_threshold
    }

    /// Walk left from the trigger while the preceding sample is lower
    fn refine_start(&self, trigger: usize) -> usize {
        let mut start = trigger;
        for j in 0..REFINEMENT_STEPS {
            let k = trigger - j;
            if k == 0 || self.intensity(k) <= self.intensity(k - 1) {
                break;
            }
            start = k - 1;
        }
        start
    }

    fn is_peak_top(&self, i: usize) -> bool {
        let n = self.samples.len();
        let fd = &self.coefficients.first_diff;
        let sd = &self.coefficients.second_diff;
        let s = |k: usize| self.intensity(k);

        if fd[i - 1] > 0.0 && fd[i] < 0.0 && sd[i] < -self.thresholds.peak_top_noise {
            return true;
        }
        if i >= 2
            && i + 2 < n
            && s(i - 2) <= s(i - 1)
            && s(i - 1) <= s(i)
            && s(i) >= s(i + 1)
            && s(i + 1) >= s(i + 2)
        {
            return true;
        }
        self.thresholds.is_low_datapoint_mode() && s(i - 1) <= s(i) && s(i) >= s(i + 1)
    }

    fn is_peak_end(&self, i: usize) -> bool {
        let n = self.samples.len();
        let s = |k: usize| self.intensity(k);
        if self.coefficients.first_diff[i] > -self.thresholds.slope_threshold {
            return true;
        }
        let amplitude_threshold = self.thresholds.amplitude_threshold;
        if (s(i - 2) - s(i - 1)).abs() < amplitude_threshold
            && (s(i - 1) - s(i)).abs() < amplitude_threshold
        {
            return true;
        }
        i + 2 < n
            && s(i - 2) >= s(i - 1)
            && s(i - 1) >= s(i)
            && s(i) <= s(i + 1)
            && s(i + 1) <= s(i + 2)
    }

    fn is_broad_bottom(&self, i: usize) -> bool {
        let s = |k: usize| self.intensity(k);
        s(i - 1) >= s(i) && s(i) <= s(i + 1)
    }

    /// Climb from the trigger to a top and descend to an end, returning the end
    /// and the phase the scan finished in
    fn walk_peak(&self, trigger: usize) -> (usize, ScanPhase) {
        let n = self.samples.len();
        let low_datapoint_mode = self.thresholds.is_low_datapoint_mode();
        let mut phase = ScanPhase::Ascending;
        let mut i = trigger;
        while i + 1 < n - 1 {
            i += 1;
            match phase {
                ScanPhase::Ascending => {
                    if self.is_peak_top(i) {
                        phase = ScanPhase::Descending { top: i };
                    }
                }
                ScanPhase::Descending { top } => {
                    if i - 1 < top + 2 {
                        continue;
                    }
                    if self.is_peak_end(i) {
                        break;
                    }
                    if low_datapoint_mode && self.is_broad_bottom(i) {
                        phase = ScanPhase::Ascending;
                    }
                }
            }
        }
        (i, phase)
    }

    /// Move the end onto the local minimum. Returns `None` when the loop guard
    /// trips.
    fn refine_end(&mut self, end: usize) -> Option<usize> {
        let n = self.samples.len();
        let mut steps_back = 0;
        for j in 0..REFINEMENT_STEPS {
            let k = end - j;
            if k == 0 || self.intensity(k) <= self.intensity(k - 1) {
                break;
            }
            steps_back += 1;
        }
        if steps_back > 0 {
            let resolved = end - steps_back;
            if self.last_resolved == Some(resolved) && resolved + LOOP_GUARD_TAIL > n {
                return None;
            }
            self.last_resolved = Some(resolved);
            return Some(resolved);
        }

        let mut steps_forward = 0;
        for j in 0..REFINEMENT_STEPS {
            let k = end + j;
            if k + 1 > n - 1 || self.intensity(k) <= self.intensity(k + 1) {
                break;
            }
            steps_forward += 1;
        }
        Some(end + steps_forward)
    }
}

impl Iterator for EdgeSearcher<'_> {
    type Item = PeakCandidate;

    fn next(&mut self) -> Option<Self::Item> {
        if self.halted {
            return None;
        }
        loop {
            let trigger = self.cursor;
            if self.is_scan_exhausted(trigger) {
                return None;
            }
            if !self.is_peak_start(trigger) {
                self.cursor += 1;
                continue;
            }

            let start = self.refine_start(trigger);
            let (end, phase) = self.walk_peak(trigger);
            let end = match self.refine_end(end) {
                Some(end) => end,
                None => {
                    debug!(
                        "Edge search halted at {end} after repeatedly resolving to the same point near the end of the series"
                    );
                    self.halted = true;
                    return None;
                }
            };
            self.cursor = end.max(trigger) + 1;

            if end < start {
                trace!("Skipping inverted window {start}-{end} triggered at {trigger}");
                continue;
            }
            let top = match phase {
                ScanPhase::Descending { top } => top,
                ScanPhase::Ascending => first_apex(self.samples, start, end),
            };
            let candidate = PeakCandidate::new(start, top, end);
            if !self.thresholds.is_wide_enough(&candidate) {
                trace!("Skipping narrow window {start}-{end} triggered at {trigger}");
                continue;
            }
            return Some(candidate);
        }
    }
}

/// The index of the first most intense sample in `left..=right`
pub(crate) fn first_apex(samples: &[Sample], left: usize, right: usize) -> usize {
    let mut best = left;
    for k in left..=right {
        if samples[k].intensity > samples[best].intensity {
            best = k;
        }
    }
    best
}
