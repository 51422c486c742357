//! Accept or reject candidate windows and measure the peaks that pass.
use log::trace;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::baseline::GlobalChromatogramProperty;
use crate::differential::NoiseEstimate;
use crate::edge_search::{first_apex, PeakCandidate};
use crate::peak::PeakDetectionResult;
use crate::peak_statistics::{
    aboutzero, gaussian_half_area, gaussian_similarity, ideal_slope_value, purity, symmetry,
    PeakAreas, SideStatistics,
};
use crate::sample::Sample;

/// Windows spanning this many samples or fewer cannot hold a peak
const MINIMUM_WINDOW: usize = 3;

/// Scores candidate windows against the noise and baseline of their chromatogram
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PeakScorer {
    /// How far, in samples, the apex may lie from the candidate's top and the
    /// edges from the apex
    pub average_peak_width: usize,
    pub minimum_amplitude: f64,
    pub amplitude_noise_fold: f64,
    /// The factor the global noise was scaled by, undone to report the noise level
    pub noise_factor: f64,
    /// The global noise level of the chromatogram
    pub noise: f64,
    /// The amplitude noise estimated from derivative fluctuations
    pub amplitude_noise: f64,
    pub is_high_baseline: bool,
    pub baseline_median: f64,
}

impl Default for PeakScorer {
    fn default() -> Self {
        Self {
            average_peak_width: 20,
            minimum_amplitude: 1.0,
            amplitude_noise_fold: 4.0,
            noise_factor: 3.0,
            noise: 0.0,
            amplitude_noise: 0.0,
            is_high_baseline: false,
            baseline_median: 0.0,
        }
    }
}

impl PeakScorer {
    pub fn new(
        average_peak_width: usize,
        minimum_amplitude: f64,
        amplitude_noise_fold: f64,
        noise_factor: f64,
    ) -> Self {
        Self {
            average_peak_width,
            minimum_amplitude,
            amplitude_noise_fold,
            noise_factor,
            ..Default::default()
        }
    }

    /// Take the noise and baseline character of the chromatogram being scored
    pub fn with_chromatogram(
        mut self,
        property: &GlobalChromatogramProperty<'_>,
        noise: &NoiseEstimate,
    ) -> Self {
        self.noise = property.noise;
        self.is_high_baseline = property.is_high_baseline;
        self.baseline_median = property.baseline_median;
        self.amplitude_noise = noise.amplitude_noise;
        self
    }

    /// The noise level reported on results
    pub fn estimated_noise(&self) -> f64 {
        (self.noise / self.noise_factor).max(1.0)
    }

    pub fn score_candidate(
        &self,
        samples: &[Sample],
        candidate: &PeakCandidate,
    ) -> Option<PeakDetectionResult> {
        self.score(samples, candidate.start, candidate.end, candidate.top)
    }

    /// Score the window `start..=end` of `samples` around `approximate_top`.
    ///
    /// The apex is re-located within `average_peak_width` of `approximate_top`,
    /// then the window is shrunk to the samples that fall monotonically away from
    /// it. Returns `None` when the window is too narrow, the apex does not rise
    /// above the edges, or the peak height fails any of the noise, amplitude or
    /// baseline gates.
    pub fn score(
        &self,
        samples: &[Sample],
        start: usize,
        end: usize,
        approximate_top: usize,
    ) -> Option<PeakDetectionResult> {
        if end < start || end - start + 1 <= MINIMUM_WINDOW {
            trace!("Rejecting {start}-{end}: window too narrow");
            return None;
        }
        let s = |k: usize| samples[k].intensity;
        if s(approximate_top) < s(start) && s(approximate_top) < s(end) {
            trace!("Rejecting {start}-{end}: apex {approximate_top} below both edges");
            return None;
        }

        let width = self.average_peak_width;
        let top = first_apex(
            samples,
            start.max(approximate_top.saturating_sub(width)),
            end.min(approximate_top + width),
        );
        let mut left = top;
        let left_limit = start.max(top.saturating_sub(width));
        while left > left_limit && s(left - 1) <= s(left) {
            left -= 1;
        }
        let mut right = top;
        let right_limit = end.min(top + width);
        while right < right_limit && s(right + 1) <= s(right) {
            right += 1;
        }
        if right - left + 1 <= MINIMUM_WINDOW {
            trace!("Rejecting {start}-{end}: window {left}-{right} around {top} too narrow");
            return None;
        }

        let apex = s(top);
        let peak_height = apex - s(left).min(s(right));
        if peak_height < self.noise
            || peak_height < self.minimum_amplitude
            || peak_height < self.amplitude_noise * self.amplitude_noise_fold
        {
            trace!("Rejecting {left}-{top}-{right}: height {peak_height} below noise or minimum amplitude");
            return None;
        }
        if self.is_high_baseline && s(left) < self.baseline_median && s(right) < self.baseline_median {
            trace!("Rejecting {left}-{top}-{right}: edges fall below the high baseline");
            return None;
        }

        let left_side = SideStatistics::measure(samples, top, left);
        let right_side = SideStatistics::measure(samples, top, right);

        // The Gaussian model is fit to the side with the higher edge, the base
        // peak value and area floor come from the lower one
        let (normalize, half_height_index, lower_edge) = if s(left) >= s(right) {
            (apex - s(left), left_side.half_height_index, s(right))
        } else {
            (apex - s(right), right_side.half_height_index, s(left))
        };
        let base_peak_value = if aboutzero(apex) {
            0.0
        } else {
            ((apex - lower_edge) / apex).abs()
        };

        let time = |k: usize| samples[k].time;
        let symmetry_value = symmetry(
            (time(top) - time(left_side.five_percent_index)).abs(),
            (time(top) - time(right_side.five_percent_index)).abs(),
        );

        let gaussian_area = gaussian_half_area(normalize, (time(half_height_index) - time(top)).abs());
        let areas = PeakAreas::measure(samples, left, top, right, lower_edge);
        let gaussian_similarity_value = gaussian_similarity(gaussian_area, areas.left, areas.right);

        let ideal_slope = ideal_slope_value(
            left_side.ideal_slope + right_side.ideal_slope,
            left_side.non_ideal_slope + right_side.non_ideal_slope,
        );
        let purity_value = purity(
            gaussian_similarity_value,
            base_peak_value,
            symmetry_value,
            ideal_slope,
        );
        let estimated_noise = self.estimated_noise();

        Some(PeakDetectionResult {
            peak_id: 0,
            left_index: left,
            top_index: top,
            right_index: right,
            left_id: samples[left].id,
            top_id: samples[top].id,
            right_id: samples[right].id,
            left_time: time(left),
            top_time: time(top),
            right_time: time(right),
            left_intensity: s(left),
            top_intensity: apex,
            right_intensity: s(right),
            top_mz: samples[top].mz,
            area_above_zero: areas.above_zero,
            area_above_baseline: areas.above_baseline,
            symmetry: symmetry_value,
            gaussian_similarity: gaussian_similarity_value,
            base_peak_value,
            ideal_slope,
            shapeness: (left_side.shapeness + right_side.shapeness) / 2.0,
            purity: purity_value,
            peak_height,
            estimated_noise,
            signal_to_noise: peak_height / estimated_noise,
            amplitude_order_value: 0,
            amplitude_score_value: 0.0,
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::sample::SampleSeries;
    use crate::test_data::{gaussian_series, series_from_intensities};
    use rstest::{fixture, rstest};
    use std::f64::consts::LN_2;

    /// A Gaussian whose half width at half maximum falls exactly on a sample
    #[fixture]
    #[once]
    fn gaussian() -> SampleSeries {
        let sigma = 10.0 / (2.0 * LN_2).sqrt();
        gaussian_series(121, &[(60.0, sigma, 1000.0)], 0.05)
    }

    fn scorer(average_peak_width: usize) -> PeakScorer {
        PeakScorer {
            average_peak_width,
            noise: 3.0,
            amplitude_noise: 0.0001,
            ..Default::default()
        }
    }

    #[rstest]
    fn test_ideal_gaussian(gaussian: &SampleSeries) {
        let peak = scorer(60).score(gaussian.as_slice(), 0, 120, 60).unwrap();
        assert_eq!((peak.left_index, peak.top_index, peak.right_index), (0, 60, 120));
        assert!((peak.symmetry - 1.0).abs() < 1e-9);
        assert!((peak.gaussian_similarity - 1.0).abs() < 0.05);
        assert!((peak.base_peak_value - 1.0).abs() < 1e-6);
        assert!((peak.ideal_slope - 1.0).abs() < 1e-12);
        assert!((peak.purity - 1.0).abs() < 0.05);
        assert!((peak.peak_height - 1000.0).abs() < 1e-3);
        assert_eq!(peak.estimated_noise, 1.0);
        assert!((peak.signal_to_noise - peak.peak_height).abs() < 1e-9);
        assert!((peak.top_time - 3.0).abs() < 1e-12);
        assert!(peak.area_above_zero > 0.0);
    }

    #[rstest]
    fn test_window_limited_by_average_width(gaussian: &SampleSeries) {
        let peak = scorer(20).score(gaussian.as_slice(), 0, 120, 55).unwrap();
        assert_eq!((peak.left_index, peak.top_index, peak.right_index), (40, 60, 80));
        assert!((peak.symmetry - 1.0).abs() < 1e-9);
        assert!((peak.base_peak_value - 0.9375).abs() < 1e-3);
        assert!((peak.peak_height - 937.5).abs() < 0.1);
    }

    #[rstest]
    #[case(&[0.0, 100.0, 400.0, 800.0, 1000.0, 900.0, 700.0, 500.0, 300.0], 1.0)]
    #[case(&[300.0, 500.0, 700.0, 900.0, 1000.0, 800.0, 400.0, 100.0, 0.0], 0.75)]
    fn test_uneven_edges(#[case] intensities: &[f64], #[case] expected_symmetry: f64) {
        let series = series_from_intensities(intensities);
        let peak = scorer(20).score(series.as_slice(), 0, 8, 4).unwrap();
        assert_eq!((peak.left_index, peak.top_index, peak.right_index), (0, 4, 8));
        // Modelled from the side ending at 300: height 700, half width 2,
        // against half areas of 1800 and 2750 above the zero edge
        let model = gaussian_half_area(700.0, 2.0);
        let expected = (model / 2750.0 + model / 1800.0) / 2.0;
        assert!((peak.gaussian_similarity - expected).abs() < 1e-9);
        assert!((peak.gaussian_similarity - 0.684915).abs() < 1e-6);
        assert_eq!(peak.base_peak_value, 1.0);
        assert_eq!(peak.symmetry, expected_symmetry);
        assert_eq!(peak.peak_height, 1000.0);
    }

    #[rstest]
    fn test_rejections(gaussian: &SampleSeries) {
        assert!(scorer(20).score(gaussian.as_slice(), 48, 50, 49).is_none());
        let noisy = PeakScorer {
            noise: 2000.0,
            ..scorer(60)
        };
        assert!(noisy.score(gaussian.as_slice(), 0, 120, 60).is_none());
        let strict = PeakScorer {
            minimum_amplitude: 5000.0,
            ..scorer(60)
        };
        assert!(strict.score(gaussian.as_slice(), 0, 120, 60).is_none());
    }

    #[test]
    fn test_apex_below_edges() {
        let series = series_from_intensities(&[10.0, 8.0, 2.0, 1.0, 2.0, 8.0, 10.0]);
        assert!(scorer(20).score(series.as_slice(), 0, 6, 3).is_none());
    }

    #[test]
    fn test_high_baseline_gate() {
        let series = series_from_intensities(&[50.0, 60.0, 80.0, 200.0, 80.0, 60.0, 50.0]);
        let open = PeakScorer {
            is_high_baseline: true,
            baseline_median: 40.0,
            ..scorer(20)
        };
        assert!(open.score(series.as_slice(), 0, 6, 3).is_some());
        let gated = PeakScorer {
            baseline_median: 100.0,
            ..open
        };
        assert!(gated.score(series.as_slice(), 0, 6, 3).is_none());
    }
}
