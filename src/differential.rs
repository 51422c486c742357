//! Five-point derivative estimates over a smoothed trace and the noise levels
//! derived from their smallest fluctuations.
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::arrayops::median_mut;
use crate::sample::Sample;

/// First derivative stencil over `i - 2 ..= i + 2`
pub const FIRST_DIFF_COEFFICIENTS: [f64; 5] = [-0.2, -0.1, 0.0, 0.1, 0.2];
/// Second derivative stencil over `i - 2 ..= i + 2`
pub const SECOND_DIFF_COEFFICIENTS: [f64; 5] = [0.142857, -0.071429, -0.142857, -0.071429, 0.142857];

/// Fluctuations must be below this fraction of the largest one to count as noise
pub const NOISE_FRACTION: f64 = 0.05;
/// The noise level reported when no fluctuation qualifies
pub const MINIMUM_NOISE_LEVEL: f64 = 0.0001;

/// The stencil half-width
const MARGIN: usize = 2;

/// First and second derivative estimates for every sample in a series.
///
/// The `MARGIN` samples at either end have no full stencil and hold zero.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct DifferentialCoefficients {
    pub first_diff: Vec<f64>,
    pub second_diff: Vec<f64>,
    /// The largest `|first_diff|`
    pub max_first_diff: f64,
    /// The largest `|second_diff|` among points of negative curvature
    pub max_second_diff: f64,
    /// The largest `|I(i) - I(i - 1)|` over the interior
    pub max_amplitude_diff: f64,
}

/// Noise levels for amplitude, slope and curvature
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct NoiseEstimate {
    pub amplitude_noise: f64,
    pub slope_noise: f64,
    pub peak_top_noise: f64,
}

impl Default for NoiseEstimate {
    fn default() -> Self {
        Self {
            amplitude_noise: MINIMUM_NOISE_LEVEL,
            slope_noise: MINIMUM_NOISE_LEVEL,
            peak_top_noise: MINIMUM_NOISE_LEVEL,
        }
    }
}

impl DifferentialCoefficients {
    pub fn len(&self) -> usize {
        self.first_diff.len()
    }

    pub fn is_empty(&self) -> bool {
        self.first_diff.is_empty()
    }

    /// See [`estimate_slope_noise`]
    pub fn estimate_noise(&self, samples: &[Sample]) -> NoiseEstimate {
        estimate_slope_noise(samples, self)
    }
}

#[inline]
fn interior(n: usize) -> std::ops::Range<usize> {
    MARGIN..n.saturating_sub(MARGIN)
}

#[inline]
fn apply_stencil(stencil: &[f64; 5], window: &[Sample]) -> f64 {
    stencil
        .iter()
        .zip(window)
        .map(|(c, s)| c * s.intensity)
        .sum()
}

/// Compute derivative estimates over `samples`
pub fn differentiate(samples: &[Sample]) -> DifferentialCoefficients {
    let n = samples.len();
    let mut coefs = DifferentialCoefficients {
        first_diff: vec![0.0; n],
        second_diff: vec![0.0; n],
        ..Default::default()
    };
    for i in interior(n) {
        let window = &samples[i - MARGIN..=i + MARGIN];
        let first = apply_stencil(&FIRST_DIFF_COEFFICIENTS, window);
        let second = apply_stencil(&SECOND_DIFF_COEFFICIENTS, window);
        coefs.first_diff[i] = first;
        coefs.second_diff[i] = second;

        coefs.max_first_diff = coefs.max_first_diff.max(first.abs());
        if second < 0.0 {
            coefs.max_second_diff = coefs.max_second_diff.max(-second);
        }
        let amplitude_diff = (samples[i].intensity - samples[i - 1].intensity).abs();
        coefs.max_amplitude_diff = coefs.max_amplitude_diff.max(amplitude_diff);
    }
    coefs
}

fn noise_level(candidates: &mut [f64]) -> f64 {
    if candidates.is_empty() {
        MINIMUM_NOISE_LEVEL
    } else {
        median_mut(candidates)
    }
}

/// Estimate noise levels from the small fluctuations of `samples` and their
/// derivatives.
///
/// For each interior point, the magnitudes of the forward intensity step, the
/// first derivative and, where curvature is negative, the second derivative are
/// candidates when they are positive and strictly below [`NOISE_FRACTION`] of
/// their respective maxima. Each noise level is the median of its candidates,
/// or [`MINIMUM_NOISE_LEVEL`] when there are none, so no level is ever zero.
pub fn estimate_slope_noise(samples: &[Sample], coefs: &DifferentialCoefficients) -> NoiseEstimate {
    let n = samples.len();
    let amplitude_limit = coefs.max_amplitude_diff * NOISE_FRACTION;
    let slope_limit = coefs.max_first_diff * NOISE_FRACTION;
    let top_limit = coefs.max_second_diff * NOISE_FRACTION;

    let mut amplitude = Vec::new();
    let mut slope = Vec::new();
    let mut peak_top = Vec::new();
    let qualifies = |v: f64, limit: f64| v > 0.0 && v < limit;

    for i in interior(n) {
        let a = (samples[i + 1].intensity - samples[i].intensity).abs();
        if qualifies(a, amplitude_limit) {
            amplitude.push(a);
        }
        let f = coefs.first_diff[i].abs();
        if qualifies(f, slope_limit) {
            slope.push(f);
        }
        if coefs.second_diff[i] < 0.0 {
            let c = coefs.second_diff[i].abs();
            if qualifies(c, top_limit) {
                peak_top.push(c);
            }
        }
    }

    NoiseEstimate {
        amplitude_noise: noise_level(&mut amplitude),
        slope_noise: noise_level(&mut slope),
        peak_top_noise: noise_level(&mut peak_top),
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::test_data::{noisy_gaussian_series, series_from_intensities};
    use rstest::rstest;

    #[test]
    fn test_linear_ramp() {
        let ys: Vec<f64> = (0..10).map(|i| 2.0 * i as f64).collect();
        let series = series_from_intensities(&ys);
        let coefs = differentiate(series.as_slice());
        assert_eq!(coefs.len(), 10);
        for i in 0..10 {
            if (2..8).contains(&i) {
                assert!((coefs.first_diff[i] - 2.0).abs() < 1e-12);
                assert!(coefs.second_diff[i].abs() < 1e-4);
            } else {
                assert_eq!(coefs.first_diff[i], 0.0);
                assert_eq!(coefs.second_diff[i], 0.0);
            }
        }
        assert!((coefs.max_first_diff - 2.0).abs() < 1e-12);
        assert_eq!(coefs.max_amplitude_diff, 2.0);
    }

    #[test]
    fn test_curvature_maximum() {
        let series = series_from_intensities(&[0.0, 1.0, 4.0, 1.0, 0.0]);
        let coefs = differentiate(series.as_slice());
        let expected = 0.142857 * 0.0 - 0.071429 * 1.0 - 0.142857 * 4.0 - 0.071429 * 1.0;
        assert!((coefs.second_diff[2] - expected).abs() < 1e-12);
        assert!((coefs.max_second_diff + expected).abs() < 1e-12);
        assert_eq!(coefs.max_first_diff, 0.0);
        assert_eq!(coefs.max_amplitude_diff, 3.0);
    }

    #[rstest]
    #[case(0)]
    #[case(1)]
    #[case(4)]
    #[case(5)]
    fn test_short_and_flat_series_have_floor_noise(#[case] n: usize) {
        let series = series_from_intensities(&vec![7.0; n]);
        let coefs = differentiate(series.as_slice());
        let noise = coefs.estimate_noise(series.as_slice());
        assert_eq!(noise, NoiseEstimate::default());
    }

    #[test]
    fn test_noise_positive_and_small() {
        let series = noisy_gaussian_series(1000, &[(300.0, 8.0, 5000.0)], 100.0, 10.0, 42);
        let coefs = differentiate(series.as_slice());
        let noise = estimate_slope_noise(series.as_slice(), &coefs);
        assert!(noise.amplitude_noise > 0.0);
        assert!(noise.slope_noise > 0.0);
        assert!(noise.peak_top_noise > 0.0);
        assert!(noise.amplitude_noise < coefs.max_amplitude_diff * NOISE_FRACTION);
        assert!(noise.slope_noise < coefs.max_first_diff * NOISE_FRACTION);
        assert!(noise.peak_top_noise < coefs.max_second_diff * NOISE_FRACTION);
    }
}
