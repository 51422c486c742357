//! Deterministic synthetic chromatograms for tests, benchmarks and the demo binary.
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::sample::{Sample, SampleSeries};

/// The sampling interval used when none is given
pub const DEFAULT_SPACING: f64 = 0.05;

/// The sum of `(center, sigma, height)` Gaussian bumps at sample index `i`
pub fn gaussian_sum(i: usize, peaks: &[(f64, f64, f64)]) -> f64 {
    let x = i as f64;
    peaks
        .iter()
        .map(|(center, sigma, height)| {
            height * (-((x - center).powi(2)) / (2.0 * sigma * sigma)).exp()
        })
        .sum()
}

/// `n` samples spaced `spacing` apart with Gaussian bumps whose centers and
/// widths are given in sample indices
pub fn gaussian_series(n: usize, peaks: &[(f64, f64, f64)], spacing: f64) -> SampleSeries {
    (0..n)
        .map(|i| Sample::new(i as u32, i as f64 * spacing, 0.0, gaussian_sum(i, peaks)))
        .collect()
}

/// As [`gaussian_series`] on a constant `baseline`, with uniform noise in
/// `[-noise_amplitude, noise_amplitude)` drawn from a [`StdRng`] seeded with `seed`
pub fn noisy_gaussian_series(
    n: usize,
    peaks: &[(f64, f64, f64)],
    baseline: f64,
    noise_amplitude: f64,
    seed: u64,
) -> SampleSeries {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..n)
        .map(|i| {
            let noise = (rng.gen::<f64>() - 0.5) * 2.0 * noise_amplitude;
            Sample::new(
                i as u32,
                i as f64 * DEFAULT_SPACING,
                0.0,
                baseline + gaussian_sum(i, peaks) + noise,
            )
        })
        .collect()
}

/// A series with the given intensities at unit time spacing
pub fn series_from_intensities(intensities: &[f64]) -> SampleSeries {
    intensities
        .iter()
        .enumerate()
        .map(|(i, y)| Sample::new(i as u32, i as f64, 0.0, *y))
        .collect()
}
