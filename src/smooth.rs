//! Smoothing kernels for [`SampleSeries`].
//!
//! Every method is parameterized by a single `level`, the half-width of its
//! neighborhood in samples. All of them preserve the length, ids, times and m/z
//! values of their input and only rewrite intensities. A `level` of zero is the
//! identity.
//!
//! Near the ends of a series, kernel filters truncate their kernel and
//! renormalize by the weight that remains in range, Savitzky-Golay shrinks its
//! window to the largest one that fits, and the local regressions slide their
//! neighborhood inside the series.
use std::ops::Deref;

use nalgebra::{Matrix3, Vector3};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::arrayops::median_mut;
use crate::pool::SamplePool;
use crate::sample::{AxisType, PooledSeries, Sample, SampleSeries};

const ROBUSTNESS_ITERATIONS: usize = 2;

/// The available smoothing strategies
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum SmoothingMethod {
    /// Uniformly weighted average of `2 * level + 1` samples
    SimpleMovingAverage,
    /// Triangular weights `level + 1 - |j|`
    #[default]
    LinearWeightedMovingAverage,
    /// Triangular weights measured in time rather than index, for unevenly
    /// spaced axes
    TimeBasedLinearWeightedMovingAverage,
    /// Quadratic Savitzky-Golay convolution
    SavitzkyGolay,
    /// Binomial coefficient weights `C(2 * level, k)`
    BinomialFilter,
    /// Robust locally weighted linear regression
    Lowess,
    /// Locally weighted quadratic regression
    Loess,
}

impl SmoothingMethod {
    /// Smooth `source` into `destination`, which must be the same length
    pub fn smooth_into(&self, source: &[Sample], level: usize, destination: &mut [Sample]) {
        assert_eq!(source.len(), destination.len());
        if level == 0 || source.len() < 2 {
            destination.copy_from_slice(source);
            return;
        }
        match self {
            Self::SimpleMovingAverage => simple_moving_average_into(source, level, destination),
            Self::LinearWeightedMovingAverage => {
                linear_weighted_moving_average_into(source, level, destination)
            }
            Self::TimeBasedLinearWeightedMovingAverage => {
                time_based_linear_weighted_moving_average_into(source, level, destination)
            }
            Self::SavitzkyGolay => savitzky_golay_into(source, level, destination),
            Self::BinomialFilter => binomial_filter_into(source, level, destination),
            Self::Lowess => lowess_into(source, level, destination),
            Self::Loess => loess_into(source, level, destination),
        }
    }

    /// Smooth `series` into a new owned series
    pub fn smooth<S: Deref<Target = [Sample]>>(
        &self,
        series: &SampleSeries<S>,
        level: usize,
    ) -> SampleSeries {
        let mut destination = vec![Sample::default(); series.len()];
        self.smooth_into(series.as_slice(), level, &mut destination);
        SampleSeries::from_storage(destination, series.axis_type, series.axis_unit)
    }

    /// Smooth `series` into a buffer checked out of `pool`
    pub fn smooth_pooled<'p, S: Deref<Target = [Sample]>>(
        &self,
        series: &SampleSeries<S>,
        level: usize,
        pool: &'p SamplePool,
    ) -> PooledSeries<'p> {
        let mut destination =
            pool.checkout_series_with(series.len(), series.axis_type, series.axis_unit);
        self.smooth_into(series.as_slice(), level, destination.as_mut_slice());
        destination
    }

    /// The method to actually use for a series measured along `axis_type`.
    ///
    /// Index-based linear weighting assumes evenly spaced samples, which does not
    /// hold along an m/z axis.
    pub fn for_axis(self, axis_type: AxisType) -> Self {
        match (self, axis_type) {
            (Self::LinearWeightedMovingAverage, AxisType::MZ) => {
                Self::TimeBasedLinearWeightedMovingAverage
            }
            (method, _) => method,
        }
    }
}

/// Convolve with a symmetric kernel `weights[|j|]`, renormalizing by the
/// in-range weight near the edges
fn symmetric_kernel_into(source: &[Sample], weights: &[f64], destination: &mut [Sample]) {
    let n = source.len();
    let level = weights.len() - 1;
    for (i, out) in destination.iter_mut().enumerate() {
        let lo = i.saturating_sub(level);
        let hi = (i + level).min(n - 1);
        let mut acc = 0.0;
        let mut weight_sum = 0.0;
        for (k, s) in source[lo..=hi].iter().enumerate() {
            let w = weights[(lo + k).abs_diff(i)];
            acc += s.intensity * w;
            weight_sum += w;
        }
        let value = if weight_sum > 0.0 {
            acc / weight_sum
        } else {
            source[i].intensity
        };
        *out = source[i].with_intensity(value);
    }
}

fn simple_moving_average_into(source: &[Sample], level: usize, destination: &mut [Sample]) {
    let weights = vec![1.0; level + 1];
    symmetric_kernel_into(source, &weights, destination)
}

fn linear_weighted_moving_average_into(
    source: &[Sample],
    level: usize,
    destination: &mut [Sample],
) {
    let weights: Vec<f64> = (0..=level).map(|j| (level + 1 - j) as f64).collect();
    symmetric_kernel_into(source, &weights, destination)
}

fn binomial_filter_into(source: &[Sample], level: usize, destination: &mut [Sample]) {
    // C(2L, L + j) for j in 0..=L, walking outward from the central coefficient
    let width = 2 * level;
    let mut weights = Vec::with_capacity(level + 1);
    let mut coef = 1.0f64;
    for k in 0..level {
        coef = coef * (width - k) as f64 / (k + 1) as f64;
    }
    weights.push(coef);
    for j in 1..=level {
        let k = level + j;
        coef = coef * (width - k + 1) as f64 / k as f64;
        weights.push(coef);
    }
    symmetric_kernel_into(source, &weights, destination)
}

fn time_based_linear_weighted_moving_average_into(
    source: &[Sample],
    level: usize,
    destination: &mut [Sample],
) {
    let n = source.len();
    let spacing = (source[n - 1].time - source[0].time) / (n - 1) as f64;
    if spacing <= 0.0 {
        return linear_weighted_moving_average_into(source, level, destination);
    }
    let tau = (level + 1) as f64 * spacing;
    for (i, out) in destination.iter_mut().enumerate() {
        let center = source[i].time;
        let mut acc = source[i].intensity;
        let mut weight_sum = 1.0;
        for s in source[..i].iter().rev() {
            let dt = center - s.time;
            if dt >= tau {
                break;
            }
            let w = 1.0 - dt / tau;
            acc += s.intensity * w;
            weight_sum += w;
        }
        for s in source[i + 1..].iter() {
            let dt = s.time - center;
            if dt >= tau {
                break;
            }
            let w = 1.0 - dt / tau;
            acc += s.intensity * w;
            weight_sum += w;
        }
        *out = source[i].with_intensity(acc / weight_sum);
    }
}

/// Quadratic Savitzky-Golay smoothing coefficient for offset `k` in a window of
/// half-width `m`
pub fn savitzky_golay_coefficient(m: usize, k: isize) -> f64 {
    let m = m as f64;
    let k = k as f64;
    (3.0 * (3.0 * m * m + 3.0 * m - 1.0) - 15.0 * k * k)
        / ((2.0 * m - 1.0) * (2.0 * m + 1.0) * (2.0 * m + 3.0))
}

fn savitzky_golay_into(source: &[Sample], level: usize, destination: &mut [Sample]) {
    let n = source.len();
    let tables: Vec<Vec<f64>> = (0..=level)
        .map(|m| {
            (-(m as isize)..=m as isize)
                .map(|k| savitzky_golay_coefficient(m, k))
                .collect()
        })
        .collect();
    for (i, out) in destination.iter_mut().enumerate() {
        let m = level.min(i).min(n - 1 - i);
        if m == 0 {
            *out = source[i];
            continue;
        }
        let value: f64 = tables[m]
            .iter()
            .zip(source[i - m..=i + m].iter())
            .map(|(c, s)| c * s.intensity)
            .sum();
        *out = source[i].with_intensity(value);
    }
}

/// The neighborhood `lo..=hi` of `2 * level + 3` samples used by the local
/// regressions, slid to stay inside the series, and its distance scale
fn regression_window(source: &[Sample], i: usize, level: usize) -> (usize, usize, f64) {
    let n = source.len();
    let width = (2 * level + 3).min(n);
    let lo = i.saturating_sub(level + 1).min(n - width);
    let hi = lo + width - 1;
    let center = source[i].time;
    let scale = (center - source[lo].time).max(source[hi].time - center);
    (lo, hi, scale)
}

#[inline]
fn tricube(distance: f64, scale: f64) -> f64 {
    if scale <= 0.0 {
        return 1.0;
    }
    let u = (distance / scale).abs();
    if u >= 1.0 {
        0.0
    } else {
        let v = 1.0 - u * u * u;
        v * v * v
    }
}

#[inline]
fn bisquare(residual: f64, scale: f64) -> f64 {
    let u = residual / (6.0 * scale);
    if u.abs() >= 1.0 {
        0.0
    } else {
        let v = 1.0 - u * u;
        v * v
    }
}

/// Weighted least squares line through `(x, y)` evaluated at `x = 0`
fn weighted_linear_at_zero(x: &[f64], y: &[f64], w: &[f64]) -> Option<f64> {
    let (mut sw, mut swx, mut swy, mut swxx, mut swxy) = (0.0, 0.0, 0.0, 0.0, 0.0);
    for ((x, y), w) in x.iter().zip(y).zip(w) {
        sw += w;
        swx += w * x;
        swy += w * y;
        swxx += w * x * x;
        swxy += w * x * y;
    }
    if sw <= 0.0 {
        return None;
    }
    let denom = sw * swxx - swx * swx;
    if denom.abs() <= f64::EPSILON * sw * swxx.max(1.0) {
        Some(swy / sw)
    } else {
        Some((swxx * swy - swx * swxy) / denom)
    }
}

/// Weighted least squares parabola through `(x, y)` evaluated at `x = 0`
fn weighted_quadratic_at_zero(x: &[f64], y: &[f64], w: &[f64]) -> Option<f64> {
    let mut normal = Matrix3::<f64>::zeros();
    let mut rhs = Vector3::<f64>::zeros();
    for ((x, y), w) in x.iter().zip(y).zip(w) {
        let basis = Vector3::new(1.0, *x, x * x);
        normal += basis * basis.transpose() * *w;
        rhs += basis * (w * y);
    }
    normal
        .lu()
        .solve(&rhs)
        .map(|beta| beta[0])
        .filter(|v| v.is_finite())
}

fn local_regression_into(
    source: &[Sample],
    level: usize,
    destination: &mut [Sample],
    quadratic: bool,
    robustness_iterations: usize,
) {
    let n = source.len();
    let mut robustness = vec![1.0; n];
    let mut residuals = vec![0.0; n];
    let mut x = Vec::with_capacity(2 * level + 3);
    let mut y = Vec::with_capacity(2 * level + 3);
    let mut w = Vec::with_capacity(2 * level + 3);

    for iteration in 0..=robustness_iterations {
        for (i, out) in destination.iter_mut().enumerate() {
            let (lo, hi, scale) = regression_window(source, i, level);
            let center = source[i].time;
            x.clear();
            y.clear();
            w.clear();
            for (k, s) in source[lo..=hi].iter().enumerate() {
                let dx = s.time - center;
                x.push(if quadratic && scale > 0.0 { dx / scale } else { dx });
                y.push(s.intensity);
                w.push(tricube(dx, scale) * robustness[lo + k]);
            }
            let fit = if quadratic {
                weighted_quadratic_at_zero(&x, &y, &w)
                    .or_else(|| weighted_linear_at_zero(&x, &y, &w))
            } else {
                weighted_linear_at_zero(&x, &y, &w)
            };
            *out = source[i].with_intensity(fit.unwrap_or(source[i].intensity));
        }

        if iteration == robustness_iterations {
            break;
        }
        for (r, (s, fit)) in residuals
            .iter_mut()
            .zip(source.iter().zip(destination.iter()))
        {
            *r = (s.intensity - fit.intensity).abs();
        }
        let residual_scale = median_mut(&mut residuals);
        if residual_scale <= f64::EPSILON * 1e3 {
            break;
        }
        for (rw, (s, fit)) in robustness
            .iter_mut()
            .zip(source.iter().zip(destination.iter()))
        {
            *rw = bisquare(s.intensity - fit.intensity, residual_scale);
        }
    }
}

fn lowess_into(source: &[Sample], level: usize, destination: &mut [Sample]) {
    local_regression_into(source, level, destination, false, ROBUSTNESS_ITERATIONS)
}

fn loess_into(source: &[Sample], level: usize, destination: &mut [Sample]) {
    local_regression_into(source, level, destination, true, 0)
}

pub fn simple_moving_average<S: Deref<Target = [Sample]>>(
    series: &SampleSeries<S>,
    level: usize,
) -> SampleSeries {
    SmoothingMethod::SimpleMovingAverage.smooth(series, level)
}

pub fn linear_weighted_moving_average<S: Deref<Target = [Sample]>>(
    series: &SampleSeries<S>,
    level: usize,
) -> SampleSeries {
    SmoothingMethod::LinearWeightedMovingAverage.smooth(series, level)
}

pub fn time_based_linear_weighted_moving_average<S: Deref<Target = [Sample]>>(
    series: &SampleSeries<S>,
    level: usize,
) -> SampleSeries {
    SmoothingMethod::TimeBasedLinearWeightedMovingAverage.smooth(series, level)
}

pub fn savitzky_golay<S: Deref<Target = [Sample]>>(
    series: &SampleSeries<S>,
    level: usize,
) -> SampleSeries {
    SmoothingMethod::SavitzkyGolay.smooth(series, level)
}

pub fn binomial_filter<S: Deref<Target = [Sample]>>(
    series: &SampleSeries<S>,
    level: usize,
) -> SampleSeries {
    SmoothingMethod::BinomialFilter.smooth(series, level)
}

pub fn lowess<S: Deref<Target = [Sample]>>(series: &SampleSeries<S>, level: usize) -> SampleSeries {
    SmoothingMethod::Lowess.smooth(series, level)
}

pub fn loess<S: Deref<Target = [Sample]>>(series: &SampleSeries<S>, level: usize) -> SampleSeries {
    SmoothingMethod::Loess.smooth(series, level)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::test_data::{gaussian_series, noisy_gaussian_series};
    use rstest::rstest;

    const ALL_METHODS: [SmoothingMethod; 7] = [
        SmoothingMethod::SimpleMovingAverage,
        SmoothingMethod::LinearWeightedMovingAverage,
        SmoothingMethod::TimeBasedLinearWeightedMovingAverage,
        SmoothingMethod::SavitzkyGolay,
        SmoothingMethod::BinomialFilter,
        SmoothingMethod::Lowess,
        SmoothingMethod::Loess,
    ];

    fn intensities<S: Deref<Target = [Sample]>>(series: &SampleSeries<S>) -> Vec<f64> {
        series.intensities().collect()
    }

    #[test]
    fn test_lwma_values() {
        let series = SampleSeries::from_arrays(&[0.0, 1.0, 2.0, 3.0], &[0.0, 4.0, 8.0, 0.0]).unwrap();
        let smoothed = linear_weighted_moving_average(&series, 1);
        let expected = [4.0 / 3.0, 4.0, 5.0, 8.0 / 3.0];
        for (a, b) in intensities(&smoothed).iter().zip(expected) {
            assert!((a - b).abs() < 1e-12, "{a} != {b}");
        }
    }

    #[test]
    fn test_simple_moving_average_values() {
        let series = SampleSeries::from_arrays(&[0.0, 1.0, 2.0, 3.0], &[3.0, 6.0, 0.0, 3.0]).unwrap();
        let smoothed = simple_moving_average(&series, 1);
        assert_eq!(intensities(&smoothed), vec![4.5, 3.0, 3.0, 1.5]);
    }

    #[test]
    fn test_binomial_weights() {
        // An impulse exposes the interior kernel C(4, k) / 16
        let mut ys = vec![0.0; 9];
        ys[4] = 16.0;
        let ts: Vec<f64> = (0..9).map(|i| i as f64).collect();
        let series = SampleSeries::from_arrays(&ts, &ys).unwrap();
        let smoothed = binomial_filter(&series, 2);
        let values = intensities(&smoothed);
        assert_eq!(&values[2..7], &[1.0, 4.0, 6.0, 4.0, 1.0]);
    }

    #[test]
    fn test_savitzky_golay_coefficients() {
        let c: Vec<f64> = (-2..=2).map(|k| savitzky_golay_coefficient(2, k) * 35.0).collect();
        let expected = [-3.0, 12.0, 17.0, 12.0, -3.0];
        for (a, b) in c.iter().zip(expected) {
            assert!((a - b).abs() < 1e-9);
        }
        let total: f64 = (-4..=4).map(|k| savitzky_golay_coefficient(4, k)).sum();
        assert!((total - 1.0).abs() < 1e-12);
    }

    #[rstest]
    #[case(SmoothingMethod::SavitzkyGolay)]
    #[case(SmoothingMethod::Lowess)]
    #[case(SmoothingMethod::Loess)]
    fn test_polynomial_methods_preserve_lines(#[case] method: SmoothingMethod) {
        let ts: Vec<f64> = (0..30).map(|i| i as f64 * 0.1).collect();
        let ys: Vec<f64> = ts.iter().map(|t| 3.0 * t + 2.0).collect();
        let series = SampleSeries::from_arrays(&ts, &ys).unwrap();
        let smoothed = method.smooth(&series, 3);
        for (a, b) in intensities(&smoothed).iter().zip(ys.iter()) {
            assert!((a - b).abs() < 1e-6, "{method:?}: {a} != {b}");
        }
    }

    #[test]
    fn test_time_based_matches_index_on_uniform_grid() {
        let series = noisy_gaussian_series(200, &[(100.0, 8.0, 500.0)], 10.0, 5.0, 11);
        let a = linear_weighted_moving_average(&series, 3);
        let b = time_based_linear_weighted_moving_average(&series, 3);
        for (x, y) in intensities(&a).iter().zip(intensities(&b)) {
            assert!((x - y).abs() < 1e-6, "{x} != {y}");
        }
    }

    #[rstest]
    fn test_preserves_shape(
        #[values(
            SmoothingMethod::SimpleMovingAverage,
            SmoothingMethod::LinearWeightedMovingAverage,
            SmoothingMethod::TimeBasedLinearWeightedMovingAverage,
            SmoothingMethod::SavitzkyGolay,
            SmoothingMethod::BinomialFilter,
            SmoothingMethod::Lowess,
            SmoothingMethod::Loess
        )]
        method: SmoothingMethod,
        #[values(0, 1, 2, 5)] level: usize,
    ) {
        let series = noisy_gaussian_series(60, &[(30.0, 4.0, 100.0)], 5.0, 2.0, 3);
        let smoothed = method.smooth(&series, level);
        assert_eq!(smoothed.len(), series.len());
        for (a, b) in smoothed.iter().zip(series.iter()) {
            assert_eq!(a.id, b.id);
            assert_eq!(a.time, b.time);
            assert!(a.intensity.is_finite());
        }
        assert!(smoothed.windows(2).all(|w| w[0].time <= w[1].time));
        if level == 0 {
            assert_eq!(smoothed.as_slice(), series.as_slice());
        }
    }

    #[test]
    fn test_short_series() {
        for method in ALL_METHODS {
            for n in 0..4 {
                let ts: Vec<f64> = (0..n).map(|i| i as f64).collect();
                let ys: Vec<f64> = (0..n).map(|i| (i * i) as f64).collect();
                let series = SampleSeries::from_arrays(&ts, &ys).unwrap();
                let smoothed = method.smooth(&series, 2);
                assert_eq!(smoothed.len(), n);
            }
        }
    }

    #[test]
    fn test_smoothing_reduces_noise() {
        let clean = gaussian_series(200, &[(100.0, 10.0, 1000.0)], 0.05);
        let noisy = noisy_gaussian_series(200, &[(100.0, 10.0, 1000.0)], 0.0, 50.0, 5);
        let error = |s: &[Sample]| -> f64 {
            s.iter()
                .zip(clean.iter())
                .map(|(a, b)| (a.intensity - b.intensity).powi(2))
                .sum()
        };
        let before = error(noisy.as_slice());
        for method in ALL_METHODS {
            let smoothed = method.smooth(&noisy, 3);
            assert!(error(smoothed.as_slice()) < before, "{method:?}");
        }
    }

    #[test]
    fn test_pooled() {
        let pool = SamplePool::new();
        let series = gaussian_series(50, &[(25.0, 3.0, 10.0)], 0.1);
        {
            let smoothed = SmoothingMethod::LinearWeightedMovingAverage.smooth_pooled(&series, 1, &pool);
            assert_eq!(pool.outstanding(), 1);
            let owned = linear_weighted_moving_average(&series, 1);
            assert_eq!(smoothed.as_slice(), owned.as_slice());
        }
        assert_eq!(pool.outstanding(), 0);
    }

    #[test]
    fn test_for_axis() {
        assert_eq!(
            SmoothingMethod::LinearWeightedMovingAverage.for_axis(AxisType::MZ),
            SmoothingMethod::TimeBasedLinearWeightedMovingAverage
        );
        assert_eq!(
            SmoothingMethod::Loess.for_axis(AxisType::MZ),
            SmoothingMethod::Loess
        );
        assert_eq!(
            SmoothingMethod::LinearWeightedMovingAverage.for_axis(AxisType::RetentionTime),
            SmoothingMethod::LinearWeightedMovingAverage
        );
    }
}
