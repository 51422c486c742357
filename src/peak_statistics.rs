//! Shape statistics describing how closely a chromatographic peak resembles an
//! ideal Gaussian elution profile.
use std::f64::consts::{LN_2, PI};

use num_traits::{Float, FromPrimitive};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::sample::Sample;

pub fn _isclose<T>(x: T, y: T, rtol: T, atol: T) -> bool
where
    T: Float,
{
    (x - y).abs() <= (atol + rtol * y.abs())
}

pub fn isclose<T>(x: T, y: T) -> bool
where
    T: Float + FromPrimitive,
{
    _isclose(
        x,
        y,
        T::from_f64(1e-5).unwrap_or_else(T::epsilon),
        T::from_f64(1e-8).unwrap_or_else(T::epsilon),
    )
}

pub fn aboutzero<T>(x: T) -> bool
where
    T: Float + FromPrimitive,
{
    isclose(x, T::zero())
}

/// The fraction of the apex height located by [`SideStatistics::half_height_index`]
pub const HALF_HEIGHT: f64 = 0.5;
/// The fraction of the apex height located by [`SideStatistics::five_percent_index`]
pub const FIVE_PERCENT_HEIGHT: f64 = 0.05;

/// Statistics gathered walking from the apex out to one edge of a peak
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SideStatistics {
    /// The sample nearest half of the apex height above the edge
    pub half_height_index: usize,
    /// The sample nearest 5% of the apex height above the edge
    pub five_percent_index: usize,
    /// The steepest normalized drop from the apex, `(I(top) - I(j)) / |t(top) - t(j)| / sqrt(I(top))`
    pub shapeness: f64,
    /// Total intensity change of steps that fall away from the apex
    pub ideal_slope: f64,
    /// Total intensity change of steps that rise away from the apex
    pub non_ideal_slope: f64,
}

impl SideStatistics {
    /// Measure the samples between `top` and `edge` inclusive, visiting them in
    /// ascending index order. The nearest-height searches keep the first best
    /// match, so ties resolve to the lowest index.
    pub fn measure(samples: &[Sample], top: usize, edge: usize) -> Self {
        let apex = samples[top].intensity;
        let floor = samples[edge].intensity;
        let half_target = (apex - floor) * HALF_HEIGHT;
        let five_target = (apex - floor) * FIVE_PERCENT_HEIGHT;

        let mut stats = Self {
            half_height_index: top,
            five_percent_index: top,
            shapeness: 0.0,
            ideal_slope: 0.0,
            non_ideal_slope: 0.0,
        };
        let mut half_distance = f64::INFINITY;
        let mut five_distance = f64::INFINITY;
        let mut shapeness: Option<f64> = None;

        let rightward = edge >= top;
        let (first, last) = if rightward { (top, edge) } else { (edge, top) };

        for j in first..=last {
            let height = samples[j].intensity - floor;
            let d = (half_target - height).abs();
            if d < half_distance {
                half_distance = d;
                stats.half_height_index = j;
            }
            let d = (five_target - height).abs();
            if d < five_distance {
                five_distance = d;
                stats.five_percent_index = j;
            }
            if j == top {
                continue;
            }

            let dt = (samples[top].time - samples[j].time).abs();
            if dt > 0.0 && apex > 0.0 {
                let v = (apex - samples[j].intensity) / dt / apex.sqrt();
                shapeness = Some(shapeness.map_or(v, |s| s.max(v)));
            }

            let toward_top = if rightward { j - 1 } else { j + 1 };
            let step = samples[toward_top].intensity - samples[j].intensity;
            if step >= 0.0 {
                stats.ideal_slope += step.abs();
            } else {
                stats.non_ideal_slope += step.abs();
            }
        }
        stats.shapeness = shapeness.unwrap_or_default();
        stats
    }
}

/// The ratio of the shorter to the longer apex-to-5%-point distance, zero when
/// both are zero
pub fn symmetry(left_distance: f64, right_distance: f64) -> f64 {
    let longest = left_distance.max(right_distance);
    if longest > 0.0 {
        left_distance.min(right_distance) / longest
    } else {
        0.0
    }
}

/// The area of one half of a Gaussian of height `normalize` whose half width at
/// half maximum is `half_width`
pub fn gaussian_half_area(normalize: f64, half_width: f64) -> f64 {
    let sigma = half_width / (2.0 * LN_2).sqrt();
    normalize * sigma * (2.0 * PI).sqrt() / 2.0
}

/// The ratio of the smaller to the larger of two areas, zero if either is not
/// positive
pub fn area_similarity(gaussian_area: f64, observed_area: f64) -> f64 {
    if gaussian_area <= 0.0 || observed_area <= 0.0 {
        0.0
    } else if gaussian_area >= observed_area {
        observed_area / gaussian_area
    } else {
        gaussian_area / observed_area
    }
}

/// The mean [`area_similarity`] of each side of the peak to a Gaussian half
pub fn gaussian_similarity(gaussian_area: f64, left_area: f64, right_area: f64) -> f64 {
    (area_similarity(gaussian_area, left_area) + area_similarity(gaussian_area, right_area)) / 2.0
}

/// How much more of the peak's outline falls monotonically away from the apex
/// than rises against it
pub fn ideal_slope_value(ideal: f64, non_ideal: f64) -> f64 {
    if ideal == 0.0 {
        0.0
    } else {
        ((ideal - non_ideal) / ideal).max(0.0)
    }
}

/// A composite peak quality score in `[0, 1]`
pub fn purity(
    gaussian_similarity: f64,
    base_peak_value: f64,
    symmetry: f64,
    ideal_slope: f64,
) -> f64 {
    ((gaussian_similarity + 1.2 * base_peak_value + 0.8 * symmetry + ideal_slope) / 4.0)
        .clamp(0.0, 1.0)
}

/// Trapezoid-rule areas over a peak window
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PeakAreas {
    /// The area between the trace and zero intensity
    pub above_zero: f64,
    /// The area between the trace and the straight line joining the window edges
    pub above_baseline: f64,
    /// The area from the start to the apex above the lower edge intensity
    pub left: f64,
    /// The area from the apex to the end above the lower edge intensity
    pub right: f64,
}

impl PeakAreas {
    pub fn measure(samples: &[Sample], start: usize, top: usize, end: usize, floor: f64) -> Self {
        let mut above_zero = 0.0;
        let mut left = 0.0;
        for j in start..end {
            above_zero +=
                (samples[j].intensity + samples[j + 1].intensity) * (samples[j + 1].time - samples[j].time) / 2.0;
            if j + 1 == top {
                left = above_zero;
            }
        }
        let right = above_zero - left;
        let edge_trapezoid = (samples[start].intensity + samples[end].intensity)
            * (samples[end].time - samples[start].time)
            / 2.0;
        Self {
            above_zero,
            above_baseline: above_zero - edge_trapezoid,
            left: left - floor * (samples[top].time - samples[start].time),
            right: right - floor * (samples[end].time - samples[top].time),
        }
    }
}
