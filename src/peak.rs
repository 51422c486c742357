use std::cmp::Ordering;
use std::fmt;

use mzpeaks::{CoordinateLike, IndexType, IndexedCoordinate, IntensityMeasurement, Time};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Areas are integrated over the time axis in its native unit; multiplying by
/// this converts minutes to seconds.
pub const AREA_SCALE: f64 = 60.0;

/// A detected chromatographic peak with its boundaries, areas and shape scores.
///
/// Index fields refer to positions in the series detection ran over, and `*_id`
/// fields carry the scan identifiers of the samples at those positions.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PeakDetectionResult {
    /// The order the peak was found in, starting from zero
    pub peak_id: usize,

    pub left_index: usize,
    pub top_index: usize,
    pub right_index: usize,

    pub left_id: u32,
    pub top_id: u32,
    pub right_id: u32,

    pub left_time: f64,
    pub top_time: f64,
    pub right_time: f64,

    pub left_intensity: f64,
    pub top_intensity: f64,
    pub right_intensity: f64,

    pub top_mz: f64,

    pub area_above_zero: f64,
    /// The area above the straight line joining the two edges
    pub area_above_baseline: f64,

    /// How evenly the peak tails off to either side, in `[0, 1]`
    pub symmetry: f64,
    /// Agreement of each half's area with a Gaussian of the same height and
    /// half width, in `[0, 1]`
    pub gaussian_similarity: f64,
    /// How far the apex rises above the lower edge, relative to the apex
    pub base_peak_value: f64,
    pub ideal_slope: f64,
    /// The mean steepest normalized drop from the apex over both sides
    pub shapeness: f64,
    /// A composite of the shape scores in `[0, 1]`
    pub purity: f64,

    /// The apex intensity over the lower edge
    pub peak_height: f64,
    pub estimated_noise: f64,
    pub signal_to_noise: f64,

    /// The peak's 1-based rank by apex intensity among the peaks of its chromatogram
    pub amplitude_order_value: usize,
    /// The apex intensity relative to the most intense peak of its chromatogram
    pub amplitude_score_value: f64,
}

impl PeakDetectionResult {
    /// `area_above_zero` in scaled units, see [`AREA_SCALE`]
    pub fn scaled_area_above_zero(&self) -> f64 {
        self.area_above_zero * AREA_SCALE
    }

    /// `area_above_baseline` in scaled units, see [`AREA_SCALE`]
    pub fn scaled_area_above_baseline(&self) -> f64 {
        self.area_above_baseline * AREA_SCALE
    }

    /// The number of samples the peak spans, counting both edges
    pub fn width(&self) -> usize {
        self.right_index + 1 - self.left_index
    }

    pub fn duration(&self) -> f64 {
        self.right_time - self.left_time
    }

    /// Replace the noise level and recompute the signal to noise ratio
    pub fn refine_noise(&mut self, estimated_noise: f64) {
        self.estimated_noise = estimated_noise;
        self.signal_to_noise = self.peak_height / estimated_noise;
    }

    /// Shift the index fields by `offset`, as when a peak found in a sub-range is
    /// mapped back onto the full series
    pub fn offset_indices(&mut self, offset: usize) {
        self.left_index += offset;
        self.top_index += offset;
        self.right_index += offset;
    }

    pub fn contains_time(&self, time: f64) -> bool {
        self.left_time <= time && time <= self.right_time
    }
}

impl PartialOrd for PeakDetectionResult {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match self.top_time.partial_cmp(&other.top_time) {
            Some(Ordering::Equal) => self.top_intensity.partial_cmp(&other.top_intensity),
            ord => ord,
        }
    }
}

impl CoordinateLike<Time> for PeakDetectionResult {
    #[inline]
    fn coordinate(&self) -> f64 {
        self.top_time
    }
}

impl IndexedCoordinate<Time> for PeakDetectionResult {
    #[inline]
    fn get_index(&self) -> IndexType {
        self.peak_id as IndexType
    }

    #[inline]
    fn set_index(&mut self, index: IndexType) {
        self.peak_id = index as usize
    }
}

impl IntensityMeasurement for PeakDetectionResult {
    #[inline]
    fn intensity(&self) -> f32 {
        self.top_intensity as f32
    }
}

impl fmt::Display for PeakDetectionResult {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "PeakDetectionResult({}, {}-{}-{}, {:0.3}, {:0.3}, {:0.3}, {:0.3}, {})",
            self.peak_id,
            self.left_index,
            self.top_index,
            self.right_index,
            self.top_time,
            self.top_intensity,
            self.signal_to_noise,
            self.purity,
            self.amplitude_order_value,
        )
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn peak() -> PeakDetectionResult {
        PeakDetectionResult {
            peak_id: 2,
            left_index: 10,
            top_index: 15,
            right_index: 22,
            left_time: 1.0,
            top_time: 1.5,
            right_time: 2.2,
            top_intensity: 500.0,
            area_above_zero: 2.0,
            area_above_baseline: 1.5,
            peak_height: 450.0,
            estimated_noise: 1.0,
            signal_to_noise: 450.0,
            ..Default::default()
        }
    }

    #[test]
    fn test_derived_values() {
        let mut p = peak();
        assert_eq!(p.scaled_area_above_zero(), 120.0);
        assert_eq!(p.scaled_area_above_baseline(), 90.0);
        assert_eq!(p.width(), 13);
        assert!(p.contains_time(2.0));
        assert!(!p.contains_time(2.5));
        p.refine_noise(9.0);
        assert_eq!(p.signal_to_noise, 50.0);
        p.offset_indices(100);
        assert_eq!((p.left_index, p.top_index, p.right_index), (110, 115, 122));
    }

    #[test]
    fn test_coordinates() {
        let mut p = peak();
        assert_eq!(CoordinateLike::<Time>::coordinate(&p), 1.5);
        assert_eq!(p.intensity(), 500.0f32);
        p.set_index(5);
        assert_eq!(p.peak_id, 5);
        let later = PeakDetectionResult {
            top_time: 3.0,
            ..peak()
        };
        assert!(p < later);
        assert!(p.to_string().starts_with("PeakDetectionResult(5, 10-15-22"));
    }
}
