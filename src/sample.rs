//! Ordered signal-over-time samples, the input representation for chromatographic
//! peak detection.
//!
//! A [`SampleSeries`] is generic over its storage so that the same operations
//! work over caller-owned `Vec<Sample>` data and over buffers checked out of a
//! [`SamplePool`](crate::pool::SamplePool).
use std::cmp::Ordering;
use std::fmt;
use std::ops::Deref;

use mzpeaks::{CoordinateLike, IndexType, IndexedCoordinate, IntensityMeasurement, Time, MZ};
use thiserror::Error;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::pool::PooledBuffer;
use crate::search::nearest_by;

/// A single scan's measurement along a chromatogram
#[derive(Debug, Clone, Copy, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Sample {
    /// The source scan identifier
    pub id: u32,
    /// The position along the separation axis, usually retention time
    pub time: f64,
    pub mz: f64,
    pub intensity: f64,
}

impl Sample {
    pub fn new(id: u32, time: f64, mz: f64, intensity: f64) -> Self {
        Self {
            id,
            time,
            mz,
            intensity,
        }
    }

    #[inline]
    pub(crate) fn with_intensity(&self, intensity: f64) -> Self {
        Self { intensity, ..*self }
    }
}

impl PartialOrd for Sample {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match self.time.partial_cmp(&other.time) {
            Some(Ordering::Equal) => self.id.partial_cmp(&other.id),
            ord => ord,
        }
    }
}

impl CoordinateLike<Time> for Sample {
    #[inline]
    fn coordinate(&self) -> f64 {
        self.time
    }
}

impl CoordinateLike<MZ> for Sample {
    #[inline]
    fn coordinate(&self) -> f64 {
        self.mz
    }
}

impl IndexedCoordinate<Time> for Sample {
    #[inline]
    fn get_index(&self) -> IndexType {
        self.id
    }

    #[inline]
    fn set_index(&mut self, index: IndexType) {
        self.id = index
    }
}

impl IntensityMeasurement for Sample {
    #[inline]
    fn intensity(&self) -> f32 {
        self.intensity as f32
    }
}

impl fmt::Display for Sample {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "Sample({}, {}, {}, {})",
            self.id, self.time, self.mz, self.intensity
        )
    }
}

/// What the `time` coordinate of a [`SampleSeries`] measures
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum AxisType {
    #[default]
    RetentionTime,
    RetentionIndex,
    DriftTime,
    /// The series runs along the m/z dimension, as in a profile spectrum
    MZ,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum AxisUnit {
    #[default]
    Minutes,
    Seconds,
    Milliseconds,
    Dimensionless,
    MassToCharge,
    InverseReducedIonMobility,
}

/// All the ways building a [`SampleSeries`] can fail
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SeriesError {
    #[error("The time and intensity arrays do not match in length: {0} != {1}")]
    LengthMismatch(usize, usize),
    #[error("The time array is not sorted at index {0}")]
    TimeNotSorted(usize),
    #[error("Encountered a non-finite time or intensity at index {0}")]
    NonFiniteValue(usize),
}

/// A fixed-length, time-ordered sequence of [`Sample`]s tagged with the axis it
/// was measured along.
///
/// Indices into a series are contiguous over `0..len`. Passing an index outside
/// that range to any of the index-based accessors is a programming error and
/// panics.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SampleSeries<S = Vec<Sample>> {
    samples: S,
    pub axis_type: AxisType,
    pub axis_unit: AxisUnit,
}

/// A [`SampleSeries`] whose storage was checked out of a [`SamplePool`](crate::pool::SamplePool)
/// and is returned to it when the series is dropped.
pub type PooledSeries<'p> = SampleSeries<PooledBuffer<'p>>;

fn validate_samples(samples: &[Sample]) -> Result<(), SeriesError> {
    let mut last_time = f64::NEG_INFINITY;
    for (i, s) in samples.iter().enumerate() {
        if !s.time.is_finite() || !s.intensity.is_finite() {
            return Err(SeriesError::NonFiniteValue(i));
        }
        if s.time < last_time {
            return Err(SeriesError::TimeNotSorted(i));
        }
        last_time = s.time;
    }
    Ok(())
}

impl SampleSeries<Vec<Sample>> {
    /// Build a series from pre-assembled samples, checking that every time and
    /// intensity is finite and that time never decreases.
    pub fn new(
        samples: Vec<Sample>,
        axis_type: AxisType,
        axis_unit: AxisUnit,
    ) -> Result<Self, SeriesError> {
        validate_samples(&samples)?;
        Ok(Self::from_storage(samples, axis_type, axis_unit))
    }

    /// Build a retention time series from paired arrays, numbering each sample
    /// by its position.
    pub fn from_arrays(time_array: &[f64], intensity_array: &[f64]) -> Result<Self, SeriesError> {
        if time_array.len() != intensity_array.len() {
            return Err(SeriesError::LengthMismatch(
                time_array.len(),
                intensity_array.len(),
            ));
        }
        let samples = time_array
            .iter()
            .zip(intensity_array.iter())
            .enumerate()
            .map(|(i, (t, y))| Sample::new(i as u32, *t, 0.0, *y))
            .collect();
        Self::new(samples, AxisType::RetentionTime, AxisUnit::Minutes)
    }

    pub fn into_inner(self) -> Vec<Sample> {
        self.samples
    }
}

impl<S: Deref<Target = [Sample]>> SampleSeries<S> {
    /// Wrap already-validated storage
    pub(crate) fn from_storage(samples: S, axis_type: AxisType, axis_unit: AxisUnit) -> Self {
        Self {
            samples,
            axis_type,
            axis_unit,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    #[inline]
    pub fn as_slice(&self) -> &[Sample] {
        &self.samples
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Sample> {
        self.samples.iter()
    }

    #[inline]
    pub fn at(&self, index: usize) -> &Sample {
        &self.samples[index]
    }

    #[inline]
    pub fn time_at(&self, index: usize) -> f64 {
        self.samples[index].time
    }

    #[inline]
    pub fn intensity_at(&self, index: usize) -> f64 {
        self.samples[index].intensity
    }

    pub fn first(&self) -> Option<&Sample> {
        self.samples.first()
    }

    pub fn last(&self) -> Option<&Sample> {
        self.samples.last()
    }

    /// `I(i) - I(j)`
    #[inline]
    pub fn difference_intensity(&self, i: usize, j: usize) -> f64 {
        self.samples[i].intensity - self.samples[j].intensity
    }

    /// `t(i) - t(j)`
    #[inline]
    pub fn difference_time(&self, i: usize, j: usize) -> f64 {
        self.samples[i].time - self.samples[j].time
    }

    /// The area of the trapezoid spanned by samples `i` and `j`. The result is
    /// positive when `i` comes after `j`.
    #[inline]
    pub fn trapezoid_area(&self, i: usize, j: usize) -> f64 {
        (self.samples[i].intensity + self.samples[j].intensity) * self.difference_time(i, j) / 2.0
    }

    /// The index of the first most intense sample in `left..=right`
    pub fn apex_index(&self, left: usize, right: usize) -> usize {
        debug_assert!(left <= right && right < self.len());
        let mut best = left;
        for (i, s) in self.samples[left..=right].iter().enumerate() {
            if s.intensity > self.samples[best].intensity {
                best = left + i;
            }
        }
        best
    }

    /// The index of the sample whose time is closest to `time`
    pub fn nearest_index(&self, time: f64) -> Option<usize> {
        if self.is_empty() {
            None
        } else {
            Some(nearest_by(&self.samples, time, |s| s.time))
        }
    }

    /// Copy `left..=right` into a new, owned series with the same axis tags
    pub fn slice_copy(&self, left: usize, right: usize) -> SampleSeries<Vec<Sample>> {
        SampleSeries::from_storage(
            self.samples[left..=right].to_vec(),
            self.axis_type,
            self.axis_unit,
        )
    }

    /// Copy the entire series into owned storage
    pub fn to_owned_series(&self) -> SampleSeries<Vec<Sample>> {
        SampleSeries::from_storage(self.samples.to_vec(), self.axis_type, self.axis_unit)
    }

    pub fn intensities(&self) -> impl Iterator<Item = f64> + '_ {
        self.samples.iter().map(|s| s.intensity)
    }

    pub fn times(&self) -> impl Iterator<Item = f64> + '_ {
        self.samples.iter().map(|s| s.time)
    }

    /// The arithmetic mean distance between successive time points
    pub fn mean_spacing(&self) -> f64 {
        match (self.first(), self.last()) {
            (Some(a), Some(b)) if self.len() > 1 => (b.time - a.time) / (self.len() - 1) as f64,
            _ => 0.0,
        }
    }
}

impl<S: Deref<Target = [Sample]>> Deref for SampleSeries<S> {
    type Target = [Sample];

    fn deref(&self) -> &Self::Target {
        &self.samples
    }
}

impl<S: std::ops::DerefMut<Target = [Sample]>> SampleSeries<S> {
    pub(crate) fn as_mut_slice(&mut self) -> &mut [Sample] {
        &mut self.samples
    }
}

impl<'a, S: Deref<Target = [Sample]>> IntoIterator for &'a SampleSeries<S> {
    type Item = &'a Sample;

    type IntoIter = std::slice::Iter<'a, Sample>;

    fn into_iter(self) -> Self::IntoIter {
        self.samples.iter()
    }
}

impl FromIterator<Sample> for SampleSeries<Vec<Sample>> {
    /// Collect samples without validation, for when the caller already knows
    /// they are time-sorted and finite.
    fn from_iter<T: IntoIterator<Item = Sample>>(iter: T) -> Self {
        Self::from_storage(
            iter.into_iter().collect(),
            AxisType::default(),
            AxisUnit::default(),
        )
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use rstest::rstest;

    fn series() -> SampleSeries {
        SampleSeries::from_arrays(
            &[0.0, 1.0, 2.0, 3.0, 4.0],
            &[1.0, 4.0, 9.0, 4.0, 9.0],
        )
        .unwrap()
    }

    #[test]
    fn test_accessors() {
        let s = series();
        assert_eq!(s.len(), 5);
        assert_eq!(s.at(2).intensity, 9.0);
        assert_eq!(s.at(3).id, 3);
        assert_eq!(s.difference_intensity(2, 1), 5.0);
        assert_eq!(s.difference_time(4, 1), 3.0);
        assert_eq!(s.trapezoid_area(1, 0), 2.5);
        assert_eq!(s.apex_index(0, 4), 2);
        assert_eq!(s.apex_index(3, 4), 4);
        assert_eq!(s.mean_spacing(), 1.0);
    }

    #[test]
    fn test_slice_copy() {
        let s = series();
        let part = s.slice_copy(1, 3);
        assert_eq!(part.len(), 3);
        assert_eq!(part.at(0).id, 1);
        assert_eq!(part.at(2).time, 3.0);
        assert_eq!(part.axis_type, s.axis_type);
    }

    #[rstest]
    #[case(-1.0, 0)]
    #[case(1.4, 1)]
    #[case(1.6, 2)]
    #[case(10.0, 4)]
    fn test_nearest_index(#[case] time: f64, #[case] expected: usize) {
        assert_eq!(series().nearest_index(time), Some(expected));
    }

    #[test]
    fn test_validation() {
        assert_eq!(
            SampleSeries::from_arrays(&[0.0, 1.0], &[1.0]),
            Err(SeriesError::LengthMismatch(2, 1))
        );
        assert_eq!(
            SampleSeries::from_arrays(&[0.0, 2.0, 1.0], &[1.0, 1.0, 1.0]),
            Err(SeriesError::TimeNotSorted(2))
        );
        assert_eq!(
            SampleSeries::from_arrays(&[0.0, 1.0], &[1.0, f64::NAN]),
            Err(SeriesError::NonFiniteValue(1))
        );
        assert!(SampleSeries::from_arrays(&[], &[]).unwrap().is_empty());
    }

    #[test]
    fn test_coordinate_traits() {
        let mut s = Sample::new(3, 12.5, 500.25, 1e3);
        assert_eq!(CoordinateLike::<Time>::coordinate(&s), 12.5);
        assert_eq!(CoordinateLike::<MZ>::coordinate(&s), 500.25);
        assert_eq!(IntensityMeasurement::intensity(&s), 1e3f32);
        s.set_index(7);
        assert_eq!(IndexedCoordinate::<Time>::get_index(&s), 7);
        let later = Sample::new(1, 13.0, 0.0, 0.0);
        assert!(s < later);
    }
}
