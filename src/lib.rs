//! `mzchrom` is a library for detecting chromatographic peaks in signal-over-time
//! traces, such as the extracted ion chromatograms of an LC-MS run, and scoring
//! how peak-like each one is.
//!
//! Peak detection can be used directly with [`PeakDetector`], which estimates the
//! trace's baseline and noise floor, walks its smoothed first and second
//! derivatives to find where peaks start, crest and end, and then scores each
//! candidate's shape. There are a number of threshold criteria that can be
//! manipulated to control which candidates are reported, see its documentation
//! for more details.
//!
//! The smoothing kernels the detector is built on are available on their own in
//! the [`crate::smooth`] sub-module.
//!
//! # Usage
//! ```
//! use mzchrom::{PeakDetector, SampleSeries};
//!
//! let times: Vec<f64> = (0..200).map(|i| i as f64 * 0.05).collect();
//! let intensities: Vec<f64> = (0..200)
//!     .map(|i| {
//!         let x = i as f64;
//!         1000.0 * (-(x - 60.0).powi(2) / 50.0).exp()
//!             + 2000.0 * (-(x - 140.0).powi(2) / 50.0).exp()
//!     })
//!     .collect();
//! let series = SampleSeries::from_arrays(&times, &intensities).unwrap();
//!
//! let detector = PeakDetector::default();
//! let peaks = detector.detect(&series).unwrap();
//! assert_eq!(peaks.len(), 2);
//! for peak in peaks.iter() {
//!     println!("{}", peak);
//! }
//! assert_eq!(peaks[1].amplitude_order_value, 1);
//! ```
#![allow(unused_imports)]
pub mod arrayops;
pub mod baseline;
pub mod differential;
pub mod edge_search;
pub mod peak;
pub mod peak_picker;
pub mod peak_scorer;
pub mod peak_statistics;
pub mod pool;
pub mod prelude;
pub mod sample;
pub mod search;
pub mod smooth;

#[doc(hidden)]
pub mod test_data;

pub use crate::baseline::{BaselineEstimator, GlobalChromatogramProperty};
pub use crate::differential::{differentiate, DifferentialCoefficients, NoiseEstimate};
pub use crate::edge_search::{EdgeSearchThresholds, EdgeSearcher, PeakCandidate};
pub use crate::peak::PeakDetectionResult;
pub use crate::peak_picker::{
    detect_peaks, rank_by_amplitude, PeakDetectionError, PeakDetector, PeakDetectorBuilder,
};
pub use crate::peak_scorer::PeakScorer;
pub use crate::pool::{PooledBuffer, SamplePool};
pub use crate::sample::{AxisType, AxisUnit, PooledSeries, Sample, SampleSeries, SeriesError};
pub use crate::smooth::SmoothingMethod;
