pub use crate::peak_picker::{PeakDetector, PeakDetectionError};
pub use crate::sample::{AxisType, AxisUnit, Sample, SampleSeries};
pub use crate::smooth::SmoothingMethod;
pub use mzpeaks::{CoordinateLike, IndexedCoordinate, IntensityMeasurement};
