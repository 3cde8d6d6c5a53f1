//! `tracepeaks` finds and measures peaks in per-cell time series traces.
//!
//! A site is a set of equal length traces, one per tracked cell, together
//! with a per-frame class probability map (background, slope, plateau) from an
//! external classifier. Segmentation thresholds the plateau channel into seeds
//! and grows each seed into a whole peak with a multi-level watershed, see
//! [`segmentation`]. Peaks repeated in two traces by tracking errors are
//! filtered into a separate deduplicated peak set by [`dedup`]. Per-peak
//! metrics such as amplitude, prominence and width are computed lazily and
//! cached by [`PeakSite`], and [`Peaks`] keeps an ordered collection of named
//! sites.
//!
//! # Usage
//! ```
//! use tracepeaks::{CrossParams, PeakSet, Peaks, ProbabilityMap, SegmentationConfig};
//!
//! let trace: Vec<f64> = (0..41)
//!     .map(|i| 1.0 + 10.0 * (-((i as f64 - 20.0) / 5.0).powi(2)).exp())
//!     .collect();
//! let predictions = ProbabilityMap::new(vec![trace
//!     .iter()
//!     .map(|y| if *y > 8.0 { [0.0, 0.1, 0.9] } else { [0.1, 0.9, 0.0] })
//!     .collect()]);
//!
//! let mut peaks = Peaks::new();
//! peaks
//!     .add_site("site", vec![trace], predictions, &SegmentationConfig::default())
//!     .unwrap();
//! let widths = peaks.width(PeakSet::All, CrossParams::default()).unwrap();
//! assert_eq!(widths[0][0].len(), 1);
//! ```
pub mod arrayops;
pub mod classifier;
pub mod collection;
pub mod dedup;
pub mod labels;
pub mod metrics;
pub mod normalize;
pub mod peak;
pub mod peak_statistics;
pub mod segmentation;
pub mod site;

#[cfg(test)]
mod test_data;

pub use crate::classifier::{ClassifierError, PeakClassifier, ProbabilityMap};
pub use crate::collection::Peaks;
pub use crate::dedup::{resolve_duplicates, DuplicateError, PeakIndex, PeakSegment};
pub use crate::labels::Label;
pub use crate::metrics::{
    AsymmetryMethod, BaseParams, CrossParams, Estimate, Height, MetricKey, MetricValue, PeakSet,
    ProminenceParams,
};
pub use crate::normalize::NormalizationMethod;
pub use crate::peak::{Base, CrossPoints, Point, PointPair, Prominence, SlopePoints};
pub use crate::segmentation::{segment_traces, Segmentation, SegmentationConfig, SegmentationError};
pub use crate::site::{PeakSite, PeakSiteError};
