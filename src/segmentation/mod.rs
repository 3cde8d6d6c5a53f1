//! Segment every trace of a site into peaks using its class probability map.
//!
//! For each trace, interior missing values are interpolated, the plateau
//! channel is thresholded into seeds with [`constant_threshold_segments`], and
//! seeds are grown into whole peaks with [`grow_seeds`] over the combined
//! `slope + plateau` probability. Traces without any seed keep an all
//! background label array.
//!
//! # Example
//! ```rust
//! use tracepeaks::classifier::ProbabilityMap;
//! use tracepeaks::segmentation::{segment_traces, SegmentationConfig};
//!
//! let trace: Vec<f64> = (0..21).map(|i| 10.0 - (i as f64 - 10.0).abs()).collect();
//! let probabilities = ProbabilityMap::new(vec![trace
//!     .iter()
//!     .map(|y| if *y >= 9.0 { [0.0, 0.0, 1.0] } else { [0.0, 1.0, 0.0] })
//!     .collect()]);
//! let segmentation = segment_traces(&[trace], &probabilities, &SegmentationConfig::default()).unwrap();
//! assert_eq!(segmentation.peak_labels[0][10], 1);
//! ```
mod seeds;
mod watershed;

use log::{debug, trace};
use thiserror::Error;

#[cfg(feature = "parallelism")]
use rayon::prelude::*;

use crate::arrayops::interpolate_nans;
use crate::classifier::ProbabilityMap;
use crate::labels::{indices_to_labels, Label};

pub use seeds::{constant_threshold_segments, seed_labels};
pub use watershed::{grow_seeds, watershed};

/// All the ways segmentation inputs can be malformed
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SegmentationError {
    #[error("Trace {row} has {found} frames, expected {expected}")]
    RaggedTraces {
        row: usize,
        expected: usize,
        found: usize,
    },
    #[error("The probability map has {found} rows but there are {expected} traces")]
    ProbabilityRowMismatch { expected: usize, found: usize },
    #[error("Probability row {row} has {found} frames but the trace has {expected}")]
    ProbabilityFrameMismatch {
        row: usize,
        expected: usize,
        found: usize,
    },
}

/// Parameters controlling seed extraction and watershed growth
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentationConfig {
    /// The number of intensity thresholds visited while growing seeds
    pub steps: usize,
    /// Plateau probability a frame must exceed to be part of a seed
    pub min_seed_prob: f64,
    /// Slope + plateau probability a frame needs to be absorbed into a peak
    pub min_peak_prob: f64,
    /// Seeds with fewer frames than this are discarded
    pub min_seed_length: usize,
    /// The number of sub-threshold frames that may interrupt a single seed
    pub max_seed_gap: usize,
}

impl SegmentationConfig {
    pub fn steps(mut self, steps: usize) -> Self {
        self.steps = steps;
        self
    }

    pub fn min_seed_prob(mut self, min_seed_prob: f64) -> Self {
        self.min_seed_prob = min_seed_prob;
        self
    }

    pub fn min_peak_prob(mut self, min_peak_prob: f64) -> Self {
        self.min_peak_prob = min_peak_prob;
        self
    }

    pub fn min_seed_length(mut self, min_seed_length: usize) -> Self {
        self.min_seed_length = min_seed_length;
        self
    }

    pub fn max_seed_gap(mut self, max_seed_gap: usize) -> Self {
        self.max_seed_gap = max_seed_gap;
        self
    }
}

impl Default for SegmentationConfig {
    fn default() -> Self {
        Self {
            steps: 25,
            min_seed_prob: 0.8,
            min_peak_prob: 0.5,
            min_seed_length: 2,
            max_seed_gap: 1,
        }
    }
}

/// The per-trace label arrays produced by [`segment_traces`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Segmentation {
    pub peak_labels: Vec<Vec<Label>>,
    pub seed_labels: Vec<Vec<Label>>,
}

/// Check that all traces share one length, returning it.
pub fn frame_count(traces: &[Vec<f64>]) -> Result<usize, SegmentationError> {
    let expected = traces.first().map(|t| t.len()).unwrap_or_default();
    for (row, t) in traces.iter().enumerate() {
        if t.len() != expected {
            return Err(SegmentationError::RaggedTraces {
                row,
                expected,
                found: t.len(),
            });
        }
    }
    Ok(expected)
}

/// Check that `probabilities` lines up with `traces` frame for frame.
pub fn check_alignment(
    traces: &[Vec<f64>],
    probabilities: &ProbabilityMap,
) -> Result<(), SegmentationError> {
    let expected = frame_count(traces)?;
    if probabilities.len() != traces.len() {
        return Err(SegmentationError::ProbabilityRowMismatch {
            expected: traces.len(),
            found: probabilities.len(),
        });
    }
    for (row, found) in probabilities.row_lengths().enumerate() {
        if found != expected {
            return Err(SegmentationError::ProbabilityFrameMismatch {
                row,
                expected,
                found,
            });
        }
    }
    Ok(())
}

/// Segment a single trace, returning `(peak_labels, seed_labels)`.
pub fn segment_trace(
    trace: &[f64],
    plateau_prob: &[f64],
    total_prob: &[f64],
    config: &SegmentationConfig,
) -> (Vec<Label>, Vec<Label>) {
    let n = trace.len();
    let filled = interpolate_nans(trace);
    let runs = constant_threshold_segments(
        plateau_prob,
        config.min_seed_prob,
        config.min_seed_length,
        config.max_seed_gap,
    );
    if runs.is_empty() {
        return (vec![0; n], vec![0; n]);
    }
    let seeds = indices_to_labels(n, &runs);
    let peaks = grow_seeds(
        &filled,
        &seeds,
        total_prob,
        config.steps,
        config.min_peak_prob,
    );
    trace!("Grew {} seeds", runs.len());
    (peaks, seeds)
}

cfg_if::cfg_if! {
    if #[cfg(feature = "parallelism")] {
        fn segment_rows(
            traces: &[Vec<f64>],
            probabilities: &ProbabilityMap,
            config: &SegmentationConfig,
        ) -> Vec<(Vec<Label>, Vec<Label>)> {
            traces
                .par_iter()
                .enumerate()
                .map(|(n, t)| segment_trace(t, &probabilities.plateau(n), &probabilities.total(n), config))
                .collect()
        }
    } else {
        fn segment_rows(
            traces: &[Vec<f64>],
            probabilities: &ProbabilityMap,
            config: &SegmentationConfig,
        ) -> Vec<(Vec<Label>, Vec<Label>)> {
            traces
                .iter()
                .enumerate()
                .map(|(n, t)| segment_trace(t, &probabilities.plateau(n), &probabilities.total(n), config))
                .collect()
        }
    }
}

/// Segment every trace of a site.
///
/// With the `parallelism` feature enabled, traces are processed in parallel.
/// The result does not depend on the feature.
pub fn segment_traces(
    traces: &[Vec<f64>],
    probabilities: &ProbabilityMap,
    config: &SegmentationConfig,
) -> Result<Segmentation, SegmentationError> {
    check_alignment(traces, probabilities)?;

    let pairs = segment_rows(traces, probabilities, config);

    let (peak_labels, seed_labels): (Vec<_>, Vec<_>) = pairs.into_iter().unzip();
    debug!(
        "Segmented {} traces into {} peaks",
        traces.len(),
        peak_labels
            .iter()
            .map(|l| l.iter().copied().max().unwrap_or_default() as usize)
            .sum::<usize>()
    );
    Ok(Segmentation {
        peak_labels,
        seed_labels,
    })
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::labels::labels_to_indices;
    use crate::test_data::{probabilities_from_plateaus, triangle, two_peaks};

    #[test_log::test]
    fn test_segment_triangle() {
        let trace = triangle(21, 10.0);
        let probs = probabilities_from_plateaus(&[trace.clone()], 9.0);
        let seg = segment_traces(&[trace], &probs, &SegmentationConfig::default()).unwrap();
        assert_eq!(seg.seed_labels[0][9..12], [1, 1, 1]);
        assert_eq!(labels_to_indices(&seg.peak_labels[0]), vec![(1..20).collect::<Vec<_>>()]);
    }

    #[test]
    fn test_label_numbering_restarts_per_trace() {
        let traces = vec![two_peaks(), two_peaks()];
        let probs = probabilities_from_plateaus(&traces, 7.0);
        let seg = segment_traces(&traces, &probs, &SegmentationConfig::default()).unwrap();
        for labels in seg.peak_labels.iter() {
            assert_eq!(labels.iter().copied().max(), Some(2));
            assert_eq!(labels[15], 0);
        }
    }

    #[test]
    fn test_seed_containment() {
        let traces = vec![two_peaks(), triangle(30, 4.0)];
        let probs = probabilities_from_plateaus(&traces, 3.0);
        let seg = segment_traces(&traces, &probs, &SegmentationConfig::default()).unwrap();
        for (peaks, seeds) in seg.peak_labels.iter().zip(seg.seed_labels.iter()) {
            for (p, s) in peaks.iter().zip(seeds.iter()) {
                if *s > 0 {
                    assert_eq!(p, s);
                }
            }
        }
    }

    #[test]
    fn test_no_seed_trace_is_background() {
        let traces = vec![vec![1.0; 12]];
        let probs = probabilities_from_plateaus(&traces, 100.0);
        let seg = segment_traces(&traces, &probs, &SegmentationConfig::default()).unwrap();
        assert!(seg.peak_labels[0].iter().all(|l| *l == 0));
        assert!(seg.seed_labels[0].iter().all(|l| *l == 0));
    }

    #[test]
    fn test_interior_nan_does_not_split_peak() {
        let mut trace = triangle(21, 10.0);
        trace[6] = f64::NAN;
        trace[0] = f64::NAN;
        let probs = probabilities_from_plateaus(&[triangle(21, 10.0)], 9.0);
        let seg = segment_traces(&[trace], &probs, &SegmentationConfig::default()).unwrap();
        let runs = labels_to_indices(&seg.peak_labels[0]);
        assert_eq!(runs.len(), 1);
        assert!(runs[0].contains(&6));
        assert!(!runs[0].contains(&0));
    }

    #[test]
    fn test_shape_errors() {
        let traces = vec![vec![0.0; 5], vec![0.0; 4]];
        let probs = ProbabilityMap::new(vec![vec![[1.0, 0.0, 0.0]; 5]; 2]);
        assert_eq!(
            segment_traces(&traces, &probs, &SegmentationConfig::default()),
            Err(SegmentationError::RaggedTraces {
                row: 1,
                expected: 5,
                found: 4
            })
        );

        let traces = vec![vec![0.0; 5]];
        let probs = ProbabilityMap::new(vec![vec![[1.0, 0.0, 0.0]; 4]]);
        assert_eq!(
            segment_traces(&traces, &probs, &SegmentationConfig::default()),
            Err(SegmentationError::ProbabilityFrameMismatch {
                row: 0,
                expected: 5,
                found: 4
            })
        );
    }
}
