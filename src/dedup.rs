//! Peak index lists and removal of peaks duplicated across traces.
//!
//! Tracking errors can make one cell's signal appear in two trace rows of a
//! site. [`resolve_duplicates`] finds rows that share stretches of exactly
//! equal samples and drops the repeated peaks from a deduplicated overlay,
//! leaving the full index lists untouched.
use log::{debug, trace};
use thiserror::Error;

use crate::labels::{indices_to_labels, labels_to_indices_keyed, Label};

/// Fraction of a peak's frames another row's peak must cover for the two to
/// be considered the same peak
pub const OVERLAP_THRESHOLD: f64 = 0.8;

/// Rows must share strictly more than this many equal frames to be compared
pub const MIN_SHARED_FRAMES: usize = 4;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DuplicateError {
    #[error("Peak not found in trace {trace}")]
    PeakNotFound { trace: usize },
}

/// The frames of one peak and of the seed plateau it grew from
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PeakSegment {
    pub peak: Vec<usize>,
    pub plateau: Vec<usize>,
}

impl PeakSegment {
    pub fn new(peak: Vec<usize>, plateau: Vec<usize>) -> Self {
        Self { peak, plateau }
    }

    pub fn len(&self) -> usize {
        self.peak.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peak.is_empty()
    }
}

/// One set of peaks for every trace of a site, as both index lists and label
/// arrays.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PeakIndex {
    pub segments: Vec<Vec<PeakSegment>>,
    pub peak_labels: Vec<Vec<Label>>,
    pub plateau_labels: Vec<Vec<Label>>,
}

impl PeakIndex {
    /// Pair every peak label with the seed label of the same value.
    pub fn from_labels(peak_labels: &[Vec<Label>], seed_labels: &[Vec<Label>]) -> Self {
        let segments = peak_labels
            .iter()
            .zip(seed_labels.iter())
            .map(|(peaks, seeds)| {
                let mut seeds = labels_to_indices_keyed(seeds);
                labels_to_indices_keyed(peaks)
                    .into_iter()
                    .map(|(label, peak)| {
                        PeakSegment::new(peak, seeds.remove(&label).unwrap_or_default())
                    })
                    .collect()
            })
            .collect();
        Self {
            segments,
            peak_labels: peak_labels.to_vec(),
            plateau_labels: seed_labels.to_vec(),
        }
    }

    /// Build an index from segment lists, numbering peaks `1..=k` per trace.
    pub fn from_segments(segments: Vec<Vec<PeakSegment>>, lengths: &[usize]) -> Self {
        let mut peak_labels = Vec::with_capacity(segments.len());
        let mut plateau_labels = Vec::with_capacity(segments.len());
        for (segs, length) in segments.iter().zip(lengths.iter().copied()) {
            let peaks: Vec<Vec<usize>> = segs.iter().map(|s| s.peak.clone()).collect();
            let plateaus: Vec<Vec<usize>> = segs.iter().map(|s| s.plateau.clone()).collect();
            peak_labels.push(indices_to_labels(length, &peaks));
            plateau_labels.push(indices_to_labels(length, &plateaus));
        }
        Self {
            segments,
            peak_labels,
            plateau_labels,
        }
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// The number of peaks in each trace
    pub fn peak_counts(&self) -> Vec<usize> {
        self.segments.iter().map(|s| s.len()).collect()
    }

    pub fn total_peaks(&self) -> usize {
        self.segments.iter().map(|s| s.len()).sum()
    }
}

/// Frames where two traces hold exactly the same value
pub fn shared_frames(a: &[f64], b: &[f64]) -> Vec<usize> {
    a.iter()
        .zip(b.iter())
        .enumerate()
        .filter(|(_, (x, y))| *x - *y == 0.0)
        .map(|(i, _)| i)
        .collect()
}

fn intersection_len(a: &[usize], b: &[usize]) -> usize {
    let (mut i, mut j, mut count) = (0, 0, 0);
    while i < a.len() && j < b.len() {
        match a[i].cmp(&b[j]) {
            std::cmp::Ordering::Less => i += 1,
            std::cmp::Ordering::Greater => j += 1,
            std::cmp::Ordering::Equal => {
                count += 1;
                i += 1;
                j += 1;
            }
        }
    }
    count
}

fn remove_segment(
    segments: &mut Vec<PeakSegment>,
    peak: &[usize],
    trace: usize,
) -> Result<PeakSegment, DuplicateError> {
    match segments.iter().position(|s| s.peak == peak) {
        Some(i) => Ok(segments.remove(i)),
        None => Err(DuplicateError::PeakNotFound { trace }),
    }
}

/// Remove peaks that also appear in another trace row.
///
/// Rows are visited in order. For row `n`, every other row `m` sharing more
/// than [`MIN_SHARED_FRAMES`] exactly equal samples is a potential match. A
/// peak of row `n` lying entirely within the shared frames is removed, along
/// with its plateau, when more than [`OVERLAP_THRESHOLD`] of its length is
/// covered by a single surviving peak of row `m`. Only row `n` loses the
/// peak, so whichever of two duplicated rows comes first is the one emptied.
///
/// The returned index has its label arrays rebuilt from the surviving
/// segments; `full` is not modified.
pub fn resolve_duplicates(
    traces: &[Vec<f64>],
    full: &PeakIndex,
) -> Result<PeakIndex, DuplicateError> {
    let mut segments = full.segments.clone();
    let rows = traces.len().min(segments.len());
    let mut removed = 0usize;

    for n in 0..rows {
        let matches: Vec<(usize, Vec<usize>)> = (0..rows)
            .filter(|m| *m != n)
            .map(|m| (m, shared_frames(&traces[n], &traces[m])))
            .filter(|(_, shared)| shared.len() > MIN_SHARED_FRAMES)
            .collect();

        for (m, shared) in matches {
            let candidates: Vec<Vec<usize>> = segments[n].iter().map(|s| s.peak.clone()).collect();
            for peak in candidates {
                if peak.is_empty() || !peak.iter().all(|i| shared.binary_search(i).is_ok()) {
                    continue;
                }
                let threshold = OVERLAP_THRESHOLD * peak.len() as f64;
                let duplicated = segments[m]
                    .iter()
                    .filter(|other| !other.is_empty())
                    .any(|other| intersection_len(&peak, &other.peak) as f64 > threshold);
                if duplicated {
                    remove_segment(&mut segments[n], &peak, n)?;
                    trace!(
                        "Removed peak at frames {}..={} of trace {n}, duplicated in trace {m}",
                        peak[0],
                        peak[peak.len() - 1]
                    );
                    removed += 1;
                }
            }
        }
    }

    debug!("Removed {removed} duplicated peaks from {rows} traces");
    let lengths: Vec<usize> = full.peak_labels.iter().map(|l| l.len()).collect();
    Ok(PeakIndex::from_segments(segments, &lengths))
}
