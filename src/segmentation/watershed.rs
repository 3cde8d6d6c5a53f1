//! Marker-based watershed-by-flooding on a one dimensional signal, and the
//! coarse-to-fine growth procedure built on top of it.
//!
//! [`watershed`] is a single flooding pass. [`grow_seeds`] repeats it over a
//! descending ladder of intensity thresholds so that high, confidently
//! labelled samples are claimed first and the tails of overlapping peaks are
//! resolved by proximity to their own seed rather than by one global cut.
use std::cmp::Ordering;
use std::collections::BinaryHeap;

use log::trace;

use crate::arrayops::{linspace, nan_minmax};
use crate::labels::{labelled_mask, Label};

/// A frame waiting in the flooding queue.
#[derive(Debug, Clone, Copy)]
struct FloodElement {
    value: f64,
    age: usize,
    index: usize,
    source: usize,
}

impl PartialEq for FloodElement {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for FloodElement {}

impl PartialOrd for FloodElement {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for FloodElement {
    // Reversed so that `BinaryHeap` pops the lowest value, then the oldest push
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .value
            .total_cmp(&self.value)
            .then_with(|| other.age.cmp(&self.age))
            .then_with(|| other.index.cmp(&self.index))
    }
}

#[inline]
fn neighbors(index: usize, n: usize) -> impl Iterator<Item = usize> {
    let left = index.checked_sub(1);
    let right = if index + 1 < n { Some(index + 1) } else { None };
    left.into_iter().chain(right)
}

/// Flood `trace` from the labelled frames of `markers`, restricted to `mask`.
///
/// Frames are claimed in ascending order of their value (then by the order in
/// which they were reached) with no compactness term. A frame that touches a
/// region carrying a different label is left at `0`, so two regions are
/// always separated by at least one unlabelled frame. Returns a new label
/// array; `markers` is not modified.
pub fn watershed(trace: &[f64], markers: &[Label], mask: &[bool]) -> Vec<Label> {
    let n = trace.len();
    let mut output: Vec<Label> = markers
        .iter()
        .zip(mask.iter())
        .map(|(label, keep)| if *keep { *label } else { 0 })
        .collect();

    let mut heap = BinaryHeap::new();
    for (index, label) in output.iter().enumerate() {
        if *label > 0 {
            heap.push(FloodElement {
                value: trace[index],
                age: 0,
                index,
                source: index,
            });
        }
    }

    let mut age = 0;
    while let Some(elem) = heap.pop() {
        if output[elem.index] > 0 && elem.index != elem.source {
            continue;
        }
        let label = output[elem.source];
        if neighbors(elem.index, n).any(|j| output[j] > 0 && output[j] != label) {
            continue;
        }
        output[elem.index] = label;

        for j in neighbors(elem.index, n) {
            if !mask[j] || output[j] > 0 {
                continue;
            }
            age += 1;
            heap.push(FloodElement {
                value: trace[j],
                age,
                index: j,
                source: elem.source,
            });
        }
    }
    output
}

/// Grow `seeds` into full peak extents.
///
/// `steps` thresholds are spread evenly from the smallest to the largest
/// value of `trace` and visited from the top down. At each threshold the
/// frames whose value lies in `(threshold, previous]` join the accumulated
/// band; the flooding mask is that band restricted to frames with
/// `total_prob >= min_peak_prob`, plus every frame already labelled. The
/// labels produced by one step are the markers of the next.
pub fn grow_seeds(
    trace: &[f64],
    seeds: &[Label],
    total_prob: &[f64],
    steps: usize,
    min_peak_prob: f64,
) -> Vec<Label> {
    let n = trace.len();
    if seeds.iter().all(|s| *s == 0) {
        return seeds.to_vec();
    }
    let Some((lowest, highest)) = nan_minmax(trace) else {
        return seeds.to_vec();
    };

    let thresholds = linspace(lowest, highest, steps);
    let probable: Vec<bool> = total_prob.iter().map(|p| *p >= min_peak_prob).collect();
    let mut banded = vec![false; n];
    let mut labels = seeds.to_vec();
    let mut previous = highest;

    for threshold in thresholds.into_iter().rev() {
        for (i, y) in trace.iter().enumerate() {
            if *y > threshold && *y <= previous {
                banded[i] = true;
            }
        }
        previous = threshold;

        let mask: Vec<bool> = labelled_mask(&labels)
            .into_iter()
            .enumerate()
            .map(|(i, labelled)| (probable[i] && banded[i]) || labelled)
            .collect();
        labels = watershed(trace, &labels, &mask);
        trace!(
            "Threshold {threshold:0.3}: {} candidate frames, {} labelled",
            mask.iter().filter(|m| **m).count(),
            labels.iter().filter(|l| **l > 0).count()
        );
    }
    labels
}
