//! Conversions between per-frame label arrays and lists of frame indices.
//!
//! A label array holds one [`Label`] per frame, `0` for background and `1..=k`
//! for the `k` regions of a trace. Numbering restarts in every trace.
use std::collections::BTreeMap;

/// A region label. `0` is background.
pub type Label = u32;

/// Assign label `n + 1` to every frame of the `n`-th index run.
pub fn indices_to_labels(length: usize, runs: &[Vec<usize>]) -> Vec<Label> {
    let mut labels = vec![0; length];
    for (n, run) in runs.iter().enumerate() {
        for &i in run {
            labels[i] = (n + 1) as Label;
        }
    }
    labels
}

/// Group frame indices by label, ordered by ascending label value.
pub fn labels_to_indices(labels: &[Label]) -> Vec<Vec<usize>> {
    labels_to_indices_keyed(labels).into_values().collect()
}

/// Group frame indices by label, keeping the label value alongside each group.
pub fn labels_to_indices_keyed(labels: &[Label]) -> BTreeMap<Label, Vec<usize>> {
    let mut groups: BTreeMap<Label, Vec<usize>> = BTreeMap::new();
    for (i, &label) in labels.iter().enumerate() {
        if label > 0 {
            groups.entry(label).or_default().push(i);
        }
    }
    groups
}

/// Frames carrying any non-zero label.
pub fn labelled_mask(labels: &[Label]) -> Vec<bool> {
    labels.iter().map(|l| *l > 0).collect()
}

/// One boolean mask per region, ordered by ascending label value.
pub fn labels_to_masks(labels: &[Label]) -> Vec<Vec<bool>> {
    labels_to_indices(labels)
        .into_iter()
        .map(|run| {
            let mut mask = vec![false; labels.len()];
            run.into_iter().for_each(|i| mask[i] = true);
            mask
        })
        .collect()
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_round_trip_runs() {
        let labels = [0, 1, 1, 0, 0, 2, 2, 2, 0];
        let runs = labels_to_indices(&labels);
        assert_eq!(runs, vec![vec![1, 2], vec![5, 6, 7]]);
        assert_eq!(indices_to_labels(labels.len(), &runs), labels.to_vec());
    }

    #[test]
    fn test_renumbering_is_positional() {
        let labels = [0, 3, 3, 0, 7];
        let runs = labels_to_indices(&labels);
        assert_eq!(indices_to_labels(5, &runs), vec![0, 1, 1, 0, 2]);
        let keyed = labels_to_indices_keyed(&labels);
        assert_eq!(keyed.keys().copied().collect::<Vec<_>>(), vec![3, 7]);
    }

    #[test]
    fn test_masks() {
        let labels = [1, 0, 2];
        assert_eq!(labelled_mask(&labels), vec![true, false, true]);
        assert_eq!(
            labels_to_masks(&labels),
            vec![vec![true, false, false], vec![false, false, true]]
        );
    }
}
