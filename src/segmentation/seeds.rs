//! Threshold the plateau probability channel into seed runs.
use crate::labels::{indices_to_labels, Label};

/// Split the frames where `probability > min_prob` into runs.
///
/// Selected frames separated by at most `max_gap` unselected frames belong
/// to the same run, so `max_gap == 0` only joins directly adjacent frames.
/// Runs with fewer than `min_length` selected frames are discarded. The
/// runs are returned in order of position.
pub fn constant_threshold_segments(
    probability: &[f64],
    min_prob: f64,
    min_length: usize,
    max_gap: usize,
) -> Vec<Vec<usize>> {
    let mut runs: Vec<Vec<usize>> = Vec::new();
    let mut current: Vec<usize> = Vec::new();

    for (i, p) in probability.iter().enumerate() {
        if p.is_nan() || *p <= min_prob {
            continue;
        }
        if let Some(last) = current.last() {
            if i - last - 1 > max_gap {
                runs.push(std::mem::take(&mut current));
            }
        }
        current.push(i);
    }
    if !current.is_empty() {
        runs.push(current);
    }

    runs.retain(|run| run.len() >= min_length);
    runs
}

/// Seed label array for one trace, seeds numbered from 1 in order of position.
pub fn seed_labels(
    probability: &[f64],
    min_prob: f64,
    min_length: usize,
    max_gap: usize,
) -> Vec<Label> {
    let runs = constant_threshold_segments(probability, min_prob, min_length, max_gap);
    indices_to_labels(probability.len(), &runs)
}

#[cfg(test)]
mod test {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_single_plateau() {
        let p = [0.0, 0.0, 0.9, 0.9, 0.9, 0.0, 0.0];
        let runs = constant_threshold_segments(&p, 0.8, 2, 0);
        assert_eq!(runs, vec![vec![2, 3, 4]]);
        assert_eq!(seed_labels(&p, 0.8, 2, 0), vec![0, 0, 1, 1, 1, 0, 0]);
    }

    #[rstest]
    #[case(0, vec![vec![1, 2], vec![4, 5]])]
    #[case(1, vec![vec![1, 2, 4, 5]])]
    fn test_gap_merging(#[case] max_gap: usize, #[case] expected: Vec<Vec<usize>>) {
        let p = [0.1, 0.95, 0.95, 0.2, 0.95, 0.95, 0.1];
        assert_eq!(constant_threshold_segments(&p, 0.8, 2, max_gap), expected);
    }

    #[test]
    fn test_short_runs_dropped() {
        let p = [0.9, 0.0, 0.9, 0.9, 0.0, 0.0, 0.9];
        assert_eq!(constant_threshold_segments(&p, 0.8, 2, 0), vec![vec![2, 3]]);
    }

    #[test]
    fn test_threshold_is_strict() {
        let p = [0.8, 0.8, 0.8];
        assert!(constant_threshold_segments(&p, 0.8, 1, 0).is_empty());
        assert_eq!(seed_labels(&p, 0.8, 1, 0), vec![0, 0, 0]);
    }
}
