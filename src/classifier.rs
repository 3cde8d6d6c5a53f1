//! The boundary with the per-frame classifier.
//!
//! Peak segmentation consumes a three class probability map (background,
//! slope, plateau) aligned frame-for-frame with the traces. How that map is
//! produced is left to an implementation of [`PeakClassifier`].
use thiserror::Error;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Index of the background class in a frame's probability triple
pub const BACKGROUND: usize = 0;
/// Index of the slope class in a frame's probability triple
pub const SLOPE: usize = 1;
/// Index of the plateau class in a frame's probability triple
pub const PLATEAU: usize = 2;

/// Per-entity, per-frame class probabilities `[background, slope, plateau]`.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ProbabilityMap {
    rows: Vec<Vec<[f64; 3]>>,
}

impl ProbabilityMap {
    pub fn new(rows: Vec<Vec<[f64; 3]>>) -> Self {
        Self { rows }
    }

    /// Assemble a map from three separate channels of identical shape.
    ///
    /// Returns `None` if the channel shapes differ.
    pub fn from_channels(
        background: &[Vec<f64>],
        slope: &[Vec<f64>],
        plateau: &[Vec<f64>],
    ) -> Option<Self> {
        if background.len() != slope.len() || slope.len() != plateau.len() {
            return None;
        }
        let mut rows = Vec::with_capacity(slope.len());
        for ((b, s), p) in background.iter().zip(slope).zip(plateau) {
            if b.len() != s.len() || s.len() != p.len() {
                return None;
            }
            rows.push(
                b.iter()
                    .zip(s)
                    .zip(p)
                    .map(|((b, s), p)| [*b, *s, *p])
                    .collect(),
            );
        }
        Some(Self { rows })
    }

    /// The number of entities in the map
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// The number of frames of each entity
    pub fn row_lengths(&self) -> impl Iterator<Item = usize> + '_ {
        self.rows.iter().map(|r| r.len())
    }

    pub fn rows(&self) -> &[Vec<[f64; 3]>] {
        &self.rows
    }

    /// Extract one class channel for entity `index`
    pub fn channel(&self, index: usize, class: usize) -> Vec<f64> {
        self.rows[index].iter().map(|p| p[class]).collect()
    }

    pub fn slope(&self, index: usize) -> Vec<f64> {
        self.channel(index, SLOPE)
    }

    pub fn plateau(&self, index: usize) -> Vec<f64> {
        self.channel(index, PLATEAU)
    }

    /// The probability that a frame belongs to any part of a peak, `slope + plateau`
    pub fn total(&self, index: usize) -> Vec<f64> {
        self.rows[index]
            .iter()
            .map(|p| p[SLOPE] + p[PLATEAU])
            .collect()
    }
}

#[derive(Debug, Clone, Error)]
pub enum ClassifierError {
    #[error("The classifier failed to produce predictions: {0}")]
    PredictionFailed(String),
}

/// Anything that can label traces frame by frame with class probabilities.
///
/// The returned map must have one row per trace and one triple per frame.
pub trait PeakClassifier {
    fn predict(&self, traces: &[Vec<f64>]) -> Result<ProbabilityMap, ClassifierError>;
}

impl<F> PeakClassifier for F
where
    F: Fn(&[Vec<f64>]) -> Result<ProbabilityMap, ClassifierError>,
{
    fn predict(&self, traces: &[Vec<f64>]) -> Result<ProbabilityMap, ClassifierError> {
        self(traces)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_channels() {
        let map = ProbabilityMap::from_channels(
            &[vec![0.8, 0.1, 0.0]],
            &[vec![0.2, 0.6, 0.1]],
            &[vec![0.0, 0.3, 0.9]],
        )
        .unwrap();
        assert_eq!(map.len(), 1);
        assert_eq!(map.plateau(0), vec![0.0, 0.3, 0.9]);
        assert_eq!(map.slope(0), vec![0.2, 0.6, 0.1]);
        let total = map.total(0);
        assert!((total[1] - 0.9).abs() < 1e-12);
        assert!((total[2] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_ragged_channels_rejected() {
        assert!(
            ProbabilityMap::from_channels(&[vec![0.0]], &[vec![0.0, 1.0]], &[vec![0.0]]).is_none()
        );
    }

    #[test]
    fn test_closure_classifier() {
        let classifier = |traces: &[Vec<f64>]| -> Result<ProbabilityMap, ClassifierError> {
            Ok(ProbabilityMap::new(
                traces
                    .iter()
                    .map(|t| t.iter().map(|_| [1.0, 0.0, 0.0]).collect())
                    .collect(),
            ))
        };
        let map = classifier.predict(&[vec![1.0, 2.0]]).unwrap();
        assert_eq!(map.row_lengths().collect::<Vec<_>>(), vec![2]);
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_json_round_trip() {
        let map = ProbabilityMap::new(vec![vec![[0.5, 0.25, 0.25], [0.0, 0.0, 1.0]]]);
        let text = serde_json::to_string(&map).unwrap();
        let restored: ProbabilityMap = serde_json::from_str(&text).unwrap();
        assert_eq!(map, restored);
    }
}
