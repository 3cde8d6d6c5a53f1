//! Synthetic traces and probability maps shared by the unit tests.
use crate::classifier::ProbabilityMap;

/// A symmetric triangle of `n` frames peaking at `height` in the middle frame
/// and falling to `0` at both ends.
pub fn triangle(n: usize, height: f64) -> Vec<f64> {
    let center = (n as f64 - 1.0) / 2.0;
    (0..n)
        .map(|i| height - (i as f64 - center).abs() * height / center)
        .collect()
}

/// Two overlapping triangles, apexes of 10 at frame 8 and 8 at frame 20, with
/// the valley between them at frame 15.
pub fn two_peaks() -> Vec<f64> {
    (0..30)
        .map(|i| {
            let x = i as f64;
            (10.0 - (x - 8.0).abs()).max(8.0 - (x - 20.0).abs())
        })
        .collect()
}

/// A probability map calling every frame at or above `threshold` plateau and
/// every other frame slope.
pub fn probabilities_from_plateaus(traces: &[Vec<f64>], threshold: f64) -> ProbabilityMap {
    ProbabilityMap::new(
        traces
            .iter()
            .map(|t| {
                t.iter()
                    .map(|y| {
                        if *y >= threshold {
                            [0.0, 0.0, 1.0]
                        } else {
                            [0.0, 1.0, 0.0]
                        }
                    })
                    .collect()
            })
            .collect(),
    )
}

/// Three traces: a two peak trace, an exact copy of it, and a lone triangle
/// padded to the same length.
pub fn duplicated_site() -> Vec<Vec<f64>> {
    let mut lone = vec![0.0; 30];
    for (i, y) in triangle(11, 6.0).into_iter().enumerate() {
        lone[i + 10] = y;
    }
    vec![two_peaks(), two_peaks(), lone]
}
