//! Geometric descriptors of a single peak on a single trace.
//!
//! These functions are the arithmetic behind the cached metrics of
//! [`PeakSite`](crate::site::PeakSite). Each works on one trace and one peak,
//! given as the sorted frame indices of the peak (and, where relevant, of the
//! seed plateau it grew from).
use nalgebra::{DMatrix, DVector};
use num_traits::{Float, FromPrimitive};

use crate::arrayops::{nan_argmax, trapz};
use crate::labels::{labels_to_indices, Label};
use crate::metrics::Estimate;
use crate::peak::{Base, CrossPoints, Point, PointPair, Prominence, SlopePoints};

pub fn _isclose<T>(x: T, y: T, rtol: T, atol: T) -> bool
where
    T: Float,
{
    (x - y).abs() <= (atol + rtol * y.abs())
}

pub fn isclose<T>(x: T, y: T) -> bool
where
    T: Float + FromPrimitive,
{
    _isclose(x, y, T::from_f64(1e-5).unwrap(), T::from_f64(1e-8).unwrap())
}

pub fn aboutzero<T>(x: T) -> bool
where
    T: Float + FromPrimitive,
{
    isclose(x, T::zero())
}

/// Ordinary least squares fit of `y = intercept + slope * x`.
///
/// Returns `(intercept, slope)`, or `None` when fewer than two distinct `x`
/// values are given.
#[allow(non_snake_case)]
pub fn linear_regression(xs: &[f64], ys: &[f64]) -> Option<(f64, f64)> {
    let n = xs.len().min(ys.len());
    if n < 2 || xs[..n].iter().all(|x| *x == xs[0]) {
        return None;
    }
    let A = DMatrix::from_fn(n, 2, |i, j| if j == 0 { 1.0 } else { xs[i] });
    let Z = DVector::from_column_slice(&ys[..n]);
    let A_t = A.transpose();
    let A_t_A = &A_t * &A;
    let iA_t_A = A_t_A.try_inverse()?;
    let B = iA_t_A * A_t * Z;
    Some((B[0], B[1]))
}

fn finite_points(trace: &[f64], frames: impl Iterator<Item = usize>) -> (Vec<f64>, Vec<f64>) {
    frames
        .filter(|i| trace[*i].is_finite())
        .map(|i| (i as f64, trace[i]))
        .unzip()
}

/// The frame and value of the highest sample of the peak. The earliest frame
/// wins ties.
pub fn peak_amplitude(trace: &[f64], peak: &[usize]) -> Point {
    match nan_argmax(trace, peak) {
        Some(i) => Point::at(trace, i),
        None => Point::new(peak.first().copied().unwrap_or_default() as f64, f64::NAN),
    }
}

/// The two boundary points of the peak, taken at its first and last finite
/// samples.
///
/// With `adjust_edge`, a side lying within `dist` frames of the start or end
/// of the trace is truncated signal, so its height is replaced by the other
/// side's. If both sides touch an edge, both take the lower height.
pub fn peak_base_pts(trace: &[f64], peak: &[usize], adjust_edge: bool, dist: usize) -> PointPair {
    let (Some(&start), Some(&end)) = (peak.first(), peak.last()) else {
        return PointPair::default();
    };
    let left = peak
        .iter()
        .find(|i| trace[**i].is_finite())
        .map(|i| Point::at(trace, *i))
        .unwrap_or_else(|| Point::new(start as f64, f64::NAN));
    let right = peak
        .iter()
        .rev()
        .find(|i| trace[**i].is_finite())
        .map(|i| Point::at(trace, *i))
        .unwrap_or_else(|| Point::new(end as f64, f64::NAN));
    let mut pts = PointPair::new(left, right);

    if adjust_edge {
        let last_frame = trace.len().saturating_sub(1);
        let touches_start = start <= dist;
        let touches_end = last_frame.saturating_sub(end) <= dist;
        match (touches_start, touches_end) {
            (true, true) => {
                let low = pts.left.y.min(pts.right.y);
                pts.left.y = low;
                pts.right.y = low;
            }
            (true, false) => pts.left.y = pts.right.y,
            (false, true) => pts.right.y = pts.left.y,
            (false, false) => {}
        }
    }
    pts
}

/// Edge heights and angle of the line through the base points
pub fn peak_base(base_pts: &PointPair) -> Base {
    let dy = base_pts.right.y - base_pts.left.y;
    let dx = base_pts.span();
    Base::new(base_pts.left.y, base_pts.right.y, dy.atan2(dx))
}

/// Where `x` falls along the span of the peak, from `0` at the first frame to
/// `1` at the last. Single-frame peaks are symmetric by definition.
pub fn peak_asymmetry(peak: &[usize], x: f64) -> f64 {
    match (peak.first(), peak.last()) {
        (Some(&start), Some(&end)) if end > start => (x - start as f64) / (end - start) as f64,
        _ => 0.5,
    }
}

/// The midpoint of a plateau, in frames
pub fn plateau_center(plateau: &[usize]) -> Option<f64> {
    match (plateau.first(), plateau.last()) {
        (Some(&start), Some(&end)) => Some((start + end) as f64 / 2.0),
        _ => None,
    }
}

/// Group the peaks of one label array into tracts.
///
/// Two consecutive peaks share a tract when at most `max_gap` unlabelled
/// frames separate them. Peaks are identified by their position in the
/// ascending label order, and every peak belongs to exactly one tract.
pub fn detect_peak_tracts(labels: &[Label], max_gap: usize) -> Vec<Vec<usize>> {
    let mut spans: Vec<(usize, usize, usize)> = labels_to_indices(labels)
        .iter()
        .enumerate()
        .map(|(position, frames)| (frames[0], frames[frames.len() - 1], position))
        .collect();
    spans.sort_unstable();

    let mut tracts: Vec<Vec<usize>> = Vec::new();
    let mut last_end: Option<usize> = None;
    for (start, end, position) in spans {
        match (last_end, tracts.last_mut()) {
            (Some(prev), Some(tract)) if start.saturating_sub(prev + 1) <= max_gap => {
                tract.push(position);
            }
            _ => tracts.push(vec![position]),
        }
        last_end = Some(last_end.map_or(end, |prev| prev.max(end)));
    }
    tracts
}

/// The height of a peak above the line joining its base points, measured at
/// the apex.
pub fn peak_prominence(amplitude: &Point, base_pts: &PointPair) -> Prominence {
    let base = base_pts.height_at(amplitude.x);
    Prominence::new(amplitude.y - base, base)
}

/// Prominences for all peaks of one trace where each peak's base is shared
/// across its tract.
///
/// The shared base is the lowest of the tract members' own base heights, or
/// the highest when `bi_directional` is set.
pub fn tract_adjusted_prominence(
    tracts: &[Vec<usize>],
    amplitudes: &[Point],
    base_pts: &[PointPair],
    bi_directional: bool,
) -> Vec<Prominence> {
    let own: Vec<f64> = amplitudes
        .iter()
        .zip(base_pts)
        .map(|(a, b)| b.height_at(a.x))
        .collect();
    let mut bases = own.clone();
    let count = bases.len();

    for tract in tracts.iter() {
        let heights = tract.iter().filter_map(|p| own.get(*p)).copied();
        let shared = if bi_directional {
            heights.fold(f64::NEG_INFINITY, f64::max)
        } else {
            heights.fold(f64::INFINITY, f64::min)
        };
        if !shared.is_finite() {
            continue;
        }
        for p in tract.iter().filter(|p| **p < count) {
            bases[*p] = shared;
        }
    }

    amplitudes
        .iter()
        .zip(bases)
        .map(|(a, base)| Prominence::new(a.y - base, base))
        .collect()
}

fn fit_flank(trace: &[f64], start: usize, end: usize) -> Option<PointPair> {
    let (xs, ys) = finite_points(trace, start..=end);
    let (intercept, slope) = linear_regression(&xs, &ys)?;
    let x0 = xs[0];
    let x1 = xs[xs.len() - 1];
    Some(PointPair::new(
        Point::new(x0, intercept + slope * x0),
        Point::new(x1, intercept + slope * x1),
    ))
}

/// Fit a line to each flank of the peak: from the first peak frame to the
/// start of the plateau, and from the end of the plateau to the last peak
/// frame. Without a plateau the apex splits the flanks.
pub fn peak_slope_pts(trace: &[f64], peak: &[usize], plateau: &[usize]) -> SlopePoints {
    let (Some(&start), Some(&end)) = (peak.first(), peak.last()) else {
        return SlopePoints::default();
    };
    let (top_start, top_end) = match (plateau.first(), plateau.last()) {
        (Some(&a), Some(&b)) => (a.max(start), b.min(end)),
        _ => {
            let apex = nan_argmax(trace, peak).unwrap_or(start);
            (apex, apex)
        }
    };
    SlopePoints {
        rising: fit_flank(trace, start, top_start.max(start)),
        falling: fit_flank(trace, top_end.min(end), end),
    }
}

fn interpolate_crossing(y0: f64, y1: f64, height: f64) -> f64 {
    if y1 == y0 {
        0.0
    } else {
        (height - y0) / (y1 - y0)
    }
}

/// Locate where the trace crosses `height` on the rising and falling sides of
/// the peak.
///
/// Crossings are interpolated linearly between neighbouring frames inside the
/// peak. With `return_widest` the outermost crossing on each side is used,
/// otherwise the one closest to the apex. A side with no crossing, because
/// `height` lies below that edge of the peak, is estimated according to
/// `estimate`: along the fitted flank in `slope_pts` for [`Estimate::Linear`],
/// or at the edge of `base_pts` for [`Estimate::Base`]. Heights above the apex
/// have no crossings at all.
#[allow(clippy::too_many_arguments)]
pub fn crosses_at_height(
    trace: &[f64],
    peak: &[usize],
    height: f64,
    estimate: Estimate,
    return_widest: bool,
    amplitude: &Point,
    slope_pts: Option<&SlopePoints>,
    base_pts: Option<&PointPair>,
) -> Option<CrossPoints> {
    let (Some(&start), Some(&end)) = (peak.first(), peak.last()) else {
        return None;
    };
    if !height.is_finite() || amplitude.y.is_nan() || amplitude.y < height {
        return None;
    }
    let apex = (amplitude.x as usize).clamp(start, end);

    let rising = (start..apex).filter(|i| {
        let (y0, y1) = (trace[*i], trace[*i + 1]);
        y0 <= height && height <= y1
    });
    let left = (if return_widest { rising.min() } else { rising.max() })
        .map(|i| i as f64 + interpolate_crossing(trace[i], trace[i + 1], height));

    let falling = (apex..end).filter(|i| {
        let (y0, y1) = (trace[*i], trace[*i + 1]);
        y0 >= height && height >= y1
    });
    let right = (if return_widest { falling.max() } else { falling.min() })
        .map(|i| i as f64 + interpolate_crossing(-trace[i], -trace[i + 1], -height));

    let edge_left = base_pts.map_or(start as f64, |b| b.left.x);
    let edge_right = base_pts.map_or(end as f64, |b| b.right.x);

    let left = left.unwrap_or_else(|| match estimate {
        Estimate::Linear => slope_pts
            .and_then(|s| s.rising.as_ref())
            .and_then(|flank| SlopePoints::solve(flank, height))
            .unwrap_or(start as f64),
        Estimate::Base => edge_left,
    });
    let right = right.unwrap_or_else(|| match estimate {
        Estimate::Linear => slope_pts
            .and_then(|s| s.falling.as_ref())
            .and_then(|flank| SlopePoints::solve(flank, height))
            .unwrap_or(end as f64),
        Estimate::Base => edge_right,
    });

    Some(CrossPoints::new(
        Point::new(left, height),
        Point::new(right, height),
    ))
}

/// The distance in frames between two crossing points
pub fn width_at_pts(cross_pts: Option<&CrossPoints>) -> Option<f64> {
    cross_pts.map(|c| c.span())
}

/// The first and last samples of a plateau
pub fn plateau_pts(trace: &[f64], plateau: &[usize]) -> Option<PointPair> {
    match (plateau.first(), plateau.last()) {
        (Some(&a), Some(&b)) => Some(PointPair::new(Point::at(trace, a), Point::at(trace, b))),
        _ => None,
    }
}

/// Trapezoidal area under `trace` over the given frames
pub fn area_under_curve(trace: &[f64], frames: &[usize]) -> f64 {
    let xs: Vec<f64> = frames.iter().map(|i| *i as f64).collect();
    let ys: Vec<f64> = frames.iter().map(|i| trace[*i]).collect();
    trapz(&xs, &ys)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::test_data::triangle;
    use rstest::rstest;

    fn triangle_peak() -> (Vec<f64>, Vec<usize>, Vec<usize>) {
        (triangle(21, 10.0), (1..20).collect(), vec![9, 10, 11])
    }

    #[test]
    fn test_regression() {
        let xs = [0.0, 1.0, 2.0, 3.0];
        let ys = [1.0, 3.0, 5.0, 7.0];
        let (a, b) = linear_regression(&xs, &ys).unwrap();
        assert!(isclose(a, 1.0));
        assert!(isclose(b, 2.0));
        assert!(linear_regression(&[1.0, 1.0], &[0.0, 2.0]).is_none());
        assert!(linear_regression(&[1.0], &[0.0]).is_none());
    }

    #[test]
    fn test_amplitude() {
        let (trace, peak, _) = triangle_peak();
        assert_eq!(peak_amplitude(&trace, &peak), Point::new(10.0, 10.0));
        let flat = vec![1.0, 3.0, 3.0, 1.0];
        assert_eq!(peak_amplitude(&flat, &[0, 1, 2, 3]), Point::new(1.0, 3.0));
    }

    #[rstest]
    #[case(true, 4, 1.0, 1.0)]
    #[case(false, 4, 1.0, 1.0)]
    fn test_base_pts_symmetric(
        #[case] adjust_edge: bool,
        #[case] dist: usize,
        #[case] left: f64,
        #[case] right: f64,
    ) {
        let (trace, peak, _) = triangle_peak();
        let pts = peak_base_pts(&trace, &peak, adjust_edge, dist);
        assert_eq!(pts.left, Point::new(1.0, left));
        assert_eq!(pts.right, Point::new(19.0, right));
    }

    #[test]
    fn test_base_pts_edge_flattening() {
        let trace = vec![5.0, 6.0, 8.0, 6.0, 4.0, 2.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0];
        let peak: Vec<usize> = (0..6).collect();
        let raw = peak_base_pts(&trace, &peak, false, 2);
        assert_eq!((raw.left.y, raw.right.y), (5.0, 2.0));
        let adjusted = peak_base_pts(&trace, &peak, true, 2);
        assert_eq!((adjusted.left.y, adjusted.right.y), (2.0, 2.0));
        assert!(peak_base(&adjusted).is_flat());

        let base = peak_base(&raw);
        assert!(base.angle < 0.0);
        assert!((base.angle - (-3.0f64).atan2(5.0)).abs() < 1e-12);
    }

    #[test]
    fn test_asymmetry() {
        let peak: Vec<usize> = (10..=20).collect();
        assert_eq!(peak_asymmetry(&peak, 15.0), 0.5);
        assert_eq!(peak_asymmetry(&peak, 12.0), 0.2);
        assert_eq!(peak_asymmetry(&[4], 4.0), 0.5);
        assert_eq!(plateau_center(&[3, 4, 5, 6]), Some(4.5));
        assert_eq!(plateau_center(&[]), None);
    }

    #[rstest]
    #[case(0, vec![vec![0], vec![1], vec![2]])]
    #[case(1, vec![vec![0, 1], vec![2]])]
    #[case(4, vec![vec![0, 1, 2]])]
    fn test_tracts(#[case] max_gap: usize, #[case] expected: Vec<Vec<usize>>) {
        let labels = [1, 1, 0, 2, 2, 0, 0, 0, 0, 3, 3];
        assert_eq!(detect_peak_tracts(&labels, max_gap), expected);
    }

    #[test]
    fn test_prominence_in_tract() {
        let amplitudes = [Point::new(2.0, 10.0), Point::new(6.0, 7.0)];
        let base_pts = [
            PointPair::new(Point::new(0.0, 1.0), Point::new(4.0, 1.0)),
            PointPair::new(Point::new(5.0, 5.0), Point::new(8.0, 5.0)),
        ];
        assert_eq!(peak_prominence(&amplitudes[1], &base_pts[1]), Prominence::new(2.0, 5.0));

        let tracts = vec![vec![0, 1]];
        let lowered = tract_adjusted_prominence(&tracts, &amplitudes, &base_pts, false);
        assert_eq!(lowered, vec![Prominence::new(9.0, 1.0), Prominence::new(6.0, 1.0)]);

        let raised = tract_adjusted_prominence(&tracts, &amplitudes, &base_pts, true);
        assert_eq!(raised, vec![Prominence::new(5.0, 5.0), Prominence::new(2.0, 5.0)]);

        let separate = vec![vec![0], vec![1]];
        let own = tract_adjusted_prominence(&separate, &amplitudes, &base_pts, false);
        assert_eq!(own[1], Prominence::new(2.0, 5.0));
    }

    #[test]
    fn test_slope_pts() {
        let (trace, peak, plateau) = triangle_peak();
        let slopes = peak_slope_pts(&trace, &peak, &plateau);
        let rising = slopes.rising.unwrap();
        let falling = slopes.falling.unwrap();
        assert!(isclose(rising.left.x, 1.0) && isclose(rising.left.y, 1.0));
        assert!(isclose(rising.right.x, 9.0) && isclose(rising.right.y, 9.0));
        assert!(isclose(falling.left.x, 11.0) && isclose(falling.left.y, 9.0));
        assert!(isclose(falling.right.x, 19.0) && isclose(falling.right.y, 1.0));
    }

    #[rstest]
    #[case(5.5, Estimate::Linear, true, 5.5, 14.5)]
    #[case(1.0, Estimate::Linear, true, 1.0, 19.0)]
    #[case(0.5, Estimate::Linear, true, 0.5, 19.5)]
    #[case(0.5, Estimate::Base, true, 1.0, 19.0)]
    fn test_crossings(
        #[case] height: f64,
        #[case] estimate: Estimate,
        #[case] widest: bool,
        #[case] left: f64,
        #[case] right: f64,
    ) {
        let (trace, peak, plateau) = triangle_peak();
        let amplitude = peak_amplitude(&trace, &peak);
        let slopes = peak_slope_pts(&trace, &peak, &plateau);
        let base_pts = peak_base_pts(&trace, &peak, true, 4);
        let cross = crosses_at_height(
            &trace,
            &peak,
            height,
            estimate,
            widest,
            &amplitude,
            Some(&slopes),
            Some(&base_pts),
        )
        .unwrap();
        assert!((cross.left.x - left).abs() < 1e-9, "{cross:?}");
        assert!((cross.right.x - right).abs() < 1e-9, "{cross:?}");
        assert_eq!(cross.left.y, height);
        assert!((width_at_pts(Some(&cross)).unwrap() - (right - left)).abs() < 1e-9);
    }

    #[test]
    fn test_widest_and_narrowest() {
        // two humps above the target height on the rising side
        let trace = vec![0.0, 4.0, 6.0, 4.0, 6.0, 10.0, 6.0, 0.0];
        let peak: Vec<usize> = (0..8).collect();
        let amplitude = peak_amplitude(&trace, &peak);
        let widest =
            crosses_at_height(&trace, &peak, 5.0, Estimate::Base, true, &amplitude, None, None)
                .unwrap();
        let narrowest =
            crosses_at_height(&trace, &peak, 5.0, Estimate::Base, false, &amplitude, None, None)
                .unwrap();
        assert_eq!(widest.left.x, 1.5);
        assert_eq!(narrowest.left.x, 3.5);
        assert_eq!(widest.right.x, narrowest.right.x);
        assert!(width_at_pts(Some(&widest)).unwrap() > width_at_pts(Some(&narrowest)).unwrap());
    }

    #[test]
    fn test_above_apex_has_no_crossing() {
        let (trace, peak, _) = triangle_peak();
        let amplitude = peak_amplitude(&trace, &peak);
        assert!(crosses_at_height(
            &trace,
            &peak,
            11.0,
            Estimate::Linear,
            true,
            &amplitude,
            None,
            None
        )
        .is_none());
        assert_eq!(width_at_pts(None), None);
    }

    #[test]
    fn test_plateau_and_area() {
        let (trace, peak, plateau) = triangle_peak();
        let pts = plateau_pts(&trace, &plateau).unwrap();
        assert_eq!(pts.span(), 2.0);
        assert!(plateau_pts(&trace, &[]).is_none());
        // area of the triangle between frames 1 and 19
        assert!((area_under_curve(&trace, &peak) - 99.0).abs() < 1e-9);
        let all: Vec<usize> = (0..21).collect();
        assert!((area_under_curve(&trace, &all) - 100.0).abs() < 1e-9);
    }
}
