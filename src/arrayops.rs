use num_traits::{Float, ToPrimitive};

/// Create `steps` evenly spaced values from `start` to `end`, both inclusive.
pub fn linspace<T: Float + ToPrimitive>(start: T, end: T, steps: usize) -> Vec<T> {
    match steps {
        0 => Vec::new(),
        1 => vec![start],
        _ => {
            let step = (end - start) / T::from(steps - 1).unwrap();
            let mut result = Vec::with_capacity(steps);
            for i in 0..steps - 1 {
                result.push(start + T::from(i).unwrap() * step);
            }
            result.push(end);
            result
        }
    }
}

/// Trapezoidal integration of `y` over `x`.
///
/// Segments with a non-finite end point contribute nothing, so gaps of missing
/// values are skipped rather than poisoning the whole sum.
pub fn trapz<T: Float>(x: &[T], y: &[T]) -> T {
    let n = x.len().min(y.len());
    if n < 2 {
        return T::zero();
    }
    let half = T::from(0.5).unwrap();
    (0..n - 1)
        .map(|i| {
            let (y0, y1) = (y[i], y[i + 1]);
            if y0.is_finite() && y1.is_finite() {
                (x[i + 1] - x[i]) * half * (y0 + y1)
            } else {
                T::zero()
            }
        })
        .fold(T::zero(), |acc, v| acc + v)
}

/// Find the minimum and maximum of `values`, ignoring NaN.
///
/// Returns `None` when there is no finite value to compare.
pub fn nan_minmax<T: Float>(values: &[T]) -> Option<(T, T)> {
    let mut max = -T::infinity();
    let mut min = T::infinity();
    let mut seen = false;

    for v in values.iter().filter(|v| !v.is_nan()) {
        seen = true;
        if *v > max {
            max = *v;
        }
        if *v < min {
            min = *v
        }
    }
    seen.then_some((min, max))
}

/// The position of the largest non-NaN value among `indices` of `values`.
/// The first index wins ties.
pub fn nan_argmax<T: Float>(values: &[T], indices: &[usize]) -> Option<usize> {
    let mut best: Option<usize> = None;
    for &i in indices {
        let v = values[i];
        if v.is_nan() {
            continue;
        }
        match best {
            Some(b) if values[b] >= v => {}
            _ => best = Some(i),
        }
    }
    best
}

/// Linear-interpolated percentile of an already sorted slice, `percent` in `[0, 1]`.
pub fn percentile<T: Float + ToPrimitive>(values: &[T], percent: f64) -> T {
    let k = (values.len() - 1) as f64 * percent;
    let f = k.floor();
    let c = k.ceil();
    if f == c {
        return values[k as usize];
    }
    let d0 = values[f as usize] * T::from(c - k).unwrap();
    let d1 = values[c as usize] * T::from(k - f).unwrap();
    d0 + d1
}

/// Fill interior runs of NaN by linear interpolation between the nearest
/// finite neighbours. Leading and trailing NaNs are left in place.
pub fn interpolate_nans<T: Float>(values: &[T]) -> Vec<T> {
    let mut result = values.to_vec();
    let mut last_finite: Option<usize> = None;
    for i in 0..result.len() {
        if result[i].is_nan() {
            continue;
        }
        if let Some(j) = last_finite {
            if i - j > 1 {
                let (y0, y1) = (result[j], result[i]);
                let span = T::from(i - j).unwrap();
                for k in (j + 1)..i {
                    let t = T::from(k - j).unwrap() / span;
                    result[k] = y0 + (y1 - y0) * t;
                }
            }
        }
        last_finite = Some(i);
    }
    result
}

/// First differences, `n - 1` values for `n` samples.
pub fn diff<T: Float>(values: &[T]) -> Vec<T> {
    values.windows(2).map(|w| w[1] - w[0]).collect()
}

/// Running sum treating NaN as zero.
pub fn nan_cumsum<T: Float>(values: &[T]) -> Vec<T> {
    values
        .iter()
        .scan(T::zero(), |acc, v| {
            if !v.is_nan() {
                *acc = *acc + *v;
            }
            Some(*acc)
        })
        .collect()
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_linspace() {
        let xs = linspace(0.0, 10.0, 5);
        assert_eq!(xs, vec![0.0, 2.5, 5.0, 7.5, 10.0]);
        assert_eq!(linspace(3.0, 4.0, 1), vec![3.0]);
        assert!(linspace(3.0f64, 4.0, 0).is_empty());
    }

    #[test]
    fn test_trapz_skips_missing() {
        let x = [0.0, 1.0, 2.0, 3.0];
        let y = [0.0, 2.0, 2.0, 0.0];
        assert_eq!(trapz(&x, &y), 4.0);

        let y = [0.0, 2.0, f64::NAN, 0.0];
        assert_eq!(trapz(&x, &y), 1.0);
    }

    #[test]
    fn test_interpolate_interior_only() {
        let y = [f64::NAN, 1.0, f64::NAN, f64::NAN, 4.0, f64::NAN];
        let z = interpolate_nans(&y);
        assert!(z[0].is_nan());
        assert_eq!(&z[1..5], &[1.0, 2.0, 3.0, 4.0]);
        assert!(z[5].is_nan());
    }

    #[test]
    fn test_argmax_and_minmax() {
        let y = [1.0, f64::NAN, 5.0, 5.0, 2.0];
        assert_eq!(nan_argmax(&y, &[0, 1, 2, 3, 4]), Some(2));
        assert_eq!(nan_argmax(&y, &[1]), None);
        assert_eq!(nan_minmax(&y), Some((1.0, 5.0)));
        assert_eq!(nan_minmax(&[f64::NAN]), None);
    }

    #[test]
    fn test_diff_and_cumsum() {
        let y = [1.0, 3.0, f64::NAN, 4.0];
        let d = diff(&y);
        assert_eq!(d.len(), 3);
        assert_eq!(d[0], 2.0);
        assert_eq!(nan_cumsum(&y), vec![1.0, 4.0, 4.0, 8.0]);
    }

    #[test]
    fn test_percentile() {
        let v = [1.0, 2.0, 3.0, 4.0];
        assert_eq!(percentile(&v, 0.5), 2.5);
        assert_eq!(percentile(&v, 1.0), 4.0);
    }
}
