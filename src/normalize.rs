//! Rescaling of raw traces so that sites recorded at different intensities
//! can be compared.
use std::fmt::{self, Display};
use std::str::FromStr;

use log::warn;

use crate::arrayops::{interpolate_nans, percentile};
use crate::peak_statistics::{aboutzero, linear_regression};
use crate::site::PeakSiteError;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NormalizationMethod {
    /// Divide by the mean of a straight line fitted to the lower half of the trace
    #[default]
    Baseline,
}

impl FromStr for NormalizationMethod {
    type Err = PeakSiteError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "base" => Ok(Self::Baseline),
            _ => Err(PeakSiteError::UnknownNormalization(s.to_string())),
        }
    }
}

impl Display for NormalizationMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NormalizationMethod::Baseline => f.write_str("base"),
        }
    }
}

impl NormalizationMethod {
    pub fn apply(&self, raw: &[f64]) -> Vec<f64> {
        match self {
            NormalizationMethod::Baseline => normalize_by_baseline(raw),
        }
    }
}

/// The mean height of the baseline of `trace`.
///
/// The baseline is the least squares line through the finite samples at or
/// below the median. Returns `None` when the trace has no finite samples.
pub fn baseline_level(trace: &[f64]) -> Option<f64> {
    let mut sorted: Vec<f64> = trace.iter().copied().filter(|y| y.is_finite()).collect();
    if sorted.is_empty() {
        return None;
    }
    sorted.sort_by(|a, b| a.total_cmp(b));
    let median = percentile(&sorted, 0.5);

    let (xs, ys): (Vec<f64>, Vec<f64>) = trace
        .iter()
        .enumerate()
        .filter(|(_, y)| y.is_finite() && **y <= median)
        .map(|(i, y)| (i as f64, *y))
        .unzip();

    match linear_regression(&xs, &ys) {
        Some((intercept, slope)) => {
            let center = (trace.len() as f64 - 1.0) / 2.0;
            Some(intercept + slope * center)
        }
        None => Some(ys.iter().sum::<f64>() / ys.len() as f64),
    }
}

/// Interpolate interior gaps of `raw` and divide it by its baseline level.
///
/// A baseline at or near zero cannot be divided by, so the interpolated
/// trace is returned without rescaling.
pub fn normalize_by_baseline(raw: &[f64]) -> Vec<f64> {
    let filled = interpolate_nans(raw);
    match baseline_level(&filled) {
        Some(level) if level.is_finite() && !aboutzero(level) => {
            filled.into_iter().map(|y| y / level).collect()
        }
        Some(level) => {
            warn!("Baseline level {level} is too close to zero to normalize by, leaving trace unscaled");
            filled
        }
        None => filled,
    }
}
