//! Metric identities, parameters and cached values.
//!
//! Every metric a [`PeakSite`](crate::site::PeakSite) can compute is named by a
//! [`MetricKey`] which carries all of the parameters that affect its value, so
//! two requests for the same metric with different parameters are cached side
//! by side. [`MetricKey::dependencies`] describes the small acyclic graph of
//! prerequisites the site walks before computing a metric.
use std::fmt::{self, Display};
use std::str::FromStr;

use thiserror::Error;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::peak::{Base, CrossPoints, Point, PointPair, Prominence, SlopePoints};

/// Which peak universe of a site a metric is computed over
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum PeakSet {
    /// Every peak found by segmentation
    #[default]
    All,
    /// Peaks left after removing those duplicated in another trace
    Deduplicated,
}

impl Display for PeakSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PeakSet::All => f.write_str("all"),
            PeakSet::Deduplicated => f.write_str("deduplicated"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum MetricParseError {
    #[error("Unknown estimate method {0}")]
    UnknownEstimate(String),
    #[error("Unknown asymmetry method {0}")]
    UnknownAsymmetry(String),
    #[error("Crossing height {0} is not finite or exceeds {max} in magnitude", max = MAX_HEIGHT)]
    InvalidHeight(f64),
}

/// How a missing crossing is placed when the target height lies below one
/// edge of the peak
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Estimate {
    /// Extend the fitted flank line down to the target height
    #[default]
    Linear,
    /// Use the frame of the peak's base point
    Base,
}

impl FromStr for Estimate {
    type Err = MetricParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "linear" => Ok(Self::Linear),
            "base" => Ok(Self::Base),
            _ => Err(MetricParseError::UnknownEstimate(s.to_string())),
        }
    }
}

impl Display for Estimate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Estimate::Linear => f.write_str("linear"),
            Estimate::Base => f.write_str("base"),
        }
    }
}

/// The point whose position along the peak defines its asymmetry
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum AsymmetryMethod {
    Amplitude,
    #[default]
    Plateau,
}

impl FromStr for AsymmetryMethod {
    type Err = MetricParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "amplitude" => Ok(Self::Amplitude),
            "plateau" => Ok(Self::Plateau),
            _ => Err(MetricParseError::UnknownAsymmetry(s.to_string())),
        }
    }
}

impl Display for AsymmetryMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AsymmetryMethod::Amplitude => f.write_str("amplitude"),
            AsymmetryMethod::Plateau => f.write_str("plateau"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct BaseParams {
    /// Flatten the base of peaks touching either end of the trace
    pub adjust_edge: bool,
    /// How close to an end of the trace a peak must be to count as touching it
    pub dist: usize,
}

impl BaseParams {
    pub fn adjust_edge(mut self, adjust_edge: bool) -> Self {
        self.adjust_edge = adjust_edge;
        self
    }

    pub fn dist(mut self, dist: usize) -> Self {
        self.dist = dist;
        self
    }
}

impl Default for BaseParams {
    fn default() -> Self {
        Self {
            adjust_edge: true,
            dist: 4,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ProminenceParams {
    /// Share one base across all the peaks of a tract
    pub adjust_tracts: bool,
    /// Share the highest base of a tract instead of the lowest
    pub bi_directional: bool,
    /// The largest gap in frames between two peaks of one tract
    pub max_gap: usize,
    pub base: BaseParams,
}

impl ProminenceParams {
    pub fn adjust_tracts(mut self, adjust_tracts: bool) -> Self {
        self.adjust_tracts = adjust_tracts;
        self
    }

    pub fn bi_directional(mut self, bi_directional: bool) -> Self {
        self.bi_directional = bi_directional;
        self
    }

    pub fn max_gap(mut self, max_gap: usize) -> Self {
        self.max_gap = max_gap;
        self
    }

    pub fn base(mut self, base: BaseParams) -> Self {
        self.base = base;
        self
    }
}

impl Default for ProminenceParams {
    fn default() -> Self {
        Self {
            adjust_tracts: true,
            bi_directional: false,
            max_gap: 12,
            base: BaseParams::default(),
        }
    }
}

/// The height at which crossings are located
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Height {
    /// A fraction of the prominence above the peak's base
    Relative(f64),
    /// An absolute signal value
    Absolute(f64),
}

impl Default for Height {
    fn default() -> Self {
        Self::Relative(0.5)
    }
}

/// The largest height magnitude that survives rounding to hundredths exactly
pub const MAX_HEIGHT: f64 = 1e15;

/// A [`Height`] rounded to hundredths, usable as part of a cache key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HeightKey {
    Relative(i64),
    Absolute(i64),
}

impl HeightKey {
    fn round(value: f64) -> Result<i64, MetricParseError> {
        if !value.is_finite() || value.abs() > MAX_HEIGHT {
            return Err(MetricParseError::InvalidHeight(value));
        }
        Ok((value * 100.0).round() as i64)
    }

    /// The rounded height as a floating point value
    pub fn value(&self) -> f64 {
        match self {
            Self::Relative(v) | Self::Absolute(v) => *v as f64 / 100.0,
        }
    }
}

impl TryFrom<Height> for HeightKey {
    type Error = MetricParseError;

    fn try_from(value: Height) -> Result<Self, Self::Error> {
        match value {
            Height::Relative(h) => Self::round(h).map(Self::Relative),
            Height::Absolute(h) => Self::round(h).map(Self::Absolute),
        }
    }
}

impl Display for HeightKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (prefix, v) = match self {
            Self::Relative(v) => ("rel", v),
            Self::Absolute(v) => ("abs", v),
        };
        let sign = if *v < 0 { "m" } else { "" };
        let v = v.unsigned_abs();
        write!(f, "{prefix}_{sign}{}_{:02}", v / 100, v % 100)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CrossParams {
    pub height: Height,
    pub estimate: Estimate,
    /// Use the outermost crossing on each side rather than the innermost
    pub return_widest: bool,
    /// The prominence a relative height is measured against
    pub prominence: ProminenceParams,
}

impl CrossParams {
    pub fn relative(mut self, fraction: f64) -> Self {
        self.height = Height::Relative(fraction);
        self
    }

    pub fn absolute(mut self, height: f64) -> Self {
        self.height = Height::Absolute(height);
        self
    }

    pub fn estimate(mut self, estimate: Estimate) -> Self {
        self.estimate = estimate;
        self
    }

    pub fn return_widest(mut self, return_widest: bool) -> Self {
        self.return_widest = return_widest;
        self
    }

    pub fn prominence(mut self, prominence: ProminenceParams) -> Self {
        self.prominence = prominence;
        self
    }

    /// Fails when the height is NaN, infinite or beyond [`MAX_HEIGHT`]
    pub fn to_key(&self) -> Result<CrossKey, MetricParseError> {
        Ok(CrossKey {
            height: self.height.try_into()?,
            estimate: self.estimate,
            return_widest: self.return_widest,
            prominence: self.prominence,
        })
    }
}

impl Default for CrossParams {
    fn default() -> Self {
        Self {
            height: Height::default(),
            estimate: Estimate::default(),
            return_widest: true,
            prominence: ProminenceParams::default(),
        }
    }
}

/// The hashable form of [`CrossParams`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CrossKey {
    pub height: HeightKey,
    pub estimate: Estimate,
    pub return_widest: bool,
    pub prominence: ProminenceParams,
}

impl TryFrom<CrossParams> for CrossKey {
    type Error = MetricParseError;

    fn try_from(value: CrossParams) -> Result<Self, Self::Error> {
        value.to_key()
    }
}

/// The identity of a cached metric, including every parameter it depends on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricKey {
    Amplitude,
    BasePoints(BaseParams),
    Base(BaseParams),
    Asymmetry(AsymmetryMethod),
    Tracts { max_gap: usize },
    Prominence(ProminenceParams),
    SlopePoints,
    CrossPoints(CrossKey),
    Width(CrossKey),
    PlateauWidth,
    PlateauPoints,
    PeakAuc,
    TotalAuc,
    Derivative,
    Integral,
}

impl MetricKey {
    pub const fn name(&self) -> &'static str {
        match self {
            MetricKey::Amplitude => "amplitude",
            MetricKey::BasePoints(_) => "base_pts",
            MetricKey::Base(_) => "base",
            MetricKey::Asymmetry(_) => "asymmetry",
            MetricKey::Tracts { .. } => "tracts",
            MetricKey::Prominence(_) => "prominence",
            MetricKey::SlopePoints => "slope_pts",
            MetricKey::CrossPoints(_) => "cross_pts",
            MetricKey::Width(_) => "width",
            MetricKey::PlateauWidth => "plateau_width",
            MetricKey::PlateauPoints => "plateau_pts",
            MetricKey::PeakAuc => "peak_auc",
            MetricKey::TotalAuc => "total_auc",
            MetricKey::Derivative => "derivative",
            MetricKey::Integral => "integral",
        }
    }

    /// The metrics that must be in the cache before this one can be computed
    pub fn dependencies(&self) -> Vec<MetricKey> {
        match self {
            MetricKey::Base(params) => vec![MetricKey::BasePoints(*params)],
            MetricKey::Asymmetry(_) => vec![MetricKey::Amplitude],
            MetricKey::Prominence(params) => {
                let mut deps = vec![
                    MetricKey::Amplitude,
                    MetricKey::BasePoints(params.base),
                    MetricKey::Base(params.base),
                ];
                if params.adjust_tracts {
                    deps.push(MetricKey::Tracts {
                        max_gap: params.max_gap,
                    });
                }
                deps
            }
            MetricKey::CrossPoints(key) => {
                let mut deps = vec![MetricKey::Amplitude];
                if let HeightKey::Relative(_) = key.height {
                    deps.push(MetricKey::Prominence(key.prominence));
                }
                match key.estimate {
                    Estimate::Linear => deps.push(MetricKey::SlopePoints),
                    Estimate::Base => deps.push(MetricKey::BasePoints(key.prominence.base)),
                }
                deps
            }
            MetricKey::Width(key) => vec![MetricKey::CrossPoints(*key)],
            _ => Vec::new(),
        }
    }

    /// Whether the metric describes whole traces and so does not depend on
    /// the selected [`PeakSet`]
    pub const fn is_per_trace(&self) -> bool {
        matches!(
            self,
            MetricKey::TotalAuc | MetricKey::Derivative | MetricKey::Integral
        )
    }
}

impl Display for MetricKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetricKey::Asymmetry(method) => write!(f, "{}_{method}", self.name()),
            MetricKey::Tracts { max_gap } => write!(f, "{}_{max_gap}", self.name()),
            MetricKey::CrossPoints(key) | MetricKey::Width(key) => {
                write!(f, "{}_{}", self.name(), key.height)
            }
            _ => f.write_str(self.name()),
        }
    }
}

/// A cached metric: one inner `Vec` per trace, one entry per peak unless the
/// metric describes whole traces.
#[derive(Debug, Clone, PartialEq)]
pub enum MetricValue {
    Points(Vec<Vec<Point>>),
    PointPairs(Vec<Vec<PointPair>>),
    OptionalPointPairs(Vec<Vec<Option<PointPair>>>),
    Bases(Vec<Vec<Base>>),
    Scalars(Vec<Vec<f64>>),
    OptionalScalars(Vec<Vec<Option<f64>>>),
    Tracts(Vec<Vec<Vec<usize>>>),
    Prominences(Vec<Vec<Prominence>>),
    Slopes(Vec<Vec<SlopePoints>>),
    /// One value per trace
    Totals(Vec<f64>),
}

impl MetricValue {
    pub const fn kind(&self) -> &'static str {
        match self {
            MetricValue::Points(_) => "points",
            MetricValue::PointPairs(_) => "point pairs",
            MetricValue::OptionalPointPairs(_) => "optional point pairs",
            MetricValue::Bases(_) => "bases",
            MetricValue::Scalars(_) => "scalars",
            MetricValue::OptionalScalars(_) => "optional scalars",
            MetricValue::Tracts(_) => "tracts",
            MetricValue::Prominences(_) => "prominences",
            MetricValue::Slopes(_) => "slopes",
            MetricValue::Totals(_) => "totals",
        }
    }

    pub fn as_points(&self) -> Option<&[Vec<Point>]> {
        match self {
            MetricValue::Points(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_point_pairs(&self) -> Option<&[Vec<PointPair>]> {
        match self {
            MetricValue::PointPairs(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_optional_point_pairs(&self) -> Option<&[Vec<Option<CrossPoints>>]> {
        match self {
            MetricValue::OptionalPointPairs(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_bases(&self) -> Option<&[Vec<Base>]> {
        match self {
            MetricValue::Bases(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_scalars(&self) -> Option<&[Vec<f64>]> {
        match self {
            MetricValue::Scalars(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_optional_scalars(&self) -> Option<&[Vec<Option<f64>>]> {
        match self {
            MetricValue::OptionalScalars(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_tracts(&self) -> Option<&[Vec<Vec<usize>>]> {
        match self {
            MetricValue::Tracts(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_prominences(&self) -> Option<&[Vec<Prominence>]> {
        match self {
            MetricValue::Prominences(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_slopes(&self) -> Option<&[Vec<SlopePoints>]> {
        match self {
            MetricValue::Slopes(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_totals(&self) -> Option<&[f64]> {
        match self {
            MetricValue::Totals(v) => Some(v),
            _ => None,
        }
    }
}
