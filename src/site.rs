//! A single imaging site: its traces, their peak segmentation and a lazily
//! filled cache of per-peak metrics.
//!
//! Metrics are requested through typed accessors such as
//! [`PeakSite::amplitude`] or [`PeakSite::width`]. The first request computes
//! the metric, after first computing everything it depends on, and stores the
//! result under its [`MetricKey`]. Later requests with the same parameters
//! read the cache. Clearing a metric, or replacing the working traces, is the
//! only way to force recomputation.
//!
//! # Example
//! ```rust
//! use tracepeaks::metrics::{CrossParams, PeakSet};
//! use tracepeaks::site::PeakSite;
//!
//! let trace: Vec<f64> = (0..21).map(|i| 10.0 - (i as f64 - 10.0).abs()).collect();
//! let peaks = vec![(0..21).map(|i| if (1..20).contains(&i) { 1 } else { 0 }).collect()];
//! let seeds = vec![(0..21).map(|i| if (9..12).contains(&i) { 1 } else { 0 }).collect()];
//! let mut site = PeakSite::new(vec![trace], peaks, seeds, None).unwrap();
//!
//! let width = site.width(PeakSet::All, CrossParams::default()).unwrap();
//! assert_eq!(width[0][0], Some(9.0));
//! ```
use std::collections::HashMap;

use log::{debug, trace};
use thiserror::Error;

use crate::arrayops::{diff, interpolate_nans, nan_cumsum, trapz};
use crate::classifier::{ClassifierError, ProbabilityMap};
use crate::dedup::{resolve_duplicates, DuplicateError, PeakIndex, PeakSegment};
use crate::labels::{labels_to_masks, Label};
use crate::metrics::{
    AsymmetryMethod, BaseParams, CrossParams, Estimate, HeightKey, MetricKey, MetricParseError,
    MetricValue, PeakSet, ProminenceParams,
};
use crate::normalize::NormalizationMethod;
use crate::peak::{Base, CrossPoints, Point, PointPair, Prominence, SlopePoints};
use crate::peak_statistics::{
    area_under_curve, crosses_at_height, detect_peak_tracts, peak_amplitude, peak_asymmetry,
    peak_base, peak_base_pts, peak_prominence, peak_slope_pts, plateau_center, plateau_pts,
    tract_adjusted_prominence, width_at_pts,
};
use crate::segmentation::{
    check_alignment, frame_count, segment_traces, SegmentationConfig, SegmentationError,
};

#[derive(Debug, Clone, Error)]
pub enum PeakSiteError {
    #[error(transparent)]
    Segmentation(#[from] SegmentationError),
    #[error(transparent)]
    Duplicate(#[from] DuplicateError),
    #[error(transparent)]
    Classifier(#[from] ClassifierError),
    #[error(transparent)]
    Parameter(#[from] MetricParseError),
    #[error("Unknown normalization method {0}")]
    UnknownNormalization(String),
    #[error("{kind} labels have {found_rows} rows of {found_frames} frames, expected {rows} rows of {frames}")]
    LabelShapeMismatch {
        kind: &'static str,
        rows: usize,
        frames: usize,
        found_rows: usize,
        found_frames: usize,
    },
    #[error("Metric {metric} holds {found} rather than the expected kind of value")]
    UnexpectedValue { metric: String, found: &'static str },
    #[error("Metric {0} has not been computed")]
    MissingMetric(String),
}

fn check_labels(
    kind: &'static str,
    labels: &[Vec<Label>],
    rows: usize,
    frames: usize,
) -> Result<(), PeakSiteError> {
    let mismatch = |found_frames| PeakSiteError::LabelShapeMismatch {
        kind,
        rows,
        frames,
        found_rows: labels.len(),
        found_frames,
    };
    if labels.len() != rows {
        return Err(mismatch(labels.first().map(|l| l.len()).unwrap_or_default()));
    }
    if let Some(row) = labels.iter().find(|l| l.len() != frames) {
        return Err(mismatch(row.len()));
    }
    Ok(())
}

fn unexpected(key: MetricKey, value: &MetricValue) -> PeakSiteError {
    PeakSiteError::UnexpectedValue {
        metric: key.to_string(),
        found: value.kind(),
    }
}

#[derive(Debug, Clone)]
pub struct PeakSite {
    traces: Vec<Vec<f64>>,
    raw_traces: Vec<Vec<f64>>,
    predictions: Option<ProbabilityMap>,
    all_peaks: PeakIndex,
    dedup_peaks: PeakIndex,
    cache: HashMap<(PeakSet, MetricKey), MetricValue>,
    computations: usize,
}

impl PeakSite {
    /// Build a site from traces and precomputed peak and seed label arrays.
    ///
    /// The label arrays must have the same shape as `traces`, and so must
    /// `predictions` when given. Duplicated peaks are resolved immediately.
    pub fn new(
        traces: Vec<Vec<f64>>,
        peak_labels: Vec<Vec<Label>>,
        seed_labels: Vec<Vec<Label>>,
        predictions: Option<ProbabilityMap>,
    ) -> Result<Self, PeakSiteError> {
        let frames = frame_count(&traces)?;
        check_labels("Peak", &peak_labels, traces.len(), frames)?;
        check_labels("Seed", &seed_labels, traces.len(), frames)?;
        if let Some(predictions) = predictions.as_ref() {
            check_alignment(&traces, predictions)?;
        }

        let all_peaks = PeakIndex::from_labels(&peak_labels, &seed_labels);
        let dedup_peaks = resolve_duplicates(&traces, &all_peaks)?;
        debug!(
            "Built site with {} traces, {} peaks ({} after removing duplicates)",
            traces.len(),
            all_peaks.total_peaks(),
            dedup_peaks.total_peaks()
        );

        Ok(Self {
            raw_traces: traces.clone(),
            traces,
            predictions,
            all_peaks,
            dedup_peaks,
            cache: HashMap::new(),
            computations: 0,
        })
    }

    /// Segment `traces` using `predictions` and build a site from the result.
    pub fn segment(
        traces: Vec<Vec<f64>>,
        predictions: ProbabilityMap,
        config: &SegmentationConfig,
    ) -> Result<Self, PeakSiteError> {
        let segmentation = segment_traces(&traces, &predictions, config)?;
        Self::new(
            traces,
            segmentation.peak_labels,
            segmentation.seed_labels,
            Some(predictions),
        )
    }

    /// A fresh site from the raw traces and labels of this one, with an empty
    /// cache
    pub fn reload(&self) -> Result<Self, PeakSiteError> {
        Self::new(
            self.raw_traces.clone(),
            self.all_peaks.peak_labels.clone(),
            self.all_peaks.plateau_labels.clone(),
            self.predictions.clone(),
        )
    }

    /// The working traces metrics are computed from
    pub fn traces(&self) -> &[Vec<f64>] {
        &self.traces
    }

    /// The traces as they were given
    pub fn raw_traces(&self) -> &[Vec<f64>] {
        &self.raw_traces
    }

    pub fn predictions(&self) -> Option<&ProbabilityMap> {
        self.predictions.as_ref()
    }

    pub fn peaks(&self, set: PeakSet) -> &PeakIndex {
        match set {
            PeakSet::All => &self.all_peaks,
            PeakSet::Deduplicated => &self.dedup_peaks,
        }
    }

    pub fn peak_labels(&self, set: PeakSet) -> &[Vec<Label>] {
        &self.peaks(set).peak_labels
    }

    pub fn seed_labels(&self, set: PeakSet) -> &[Vec<Label>] {
        &self.peaks(set).plateau_labels
    }

    pub fn peak_counts(&self, set: PeakSet) -> Vec<usize> {
        self.peaks(set).peak_counts()
    }

    /// One boolean mask per peak, per trace
    pub fn peak_masks(&self, set: PeakSet) -> Vec<Vec<Vec<bool>>> {
        self.peak_labels(set)
            .iter()
            .map(|l| labels_to_masks(l))
            .collect()
    }

    /// How many metric computations this site has performed
    pub fn computations(&self) -> usize {
        self.computations
    }

    pub fn cached_metrics(&self) -> usize {
        self.cache.len()
    }

    pub fn is_cached(&self, set: PeakSet, key: MetricKey) -> bool {
        self.cache.contains_key(&(Self::cache_set(set, &key), key))
    }

    /// Drop every cached metric whose name matches `name`, either the bare
    /// metric name (`"width"`) or the parameterised one (`"width_rel_0_50"`).
    /// Returns the number of entries removed.
    pub fn clear_metric(&mut self, name: &str) -> usize {
        let before = self.cache.len();
        self.cache
            .retain(|(_, key), _| key.name() != name && key.to_string() != name);
        let removed = before - self.cache.len();
        if removed == 0 {
            debug!("Metric {name} not found");
        }
        removed
    }

    pub fn clear_metrics(&mut self) {
        self.cache.clear();
    }

    /// Fill interior gaps in the working traces by linear interpolation.
    pub fn interp_nans(&mut self) {
        self.traces = self.traces.iter().map(|t| interpolate_nans(t)).collect();
        self.clear_metrics();
    }

    /// Replace the working traces by a normalized copy of the raw traces.
    ///
    /// `method` is parsed before anything is touched, so an unknown method
    /// leaves the site as it was.
    pub fn normalize_traces(&mut self, method: &str) -> Result<(), PeakSiteError> {
        let method: NormalizationMethod = method.parse()?;
        self.normalize_with(method);
        Ok(())
    }

    pub fn normalize_with(&mut self, method: NormalizationMethod) {
        self.traces = self.raw_traces.iter().map(|t| method.apply(t)).collect();
        self.clear_metrics();
    }

    /// Per trace metrics are shared by both peak sets
    fn cache_set(set: PeakSet, key: &MetricKey) -> PeakSet {
        if key.is_per_trace() {
            PeakSet::All
        } else {
            set
        }
    }

    /// Compute `key` over `set`, along with anything it depends on, unless it
    /// is already cached, and return the cached value.
    pub fn resolve(&mut self, set: PeakSet, key: MetricKey) -> Result<&MetricValue, PeakSiteError> {
        self.ensure(set, key)?;
        self.cached(set, key)
    }

    fn ensure(&mut self, set: PeakSet, key: MetricKey) -> Result<(), PeakSiteError> {
        let set = Self::cache_set(set, &key);
        if self.cache.contains_key(&(set, key)) {
            return Ok(());
        }
        for dependency in key.dependencies() {
            self.ensure(set, dependency)?;
        }
        let value = self.compute(set, key)?;
        trace!("Computed {key} over {set} peaks");
        self.computations += 1;
        self.cache.insert((set, key), value);
        Ok(())
    }

    fn cached(&self, set: PeakSet, key: MetricKey) -> Result<&MetricValue, PeakSiteError> {
        self.cache
            .get(&(Self::cache_set(set, &key), key))
            .ok_or_else(|| PeakSiteError::MissingMetric(key.to_string()))
    }

    fn per_peak<T>(
        &self,
        set: PeakSet,
        mut f: impl FnMut(usize, usize, &PeakSegment) -> T,
    ) -> Vec<Vec<T>> {
        self.peaks(set)
            .segments
            .iter()
            .enumerate()
            .map(|(n, segments)| {
                segments
                    .iter()
                    .enumerate()
                    .map(|(i, segment)| f(n, i, segment))
                    .collect()
            })
            .collect()
    }

    fn cached_points(&self, set: PeakSet, key: MetricKey) -> Result<&[Vec<Point>], PeakSiteError> {
        let value = self.cached(set, key)?;
        value.as_points().ok_or_else(|| unexpected(key, value))
    }

    fn cached_point_pairs(
        &self,
        set: PeakSet,
        key: MetricKey,
    ) -> Result<&[Vec<PointPair>], PeakSiteError> {
        let value = self.cached(set, key)?;
        value.as_point_pairs().ok_or_else(|| unexpected(key, value))
    }

    fn cached_optional_pairs(
        &self,
        set: PeakSet,
        key: MetricKey,
    ) -> Result<&[Vec<Option<PointPair>>], PeakSiteError> {
        let value = self.cached(set, key)?;
        value.as_optional_point_pairs().ok_or_else(|| unexpected(key, value))
    }

    fn cached_tracts(
        &self,
        set: PeakSet,
        key: MetricKey,
    ) -> Result<&[Vec<Vec<usize>>], PeakSiteError> {
        let value = self.cached(set, key)?;
        value.as_tracts().ok_or_else(|| unexpected(key, value))
    }

    fn cached_prominences(
        &self,
        set: PeakSet,
        key: MetricKey,
    ) -> Result<&[Vec<Prominence>], PeakSiteError> {
        let value = self.cached(set, key)?;
        value.as_prominences().ok_or_else(|| unexpected(key, value))
    }

    fn cached_slopes(
        &self,
        set: PeakSet,
        key: MetricKey,
    ) -> Result<&[Vec<SlopePoints>], PeakSiteError> {
        let value = self.cached(set, key)?;
        value.as_slopes().ok_or_else(|| unexpected(key, value))
    }

    fn compute(&self, set: PeakSet, key: MetricKey) -> Result<MetricValue, PeakSiteError> {
        let traces = &self.traces;
        let value = match key {
            MetricKey::Amplitude => {
                MetricValue::Points(self.per_peak(set, |n, _, s| peak_amplitude(&traces[n], &s.peak)))
            }
            MetricKey::BasePoints(params) => MetricValue::PointPairs(self.per_peak(set, |n, _, s| {
                peak_base_pts(&traces[n], &s.peak, params.adjust_edge, params.dist)
            })),
            MetricKey::Base(params) => {
                let pts = self.cached_point_pairs(set, MetricKey::BasePoints(params))?;
                MetricValue::Bases(self.per_peak(set, |n, i, _| peak_base(&pts[n][i])))
            }
            MetricKey::Asymmetry(method) => {
                let amplitudes = self.cached_points(set, MetricKey::Amplitude)?;
                MetricValue::Scalars(self.per_peak(set, |n, i, s| {
                    let apex = amplitudes[n][i].x;
                    let x = match method {
                        AsymmetryMethod::Amplitude => apex,
                        AsymmetryMethod::Plateau => plateau_center(&s.plateau).unwrap_or(apex),
                    };
                    peak_asymmetry(&s.peak, x)
                }))
            }
            MetricKey::Tracts { max_gap } => MetricValue::Tracts(
                self.peak_labels(set)
                    .iter()
                    .map(|labels| detect_peak_tracts(labels, max_gap))
                    .collect(),
            ),
            MetricKey::Prominence(params) => {
                let amplitudes = self.cached_points(set, MetricKey::Amplitude)?;
                let pts = self.cached_point_pairs(set, MetricKey::BasePoints(params.base))?;
                if params.adjust_tracts {
                    let tracts = self.cached_tracts(
                        set,
                        MetricKey::Tracts {
                            max_gap: params.max_gap,
                        },
                    )?;
                    MetricValue::Prominences(
                        tracts
                            .iter()
                            .zip(amplitudes.iter().zip(pts.iter()))
                            .map(|(t, (a, p))| {
                                tract_adjusted_prominence(t, a, p, params.bi_directional)
                            })
                            .collect(),
                    )
                } else {
                    MetricValue::Prominences(
                        self.per_peak(set, |n, i, _| peak_prominence(&amplitudes[n][i], &pts[n][i])),
                    )
                }
            }
            MetricKey::SlopePoints => MetricValue::Slopes(
                self.per_peak(set, |n, _, s| peak_slope_pts(&traces[n], &s.peak, &s.plateau)),
            ),
            MetricKey::CrossPoints(cross) => {
                let amplitudes = self.cached_points(set, MetricKey::Amplitude)?;
                let prominences = match cross.height {
                    HeightKey::Relative(_) => {
                        Some(self.cached_prominences(set, MetricKey::Prominence(cross.prominence))?)
                    }
                    HeightKey::Absolute(_) => None,
                };
                let slopes = match cross.estimate {
                    Estimate::Linear => {
                        Some(self.cached_slopes(set, MetricKey::SlopePoints)?)
                    }
                    Estimate::Base => None,
                };
                let base_pts = match cross.estimate {
                    Estimate::Base => Some(
                        self.cached_point_pairs(set, MetricKey::BasePoints(cross.prominence.base))?,
                    ),
                    Estimate::Linear => None,
                };
                let height = cross.height.value();
                MetricValue::OptionalPointPairs(self.per_peak(set, |n, i, s| {
                    let target = match prominences {
                        Some(p) => p[n][i].height_at(height),
                        None => height,
                    };
                    crosses_at_height(
                        &traces[n],
                        &s.peak,
                        target,
                        cross.estimate,
                        cross.return_widest,
                        &amplitudes[n][i],
                        slopes.map(|v| &v[n][i]),
                        base_pts.map(|v| &v[n][i]),
                    )
                }))
            }
            MetricKey::Width(cross) => {
                let cross_pts = self.cached_optional_pairs(set, MetricKey::CrossPoints(cross))?;
                MetricValue::OptionalScalars(
                    self.per_peak(set, |n, i, _| width_at_pts(cross_pts[n][i].as_ref())),
                )
            }
            MetricKey::PlateauWidth => MetricValue::OptionalScalars(
                self.per_peak(set, |n, _, s| plateau_pts(&traces[n], &s.plateau).map(|p| p.span())),
            ),
            MetricKey::PlateauPoints => MetricValue::OptionalPointPairs(
                self.per_peak(set, |n, _, s| plateau_pts(&traces[n], &s.plateau)),
            ),
            MetricKey::PeakAuc => MetricValue::Scalars(
                self.per_peak(set, |n, _, s| area_under_curve(&traces[n], &s.peak)),
            ),
            MetricKey::TotalAuc => MetricValue::Totals(
                traces
                    .iter()
                    .map(|t| {
                        let xs: Vec<f64> = (0..t.len()).map(|i| i as f64).collect();
                        trapz(&xs, t)
                    })
                    .collect(),
            ),
            MetricKey::Derivative => MetricValue::Scalars(traces.iter().map(|t| diff(t)).collect()),
            MetricKey::Integral => {
                MetricValue::Scalars(traces.iter().map(|t| nan_cumsum(t)).collect())
            }
        };
        Ok(value)
    }

    /// The highest point of each peak
    pub fn amplitude(&mut self, set: PeakSet) -> Result<&[Vec<Point>], PeakSiteError> {
        let key = MetricKey::Amplitude;
        let value = self.resolve(set, key)?;
        value.as_points().ok_or_else(|| unexpected(key, value))
    }

    /// The two boundary points of each peak
    pub fn base_pts(
        &mut self,
        set: PeakSet,
        params: BaseParams,
    ) -> Result<&[Vec<PointPair>], PeakSiteError> {
        let key = MetricKey::BasePoints(params);
        let value = self.resolve(set, key)?;
        value.as_point_pairs().ok_or_else(|| unexpected(key, value))
    }

    pub fn base(&mut self, set: PeakSet, params: BaseParams) -> Result<&[Vec<Base>], PeakSiteError> {
        let key = MetricKey::Base(params);
        let value = self.resolve(set, key)?;
        value.as_bases().ok_or_else(|| unexpected(key, value))
    }

    /// Where each peak's apex or plateau centre sits along its span, `0.5`
    /// being symmetric
    pub fn asymmetry(
        &mut self,
        set: PeakSet,
        method: AsymmetryMethod,
    ) -> Result<&[Vec<f64>], PeakSiteError> {
        let key = MetricKey::Asymmetry(method);
        let value = self.resolve(set, key)?;
        value.as_scalars().ok_or_else(|| unexpected(key, value))
    }

    pub fn tracts(&mut self, set: PeakSet, max_gap: usize) -> Result<&[Vec<Vec<usize>>], PeakSiteError> {
        let key = MetricKey::Tracts { max_gap };
        let value = self.resolve(set, key)?;
        value.as_tracts().ok_or_else(|| unexpected(key, value))
    }

    pub fn prominence(
        &mut self,
        set: PeakSet,
        params: ProminenceParams,
    ) -> Result<&[Vec<Prominence>], PeakSiteError> {
        let key = MetricKey::Prominence(params);
        let value = self.resolve(set, key)?;
        value.as_prominences().ok_or_else(|| unexpected(key, value))
    }

    pub fn slope_pts(&mut self, set: PeakSet) -> Result<&[Vec<SlopePoints>], PeakSiteError> {
        let key = MetricKey::SlopePoints;
        let value = self.resolve(set, key)?;
        value.as_slopes().ok_or_else(|| unexpected(key, value))
    }

    pub fn cross_pts(
        &mut self,
        set: PeakSet,
        params: CrossParams,
    ) -> Result<&[Vec<Option<CrossPoints>>], PeakSiteError> {
        let key = MetricKey::CrossPoints(params.to_key()?);
        let value = self.resolve(set, key)?;
        value.as_optional_point_pairs().ok_or_else(|| unexpected(key, value))
    }

    /// The distance between the crossing points of each peak, `None` when the
    /// target height is out of reach
    pub fn width(
        &mut self,
        set: PeakSet,
        params: CrossParams,
    ) -> Result<&[Vec<Option<f64>>], PeakSiteError> {
        let key = MetricKey::Width(params.to_key()?);
        let value = self.resolve(set, key)?;
        value.as_optional_scalars().ok_or_else(|| unexpected(key, value))
    }

    pub fn plateau_width(&mut self, set: PeakSet) -> Result<&[Vec<Option<f64>>], PeakSiteError> {
        let key = MetricKey::PlateauWidth;
        let value = self.resolve(set, key)?;
        value.as_optional_scalars().ok_or_else(|| unexpected(key, value))
    }

    pub fn plateau_pts(
        &mut self,
        set: PeakSet,
    ) -> Result<&[Vec<Option<PointPair>>], PeakSiteError> {
        let key = MetricKey::PlateauPoints;
        let value = self.resolve(set, key)?;
        value.as_optional_point_pairs().ok_or_else(|| unexpected(key, value))
    }

    pub fn peak_area_under_curve(&mut self, set: PeakSet) -> Result<&[Vec<f64>], PeakSiteError> {
        let key = MetricKey::PeakAuc;
        let value = self.resolve(set, key)?;
        value.as_scalars().ok_or_else(|| unexpected(key, value))
    }

    pub fn total_area_under_curve(&mut self) -> Result<&[f64], PeakSiteError> {
        let key = MetricKey::TotalAuc;
        let value = self.resolve(PeakSet::All, key)?;
        value.as_totals().ok_or_else(|| unexpected(key, value))
    }

    pub fn derivative(&mut self) -> Result<&[Vec<f64>], PeakSiteError> {
        let key = MetricKey::Derivative;
        let value = self.resolve(PeakSet::All, key)?;
        value.as_scalars().ok_or_else(|| unexpected(key, value))
    }

    pub fn integral(&mut self) -> Result<&[Vec<f64>], PeakSiteError> {
        let key = MetricKey::Integral;
        let value = self.resolve(PeakSet::All, key)?;
        value.as_scalars().ok_or_else(|| unexpected(key, value))
    }
}
