//! An ordered collection of named [`PeakSite`]s.
//!
//! [`Peaks`] keeps sites in the order they were first added. Adding a site
//! under a name already present replaces that site in place. Accessors
//! broadcast over every site and return one entry per site in that order.
use std::collections::HashMap;

use log::debug;

use crate::classifier::{PeakClassifier, ProbabilityMap};
use crate::labels::Label;
use crate::metrics::{
    AsymmetryMethod, BaseParams, CrossParams, MetricKey, MetricValue, PeakSet, ProminenceParams,
};
use crate::normalize::NormalizationMethod;
use crate::peak::{Base, CrossPoints, Point, PointPair, Prominence, SlopePoints};
use crate::segmentation::SegmentationConfig;
use crate::site::{PeakSite, PeakSiteError};

#[derive(Debug, Clone, Default)]
pub struct Peaks {
    names: Vec<String>,
    index: HashMap<String, usize>,
    sites: Vec<PeakSite>,
}

impl Peaks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.sites.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sites.is_empty()
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn get(&self, name: &str) -> Option<&PeakSite> {
        self.index.get(name).map(|i| &self.sites[*i])
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut PeakSite> {
        self.index.get(name).map(|i| &mut self.sites[*i])
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &PeakSite)> {
        self.names.iter().map(|n| n.as_str()).zip(self.sites.iter())
    }

    /// Store `site` under `name`, replacing an existing site of that name
    /// without changing its position.
    pub fn insert(&mut self, name: impl Into<String>, site: PeakSite) {
        let name = name.into();
        match self.index.get(&name) {
            Some(i) => {
                debug!("Replacing site {name}");
                self.sites[*i] = site;
            }
            None => {
                self.index.insert(name.clone(), self.sites.len());
                self.names.push(name);
                self.sites.push(site);
            }
        }
    }

    /// Segment `traces` with the supplied class probabilities and store the
    /// resulting site.
    pub fn add_site(
        &mut self,
        name: impl Into<String>,
        traces: Vec<Vec<f64>>,
        predictions: ProbabilityMap,
        config: &SegmentationConfig,
    ) -> Result<(), PeakSiteError> {
        let site = PeakSite::segment(traces, predictions, config)?;
        self.insert(name, site);
        Ok(())
    }

    /// Ask `classifier` for class probabilities, then proceed as
    /// [`Peaks::add_site`].
    pub fn add_site_with_classifier(
        &mut self,
        name: impl Into<String>,
        traces: Vec<Vec<f64>>,
        classifier: &dyn PeakClassifier,
        config: &SegmentationConfig,
    ) -> Result<(), PeakSiteError> {
        let predictions = classifier.predict(&traces)?;
        self.add_site(name, traces, predictions, config)
    }

    /// Store a site built from label arrays computed elsewhere
    pub fn add_site_with_labels(
        &mut self,
        name: impl Into<String>,
        traces: Vec<Vec<f64>>,
        peak_labels: Vec<Vec<Label>>,
        seed_labels: Vec<Vec<Label>>,
    ) -> Result<(), PeakSiteError> {
        let site = PeakSite::new(traces, peak_labels, seed_labels, None)?;
        self.insert(name, site);
        Ok(())
    }

    /// Rebuild every site from its raw traces, labels and predictions,
    /// discarding cached metrics and normalization.
    pub fn reload_sites(&mut self) -> Result<(), PeakSiteError> {
        let sites = self
            .sites
            .iter()
            .map(|s| s.reload())
            .collect::<Result<Vec<_>, _>>()?;
        self.sites = sites;
        Ok(())
    }

    pub fn interp_nans(&mut self) {
        self.sites.iter_mut().for_each(|s| s.interp_nans());
    }

    /// Normalize the working traces of every site. An unknown `method` fails
    /// before any site is modified.
    pub fn normalize_traces(&mut self, method: &str) -> Result<(), PeakSiteError> {
        let method: NormalizationMethod = method.parse()?;
        self.sites.iter_mut().for_each(|s| s.normalize_with(method));
        Ok(())
    }

    /// Drop a cached metric from every site, returning how many entries were
    /// removed in total
    pub fn clear_metric(&mut self, name: &str) -> usize {
        self.sites.iter_mut().map(|s| s.clear_metric(name)).sum()
    }

    pub fn clear_metrics(&mut self) {
        self.sites.iter_mut().for_each(|s| s.clear_metrics());
    }

    pub fn traces(&self) -> Vec<&[Vec<f64>]> {
        self.sites.iter().map(|s| s.traces()).collect()
    }

    pub fn raw_traces(&self) -> Vec<&[Vec<f64>]> {
        self.sites.iter().map(|s| s.raw_traces()).collect()
    }

    pub fn predictions(&self) -> Vec<Option<&ProbabilityMap>> {
        self.sites.iter().map(|s| s.predictions()).collect()
    }

    pub fn peak_counts(&self, set: PeakSet) -> Vec<Vec<usize>> {
        self.sites.iter().map(|s| s.peak_counts(set)).collect()
    }

    /// Resolve `key` on every site
    pub fn resolve(&mut self, set: PeakSet, key: MetricKey) -> Result<Vec<&MetricValue>, PeakSiteError> {
        self.sites
            .iter_mut()
            .map(|s| s.resolve(set, key))
            .collect()
    }

    fn broadcast<T: Clone>(
        &mut self,
        mut f: impl FnMut(&mut PeakSite) -> Result<&[T], PeakSiteError>,
    ) -> Result<Vec<Vec<T>>, PeakSiteError> {
        self.sites.iter_mut().map(|s| f(s).map(|v| v.to_vec())).collect()
    }

    pub fn amplitude(&mut self, set: PeakSet) -> Result<Vec<Vec<Vec<Point>>>, PeakSiteError> {
        self.broadcast(|s| s.amplitude(set))
    }

    pub fn base(
        &mut self,
        set: PeakSet,
        params: BaseParams,
    ) -> Result<Vec<Vec<Vec<Base>>>, PeakSiteError> {
        self.broadcast(|s| s.base(set, params))
    }

    pub fn base_pts(
        &mut self,
        set: PeakSet,
        params: BaseParams,
    ) -> Result<Vec<Vec<Vec<PointPair>>>, PeakSiteError> {
        self.broadcast(|s| s.base_pts(set, params))
    }

    pub fn asymmetry(
        &mut self,
        set: PeakSet,
        method: AsymmetryMethod,
    ) -> Result<Vec<Vec<Vec<f64>>>, PeakSiteError> {
        self.broadcast(|s| s.asymmetry(set, method))
    }

    pub fn prominence(
        &mut self,
        set: PeakSet,
        params: ProminenceParams,
    ) -> Result<Vec<Vec<Vec<Prominence>>>, PeakSiteError> {
        self.broadcast(|s| s.prominence(set, params))
    }

    pub fn tracts(
        &mut self,
        set: PeakSet,
        max_gap: usize,
    ) -> Result<Vec<Vec<Vec<Vec<usize>>>>, PeakSiteError> {
        self.broadcast(|s| s.tracts(set, max_gap))
    }

    pub fn slope_pts(&mut self, set: PeakSet) -> Result<Vec<Vec<Vec<SlopePoints>>>, PeakSiteError> {
        self.broadcast(|s| s.slope_pts(set))
    }

    pub fn cross_pts(
        &mut self,
        set: PeakSet,
        params: CrossParams,
    ) -> Result<Vec<Vec<Vec<Option<CrossPoints>>>>, PeakSiteError> {
        self.broadcast(|s| s.cross_pts(set, params))
    }

    pub fn width(
        &mut self,
        set: PeakSet,
        params: CrossParams,
    ) -> Result<Vec<Vec<Vec<Option<f64>>>>, PeakSiteError> {
        self.broadcast(|s| s.width(set, params))
    }

    pub fn plateau_width(&mut self, set: PeakSet) -> Result<Vec<Vec<Vec<Option<f64>>>>, PeakSiteError> {
        self.broadcast(|s| s.plateau_width(set))
    }

    pub fn plateau_pts(
        &mut self,
        set: PeakSet,
    ) -> Result<Vec<Vec<Vec<Option<PointPair>>>>, PeakSiteError> {
        self.broadcast(|s| s.plateau_pts(set))
    }

    pub fn peak_area_under_curve(&mut self, set: PeakSet) -> Result<Vec<Vec<Vec<f64>>>, PeakSiteError> {
        self.broadcast(|s| s.peak_area_under_curve(set))
    }

    pub fn total_area_under_curve(&mut self) -> Result<Vec<Vec<f64>>, PeakSiteError> {
        self.broadcast(|s| s.total_area_under_curve())
    }

    pub fn derivative(&mut self) -> Result<Vec<Vec<Vec<f64>>>, PeakSiteError> {
        self.broadcast(|s| s.derivative())
    }

    pub fn integral(&mut self) -> Result<Vec<Vec<Vec<f64>>>, PeakSiteError> {
        self.broadcast(|s| s.integral())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::classifier::ClassifierError;
    use crate::test_data::{duplicated_site, probabilities_from_plateaus, triangle, two_peaks};

    fn plateau_classifier(traces: &[Vec<f64>]) -> Result<ProbabilityMap, ClassifierError> {
        Ok(probabilities_from_plateaus(traces, 5.0))
    }

    fn collection() -> Peaks {
        let mut peaks = Peaks::new();
        let config = SegmentationConfig::default();
        peaks
            .add_site_with_classifier("a", vec![triangle(21, 10.0)], &plateau_classifier, &config)
            .unwrap();
        peaks
            .add_site_with_classifier("b", duplicated_site(), &plateau_classifier, &config)
            .unwrap();
        peaks
    }

    #[test_log::test]
    fn test_broadcast_in_insertion_order() {
        let mut peaks = collection();
        assert_eq!(peaks.names(), &["a".to_string(), "b".to_string()]);
        let amplitude = peaks.amplitude(PeakSet::All).unwrap();
        assert_eq!(amplitude.len(), 2);
        assert_eq!(amplitude[0][0][0], Point::new(10.0, 10.0));
        assert_eq!(amplitude[1].len(), 3);
        assert_eq!(peaks.peak_counts(PeakSet::Deduplicated)[1][0], 0);
        assert_eq!(peaks.total_area_under_curve().unwrap()[0].len(), 1);
    }

    #[test]
    fn test_overwrite_keeps_position() {
        let mut peaks = collection();
        let config = SegmentationConfig::default();
        let traces = vec![two_peaks()];
        peaks
            .add_site("a", traces.clone(), probabilities_from_plateaus(&traces, 5.0), &config)
            .unwrap();
        assert_eq!(peaks.len(), 2);
        assert_eq!(peaks.names()[0], "a");
        assert_eq!(peaks.get("a").unwrap().traces(), traces.as_slice());
        assert!(peaks.get("c").is_none());
    }

    #[test]
    fn test_classifier_failure_propagates() {
        let failing = |_: &[Vec<f64>]| -> Result<ProbabilityMap, ClassifierError> {
            Err(ClassifierError::PredictionFailed("no weights".to_string()))
        };
        let mut peaks = Peaks::new();
        let result = peaks.add_site_with_classifier(
            "a",
            vec![triangle(11, 1.0)],
            &failing,
            &SegmentationConfig::default(),
        );
        assert!(matches!(result, Err(PeakSiteError::Classifier(_))));
        assert!(peaks.is_empty());
    }

    #[test]
    fn test_reload_round_trip() {
        let mut peaks = collection();
        let before = peaks.width(PeakSet::All, CrossParams::default()).unwrap();
        let prominence = peaks
            .prominence(PeakSet::Deduplicated, ProminenceParams::default())
            .unwrap();
        peaks.reload_sites().unwrap();
        assert!(peaks.iter().all(|(_, s)| s.cached_metrics() == 0));
        let after = peaks.width(PeakSet::All, CrossParams::default()).unwrap();
        let to_bits = |w: &Vec<Vec<Vec<Option<f64>>>>| -> Vec<Option<u64>> {
            w.iter()
                .flatten()
                .flatten()
                .map(|v| v.map(f64::to_bits))
                .collect()
        };
        assert_eq!(to_bits(&before), to_bits(&after));
        assert_eq!(
            prominence,
            peaks
                .prominence(PeakSet::Deduplicated, ProminenceParams::default())
                .unwrap()
        );
    }

    #[test]
    fn test_unknown_normalization_changes_nothing() {
        let mut peaks = collection();
        peaks.amplitude(PeakSet::All).unwrap();
        let err = peaks.normalize_traces("minmax").unwrap_err();
        assert_eq!(err.to_string(), "Unknown normalization method minmax");
        for (_, site) in peaks.iter() {
            assert_eq!(site.traces(), site.raw_traces());
            assert_eq!(site.cached_metrics(), 1);
        }
    }

    #[test]
    fn test_normalize_then_reload() {
        let mut peaks = Peaks::new();
        let shifted: Vec<f64> = triangle(21, 10.0).into_iter().map(|y| y + 2.0).collect();
        peaks
            .add_site_with_labels(
                "a",
                vec![shifted.clone()],
                vec![vec![1; 21]],
                vec![vec![0; 21]],
            )
            .unwrap();
        peaks.normalize_traces("base").unwrap();
        assert_ne!(peaks.traces()[0][0], shifted);
        peaks.reload_sites().unwrap();
        assert_eq!(peaks.traces()[0][0], shifted);
    }

    #[test]
    fn test_clear_metric_broadcasts() {
        let mut peaks = collection();
        peaks.integral().unwrap();
        peaks.derivative().unwrap();
        assert_eq!(peaks.clear_metric("integral"), 2);
        assert_eq!(peaks.clear_metric("integral"), 0);
        peaks.clear_metrics();
        assert!(peaks.iter().all(|(_, s)| s.cached_metrics() == 0));
        let values = peaks.resolve(PeakSet::All, MetricKey::PeakAuc).unwrap();
        assert_eq!(values.len(), 2);
    }
}
