//! Audio-feature normalization and aggregation
//!
//! Raw audio features arrive in their native units (loudness in dB, tempo in
//! BPM, everything else as a 0..1 score). To plot them on one axis each value
//! is min-max rescaled against a fixed per-feature bound table:
//!
//! ```text
//! value = (raw - low) / (high - low)
//! ```
//!
//! Values are NOT clamped: a 240 BPM track normalizes to 1.2 against the
//! default [0, 200] tempo bounds.
//!
//! # Example
//! ```rust
//! use whoami_common::features::{FeatureNormalizer, RawFeatureRecord};
//!
//! let record: RawFeatureRecord = [
//!     ("danceability", 0.5), ("energy", 1.0), ("loudness", -15.0),
//!     ("speechiness", 0.0), ("acousticness", 0.0), ("instrumentalness", 0.0),
//!     ("liveness", 0.0), ("valence", 0.0), ("tempo", 100.0),
//! ].into_iter().collect();
//!
//! let normalizer = FeatureNormalizer::default();
//! let table = normalizer.normalize(&[record], &[0.8]).unwrap();
//! assert_eq!(table.len(), 10);
//!
//! let averages = FeatureNormalizer::average(&table);
//! assert_eq!(averages.get("loudness"), Some(0.5));
//! ```

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

/// Feature name of the per-record popularity row
pub const POPULARITY: &str = "popularity";

/// Default bound table, in emission order
const SPOTIFY_FEATURES: [(&str, f64, f64); 9] = [
    ("danceability", 0.0, 1.0),
    ("energy", 0.0, 1.0),
    ("loudness", -30.0, 0.0),
    ("speechiness", 0.0, 1.0),
    ("acousticness", 0.0, 1.0),
    ("instrumentalness", 0.0, 1.0),
    ("liveness", 0.0, 1.0),
    ("valence", 0.0, 1.0),
    ("tempo", 0.0, 200.0),
];

/// Inclusive (low, high) scaling bounds for one feature
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeatureBounds {
    pub low: f64,
    pub high: f64,
}

impl FeatureBounds {
    /// Create bounds, rejecting empty or non-finite intervals
    pub fn new(low: f64, high: f64) -> Result<Self> {
        if !low.is_finite() || !high.is_finite() {
            return Err(Error::InvalidInput(format!(
                "Feature bounds must be finite (got [{}, {}])",
                low, high
            )));
        }
        if high <= low {
            return Err(Error::InvalidInput(format!(
                "Feature bounds must satisfy low < high (got [{}, {}])",
                low, high
            )));
        }
        Ok(Self { low, high })
    }

    /// Linear rescale of `raw` into bound units (unclamped)
    pub fn rescale(&self, raw: f64) -> f64 {
        (raw - self.low) / (self.high - self.low)
    }
}

/// One `[[features]]` entry from the TOML config file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureSpec {
    pub name: String,
    pub low: f64,
    pub high: f64,
}

/// Ordered table of feature name → scaling bounds
///
/// Order matters: `normalize` emits feature rows in this order.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureRange {
    entries: Vec<(String, FeatureBounds)>,
}

impl FeatureRange {
    /// Build a range table from explicit specs
    ///
    /// Names must be non-empty, unique, and must not collide with the
    /// reserved `popularity` row.
    pub fn new<I>(specs: I) -> Result<Self>
    where
        I: IntoIterator<Item = FeatureSpec>,
    {
        let mut entries: Vec<(String, FeatureBounds)> = Vec::new();

        for spec in specs {
            let name = spec.name.trim();
            if name.is_empty() {
                return Err(Error::InvalidInput("Feature name must not be empty".to_string()));
            }
            if name == POPULARITY {
                return Err(Error::InvalidInput(format!(
                    "'{}' is reserved for the popularity row",
                    POPULARITY
                )));
            }
            if entries.iter().any(|(existing, _)| existing == name) {
                return Err(Error::InvalidInput(format!("Duplicate feature '{}'", name)));
            }

            let bounds = FeatureBounds::new(spec.low, spec.high)
                .map_err(|e| Error::InvalidInput(format!("Feature '{}': {}", name, e)))?;
            entries.push((name.to_string(), bounds));
        }

        Ok(Self { entries })
    }

    /// The nine Spotify audio features with their fixed bounds
    pub fn spotify() -> Self {
        Self {
            entries: SPOTIFY_FEATURES
                .iter()
                .map(|&(name, low, high)| (name.to_string(), FeatureBounds { low, high }))
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Bounds for a feature, if it is part of the table
    pub fn get(&self, name: &str) -> Option<FeatureBounds> {
        self.entries
            .iter()
            .find(|(entry, _)| entry == name)
            .map(|(_, bounds)| *bounds)
    }

    /// Iterate (name, bounds) in table order
    pub fn iter(&self) -> impl Iterator<Item = (&str, FeatureBounds)> + '_ {
        self.entries.iter().map(|(name, bounds)| (name.as_str(), *bounds))
    }

    /// Feature names in table order
    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(|(name, _)| name.as_str()).collect()
    }
}

impl Default for FeatureRange {
    fn default() -> Self {
        Self::spotify()
    }
}

/// Raw audio features for one track, keyed by feature name
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawFeatureRecord {
    values: HashMap<String, f64>,
}

impl RawFeatureRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: f64) {
        self.values.insert(name.into(), value);
    }

    /// Builder-style insert
    pub fn with(mut self, name: impl Into<String>, value: f64) -> Self {
        self.insert(name, value);
        self
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.values.get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl<S: Into<String>> FromIterator<(S, f64)> for RawFeatureRecord {
    fn from_iter<T: IntoIterator<Item = (S, f64)>>(iter: T) -> Self {
        Self {
            values: iter.into_iter().map(|(name, value)| (name.into(), value)).collect(),
        }
    }
}

/// One (feature, value) pair of a [`FeatureTable`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedRow {
    pub feature: String,
    pub value: f64,
}

impl NormalizedRow {
    pub fn new(feature: impl Into<String>, value: f64) -> Self {
        Self {
            feature: feature.into(),
            value,
        }
    }
}

/// Flat, insertion-ordered table of normalized rows
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FeatureTable {
    rows: Vec<NormalizedRow>,
}

impl FeatureTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            rows: Vec::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, row: NormalizedRow) {
        self.rows.push(row);
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn rows(&self) -> &[NormalizedRow] {
        &self.rows
    }

    pub fn iter(&self) -> std::slice::Iter<'_, NormalizedRow> {
        self.rows.iter()
    }

    /// All values recorded for `feature`, in insertion order
    pub fn values<'a>(&'a self, feature: &'a str) -> impl Iterator<Item = f64> + 'a {
        self.rows
            .iter()
            .filter(move |row| row.feature == feature)
            .map(|row| row.value)
    }

    /// Mean of `feature`'s values; `None` when the table has no such rows
    pub fn mean(&self, feature: &str) -> Option<f64> {
        let (sum, count) = self
            .values(feature)
            .fold((0.0, 0usize), |(sum, count), v| (sum + v, count + 1));
        if count == 0 {
            None
        } else {
            Some(sum / count as f64)
        }
    }

    /// Sorted, de-duplicated feature names (chart category order)
    pub fn feature_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.rows.iter().map(|row| row.feature.clone()).collect();
        names.sort();
        names.dedup();
        names
    }
}

impl<'a> IntoIterator for &'a FeatureTable {
    type Item = &'a NormalizedRow;
    type IntoIter = std::slice::Iter<'a, NormalizedRow>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.iter()
    }
}

/// Per-feature means of a [`FeatureTable`]
///
/// Iterates in sorted feature-name order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AverageTable {
    means: BTreeMap<String, f64>,
}

impl AverageTable {
    pub fn get(&self, feature: &str) -> Option<f64> {
        self.means.get(feature).copied()
    }

    pub fn len(&self) -> usize {
        self.means.len()
    }

    pub fn is_empty(&self) -> bool {
        self.means.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> + '_ {
        self.means.iter().map(|(name, mean)| (name.as_str(), *mean))
    }

    pub fn feature_names(&self) -> Vec<String> {
        self.means.keys().cloned().collect()
    }
}

/// Min-max normalizer over a [`FeatureRange`]
#[derive(Debug, Clone, Default)]
pub struct FeatureNormalizer {
    range: FeatureRange,
}

impl FeatureNormalizer {
    pub fn new(range: FeatureRange) -> Self {
        Self { range }
    }

    pub fn range(&self) -> &FeatureRange {
        &self.range
    }

    /// Normalize parallel record/popularity sequences into a flat table
    ///
    /// For each pair, in input order, emits one `popularity` row followed by
    /// one row per feature in range-table order. Popularity is passed
    /// through as given (callers pre-scale it to 0..1).
    ///
    /// # Errors
    /// - [`Error::LengthMismatch`] if the sequences are not parallel
    /// - [`Error::MissingFeature`] if a record lacks a feature of the table
    pub fn normalize(
        &self,
        records: &[RawFeatureRecord],
        popularities: &[f64],
    ) -> Result<FeatureTable> {
        if records.len() != popularities.len() {
            return Err(Error::LengthMismatch {
                records: records.len(),
                popularities: popularities.len(),
            });
        }

        let mut table = FeatureTable::with_capacity(records.len() * (1 + self.range.len()));

        for (record, &popularity) in records.iter().zip(popularities) {
            table.push(NormalizedRow::new(POPULARITY, popularity));

            for (name, bounds) in self.range.iter() {
                let raw = record
                    .get(name)
                    .ok_or_else(|| Error::MissingFeature(name.to_string()))?;
                table.push(NormalizedRow::new(name, bounds.rescale(raw)));
            }
        }

        debug!(
            records = records.len(),
            features = self.range.len(),
            rows = table.len(),
            "Normalized audio features"
        );

        Ok(table)
    }

    /// Reduce a table to the arithmetic mean of each distinct feature
    pub fn average(table: &FeatureTable) -> AverageTable {
        let mut groups: BTreeMap<&str, (f64, usize)> = BTreeMap::new();

        for row in table {
            let entry = groups.entry(row.feature.as_str()).or_insert((0.0, 0));
            entry.0 += row.value;
            entry.1 += 1;
        }

        // Every group holds at least one row, so the division is defined
        let means = groups
            .into_iter()
            .map(|(name, (sum, count))| (name.to_string(), sum / count as f64))
            .collect();

        AverageTable { means }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    fn sample_record() -> RawFeatureRecord {
        RawFeatureRecord::new()
            .with("danceability", 0.5)
            .with("energy", 1.0)
            .with("loudness", -15.0)
            .with("speechiness", 0.0)
            .with("acousticness", 0.0)
            .with("instrumentalness", 0.0)
            .with("liveness", 0.0)
            .with("valence", 0.0)
            .with("tempo", 100.0)
    }

    fn record_at(pick: impl Fn(FeatureBounds) -> f64) -> RawFeatureRecord {
        FeatureRange::spotify()
            .iter()
            .map(|(name, bounds)| (name.to_string(), pick(bounds)))
            .collect()
    }

    #[test]
    fn test_spotify_range_order_and_bounds() {
        let range = FeatureRange::spotify();
        assert_eq!(
            range.names(),
            vec![
                "danceability",
                "energy",
                "loudness",
                "speechiness",
                "acousticness",
                "instrumentalness",
                "liveness",
                "valence",
                "tempo",
            ]
        );
        assert_eq!(range.get("loudness"), Some(FeatureBounds { low: -30.0, high: 0.0 }));
        assert_eq!(range.get("tempo"), Some(FeatureBounds { low: 0.0, high: 200.0 }));
        assert_eq!(range.get("popularity"), None);
    }

    #[test]
    fn test_bounds_endpoints_map_to_zero_and_one() {
        let normalizer = FeatureNormalizer::default();

        let low = normalizer.normalize(&[record_at(|b| b.low)], &[0.0]).unwrap();
        for row in low.iter().skip(1) {
            assert_eq!(row.value, 0.0, "{} at low bound", row.feature);
        }

        let high = normalizer.normalize(&[record_at(|b| b.high)], &[1.0]).unwrap();
        for row in high.iter().skip(1) {
            assert_eq!(row.value, 1.0, "{} at high bound", row.feature);
        }
    }

    #[test]
    fn test_normalize_reference_record() {
        let table = FeatureNormalizer::default()
            .normalize(&[sample_record()], &[0.8])
            .unwrap();

        let rows = table.rows();
        assert_eq!(rows[0], NormalizedRow::new("popularity", 0.8));
        assert_eq!(rows[1], NormalizedRow::new("danceability", 0.5));
        assert_eq!(rows[2], NormalizedRow::new("energy", 1.0));
        assert!(approx(table.mean("loudness").unwrap(), 0.5));
        assert!(approx(table.mean("tempo").unwrap(), 0.5));
        assert_eq!(table.mean("speechiness"), Some(0.0));
    }

    #[test]
    fn test_normalize_row_count_and_order() {
        let records = vec![sample_record(), sample_record().with("danceability", 0.9)];
        let table = FeatureNormalizer::default()
            .normalize(&records, &[0.1, 0.2])
            .unwrap();

        assert_eq!(table.len(), records.len() * (1 + 9));

        // Each record's popularity row leads its block of ten
        assert_eq!(table.rows()[0], NormalizedRow::new("popularity", 0.1));
        assert_eq!(table.rows()[10], NormalizedRow::new("popularity", 0.2));
        assert_eq!(table.rows()[11], NormalizedRow::new("danceability", 0.9));
    }

    #[test]
    fn test_normalize_does_not_clamp() {
        let record = sample_record().with("tempo", 240.0).with("loudness", -45.0);
        let table = FeatureNormalizer::default().normalize(&[record], &[0.5]).unwrap();

        assert!(approx(table.mean("tempo").unwrap(), 1.2));
        assert!(approx(table.mean("loudness").unwrap(), -0.5));
    }

    #[test]
    fn test_normalize_empty_input_is_empty_table() {
        let table = FeatureNormalizer::default().normalize(&[], &[]).unwrap();
        assert!(table.is_empty());
    }

    #[test]
    fn test_normalize_length_mismatch() {
        let result = FeatureNormalizer::default().normalize(&[sample_record()], &[]);
        assert!(matches!(
            result,
            Err(Error::LengthMismatch { records: 1, popularities: 0 })
        ));
    }

    #[test]
    fn test_normalize_missing_feature() {
        let record: RawFeatureRecord = [("danceability", 0.3)].into_iter().collect();
        let result = FeatureNormalizer::default().normalize(&[record], &[0.5]);
        assert!(matches!(result, Err(Error::MissingFeature(name)) if name == "energy"));
    }

    #[test]
    fn test_average_means_per_feature() {
        let mut table = FeatureTable::new();
        table.push(NormalizedRow::new("danceability", 0.2));
        table.push(NormalizedRow::new("energy", 0.4));
        table.push(NormalizedRow::new("danceability", 0.8));

        let averages = FeatureNormalizer::average(&table);
        assert_eq!(averages.len(), 2);
        assert!(approx(averages.get("danceability").unwrap(), 0.5));
        assert!(approx(averages.get("energy").unwrap(), 0.4));
    }

    #[test]
    fn test_average_one_entry_per_distinct_feature() {
        let records = vec![sample_record(), sample_record(), sample_record()];
        let table = FeatureNormalizer::default()
            .normalize(&records, &[0.1, 0.5, 0.9])
            .unwrap();

        let averages = FeatureNormalizer::average(&table);
        assert_eq!(averages.feature_names(), table.feature_names());
        assert_eq!(averages.len(), 10);
        assert!(approx(averages.get("popularity").unwrap(), 0.5));
    }

    #[test]
    fn test_average_of_empty_table() {
        let averages = FeatureNormalizer::average(&FeatureTable::new());
        assert!(averages.is_empty());
    }

    #[test]
    fn test_mean_of_absent_feature_is_undefined() {
        let table = FeatureNormalizer::default()
            .normalize(&[sample_record()], &[0.8])
            .unwrap();
        assert_eq!(table.mean("key"), None);
    }

    #[test]
    fn test_feature_names_sorted() {
        let table = FeatureNormalizer::default()
            .normalize(&[sample_record()], &[0.8])
            .unwrap();
        let names = table.feature_names();

        let mut sorted = names.clone();
        sorted.sort();
        assert_eq!(names, sorted);
        assert_eq!(names.first().map(String::as_str), Some("acousticness"));
        assert_eq!(names.last().map(String::as_str), Some("valence"));
    }

    #[test]
    fn test_custom_range_validation() {
        let ok = FeatureRange::new(vec![FeatureSpec {
            name: "tempo".to_string(),
            low: 60.0,
            high: 180.0,
        }])
        .unwrap();
        assert_eq!(ok.len(), 1);

        let inverted = FeatureRange::new(vec![FeatureSpec {
            name: "tempo".to_string(),
            low: 200.0,
            high: 0.0,
        }]);
        assert!(matches!(inverted, Err(Error::InvalidInput(_))));

        let reserved = FeatureRange::new(vec![FeatureSpec {
            name: "popularity".to_string(),
            low: 0.0,
            high: 1.0,
        }]);
        assert!(matches!(reserved, Err(Error::InvalidInput(_))));

        let duplicate = FeatureRange::new(vec![
            FeatureSpec { name: "energy".to_string(), low: 0.0, high: 1.0 },
            FeatureSpec { name: "energy".to_string(), low: 0.0, high: 2.0 },
        ]);
        assert!(matches!(duplicate, Err(Error::InvalidInput(_))));
    }

    #[test]
    fn test_custom_range_drives_emission() {
        let range = FeatureRange::new(vec![FeatureSpec {
            name: "tempo".to_string(),
            low: 50.0,
            high: 150.0,
        }])
        .unwrap();
        let table = FeatureNormalizer::new(range)
            .normalize(&[sample_record()], &[0.3])
            .unwrap();

        assert_eq!(
            table.rows(),
            &[NormalizedRow::new("popularity", 0.3), NormalizedRow::new("tempo", 0.5)]
        );
    }
}
