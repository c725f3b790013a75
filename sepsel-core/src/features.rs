//! Feature Store
//!
//! Fixed-width instance feature vectors, index-aligned with their
//! feature names and instance identifiers. Lookup keys are normalized
//! so identifiers from different producers join.

use std::path::Path;

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};
use crate::trace::normalize_instance_name;

/// Standard deviations are floored here before dividing.
pub const STD_FLOOR: f64 = 1e-8;

/// Mean/standard-deviation vectors used to standardize feature vectors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormStats {
    /// Per-feature mean
    pub mean: Vec<f64>,
    /// Per-feature standard deviation, floored away from zero
    pub std: Vec<f64>,
}

impl NormStats {
    /// Compute population statistics over a set of feature rows.
    pub fn from_rows<'a, I>(rows: I, dim: usize) -> Self
    where
        I: IntoIterator<Item = &'a [f64]> + Clone,
    {
        let mut mean = vec![0.0; dim];
        let mut count = 0usize;
        for row in rows.clone() {
            for (m, &x) in mean.iter_mut().zip(row) {
                *m += x;
            }
            count += 1;
        }
        if count > 0 {
            for m in &mut mean {
                *m /= count as f64;
            }
        }
        let mut var = vec![0.0; dim];
        for row in rows {
            for ((v, &m), &x) in var.iter_mut().zip(&mean).zip(row) {
                *v += (x - m) * (x - m);
            }
        }
        let std = var
            .into_iter()
            .map(|v| {
                if count > 0 {
                    (v / count as f64).sqrt() + STD_FLOOR
                } else {
                    1.0
                }
            })
            .collect();
        Self { mean, std }
    }

    /// Standardize one feature vector.
    pub fn apply(&self, features: &[f64]) -> Vec<f64> {
        features
            .iter()
            .zip(&self.mean)
            .zip(&self.std)
            .map(|((&x, &m), &s)| (x - m) / s)
            .collect()
    }

    /// Width of the vectors these statistics were computed over.
    pub fn dim(&self) -> usize {
        self.mean.len()
    }
}

/// Index-aligned feature matrix artifact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureStore {
    features: Vec<Vec<f64>>,
    feature_names: Vec<String>,
    instance_names: Vec<String>,
    #[serde(skip)]
    by_name: FxHashMap<String, usize>,
}

impl FeatureStore {
    /// Build a store, validating index alignment and fixed width.
    pub fn new(
        features: Vec<Vec<f64>>,
        feature_names: Vec<String>,
        instance_names: Vec<String>,
    ) -> Result<Self> {
        if features.len() != instance_names.len() {
            return Err(Error::Compatibility(format!(
                "feature store misaligned: {} rows vs {} instance names",
                features.len(),
                instance_names.len()
            )));
        }
        if features.is_empty() {
            return Err(Error::coverage("feature store load", "store has no rows"));
        }
        let dim = features[0].len();
        if dim == 0 {
            return Err(Error::coverage(
                "feature store load",
                "feature vectors have zero width",
            ));
        }
        if let Some(bad) = features.iter().position(|row| row.len() != dim) {
            return Err(Error::Compatibility(format!(
                "feature row {} has width {}, expected {}",
                bad,
                features[bad].len(),
                dim
            )));
        }
        if !feature_names.is_empty() && feature_names.len() != dim {
            return Err(Error::Compatibility(format!(
                "{} feature names for width-{} vectors",
                feature_names.len(),
                dim
            )));
        }
        let mut store = Self {
            features,
            feature_names,
            instance_names,
            by_name: FxHashMap::default(),
        };
        store.reindex();
        Ok(store)
    }

    /// Load from a JSON artifact.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
        let raw: FeatureStore = serde_json::from_str(&content).map_err(|e| Error::parse(path, e))?;
        let store = Self::new(raw.features, raw.feature_names, raw.instance_names)?;
        debug!(
            instances = store.len(),
            dim = store.dim(),
            "loaded feature store"
        );
        Ok(store)
    }

    /// Write to a JSON artifact.
    pub fn save_json(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self).expect("store serializes");
        std::fs::write(path, json).map_err(|e| Error::io(path, e))
    }

    fn reindex(&mut self) {
        self.by_name = self
            .instance_names
            .iter()
            .enumerate()
            .map(|(i, name)| (normalize_instance_name(name), i))
            .collect();
    }

    /// Feature vector for an instance; the key is normalized first.
    pub fn get(&self, instance: &str) -> Option<&[f64]> {
        self.by_name
            .get(&normalize_instance_name(instance))
            .map(|&i| self.features[i].as_slice())
    }

    /// Feature vector width.
    pub fn dim(&self) -> usize {
        self.features.first().map_or(0, |row| row.len())
    }

    /// Number of instances.
    pub fn len(&self) -> usize {
        self.features.len()
    }

    /// Whether the store is empty (never true after construction).
    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    /// Feature names, empty when the producer did not record them.
    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    /// Normalized instance keys, in row order.
    pub fn instance_keys(&self) -> Vec<String> {
        self.instance_names
            .iter()
            .map(|n| normalize_instance_name(n))
            .collect()
    }

    /// Standardization statistics over every row in the store.
    pub fn stats(&self) -> NormStats {
        NormStats::from_rows(self.features.iter().map(|r| r.as_slice()), self.dim())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> FeatureStore {
        FeatureStore::new(
            vec![vec![1.0, 10.0], vec![3.0, 30.0]],
            vec!["a".into(), "b".into()],
            vec!["inst/uc_1.lp".into(), "uc_2".into()],
        )
        .unwrap()
    }

    #[test]
    fn test_lookup_uses_normalized_keys() {
        let s = store();
        assert_eq!(s.get("uc_1"), Some([1.0, 10.0].as_slice()));
        assert_eq!(s.get("other/uc_2.mps"), Some([3.0, 30.0].as_slice()));
        assert!(s.get("uc_3").is_none());
    }

    #[test]
    fn test_misaligned_rows_rejected() {
        let result = FeatureStore::new(
            vec![vec![1.0], vec![2.0]],
            vec![],
            vec!["only_one".into()],
        );
        assert!(matches!(result, Err(Error::Compatibility(_))));
    }

    #[test]
    fn test_ragged_rows_rejected() {
        let result = FeatureStore::new(
            vec![vec![1.0, 2.0], vec![3.0]],
            vec![],
            vec!["a".into(), "b".into()],
        );
        assert!(matches!(result, Err(Error::Compatibility(_))));
    }

    #[test]
    fn test_stats_mean_and_floor() {
        let s = store();
        let stats = s.stats();
        assert_eq!(stats.mean, vec![2.0, 20.0]);
        // population std of [1, 3] is 1
        assert!((stats.std[0] - (1.0 + STD_FLOOR)).abs() < 1e-12);
    }

    #[test]
    fn test_constant_feature_does_not_divide_by_zero() {
        let s = FeatureStore::new(
            vec![vec![5.0], vec![5.0]],
            vec![],
            vec!["a".into(), "b".into()],
        )
        .unwrap();
        let stats = s.stats();
        let z = stats.apply(&[5.0]);
        assert!(z[0].is_finite());
        assert_eq!(z[0], 0.0);
    }

    #[test]
    fn test_apply_standardizes() {
        let stats = NormStats {
            mean: vec![2.0],
            std: vec![2.0],
        };
        assert_eq!(stats.apply(&[6.0]), vec![2.0]);
    }

    #[test]
    fn test_json_roundtrip_reindexes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("features.json");
        store().save_json(&path).unwrap();
        let loaded = FeatureStore::from_json_file(&path).unwrap();
        assert_eq!(loaded.get("uc_1"), Some([1.0, 10.0].as_slice()));
    }
}
