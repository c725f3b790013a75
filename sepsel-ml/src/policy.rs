//! Policy Artifacts
//!
//! A policy is a trained classifier plus the exact ordered class list it
//! was trained against; evaluating with a reordered class list silently
//! mispredicts, so the list travels with the weights. Artifacts written
//! here always carry explicit architecture metadata; loading falls back
//! to weight-shape introspection only for artifacts that lack it.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use sepsel_core::NormStats;

use crate::Prediction;
use crate::models::{Layer, MlpClassifier, MlpConfig, ModelError, ModelResult};

/// Serialized policy (`policy.json`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyArtifact {
    /// Ordered class list; index i labels output unit i
    pub classes: Vec<String>,
    /// Network layers, in forward order
    pub layers: Vec<Layer>,
    /// Feature vector width
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_dim: Option<usize>,
    /// Hidden layer width
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hidden: Option<usize>,
    /// Number of hidden layers
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub depth: Option<usize>,
    /// Training-time standardization statistics
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stats: Option<NormStats>,
}

impl PolicyArtifact {
    /// Load from a JSON file.
    pub fn load(path: &Path) -> ModelResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ModelError::Io(format!("{}: {e}", path.display())))?;
        serde_json::from_str(&content)
            .map_err(|e| ModelError::Serialization(format!("{}: {e}", path.display())))
    }

    /// Write to a JSON file.
    pub fn save(&self, path: &Path) -> ModelResult<()> {
        let json = serde_json::to_string(self)
            .map_err(|e| ModelError::Serialization(e.to_string()))?;
        std::fs::write(path, json).map_err(|e| ModelError::Io(format!("{}: {e}", path.display())))
    }
}

/// Infer `(input_dim, hidden, n_classes)` from bare layer shapes.
///
/// Matching rule, documented exactly because it is a heuristic: among
/// the 2-D weight matrices in layer order, the one with the smallest
/// input width is the first layer, so its shape is `hidden × input_dim`;
/// the first matrix whose input width equals that hidden width and
/// whose output width differs from it is the output layer; failing
/// that, the matrix with input width = hidden and the largest output
/// width. The rule can misread non-standard depths, which is why
/// artifacts written by this crate always carry explicit metadata.
pub fn infer_shape(layers: &[Layer]) -> ModelResult<(usize, usize, usize)> {
    let weights: Vec<&crate::models::Tensor> = layers
        .iter()
        .map(|l| &l.weights)
        .filter(|w| w.shape().len() == 2)
        .collect();
    if weights.is_empty() {
        return Err(ModelError::Incompatible(
            "no 2-D weight matrices in checkpoint".to_string(),
        ));
    }

    let first = weights
        .iter()
        .min_by_key(|w| w.shape()[1])
        .expect("non-empty");
    let (hidden, input_dim) = (first.shape()[0], first.shape()[1]);

    let last = weights
        .iter()
        .find(|w| w.shape()[1] == hidden && w.shape()[0] != hidden)
        .or_else(|| {
            weights
                .iter()
                .filter(|w| w.shape()[1] == hidden)
                .max_by_key(|w| w.shape()[0])
        })
        .ok_or_else(|| {
            ModelError::Incompatible(format!(
                "cannot infer class count: no layer consumes the hidden width {hidden}"
            ))
        })?;
    Ok((input_dim, hidden, last.shape()[0]))
}

/// A trained classifier with its class list and normalization stats.
#[derive(Debug, Clone)]
pub struct Policy {
    /// The classifier network
    pub model: MlpClassifier,
    /// Ordered class names the network was trained against
    pub classes: Vec<String>,
    /// Standardization statistics from training, when persisted
    pub stats: Option<NormStats>,
}

impl Policy {
    /// Bundle into a serializable artifact with explicit metadata.
    pub fn to_artifact(&self) -> PolicyArtifact {
        let config = self.model.config();
        PolicyArtifact {
            classes: self.classes.clone(),
            layers: self.model.layers().to_vec(),
            input_dim: Some(config.input_dim),
            hidden: Some(config.hidden),
            depth: Some(config.depth),
            stats: self.stats.clone(),
        }
    }

    /// Reconstruct from an artifact.
    ///
    /// Explicit metadata wins when present; otherwise the shape is
    /// introspected from the weights. Either way the class count must
    /// match the output width, or loading fails.
    pub fn from_artifact(artifact: PolicyArtifact) -> ModelResult<Self> {
        let (input_dim, hidden, depth) =
            match (artifact.input_dim, artifact.hidden, artifact.depth) {
                (Some(d_in), Some(hidden), Some(depth)) => (d_in, hidden, depth),
                _ => {
                    warn!("policy artifact lacks architecture metadata, introspecting weights");
                    let (d_in, hidden, _) = infer_shape(&artifact.layers)?;
                    (d_in, hidden, artifact.layers.len().saturating_sub(1))
                }
            };
        let n_out = artifact
            .layers
            .last()
            .map(|l| l.output_dim())
            .ok_or_else(|| ModelError::Incompatible("checkpoint has no layers".to_string()))?;
        if n_out != artifact.classes.len() {
            return Err(ModelError::Incompatible(format!(
                "network has {} output units but {} classes were supplied",
                n_out,
                artifact.classes.len()
            )));
        }
        if let Some(stats) = &artifact.stats
            && stats.dim() != input_dim
        {
            return Err(ModelError::Incompatible(format!(
                "normalization stats have width {}, network expects {}",
                stats.dim(),
                input_dim
            )));
        }
        let config = MlpConfig {
            input_dim,
            hidden,
            depth,
            n_classes: n_out,
            learning_rate: 0.0,
        };
        let model = MlpClassifier::from_layers(artifact.layers, config)?;
        debug!(
            input_dim,
            hidden,
            depth,
            classes = n_out,
            "reconstructed policy"
        );
        Ok(Self {
            model,
            classes: artifact.classes,
            stats: artifact.stats,
        })
    }

    /// Load a policy from a JSON artifact.
    pub fn load(path: &Path) -> ModelResult<Self> {
        Self::from_artifact(PolicyArtifact::load(path)?)
    }

    /// Save the policy as a JSON artifact.
    pub fn save(&self, path: &Path) -> ModelResult<()> {
        self.to_artifact().save(path)
    }

    /// Predict a class name with its probability. The input must already
    /// be standardized with the same statistics used at training time.
    pub fn predict(&self, features: &[f64]) -> ModelResult<Prediction<String>> {
        let pred = self.model.predict(features)?;
        Ok(Prediction::new(
            self.classes[pred.value].clone(),
            pred.confidence,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn policy(input_dim: usize, n_classes: usize) -> Policy {
        let mut rng = StdRng::seed_from_u64(11);
        let model = MlpClassifier::new(
            MlpConfig {
                input_dim,
                hidden: 6,
                depth: 2,
                n_classes,
                learning_rate: 0.01,
            },
            &mut rng,
        )
        .unwrap();
        Policy {
            model,
            classes: (0..n_classes).map(|i| format!("cfg_{i}")).collect(),
            stats: None,
        }
    }

    #[test]
    fn test_artifact_roundtrip_preserves_predictions() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("policy.json");
        let policy = policy(4, 3);
        policy.save(&path).unwrap();
        let loaded = Policy::load(&path).unwrap();
        let x = [0.3, -0.1, 0.8, 0.0];
        assert_eq!(policy.predict(&x).unwrap(), loaded.predict(&x).unwrap());
        assert_eq!(loaded.classes, policy.classes);
    }

    #[test]
    fn test_infer_shape_standard_network() {
        let p = policy(4, 3);
        let (d_in, hidden, n_classes) = infer_shape(p.model.layers()).unwrap();
        assert_eq!((d_in, hidden, n_classes), (4, 6, 3));
    }

    #[test]
    fn test_artifact_without_metadata_loads_via_introspection() {
        let p = policy(5, 2);
        let mut artifact = p.to_artifact();
        artifact.input_dim = None;
        artifact.hidden = None;
        artifact.depth = None;
        let loaded = Policy::from_artifact(artifact).unwrap();
        assert_eq!(loaded.model.input_dim(), 5);
        assert_eq!(loaded.model.n_classes(), 2);
    }

    #[test]
    fn test_class_count_mismatch_is_fatal() {
        let p = policy(4, 3);
        let mut artifact = p.to_artifact();
        artifact.classes.pop();
        let result = Policy::from_artifact(artifact);
        assert!(matches!(result, Err(ModelError::Incompatible(_))));
    }

    #[test]
    fn test_stats_width_mismatch_is_fatal() {
        let p = policy(4, 2);
        let mut artifact = p.to_artifact();
        artifact.stats = Some(NormStats {
            mean: vec![0.0; 3],
            std: vec![1.0; 3],
        });
        let result = Policy::from_artifact(artifact);
        assert!(matches!(result, Err(ModelError::Incompatible(_))));
    }

    #[test]
    fn test_predict_returns_known_class_name() {
        let p = policy(4, 3);
        let pred = p.predict(&[0.1, 0.2, 0.3, 0.4]).unwrap();
        assert!(p.classes.contains(&pred.value));
        assert!(pred.confidence > 0.0 && pred.confidence <= 1.0);
    }
}
