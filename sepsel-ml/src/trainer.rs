//! Policy Training
//!
//! Turns a delta matrix restricted to an action set into per-instance
//! labels, splits instances with a seeded shuffle, and fits the
//! classifier by cross-entropy. The artifact that survives is the
//! checkpoint with the best validation accuracy, not the last epoch.

use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use serde::Serialize;
use tracing::{debug, info, warn};

use sepsel_core::{DeltaMatrix, FeatureStore, NormStats};

use crate::models::{Adam, MlpClassifier, MlpConfig, ModelError, ModelResult};
use crate::policy::Policy;

/// Training hyperparameters.
#[derive(Debug, Clone)]
pub struct TrainerConfig {
    /// Number of epochs
    pub epochs: usize,
    /// Learning rate
    pub learning_rate: f64,
    /// Hidden layer width
    pub hidden: usize,
    /// Number of hidden layers
    pub depth: usize,
    /// Fraction of instances held out for validation
    pub val_frac: f64,
    /// Seed for the split shuffle and weight initialization
    pub seed: u64,
    /// Validate (and maybe checkpoint) every this many epochs
    pub eval_every: usize,
}

impl Default for TrainerConfig {
    fn default() -> Self {
        Self {
            epochs: 200,
            learning_rate: 1e-3,
            hidden: 128,
            depth: 2,
            val_frac: 0.2,
            seed: 42,
            eval_every: 10,
        }
    }
}

/// One labeled training instance.
#[derive(Debug, Clone)]
struct LabeledInstance {
    instance: String,
    features: Vec<f64>,
    class_idx: usize,
}

/// A validation-set prediction from the final checkpoint.
#[derive(Debug, Clone, Serialize)]
pub struct ValPrediction {
    /// Instance identifier
    pub instance_name: String,
    /// Label class
    pub y_true: String,
    /// Predicted class
    pub y_pred: String,
    /// Probability of the predicted class
    pub p_pred: f64,
}

/// Summary metrics for a training run.
#[derive(Debug, Clone, Serialize)]
pub struct TrainingMetrics {
    /// Training instances
    pub n_train: usize,
    /// Validation instances
    pub n_val: usize,
    /// Best validation accuracy seen
    pub val_accuracy: f64,
    /// Ordered class list
    pub classes: Vec<String>,
    /// Epochs run
    pub epochs: usize,
}

/// Everything a training run produces.
#[derive(Debug, Clone)]
pub struct TrainingOutcome {
    /// The trained policy (best-validation checkpoint)
    pub policy: Policy,
    /// Validation predictions under that checkpoint
    pub val_predictions: Vec<ValPrediction>,
    /// Summary metrics
    pub metrics: TrainingMetrics,
}

/// Per-instance label construction: argmax of delta over the action
/// set, ties to the earliest action. Instances with no observed delta
/// under any action are skipped.
pub fn build_labels(
    matrix: &DeltaMatrix,
    actions: &[String],
) -> ModelResult<Vec<(String, usize, f64)>> {
    if actions.is_empty() {
        return Err(ModelError::Data("action set is empty".to_string()));
    }
    let mut columns = Vec::with_capacity(actions.len());
    for action in actions {
        let col = matrix.column_index(action).ok_or_else(|| {
            ModelError::Incompatible(format!(
                "action '{action}' has no column in the delta matrix"
            ))
        })?;
        columns.push(col);
    }

    let mut labels = Vec::new();
    for (row, instance) in matrix.instances().iter().enumerate() {
        let mut best: Option<(usize, f64)> = None;
        for (class_idx, &col) in columns.iter().enumerate() {
            let Some(delta) = matrix.get(row, col) else {
                continue;
            };
            // Strict comparison keeps the first action on ties.
            if best.is_none_or(|(_, d)| delta > d) {
                best = Some((class_idx, delta));
            }
        }
        if let Some((class_idx, delta)) = best {
            labels.push((instance.clone(), class_idx, delta));
        }
    }
    if labels.is_empty() {
        return Err(ModelError::Data(
            "no instance has a measured delta under any action".to_string(),
        ));
    }
    Ok(labels)
}

/// Trains configuration policies.
pub struct PolicyTrainer {
    config: TrainerConfig,
}

impl PolicyTrainer {
    /// Create a trainer.
    pub fn new(config: TrainerConfig) -> Self {
        Self { config }
    }

    /// Train a policy for `actions` from the matrix and feature store.
    pub fn train(
        &self,
        matrix: &DeltaMatrix,
        actions: &[String],
        store: &FeatureStore,
    ) -> ModelResult<TrainingOutcome> {
        let labels = build_labels(matrix, actions)?;

        // Join to the feature store; missing vectors are per-row gaps.
        let mut instances: Vec<LabeledInstance> = Vec::with_capacity(labels.len());
        let mut unmatched = 0usize;
        for (instance, class_idx, _) in labels {
            match store.get(&instance) {
                Some(features) => instances.push(LabeledInstance {
                    instance,
                    features: features.to_vec(),
                    class_idx,
                }),
                None => unmatched += 1,
            }
        }
        if unmatched > 0 {
            warn!(unmatched, "labeled instances without a feature vector were dropped");
        }
        if instances.is_empty() {
            return Err(ModelError::Data(
                "no labeled instance matched the feature store".to_string(),
            ));
        }

        // Deterministic split: sort, seeded shuffle, first chunk validates.
        let mut rng = StdRng::seed_from_u64(self.config.seed);
        instances.sort_by(|a, b| a.instance.cmp(&b.instance));
        instances.shuffle(&mut rng);
        let n_val = ((instances.len() as f64 * self.config.val_frac) as usize).max(1);
        if n_val >= instances.len() {
            return Err(ModelError::Data(format!(
                "validation split would consume all {} instances",
                instances.len()
            )));
        }
        let (val_set, train_set) = instances.split_at(n_val);
        debug!(n_train = train_set.len(), n_val = val_set.len(), "split instances");

        // Standardize with training-split statistics.
        let stats = NormStats::from_rows(
            train_set.iter().map(|i| i.features.as_slice()),
            store.dim(),
        );
        let train: Vec<(Vec<f64>, usize)> = train_set
            .iter()
            .map(|i| (stats.apply(&i.features), i.class_idx))
            .collect();
        let val: Vec<(Vec<f64>, usize)> = val_set
            .iter()
            .map(|i| (stats.apply(&i.features), i.class_idx))
            .collect();

        let mut model = MlpClassifier::new(
            MlpConfig {
                input_dim: store.dim(),
                hidden: self.config.hidden,
                depth: self.config.depth,
                n_classes: actions.len(),
                learning_rate: self.config.learning_rate,
            },
            &mut rng,
        )?;
        let mut optimizer = Adam::new(self.config.learning_rate);

        let mut best_accuracy = -1.0f64;
        let mut best_model = model.clone();
        let eval_every = self.config.eval_every.max(1);

        for epoch in 1..=self.config.epochs {
            let mut epoch_loss = 0.0;
            for (features, class_idx) in &train {
                epoch_loss += model.train_step(features, *class_idx, &mut optimizer)?;
            }
            let epoch_loss = epoch_loss / train.len() as f64;

            if epoch == 1 || epoch % eval_every == 0 {
                let accuracy = accuracy(&model, &val)?;
                debug!(epoch, train_loss = epoch_loss, val_accuracy = accuracy, "checkpoint eval");
                if accuracy > best_accuracy {
                    best_accuracy = accuracy;
                    best_model = model.clone();
                }
            }
        }

        let model = best_model;
        let mut val_predictions = Vec::with_capacity(val.len());
        for (item, (features, _)) in val_set.iter().zip(&val) {
            let pred = model.predict(features)?;
            val_predictions.push(ValPrediction {
                instance_name: item.instance.clone(),
                y_true: actions[item.class_idx].clone(),
                y_pred: actions[pred.value].clone(),
                p_pred: pred.confidence,
            });
        }

        info!(
            n_train = train.len(),
            n_val = val.len(),
            val_accuracy = best_accuracy,
            "training finished"
        );
        let metrics = TrainingMetrics {
            n_train: train.len(),
            n_val: val.len(),
            val_accuracy: best_accuracy,
            classes: actions.to_vec(),
            epochs: self.config.epochs,
        };
        Ok(TrainingOutcome {
            policy: Policy {
                model,
                classes: actions.to_vec(),
                stats: Some(stats),
            },
            val_predictions,
            metrics,
        })
    }
}

fn accuracy(model: &MlpClassifier, examples: &[(Vec<f64>, usize)]) -> ModelResult<f64> {
    if examples.is_empty() {
        return Ok(0.0);
    }
    let mut correct = 0usize;
    for (features, class_idx) in examples {
        if model.predict(features)?.value == *class_idx {
            correct += 1;
        }
    }
    Ok(correct as f64 / examples.len() as f64)
}
