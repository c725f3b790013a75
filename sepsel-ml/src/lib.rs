//! Sepsel ML: Single-Shot Configuration Classifiers
//!
//! This crate provides the learning half of the sepsel pipeline:
//! - **Models**: a lightweight feed-forward classifier with
//!   backpropagation, built for small tabular feature vectors
//! - **Policies**: trained classifiers bundled with the exact ordered
//!   class list and normalization statistics they were trained against
//! - **Training**: label construction from a delta matrix, seeded
//!   train/validation splits, and best-checkpoint selection
//!
//! Inference is deliberately cheap: one matrix-vector product per layer,
//! a numerically stable softmax, arg-max. All randomness flows from a
//! single caller-supplied seed so training runs replay exactly.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod models;
pub mod policy;
pub mod trainer;

pub use models::{Activation, Adam, MlpClassifier, MlpConfig, ModelError, Optimizer, Tensor};
pub use policy::{Policy, PolicyArtifact};
pub use trainer::{PolicyTrainer, TrainerConfig, TrainingOutcome};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// A predicted value with its arg-max probability.
#[derive(Debug, Clone, PartialEq)]
pub struct Prediction<T> {
    /// The predicted value
    pub value: T,
    /// Probability of the predicted class (0.0 to 1.0)
    pub confidence: f64,
}

impl<T> Prediction<T> {
    /// Create a new prediction with confidence
    pub fn new(value: T, confidence: f64) -> Self {
        Self {
            value,
            confidence: confidence.clamp(0.0, 1.0),
        }
    }

    /// Map the prediction value using a function
    pub fn map<U, F>(self, f: F) -> Prediction<U>
    where
        F: FnOnce(T) -> U,
    {
        Prediction {
            value: f(self.value),
            confidence: self.confidence,
        }
    }
}
