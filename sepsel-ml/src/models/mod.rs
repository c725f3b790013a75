//! Classifier Model Implementations
//!
//! A small pure-Rust stack: flat-storage tensors, ReLU/linear
//! activations, Adam, and a feed-forward classifier with
//! backpropagation. Sized for tabular feature vectors in the tens of
//! dimensions, where one forward pass is a handful of matrix-vector
//! products.

pub mod activation;
pub mod classifier;
pub mod optimizer;
pub mod tensor;

pub use activation::Activation;
pub use classifier::{Layer, MlpClassifier, MlpConfig, softmax};
pub use optimizer::{Adam, Optimizer};
pub use tensor::Tensor;

/// ML model errors
#[derive(Debug, Clone, thiserror::Error)]
pub enum ModelError {
    /// Dimension mismatch
    #[error("dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch {
        /// Expected dimension
        expected: usize,
        /// Actual dimension
        got: usize,
    },

    /// Invalid configuration
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Artifacts that cannot be combined (class lists, weight shapes)
    #[error("incompatible artifacts: {0}")]
    Incompatible(String),

    /// Training or label-construction data problem
    #[error("training data error: {0}")]
    Data(String),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(String),

    /// File I/O error
    #[error("I/O error: {0}")]
    Io(String),
}

/// Result type for model operations
pub type ModelResult<T> = Result<T, ModelError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_error_display() {
        let err = ModelError::DimensionMismatch {
            expected: 21,
            got: 26,
        };
        assert!(err.to_string().contains("21"));
        assert!(err.to_string().contains("26"));
    }
}
