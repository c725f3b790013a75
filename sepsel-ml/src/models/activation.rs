//! Activation Functions

use serde::{Deserialize, Serialize};

/// Activation function types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Activation {
    /// Rectified Linear Unit (hidden layers)
    ReLU,
    /// Identity (output layer; softmax happens outside the network)
    Linear,
}

impl Activation {
    /// Apply the activation function
    pub fn apply(&self, x: f64) -> f64 {
        match self {
            Activation::ReLU => x.max(0.0),
            Activation::Linear => x,
        }
    }

    /// Derivative with respect to the pre-activation value
    pub fn derivative(&self, x: f64) -> f64 {
        match self {
            Activation::ReLU => {
                if x > 0.0 {
                    1.0
                } else {
                    0.0
                }
            }
            Activation::Linear => 1.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relu() {
        let act = Activation::ReLU;
        assert_eq!(act.apply(5.0), 5.0);
        assert_eq!(act.apply(-3.0), 0.0);
        assert_eq!(act.derivative(5.0), 1.0);
        assert_eq!(act.derivative(-3.0), 0.0);
    }

    #[test]
    fn test_linear() {
        let act = Activation::Linear;
        assert_eq!(act.apply(-7.5), -7.5);
        assert_eq!(act.derivative(100.0), 1.0);
    }
}
