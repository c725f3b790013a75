//! Feed-Forward Configuration Classifier
//!
//! An MLP mapping an instance feature vector to logits over the action
//! classes: `depth` ReLU hidden layers of equal width, then a linear
//! head. Softmax lives outside the network so the training gradient
//! stays the clean `probs - onehot` form.

use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};

use super::activation::Activation;
use super::optimizer::Optimizer;
use super::tensor::Tensor;
use super::{ModelError, ModelResult};
use crate::Prediction;

/// A single dense layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Layer {
    /// Weight matrix `[output_dim, input_dim]`
    pub weights: Tensor,
    /// Bias vector `[output_dim]`
    pub bias: Tensor,
    /// Activation function
    pub activation: Activation,
    /// Cached input (for backpropagation)
    #[serde(skip)]
    cached_input: Option<Tensor>,
    /// Cached pre-activation (for backpropagation)
    #[serde(skip)]
    cached_z: Option<Tensor>,
}

impl Layer {
    /// Create a layer with seeded initialization: He for ReLU, Xavier
    /// for the linear head.
    pub fn new(input_dim: usize, output_dim: usize, activation: Activation, rng: &mut StdRng) -> Self {
        let shape = [output_dim, input_dim];
        let weights = match activation {
            Activation::ReLU => Tensor::he_init(&shape, rng),
            Activation::Linear => Tensor::xavier_init(&shape, rng),
        };
        Self {
            weights,
            bias: Tensor::zeros(&[output_dim]),
            activation,
            cached_input: None,
            cached_z: None,
        }
    }

    /// Input width this layer expects.
    pub fn input_dim(&self) -> usize {
        self.weights.shape()[1]
    }

    /// Output width this layer produces.
    pub fn output_dim(&self) -> usize {
        self.weights.shape()[0]
    }

    /// Forward pass; caches intermediates when `training`.
    pub fn forward(&mut self, input: &Tensor, training: bool) -> ModelResult<Tensor> {
        if input.data.len() != self.input_dim() {
            return Err(ModelError::DimensionMismatch {
                expected: self.input_dim(),
                got: input.data.len(),
            });
        }
        let z = self.weights.matmul_vec(input)?.add(&self.bias)?;
        if training {
            self.cached_input = Some(input.clone());
            self.cached_z = Some(z.clone());
        }
        Ok(z.map(|x| self.activation.apply(x)))
    }

    /// Forward pass without caching, usable through a shared reference.
    pub fn infer(&self, input: &Tensor) -> ModelResult<Tensor> {
        if input.data.len() != self.input_dim() {
            return Err(ModelError::DimensionMismatch {
                expected: self.input_dim(),
                got: input.data.len(),
            });
        }
        let z = self.weights.matmul_vec(input)?.add(&self.bias)?;
        Ok(z.map(|x| self.activation.apply(x)))
    }

    /// Backward pass: gradient w.r.t. input, weights, and bias.
    pub fn backward(&self, grad_output: &Tensor) -> ModelResult<(Tensor, Tensor, Tensor)> {
        let cached_input = self.cached_input.as_ref().ok_or_else(|| {
            ModelError::InvalidConfig("backward without a cached forward pass".to_string())
        })?;
        let cached_z = self.cached_z.as_ref().ok_or_else(|| {
            ModelError::InvalidConfig("backward without a cached forward pass".to_string())
        })?;

        // grad_z = grad_output * activation'(z)
        let activation_grad = cached_z.map(|x| self.activation.derivative(x));
        let grad_z = grad_output.mul(&activation_grad)?;

        let (output_dim, input_dim) = (self.output_dim(), self.input_dim());

        // grad_W[i][j] = grad_z[i] * input[j]
        let mut grad_weights = Tensor::zeros(&[output_dim, input_dim]);
        for i in 0..output_dim {
            for j in 0..input_dim {
                grad_weights.data[i * input_dim + j] = grad_z.data[i] * cached_input.data[j];
            }
        }

        // grad_input[j] = sum_i W[i][j] * grad_z[i]
        let mut grad_input = Tensor::zeros(&[input_dim]);
        for j in 0..input_dim {
            for i in 0..output_dim {
                grad_input.data[j] += self.weights.data[i * input_dim + j] * grad_z.data[i];
            }
        }

        Ok((grad_input, grad_weights, grad_z))
    }

    /// Drop cached intermediates.
    pub fn clear_cache(&mut self) {
        self.cached_input = None;
        self.cached_z = None;
    }
}

/// Architecture hyperparameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MlpConfig {
    /// Feature vector width
    pub input_dim: usize,
    /// Hidden layer width
    pub hidden: usize,
    /// Number of hidden layers
    pub depth: usize,
    /// Number of action classes
    pub n_classes: usize,
    /// Learning rate
    pub learning_rate: f64,
}

/// Feed-forward classifier over the action classes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MlpClassifier {
    layers: Vec<Layer>,
    config: MlpConfig,
}

impl MlpClassifier {
    /// Build a fresh network with seeded weights.
    pub fn new(config: MlpConfig, rng: &mut StdRng) -> ModelResult<Self> {
        if config.input_dim == 0 || config.hidden == 0 || config.n_classes == 0 {
            return Err(ModelError::InvalidConfig(
                "input_dim, hidden, and n_classes must be positive".to_string(),
            ));
        }
        if config.depth == 0 {
            return Err(ModelError::InvalidConfig(
                "network needs at least one hidden layer".to_string(),
            ));
        }
        let mut layers = Vec::with_capacity(config.depth + 1);
        let mut width = config.input_dim;
        for _ in 0..config.depth {
            layers.push(Layer::new(width, config.hidden, Activation::ReLU, rng));
            width = config.hidden;
        }
        layers.push(Layer::new(width, config.n_classes, Activation::Linear, rng));
        Ok(Self { layers, config })
    }

    /// Reassemble a network from persisted layers, checking that the
    /// chain is consistent and matches the declared architecture.
    pub fn from_layers(layers: Vec<Layer>, config: MlpConfig) -> ModelResult<Self> {
        if layers.len() != config.depth + 1 {
            return Err(ModelError::Incompatible(format!(
                "{} layers in artifact, architecture implies {}",
                layers.len(),
                config.depth + 1
            )));
        }
        let mut width = config.input_dim;
        for (i, layer) in layers.iter().enumerate() {
            if layer.input_dim() != width {
                return Err(ModelError::Incompatible(format!(
                    "layer {} expects input width {}, chain provides {}",
                    i,
                    layer.input_dim(),
                    width
                )));
            }
            width = layer.output_dim();
        }
        if width != config.n_classes {
            return Err(ModelError::Incompatible(format!(
                "network produces {} outputs, architecture says {} classes",
                width, config.n_classes
            )));
        }
        Ok(Self { layers, config })
    }

    /// Architecture hyperparameters.
    pub fn config(&self) -> &MlpConfig {
        &self.config
    }

    /// The network's layers, in forward order.
    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    /// Feature vector width.
    pub fn input_dim(&self) -> usize {
        self.config.input_dim
    }

    /// Number of action classes.
    pub fn n_classes(&self) -> usize {
        self.config.n_classes
    }

    /// Raw scores over the classes.
    pub fn logits(&self, input: &[f64]) -> ModelResult<Vec<f64>> {
        let mut current = Tensor::from_slice(input);
        for layer in &self.layers {
            current = layer.infer(&current)?;
        }
        Ok(current.data)
    }

    /// Class-probability distribution.
    pub fn predict_proba(&self, input: &[f64]) -> ModelResult<Vec<f64>> {
        Ok(softmax(&self.logits(input)?))
    }

    /// Arg-max class with its probability.
    pub fn predict(&self, input: &[f64]) -> ModelResult<Prediction<usize>> {
        let probs = self.predict_proba(input)?;
        let (class, &p) = probs
            .iter()
            .enumerate()
            .max_by(|(_, a), (_, b)| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal))
            .ok_or_else(|| ModelError::InvalidConfig("network has no outputs".to_string()))?;
        Ok(Prediction::new(class, p))
    }

    /// One gradient step on a single example; returns the cross-entropy
    /// loss at the pre-update weights.
    pub fn train_step<O: Optimizer>(
        &mut self,
        input: &[f64],
        class: usize,
        optimizer: &mut O,
    ) -> ModelResult<f64> {
        if class >= self.config.n_classes {
            return Err(ModelError::DimensionMismatch {
                expected: self.config.n_classes,
                got: class,
            });
        }

        let mut current = Tensor::from_slice(input);
        for layer in &mut self.layers {
            current = layer.forward(&current, true)?;
        }

        let probs = softmax(&current.data);
        let loss = -probs[class].max(1e-15).ln();

        // d(cross-entropy ∘ softmax)/d(logits) = probs - onehot
        let mut grad = Tensor::from_slice(&probs);
        grad.data[class] -= 1.0;

        let mut gradients = Vec::with_capacity(self.layers.len());
        let mut grad_output = grad;
        for layer in self.layers.iter().rev() {
            let (grad_input, grad_weights, grad_bias) = layer.backward(&grad_output)?;
            gradients.push((grad_weights, grad_bias));
            grad_output = grad_input;
        }
        gradients.reverse();

        for (i, (grad_weights, grad_bias)) in gradients.into_iter().enumerate() {
            optimizer.step(i * 2, &mut self.layers[i].weights, &grad_weights);
            optimizer.step(i * 2 + 1, &mut self.layers[i].bias, &grad_bias);
        }
        for layer in &mut self.layers {
            layer.clear_cache();
        }

        Ok(loss)
    }
}

/// Numerically stable softmax.
pub fn softmax(logits: &[f64]) -> Vec<f64> {
    let max = logits.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let exps: Vec<f64> = logits.iter().map(|&x| (x - max).exp()).collect();
    let sum: f64 = exps.iter().sum();
    exps.into_iter().map(|e| e / sum).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::optimizer::Adam;
    use rand::SeedableRng;

    fn config(input_dim: usize, n_classes: usize) -> MlpConfig {
        MlpConfig {
            input_dim,
            hidden: 8,
            depth: 2,
            n_classes,
            learning_rate: 0.01,
        }
    }

    #[test]
    fn test_network_shapes() {
        let mut rng = StdRng::seed_from_u64(42);
        let net = MlpClassifier::new(config(5, 3), &mut rng).unwrap();
        assert_eq!(net.layers().len(), 3);
        assert_eq!(net.layers()[0].input_dim(), 5);
        assert_eq!(net.layers()[2].output_dim(), 3);
        assert_eq!(net.logits(&[0.0; 5]).unwrap().len(), 3);
    }

    #[test]
    fn test_zero_depth_rejected() {
        let mut rng = StdRng::seed_from_u64(0);
        let mut cfg = config(5, 3);
        cfg.depth = 0;
        assert!(MlpClassifier::new(cfg, &mut rng).is_err());
    }

    #[test]
    fn test_softmax_sums_to_one_and_is_stable() {
        let probs = softmax(&[1000.0, 1001.0, 999.0]);
        assert!((probs.iter().sum::<f64>() - 1.0).abs() < 1e-12);
        assert!(probs.iter().all(|&p| p.is_finite() && p > 0.0));
        assert!(probs[1] > probs[0] && probs[0] > probs[2]);
    }

    #[test]
    fn test_predict_probability_is_argmax() {
        let mut rng = StdRng::seed_from_u64(1);
        let net = MlpClassifier::new(config(4, 3), &mut rng).unwrap();
        let pred = net.predict(&[0.5, -0.5, 1.0, 0.0]).unwrap();
        let probs = net.predict_proba(&[0.5, -0.5, 1.0, 0.0]).unwrap();
        assert!(pred.value < 3);
        assert_eq!(pred.confidence, probs[pred.value]);
    }

    #[test]
    fn test_wrong_input_width_rejected() {
        let mut rng = StdRng::seed_from_u64(2);
        let net = MlpClassifier::new(config(4, 2), &mut rng).unwrap();
        assert!(net.logits(&[1.0, 2.0]).is_err());
    }

    #[test]
    fn test_training_separates_two_classes() {
        let mut rng = StdRng::seed_from_u64(3);
        let mut net = MlpClassifier::new(config(2, 2), &mut rng).unwrap();
        let mut opt = Adam::new(0.01);

        // class 0 lives at (1, 0), class 1 at (0, 1)
        let data = [
            ([1.0, 0.0], 0usize),
            ([0.9, 0.1], 0),
            ([0.0, 1.0], 1),
            ([0.1, 0.9], 1),
        ];
        for _ in 0..300 {
            for (x, y) in &data {
                net.train_step(x, *y, &mut opt).unwrap();
            }
        }
        for (x, y) in &data {
            assert_eq!(net.predict(x).unwrap().value, *y);
        }
    }

    #[test]
    fn test_loss_decreases() {
        let mut rng = StdRng::seed_from_u64(4);
        let mut net = MlpClassifier::new(config(3, 2), &mut rng).unwrap();
        let mut opt = Adam::new(0.01);
        let x = [0.2, -1.0, 0.4];
        let first = net.train_step(&x, 1, &mut opt).unwrap();
        let mut last = first;
        for _ in 0..50 {
            last = net.train_step(&x, 1, &mut opt).unwrap();
        }
        assert!(last < first);
    }

    #[test]
    fn test_from_layers_inconsistent_chain_rejected() {
        let mut rng = StdRng::seed_from_u64(5);
        let net = MlpClassifier::new(config(4, 2), &mut rng).unwrap();
        let mut layers = net.layers().to_vec();
        layers.remove(1);
        let result = MlpClassifier::from_layers(layers, config(4, 2));
        assert!(matches!(result, Err(ModelError::Incompatible(_))));
    }

    #[test]
    fn test_serde_roundtrip_preserves_predictions() {
        let mut rng = StdRng::seed_from_u64(6);
        let net = MlpClassifier::new(config(3, 2), &mut rng).unwrap();
        let json = serde_json::to_string(&net).unwrap();
        let restored: MlpClassifier = serde_json::from_str(&json).unwrap();
        let x = [0.1, 0.2, 0.3];
        assert_eq!(net.logits(&x).unwrap(), restored.logits(&x).unwrap());
    }
}
