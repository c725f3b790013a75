//! Gradient-Descent Optimizers

use rustc_hash::FxHashMap;

use super::tensor::Tensor;

/// Optimizer trait
pub trait Optimizer {
    /// Update one parameter tensor given its gradient. `param_id` keys
    /// the optimizer's per-parameter state and must be stable across
    /// steps.
    fn step(&mut self, param_id: usize, param: &mut Tensor, gradient: &Tensor);

    /// Get the learning rate
    fn learning_rate(&self) -> f64;

    /// Reset optimizer state
    fn reset(&mut self);
}

/// Adam optimizer (Adaptive Moment Estimation)
#[derive(Debug, Clone)]
pub struct Adam {
    /// Learning rate
    pub learning_rate: f64,
    /// Decay rate for the first moment
    pub beta1: f64,
    /// Decay rate for the second moment
    pub beta2: f64,
    /// Epsilon for numerical stability
    pub epsilon: f64,
    /// First moment estimates
    m: FxHashMap<usize, Tensor>,
    /// Second moment estimates
    v: FxHashMap<usize, Tensor>,
    /// Number of steps taken
    steps: usize,
}

impl Adam {
    /// Create a new Adam optimizer with standard betas
    pub fn new(learning_rate: f64) -> Self {
        Self {
            learning_rate,
            beta1: 0.9,
            beta2: 0.999,
            epsilon: 1e-8,
            m: FxHashMap::default(),
            v: FxHashMap::default(),
            steps: 0,
        }
    }

    /// Number of steps taken
    pub fn num_steps(&self) -> usize {
        self.steps
    }
}

impl Optimizer for Adam {
    fn step(&mut self, param_id: usize, param: &mut Tensor, gradient: &Tensor) {
        self.steps += 1;

        let m = self
            .m
            .entry(param_id)
            .or_insert_with(|| Tensor::zeros(param.shape()));
        let v = self
            .v
            .entry(param_id)
            .or_insert_with(|| Tensor::zeros(param.shape()));

        // m = beta1 * m + (1 - beta1) * g;  v = beta2 * v + (1 - beta2) * g^2
        for ((m_i, v_i), &g) in m.data.iter_mut().zip(v.data.iter_mut()).zip(&gradient.data) {
            *m_i = self.beta1 * *m_i + (1.0 - self.beta1) * g;
            *v_i = self.beta2 * *v_i + (1.0 - self.beta2) * g * g;
        }

        let bias1 = 1.0 - self.beta1.powi(self.steps as i32);
        let bias2 = 1.0 - self.beta2.powi(self.steps as i32);

        for ((p, &m_i), &v_i) in param.data.iter_mut().zip(&m.data).zip(&v.data) {
            let m_hat = m_i / bias1;
            let v_hat = v_i / bias2;
            *p -= self.learning_rate * m_hat / (v_hat.sqrt() + self.epsilon);
        }
    }

    fn learning_rate(&self) -> f64 {
        self.learning_rate
    }

    fn reset(&mut self) {
        self.m.clear();
        self.v.clear();
        self.steps = 0;
    }
}
