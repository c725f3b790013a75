//! Flat-Storage Tensors
//!
//! Just enough tensor machinery for a small feed-forward net: element
//! ops, matrix-vector products, and seeded weight initialization. Shapes
//! never exceed two dimensions here.

use rand::Rng;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use super::{ModelError, ModelResult};

/// A tensor backed by a flat vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tensor {
    /// Flat data storage
    pub data: Vec<f64>,
    /// Shape of the tensor
    pub shape: SmallVec<[usize; 2]>,
}

impl Tensor {
    /// Create a tensor of zeros.
    pub fn zeros(shape: &[usize]) -> Self {
        let size = shape.iter().product();
        Self {
            data: vec![0.0; size],
            shape: SmallVec::from_slice(shape),
        }
    }

    /// Create a 1-D tensor from a slice.
    pub fn from_slice(data: &[f64]) -> Self {
        Self {
            data: data.to_vec(),
            shape: SmallVec::from_slice(&[data.len()]),
        }
    }

    /// Create a tensor from data and shape.
    pub fn from_vec(data: Vec<f64>, shape: &[usize]) -> ModelResult<Self> {
        let expected: usize = shape.iter().product();
        if data.len() != expected {
            return Err(ModelError::DimensionMismatch {
                expected,
                got: data.len(),
            });
        }
        Ok(Self {
            data,
            shape: SmallVec::from_slice(shape),
        })
    }

    /// He initialization for ReLU layers, seeded.
    ///
    /// For a 2-D weight of shape `[fan_out, fan_in]` the standard
    /// deviation is `sqrt(2 / fan_in)`.
    pub fn he_init(shape: &[usize], rng: &mut StdRng) -> Self {
        let fan_in = if shape.len() >= 2 { shape[1] } else { shape[0] };
        let std = (2.0 / fan_in.max(1) as f64).sqrt();
        Self::random_normal(shape, 0.0, std, rng)
    }

    /// Xavier/Glorot uniform initialization for linear layers, seeded.
    pub fn xavier_init(shape: &[usize], rng: &mut StdRng) -> Self {
        let (fan_out, fan_in) = if shape.len() >= 2 {
            (shape[0], shape[1])
        } else {
            (shape[0], shape[0])
        };
        let limit = (6.0 / (fan_in + fan_out).max(1) as f64).sqrt();
        let size = shape.iter().product();
        let data = (0..size).map(|_| rng.random_range(-limit..limit)).collect();
        Self {
            data,
            shape: SmallVec::from_slice(shape),
        }
    }

    /// Normal samples via the Box-Muller transform, seeded.
    pub fn random_normal(shape: &[usize], mean: f64, std: f64, rng: &mut StdRng) -> Self {
        let size = shape.iter().product();
        let data = (0..size)
            .map(|_| {
                let u1: f64 = rng.random::<f64>().max(f64::MIN_POSITIVE);
                let u2: f64 = rng.random();
                let z = (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos();
                mean + std * z
            })
            .collect();
        Self {
            data,
            shape: SmallVec::from_slice(shape),
        }
    }

    /// Total number of elements.
    pub fn size(&self) -> usize {
        self.data.len()
    }

    /// Shape of the tensor.
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// Apply a function element-wise.
    pub fn map<F>(&self, f: F) -> Self
    where
        F: Fn(f64) -> f64,
    {
        Self {
            data: self.data.iter().map(|&x| f(x)).collect(),
            shape: self.shape.clone(),
        }
    }

    /// Element-wise addition.
    pub fn add(&self, other: &Self) -> ModelResult<Self> {
        self.zip_with(other, |a, b| a + b)
    }

    /// Element-wise subtraction.
    pub fn sub(&self, other: &Self) -> ModelResult<Self> {
        self.zip_with(other, |a, b| a - b)
    }

    /// Element-wise multiplication.
    pub fn mul(&self, other: &Self) -> ModelResult<Self> {
        self.zip_with(other, |a, b| a * b)
    }

    /// Scalar multiplication.
    pub fn scale(&self, scalar: f64) -> Self {
        self.map(|x| x * scalar)
    }

    /// Matrix-vector product: `self` is `[m, n]`, `vec` is `[n]`.
    pub fn matmul_vec(&self, vec: &Self) -> ModelResult<Self> {
        if self.shape.len() != 2 || vec.shape.len() != 1 {
            return Err(ModelError::InvalidConfig(
                "matmul_vec needs a 2-D matrix and a 1-D vector".to_string(),
            ));
        }
        let (m, n) = (self.shape[0], self.shape[1]);
        if n != vec.data.len() {
            return Err(ModelError::DimensionMismatch {
                expected: n,
                got: vec.data.len(),
            });
        }
        let mut out = vec![0.0; m];
        for (i, slot) in out.iter_mut().enumerate() {
            let row = &self.data[i * n..(i + 1) * n];
            *slot = row.iter().zip(&vec.data).map(|(&w, &x)| w * x).sum();
        }
        Ok(Tensor::from_slice(&out))
    }

    fn zip_with<F>(&self, other: &Self, f: F) -> ModelResult<Self>
    where
        F: Fn(f64, f64) -> f64,
    {
        if self.data.len() != other.data.len() {
            return Err(ModelError::DimensionMismatch {
                expected: self.data.len(),
                got: other.data.len(),
            });
        }
        Ok(Self {
            data: self
                .data
                .iter()
                .zip(&other.data)
                .map(|(&a, &b)| f(a, b))
                .collect(),
            shape: self.shape.clone(),
        })
    }
}
