use rand::Rng;
use serde::{Serialize, Deserialize};

use crate::activation::{softmax, ActivationFunction};
use crate::math::matrix::Matrix;

/// Fully connected layer: `a = σ(x·W + b)`.
///
/// `neurons` and `pre_neurons` cache the last training forward pass for
/// backprop; they are not part of the persisted model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Layer {
    pub size: usize,
    /// Shape (input_size, size).
    pub weights: Matrix,
    /// Shape (1, size).
    pub biases: Matrix,
    pub activator: ActivationFunction,
    #[serde(skip)]
    neurons: Matrix,
    #[serde(skip)]
    pre_neurons: Matrix,
}

/// Gradients of one layer for one sample or an accumulated batch.
#[derive(Debug, Clone)]
pub struct LayerGradients {
    pub weights: Matrix,
    pub biases: Matrix,
}

impl LayerGradients {
    pub fn zeros_like(layer: &Layer) -> LayerGradients {
        LayerGradients {
            weights: Matrix::zeros(layer.weights.rows, layer.weights.cols),
            biases: Matrix::zeros(layer.biases.rows, layer.biases.cols),
        }
    }

    pub fn accumulate(&mut self, other: &LayerGradients) {
        self.weights.accumulate(&other.weights);
        self.biases.accumulate(&other.biases);
    }
}

impl Layer {
    pub fn new<R: Rng + ?Sized>(
        size: usize,
        input_size: usize,
        activation: ActivationFunction,
        rng: &mut R,
    ) -> Layer {
        let weights = if activation.prefers_he_init() {
            Matrix::he(input_size, size, rng)
        } else {
            Matrix::xavier(input_size, size, rng)
        };

        Layer {
            size,
            weights,
            biases: Matrix::zeros(1, size),
            activator: activation,
            neurons: Matrix::zeros(1, size),
            pre_neurons: Matrix::zeros(1, size),
        }
    }

    pub fn input_size(&self) -> usize {
        self.weights.rows
    }

    fn linear(&self, input: &[f64]) -> Matrix {
        let z = &Matrix::row(input) * &self.weights;
        &z + &self.biases
    }

    fn activate_row(&self, z: &Matrix) -> Matrix {
        match self.activator {
            ActivationFunction::Softmax => Matrix::row(&softmax(&z.data[0])),
            ref f => z.map(|x| f.function(x)),
        }
    }

    /// Training forward pass; caches z and a for `compute_gradients`.
    pub fn feed_from(&mut self, input: &[f64]) -> Vec<f64> {
        let z = self.linear(input);
        let a = self.activate_row(&z);
        self.pre_neurons = z;
        self.neurons = a;
        self.neurons.data[0].clone()
    }

    /// Inference forward pass; leaves the training caches untouched.
    pub fn activate(&self, input: &[f64]) -> Vec<f64> {
        let z = self.linear(input);
        let mut a = self.activate_row(&z);
        a.data.swap_remove(0)
    }

    /// Output of the last `feed_from` call.
    pub fn neurons(&self) -> &Matrix {
        &self.neurons
    }

    /// Computes gradients for this layer.
    ///
    /// `delta` is ∂L/∂a for this layer's activations; `inputs` is the row that
    /// was fed into it. Returns the gradients and the layer delta δ = delta ⊙ σ'(z),
    /// from which the caller propagates to the previous layer.
    pub fn compute_gradients(&self, delta: &Matrix, inputs: &Matrix) -> (LayerGradients, Matrix) {
        // σ'(z) must be taken at the pre-activation values.
        let act_derivative = self.pre_neurons.map(|x| self.activator.derivative(x));
        let layer_delta = delta.hadamard(&act_derivative);

        let grads = LayerGradients {
            weights: &inputs.transpose() * &layer_delta,
            biases: layer_delta.clone(),
        };
        (grads, layer_delta)
    }

    /// Applies pre-computed gradients scaled by `lr`.
    pub fn apply_gradients(&mut self, grads: &LayerGradients, lr: f64) {
        self.weights = &self.weights - &grads.weights.map(|x| x * lr);
        self.biases = &self.biases - &grads.biases.map(|x| x * lr);
    }
}
