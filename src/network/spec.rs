use rand::{rngs::StdRng, SeedableRng};
use serde::{Serialize, Deserialize};

use crate::activation::ActivationFunction;
use crate::error::{Error, Result};
use crate::layers::dense::Layer;
use crate::network::network::Network;

/// Architecture of a multi-layer perceptron, independent of its weights.
///
/// This is the model-construction rule handed to an iterative trainer: the
/// trainer calls [`MlpSpec::allocate`] once per fold (and per class model when
/// training class-specific classifiers) with the input width reported by the
/// feature processor and the number of outputs the strategy needs.
///
/// Hidden layers use `activation`; the output layer is always a Softmax so the
/// network pairs with cross-entropy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MlpSpec {
    /// Neuron count of each hidden layer, input side first.
    pub hidden: Vec<usize>,
    pub activation: ActivationFunction,
}

impl MlpSpec {
    pub fn new(hidden: Vec<usize>, activation: ActivationFunction) -> Self {
        Self { hidden, activation }
    }

    /// Single hidden layer of `n_neurons`.
    pub fn single_hidden(n_neurons: usize, activation: ActivationFunction) -> Self {
        Self::new(vec![n_neurons], activation)
    }

    /// Builds freshly initialized weights for `input_size` features and
    /// `n_targets` outputs. Same arguments, same network.
    pub fn allocate(&self, input_size: usize, n_targets: usize, seed: u64) -> Result<Network> {
        if input_size == 0 {
            return Err(Error::model("MLP input size must be positive"));
        }
        if n_targets < 2 {
            return Err(Error::model(format!(
                "MLP needs at least 2 outputs, got {n_targets}"
            )));
        }
        if let Some(pos) = self.hidden.iter().position(|&n| n == 0) {
            return Err(Error::model(format!("hidden layer {pos} has no neurons")));
        }
        if self.activation == ActivationFunction::Softmax {
            return Err(Error::model("Softmax is reserved for the output layer"));
        }

        let mut rng = StdRng::seed_from_u64(seed);
        let mut layers = Vec::with_capacity(self.hidden.len() + 1);
        let mut fan_in = input_size;
        for &size in &self.hidden {
            layers.push(Layer::new(size, fan_in, self.activation, &mut rng));
            fan_in = size;
        }
        layers.push(Layer::new(n_targets, fan_in, ActivationFunction::Softmax, &mut rng));

        Ok(Network::new(layers))
    }
}
