use crate::layers::dense::{Layer, LayerGradients};

/// Plain mini-batch SGD.
pub struct Sgd {
    pub learning_rate: f64,
}

impl Sgd {
    pub fn new(learning_rate: f64) -> Sgd {
        Sgd { learning_rate }
    }

    /// Applies one update from gradients summed over `batch_len` samples.
    pub fn step(&self, layer: &mut Layer, summed: &LayerGradients, batch_len: usize) {
        let lr = self.learning_rate / batch_len.max(1) as f64;
        layer.apply_gradients(summed, lr);
    }
}
