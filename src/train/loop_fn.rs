use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Serialize, Deserialize};
use tracing::debug;

use crate::error::{Error, Result};
use crate::layers::dense::LayerGradients;
use crate::loss::cross_entropy::CrossEntropyLoss;
use crate::math::matrix::Matrix;
use crate::network::network::Network;
use crate::optim::sgd::Sgd;
use crate::train::early_stop::{EarlyStopping, Verdict};
use crate::train::epoch_stats::EpochStats;
use crate::trainer::LabeledSet;

// ---------------------------------------------------------------------------
// Resumable training state
// ---------------------------------------------------------------------------

/// Everything needed to continue an interrupted iterative fit.
///
/// Per-pass randomness is derived from `(seed, epoch)` instead of a running
/// generator, so a state persisted after pass `k` and resumed reaches exactly
/// the terminal state of an uninterrupted run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingState<M> {
    pub model: M,
    /// Parameters at the best monitored score so far; what gets committed.
    pub best_model: M,
    pub stopper: EarlyStopping,
    pub seed: u64,
    pub epochs_run: usize,
    pub stopped_early: bool,
    pub history: Vec<EpochStats>,
}

impl<M: Clone> TrainingState<M> {
    pub fn new(model: M, seed: u64, stopper: EarlyStopping) -> Self {
        TrainingState {
            best_model: model.clone(),
            model,
            stopper,
            seed,
            epochs_run: 0,
            stopped_early: false,
            history: Vec::new(),
        }
    }

    pub fn is_finished(&self, n_epochs: usize) -> bool {
        self.stopped_early || self.epochs_run >= n_epochs
    }

    pub fn best_epoch(&self) -> Option<usize> {
        self.stopper.best_epoch()
    }
}

/// Seed of the shuffle for a given pass.
pub fn epoch_seed(seed: u64, epoch: usize) -> u64 {
    seed ^ (epoch as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15)
}

/// Runs passes until early stopping fires, `n_epochs` is reached, or
/// `until_epoch` passes have completed (whichever comes first).
///
/// `step` performs one full pass on the model and returns its statistics; its
/// `monitored` score drives early stopping. Passing `until_epoch < n_epochs`
/// produces a partial state that a later call continues.
pub fn advance<M, F>(
    state: &mut TrainingState<M>,
    n_epochs: usize,
    until_epoch: usize,
    mut step: F,
) -> Result<()>
where
    M: Clone,
    F: FnMut(&mut M, usize, u64) -> Result<EpochStats>,
{
    let limit = until_epoch.min(n_epochs);

    while !state.stopped_early && state.epochs_run < limit {
        let epoch = state.epochs_run + 1;
        let stats = step(&mut state.model, epoch, epoch_seed(state.seed, epoch))?;

        let verdict = state.stopper.observe(epoch, stats.monitored);
        state.epochs_run = epoch;
        state.history.push(stats);

        match verdict {
            Verdict::Improved => state.best_model = state.model.clone(),
            Verdict::Stalled => {}
            Verdict::Stop => {
                state.stopped_early = true;
                debug!(
                    epoch,
                    best_epoch = ?state.best_epoch(),
                    "early stopping: patience exhausted"
                );
            }
        }
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// MLP passes
// ---------------------------------------------------------------------------

/// One full MLP pass: mini-batch SGD over `train`, then evaluation on
/// `validation` (falls back to the training loss when it is empty).
pub fn mlp_epoch(
    network: &mut Network,
    train: &LabeledSet<'_>,
    validation: &LabeledSet<'_>,
    optimizer: &Sgd,
    batch_size: usize,
    epoch: usize,
    shuffle_seed: u64,
) -> Result<EpochStats> {
    let train_loss = run_one_epoch(network, train, optimizer, batch_size, shuffle_seed);
    if !train_loss.is_finite() {
        return Err(Error::model(format!("training loss diverged at epoch {epoch}")));
    }

    let (val_loss, val_accuracy) = if validation.is_empty() {
        (None, None)
    } else {
        let (loss, accuracy) = evaluate(network, validation);
        (Some(loss), Some(accuracy))
    };

    Ok(EpochStats {
        epoch,
        train_loss,
        val_loss,
        val_accuracy,
        monitored: val_loss.unwrap_or(train_loss),
    })
}

/// Runs one full epoch of mini-batch SGD over the training data.
/// Returns the mean loss over all samples.
fn run_one_epoch(
    network: &mut Network,
    data: &LabeledSet<'_>,
    optimizer: &Sgd,
    batch_size: usize,
    shuffle_seed: u64,
) -> f64 {
    let n = data.len();
    if n == 0 {
        return 0.0;
    }
    let mut total_loss = 0.0;

    let mut indices: Vec<usize> = (0..n).collect();
    indices.shuffle(&mut StdRng::seed_from_u64(shuffle_seed));

    for batch in indices.chunks(batch_size.max(1)) {
        let mut acc_grads: Vec<LayerGradients> = network.layers.iter()
            .map(LayerGradients::zeros_like)
            .collect();

        for &idx in batch {
            let input = &data.inputs[idx];
            let class = data.labels[idx];

            let output = network.forward(input);
            total_loss += CrossEntropyLoss::loss(&output, class);

            let mut delta = Matrix::row(&CrossEntropyLoss::derivative(&output, class));

            // Backward pass.
            for i in (0..network.layers.len()).rev() {
                let input_for_layer = if i == 0 {
                    Matrix::row(input)
                } else {
                    network.layers[i - 1].neurons().clone()
                };

                let (grads, layer_delta) =
                    network.layers[i].compute_gradients(&delta, &input_for_layer);

                if i > 0 {
                    delta = &layer_delta * &network.layers[i].weights.transpose();
                }

                acc_grads[i].accumulate(&grads);
            }
        }

        for (layer, grads) in network.layers.iter_mut().zip(acc_grads.iter()) {
            optimizer.step(layer, grads, batch.len());
        }
    }

    total_loss / n as f64
}

/// Mean cross-entropy and accuracy over a labeled set (inference only).
pub fn evaluate(network: &Network, data: &LabeledSet<'_>) -> (f64, f64) {
    let n = data.len();
    if n == 0 {
        return (0.0, 0.0);
    }
    let mut loss = 0.0;
    let mut correct = 0usize;
    for (input, &class) in data.inputs.iter().zip(data.labels.iter()) {
        let output = network.infer(input);
        loss += CrossEntropyLoss::loss(&output, class);
        if argmax(&output) == class {
            correct += 1;
        }
    }
    (loss / n as f64, correct as f64 / n as f64)
}

/// Index of the maximum element in a slice; ties go to the lowest index.
pub fn argmax(v: &[f64]) -> usize {
    let mut best = 0;
    for (i, x) in v.iter().enumerate() {
        if *x > v[best] {
            best = i;
        }
    }
    best
}
