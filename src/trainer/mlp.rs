use serde_json::json;
use tracing::debug;

use crate::activation::ActivationFunction;
use crate::error::{Error, Result};
use crate::experiment::persist::digest;
use crate::network::{MlpSpec, Network};
use crate::optim::Sgd;
use crate::train::{advance, mlp_epoch, EarlyStopping, IterativeConfig, TrainingState};
use crate::trainer::{FitReport, LabeledSet, ModelState, ParamSet, Trainer, TrainingStrategy};

/// Iterative trainer: mini-batch SGD on an MLP with patience-based early
/// stopping on the validation cross-entropy.
#[derive(Debug, Clone)]
pub struct MlpTrainer {
    id: String,
    strategy: TrainingStrategy,
    params: ParamSet,
    spec: MlpSpec,
    config: IterativeConfig,
}

impl MlpTrainer {
    pub fn new(
        id: impl Into<String>,
        strategy: TrainingStrategy,
        params: ParamSet,
        spec: MlpSpec,
        config: IterativeConfig,
    ) -> Self {
        MlpTrainer { id: id.into(), strategy, params, spec, config }
    }

    /// Builds a single-hidden-layer trainer from `Neurons` and `Activation`.
    pub fn from_params(
        id: impl Into<String>,
        strategy: TrainingStrategy,
        params: ParamSet,
        config: IterativeConfig,
    ) -> Result<Self> {
        let neurons = params.require_usize("Neurons")?;
        let activation = match params.get("Activation") {
            Some(_) => params
                .require_str("Activation")?
                .parse::<ActivationFunction>()
                .map_err(Error::config)?,
            None => ActivationFunction::Tanh,
        };
        let spec = MlpSpec::single_hidden(neurons, activation);
        Ok(Self::new(id, strategy, params, spec, config))
    }

    pub fn spec(&self) -> &MlpSpec {
        &self.spec
    }

    pub fn config(&self) -> &IterativeConfig {
        &self.config
    }

    /// Fresh state for a fit of `n_outputs` classes.
    pub fn start(&self, input_size: usize, n_outputs: usize, seed: u64) -> Result<TrainingState<Network>> {
        self.config.validate()?;
        let network = self.spec.allocate(input_size, n_outputs, seed)?;
        let stopper = EarlyStopping::new(self.config.patience, self.config.min_delta);
        Ok(TrainingState::new(network, seed, stopper))
    }

    /// Continues `state` for at most `until_epoch` total passes. A state
    /// persisted mid-fit and resumed here ends where an uninterrupted fit
    /// would.
    pub fn resume(
        &self,
        state: &mut TrainingState<Network>,
        train: &LabeledSet<'_>,
        validation: &LabeledSet<'_>,
        until_epoch: usize,
    ) -> Result<()> {
        let optimizer = Sgd::new(self.config.learning_rate);
        let batch_size = self.config.batch_size;
        advance(state, self.config.n_epochs, until_epoch, |network, epoch, shuffle_seed| {
            mlp_epoch(network, train, validation, &optimizer, batch_size, epoch, shuffle_seed)
        })
    }
}

impl Trainer for MlpTrainer {
    fn id(&self) -> &str {
        &self.id
    }

    fn strategy(&self) -> TrainingStrategy {
        self.strategy
    }

    fn params(&self) -> &ParamSet {
        &self.params
    }

    fn fingerprint(&self) -> Result<String> {
        digest(&json!({
            "family": "mlp",
            "id": self.id,
            "strategy": self.strategy,
            "params": self.params,
            "spec": self.spec,
            "config": self.config,
        }))
    }

    fn validate(&self) -> Result<()> {
        self.config.validate()?;
        if self.spec.hidden.iter().any(|&n| n == 0) {
            return Err(Error::config(format!("'{}' has a hidden layer with no neurons", self.id)));
        }
        Ok(())
    }

    fn fit_model(
        &self,
        train: &LabeledSet<'_>,
        validation: &LabeledSet<'_>,
        n_outputs: usize,
        seed: u64,
    ) -> Result<(ModelState, FitReport)> {
        let input_size = train
            .inputs
            .first()
            .map(Vec::len)
            .ok_or_else(|| Error::model("training subset is empty"))?;

        let mut state = self.start(input_size, n_outputs, seed)?;
        self.resume(&mut state, train, validation, usize::MAX)?;

        debug!(
            trainer = %self.id,
            epochs = state.epochs_run,
            best_epoch = ?state.best_epoch(),
            stopped_early = state.stopped_early,
            "mlp fit finished"
        );

        let report = FitReport {
            epochs_run: state.epochs_run,
            best_epoch: state.best_epoch(),
            stopped_early: state.stopped_early,
            history: state.history,
        };
        Ok((ModelState::Mlp(state.best_model), report))
    }

    fn scores(&self, model: &ModelState, input: &[f64]) -> Result<Vec<f64>> {
        match model {
            ModelState::Mlp(network) => Ok(network.infer(input)),
            ModelState::Forest(_) => Err(Error::model(format!("'{}' was handed a forest model", self.id))),
        }
    }
}
