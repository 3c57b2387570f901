use serde_json::json;

use crate::error::{Error, Result};
use crate::experiment::persist::digest;
use crate::forest::{ForestParams, RandomForest};
use crate::trainer::{FitReport, LabeledSet, ModelState, ParamSet, Trainer, TrainingStrategy};

/// One-shot trainer: a random forest fitted in a single call. The validation
/// subset is not consulted.
#[derive(Debug, Clone)]
pub struct ForestTrainer {
    id: String,
    strategy: TrainingStrategy,
    params: ParamSet,
    forest: ForestParams,
}

impl ForestTrainer {
    pub fn new(id: impl Into<String>, strategy: TrainingStrategy, params: ParamSet, forest: ForestParams) -> Self {
        ForestTrainer { id: id.into(), strategy, params, forest }
    }

    /// Reads `Estimators` and the optional `Max depth`.
    pub fn from_params(id: impl Into<String>, strategy: TrainingStrategy, params: ParamSet) -> Result<Self> {
        let n_estimators = params.require_usize("Estimators")?;
        if n_estimators == 0 {
            return Err(Error::config("Estimators must be at least 1"));
        }
        let max_depth = match params.get("Max depth") {
            Some(_) => Some(params.require_usize("Max depth")?),
            None => None,
        };
        let forest = ForestParams::new(n_estimators, max_depth);
        Ok(Self::new(id, strategy, params, forest))
    }

    pub fn forest_params(&self) -> &ForestParams {
        &self.forest
    }
}

impl Trainer for ForestTrainer {
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
            "family": "forest",
            "id": self.id,
            "strategy": self.strategy,
            "params": self.params,
            "forest": self.forest,
        }))
    }

    fn validate(&self) -> Result<()> {
        if self.forest.n_estimators == 0 {
            return Err(Error::config(format!("'{}' needs at least one estimator", self.id)));
        }
        Ok(())
    }

    fn fit_model(
        &self,
        train: &LabeledSet<'_>,
        _validation: &LabeledSet<'_>,
        n_outputs: usize,
        seed: u64,
    ) -> Result<(ModelState, FitReport)> {
        let forest = RandomForest::fit(train.inputs, train.labels, n_outputs, &self.forest, seed)?;
        Ok((ModelState::Forest(forest), FitReport::default()))
    }

    fn scores(&self, model: &ModelState, input: &[f64]) -> Result<Vec<f64>> {
        match model {
            ModelState::Forest(forest) => {
                if input.len() != forest.n_features() {
                    return Err(Error::model(format!(
                        "input has {} features, forest expects {}",
                        input.len(),
                        forest.n_features()
                    )));
                }
                Ok(forest.predict_proba(input))
            }
            ModelState::Mlp(_) => Err(Error::model(format!("'{}' was handed an MLP model", self.id))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_structural_params() {
        let params = ParamSet::new().with("Estimators", 20).with("Max depth", 5);
        let t = ForestTrainer::from_params("rf", TrainingStrategy::Multiclass, params).unwrap();
        assert_eq!(t.forest_params().n_estimators, 20);
        assert_eq!(t.forest_params().tree.max_depth, Some(5));

        let unbounded = ForestTrainer::from_params(
            "rf",
            TrainingStrategy::Multiclass,
            ParamSet::new().with("Estimators", 3),
        )
        .unwrap();
        assert_eq!(unbounded.forest_params().tree.max_depth, None);

        let missing = ForestTrainer::from_params("rf", TrainingStrategy::Multiclass, ParamSet::new());
        assert!(matches!(missing, Err(Error::Config(_))));
    }

    #[test]
    fn rejects_foreign_model_state() {
        let params = ParamSet::new().with("Estimators", 2);
        let t = ForestTrainer::from_params("rf", TrainingStrategy::Multiclass, params).unwrap();
        let inputs = vec![vec![0.0], vec![1.0]];
        let labels = vec![0, 1];
        let set = LabeledSet::new(&inputs, &labels);
        let (model, _) = t.fit_model(&set, &set, 2, 0).unwrap();
        assert_eq!(t.scores(&model, &[0.0]).unwrap().len(), 2);
        assert!(t.scores(&model, &[0.0, 1.0]).is_err());
    }
}
