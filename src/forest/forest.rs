use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Serialize, Deserialize};

use crate::error::{Error, Result};
use crate::forest::tree::{DecisionTree, TreeParams};

/// Hyperparameters of a random forest. All of them are structural: the forest
/// is fitted in one call with no intermediate monitoring.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForestParams {
    pub n_estimators: usize,
    pub tree: TreeParams,
    /// Fit each tree on a bootstrap resample of the training set.
    pub bootstrap: bool,
}

impl ForestParams {
    pub fn new(n_estimators: usize, max_depth: Option<usize>) -> Self {
        ForestParams {
            n_estimators,
            tree: TreeParams { max_depth, ..TreeParams::default() },
            bootstrap: true,
        }
    }
}

/// Bagged ensemble of CART trees; predicts the mean leaf distribution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RandomForest {
    trees: Vec<DecisionTree>,
    n_classes: usize,
    n_features: usize,
}

impl RandomForest {
    pub fn fit(
        inputs: &[Vec<f64>],
        labels: &[usize],
        n_classes: usize,
        params: &ForestParams,
        seed: u64,
    ) -> Result<RandomForest> {
        if params.n_estimators == 0 {
            return Err(Error::model("a forest needs at least one estimator"));
        }
        if inputs.is_empty() {
            return Err(Error::model("cannot fit a forest on an empty training set"));
        }
        if inputs.len() != labels.len() {
            return Err(Error::model(format!(
                "{} inputs but {} labels", inputs.len(), labels.len()
            )));
        }
        let n_features = inputs[0].len();
        if let Some(row) = inputs.iter().position(|r| r.len() != n_features) {
            return Err(Error::model(format!(
                "row {row} has {} features, expected {n_features}", inputs[row].len()
            )));
        }
        if let Some(&bad) = labels.iter().find(|&&l| l >= n_classes) {
            return Err(Error::model(format!("label {bad} out of range for {n_classes} classes")));
        }

        let mut rng = StdRng::seed_from_u64(seed);
        let n = inputs.len();
        let trees = (0..params.n_estimators)
            .map(|_| {
                let idx: Vec<usize> = if params.bootstrap {
                    (0..n).map(|_| rng.gen_range(0..n)).collect()
                } else {
                    (0..n).collect()
                };
                DecisionTree::fit(inputs, labels, idx, n_classes, &params.tree, &mut rng)
            })
            .collect();

        Ok(RandomForest { trees, n_classes, n_features })
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }

    /// Mean class distribution over all trees.
    pub fn predict_proba(&self, x: &[f64]) -> Vec<f64> {
        let mut acc = vec![0.0; self.n_classes];
        for tree in &self.trees {
            for (a, p) in acc.iter_mut().zip(tree.predict_proba(x)) {
                *a += p;
            }
        }
        let n = self.trees.len().max(1) as f64;
        acc.into_iter().map(|a| a / n).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blobs() -> (Vec<Vec<f64>>, Vec<usize>) {
        let mut inputs = Vec::new();
        let mut labels = Vec::new();
        for i in 0..60 {
            let class = i % 3;
            let jitter = ((i as f64) * 1.7).sin() * 0.2;
            inputs.push(vec![class as f64 + jitter, 1.0 - class as f64 + jitter]);
            labels.push(class);
        }
        (inputs, labels)
    }

    #[test]
    fn fits_separable_blobs() {
        let (inputs, labels) = blobs();
        let forest = RandomForest::fit(&inputs, &labels, 3, &ForestParams::new(10, Some(5)), 4).unwrap();
        let correct = inputs.iter().zip(labels.iter())
            .filter(|(x, y)| {
                let y = **y;
                let p = forest.predict_proba(x);
                (0..3).all(|c| c == y || p[c] < p[y])
            })
            .count();
        assert!(correct >= 57, "only {correct}/60 correct");
    }

    #[test]
    fn same_seed_same_forest() {
        let (inputs, labels) = blobs();
        let params = ForestParams::new(5, Some(3));
        let a = RandomForest::fit(&inputs, &labels, 3, &params, 21).unwrap();
        let b = RandomForest::fit(&inputs, &labels, 3, &params, 21).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn rejects_out_of_range_labels() {
        let err = RandomForest::fit(&[vec![0.0]], &[3], 2, &ForestParams::new(1, None), 0);
        assert!(err.is_err());
    }
}
