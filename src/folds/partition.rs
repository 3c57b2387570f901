use std::collections::BTreeMap;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::dataset::CompiledDataset;
use crate::error::{Error, Result};
use crate::trainer::Subset;

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FoldStrategy {
    /// Shuffle units and deal them into K contiguous chunks.
    KFold,
    /// Shuffle units per class and deal them round-robin, so every fold keeps
    /// the class proportions.
    #[default]
    Stratified,
}

/// Train / validation / test ids of one fold, each sorted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FoldAssignment {
    pub index: usize,
    pub train: Vec<String>,
    pub validation: Vec<String>,
    pub test: Vec<String>,
}

impl FoldAssignment {
    pub fn subset(&self, subset: Subset) -> &[String] {
        match subset {
            Subset::Train => &self.train,
            Subset::Validation => &self.validation,
            Subset::Test => &self.test,
        }
    }

    pub fn len(&self) -> usize {
        self.train.len() + self.validation.len() + self.test.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Deterministic K-fold splitter.
///
/// The unit of assignment is a group when the dataset carries group values,
/// otherwise a single sample, so no group ever straddles two subsets. A
/// group's class is the label of its first sample in id order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FoldPartitioner {
    pub n_folds: usize,
    pub seed: u64,
    /// Share of each fold's training pool carved out for validation, in `[0, 1)`.
    pub validation_fraction: f64,
    pub strategy: FoldStrategy,
}

struct Unit {
    ids: Vec<String>,
    class: usize,
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

impl FoldPartitioner {
    pub fn new(n_folds: usize, seed: u64) -> Self {
        FoldPartitioner {
            n_folds,
            seed,
            validation_fraction: 0.1,
            strategy: FoldStrategy::default(),
        }
    }

    pub fn with_validation_fraction(mut self, fraction: f64) -> Self {
        self.validation_fraction = fraction;
        self
    }

    pub fn with_strategy(mut self, strategy: FoldStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.n_folds < 2 {
            return Err(Error::config(format!("need at least 2 folds, got {}", self.n_folds)));
        }
        if !(0.0..1.0).contains(&self.validation_fraction) {
            return Err(Error::config(format!(
                "validation fraction must be in [0, 1), got {}",
                self.validation_fraction
            )));
        }
        Ok(())
    }

    pub fn partition(&self, dataset: &CompiledDataset) -> Result<Vec<FoldAssignment>> {
        self.validate()?;

        let counts = dataset.class_counts();
        if let Some(empty) = counts.iter().position(|&c| c == 0) {
            return Err(Error::EmptyClass(dataset.class_names[empty].clone()));
        }

        let units = collect_units(dataset);
        if self.n_folds > units.len() {
            return Err(Error::config(format!(
                "{} folds requested but only {} distinct groups are admitted",
                self.n_folds,
                units.len()
            )));
        }

        let fold_of = match self.strategy {
            FoldStrategy::KFold => self.deal_contiguous(units.len()),
            FoldStrategy::Stratified => self.deal_stratified(&units, dataset.n_classes()),
        };

        let folds = (0..self.n_folds)
            .map(|k| self.assemble(k, &units, &fold_of, dataset.n_classes()))
            .collect::<Vec<_>>();

        debug!(
            n_folds = self.n_folds,
            units = units.len(),
            samples = dataset.len(),
            strategy = ?self.strategy,
            "partitioned dataset"
        );
        Ok(folds)
    }

    // -----------------------------------------------------------------------
    // Private helpers
    // -----------------------------------------------------------------------

    fn deal_contiguous(&self, n_units: usize) -> Vec<usize> {
        let mut order: Vec<usize> = (0..n_units).collect();
        order.shuffle(&mut StdRng::seed_from_u64(self.seed));

        let mut fold_of = vec![0; n_units];
        for (pos, &unit) in order.iter().enumerate() {
            fold_of[unit] = pos * self.n_folds / n_units;
        }
        fold_of
    }

    fn deal_stratified(&self, units: &[Unit], n_classes: usize) -> Vec<usize> {
        let mut rng = StdRng::seed_from_u64(self.seed);
        let mut fold_of = vec![0; units.len()];
        let mut offset = 0;
        for class in 0..n_classes {
            let mut members: Vec<usize> = (0..units.len()).filter(|&u| units[u].class == class).collect();
            members.shuffle(&mut rng);
            for (i, &unit) in members.iter().enumerate() {
                fold_of[unit] = (offset + i) % self.n_folds;
            }
            offset = (offset + members.len()) % self.n_folds;
        }
        fold_of
    }

    fn assemble(&self, k: usize, units: &[Unit], fold_of: &[usize], n_classes: usize) -> FoldAssignment {
        let pool: Vec<usize> = (0..units.len()).filter(|&u| fold_of[u] != k).collect();
        let mut rng = StdRng::seed_from_u64(self.seed.wrapping_add(k as u64 + 1));

        let mut validation_units = Vec::new();
        match self.strategy {
            FoldStrategy::KFold => {
                let mut shuffled = pool.clone();
                shuffled.shuffle(&mut rng);
                let n_val = self.carve_size(shuffled.len());
                validation_units.extend_from_slice(&shuffled[..n_val]);
            }
            FoldStrategy::Stratified => {
                for class in 0..n_classes {
                    let mut members: Vec<usize> =
                        pool.iter().copied().filter(|&u| units[u].class == class).collect();
                    members.shuffle(&mut rng);
                    let n_val = self.carve_size(members.len());
                    validation_units.extend_from_slice(&members[..n_val]);
                }
            }
        }

        let mut is_validation = vec![false; units.len()];
        for &u in &validation_units {
            is_validation[u] = true;
        }

        let mut train = Vec::new();
        let mut validation = Vec::new();
        let mut test = Vec::new();
        for (u, unit) in units.iter().enumerate() {
            let dest = if fold_of[u] == k {
                &mut test
            } else if is_validation[u] {
                &mut validation
            } else {
                &mut train
            };
            dest.extend(unit.ids.iter().cloned());
        }
        train.sort();
        validation.sort();
        test.sort();

        FoldAssignment { index: k, train, validation, test }
    }

    /// Units to move into validation, leaving at least one for training.
    fn carve_size(&self, pool: usize) -> usize {
        let wanted = (pool as f64 * self.validation_fraction).round() as usize;
        wanted.min(pool.saturating_sub(1))
    }
}

fn collect_units(dataset: &CompiledDataset) -> Vec<Unit> {
    let mut by_key: BTreeMap<&str, Unit> = BTreeMap::new();
    for sample in &dataset.samples {
        let key = sample.group.as_deref().unwrap_or(sample.id.as_str());
        by_key
            .entry(key)
            .or_insert_with(|| Unit { ids: Vec::new(), class: sample.label })
            .ids
            .push(sample.id.clone());
    }
    by_key.into_values().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::LabeledSample;

    fn dataset(n: usize, n_classes: usize, group_size: Option<usize>) -> CompiledDataset {
        let mut samples: Vec<LabeledSample> = (0..n)
            .map(|i| LabeledSample {
                id: format!("s{i:04}"),
                label: i % n_classes,
                group: group_size.map(|g| format!("g{}", (i / n_classes) / g * n_classes + i % n_classes)),
            })
            .collect();
        samples.sort_by(|a, b| a.id.cmp(&b.id));
        CompiledDataset {
            class_names: (0..n_classes).map(|c| format!("c{c}")).collect(),
            samples,
        }
    }

    #[test]
    fn rejects_bad_fold_counts() {
        let ds = dataset(10, 2, None);
        assert!(matches!(FoldPartitioner::new(1, 0).partition(&ds), Err(Error::Config(_))));
        assert!(matches!(FoldPartitioner::new(11, 0).partition(&ds), Err(Error::Config(_))));
        assert!(FoldPartitioner::new(10, 0).partition(&ds).is_ok());
    }

    #[test]
    fn empty_class_is_named() {
        let mut ds = dataset(10, 2, None);
        ds.class_names.push("Others".into());
        match FoldPartitioner::new(2, 0).partition(&ds) {
            Err(Error::EmptyClass(name)) => assert_eq!(name, "Others"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn fold_count_is_bounded_by_groups() {
        // 4 groups of 5 samples each.
        let ds = dataset(20, 2, Some(5));
        let err = FoldPartitioner::new(5, 0).partition(&ds);
        assert!(matches!(err, Err(Error::Config(_))));
        assert!(FoldPartitioner::new(4, 0).partition(&ds).is_ok());
    }

    #[test]
    fn validation_is_carved_from_training_pool() {
        let ds = dataset(50, 2, None);
        let folds = FoldPartitioner::new(5, 3).with_validation_fraction(0.2).partition(&ds).unwrap();
        for fold in &folds {
            assert_eq!(fold.test.len(), 10);
            assert_eq!(fold.validation.len(), 8);
            assert_eq!(fold.train.len(), 32);
        }
    }

    #[test]
    fn zero_fraction_means_no_validation() {
        let ds = dataset(12, 3, None);
        let folds = FoldPartitioner::new(3, 1)
            .with_validation_fraction(0.0)
            .with_strategy(FoldStrategy::KFold)
            .partition(&ds)
            .unwrap();
        assert!(folds.iter().all(|f| f.validation.is_empty() && f.test.len() == 4));
    }
}
