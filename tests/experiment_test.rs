use std::cell::Cell;
use std::path::Path;
use std::rc::Rc;

use hydrofold::dataset::Record;
use hydrofold::experiment::{ArtifactStore, CellState, ConfigLookup};
use hydrofold::train::IterativeConfig;
use hydrofold::trainer::{FitReport, LabeledSet, ModelState};
use hydrofold::{
    DatasetDescriptor, Error, ExperimentConfig, ExperimentManager, FeatureTable, ForestTrainer,
    LabelTarget, MismatchPolicy, MlpTrainer, ParamSet, ProcessorSettings, Result, RowFilter, Subset,
    Trainer, TrainingStrategy,
};

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

const CLASSES: [&str; 3] = ["A", "B", "C"];

fn sample_id(i: usize) -> String {
    format!("s{i:02}")
}

/// Rows the feature table covers; catalogs may list fewer.
const N_FEATURE_ROWS: usize = 45;

fn catalog() -> Vec<Record> {
    catalog_of(30)
}

fn catalog_of(n: usize) -> Vec<Record> {
    (0..n)
        .map(|i| {
            Record::new(sample_id(i))
                .with("Class", CLASSES[i % 3])
                .with("Rain", if i % 5 == 0 { "yes" } else { "no" })
        })
        .collect()
}

fn features() -> Box<FeatureTable> {
    let rows = (0..N_FEATURE_ROWS).map(|i| {
        (sample_id(i), vec![(i % 3) as f64 * 10.0 + i as f64 * 0.01, (i % 7) as f64])
    });
    Box::new(FeatureTable::from_rows(ProcessorSettings::default(), rows).unwrap())
}

fn config(base: &Path) -> ExperimentConfig {
    let target = LabelTarget::new("Class", CLASSES, false);
    ExperimentConfig::new(
        "synthetic",
        DatasetDescriptor::new("synthetic", target),
        ProcessorSettings::default(),
        base.join("trainings"),
    )
    .with_n_folds(3)
    .with_validation_fraction(0.2)
}

/// Forest trainer that counts fits and can be told to fail for one seed.
struct Counting {
    inner: ForestTrainer,
    fits: Rc<Cell<usize>>,
    fail_on_seed: Option<u64>,
}

impl Trainer for Counting {
    fn id(&self) -> &str {
        self.inner.id()
    }

    fn strategy(&self) -> TrainingStrategy {
        self.inner.strategy()
    }

    fn params(&self) -> &ParamSet {
        self.inner.params()
    }

    fn fingerprint(&self) -> Result<String> {
        self.inner.fingerprint()
    }

    fn validate(&self) -> Result<()> {
        self.inner.validate()
    }

    fn fit_model(
        &self,
        train: &LabeledSet<'_>,
        validation: &LabeledSet<'_>,
        n_outputs: usize,
        seed: u64,
    ) -> Result<(ModelState, FitReport)> {
        if self.fail_on_seed == Some(seed) {
            return Err(Error::model("injected failure"));
        }
        self.fits.set(self.fits.get() + 1);
        self.inner.fit_model(train, validation, n_outputs, seed)
    }

    fn scores(&self, model: &ModelState, input: &[f64]) -> Result<Vec<f64>> {
        self.inner.scores(model, input)
    }
}

fn forest(id: &str, estimators: i64, strategy: TrainingStrategy, fits: &Rc<Cell<usize>>) -> Box<dyn Trainer> {
    let params = ParamSet::new().with("Estimators", estimators).with("Max depth", 4);
    Box::new(Counting {
        inner: ForestTrainer::from_params(id, strategy, params).unwrap(),
        fits: Rc::clone(fits),
        fail_on_seed: None,
    })
}

fn manager(base: &Path, trainers: Vec<Box<dyn Trainer>>) -> ExperimentManager {
    ExperimentManager::new(config(base), &catalog(), features(), trainers).unwrap()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[test]
fn second_run_reuses_every_cell() {
    let dir = tempfile::tempdir().unwrap();
    let fits = Rc::new(Cell::new(0));

    let first = manager(
        dir.path(),
        vec![
            forest("rf_multi", 5, TrainingStrategy::Multiclass, &fits),
            forest("rf_ovr", 5, TrainingStrategy::ClassSpecific, &fits),
        ],
    );
    let results = first.run(None).unwrap();
    // 3 folds: one multiclass model plus three class models each.
    assert_eq!(fits.get(), 3 * (1 + 3));
    assert_eq!(first.cell_state("rf_ovr", 2), CellState::PredictionsCached);

    let test_multi = &results[&(Subset::Test, TrainingStrategy::Multiclass)]["rf_multi"];
    assert_eq!(test_multi.iter().map(|r| r.fold).collect::<Vec<_>>(), vec![0, 1, 2]);
    let tested: usize = test_multi.iter().map(|r| r.targets.len()).sum();
    assert_eq!(tested, 30);

    fits.set(0);
    let second = manager(
        dir.path(),
        vec![
            forest("rf_multi", 5, TrainingStrategy::Multiclass, &fits),
            forest("rf_ovr", 5, TrainingStrategy::ClassSpecific, &fits),
        ],
    );
    let again = second.run(None).unwrap();
    assert_eq!(fits.get(), 0);
    assert_eq!(again, results);
}

#[test]
fn compile_before_run_reports_not_computed() {
    let dir = tempfile::tempdir().unwrap();
    let fits = Rc::new(Cell::new(0));
    let m = manager(dir.path(), vec![forest("rf", 5, TrainingStrategy::Multiclass, &fits)]);

    match m.compile_results(Subset::Validation, None, None) {
        Err(Error::NotComputed { trainer_id, fold, subset }) => {
            assert_eq!(trainer_id, "rf");
            assert_eq!(fold, 0);
            assert_eq!(subset, Subset::Validation);
        }
        other => panic!("unexpected {other:?}"),
    }

    let run = m.run(Some(&[1])).unwrap();
    let compiled = m.compile_results(Subset::Test, Some(&[1]), Some(&["rf"])).unwrap();
    assert_eq!(
        compiled[&(Subset::Test, TrainingStrategy::Multiclass)],
        run[&(Subset::Test, TrainingStrategy::Multiclass)]
    );
    assert!(m.compile_results(Subset::Test, Some(&[0]), None).is_err());
    assert!(matches!(m.compile_results(Subset::Test, Some(&[7]), None), Err(Error::Config(_))));
}

#[test]
fn changed_trainer_under_same_id_is_stale_then_retrained() {
    let dir = tempfile::tempdir().unwrap();
    let fits = Rc::new(Cell::new(0));
    manager(dir.path(), vec![forest("rf", 5, TrainingStrategy::Multiclass, &fits)])
        .run(None)
        .unwrap();

    fits.set(0);
    let changed = manager(dir.path(), vec![forest("rf", 7, TrainingStrategy::Multiclass, &fits)]);
    assert!(matches!(
        changed.compile_results(Subset::Train, None, None),
        Err(Error::StaleArtifact { fold: 0, .. })
    ));

    changed.run(None).unwrap();
    assert_eq!(fits.get(), 3);
    assert!(changed.compile_results(Subset::Train, None, None).is_ok());
}

#[test]
fn grown_catalog_refits_cells_trained_on_other_samples() {
    let dir = tempfile::tempdir().unwrap();
    let fits = Rc::new(Cell::new(0));
    manager(dir.path(), vec![forest("rf", 5, TrainingStrategy::Multiclass, &fits)])
        .run(None)
        .unwrap();
    assert_eq!(fits.get(), 3);

    fits.set(0);
    let grown = ExperimentManager::new(
        config(dir.path()),
        &catalog_of(N_FEATURE_ROWS),
        features(),
        vec![forest("rf", 5, TrainingStrategy::Multiclass, &fits)],
    )
    .unwrap();
    assert!(matches!(
        grown.compile_results(Subset::Test, None, None),
        Err(Error::StaleArtifact { .. })
    ));

    let results = grown.run(None).unwrap();
    assert_eq!(fits.get(), 3);
    let tested: usize = results[&(Subset::Test, TrainingStrategy::Multiclass)]["rf"]
        .iter()
        .map(|r| r.targets.len())
        .sum();
    assert_eq!(tested, N_FEATURE_ROWS);
    assert!(grown.compile_results(Subset::Test, None, None).is_ok());
}

#[test]
fn unreadable_artifact_is_refit() {
    let dir = tempfile::tempdir().unwrap();
    let fits = Rc::new(Cell::new(0));
    let m = manager(dir.path(), vec![forest("rf", 5, TrainingStrategy::Multiclass, &fits)]);
    m.run(None).unwrap();

    let store = ArtifactStore::new(m.config().output_dir());
    std::fs::write(store.artifact_path("rf", 0), "{ \"trainer_id\": ").unwrap();

    fits.set(0);
    m.run(None).unwrap();
    assert_eq!(fits.get(), 1);
    assert_eq!(m.cell_state("rf", 0), CellState::PredictionsCached);
    assert!(m.compile_results(Subset::Test, None, None).is_ok());
}

#[test]
fn override_refits_cached_cells() {
    let dir = tempfile::tempdir().unwrap();
    let fits = Rc::new(Cell::new(0));
    manager(dir.path(), vec![forest("rf", 5, TrainingStrategy::Multiclass, &fits)])
        .run(None)
        .unwrap();
    fits.set(0);
    manager(dir.path(), vec![forest("rf", 5, TrainingStrategy::Multiclass, &fits)])
        .with_override(true)
        .run(Some(&[0]))
        .unwrap();
    assert_eq!(fits.get(), 1);
}

#[test]
fn failed_cell_keeps_earlier_cells_reusable() {
    let dir = tempfile::tempdir().unwrap();
    let fits = Rc::new(Cell::new(0));
    let seed = config(dir.path()).seed;

    let failing = Box::new(Counting {
        inner: ForestTrainer::from_params(
            "rf_bad",
            TrainingStrategy::Multiclass,
            ParamSet::new().with("Estimators", 3),
        )
        .unwrap(),
        fits: Rc::clone(&fits),
        fail_on_seed: Some(seed + 1),
    });
    let m = manager(
        dir.path(),
        vec![forest("rf_good", 5, TrainingStrategy::Multiclass, &fits), failing],
    );

    match m.run(None) {
        Err(Error::Training { trainer_id, fold, .. }) => {
            assert_eq!(trainer_id, "rf_bad");
            assert_eq!(fold, 1);
        }
        other => panic!("unexpected {other:?}"),
    }
    assert_eq!(m.cell_state("rf_good", 0), CellState::PredictionsCached);
    assert_eq!(m.cell_state("rf_good", 1), CellState::PredictionsCached);
    assert_eq!(m.cell_state("rf_bad", 0), CellState::PredictionsCached);
    assert_eq!(m.cell_state("rf_bad", 1), CellState::NotStarted);
    assert_eq!(m.cell_state("rf_good", 2), CellState::NotStarted);

    fits.set(0);
    m.run(Some(&[0])).unwrap();
    assert_eq!(fits.get(), 0);
}

#[test]
fn stored_configuration_mismatch_is_distinct_from_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let config_dir = dir.path().join("configs");
    let fits = Rc::new(Cell::new(0));

    assert_eq!(
        ExperimentConfig::lookup(&config_dir, &config(dir.path())).unwrap(),
        ConfigLookup::NotFound
    );
    ExperimentManager::open(
        config(dir.path()),
        &config_dir,
        MismatchPolicy::Fail,
        &catalog(),
        features(),
        vec![forest("rf", 5, TrainingStrategy::Multiclass, &fits)],
    )
    .unwrap();
    assert!(config_dir.join("synthetic.json").exists());

    let mut filtered = config(dir.path());
    filtered.dataset = filtered.dataset.with_filter(RowFilter::new("Rain", ["no"]));
    let opened = ExperimentManager::open(
        filtered.clone(),
        &config_dir,
        MismatchPolicy::Fail,
        &catalog(),
        features(),
        vec![forest("rf", 5, TrainingStrategy::Multiclass, &fits)],
    );
    match opened {
        Err(Error::ConfigMismatch { fields, .. }) => assert_eq!(fields, vec!["dataset.filters"]),
        Err(other) => panic!("unexpected {other:?}"),
        Ok(_) => panic!("mismatch was accepted"),
    }

    let rebuilt = ExperimentManager::open(
        filtered,
        &config_dir,
        MismatchPolicy::Rebuild,
        &catalog(),
        features(),
        vec![forest("rf", 5, TrainingStrategy::Multiclass, &fits)],
    )
    .unwrap();
    // Every fifth sample is rainy.
    assert_eq!(rebuilt.dataset().len(), 24);
}

#[test]
fn rejects_invalid_setups_before_training() {
    let dir = tempfile::tempdir().unwrap();
    let fits = Rc::new(Cell::new(0));

    let dup = ExperimentManager::new(
        config(dir.path()),
        &catalog(),
        features(),
        vec![
            forest("rf", 5, TrainingStrategy::Multiclass, &fits),
            forest("rf", 6, TrainingStrategy::Multiclass, &fits),
        ],
    );
    assert!(matches!(dup, Err(Error::Config(_))));

    let mut missing = config(dir.path());
    missing.dataset.target = LabelTarget::new("Class", ["A", "B", "Z"], false);
    let empty = ExperimentManager::new(
        missing,
        &catalog(),
        features(),
        vec![forest("rf", 5, TrainingStrategy::Multiclass, &fits)],
    );
    assert!(matches!(empty, Err(Error::EmptyClass(name)) if name == "Z"));

    // Zero patience is rejected before the forest gets a chance to fit.
    let mlp = MlpTrainer::from_params(
        "mlp",
        TrainingStrategy::Multiclass,
        ParamSet::new().with("Neurons", 4),
        IterativeConfig::new(5, 4, 0),
    )
    .unwrap();
    let bad_mlp = ExperimentManager::new(
        config(dir.path()),
        &catalog(),
        features(),
        vec![forest("rf", 5, TrainingStrategy::Multiclass, &fits), Box::new(mlp)],
    );
    assert!(matches!(bad_mlp, Err(Error::Config(msg)) if msg.contains("patience")));
    assert_eq!(fits.get(), 0);
}

#[test]
fn grid_is_keyed_by_trainer_params() {
    let dir = tempfile::tempdir().unwrap();
    let fits = Rc::new(Cell::new(0));
    let m = manager(
        dir.path(),
        vec![
            forest("rf_5", 5, TrainingStrategy::Multiclass, &fits),
            forest("rf_9", 9, TrainingStrategy::Multiclass, &fits),
        ],
    );
    let results = m.run(None).unwrap();
    let grid = m.grid(&results, Subset::Test, TrainingStrategy::Multiclass).unwrap();
    assert_eq!(grid.len(), 2);
    let ranking = grid.ranking(hydrofold::Metric::Accuracy);
    let best = &ranking[0];
    assert_eq!(best.1.n_folds, 3);
    assert!(best.1.mean > 0.9, "separable data scored {}", best.1.mean);
    assert!(m.grid(&results, Subset::Test, TrainingStrategy::ClassSpecific).unwrap().is_empty());
}
