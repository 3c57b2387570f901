use hydrofold::metrics::DuplicatePolicy;
use hydrofold::{Error, GridCompiler, Metric, ParamSet};

fn params(estimators: i64) -> ParamSet {
    ParamSet::new().with("Estimators", estimators).with("Max depth", 5)
}

/// Four samples, two per class; `hits` of them predicted correctly.
fn fold(hits: usize) -> (Vec<usize>, Vec<usize>) {
    let targets = vec![0, 0, 1, 1];
    let predictions = targets
        .iter()
        .enumerate()
        .map(|(i, &t)| if i < hits { t } else { 1 - t })
        .collect();
    (targets, predictions)
}

fn scenario() -> GridCompiler {
    let mut grid = GridCompiler::new(vec!["Cargo".into(), "Tug".into()]);
    for (i, hits) in [2, 3, 4].into_iter().enumerate() {
        let (t, p) = fold(hits);
        grid.add(params(10), i, &t, &p).unwrap();
    }
    for (i, hits) in [4, 4, 3].into_iter().enumerate() {
        let (t, p) = fold(hits);
        grid.add(params(20), i, &t, &p).unwrap();
    }
    grid
}

#[test]
fn prints_three_fold_means_best_first() {
    let grid = scenario();
    let text = grid.to_string();
    let lines: Vec<&str> = text.lines().collect();

    assert_eq!(lines.len(), 3);
    assert!(lines[0].starts_with("Parameters"));
    assert!(lines[0].contains("Accuracy"));
    assert!(lines[1].starts_with("Estimators=20, Max depth=5"));
    assert!(lines[1].contains("0.9167"));
    assert!(lines[2].starts_with("Estimators=10, Max depth=5"));
    assert!(lines[2].contains("0.7500 ± 0.2041"));
}

#[test]
fn ranking_follows_the_chosen_metric() {
    let grid = scenario();
    let ranking = grid.ranking(Metric::Accuracy);
    assert_eq!(ranking[0].0, &params(20));
    assert_eq!(ranking[0].1.n_folds, 3);
    assert!((ranking[0].1.mean - 11.0 / 12.0).abs() < 1e-12);

    let sp = grid.summary(&params(10), Metric::SpIndex).unwrap();
    assert!(sp.mean > 0.0 && sp.mean <= 1.0);
}

#[test]
fn confusion_report_sums_folds() {
    let grid = scenario();
    let cm = grid.confusion(&params(10)).unwrap();
    assert_eq!(cm.total(), 12);
    // 2 + 3 + 4 hits.
    assert_eq!(cm.count(0, 0) + cm.count(1, 1), 9);

    let report = grid.confusion_report();
    let first = report.lines().next().unwrap();
    assert_eq!(first, "[Estimators=20, Max depth=5]");
}

#[test]
fn duplicates_are_rejected_unless_overwriting() {
    let mut grid = scenario();
    let (t, p) = fold(4);
    assert!(matches!(
        grid.add(params(10), 0, &t, &p),
        Err(Error::DuplicateEntry { fold: 0, .. })
    ));

    let mut grid = scenario().with_duplicates(DuplicatePolicy::Overwrite);
    grid.add(params(10), 0, &t, &p).unwrap();
    let acc = grid.summary(&params(10), Metric::Accuracy).unwrap();
    assert!((acc.mean - 11.0 / 12.0).abs() < 1e-12);
}
