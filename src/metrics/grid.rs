use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::metrics::confusion::ConfusionMatrix;
use crate::trainer::ParamSet;

// ---------------------------------------------------------------------------
// Metric and summary types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    Accuracy,
    BalancedAccuracy,
    MacroF1,
    SpIndex,
}

impl Metric {
    pub const ALL: [Metric; 4] = [Metric::Accuracy, Metric::BalancedAccuracy, Metric::MacroF1, Metric::SpIndex];

    pub fn evaluate(&self, cm: &ConfusionMatrix) -> f64 {
        match self {
            Metric::Accuracy => cm.accuracy(),
            Metric::BalancedAccuracy => cm.balanced_accuracy(),
            Metric::MacroF1 => cm.macro_f1(),
            Metric::SpIndex => cm.sp_index(),
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Metric::Accuracy => "Accuracy",
            Metric::BalancedAccuracy => "Balanced accuracy",
            Metric::MacroF1 => "Macro F1",
            Metric::SpIndex => "SP index",
        };
        f.pad(name)
    }
}

impl FromStr for Metric {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().replace(['-', ' '], "_").as_str() {
            "accuracy" | "acc" => Ok(Metric::Accuracy),
            "balanced_accuracy" | "bacc" => Ok(Metric::BalancedAccuracy),
            "macro_f1" | "f1" => Ok(Metric::MacroF1),
            "sp_index" | "sp" => Ok(Metric::SpIndex),
            other => Err(Error::config(format!("unknown metric '{other}'"))),
        }
    }
}

/// Across-fold mean and population standard deviation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    pub mean: f64,
    pub std: f64,
    pub n_folds: usize,
}

impl Summary {
    pub fn of(values: &[f64]) -> Summary {
        if values.is_empty() {
            return Summary { mean: 0.0, std: 0.0, n_folds: 0 };
        }
        let n = values.len() as f64;
        let mean = values.iter().sum::<f64>() / n;
        let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
        Summary { mean, std: var.sqrt(), n_folds: values.len() }
    }
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(&format!("{:.4} ± {:.4}", self.mean, self.std))
    }
}

/// What `add` does with a (parameters, fold) pair it already holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DuplicatePolicy {
    #[default]
    Reject,
    Overwrite,
}

// ---------------------------------------------------------------------------
// GridCompiler
// ---------------------------------------------------------------------------

/// Per-fold confusion matrices keyed by parameter tuple.
///
/// Built purely from prediction records; it never touches the cache.
#[derive(Debug, Clone)]
pub struct GridCompiler {
    class_names: Vec<String>,
    duplicates: DuplicatePolicy,
    sort_metric: Metric,
    entries: BTreeMap<ParamSet, BTreeMap<usize, ConfusionMatrix>>,
}

impl GridCompiler {
    pub fn new(class_names: Vec<String>) -> Self {
        GridCompiler {
            class_names,
            duplicates: DuplicatePolicy::default(),
            sort_metric: Metric::Accuracy,
            entries: BTreeMap::new(),
        }
    }

    pub fn with_duplicates(mut self, policy: DuplicatePolicy) -> Self {
        self.duplicates = policy;
        self
    }

    pub fn with_sort_metric(mut self, metric: Metric) -> Self {
        self.sort_metric = metric;
        self
    }

    pub fn class_names(&self) -> &[String] {
        &self.class_names
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn params(&self) -> impl Iterator<Item = &ParamSet> {
        self.entries.keys()
    }

    /// Records one fold's (target, prediction) pairs under `params`.
    pub fn add(&mut self, params: ParamSet, fold: usize, targets: &[usize], predictions: &[usize]) -> Result<()> {
        let cm = ConfusionMatrix::from_pairs(self.class_names.len(), targets, predictions)?;
        let seen = self.entries.get(&params).is_some_and(|folds| folds.contains_key(&fold));
        if seen && self.duplicates == DuplicatePolicy::Reject {
            return Err(Error::DuplicateEntry { params: params.to_string(), fold });
        }
        self.entries.entry(params).or_default().insert(fold, cm);
        Ok(())
    }

    pub fn fold_scores(&self, params: &ParamSet, metric: Metric) -> Vec<f64> {
        self.entries
            .get(params)
            .map(|folds| folds.values().map(|cm| metric.evaluate(cm)).collect())
            .unwrap_or_default()
    }

    pub fn summary(&self, params: &ParamSet, metric: Metric) -> Option<Summary> {
        self.entries
            .contains_key(params)
            .then(|| Summary::of(&self.fold_scores(params, metric)))
    }

    /// Per-class recall summaries, in class order.
    pub fn recall_summary(&self, params: &ParamSet) -> Option<Vec<Summary>> {
        let folds = self.entries.get(params)?;
        Some(
            (0..self.class_names.len())
                .map(|c| Summary::of(&folds.values().map(|cm| cm.recall(c)).collect::<Vec<_>>()))
                .collect(),
        )
    }

    /// Confusion counts summed across folds.
    pub fn confusion(&self, params: &ParamSet) -> Option<ConfusionMatrix> {
        let folds = self.entries.get(params)?;
        let mut total = ConfusionMatrix::new(self.class_names.len());
        for cm in folds.values() {
            total.merge(cm).ok()?;
        }
        Some(total)
    }

    /// Parameter tuples with their `metric` summary, best mean first.
    pub fn ranking(&self, metric: Metric) -> Vec<(&ParamSet, Summary)> {
        let mut ranked: Vec<(&ParamSet, Summary)> = self
            .entries
            .keys()
            .map(|p| (p, Summary::of(&self.fold_scores(p, metric))))
            .collect();
        ranked.sort_by(|a, b| b.1.mean.total_cmp(&a.1.mean));
        ranked
    }

    /// Summed confusion matrix of every tuple, in ranking order.
    pub fn confusion_report(&self) -> String {
        let mut out = String::new();
        for (params, _) in self.ranking(self.sort_metric) {
            if let Some(cm) = self.confusion(params) {
                out.push_str(&format!("[{params}]\n"));
                out.push_str(&cm.render(&self.class_names));
                out.push('\n');
            }
        }
        out
    }
}

impl fmt::Display for GridCompiler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ranking = self.ranking(self.sort_metric);
        let rows: Vec<(String, Vec<String>)> = ranking
            .iter()
            .map(|(params, _)| {
                let cells = Metric::ALL
                    .iter()
                    .map(|&m| Summary::of(&self.fold_scores(params, m)).to_string())
                    .collect();
                (params.to_string(), cells)
            })
            .collect();

        let header = "Parameters";
        let param_w = rows.iter().map(|(p, _)| p.chars().count()).max().unwrap_or(0).max(header.len());
        let metric_w: Vec<usize> = Metric::ALL
            .iter()
            .enumerate()
            .map(|(i, m)| {
                rows.iter()
                    .map(|(_, c)| c[i].chars().count())
                    .max()
                    .unwrap_or(0)
                    .max(m.to_string().len())
            })
            .collect();

        write!(f, "{header:<param_w$}")?;
        for (m, w) in Metric::ALL.iter().zip(&metric_w) {
            write!(f, " | {m:<w$}", w = *w)?;
        }
        writeln!(f)?;
        for (params, cells) in &rows {
            write!(f, "{params:<param_w$}")?;
            for (cell, w) in cells.iter().zip(&metric_w) {
                write!(f, " | {cell:<w$}", w = *w)?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}
