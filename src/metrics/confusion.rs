use std::fmt::Write;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Counts indexed `[truth][prediction]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfusionMatrix {
    counts: Vec<Vec<usize>>,
}

impl ConfusionMatrix {
    pub fn new(n_classes: usize) -> Self {
        ConfusionMatrix { counts: vec![vec![0; n_classes]; n_classes] }
    }

    pub fn from_pairs(n_classes: usize, targets: &[usize], predictions: &[usize]) -> Result<Self> {
        if targets.len() != predictions.len() {
            return Err(Error::metrics(format!(
                "{} targets but {} predictions",
                targets.len(),
                predictions.len()
            )));
        }
        let mut cm = Self::new(n_classes);
        for (&t, &p) in targets.iter().zip(predictions) {
            if t >= n_classes || p >= n_classes {
                return Err(Error::metrics(format!(
                    "pair ({t}, {p}) out of range for {n_classes} classes"
                )));
            }
            cm.counts[t][p] += 1;
        }
        Ok(cm)
    }

    pub fn n_classes(&self) -> usize {
        self.counts.len()
    }

    pub fn count(&self, truth: usize, prediction: usize) -> usize {
        self.counts[truth][prediction]
    }

    pub fn total(&self) -> usize {
        self.counts.iter().flatten().sum()
    }

    /// Samples whose ground truth is `class`.
    pub fn support(&self, class: usize) -> usize {
        self.counts[class].iter().sum()
    }

    pub fn predicted(&self, class: usize) -> usize {
        self.counts.iter().map(|row| row[class]).sum()
    }

    /// Adds `other`'s counts; both must have the same classes.
    pub fn merge(&mut self, other: &ConfusionMatrix) -> Result<()> {
        if other.n_classes() != self.n_classes() {
            return Err(Error::metrics(format!(
                "cannot merge a {0}x{0} matrix into a {1}x{1} one",
                other.n_classes(),
                self.n_classes()
            )));
        }
        for (row, other_row) in self.counts.iter_mut().zip(&other.counts) {
            for (c, o) in row.iter_mut().zip(other_row) {
                *c += o;
            }
        }
        Ok(())
    }

    pub fn accuracy(&self) -> f64 {
        let total = self.total();
        if total == 0 {
            return 0.0;
        }
        let hits: usize = (0..self.n_classes()).map(|c| self.counts[c][c]).sum();
        hits as f64 / total as f64
    }

    pub fn recall(&self, class: usize) -> f64 {
        ratio(self.counts[class][class], self.support(class))
    }

    pub fn precision(&self, class: usize) -> f64 {
        ratio(self.counts[class][class], self.predicted(class))
    }

    pub fn f1(&self, class: usize) -> f64 {
        let (p, r) = (self.precision(class), self.recall(class));
        if p + r == 0.0 {
            0.0
        } else {
            2.0 * p * r / (p + r)
        }
    }

    /// Mean recall over classes present in the ground truth.
    pub fn balanced_accuracy(&self) -> f64 {
        let recalls = self.supported_recalls();
        if recalls.is_empty() {
            return 0.0;
        }
        recalls.iter().sum::<f64>() / recalls.len() as f64
    }

    /// Mean F1 over classes present in the ground truth.
    pub fn macro_f1(&self) -> f64 {
        let scores: Vec<f64> = (0..self.n_classes())
            .filter(|&c| self.support(c) > 0)
            .map(|c| self.f1(c))
            .collect();
        if scores.is_empty() {
            return 0.0;
        }
        scores.iter().sum::<f64>() / scores.len() as f64
    }

    /// Sum-product index: `sqrt(mean(recall) * geometric_mean(recall))`.
    /// Collapses to zero as soon as one class is never recognized.
    pub fn sp_index(&self) -> f64 {
        let recalls = self.supported_recalls();
        if recalls.is_empty() {
            return 0.0;
        }
        let n = recalls.len() as f64;
        let mean = recalls.iter().sum::<f64>() / n;
        let geo = recalls.iter().product::<f64>().powf(1.0 / n);
        (mean * geo).sqrt()
    }

    /// Plain-text table, truth on rows and predictions on columns.
    pub fn render(&self, class_names: &[String]) -> String {
        let name = |c: usize| class_names.get(c).cloned().unwrap_or_else(|| c.to_string());
        let label_w = (0..self.n_classes()).map(|c| name(c).len()).max().unwrap_or(0).max(5);
        let cell_w = (0..self.n_classes())
            .map(|c| name(c).len())
            .chain(self.counts.iter().flatten().map(|v| v.to_string().len()))
            .max()
            .unwrap_or(1);

        let mut out = String::new();
        let _ = write!(out, "{:<label_w$}", "truth");
        for c in 0..self.n_classes() {
            let _ = write!(out, " | {:>cell_w$}", name(c));
        }
        out.push('\n');
        for (t, row) in self.counts.iter().enumerate() {
            let _ = write!(out, "{:<label_w$}", name(t));
            for v in row {
                let _ = write!(out, " | {v:>cell_w$}");
            }
            out.push('\n');
        }
        out
    }

    fn supported_recalls(&self) -> Vec<f64> {
        (0..self.n_classes())
            .filter(|&c| self.support(c) > 0)
            .map(|c| self.recall(c))
            .collect()
    }
}

fn ratio(num: usize, den: usize) -> f64 {
    if den == 0 {
        0.0
    } else {
        num as f64 / den as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn scores_a_small_matrix() {
        // truth 0: 3 right, 1 as class 1; truth 1: 2 right.
        let cm = ConfusionMatrix::from_pairs(2, &[0, 0, 0, 0, 1, 1], &[0, 0, 0, 1, 1, 1]).unwrap();
        assert_eq!(cm.total(), 6);
        assert!(close(cm.accuracy(), 5.0 / 6.0));
        assert!(close(cm.recall(0), 0.75));
        assert!(close(cm.precision(1), 2.0 / 3.0));
        assert!(close(cm.balanced_accuracy(), 0.875));
        let expected_sp = (0.875f64 * 0.75f64.sqrt()).sqrt();
        assert!(close(cm.sp_index(), expected_sp));
    }

    #[test]
    fn sp_index_is_zero_when_a_class_is_missed() {
        let cm = ConfusionMatrix::from_pairs(2, &[0, 1], &[0, 0]).unwrap();
        assert_eq!(cm.sp_index(), 0.0);
        assert!(close(cm.balanced_accuracy(), 0.5));
    }

    #[test]
    fn absent_classes_do_not_drag_down_averages() {
        // Class 2 never occurs in the truth and is never predicted.
        let cm = ConfusionMatrix::from_pairs(3, &[0, 0, 1, 1], &[0, 0, 1, 1]).unwrap();
        assert!(close(cm.balanced_accuracy(), 1.0));
        assert!(close(cm.macro_f1(), 1.0));
        assert!(close(cm.sp_index(), 1.0));
    }

    #[test]
    fn merge_sums_counts() {
        let mut a = ConfusionMatrix::from_pairs(2, &[0, 1], &[0, 1]).unwrap();
        let b = ConfusionMatrix::from_pairs(2, &[1], &[0]).unwrap();
        a.merge(&b).unwrap();
        assert_eq!(a.count(1, 0), 1);
        assert_eq!(a.total(), 3);
        assert!(a.merge(&ConfusionMatrix::new(3)).is_err());
    }

    #[test]
    fn rejects_out_of_range_pairs() {
        assert!(ConfusionMatrix::from_pairs(2, &[2], &[0]).is_err());
        assert!(ConfusionMatrix::from_pairs(2, &[0], &[]).is_err());
    }

    #[test]
    fn renders_named_rows() {
        let cm = ConfusionMatrix::from_pairs(2, &[0, 1], &[0, 1]).unwrap();
        let text = cm.render(&["Cargo".into(), "Tug".into()]);
        assert!(text.lines().nth(1).unwrap().starts_with("Cargo"));
        assert_eq!(text.lines().count(), 3);
    }
}
