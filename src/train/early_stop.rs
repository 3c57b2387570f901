use serde::{Serialize, Deserialize};

/// Outcome of observing one pass's monitored score.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// New best score; the current parameters become the best state.
    Improved,
    /// No improvement, patience not yet exhausted.
    Stalled,
    /// Patience exhausted; training must halt.
    Stop,
}

/// Patience-based early stopping over a lower-is-better score.
///
/// The tracker is plain data so it can be persisted with a partially trained
/// state and resumed without changing the outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EarlyStopping {
    pub patience: usize,
    pub min_delta: f64,
    best_score: Option<f64>,
    best_epoch: Option<usize>,
    stall: usize,
}

impl EarlyStopping {
    pub fn new(patience: usize, min_delta: f64) -> Self {
        Self {
            patience,
            min_delta,
            best_score: None,
            best_epoch: None,
            stall: 0,
        }
    }

    pub fn best_score(&self) -> Option<f64> {
        self.best_score
    }

    pub fn best_epoch(&self) -> Option<usize> {
        self.best_epoch
    }

    pub fn observe(&mut self, epoch: usize, score: f64) -> Verdict {
        let improved = !score.is_nan()
            && self.best_score.map_or(true, |best| score < best - self.min_delta);

        if improved {
            self.best_score = Some(score);
            self.best_epoch = Some(epoch);
            self.stall = 0;
            return Verdict::Improved;
        }

        self.stall += 1;
        if self.stall >= self.patience {
            Verdict::Stop
        } else {
            Verdict::Stalled
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stops_after_patience_stalls() {
        let mut es = EarlyStopping::new(3, 0.01);
        assert_eq!(es.observe(1, 0.5), Verdict::Improved);
        assert_eq!(es.observe(2, 0.4), Verdict::Improved);
        assert_eq!(es.observe(3, 0.395), Verdict::Stalled); // inside min_delta
        assert_eq!(es.observe(4, 0.4), Verdict::Stalled);
        assert_eq!(es.observe(5, 0.4), Verdict::Stop);
        assert_eq!(es.best_epoch(), Some(2));
    }

    #[test]
    fn nan_never_counts_as_improvement() {
        let mut es = EarlyStopping::new(2, 0.0);
        assert_eq!(es.observe(1, f64::NAN), Verdict::Stalled);
        assert_eq!(es.best_score(), None);
        assert_eq!(es.observe(2, 1.0), Verdict::Improved);
    }
}
