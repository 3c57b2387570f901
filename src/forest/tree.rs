use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Serialize, Deserialize};

/// Structural hyperparameters of a single CART tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreeParams {
    /// Maximum depth; `None` grows until leaves are pure or too small.
    pub max_depth: Option<usize>,
    /// Minimum samples a node needs before it is considered for a split.
    pub min_samples_split: usize,
    /// Features examined per split; `None` means `ceil(sqrt(n_features))`.
    pub max_features: Option<usize>,
}

impl Default for TreeParams {
    fn default() -> Self {
        TreeParams { max_depth: None, min_samples_split: 2, max_features: None }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Node {
    /// Class distribution of the training samples that reached the leaf.
    Leaf { distribution: Vec<f64> },
    /// `x[feature] <= threshold` goes left.
    Split { feature: usize, threshold: f64, left: usize, right: usize },
}

/// Gini-impurity classification tree stored as a flat node arena.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionTree {
    nodes: Vec<Node>,
    n_classes: usize,
}

struct SplitCandidate {
    feature: usize,
    threshold: f64,
    impurity: f64,
}

impl DecisionTree {
    /// Grows a tree on the rows of `inputs` listed in `sample_idx`
    /// (repeats allowed, as produced by bootstrapping).
    pub fn fit<R: Rng + ?Sized>(
        inputs: &[Vec<f64>],
        labels: &[usize],
        sample_idx: Vec<usize>,
        n_classes: usize,
        params: &TreeParams,
        rng: &mut R,
    ) -> DecisionTree {
        let mut tree = DecisionTree { nodes: Vec::new(), n_classes };
        tree.grow(inputs, labels, sample_idx, 0, params, rng);
        tree
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn depth(&self) -> usize {
        fn walk(nodes: &[Node], at: usize) -> usize {
            match &nodes[at] {
                Node::Leaf { .. } => 0,
                Node::Split { left, right, .. } => 1 + walk(nodes, *left).max(walk(nodes, *right)),
            }
        }
        if self.nodes.is_empty() { 0 } else { walk(&self.nodes, 0) }
    }

    /// Class distribution of the leaf `x` falls into.
    pub fn predict_proba(&self, x: &[f64]) -> &[f64] {
        let mut at = 0;
        loop {
            match &self.nodes[at] {
                Node::Leaf { distribution } => return distribution,
                Node::Split { feature, threshold, left, right } => {
                    let value = x.get(*feature).copied().unwrap_or(0.0);
                    at = if value <= *threshold { *left } else { *right };
                }
            }
        }
    }

    fn grow<R: Rng + ?Sized>(
        &mut self,
        inputs: &[Vec<f64>],
        labels: &[usize],
        idx: Vec<usize>,
        depth: usize,
        params: &TreeParams,
        rng: &mut R,
    ) -> usize {
        let counts = class_counts(labels, &idx, self.n_classes);
        let node_id = self.nodes.len();
        self.nodes.push(Node::Leaf { distribution: normalize(&counts) });

        let pure = counts.iter().filter(|&&c| c > 0).count() <= 1;
        let too_deep = params.max_depth.is_some_and(|d| depth >= d);
        if pure || too_deep || idx.len() < params.min_samples_split.max(2) {
            return node_id;
        }

        let Some(split) = self.best_split(inputs, labels, &idx, &counts, params, rng) else {
            return node_id;
        };

        let (left_idx, right_idx): (Vec<usize>, Vec<usize>) = idx
            .into_iter()
            .partition(|&i| inputs[i][split.feature] <= split.threshold);

        let left = self.grow(inputs, labels, left_idx, depth + 1, params, rng);
        let right = self.grow(inputs, labels, right_idx, depth + 1, params, rng);
        self.nodes[node_id] = Node::Split {
            feature: split.feature,
            threshold: split.threshold,
            left,
            right,
        };
        node_id
    }

    fn best_split<R: Rng + ?Sized>(
        &self,
        inputs: &[Vec<f64>],
        labels: &[usize],
        idx: &[usize],
        counts: &[usize],
        params: &TreeParams,
        rng: &mut R,
    ) -> Option<SplitCandidate> {
        let n_features = inputs[idx[0]].len();
        let n_try = params.max_features
            .unwrap_or_else(|| (n_features as f64).sqrt().ceil() as usize)
            .clamp(1, n_features.max(1));

        let mut features: Vec<usize> = (0..n_features).collect();
        features.shuffle(rng);
        features.truncate(n_try);
        // Deterministic scan order for tie-breaking between equal impurities.
        features.sort_unstable();

        let parent = gini(counts, idx.len());
        let mut best: Option<SplitCandidate> = None;
        let mut order = idx.to_vec();

        for feature in features {
            order.sort_by(|&a, &b| inputs[a][feature].total_cmp(&inputs[b][feature]));

            let mut left = vec![0usize; self.n_classes];
            let mut right = counts.to_vec();
            for pos in 0..order.len() - 1 {
                let class = labels[order[pos]];
                left[class] += 1;
                right[class] -= 1;

                let here = inputs[order[pos]][feature];
                let next = inputs[order[pos + 1]][feature];
                if here == next {
                    continue;
                }

                let n_left = pos + 1;
                let n_right = order.len() - n_left;
                let impurity = (n_left as f64 * gini(&left, n_left)
                    + n_right as f64 * gini(&right, n_right))
                    / order.len() as f64;

                if impurity < parent - 1e-12
                    && best.as_ref().map_or(true, |b| impurity < b.impurity)
                {
                    best = Some(SplitCandidate {
                        feature,
                        threshold: here + (next - here) / 2.0,
                        impurity,
                    });
                }
            }
        }

        best
    }
}

fn class_counts(labels: &[usize], idx: &[usize], n_classes: usize) -> Vec<usize> {
    let mut counts = vec![0usize; n_classes];
    for &i in idx {
        counts[labels[i]] += 1;
    }
    counts
}

fn normalize(counts: &[usize]) -> Vec<f64> {
    let total: usize = counts.iter().sum();
    if total == 0 {
        return vec![1.0 / counts.len().max(1) as f64; counts.len()];
    }
    counts.iter().map(|&c| c as f64 / total as f64).collect()
}

fn gini(counts: &[usize], total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    let t = total as f64;
    1.0 - counts.iter().map(|&c| (c as f64 / t).powi(2)).sum::<f64>()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, SeedableRng};

    fn stripes() -> (Vec<Vec<f64>>, Vec<usize>) {
        let inputs: Vec<Vec<f64>> = (0..30).map(|i| vec![i as f64, 0.0]).collect();
        let labels = (0..30).map(|i| i / 10).collect();
        (inputs, labels)
    }

    #[test]
    fn separates_thresholded_classes() {
        let (inputs, labels) = stripes();
        let params = TreeParams { max_features: Some(2), ..TreeParams::default() };
        let tree = DecisionTree::fit(
            &inputs, &labels, (0..30).collect(), 3, &params, &mut StdRng::seed_from_u64(0),
        );
        for (x, &y) in inputs.iter().zip(labels.iter()) {
            assert_eq!(tree.predict_proba(x)[y], 1.0);
        }
    }

    #[test]
    fn depth_limit_is_respected() {
        let (inputs, labels) = stripes();
        let params = TreeParams { max_depth: Some(1), max_features: Some(2), ..TreeParams::default() };
        let tree = DecisionTree::fit(
            &inputs, &labels, (0..30).collect(), 3, &params, &mut StdRng::seed_from_u64(0),
        );
        assert_eq!(tree.depth(), 1);
        assert_eq!(tree.node_count(), 3);
    }
}
