//! Binary classification tree with gini splits.

use rand::SeedableRng;
use rand::seq::SliceRandom;
use rand_chacha::ChaCha8Rng;

use super::{Classifier, ModelError, check_training_data};

#[derive(Debug, Clone, PartialEq)]
pub struct TreeConfig {
    pub max_depth: usize,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    /// Features considered per split; `None` means all.
    pub max_features: Option<usize>,
    pub seed: u64,
}

impl Default for TreeConfig {
    fn default() -> Self {
        TreeConfig {
            max_depth: 6,
            min_samples_split: 10,
            min_samples_leaf: 5,
            max_features: None,
            seed: 42,
        }
    }
}

#[derive(Debug, Clone)]
enum Node {
    Leaf {
        probability: f64,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: Box<Node>,
        right: Box<Node>,
    },
}

#[derive(Debug, Clone)]
pub struct DecisionTree {
    config: TreeConfig,
    root: Option<Node>,
    importances: Vec<f64>,
}

/// 1 - p² - (1-p)²
fn gini(positives: f64, total: f64) -> f64 {
    if total <= 0.0 {
        return 0.0;
    }
    let p = positives / total;
    2.0 * p * (1.0 - p)
}

struct BestSplit {
    feature: usize,
    threshold: f64,
    gain: f64,
}

impl DecisionTree {
    pub fn new(config: TreeConfig) -> Self {
        DecisionTree {
            config,
            root: None,
            importances: Vec::new(),
        }
    }

    /// Fits on the rows named by `indices` (duplicates allowed, as in a
    /// bootstrap sample). Importances are left unnormalized.
    pub(crate) fn fit_indices(&mut self, features: &[Vec<f64>], labels: &[f64], indices: &[usize]) {
        let n_features = features.first().map_or(0, Vec::len);
        self.importances = vec![0.0; n_features];
        let mut rng = ChaCha8Rng::seed_from_u64(self.config.seed);
        let mut idx = indices.to_vec();
        self.root = Some(self.build(features, labels, &mut idx, 0, &mut rng));
    }

    pub(crate) fn raw_importances(&self) -> &[f64] {
        &self.importances
    }

    pub fn depth(&self) -> usize {
        fn depth(node: &Node) -> usize {
            match node {
                Node::Leaf { .. } => 1,
                Node::Split { left, right, .. } => 1 + depth(left).max(depth(right)),
            }
        }
        self.root.as_ref().map_or(0, depth)
    }

    fn build(
        &mut self,
        features: &[Vec<f64>],
        labels: &[f64],
        indices: &mut [usize],
        depth: usize,
        rng: &mut ChaCha8Rng,
    ) -> Node {
        let n = indices.len() as f64;
        let positives: f64 = indices.iter().map(|&i| labels[i]).sum();
        let probability = if n > 0.0 { positives / n } else { 0.5 };
        let impurity = gini(positives, n);

        if depth >= self.config.max_depth
            || indices.len() < self.config.min_samples_split
            || impurity < 1e-12
        {
            return Node::Leaf { probability };
        }

        let Some(best) = self.find_best_split(features, labels, indices, impurity, rng) else {
            return Node::Leaf { probability };
        };

        self.importances[best.feature] += best.gain * n;

        // Partition in place: rows <= threshold first.
        let mut mid = 0;
        for k in 0..indices.len() {
            if features[indices[k]][best.feature] <= best.threshold {
                indices.swap(k, mid);
                mid += 1;
            }
        }
        let (left_idx, right_idx) = indices.split_at_mut(mid);
        let left = self.build(features, labels, left_idx, depth + 1, rng);
        let right = self.build(features, labels, right_idx, depth + 1, rng);

        Node::Split {
            feature: best.feature,
            threshold: best.threshold,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    /// Sorts each candidate feature once and sweeps midpoints between
    /// distinct values, tracking left-side class counts.
    fn find_best_split(
        &self,
        features: &[Vec<f64>],
        labels: &[f64],
        indices: &[usize],
        parent_impurity: f64,
        rng: &mut ChaCha8Rng,
    ) -> Option<BestSplit> {
        let n_features = self.importances.len();
        let max_features = self
            .config
            .max_features
            .unwrap_or(n_features)
            .clamp(1, n_features.max(1));

        let mut candidates: Vec<usize> = (0..n_features).collect();
        candidates.shuffle(rng);
        candidates.truncate(max_features);

        let n = indices.len();
        let total_pos: f64 = indices.iter().map(|&i| labels[i]).sum();
        let min_leaf = self.config.min_samples_leaf.max(1);
        let mut best: Option<BestSplit> = None;

        for feature in candidates {
            let mut sorted: Vec<(f64, f64)> = indices
                .iter()
                .map(|&i| (features[i][feature], labels[i]))
                .collect();
            sorted.sort_by(|a, b| a.0.total_cmp(&b.0));

            let mut left_pos = 0.0;
            for k in 0..n - 1 {
                left_pos += sorted[k].1;
                let n_left = k + 1;
                let n_right = n - n_left;
                if sorted[k].0 == sorted[k + 1].0 || n_left < min_leaf || n_right < min_leaf {
                    continue;
                }
                let weighted = (n_left as f64 * gini(left_pos, n_left as f64)
                    + n_right as f64 * gini(total_pos - left_pos, n_right as f64))
                    / n as f64;
                let gain = parent_impurity - weighted;
                if gain > best.as_ref().map_or(1e-12, |b| b.gain) {
                    best = Some(BestSplit {
                        feature,
                        threshold: (sorted[k].0 + sorted[k + 1].0) / 2.0,
                        gain,
                    });
                }
            }
        }

        best
    }
}

impl Classifier for DecisionTree {
    fn fit(&mut self, features: &[Vec<f64>], labels: &[f64]) -> Result<(), ModelError> {
        check_training_data(features, labels)?;
        let indices: Vec<usize> = (0..features.len()).collect();
        self.fit_indices(features, labels, &indices);
        let sum: f64 = self.importances.iter().sum();
        if sum > 0.0 {
            for imp in &mut self.importances {
                *imp /= sum;
            }
        }
        Ok(())
    }

    fn predict_proba(&self, row: &[f64]) -> f64 {
        let mut node = match &self.root {
            Some(root) => root,
            None => return 0.5,
        };
        loop {
            match node {
                Node::Leaf { probability } => return *probability,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    let value = row.get(*feature).copied().unwrap_or(0.0);
                    node = if value <= *threshold { left } else { right };
                }
            }
        }
    }

    fn feature_importances(&self) -> Vec<f64> {
        self.importances.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gini_bounds() {
        assert_eq!(gini(0.0, 10.0), 0.0);
        assert_eq!(gini(10.0, 10.0), 0.0);
        assert!((gini(5.0, 10.0) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn separates_threshold_feature() {
        // Feature 0 decides the label; feature 1 is noise.
        let features: Vec<Vec<f64>> = (0..100)
            .map(|i| vec![i as f64, ((i * 37) % 11) as f64])
            .collect();
        let labels: Vec<f64> = (0..100).map(|i| if i >= 50 { 1.0 } else { 0.0 }).collect();

        let mut tree = DecisionTree::new(TreeConfig::default());
        tree.fit(&features, &labels).unwrap();

        assert!(tree.predict_proba(&[10.0, 3.0]) < 0.1);
        assert!(tree.predict_proba(&[90.0, 3.0]) > 0.9);
        let imp = tree.feature_importances();
        assert!((imp.iter().sum::<f64>() - 1.0).abs() < 1e-9);
        assert!(imp[0] > imp[1]);
        assert_eq!(tree.depth(), 2);
    }

    #[test]
    fn unfitted_predicts_half() {
        let tree = DecisionTree::new(TreeConfig::default());
        assert_eq!(tree.predict_proba(&[1.0]), 0.5);
    }

    #[test]
    fn fit_rejects_ragged_rows() {
        let mut tree = DecisionTree::new(TreeConfig::default());
        let err = tree.fit(&[vec![1.0, 2.0], vec![1.0]], &[0.0, 1.0]);
        assert!(err.is_err());
    }
}
