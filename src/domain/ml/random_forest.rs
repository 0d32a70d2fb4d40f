//! Bagged ensemble of decision trees.

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;

use super::dataset::bootstrap_indices;
use super::decision_tree::{DecisionTree, TreeConfig};
use super::{Classifier, ModelError, check_training_data};

#[derive(Debug, Clone, PartialEq)]
pub struct ForestConfig {
    pub n_trees: usize,
    pub max_depth: usize,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    /// Defaults to ceil(sqrt(n_features)).
    pub max_features: Option<usize>,
    pub seed: u64,
}

impl Default for ForestConfig {
    fn default() -> Self {
        ForestConfig {
            n_trees: 100,
            max_depth: 6,
            min_samples_split: 10,
            min_samples_leaf: 5,
            max_features: None,
            seed: 42,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RandomForest {
    config: ForestConfig,
    trees: Vec<DecisionTree>,
    importances: Vec<f64>,
}

impl RandomForest {
    pub fn new(config: ForestConfig) -> Self {
        RandomForest {
            config,
            trees: Vec::new(),
            importances: Vec::new(),
        }
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }
}

impl Classifier for RandomForest {
    fn fit(&mut self, features: &[Vec<f64>], labels: &[f64]) -> Result<(), ModelError> {
        check_training_data(features, labels)?;
        let n_features = features[0].len();
        let max_features = self
            .config
            .max_features
            .unwrap_or_else(|| (n_features as f64).sqrt().ceil() as usize);

        let config = &self.config;
        let trees: Vec<DecisionTree> = (0..config.n_trees.max(1))
            .into_par_iter()
            .map(|i| {
                let seed = config.seed.wrapping_add(i as u64);
                let mut rng = ChaCha8Rng::seed_from_u64(seed);
                let sample = bootstrap_indices(features.len(), &mut rng);
                let mut tree = DecisionTree::new(TreeConfig {
                    max_depth: config.max_depth,
                    min_samples_split: config.min_samples_split,
                    min_samples_leaf: config.min_samples_leaf,
                    max_features: Some(max_features),
                    seed,
                });
                tree.fit_indices(features, labels, &sample);
                tree
            })
            .collect();

        let mut importances = vec![0.0; n_features];
        for tree in &trees {
            for (acc, imp) in importances.iter_mut().zip(tree.raw_importances()) {
                *acc += imp;
            }
        }
        let sum: f64 = importances.iter().sum();
        if sum > 0.0 {
            for imp in &mut importances {
                *imp /= sum;
            }
        }

        log::debug!(
            "fitted random forest: {} trees on {} rows",
            trees.len(),
            features.len()
        );
        self.trees = trees;
        self.importances = importances;
        Ok(())
    }

    /// Mean of the trees' leaf probabilities.
    fn predict_proba(&self, row: &[f64]) -> f64 {
        if self.trees.is_empty() {
            return 0.5;
        }
        self.trees.iter().map(|t| t.predict_proba(row)).sum::<f64>() / self.trees.len() as f64
    }

    fn feature_importances(&self) -> Vec<f64> {
        self.importances.clone()
    }
}
