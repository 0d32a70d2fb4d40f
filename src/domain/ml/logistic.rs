//! Logistic regression trained by batch gradient descent.

use super::{Classifier, ModelError, check_training_data};

#[derive(Debug, Clone, PartialEq)]
pub struct LogisticConfig {
    pub learning_rate: f64,
    pub max_iter: usize,
    pub tolerance: f64,
    /// L2 penalty strength on the coefficients (not the intercept).
    pub l2: f64,
}

impl Default for LogisticConfig {
    fn default() -> Self {
        LogisticConfig {
            learning_rate: 0.1,
            max_iter: 1000,
            tolerance: 1e-7,
            l2: 0.01,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LogisticRegression {
    config: LogisticConfig,
    means: Vec<f64>,
    stds: Vec<f64>,
    coefficients: Vec<f64>,
    intercept: f64,
    pub cost_history: Vec<f64>,
}

fn sigmoid(z: f64) -> f64 {
    if z >= 0.0 {
        1.0 / (1.0 + (-z).exp())
    } else {
        let exp_z = z.exp();
        exp_z / (1.0 + exp_z)
    }
}

fn log_loss(labels: &[f64], probs: &[f64]) -> f64 {
    let eps = 1e-15;
    -labels
        .iter()
        .zip(probs)
        .map(|(&y, &p)| {
            let p = p.clamp(eps, 1.0 - eps);
            y * p.ln() + (1.0 - y) * (1.0 - p).ln()
        })
        .sum::<f64>()
        / labels.len() as f64
}

impl LogisticRegression {
    pub fn new(config: LogisticConfig) -> Self {
        LogisticRegression {
            config,
            means: Vec::new(),
            stds: Vec::new(),
            coefficients: Vec::new(),
            intercept: 0.0,
            cost_history: Vec::new(),
        }
    }

    /// Coefficients on standardized features.
    pub fn coefficients(&self) -> &[f64] {
        &self.coefficients
    }

    fn standardize(&self, row: &[f64]) -> Vec<f64> {
        row.iter()
            .zip(self.means.iter().zip(&self.stds))
            .map(|(x, (m, s))| (x - m) / s)
            .collect()
    }

    fn linear(&self, z_row: &[f64]) -> f64 {
        self.intercept
            + z_row
                .iter()
                .zip(&self.coefficients)
                .map(|(x, w)| x * w)
                .sum::<f64>()
    }
}

impl Classifier for LogisticRegression {
    fn fit(&mut self, features: &[Vec<f64>], labels: &[f64]) -> Result<(), ModelError> {
        check_training_data(features, labels)?;
        let n = features.len() as f64;
        let n_features = features[0].len();

        self.means = (0..n_features)
            .map(|j| features.iter().map(|r| r[j]).sum::<f64>() / n)
            .collect();
        self.stds = (0..n_features)
            .map(|j| {
                let m = self.means[j];
                let var = features.iter().map(|r| (r[j] - m).powi(2)).sum::<f64>() / n;
                let sd = var.sqrt();
                if sd > 1e-12 { sd } else { 1.0 }
            })
            .collect();

        let z: Vec<Vec<f64>> = features.iter().map(|r| self.standardize(r)).collect();
        self.coefficients = vec![0.0; n_features];
        self.intercept = 0.0;
        self.cost_history.clear();

        for iter in 0..self.config.max_iter {
            let probs: Vec<f64> = z.iter().map(|r| sigmoid(self.linear(r))).collect();

            let mut grad = vec![0.0; n_features];
            let mut grad_b = 0.0;
            for ((row, &p), &y) in z.iter().zip(&probs).zip(labels) {
                let err = p - y;
                grad_b += err;
                for (g, x) in grad.iter_mut().zip(row) {
                    *g += err * x;
                }
            }
            for (g, w) in grad.iter_mut().zip(&self.coefficients) {
                *g = *g / n + self.config.l2 * w;
            }
            grad_b /= n;

            for (w, g) in self.coefficients.iter_mut().zip(&grad) {
                *w -= self.config.learning_rate * g;
            }
            self.intercept -= self.config.learning_rate * grad_b;

            let cost = log_loss(labels, &probs);
            self.cost_history.push(cost);
            if iter > 0 && (self.cost_history[iter - 1] - cost).abs() < self.config.tolerance {
                log::debug!("logistic regression converged at iteration {iter}");
                break;
            }
        }

        Ok(())
    }

    fn predict_proba(&self, row: &[f64]) -> f64 {
        if self.coefficients.is_empty() {
            return 0.5;
        }
        sigmoid(self.linear(&self.standardize(row)))
    }

    /// |coefficient| on standardized inputs, normalized to sum to 1.
    fn feature_importances(&self) -> Vec<f64> {
        let abs: Vec<f64> = self.coefficients.iter().map(|w| w.abs()).collect();
        let sum: f64 = abs.iter().sum();
        if sum > 0.0 {
            abs.iter().map(|w| w / sum).collect()
        } else {
            abs
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sigmoid_is_stable() {
        assert!((sigmoid(0.0) - 0.5).abs() < 1e-12);
        assert!(sigmoid(-1000.0).is_finite());
        assert!(sigmoid(1000.0) <= 1.0);
    }

    #[test]
    fn learns_linear_boundary() {
        let features: Vec<Vec<f64>> = (0..200)
            .map(|i| vec![i as f64 - 100.0, ((i * 7) % 5) as f64])
            .collect();
        let labels: Vec<f64> = (0..200).map(|i| if i >= 100 { 1.0 } else { 0.0 }).collect();

        let mut model = LogisticRegression::new(LogisticConfig::default());
        model.fit(&features, &labels).unwrap();

        assert!(model.predict_proba(&[-80.0, 2.0]) < 0.2);
        assert!(model.predict_proba(&[80.0, 2.0]) > 0.8);
        assert!(model.coefficients()[0] > 0.0);

        let imp = model.feature_importances();
        assert!((imp.iter().sum::<f64>() - 1.0).abs() < 1e-9);
        assert!(imp[0] > imp[1]);

        let first = model.cost_history[0];
        let last = *model.cost_history.last().unwrap();
        assert!(last < first);
    }

    #[test]
    fn constant_feature_does_not_blow_up() {
        let features: Vec<Vec<f64>> = (0..20).map(|i| vec![1.0, i as f64]).collect();
        let labels: Vec<f64> = (0..20).map(|i| (i % 2) as f64).collect();
        let mut model = LogisticRegression::new(LogisticConfig::default());
        model.fit(&features, &labels).unwrap();
        assert!(model.predict_proba(&[1.0, 5.0]).is_finite());
    }
}
