//! Feature matrix with binary labels.

use chrono::NaiveDate;
use rand::Rng;
use rand_chacha::ChaCha8Rng;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dataset {
    pub feature_names: Vec<String>,
    pub features: Vec<Vec<f64>>,
    /// 1.0 when the next bar closed higher, else 0.0.
    pub labels: Vec<f64>,
    pub dates: Vec<NaiveDate>,
    pub symbols: Vec<String>,
}

impl Dataset {
    pub fn new(feature_names: Vec<String>) -> Self {
        Dataset {
            feature_names,
            ..Default::default()
        }
    }

    pub fn push(&mut self, symbol: &str, date: NaiveDate, row: Vec<f64>, label: f64) {
        self.symbols.push(symbol.to_string());
        self.dates.push(date);
        self.features.push(row);
        self.labels.push(label);
    }

    pub fn n_samples(&self) -> usize {
        self.features.len()
    }

    pub fn n_features(&self) -> usize {
        self.feature_names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    pub fn positive_rate(&self) -> f64 {
        if self.labels.is_empty() {
            0.0
        } else {
            self.labels.iter().filter(|&&l| l > 0.5).count() as f64 / self.labels.len() as f64
        }
    }

    pub fn has_both_classes(&self) -> bool {
        let positives = self.labels.iter().filter(|&&l| l > 0.5).count();
        positives > 0 && positives < self.labels.len()
    }

    /// Reorders rows by (date, symbol) so index order is time order.
    pub fn sort_chronologically(&mut self) {
        let mut order: Vec<usize> = (0..self.n_samples()).collect();
        order.sort_by(|&a, &b| {
            self.dates[a]
                .cmp(&self.dates[b])
                .then_with(|| self.symbols[a].cmp(&self.symbols[b]))
        });
        *self = self.subset(&order);
    }

    pub fn subset(&self, indices: &[usize]) -> Dataset {
        Dataset {
            feature_names: self.feature_names.clone(),
            features: indices.iter().map(|&i| self.features[i].clone()).collect(),
            labels: indices.iter().map(|&i| self.labels[i]).collect(),
            dates: indices.iter().map(|&i| self.dates[i]).collect(),
            symbols: indices.iter().map(|&i| self.symbols[i].clone()).collect(),
        }
    }

    /// Appends all rows of `other`. Feature names must match.
    pub fn extend(&mut self, other: Dataset) {
        self.features.extend(other.features);
        self.labels.extend(other.labels);
        self.dates.extend(other.dates);
        self.symbols.extend(other.symbols);
    }
}

/// `n` indices drawn with replacement from `0..n`.
pub fn bootstrap_indices(n: usize, rng: &mut ChaCha8Rng) -> Vec<usize> {
    if n == 0 {
        return Vec::new();
    }
    (0..n).map(|_| rng.gen_range(0..n)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, day).unwrap()
    }

    #[test]
    fn sort_chronologically_interleaves_symbols() {
        let mut ds = Dataset::new(vec!["x".into()]);
        ds.push("MSFT", d(2), vec![2.0], 1.0);
        ds.push("AAPL", d(2), vec![1.0], 0.0);
        ds.push("AAPL", d(1), vec![0.0], 1.0);
        ds.sort_chronologically();
        assert_eq!(ds.dates, vec![d(1), d(2), d(2)]);
        assert_eq!(ds.symbols, vec!["AAPL", "AAPL", "MSFT"]);
        assert_eq!(ds.features[1], vec![1.0]);
    }

    #[test]
    fn class_checks() {
        let mut ds = Dataset::new(vec!["x".into()]);
        ds.push("AAPL", d(1), vec![0.0], 1.0);
        assert!(!ds.has_both_classes());
        ds.push("AAPL", d(2), vec![0.0], 0.0);
        assert!(ds.has_both_classes());
        assert!((ds.positive_rate() - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn bootstrap_is_seeded() {
        let a = bootstrap_indices(50, &mut ChaCha8Rng::seed_from_u64(7));
        let b = bootstrap_indices(50, &mut ChaCha8Rng::seed_from_u64(7));
        assert_eq!(a, b);
        assert!(a.iter().all(|&i| i < 50));
    }
}
