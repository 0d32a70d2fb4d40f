//! Forward-chaining cross-validation and binary classification metrics.

use serde::Serialize;
use std::ops::Range;

#[derive(Debug, Clone, PartialEq)]
pub struct Split {
    pub train: Range<usize>,
    pub test: Range<usize>,
}

/// Expanding-window splits over `n` time-ordered rows.
///
/// Rows are cut into `folds + 1` chunks; fold k trains on chunks `0..=k-1`
/// and tests on chunk k. The last test chunk absorbs the remainder.
pub fn time_series_splits(n: usize, folds: usize) -> Vec<Split> {
    if folds == 0 {
        return Vec::new();
    }
    let chunk = n / (folds + 1);
    if chunk == 0 {
        return Vec::new();
    }
    (1..=folds)
        .map(|k| {
            let test_start = k * chunk;
            let test_end = if k == folds { n } else { test_start + chunk };
            Split {
                train: 0..test_start,
                test: test_start..test_end,
            }
        })
        .collect()
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct ConfusionMatrix {
    pub tp: usize,
    pub tn: usize,
    pub fp: usize,
    pub fn_: usize,
}

impl ConfusionMatrix {
    pub fn from_probabilities(labels: &[f64], probs: &[f64], threshold: f64) -> Self {
        let mut cm = ConfusionMatrix::default();
        for (&y, &p) in labels.iter().zip(probs) {
            match (y >= 0.5, p >= threshold) {
                (true, true) => cm.tp += 1,
                (false, false) => cm.tn += 1,
                (false, true) => cm.fp += 1,
                (true, false) => cm.fn_ += 1,
            }
        }
        cm
    }

    pub fn total(&self) -> usize {
        self.tp + self.tn + self.fp + self.fn_
    }
}

fn ratio(num: usize, denom: usize) -> f64 {
    if denom == 0 { 0.0 } else { num as f64 / denom as f64 }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct ClassificationMetrics {
    pub accuracy: f64,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    /// Accuracy of always predicting the majority class of the evaluated rows.
    pub baseline_accuracy: f64,
    pub support: usize,
}

impl ClassificationMetrics {
    pub fn compute(labels: &[f64], probs: &[f64], threshold: f64) -> Self {
        let cm = ConfusionMatrix::from_probabilities(labels, probs, threshold);
        let total = cm.total();
        let precision = ratio(cm.tp, cm.tp + cm.fp);
        let recall = ratio(cm.tp, cm.tp + cm.fn_);
        let f1 = if precision + recall > 0.0 {
            2.0 * precision * recall / (precision + recall)
        } else {
            0.0
        };
        let positives = cm.tp + cm.fn_;
        ClassificationMetrics {
            accuracy: ratio(cm.tp + cm.tn, total),
            precision,
            recall,
            f1,
            baseline_accuracy: ratio(positives.max(total - positives), total),
            support: total,
        }
    }

    /// Unweighted mean over folds.
    pub fn mean(folds: &[ClassificationMetrics]) -> Self {
        if folds.is_empty() {
            return Self::default();
        }
        let n = folds.len() as f64;
        let avg = |f: fn(&ClassificationMetrics) -> f64| folds.iter().map(f).sum::<f64>() / n;
        ClassificationMetrics {
            accuracy: avg(|m| m.accuracy),
            precision: avg(|m| m.precision),
            recall: avg(|m| m.recall),
            f1: avg(|m| m.f1),
            baseline_accuracy: avg(|m| m.baseline_accuracy),
            support: folds.iter().map(|m| m.support).sum(),
        }
    }
}
