//! Next-bar direction classifiers and their evaluation.

pub mod dataset;
pub mod decision_tree;
pub mod evaluation;
pub mod logistic;
pub mod random_forest;

use chrono::NaiveDate;
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

use crate::domain::error::StockportError;
use dataset::Dataset;
use evaluation::{ClassificationMetrics, time_series_splits};
use logistic::{LogisticConfig, LogisticRegression};
use random_forest::{ForestConfig, RandomForest};

pub const MIN_TRAINING_SAMPLES: usize = 60;

#[derive(Debug, Clone, thiserror::Error, PartialEq)]
pub enum ModelError {
    #[error("no training rows")]
    Empty,

    #[error("{features} feature rows but {labels} labels")]
    LengthMismatch { features: usize, labels: usize },

    #[error("row {row} has {got} features, expected {expected}")]
    DimensionMismatch {
        row: usize,
        expected: usize,
        got: usize,
    },

    #[error("need at least {minimum} labelled rows, have {samples}")]
    TooFewSamples { samples: usize, minimum: usize },

    #[error("labels contain a single class")]
    SingleClass,
}

impl From<ModelError> for StockportError {
    fn from(err: ModelError) -> Self {
        match err {
            ModelError::TooFewSamples { .. } | ModelError::SingleClass => {
                StockportError::validation(err.to_string())
            }
            other => StockportError::Model {
                reason: other.to_string(),
            },
        }
    }
}

pub(crate) fn check_training_data(features: &[Vec<f64>], labels: &[f64]) -> Result<(), ModelError> {
    if features.is_empty() {
        return Err(ModelError::Empty);
    }
    if features.len() != labels.len() {
        return Err(ModelError::LengthMismatch {
            features: features.len(),
            labels: labels.len(),
        });
    }
    let expected = features[0].len();
    if let Some((row, r)) = features.iter().enumerate().find(|(_, r)| r.len() != expected) {
        return Err(ModelError::DimensionMismatch {
            row,
            expected,
            got: r.len(),
        });
    }
    Ok(())
}

/// Binary classifier producing P(label = 1).
pub trait Classifier: Send + Sync {
    fn fit(&mut self, features: &[Vec<f64>], labels: &[f64]) -> Result<(), ModelError>;

    /// 0.5 before the model is fitted.
    fn predict_proba(&self, row: &[f64]) -> f64;

    /// One non-negative weight per feature, summing to 1 once fitted.
    fn feature_importances(&self) -> Vec<f64>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub enum ModelKind {
    #[default]
    RandomForest,
    LogisticRegression,
}

impl ModelKind {
    pub const ALL: [ModelKind; 2] = [ModelKind::RandomForest, ModelKind::LogisticRegression];

    pub fn as_str(&self) -> &'static str {
        match self {
            ModelKind::RandomForest => "random_forest",
            ModelKind::LogisticRegression => "logistic_regression",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ModelKind::RandomForest => "Random Forest",
            ModelKind::LogisticRegression => "Logistic Regression",
        }
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModelKind {
    type Err = StockportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "random_forest" | "rf" | "forest" => Ok(ModelKind::RandomForest),
            "logistic_regression" | "logistic" | "lr" => Ok(ModelKind::LogisticRegression),
            other => Err(StockportError::validation(format!(
                "unknown model '{other}' (expected random_forest or logistic_regression)"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ModelConfig {
    pub kind: ModelKind,
    pub forest: ForestConfig,
    pub logistic: LogisticConfig,
    pub cv_folds: usize,
    /// Probability at or above which a row is classed as "up".
    pub threshold: f64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        ModelConfig {
            kind: ModelKind::RandomForest,
            forest: ForestConfig::default(),
            logistic: LogisticConfig::default(),
            cv_folds: 5,
            threshold: 0.5,
        }
    }
}

pub fn build_classifier(config: &ModelConfig) -> Box<dyn Classifier> {
    match config.kind {
        ModelKind::RandomForest => Box::new(RandomForest::new(config.forest.clone())),
        ModelKind::LogisticRegression => Box::new(LogisticRegression::new(config.logistic.clone())),
    }
}

/// Unlabelled final bar of a symbol, used for the forward prediction.
#[derive(Debug, Clone, PartialEq)]
pub struct LatestRow {
    pub symbol: String,
    pub date: NaiveDate,
    pub features: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FoldReport {
    pub fold: usize,
    pub train_size: usize,
    pub test_size: usize,
    pub metrics: ClassificationMetrics,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LatestPrediction {
    pub symbol: String,
    pub date: NaiveDate,
    pub probability_up: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelReport {
    pub kind: ModelKind,
    pub feature_names: Vec<String>,
    pub n_samples: usize,
    pub positive_rate: f64,
    pub folds: Vec<FoldReport>,
    pub mean_metrics: ClassificationMetrics,
    /// Sorted by importance, largest first.
    pub importances: Vec<(String, f64)>,
    pub latest: Vec<LatestPrediction>,
}

fn single_class(labels: &[f64]) -> bool {
    let positives = labels.iter().filter(|&&y| y > 0.5).count();
    positives == 0 || positives == labels.len()
}

/// Cross-validates a fresh model per fold, then fits on every row and scores
/// the latest unlabelled rows.
pub fn train_and_evaluate(
    dataset: &Dataset,
    latest: &[LatestRow],
    config: &ModelConfig,
) -> Result<ModelReport, StockportError> {
    if dataset.n_samples() < MIN_TRAINING_SAMPLES {
        return Err(ModelError::TooFewSamples {
            samples: dataset.n_samples(),
            minimum: MIN_TRAINING_SAMPLES,
        }
        .into());
    }
    if !dataset.has_both_classes() {
        return Err(ModelError::SingleClass.into());
    }

    let mut data = dataset.clone();
    data.sort_chronologically();

    let mut folds = Vec::new();
    for (k, split) in time_series_splits(data.n_samples(), config.cv_folds)
        .into_iter()
        .enumerate()
    {
        let train_x = &data.features[split.train.clone()];
        let train_y = &data.labels[split.train.clone()];
        let test_y = &data.labels[split.test.clone()];
        if single_class(train_y) || single_class(test_y) {
            log::debug!("skipping fold {} with a single class in train or test", k + 1);
            continue;
        }

        let mut model = build_classifier(config);
        model.fit(train_x, train_y)?;

        let probs: Vec<f64> = data.features[split.test.clone()]
            .iter()
            .map(|row| model.predict_proba(row))
            .collect();
        let metrics = ClassificationMetrics::compute(test_y, &probs, config.threshold);
        folds.push(FoldReport {
            fold: k + 1,
            train_size: split.train.len(),
            test_size: split.test.len(),
            metrics,
        });
    }

    let mut model = build_classifier(config);
    model.fit(&data.features, &data.labels)?;

    let mut importances: Vec<(String, f64)> = data
        .feature_names
        .iter()
        .cloned()
        .zip(model.feature_importances())
        .collect();
    importances.sort_by(|a, b| b.1.total_cmp(&a.1));

    let latest = latest
        .iter()
        .map(|row| LatestPrediction {
            symbol: row.symbol.clone(),
            date: row.date,
            probability_up: model.predict_proba(&row.features),
        })
        .collect();

    let fold_metrics: Vec<ClassificationMetrics> = folds.iter().map(|f| f.metrics).collect();
    let report = ModelReport {
        kind: config.kind,
        feature_names: data.feature_names.clone(),
        n_samples: data.n_samples(),
        positive_rate: data.positive_rate(),
        mean_metrics: ClassificationMetrics::mean(&fold_metrics),
        folds,
        importances,
        latest,
    };

    log::info!(
        "trained {} on {} rows: cv accuracy {:.3}, f1 {:.3}",
        report.kind.label(),
        report.n_samples,
        report.mean_metrics.accuracy,
        report.mean_metrics.f1
    );

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn synthetic(n: usize) -> Dataset {
        let mut ds = Dataset::new(vec!["signal".into(), "noise".into()]);
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        for i in 0..n {
            let signal = ((i * 7919) % 100) as f64 / 100.0;
            let noise = ((i * 104_729) % 37) as f64;
            let label = if signal > 0.5 { 1.0 } else { 0.0 };
            ds.push(
                "AAPL",
                start + chrono::Duration::days(i as i64),
                vec![signal, noise],
                label,
            );
        }
        ds
    }

    #[test]
    fn model_kind_parse() {
        assert_eq!("rf".parse::<ModelKind>().unwrap(), ModelKind::RandomForest);
        assert_eq!(
            "Logistic_Regression".parse::<ModelKind>().unwrap(),
            ModelKind::LogisticRegression
        );
        assert!("svm".parse::<ModelKind>().is_err());
    }

    #[test]
    fn too_few_samples_is_validation_error() {
        let err = train_and_evaluate(&synthetic(20), &[], &ModelConfig::default()).unwrap_err();
        assert!(matches!(err, StockportError::Validation { .. }));
    }

    #[test]
    fn single_class_is_validation_error() {
        let mut ds = synthetic(100);
        for l in &mut ds.labels {
            *l = 1.0;
        }
        let err = train_and_evaluate(&ds, &[], &ModelConfig::default()).unwrap_err();
        assert!(matches!(err, StockportError::Validation { .. }));
    }

    #[test]
    fn folds_with_a_single_test_class_are_skipped() {
        let mut ds = synthetic(100);
        for l in &mut ds.labels[40..60] {
            *l = 1.0;
        }
        let config = ModelConfig {
            kind: ModelKind::LogisticRegression,
            cv_folds: 4,
            ..Default::default()
        };
        let report = train_and_evaluate(&ds, &[], &config).unwrap();
        let folds: Vec<usize> = report.folds.iter().map(|f| f.fold).collect();
        assert_eq!(folds, vec![1, 3, 4]);
    }

    #[test]
    fn both_models_learn_separable_signal() {
        let latest = vec![LatestRow {
            symbol: "AAPL".into(),
            date: NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(),
            features: vec![0.95, 3.0],
        }];
        for kind in ModelKind::ALL {
            let config = ModelConfig {
                kind,
                forest: ForestConfig {
                    n_trees: 20,
                    ..Default::default()
                },
                ..Default::default()
            };
            let report = train_and_evaluate(&synthetic(300), &latest, &config).unwrap();
            assert_eq!(report.kind, kind);
            assert_eq!(report.folds.len(), 5);
            assert!(report.mean_metrics.accuracy > 0.8, "{kind}: {:?}", report.mean_metrics);
            assert_eq!(report.importances[0].0, "signal");
            assert!(report.latest[0].probability_up > 0.5);
        }
    }

    #[test]
    fn check_training_data_shapes() {
        assert_eq!(check_training_data(&[], &[]), Err(ModelError::Empty));
        assert!(matches!(
            check_training_data(&[vec![1.0]], &[1.0, 0.0]),
            Err(ModelError::LengthMismatch { .. })
        ));
    }
}
