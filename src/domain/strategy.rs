//! Trading strategies and their per-bar long/flat signals.

use serde::Serialize;
use std::fmt;
use std::str::FromStr;

use crate::domain::error::StockportError;
use crate::domain::features::symbol_features;
use crate::domain::indicators;
use crate::domain::ml::{
    ModelConfig, ModelError, ModelKind, MIN_TRAINING_SAMPLES, build_classifier,
};
use crate::domain::price_series::PriceSeries;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Signal {
    Long,
    Flat,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Strategy {
    /// Long while the fast SMA is above the slow SMA.
    SmaCrossover { fast: usize, slow: usize },
    /// Enters when RSI falls below `lower`, exits when it rises above `upper`.
    RsiReversion { period: usize, lower: f64, upper: f64 },
    /// Long while the trailing `lookback`-bar return is positive.
    Momentum { lookback: usize },
    /// Long while the classifier's probability of an up bar is at least
    /// `threshold`.
    ModelDriven {
        kind: ModelKind,
        threshold: f64,
        train_ratio: f64,
    },
}

impl Default for Strategy {
    fn default() -> Self {
        Strategy::SmaCrossover { fast: 10, slow: 30 }
    }
}

impl Strategy {
    pub const NAMES: [&'static str; 4] = ["sma", "rsi", "momentum", "model"];

    /// Default parameters for a strategy name.
    pub fn from_name(name: &str) -> Result<Self, StockportError> {
        name.parse()
    }

    pub fn key(&self) -> &'static str {
        match self {
            Strategy::SmaCrossover { .. } => "sma",
            Strategy::RsiReversion { .. } => "rsi",
            Strategy::Momentum { .. } => "momentum",
            Strategy::ModelDriven { .. } => "model",
        }
    }

    pub fn describe(&self) -> String {
        match self {
            Strategy::SmaCrossover { fast, slow } => format!("SMA crossover ({fast}/{slow})"),
            Strategy::RsiReversion {
                period,
                lower,
                upper,
            } => format!("RSI({period}) mean reversion {lower:.0}/{upper:.0}"),
            Strategy::Momentum { lookback } => format!("{lookback}-bar momentum"),
            Strategy::ModelDriven {
                kind,
                threshold,
                train_ratio,
            } => format!(
                "{} signal (p >= {threshold:.2}, {:.0}% train)",
                kind.label(),
                train_ratio * 100.0
            ),
        }
    }

    pub fn validate(&self) -> Result<(), StockportError> {
        match *self {
            Strategy::SmaCrossover { fast, slow } => {
                if fast == 0 || fast >= slow {
                    return Err(StockportError::validation(format!(
                        "SMA periods must satisfy 0 < fast < slow (got {fast}/{slow})"
                    )));
                }
            }
            Strategy::RsiReversion {
                period,
                lower,
                upper,
            } => {
                if period < 2 {
                    return Err(StockportError::validation("RSI period must be at least 2"));
                }
                if !(0.0 < lower && lower < upper && upper < 100.0) {
                    return Err(StockportError::validation(format!(
                        "RSI bands must satisfy 0 < lower < upper < 100 (got {lower}/{upper})"
                    )));
                }
            }
            Strategy::Momentum { lookback } => {
                if lookback == 0 {
                    return Err(StockportError::validation("momentum lookback must be positive"));
                }
            }
            Strategy::ModelDriven {
                threshold,
                train_ratio,
                ..
            } => {
                if !(0.0..=1.0).contains(&threshold) {
                    return Err(StockportError::validation(
                        "model threshold must be between 0 and 1",
                    ));
                }
                if !(0.1..=0.9).contains(&train_ratio) {
                    return Err(StockportError::validation(
                        "train_ratio must be between 0.1 and 0.9",
                    ));
                }
            }
        }
        Ok(())
    }

    /// One signal vector per input series, aligned with its bars.
    ///
    /// `model` supplies the hyperparameters for `ModelDriven`; the other
    /// strategies ignore it.
    pub fn signals(
        &self,
        series: &[PriceSeries],
        model: &ModelConfig,
    ) -> Result<Vec<Vec<Signal>>, StockportError> {
        self.validate()?;
        match *self {
            Strategy::SmaCrossover { fast, slow } => Ok(series
                .iter()
                .map(|s| sma_crossover(&s.closes(), fast, slow))
                .collect()),
            Strategy::RsiReversion {
                period,
                lower,
                upper,
            } => Ok(series
                .iter()
                .map(|s| rsi_reversion(&s.closes(), period, lower, upper))
                .collect()),
            Strategy::Momentum { lookback } => Ok(series
                .iter()
                .map(|s| momentum(&s.closes(), lookback))
                .collect()),
            Strategy::ModelDriven {
                kind,
                threshold,
                train_ratio,
            } => {
                let config = ModelConfig {
                    kind,
                    ..model.clone()
                };
                model_signals(series, &config, threshold, train_ratio)
            }
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.describe())
    }
}

impl FromStr for Strategy {
    type Err = StockportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "sma" | "sma_crossover" => Ok(Strategy::SmaCrossover { fast: 10, slow: 30 }),
            "rsi" | "rsi_reversion" => Ok(Strategy::RsiReversion {
                period: 14,
                lower: 30.0,
                upper: 70.0,
            }),
            "momentum" => Ok(Strategy::Momentum { lookback: 20 }),
            "model" | "model_driven" => Ok(Strategy::ModelDriven {
                kind: ModelKind::RandomForest,
                threshold: 0.55,
                train_ratio: 0.6,
            }),
            other => Err(StockportError::validation(format!(
                "unknown strategy '{other}' (expected one of {})",
                Strategy::NAMES.join(", ")
            ))),
        }
    }
}

fn to_signal(long: bool) -> Signal {
    if long { Signal::Long } else { Signal::Flat }
}

fn sma_crossover(closes: &[f64], fast: usize, slow: usize) -> Vec<Signal> {
    let fast = indicators::sma(closes, fast);
    let slow = indicators::sma(closes, slow);
    fast.iter()
        .zip(&slow)
        .map(|(f, s)| match (f, s) {
            (Some(f), Some(s)) => to_signal(f > s),
            _ => Signal::Flat,
        })
        .collect()
}

fn rsi_reversion(closes: &[f64], period: usize, lower: f64, upper: f64) -> Vec<Signal> {
    let mut long = false;
    indicators::rsi(closes, period)
        .into_iter()
        .map(|value| {
            match value {
                Some(r) if r < lower => long = true,
                Some(r) if r > upper => long = false,
                _ => {}
            }
            to_signal(long)
        })
        .collect()
}

fn momentum(closes: &[f64], lookback: usize) -> Vec<Signal> {
    indicators::roc(closes, lookback)
        .into_iter()
        .map(|r| to_signal(r.is_some_and(|r| r > 0.0)))
        .collect()
}

/// Trains one classifier on the first `train_ratio` of every symbol's
/// labelled rows, then scores each symbol's remaining rows. Bars inside the
/// training window stay flat.
fn model_signals(
    series: &[PriceSeries],
    config: &ModelConfig,
    threshold: f64,
    train_ratio: f64,
) -> Result<Vec<Vec<Signal>>, StockportError> {
    let per_symbol: Vec<_> = series.iter().map(symbol_features).collect();

    let mut train_x = Vec::new();
    let mut train_y = Vec::new();
    let mut cutoffs = Vec::with_capacity(series.len());
    for rows in &per_symbol {
        let labelled = rows.iter().filter(|r| r.label.is_some()).count();
        let cutoff = (labelled as f64 * train_ratio).floor() as usize;
        for row in rows.iter().take(cutoff) {
            if let Some(label) = row.label {
                train_x.push(row.values.clone());
                train_y.push(label);
            }
        }
        cutoffs.push(cutoff);
    }

    if train_x.len() < MIN_TRAINING_SAMPLES {
        return Err(ModelError::TooFewSamples {
            samples: train_x.len(),
            minimum: MIN_TRAINING_SAMPLES,
        }
        .into());
    }
    let positives = train_y.iter().filter(|&&y| y > 0.5).count();
    if positives == 0 || positives == train_y.len() {
        return Err(ModelError::SingleClass.into());
    }

    let mut model = build_classifier(config);
    model.fit(&train_x, &train_y)?;
    log::info!(
        "model-driven strategy trained {} on {} rows",
        config.kind.label(),
        train_x.len()
    );

    Ok(series
        .iter()
        .zip(per_symbol)
        .zip(cutoffs)
        .map(|((s, rows), cutoff)| {
            let mut signals = vec![Signal::Flat; s.bar_count()];
            for row in rows.iter().skip(cutoff) {
                signals[row.index] = to_signal(model.predict_proba(&row.values) >= threshold);
            }
            signals
        })
        .collect())
}
