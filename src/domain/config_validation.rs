//! Configuration validation and typed settings.
//!
//! Every numeric setting is checked before the web server or a CLI command
//! uses it; the `load_*` functions then build typed values with defaults.

use crate::domain::backfill::DEFAULT_MAX_BACKFILL_DAYS;
use crate::domain::backtest::BacktestConfig;
use crate::domain::error::StockportError;
use crate::domain::execution::{ExecutionConfig, ExecutionParams};
use crate::domain::interval::Interval;
use crate::domain::ml::logistic::LogisticConfig;
use crate::domain::ml::random_forest::ForestConfig;
use crate::domain::ml::{ModelConfig, ModelKind};
use crate::domain::portfolio::{DEFAULT_PORTFOLIO, Portfolio};
use crate::domain::session::SessionDefaults;
use crate::domain::strategy::Strategy;
use crate::domain::universe::parse_symbols;
use crate::ports::config_port::ConfigPort;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_TICKERS: &str = "AAPL,MSFT";
pub const DEFAULT_LISTEN: &str = "127.0.0.1:8501";
pub const DEFAULT_CACHE_TTL_SECS: i64 = 300;

fn invalid(section: &str, key: &str, reason: impl Into<String>) -> StockportError {
    StockportError::ConfigInvalid {
        section: section.to_string(),
        key: key.to_string(),
        reason: reason.into(),
    }
}

pub fn validate_config(config: &dyn ConfigPort) -> Result<(), StockportError> {
    validate_web(config)?;
    validate_defaults(config)?;
    validate_backtest(config)?;
    validate_model(config)?;
    validate_news(config)?;
    validate_backfill(config)?;
    load_portfolios(config)?;
    Ok(())
}

fn require_min(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
    default: i64,
    min: i64,
) -> Result<(), StockportError> {
    let value = config.get_int(section, key, default);
    if value < min {
        return Err(invalid(section, key, format!("{key} must be at least {min}")));
    }
    Ok(())
}

fn require_range(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
    default: f64,
    range: std::ops::RangeInclusive<f64>,
) -> Result<(), StockportError> {
    let value = config.get_double(section, key, default);
    if !range.contains(&value) {
        return Err(invalid(
            section,
            key,
            format!(
                "{key} must be between {} and {}",
                range.start(),
                range.end()
            ),
        ));
    }
    Ok(())
}

fn validate_web(config: &dyn ConfigPort) -> Result<(), StockportError> {
    if let Some(listen) = config.get_string("web", "listen") {
        if listen.parse::<std::net::SocketAddr>().is_err() {
            return Err(invalid("web", "listen", format!("'{listen}' is not host:port")));
        }
    }
    require_min(config, "web", "cache_ttl_secs", DEFAULT_CACHE_TTL_SECS, 0)
}

fn validate_defaults(config: &dyn ConfigPort) -> Result<(), StockportError> {
    if let Some(tickers) = config.get_string("defaults", "tickers") {
        parse_symbols(&tickers).map_err(|e| invalid("defaults", "tickers", e.to_string()))?;
    }
    if let Some(interval) = config.get_string("defaults", "interval") {
        interval
            .parse::<Interval>()
            .map_err(|e| invalid("defaults", "interval", e.to_string()))?;
    }
    require_min(config, "defaults", "lookback_days", 365, 1)
}

fn validate_backtest(config: &dyn ConfigPort) -> Result<(), StockportError> {
    let capital = config.get_double("backtest", "initial_capital", 100_000.0);
    if capital <= 0.0 {
        return Err(invalid(
            "backtest",
            "initial_capital",
            "initial_capital must be positive",
        ));
    }
    for key in [
        "commission_per_trade",
        "commission_pct",
        "slippage_pct",
        "stop_loss_pct",
        "take_profit_pct",
    ] {
        if config.get_double("backtest", key, 0.0) < 0.0 {
            return Err(invalid("backtest", key, format!("{key} must be non-negative")));
        }
    }
    let size = config.get_double("backtest", "position_size", 0.25);
    if size <= 0.0 || size > 1.0 {
        return Err(invalid(
            "backtest",
            "position_size",
            "position_size must be in (0, 1]",
        ));
    }
    require_min(config, "backtest", "max_positions", 5, 1)?;
    let rf = config.get_double("backtest", "risk_free_rate", 0.02);
    if !(0.0..1.0).contains(&rf) {
        return Err(invalid(
            "backtest",
            "risk_free_rate",
            "risk_free_rate must be between 0 and 1",
        ));
    }
    load_strategy(config, None).map(|_| ())
}

fn validate_model(config: &dyn ConfigPort) -> Result<(), StockportError> {
    if let Some(kind) = config.get_string("model", "kind") {
        kind.parse::<ModelKind>()
            .map_err(|e| invalid("model", "kind", e.to_string()))?;
    }
    require_min(config, "model", "n_trees", 100, 1)?;
    require_min(config, "model", "max_depth", 6, 1)?;
    require_min(config, "model", "min_samples_split", 10, 2)?;
    require_min(config, "model", "min_samples_leaf", 5, 1)?;
    require_min(config, "model", "max_iter", 1000, 1)?;
    require_min(config, "model", "cv_folds", 5, 2)?;
    require_range(config, "model", "threshold", 0.5, 0.0..=1.0)?;
    require_range(config, "model", "learning_rate", 0.1, 1e-6..=10.0)?;
    require_range(config, "model", "l2", 0.01, 0.0..=100.0)
}

fn validate_news(config: &dyn ConfigPort) -> Result<(), StockportError> {
    require_min(config, "news", "items_per_ticker", 5, 1)?;
    require_min(config, "news", "lookback_days", 30, 1)
}

fn validate_backfill(config: &dyn ConfigPort) -> Result<(), StockportError> {
    require_min(config, "backfill", "lookback_days", 730, 1)?;
    require_min(config, "backfill", "seed", 42, 0)?;
    require_min(config, "backfill", "max_days", DEFAULT_MAX_BACKFILL_DAYS, 1)?;
    let lookback = config.get_int("backfill", "lookback_days", 730);
    let max_days = config.get_int("backfill", "max_days", DEFAULT_MAX_BACKFILL_DAYS);
    if lookback > max_days {
        return Err(invalid(
            "backfill",
            "lookback_days",
            format!("{lookback} exceeds max_days ({max_days})"),
        ));
    }
    match config.get_string("backfill", "source").as_deref() {
        None | Some("mock") => Ok(()),
        Some("csv") => match config.get_string("backfill", "csv_dir") {
            Some(_) => Ok(()),
            None => Err(StockportError::ConfigMissing {
                section: "backfill".into(),
                key: "csv_dir".into(),
            }),
        },
        Some(other) => Err(invalid(
            "backfill",
            "source",
            format!("unknown source '{other}' (expected mock or csv)"),
        )),
    }
}

/// `[defaults] tickers`, or AAPL and MSFT.
pub fn default_tickers(config: &dyn ConfigPort) -> Result<Vec<String>, StockportError> {
    let raw = config
        .get_string("defaults", "tickers")
        .unwrap_or_else(|| DEFAULT_TICKERS.to_string());
    Ok(parse_symbols(&raw)?)
}

/// Portfolios from `[portfolios]`, in key order. Without that section a
/// single equal-weight `core` portfolio over the default tickers is built.
pub fn load_portfolios(config: &dyn ConfigPort) -> Result<Vec<Portfolio>, StockportError> {
    let names = config.keys("portfolios");
    if names.is_empty() {
        return Ok(vec![Portfolio::equal_weight(
            DEFAULT_PORTFOLIO,
            &default_tickers(config)?,
        )?]);
    }
    names
        .iter()
        .map(|name| {
            let spec = config.get_string("portfolios", name).unwrap_or_default();
            Portfolio::parse(name, &spec).map_err(|e| invalid("portfolios", name, e.to_string()))
        })
        .collect()
}

pub fn load_session_defaults(
    config: &dyn ConfigPort,
    portfolios: &[Portfolio],
) -> Result<SessionDefaults, StockportError> {
    let portfolio = config
        .get_string("defaults", "portfolio")
        .or_else(|| portfolios.first().map(|p| p.name.clone()))
        .unwrap_or_else(|| DEFAULT_PORTFOLIO.to_string());
    let interval = match config.get_string("defaults", "interval") {
        Some(raw) => raw
            .parse()
            .map_err(|e: StockportError| invalid("defaults", "interval", e.to_string()))?,
        None => Interval::Daily,
    };
    Ok(SessionDefaults {
        portfolio,
        lookback_days: config.get_int("defaults", "lookback_days", 365),
        interval,
    })
}

pub fn load_backtest_config(
    config: &dyn ConfigPort,
    interval: Interval,
) -> Result<BacktestConfig, StockportError> {
    validate_backtest(config)?;
    Ok(BacktestConfig {
        initial_capital: config.get_double("backtest", "initial_capital", 100_000.0),
        execution: ExecutionConfig {
            commission_per_trade: config.get_double("backtest", "commission_per_trade", 0.0),
            commission_pct: config.get_double("backtest", "commission_pct", 0.0),
            slippage_pct: config.get_double("backtest", "slippage_pct", 0.0),
        },
        params: ExecutionParams {
            position_size: config.get_double("backtest", "position_size", 0.25),
            stop_loss_pct: config.get_double("backtest", "stop_loss_pct", 0.0),
            take_profit_pct: config.get_double("backtest", "take_profit_pct", 0.0),
        },
        max_positions: config.get_int("backtest", "max_positions", 5) as usize,
        risk_free_rate: config.get_double("backtest", "risk_free_rate", 0.02),
        interval,
    })
}

/// Strategy named by `name`, or by `[backtest] strategy`, with parameters
/// overridden from the `[backtest]` section.
pub fn load_strategy(
    config: &dyn ConfigPort,
    name: Option<&str>,
) -> Result<Strategy, StockportError> {
    let name = name
        .map(str::to_string)
        .or_else(|| config.get_string("backtest", "strategy"))
        .unwrap_or_else(|| "sma".to_string());
    let strategy = match Strategy::from_name(&name)? {
        Strategy::SmaCrossover { fast, slow } => Strategy::SmaCrossover {
            fast: config.get_int("backtest", "sma_fast", fast as i64).max(0) as usize,
            slow: config.get_int("backtest", "sma_slow", slow as i64).max(0) as usize,
        },
        Strategy::RsiReversion {
            period,
            lower,
            upper,
        } => Strategy::RsiReversion {
            period: config.get_int("backtest", "rsi_period", period as i64).max(0) as usize,
            lower: config.get_double("backtest", "rsi_lower", lower),
            upper: config.get_double("backtest", "rsi_upper", upper),
        },
        Strategy::Momentum { lookback } => Strategy::Momentum {
            lookback: config
                .get_int("backtest", "momentum_lookback", lookback as i64)
                .max(0) as usize,
        },
        Strategy::ModelDriven {
            kind,
            threshold,
            train_ratio,
        } => Strategy::ModelDriven {
            kind: match config.get_string("model", "kind") {
                Some(k) => k.parse()?,
                None => kind,
            },
            threshold: config.get_double("backtest", "model_threshold", threshold),
            train_ratio: config.get_double("backtest", "train_ratio", train_ratio),
        },
    };
    strategy
        .validate()
        .map_err(|e| invalid("backtest", "strategy", e.to_string()))?;
    Ok(strategy)
}

pub fn load_model_config(
    config: &dyn ConfigPort,
    kind: Option<ModelKind>,
) -> Result<ModelConfig, StockportError> {
    validate_model(config)?;
    let kind = match (kind, config.get_string("model", "kind")) {
        (Some(k), _) => k,
        (None, Some(raw)) => raw.parse()?,
        (None, None) => ModelKind::RandomForest,
    };
    let seed = config.get_int("model", "seed", 42).max(0) as u64;
    let max_features = match config.get_int("model", "max_features", 0) {
        n if n > 0 => Some(n as usize),
        _ => None,
    };
    Ok(ModelConfig {
        kind,
        forest: ForestConfig {
            n_trees: config.get_int("model", "n_trees", 100) as usize,
            max_depth: config.get_int("model", "max_depth", 6) as usize,
            min_samples_split: config.get_int("model", "min_samples_split", 10) as usize,
            min_samples_leaf: config.get_int("model", "min_samples_leaf", 5) as usize,
            max_features,
            seed,
        },
        logistic: LogisticConfig {
            learning_rate: config.get_double("model", "learning_rate", 0.1),
            max_iter: config.get_int("model", "max_iter", 1000) as usize,
            tolerance: config.get_double("model", "tolerance", 1e-7),
            l2: config.get_double("model", "l2", 0.01),
        },
        cv_folds: config.get_int("model", "cv_folds", 5) as usize,
        threshold: config.get_double("model", "threshold", 0.5),
    })
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewsSettings {
    pub items_per_ticker: usize,
    pub lookback_days: i64,
    pub top_topics: usize,
}

pub fn load_news_settings(config: &dyn ConfigPort) -> Result<NewsSettings, StockportError> {
    validate_news(config)?;
    Ok(NewsSettings {
        items_per_ticker: config.get_int("news", "items_per_ticker", 5) as usize,
        lookback_days: config.get_int("news", "lookback_days", 30),
        top_topics: config.get_int("news", "top_topics", 5).max(1) as usize,
    })
}

pub fn listen_addr(config: &dyn ConfigPort) -> Result<SocketAddr, StockportError> {
    validate_web(config)?;
    let listen = config
        .get_string("web", "listen")
        .unwrap_or_else(|| DEFAULT_LISTEN.to_string());
    listen
        .parse()
        .map_err(|_| invalid("web", "listen", format!("'{listen}' is not host:port")))
}

pub fn cache_ttl(config: &dyn ConfigPort) -> Duration {
    let secs = config.get_int("web", "cache_ttl_secs", DEFAULT_CACHE_TTL_SECS);
    Duration::from_secs(secs.max(0) as u64)
}

/// Where backfilled bars come from.
#[derive(Debug, Clone, PartialEq)]
pub enum SourceKind {
    Mock,
    Csv(PathBuf),
}

#[derive(Debug, Clone, PartialEq)]
pub struct BackfillSettings {
    pub source: SourceKind,
    /// Seed for generated prices and news.
    pub seed: u64,
    /// Default range of a backfill that names no start date.
    pub lookback_days: i64,
    /// Register and backfill the default tickers when the store is empty.
    pub seed_on_start: bool,
    /// Widest range one backfill job may span.
    pub max_days: i64,
}

pub fn load_backfill_settings(config: &dyn ConfigPort) -> Result<BackfillSettings, StockportError> {
    validate_backfill(config)?;
    let source = match config.get_string("backfill", "csv_dir") {
        Some(dir) if config.get_string("backfill", "source").as_deref() == Some("csv") => {
            SourceKind::Csv(PathBuf::from(dir))
        }
        _ => SourceKind::Mock,
    };
    Ok(BackfillSettings {
        source,
        seed: config.get_int("backfill", "seed", 42).max(0) as u64,
        lookback_days: config.get_int("backfill", "lookback_days", 730),
        seed_on_start: config.get_bool("backfill", "seed_on_start", true),
        max_days: config.get_int("backfill", "max_days", DEFAULT_MAX_BACKFILL_DAYS),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::file_config_adapter::FileConfigAdapter;

    fn make_config(content: &str) -> FileConfigAdapter {
        FileConfigAdapter::from_string(content).unwrap()
    }

    fn expect_invalid(content: &str, key: &str) {
        match validate_config(&make_config(content)) {
            Err(StockportError::ConfigInvalid { key: k, .. }) => assert_eq!(k, key),
            other => panic!("expected invalid {key}, got {other:?}"),
        }
    }

    #[test]
    fn empty_config_is_valid() {
        validate_config(&make_config("")).unwrap();
    }

    #[test]
    fn full_config_is_valid() {
        let content = r#"
[web]
listen = 127.0.0.1:9000
cache_ttl_secs = 60

[defaults]
tickers = AAPL,MSFT,NVDA
interval = 1wk
lookback_days = 180

[portfolios]
core = AAPL:0.6,MSFT:0.4

[backtest]
initial_capital = 50000
position_size = 0.5
strategy = rsi
rsi_lower = 25
rsi_upper = 75

[model]
kind = logistic_regression
n_trees = 50
"#;
        validate_config(&make_config(content)).unwrap();
    }

    #[test]
    fn bad_values_are_rejected() {
        expect_invalid("[web]\nlisten = nowhere\n", "listen");
        expect_invalid("[defaults]\ninterval = 2h\n", "interval");
        expect_invalid("[defaults]\ntickers = AAPL,,MSFT\n", "tickers");
        expect_invalid("[backtest]\ninitial_capital = 0\n", "initial_capital");
        expect_invalid("[backtest]\nslippage_pct = -1\n", "slippage_pct");
        expect_invalid("[backtest]\nposition_size = 1.5\n", "position_size");
        expect_invalid("[backtest]\nmax_positions = 0\n", "max_positions");
        expect_invalid("[backtest]\nrisk_free_rate = 1.2\n", "risk_free_rate");
        expect_invalid("[backtest]\nsma_fast = 50\nsma_slow = 20\n", "strategy");
        expect_invalid("[model]\nkind = svm\n", "kind");
        expect_invalid("[model]\ncv_folds = 1\n", "cv_folds");
        expect_invalid("[model]\nthreshold = 2\n", "threshold");
        expect_invalid("[news]\nitems_per_ticker = 0\n", "items_per_ticker");
        expect_invalid("[portfolios]\nbroken = AAPL:x\n", "broken");
    }

    #[test]
    fn unknown_strategy_is_validation_error() {
        let err = validate_config(&make_config("[backtest]\nstrategy = pairs\n")).unwrap_err();
        assert!(matches!(err, StockportError::Validation { .. }));
    }

    #[test]
    fn default_portfolio_from_tickers() {
        let config = make_config("[defaults]\ntickers = nvda, amd\n");
        let portfolios = load_portfolios(&config).unwrap();
        assert_eq!(portfolios.len(), 1);
        assert_eq!(portfolios[0].name, DEFAULT_PORTFOLIO);
        assert_eq!(portfolios[0].symbols(), vec!["NVDA", "AMD"]);
    }

    #[test]
    fn configured_portfolios_in_key_order() {
        let config = make_config("[portfolios]\ntech = NVDA\ncore = AAPL:2,MSFT:1\n");
        let portfolios = load_portfolios(&config).unwrap();
        let names: Vec<&str> = portfolios.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["core", "tech"]);
        let defaults = load_session_defaults(&config, &portfolios).unwrap();
        assert_eq!(defaults.portfolio, "core");
        assert_eq!(defaults.lookback_days, 365);
    }

    #[test]
    fn strategy_parameters_from_config() {
        let config = make_config("[backtest]\nstrategy = sma\nsma_fast = 5\nsma_slow = 20\n");
        assert_eq!(
            load_strategy(&config, None).unwrap(),
            Strategy::SmaCrossover { fast: 5, slow: 20 }
        );
        assert_eq!(
            load_strategy(&config, Some("momentum")).unwrap(),
            Strategy::Momentum { lookback: 20 }
        );
    }

    #[test]
    fn model_config_overrides() {
        let config = make_config("[model]\nkind = lr\nn_trees = 25\nseed = 7\nmax_features = 3\n");
        let m = load_model_config(&config, None).unwrap();
        assert_eq!(m.kind, ModelKind::LogisticRegression);
        assert_eq!(m.forest.n_trees, 25);
        assert_eq!(m.forest.seed, 7);
        assert_eq!(m.forest.max_features, Some(3));
        let forced = load_model_config(&config, Some(ModelKind::RandomForest)).unwrap();
        assert_eq!(forced.kind, ModelKind::RandomForest);
    }

    #[test]
    fn backtest_config_values() {
        let config = make_config(
            "[backtest]\ninitial_capital = 25000\ncommission_per_trade = 1.5\nmax_positions = 3\n",
        );
        let bt = load_backtest_config(&config, Interval::Weekly).unwrap();
        assert_eq!(bt.initial_capital, 25_000.0);
        assert_eq!(bt.execution.commission_per_trade, 1.5);
        assert_eq!(bt.max_positions, 3);
        assert_eq!(bt.interval, Interval::Weekly);
    }

    #[test]
    fn backfill_settings() {
        let mock = load_backfill_settings(&make_config("")).unwrap();
        assert_eq!(mock.source, SourceKind::Mock);
        assert_eq!(mock.lookback_days, 730);
        assert!(mock.seed_on_start);
        assert_eq!(mock.max_days, DEFAULT_MAX_BACKFILL_DAYS);

        let csv = load_backfill_settings(&make_config(
            "[backfill]\nsource = csv\ncsv_dir = data/prices\nseed_on_start = no\n",
        ))
        .unwrap();
        assert_eq!(csv.source, SourceKind::Csv(PathBuf::from("data/prices")));
        assert!(!csv.seed_on_start);

        let err = validate_config(&make_config("[backfill]\nsource = csv\n")).unwrap_err();
        assert!(matches!(err, StockportError::ConfigMissing { .. }));
        expect_invalid("[backfill]\nsource = yahoo\n", "source");
        expect_invalid("[backfill]\nmax_days = 0\n", "max_days");
        expect_invalid("[backfill]\nlookback_days = 400\nmax_days = 365\n", "lookback_days");
    }

    #[test]
    fn web_settings() {
        let config = make_config("[web]\ncache_ttl_secs = 0\n");
        assert_eq!(listen_addr(&config).unwrap().port(), 8501);
        assert!(cache_ttl(&config).is_zero());
        assert_eq!(cache_ttl(&make_config("")), Duration::from_secs(300));
    }
}
