//! CLI definition and dispatch.

use chrono::{Duration, NaiveDate, Utc};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use crate::adapters::csv_adapter::CsvQuoteSource;
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::adapters::mock_feed::{MockNewsSource, MockQuoteSource};
use crate::adapters::sqlite_adapter::SqliteAdapter;
use crate::domain::backfill::{JobStatus, lookback_start, run_backfill, seed_if_empty};
use crate::domain::backtest::run_backtest as run_backtest_engine;
use crate::domain::config_validation::{
    BackfillSettings, SourceKind, default_tickers, load_backfill_settings, load_backtest_config,
    load_model_config, load_news_settings, load_portfolios, load_session_defaults, load_strategy,
    validate_config,
};
use crate::domain::error::StockportError;
use crate::domain::features::build_dataset;
use crate::domain::interval::Interval;
use crate::domain::ml::{ModelKind, train_and_evaluate};
use crate::domain::news::sentiment_summary;
use crate::domain::strategy::Strategy;
use crate::domain::ticker::{TickerRecord, normalize_symbol};
use crate::domain::universe::{load_universe, parse_symbols};
use crate::ports::config_port::ConfigPort;
use crate::ports::data_port::DataPort;
use crate::ports::news_port::NewsPort;
use crate::ports::quote_source::{NewsSource, QuoteSource};

/// Most stored articles summarized by `news`.
const SUMMARY_LIMIT: usize = 10_000;

#[derive(Parser, Debug)]
#[command(name = "stockport", about = "Stock portfolio dashboard over generated market data")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start the web server
    Serve {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Generate and store daily bars
    Backfill {
        #[arg(short, long)]
        config: PathBuf,
        /// Comma-separated symbols (default: included tickers)
        #[arg(long)]
        tickers: Option<String>,
        #[arg(long)]
        start: Option<NaiveDate>,
        #[arg(long)]
        end: Option<NaiveDate>,
    },
    /// Manage the ticker list
    Tickers {
        #[arg(short, long)]
        config: PathBuf,
        #[command(subcommand)]
        action: TickerAction,
    },
    /// Refresh news and print the sentiment summary
    News {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(long)]
        tickers: Option<String>,
    },
    /// Train and cross-validate the direction classifier
    Train {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(long)]
        tickers: Option<String>,
        /// random_forest or logistic_regression
        #[arg(long)]
        model: Option<String>,
    },
    /// Run a strategy backtest
    Backtest {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(long)]
        tickers: Option<String>,
        /// sma, rsi, momentum or model
        #[arg(long)]
        strategy: Option<String>,
    },
}

#[derive(Subcommand, Debug)]
pub enum TickerAction {
    List,
    Add {
        symbol: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        sector: Option<String>,
    },
    Remove {
        symbol: String,
    },
}

pub fn run(cli: Cli) -> ExitCode {
    let result = match cli.command {
        Command::Serve { config } => run_serve(&config),
        Command::Backfill {
            config,
            tickers,
            start,
            end,
        } => run_backfill_command(&config, tickers.as_deref(), start, end),
        Command::Tickers { config, action } => run_tickers(&config, action),
        Command::News { config, tickers } => run_news(&config, tickers.as_deref()),
        Command::Train {
            config,
            tickers,
            model,
        } => run_train(&config, tickers.as_deref(), model.as_deref()),
        Command::Backtest {
            config,
            tickers,
            strategy,
        } => run_backtest(&config, tickers.as_deref(), strategy.as_deref()),
    };
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            (&e).into()
        }
    }
}

/// Loads and validates the INI file.
pub fn load_config(path: &Path) -> Result<FileConfigAdapter, StockportError> {
    let config = FileConfigAdapter::from_file(path).map_err(|e| StockportError::ConfigParse {
        file: path.display().to_string(),
        reason: e.to_string(),
    })?;
    validate_config(&config)?;
    Ok(config)
}

pub fn quote_source(settings: &BackfillSettings) -> Box<dyn QuoteSource + Send + Sync> {
    match &settings.source {
        SourceKind::Mock => Box::new(MockQuoteSource::new(settings.seed)),
        SourceKind::Csv(dir) => Box::new(CsvQuoteSource::new(dir.clone())),
    }
}

/// `--tickers` when given, else the included tickers, else `[defaults] tickers`.
pub fn resolve_tickers(
    raw: Option<&str>,
    config: &dyn ConfigPort,
    store: &dyn DataPort,
) -> Result<Vec<String>, StockportError> {
    if let Some(raw) = raw {
        return Ok(parse_symbols(raw)?);
    }
    let included: Vec<String> = store
        .list_tickers()?
        .into_iter()
        .filter(|t| t.included)
        .map(|t| t.symbol)
        .collect();
    if included.is_empty() {
        default_tickers(config)
    } else {
        Ok(included)
    }
}

/// Analysis window from `[defaults]`: lookback days ending today, at the
/// default interval.
fn default_window(config: &dyn ConfigPort) -> Result<(NaiveDate, NaiveDate, Interval), StockportError> {
    let defaults = load_session_defaults(config, &load_portfolios(config)?)?;
    let end = Utc::now().date_naive();
    Ok((end - Duration::days(defaults.lookback_days), end, defaults.interval))
}

fn run_backfill_command(
    config_path: &Path,
    tickers: Option<&str>,
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
) -> Result<(), StockportError> {
    eprintln!("Loading config from {}", config_path.display());
    let config = load_config(config_path)?;
    let settings = load_backfill_settings(&config)?;
    let store = SqliteAdapter::from_config(&config)?;
    let source = quote_source(&settings);

    let symbols = resolve_tickers(tickers, &config, &store)?;
    let end = end.unwrap_or_else(|| Utc::now().date_naive());
    let start = match start {
        Some(start) => start,
        None => lookback_start(end, settings.lookback_days)?,
    };

    eprintln!(
        "Backfilling {} tickers from {} ({start} to {end})",
        symbols.len(),
        source.name()
    );
    let job = run_backfill(
        source.as_ref(),
        &store,
        &symbols,
        start,
        end,
        Interval::Daily,
        settings.max_days,
    )?;
    println!(
        "job {}: {} ({} bars)",
        job.id, job.status, job.bars_written
    );
    if let Some(error) = &job.error {
        eprintln!("{error}");
    }
    if job.status == JobStatus::Failed {
        return Err(StockportError::NoData {
            symbol: symbols.join(","),
        });
    }
    Ok(())
}

fn run_tickers(config_path: &Path, action: TickerAction) -> Result<(), StockportError> {
    let config = load_config(config_path)?;
    let store = SqliteAdapter::from_config(&config)?;
    match action {
        TickerAction::List => {
            let tickers = store.list_tickers()?;
            if tickers.is_empty() {
                eprintln!("no tickers");
            }
            for t in tickers {
                let range = match store.get_data_range(&t.symbol)? {
                    Some((first, last, bars)) => format!("{bars} bars, {first} to {last}"),
                    None => "no data".to_string(),
                };
                println!(
                    "{:<8} {:<3} {:<32} {:<20} {range}",
                    t.symbol,
                    if t.included { "yes" } else { "no" },
                    t.company_name,
                    t.sector
                );
            }
        }
        TickerAction::Add {
            symbol,
            name,
            sector,
        } => {
            let symbol = normalize_symbol(&symbol)?;
            if store.get_ticker(&symbol)?.is_some() {
                return Err(StockportError::validation(format!(
                    "{symbol} is already tracked"
                )));
            }
            let info = quote_source(&load_backfill_settings(&config)?)
                .company_info(&symbol)
                .ok();
            let name = name
                .or_else(|| info.as_ref().map(|i| i.long_name.clone()))
                .unwrap_or_else(|| symbol.clone());
            let sector = sector
                .or_else(|| info.as_ref().map(|i| i.sector.clone()))
                .unwrap_or_default();
            store.insert_ticker(&TickerRecord::new(
                &symbol,
                &name,
                &sector,
                Utc::now().naive_utc(),
            ))?;
            println!("added {symbol} ({name})");
        }
        TickerAction::Remove { symbol } => {
            let symbol = normalize_symbol(&symbol)?;
            store.delete_ticker(&symbol)?;
            println!("removed {symbol}");
        }
    }
    Ok(())
}

fn run_news(config_path: &Path, tickers: Option<&str>) -> Result<(), StockportError> {
    let config = load_config(config_path)?;
    let backfill = load_backfill_settings(&config)?;
    let settings = load_news_settings(&config)?;
    let store = SqliteAdapter::from_config(&config)?;
    let source = MockNewsSource::new(backfill.seed);

    let symbols = resolve_tickers(tickers, &config, &store)?;
    let now = Utc::now().naive_utc();
    let mut added = 0;
    for symbol in &symbols {
        let name = store
            .get_ticker(symbol)?
            .map(|t| t.company_name)
            .unwrap_or_else(|| symbol.clone());
        let items = source.fetch_news(symbol, &name, now, settings.items_per_ticker)?;
        added += store.store_news(&items)?;
    }
    eprintln!("stored {added} new articles");

    let items = store.fetch_news(
        &symbols,
        now - Duration::days(settings.lookback_days),
        SUMMARY_LIMIT,
    )?;
    println!(
        "{:<8} {:>8} {:>6} {:<9} {:>4} {:>4} {:>4}",
        "symbol", "articles", "mean", "label", "pos", "neu", "neg"
    );
    for s in sentiment_summary(&items) {
        println!(
            "{:<8} {:>8} {:>6.2} {:<9} {:>4} {:>4} {:>4}",
            s.symbol,
            s.articles,
            s.mean_sentiment,
            s.label().as_str(),
            s.positive,
            s.neutral,
            s.negative
        );
    }
    Ok(())
}

fn run_train(
    config_path: &Path,
    tickers: Option<&str>,
    model: Option<&str>,
) -> Result<(), StockportError> {
    let config = load_config(config_path)?;
    let store = SqliteAdapter::from_config(&config)?;
    let kind = model.map(str::parse::<ModelKind>).transpose()?;
    let model_config = load_model_config(&config, kind)?;

    let symbols = resolve_tickers(tickers, &config, &store)?;
    let (start, end, interval) = default_window(&config)?;
    let universe = load_universe(&store, &symbols, start, end, interval)?;
    for s in &universe.skipped {
        eprintln!("skipped {}: {}", s.symbol, s.reason);
    }

    let (dataset, latest) = build_dataset(&universe.series);
    let report = train_and_evaluate(&dataset, &latest, &model_config)?;

    println!(
        "{} on {} rows ({:.1}% up bars)",
        report.kind.label(),
        report.n_samples,
        report.positive_rate * 100.0
    );
    println!("fold  train  test  accuracy  precision  recall     f1");
    for f in &report.folds {
        println!(
            "{:>4} {:>6} {:>5} {:>9.3} {:>10.3} {:>7.3} {:>6.3}",
            f.fold,
            f.train_size,
            f.test_size,
            f.metrics.accuracy,
            f.metrics.precision,
            f.metrics.recall,
            f.metrics.f1
        );
    }
    let m = &report.mean_metrics;
    println!(
        "mean             {:>9.3} {:>10.3} {:>7.3} {:>6.3}  (baseline {:.3})",
        m.accuracy, m.precision, m.recall, m.f1, m.baseline_accuracy
    );
    println!("importances:");
    for (name, weight) in &report.importances {
        println!("  {name:<16} {weight:.3}");
    }
    for p in &report.latest {
        println!("{} {}: P(up) = {:.3}", p.symbol, p.date, p.probability_up);
    }
    Ok(())
}

fn run_backtest(
    config_path: &Path,
    tickers: Option<&str>,
    strategy: Option<&str>,
) -> Result<(), StockportError> {
    let config = load_config(config_path)?;
    let store = SqliteAdapter::from_config(&config)?;
    let strategy = load_strategy(&config, strategy)?;
    let (start, end, interval) = default_window(&config)?;
    let bt_config = load_backtest_config(&config, interval)?;
    let model_kind = match strategy {
        Strategy::ModelDriven { kind, .. } => Some(kind),
        _ => None,
    };
    let model_config = load_model_config(&config, model_kind)?;

    let symbols = resolve_tickers(tickers, &config, &store)?;
    let universe = load_universe(&store, &symbols, start, end, interval)?;
    for s in &universe.skipped {
        eprintln!("skipped {}: {}", s.symbol, s.reason);
    }

    eprintln!("Running {} over {}", strategy.describe(), universe.symbols().join(", "));
    let result = run_backtest_engine(&universe.series, &strategy, &bt_config, &model_config)?;

    let (s, b) = (&result.stats, &result.benchmark_stats);
    println!("{:<14} {:>12} {:>12}", "", "strategy", "buy & hold");
    println!(
        "{:<14} {:>12.2} {:>12.2}",
        "final equity",
        result.final_equity(),
        result.benchmark.last().map(|p| p.equity).unwrap_or_default()
    );
    let rows = [
        ("total return %", s.total_return * 100.0, b.total_return * 100.0),
        ("cagr %", s.cagr * 100.0, b.cagr * 100.0),
        ("volatility %", s.volatility * 100.0, b.volatility * 100.0),
        ("sharpe", s.sharpe_ratio, b.sharpe_ratio),
        ("sortino", s.sortino_ratio, b.sortino_ratio),
        ("max dd %", s.max_drawdown * 100.0, b.max_drawdown * 100.0),
    ];
    for (label, strat, bench) in rows {
        println!("{label:<14} {strat:>12.2} {bench:>12.2}");
    }
    let t = &result.trade_stats;
    println!(
        "trades {} (won {}, lost {}), win rate {:.1}%, profit factor {:.2}",
        t.total_trades,
        t.trades_won,
        t.trades_lost,
        t.win_rate * 100.0,
        t.profit_factor
    );
    Ok(())
}

fn run_serve(config_path: &Path) -> Result<(), StockportError> {
    #[cfg(feature = "web")]
    {
        use crate::adapters::web::{AppState, build_router};
        use crate::domain::config_validation::listen_addr;

        eprintln!("Loading config from {}", config_path.display());
        let config = load_config(config_path)?;
        let settings = load_backfill_settings(&config)?;
        let addr = listen_addr(&config)?;

        let store = Arc::new(SqliteAdapter::from_config(&config)?);
        let quotes: Arc<dyn QuoteSource + Send + Sync> = Arc::from(quote_source(&settings));
        let news_source = Arc::new(MockNewsSource::new(settings.seed));

        if settings.seed_on_start {
            let end = Utc::now().date_naive();
            let start = end - Duration::days(settings.lookback_days);
            let symbols = default_tickers(&config)?;
            if let Some(job) =
                seed_if_empty(quotes.as_ref(), store.as_ref(), &symbols, start, end, settings.max_days)?
            {
                eprintln!("Seeded {} bars for {}", job.bars_written, symbols.join(", "));
                let now = Utc::now().naive_utc();
                let per_ticker = load_news_settings(&config)?.items_per_ticker;
                for t in store.list_tickers()? {
                    let items = news_source.fetch_news(&t.symbol, &t.company_name, now, per_ticker)?;
                    store.store_news(&items)?;
                }
            }
        }

        let state = AppState::new(
            store.clone(),
            store,
            Arc::new(config),
            quotes,
            news_source,
        )?;
        let router = build_router(state);

        eprintln!("Starting web server on http://{addr}");
        log::info!("listening on {addr}");
        let runtime = tokio::runtime::Runtime::new()?;
        runtime.block_on(async {
            let listener = tokio::net::TcpListener::bind(addr).await?;
            axum::serve(listener, router).await
        })?;
        Ok(())
    }

    #[cfg(not(feature = "web"))]
    {
        let _ = config_path;
        Err(StockportError::validation(
            "the web feature is required for serve",
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_backfill_arguments() {
        let cli = Cli::try_parse_from([
            "stockport",
            "backfill",
            "--config",
            "stockport.ini",
            "--tickers",
            "AAPL,MSFT",
            "--start",
            "2024-01-01",
        ])
        .unwrap();
        match cli.command {
            Command::Backfill {
                tickers, start, end, ..
            } => {
                assert_eq!(tickers.as_deref(), Some("AAPL,MSFT"));
                assert_eq!(start, NaiveDate::from_ymd_opt(2024, 1, 1));
                assert_eq!(end, None);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn parses_ticker_subcommands() {
        let cli = Cli::try_parse_from([
            "stockport", "tickers", "-c", "x.ini", "add", "nvda", "--name", "NVIDIA",
        ])
        .unwrap();
        assert!(matches!(
            cli.command,
            Command::Tickers {
                action: TickerAction::Add { ref symbol, name: Some(ref name), sector: None },
                ..
            } if symbol == "nvda" && name == "NVIDIA"
        ));
    }

    #[test]
    fn config_is_required() {
        assert!(Cli::try_parse_from(["stockport", "serve"]).is_err());
    }

    #[test]
    fn resolve_tickers_prefers_flag_then_store_then_defaults() {
        let config = FileConfigAdapter::from_string("[defaults]\ntickers = IBM,ORCL\n").unwrap();
        let store = SqliteAdapter::in_memory().unwrap();

        assert_eq!(
            resolve_tickers(Some("aapl, msft"), &config, &store).unwrap(),
            vec!["AAPL", "MSFT"]
        );
        assert_eq!(
            resolve_tickers(None, &config, &store).unwrap(),
            vec!["IBM", "ORCL"]
        );

        let now = Utc::now().naive_utc();
        store
            .insert_ticker(&TickerRecord::new("NVDA", "NVIDIA", "Technology", now))
            .unwrap();
        assert_eq!(resolve_tickers(None, &config, &store).unwrap(), vec!["NVDA"]);
    }

    #[test]
    fn missing_config_file_is_a_parse_error() {
        let err = load_config(Path::new("/nonexistent/stockport.ini")).err().unwrap();
        assert!(matches!(err, StockportError::ConfigParse { .. }));
    }
}
