//! HTTP request handlers for web adapter.

use askama::Template;
use axum::{
    Form,
    extract::{Path, State},
    http::HeaderMap,
    response::{Html, IntoResponse, Redirect, Response},
};
use chrono::{Duration, NaiveDate, Utc};
use serde::Deserialize;
use std::collections::{BTreeSet, HashMap};
use std::str::FromStr;
use std::sync::Arc;
use tower_sessions::Session;

use crate::adapters::svg_chart::{AxisFormat, LineSeries, bar_chart, line_chart};
use crate::domain::analytics::drawdown_series;
use crate::domain::backfill::{JobStatus, coverage, run_backfill};
use crate::domain::backtest::{BacktestConfig, BacktestResult, run_backtest as run_backtest_engine};
use crate::domain::config_validation::{load_backtest_config, load_model_config, load_strategy};
use crate::domain::dashboard::{DashboardReport, build_dashboard};
use crate::domain::error::StockportError;
use crate::domain::features::build_dataset;
use crate::domain::interval::Interval;
use crate::domain::ml::{ModelConfig, ModelKind, ModelReport, train_and_evaluate};
use crate::domain::news::{extract_topics, sentiment_summary, sentiment_trend, tag_tickers};
use crate::domain::portfolio::find_portfolio;
use crate::domain::session::{SessionState, SessionUpdate};
use crate::domain::strategy::Strategy;
use crate::domain::ticker::{TickerRecord, TickerUpdate, normalize_symbol, parse_aliases};
use crate::domain::universe::{load_universe, parse_symbols};

use super::session::{load_selection, save_selection, today};
use super::templates::{
    ArticleRow, BacktestTemplate, BacktestView, BarRow, CompareRow, CoverageView,
    DashboardTemplate, DataTemplate, FoldRow, JobRow, LayoutTemplate, MetricCard, ModelTemplate,
    ModelView, NewsTemplate, OptionView, Page, PredictionRow, SidebarView, SkippedRow,
    SnapshotRow, SummaryRow, SymbolRow, TickerRow, TradeRow, WeightRow, money, nav_links,
    percent, ratio,
};
use super::{Analysis, AppState, WebError, is_htmx_request};

/// Bars per ticker in the dashboard's recent-bars table.
const RECENT_BARS: usize = 5;
const RECENT_JOBS: usize = 10;
/// Most articles shown on the news page.
const NEWS_PAGE_LIMIT: usize = 200;

type SharedState = State<Arc<AppState>>;

async fn page_context(
    state: &AppState,
    session: &Session,
) -> Result<(Vec<TickerRecord>, SessionState), WebError> {
    let tickers = state.data_port.list_tickers()?;
    let selection = load_selection(state, session, &tickers).await?;
    Ok((tickers, selection))
}

fn sidebar(
    state: &AppState,
    page: Page,
    tickers: &[TickerRecord],
    selection: &SessionState,
) -> SidebarView {
    SidebarView {
        portfolios: state
            .settings
            .portfolios
            .iter()
            .map(|p| OptionView::new(&p.name, &p.name, p.name == selection.portfolio))
            .collect(),
        tickers: tickers
            .iter()
            .filter(|t| t.included)
            .map(|t| {
                OptionView::new(
                    &t.symbol,
                    &t.symbol,
                    selection.tickers.contains(&t.symbol),
                )
            })
            .collect(),
        start: selection.start.to_string(),
        end: selection.end.to_string(),
        intervals: Interval::ALL
            .into_iter()
            .map(|i| OptionView::new(i.as_str(), i.label(), i == selection.interval))
            .collect(),
        return_to: page.path(),
    }
}

/// The page fragment for HTMX requests, otherwise the full layout.
fn respond(
    state: &AppState,
    page: Page,
    full_page: bool,
    tickers: &[TickerRecord],
    selection: &SessionState,
    content: String,
) -> Result<Response, WebError> {
    if !full_page {
        return Ok(Html(content).into_response());
    }
    let layout = LayoutTemplate {
        title: page.title(),
        nav: nav_links(page),
        sidebar: sidebar(state, page, tickers, selection),
        content,
    };
    Ok(Html(layout.render()?).into_response())
}

fn selection_key(selection: &SessionState) -> String {
    format!(
        "{}|{}|{}|{}|{}",
        selection.portfolio,
        selection.tickers.join(","),
        selection.start,
        selection.end,
        selection.interval.as_str()
    )
}

fn symbols_label(selection: &SessionState) -> String {
    if selection.tickers.is_empty() {
        "no tickers selected".to_string()
    } else {
        selection.tickers.join(", ")
    }
}

fn parse_date(raw: &str, field: &str, default: NaiveDate) -> Result<NaiveDate, WebError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(default);
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|_| WebError::bad_request(format!("invalid {field} date '{raw}'")))
}

/// Parses a form field, keeping `default` when it is blank.
fn field<T: FromStr>(raw: &str, name: &str, default: T) -> Result<T, WebError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(default);
    }
    raw.parse()
        .map_err(|_| WebError::bad_request(format!("invalid {name} '{raw}'")))
}

fn is_data_shortfall(err: &StockportError) -> bool {
    matches!(
        err,
        StockportError::NoData { .. } | StockportError::InsufficientData { .. }
    )
}

fn skipped_rows<T>(analysis: &Analysis<T>) -> Vec<SkippedRow> {
    analysis.skipped.iter().map(SkippedRow::from).collect()
}

// Dashboard

pub async fn dashboard(
    State(state): SharedState,
    headers: HeaderMap,
    session: Session,
) -> Result<Response, WebError> {
    let full = !is_htmx_request(&headers);
    render_dashboard(&state, &session, full)
        .await
        .map_err(|e| e.page(full))
}

async fn render_dashboard(
    state: &AppState,
    session: &Session,
    full: bool,
) -> Result<Response, WebError> {
    let (tickers, selection) = page_context(state, session).await?;
    let template = dashboard_template(state, &selection)?;
    respond(state, Page::Dashboard, full, &tickers, &selection, template.render()?)
}

fn dashboard_analysis(
    state: &AppState,
    selection: &SessionState,
) -> Result<Analysis<DashboardReport>, StockportError> {
    let universe = load_universe(
        state.data_port.as_ref(),
        &selection.tickers,
        selection.start,
        selection.end,
        selection.interval,
    )?;
    let symbols = universe.symbols();
    let weights = match find_portfolio(&state.settings.portfolios, &selection.portfolio) {
        Some(portfolio) => portfolio.weights_for(&symbols),
        None => {
            let w = 1.0 / symbols.len().max(1) as f64;
            symbols.iter().map(|s| (s.clone(), w)).collect::<HashMap<_, _>>()
        }
    };
    let report = build_dashboard(
        &universe.series,
        &weights,
        selection.interval,
        state.settings.risk_free_rate,
        RECENT_BARS,
    );
    Ok(Analysis {
        value: report,
        skipped: universe.skipped,
    })
}

fn dashboard_template(
    state: &AppState,
    selection: &SessionState,
) -> Result<DashboardTemplate, WebError> {
    let portfolio = selection.portfolio.clone();
    let range = format!(
        "{} to {} · {}",
        selection.start,
        selection.end,
        selection.interval.label()
    );
    if selection.tickers.is_empty() {
        return Ok(DashboardTemplate::notice(
            portfolio,
            range,
            "No tickers selected. Add or include tickers on the Data page.",
        ));
    }

    let analysis = match state
        .caches
        .dashboard
        .get_or_try_insert(selection_key(selection), || {
            dashboard_analysis(state, selection)
        }) {
        Ok(analysis) => analysis,
        Err(e) if is_data_shortfall(&e) => {
            return Ok(DashboardTemplate::notice(
                portfolio,
                range,
                format!("{e}. Run a backfill on the Data page."),
            ));
        }
        Err(e) => return Err(e.into()),
    };
    let report = &analysis.value;
    let stats = &report.stats;

    let cards = vec![
        MetricCard { label: "Total return", value: percent(stats.total_return) },
        MetricCard { label: "CAGR", value: percent(stats.cagr) },
        MetricCard { label: "Volatility", value: percent(stats.volatility) },
        MetricCard { label: "Sharpe", value: ratio(stats.sharpe_ratio) },
        MetricCard { label: "Sortino", value: ratio(stats.sortino_ratio) },
        MetricCard { label: "Max drawdown", value: percent(stats.max_drawdown) },
    ];

    let normalized: Vec<LineSeries<'_>> = report
        .normalized
        .iter()
        .map(|(symbol, values)| LineSeries { label: symbol, values })
        .collect();

    Ok(DashboardTemplate {
        portfolio,
        range,
        notice: None,
        snapshots: report
            .snapshots
            .iter()
            .map(|s| SnapshotRow {
                symbol: s.symbol.clone(),
                date: s.date.to_string(),
                close: money(s.close),
                change: format!("{:+.2}", s.change),
                change_pct: format!("{:+.2}%", s.change_pct * 100.0),
                up: s.change >= 0.0,
            })
            .collect(),
        cards,
        growth_svg: line_chart(
            &report.dates,
            &[LineSeries { label: "Portfolio", values: &report.growth }],
            AxisFormat::Ratio,
        ),
        drawdown_svg: line_chart(
            &report.dates,
            &[LineSeries { label: "Drawdown", values: &report.drawdown }],
            AxisFormat::Percent,
        ),
        normalized_svg: line_chart(&report.dates, &normalized, AxisFormat::Ratio),
        weights: report
            .weights
            .iter()
            .map(|(symbol, w)| WeightRow {
                symbol: symbol.clone(),
                weight: percent(*w),
            })
            .collect(),
        recent: report.recent_bars.iter().map(BarRow::from).collect(),
        skipped: skipped_rows(&analysis),
    })
}

// Data

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct TickerForm {
    pub symbol: String,
    pub company_name: String,
    pub sector: String,
    pub aliases: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct BackfillForm {
    pub symbols: String,
    pub start: String,
    pub end: String,
}

pub async fn data_page(
    State(state): SharedState,
    headers: HeaderMap,
    session: Session,
) -> Result<Response, WebError> {
    let full = !is_htmx_request(&headers);
    render_data(&state, &session, full, None)
        .await
        .map_err(|e| e.page(full))
}

async fn render_data(
    state: &AppState,
    session: &Session,
    full: bool,
    flash: Option<String>,
) -> Result<Response, WebError> {
    let (tickers, selection) = page_context(state, session).await?;
    let today = today();
    let rows = coverage(state.data_port.as_ref(), &tickers, today)?;
    let jobs = state.data_port.recent_backfill_jobs(RECENT_JOBS)?;
    let template = DataTemplate {
        flash,
        tickers: tickers.iter().map(TickerRow::from).collect(),
        coverage: rows.iter().map(CoverageView::from).collect(),
        jobs: jobs.iter().map(JobRow::from).collect(),
        backfill_symbols: String::new(),
        backfill_start: (today - Duration::days(state.settings.backfill_lookback_days))
            .to_string(),
        backfill_end: today.to_string(),
    };
    respond(state, Page::Data, full, &tickers, &selection, template.render()?)
}

fn require_ticker(state: &AppState, symbol: &str) -> Result<TickerRecord, StockportError> {
    state
        .data_port
        .get_ticker(symbol)?
        .ok_or_else(|| StockportError::UnknownTicker {
            symbol: symbol.to_string(),
        })
}

pub async fn add_ticker(
    State(state): SharedState,
    headers: HeaderMap,
    session: Session,
    Form(form): Form<TickerForm>,
) -> Result<Response, WebError> {
    let full = !is_htmx_request(&headers);
    let flash = insert_ticker(&state, &form).map_err(|e| e.page(full))?;
    state.caches.clear();
    render_data(&state, &session, full, Some(flash))
        .await
        .map_err(|e| e.page(full))
}

fn insert_ticker(state: &AppState, form: &TickerForm) -> Result<String, WebError> {
    let symbol = normalize_symbol(&form.symbol)?;
    if state.data_port.get_ticker(&symbol)?.is_some() {
        return Err(WebError::bad_request(format!("{symbol} is already tracked")));
    }

    let mut company_name = form.company_name.trim().to_string();
    let mut sector = form.sector.trim().to_string();
    if company_name.is_empty() || sector.is_empty() {
        match state.quote_source.company_info(&symbol) {
            Ok(info) => {
                if company_name.is_empty() {
                    company_name = info.long_name;
                }
                if sector.is_empty() {
                    sector = info.sector;
                }
            }
            Err(e) => log::warn!("no company info for {symbol}: {e}"),
        }
    }

    let mut record = TickerRecord::new(&symbol, &company_name, &sector, Utc::now().naive_utc());
    record.aliases = parse_aliases(&form.aliases);
    state.data_port.insert_ticker(&record)?;
    log::info!("added ticker {symbol}");
    Ok(format!("Added {symbol}. Run a backfill to load its prices."))
}

pub async fn edit_ticker(
    State(state): SharedState,
    headers: HeaderMap,
    session: Session,
    Path(symbol): Path<String>,
    Form(form): Form<TickerForm>,
) -> Result<Response, WebError> {
    let full = !is_htmx_request(&headers);
    let non_empty = |s: &str| {
        let s = s.trim();
        (!s.is_empty()).then(|| s.to_string())
    };
    let update = TickerUpdate {
        company_name: non_empty(&form.company_name),
        sector: non_empty(&form.sector),
        aliases: Some(parse_aliases(&form.aliases)),
        included: None,
    };
    let record = normalize_symbol(&symbol)
        .and_then(|s| state.data_port.update_ticker(&s, &update, Utc::now().naive_utc()))
        .map_err(|e| WebError::from(e).page(full))?;
    state.caches.clear();
    render_data(&state, &session, full, Some(format!("Saved {}.", record.symbol)))
        .await
        .map_err(|e| e.page(full))
}

pub async fn toggle_ticker(
    State(state): SharedState,
    headers: HeaderMap,
    session: Session,
    Path(symbol): Path<String>,
) -> Result<Response, WebError> {
    let full = !is_htmx_request(&headers);
    let record = normalize_symbol(&symbol)
        .and_then(|s| require_ticker(&state, &s))
        .and_then(|t| {
            let update = TickerUpdate {
                included: Some(!t.included),
                ..Default::default()
            };
            state
                .data_port
                .update_ticker(&t.symbol, &update, Utc::now().naive_utc())
        })
        .map_err(|e| WebError::from(e).page(full))?;
    state.caches.clear();
    let verb = if record.included { "Included" } else { "Excluded" };
    render_data(&state, &session, full, Some(format!("{verb} {}.", record.symbol)))
        .await
        .map_err(|e| e.page(full))
}

pub async fn delete_ticker(
    State(state): SharedState,
    headers: HeaderMap,
    session: Session,
    Path(symbol): Path<String>,
) -> Result<Response, WebError> {
    let full = !is_htmx_request(&headers);
    let symbol = normalize_symbol(&symbol)
        .and_then(|s| state.data_port.delete_ticker(&s).map(|()| s))
        .map_err(|e| WebError::from(e).page(full))?;
    log::info!("deleted ticker {symbol}");
    state.caches.clear();
    render_data(&state, &session, full, Some(format!("Deleted {symbol} and its stored data.")))
        .await
        .map_err(|e| e.page(full))
}

pub async fn backfill(
    State(state): SharedState,
    headers: HeaderMap,
    session: Session,
    Form(form): Form<BackfillForm>,
) -> Result<Response, WebError> {
    let full = !is_htmx_request(&headers);
    let flash = start_backfill(&state, &form).map_err(|e| e.page(full))?;
    state.caches.clear();
    render_data(&state, &session, full, Some(flash))
        .await
        .map_err(|e| e.page(full))
}

fn start_backfill(state: &AppState, form: &BackfillForm) -> Result<String, WebError> {
    let today = today();
    let start = parse_date(
        &form.start,
        "start",
        today - Duration::days(state.settings.backfill_lookback_days),
    )?;
    let end = parse_date(&form.end, "end", today)?;
    let symbols = if form.symbols.trim().is_empty() {
        state
            .data_port
            .list_tickers()?
            .into_iter()
            .filter(|t| t.included)
            .map(|t| t.symbol)
            .collect()
    } else {
        parse_symbols(&form.symbols).map_err(StockportError::from)?
    };

    let job = run_backfill(
        state.quote_source.as_ref(),
        state.data_port.as_ref(),
        &symbols,
        start,
        end,
        Interval::Daily,
        state.settings.backfill_max_days,
    )?;
    Ok(match job.status {
        JobStatus::Failed => format!(
            "Backfill job #{} failed: {}",
            job.id,
            job.error.unwrap_or_default()
        ),
        _ => format!(
            "Backfill job #{} wrote {} bars for {} tickers.",
            job.id,
            job.bars_written,
            job.symbols.len()
        ),
    })
}

// News

pub async fn news_page(
    State(state): SharedState,
    headers: HeaderMap,
    session: Session,
) -> Result<Response, WebError> {
    let full = !is_htmx_request(&headers);
    render_news(&state, &session, full, None)
        .await
        .map_err(|e| e.page(full))
}

async fn render_news(
    state: &AppState,
    session: &Session,
    full: bool,
    flash: Option<String>,
) -> Result<Response, WebError> {
    let (tickers, selection) = page_context(state, session).await?;
    let settings = &state.settings.news;
    let since = Utc::now().naive_utc() - Duration::days(settings.lookback_days);
    let items = state
        .news_port
        .fetch_news(&selection.tickers, since, NEWS_PAGE_LIMIT)?;

    let trend = sentiment_trend(&items, None);
    let dates: Vec<NaiveDate> = trend
        .iter()
        .map(|p| p.date)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    let mut per_symbol: Vec<(String, Vec<f64>)> = Vec::new();
    for point in &trend {
        if per_symbol.last().is_none_or(|(s, _)| *s != point.symbol) {
            per_symbol.push((point.symbol.clone(), vec![f64::NAN; dates.len()]));
        }
        if let (Some((_, values)), Ok(i)) = (per_symbol.last_mut(), dates.binary_search(&point.date))
        {
            values[i] = point.mean_sentiment;
        }
    }
    let lines: Vec<LineSeries<'_>> = per_symbol
        .iter()
        .map(|(symbol, values)| LineSeries { label: symbol, values })
        .collect();

    let topics: Vec<(String, f64)> = extract_topics(&items, settings.top_topics)
        .into_iter()
        .map(|t| (t.topic, t.frequency as f64))
        .collect();

    let articles = items
        .iter()
        .map(|item| {
            let text = format!("{} {}", item.headline, item.summary);
            let tags = tag_tickers(&text, &tickers)
                .into_iter()
                .filter(|m| m.symbol != item.symbol)
                .map(|m| m.symbol)
                .collect();
            ArticleRow::new(item, tags)
        })
        .collect();

    let template = NewsTemplate {
        flash,
        symbols: symbols_label(&selection),
        lookback_days: settings.lookback_days,
        summaries: sentiment_summary(&items).iter().map(SummaryRow::from).collect(),
        trend_svg: line_chart(&dates, &lines, AxisFormat::Ratio),
        topics_svg: bar_chart(&topics, AxisFormat::Count),
        articles,
    };
    respond(state, Page::News, full, &tickers, &selection, template.render()?)
}

pub async fn refresh_news(
    State(state): SharedState,
    headers: HeaderMap,
    session: Session,
) -> Result<Response, WebError> {
    let full = !is_htmx_request(&headers);
    let flash = fetch_news(&state, &session).await.map_err(|e| e.page(full))?;
    state.caches.clear();
    render_news(&state, &session, full, Some(flash))
        .await
        .map_err(|e| e.page(full))
}

async fn fetch_news(state: &AppState, session: &Session) -> Result<String, WebError> {
    let (tickers, selection) = page_context(state, session).await?;
    if selection.tickers.is_empty() {
        return Err(WebError::bad_request("no tickers selected"));
    }
    let as_of = Utc::now().naive_utc();
    let mut added = 0;
    for symbol in &selection.tickers {
        let name = tickers
            .iter()
            .find(|t| t.symbol == *symbol)
            .map(|t| t.company_name.as_str())
            .unwrap_or(symbol);
        let items = state.news_source.fetch_news(
            symbol,
            name,
            as_of,
            state.settings.news.items_per_ticker,
        )?;
        added += state.news_port.store_news(&items)?;
    }
    log::info!(
        "news refresh stored {added} new items for {} tickers",
        selection.tickers.len()
    );
    Ok(format!("Stored {added} new articles."))
}

// Model

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ModelForm {
    pub model: String,
}

fn kind_options(selected: ModelKind) -> Vec<OptionView> {
    ModelKind::ALL
        .into_iter()
        .map(|k| OptionView::new(k.as_str(), k.label(), k == selected))
        .collect()
}

fn model_key(selection: &SessionState, config: &ModelConfig) -> String {
    format!("{}|{:?}", selection_key(selection), config)
}

fn model_view(analysis: &Analysis<ModelReport>, threshold: f64) -> ModelView {
    let report = &analysis.value;
    let m = &report.mean_metrics;
    ModelView {
        kind: report.kind.label().to_string(),
        samples: report.n_samples,
        positive_rate: percent(report.positive_rate),
        cards: vec![
            MetricCard { label: "Accuracy", value: ratio(m.accuracy) },
            MetricCard { label: "Precision", value: ratio(m.precision) },
            MetricCard { label: "Recall", value: ratio(m.recall) },
            MetricCard { label: "F1", value: ratio(m.f1) },
            MetricCard { label: "Baseline accuracy", value: ratio(m.baseline_accuracy) },
        ],
        folds: report
            .folds
            .iter()
            .map(|f| FoldRow {
                fold: f.fold,
                train: f.train_size,
                test: f.test_size,
                accuracy: ratio(f.metrics.accuracy),
                precision: ratio(f.metrics.precision),
                recall: ratio(f.metrics.recall),
                f1: ratio(f.metrics.f1),
            })
            .collect(),
        importances_svg: bar_chart(&report.importances, AxisFormat::Ratio),
        latest: report
            .latest
            .iter()
            .map(|p| PredictionRow {
                symbol: p.symbol.clone(),
                date: p.date.to_string(),
                probability: ratio(p.probability_up),
                signal: if p.probability_up >= threshold { "long" } else { "flat" },
            })
            .collect(),
        skipped: skipped_rows(analysis),
    }
}

pub async fn model_page(
    State(state): SharedState,
    headers: HeaderMap,
    session: Session,
) -> Result<Response, WebError> {
    let full = !is_htmx_request(&headers);
    render_model(&state, &session, full, None)
        .await
        .map_err(|e| e.page(full))
}

pub async fn train_model(
    State(state): SharedState,
    headers: HeaderMap,
    session: Session,
    Form(form): Form<ModelForm>,
) -> Result<Response, WebError> {
    let full = !is_htmx_request(&headers);
    let kind = match form.model.trim() {
        "" => None,
        raw => Some(
            raw.parse::<ModelKind>()
                .map_err(|e| WebError::from(e).page(full))?,
        ),
    };
    render_model(&state, &session, full, Some(kind))
        .await
        .map_err(|e| e.page(full))
}

/// `train` is `None` for a plain page view, which only shows a report
/// already in the cache.
async fn render_model(
    state: &AppState,
    session: &Session,
    full: bool,
    train: Option<Option<ModelKind>>,
) -> Result<Response, WebError> {
    let (tickers, selection) = page_context(state, session).await?;
    let config = load_model_config(state.config.as_ref(), train.flatten())?;
    let key = model_key(&selection, &config);

    let analysis = match train {
        None => state.caches.model.get(&key),
        Some(_) => {
            if selection.tickers.is_empty() {
                return Err(WebError::bad_request("no tickers selected"));
            }
            Some(state.caches.model.get_or_try_insert(key, || {
                let universe = load_universe(
                    state.data_port.as_ref(),
                    &selection.tickers,
                    selection.start,
                    selection.end,
                    selection.interval,
                )?;
                let (dataset, latest) = build_dataset(&universe.series);
                let report = train_and_evaluate(&dataset, &latest, &config)?;
                Ok::<_, StockportError>(Analysis {
                    value: report,
                    skipped: universe.skipped,
                })
            })?)
        }
    };

    let template = ModelTemplate {
        symbols: symbols_label(&selection),
        kinds: kind_options(config.kind),
        report: analysis.map(|a| model_view(&a, config.threshold)),
    };
    respond(state, Page::Model, full, &tickers, &selection, template.render()?)
}

// Backtest

/// Backtest form values as typed. Blank fields keep the configured value.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct BacktestForm {
    pub strategy: String,
    pub model: String,
    pub fast: String,
    pub slow: String,
    pub rsi_period: String,
    pub rsi_lower: String,
    pub rsi_upper: String,
    pub lookback: String,
    pub threshold: String,
    pub train_ratio: String,
    pub initial_capital: String,
    pub position_size: String,
    pub max_positions: String,
    pub stop_loss_pct: String,
    pub take_profit_pct: String,
    pub commission_pct: String,
    pub slippage_pct: String,
}

impl BacktestForm {
    /// Form filled with every strategy's configured parameters.
    fn configured(state: &AppState, interval: Interval) -> Result<Self, StockportError> {
        let config = state.config.as_ref();
        let mut form = BacktestForm::default();
        for name in Strategy::NAMES {
            match load_strategy(config, Some(name))? {
                Strategy::SmaCrossover { fast, slow } => {
                    form.fast = fast.to_string();
                    form.slow = slow.to_string();
                }
                Strategy::RsiReversion { period, lower, upper } => {
                    form.rsi_period = period.to_string();
                    form.rsi_lower = lower.to_string();
                    form.rsi_upper = upper.to_string();
                }
                Strategy::Momentum { lookback } => form.lookback = lookback.to_string(),
                Strategy::ModelDriven { kind, threshold, train_ratio } => {
                    form.model = kind.as_str().to_string();
                    form.threshold = threshold.to_string();
                    form.train_ratio = train_ratio.to_string();
                }
            }
        }
        form.strategy = load_strategy(config, None)?.key().to_string();

        let bt = load_backtest_config(config, interval)?;
        form.initial_capital = bt.initial_capital.to_string();
        form.position_size = bt.params.position_size.to_string();
        form.max_positions = bt.max_positions.to_string();
        form.stop_loss_pct = bt.params.stop_loss_pct.to_string();
        form.take_profit_pct = bt.params.take_profit_pct.to_string();
        form.commission_pct = bt.execution.commission_pct.to_string();
        form.slippage_pct = bt.execution.slippage_pct.to_string();
        Ok(form)
    }

    fn strategy(&self, state: &AppState) -> Result<Strategy, WebError> {
        let name = Some(self.strategy.trim()).filter(|s| !s.is_empty());
        let strategy = match load_strategy(state.config.as_ref(), name)? {
            Strategy::SmaCrossover { fast, slow } => Strategy::SmaCrossover {
                fast: field(&self.fast, "fast period", fast)?,
                slow: field(&self.slow, "slow period", slow)?,
            },
            Strategy::RsiReversion { period, lower, upper } => Strategy::RsiReversion {
                period: field(&self.rsi_period, "RSI period", period)?,
                lower: field(&self.rsi_lower, "RSI lower band", lower)?,
                upper: field(&self.rsi_upper, "RSI upper band", upper)?,
            },
            Strategy::Momentum { lookback } => Strategy::Momentum {
                lookback: field(&self.lookback, "lookback", lookback)?,
            },
            Strategy::ModelDriven { kind, threshold, train_ratio } => Strategy::ModelDriven {
                kind: field(&self.model, "model", kind)?,
                threshold: field(&self.threshold, "threshold", threshold)?,
                train_ratio: field(&self.train_ratio, "train ratio", train_ratio)?,
            },
        };
        strategy.validate()?;
        Ok(strategy)
    }

    fn backtest_config(&self, state: &AppState, interval: Interval) -> Result<BacktestConfig, WebError> {
        let mut bt = load_backtest_config(state.config.as_ref(), interval)?;
        bt.initial_capital = field(&self.initial_capital, "initial capital", bt.initial_capital)?;
        bt.params.position_size = field(&self.position_size, "position size", bt.params.position_size)?;
        bt.max_positions = field(&self.max_positions, "max positions", bt.max_positions)?;
        bt.params.stop_loss_pct = field(&self.stop_loss_pct, "stop loss", bt.params.stop_loss_pct)?;
        bt.params.take_profit_pct =
            field(&self.take_profit_pct, "take profit", bt.params.take_profit_pct)?;
        bt.execution.commission_pct =
            field(&self.commission_pct, "commission", bt.execution.commission_pct)?;
        bt.execution.slippage_pct = field(&self.slippage_pct, "slippage", bt.execution.slippage_pct)?;
        bt.validate()?;
        Ok(bt)
    }
}

fn strategy_options(state: &AppState, selected: &str) -> Vec<OptionView> {
    Strategy::NAMES
        .into_iter()
        .map(|name| {
            let label = load_strategy(state.config.as_ref(), Some(name))
                .map(|s| s.describe())
                .unwrap_or_else(|_| name.to_string());
            OptionView::new(name, label, name == selected)
        })
        .collect()
}

fn compare_row(
    label: &'static str,
    strategy: f64,
    benchmark: f64,
    format: fn(f64) -> String,
) -> CompareRow {
    CompareRow {
        label,
        strategy: format(strategy),
        benchmark: format(benchmark),
    }
}

fn backtest_view(analysis: &Analysis<BacktestResult>) -> BacktestView {
    let result = &analysis.value;
    let (s, b) = (&result.stats, &result.benchmark_stats);
    let comparison = vec![
        compare_row("Total return", s.total_return, b.total_return, percent),
        compare_row("CAGR", s.cagr, b.cagr, percent),
        compare_row("Volatility", s.volatility, b.volatility, percent),
        compare_row("Sharpe", s.sharpe_ratio, b.sharpe_ratio, ratio),
        compare_row("Sortino", s.sortino_ratio, b.sortino_ratio, ratio),
        compare_row("Max drawdown", s.max_drawdown, b.max_drawdown, percent),
    ];

    let dates: Vec<NaiveDate> = result.rows.iter().map(|r| r.date).collect();
    let equity = result.equity_curve();
    let benchmark = result.benchmark_curve();
    let equity_dd = drawdown_series(&equity);
    let benchmark_dd = drawdown_series(&benchmark);

    let t = &result.trade_stats;
    let trade_cards = vec![
        MetricCard { label: "Trades", value: t.total_trades.to_string() },
        MetricCard { label: "Win rate", value: percent(t.win_rate) },
        MetricCard { label: "Profit factor", value: ratio(t.profit_factor) },
        MetricCard { label: "Average win", value: money(t.avg_win) },
        MetricCard { label: "Average loss", value: money(t.avg_loss) },
        MetricCard { label: "Largest win", value: money(t.largest_win) },
        MetricCard { label: "Largest loss", value: money(t.largest_loss) },
        MetricCard { label: "Avg holding days", value: format!("{:.1}", t.avg_holding_days) },
        MetricCard { label: "Total PnL", value: money(t.total_pnl) },
    ];

    BacktestView {
        strategy: result.strategy.clone(),
        final_equity: money(result.final_equity()),
        comparison,
        equity_svg: line_chart(
            &dates,
            &[
                LineSeries { label: "Strategy", values: &equity },
                LineSeries { label: "Buy & hold", values: &benchmark },
            ],
            AxisFormat::Currency,
        ),
        drawdown_svg: line_chart(
            &dates,
            &[
                LineSeries { label: "Strategy", values: &equity_dd },
                LineSeries { label: "Buy & hold", values: &benchmark_dd },
            ],
            AxisFormat::Percent,
        ),
        trade_cards,
        symbol_results: result.symbol_results.iter().map(SymbolRow::from).collect(),
        trades: result.trades.iter().map(TradeRow::from).collect(),
        skipped: skipped_rows(analysis),
    }
}

pub async fn backtest_page(
    State(state): SharedState,
    headers: HeaderMap,
    session: Session,
) -> Result<Response, WebError> {
    let full = !is_htmx_request(&headers);
    render_backtest(&state, &session, full, None)
        .await
        .map_err(|e| e.page(full))
}

pub async fn run_backtest(
    State(state): SharedState,
    headers: HeaderMap,
    session: Session,
    Form(form): Form<BacktestForm>,
) -> Result<Response, WebError> {
    let full = !is_htmx_request(&headers);
    render_backtest(&state, &session, full, Some(form))
        .await
        .map_err(|e| e.page(full))
}

async fn render_backtest(
    state: &AppState,
    session: &Session,
    full: bool,
    submitted: Option<BacktestForm>,
) -> Result<Response, WebError> {
    let (tickers, selection) = page_context(state, session).await?;
    let configured = BacktestForm::configured(state, selection.interval)?;

    let (form, report) = match submitted {
        None => (configured, None),
        Some(submitted) => {
            if selection.tickers.is_empty() {
                return Err(WebError::bad_request("no tickers selected"));
            }
            let strategy = submitted.strategy(state)?;
            let bt = submitted.backtest_config(state, selection.interval)?;
            let model_kind = match strategy {
                Strategy::ModelDriven { kind, .. } => Some(kind),
                _ => None,
            };
            let model = load_model_config(state.config.as_ref(), model_kind)?;
            let key = format!("{}|{:?}|{:?}|{:?}", selection_key(&selection), strategy, bt, model);

            let analysis = state.caches.backtest.get_or_try_insert(key, || {
                let universe = load_universe(
                    state.data_port.as_ref(),
                    &selection.tickers,
                    selection.start,
                    selection.end,
                    selection.interval,
                )?;
                let result = run_backtest_engine(&universe.series, &strategy, &bt, &model)?;
                Ok::<_, StockportError>(Analysis {
                    value: result,
                    skipped: universe.skipped,
                })
            })?;

            let mut form = submitted;
            form.strategy = strategy.key().to_string();
            if form.model.trim().is_empty() {
                form.model = configured.model.clone();
            }
            (form, Some(backtest_view(&analysis)))
        }
    };

    let selected_kind = form.model.parse().unwrap_or_default();
    let template = BacktestTemplate {
        symbols: symbols_label(&selection),
        strategies: strategy_options(state, &form.strategy),
        kinds: kind_options(selected_kind),
        form,
        report,
    };
    respond(state, Page::Backtest, full, &tickers, &selection, template.render()?)
}

// Session and cache

/// Sidebar submission. Repeated `tickers` keys carry the multi-select, so the
/// body is read as raw pairs.
pub async fn update_session(
    State(state): SharedState,
    session: Session,
    Form(pairs): Form<Vec<(String, String)>>,
) -> Result<Response, WebError> {
    let mut update = SessionUpdate {
        tickers: Some(Vec::new()),
        ..Default::default()
    };
    let mut return_to = String::new();
    for (key, value) in pairs {
        let value = value.trim();
        match key.as_str() {
            "portfolio" if !value.is_empty() => update.portfolio = Some(value.to_string()),
            "tickers" => {
                if let Some(tickers) = update.tickers.as_mut() {
                    tickers.push(normalize_symbol(value)?);
                }
            }
            "start" if !value.is_empty() => {
                update.start = Some(parse_date(value, "start", NaiveDate::MIN)?)
            }
            "end" if !value.is_empty() => update.end = Some(parse_date(value, "end", NaiveDate::MAX)?),
            "interval" if !value.is_empty() => update.interval = Some(value.parse()?),
            "return_to" => return_to = value.to_string(),
            _ => {}
        }
    }

    let tickers = state.data_port.list_tickers()?;
    let mut selection = load_selection(&state, &session, &tickers).await?;
    selection.apply(update)?;
    selection.normalize(&tickers, &state.settings.portfolios);
    save_selection(&session, &selection).await?;
    log::debug!("session selection now {}", selection_key(&selection));

    Ok(Redirect::to(Page::from_path(&return_to).path()).into_response())
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ReturnTo {
    pub return_to: String,
}

pub async fn clear_cache(
    State(state): SharedState,
    Form(form): Form<ReturnTo>,
) -> Result<Response, WebError> {
    state.caches.clear();
    log::info!("caches cleared from the sidebar");
    Ok(Redirect::to(Page::from_path(&form.return_to).path()).into_response())
}

pub async fn not_found(headers: HeaderMap) -> WebError {
    WebError::not_found("page not found").page(!is_htmx_request(&headers))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_keeps_default_for_blank_input() {
        assert_eq!(field("", "fast", 10usize).unwrap(), 10);
        assert_eq!(field(" 12 ", "fast", 10usize).unwrap(), 12);
        let err = field("ten", "fast", 10usize).unwrap_err();
        assert_eq!(err.status, axum::http::StatusCode::BAD_REQUEST);
    }

    #[test]
    fn parse_date_validates_format() {
        let default = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        assert_eq!(parse_date("", "start", default).unwrap(), default);
        assert_eq!(
            parse_date("2024-03-05", "start", default).unwrap(),
            NaiveDate::from_ymd_opt(2024, 3, 5).unwrap()
        );
        assert!(parse_date("05/03/2024", "start", default).is_err());
    }

    #[test]
    fn selection_key_covers_every_field() {
        let base = SessionState {
            portfolio: "core".into(),
            tickers: vec!["AAPL".into(), "MSFT".into()],
            start: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            end: NaiveDate::from_ymd_opt(2024, 6, 1).unwrap(),
            interval: Interval::Daily,
        };
        let mut weekly = base.clone();
        weekly.interval = Interval::Weekly;
        let mut fewer = base.clone();
        fewer.tickers.pop();
        assert_ne!(selection_key(&base), selection_key(&weekly));
        assert_ne!(selection_key(&base), selection_key(&fewer));
        assert_eq!(selection_key(&base), selection_key(&base.clone()));
    }
}
