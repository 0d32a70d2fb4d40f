//! HTML templates using Askama, and the display rows they render.

use askama::Template;

use crate::domain::backfill::{BackfillJob, CoverageRow};
use crate::domain::metrics::SymbolResult;
use crate::domain::news::{NewsItem, SentimentSummary};
use crate::domain::ohlcv::OhlcvBar;
use crate::domain::position::ClosedTrade;
use crate::domain::ticker::TickerRecord;
use crate::domain::universe::SkippedSymbol;

use super::handlers::BacktestForm;

pub fn money(value: f64) -> String {
    format!("{value:.2}")
}

pub fn percent(value: f64) -> String {
    format!("{:.2}%", value * 100.0)
}

pub fn ratio(value: f64) -> String {
    format!("{value:.2}")
}

/// The five top-level pages, in navigation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Page {
    Dashboard,
    Data,
    News,
    Model,
    Backtest,
}

impl Page {
    pub const ALL: [Page; 5] = [Page::Dashboard, Page::Data, Page::News, Page::Model, Page::Backtest];

    pub fn path(&self) -> &'static str {
        match self {
            Page::Dashboard => "/",
            Page::Data => "/data",
            Page::News => "/news",
            Page::Model => "/model",
            Page::Backtest => "/backtest",
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            Page::Dashboard => "Dashboard",
            Page::Data => "Data",
            Page::News => "News",
            Page::Model => "Model",
            Page::Backtest => "Backtest",
        }
    }

    /// Known page for a `return_to` form value; anything else maps to the
    /// dashboard.
    pub fn from_path(path: &str) -> Page {
        Page::ALL
            .into_iter()
            .find(|p| p.path() == path)
            .unwrap_or(Page::Dashboard)
    }
}

pub struct NavLink {
    pub path: &'static str,
    pub title: &'static str,
    pub active: bool,
}

pub fn nav_links(active: Page) -> Vec<NavLink> {
    Page::ALL
        .into_iter()
        .map(|p| NavLink {
            path: p.path(),
            title: p.title(),
            active: p == active,
        })
        .collect()
}

pub struct OptionView {
    pub value: String,
    pub label: String,
    pub selected: bool,
}

impl OptionView {
    pub fn new(value: impl Into<String>, label: impl Into<String>, selected: bool) -> Self {
        Self {
            value: value.into(),
            label: label.into(),
            selected,
        }
    }
}

pub struct SidebarView {
    pub portfolios: Vec<OptionView>,
    pub tickers: Vec<OptionView>,
    pub start: String,
    pub end: String,
    pub intervals: Vec<OptionView>,
    pub return_to: &'static str,
}

#[derive(Template)]
#[template(path = "layout.html")]
pub struct LayoutTemplate<'a> {
    pub title: &'a str,
    pub nav: Vec<NavLink>,
    pub sidebar: SidebarView,
    pub content: String,
}

pub struct MetricCard {
    pub label: &'static str,
    pub value: String,
}

pub struct SkippedRow {
    pub symbol: String,
    pub reason: String,
}

impl From<&SkippedSymbol> for SkippedRow {
    fn from(s: &SkippedSymbol) -> Self {
        Self {
            symbol: s.symbol.clone(),
            reason: s.reason.to_string(),
        }
    }
}

pub struct SnapshotRow {
    pub symbol: String,
    pub date: String,
    pub close: String,
    pub change: String,
    pub change_pct: String,
    pub up: bool,
}

pub struct WeightRow {
    pub symbol: String,
    pub weight: String,
}

pub struct BarRow {
    pub symbol: String,
    pub date: String,
    pub open: String,
    pub high: String,
    pub low: String,
    pub close: String,
    pub volume: i64,
}

impl From<&OhlcvBar> for BarRow {
    fn from(bar: &OhlcvBar) -> Self {
        Self {
            symbol: bar.symbol.clone(),
            date: bar.date.to_string(),
            open: money(bar.open),
            high: money(bar.high),
            low: money(bar.low),
            close: money(bar.close),
            volume: bar.volume,
        }
    }
}

#[derive(Template)]
#[template(path = "dashboard.html")]
pub struct DashboardTemplate {
    pub portfolio: String,
    pub range: String,
    pub notice: Option<String>,
    pub snapshots: Vec<SnapshotRow>,
    pub cards: Vec<MetricCard>,
    pub growth_svg: String,
    pub drawdown_svg: String,
    pub normalized_svg: String,
    pub weights: Vec<WeightRow>,
    pub recent: Vec<BarRow>,
    pub skipped: Vec<SkippedRow>,
}

impl DashboardTemplate {
    /// Page with only a message in place of charts.
    pub fn notice(portfolio: String, range: String, message: impl Into<String>) -> Self {
        Self {
            portfolio,
            range,
            notice: Some(message.into()),
            snapshots: Vec::new(),
            cards: Vec::new(),
            growth_svg: String::new(),
            drawdown_svg: String::new(),
            normalized_svg: String::new(),
            weights: Vec::new(),
            recent: Vec::new(),
            skipped: Vec::new(),
        }
    }
}

pub struct TickerRow {
    pub symbol: String,
    pub company_name: String,
    pub sector: String,
    pub aliases: String,
    pub included: bool,
    pub updated: String,
}

impl From<&TickerRecord> for TickerRow {
    fn from(t: &TickerRecord) -> Self {
        Self {
            symbol: t.symbol.clone(),
            company_name: t.company_name.clone(),
            sector: t.sector.clone(),
            aliases: t.aliases.join(", "),
            included: t.included,
            updated: t.updated_at.format("%Y-%m-%d %H:%M").to_string(),
        }
    }
}

pub struct CoverageView {
    pub symbol: String,
    pub included: bool,
    pub first: String,
    pub last: String,
    pub bars: usize,
    pub last_close: String,
    pub status: &'static str,
}

impl From<&CoverageRow> for CoverageView {
    fn from(c: &CoverageRow) -> Self {
        let date = |d: Option<chrono::NaiveDate>| d.map(|d| d.to_string()).unwrap_or_default();
        Self {
            symbol: c.symbol.clone(),
            included: c.included,
            first: date(c.first_date),
            last: date(c.last_date),
            bars: c.bars,
            last_close: c.last_close.map(money).unwrap_or_default(),
            status: c.status.as_str(),
        }
    }
}

pub struct JobRow {
    pub id: i64,
    pub symbols: String,
    pub range: String,
    pub status: &'static str,
    pub bars: usize,
    pub started: String,
    pub finished: String,
    pub error: String,
}

impl From<&BackfillJob> for JobRow {
    fn from(j: &BackfillJob) -> Self {
        let stamp = |t: chrono::NaiveDateTime| t.format("%Y-%m-%d %H:%M:%S").to_string();
        Self {
            id: j.id,
            symbols: j.symbols.join(", "),
            range: format!("{} to {} ({})", j.start, j.end, j.interval),
            status: j.status.as_str(),
            bars: j.bars_written,
            started: stamp(j.started_at),
            finished: j.finished_at.map(stamp).unwrap_or_default(),
            error: j.error.clone().unwrap_or_default(),
        }
    }
}

#[derive(Template)]
#[template(path = "data.html")]
pub struct DataTemplate {
    pub flash: Option<String>,
    pub tickers: Vec<TickerRow>,
    pub coverage: Vec<CoverageView>,
    pub jobs: Vec<JobRow>,
    pub backfill_symbols: String,
    pub backfill_start: String,
    pub backfill_end: String,
}

pub struct SummaryRow {
    pub symbol: String,
    pub articles: usize,
    pub mean: String,
    pub label: &'static str,
    pub positive: usize,
    pub neutral: usize,
    pub negative: usize,
}

impl From<&SentimentSummary> for SummaryRow {
    fn from(s: &SentimentSummary) -> Self {
        Self {
            symbol: s.symbol.clone(),
            articles: s.articles,
            mean: ratio(s.mean_sentiment),
            label: s.label().as_str(),
            positive: s.positive,
            neutral: s.neutral,
            negative: s.negative,
        }
    }
}

pub struct ArticleRow {
    pub symbol: String,
    pub published: String,
    pub headline: String,
    pub publisher: String,
    pub url: String,
    pub summary: String,
    pub sentiment: String,
    pub label: &'static str,
    pub topic: String,
    /// Other tracked tickers the text mentions.
    pub tags: String,
}

impl ArticleRow {
    pub fn new(item: &NewsItem, tags: Vec<String>) -> Self {
        Self {
            symbol: item.symbol.clone(),
            published: item.published_at.format("%Y-%m-%d %H:%M").to_string(),
            headline: item.headline.clone(),
            publisher: item.publisher.clone(),
            url: item.url.clone(),
            summary: item.summary.clone(),
            sentiment: ratio(item.sentiment),
            label: item.label().as_str(),
            topic: item.topic.clone(),
            tags: tags.join(", "),
        }
    }
}

#[derive(Template)]
#[template(path = "news.html")]
pub struct NewsTemplate {
    pub flash: Option<String>,
    pub symbols: String,
    pub lookback_days: i64,
    pub summaries: Vec<SummaryRow>,
    pub trend_svg: String,
    pub topics_svg: String,
    pub articles: Vec<ArticleRow>,
}

pub struct FoldRow {
    pub fold: usize,
    pub train: usize,
    pub test: usize,
    pub accuracy: String,
    pub precision: String,
    pub recall: String,
    pub f1: String,
}

pub struct PredictionRow {
    pub symbol: String,
    pub date: String,
    pub probability: String,
    pub signal: &'static str,
}

pub struct ModelView {
    pub kind: String,
    pub samples: usize,
    pub positive_rate: String,
    pub cards: Vec<MetricCard>,
    pub folds: Vec<FoldRow>,
    pub importances_svg: String,
    pub latest: Vec<PredictionRow>,
    pub skipped: Vec<SkippedRow>,
}

#[derive(Template)]
#[template(path = "model.html")]
pub struct ModelTemplate {
    pub symbols: String,
    pub kinds: Vec<OptionView>,
    pub report: Option<ModelView>,
}

pub struct CompareRow {
    pub label: &'static str,
    pub strategy: String,
    pub benchmark: String,
}

pub struct SymbolRow {
    pub symbol: String,
    pub trades: usize,
    pub won: usize,
    pub lost: usize,
    pub win_rate: String,
    pub pnl: String,
}

impl From<&SymbolResult> for SymbolRow {
    fn from(r: &SymbolResult) -> Self {
        Self {
            symbol: r.symbol.clone(),
            trades: r.total_trades,
            won: r.winning_trades,
            lost: r.losing_trades,
            win_rate: percent(r.win_rate),
            pnl: money(r.total_pnl),
        }
    }
}

pub struct TradeRow {
    pub symbol: String,
    pub entry_date: String,
    pub exit_date: String,
    pub quantity: i64,
    pub entry_price: String,
    pub exit_price: String,
    pub pnl: String,
    pub reason: &'static str,
}

impl From<&ClosedTrade> for TradeRow {
    fn from(t: &ClosedTrade) -> Self {
        Self {
            symbol: t.symbol.clone(),
            entry_date: t.entry_date.to_string(),
            exit_date: t.exit_date.to_string(),
            quantity: t.quantity,
            entry_price: money(t.entry_price),
            exit_price: money(t.exit_price),
            pnl: money(t.pnl),
            reason: t.reason.as_str(),
        }
    }
}

pub struct BacktestView {
    pub strategy: String,
    pub final_equity: String,
    pub comparison: Vec<CompareRow>,
    pub equity_svg: String,
    pub drawdown_svg: String,
    pub trade_cards: Vec<MetricCard>,
    pub symbol_results: Vec<SymbolRow>,
    pub trades: Vec<TradeRow>,
    pub skipped: Vec<SkippedRow>,
}

#[derive(Template)]
#[template(path = "backtest.html")]
pub struct BacktestTemplate {
    pub symbols: String,
    pub strategies: Vec<OptionView>,
    pub kinds: Vec<OptionView>,
    pub form: BacktestForm,
    pub report: Option<BacktestView>,
}
