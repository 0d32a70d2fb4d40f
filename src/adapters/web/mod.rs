//! Web server adapter.
//!
//! Axum server with an HTMX front end. Full-page requests get the layout with
//! the sidebar; requests carrying `HX-Request` get only the page fragment.

mod cache;
mod error;
mod handlers;
mod session;
mod templates;

pub use cache::TtlCache;
pub use error::{WebError, status_from_error};
pub use handlers::*;

use axum::{
    Router,
    routing::{get, post},
};
use std::sync::Arc;
use tower_http::services::ServeDir;
use tower_sessions::{Expiry, MemoryStore, SessionManagerLayer};

use crate::domain::backtest::BacktestResult;
use crate::domain::config_validation::{
    NewsSettings, cache_ttl, load_backfill_settings, load_news_settings, load_portfolios,
    load_session_defaults,
};
use crate::domain::dashboard::DashboardReport;
use crate::domain::error::StockportError;
use crate::domain::ml::ModelReport;
use crate::domain::portfolio::Portfolio;
use crate::domain::session::SessionDefaults;
use crate::domain::universe::SkippedSymbol;
use crate::ports::config_port::ConfigPort;
use crate::ports::data_port::DataPort;
use crate::ports::news_port::NewsPort;
use crate::ports::quote_source::{NewsSource, QuoteSource};

/// Settings read once at start-up.
pub struct WebSettings {
    pub portfolios: Vec<Portfolio>,
    pub session_defaults: SessionDefaults,
    pub news: NewsSettings,
    pub risk_free_rate: f64,
    pub backfill_lookback_days: i64,
    pub backfill_max_days: i64,
}

impl WebSettings {
    pub fn from_config(config: &dyn ConfigPort) -> Result<Self, StockportError> {
        let portfolios = load_portfolios(config)?;
        let session_defaults = load_session_defaults(config, &portfolios)?;
        let backfill = load_backfill_settings(config)?;
        Ok(Self {
            session_defaults,
            portfolios,
            news: load_news_settings(config)?,
            risk_free_rate: config.get_double("backtest", "risk_free_rate", 0.02),
            backfill_lookback_days: backfill.lookback_days,
            backfill_max_days: backfill.max_days,
        })
    }
}

/// A computation together with the symbols it had to leave out.
pub struct Analysis<T> {
    pub value: T,
    pub skipped: Vec<SkippedSymbol>,
}

pub struct PageCaches {
    pub dashboard: TtlCache<Analysis<DashboardReport>>,
    pub model: TtlCache<Analysis<ModelReport>>,
    pub backtest: TtlCache<Analysis<BacktestResult>>,
}

impl PageCaches {
    pub fn new(ttl: std::time::Duration) -> Self {
        Self {
            dashboard: TtlCache::new(ttl),
            model: TtlCache::new(ttl),
            backtest: TtlCache::new(ttl),
        }
    }

    pub fn clear(&self) {
        self.dashboard.clear();
        self.model.clear();
        self.backtest.clear();
        log::debug!("page caches cleared");
    }
}

pub struct AppState {
    pub data_port: Arc<dyn DataPort + Send + Sync>,
    pub news_port: Arc<dyn NewsPort + Send + Sync>,
    pub config: Arc<dyn ConfigPort + Send + Sync>,
    pub quote_source: Arc<dyn QuoteSource + Send + Sync>,
    pub news_source: Arc<dyn NewsSource + Send + Sync>,
    pub settings: WebSettings,
    pub caches: PageCaches,
}

impl AppState {
    pub fn new(
        data_port: Arc<dyn DataPort + Send + Sync>,
        news_port: Arc<dyn NewsPort + Send + Sync>,
        config: Arc<dyn ConfigPort + Send + Sync>,
        quote_source: Arc<dyn QuoteSource + Send + Sync>,
        news_source: Arc<dyn NewsSource + Send + Sync>,
    ) -> Result<Self, StockportError> {
        let settings = WebSettings::from_config(config.as_ref())?;
        let caches = PageCaches::new(cache_ttl(config.as_ref()));
        Ok(Self {
            data_port,
            news_port,
            config,
            quote_source,
            news_source,
            settings,
            caches,
        })
    }
}

pub fn build_router(state: AppState) -> Router {
    let sessions = SessionManagerLayer::new(MemoryStore::default())
        .with_secure(false)
        .with_expiry(Expiry::OnInactivity(time::Duration::days(1)));

    Router::new()
        .route("/", get(handlers::dashboard))
        .route("/data", get(handlers::data_page))
        .route("/data/tickers", post(handlers::add_ticker))
        .route("/data/tickers/{symbol}", post(handlers::edit_ticker))
        .route("/data/tickers/{symbol}/toggle", post(handlers::toggle_ticker))
        .route("/data/tickers/{symbol}/delete", post(handlers::delete_ticker))
        .route("/data/backfill", post(handlers::backfill))
        .route("/news", get(handlers::news_page))
        .route("/news/refresh", post(handlers::refresh_news))
        .route("/model", get(handlers::model_page))
        .route("/model/train", post(handlers::train_model))
        .route("/backtest", get(handlers::backtest_page))
        .route("/backtest/run", post(handlers::run_backtest))
        .route("/session", post(handlers::update_session))
        .route("/cache/clear", post(handlers::clear_cache))
        .nest_service("/static", ServeDir::new("static"))
        .fallback(handlers::not_found)
        .layer(sessions)
        .with_state(Arc::new(state))
}

fn is_htmx_request(headers: &axum::http::HeaderMap) -> bool {
    headers.get("HX-Request").is_some()
}
