//! Upstream market-data and news sources.
//!
//! Only generated and file-backed implementations exist; a network API would
//! implement the same traits.

use crate::domain::error::StockportError;
use crate::domain::news::NewsItem;
use crate::domain::ohlcv::OhlcvBar;
use crate::domain::ticker::CompanyInfo;
use chrono::{NaiveDate, NaiveDateTime};

pub trait QuoteSource {
    fn name(&self) -> &str;

    /// Daily bars for `symbol` in `[start, end]`, ordered by date.
    fn fetch_history(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<OhlcvBar>, StockportError>;

    fn company_info(&self, symbol: &str) -> Result<CompanyInfo, StockportError>;
}

pub trait NewsSource {
    /// Up to `count` items about `symbol` published on or before `as_of`.
    fn fetch_news(
        &self,
        symbol: &str,
        company_name: &str,
        as_of: NaiveDateTime,
        count: usize,
    ) -> Result<Vec<NewsItem>, StockportError>;
}
