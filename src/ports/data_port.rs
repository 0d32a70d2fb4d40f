//! Price, ticker and backfill-job storage port.

use crate::domain::backfill::BackfillJob;
use crate::domain::error::StockportError;
use crate::domain::ohlcv::OhlcvBar;
use crate::domain::ticker::{TickerRecord, TickerUpdate};
use chrono::{NaiveDate, NaiveDateTime};

pub trait DataPort {
    /// Daily bars for `symbol` in `[start_date, end_date]`, ordered by date.
    fn fetch_ohlcv(
        &self,
        symbol: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<Vec<OhlcvBar>, StockportError>;

    /// Upserts bars keyed by (symbol, date). Returns the number written.
    fn store_ohlcv(&self, bars: &[OhlcvBar]) -> Result<usize, StockportError>;

    /// First date, last date and bar count stored for `symbol`.
    fn get_data_range(
        &self,
        symbol: &str,
    ) -> Result<Option<(NaiveDate, NaiveDate, usize)>, StockportError>;

    fn list_tickers(&self) -> Result<Vec<TickerRecord>, StockportError>;

    fn get_ticker(&self, symbol: &str) -> Result<Option<TickerRecord>, StockportError>;

    /// Fails with a validation error when the symbol already exists.
    fn insert_ticker(&self, ticker: &TickerRecord) -> Result<(), StockportError>;

    fn update_ticker(
        &self,
        symbol: &str,
        update: &TickerUpdate,
        now: NaiveDateTime,
    ) -> Result<TickerRecord, StockportError>;

    /// Removes the ticker together with its stored bars.
    fn delete_ticker(&self, symbol: &str) -> Result<(), StockportError>;

    /// Persists a new job and returns its id.
    fn insert_backfill_job(&self, job: &BackfillJob) -> Result<i64, StockportError>;

    fn update_backfill_job(&self, job: &BackfillJob) -> Result<(), StockportError>;

    /// Most recent jobs first.
    fn recent_backfill_jobs(&self, limit: usize) -> Result<Vec<BackfillJob>, StockportError>;
}
