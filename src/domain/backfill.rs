//! Backfill jobs and stored-data coverage.

use chrono::{Duration, NaiveDate, NaiveDateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

use crate::domain::error::StockportError;
use crate::domain::interval::Interval;
use crate::domain::ticker::TickerRecord;
use crate::ports::data_port::DataPort;
use crate::ports::quote_source::QuoteSource;

/// Days after which the newest stored bar counts as stale.
pub const STALE_AFTER_DAYS: i64 = 5;

/// Widest range a single backfill may span, unless `[backfill] max_days` says otherwise.
pub const DEFAULT_MAX_BACKFILL_DAYS: i64 = 3660;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum JobStatus {
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = StockportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "running" => Ok(JobStatus::Running),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            other => Err(StockportError::validation(format!(
                "unknown job status '{other}'"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BackfillJob {
    /// Zero until the job has been persisted.
    pub id: i64,
    pub symbols: Vec<String>,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub interval: Interval,
    pub status: JobStatus,
    pub bars_written: usize,
    pub started_at: NaiveDateTime,
    pub finished_at: Option<NaiveDateTime>,
    pub error: Option<String>,
}

/// Fetches and stores bars for every symbol, recording the run as a job.
///
/// Symbols the store does not know yet are registered using the source's
/// company info. Per-symbol failures are collected into the job's error text;
/// the job fails only when no symbol succeeded. Ranges wider than
/// `max_days` are rejected before anything is fetched.
pub fn run_backfill(
    source: &dyn QuoteSource,
    store: &dyn DataPort,
    symbols: &[String],
    start: NaiveDate,
    end: NaiveDate,
    interval: Interval,
    max_days: i64,
) -> Result<BackfillJob, StockportError> {
    if start > end {
        return Err(StockportError::validation(format!(
            "start date {start} is after end date {end}"
        )));
    }
    let span = (end - start).num_days();
    if span > max_days {
        return Err(StockportError::validation(format!(
            "backfill range of {span} days exceeds the limit of {max_days} days"
        )));
    }
    if symbols.is_empty() {
        return Err(StockportError::validation("no symbols to backfill"));
    }

    let mut job = BackfillJob {
        id: 0,
        symbols: symbols.to_vec(),
        start,
        end,
        interval,
        status: JobStatus::Running,
        bars_written: 0,
        started_at: Utc::now().naive_utc(),
        finished_at: None,
        error: None,
    };
    job.id = store.insert_backfill_job(&job)?;

    let mut failures = Vec::new();
    for symbol in symbols {
        match backfill_symbol(source, store, symbol, start, end) {
            Ok(written) => {
                log::info!("backfilled {symbol}: {written} bars from {}", source.name());
                job.bars_written += written;
            }
            Err(e) => {
                log::warn!("backfill of {symbol} failed: {e}");
                failures.push(format!("{symbol}: {e}"));
            }
        }
    }

    job.status = if failures.len() == symbols.len() {
        JobStatus::Failed
    } else {
        JobStatus::Completed
    };
    if !failures.is_empty() {
        job.error = Some(failures.join("; "));
    }
    job.finished_at = Some(Utc::now().naive_utc());
    store.update_backfill_job(&job)?;

    log::info!(
        "backfill job {} {}: {} symbols, {} bars",
        job.id,
        job.status,
        symbols.len(),
        job.bars_written
    );
    Ok(job)
}

/// Backfills `symbols` when the store has no tickers yet.
pub fn seed_if_empty(
    source: &dyn QuoteSource,
    store: &dyn DataPort,
    symbols: &[String],
    start: NaiveDate,
    end: NaiveDate,
    max_days: i64,
) -> Result<Option<BackfillJob>, StockportError> {
    if !store.list_tickers()?.is_empty() {
        return Ok(None);
    }
    log::info!("empty store, seeding {} tickers from {}", symbols.len(), source.name());
    run_backfill(source, store, symbols, start, end, Interval::Daily, max_days).map(Some)
}

/// `end` minus `lookback_days`, or a validation error when that falls before
/// the earliest representable date.
pub fn lookback_start(end: NaiveDate, lookback_days: i64) -> Result<NaiveDate, StockportError> {
    end.checked_sub_signed(Duration::days(lookback_days))
        .ok_or_else(|| {
            StockportError::validation(format!("{lookback_days} days before {end} is out of range"))
        })
}

fn backfill_symbol(
    source: &dyn QuoteSource,
    store: &dyn DataPort,
    symbol: &str,
    start: NaiveDate,
    end: NaiveDate,
) -> Result<usize, StockportError> {
    if store.get_ticker(symbol)?.is_none() {
        let info = source.company_info(symbol)?;
        let record = TickerRecord::new(symbol, &info.long_name, &info.sector, Utc::now().naive_utc());
        store.insert_ticker(&record)?;
    }
    let bars = source.fetch_history(symbol, start, end)?;
    if bars.is_empty() {
        return Err(StockportError::NoData {
            symbol: symbol.to_string(),
        });
    }
    store.store_ohlcv(&bars)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CoverageStatus {
    Missing,
    Stale,
    Ok,
}

impl CoverageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CoverageStatus::Missing => "missing",
            CoverageStatus::Stale => "stale",
            CoverageStatus::Ok => "ok",
        }
    }
}

impl fmt::Display for CoverageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CoverageRow {
    pub symbol: String,
    pub included: bool,
    pub first_date: Option<NaiveDate>,
    pub last_date: Option<NaiveDate>,
    pub bars: usize,
    pub last_close: Option<f64>,
    pub status: CoverageStatus,
}

pub fn coverage(
    store: &dyn DataPort,
    tickers: &[TickerRecord],
    as_of: NaiveDate,
) -> Result<Vec<CoverageRow>, StockportError> {
    tickers
        .iter()
        .map(|t| {
            let Some((first, last, bars)) = store.get_data_range(&t.symbol)? else {
                return Ok(CoverageRow {
                    symbol: t.symbol.clone(),
                    included: t.included,
                    first_date: None,
                    last_date: None,
                    bars: 0,
                    last_close: None,
                    status: CoverageStatus::Missing,
                });
            };
            let last_close = store
                .fetch_ohlcv(&t.symbol, last, last)?
                .last()
                .map(|b| b.close);
            let status = if (as_of - last).num_days() > STALE_AFTER_DAYS {
                CoverageStatus::Stale
            } else {
                CoverageStatus::Ok
            };
            Ok(CoverageRow {
                symbol: t.symbol.clone(),
                included: t.included,
                first_date: Some(first),
                last_date: Some(last),
                bars,
                last_close,
                status,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::mock_feed::MockQuoteSource;
    use crate::adapters::sqlite_adapter::SqliteAdapter;
    use crate::domain::ohlcv::OhlcvBar;
    use crate::domain::ticker::CompanyInfo;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    /// Produces one flat bar per calendar day; fails for "BAD".
    struct StubSource;

    impl QuoteSource for StubSource {
        fn name(&self) -> &str {
            "stub"
        }

        fn fetch_history(
            &self,
            symbol: &str,
            start: NaiveDate,
            end: NaiveDate,
        ) -> Result<Vec<OhlcvBar>, StockportError> {
            if symbol == "BAD" {
                return Err(StockportError::Source {
                    symbol: symbol.into(),
                    reason: "unavailable".into(),
                });
            }
            Ok(start
                .iter_days()
                .take_while(|d| *d <= end)
                .map(|d| OhlcvBar {
                    symbol: symbol.into(),
                    date: d,
                    open: 10.0,
                    high: 11.0,
                    low: 9.0,
                    close: 10.5,
                    volume: 100,
                })
                .collect())
        }

        fn company_info(&self, symbol: &str) -> Result<CompanyInfo, StockportError> {
            Ok(CompanyInfo {
                long_name: format!("{symbol} Corp."),
                sector: "Unknown".into(),
            })
        }
    }

    #[test]
    fn rejects_inverted_range() {
        let store = SqliteAdapter::in_memory().unwrap();
        let err = run_backfill(
            &StubSource,
            &store,
            &["AAA".into()],
            date(2024, 2, 1),
            date(2024, 1, 1),
            Interval::Daily,
            DEFAULT_MAX_BACKFILL_DAYS,
        )
        .unwrap_err();
        assert!(matches!(err, StockportError::Validation { .. }));
    }

    #[test]
    fn rejects_range_wider_than_the_limit() {
        let store = SqliteAdapter::in_memory().unwrap();
        let err = run_backfill(
            &StubSource,
            &store,
            &["AAA".into()],
            date(1, 1, 1),
            date(9999, 12, 31),
            Interval::Daily,
            DEFAULT_MAX_BACKFILL_DAYS,
        )
        .unwrap_err();
        assert!(matches!(err, StockportError::Validation { .. }));
        assert!(store.recent_backfill_jobs(5).unwrap().is_empty());

        let job = run_backfill(
            &StubSource,
            &store,
            &["AAA".into()],
            date(2024, 1, 1),
            date(2024, 1, 10),
            Interval::Daily,
            9,
        )
        .unwrap();
        assert_eq!(job.bars_written, 10);
    }

    #[test]
    fn range_ending_at_the_last_date_does_not_overflow() {
        let store = SqliteAdapter::in_memory().unwrap();
        let end = NaiveDate::MAX;
        let start = end - Duration::days(3);
        let job = run_backfill(
            &MockQuoteSource::new(42),
            &store,
            &["AAPL".into()],
            start,
            end,
            Interval::Daily,
            DEFAULT_MAX_BACKFILL_DAYS,
        )
        .unwrap();
        assert_eq!(job.symbols, vec!["AAPL"]);
        assert_eq!(job.end, NaiveDate::MAX);
    }

    #[test]
    fn lookback_start_is_checked() {
        assert_eq!(lookback_start(date(2024, 1, 11), 10).unwrap(), date(2024, 1, 1));
        assert!(matches!(
            lookback_start(NaiveDate::MIN, 1),
            Err(StockportError::Validation { .. })
        ));
    }

    #[test]
    fn partial_failure_completes_with_error_text() {
        let store = SqliteAdapter::in_memory().unwrap();
        let job = run_backfill(
            &StubSource,
            &store,
            &["AAA".into(), "BAD".into()],
            date(2024, 1, 1),
            date(2024, 1, 10),
            Interval::Daily,
            DEFAULT_MAX_BACKFILL_DAYS,
        )
        .unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.bars_written, 10);
        assert!(job.error.as_deref().unwrap().contains("BAD"));
        assert!(job.id > 0);

        let stored = store.recent_backfill_jobs(5).unwrap();
        assert_eq!(stored[0].status, JobStatus::Completed);
        assert!(store.get_ticker("AAA").unwrap().is_some());
    }

    #[test]
    fn all_failures_fail_the_job() {
        let store = SqliteAdapter::in_memory().unwrap();
        let job = run_backfill(
            &StubSource,
            &store,
            &["BAD".into()],
            date(2024, 1, 1),
            date(2024, 1, 10),
            Interval::Daily,
            DEFAULT_MAX_BACKFILL_DAYS,
        )
        .unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.bars_written, 0);
    }

    #[test]
    fn coverage_statuses() {
        let store = SqliteAdapter::in_memory().unwrap();
        run_backfill(
            &StubSource,
            &store,
            &["AAA".into()],
            date(2024, 1, 1),
            date(2024, 1, 10),
            Interval::Daily,
            DEFAULT_MAX_BACKFILL_DAYS,
        )
        .unwrap();
        let now = Utc::now().naive_utc();
        let tickers = vec![
            store.get_ticker("AAA").unwrap().unwrap(),
            TickerRecord::new("ZZZ", "Zed", "Unknown", now),
        ];

        let fresh = coverage(&store, &tickers, date(2024, 1, 12)).unwrap();
        assert_eq!(fresh[0].status, CoverageStatus::Ok);
        assert_eq!(fresh[0].bars, 10);
        assert_eq!(fresh[0].last_close, Some(10.5));
        assert_eq!(fresh[1].status, CoverageStatus::Missing);

        let later = coverage(&store, &tickers, date(2024, 1, 20)).unwrap();
        assert_eq!(later[0].status, CoverageStatus::Stale);
    }

    #[test]
    fn status_round_trips_through_text() {
        for status in [JobStatus::Running, JobStatus::Completed, JobStatus::Failed] {
            assert_eq!(status.as_str().parse::<JobStatus>().unwrap(), status);
        }
    }

    #[test]
    fn seeding_only_touches_an_empty_store() {
        let store = SqliteAdapter::in_memory().unwrap();
        let symbols = vec!["AAA".to_string()];
        let job = seed_if_empty(&StubSource, &store, &symbols, date(2024, 1, 1), date(2024, 1, 5), DEFAULT_MAX_BACKFILL_DAYS)
            .unwrap();
        assert_eq!(job.map(|j| j.bars_written), Some(5));
        let again = seed_if_empty(&StubSource, &store, &symbols, date(2024, 1, 1), date(2024, 1, 5), DEFAULT_MAX_BACKFILL_DAYS)
            .unwrap();
        assert!(again.is_none());
    }
}
