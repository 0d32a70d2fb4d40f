//! SQLite storage for tickers, bars, news items and backfill jobs.

use crate::domain::backfill::BackfillJob;
use crate::domain::error::StockportError;
use crate::domain::news::{NewsItem, url_hash};
use crate::domain::ohlcv::OhlcvBar;
use crate::domain::ticker::{TickerRecord, TickerUpdate, parse_aliases};
use crate::ports::config_port::ConfigPort;
use crate::ports::data_port::DataPort;
use crate::ports::news_port::NewsPort;
use chrono::{NaiveDate, NaiveDateTime};
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::types::Value;
use rusqlite::{Connection, OptionalExtension, Row, params, params_from_iter};
use std::time::Duration;

const DATE_FMT: &str = "%Y-%m-%d";
const TS_FMT: &str = "%Y-%m-%d %H:%M:%S";

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS tickers (
    symbol TEXT PRIMARY KEY,
    included INTEGER NOT NULL DEFAULT 1,
    company_name TEXT NOT NULL DEFAULT '',
    sector TEXT NOT NULL DEFAULT '',
    aliases TEXT NOT NULL DEFAULT '',
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS ohlcv (
    symbol TEXT NOT NULL,
    date TEXT NOT NULL,
    open REAL NOT NULL,
    high REAL NOT NULL,
    low REAL NOT NULL,
    close REAL NOT NULL,
    volume INTEGER NOT NULL,
    PRIMARY KEY (symbol, date)
);
CREATE INDEX IF NOT EXISTS idx_ohlcv_date ON ohlcv(date);
CREATE TABLE IF NOT EXISTS news_items (
    url_hash TEXT PRIMARY KEY,
    symbol TEXT NOT NULL,
    published_at TEXT NOT NULL,
    headline TEXT NOT NULL,
    publisher TEXT NOT NULL,
    url TEXT NOT NULL,
    summary TEXT NOT NULL,
    sentiment REAL NOT NULL,
    topic TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_news_symbol_published ON news_items(symbol, published_at);
CREATE TABLE IF NOT EXISTS backfill_jobs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    symbols TEXT NOT NULL,
    start_date TEXT NOT NULL,
    end_date TEXT NOT NULL,
    interval TEXT NOT NULL,
    status TEXT NOT NULL,
    bars_written INTEGER NOT NULL DEFAULT 0,
    started_at TEXT NOT NULL,
    finished_at TEXT,
    error TEXT
);";

pub struct SqliteAdapter {
    pool: Pool<SqliteConnectionManager>,
}

fn conversion_error(
    len: usize,
    err: impl std::error::Error + Send + Sync + 'static,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(len, rusqlite::types::Type::Text, Box::new(err))
}

fn get_date(row: &Row<'_>, idx: usize) -> rusqlite::Result<NaiveDate> {
    let s: String = row.get(idx)?;
    NaiveDate::parse_from_str(&s, DATE_FMT).map_err(|e| conversion_error(s.len(), e))
}

fn get_timestamp(row: &Row<'_>, idx: usize) -> rusqlite::Result<NaiveDateTime> {
    let s: String = row.get(idx)?;
    NaiveDateTime::parse_from_str(&s, TS_FMT).map_err(|e| conversion_error(s.len(), e))
}

fn ticker_from_row(row: &Row<'_>) -> rusqlite::Result<TickerRecord> {
    let aliases: String = row.get(4)?;
    Ok(TickerRecord {
        symbol: row.get(0)?,
        included: row.get(1)?,
        company_name: row.get(2)?,
        sector: row.get(3)?,
        aliases: parse_aliases(&aliases),
        created_at: get_timestamp(row, 5)?,
        updated_at: get_timestamp(row, 6)?,
    })
}

fn job_from_row(row: &Row<'_>) -> rusqlite::Result<BackfillJob> {
    let symbols: String = row.get(1)?;
    let interval: String = row.get(4)?;
    let status: String = row.get(5)?;
    let finished: Option<String> = row.get(8)?;
    Ok(BackfillJob {
        id: row.get(0)?,
        symbols: symbols
            .split(',')
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect(),
        start: get_date(row, 2)?,
        end: get_date(row, 3)?,
        interval: interval
            .parse()
            .map_err(|e: StockportError| conversion_error(interval.len(), e))?,
        status: status
            .parse()
            .map_err(|e: StockportError| conversion_error(status.len(), e))?,
        bars_written: row.get::<_, i64>(6)? as usize,
        started_at: get_timestamp(row, 7)?,
        finished_at: finished
            .map(|s| NaiveDateTime::parse_from_str(&s, TS_FMT).map_err(|e| conversion_error(s.len(), e)))
            .transpose()?,
        error: row.get(9)?,
    })
}

const TICKER_COLUMNS: &str =
    "symbol, included, company_name, sector, aliases, created_at, updated_at";

fn select_ticker(conn: &Connection, symbol: &str) -> Result<Option<TickerRecord>, StockportError> {
    conn.query_row(
        &format!("SELECT {TICKER_COLUMNS} FROM tickers WHERE symbol = ?1"),
        params![symbol],
        ticker_from_row,
    )
    .optional()
    .map_err(StockportError::query)
}

impl SqliteAdapter {
    pub fn from_config(config: &dyn ConfigPort) -> Result<Self, StockportError> {
        let db_path =
            config
                .get_string("sqlite", "path")
                .ok_or_else(|| StockportError::ConfigMissing {
                    section: "sqlite".into(),
                    key: "path".into(),
                })?;

        let pool_size = config.get_int("sqlite", "pool_size", 4).max(1) as u32;

        let manager = SqliteConnectionManager::file(&db_path)
            .with_init(|c| c.busy_timeout(Duration::from_secs(5)));
        let pool = Pool::builder()
            .max_size(pool_size)
            .build(manager)
            .map_err(StockportError::pool)?;

        let adapter = Self { pool };
        adapter.initialize_schema()?;
        log::info!("opened sqlite database {db_path}");
        Ok(adapter)
    }

    /// Single-connection in-memory database with the schema applied.
    pub fn in_memory() -> Result<Self, StockportError> {
        let manager = SqliteConnectionManager::memory();
        let pool = Pool::builder()
            .max_size(1)
            .build(manager)
            .map_err(StockportError::pool)?;

        let adapter = Self { pool };
        adapter.initialize_schema()?;
        Ok(adapter)
    }

    /// Idempotent.
    pub fn initialize_schema(&self) -> Result<(), StockportError> {
        self.conn()?
            .execute_batch(SCHEMA)
            .map_err(StockportError::query)
    }

    fn conn(&self) -> Result<PooledConnection<SqliteConnectionManager>, StockportError> {
        self.pool.get().map_err(StockportError::pool)
    }
}

impl DataPort for SqliteAdapter {
    fn fetch_ohlcv(
        &self,
        symbol: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<Vec<OhlcvBar>, StockportError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT symbol, date, open, high, low, close, volume
                 FROM ohlcv
                 WHERE symbol = ?1 AND date >= ?2 AND date <= ?3
                 ORDER BY date ASC",
            )
            .map_err(StockportError::query)?;

        let rows = stmt
            .query_map(
                params![
                    symbol,
                    start_date.format(DATE_FMT).to_string(),
                    end_date.format(DATE_FMT).to_string()
                ],
                |row| {
                    Ok(OhlcvBar {
                        symbol: row.get(0)?,
                        date: get_date(row, 1)?,
                        open: row.get(2)?,
                        high: row.get(3)?,
                        low: row.get(4)?,
                        close: row.get(5)?,
                        volume: row.get(6)?,
                    })
                },
            )
            .map_err(StockportError::query)?;

        rows.collect::<Result<Vec<_>, _>>()
            .map_err(StockportError::query)
    }

    fn store_ohlcv(&self, bars: &[OhlcvBar]) -> Result<usize, StockportError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction().map_err(StockportError::query)?;
        let mut written = 0;
        {
            let mut stmt = tx
                .prepare(
                    "INSERT OR REPLACE INTO ohlcv (symbol, date, open, high, low, close, volume)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                )
                .map_err(StockportError::query)?;
            for bar in bars {
                written += stmt
                    .execute(params![
                        bar.symbol,
                        bar.date.format(DATE_FMT).to_string(),
                        bar.open,
                        bar.high,
                        bar.low,
                        bar.close,
                        bar.volume
                    ])
                    .map_err(StockportError::query)?;
            }
        }
        tx.commit().map_err(StockportError::query)?;
        Ok(written)
    }

    fn get_data_range(
        &self,
        symbol: &str,
    ) -> Result<Option<(NaiveDate, NaiveDate, usize)>, StockportError> {
        let conn = self.conn()?;
        let result: (Option<String>, Option<String>, i64) = conn
            .query_row(
                "SELECT MIN(date), MAX(date), COUNT(*) FROM ohlcv WHERE symbol = ?1",
                params![symbol],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .map_err(StockportError::query)?;

        match result {
            (Some(min_str), Some(max_str), count) if count > 0 => {
                let parse = |s: &str| {
                    NaiveDate::parse_from_str(s, DATE_FMT).map_err(|e| StockportError::Database {
                        reason: e.to_string(),
                    })
                };
                Ok(Some((parse(&min_str)?, parse(&max_str)?, count as usize)))
            }
            _ => Ok(None),
        }
    }

    fn list_tickers(&self) -> Result<Vec<TickerRecord>, StockportError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(&format!("SELECT {TICKER_COLUMNS} FROM tickers ORDER BY symbol"))
            .map_err(StockportError::query)?;
        let rows = stmt
            .query_map([], ticker_from_row)
            .map_err(StockportError::query)?;
        rows.collect::<Result<Vec<_>, _>>()
            .map_err(StockportError::query)
    }

    fn get_ticker(&self, symbol: &str) -> Result<Option<TickerRecord>, StockportError> {
        let conn = self.conn()?;
        select_ticker(&conn, symbol)
    }

    fn insert_ticker(&self, ticker: &TickerRecord) -> Result<(), StockportError> {
        let conn = self.conn()?;
        if select_ticker(&conn, &ticker.symbol)?.is_some() {
            return Err(StockportError::validation(format!(
                "ticker {} already exists",
                ticker.symbol
            )));
        }
        conn.execute(
            &format!("INSERT INTO tickers ({TICKER_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)"),
            params![
                ticker.symbol,
                ticker.included,
                ticker.company_name,
                ticker.sector,
                ticker.aliases.join(","),
                ticker.created_at.format(TS_FMT).to_string(),
                ticker.updated_at.format(TS_FMT).to_string()
            ],
        )
        .map_err(StockportError::query)?;
        Ok(())
    }

    fn update_ticker(
        &self,
        symbol: &str,
        update: &TickerUpdate,
        now: NaiveDateTime,
    ) -> Result<TickerRecord, StockportError> {
        let conn = self.conn()?;
        let mut record =
            select_ticker(&conn, symbol)?.ok_or_else(|| StockportError::UnknownTicker {
                symbol: symbol.to_string(),
            })?;

        if let Some(name) = &update.company_name {
            record.company_name = name.trim().to_string();
        }
        if let Some(sector) = &update.sector {
            record.sector = sector.trim().to_string();
        }
        if let Some(aliases) = &update.aliases {
            record.aliases = aliases.clone();
        }
        if let Some(included) = update.included {
            record.included = included;
        }
        record.updated_at = now;

        conn.execute(
            "UPDATE tickers
             SET included = ?2, company_name = ?3, sector = ?4, aliases = ?5, updated_at = ?6
             WHERE symbol = ?1",
            params![
                record.symbol,
                record.included,
                record.company_name,
                record.sector,
                record.aliases.join(","),
                record.updated_at.format(TS_FMT).to_string()
            ],
        )
        .map_err(StockportError::query)?;
        Ok(record)
    }

    fn delete_ticker(&self, symbol: &str) -> Result<(), StockportError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction().map_err(StockportError::query)?;
        let removed = tx
            .execute("DELETE FROM tickers WHERE symbol = ?1", params![symbol])
            .map_err(StockportError::query)?;
        if removed == 0 {
            return Err(StockportError::UnknownTicker {
                symbol: symbol.to_string(),
            });
        }
        tx.execute("DELETE FROM ohlcv WHERE symbol = ?1", params![symbol])
            .map_err(StockportError::query)?;
        tx.execute("DELETE FROM news_items WHERE symbol = ?1", params![symbol])
            .map_err(StockportError::query)?;
        tx.commit().map_err(StockportError::query)
    }

    fn insert_backfill_job(&self, job: &BackfillJob) -> Result<i64, StockportError> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO backfill_jobs
             (symbols, start_date, end_date, interval, status, bars_written, started_at, finished_at, error)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                job.symbols.join(","),
                job.start.format(DATE_FMT).to_string(),
                job.end.format(DATE_FMT).to_string(),
                job.interval.as_str(),
                job.status.as_str(),
                job.bars_written as i64,
                job.started_at.format(TS_FMT).to_string(),
                job.finished_at.map(|t| t.format(TS_FMT).to_string()),
                job.error
            ],
        )
        .map_err(StockportError::query)?;
        Ok(conn.last_insert_rowid())
    }

    fn update_backfill_job(&self, job: &BackfillJob) -> Result<(), StockportError> {
        let conn = self.conn()?;
        conn.execute(
            "UPDATE backfill_jobs
             SET status = ?2, bars_written = ?3, finished_at = ?4, error = ?5
             WHERE id = ?1",
            params![
                job.id,
                job.status.as_str(),
                job.bars_written as i64,
                job.finished_at.map(|t| t.format(TS_FMT).to_string()),
                job.error
            ],
        )
        .map_err(StockportError::query)?;
        Ok(())
    }

    fn recent_backfill_jobs(&self, limit: usize) -> Result<Vec<BackfillJob>, StockportError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT id, symbols, start_date, end_date, interval, status, bars_written,
                        started_at, finished_at, error
                 FROM backfill_jobs ORDER BY id DESC LIMIT ?1",
            )
            .map_err(StockportError::query)?;
        let rows = stmt
            .query_map(params![limit as i64], job_from_row)
            .map_err(StockportError::query)?;
        rows.collect::<Result<Vec<_>, _>>()
            .map_err(StockportError::query)
    }
}

impl NewsPort for SqliteAdapter {
    fn store_news(&self, items: &[NewsItem]) -> Result<usize, StockportError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction().map_err(StockportError::query)?;
        let mut inserted = 0;
        {
            let mut stmt = tx
                .prepare(
                    "INSERT OR IGNORE INTO news_items
                     (url_hash, symbol, published_at, headline, publisher, url, summary, sentiment, topic)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                )
                .map_err(StockportError::query)?;
            for item in items {
                inserted += stmt
                    .execute(params![
                        url_hash(&item.url),
                        item.symbol,
                        item.published_at.format(TS_FMT).to_string(),
                        item.headline,
                        item.publisher,
                        item.url,
                        item.summary,
                        item.sentiment,
                        item.topic
                    ])
                    .map_err(StockportError::query)?;
            }
        }
        tx.commit().map_err(StockportError::query)?;
        Ok(inserted)
    }

    fn fetch_news(
        &self,
        symbols: &[String],
        since: NaiveDateTime,
        limit: usize,
    ) -> Result<Vec<NewsItem>, StockportError> {
        if symbols.is_empty() {
            return Ok(Vec::new());
        }
        let placeholders = (0..symbols.len())
            .map(|i| format!("?{}", i + 3))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "SELECT symbol, published_at, headline, publisher, url, summary, sentiment, topic
             FROM news_items
             WHERE published_at >= ?1 AND symbol IN ({placeholders})
             ORDER BY published_at DESC, symbol ASC
             LIMIT ?2"
        );

        let mut values: Vec<Value> = vec![
            Value::Text(since.format(TS_FMT).to_string()),
            Value::Integer(limit as i64),
        ];
        values.extend(symbols.iter().map(|s| Value::Text(s.clone())));

        let conn = self.conn()?;
        let mut stmt = conn.prepare(&sql).map_err(StockportError::query)?;
        let rows = stmt
            .query_map(params_from_iter(values), |row| {
                Ok(NewsItem {
                    symbol: row.get(0)?,
                    published_at: get_timestamp(row, 1)?,
                    headline: row.get(2)?,
                    publisher: row.get(3)?,
                    url: row.get(4)?,
                    summary: row.get(5)?,
                    sentiment: row.get(6)?,
                    topic: row.get(7)?,
                })
            })
            .map_err(StockportError::query)?;
        rows.collect::<Result<Vec<_>, _>>()
            .map_err(StockportError::query)
    }
}
