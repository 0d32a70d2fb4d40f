//! Quote source reading `<dir>/<SYMBOL>.csv` files.
//!
//! Files carry a `date,open,high,low,close,volume` header. Company metadata
//! comes from an optional `companies.csv` (`symbol,name,sector`).

use crate::domain::error::StockportError;
use crate::domain::ohlcv::OhlcvBar;
use crate::domain::ticker::CompanyInfo;
use crate::ports::quote_source::QuoteSource;
use chrono::NaiveDate;
use serde::Deserialize;
use std::fs;
use std::path::PathBuf;

pub struct CsvQuoteSource {
    base_path: PathBuf,
}

#[derive(Debug, Deserialize)]
struct BarRecord {
    date: String,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    volume: i64,
}

#[derive(Debug, Deserialize)]
struct CompanyRecord {
    symbol: String,
    name: String,
    sector: String,
}

impl CsvQuoteSource {
    pub fn new(base_path: PathBuf) -> Self {
        Self { base_path }
    }

    fn csv_path(&self, symbol: &str) -> PathBuf {
        self.base_path.join(format!("{symbol}.csv"))
    }

    fn source_error(symbol: &str, reason: impl Into<String>) -> StockportError {
        StockportError::Source {
            symbol: symbol.to_string(),
            reason: reason.into(),
        }
    }
}

impl QuoteSource for CsvQuoteSource {
    fn name(&self) -> &str {
        "csv"
    }

    fn fetch_history(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<OhlcvBar>, StockportError> {
        let path = self.csv_path(symbol);
        let content = fs::read_to_string(&path).map_err(|e| {
            Self::source_error(symbol, format!("failed to read {}: {e}", path.display()))
        })?;

        let mut rdr = csv::Reader::from_reader(content.as_bytes());
        let mut bars = Vec::new();
        for (line, result) in rdr.deserialize::<BarRecord>().enumerate() {
            let record = result
                .map_err(|e| Self::source_error(symbol, format!("CSV parse error: {e}")))?;
            let date = NaiveDate::parse_from_str(record.date.trim(), "%Y-%m-%d").map_err(|e| {
                Self::source_error(symbol, format!("row {}: invalid date: {e}", line + 1))
            })?;
            if date < start || date > end {
                continue;
            }
            bars.push(OhlcvBar {
                symbol: symbol.to_string(),
                date,
                open: record.open,
                high: record.high,
                low: record.low,
                close: record.close,
                volume: record.volume,
            });
        }

        bars.sort_by_key(|b| b.date);
        bars.dedup_by_key(|b| b.date);
        Ok(bars)
    }

    fn company_info(&self, symbol: &str) -> Result<CompanyInfo, StockportError> {
        let fallback = CompanyInfo {
            long_name: format!("{symbol} Corp."),
            sector: "Unknown".to_string(),
        };
        let Ok(content) = fs::read_to_string(self.base_path.join("companies.csv")) else {
            return Ok(fallback);
        };
        let mut rdr = csv::Reader::from_reader(content.as_bytes());
        for result in rdr.deserialize::<CompanyRecord>() {
            let record =
                result.map_err(|e| Self::source_error(symbol, format!("companies.csv: {e}")))?;
            if record.symbol.trim().eq_ignore_ascii_case(symbol) {
                return Ok(CompanyInfo {
                    long_name: record.name.trim().to_string(),
                    sector: record.sector.trim().to_string(),
                });
            }
        }
        Ok(fallback)
    }
}
