//! Ticker records managed from the Data page.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use super::error::StockportError;

pub const MAX_SYMBOL_LEN: usize = 10;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TickerRecord {
    pub symbol: String,
    pub included: bool,
    pub company_name: String,
    pub sector: String,
    /// Alternative company names used when tagging news text.
    pub aliases: Vec<String>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl TickerRecord {
    pub fn new(symbol: &str, company_name: &str, sector: &str, now: NaiveDateTime) -> Self {
        TickerRecord {
            symbol: symbol.to_string(),
            included: true,
            company_name: company_name.to_string(),
            sector: sector.to_string(),
            aliases: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }
}

/// Static company metadata as reported by a quote source.
#[derive(Debug, Clone, PartialEq)]
pub struct CompanyInfo {
    pub long_name: String,
    pub sector: String,
}

/// Editable fields of a ticker record.
#[derive(Debug, Clone, Default)]
pub struct TickerUpdate {
    pub company_name: Option<String>,
    pub sector: Option<String>,
    pub aliases: Option<Vec<String>>,
    pub included: Option<bool>,
}

/// Trims, uppercases and checks a ticker symbol.
pub fn normalize_symbol(raw: &str) -> Result<String, StockportError> {
    let symbol = raw.trim().to_uppercase();
    if symbol.is_empty() {
        return Err(StockportError::validation("ticker symbol is empty"));
    }
    if symbol.len() > MAX_SYMBOL_LEN {
        return Err(StockportError::validation(format!(
            "ticker symbol {symbol} is longer than {MAX_SYMBOL_LEN} characters"
        )));
    }
    if !symbol
        .chars()
        .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '.' || c == '-')
    {
        return Err(StockportError::validation(format!(
            "ticker symbol {symbol} contains invalid characters"
        )));
    }
    if !symbol.starts_with(|c: char| c.is_ascii_alphanumeric()) {
        return Err(StockportError::validation(format!(
            "ticker symbol {symbol} must start with a letter or digit"
        )));
    }
    Ok(symbol)
}

/// Parses a comma separated alias list, dropping blanks and duplicates.
pub fn parse_aliases(input: &str) -> Vec<String> {
    let mut aliases: Vec<String> = Vec::new();
    for alias in input.split(',').map(str::trim).filter(|a| !a.is_empty()) {
        if !aliases.iter().any(|a| a.eq_ignore_ascii_case(alias)) {
            aliases.push(alias.to_string());
        }
    }
    aliases
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_uppercases_and_trims() {
        assert_eq!(normalize_symbol("  aapl ").unwrap(), "AAPL");
        assert_eq!(normalize_symbol("brk.b").unwrap(), "BRK.B");
    }

    #[test]
    fn normalize_rejects_bad_symbols() {
        assert!(normalize_symbol("").is_err());
        assert!(normalize_symbol("   ").is_err());
        assert!(normalize_symbol("TOOLONGSYMBOL").is_err());
        assert!(normalize_symbol("AA PL").is_err());
        assert!(normalize_symbol("$AAPL").is_err());
        assert!(normalize_symbol("-AB").is_err());
    }

    #[test]
    fn aliases_are_deduplicated() {
        let aliases = parse_aliases("Apple, apple ,, Apple Computer");
        assert_eq!(aliases, vec!["Apple", "Apple Computer"]);
    }
}
