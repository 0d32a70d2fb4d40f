//! Domain error types.

/// Top-level error type for stockport.
#[derive(Debug, thiserror::Error)]
pub enum StockportError {
    #[error("database error: {reason}")]
    Database { reason: String },

    #[error("database query error: {reason}")]
    DatabaseQuery { reason: String },

    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("missing config key [{section}] {key}")]
    ConfigMissing { section: String, key: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error("invalid input: {reason}")]
    Validation { reason: String },

    #[error("unknown ticker {symbol}")]
    UnknownTicker { symbol: String },

    #[error("no data for {symbol}")]
    NoData { symbol: String },

    #[error("insufficient data for {symbol}: have {bars} bars, need {minimum}")]
    InsufficientData {
        symbol: String,
        bars: usize,
        minimum: usize,
    },

    #[error("model error: {reason}")]
    Model { reason: String },

    #[error("quote source error for {symbol}: {reason}")]
    Source { symbol: String, reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl StockportError {
    pub fn validation(reason: impl Into<String>) -> Self {
        StockportError::Validation {
            reason: reason.into(),
        }
    }

    pub(crate) fn query(err: rusqlite::Error) -> Self {
        StockportError::DatabaseQuery {
            reason: err.to_string(),
        }
    }

    pub(crate) fn pool(err: r2d2::Error) -> Self {
        StockportError::Database {
            reason: err.to_string(),
        }
    }
}

impl From<&StockportError> for std::process::ExitCode {
    fn from(err: &StockportError) -> Self {
        let code: u8 = match err {
            StockportError::Io(_) => 1,
            StockportError::ConfigParse { .. }
            | StockportError::ConfigMissing { .. }
            | StockportError::ConfigInvalid { .. } => 2,
            StockportError::Database { .. } | StockportError::DatabaseQuery { .. } => 3,
            StockportError::Validation { .. }
            | StockportError::UnknownTicker { .. }
            | StockportError::Model { .. } => 4,
            StockportError::NoData { .. }
            | StockportError::InsufficientData { .. }
            | StockportError::Source { .. } => 5,
        };
        std::process::ExitCode::from(code)
    }
}
