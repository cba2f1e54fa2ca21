use thiserror::Error;

/// Rejected input or an inconsistent record.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("empty symbol")]
    EmptySymbol,
    #[error("symbol is {len} characters long; at most {max} allowed")]
    SymbolTooLong { len: usize, max: usize },
    #[error("unexpected {ch:?} at position {index} in symbol")]
    SymbolInvalidChar { ch: char, index: usize },

    #[error("unknown interval '{value}' (1m, 5m, 15m, 1h, 1d, 1wk, 1mo)")]
    InvalidInterval { value: String },
    #[error("unknown period '{value}' (1d, 5d, 1mo, 3mo, 6mo, 1y, 2y, 5y)")]
    InvalidPeriod { value: String },
    #[error("unknown provider '{value}' (yahoo, stooq, alphavantage)")]
    InvalidSource { value: String },
    #[error("unknown market '{value}' (oslo, global, crypto, currency)")]
    InvalidMarket { value: String },

    #[error("not an RFC3339 timestamp: '{value}'")]
    InvalidTimestamp { value: String },

    #[error("not a three-letter currency code: '{value}'")]
    InvalidCurrency { value: String },

    #[error("{field} is not a finite number")]
    NonFiniteValue { field: &'static str },
    #[error("{field} is negative")]
    NegativeValue { field: &'static str },

    #[error("bar high is below its low")]
    InvalidBarRange,
    #[error("bar open or close lies outside its high/low range")]
    InvalidBarBounds,
}

/// Top-level error type for core operations.
///
/// Never crosses the resolver boundary; the resolver logs it and degrades to
/// fallback data instead.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

/// Errors raised while reading configuration values.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("environment variable {name} has invalid value '{value}': {reason}")]
    InvalidValue {
        name: &'static str,
        value: String,
        reason: String,
    },
}
