//! Adapter contract and fetch error types.
//!
//! Every upstream provider implements [`DataSource`]. Adapters translate one
//! provider's wire format into the canonical [`Quote`] / [`BarSeries`]
//! models and classify failures into a closed set of [`FetchErrorKind`]s.
//! They own nothing but their HTTP transport: caching, rate limiting and
//! fallback are the resolver's concern.
//!
//! | Operation | Request | Response |
//! |-----------|---------|----------|
//! | Quote | [`Symbol`] | [`Quote`] |
//! | History | [`HistoryRequest`] | [`BarSeries`] |

use std::fmt::{Display, Formatter};
use std::future::Future;
use std::pin::Pin;

use serde::{Deserialize, Serialize};

use crate::{BarSeries, Interval, Period, ProviderId, Quote, Symbol};

/// Boxed future returned by adapter operations.
pub type FetchFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, FetchError>> + Send + 'a>>;

/// Data operation kind used for capability checks and in-flight tracking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Quote,
    History,
}

impl Operation {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Quote => "quote",
            Self::History => "history",
        }
    }
}

impl Display for Operation {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Operations an adapter can serve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilitySet {
    pub quote: bool,
    pub history: bool,
}

impl CapabilitySet {
    pub const fn new(quote: bool, history: bool) -> Self {
        Self { quote, history }
    }

    pub const fn full() -> Self {
        Self::new(true, true)
    }

    pub const fn quote_only() -> Self {
        Self::new(true, false)
    }

    pub const fn supports(self, operation: Operation) -> bool {
        match operation {
            Operation::Quote => self.quote,
            Operation::History => self.history,
        }
    }

    pub fn supported_operations(self) -> Vec<&'static str> {
        let mut values = Vec::with_capacity(2);
        if self.quote {
            values.push(Operation::Quote.as_str());
        }
        if self.history {
            values.push(Operation::History.as_str());
        }
        values
    }
}

/// Closed classification of adapter failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchErrorKind {
    Timeout,
    /// Upstream explicitly rejected the call for quota reasons.
    RateLimited,
    MalformedResponse,
    /// Well-formed answer without usable data (unknown ticker, empty series).
    NoData,
    Unavailable,
    Unsupported,
    Internal,
}

impl FetchErrorKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::RateLimited => "rate_limited",
            Self::MalformedResponse => "malformed_response",
            Self::NoData => "no_data",
            Self::Unavailable => "unavailable",
            Self::Unsupported => "unsupported",
            Self::Internal => "internal",
        }
    }
}

impl Display for FetchErrorKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured adapter error consumed by the resolver's fallback chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchError {
    kind: FetchErrorKind,
    message: String,
    retryable: bool,
}

impl FetchError {
    fn new(kind: FetchErrorKind, message: impl Into<String>, retryable: bool) -> Self {
        Self {
            kind,
            message: message.into(),
            retryable,
        }
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(FetchErrorKind::Timeout, message, true)
    }

    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self::new(FetchErrorKind::RateLimited, message, false)
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        Self::new(FetchErrorKind::MalformedResponse, message, false)
    }

    pub fn no_data(message: impl Into<String>) -> Self {
        Self::new(FetchErrorKind::NoData, message, false)
    }

    /// Transient upstream failure (5xx, connection reset).
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(FetchErrorKind::Unavailable, message, true)
    }

    /// Upstream refused the request in a way retrying will not fix.
    pub fn rejected(message: impl Into<String>) -> Self {
        Self::new(FetchErrorKind::Unavailable, message, false)
    }

    pub fn unsupported(provider: ProviderId, operation: Operation) -> Self {
        Self::new(
            FetchErrorKind::Unsupported,
            format!("operation '{operation}' is not supported by '{provider}'"),
            false,
        )
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(FetchErrorKind::Internal, message, false)
    }

    /// Maps a non-success HTTP status to an error kind.
    pub fn from_status(provider: ProviderId, status: u16) -> Self {
        match status {
            429 => Self::rate_limited(format!("{provider} returned HTTP 429")),
            404 => Self::no_data(format!("{provider} returned HTTP 404")),
            400..=499 => Self::rejected(format!("{provider} rejected request with HTTP {status}")),
            _ => Self::unavailable(format!("{provider} returned HTTP {status}")),
        }
    }

    pub const fn kind(&self) -> FetchErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub const fn retryable(&self) -> bool {
        self.retryable
    }

    pub const fn code(&self) -> &'static str {
        match self.kind {
            FetchErrorKind::Timeout => "fetch.timeout",
            FetchErrorKind::RateLimited => "fetch.rate_limited",
            FetchErrorKind::MalformedResponse => "fetch.malformed_response",
            FetchErrorKind::NoData => "fetch.no_data",
            FetchErrorKind::Unavailable => "fetch.unavailable",
            FetchErrorKind::Unsupported => "fetch.unsupported",
            FetchErrorKind::Internal => "fetch.internal",
        }
    }
}

impl Display for FetchError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.message, self.code())
    }
}

impl std::error::Error for FetchError {}

/// Request payload for history operations.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HistoryRequest {
    pub symbol: Symbol,
    pub period: Period,
    pub interval: Interval,
}

impl HistoryRequest {
    pub fn new(symbol: Symbol, period: Period, interval: Interval) -> Self {
        Self {
            symbol,
            period,
            interval,
        }
    }

    /// Number of bars this request should produce.
    pub fn expected_bars(&self) -> usize {
        self.period.bar_count(self.interval)
    }

    pub fn cache_key(&self) -> String {
        format!(
            "{}:{}:{}",
            self.symbol,
            self.period.as_str(),
            self.interval.as_str()
        )
    }
}

/// Upstream adapter contract.
///
/// Implementations must be `Send + Sync`; the resolver shares them behind
/// `Arc` and drives each call from a spawned task.
pub trait DataSource: Send + Sync {
    fn id(&self) -> ProviderId;

    fn capabilities(&self) -> CapabilitySet;

    /// Fetches the latest quote for one symbol.
    ///
    /// A quote with a non-positive price must be reported as
    /// [`FetchErrorKind::NoData`] rather than returned.
    fn quote<'a>(&'a self, symbol: &'a Symbol) -> FetchFuture<'a, Quote>;

    /// Fetches OHLCV history, oldest bar first.
    fn history<'a>(&'a self, req: &'a HistoryRequest) -> FetchFuture<'a, BarSeries>;
}
