//! Upstream provider adapters.
//!
//! | Adapter | Quote | History | Key |
//! |---------|-------|---------|-----|
//! | [`YahooAdapter`] | v8 chart `meta` | v8 chart series | none |
//! | [`StooqAdapter`] | CSV snapshot | - | none |
//! | [`AlphaVantageAdapter`] | `GLOBAL_QUOTE`, `CURRENCY_EXCHANGE_RATE` | `TIME_SERIES_*` | required |
//!
//! All adapters share the transport helpers below so status mapping and
//! numeric parsing behave the same everywhere.

mod alphavantage;
mod stooq;
mod yahoo;

use std::time::Duration;

use time::macros::format_description;
use time::{Date, PrimitiveDateTime, Time};

pub use alphavantage::AlphaVantageAdapter;
pub use stooq::StooqAdapter;
pub use yahoo::YahooAdapter;

use crate::data_source::FetchError;
use crate::http_client::{HttpClient, HttpRequest};
use crate::retry::RetryConfig;
use crate::{ProviderId, UtcDateTime, ValidationError};

/// Per-request transport settings shared by all adapters.
#[derive(Debug, Clone, PartialEq)]
pub struct AdapterOptions {
    pub timeout: Duration,
    pub retry: RetryConfig,
}

impl Default for AdapterOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(4),
            retry: RetryConfig::no_retry(),
        }
    }
}

impl AdapterOptions {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }
}

/// Executes `request` (with retries per `options`) and returns the body of a
/// 2xx response. Everything else is classified into a [`FetchError`].
pub(crate) async fn fetch_body(
    http: &dyn HttpClient,
    provider: ProviderId,
    request: HttpRequest,
    options: &AdapterOptions,
) -> Result<String, FetchError> {
    let request = request.with_timeout(options.timeout);
    options
        .retry
        .run(|| {
            let request = request.clone();
            async move {
                let response = http.execute(request).await.map_err(|error| {
                    if error.is_timeout() {
                        FetchError::timeout(format!("{provider} request timed out: {error}"))
                    } else {
                        FetchError::unavailable(format!("{provider} transport error: {error}"))
                    }
                })?;

                if !response.is_success() {
                    return Err(FetchError::from_status(provider, response.status));
                }
                Ok(response.body)
            }
        })
        .await
}

/// Parses a provider numeric field that may arrive as text, with a trailing
/// `%`, or as a placeholder (`N/D`, `-`, empty).
pub(crate) fn parse_decimal(raw: &str) -> Option<f64> {
    let trimmed = raw.trim().trim_end_matches('%').trim();
    if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("n/d") || trimmed == "-" {
        return None;
    }
    trimmed.parse::<f64>().ok().filter(|value| value.is_finite())
}

pub(crate) fn parse_volume(raw: &str) -> Option<u64> {
    parse_decimal(raw)
        .filter(|value| *value >= 0.0)
        .map(|value| value.round() as u64)
}

/// Parses `YYYY-MM-DD` with an optional `HH:MM:SS` part, read as UTC.
pub(crate) fn parse_date_time(date: &str, time: Option<&str>) -> Option<UtcDateTime> {
    let date = Date::parse(date.trim(), format_description!("[year]-[month]-[day]")).ok()?;
    let time = match time.map(str::trim).filter(|value| !value.is_empty()) {
        Some(value) => Time::parse(value, format_description!("[hour]:[minute]:[second]")).ok()?,
        None => Time::MIDNIGHT,
    };
    Some(UtcDateTime::from_primitive(PrimitiveDateTime::new(date, time)))
}

pub(crate) fn malformed(provider: ProviderId, error: ValidationError) -> FetchError {
    FetchError::malformed(format!("{provider} returned invalid data: {error}"))
}
