use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{Interval, Period, ProviderId, Symbol, UtcDateTime, ValidationError};

const FALLBACK_LABEL: &str = "fallback";

/// Where a quote or series came from.
///
/// Fallback data is otherwise indistinguishable from live data, so this
/// field is mandatory on every record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum DataOrigin {
    Provider(ProviderId),
    Fallback,
}

impl DataOrigin {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Provider(provider) => provider.as_str(),
            Self::Fallback => FALLBACK_LABEL,
        }
    }

    pub const fn is_fallback(self) -> bool {
        matches!(self, Self::Fallback)
    }

    pub const fn provider(self) -> Option<ProviderId> {
        match self {
            Self::Provider(provider) => Some(provider),
            Self::Fallback => None,
        }
    }
}

impl Display for DataOrigin {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for DataOrigin {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        if value.trim().eq_ignore_ascii_case(FALLBACK_LABEL) {
            return Ok(Self::Fallback);
        }
        ProviderId::from_str(value).map(Self::Provider)
    }
}

impl TryFrom<String> for DataOrigin {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::from_str(&value)
    }
}

impl From<DataOrigin> for String {
    fn from(value: DataOrigin) -> Self {
        value.label().to_owned()
    }
}

/// Normalized quote snapshot.
///
/// Optional fields are `None` when the upstream did not report them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub symbol: Symbol,
    pub price: f64,
    pub change: Option<f64>,
    pub change_percent: Option<f64>,
    pub volume: Option<u64>,
    pub day_high: Option<f64>,
    pub day_low: Option<f64>,
    pub open: Option<f64>,
    pub previous_close: Option<f64>,
    pub currency: String,
    pub source: DataOrigin,
    pub as_of: UtcDateTime,
}

impl Quote {
    pub fn new(
        symbol: Symbol,
        price: f64,
        currency: impl AsRef<str>,
        source: DataOrigin,
        as_of: UtcDateTime,
    ) -> Result<Self, ValidationError> {
        validate_non_negative("price", price)?;

        Ok(Self {
            symbol,
            price,
            change: None,
            change_percent: None,
            volume: None,
            day_high: None,
            day_low: None,
            open: None,
            previous_close: None,
            currency: validate_currency_code(currency.as_ref())?,
            source,
            as_of,
        })
    }

    /// Sets the previous close and derives change figures from it unless
    /// they were already reported.
    pub fn with_previous_close(mut self, previous_close: Option<f64>) -> Self {
        self.previous_close = previous_close.filter(|value| value.is_finite() && *value > 0.0);
        if let Some(previous) = self.previous_close {
            if self.change.is_none() {
                self.change = Some(self.price - previous);
            }
            if self.change_percent.is_none() {
                self.change_percent = Some((self.price - previous) / previous * 100.0);
            }
        }
        self
    }

    pub fn with_change(mut self, change: Option<f64>, change_percent: Option<f64>) -> Self {
        self.change = change.filter(|value| value.is_finite());
        self.change_percent = change_percent.filter(|value| value.is_finite());
        self
    }

    pub fn with_day_range(mut self, open: Option<f64>, high: Option<f64>, low: Option<f64>) -> Self {
        self.open = open.filter(|value| is_positive(*value));
        self.day_high = high.filter(|value| is_positive(*value));
        self.day_low = low.filter(|value| is_positive(*value));
        self
    }

    pub fn with_volume(mut self, volume: Option<u64>) -> Self {
        self.volume = volume;
        self
    }

    /// A quote only counts as data when its last price is positive.
    pub fn is_valid(&self) -> bool {
        is_positive(self.price)
    }
}

/// OHLCV bar record for a given interval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub ts: UtcDateTime,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: Option<u64>,
}

impl Bar {
    pub fn new(
        ts: UtcDateTime,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
        volume: Option<u64>,
    ) -> Result<Self, ValidationError> {
        validate_non_negative("open", open)?;
        validate_non_negative("high", high)?;
        validate_non_negative("low", low)?;
        validate_non_negative("close", close)?;

        if high < low {
            return Err(ValidationError::InvalidBarRange);
        }

        if open < low || open > high || close < low || close > high {
            return Err(ValidationError::InvalidBarBounds);
        }

        Ok(Self {
            ts,
            open,
            high,
            low,
            close,
            volume,
        })
    }
}

/// Price history for one symbol, oldest bar first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BarSeries {
    pub symbol: Symbol,
    pub period: Period,
    pub interval: Interval,
    pub bars: Vec<Bar>,
    pub source: DataOrigin,
}

impl BarSeries {
    pub fn new(
        symbol: Symbol,
        period: Period,
        interval: Interval,
        bars: Vec<Bar>,
        source: DataOrigin,
    ) -> Self {
        Self {
            symbol,
            period,
            interval,
            bars,
            source,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn last_close(&self) -> Option<f64> {
        self.bars.last().map(|bar| bar.close)
    }
}

/// Dashboard market groupings with a fixed constituent list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Market {
    OsloBors,
    GlobalStocks,
    Crypto,
    Currency,
}

impl Market {
    pub const ALL: [Self; 4] = [Self::OsloBors, Self::GlobalStocks, Self::Crypto, Self::Currency];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::OsloBors => "oslo",
            Self::GlobalStocks => "global",
            Self::Crypto => "crypto",
            Self::Currency => "currency",
        }
    }

    pub const fn constituents(self) -> &'static [&'static str] {
        match self {
            Self::OsloBors => &[
                "EQNR.OL", "DNB.OL", "TEL.OL", "NHY.OL", "MOWI.OL", "ORK.OL", "YAR.OL", "AKRBP.OL",
            ],
            Self::GlobalStocks => &["AAPL", "MSFT", "AMZN", "GOOGL", "NVDA", "META", "TSLA"],
            Self::Crypto => &["BTC-USD", "ETH-USD", "SOL-USD", "XRP-USD", "ADA-USD"],
            Self::Currency => &["USDNOK=X", "EURNOK=X", "GBPNOK=X", "SEKNOK=X", "DKKNOK=X"],
        }
    }
}

impl Display for Market {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Market {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "oslo" | "oslo_bors" | "osebx" => Ok(Self::OsloBors),
            "global" | "global_stocks" => Ok(Self::GlobalStocks),
            "crypto" => Ok(Self::Crypto),
            "currency" | "fx" => Ok(Self::Currency),
            other => Err(ValidationError::InvalidMarket {
                value: other.to_owned(),
            }),
        }
    }
}

/// Aggregated quotes for one market overview panel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketSummary {
    pub market: Market,
    pub quotes: Vec<Quote>,
    pub live_count: usize,
    pub fallback_count: usize,
    pub as_of: UtcDateTime,
}

impl MarketSummary {
    pub fn from_quotes(market: Market, quotes: Vec<Quote>) -> Self {
        let fallback_count = quotes.iter().filter(|quote| quote.source.is_fallback()).count();
        Self {
            market,
            live_count: quotes.len() - fallback_count,
            fallback_count,
            quotes,
            as_of: UtcDateTime::now(),
        }
    }
}

/// Validate and normalize currency to uppercase 3-letter code.
pub fn validate_currency_code(input: &str) -> Result<String, ValidationError> {
    let normalized = input.trim().to_ascii_uppercase();
    let is_valid = normalized.len() == 3 && normalized.chars().all(|ch| ch.is_ascii_alphabetic());

    if !is_valid {
        return Err(ValidationError::InvalidCurrency {
            value: input.to_owned(),
        });
    }

    Ok(normalized)
}

fn is_positive(value: f64) -> bool {
    value.is_finite() && value > 0.0
}

fn validate_non_negative(field: &'static str, value: f64) -> Result<(), ValidationError> {
    if !value.is_finite() {
        return Err(ValidationError::NonFiniteValue { field });
    }
    if value < 0.0 {
        return Err(ValidationError::NegativeValue { field });
    }
    Ok(())
}
