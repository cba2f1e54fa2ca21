use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::debug;

use super::{fetch_body, malformed, parse_date_time, parse_decimal, parse_volume, AdapterOptions};
use crate::data_source::{
    CapabilitySet, DataSource, FetchError, FetchFuture, HistoryRequest, Operation,
};
use crate::http_client::{HttpClient, HttpRequest};
use crate::{
    Bar, BarSeries, DataOrigin, Interval, MarketRegion, ProviderId, Quote, Symbol, UtcDateTime,
};

const QUERY_ENDPOINT: &str = "https://www.alphavantage.co/query";
/// `compact` responses carry the latest 100 data points.
const COMPACT_LIMIT: usize = 100;

/// Alpha Vantage adapter (API key required).
///
/// Equities use `GLOBAL_QUOTE` and the `TIME_SERIES_*` family; crypto pairs
/// and currency crosses use `CURRENCY_EXCHANGE_RATE`. Every numeric field
/// arrives as text.
#[derive(Clone)]
pub struct AlphaVantageAdapter {
    http_client: Arc<dyn HttpClient>,
    api_key: String,
    options: AdapterOptions,
}

impl AlphaVantageAdapter {
    pub fn new(http_client: Arc<dyn HttpClient>, api_key: impl Into<String>) -> Self {
        Self {
            http_client,
            api_key: api_key.into(),
            options: AdapterOptions::default(),
        }
    }

    pub fn with_options(mut self, options: AdapterOptions) -> Self {
        self.options = options;
        self
    }

    async fn query(&self, params: &str) -> Result<Map<String, Value>, FetchError> {
        let endpoint = format!(
            "{QUERY_ENDPOINT}?{params}&apikey={}",
            urlencoding::encode(&self.api_key)
        );
        let body = fetch_body(
            self.http_client.as_ref(),
            ProviderId::Alphavantage,
            HttpRequest::get(endpoint),
            &self.options,
        )
        .await?;

        let payload: Map<String, Value> = serde_json::from_str(&body).map_err(|e| {
            FetchError::malformed(format!("failed to parse alphavantage response: {e}"))
        })?;

        // Quota exhaustion is reported with HTTP 200 and an advisory payload.
        for advisory in ["Note", "Information"] {
            if let Some(message) = payload.get(advisory).and_then(Value::as_str) {
                return Err(FetchError::rate_limited(format!(
                    "alphavantage throttled the request: {message}"
                )));
            }
        }
        if let Some(message) = payload.get("Error Message").and_then(Value::as_str) {
            return Err(FetchError::no_data(format!("alphavantage error: {message}")));
        }

        Ok(payload)
    }

    async fn fetch_quote(&self, symbol: &Symbol) -> Result<Quote, FetchError> {
        match symbol.region() {
            MarketRegion::Oslo | MarketRegion::Global => self.fetch_global_quote(symbol).await,
            MarketRegion::Crypto | MarketRegion::Currency => self.fetch_exchange_rate(symbol).await,
            MarketRegion::Index => Err(FetchError::unsupported(
                ProviderId::Alphavantage,
                Operation::Quote,
            )),
        }
    }

    async fn fetch_global_quote(&self, symbol: &Symbol) -> Result<Quote, FetchError> {
        let params = format!(
            "function=GLOBAL_QUOTE&symbol={}",
            urlencoding::encode(&equity_ticker(symbol))
        );
        let mut payload = self.query(&params).await?;

        let data = payload
            .remove("Global Quote")
            .filter(|value| value.as_object().is_some_and(|object| !object.is_empty()))
            .ok_or_else(|| FetchError::no_data(format!("alphavantage has no quote for {symbol}")))?;
        let data: GlobalQuote = serde_json::from_value(data).map_err(|e| {
            FetchError::malformed(format!("unexpected alphavantage quote shape: {e}"))
        })?;

        let price = parse_decimal(&data.price)
            .filter(|price| *price > 0.0)
            .ok_or_else(|| FetchError::no_data(format!("alphavantage has no price for {symbol}")))?;

        let quote = Quote::new(
            symbol.clone(),
            price,
            symbol.default_currency(),
            DataOrigin::Provider(ProviderId::Alphavantage),
            UtcDateTime::now(),
        )
        .map_err(|error| malformed(ProviderId::Alphavantage, error))?
        .with_change(
            data.change.as_deref().and_then(parse_decimal),
            data.change_percent.as_deref().and_then(parse_decimal),
        )
        .with_day_range(
            data.open.as_deref().and_then(parse_decimal),
            data.high.as_deref().and_then(parse_decimal),
            data.low.as_deref().and_then(parse_decimal),
        )
        .with_volume(data.volume.as_deref().and_then(parse_volume))
        .with_previous_close(data.previous_close.as_deref().and_then(parse_decimal));

        Ok(quote)
    }

    async fn fetch_exchange_rate(&self, symbol: &Symbol) -> Result<Quote, FetchError> {
        let Some((from, to)) = currency_pair(symbol) else {
            return Err(FetchError::unsupported(
                ProviderId::Alphavantage,
                Operation::Quote,
            ));
        };
        let params = format!("function=CURRENCY_EXCHANGE_RATE&from_currency={from}&to_currency={to}");
        let mut payload = self.query(&params).await?;

        let data = payload
            .remove("Realtime Currency Exchange Rate")
            .ok_or_else(|| FetchError::no_data(format!("alphavantage has no rate for {symbol}")))?;
        let data: ExchangeRate = serde_json::from_value(data).map_err(|e| {
            FetchError::malformed(format!("unexpected alphavantage rate shape: {e}"))
        })?;

        let rate = parse_decimal(&data.rate)
            .filter(|rate| *rate > 0.0)
            .ok_or_else(|| FetchError::no_data(format!("alphavantage has no rate for {symbol}")))?;
        let as_of = data
            .last_refreshed
            .as_deref()
            .and_then(|stamp| {
                let (date, time) = stamp.split_once(' ').unwrap_or((stamp, ""));
                parse_date_time(date, Some(time))
            })
            .unwrap_or_else(UtcDateTime::now);

        let quote = Quote::new(
            symbol.clone(),
            rate,
            to,
            DataOrigin::Provider(ProviderId::Alphavantage),
            as_of,
        )
        .map_err(|error| malformed(ProviderId::Alphavantage, error))?;

        Ok(quote)
    }

    async fn fetch_history(&self, req: &HistoryRequest) -> Result<BarSeries, FetchError> {
        if !matches!(req.symbol.region(), MarketRegion::Oslo | MarketRegion::Global) {
            return Err(FetchError::unsupported(
                ProviderId::Alphavantage,
                Operation::History,
            ));
        }

        let limit = req.expected_bars();
        let output_size = if limit <= COMPACT_LIMIT { "compact" } else { "full" };
        let ticker = urlencoding::encode(&equity_ticker(&req.symbol)).into_owned();
        let params = match req.interval {
            Interval::OneDay => {
                format!("function=TIME_SERIES_DAILY&symbol={ticker}&outputsize={output_size}")
            }
            Interval::OneWeek => format!("function=TIME_SERIES_WEEKLY&symbol={ticker}"),
            Interval::OneMonth => format!("function=TIME_SERIES_MONTHLY&symbol={ticker}"),
            intraday => format!(
                "function=TIME_SERIES_INTRADAY&symbol={ticker}&interval={}&outputsize={output_size}",
                intraday_interval(intraday)
            ),
        };
        let payload = self.query(&params).await?;

        let series = payload
            .into_iter()
            .find(|(key, _)| key.contains("Time Series"))
            .map(|(_, value)| value)
            .ok_or_else(|| {
                FetchError::no_data(format!("alphavantage has no series for {}", req.symbol))
            })?;
        let series: BTreeMap<String, SeriesBar> = serde_json::from_value(series).map_err(|e| {
            FetchError::malformed(format!("unexpected alphavantage series shape: {e}"))
        })?;

        // Keys are ISO dates, so BTreeMap order is chronological.
        let skip = series.len().saturating_sub(limit);
        let bars = series
            .iter()
            .skip(skip)
            .filter_map(|(stamp, bar)| normalize_bar(stamp, bar))
            .collect::<Vec<_>>();
        if bars.is_empty() {
            return Err(FetchError::no_data(format!(
                "alphavantage returned no usable bars for {}",
                req.symbol
            )));
        }

        Ok(BarSeries::new(
            req.symbol.clone(),
            req.period,
            req.interval,
            bars,
            DataOrigin::Provider(ProviderId::Alphavantage),
        ))
    }
}

impl DataSource for AlphaVantageAdapter {
    fn id(&self) -> ProviderId {
        ProviderId::Alphavantage
    }

    fn capabilities(&self) -> CapabilitySet {
        CapabilitySet::full()
    }

    fn quote<'a>(&'a self, symbol: &'a Symbol) -> FetchFuture<'a, Quote> {
        Box::pin(self.fetch_quote(symbol))
    }

    fn history<'a>(&'a self, req: &'a HistoryRequest) -> FetchFuture<'a, BarSeries> {
        Box::pin(self.fetch_history(req))
    }
}

/// Oslo listings use the `.OSL` exchange suffix.
fn equity_ticker(symbol: &Symbol) -> String {
    match symbol.region() {
        MarketRegion::Oslo => format!("{}.OSL", symbol.base()),
        _ => symbol.as_str().to_owned(),
    }
}

fn currency_pair(symbol: &Symbol) -> Option<(&str, &str)> {
    match symbol.region() {
        MarketRegion::Crypto => symbol.as_str().split_once('-'),
        MarketRegion::Currency => {
            let pair = symbol.base();
            (pair.len() == 6 && pair.is_ascii()).then(|| pair.split_at(3))
        }
        _ => None,
    }
}

fn intraday_interval(interval: Interval) -> &'static str {
    match interval {
        Interval::OneMinute => "1min",
        Interval::FiveMinutes => "5min",
        Interval::FifteenMinutes => "15min",
        _ => "60min",
    }
}

fn normalize_bar(stamp: &str, bar: &SeriesBar) -> Option<Bar> {
    let (date, time) = match stamp.split_once(' ') {
        Some((date, time)) => (date, Some(time)),
        None => (stamp, None),
    };
    let ts = parse_date_time(date, time)?;
    let result = Bar::new(
        ts,
        parse_decimal(&bar.open)?,
        parse_decimal(&bar.high)?,
        parse_decimal(&bar.low)?,
        parse_decimal(&bar.close)?,
        bar.volume.as_deref().and_then(parse_volume),
    );
    match result {
        Ok(bar) => Some(bar),
        Err(error) => {
            debug!(%error, stamp, "skipping inconsistent alphavantage bar");
            None
        }
    }
}

#[derive(Debug, Deserialize)]
struct GlobalQuote {
    #[serde(rename = "02. open", default)]
    open: Option<String>,
    #[serde(rename = "03. high", default)]
    high: Option<String>,
    #[serde(rename = "04. low", default)]
    low: Option<String>,
    #[serde(rename = "05. price")]
    price: String,
    #[serde(rename = "06. volume", default)]
    volume: Option<String>,
    #[serde(rename = "08. previous close", default)]
    previous_close: Option<String>,
    #[serde(rename = "09. change", default)]
    change: Option<String>,
    #[serde(rename = "10. change percent", default)]
    change_percent: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ExchangeRate {
    #[serde(rename = "5. Exchange Rate")]
    rate: String,
    #[serde(rename = "6. Last Refreshed", default)]
    last_refreshed: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SeriesBar {
    #[serde(rename = "1. open")]
    open: String,
    #[serde(rename = "2. high")]
    high: String,
    #[serde(rename = "3. low")]
    low: String,
    #[serde(rename = "4. close")]
    close: String,
    #[serde(rename = "5. volume", default)]
    volume: Option<String>,
}
