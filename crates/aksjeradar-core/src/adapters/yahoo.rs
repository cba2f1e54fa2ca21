use std::sync::Arc;

use serde::Deserialize;
use tracing::debug;

use super::{fetch_body, malformed, AdapterOptions};
use crate::data_source::{CapabilitySet, DataSource, FetchError, FetchFuture, HistoryRequest};
use crate::http_client::{HttpClient, HttpRequest, ReqwestHttpClient};
use crate::{
    validate_currency_code, Bar, BarSeries, DataOrigin, Interval, ProviderId, Quote, Symbol,
    UtcDateTime,
};

const CHART_ENDPOINT: &str = "https://query1.finance.yahoo.com/v8/finance/chart";
const REFERER: &str = "https://finance.yahoo.com/";

/// Yahoo Finance adapter built on the keyless v8 chart endpoint.
///
/// Quotes are read from the chart `meta` block, history from the
/// `timestamp` + `indicators.quote` arrays.
#[derive(Clone)]
pub struct YahooAdapter {
    http_client: Arc<dyn HttpClient>,
    options: AdapterOptions,
}

impl Default for YahooAdapter {
    fn default() -> Self {
        Self::new(Arc::new(ReqwestHttpClient::new()))
    }
}

impl YahooAdapter {
    pub fn new(http_client: Arc<dyn HttpClient>) -> Self {
        Self {
            http_client,
            options: AdapterOptions::default(),
        }
    }

    pub fn with_options(mut self, options: AdapterOptions) -> Self {
        self.options = options;
        self
    }

    async fn fetch_chart(
        &self,
        symbol: &Symbol,
        range: &str,
        interval: &str,
    ) -> Result<ChartResult, FetchError> {
        let endpoint = format!(
            "{CHART_ENDPOINT}/{}?range={range}&interval={interval}&includePrePost=false",
            urlencoding::encode(symbol.as_str()),
        );
        let request = HttpRequest::get(endpoint).with_header("referer", REFERER);
        let body = fetch_body(
            self.http_client.as_ref(),
            ProviderId::Yahoo,
            request,
            &self.options,
        )
        .await?;

        let response: ChartResponse = serde_json::from_str(&body)
            .map_err(|e| FetchError::malformed(format!("failed to parse yahoo chart: {e}")))?;

        if let Some(error) = response.chart.error {
            return Err(FetchError::no_data(format!(
                "yahoo chart error for {symbol}: {}",
                error.description.unwrap_or(error.code)
            )));
        }

        response
            .chart
            .result
            .and_then(|results| results.into_iter().next())
            .ok_or_else(|| FetchError::no_data(format!("yahoo returned no chart for {symbol}")))
    }

    async fn fetch_quote(&self, symbol: &Symbol) -> Result<Quote, FetchError> {
        let chart = self.fetch_chart(symbol, "1d", "1d").await?;
        normalize_quote(symbol, chart)
    }

    async fn fetch_history(&self, req: &HistoryRequest) -> Result<BarSeries, FetchError> {
        let chart = self
            .fetch_chart(&req.symbol, req.period.as_str(), chart_interval(req.interval))
            .await?;
        let bars = normalize_bars(&chart, req.expected_bars());
        if bars.is_empty() {
            return Err(FetchError::no_data(format!(
                "yahoo returned no usable bars for {}",
                req.symbol
            )));
        }

        Ok(BarSeries::new(
            req.symbol.clone(),
            req.period,
            req.interval,
            bars,
            DataOrigin::Provider(ProviderId::Yahoo),
        ))
    }
}

impl DataSource for YahooAdapter {
    fn id(&self) -> ProviderId {
        ProviderId::Yahoo
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

fn chart_interval(interval: Interval) -> &'static str {
    match interval {
        Interval::OneHour => "60m",
        other => other.as_str(),
    }
}

fn normalize_quote(symbol: &Symbol, chart: ChartResult) -> Result<Quote, FetchError> {
    let meta = chart.meta;
    let price = meta
        .regular_market_price
        .filter(|price| price.is_finite() && *price > 0.0)
        .ok_or_else(|| FetchError::no_data(format!("yahoo has no market price for {symbol}")))?;

    let currency = meta
        .currency
        .as_deref()
        .and_then(|code| validate_currency_code(code).ok())
        .unwrap_or_else(|| symbol.default_currency().to_owned());
    let as_of = meta
        .regular_market_time
        .and_then(|seconds| UtcDateTime::from_unix_timestamp(seconds).ok())
        .unwrap_or_else(UtcDateTime::now);
    let open = chart
        .indicators
        .quote
        .first()
        .and_then(|series| series.open.iter().rev().find_map(|value| *value));

    let quote = Quote::new(
        symbol.clone(),
        price,
        currency,
        DataOrigin::Provider(ProviderId::Yahoo),
        as_of,
    )
    .map_err(|error| malformed(ProviderId::Yahoo, error))?
    .with_day_range(open, meta.regular_market_day_high, meta.regular_market_day_low)
    .with_volume(meta.regular_market_volume.and_then(|v| u64::try_from(v).ok()))
    .with_previous_close(meta.previous_close.or(meta.chart_previous_close));

    Ok(quote)
}

fn normalize_bars(chart: &ChartResult, limit: usize) -> Vec<Bar> {
    let Some(timestamps) = chart.timestamp.as_ref() else {
        return Vec::new();
    };
    let Some(series) = chart.indicators.quote.first() else {
        return Vec::new();
    };

    let mut bars = Vec::with_capacity(timestamps.len());
    for (i, &seconds) in timestamps.iter().enumerate() {
        let Ok(ts) = UtcDateTime::from_unix_timestamp(seconds) else {
            continue;
        };
        let column = |values: &[Option<f64>]| values.get(i).copied().flatten();

        // Yahoo pads non-trading slots with nulls.
        let (Some(open), Some(high), Some(low), Some(close)) = (
            column(&series.open),
            column(&series.high),
            column(&series.low),
            column(&series.close),
        ) else {
            continue;
        };
        let volume = series
            .volume
            .get(i)
            .copied()
            .flatten()
            .and_then(|v| u64::try_from(v).ok());

        match Bar::new(ts, open, high, low, close, volume) {
            Ok(bar) => bars.push(bar),
            Err(error) => debug!(%error, ts = seconds, "skipping inconsistent yahoo bar"),
        }
    }

    if bars.len() > limit {
        bars.drain(..bars.len() - limit);
    }
    bars
}

#[derive(Debug, Deserialize)]
struct ChartResponse {
    chart: ChartData,
}

#[derive(Debug, Deserialize)]
struct ChartData {
    #[serde(default)]
    result: Option<Vec<ChartResult>>,
    #[serde(default)]
    error: Option<ChartError>,
}

#[derive(Debug, Deserialize)]
struct ChartError {
    code: String,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    meta: ChartMeta,
    #[serde(default)]
    timestamp: Option<Vec<i64>>,
    #[serde(default)]
    indicators: ChartIndicators,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChartMeta {
    #[serde(default)]
    currency: Option<String>,
    #[serde(default)]
    regular_market_price: Option<f64>,
    #[serde(default)]
    previous_close: Option<f64>,
    #[serde(default)]
    chart_previous_close: Option<f64>,
    #[serde(default)]
    regular_market_day_high: Option<f64>,
    #[serde(default)]
    regular_market_day_low: Option<f64>,
    #[serde(default)]
    regular_market_volume: Option<i64>,
    #[serde(default)]
    regular_market_time: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
struct ChartIndicators {
    #[serde(default)]
    quote: Vec<ChartQuote>,
}

#[derive(Debug, Default, Deserialize)]
struct ChartQuote {
    #[serde(default)]
    open: Vec<Option<f64>>,
    #[serde(default)]
    high: Vec<Option<f64>>,
    #[serde(default)]
    low: Vec<Option<f64>>,
    #[serde(default)]
    close: Vec<Option<f64>>,
    #[serde(default)]
    volume: Vec<Option<i64>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::test_support::ScriptedHttpClient;
    use crate::data_source::FetchErrorKind;
    use crate::http_client::HttpError;
    use crate::Period;

    const QUOTE_BODY: &str = r#"{"chart":{"result":[{"meta":{"currency":"NOK","symbol":"EQNR.OL","regularMarketPrice":292.4,"previousClose":289.1,"chartPreviousClose":288.0,"regularMarketDayHigh":293.5,"regularMarketDayLow":288.7,"regularMarketVolume":4123456,"regularMarketTime":1715351399},"timestamp":[1715328000],"indicators":{"quote":[{"open":[290.1],"high":[293.5],"low":[288.7],"close":[292.4],"volume":[4123456]}]}}],"error":null}}"#;

    const HISTORY_BODY: &str = r#"{"chart":{"result":[{"meta":{"currency":"USD","regularMarketPrice":190.0},"timestamp":[1715040000,1715126400,1715212800,1715299200],"indicators":{"quote":[{"open":[180.0,null,184.0,186.0],"high":[183.0,null,187.0,191.0],"low":[179.0,null,183.5,185.0],"close":[182.5,null,186.0,190.0],"volume":[1000,null,1200,1500]}]}}],"error":null}}"#;

    fn symbol(raw: &str) -> Symbol {
        Symbol::parse(raw).expect("valid symbol")
    }

    #[tokio::test]
    async fn quote_reads_chart_meta() {
        let client = Arc::new(ScriptedHttpClient::ok(QUOTE_BODY));
        let adapter = YahooAdapter::new(client.clone());

        let quote = adapter.quote(&symbol("EQNR.OL")).await.expect("quote");

        assert_eq!(quote.price, 292.4);
        assert_eq!(quote.currency, "NOK");
        assert_eq!(quote.previous_close, Some(289.1));
        assert_eq!(quote.open, Some(290.1));
        assert_eq!(quote.volume, Some(4_123_456));
        assert_eq!(quote.source, DataOrigin::Provider(ProviderId::Yahoo));
        assert!(quote.change.is_some_and(|change| (change - 3.3).abs() < 1e-9));
        assert!(client.recorded_urls()[0].contains("/chart/EQNR.OL?range=1d&interval=1d"));
    }

    #[tokio::test]
    async fn chart_error_is_no_data() {
        let body = r#"{"chart":{"result":null,"error":{"code":"Not Found","description":"No data found, symbol may be delisted"}}}"#;
        let adapter = YahooAdapter::new(Arc::new(ScriptedHttpClient::ok(body)));

        let error = adapter.quote(&symbol("NOPE")).await.expect_err("must fail");
        assert_eq!(error.kind(), FetchErrorKind::NoData);
    }

    #[tokio::test]
    async fn zero_price_is_no_data() {
        let body = r#"{"chart":{"result":[{"meta":{"currency":"USD","regularMarketPrice":0.0}}],"error":null}}"#;
        let adapter = YahooAdapter::new(Arc::new(ScriptedHttpClient::ok(body)));

        let error = adapter.quote(&symbol("AAPL")).await.expect_err("must fail");
        assert_eq!(error.kind(), FetchErrorKind::NoData);
    }

    #[tokio::test]
    async fn maps_transport_and_status_failures() {
        let cases = [
            (ScriptedHttpClient::status(429), FetchErrorKind::RateLimited),
            (ScriptedHttpClient::status(503), FetchErrorKind::Unavailable),
            (ScriptedHttpClient::ok("<html>"), FetchErrorKind::MalformedResponse),
            (
                ScriptedHttpClient::new(vec![Err(HttpError::timeout("deadline"))]),
                FetchErrorKind::Timeout,
            ),
        ];

        for (client, kind) in cases {
            let adapter = YahooAdapter::new(Arc::new(client));
            let error = adapter.quote(&symbol("AAPL")).await.expect_err("must fail");
            assert_eq!(error.kind(), kind);
        }
    }

    #[tokio::test]
    async fn history_skips_null_slots_and_keeps_order() {
        let client = Arc::new(ScriptedHttpClient::ok(HISTORY_BODY));
        let adapter = YahooAdapter::new(client.clone());
        let req = HistoryRequest::new(symbol("AAPL"), Period::FiveDays, Interval::OneDay);

        let series = adapter.history(&req).await.expect("history");

        assert_eq!(series.bars.len(), 3);
        assert!(series.bars.windows(2).all(|pair| pair[0].ts < pair[1].ts));
        assert_eq!(series.last_close(), Some(190.0));
        assert!(client.recorded_urls()[0].contains("range=5d&interval=1d"));
    }

    #[tokio::test]
    async fn hourly_history_uses_sixty_minute_interval() {
        let client = Arc::new(ScriptedHttpClient::ok(HISTORY_BODY));
        let adapter = YahooAdapter::new(client.clone());
        let req = HistoryRequest::new(symbol("AAPL"), Period::FiveDays, Interval::OneHour);

        adapter.history(&req).await.expect("history");
        assert!(client.recorded_urls()[0].contains("interval=60m"));
    }
}
