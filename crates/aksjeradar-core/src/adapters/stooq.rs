use std::sync::Arc;

use super::{fetch_body, malformed, parse_date_time, parse_decimal, parse_volume, AdapterOptions};
use crate::data_source::{
    CapabilitySet, DataSource, FetchError, FetchFuture, HistoryRequest, Operation,
};
use crate::http_client::{HttpClient, HttpRequest, ReqwestHttpClient};
use crate::{BarSeries, DataOrigin, MarketRegion, ProviderId, Quote, Symbol, UtcDateTime};

const QUOTE_ENDPOINT: &str = "https://stooq.com/q/l/";

/// Stooq CSV snapshot adapter.
///
/// Covers Oslo Børs (`EQNR.OL` is requested as `eqnr.no`) and plain US
/// tickers (`AAPL` as `aapl.us`). Quote only.
#[derive(Clone)]
pub struct StooqAdapter {
    http_client: Arc<dyn HttpClient>,
    options: AdapterOptions,
}

impl Default for StooqAdapter {
    fn default() -> Self {
        Self::new(Arc::new(ReqwestHttpClient::new()))
    }
}

impl StooqAdapter {
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

    async fn fetch_quote(&self, symbol: &Symbol) -> Result<Quote, FetchError> {
        let Some(ticker) = stooq_ticker(symbol) else {
            return Err(FetchError::unsupported(ProviderId::Stooq, Operation::Quote));
        };

        let endpoint = format!(
            "{QUOTE_ENDPOINT}?s={}&f=sd2t2ohlcv&h&e=csv",
            urlencoding::encode(&ticker)
        );
        let request = HttpRequest::get(endpoint).with_header("accept", "text/csv");
        let body = fetch_body(
            self.http_client.as_ref(),
            ProviderId::Stooq,
            request,
            &self.options,
        )
        .await?;

        parse_quote_csv(symbol, &body)
    }
}

impl DataSource for StooqAdapter {
    fn id(&self) -> ProviderId {
        ProviderId::Stooq
    }

    fn capabilities(&self) -> CapabilitySet {
        CapabilitySet::quote_only()
    }

    fn quote<'a>(&'a self, symbol: &'a Symbol) -> FetchFuture<'a, Quote> {
        Box::pin(self.fetch_quote(symbol))
    }

    fn history<'a>(&'a self, _req: &'a HistoryRequest) -> FetchFuture<'a, BarSeries> {
        Box::pin(async { Err(FetchError::unsupported(ProviderId::Stooq, Operation::History)) })
    }
}

/// Stooq ticker for `symbol`, or `None` for markets Stooq is not used for.
fn stooq_ticker(symbol: &Symbol) -> Option<String> {
    match symbol.region() {
        MarketRegion::Oslo => Some(format!("{}.no", symbol.base().to_ascii_lowercase())),
        MarketRegion::Global if !symbol.as_str().contains('.') => {
            Some(format!("{}.us", symbol.as_str().to_ascii_lowercase()))
        }
        MarketRegion::Global => Some(symbol.as_str().to_ascii_lowercase()),
        MarketRegion::Index | MarketRegion::Crypto | MarketRegion::Currency => None,
    }
}

fn parse_quote_csv(symbol: &Symbol, body: &str) -> Result<Quote, FetchError> {
    let mut lines = body.lines().map(str::trim).filter(|line| !line.is_empty());
    let header = lines
        .next()
        .ok_or_else(|| FetchError::malformed("stooq returned an empty body"))?;
    let columns = header
        .split(',')
        .map(|name| name.trim().to_ascii_lowercase())
        .collect::<Vec<_>>();
    if !columns.iter().any(|name| name == "close") {
        return Err(FetchError::malformed(format!(
            "stooq header has no close column: '{header}'"
        )));
    }

    let row = lines
        .next()
        .ok_or_else(|| FetchError::no_data(format!("stooq returned no row for {symbol}")))?;
    let values = row.split(',').map(str::trim).collect::<Vec<_>>();
    let field = |name: &str| {
        columns
            .iter()
            .position(|column| column == name)
            .and_then(|index| values.get(index).copied())
    };

    let price = field("close")
        .and_then(parse_decimal)
        .filter(|price| *price > 0.0)
        .ok_or_else(|| FetchError::no_data(format!("stooq has no data for {symbol}")))?;

    let as_of = field("date")
        .and_then(|date| parse_date_time(date, field("time")))
        .unwrap_or_else(UtcDateTime::now);

    let quote = Quote::new(
        symbol.clone(),
        price,
        symbol.default_currency(),
        DataOrigin::Provider(ProviderId::Stooq),
        as_of,
    )
    .map_err(|error| malformed(ProviderId::Stooq, error))?
    .with_day_range(
        field("open").and_then(parse_decimal),
        field("high").and_then(parse_decimal),
        field("low").and_then(parse_decimal),
    )
    .with_volume(field("volume").and_then(parse_volume));

    Ok(quote)
}
