use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

use aksjeradar_core::{
    AlphaVantageAdapter, CapabilitySet, DataOrigin, DataSource, FetchErrorKind, HistoryRequest,
    HttpClient, HttpError, HttpRequest, HttpResponse, Interval, Period, ProviderId, StooqAdapter,
    Symbol, YahooAdapter,
};

const YAHOO_QUOTE: &str = r#"{"chart":{"result":[{"meta":{"currency":"NOK","symbol":"EQNR.OL","regularMarketPrice":292.4,"previousClose":289.1,"chartPreviousClose":288.0,"regularMarketDayHigh":293.5,"regularMarketDayLow":288.7,"regularMarketVolume":4123456,"regularMarketTime":1715351399},"timestamp":[1715328000],"indicators":{"quote":[{"open":[290.1],"high":[293.5],"low":[288.7],"close":[292.4],"volume":[4123456]}]}}],"error":null}}"#;

const YAHOO_HISTORY: &str = r#"{"chart":{"result":[{"meta":{"currency":"USD","symbol":"AAPL","regularMarketPrice":183.05},"timestamp":[1715068800,1715155200,1715241600,1715328000],"indicators":{"quote":[{"open":[182.35,182.85,null,184.9],"high":[183.07,183.6,null,185.09],"low":[180.92,181.85,null,182.13],"close":[182.4,182.74,null,183.05],"volume":[77305800,45057100,null,50759500]}]}}],"error":null}}"#;

const YAHOO_NOT_FOUND: &str = r#"{"chart":{"result":null,"error":{"code":"Not Found","description":"No data found, symbol may be delisted"}}}"#;

const STOOQ_QUOTE: &str = "Symbol,Date,Time,Open,High,Low,Close,Volume\r\nEQNR.NO,2024-05-10,16:29:59,290.1,293.5,288.7,292.4,4123456\r\n";

const STOOQ_UNKNOWN: &str = "Symbol,Date,Time,Open,High,Low,Close,Volume\r\nXXXX.NO,N/D,N/D,N/D,N/D,N/D,N/D,N/D\r\n";

const ALPHAVANTAGE_QUOTE: &str = r#"{"Global Quote":{"01. symbol":"IBM","02. open":"166.5000","03. high":"167.8000","04. low":"165.9000","05. price":"167.1500","06. volume":"3012345","07. latest trading day":"2024-05-10","08. previous close":"166.2700","09. change":"0.8800","10. change percent":"0.5293%"}}"#;

const ALPHAVANTAGE_DAILY: &str = r#"{"Meta Data":{"1. Information":"Daily Prices (open, high, low, close) and Volumes","2. Symbol":"IBM"},"Time Series (Daily)":{"2024-05-10":{"1. open":"166.5","2. high":"167.8","3. low":"165.9","4. close":"167.15","5. volume":"3012345"},"2024-05-08":{"1. open":"168.0","2. high":"169.1","3. low":"166.2","4. close":"166.27","5. volume":"4120011"},"2024-05-09":{"1. open":"166.3","2. high":"167.0","3. low":"165.1","4. close":"166.5","5. volume":"2890450"}}}"#;

const ALPHAVANTAGE_RATE: &str = r#"{"Realtime Currency Exchange Rate":{"1. From_Currency Code":"BTC","2. From_Currency Name":"Bitcoin","3. To_Currency Code":"USD","4. To_Currency Name":"United States Dollar","5. Exchange Rate":"63250.12000000","6. Last Refreshed":"2024-05-10 16:00:01","7. Time Zone":"UTC"}}"#;

const ALPHAVANTAGE_NOTE: &str = r#"{"Note":"Thank you for using Alpha Vantage! Our standard API call frequency is 5 calls per minute and 25 calls per day."}"#;

const ALPHAVANTAGE_INFORMATION: &str = r#"{"Information":"The **demo** API key is for demo purposes only."}"#;

const ALPHAVANTAGE_ERROR: &str = r#"{"Error Message":"Invalid API call. Please retry or visit the documentation."}"#;

/// HTTP double that replays queued responses and records every request.
#[derive(Default)]
struct ScriptedHttpClient {
    responses: Mutex<VecDeque<Result<HttpResponse, HttpError>>>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl ScriptedHttpClient {
    fn replying(responses: impl IntoIterator<Item = Result<HttpResponse, HttpError>>) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(responses.into_iter().collect()),
            requests: Mutex::new(Vec::new()),
        })
    }

    fn ok(body: &str) -> Arc<Self> {
        Self::replying([Ok(HttpResponse::ok(body))])
    }

    fn status(status: u16) -> Arc<Self> {
        Self::replying([Ok(HttpResponse::new(status, ""))])
    }

    fn urls(&self) -> Vec<String> {
        self.requests
            .lock()
            .expect("requests lock")
            .iter()
            .map(|request| request.url.clone())
            .collect()
    }
}

impl HttpClient for ScriptedHttpClient {
    fn execute<'a>(
        &'a self,
        request: HttpRequest,
    ) -> Pin<Box<dyn Future<Output = Result<HttpResponse, HttpError>> + Send + 'a>> {
        self.requests.lock().expect("requests lock").push(request);
        let next = self
            .responses
            .lock()
            .expect("responses lock")
            .pop_front()
            .unwrap_or_else(|| Err(HttpError::new("no scripted response left")));
        Box::pin(async move { next })
    }
}

#[derive(Clone)]
struct ProviderCase {
    id: ProviderId,
    capabilities: CapabilitySet,
    symbol: &'static str,
    quote_body: &'static str,
    expected_price: f64,
    expected_currency: &'static str,
}

fn provider_cases() -> Vec<ProviderCase> {
    vec![
        ProviderCase {
            id: ProviderId::Yahoo,
            capabilities: CapabilitySet::full(),
            symbol: "EQNR.OL",
            quote_body: YAHOO_QUOTE,
            expected_price: 292.4,
            expected_currency: "NOK",
        },
        ProviderCase {
            id: ProviderId::Stooq,
            capabilities: CapabilitySet::quote_only(),
            symbol: "EQNR.OL",
            quote_body: STOOQ_QUOTE,
            expected_price: 292.4,
            expected_currency: "NOK",
        },
        ProviderCase {
            id: ProviderId::Alphavantage,
            capabilities: CapabilitySet::full(),
            symbol: "IBM",
            quote_body: ALPHAVANTAGE_QUOTE,
            expected_price: 167.15,
            expected_currency: "USD",
        },
    ]
}

fn adapter(id: ProviderId, client: Arc<ScriptedHttpClient>) -> Arc<dyn DataSource> {
    match id {
        ProviderId::Yahoo => Arc::new(YahooAdapter::new(client)),
        ProviderId::Stooq => Arc::new(StooqAdapter::new(client)),
        ProviderId::Alphavantage => Arc::new(AlphaVantageAdapter::new(client, "demo")),
    }
}

fn symbol(raw: &str) -> Symbol {
    Symbol::parse(raw).expect("valid symbol")
}

#[tokio::test]
async fn quote_returns_normalized_quote_for_all_providers() {
    for case in provider_cases() {
        let client = ScriptedHttpClient::ok(case.quote_body);
        let source = adapter(case.id, client.clone());

        let quote = source
            .quote(&symbol(case.symbol))
            .await
            .unwrap_or_else(|error| panic!("provider '{}' quote failed: {error}", case.id));

        assert_eq!(source.id(), case.id);
        assert_eq!(quote.symbol.as_str(), case.symbol, "provider '{}': symbol", case.id);
        assert_eq!(quote.price, case.expected_price, "provider '{}': price", case.id);
        assert_eq!(quote.currency, case.expected_currency, "provider '{}': currency", case.id);
        assert_eq!(quote.source, DataOrigin::Provider(case.id));
        assert!(quote.is_valid(), "provider '{}': quote must be valid", case.id);
        assert_eq!(client.urls().len(), 1, "provider '{}': one request", case.id);
    }
}

#[test]
fn capabilities_match_provider_coverage() {
    for case in provider_cases() {
        let source = adapter(case.id, ScriptedHttpClient::replying([]));
        assert_eq!(source.capabilities(), case.capabilities, "provider '{}'", case.id);
    }
}

#[tokio::test]
async fn http_statuses_map_to_error_kinds_for_all_providers() {
    let expectations = [
        (429, FetchErrorKind::RateLimited),
        (404, FetchErrorKind::NoData),
        (503, FetchErrorKind::Unavailable),
        (500, FetchErrorKind::Unavailable),
    ];

    for case in provider_cases() {
        for (status, expected) in expectations {
            let source = adapter(case.id, ScriptedHttpClient::status(status));

            let error = source
                .quote(&symbol(case.symbol))
                .await
                .expect_err("non-2xx status must fail");

            assert_eq!(
                error.kind(),
                expected,
                "provider '{}': HTTP {status}",
                case.id
            );
        }
    }
}

#[tokio::test]
async fn transport_failures_map_to_timeout_and_unavailable() {
    for case in provider_cases() {
        let source = adapter(
            case.id,
            ScriptedHttpClient::replying([
                Err(HttpError::timeout("deadline elapsed")),
                Err(HttpError::new("connection reset by peer")),
            ]),
        );

        let timed_out = source.quote(&symbol(case.symbol)).await.expect_err("timeout");
        let reset = source.quote(&symbol(case.symbol)).await.expect_err("reset");

        assert_eq!(timed_out.kind(), FetchErrorKind::Timeout, "provider '{}'", case.id);
        assert!(timed_out.retryable());
        assert_eq!(reset.kind(), FetchErrorKind::Unavailable, "provider '{}'", case.id);
    }
}

#[tokio::test]
async fn garbage_bodies_are_malformed_responses() {
    let cases = [
        (ProviderId::Yahoo, "EQNR.OL", "<html>oops</html>"),
        (ProviderId::Stooq, "EQNR.OL", ""),
        (ProviderId::Alphavantage, "IBM", "not json at all"),
    ];

    for (id, raw, body) in cases {
        let source = adapter(id, ScriptedHttpClient::ok(body));

        let error = source.quote(&symbol(raw)).await.expect_err("garbage must fail");

        assert_eq!(error.kind(), FetchErrorKind::MalformedResponse, "provider '{id}'");
    }
}

#[tokio::test]
async fn unknown_tickers_are_reported_as_no_data() {
    let cases = [
        (ProviderId::Yahoo, "ZZZZ.OL", YAHOO_NOT_FOUND),
        (ProviderId::Stooq, "XXXX.OL", STOOQ_UNKNOWN),
        (ProviderId::Alphavantage, "ZZZZ", r#"{"Global Quote":{}}"#),
        (ProviderId::Alphavantage, "ZZZZ", ALPHAVANTAGE_ERROR),
    ];

    for (id, raw, body) in cases {
        let source = adapter(id, ScriptedHttpClient::ok(body));

        let error = source.quote(&symbol(raw)).await.expect_err("unknown ticker");

        assert_eq!(error.kind(), FetchErrorKind::NoData, "provider '{id}'");
    }
}

#[tokio::test]
async fn alphavantage_advisory_payloads_are_rate_limits() {
    for body in [ALPHAVANTAGE_NOTE, ALPHAVANTAGE_INFORMATION] {
        let source = adapter(ProviderId::Alphavantage, ScriptedHttpClient::ok(body));

        let error = source.quote(&symbol("IBM")).await.expect_err("throttled");

        assert_eq!(error.kind(), FetchErrorKind::RateLimited);
        assert!(!error.retryable());
    }
}

#[tokio::test]
async fn quote_requests_target_provider_specific_tickers() {
    let yahoo = ScriptedHttpClient::ok(YAHOO_QUOTE);
    let stooq = ScriptedHttpClient::ok(STOOQ_QUOTE);
    let alphavantage = ScriptedHttpClient::ok(ALPHAVANTAGE_QUOTE);

    adapter(ProviderId::Yahoo, yahoo.clone())
        .quote(&symbol("EQNR.OL"))
        .await
        .expect("yahoo quote");
    adapter(ProviderId::Stooq, stooq.clone())
        .quote(&symbol("EQNR.OL"))
        .await
        .expect("stooq quote");
    adapter(ProviderId::Alphavantage, alphavantage.clone())
        .quote(&symbol("EQNR.OL"))
        .await
        .expect("alphavantage quote");

    assert!(yahoo.urls()[0].contains("/EQNR.OL?"));
    assert!(stooq.urls()[0].contains("s=eqnr.no"));
    let url = &alphavantage.urls()[0];
    assert!(url.contains("function=GLOBAL_QUOTE"));
    assert!(url.contains("symbol=EQNR.OSL"));
    assert!(url.contains("apikey=demo"));
}

#[tokio::test]
async fn stooq_refuses_history_and_unsupported_markets_without_a_request() {
    let client = ScriptedHttpClient::replying([]);
    let source = adapter(ProviderId::Stooq, client.clone());
    let req = HistoryRequest::new(symbol("EQNR.OL"), Period::OneMonth, Interval::OneDay);

    let history = source.history(&req).await.expect_err("history unsupported");
    let crypto = source.quote(&symbol("BTC-USD")).await.expect_err("crypto unsupported");

    assert_eq!(history.kind(), FetchErrorKind::Unsupported);
    assert_eq!(crypto.kind(), FetchErrorKind::Unsupported);
    assert!(client.urls().is_empty());
}

#[tokio::test]
async fn yahoo_history_skips_padded_slots_and_keeps_order() {
    let client = ScriptedHttpClient::ok(YAHOO_HISTORY);
    let source = adapter(ProviderId::Yahoo, client.clone());
    let req = HistoryRequest::new(symbol("AAPL"), Period::FiveDays, Interval::OneDay);

    let series = source.history(&req).await.expect("history");

    assert_eq!(series.source, DataOrigin::Provider(ProviderId::Yahoo));
    assert_eq!(series.period, Period::FiveDays);
    assert_eq!(series.bars.len(), 3);
    assert!(series.bars.windows(2).all(|pair| pair[0].ts < pair[1].ts));
    assert_eq!(series.last_close(), Some(183.05));
    let url = &client.urls()[0];
    assert!(url.contains("range=5d"));
    assert!(url.contains("interval=1d"));
}

#[tokio::test]
async fn alphavantage_daily_series_is_sorted_oldest_first() {
    let client = ScriptedHttpClient::ok(ALPHAVANTAGE_DAILY);
    let source = adapter(ProviderId::Alphavantage, client.clone());
    let req = HistoryRequest::new(symbol("IBM"), Period::OneMonth, Interval::OneDay);

    let series = source.history(&req).await.expect("history");

    let closes = series.bars.iter().map(|bar| bar.close).collect::<Vec<_>>();
    assert_eq!(closes, vec![166.27, 166.5, 167.15]);
    assert_eq!(series.bars[2].volume, Some(3_012_345));
    assert!(client.urls()[0].contains("function=TIME_SERIES_DAILY"));
}

#[tokio::test]
async fn alphavantage_quotes_crypto_through_exchange_rates() {
    let client = ScriptedHttpClient::ok(ALPHAVANTAGE_RATE);
    let source = adapter(ProviderId::Alphavantage, client.clone());

    let quote = source.quote(&symbol("BTC-USD")).await.expect("rate quote");

    assert_eq!(quote.price, 63250.12);
    assert_eq!(quote.currency, "USD");
    let url = &client.urls()[0];
    assert!(url.contains("function=CURRENCY_EXCHANGE_RATE"));
    assert!(url.contains("from_currency=BTC"));
    assert!(url.contains("to_currency=USD"));
}

#[tokio::test]
async fn history_series_carry_the_requested_interval() {
    let client = ScriptedHttpClient::ok(YAHOO_HISTORY);
    let source = adapter(ProviderId::Yahoo, client);
    let req = HistoryRequest::new(symbol("AAPL"), Period::OneMonth, Interval::OneDay);

    let series = source.history(&req).await.expect("history");

    assert_eq!(series.interval, Interval::OneDay);
    assert_eq!(series.symbol, req.symbol);
}
