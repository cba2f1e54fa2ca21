//! Provider resolution: cache, admission, priority-ordered attempts, fallback.
//!
//! The [`Resolver`] is the only component that mutates cache and limiter
//! state. Its `&str` entry points never fail: every path ends in either live
//! provider data, a cached record, or a deterministic fallback record labeled
//! [`DataOrigin::Fallback`].

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::pin::Pin;
use std::str::FromStr;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::cache::{CacheCategory, CacheSettings, CacheStore};
use crate::clock::{system_clock, SharedClock};
use crate::data_source::{DataSource, FetchError, FetchErrorKind, HistoryRequest, Operation};
use crate::fallback::FallbackGenerator;
use crate::rate_limiter::{Admission, ProviderStatus, RateLimiter};
use crate::{
    BarSeries, DataOrigin, Interval, Market, MarketRegion, MarketSummary, Period, ProviderId,
    Quote, Symbol, UtcDateTime,
};

type AttemptFuture<T> = Pin<Box<dyn Future<Output = Result<T, FetchError>> + Send + 'static>>;

/// Tunables for a single resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolverConfig {
    /// Longest throttle wait the resolver sleeps out before skipping a provider.
    pub max_wait: Duration,
    /// Budget for the whole provider chain of one resolution.
    pub overall_deadline: Duration,
    /// Upper bound for a single adapter call.
    pub provider_timeout: Duration,
    pub cache_fallback: bool,
    pub fallback_ttl: Duration,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            max_wait: Duration::from_secs(2),
            overall_deadline: Duration::from_secs(12),
            provider_timeout: Duration::from_secs(4),
            cache_fallback: true,
            fallback_ttl: Duration::from_secs(30 * 60),
        }
    }
}

/// Why a provider in the chain was not called.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    CircuitOpen,
    Throttled,
    Unsupported,
    DeadlineExceeded,
}

impl SkipReason {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::CircuitOpen => "circuit_open",
            Self::Throttled => "throttled",
            Self::Unsupported => "unsupported",
            Self::DeadlineExceeded => "deadline_exceeded",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum AttemptOutcome {
    Succeeded,
    Failed(FetchErrorKind),
    Skipped(SkipReason),
}

/// One step of a resolution, in the order it happened.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProviderAttempt {
    pub provider: ProviderId,
    pub at: UtcDateTime,
    pub outcome: AttemptOutcome,
}

impl ProviderAttempt {
    fn new(provider: ProviderId, outcome: AttemptOutcome) -> Self {
        Self {
            provider,
            at: UtcDateTime::now(),
            outcome,
        }
    }

    fn skipped(provider: ProviderId, reason: SkipReason) -> Self {
        Self::new(provider, AttemptOutcome::Skipped(reason))
    }
}

/// Resolved record plus a report of how it was obtained.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Resolution<T> {
    pub data: T,
    pub origin: DataOrigin,
    pub attempts: Vec<ProviderAttempt>,
    pub from_cache: bool,
    pub latency_ms: u64,
}

impl<T> Resolution<T> {
    fn new(
        data: T,
        origin: DataOrigin,
        attempts: Vec<ProviderAttempt>,
        from_cache: bool,
        started: Instant,
    ) -> Self {
        Self {
            data,
            origin,
            attempts,
            from_cache,
            latency_ms: elapsed_ms(started),
        }
    }

    pub fn is_fallback(&self) -> bool {
        self.origin.is_fallback()
    }

    pub fn into_data(self) -> T {
        self.data
    }
}

type InFlightKey = (Operation, String);

/// Marks a (kind, request key) pair as being resolved; released on drop.
/// Quotes are keyed by symbol, history by its cache key.
struct InFlightGuard<'a> {
    set: &'a Mutex<HashSet<InFlightKey>>,
    key: Option<InFlightKey>,
}

impl<'a> InFlightGuard<'a> {
    /// `None` when the pair is already in flight.
    fn acquire(
        set: &'a Mutex<HashSet<InFlightKey>>,
        operation: Operation,
        request_key: &str,
    ) -> Option<Self> {
        let key = (operation, request_key.to_owned());
        let inserted = set
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.clone());
        inserted.then_some(Self {
            set,
            key: Some(key),
        })
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        if let Some(key) = self.key.take() {
            self.set
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .remove(&key);
        }
    }
}

/// Provider order for quotes in `region`. Deterministic.
pub fn provider_priority(region: MarketRegion) -> &'static [ProviderId] {
    match region {
        MarketRegion::Oslo => &[ProviderId::Stooq, ProviderId::Yahoo, ProviderId::Alphavantage],
        MarketRegion::Global | MarketRegion::Index => {
            &[ProviderId::Yahoo, ProviderId::Alphavantage, ProviderId::Stooq]
        }
        MarketRegion::Crypto | MarketRegion::Currency => {
            &[ProviderId::Yahoo, ProviderId::Alphavantage]
        }
    }
}

struct ResolverInner {
    adapters: HashMap<ProviderId, Arc<dyn DataSource>>,
    cache: CacheStore,
    limiter: Arc<RateLimiter>,
    fallback: FallbackGenerator,
    config: ResolverConfig,
    in_flight: Mutex<HashSet<InFlightKey>>,
}

/// Market-data resolver. Cheap to clone; clones share cache, limiter and
/// in-flight state.
#[derive(Clone)]
pub struct Resolver {
    inner: Arc<ResolverInner>,
}

impl Resolver {
    /// The supplied cache's sweep ceiling is raised to the fallback TTL.
    pub fn new(
        adapters: Vec<Arc<dyn DataSource>>,
        cache: CacheStore,
        limiter: Arc<RateLimiter>,
        config: ResolverConfig,
    ) -> Self {
        ResolverBuilder::new()
            .with_adapters(adapters)
            .with_cache(cache)
            .with_rate_limiter(limiter)
            .with_config(config)
            .build()
    }

    pub fn builder() -> ResolverBuilder {
        ResolverBuilder::new()
    }

    pub fn cache(&self) -> &CacheStore {
        &self.inner.cache
    }

    pub fn rate_limiter(&self) -> &RateLimiter {
        &self.inner.limiter
    }

    pub fn config(&self) -> &ResolverConfig {
        &self.inner.config
    }

    /// Registered providers, sorted.
    pub fn providers(&self) -> Vec<ProviderId> {
        let mut providers = self.inner.adapters.keys().copied().collect::<Vec<_>>();
        providers.sort();
        providers
    }

    /// Budget and breaker snapshot for every provider the limiter tracks.
    pub fn provider_status(&self) -> Vec<ProviderStatus> {
        self.inner
            .limiter
            .providers()
            .into_iter()
            .filter_map(|provider| self.inner.limiter.snapshot(provider))
            .collect()
    }

    pub async fn get_quote(&self, symbol: &str) -> Quote {
        self.resolve_quote(symbol).await.into_data()
    }

    pub async fn get_history(&self, symbol: &str, period: &str, interval: &str) -> BarSeries {
        self.resolve_history(symbol, period, interval)
            .await
            .into_data()
    }

    /// Resolves each symbol in order.
    pub async fn get_quotes(&self, symbols: &[&str]) -> Vec<Quote> {
        let mut quotes = Vec::with_capacity(symbols.len());
        for symbol in symbols {
            quotes.push(self.get_quote(symbol).await);
        }
        quotes
    }

    pub async fn resolve_quote(&self, raw: &str) -> Resolution<Quote> {
        let started = Instant::now();
        let symbol = match Symbol::parse(raw) {
            Ok(symbol) => symbol,
            Err(error) => {
                let symbol = Symbol::lenient(raw);
                warn!(input = raw, %error, symbol = %symbol, "invalid symbol; serving fallback quote");
                return self.inner.fallback_quote(&symbol, Vec::new(), started);
            }
        };

        let inner = Arc::clone(&self.inner);
        let task_symbol = symbol.clone();
        match tokio::spawn(async move { inner.quote_for(task_symbol).await }).await {
            Ok(resolution) => resolution,
            Err(join_error) => {
                error!(symbol = %symbol, error = %join_error, "quote resolution failed; serving fallback");
                self.inner.contained_fallback_quote(&symbol, started)
            }
        }
    }

    /// Unparseable `period`/`interval` strings fall back to `1mo`/`1d`.
    pub async fn resolve_history(
        &self,
        raw: &str,
        period: &str,
        interval: &str,
    ) -> Resolution<BarSeries> {
        let started = Instant::now();
        let period = Period::from_str(period).unwrap_or_else(|error| {
            warn!(%error, "invalid history period; using default");
            Period::default()
        });
        let interval = Interval::from_str(interval).unwrap_or_else(|error| {
            warn!(%error, "invalid history interval; using default");
            Interval::default()
        });
        let req = match Symbol::parse(raw) {
            Ok(symbol) => HistoryRequest::new(symbol, period, interval),
            Err(error) => {
                let req = HistoryRequest::new(Symbol::lenient(raw), period, interval);
                warn!(input = raw, %error, symbol = %req.symbol, "invalid symbol; serving fallback history");
                return self.inner.fallback_history(&req, Vec::new(), started);
            }
        };

        let inner = Arc::clone(&self.inner);
        let task_req = req.clone();
        match tokio::spawn(async move { inner.history_for(task_req).await }).await {
            Ok(resolution) => resolution,
            Err(join_error) => {
                error!(symbol = %req.symbol, error = %join_error, "history resolution failed; serving fallback");
                self.inner.contained_fallback_history(&req, started)
            }
        }
    }

    /// Quotes for every constituent of `market`, cached as one aggregate.
    pub async fn market_summary(&self, market: Market) -> MarketSummary {
        let cache = &self.inner.cache;
        if let Some(summary) = cache
            .get_json::<MarketSummary>(CacheCategory::MarketSummary, market.as_str())
            .await
        {
            return summary;
        }

        let mut quotes = Vec::with_capacity(market.constituents().len());
        for symbol in market.constituents() {
            quotes.push(self.get_quote(symbol).await);
        }
        let summary = MarketSummary::from_quotes(market, quotes);
        debug!(
            %market,
            live = summary.live_count,
            fallback = summary.fallback_count,
            "market summary assembled"
        );

        if let Err(error) = cache
            .put_json(CacheCategory::MarketSummary, market.as_str(), &summary, None)
            .await
        {
            warn!(%market, %error, "failed to cache market summary");
        }
        summary
    }
}

impl ResolverInner {
    async fn quote_for(&self, symbol: Symbol) -> Resolution<Quote> {
        let started = Instant::now();
        let category = CacheCategory::for_quote(&symbol);
        if let Some(quote) = self.cache.get_json::<Quote>(category, symbol.as_str()).await {
            let origin = quote.source;
            return Resolution::new(quote, origin, Vec::new(), true, started);
        }

        let Some(_guard) = InFlightGuard::acquire(&self.in_flight, Operation::Quote, symbol.as_str())
        else {
            warn!(symbol = %symbol, "quote already in flight; serving fallback");
            return self.fallback_quote(&symbol, Vec::new(), started);
        };

        let chain = self.chain_for(Operation::Quote, &symbol);
        let (quote, attempts) = self
            .attempt_chain::<Quote, _>(&symbol, &chain, started, |adapter| {
                let symbol = symbol.clone();
                Box::pin(async move {
                    let quote = adapter.quote(&symbol).await?;
                    if quote.is_valid() {
                        Ok(quote)
                    } else {
                        Err(FetchError::no_data(format!(
                            "{} returned non-positive price for {symbol}",
                            adapter.id()
                        )))
                    }
                })
            })
            .await;

        let Some(quote) = quote else {
            let resolution = self.fallback_quote(&symbol, attempts, started);
            self.store(category, symbol.as_str(), &resolution.data, true).await;
            return resolution;
        };
        self.store(category, symbol.as_str(), &quote, false).await;
        let origin = quote.source;
        Resolution::new(quote, origin, attempts, false, started)
    }

    async fn history_for(&self, req: HistoryRequest) -> Resolution<BarSeries> {
        let started = Instant::now();
        let key = req.cache_key();
        if let Some(series) = self
            .cache
            .get_json::<BarSeries>(CacheCategory::History, &key)
            .await
        {
            let origin = series.source;
            return Resolution::new(series, origin, Vec::new(), true, started);
        }

        let Some(_guard) = InFlightGuard::acquire(&self.in_flight, Operation::History, &key) else {
            warn!(symbol = %req.symbol, key = %key, "history already in flight; serving fallback");
            return self.fallback_history(&req, Vec::new(), started);
        };

        let chain = self.chain_for(Operation::History, &req.symbol);
        let (series, attempts) = self
            .attempt_chain::<BarSeries, _>(&req.symbol, &chain, started, |adapter| {
                let req = req.clone();
                Box::pin(async move {
                    let series = adapter.history(&req).await?;
                    if series.is_empty() {
                        Err(FetchError::no_data(format!(
                            "{} returned no bars for {}",
                            adapter.id(),
                            req.symbol
                        )))
                    } else {
                        Ok(series)
                    }
                })
            })
            .await;

        let Some(series) = series else {
            let resolution = self.fallback_history(&req, attempts, started);
            self.store(CacheCategory::History, &key, &resolution.data, true).await;
            return resolution;
        };
        self.store(CacheCategory::History, &key, &series, false).await;
        let origin = series.source;
        Resolution::new(series, origin, attempts, false, started)
    }

    /// Registered adapters for `symbol`'s region that support `operation`.
    fn chain_for(&self, operation: Operation, symbol: &Symbol) -> Vec<ProviderId> {
        provider_priority(symbol.region())
            .iter()
            .copied()
            .filter(|provider| {
                self.adapters
                    .get(provider)
                    .is_some_and(|adapter| adapter.capabilities().supports(operation))
            })
            .collect()
    }

    async fn attempt_chain<T, F>(
        &self,
        symbol: &Symbol,
        chain: &[ProviderId],
        started: Instant,
        invoke: F,
    ) -> (Option<T>, Vec<ProviderAttempt>)
    where
        T: Send + 'static,
        F: Fn(Arc<dyn DataSource>) -> AttemptFuture<T>,
    {
        let deadline = started + self.config.overall_deadline;
        let mut attempts = Vec::with_capacity(chain.len());

        for &provider in chain {
            let Some(adapter) = self.adapters.get(&provider) else {
                continue;
            };

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                attempts.push(ProviderAttempt::skipped(provider, SkipReason::DeadlineExceeded));
                continue;
            }

            if let Err(admission) = self
                .limiter
                .wait_if_needed(provider, self.config.max_wait.min(remaining))
                .await
            {
                let reason = match admission {
                    Admission::CircuitOpen { .. } => SkipReason::CircuitOpen,
                    _ => SkipReason::Throttled,
                };
                warn!(
                    %provider,
                    symbol = %symbol,
                    reason = reason.as_str(),
                    wait_ms = admission.wait().as_millis() as u64,
                    "skipping provider"
                );
                attempts.push(ProviderAttempt::skipped(provider, reason));
                continue;
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                self.limiter.release_trial(provider);
                attempts.push(ProviderAttempt::skipped(provider, SkipReason::DeadlineExceeded));
                continue;
            }

            let budget = self.config.provider_timeout.min(remaining);
            match call_adapter(provider, invoke(Arc::clone(adapter)), budget).await {
                Ok(data) => {
                    self.limiter.record_success(provider);
                    if !attempts.is_empty() {
                        info!(
                            %provider,
                            symbol = %symbol,
                            failed_attempts = attempts.len(),
                            "provider succeeded after earlier attempts"
                        );
                    }
                    attempts.push(ProviderAttempt::new(provider, AttemptOutcome::Succeeded));
                    return (Some(data), attempts);
                }
                Err(error) => {
                    let kind = error.kind();
                    self.limiter.record_failure(provider, kind);
                    warn!(%provider, symbol = %symbol, kind = kind.as_str(), %error, "provider attempt failed");
                    let outcome = if kind == FetchErrorKind::Unsupported {
                        AttemptOutcome::Skipped(SkipReason::Unsupported)
                    } else {
                        AttemptOutcome::Failed(kind)
                    };
                    attempts.push(ProviderAttempt::new(provider, outcome));
                }
            }
        }

        (None, attempts)
    }

    fn fallback_quote(
        &self,
        symbol: &Symbol,
        attempts: Vec<ProviderAttempt>,
        started: Instant,
    ) -> Resolution<Quote> {
        let quote = self.fallback.quote(symbol);
        Resolution::new(quote, DataOrigin::Fallback, attempts, false, started)
    }

    fn fallback_history(
        &self,
        req: &HistoryRequest,
        attempts: Vec<ProviderAttempt>,
        started: Instant,
    ) -> Resolution<BarSeries> {
        let series = self.fallback.history(req);
        Resolution::new(series, DataOrigin::Fallback, attempts, false, started)
    }

    /// Fallback served after the resolution task panicked. Runs outside the
    /// task, so a second panic degrades to the placeholder symbol.
    fn contained_fallback_quote(&self, symbol: &Symbol, started: Instant) -> Resolution<Quote> {
        panic::catch_unwind(AssertUnwindSafe(|| {
            self.fallback_quote(symbol, Vec::new(), started)
        }))
        .unwrap_or_else(|_| {
            error!(symbol = %symbol, "fallback quote generation panicked; using placeholder");
            self.fallback_quote(&Symbol::lenient(""), Vec::new(), started)
        })
    }

    fn contained_fallback_history(
        &self,
        req: &HistoryRequest,
        started: Instant,
    ) -> Resolution<BarSeries> {
        panic::catch_unwind(AssertUnwindSafe(|| {
            self.fallback_history(req, Vec::new(), started)
        }))
        .unwrap_or_else(|_| {
            error!(symbol = %req.symbol, "fallback history generation panicked; using placeholder");
            let placeholder = HistoryRequest::new(Symbol::lenient(""), req.period, req.interval);
            self.fallback_history(&placeholder, Vec::new(), started)
        })
    }

    /// Writes a resolved record. Fallback records use the fallback TTL and
    /// are not written at all when fallback caching is off.
    async fn store<T: Serialize>(
        &self,
        category: CacheCategory,
        key: &str,
        value: &T,
        fallback: bool,
    ) {
        let ttl = if fallback {
            if !self.config.cache_fallback {
                return;
            }
            Some(self.config.fallback_ttl)
        } else {
            None
        };
        if let Err(error) = self.cache.put_json(category, key, value, ttl).await {
            warn!(%category, key, %error, "failed to cache resolved data");
        }
    }
}

/// Runs one adapter call on its own task so a panic surfaces as
/// [`FetchErrorKind::Internal`] instead of unwinding through the resolver.
async fn call_adapter<T>(
    provider: ProviderId,
    future: AttemptFuture<T>,
    budget: Duration,
) -> Result<T, FetchError>
where
    T: Send + 'static,
{
    let mut handle = tokio::spawn(future);
    match tokio::time::timeout(budget, &mut handle).await {
        Ok(Ok(result)) => result,
        Ok(Err(join_error)) => Err(FetchError::internal(format!(
            "{provider} adapter task failed: {join_error}"
        ))),
        Err(_) => {
            handle.abort();
            Err(FetchError::timeout(format!(
                "{provider} did not answer within {}ms",
                budget.as_millis()
            )))
        }
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis().min(u128::from(u64::MAX)) as u64
}

/// Assembles a [`Resolver`] from explicit parts.
pub struct ResolverBuilder {
    adapters: Vec<Arc<dyn DataSource>>,
    cache: Option<CacheStore>,
    limiter: Option<Arc<RateLimiter>>,
    clock: Option<SharedClock>,
    fallback: FallbackGenerator,
    config: ResolverConfig,
}

impl Default for ResolverBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ResolverBuilder {
    pub fn new() -> Self {
        Self {
            adapters: Vec::new(),
            cache: None,
            limiter: None,
            clock: None,
            fallback: FallbackGenerator::default(),
            config: ResolverConfig::default(),
        }
    }

    /// Registers an adapter; a later adapter with the same id replaces it.
    pub fn with_adapter(mut self, adapter: Arc<dyn DataSource>) -> Self {
        self.adapters.push(adapter);
        self
    }

    pub fn with_adapters(mut self, adapters: impl IntoIterator<Item = Arc<dyn DataSource>>) -> Self {
        self.adapters.extend(adapters);
        self
    }

    /// Cache to use instead of a fresh one. Its sweep ceiling is raised to
    /// the configured fallback TTL on build.
    pub fn with_cache(mut self, cache: CacheStore) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn with_rate_limiter(mut self, limiter: Arc<RateLimiter>) -> Self {
        self.limiter = Some(limiter);
        self
    }

    /// Clock for the cache and limiter the builder creates itself.
    pub fn with_clock(mut self, clock: SharedClock) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn with_fallback(mut self, fallback: FallbackGenerator) -> Self {
        self.fallback = fallback;
        self
    }

    pub fn with_config(mut self, config: ResolverConfig) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> Resolver {
        let clock = self.clock.unwrap_or_else(system_clock);
        let fallback_ttl = self.config.fallback_ttl;
        let cache = match self.cache {
            Some(cache) => cache.retaining(fallback_ttl),
            None => CacheStore::new(CacheSettings::retaining(fallback_ttl), clock.clone()),
        };
        let limiter = self
            .limiter
            .unwrap_or_else(|| Arc::new(RateLimiter::with_defaults(clock)));
        let adapters = self
            .adapters
            .into_iter()
            .map(|adapter| (adapter.id(), adapter))
            .collect();

        Resolver {
            inner: Arc::new(ResolverInner {
                adapters,
                cache,
                limiter,
                fallback: self.fallback,
                config: self.config,
                in_flight: Mutex::new(HashSet::new()),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn symbol(raw: &str) -> Symbol {
        Symbol::parse(raw).expect("valid symbol")
    }

    #[test]
    fn priority_depends_on_region() {
        assert_eq!(
            provider_priority(MarketRegion::Oslo),
            &[ProviderId::Stooq, ProviderId::Yahoo, ProviderId::Alphavantage]
        );
        assert_eq!(provider_priority(MarketRegion::Index)[0], ProviderId::Yahoo);
        assert!(!provider_priority(MarketRegion::Crypto).contains(&ProviderId::Stooq));
    }

    #[test]
    fn in_flight_guard_releases_on_drop() {
        let set = Mutex::new(HashSet::new());
        let eqnr = symbol("EQNR.OL");

        let guard =
            InFlightGuard::acquire(&set, Operation::Quote, eqnr.as_str()).expect("first acquire");
        assert!(InFlightGuard::acquire(&set, Operation::Quote, eqnr.as_str()).is_none());
        assert!(InFlightGuard::acquire(&set, Operation::History, eqnr.as_str()).is_some());

        drop(guard);
        assert!(InFlightGuard::acquire(&set, Operation::Quote, eqnr.as_str()).is_some());
    }

    #[test]
    fn history_guard_distinguishes_periods_of_one_symbol() {
        let set = Mutex::new(HashSet::new());
        let month = HistoryRequest::new(symbol("EQNR.OL"), Period::OneMonth, Interval::OneDay);
        let year = HistoryRequest::new(symbol("EQNR.OL"), Period::OneYear, Interval::OneDay);

        let _month_guard = InFlightGuard::acquire(&set, Operation::History, &month.cache_key())
            .expect("first period");
        assert!(InFlightGuard::acquire(&set, Operation::History, &year.cache_key()).is_some());
        assert!(InFlightGuard::acquire(&set, Operation::History, &month.cache_key()).is_none());
    }

    #[tokio::test]
    async fn adapter_panic_becomes_internal_error() {
        let future: AttemptFuture<u32> = Box::pin(async { panic!("adapter blew up") });

        let error = call_adapter(ProviderId::Yahoo, future, Duration::from_secs(1))
            .await
            .expect_err("panic must surface as an error");

        assert_eq!(error.kind(), FetchErrorKind::Internal);
    }

    #[tokio::test]
    async fn slow_adapter_times_out() {
        let future: AttemptFuture<u32> = Box::pin(async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(1)
        });

        let error = call_adapter(ProviderId::Stooq, future, Duration::from_millis(20))
            .await
            .expect_err("must time out");

        assert_eq!(error.kind(), FetchErrorKind::Timeout);
    }

    #[tokio::test]
    async fn invalid_symbol_resolves_to_fallback() {
        let resolver = Resolver::builder().build();

        let resolution = resolver.resolve_quote("   ").await;

        assert!(resolution.is_fallback());
        assert!(resolution.attempts.is_empty());
        assert!(resolution.data.price > 0.0);
    }
}
