//! Category-aware TTL cache for resolved market data.
//!
//! Entries are serialized bodies keyed by `"{category}:{key}"`. Each entry
//! captures its TTL at write time; an entry older than its TTL is treated as
//! absent and evicted on the read that finds it. There is no LRU. Memory is
//! bounded by an opportunistic sweep that runs from `put` at most once per
//! [`CacheSettings::sweep_interval`].
//!
//! With the `redis` feature enabled, a Redis backend can be attached with
//! [`CacheStore::connect_redis`]. It is consulted after an in-memory miss and
//! written through on every `put`. Redis failures are logged and never reach
//! callers.

use std::collections::HashMap;
use std::fmt::{Display, Formatter};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::clock::{system_clock, SharedClock};
use crate::{CoreError, MarketRegion, Symbol};

/// Kind of data stored, which selects the default TTL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheCategory {
    Quote,
    History,
    MarketSummary,
    Crypto,
    Currency,
}

impl CacheCategory {
    pub const ALL: [Self; 5] = [
        Self::Quote,
        Self::History,
        Self::MarketSummary,
        Self::Crypto,
        Self::Currency,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Quote => "quote",
            Self::History => "history",
            Self::MarketSummary => "market_summary",
            Self::Crypto => "crypto",
            Self::Currency => "currency",
        }
    }

    /// Category a single-symbol quote is cached under.
    pub fn for_quote(symbol: &Symbol) -> Self {
        match symbol.region() {
            MarketRegion::Crypto => Self::Crypto,
            MarketRegion::Currency => Self::Currency,
            MarketRegion::Oslo | MarketRegion::Index | MarketRegion::Global => Self::Quote,
        }
    }
}

impl Display for CacheCategory {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// TTLs and sweep bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheSettings {
    pub quote_ttl: Duration,
    pub history_ttl: Duration,
    pub market_summary_ttl: Duration,
    pub crypto_ttl: Duration,
    pub currency_ttl: Duration,
    /// Entries older than this are dropped by the sweep even if their own
    /// TTL is longer.
    pub max_entry_age: Duration,
    pub sweep_interval: Duration,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            quote_ttl: Duration::from_secs(60),
            history_ttl: Duration::from_secs(300),
            market_summary_ttl: Duration::from_secs(30),
            crypto_ttl: Duration::from_secs(60),
            currency_ttl: Duration::from_secs(120),
            max_entry_age: Duration::from_secs(600),
            sweep_interval: Duration::from_secs(60),
        }
    }
}

impl CacheSettings {
    /// Defaults, with the sweep ceiling raised so entries cached for
    /// `longest_ttl` are not swept before they expire.
    pub fn retaining(longest_ttl: Duration) -> Self {
        let defaults = Self::default();
        Self {
            max_entry_age: defaults.max_entry_age.max(longest_ttl),
            ..defaults
        }
    }

    pub const fn ttl_for(&self, category: CacheCategory) -> Duration {
        match category {
            CacheCategory::Quote => self.quote_ttl,
            CacheCategory::History => self.history_ttl,
            CacheCategory::MarketSummary => self.market_summary_ttl,
            CacheCategory::Crypto => self.crypto_ttl,
            CacheCategory::Currency => self.currency_ttl,
        }
    }
}

#[derive(Debug, Clone)]
struct CacheEntry {
    body: String,
    stored_at: Instant,
    ttl: Duration,
}

impl CacheEntry {
    fn is_live(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.stored_at) < self.ttl
    }
}

#[derive(Debug)]
struct CacheInner {
    map: HashMap<String, CacheEntry>,
    last_sweep: Instant,
}

impl CacheInner {
    fn retain_younger_than(&mut self, now: Instant, max_age: Duration) -> usize {
        let before = self.map.len();
        self.map.retain(|_, entry| {
            entry.is_live(now) && now.saturating_duration_since(entry.stored_at) < max_age
        });
        before - self.map.len()
    }
}

/// Thread-safe cache store, cheap to clone.
#[derive(Debug, Clone)]
pub struct CacheStore {
    settings: CacheSettings,
    clock: SharedClock,
    inner: Arc<tokio::sync::RwLock<CacheInner>>,
    #[cfg(feature = "redis")]
    remote: Option<remote::RedisBackend>,
}

impl Default for CacheStore {
    fn default() -> Self {
        Self::new(CacheSettings::default(), system_clock())
    }
}

impl CacheStore {
    pub fn new(settings: CacheSettings, clock: SharedClock) -> Self {
        let last_sweep = clock.now();
        Self {
            settings,
            clock,
            inner: Arc::new(tokio::sync::RwLock::new(CacheInner {
                map: HashMap::new(),
                last_sweep,
            })),
            #[cfg(feature = "redis")]
            remote: None,
        }
    }

    pub fn settings(&self) -> &CacheSettings {
        &self.settings
    }

    /// Raises the sweep ceiling of this handle to at least `longest_ttl`.
    pub fn retaining(mut self, longest_ttl: Duration) -> Self {
        self.settings.max_entry_age = self.settings.max_entry_age.max(longest_ttl);
        self
    }

    pub fn ttl_for(&self, category: CacheCategory) -> Duration {
        self.settings.ttl_for(category)
    }

    /// Returns the live body for `key`, evicting it if it has expired.
    pub async fn get(&self, category: CacheCategory, key: &str) -> Option<String> {
        let full_key = entry_key(category, key);
        let now = self.clock.now();

        let expired = {
            let store = self.inner.read().await;
            match store.map.get(&full_key) {
                Some(entry) if entry.is_live(now) => {
                    debug!(key = %full_key, "cache hit");
                    return Some(entry.body.clone());
                }
                Some(_) => true,
                None => false,
            }
        };

        if expired {
            let mut store = self.inner.write().await;
            if store
                .map
                .get(&full_key)
                .is_some_and(|entry| !entry.is_live(now))
            {
                store.map.remove(&full_key);
            }
            debug!(key = %full_key, "cache entry expired");
        }

        #[cfg(feature = "redis")]
        if let Some(remote) = &self.remote {
            if let Some(body) = remote.get(&full_key).await {
                debug!(key = %full_key, "remote cache hit");
                return Some(body);
            }
        }

        debug!(key = %full_key, "cache miss");
        None
    }

    /// Stores `body` with the category's default TTL.
    pub async fn put(&self, category: CacheCategory, key: &str, body: String) {
        self.put_with_ttl(category, key, body, self.ttl_for(category))
            .await;
    }

    /// Stores `body` with an explicit TTL. A zero TTL stores nothing.
    pub async fn put_with_ttl(
        &self,
        category: CacheCategory,
        key: &str,
        body: String,
        ttl: Duration,
    ) {
        if ttl.is_zero() {
            return;
        }
        let full_key = entry_key(category, key);
        let now = self.clock.now();

        #[cfg(feature = "redis")]
        if let Some(remote) = &self.remote {
            remote.set(&full_key, &body, ttl).await;
        }

        let mut store = self.inner.write().await;
        store.map.insert(
            full_key,
            CacheEntry {
                body,
                stored_at: now,
                ttl,
            },
        );

        if now.saturating_duration_since(store.last_sweep) >= self.settings.sweep_interval {
            store.last_sweep = now;
            let removed = store.retain_younger_than(now, self.settings.max_entry_age);
            if removed > 0 {
                debug!(removed, "cache sweep evicted entries");
            }
        }
    }

    /// Typed read. A body that no longer deserializes counts as a miss.
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        category: CacheCategory,
        key: &str,
    ) -> Option<T> {
        let body = self.get(category, key).await?;
        match serde_json::from_str(&body) {
            Ok(value) => Some(value),
            Err(error) => {
                warn!(%category, key, %error, "discarding undecodable cache entry");
                None
            }
        }
    }

    /// Typed write; `ttl` overrides the category default when given.
    pub async fn put_json<T: Serialize>(
        &self,
        category: CacheCategory,
        key: &str,
        value: &T,
        ttl: Option<Duration>,
    ) -> Result<(), CoreError> {
        let body = serde_json::to_string(value)?;
        let ttl = ttl.unwrap_or_else(|| self.ttl_for(category));
        self.put_with_ttl(category, key, body, ttl).await;
        Ok(())
    }

    /// Drops every entry that is expired or at least `max_age` old.
    pub async fn purge_older_than(&self, max_age: Duration) -> usize {
        let now = self.clock.now();
        let mut store = self.inner.write().await;
        store.last_sweep = now;
        store.retain_younger_than(now, max_age)
    }

    pub async fn clear(&self) {
        self.inner.write().await.map.clear();
    }

    /// Number of stored entries, including expired ones not yet evicted.
    pub async fn len(&self) -> usize {
        self.inner.read().await.map.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[cfg(feature = "redis")]
impl CacheStore {
    /// Attaches a Redis backend. Connection failures are logged and leave
    /// the store in memory-only mode.
    pub async fn connect_redis(mut self, url: &str) -> Self {
        self.remote = remote::RedisBackend::connect(url).await;
        self
    }

    pub fn has_remote(&self) -> bool {
        self.remote.is_some()
    }
}

fn entry_key(category: CacheCategory, key: &str) -> String {
    format!("{}:{key}", category.as_str())
}

#[cfg(feature = "redis")]
mod remote {
    use std::time::Duration;

    use redis::aio::ConnectionManager;
    use redis::AsyncCommands;
    use tracing::{info, warn};

    const KEY_PREFIX: &str = "aksjeradar:";

    #[derive(Clone)]
    pub(super) struct RedisBackend {
        conn: ConnectionManager,
    }

    impl std::fmt::Debug for RedisBackend {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.debug_struct("RedisBackend").finish_non_exhaustive()
        }
    }

    impl RedisBackend {
        pub(super) async fn connect(url: &str) -> Option<Self> {
            let client = match redis::Client::open(url) {
                Ok(client) => client,
                Err(error) => {
                    warn!(%error, "invalid redis url; cache stays in memory");
                    return None;
                }
            };
            match ConnectionManager::new(client).await {
                Ok(conn) => {
                    info!("cache connected to redis");
                    Some(Self { conn })
                }
                Err(error) => {
                    warn!(%error, "redis unavailable; cache stays in memory");
                    None
                }
            }
        }

        pub(super) async fn get(&self, key: &str) -> Option<String> {
            let mut conn = self.conn.clone();
            match conn.get::<_, Option<String>>(format!("{KEY_PREFIX}{key}")).await {
                Ok(value) => value,
                Err(error) => {
                    warn!(key, %error, "redis read failed");
                    None
                }
            }
        }

        pub(super) async fn set(&self, key: &str, body: &str, ttl: Duration) {
            let mut conn = self.conn.clone();
            let seconds = ttl.as_secs().max(1);
            if let Err(error) = conn
                .set_ex::<_, _, ()>(format!("{KEY_PREFIX}{key}"), body, seconds)
                .await
            {
                warn!(key, %error, "redis write failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn store() -> (CacheStore, ManualClock) {
        let clock = ManualClock::new();
        (
            CacheStore::new(CacheSettings::default(), Arc::new(clock.clone())),
            clock,
        )
    }

    #[tokio::test]
    async fn honors_category_ttls() {
        let (cache, clock) = store();
        cache
            .put(CacheCategory::MarketSummary, "oslo", "summary".to_owned())
            .await;
        cache
            .put(CacheCategory::History, "EQNR.OL:1mo:1d", "bars".to_owned())
            .await;

        clock.advance(Duration::from_secs(29));
        assert!(cache.get(CacheCategory::MarketSummary, "oslo").await.is_some());

        clock.advance(Duration::from_secs(1));
        assert!(cache.get(CacheCategory::MarketSummary, "oslo").await.is_none());
        assert!(cache
            .get(CacheCategory::History, "EQNR.OL:1mo:1d")
            .await
            .is_some());

        clock.advance(Duration::from_secs(270));
        assert!(cache
            .get(CacheCategory::History, "EQNR.OL:1mo:1d")
            .await
            .is_none());
    }

    #[tokio::test]
    async fn expired_entries_are_evicted_on_read() {
        let (cache, clock) = store();
        cache.put(CacheCategory::Quote, "AAPL", "q".to_owned()).await;
        assert_eq!(cache.len().await, 1);

        clock.advance(Duration::from_secs(61));
        assert!(cache.get(CacheCategory::Quote, "AAPL").await.is_none());
        assert_eq!(cache.len().await, 0);
    }

    #[tokio::test]
    async fn categories_do_not_share_keys() {
        let (cache, _clock) = store();
        cache.put(CacheCategory::Quote, "BTC-USD", "a".to_owned()).await;
        assert!(cache.get(CacheCategory::Crypto, "BTC-USD").await.is_none());
    }

    #[tokio::test]
    async fn ttl_override_outlives_category_default() {
        let (cache, clock) = store();
        cache
            .put_with_ttl(
                CacheCategory::Quote,
                "EQNR.OL",
                "fallback".to_owned(),
                Duration::from_secs(1800),
            )
            .await;

        clock.advance(Duration::from_secs(1799));
        assert!(cache.get(CacheCategory::Quote, "EQNR.OL").await.is_some());
        clock.advance(Duration::from_secs(1));
        assert!(cache.get(CacheCategory::Quote, "EQNR.OL").await.is_none());
    }

    #[tokio::test]
    async fn zero_ttl_stores_nothing() {
        let (cache, _clock) = store();
        cache
            .put_with_ttl(CacheCategory::Quote, "AAPL", "q".to_owned(), Duration::ZERO)
            .await;
        assert!(cache.is_empty().await);
    }

    #[tokio::test]
    async fn purge_drops_old_entries() {
        let clock = ManualClock::new();
        let settings = CacheSettings {
            sweep_interval: Duration::MAX,
            ..CacheSettings::default()
        };
        let cache = CacheStore::new(settings, Arc::new(clock.clone()));
        cache
            .put_with_ttl(
                CacheCategory::Quote,
                "OLD",
                "q".to_owned(),
                Duration::from_secs(3600),
            )
            .await;
        clock.advance(Duration::from_secs(700));
        cache
            .put_with_ttl(
                CacheCategory::Quote,
                "NEW",
                "q".to_owned(),
                Duration::from_secs(3600),
            )
            .await;

        assert_eq!(cache.purge_older_than(Duration::from_secs(600)).await, 1);
        assert!(cache.get(CacheCategory::Quote, "NEW").await.is_some());
    }

    #[tokio::test]
    async fn put_sweeps_expired_entries_periodically() {
        let (cache, clock) = store();
        cache.put(CacheCategory::MarketSummary, "a", "x".to_owned()).await;
        clock.advance(Duration::from_secs(61));
        cache.put(CacheCategory::Quote, "b", "y".to_owned()).await;
        assert_eq!(cache.len().await, 1);
    }

    #[tokio::test]
    async fn typed_helpers_treat_undecodable_bodies_as_miss() {
        let (cache, _clock) = store();
        cache
            .put_json(CacheCategory::Quote, "n", &vec![1_u32, 2, 3], None)
            .await
            .expect("serialize");
        assert_eq!(
            cache.get_json::<Vec<u32>>(CacheCategory::Quote, "n").await,
            Some(vec![1, 2, 3])
        );
        assert_eq!(
            cache.get_json::<String>(CacheCategory::Quote, "n").await,
            None
        );
    }

    #[tokio::test]
    async fn retaining_keeps_long_lived_entries_through_sweeps() {
        // Given: a default store whose sweep ceiling is ten minutes
        let (cache, clock) = store();
        let cache = cache.retaining(Duration::from_secs(1800));
        assert_eq!(cache.settings().max_entry_age, Duration::from_secs(1800));

        // When: a 30 minute entry survives several sweeps
        cache
            .put_with_ttl(
                CacheCategory::Quote,
                "EQNR.OL",
                "fallback".to_owned(),
                Duration::from_secs(1800),
            )
            .await;
        clock.advance(Duration::from_secs(900));
        cache.put(CacheCategory::Quote, "AAPL", "q".to_owned()).await;

        // Then: it is still served
        assert!(cache.get(CacheCategory::Quote, "EQNR.OL").await.is_some());
    }

    #[test]
    fn retaining_never_lowers_the_ceiling() {
        let (cache, _clock) = store();
        let cache = cache.retaining(Duration::from_secs(5));
        assert_eq!(cache.settings().max_entry_age, Duration::from_secs(600));
    }

    #[cfg(feature = "redis")]
    #[tokio::test]
    async fn invalid_redis_url_degrades_to_memory() {
        // Given: a redis url that cannot be parsed
        let (cache, _clock) = store();

        // When: attaching the remote backend
        let cache = cache.connect_redis("not-a-url").await;

        // Then: no remote is attached and the memory tier still works
        assert!(!cache.has_remote());
        cache.put(CacheCategory::Quote, "AAPL", "q".to_owned()).await;
        assert_eq!(
            cache.get(CacheCategory::Quote, "AAPL").await.as_deref(),
            Some("q")
        );
    }

    #[test]
    fn quote_category_follows_symbol_region() {
        let category = |raw: &str| CacheCategory::for_quote(&Symbol::parse(raw).expect("valid"));
        assert_eq!(category("BTC-USD"), CacheCategory::Crypto);
        assert_eq!(category("USDNOK=X"), CacheCategory::Currency);
        assert_eq!(category("EQNR.OL"), CacheCategory::Quote);
    }
}
