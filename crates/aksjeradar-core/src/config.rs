//! Environment-driven configuration.
//!
//! Every variable is read as `AKSJERADAR_<NAME>` first and `<NAME>` second.
//! [`AksjeradarConfig::from_env`] never fails: a malformed value is logged
//! and the default is kept.
//!
//! | Variable | Default |
//! |----------|---------|
//! | `ALPHAVANTAGE_API_KEY` | unset (Alpha Vantage not registered) |
//! | `REDIS_HOST` / `REDIS_PORT` / `REDIS_DB` | unset / 6379 / 0 |
//! | `PROVIDER_TIMEOUT_MS` | 4000 |
//! | `OVERALL_DEADLINE_MS` | 12000 |
//! | `MAX_WAIT_MS` | 2000 |
//! | `CACHE_FALLBACK` | true |
//! | `FALLBACK_TTL_SECS` | 1800 |

use std::env;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use tracing::warn;

use crate::adapters::{AdapterOptions, AlphaVantageAdapter, StooqAdapter, YahooAdapter};
use crate::cache::{CacheSettings, CacheStore};
use crate::clock::SharedClock;
use crate::data_source::DataSource;
use crate::http_client::{HttpClient, ReqwestHttpClient};
use crate::rate_limiter::RateLimiter;
use crate::resolver::{Resolver, ResolverConfig};
use crate::ConfigError;

const ENV_PREFIX: &str = "AKSJERADAR_";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedisSettings {
    pub host: String,
    pub port: u16,
    pub db: u32,
}

impl RedisSettings {
    pub fn url(&self) -> String {
        format!("redis://{}:{}/{}", self.host, self.port, self.db)
    }
}

/// Process configuration for the resolver and its adapters.
#[derive(Clone, PartialEq, Eq)]
pub struct AksjeradarConfig {
    pub alphavantage_api_key: Option<String>,
    pub redis: Option<RedisSettings>,
    pub provider_timeout: Duration,
    pub overall_deadline: Duration,
    pub max_wait: Duration,
    pub cache_fallback: bool,
    pub fallback_ttl: Duration,
}

impl std::fmt::Debug for AksjeradarConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AksjeradarConfig")
            .field(
                "alphavantage_api_key",
                &self.alphavantage_api_key.as_ref().map(|_| "<redacted>"),
            )
            .field("redis", &self.redis)
            .field("provider_timeout", &self.provider_timeout)
            .field("overall_deadline", &self.overall_deadline)
            .field("max_wait", &self.max_wait)
            .field("cache_fallback", &self.cache_fallback)
            .field("fallback_ttl", &self.fallback_ttl)
            .finish()
    }
}

impl Default for AksjeradarConfig {
    fn default() -> Self {
        let resolver = ResolverConfig::default();
        Self {
            alphavantage_api_key: None,
            redis: None,
            provider_timeout: resolver.provider_timeout,
            overall_deadline: resolver.overall_deadline,
            max_wait: resolver.max_wait,
            cache_fallback: resolver.cache_fallback,
            fallback_ttl: resolver.fallback_ttl,
        }
    }
}

impl AksjeradarConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Builds the configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let vars = Vars { lookup };
        let defaults = Self::default();

        let redis = vars.get("REDIS_HOST").map(|host| RedisSettings {
            host,
            port: vars.parsed("REDIS_PORT", 6379_u16),
            db: vars.parsed("REDIS_DB", 0_u32),
        });

        Self {
            alphavantage_api_key: vars.get("ALPHAVANTAGE_API_KEY"),
            redis,
            provider_timeout: vars.millis("PROVIDER_TIMEOUT_MS", defaults.provider_timeout),
            overall_deadline: vars.millis("OVERALL_DEADLINE_MS", defaults.overall_deadline),
            max_wait: vars.duration("MAX_WAIT_MS", defaults.max_wait, Duration::from_millis),
            cache_fallback: vars.flag("CACHE_FALLBACK", defaults.cache_fallback),
            fallback_ttl: vars.duration(
                "FALLBACK_TTL_SECS",
                defaults.fallback_ttl,
                Duration::from_secs,
            ),
        }
    }

    pub fn resolver_config(&self) -> ResolverConfig {
        ResolverConfig {
            max_wait: self.max_wait,
            overall_deadline: self.overall_deadline,
            provider_timeout: self.provider_timeout,
            cache_fallback: self.cache_fallback,
            fallback_ttl: self.fallback_ttl,
        }
    }

    /// Default TTLs, with the sweep ceiling raised to cover the fallback TTL.
    pub fn cache_settings(&self) -> CacheSettings {
        CacheSettings::retaining(self.fallback_ttl)
    }

    pub fn adapter_options(&self) -> AdapterOptions {
        AdapterOptions::default().with_timeout(self.provider_timeout)
    }

    /// Yahoo and Stooq always; Alpha Vantage only when a key is configured.
    pub fn build_adapters(&self, http_client: Arc<dyn HttpClient>) -> Vec<Arc<dyn DataSource>> {
        let options = self.adapter_options();
        let mut adapters: Vec<Arc<dyn DataSource>> = vec![
            Arc::new(YahooAdapter::new(http_client.clone()).with_options(options.clone())),
            Arc::new(StooqAdapter::new(http_client.clone()).with_options(options.clone())),
        ];
        if let Some(key) = &self.alphavantage_api_key {
            adapters.push(Arc::new(
                AlphaVantageAdapter::new(http_client, key.clone()).with_options(options),
            ));
        }
        adapters
    }

    /// Cache store for `clock`, attached to Redis when configured and the
    /// `redis` feature is enabled.
    pub async fn build_cache(&self, clock: SharedClock) -> CacheStore {
        let cache = CacheStore::new(self.cache_settings(), clock);
        match &self.redis {
            #[cfg(feature = "redis")]
            Some(redis) => cache.connect_redis(&redis.url()).await,
            #[cfg(not(feature = "redis"))]
            Some(redis) => {
                warn!(
                    url = %redis.url(),
                    "redis configured but the redis feature is disabled; cache stays in memory"
                );
                cache
            }
            None => cache,
        }
    }

    /// Production resolver with real HTTP adapters.
    pub async fn build_resolver(&self, clock: SharedClock) -> Resolver {
        let adapters = self.build_adapters(Arc::new(ReqwestHttpClient::new()));
        self.assemble(adapters, clock).await
    }

    /// Resolver with no providers registered; every answer is fallback data.
    pub async fn build_offline_resolver(&self, clock: SharedClock) -> Resolver {
        self.assemble(Vec::new(), clock).await
    }

    async fn assemble(&self, adapters: Vec<Arc<dyn DataSource>>, clock: SharedClock) -> Resolver {
        let cache = self.build_cache(clock.clone()).await;
        Resolver::builder()
            .with_adapters(adapters)
            .with_cache(cache)
            .with_rate_limiter(Arc::new(RateLimiter::with_defaults(clock.clone())))
            .with_clock(clock)
            .with_config(self.resolver_config())
            .build()
    }
}

struct Vars<F> {
    lookup: F,
}

impl<F> Vars<F>
where
    F: Fn(&str) -> Option<String>,
{
    /// Prefixed name first, then the bare name. Blank values count as unset.
    fn get(&self, name: &'static str) -> Option<String> {
        (self.lookup)(&format!("{ENV_PREFIX}{name}"))
            .or_else(|| (self.lookup)(name))
            .map(|value| value.trim().to_owned())
            .filter(|value| !value.is_empty())
    }

    fn parsed<T>(&self, name: &'static str, default: T) -> T
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        let Some(raw) = self.get(name) else {
            return default;
        };
        raw.parse::<T>().unwrap_or_else(|error| {
            report(ConfigError::InvalidValue {
                name,
                value: raw,
                reason: error.to_string(),
            });
            default
        })
    }

    fn duration(
        &self,
        name: &'static str,
        default: Duration,
        unit: fn(u64) -> Duration,
    ) -> Duration {
        let Some(raw) = self.get(name) else {
            return default;
        };
        match raw.parse::<u64>() {
            Ok(value) => unit(value),
            Err(error) => {
                report(ConfigError::InvalidValue {
                    name,
                    value: raw,
                    reason: error.to_string(),
                });
                default
            }
        }
    }

    /// Like [`Self::duration`] in milliseconds, rejecting zero.
    fn millis(&self, name: &'static str, default: Duration) -> Duration {
        let value = self.duration(name, default, Duration::from_millis);
        if value.is_zero() {
            report(ConfigError::InvalidValue {
                name,
                value: String::from("0"),
                reason: String::from("must be positive"),
            });
            return default;
        }
        value
    }

    fn flag(&self, name: &'static str, default: bool) -> bool {
        let Some(raw) = self.get(name) else {
            return default;
        };
        match raw.to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => true,
            "0" | "false" | "no" | "off" => false,
            _ => {
                report(ConfigError::InvalidValue {
                    name,
                    value: raw,
                    reason: String::from("expected true or false"),
                });
                default
            }
        }
    }
}

fn report(error: ConfigError) {
    warn!(%error, "ignoring invalid configuration value");
}
