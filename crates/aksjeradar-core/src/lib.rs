//! # Aksjeradar Core
//!
//! Best-effort market-data resolution for the Aksjeradar dashboard.
//!
//! ## Overview
//!
//! Quotes and price history are fetched from several upstream providers in
//! a fixed priority order. Each provider has its own request budget and
//! circuit breaker, results are cached per category, and when no provider
//! answers the resolver serves deterministic synthetic data labeled as
//! fallback. Callers never see an error.
//!
//! ## Feature Flags
//!
//! | Flag | Description |
//! |------|-------------|
//! | `default` | In-memory cache only |
//! | `redis` | Optional Redis backend behind the in-memory cache |
//!
//! ## Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`adapters`] | Provider adapters (Yahoo, Stooq, Alpha Vantage) |
//! | [`cache`] | TTL cache with per-category expiry |
//! | [`circuit_breaker`] | Per-provider circuit breaker |
//! | [`clock`] | Injectable monotonic time |
//! | [`config`] | Environment configuration and composition helpers |
//! | [`data_source`] | Adapter trait, capabilities and fetch errors |
//! | [`domain`] | Domain models (Quote, Bar, BarSeries, Symbol, Market) |
//! | [`error`] | Core error types |
//! | [`fallback`] | Deterministic synthetic data |
//! | [`http_client`] | HTTP client abstraction |
//! | [`provider_policy`] | Request budgets per provider |
//! | [`rate_limiter`] | Sliding-window admission control |
//! | [`resolver`] | Cache → providers → fallback resolution |
//! | [`retry`] | Transport retry with backoff |
//! | [`source`] | Provider identifiers |
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use aksjeradar_core::{system_clock, AksjeradarConfig};
//!
//! #[tokio::main]
//! async fn main() {
//!     let resolver = AksjeradarConfig::from_env()
//!         .build_resolver(system_clock())
//!         .await;
//!
//!     let quote = resolver.get_quote("EQNR.OL").await;
//!     println!("{} {} ({})", quote.symbol, quote.price, quote.source);
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────┐
//! │  CLI / Caller   │
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐     ┌──────────────────┐
//! │    Resolver     │────▶│   Cache Store    │
//! └────────┬────────┘     └──────────────────┘
//!          │
//!          ▼
//! ┌─────────────────┐     ┌──────────────────┐
//! │  Rate Limiter   │────▶│ Circuit Breaker  │
//! └────────┬────────┘     └──────────────────┘
//!          │
//!          ▼
//! ┌─────────────────┐     ┌──────────────────┐
//! │ Data Source     │────▶│ HTTP Client      │
//! │ (Adapter Trait) │     │ (reqwest)        │
//! └────────┬────────┘     └──────────────────┘
//!          │ all failed
//!          ▼
//! ┌─────────────────┐
//! │    Fallback     │
//! │   Generator     │
//! └─────────────────┘
//! ```
//!
//! ## Error Handling
//!
//! Adapters return [`FetchError`] with a closed set of kinds. The resolver
//! records the kind against the provider and moves on:
//!
//! ```rust
//! use aksjeradar_core::{FetchError, FetchErrorKind};
//!
//! fn describe(error: &FetchError) -> &'static str {
//!     match error.kind() {
//!         FetchErrorKind::RateLimited => "provider penalized, breaker opened",
//!         FetchErrorKind::Unsupported => "provider not counted as failing",
//!         _ => "failure recorded, next provider tried",
//!     }
//! }
//! ```
//!
//! ## Security
//!
//! - API keys are read from environment variables only and never logged
//! - Input symbols are treated as opaque keys, never interpolated unescaped

pub mod adapters;
pub mod cache;
pub mod circuit_breaker;
pub mod clock;
pub mod config;
pub mod data_source;
pub mod domain;
pub mod error;
pub mod fallback;
pub mod http_client;
pub mod provider_policy;
pub mod rate_limiter;
pub mod resolver;
pub mod retry;
pub mod source;

// Re-export commonly used types at crate root for convenience

// Adapter implementations
pub use adapters::{AdapterOptions, AlphaVantageAdapter, StooqAdapter, YahooAdapter};

// Caching
pub use cache::{CacheCategory, CacheSettings, CacheStore};

// Circuit breaker
pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitSnapshot, CircuitState};

// Time
pub use clock::{system_clock, Clock, ManualClock, SharedClock, SystemClock};

// Configuration
pub use config::{AksjeradarConfig, RedisSettings};

// Data source trait and types
pub use data_source::{
    CapabilitySet, DataSource, FetchError, FetchErrorKind, FetchFuture, HistoryRequest, Operation,
};

// Domain models
pub use domain::{
    validate_currency_code, Bar, BarSeries, DataOrigin, Interval, Market, MarketRegion,
    MarketSummary, Period, Quote, Symbol, UtcDateTime,
};

// Error types
pub use error::{ConfigError, CoreError, ValidationError};

// Fallback data
pub use fallback::FallbackGenerator;

// HTTP client types
pub use http_client::{HttpClient, HttpError, HttpRequest, HttpResponse, ReqwestHttpClient};

// Provider policies and admission
pub use provider_policy::ProviderPolicy;
pub use rate_limiter::{Admission, ProviderStatus, RateLimiter};

// Resolution
pub use resolver::{
    provider_priority, AttemptOutcome, ProviderAttempt, Resolution, Resolver, ResolverBuilder,
    ResolverConfig, SkipReason,
};

// Retry logic
pub use retry::{Backoff, RetryConfig};

// Source identifiers
pub use source::ProviderId;
