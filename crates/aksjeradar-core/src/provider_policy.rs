use std::time::Duration;

use crate::circuit_breaker::CircuitBreakerConfig;
use crate::ProviderId;

/// Request budget and failure policy for one upstream provider.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderPolicy {
    pub provider_id: ProviderId,
    /// Length of the rolling request window.
    pub quota_window: Duration,
    /// Maximum requests inside `quota_window`.
    pub quota_limit: u32,
    /// Minimum spacing between two consecutive requests.
    pub min_interval: Duration,
    pub circuit_breaker: CircuitBreakerConfig,
}

impl ProviderPolicy {
    pub fn yahoo_default() -> Self {
        Self {
            provider_id: ProviderId::Yahoo,
            quota_window: Duration::from_secs(3600),
            quota_limit: 360,
            min_interval: Duration::from_secs(1),
            circuit_breaker: CircuitBreakerConfig::default(),
        }
    }

    pub fn stooq_default() -> Self {
        Self {
            provider_id: ProviderId::Stooq,
            quota_window: Duration::from_secs(3600),
            quota_limit: 600,
            min_interval: Duration::from_millis(500),
            circuit_breaker: CircuitBreakerConfig::default(),
        }
    }

    /// Free tier: 25 requests per day, spread to at most 5 per minute.
    pub fn alphavantage_default() -> Self {
        Self {
            provider_id: ProviderId::Alphavantage,
            quota_window: Duration::from_secs(3600),
            quota_limit: 25,
            min_interval: Duration::from_secs(12),
            circuit_breaker: CircuitBreakerConfig::default(),
        }
    }

    pub fn default_for(provider_id: ProviderId) -> Self {
        match provider_id {
            ProviderId::Yahoo => Self::yahoo_default(),
            ProviderId::Stooq => Self::stooq_default(),
            ProviderId::Alphavantage => Self::alphavantage_default(),
        }
    }

    /// Policy with no request budget limits, for tests and offline runs.
    pub fn unlimited(provider_id: ProviderId) -> Self {
        Self {
            provider_id,
            quota_window: Duration::from_secs(3600),
            quota_limit: u32::MAX,
            min_interval: Duration::ZERO,
            circuit_breaker: CircuitBreakerConfig::default(),
        }
    }

    pub fn with_circuit_breaker(mut self, config: CircuitBreakerConfig) -> Self {
        self.circuit_breaker = config;
        self
    }
}
