//! Per-provider request budgeting with an embedded circuit breaker.
//!
//! Each provider keeps a sliding log of request instants pruned to its quota
//! window, plus a minimum spacing between consecutive requests. The
//! provider's [`CircuitBreaker`] is consulted first: an open breaker denies
//! regardless of window capacity.
//!
//! The limiter never panics and never blocks the data path on its own
//! failures: a poisoned window lock admits the request.

use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use serde::Serialize;
use std::sync::Mutex;
use tracing::{debug, warn};

use crate::circuit_breaker::{CircuitBreaker, CircuitSnapshot};
use crate::clock::{system_clock, SharedClock};
use crate::data_source::FetchErrorKind;
use crate::provider_policy::ProviderPolicy;
use crate::ProviderId;

/// Outcome of asking whether a provider may be called now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Allowed,
    /// Window or spacing budget exhausted; legal again after `wait`.
    Throttled { wait: Duration },
    /// Breaker open; a trial call becomes legal after `retry_in`.
    CircuitOpen { retry_in: Duration },
}

impl Admission {
    pub const fn is_allowed(self) -> bool {
        matches!(self, Self::Allowed)
    }

    /// Time until the next attempt is legal; zero when allowed.
    pub const fn wait(self) -> Duration {
        match self {
            Self::Allowed => Duration::ZERO,
            Self::Throttled { wait } => wait,
            Self::CircuitOpen { retry_in } => retry_in,
        }
    }
}

/// Diagnostic snapshot of one provider's budget and breaker.
#[derive(Debug, Clone, Serialize)]
pub struct ProviderStatus {
    pub provider: ProviderId,
    pub requests_in_window: usize,
    pub quota_limit: u32,
    pub quota_window_secs: u64,
    pub min_interval_ms: u64,
    pub circuit: CircuitSnapshot,
}

#[derive(Debug)]
struct ProviderSlot {
    policy: ProviderPolicy,
    requests: Mutex<VecDeque<Instant>>,
    breaker: CircuitBreaker,
}

/// Sliding-window rate limiter keyed by provider.
#[derive(Debug)]
pub struct RateLimiter {
    clock: SharedClock,
    slots: HashMap<ProviderId, ProviderSlot>,
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::with_defaults(system_clock())
    }
}

impl RateLimiter {
    pub fn new(policies: impl IntoIterator<Item = ProviderPolicy>, clock: SharedClock) -> Self {
        let slots = policies
            .into_iter()
            .map(|policy| {
                let breaker = CircuitBreaker::with_clock(policy.circuit_breaker, clock.clone());
                (
                    policy.provider_id,
                    ProviderSlot {
                        policy,
                        requests: Mutex::new(VecDeque::new()),
                        breaker,
                    },
                )
            })
            .collect();
        Self { clock, slots }
    }

    /// Limiter with the default policy for every known provider.
    pub fn with_defaults(clock: SharedClock) -> Self {
        Self::new(ProviderId::ALL.map(ProviderPolicy::default_for), clock)
    }

    /// Whether `provider` may be called now. Does not record anything
    /// against the window.
    pub fn can_make_request(&self, provider: ProviderId) -> Admission {
        self.admit(provider, false)
    }

    /// Checks admission and, while each required wait fits in what is left
    /// of `max_wait`, sleeps it out and checks again. On success the request
    /// is already recorded against the window, so concurrent waiters keep
    /// their spacing. Returns the denying admission otherwise.
    pub async fn wait_if_needed(
        &self,
        provider: ProviderId,
        max_wait: Duration,
    ) -> Result<(), Admission> {
        let mut waited = Duration::ZERO;
        loop {
            match self.admit(provider, true) {
                Admission::Allowed => return Ok(()),
                Admission::Throttled { wait } if waited.saturating_add(wait) <= max_wait => {
                    debug!(%provider, wait_ms = wait.as_millis() as u64, "waiting for rate budget");
                    tokio::time::sleep(wait).await;
                    waited = waited.saturating_add(wait);
                }
                denied => return Err(denied),
            }
        }
    }

    /// Gives back a half-open trial admitted by [`Self::wait_if_needed`]
    /// when the call is not made after all.
    pub fn release_trial(&self, provider: ProviderId) {
        if let Some(slot) = self.slots.get(&provider) {
            slot.breaker.release_trial();
        }
    }

    fn admit(&self, provider: ProviderId, reserve: bool) -> Admission {
        let Some(slot) = self.slots.get(&provider) else {
            return Admission::Allowed;
        };

        if !slot.breaker.allow_request() {
            return Admission::CircuitOpen {
                retry_in: slot.breaker.retry_in().unwrap_or_default(),
            };
        }

        let now = self.clock.now();
        let Ok(mut requests) = slot.requests.lock() else {
            warn!(%provider, "rate limiter window lock poisoned; admitting request");
            return Admission::Allowed;
        };
        prune(&mut requests, now, slot.policy.quota_window);

        let admission = window_admission(&requests, &slot.policy, now);
        match admission {
            Admission::Allowed if reserve => requests.push_back(now),
            Admission::Allowed => {}
            _ => slot.breaker.release_trial(),
        }
        admission
    }

    pub fn record_request(&self, provider: ProviderId) {
        let Some(slot) = self.slots.get(&provider) else {
            return;
        };
        let now = self.clock.now();
        match slot.requests.lock() {
            Ok(mut requests) => {
                prune(&mut requests, now, slot.policy.quota_window);
                requests.push_back(now);
            }
            Err(_) => warn!(%provider, "rate limiter window lock poisoned; request not recorded"),
        }
    }

    pub fn record_success(&self, provider: ProviderId) {
        if let Some(slot) = self.slots.get(&provider) {
            slot.breaker.record_success();
        }
    }

    pub fn record_failure(&self, provider: ProviderId, kind: FetchErrorKind) {
        let Some(slot) = self.slots.get(&provider) else {
            return;
        };
        match kind {
            FetchErrorKind::RateLimited => slot.breaker.record_rate_limited(),
            FetchErrorKind::Unsupported => slot.breaker.release_trial(),
            _ => slot.breaker.record_failure(),
        }
    }

    pub fn breaker(&self, provider: ProviderId) -> Option<&CircuitBreaker> {
        self.slots.get(&provider).map(|slot| &slot.breaker)
    }

    pub fn snapshot(&self, provider: ProviderId) -> Option<ProviderStatus> {
        let slot = self.slots.get(&provider)?;
        let now = self.clock.now();
        let requests_in_window = slot
            .requests
            .lock()
            .map(|mut requests| {
                prune(&mut requests, now, slot.policy.quota_window);
                requests.len()
            })
            .unwrap_or_default();

        Some(ProviderStatus {
            provider,
            requests_in_window,
            quota_limit: slot.policy.quota_limit,
            quota_window_secs: slot.policy.quota_window.as_secs(),
            min_interval_ms: slot.policy.min_interval.as_millis() as u64,
            circuit: slot.breaker.snapshot(),
        })
    }

    pub fn providers(&self) -> Vec<ProviderId> {
        let mut providers = self.slots.keys().copied().collect::<Vec<_>>();
        providers.sort();
        providers
    }
}

fn window_admission(
    requests: &VecDeque<Instant>,
    policy: &ProviderPolicy,
    now: Instant,
) -> Admission {
    if let Some(last) = requests.back() {
        let since_last = now.saturating_duration_since(*last);
        if since_last < policy.min_interval {
            return Admission::Throttled {
                wait: policy.min_interval - since_last,
            };
        }
    }

    let limit = usize::try_from(policy.quota_limit).unwrap_or(usize::MAX);
    if requests.len() >= limit {
        let oldest = requests.front().copied().unwrap_or(now);
        let age = now.saturating_duration_since(oldest);
        let wait = policy
            .quota_window
            .saturating_sub(age)
            .max(Duration::from_millis(1));
        return Admission::Throttled { wait };
    }

    Admission::Allowed
}

fn prune(requests: &mut VecDeque<Instant>, now: Instant, window: Duration) {
    while let Some(oldest) = requests.front() {
        if now.saturating_duration_since(*oldest) >= window {
            requests.pop_front();
        } else {
            break;
        }
    }
}
