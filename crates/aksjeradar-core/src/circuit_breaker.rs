use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::clock::{system_clock, SharedClock};

/// Runtime circuit state for a provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

/// Circuit breaker thresholds and timers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures that open a closed breaker.
    pub failure_threshold: u32,
    /// Time an open breaker waits before allowing a half-open trial.
    pub recovery_timeout: Duration,
    /// Successes needed while half-open to close again.
    pub success_threshold: u32,
    /// Multiplier applied to `recovery_timeout` after an upstream rate-limit response.
    pub rate_limit_penalty: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout: Duration::from_secs(300),
            success_threshold: 1,
            rate_limit_penalty: 3,
        }
    }
}

#[derive(Debug)]
struct CircuitInner {
    state: CircuitState,
    consecutive_failures: u32,
    half_open_successes: u32,
    /// When the current half-open trial was admitted, until it is settled.
    trial_started_at: Option<Instant>,
    opened_at: Option<Instant>,
    open_for: Duration,
}

impl CircuitInner {
    fn new(config: &CircuitBreakerConfig) -> Self {
        Self {
            state: CircuitState::Closed,
            consecutive_failures: 0,
            half_open_successes: 0,
            trial_started_at: None,
            opened_at: None,
            open_for: config.recovery_timeout,
        }
    }

    fn open(&mut self, now: Instant, open_for: Duration) {
        self.state = CircuitState::Open;
        self.opened_at = Some(now);
        self.open_for = open_for;
        self.half_open_successes = 0;
        self.trial_started_at = None;
    }
}

/// Point-in-time view of a breaker, used for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CircuitSnapshot {
    pub state: CircuitState,
    pub consecutive_failures: u32,
    pub retry_in_ms: Option<u64>,
}

/// Thread-safe circuit breaker guarding one upstream provider.
#[derive(Debug)]
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    clock: SharedClock,
    inner: Mutex<CircuitInner>,
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(CircuitBreakerConfig::default())
    }
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self::with_clock(config, system_clock())
    }

    pub fn with_clock(config: CircuitBreakerConfig, clock: SharedClock) -> Self {
        Self {
            inner: Mutex::new(CircuitInner::new(&config)),
            config,
            clock,
        }
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Returns whether a call may go upstream, moving an expired open breaker
    /// to half-open. Half-open admits one trial at a time; later callers are
    /// denied until that trial is recorded or released. A trial left
    /// unsettled for a full recovery timeout is treated as lost.
    pub fn allow_request(&self) -> bool {
        let now = self.clock.now();
        let mut inner = self.lock();
        match inner.state {
            CircuitState::Closed => true,
            CircuitState::HalfOpen => {
                let busy = inner.trial_started_at.is_some_and(|started| {
                    now.saturating_duration_since(started) < self.config.recovery_timeout
                });
                if busy {
                    false
                } else {
                    inner.trial_started_at = Some(now);
                    true
                }
            }
            CircuitState::Open => {
                let recovered = inner
                    .opened_at
                    .map(|opened_at| now.saturating_duration_since(opened_at) >= inner.open_for)
                    .unwrap_or(true);

                if recovered {
                    inner.state = CircuitState::HalfOpen;
                    inner.opened_at = None;
                    inner.half_open_successes = 0;
                    inner.trial_started_at = Some(now);
                    true
                } else {
                    false
                }
            }
        }
    }

    pub fn record_success(&self) {
        let mut inner = self.lock();
        match inner.state {
            CircuitState::HalfOpen => {
                inner.trial_started_at = None;
                inner.half_open_successes = inner.half_open_successes.saturating_add(1);
                if inner.half_open_successes >= self.config.success_threshold.max(1) {
                    inner.state = CircuitState::Closed;
                    inner.consecutive_failures = 0;
                    inner.half_open_successes = 0;
                    inner.open_for = self.config.recovery_timeout;
                }
            }
            CircuitState::Closed => {
                inner.consecutive_failures = 0;
            }
            CircuitState::Open => {}
        }
    }

    /// Gives back a half-open trial that was admitted but never sent.
    pub fn release_trial(&self) {
        let mut inner = self.lock();
        if inner.state == CircuitState::HalfOpen {
            inner.trial_started_at = None;
        }
    }

    /// Records a generic failure. A failure while half-open reopens the
    /// breaker immediately and still counts towards the failure total.
    pub fn record_failure(&self) {
        let now = self.clock.now();
        let mut inner = self.lock();
        inner.consecutive_failures = inner.consecutive_failures.saturating_add(1);

        let reopen = inner.state == CircuitState::HalfOpen;
        let trip = inner.state == CircuitState::Closed
            && inner.consecutive_failures >= self.config.failure_threshold;
        if reopen || trip {
            let open_for = inner.open_for.max(self.config.recovery_timeout);
            inner.open(now, open_for);
        }
    }

    /// Records an explicit upstream rate-limit rejection: opens the breaker at
    /// once with the penalized recovery timeout.
    pub fn record_rate_limited(&self) {
        let now = self.clock.now();
        let mut inner = self.lock();
        inner.consecutive_failures = inner.consecutive_failures.saturating_add(1);
        let open_for = self
            .config
            .recovery_timeout
            .saturating_mul(self.config.rate_limit_penalty.max(1));
        inner.open(now, open_for);
    }

    pub fn state(&self) -> CircuitState {
        self.lock().state
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.lock().consecutive_failures
    }

    /// Time left before an open breaker allows a trial call.
    pub fn retry_in(&self) -> Option<Duration> {
        let now = self.clock.now();
        let inner = self.lock();
        if inner.state != CircuitState::Open {
            return None;
        }
        let opened_at = inner.opened_at?;
        Some(inner.open_for.saturating_sub(now.saturating_duration_since(opened_at)))
    }

    pub fn snapshot(&self) -> CircuitSnapshot {
        CircuitSnapshot {
            state: self.state(),
            consecutive_failures: self.consecutive_failures(),
            retry_in_ms: self
                .retry_in()
                .map(|wait| wait.as_millis().min(u128::from(u64::MAX)) as u64),
        }
    }

    fn lock(&self) -> MutexGuard<'_, CircuitInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
