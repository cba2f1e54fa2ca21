use std::sync::Arc;
use std::time::{Duration, Instant};

use aksjeradar_core::{
    system_clock, Admission, CircuitBreakerConfig, CircuitState, FetchErrorKind, ManualClock,
    ProviderId, ProviderPolicy, RateLimiter, SharedClock,
};

fn policy(quota_limit: u32, quota_window: Duration, min_interval: Duration) -> ProviderPolicy {
    ProviderPolicy {
        provider_id: ProviderId::Yahoo,
        quota_window,
        quota_limit,
        min_interval,
        circuit_breaker: CircuitBreakerConfig::default(),
    }
}

fn limiter_with(policy: ProviderPolicy, clock: &ManualClock) -> RateLimiter {
    let shared: SharedClock = Arc::new(clock.clone());
    RateLimiter::new([policy], shared)
}

fn trip(limiter: &RateLimiter, provider: ProviderId) {
    for _ in 0..5 {
        limiter.record_request(provider);
        limiter.record_failure(provider, FetchErrorKind::Unavailable);
    }
}

#[test]
fn window_ceiling_throttles_until_the_oldest_request_ages_out() {
    // Given: a budget of three requests per minute
    let clock = ManualClock::new();
    let limiter = limiter_with(policy(3, Duration::from_secs(60), Duration::ZERO), &clock);

    // When: the budget is spent
    for _ in 0..3 {
        assert!(limiter.can_make_request(ProviderId::Yahoo).is_allowed());
        limiter.record_request(ProviderId::Yahoo);
        clock.advance(Duration::from_secs(10));
    }

    // Then: the next request waits for the first one to leave the window
    assert_eq!(
        limiter.can_make_request(ProviderId::Yahoo),
        Admission::Throttled {
            wait: Duration::from_secs(30)
        }
    );
    clock.advance(Duration::from_secs(30));
    assert!(limiter.can_make_request(ProviderId::Yahoo).is_allowed());
}

#[test]
fn minimum_interval_spaces_consecutive_requests() {
    // Given: requests must be at least one second apart
    let clock = ManualClock::new();
    let limiter = limiter_with(policy(100, Duration::from_secs(3600), Duration::from_secs(1)), &clock);
    limiter.record_request(ProviderId::Yahoo);

    // When: asking again after 400 ms
    clock.advance(Duration::from_millis(400));
    let admission = limiter.can_make_request(ProviderId::Yahoo);

    // Then: the remaining spacing is reported, and honoured once it elapses
    assert_eq!(
        admission,
        Admission::Throttled {
            wait: Duration::from_millis(600)
        }
    );
    clock.advance(Duration::from_millis(600));
    assert!(limiter.can_make_request(ProviderId::Yahoo).is_allowed());
}

#[test]
fn five_failures_open_the_circuit() {
    // Given: a provider with plenty of request budget
    let clock = ManualClock::new();
    let limiter = limiter_with(ProviderPolicy::unlimited(ProviderId::Yahoo), &clock);

    // When: five consecutive failures are recorded
    trip(&limiter, ProviderId::Yahoo);

    // Then: the breaker denies regardless of window capacity
    let admission = limiter.can_make_request(ProviderId::Yahoo);
    assert!(!admission.is_allowed());
    assert!(matches!(admission, Admission::CircuitOpen { .. }));
    assert_eq!(admission.wait(), Duration::from_secs(300));
}

#[test]
fn four_failures_leave_the_circuit_closed() {
    let clock = ManualClock::new();
    let limiter = limiter_with(ProviderPolicy::unlimited(ProviderId::Yahoo), &clock);

    for _ in 0..4 {
        limiter.record_failure(ProviderId::Yahoo, FetchErrorKind::Timeout);
    }
    limiter.record_success(ProviderId::Yahoo);
    limiter.record_failure(ProviderId::Yahoo, FetchErrorKind::Timeout);

    assert!(limiter.can_make_request(ProviderId::Yahoo).is_allowed());
    let breaker = limiter.breaker(ProviderId::Yahoo).expect("breaker");
    assert_eq!(breaker.consecutive_failures(), 1);
}

#[test]
fn failed_trial_after_recovery_timeout_reopens_the_circuit() {
    // Given: an open breaker
    let clock = ManualClock::new();
    let limiter = limiter_with(ProviderPolicy::unlimited(ProviderId::Yahoo), &clock);
    trip(&limiter, ProviderId::Yahoo);

    // When: the recovery timeout passes
    clock.advance(Duration::from_secs(301));

    // Then: one trial is allowed in half-open state
    assert!(limiter.can_make_request(ProviderId::Yahoo).is_allowed());
    let breaker = limiter.breaker(ProviderId::Yahoo).expect("breaker");
    assert_eq!(breaker.state(), CircuitState::HalfOpen);

    // And: a failed trial reopens it and still counts as a failure
    limiter.record_failure(ProviderId::Yahoo, FetchErrorKind::Unavailable);
    assert_eq!(breaker.state(), CircuitState::Open);
    assert_eq!(breaker.consecutive_failures(), 6);
    assert!(!limiter.can_make_request(ProviderId::Yahoo).is_allowed());
}

#[test]
fn half_open_circuit_admits_one_trial_at_a_time() {
    // Given: an open breaker past its recovery timeout
    let clock = ManualClock::new();
    let limiter = limiter_with(ProviderPolicy::unlimited(ProviderId::Yahoo), &clock);
    trip(&limiter, ProviderId::Yahoo);
    clock.advance(Duration::from_secs(301));

    // When: three callers ask for admission before the trial settles
    let admitted = (0..3)
        .map(|_| limiter.can_make_request(ProviderId::Yahoo).is_allowed())
        .collect::<Vec<_>>();

    // Then: only the first one is let through
    assert_eq!(admitted, vec![true, false, false]);

    // And: once the trial succeeds the circuit admits everyone again
    limiter.record_success(ProviderId::Yahoo);
    assert!(limiter.can_make_request(ProviderId::Yahoo).is_allowed());
    assert!(limiter.can_make_request(ProviderId::Yahoo).is_allowed());
}

#[test]
fn successful_trial_closes_the_circuit() {
    let clock = ManualClock::new();
    let limiter = limiter_with(ProviderPolicy::unlimited(ProviderId::Yahoo), &clock);
    trip(&limiter, ProviderId::Yahoo);
    clock.advance(Duration::from_secs(300));

    assert!(limiter.can_make_request(ProviderId::Yahoo).is_allowed());
    limiter.record_success(ProviderId::Yahoo);

    let breaker = limiter.breaker(ProviderId::Yahoo).expect("breaker");
    assert_eq!(breaker.state(), CircuitState::Closed);
    assert_eq!(breaker.consecutive_failures(), 0);
}

#[test]
fn upstream_rate_limit_opens_with_penalized_timeout() {
    // Given: a healthy provider
    let clock = ManualClock::new();
    let limiter = limiter_with(ProviderPolicy::unlimited(ProviderId::Yahoo), &clock);

    // When: a single rate-limit rejection is recorded
    limiter.record_failure(ProviderId::Yahoo, FetchErrorKind::RateLimited);

    // Then: the breaker opens for three times the recovery timeout
    assert_eq!(
        limiter.can_make_request(ProviderId::Yahoo),
        Admission::CircuitOpen {
            retry_in: Duration::from_secs(900)
        }
    );
    clock.advance(Duration::from_secs(301));
    assert!(!limiter.can_make_request(ProviderId::Yahoo).is_allowed());
    clock.advance(Duration::from_secs(600));
    assert!(limiter.can_make_request(ProviderId::Yahoo).is_allowed());
}

#[test]
fn unsupported_failures_do_not_count_against_the_breaker() {
    let clock = ManualClock::new();
    let limiter = limiter_with(ProviderPolicy::unlimited(ProviderId::Yahoo), &clock);

    for _ in 0..10 {
        limiter.record_failure(ProviderId::Yahoo, FetchErrorKind::Unsupported);
    }

    assert!(limiter.can_make_request(ProviderId::Yahoo).is_allowed());
    let breaker = limiter.breaker(ProviderId::Yahoo).expect("breaker");
    assert_eq!(breaker.consecutive_failures(), 0);
}

#[test]
fn untracked_providers_are_always_admitted() {
    let clock = ManualClock::new();
    let limiter = limiter_with(ProviderPolicy::unlimited(ProviderId::Yahoo), &clock);

    trip(&limiter, ProviderId::Stooq);

    assert!(limiter.can_make_request(ProviderId::Stooq).is_allowed());
    assert!(limiter.breaker(ProviderId::Stooq).is_none());
    assert!(limiter.snapshot(ProviderId::Stooq).is_none());
}

#[test]
fn snapshot_reports_budget_and_breaker_state() {
    // Given: two requests and one failure
    let clock = ManualClock::new();
    let limiter = limiter_with(policy(10, Duration::from_secs(60), Duration::ZERO), &clock);
    limiter.record_request(ProviderId::Yahoo);
    limiter.record_request(ProviderId::Yahoo);
    limiter.record_failure(ProviderId::Yahoo, FetchErrorKind::Timeout);

    // When: taking a snapshot
    let status = limiter.snapshot(ProviderId::Yahoo).expect("tracked provider");

    // Then: the window and breaker figures are reported
    assert_eq!(status.provider, ProviderId::Yahoo);
    assert_eq!(status.requests_in_window, 2);
    assert_eq!(status.quota_limit, 10);
    assert_eq!(status.quota_window_secs, 60);
    assert_eq!(status.circuit.state, CircuitState::Closed);
    assert_eq!(status.circuit.consecutive_failures, 1);
    assert_eq!(status.circuit.retry_in_ms, None);

    // And: requests older than the window are no longer counted
    clock.advance(Duration::from_secs(60));
    let status = limiter.snapshot(ProviderId::Yahoo).expect("tracked provider");
    assert_eq!(status.requests_in_window, 0);
}

#[test]
fn default_limiter_tracks_every_provider() {
    let clock = ManualClock::new();
    let shared: SharedClock = Arc::new(clock);
    let limiter = RateLimiter::with_defaults(shared);

    assert_eq!(
        limiter.providers(),
        vec![ProviderId::Yahoo, ProviderId::Stooq, ProviderId::Alphavantage]
    );
    let alphavantage = limiter
        .snapshot(ProviderId::Alphavantage)
        .expect("tracked provider");
    assert_eq!(alphavantage.quota_limit, 25);
    assert_eq!(alphavantage.min_interval_ms, 12_000);
}

#[tokio::test]
async fn wait_if_needed_sleeps_out_short_throttles() {
    // Given: a 20 ms spacing requirement and a fresh request
    let limiter = RateLimiter::new(
        [policy(100, Duration::from_secs(60), Duration::from_millis(20))],
        system_clock(),
    );
    limiter.record_request(ProviderId::Yahoo);

    // When: the caller tolerates up to one second of waiting
    let result = limiter
        .wait_if_needed(ProviderId::Yahoo, Duration::from_secs(1))
        .await;

    // Then: the wait is absorbed
    assert_eq!(result, Ok(()));
}

#[tokio::test]
async fn wait_if_needed_rejects_throttles_beyond_max_wait() {
    // Given: an exhausted one-request-per-minute budget
    let clock = ManualClock::new();
    let limiter = limiter_with(policy(1, Duration::from_secs(60), Duration::ZERO), &clock);
    limiter.record_request(ProviderId::Yahoo);

    // When: the caller only tolerates a short wait
    let result = limiter
        .wait_if_needed(ProviderId::Yahoo, Duration::from_millis(100))
        .await;

    // Then: the throttle is returned instead of slept out
    assert_eq!(
        result,
        Err(Admission::Throttled {
            wait: Duration::from_secs(60)
        })
    );
}

#[tokio::test]
async fn wait_if_needed_never_waits_on_an_open_circuit() {
    let clock = ManualClock::new();
    let limiter = limiter_with(ProviderPolicy::unlimited(ProviderId::Yahoo), &clock);
    trip(&limiter, ProviderId::Yahoo);

    let result = limiter
        .wait_if_needed(ProviderId::Yahoo, Duration::from_secs(3600))
        .await;

    assert!(matches!(result, Err(Admission::CircuitOpen { .. })));
}

#[tokio::test]
async fn concurrent_waiters_keep_the_minimum_spacing() {
    // Given: requests must be 50 ms apart and one was just made
    let limiter = RateLimiter::new(
        [policy(100, Duration::from_secs(60), Duration::from_millis(50))],
        system_clock(),
    );
    let started = Instant::now();
    limiter.record_request(ProviderId::Yahoo);

    // When: three callers wait for the same provider at once
    let wait = || limiter.wait_if_needed(ProviderId::Yahoo, Duration::from_secs(2));
    let (first, second, third) = tokio::join!(wait(), wait(), wait());

    // Then: each is admitted in its own slot, one spacing after the previous
    assert_eq!((first, second, third), (Ok(()), Ok(()), Ok(())));
    assert!(started.elapsed() >= Duration::from_millis(150));
    let status = limiter.snapshot(ProviderId::Yahoo).expect("tracked provider");
    assert_eq!(status.requests_in_window, 4);
}

#[tokio::test]
async fn waiting_stops_once_max_wait_is_used_up() {
    // Given: a 40 ms spacing and a caller that tolerates 60 ms in total
    let limiter = RateLimiter::new(
        [policy(100, Duration::from_secs(60), Duration::from_millis(40))],
        system_clock(),
    );
    limiter.record_request(ProviderId::Yahoo);

    // When: two callers compete for the next slot
    let wait = || limiter.wait_if_needed(ProviderId::Yahoo, Duration::from_millis(60));
    let (first, second) = tokio::join!(wait(), wait());

    // Then: one gets the slot and the other gives up instead of oversleeping
    let results = [first, second];
    assert_eq!(results.iter().filter(|result| result.is_ok()).count(), 1);
    assert!(results
        .iter()
        .any(|result| matches!(result, Err(Admission::Throttled { .. }))));
}
