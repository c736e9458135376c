//! Retry policy for the reconnect cycle.
//!
//! Two tiers: a per-attempt exponential backoff capped at 30 seconds, and a
//! coarser circuit breaker that trades per-attempt growth for one long
//! cooldown once too many quick attempts have failed in a row.

use std::time::Duration;

use tokio::time::Instant;

/// Tunable retry behavior. The defaults are the production values.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Upper bound for the per-attempt exponential delay.
    pub max_delay: Duration,
    /// A new attempt this long after the previous one starts from scratch.
    pub reset_after: Duration,
    /// Quick attempts allowed before the circuit breaker trips.
    pub max_attempts: u32,
    /// Fixed sleep served when the circuit breaker trips.
    pub cooldown: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_delay: Duration::from_secs(30),
            reset_after: Duration::from_secs(300),
            max_attempts: 10,
            cooldown: Duration::from_secs(300),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `attempt`: `min(max_delay, 2^attempt)`.
    pub fn next_delay(&self, attempt: u32) -> Duration {
        let secs = 2u64
            .saturating_pow(attempt)
            .min(self.max_delay.as_secs());
        Duration::from_secs(secs)
    }

    /// Whether the previous attempt is old enough that the counter should
    /// start over.
    pub fn should_reset(&self, last_attempt: Option<Instant>, now: Instant) -> bool {
        last_attempt
            .map(|at| now.duration_since(at) > self.reset_after)
            .unwrap_or(false)
    }
}

/// Mutable retry bookkeeping, owned exclusively by the connection manager.
#[derive(Debug, Default)]
pub struct RetryState {
    pub attempts: u32,
    pub last_attempt: Option<Instant>,
}

impl RetryState {
    /// Applies the 5-minute reset rule ahead of a new attempt.
    pub fn maybe_reset(&mut self, policy: &RetryPolicy, now: Instant) {
        if policy.should_reset(self.last_attempt, now) {
            self.attempts = 0;
        }
    }

    pub fn record_failure(&mut self, now: Instant) {
        self.attempts += 1;
        self.last_attempt = Some(now);
    }

    pub fn record_success(&mut self) {
        self.attempts = 0;
        self.last_attempt = None;
    }

    pub fn at_ceiling(&self, policy: &RetryPolicy) -> bool {
        self.attempts >= policy.max_attempts
    }
}

/// Adds up to 10% random jitter to a computed delay. Applied only where the
/// receive loop actually sleeps, so the policy sequence itself stays exact.
pub fn jittered(delay: Duration) -> Duration {
    let spread = delay.as_millis() as u64 / 10;
    if spread == 0 {
        return delay;
    }
    delay + Duration::from_millis(rand::random_range(0..=spread))
}
