//! Consecutive-failure circuit breaker for the synthesis service.
//!
//! Pure state machine with no internal locking — the manager owns one
//! instance inside its state lock and is responsible for synchronization.
//!
//! Closed (count < threshold) → Open (count ≥ threshold) → Closed again
//! once the cooldown has elapsed; the count resets to zero atomically with
//! the next admitted attempt. A manual reset clears everything regardless.

use tokio::time::{Duration, Instant};

use crate::error::NarrateError;

/// Consecutive countable failures before the breaker opens.
pub const FAILURE_THRESHOLD: u32 = 5;

/// How long the breaker stays open after the last failure.
pub const COOLDOWN: Duration = Duration::from_millis(300_000);

/// Failure-counting gate in front of the remote synthesis service.
#[derive(Debug)]
pub struct CircuitBreaker {
    failure_count: u32,
    last_failure: Option<Instant>,
    threshold: u32,
    cooldown: Duration,
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new()
    }
}

impl CircuitBreaker {
    /// Breaker with the standard threshold and cooldown.
    #[must_use]
    pub const fn new() -> Self {
        Self::with_policy(FAILURE_THRESHOLD, COOLDOWN)
    }

    /// Breaker with a custom policy (operator override, tests).
    #[must_use]
    pub const fn with_policy(threshold: u32, cooldown: Duration) -> Self {
        Self {
            failure_count: 0,
            last_failure: None,
            threshold,
            cooldown,
        }
    }

    /// Gate an attempt: `Ok` admits it, `CircuitOpen` refuses it.
    ///
    /// If the cooldown has elapsed since the last failure, the breaker
    /// closes and the count resets as part of admitting this attempt.
    pub fn check(&mut self) -> Result<(), NarrateError> {
        if self.failure_count < self.threshold {
            return Ok(());
        }

        let cooled_down = self
            .last_failure
            .is_some_and(|at| at.elapsed() > self.cooldown);
        if cooled_down {
            tracing::info!(
                failures = self.failure_count,
                "Circuit breaker cooldown elapsed — closing and admitting attempt"
            );
            self.failure_count = 0;
            self.last_failure = None;
            return Ok(());
        }

        Err(NarrateError::CircuitOpen)
    }

    /// Record a countable failure.
    pub fn record_failure(&mut self) {
        self.failure_count += 1;
        self.last_failure = Some(Instant::now());
        if self.failure_count == self.threshold {
            tracing::warn!(
                failures = self.failure_count,
                cooldown_ms = self.cooldown.as_millis() as u64,
                "Circuit breaker opened — synthesis disabled until cooldown"
            );
        }
    }

    /// Record a successful synthesis, clearing the consecutive count.
    pub fn record_success(&mut self) {
        self.failure_count = 0;
        self.last_failure = None;
    }

    /// Operator override: clear both fields unconditionally.
    pub fn reset(&mut self) {
        if self.failure_count > 0 {
            tracing::info!(failures = self.failure_count, "Circuit breaker manually reset");
        }
        self.failure_count = 0;
        self.last_failure = None;
    }

    /// Whether the breaker is currently refusing attempts.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.failure_count >= self.threshold
            && !self
                .last_failure
                .is_some_and(|at| at.elapsed() > self.cooldown)
    }

    /// Current consecutive-failure count.
    #[must_use]
    pub const fn failure_count(&self) -> u32 {
        self.failure_count
    }
}
