//! Circuit breaker pattern for provider isolation
//!
//! Closed while consecutive failures stay below the threshold. Reaching the
//! threshold opens the circuit and stamps the failure time. Once the recovery
//! window has elapsed, the next availability check closes the circuit again
//! without a half-open trial call.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Duration;

/// Circuit breaker state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CircuitState {
    /// Requests flow normally
    Closed,
    /// Requests are skipped until the recovery window elapses
    Open,
}

/// Circuit breaker for one provider
#[derive(Debug, Clone)]
pub struct CircuitBreaker {
    state: CircuitState,
    /// Consecutive failures while closed
    failure_count: u32,
    failure_threshold: u32,
    last_failure: Option<DateTime<Utc>>,
    opened_at: Option<DateTime<Utc>>,
    recovery_window: chrono::Duration,
}

impl CircuitBreaker {
    pub fn new(failure_threshold: u32, recovery_window: Duration) -> Self {
        Self {
            state: CircuitState::Closed,
            failure_count: 0,
            failure_threshold: failure_threshold.max(1),
            last_failure: None,
            opened_at: None,
            recovery_window: chrono::Duration::from_std(recovery_window)
                .unwrap_or_else(|_| chrono::Duration::minutes(5)),
        }
    }

    /// Record a failure
    pub fn record_failure(&mut self, now: DateTime<Utc>) {
        self.last_failure = Some(now);
        match self.state {
            CircuitState::Closed => {
                self.failure_count += 1;
                if self.failure_count >= self.failure_threshold {
                    self.open(now);
                }
            }
            CircuitState::Open => {
                // Late result of a call that started before the circuit opened
            }
        }
    }

    /// Record a success
    pub fn record_success(&mut self) {
        if self.state == CircuitState::Closed {
            self.failure_count = 0;
        }
    }

    /// Whether a call may be attempted at `now`. Closes an open circuit
    /// whose recovery window has elapsed.
    pub fn is_available(&mut self, now: DateTime<Utc>) -> bool {
        if self.state == CircuitState::Open {
            if let Some(opened_at) = self.opened_at {
                let elapsed = opened_at
                    .checked_add_signed(self.recovery_window)
                    .is_some_and(|retry_at| now >= retry_at);
                if elapsed {
                    self.close();
                }
            }
        }

        self.state == CircuitState::Closed
    }

    /// Get current state
    pub fn state(&self) -> CircuitState {
        self.state
    }

    pub fn failure_count(&self) -> u32 {
        self.failure_count
    }

    pub fn last_failure(&self) -> Option<DateTime<Utc>> {
        self.last_failure
    }

    /// When an open circuit will close again
    pub fn retry_at(&self) -> Option<DateTime<Utc>> {
        match self.state {
            CircuitState::Open => self
                .opened_at
                .and_then(|t| t.checked_add_signed(self.recovery_window)),
            CircuitState::Closed => None,
        }
    }

    /// Force the circuit closed
    pub fn reset(&mut self) {
        self.close();
        self.last_failure = None;
    }

    fn open(&mut self, now: DateTime<Utc>) {
        self.state = CircuitState::Open;
        self.opened_at = Some(now);
    }

    fn close(&mut self) {
        self.state = CircuitState::Closed;
        self.failure_count = 0;
        self.opened_at = None;
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(3, Duration::from_secs(300))
    }
}
