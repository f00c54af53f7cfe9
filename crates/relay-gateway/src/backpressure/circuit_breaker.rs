//! Per-channel circuit breaker
//!
//! # States
//!
//! - **Closed**: normal operation, sends pass through
//! - **Open**: tripped, sends are rejected immediately
//! - **`HalfOpen`**: cooldown elapsed, a single probe send is allowed
//!
//! The breaker opens when `failure_threshold` consecutive failures land
//! within `failure_window`. A success while closed resets the count.

use parking_lot::RwLock;
use serde::Serialize;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Circuit breaker state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Closed => write!(f, "CLOSED"),
            Self::Open => write!(f, "OPEN"),
            Self::HalfOpen => write!(f, "HALF_OPEN"),
        }
    }
}

/// Breaker thresholds
#[derive(Debug, Clone, Copy)]
pub struct CircuitBreakerConfig {
    pub failure_threshold: u32,
    pub failure_window: Duration,
    pub cooldown: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 10,
            failure_window: Duration::from_secs(10),
            cooldown: Duration::from_secs(30),
        }
    }
}

impl From<&relay_common::BackpressureConfig> for CircuitBreakerConfig {
    fn from(config: &relay_common::BackpressureConfig) -> Self {
        Self {
            failure_threshold: config.failure_threshold.max(1),
            failure_window: config.failure_window(),
            cooldown: config.cooldown(),
        }
    }
}

#[derive(Debug)]
struct BreakerState {
    state: CircuitState,
    failure_count: u32,
    /// First failure of the current streak
    window_started: Option<Instant>,
    opened_at: Option<Instant>,
    probe_in_flight: bool,
}

impl Default for BreakerState {
    fn default() -> Self {
        Self {
            state: CircuitState::Closed,
            failure_count: 0,
            window_started: None,
            opened_at: None,
            probe_in_flight: false,
        }
    }
}

/// Circuit breaker guarding one channel
pub struct CircuitBreaker {
    channel: String,
    config: CircuitBreakerConfig,
    state: RwLock<BreakerState>,
}

impl CircuitBreaker {
    #[must_use]
    pub fn new(channel: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            channel: channel.into(),
            config,
            state: RwLock::new(BreakerState::default()),
        }
    }

    #[must_use]
    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Current state, after applying any due cooldown transition
    #[must_use]
    pub fn state(&self) -> CircuitState {
        self.poll()
    }

    /// Whether a send may proceed
    ///
    /// In the half-open state only one probe is admitted until its outcome
    /// is recorded.
    pub fn allow(&self) -> bool {
        self.poll();

        let mut state = self.state.write();
        match state.state {
            CircuitState::Closed => true,
            CircuitState::Open => false,
            CircuitState::HalfOpen => {
                if state.probe_in_flight {
                    false
                } else {
                    state.probe_in_flight = true;
                    true
                }
            }
        }
    }

    pub fn record_success(&self) {
        let mut state = self.state.write();
        match state.state {
            CircuitState::Closed => {
                state.failure_count = 0;
                state.window_started = None;
            }
            CircuitState::HalfOpen => {
                info!(channel = %self.channel, "Circuit breaker closed - probe succeeded");
                *state = BreakerState::default();
            }
            CircuitState::Open => {}
        }
    }

    pub fn record_failure(&self, reason: &str) {
        let now = Instant::now();
        let mut state = self.state.write();

        match state.state {
            CircuitState::Closed => {
                let window_expired = state
                    .window_started
                    .is_some_and(|start| now.duration_since(start) > self.config.failure_window);
                if window_expired || state.window_started.is_none() {
                    state.failure_count = 0;
                    state.window_started = Some(now);
                }
                state.failure_count += 1;

                debug!(
                    channel = %self.channel,
                    failure_count = state.failure_count,
                    threshold = self.config.failure_threshold,
                    reason = %reason,
                    "Circuit breaker failure recorded"
                );

                if state.failure_count >= self.config.failure_threshold {
                    warn!(
                        channel = %self.channel,
                        failures = state.failure_count,
                        reason = %reason,
                        "Circuit breaker opened"
                    );
                    state.state = CircuitState::Open;
                    state.opened_at = Some(now);
                }
            }
            CircuitState::HalfOpen => {
                warn!(channel = %self.channel, reason = %reason, "Circuit breaker reopened from half-open state");
                state.state = CircuitState::Open;
                state.opened_at = Some(now);
                state.probe_in_flight = false;
            }
            CircuitState::Open => {}
        }
    }

    /// Give back a half-open probe whose send never happened
    pub fn release_probe(&self) {
        let mut state = self.state.write();
        if state.state == CircuitState::HalfOpen {
            state.probe_in_flight = false;
        }
    }

    /// Apply the `Open -> HalfOpen` transition once the cooldown has elapsed
    pub fn poll(&self) -> CircuitState {
        let mut state = self.state.write();
        if state.state == CircuitState::Open
            && state
                .opened_at
                .is_some_and(|opened| opened.elapsed() >= self.config.cooldown)
        {
            info!(channel = %self.channel, "Circuit breaker transitioning to half-open");
            state.state = CircuitState::HalfOpen;
            state.probe_in_flight = false;
        }
        state.state
    }

    #[must_use]
    pub fn failure_count(&self) -> u32 {
        self.state.read().failure_count
    }
}

impl std::fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.read();
        f.debug_struct("CircuitBreaker")
            .field("channel", &self.channel)
            .field("state", &state.state)
            .field("failure_count", &state.failure_count)
            .finish_non_exhaustive()
    }
}
