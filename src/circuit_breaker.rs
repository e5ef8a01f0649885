//! Circuit breaker for an unreliable upstream dependency.
//!
//! Bounds the blast radius of a failing upstream by failing fast once a
//! failure threshold is crossed, then periodically admits a single probe
//! call to detect recovery.

use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::error::ResilienceError;

/// States of the circuit breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Normal operation - requests pass through.
    Closed,
    /// Failing fast - requests rejected without touching the upstream.
    Open,
    /// One probe in flight to check whether the upstream recovered.
    HalfOpen,
}

/// Configuration for circuit breaker behavior, fixed at construction.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures before the circuit trips open.
    pub failure_threshold: u32,
    /// Minimum elapsed time before probing half-open, in milliseconds.
    #[serde(with = "crate::serde_millis")]
    pub reset_timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            reset_timeout: Duration::from_secs(30),
        }
    }
}

impl CircuitBreakerConfig {
    pub fn with_failure_threshold(mut self, threshold: u32) -> Self {
        self.failure_threshold = threshold;
        self
    }

    pub fn with_reset_timeout(mut self, timeout: Duration) -> Self {
        self.reset_timeout = timeout;
        self
    }
}

/// Immutable snapshot of a breaker for observability.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CircuitBreakerStatus {
    pub name: String,
    pub state: CircuitState,
    pub failure_count: u32,
    /// Time spent in the current state, in milliseconds.
    #[serde(with = "crate::serde_millis")]
    pub time_in_state: Duration,
    /// Elapsed time since the last recorded failure, if any.
    #[serde(with = "crate::serde_millis::opt")]
    pub since_last_failure: Option<Duration>,
}

/// All mutable breaker state lives behind one lock so a phase decision and
/// the counter update it depends on happen as a single critical section.
#[derive(Debug)]
struct Inner {
    state: CircuitState,
    failure_count: u32,
    last_failure: Option<Instant>,
    last_state_change: Instant,
    /// True from probe admission until `record_success`/`record_failure`
    /// settles it. A probe that never settles was dropped by its caller.
    probe_in_flight: bool,
}

/// Circuit breaker for a single named upstream dependency.
#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            name: name.into(),
            config,
            inner: Mutex::new(Inner {
                state: CircuitState::Closed,
                failure_count: 0,
                last_failure: None,
                last_state_change: Instant::now(),
                probe_in_flight: false,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Check whether a request is admitted, transitioning Open -> HalfOpen
    /// once the reset timeout has elapsed.
    ///
    /// While HalfOpen, exactly one probe is in flight: the caller that
    /// triggered the transition was admitted and everyone else is rejected
    /// until `record_success` or `record_failure` settles the probe. A
    /// probe still unsettled after a full reset window is treated as a
    /// failure and the circuit reopens.
    pub fn allow_request(&self) -> bool {
        let mut inner = self.inner.lock().unwrap();

        match inner.state {
            CircuitState::Closed => true,
            CircuitState::Open => {
                let gate = inner.last_failure.unwrap_or(inner.last_state_change);
                if gate.elapsed() >= self.config.reset_timeout {
                    inner.state = CircuitState::HalfOpen;
                    inner.last_state_change = Instant::now();
                    inner.probe_in_flight = true;
                    tracing::debug!(breaker = %self.name, "admitting half-open probe");
                    true
                } else {
                    false
                }
            }
            CircuitState::HalfOpen => {
                if !inner.probe_in_flight {
                    inner.probe_in_flight = true;
                    inner.last_state_change = Instant::now();
                    return true;
                }
                // A probe that outlives the reset window never settled
                // (its caller dropped it). Count that as a failure and
                // reopen rather than stacking a second probe on top.
                if inner.last_state_change.elapsed() >= self.config.reset_timeout {
                    inner.state = CircuitState::Open;
                    inner.last_failure = Some(Instant::now());
                    inner.last_state_change = Instant::now();
                    inner.probe_in_flight = false;
                    tracing::warn!(breaker = %self.name, "probe never settled, circuit reopened");
                }
                false
            }
        }
    }

    /// Record a successful request.
    pub fn record_success(&self) {
        let mut inner = self.inner.lock().unwrap();

        match inner.state {
            CircuitState::HalfOpen => {
                inner.state = CircuitState::Closed;
                inner.failure_count = 0;
                inner.last_state_change = Instant::now();
                inner.probe_in_flight = false;
                tracing::info!(breaker = %self.name, "probe succeeded, circuit closed");
            }
            CircuitState::Closed => {
                inner.failure_count = 0;
            }
            CircuitState::Open => {}
        }
    }

    /// Record a failed request.
    pub fn record_failure(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.last_failure = Some(Instant::now());

        match inner.state {
            CircuitState::Closed => {
                inner.failure_count += 1;
                if inner.failure_count >= self.config.failure_threshold {
                    inner.state = CircuitState::Open;
                    inner.last_state_change = Instant::now();
                    tracing::warn!(
                        breaker = %self.name,
                        failures = inner.failure_count,
                        "failure threshold reached, circuit open"
                    );
                }
            }
            CircuitState::HalfOpen => {
                inner.failure_count += 1;
                inner.state = CircuitState::Open;
                inner.last_state_change = Instant::now();
                inner.probe_in_flight = false;
                tracing::warn!(breaker = %self.name, "probe failed, circuit reopened");
            }
            CircuitState::Open => {}
        }
    }

    /// Run `operation` through the breaker.
    ///
    /// When the breaker is open the operation is never invoked and the call
    /// fails with [`ResilienceError::CircuitOpen`]. Otherwise the outcome of
    /// the operation is recorded and returned unchanged - a real failure is
    /// never converted into a success.
    pub async fn execute<T, F, Fut>(&self, operation: F) -> Result<T, ResilienceError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, ResilienceError>>,
    {
        if !self.allow_request() {
            return Err(ResilienceError::CircuitOpen(self.name.clone()));
        }

        match operation().await {
            Ok(value) => {
                self.record_success();
                Ok(value)
            }
            Err(err) => {
                self.record_failure();
                Err(err)
            }
        }
    }

    /// Like [`execute`](Self::execute), but an open breaker yields the
    /// fallback value instead of an error. The operation is still never
    /// invoked while open.
    pub async fn execute_with_fallback<T, F, Fut>(
        &self,
        operation: F,
        fallback: T,
    ) -> Result<T, ResilienceError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, ResilienceError>>,
    {
        if !self.allow_request() {
            tracing::debug!(breaker = %self.name, "circuit open, serving fallback");
            return Ok(fallback);
        }

        match operation().await {
            Ok(value) => {
                self.record_success();
                Ok(value)
            }
            Err(err) => {
                self.record_failure();
                Err(err)
            }
        }
    }

    /// Current state (for monitoring).
    pub fn current_state(&self) -> CircuitState {
        self.inner.lock().unwrap().state
    }

    /// Current consecutive-failure count.
    pub fn failure_count(&self) -> u32 {
        self.inner.lock().unwrap().failure_count
    }

    /// Immutable snapshot of the breaker for observability.
    pub fn status(&self) -> CircuitBreakerStatus {
        let inner = self.inner.lock().unwrap();
        CircuitBreakerStatus {
            name: self.name.clone(),
            state: inner.state,
            failure_count: inner.failure_count,
            time_in_state: inner.last_state_change.elapsed(),
            since_last_failure: inner.last_failure.map(|t| t.elapsed()),
        }
    }

    /// Operational override: force the circuit closed and zero the counters.
    pub fn reset(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.state = CircuitState::Closed;
        inner.failure_count = 0;
        inner.last_failure = None;
        inner.last_state_change = Instant::now();
        inner.probe_in_flight = false;
        tracing::info!(breaker = %self.name, "manual reset, circuit closed");
    }
}

/// Registry of named breakers, one per upstream dependency.
#[derive(Debug)]
pub struct CircuitBreakerManager {
    breakers: dashmap::DashMap<String, Arc<CircuitBreaker>>,
    default_config: CircuitBreakerConfig,
}

impl CircuitBreakerManager {
    pub fn new(default_config: CircuitBreakerConfig) -> Self {
        Self {
            breakers: dashmap::DashMap::new(),
            default_config,
        }
    }

    /// Get or create the breaker for an upstream dependency.
    pub fn get_or_create(&self, upstream: &str) -> Arc<CircuitBreaker> {
        self.breakers
            .entry(upstream.to_string())
            .or_insert_with(|| Arc::new(CircuitBreaker::new(upstream, self.default_config)))
            .clone()
    }

    /// Snapshot of a single upstream's breaker, if it exists.
    pub fn status_of(&self, upstream: &str) -> Option<CircuitBreakerStatus> {
        self.breakers.get(upstream).map(|b| b.status())
    }

    /// Snapshots for every registered breaker.
    pub fn all_statuses(&self) -> Vec<CircuitBreakerStatus> {
        self.breakers.iter().map(|entry| entry.value().status()).collect()
    }

    /// True unless the upstream's circuit is open.
    pub fn is_healthy(&self, upstream: &str) -> bool {
        self.breakers
            .get(upstream)
            .map(|b| b.current_state() != CircuitState::Open)
            .unwrap_or(true)
    }

    /// Force every breaker closed.
    pub fn reset_all(&self) {
        for entry in self.breakers.iter() {
            entry.value().reset();
        }
    }
}

impl Default for CircuitBreakerManager {
    fn default() -> Self {
        Self::new(CircuitBreakerConfig::default())
    }
}
