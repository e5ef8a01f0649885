//! The resilient upstream client: cache -> circuit breaker -> retry.
//!
//! This is the only surface the rest of the system talks to. Route handlers
//! hand it a cache key, a TTL, and the concrete upstream call; they get back
//! a [`ResponseEnvelope`] and never see breaker or cache internals.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::cache::TtlCache;
use crate::circuit_breaker::{CircuitBreaker, CircuitBreakerStatus};
use crate::config::ClientConfig;
use crate::envelope::ResponseEnvelope;
use crate::error::{ResilienceError, UpstreamError};
use crate::retry::{self, RetryError};

/// Fronts one logical upstream dependency with a cache, a circuit breaker,
/// and a bounded retry policy.
///
/// Explicitly constructed and injected by the composition root; there is no
/// hidden global state. Cached values cross the cache as [`serde_json::Value`]
/// so one client serves heterogeneous record shapes.
#[derive(Debug, Clone)]
pub struct UpstreamClient {
    config: ClientConfig,
    breaker: Arc<CircuitBreaker>,
    cache: TtlCache<Value>,
}

fn elapsed_ms(start: Instant) -> u64 {
    start.elapsed().as_millis() as u64
}

impl UpstreamClient {
    pub fn new(config: ClientConfig) -> Self {
        let breaker = Arc::new(CircuitBreaker::new(
            config.upstream_name.clone(),
            config.circuit_breaker,
        ));
        Self {
            config,
            breaker,
            cache: TtlCache::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.config.upstream_name
    }

    /// Fetch through the full resilience stack with the configured default TTL.
    pub async fn fetch<T, F, Fut>(&self, cache_key: &str, upstream_call: F) -> ResponseEnvelope<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, UpstreamError>>,
    {
        self.fetch_with_resilience(cache_key, self.config.default_ttl, upstream_call)
            .await
    }

    /// Fetch through the full resilience stack.
    ///
    /// Cache hit: returns `success(cached = true)` without touching the
    /// upstream. Cache miss: runs the call through the breaker and retry
    /// policy, writes the result back with `ttl` on success, and translates
    /// any failure into the stable envelope taxonomy. Every internal error
    /// kind has a defined mapping; nothing reaches the boundary unshaped.
    pub async fn fetch_with_resilience<T, F, Fut>(
        &self,
        cache_key: &str,
        ttl: Duration,
        mut upstream_call: F,
    ) -> ResponseEnvelope<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, UpstreamError>>,
    {
        let started = Instant::now();

        if let Some(value) = self.cache.get(cache_key) {
            match serde_json::from_value::<T>(value) {
                Ok(data) => {
                    tracing::debug!(upstream = %self.name(), key = cache_key, "cache hit");
                    return ResponseEnvelope::success(data, true, elapsed_ms(started));
                }
                Err(err) => {
                    // Stored under an older shape; treat as a miss.
                    tracing::warn!(
                        upstream = %self.name(),
                        key = cache_key,
                        %err,
                        "evicting cached value that no longer deserializes"
                    );
                    self.cache.remove(cache_key);
                }
            }
        }

        let retry_cfg = self.config.retry;
        let attempts = retry_cfg.attempts.max(1);
        let timeout = self.config.request_timeout;

        // Built outside the breaker closure so the future borrows locals of
        // this fn, not the closure's environment.
        let attempt_sequence = async {
            let outcome = match timeout {
                Some(deadline) => {
                    retry::run_with_timeout(&retry_cfg, deadline, |_| upstream_call()).await
                }
                None => retry::run(&retry_cfg, |_| upstream_call())
                    .await
                    .map_err(RetryError::Inner),
            };

            match outcome {
                Ok(value) => Ok(value),
                Err(RetryError::Timeout(deadline)) => Err(ResilienceError::Timeout(deadline)),
                Err(RetryError::Inner(err)) if attempts == 1 => {
                    Err(ResilienceError::Upstream(err))
                }
                Err(RetryError::Inner(err)) => Err(ResilienceError::RetryExhausted {
                    attempts,
                    source: err,
                }),
            }
        };
        let result = self.breaker.execute(|| attempt_sequence).await;

        match result {
            Ok(data) => {
                match serde_json::to_value(&data) {
                    Ok(value) => self.cache.set(cache_key, value, ttl),
                    Err(err) => {
                        tracing::warn!(key = cache_key, %err, "response not cacheable, skipping")
                    }
                }
                ResponseEnvelope::success(data, false, elapsed_ms(started))
            }
            Err(err) => {
                tracing::warn!(upstream = %self.name(), %err, "resilient fetch failed");
                envelope_for(&err).with_processing_time(elapsed_ms(started))
            }
        }
    }

    /// Start the cache's background expiry sweep. Idempotent.
    pub fn start_cache_sweep(&self) {
        self.cache.start_sweep(self.config.cache_sweep_period);
    }

    /// Stop the sweep task; part of process shutdown.
    pub fn shutdown(&self) {
        self.cache.stop();
    }

    /// Observability snapshot of the breaker; read-only.
    pub fn breaker_status(&self) -> CircuitBreakerStatus {
        self.breaker.status()
    }

    /// Operational override: force the breaker closed.
    pub fn reset_breaker(&self) {
        self.breaker.reset();
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
    }
}

/// Total mapping from the internal taxonomy to boundary envelopes.
fn envelope_for<T>(err: &ResilienceError) -> ResponseEnvelope<T> {
    match err {
        ResilienceError::CircuitOpen(name) => ResponseEnvelope::service_unavailable(format!(
            "upstream '{name}' is temporarily unavailable"
        )),
        ResilienceError::Timeout(deadline) => ResponseEnvelope::service_unavailable(format!(
            "upstream did not respond within {}ms",
            deadline.as_millis()
        )),
        ResilienceError::RetryExhausted { source, .. } => envelope_for_upstream(source),
        ResilienceError::Upstream(source) => envelope_for_upstream(source),
    }
}

fn envelope_for_upstream<T>(err: &UpstreamError) -> ResponseEnvelope<T> {
    match err {
        UpstreamError::NotFound(what) => ResponseEnvelope::not_found(what.clone()),
        UpstreamError::Unreachable(_) => ResponseEnvelope::service_unavailable(err.to_string()),
        UpstreamError::InvalidResponse(_) => ResponseEnvelope::internal_error(err.to_string()),
        UpstreamError::Status { status, message } => match status {
            400 => ResponseEnvelope::bad_request(message.clone()),
            401 => ResponseEnvelope::unauthorized(message.clone()),
            404 => ResponseEnvelope::not_found(message.clone()),
            429 => ResponseEnvelope::service_unavailable(message.clone()),
            s if *s >= 500 => ResponseEnvelope::service_unavailable(message.clone()),
            s => ResponseEnvelope::error(
                message.clone(),
                500,
                "INTERNAL_ERROR",
                Some(serde_json::json!({ "upstreamStatus": s })),
            ),
        },
    }
}
