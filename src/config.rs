use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::circuit_breaker::CircuitBreakerConfig;
use crate::retry::RetryConfig;

/// Runtime configuration for one resilient upstream client.
///
/// Every duration is carried as integer milliseconds on the wire.
///
/// # Example
/// ```
/// use resilience::{ClientConfig, RetryConfig};
/// use std::time::Duration;
///
/// let cfg = ClientConfig::default()
///     .with_upstream_name("legacy-erp")
///     .with_retry(RetryConfig::default().with_attempts(4))
///     .with_default_ttl(Duration::from_secs(120));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Name of the logical upstream dependency this client fronts. Used for
    /// the breaker name and in logs.
    pub upstream_name: String,
    /// Circuit breaker tuning for this upstream.
    pub circuit_breaker: CircuitBreakerConfig,
    /// Retry policy applied to every outbound call.
    pub retry: RetryConfig,
    /// TTL used when the call site does not pass one explicitly.
    #[serde(with = "crate::serde_millis")]
    pub default_ttl: Duration,
    /// Period of the cache's background expiry sweep.
    #[serde(with = "crate::serde_millis")]
    pub cache_sweep_period: Duration,
    /// Overall deadline raced against the whole retry sequence. `None`
    /// disables the race.
    #[serde(
        with = "crate::serde_millis::opt",
        skip_serializing_if = "Option::is_none",
        default
    )]
    pub request_timeout: Option<Duration>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            upstream_name: "legacy".into(),
            circuit_breaker: CircuitBreakerConfig::default(),
            retry: RetryConfig::default(),
            default_ttl: Duration::from_secs(30),
            cache_sweep_period: Duration::from_secs(60),
            request_timeout: None,
        }
    }
}

impl ClientConfig {
    pub fn with_upstream_name(mut self, name: impl Into<String>) -> Self {
        self.upstream_name = name.into();
        self
    }

    pub fn with_circuit_breaker(mut self, config: CircuitBreakerConfig) -> Self {
        self.circuit_breaker = config;
        self
    }

    pub fn with_retry(mut self, config: RetryConfig) -> Self {
        self.retry = config;
        self
    }

    pub fn with_default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = ttl;
        self
    }

    pub fn with_cache_sweep_period(mut self, period: Duration) -> Self {
        self.cache_sweep_period = period;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retry::BackoffKind;

    #[test]
    fn default_values() {
        let cfg = ClientConfig::default();
        assert_eq!(cfg.upstream_name, "legacy");
        assert_eq!(cfg.default_ttl, Duration::from_secs(30));
        assert_eq!(cfg.cache_sweep_period, Duration::from_secs(60));
        assert!(cfg.request_timeout.is_none());
        assert_eq!(cfg.retry.attempts, 3);
        assert_eq!(cfg.circuit_breaker.failure_threshold, 5);
    }

    #[test]
    fn builder_methods() {
        let cfg = ClientConfig::default()
            .with_upstream_name("legacy-crm")
            .with_circuit_breaker(
                CircuitBreakerConfig::default()
                    .with_failure_threshold(3)
                    .with_reset_timeout(Duration::from_secs(10)),
            )
            .with_retry(
                RetryConfig::default()
                    .with_attempts(5)
                    .with_backoff(BackoffKind::Linear),
            )
            .with_default_ttl(Duration::from_secs(120))
            .with_cache_sweep_period(Duration::from_secs(15))
            .with_request_timeout(Duration::from_secs(2));

        assert_eq!(cfg.upstream_name, "legacy-crm");
        assert_eq!(cfg.circuit_breaker.failure_threshold, 3);
        assert_eq!(cfg.retry.attempts, 5);
        assert_eq!(cfg.retry.backoff, BackoffKind::Linear);
        assert_eq!(cfg.default_ttl, Duration::from_secs(120));
        assert_eq!(cfg.request_timeout, Some(Duration::from_secs(2)));
    }

    #[test]
    fn serde_roundtrip() -> anyhow::Result<()> {
        let cfg = ClientConfig::default()
            .with_upstream_name("legacy-erp")
            .with_request_timeout(Duration::from_millis(2500));

        let serialized = serde_json::to_string(&cfg)?;
        let deserialized: ClientConfig = serde_json::from_str(&serialized)?;
        assert_eq!(cfg, deserialized);
        Ok(())
    }

    #[test]
    fn durations_serialize_as_millis() {
        let cfg = ClientConfig::default().with_default_ttl(Duration::from_millis(1500));
        let json = serde_json::to_value(&cfg).unwrap();
        assert_eq!(json["default_ttl"], 1500);
        assert_eq!(json["cache_sweep_period"], 60_000);
        assert!(json.get("request_timeout").is_none());
    }

    #[test]
    fn missing_timeout_deserializes_as_none() {
        let json = serde_json::json!({
            "upstream_name": "legacy",
            "circuit_breaker": { "failure_threshold": 5, "reset_timeout": 30000 },
            "retry": {
                "attempts": 3,
                "delay": 100,
                "backoff": "exponential",
                "max_delay": 30000,
                "jitter": false
            },
            "default_ttl": 30000,
            "cache_sweep_period": 60000
        });
        let cfg: ClientConfig = serde_json::from_value(json).unwrap();
        assert!(cfg.request_timeout.is_none());
    }
}
