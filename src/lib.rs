//! Resilient Upstream Core
//!
//! This crate keeps a modern API responsive while the legacy system behind it
//! is slow, flaky, or rate-limited. Every outbound call goes through one
//! stack: check the cache, ask the circuit breaker, retry with backoff, and
//! shape whatever happens into a uniform response envelope.
//!
//! The pieces, leaves first:
//!
//! - **TTL cache** - skip the upstream entirely for recently-fetched data.
//! - **Retry policy** - absorb transient failures with bounded attempts.
//! - **Circuit breaker** - fail fast once the upstream is known to be sick,
//!   probe periodically for recovery.
//! - **Response envelope** - one predictable shape for success and failure.
//!
//! [`UpstreamClient`] composes them and is the only thing route handlers
//! should talk to. Construct it yourself and inject it; nothing in here is a
//! global.
//!
//! ## Quick example
//!
//! ```no_run
//! use resilience::{ClientConfig, UpstreamClient};
//! use resilience::error::UpstreamError;
//! use std::time::Duration;
//!
//! #[derive(serde::Serialize, serde::Deserialize)]
//! struct Customer { id: u32, name: String }
//!
//! #[tokio::main]
//! async fn main() {
//!     let client = UpstreamClient::new(
//!         ClientConfig::default().with_upstream_name("legacy-erp"),
//!     );
//!     client.start_cache_sweep();
//!
//!     let envelope = client
//!         .fetch_with_resilience("customers/42", Duration::from_secs(60), || async {
//!             // the actual HTTP call to the legacy system goes here
//!             Err::<Customer, _>(UpstreamError::Unreachable("demo".into()))
//!         })
//!         .await;
//!
//!     println!("{}", serde_json::to_string(&envelope).unwrap());
//!     client.shutdown();
//! }
//! ```
//!
//! ## Threading notes
//!
//! The breaker's phase transitions run under a single lock, so two tasks can
//! never both decide to probe a half-open circuit. The cache tolerates the
//! classic check-then-act race: two concurrent misses may both call the
//! upstream once, which is duplicated work, not incorrect behavior.

pub mod cache;
pub mod circuit_breaker;
pub mod client;
pub mod config;
pub mod envelope;
pub mod error;
pub mod retry;
mod serde_millis;

pub use crate::cache::TtlCache;
pub use crate::circuit_breaker::{
    CircuitBreaker, CircuitBreakerConfig, CircuitBreakerManager, CircuitBreakerStatus,
    CircuitState,
};
pub use crate::client::UpstreamClient;
pub use crate::config::ClientConfig;
pub use crate::envelope::{EnvelopeMetadata, ErrorBody, Pagination, ResponseEnvelope, API_VERSION};
pub use crate::error::{ResilienceError, UpstreamError};
pub use crate::retry::{BackoffKind, RetryConfig, RetryError};
