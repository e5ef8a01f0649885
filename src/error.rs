use std::time::Duration;
use thiserror::Error;

/// What a concrete upstream call can report back.
///
/// The core never performs I/O itself; the route-handler side supplies the
/// actual HTTP call and surfaces its outcome through this type.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UpstreamError {
    /// The upstream answered with a non-success HTTP status.
    #[error("upstream returned HTTP {status}: {message}")]
    Status { status: u16, message: String },
    /// The upstream could not be reached at all (DNS, connect, reset).
    #[error("upstream unreachable: {0}")]
    Unreachable(String),
    /// The upstream answered but the body could not be interpreted.
    #[error("invalid upstream response: {0}")]
    InvalidResponse(String),
    /// The requested record does not exist upstream.
    #[error("not found: {0}")]
    NotFound(String),
}

/// Failures produced by the resilience core itself.
///
/// Retries never wrap errors mid-flight; `RetryExhausted` is only built at
/// the client boundary, keeping the root cause reachable via `source()`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResilienceError {
    /// The circuit breaker rejected the call without invoking the upstream.
    #[error("circuit breaker '{0}' is open")]
    CircuitOpen(String),
    /// A timeout-raced call lost the race.
    #[error("operation timed out after {}ms", .0.as_millis())]
    Timeout(Duration),
    /// Every allowed attempt failed; carries the last underlying error.
    #[error("all {attempts} attempts failed")]
    RetryExhausted {
        attempts: u32,
        #[source]
        source: UpstreamError,
    },
    /// A single-attempt upstream failure, unwrapped.
    #[error(transparent)]
    Upstream(#[from] UpstreamError),
}
