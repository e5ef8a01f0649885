//! Uniform response envelope and the stable error taxonomy.
//!
//! Every outbound response, success or failure, has one predictable shape.
//! Internal error conditions map to fixed status/code pairs independent of
//! the underlying cause, so the boundary never leaks raw internals.

use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// Version string stamped into every envelope's metadata.
pub const API_VERSION: &str = "1.0";

/// Page descriptor attached to paginated successes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub page: u32,
    pub limit: u32,
    pub total: u64,
    pub total_pages: u32,
}

/// Metadata carried by every envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvelopeMetadata {
    /// Milliseconds since the Unix epoch at envelope creation.
    pub timestamp: u64,
    pub api_version: String,
    pub cached: bool,
    pub processing_time_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub pagination: Option<Pagination>,
}

/// Machine-readable error payload inside a failure envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody {
    /// Stable machine-readable code, distinct from the human message.
    pub code: String,
    pub message: String,
    /// The fixed HTTP status for this error kind.
    pub status: u16,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub details: Option<serde_json::Value>,
}

/// The standardized success/failure wrapper returned at the system boundary.
///
/// Created once per request and never mutated; `with_processing_time`
/// produces a new envelope rather than editing in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ResponseEnvelope<T> {
    Success { data: T, metadata: EnvelopeMetadata },
    Failure { error: ErrorBody, metadata: EnvelopeMetadata },
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

fn metadata(cached: bool, processing_time_ms: u64) -> EnvelopeMetadata {
    EnvelopeMetadata {
        timestamp: now_ms(),
        api_version: API_VERSION.to_string(),
        cached,
        processing_time_ms,
        pagination: None,
    }
}

impl<T> ResponseEnvelope<T> {
    /// Build a success envelope.
    pub fn success(data: T, cached: bool, processing_time_ms: u64) -> Self {
        ResponseEnvelope::Success {
            data,
            metadata: metadata(cached, processing_time_ms),
        }
    }

    /// Build a success envelope carrying page information.
    pub fn paginated(data: T, page: u32, limit: u32, total: u64, cached: bool) -> Self {
        let limit_nz = limit.max(1);
        let total_pages = total.div_ceil(limit_nz as u64) as u32;
        let mut meta = metadata(cached, 0);
        meta.pagination = Some(Pagination {
            page,
            limit,
            total,
            total_pages,
        });
        ResponseEnvelope::Success {
            data,
            metadata: meta,
        }
    }

    /// Build a failure envelope with an explicit status/code pair.
    pub fn error(
        message: impl Into<String>,
        status: u16,
        code: impl Into<String>,
        details: Option<serde_json::Value>,
    ) -> Self {
        ResponseEnvelope::Failure {
            error: ErrorBody {
                code: code.into(),
                message: message.into(),
                status,
                details,
            },
            metadata: metadata(false, 0),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::error(message, 404, "NOT_FOUND", None)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::error(message, 400, "BAD_REQUEST", None)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::error(message, 401, "UNAUTHORIZED", None)
    }

    /// Used when a circuit breaker is open or the upstream is unreachable.
    pub fn service_unavailable(message: impl Into<String>) -> Self {
        Self::error(message, 503, "SERVICE_UNAVAILABLE", None)
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::error(message, 500, "INTERNAL_ERROR", None)
    }

    /// Stamp the measured processing time, returning a new envelope.
    pub fn with_processing_time(mut self, processing_time_ms: u64) -> Self {
        match &mut self {
            ResponseEnvelope::Success { metadata, .. }
            | ResponseEnvelope::Failure { metadata, .. } => {
                metadata.processing_time_ms = processing_time_ms;
            }
        }
        self
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ResponseEnvelope::Success { .. })
    }

    pub fn metadata(&self) -> &EnvelopeMetadata {
        match self {
            ResponseEnvelope::Success { metadata, .. }
            | ResponseEnvelope::Failure { metadata, .. } => metadata,
        }
    }

    /// The error payload, if this is a failure envelope.
    pub fn error_body(&self) -> Option<&ErrorBody> {
        match self {
            ResponseEnvelope::Failure { error, .. } => Some(error),
            ResponseEnvelope::Success { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_envelope_shape() {
        let env = ResponseEnvelope::success(vec![1, 2, 3], false, 12);
        assert!(env.is_success());
        assert!(!env.metadata().cached);
        assert_eq!(env.metadata().processing_time_ms, 12);
        assert_eq!(env.metadata().api_version, API_VERSION);
        assert!(env.metadata().timestamp > 0);
    }

    #[test]
    fn cached_flag_is_preserved() {
        let env = ResponseEnvelope::success("hit", true, 0);
        assert!(env.metadata().cached);
    }

    #[test]
    fn paginated_computes_total_pages() {
        let env = ResponseEnvelope::paginated(vec![1, 2], 1, 10, 25, false);
        let pagination = env.metadata().pagination.clone().unwrap();
        assert_eq!(pagination.total_pages, 3);
        assert_eq!(pagination.total, 25);
        assert_eq!(pagination.limit, 10);
    }

    #[test]
    fn paginated_survives_zero_limit() {
        let env: ResponseEnvelope<Vec<u8>> =
            ResponseEnvelope::paginated(Vec::new(), 1, 0, 5, false);
        let pagination = env.metadata().pagination.clone().unwrap();
        assert_eq!(pagination.total_pages, 5);
    }

    #[test]
    fn convenience_wrappers_fix_status_code_pairs() {
        let cases: Vec<(ResponseEnvelope<()>, u16, &str)> = vec![
            (ResponseEnvelope::not_found("x"), 404, "NOT_FOUND"),
            (ResponseEnvelope::bad_request("x"), 400, "BAD_REQUEST"),
            (ResponseEnvelope::unauthorized("x"), 401, "UNAUTHORIZED"),
            (
                ResponseEnvelope::service_unavailable("x"),
                503,
                "SERVICE_UNAVAILABLE",
            ),
            (ResponseEnvelope::internal_error("x"), 500, "INTERNAL_ERROR"),
        ];

        for (env, status, code) in cases {
            let body = env.error_body().unwrap();
            assert_eq!(body.status, status);
            assert_eq!(body.code, code);
            assert_eq!(body.message, "x");
        }
    }

    #[test]
    fn error_details_are_optional() {
        let env: ResponseEnvelope<()> = ResponseEnvelope::error(
            "validation failed",
            400,
            "BAD_REQUEST",
            Some(serde_json::json!({ "field": "customerId" })),
        );
        let body = env.error_body().unwrap();
        assert_eq!(body.details.as_ref().unwrap()["field"], "customerId");
    }

    #[test]
    fn with_processing_time_returns_updated_copy() {
        let env: ResponseEnvelope<()> = ResponseEnvelope::service_unavailable("down");
        let stamped = env.with_processing_time(77);
        assert_eq!(stamped.metadata().processing_time_ms, 77);
    }

    #[test]
    fn serializes_with_boundary_field_names() {
        let env = ResponseEnvelope::success(serde_json::json!({"id": 1}), true, 5);
        let json = serde_json::to_value(&env).unwrap();

        assert_eq!(json["status"], "success");
        assert_eq!(json["metadata"]["cached"], true);
        assert_eq!(json["metadata"]["apiVersion"], API_VERSION);
        assert_eq!(json["metadata"]["processingTimeMs"], 5);
        assert!(json["metadata"]["timestamp"].is_u64());
        assert!(json["metadata"].get("pagination").is_none());
    }

    #[test]
    fn failure_serializes_error_block() {
        let env: ResponseEnvelope<()> = ResponseEnvelope::not_found("order 42 not found");
        let json = serde_json::to_value(&env).unwrap();

        assert_eq!(json["status"], "failure");
        assert_eq!(json["error"]["code"], "NOT_FOUND");
        assert_eq!(json["error"]["status"], 404);
        assert_eq!(json["error"]["message"], "order 42 not found");
    }

    #[test]
    fn envelope_roundtrips_through_json() -> anyhow::Result<()> {
        let env = ResponseEnvelope::success(vec!["a".to_string()], false, 3);
        let json = serde_json::to_string(&env)?;
        let back: ResponseEnvelope<Vec<String>> = serde_json::from_str(&json)?;
        assert_eq!(env, back);
        Ok(())
    }

    #[test]
    fn builders_are_pure() {
        let a: ResponseEnvelope<()> = ResponseEnvelope::not_found("gone");
        let b: ResponseEnvelope<()> = ResponseEnvelope::not_found("gone");
        assert_eq!(a.error_body(), b.error_body());
    }
}
