//! Metrics definitions for the room service.
//!
//! All metrics follow Prometheus naming conventions:
//! - `room_` prefix
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Cardinality
//!
//! Labels are bounded:
//! - `method`: HTTP verbs
//! - `endpoint`: parameterized paths (see [`normalize_endpoint`])
//! - `status`: success, error, timeout
//! - `operation`: coordinator operations and repository queries, fixed in code
//! - `error_type`: bounded by `RoomError` variants

use metrics::{counter, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::time::Duration;

/// Install the Prometheus recorder and return the handle used by `/metrics`.
///
/// Must be called before any metrics are recorded.
///
/// # Errors
///
/// Returns error if the recorder fails to install (e.g., already installed).
pub fn init_metrics_recorder() -> Result<PrometheusHandle, String> {
    PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Prefix("room_http_request".to_string()),
            &[
                0.005, 0.010, 0.025, 0.050, 0.100, 0.150, 0.200, 0.300, 0.500, 1.000, 2.000,
            ],
        )
        .map_err(|e| format!("Failed to set HTTP request buckets: {e}"))?
        .set_buckets_for_metric(
            Matcher::Prefix("room_operation".to_string()),
            &[
                0.002, 0.005, 0.010, 0.020, 0.050, 0.100, 0.250, 0.500, 1.000, 5.000,
            ],
        )
        .map_err(|e| format!("Failed to set room operation buckets: {e}"))?
        .set_buckets_for_metric(
            Matcher::Prefix("room_db_query".to_string()),
            &[
                0.001, 0.002, 0.005, 0.010, 0.020, 0.050, 0.100, 0.250, 0.500, 1.000,
            ],
        )
        .map_err(|e| format!("Failed to set DB query buckets: {e}"))?
        .install_recorder()
        .map_err(|e| format!("Failed to install Prometheus recorder: {e}"))
}

// ============================================================================
// HTTP Request Metrics
// ============================================================================

/// Record HTTP request completion.
///
/// Metric: `room_http_requests_total`, `room_http_request_duration_seconds`
/// Labels: `method`, `endpoint`, `status`
///
/// Includes framework-level rejections (bad JSON, 405, unknown routes).
pub fn record_http_request(method: &str, endpoint: &str, status_code: u16, duration: Duration) {
    let normalized_endpoint = normalize_endpoint(endpoint);
    let status = categorize_status_code(status_code);

    histogram!("room_http_request_duration_seconds",
        "method" => method.to_string(),
        "endpoint" => normalized_endpoint.clone(),
        "status" => status.to_string()
    )
    .record(duration.as_secs_f64());

    counter!("room_http_requests_total",
        "method" => method.to_string(),
        "endpoint" => normalized_endpoint,
        "status_code" => status_code.to_string()
    )
    .increment(1);
}

fn categorize_status_code(status_code: u16) -> &'static str {
    match status_code {
        200..=299 => "success",
        408 | 504 => "timeout",
        _ => "error",
    }
}

/// Normalize endpoint path so room codes and participant ids never become labels.
fn normalize_endpoint(path: &str) -> String {
    match path {
        "/" | "/health" | "/ready" | "/metrics" | "/api/v1/rooms" | "/api/v1/history" => {
            path.to_string()
        }
        _ => normalize_room_endpoint(path),
    }
}

fn normalize_room_endpoint(path: &str) -> String {
    let Some(rest) = path.strip_prefix("/api/v1/rooms/") else {
        return "/other".to_string();
    };

    let parts: Vec<&str> = rest.split('/').collect();
    match parts.as_slice() {
        [code] if !code.is_empty() => "/api/v1/rooms/{code}".to_string(),
        [_, action @ ("join" | "leave" | "end" | "settings")] => {
            format!("/api/v1/rooms/{{code}}/{action}")
        }
        [_, "participants", _, "role"] => {
            "/api/v1/rooms/{code}/participants/{id}/role".to_string()
        }
        _ => "/other".to_string(),
    }
}

// ============================================================================
// Coordinator Metrics
// ============================================================================

/// Record a coordinator operation outcome.
///
/// Metric: `room_operations_total`, `room_operation_duration_seconds`
/// Labels: `operation`, `status`, `error_type`
pub fn record_room_operation(
    operation: &str,
    status: &str,
    error_type: Option<&str>,
    duration: Duration,
) {
    histogram!("room_operation_duration_seconds",
        "operation" => operation.to_string()
    )
    .record(duration.as_secs_f64());

    counter!("room_operations_total",
        "operation" => operation.to_string(),
        "status" => status.to_string(),
        "error_type" => error_type.unwrap_or("none").to_string()
    )
    .increment(1);
}

/// Record one optimistic-concurrency retry.
///
/// Metric: `room_conflict_retries_total`
/// Labels: `operation`
pub fn record_conflict_retry(operation: &str) {
    counter!("room_conflict_retries_total",
        "operation" => operation.to_string()
    )
    .increment(1);
}

// ============================================================================
// Database Metrics
// ============================================================================

/// Record database query execution.
///
/// Metric: `room_db_query_duration_seconds`, `room_db_queries_total`
/// Labels: `operation`, `status`
pub fn record_db_query(operation: &str, status: &str, duration: Duration) {
    histogram!("room_db_query_duration_seconds",
        "operation" => operation.to_string()
    )
    .record(duration.as_secs_f64());

    counter!("room_db_queries_total",
        "operation" => operation.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    // Recording without an installed recorder goes to the global no-op
    // recorder; these only exercise the code paths.

    #[test]
    fn test_record_http_request() {
        record_http_request("GET", "/health", 200, Duration::from_millis(5));
        record_http_request("POST", "/api/v1/rooms", 201, Duration::from_millis(40));
        record_http_request(
            "POST",
            "/api/v1/rooms/Ab3dE6gH9jKm/join",
            404,
            Duration::from_millis(8),
        );
        record_http_request("GET", "/api/v1/history", 504, Duration::from_secs(30));
    }

    #[test]
    fn test_categorize_status_code() {
        assert_eq!(categorize_status_code(200), "success");
        assert_eq!(categorize_status_code(204), "success");
        assert_eq!(categorize_status_code(408), "timeout");
        assert_eq!(categorize_status_code(504), "timeout");
        assert_eq!(categorize_status_code(403), "error");
        assert_eq!(categorize_status_code(409), "error");
        assert_eq!(categorize_status_code(503), "error");
    }

    #[test]
    fn test_normalize_endpoint_static_paths() {
        assert_eq!(normalize_endpoint("/health"), "/health");
        assert_eq!(normalize_endpoint("/ready"), "/ready");
        assert_eq!(normalize_endpoint("/metrics"), "/metrics");
        assert_eq!(normalize_endpoint("/api/v1/rooms"), "/api/v1/rooms");
        assert_eq!(normalize_endpoint("/api/v1/history"), "/api/v1/history");
    }

    #[test]
    fn test_normalize_endpoint_room_paths() {
        assert_eq!(
            normalize_endpoint("/api/v1/rooms/Ab3dE6gH9jKm"),
            "/api/v1/rooms/{code}"
        );
        for action in ["join", "leave", "end", "settings"] {
            assert_eq!(
                normalize_endpoint(&format!("/api/v1/rooms/Ab3dE6gH9jKm/{action}")),
                format!("/api/v1/rooms/{{code}}/{action}")
            );
        }
        assert_eq!(
            normalize_endpoint(
                "/api/v1/rooms/Ab3dE6gH9jKm/participants/550e8400-e29b-41d4-a716-446655440000/role"
            ),
            "/api/v1/rooms/{code}/participants/{id}/role"
        );
    }

    #[test]
    fn test_normalize_endpoint_unknown_paths() {
        assert_eq!(normalize_endpoint("/unknown"), "/other");
        assert_eq!(normalize_endpoint("/api/v1/rooms/"), "/other");
        assert_eq!(normalize_endpoint("/api/v1/rooms/code/kick"), "/other");
        assert_eq!(
            normalize_endpoint("/api/v1/rooms/code/participants/x"),
            "/other"
        );
    }

    #[test]
    fn test_record_room_operation() {
        record_room_operation("join_room", "success", None, Duration::from_millis(4));
        record_room_operation(
            "end_room",
            "error",
            Some("forbidden"),
            Duration::from_millis(2),
        );
        record_conflict_retry("join_room");
    }

    #[test]
    fn test_record_db_query() {
        record_db_query("commit", "success", Duration::from_millis(3));
        record_db_query("find_room_by_code", "error", Duration::from_millis(50));
    }
}
