use metrics::{counter, histogram};
use std::time::Duration;

use crate::schema::OperationType;

/// Bucket HTTP status codes to control cardinality
pub fn bucket_status_code(status: u16) -> &'static str {
    match status {
        200..=299 => "2xx",
        300..=399 => "3xx",
        400..=499 => "4xx",
        500..=599 => "5xx",
        _ => "other",
    }
}

/// `path` must be a route template, never a raw URI
pub fn record_http_request(method: &str, path: &str, status_code: u16, duration: Duration) {
    let status_bucket = bucket_status_code(status_code);

    counter!(
        "http_request_total",
        "method" => method.to_string(),
        "path" => path.to_string(),
        "status" => status_bucket
    )
    .increment(1);

    histogram!(
        "http_request_duration_seconds",
        "method" => method.to_string(),
        "path" => path.to_string(),
        "status" => status_bucket
    )
    .record(duration.as_secs_f64());
}

pub fn record_cache_lookup(operation: OperationType, hit: bool) {
    counter!(
        "calc_cache_lookups_total",
        "operation" => operation.as_str(),
        "outcome" => if hit { "hit" } else { "miss" }
    )
    .increment(1);
}

/// One fresh computation, `failed` when it produced a domain failure
pub fn record_computation(operation: OperationType, failed: bool, duration: Duration) {
    let status = if failed { "failure" } else { "success" };
    counter!("calc_computations_total", "operation" => operation.as_str(), "status" => status)
        .increment(1);
    histogram!("calc_computation_duration_seconds", "operation" => operation.as_str())
        .record(duration.as_secs_f64());
}

/// One audited attempt, labelled with its audit status
pub fn record_attempt(operation: OperationType, status: &'static str) {
    counter!("calc_requests_total", "operation" => operation.as_str(), "status" => status)
        .increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bucket_status_code() {
        assert_eq!(bucket_status_code(200), "2xx");
        assert_eq!(bucket_status_code(302), "3xx");
        assert_eq!(bucket_status_code(403), "4xx");
        assert_eq!(bucket_status_code(503), "5xx");
        assert_eq!(bucket_status_code(99), "other");
    }

    #[test]
    fn test_recording_without_recorder_is_a_noop() {
        record_http_request("GET", "/api/health", 200, Duration::from_millis(3));
        record_cache_lookup(OperationType::Fibonacci, true);
        record_computation(OperationType::Factorial, false, Duration::from_micros(10));
        record_attempt(OperationType::Calculator, "success");
    }
}
