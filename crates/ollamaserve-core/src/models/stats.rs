//! Metrics and request-log views
//!
//! These are transient query results over externally persisted data:
//! produced fresh per query, never cached, never partially updated.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Outcome of a logged inference request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    /// Request completed
    Success,
    /// Request failed
    Error,
}

impl RequestStatus {
    /// Parse a stored status value.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "success" => Some(Self::Success),
            "error" => Some(Self::Error),
            _ => None,
        }
    }

    /// Stored string form.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Error => "error",
        }
    }
}

/// Point-in-time aggregate over everything the metrics store holds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatsSnapshot {
    /// Total tokens generated all-time
    pub tokens_total: i64,

    /// Average tokens per second over the last hour
    pub tokens_per_sec: f64,

    /// Service uptime in hours
    pub uptime_hours: f64,

    /// Total error count
    pub error_count: i64,

    /// Total request count
    pub request_count: i64,

    /// Average latency in milliseconds
    pub avg_latency_ms: f64,

    /// Number of distinct models seen in the request log
    pub models_available: i64,

    /// When this snapshot was computed
    pub timestamp: DateTime<Utc>,
}

impl StatsSnapshot {
    /// The documented all-zero snapshot used when no backend is reachable.
    pub fn empty(uptime_hours: f64) -> Self {
        Self {
            tokens_total: 0,
            tokens_per_sec: 0.0,
            uptime_hours,
            error_count: 0,
            request_count: 0,
            avg_latency_ms: 0.0,
            models_available: 0,
            timestamp: Utc::now(),
        }
    }
}

/// One time bucket of aggregated history
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryPoint {
    /// Start of the time bucket
    pub timestamp: DateTime<Utc>,

    /// Tokens generated within the bucket
    pub tokens_total: i64,

    /// Average latency in milliseconds within the bucket
    pub latency_ms: f64,

    /// Requests per minute within the bucket
    pub throughput: f64,

    /// Errors within the bucket
    pub error_count: i64,
}

/// A single logged inference request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    /// Unique request identifier
    pub request_id: String,

    /// When the request was served
    pub timestamp: DateTime<Utc>,

    /// Model that served the request
    pub model: String,

    /// Tokens generated
    pub tokens: i64,

    /// Latency in milliseconds
    pub latency_ms: i64,

    /// Request outcome
    pub status: RequestStatus,

    /// Error message, present only for failed requests
    pub error_message: Option<String>,
}

/// One page of request logs plus the total under the same filters
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LogPage {
    /// Total matching entries, ignoring pagination
    pub total: i64,

    /// The requested page, newest first
    pub entries: Vec<LogEntry>,
}

impl LogPage {
    /// The empty page used when no backend is reachable.
    pub fn empty() -> Self {
        Self::default()
    }
}

/// Aggregated usage for one model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelUsage {
    /// Model name
    pub model_name: String,

    /// Total requests served by this model
    pub requests_count: i64,

    /// Total tokens generated by this model
    pub tokens_generated: i64,

    /// Average latency in milliseconds
    pub avg_latency_ms: f64,

    /// Failed requests for this model
    pub error_count: i64,

    /// Most recent request timestamp
    pub last_used: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_snapshot_is_all_zero() {
        let snapshot = StatsSnapshot::empty(1.5);
        assert_eq!(snapshot.tokens_total, 0);
        assert_eq!(snapshot.request_count, 0);
        assert_eq!(snapshot.error_count, 0);
        assert_eq!(snapshot.models_available, 0);
        assert!((snapshot.uptime_hours - 1.5).abs() < f64::EPSILON);
    }

    #[test]
    fn request_status_round_trips() {
        assert_eq!(RequestStatus::parse("success"), Some(RequestStatus::Success));
        assert_eq!(RequestStatus::parse("error"), Some(RequestStatus::Error));
        assert_eq!(RequestStatus::parse("pending"), None);
        assert_eq!(RequestStatus::Success.as_str(), "success");
    }
}
