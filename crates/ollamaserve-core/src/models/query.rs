//! Query parameters for metrics lookups

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use super::RequestStatus;

/// Time window covered by a history query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TimeRange {
    /// Last hour
    #[default]
    #[serde(rename = "1h")]
    OneHour,
    /// Last six hours
    #[serde(rename = "6h")]
    SixHours,
    /// Last 24 hours
    #[serde(rename = "24h")]
    Day,
}

impl TimeRange {
    /// Parse a range token; unrecognized values default to one hour.
    pub fn parse(s: &str) -> Self {
        match s {
            "6h" => Self::SixHours,
            "24h" => Self::Day,
            _ => Self::OneHour,
        }
    }

    /// The window length in hours.
    pub fn hours(self) -> i64 {
        match self {
            Self::OneHour => 1,
            Self::SixHours => 6,
            Self::Day => 24,
        }
    }

    /// The wire token for this range.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::OneHour => "1h",
            Self::SixHours => "6h",
            Self::Day => "24h",
        }
    }
}

/// Bucket width of a history query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Granularity {
    /// One-minute buckets
    #[default]
    #[serde(rename = "1m")]
    Minute,
    /// Five-minute buckets
    #[serde(rename = "5m")]
    FiveMinutes,
    /// One-hour buckets
    #[serde(rename = "1h")]
    Hour,
}

impl Granularity {
    /// Parse a granularity token; unrecognized values default to one minute.
    pub fn parse(s: &str) -> Self {
        match s {
            "5m" => Self::FiveMinutes,
            "1h" => Self::Hour,
            _ => Self::Minute,
        }
    }

    /// The bucket width in minutes.
    pub fn minutes(self) -> i64 {
        match self {
            Self::Minute => 1,
            Self::FiveMinutes => 5,
            Self::Hour => 60,
        }
    }

    /// The wire token for this granularity.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Minute => "1m",
            Self::FiveMinutes => "5m",
            Self::Hour => "1h",
        }
    }
}

/// Number of buckets a range can hold at a granularity.
///
/// Windows that straddle a bucket boundary would otherwise yield one
/// bucket more than the range implies; adapters cap their result sets to
/// this count.
pub fn max_buckets(range: TimeRange, granularity: Granularity) -> i64 {
    range.hours() * 60 / granularity.minutes()
}

/// Truncate a timestamp to the start of its bucket.
pub fn bucket_start(ts: DateTime<Utc>, granularity: Granularity) -> DateTime<Utc> {
    let width = granularity.minutes() * 60;
    let secs = ts.timestamp().div_euclid(width) * width;
    Utc.timestamp_opt(secs, 0).single().unwrap_or(ts)
}

/// Filters and pagination for request-log queries
#[derive(Debug, Clone)]
pub struct LogQuery {
    /// Page size
    pub limit: i64,
    /// Page offset
    pub offset: i64,
    /// Only entries with this status
    pub status: Option<RequestStatus>,
    /// Only entries served by this model
    pub model: Option<String>,
}

impl Default for LogQuery {
    fn default() -> Self {
        Self {
            limit: 100,
            offset: 0,
            status: None,
            model: None,
        }
    }
}
