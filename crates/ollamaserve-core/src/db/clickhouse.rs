//! ClickHouse storage adapter
//!
//! Reads the `ollama_metrics` and `request_logs` tables written by the
//! ClickHouse exporter, over the HTTP interface. Timestamps travel as unix
//! seconds and are rebuilt as `DateTime<Utc>` on this side.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use clickhouse::{Client, Row};
use serde::Deserialize;

use crate::config::ClickHouseConfig;
use crate::error::{Error, Result};
use crate::models::{
    max_buckets, Granularity, HistoryPoint, LogEntry, LogPage, LogQuery, ModelUsage,
    RequestStatus, StatsSnapshot, TimeRange,
};

/// ClickHouse-backed [`StatsBackend`](super::StatsBackend)
#[derive(Clone)]
pub struct ClickHouseBackend {
    client: Client,
}

#[derive(Row, Deserialize)]
struct PingRow {
    #[allow(dead_code)]
    ok: u8,
}

#[derive(Row, Deserialize)]
struct TotalsRow {
    tokens_total: i64,
    error_count: i64,
    request_count: i64,
    avg_latency_ms: f64,
}

#[derive(Row, Deserialize)]
struct TokensPerSecRow {
    tokens_per_sec: f64,
}

#[derive(Row, Deserialize)]
struct UptimeRow {
    uptime_seconds: f64,
}

#[derive(Row, Deserialize)]
struct ModelsAvailableRow {
    models_available: i64,
}

#[derive(Row, Deserialize)]
struct HistoryRow {
    bucket_ts: i64,
    tokens_total: i64,
    latency_ms: f64,
    throughput: f64,
    error_count: i64,
}

#[derive(Row, Deserialize)]
struct CountRow {
    total: i64,
}

#[derive(Row, Deserialize)]
struct LogRow {
    request_id: String,
    ts: i64,
    model: String,
    tokens: i64,
    latency_ms: i64,
    status: String,
    error_message: Option<String>,
}

#[derive(Row, Deserialize)]
struct ModelStatsRow {
    model: String,
    requests_count: i64,
    tokens_generated: i64,
    avg_latency_ms: f64,
    error_count: i64,
    last_used_ts: i64,
}

impl ClickHouseBackend {
    /// Connect a client and verify it with a probe query.
    pub async fn connect(config: &ClickHouseConfig) -> Result<Self> {
        let client = Client::default()
            .with_url(config.url())
            .with_database(config.database.clone())
            .with_user(config.user.clone())
            .with_password(config.password.clone());

        client
            .query("SELECT toUInt8(1) AS ok")
            .fetch_one::<PingRow>()
            .await
            .map_err(|e| Error::Database(e.to_string()))?;

        Ok(Self { client })
    }
}

#[async_trait]
impl super::StatsBackend for ClickHouseBackend {
    fn name(&self) -> &'static str {
        "clickhouse"
    }

    async fn current_stats(&self, _default_uptime_hours: f64) -> Result<StatsSnapshot> {
        let totals = self
            .client
            .query(
                r"
                SELECT
                    toInt64(sumIf(metric_value, metric_name = 'ollama_tokens_generated_total'))
                        AS tokens_total,
                    toInt64(sumIf(metric_value, metric_name = 'ollama_errors_total'))
                        AS error_count,
                    toInt64(countIf(metric_name = 'ollama_requests_total')) AS request_count,
                    toFloat64(avgIf(metric_value, metric_name = 'ollama_request_latency_ms'))
                        AS avg_latency_ms
                FROM ollama_metrics
                ",
            )
            .fetch_one::<TotalsRow>()
            .await
            .map_err(|e| Error::Database(e.to_string()))?;

        let tps = self
            .client
            .query(
                r"
                SELECT toFloat64(sum(metric_value) / 3600.0) AS tokens_per_sec
                FROM ollama_metrics
                WHERE metric_name = 'ollama_tokens_generated_total'
                  AND timestamp >= now() - INTERVAL 1 HOUR
                ",
            )
            .fetch_one::<TokensPerSecRow>()
            .await
            .map_err(|e| Error::Database(e.to_string()))?;

        let uptime = self
            .client
            .query(
                r"
                SELECT toFloat64(max(metric_value)) AS uptime_seconds
                FROM ollama_metrics
                WHERE metric_name = 'ollama_uptime_seconds'
                ",
            )
            .fetch_one::<UptimeRow>()
            .await
            .map_err(|e| Error::Database(e.to_string()))?;

        let models = self
            .client
            .query("SELECT toInt64(uniqExact(model)) AS models_available FROM request_logs")
            .fetch_one::<ModelsAvailableRow>()
            .await
            .map_err(|e| Error::Database(e.to_string()))?;

        Ok(StatsSnapshot {
            tokens_total: totals.tokens_total,
            tokens_per_sec: finite_or_zero(tps.tokens_per_sec),
            uptime_hours: finite_or_zero(uptime.uptime_seconds) / 3600.0,
            error_count: totals.error_count,
            request_count: totals.request_count,
            avg_latency_ms: finite_or_zero(totals.avg_latency_ms),
            models_available: models.models_available,
            timestamp: Utc::now(),
        })
    }

    async fn history(
        &self,
        range: TimeRange,
        granularity: Granularity,
    ) -> Result<Vec<HistoryPoint>> {
        let sql = format!(
            r"
            SELECT
                toInt64(toUnixTimestamp(toStartOfInterval(timestamp, INTERVAL {minutes} MINUTE)))
                    AS bucket_ts,
                toInt64(sumIf(metric_value, metric_name = 'ollama_tokens_generated_total'))
                    AS tokens_total,
                toFloat64(avgIf(metric_value, metric_name = 'ollama_request_latency_ms'))
                    AS latency_ms,
                toFloat64(countIf(metric_name = 'ollama_requests_total') / {minutes})
                    AS throughput,
                toInt64(sumIf(metric_value, metric_name = 'ollama_errors_total'))
                    AS error_count
            FROM ollama_metrics
            WHERE timestamp >= now() - INTERVAL {hours} HOUR
            GROUP BY bucket_ts
            ORDER BY bucket_ts DESC
            LIMIT {limit}
            ",
            minutes = granularity.minutes(),
            hours = range.hours(),
            limit = max_buckets(range, granularity),
        );

        let rows = self
            .client
            .query(&sql)
            .fetch_all::<HistoryRow>()
            .await
            .map_err(|e| Error::Database(e.to_string()))?;

        Ok(rows
            .into_iter()
            .map(|row| HistoryPoint {
                timestamp: timestamp_from_secs(row.bucket_ts),
                tokens_total: row.tokens_total,
                latency_ms: finite_or_zero(row.latency_ms),
                throughput: finite_or_zero(row.throughput),
                error_count: row.error_count,
            })
            .collect())
    }

    async fn logs(&self, query: &LogQuery) -> Result<LogPage> {
        let mut conditions: Vec<&str> = Vec::new();
        let mut binds: Vec<String> = Vec::new();

        if let Some(status) = query.status {
            conditions.push("status = ?");
            binds.push(status.as_str().to_string());
        }
        if let Some(model) = &query.model {
            conditions.push("model = ?");
            binds.push(model.clone());
        }

        let where_clause = if conditions.is_empty() {
            "1 = 1".to_string()
        } else {
            conditions.join(" AND ")
        };

        let count_sql =
            format!("SELECT toInt64(count()) AS total FROM request_logs WHERE {where_clause}");
        let mut count_query = self.client.query(&count_sql);
        for value in &binds {
            count_query = count_query.bind(value.as_str());
        }
        let total = count_query
            .fetch_one::<CountRow>()
            .await
            .map_err(|e| Error::Database(e.to_string()))?
            .total;

        let page_sql = format!(
            r"
            SELECT toString(request_id) AS request_id,
                   toInt64(toUnixTimestamp(timestamp)) AS ts,
                   model,
                   toInt64(tokens_generated) AS tokens,
                   toInt64(latency_ms) AS latency_ms,
                   status,
                   error_message
            FROM request_logs
            WHERE {where_clause}
            ORDER BY timestamp DESC
            LIMIT ? OFFSET ?
            ",
        );
        let mut page_query = self.client.query(&page_sql);
        for value in &binds {
            page_query = page_query.bind(value.as_str());
        }
        let rows = page_query
            .bind(query.limit)
            .bind(query.offset)
            .fetch_all::<LogRow>()
            .await
            .map_err(|e| Error::Database(e.to_string()))?;

        Ok(LogPage {
            total,
            entries: rows
                .into_iter()
                .map(|row| LogEntry {
                    request_id: row.request_id,
                    timestamp: timestamp_from_secs(row.ts),
                    model: row.model,
                    tokens: row.tokens,
                    latency_ms: row.latency_ms,
                    status: RequestStatus::parse(&row.status).unwrap_or(RequestStatus::Error),
                    error_message: row.error_message,
                })
                .collect(),
        })
    }

    async fn model_stats(&self) -> Result<Vec<ModelUsage>> {
        let rows = self
            .client
            .query(
                r"
                SELECT model,
                       toInt64(count()) AS requests_count,
                       toInt64(sum(tokens_generated)) AS tokens_generated,
                       toFloat64(avg(latency_ms)) AS avg_latency_ms,
                       toInt64(countIf(status = 'error')) AS error_count,
                       toInt64(toUnixTimestamp(max(timestamp))) AS last_used_ts
                FROM request_logs
                GROUP BY model
                ORDER BY requests_count DESC
                ",
            )
            .fetch_all::<ModelStatsRow>()
            .await
            .map_err(|e| Error::Database(e.to_string()))?;

        Ok(rows
            .into_iter()
            .map(|row| ModelUsage {
                model_name: row.model,
                requests_count: row.requests_count,
                tokens_generated: row.tokens_generated,
                avg_latency_ms: finite_or_zero(row.avg_latency_ms),
                error_count: row.error_count,
                last_used: (row.last_used_ts > 0).then(|| timestamp_from_secs(row.last_used_ts)),
            })
            .collect())
    }
}

/// ClickHouse aggregates over empty sets yield NaN rather than NULL.
fn finite_or_zero(value: f64) -> f64 {
    if value.is_finite() {
        value
    } else {
        0.0
    }
}

fn timestamp_from_secs(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(secs, 0).unwrap_or_else(Utc::now)
}
