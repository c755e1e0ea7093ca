//! PostgreSQL storage adapter
//!
//! Reads the `ollama_metrics` and `request_logs` tables written by the
//! PostgreSQL exporter.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::Row;

use crate::config::PostgresConfig;
use crate::error::{Error, Result};
use crate::models::{
    max_buckets, Granularity, HistoryPoint, LogEntry, LogPage, LogQuery, ModelUsage,
    RequestStatus, StatsSnapshot, TimeRange,
};

/// PostgreSQL-backed [`StatsBackend`](super::StatsBackend)
#[derive(Clone)]
pub struct PostgresBackend {
    pool: PgPool,
}

impl PostgresBackend {
    /// Connect a pool and verify it with a probe query.
    pub async fn connect(config: &PostgresConfig) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .connect(&config.url())
            .await
            .map_err(|e| Error::Database(e.to_string()))?;

        sqlx::query("SELECT 1")
            .execute(&pool)
            .await
            .map_err(|e| Error::Database(e.to_string()))?;

        Ok(Self { pool })
    }
}

#[async_trait]
impl super::StatsBackend for PostgresBackend {
    fn name(&self) -> &'static str {
        "postgres"
    }

    async fn current_stats(&self, default_uptime_hours: f64) -> Result<StatsSnapshot> {
        let totals = sqlx::query(
            r#"
            SELECT
                COALESCE(SUM(CASE WHEN metric_name = 'ollama_tokens_generated_total'
                    THEN metric_value ELSE 0 END), 0)::BIGINT AS tokens_total,
                COALESCE(SUM(CASE WHEN metric_name = 'ollama_errors_total'
                    THEN metric_value ELSE 0 END), 0)::BIGINT AS error_count,
                COUNT(CASE WHEN metric_name = 'ollama_requests_total'
                    THEN 1 ELSE NULL END) AS request_count,
                COALESCE(AVG(CASE WHEN metric_name = 'ollama_request_latency_ms'
                    THEN metric_value ELSE NULL END), 0)::DOUBLE PRECISION AS avg_latency_ms
            FROM ollama_metrics
            "#,
        )
        .fetch_one(&self.pool)
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

        let tps = sqlx::query(
            r#"
            SELECT COALESCE(SUM(metric_value) / 3600.0, 0)::DOUBLE PRECISION AS tokens_per_sec
            FROM ollama_metrics
            WHERE metric_name = 'ollama_tokens_generated_total'
              AND timestamp >= NOW() - INTERVAL '1 hour'
            "#,
        )
        .fetch_one(&self.pool)
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

        let models = sqlx::query(
            "SELECT COUNT(DISTINCT model) AS models_available FROM request_logs",
        )
        .fetch_one(&self.pool)
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

        Ok(StatsSnapshot {
            tokens_total: totals.try_get("tokens_total").unwrap_or(0),
            tokens_per_sec: tps.try_get("tokens_per_sec").unwrap_or(0.0),
            uptime_hours: default_uptime_hours,
            error_count: totals.try_get("error_count").unwrap_or(0),
            request_count: totals.try_get("request_count").unwrap_or(0),
            avg_latency_ms: totals.try_get("avg_latency_ms").unwrap_or(0.0),
            models_available: models.try_get("models_available").unwrap_or(0),
            timestamp: Utc::now(),
        })
    }

    async fn history(
        &self,
        range: TimeRange,
        granularity: Granularity,
    ) -> Result<Vec<HistoryPoint>> {
        // Epoch-floor truncation honors every granularity, unlike a plain
        // date_trunc('minute', ...).
        let width_secs = granularity.minutes() * 60;
        let sql = format!(
            r#"
            SELECT
                to_timestamp(floor(extract(epoch FROM timestamp) / {width}) * {width})
                    AS time_bucket,
                COALESCE(SUM(CASE WHEN metric_name = 'ollama_tokens_generated_total'
                    THEN metric_value ELSE 0 END), 0)::BIGINT AS tokens_total,
                COALESCE(AVG(CASE WHEN metric_name = 'ollama_request_latency_ms'
                    THEN metric_value ELSE NULL END), 0)::DOUBLE PRECISION AS latency_ms,
                (COUNT(CASE WHEN metric_name = 'ollama_requests_total'
                    THEN 1 ELSE NULL END)::DOUBLE PRECISION / {minutes}) AS throughput,
                COALESCE(SUM(CASE WHEN metric_name = 'ollama_errors_total'
                    THEN metric_value ELSE 0 END), 0)::BIGINT AS error_count
            FROM ollama_metrics
            WHERE timestamp >= NOW() - INTERVAL '{hours} hours'
            GROUP BY time_bucket
            ORDER BY time_bucket DESC
            LIMIT {limit}
            "#,
            width = width_secs,
            minutes = granularity.minutes(),
            hours = range.hours(),
            limit = max_buckets(range, granularity),
        );

        let rows = sqlx::query(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| Error::Database(e.to_string()))?;

        Ok(rows
            .iter()
            .map(|row| HistoryPoint {
                timestamp: row.try_get("time_bucket").unwrap_or_else(|_| Utc::now()),
                tokens_total: row.try_get("tokens_total").unwrap_or(0),
                latency_ms: row.try_get("latency_ms").unwrap_or(0.0),
                throughput: row.try_get("throughput").unwrap_or(0.0),
                error_count: row.try_get("error_count").unwrap_or(0),
            })
            .collect())
    }

    async fn logs(&self, query: &LogQuery) -> Result<LogPage> {
        let mut conditions: Vec<String> = Vec::new();
        let mut binds: Vec<String> = Vec::new();

        if let Some(status) = query.status {
            binds.push(status.as_str().to_string());
            conditions.push(format!("status = ${}", binds.len()));
        }
        if let Some(model) = &query.model {
            binds.push(model.clone());
            conditions.push(format!("model = ${}", binds.len()));
        }

        let where_clause = if conditions.is_empty() {
            "TRUE".to_string()
        } else {
            conditions.join(" AND ")
        };

        let count_sql = format!("SELECT COUNT(*) AS total FROM request_logs WHERE {where_clause}");
        let mut count_query = sqlx::query(&count_sql);
        for value in &binds {
            count_query = count_query.bind(value.as_str());
        }
        let total: i64 = count_query
            .fetch_one(&self.pool)
            .await
            .map_err(|e| Error::Database(e.to_string()))?
            .try_get("total")
            .unwrap_or(0);

        let page_sql = format!(
            r#"
            SELECT request_id::TEXT AS request_id, timestamp, model,
                   tokens_generated::BIGINT AS tokens_generated,
                   latency_ms::BIGINT AS latency_ms, status, error_message
            FROM request_logs
            WHERE {where_clause}
            ORDER BY timestamp DESC
            LIMIT ${} OFFSET ${}
            "#,
            binds.len() + 1,
            binds.len() + 2,
        );
        let mut page_query = sqlx::query(&page_sql);
        for value in &binds {
            page_query = page_query.bind(value.as_str());
        }
        let rows = page_query
            .bind(query.limit)
            .bind(query.offset)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| Error::Database(e.to_string()))?;

        Ok(LogPage {
            total,
            entries: rows.iter().map(row_to_log_entry).collect(),
        })
    }

    async fn model_stats(&self) -> Result<Vec<ModelUsage>> {
        let rows = sqlx::query(
            r#"
            SELECT model,
                   COUNT(*) AS requests_count,
                   COALESCE(SUM(tokens_generated), 0)::BIGINT AS tokens_generated,
                   COALESCE(AVG(latency_ms), 0)::DOUBLE PRECISION AS avg_latency_ms,
                   SUM(CASE WHEN status = 'error' THEN 1 ELSE 0 END)::BIGINT AS error_count,
                   MAX(timestamp) AS last_used
            FROM request_logs
            GROUP BY model
            ORDER BY requests_count DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

        Ok(rows
            .iter()
            .map(|row| ModelUsage {
                model_name: row.try_get("model").unwrap_or_default(),
                requests_count: row.try_get("requests_count").unwrap_or(0),
                tokens_generated: row.try_get("tokens_generated").unwrap_or(0),
                avg_latency_ms: row.try_get("avg_latency_ms").unwrap_or(0.0),
                error_count: row.try_get("error_count").unwrap_or(0),
                last_used: row
                    .try_get::<Option<DateTime<Utc>>, _>("last_used")
                    .ok()
                    .flatten(),
            })
            .collect())
    }
}

fn row_to_log_entry(row: &PgRow) -> LogEntry {
    let status: String = row.try_get("status").unwrap_or_default();
    LogEntry {
        request_id: row.try_get("request_id").unwrap_or_default(),
        timestamp: row.try_get("timestamp").unwrap_or_else(|_| Utc::now()),
        model: row.try_get("model").unwrap_or_default(),
        tokens: row.try_get("tokens_generated").unwrap_or(0),
        latency_ms: row.try_get("latency_ms").unwrap_or(0),
        status: RequestStatus::parse(&status).unwrap_or(RequestStatus::Error),
        error_message: row
            .try_get::<Option<String>, _>("error_message")
            .ok()
            .flatten(),
    }
}
