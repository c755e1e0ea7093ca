//! API handlers for the monitoring HTTP surface

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::config::BackendConfig;
use crate::db::MetricsRouter;
use crate::models::{
    Granularity, HistoryPoint, LogEntry, LogQuery, ModelUsage, RequestStatus, StatsSnapshot,
    TimeRange,
};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Read router over the active metrics backend
    pub router: Arc<MetricsRouter>,
    /// Backend configuration, reported read-only by `/api/config`
    pub backend_config: BackendConfig,
}

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub uptime_seconds: f64,
    pub database_connected: bool,
    pub details: serde_json::Value,
}

/// Service health: healthy with a connected backend, degraded without one
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let connected = state.router.is_connected();
    Json(HealthResponse {
        status: if connected { "healthy" } else { "degraded" },
        uptime_seconds: state.router.uptime_seconds(),
        database_connected: connected,
        details: serde_json::json!({
            "exporter_type": state.backend_config.exporter.to_string(),
            "backend": state.router.backend_name(),
            "timestamp": Utc::now().to_rfc3339(),
        }),
    })
}

/// Current metrics snapshot
pub async fn current_stats(State(state): State<AppState>) -> Json<StatsSnapshot> {
    Json(state.router.current_stats().await)
}

/// Query parameters for the history endpoint
#[derive(Debug, Deserialize)]
pub struct HistoryParams {
    pub time_range: Option<String>,
    pub granularity: Option<String>,
}

/// Time-series history response
#[derive(Serialize)]
pub struct HistoryResponse {
    pub time_range: &'static str,
    pub granularity: &'static str,
    pub data: Vec<HistoryPoint>,
}

/// Time-series history for charting; unrecognized tokens fall back to
/// the 1h/1m defaults
pub async fn history(
    State(state): State<AppState>,
    Query(params): Query<HistoryParams>,
) -> Json<HistoryResponse> {
    let range = params
        .time_range
        .as_deref()
        .map(TimeRange::parse)
        .unwrap_or_default();
    let granularity = params
        .granularity
        .as_deref()
        .map(Granularity::parse)
        .unwrap_or_default();

    let data = state.router.history(range, granularity).await;
    Json(HistoryResponse {
        time_range: range.as_str(),
        granularity: granularity.as_str(),
        data,
    })
}

/// Query parameters for the logs endpoint
#[derive(Debug, Deserialize)]
pub struct LogsParams {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
    pub status: Option<String>,
    pub model: Option<String>,
}

/// Paginated request-log response
#[derive(Debug, Serialize)]
pub struct LogsResponse {
    pub total: i64,
    pub offset: i64,
    pub limit: i64,
    pub logs: Vec<LogEntry>,
}

/// Paginated request logs with optional status/model filters
pub async fn logs(
    State(state): State<AppState>,
    Query(params): Query<LogsParams>,
) -> Result<Json<LogsResponse>, (StatusCode, String)> {
    let limit = params.limit.unwrap_or(100).clamp(1, 1000);
    let offset = params.offset.unwrap_or(0).max(0);

    let status = match params.status.as_deref() {
        None => None,
        Some(s) => Some(RequestStatus::parse(s).ok_or((
            StatusCode::BAD_REQUEST,
            format!("unknown status filter: {s}"),
        ))?),
    };

    let query = LogQuery {
        limit,
        offset,
        status,
        model: params.model,
    };
    let page = state.router.logs(&query).await;

    Ok(Json(LogsResponse {
        total: page.total,
        offset,
        limit,
        logs: page.entries,
    }))
}

/// Per-model statistics response
#[derive(Serialize)]
pub struct ModelsResponse {
    pub models: Vec<ModelUsage>,
    pub total_models: usize,
}

/// Per-model usage aggregates
pub async fn model_stats(State(state): State<AppState>) -> Json<ModelsResponse> {
    let models = state.router.model_stats().await;
    Json(ModelsResponse {
        total_models: models.len(),
        models,
    })
}

/// Read-only configuration response
#[derive(Serialize)]
pub struct ConfigResponse {
    pub exporter_type: String,
    pub clickhouse_host: Option<String>,
    pub postgres_host: Option<String>,
    pub database_connected: bool,
}

/// Current monitoring configuration
pub async fn config(State(state): State<AppState>) -> Json<ConfigResponse> {
    let cfg = &state.backend_config;
    Json(ConfigResponse {
        exporter_type: cfg.exporter.to_string(),
        clickhouse_host: cfg
            .exporter
            .wants_clickhouse()
            .then(|| cfg.clickhouse.host.clone()),
        postgres_host: cfg
            .exporter
            .wants_postgres()
            .then(|| cfg.postgres.host.clone()),
        database_connected: state.router.is_connected(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ExporterKind;

    fn disconnected_state() -> AppState {
        AppState {
            router: Arc::new(MetricsRouter::disconnected()),
            backend_config: BackendConfig {
                exporter: ExporterKind::Disabled,
                ..BackendConfig::default()
            },
        }
    }

    #[tokio::test]
    async fn health_reports_degraded_without_backend() {
        let response = health(State(disconnected_state())).await;
        assert_eq!(response.0.status, "degraded");
        assert!(!response.0.database_connected);
    }

    #[tokio::test]
    async fn history_defaults_unrecognized_tokens() {
        let params = HistoryParams {
            time_range: Some("90m".to_string()),
            granularity: Some("2m".to_string()),
        };
        let response = history(State(disconnected_state()), Query(params)).await;
        assert_eq!(response.0.time_range, "1h");
        assert_eq!(response.0.granularity, "1m");
        assert!(response.0.data.is_empty());
    }

    #[tokio::test]
    async fn logs_rejects_unknown_status_filter() {
        let params = LogsParams {
            limit: None,
            offset: None,
            status: Some("pending".to_string()),
            model: None,
        };
        let err = logs(State(disconnected_state()), Query(params))
            .await
            .unwrap_err();
        assert_eq!(err.0, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn logs_clamps_pagination() {
        let params = LogsParams {
            limit: Some(10_000),
            offset: Some(-5),
            status: None,
            model: None,
        };
        let response = logs(State(disconnected_state()), Query(params))
            .await
            .unwrap();
        assert_eq!(response.0.limit, 1000);
        assert_eq!(response.0.offset, 0);
    }

    #[tokio::test]
    async fn config_omits_hosts_for_disabled_exporter() {
        let response = config(State(disconnected_state())).await;
        assert_eq!(response.0.exporter_type, "disabled");
        assert!(response.0.clickhouse_host.is_none());
        assert!(response.0.postgres_host.is_none());
    }
}
