//! Storage backends for collected metrics and request logs
//!
//! One query interface over two engines. The router resolves a single
//! active backend when it connects and degrades every query failure to the
//! documented empty result: a missing or hiccuping metrics store renders an
//! empty dashboard, it does not take the service down. Absence of a backend
//! is a normal operating mode (monitoring disabled), not a failure.

mod clickhouse;
mod postgres;

pub use self::clickhouse::ClickHouseBackend;
pub use self::postgres::PostgresBackend;

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::config::BackendConfig;
use crate::error::Result;
use crate::models::{
    Granularity, HistoryPoint, LogPage, LogQuery, ModelUsage, StatsSnapshot, TimeRange,
};

/// Engine-specific execution of the logical metrics queries.
///
/// Implementations are read-only and safe to share across concurrent
/// callers.
#[async_trait]
pub trait StatsBackend: Send + Sync {
    /// Engine name for logs and the config surface.
    fn name(&self) -> &'static str;

    /// Aggregate snapshot over everything the store holds.
    ///
    /// `default_uptime_hours` is the router's own uptime, used by engines
    /// that do not record an uptime metric of their own.
    async fn current_stats(&self, default_uptime_hours: f64) -> Result<StatsSnapshot>;

    /// Time-bucketed history, newest bucket first.
    async fn history(
        &self,
        range: TimeRange,
        granularity: Granularity,
    ) -> Result<Vec<HistoryPoint>>;

    /// Paginated request logs, newest first.
    async fn logs(&self, query: &LogQuery) -> Result<LogPage>;

    /// Per-model aggregates ordered by request count descending.
    async fn model_stats(&self) -> Result<Vec<ModelUsage>>;
}

/// Read router over whichever storage backend is active.
pub struct MetricsRouter {
    backend: Option<Arc<dyn StatsBackend>>,
    started_at: Instant,
}

impl MetricsRouter {
    /// A router with no backend: every query returns its empty value.
    pub fn disconnected() -> Self {
        Self {
            backend: None,
            started_at: Instant::now(),
        }
    }

    /// A router over an already-established backend.
    pub fn with_backend(backend: Arc<dyn StatsBackend>) -> Self {
        Self {
            backend: Some(backend),
            started_at: Instant::now(),
        }
    }

    /// Connect whichever backends the exporter mode requests and resolve
    /// the active one: ClickHouse when the mode includes it and the
    /// connection came up, else PostgreSQL, else none.
    ///
    /// Connection failures are logged and skipped; a router always comes
    /// back, possibly disconnected.
    pub async fn connect(config: &BackendConfig) -> Self {
        let mut backend: Option<Arc<dyn StatsBackend>> = None;

        if config.exporter.wants_clickhouse() {
            match ClickHouseBackend::connect(&config.clickhouse).await {
                Ok(ch) => {
                    info!("Connected to ClickHouse at {}", config.clickhouse.url());
                    backend = Some(Arc::new(ch));
                }
                Err(e) => warn!("Failed to connect to ClickHouse: {e}"),
            }
        }

        if backend.is_none() && config.exporter.wants_postgres() {
            match PostgresBackend::connect(&config.postgres).await {
                Ok(pg) => {
                    info!(
                        "Connected to PostgreSQL at {}:{}",
                        config.postgres.host, config.postgres.port
                    );
                    backend = Some(Arc::new(pg));
                }
                Err(e) => warn!("Failed to connect to PostgreSQL: {e}"),
            }
        }

        if backend.is_none() {
            info!(
                "No metrics backend active (exporter: {}); queries will return empty results",
                config.exporter
            );
        }

        Self {
            backend,
            started_at: Instant::now(),
        }
    }

    /// Whether a storage backend is live.
    pub fn is_connected(&self) -> bool {
        self.backend.is_some()
    }

    /// Name of the active backend, if any.
    pub fn backend_name(&self) -> Option<&'static str> {
        self.backend.as_ref().map(|b| b.name())
    }

    /// Seconds since this router was created.
    pub fn uptime_seconds(&self) -> f64 {
        self.started_at.elapsed().as_secs_f64()
    }

    fn uptime_hours(&self) -> f64 {
        self.uptime_seconds() / 3600.0
    }

    /// Current metrics snapshot; all-zero when no backend answers.
    pub async fn current_stats(&self) -> StatsSnapshot {
        match &self.backend {
            Some(backend) => match backend.current_stats(self.uptime_hours()).await {
                Ok(snapshot) => snapshot,
                Err(e) => {
                    warn!("Error getting stats from {}: {e}", backend.name());
                    StatsSnapshot::empty(self.uptime_hours())
                }
            },
            None => StatsSnapshot::empty(self.uptime_hours()),
        }
    }

    /// Time-bucketed history; empty when no backend answers.
    pub async fn history(&self, range: TimeRange, granularity: Granularity) -> Vec<HistoryPoint> {
        match &self.backend {
            Some(backend) => match backend.history(range, granularity).await {
                Ok(points) => points,
                Err(e) => {
                    warn!("Error getting history from {}: {e}", backend.name());
                    Vec::new()
                }
            },
            None => Vec::new(),
        }
    }

    /// Paginated request logs; an empty page when no backend answers.
    pub async fn logs(&self, query: &LogQuery) -> LogPage {
        match &self.backend {
            Some(backend) => match backend.logs(query).await {
                Ok(page) => page,
                Err(e) => {
                    warn!("Error getting logs from {}: {e}", backend.name());
                    LogPage::empty()
                }
            },
            None => LogPage::empty(),
        }
    }

    /// Per-model aggregates; empty when no backend answers.
    pub async fn model_stats(&self) -> Vec<ModelUsage> {
        match &self.backend {
            Some(backend) => match backend.model_stats().await {
                Ok(stats) => stats,
                Err(e) => {
                    warn!("Error getting model stats from {}: {e}", backend.name());
                    Vec::new()
                }
            },
            None => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::models::{LogEntry, RequestStatus};
    use chrono::Utc;
    use uuid::Uuid;

    struct StubBackend {
        fail: bool,
    }

    #[async_trait]
    impl StatsBackend for StubBackend {
        fn name(&self) -> &'static str {
            "stub"
        }

        async fn current_stats(&self, default_uptime_hours: f64) -> Result<StatsSnapshot> {
            if self.fail {
                return Err(Error::Database("injected".into()));
            }
            let mut snapshot = StatsSnapshot::empty(default_uptime_hours);
            snapshot.tokens_total = 1234;
            snapshot.request_count = 17;
            Ok(snapshot)
        }

        async fn history(
            &self,
            _range: TimeRange,
            _granularity: Granularity,
        ) -> Result<Vec<HistoryPoint>> {
            if self.fail {
                return Err(Error::Database("injected".into()));
            }
            Ok(vec![HistoryPoint {
                timestamp: Utc::now(),
                tokens_total: 10,
                latency_ms: 42.0,
                throughput: 2.0,
                error_count: 0,
            }])
        }

        async fn logs(&self, query: &LogQuery) -> Result<LogPage> {
            if self.fail {
                return Err(Error::Database("injected".into()));
            }
            Ok(LogPage {
                total: 1,
                entries: vec![LogEntry {
                    request_id: Uuid::new_v4().to_string(),
                    timestamp: Utc::now(),
                    model: query.model.clone().unwrap_or_else(|| "llama3.2".into()),
                    tokens: 128,
                    latency_ms: 250,
                    status: RequestStatus::Success,
                    error_message: None,
                }],
            })
        }

        async fn model_stats(&self) -> Result<Vec<ModelUsage>> {
            if self.fail {
                return Err(Error::Database("injected".into()));
            }
            Ok(vec![ModelUsage {
                model_name: "llama3.2".into(),
                requests_count: 17,
                tokens_generated: 1234,
                avg_latency_ms: 250.0,
                error_count: 0,
                last_used: Some(Utc::now()),
            }])
        }
    }

    #[tokio::test]
    async fn disconnected_router_degrades_to_empty_results() {
        let router = MetricsRouter::disconnected();
        assert!(!router.is_connected());

        let snapshot = router.current_stats().await;
        assert_eq!(snapshot.tokens_total, 0);
        assert_eq!(snapshot.request_count, 0);
        assert_eq!(snapshot.error_count, 0);
        assert_eq!(snapshot.models_available, 0);
        // Uptime tracks router age, which is near zero here.
        assert!(snapshot.uptime_hours >= 0.0);
        assert!(snapshot.uptime_hours < 0.01);

        assert!(router
            .history(TimeRange::SixHours, Granularity::Hour)
            .await
            .is_empty());
        let page = router.logs(&LogQuery::default()).await;
        assert_eq!(page.total, 0);
        assert!(page.entries.is_empty());
        assert!(router.model_stats().await.is_empty());
    }

    #[tokio::test]
    async fn backend_failures_degrade_instead_of_propagating() {
        let router = MetricsRouter::with_backend(Arc::new(StubBackend { fail: true }));
        assert!(router.is_connected());

        let snapshot = router.current_stats().await;
        assert_eq!(snapshot.tokens_total, 0);
        assert!(router
            .history(TimeRange::OneHour, Granularity::Minute)
            .await
            .is_empty());
        assert_eq!(router.logs(&LogQuery::default()).await.total, 0);
        assert!(router.model_stats().await.is_empty());
    }

    #[tokio::test]
    async fn healthy_backend_results_pass_through() {
        let router = MetricsRouter::with_backend(Arc::new(StubBackend { fail: false }));
        assert_eq!(router.backend_name(), Some("stub"));

        let snapshot = router.current_stats().await;
        assert_eq!(snapshot.tokens_total, 1234);
        assert_eq!(snapshot.request_count, 17);

        let query = LogQuery {
            model: Some("qwen2.5".into()),
            ..LogQuery::default()
        };
        let page = router.logs(&query).await;
        assert_eq!(page.total, 1);
        assert_eq!(page.entries[0].model, "qwen2.5");

        let usage = router.model_stats().await;
        assert_eq!(usage[0].requests_count, 17);
    }
}
