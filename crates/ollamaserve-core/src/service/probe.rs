//! Availability probing for the supervised server
//!
//! Bounded-retry health verification against the Ollama HTTP surface, plus
//! the unretried model-list query. Connection-level failures (refused, DNS,
//! timeout) stay distinguishable from "reachable but unhealthy": the
//! supervisor's startup path only warns on either, while standalone callers
//! need to know which one they got.

use std::time::Duration;

use reqwest::{Client, StatusCode};
use tracing::{debug, error, warn};

use crate::config::ConnectionConfig;
use crate::error::{Error, Result};
use crate::models::ModelList;

/// Delay between health-check attempts after a connection-level failure.
const RETRY_BACKOFF: Duration = Duration::from_secs(1);

/// Health and model-list prober for an Ollama server.
#[derive(Clone)]
pub struct Prober {
    client: Client,
    config: ConnectionConfig,
}

impl Prober {
    /// Create a prober bound to the given connection config.
    pub fn new(config: ConnectionConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }

    fn tags_url(&self) -> String {
        format!("{}/api/tags", self.config.connection_url(true))
    }

    /// Check that the server answers its well-known endpoint with HTTP 200.
    ///
    /// Makes up to `retries + 1` strictly sequential attempts, taking the
    /// config budget when `retries` is `None`. A connection failure on the
    /// final attempt yields [`Error::Connection`]; running out of attempts
    /// against a reachable but unhealthy server yields
    /// [`Error::HealthCheck`].
    pub async fn health_check(&self, retries: Option<u32>) -> Result<bool> {
        let max_retries = retries.unwrap_or(self.config.max_retries);
        let url = self.tags_url();

        for attempt in 0..=max_retries {
            let response = self
                .client
                .get(&url)
                .timeout(self.config.timeout())
                .send()
                .await;

            match response {
                Ok(resp) if resp.status() == StatusCode::OK => {
                    debug!("Health check passed");
                    return Ok(true);
                }
                Ok(resp) => {
                    warn!("Health check returned status {}", resp.status());
                }
                Err(e) if e.is_builder() => {
                    error!("Unexpected error during health check: {e}");
                    return Err(Error::health_check(e.to_string()));
                }
                Err(e) => {
                    debug!("Health check attempt {} failed: {e}", attempt + 1);
                    if attempt < max_retries {
                        tokio::time::sleep(RETRY_BACKOFF).await;
                    } else {
                        return Err(Error::connection(format!(
                            "failed to connect to Ollama service at {url}: {e}"
                        )));
                    }
                }
            }
        }

        Err(Error::health_check(format!(
            "no healthy response after {} attempts",
            max_retries + 1
        )))
    }

    /// Fetch the list of models the server currently offers.
    ///
    /// Single unretried request; callers needing resilience run
    /// [`Prober::health_check`] first.
    pub async fn list_models(&self) -> Result<ModelList> {
        let url = self.tags_url();

        let resp = self
            .client
            .get(&url)
            .timeout(self.config.timeout())
            .send()
            .await
            .map_err(|e| {
                Error::connection(format!("failed to connect to Ollama service: {e}"))
            })?;

        if resp.status() != StatusCode::OK {
            return Err(Error::connection(format!(
                "failed to get models: HTTP {}",
                resp.status()
            )));
        }

        resp.json::<ModelList>()
            .await
            .map_err(|e| Error::connection(format!("failed to decode model list: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config_for(server: &MockServer) -> ConnectionConfig {
        let addr = server.address();
        ConnectionConfig::new(addr.ip().to_string(), addr.port(), 5, 3).unwrap()
    }

    #[tokio::test]
    async fn health_check_passes_on_200() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/tags"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "models": []
            })))
            .expect(1)
            .mount(&server)
            .await;

        let prober = Prober::new(config_for(&server));
        assert!(prober.health_check(Some(0)).await.unwrap());
    }

    #[tokio::test]
    async fn health_check_recovers_on_second_attempt() {
        let server = MockServer::start().await;
        // First attempt sees a 500, which is a failed attempt but not a
        // connection failure; the second attempt must succeed without
        // exhausting the budget.
        Mock::given(method("GET"))
            .and(path("/api/tags"))
            .respond_with(ResponseTemplate::new(500))
            .up_to_n_times(1)
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/tags"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let prober = Prober::new(config_for(&server));
        assert!(prober.health_check(Some(3)).await.unwrap());
    }

    #[tokio::test]
    async fn unhealthy_server_exhausts_budget_with_health_check_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/tags"))
            .respond_with(ResponseTemplate::new(503))
            .expect(3)
            .mount(&server)
            .await;

        let prober = Prober::new(config_for(&server));
        let err = prober.health_check(Some(2)).await.unwrap_err();
        match err {
            Error::HealthCheck(msg) => assert!(msg.contains("3 attempts")),
            other => panic!("expected HealthCheck error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn unreachable_server_raises_connection_error() {
        // Nothing listens on port 1; every attempt is refused, and the
        // final one must surface as a Connection error, not HealthCheck.
        let config = ConnectionConfig::new("127.0.0.1", 1, 1, 2).unwrap();
        let prober = Prober::new(config);

        let err = prober.health_check(None).await.unwrap_err();
        assert!(matches!(err, Error::Connection(_)), "got {err:?}");
    }

    #[tokio::test]
    async fn list_models_decodes_names() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/tags"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "models": [
                    {"name": "llama3.2:latest", "size": 2_019_393_189_i64},
                    {"name": "qwen2.5-coder:7b"}
                ]
            })))
            .mount(&server)
            .await;

        let prober = Prober::new(config_for(&server));
        let models = prober.list_models().await.unwrap();
        assert_eq!(models.names(), vec!["llama3.2:latest", "qwen2.5-coder:7b"]);
    }

    #[tokio::test]
    async fn list_models_maps_non_200_to_connection_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/tags"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let prober = Prober::new(config_for(&server));
        let err = prober.list_models().await.unwrap_err();
        assert!(matches!(err, Error::Connection(_)), "got {err:?}");
    }
}
