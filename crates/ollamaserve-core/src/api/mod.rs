//! REST API for the monitoring surface
//!
//! Serializes router query results onto the wire. All storage access goes
//! through [`MetricsRouter`]; the API layer never touches a backend
//! directly and never sees a storage error, since degraded results arrive
//! already well-formed.

pub mod handlers;
pub mod routes;

pub use handlers::AppState;
pub use routes::create_router;

use std::future::Future;
use std::sync::Arc;

use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use crate::config::BackendConfig;
use crate::db::MetricsRouter;
use crate::error::{Error, Result};

/// HTTP API server
pub struct HttpServer {
    state: AppState,
}

impl HttpServer {
    /// Create a server over an established router.
    pub fn new(router: Arc<MetricsRouter>, backend_config: BackendConfig) -> Self {
        Self {
            state: AppState {
                router,
                backend_config,
            },
        }
    }

    /// Serve until `shutdown` resolves.
    pub async fn serve_with_shutdown<F>(self, addr: &str, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);

        let app = create_router(self.state).layer(cors);

        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| Error::internal(e.to_string()))?;

        info!("Monitoring API listening on {}", addr);

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(|e| Error::internal(e.to_string()))?;

        Ok(())
    }

    /// Serve forever.
    pub async fn serve(self, addr: &str) -> Result<()> {
        self.serve_with_shutdown(addr, std::future::pending()).await
    }
}
