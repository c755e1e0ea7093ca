//! Configuration management for OllamaServe

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{Error, Result};

/// Network configuration for the supervised Ollama server.
///
/// Validated at construction and never mutated afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Host address the server binds to; `0.0.0.0` for LAN accessibility
    pub host: String,
    /// Port the server listens on
    pub port: u16,
    /// Timeout in seconds for probes and model queries
    pub timeout_secs: u64,
    /// Maximum number of health-probe retry attempts
    pub max_retries: u32,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 11434,
            timeout_secs: 30,
            max_retries: 3,
        }
    }
}

impl ConnectionConfig {
    /// Create a validated configuration.
    pub fn new(
        host: impl Into<String>,
        port: u16,
        timeout_secs: u64,
        max_retries: u32,
    ) -> Result<Self> {
        if port == 0 {
            return Err(Error::validation(format!(
                "Port must be between 1 and 65535, got {port}"
            )));
        }
        if timeout_secs == 0 {
            return Err(Error::validation(format!(
                "Timeout must be positive, got {timeout_secs}"
            )));
        }
        Ok(Self {
            host: host.into(),
            port,
            timeout_secs,
            max_retries,
        })
    }

    /// Probe timeout as a [`Duration`].
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Base URL of the server at its configured bind address.
    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }

    /// API URL of the server.
    pub fn api_url(&self) -> String {
        format!("{}/api", self.base_url())
    }

    /// Connection URL for clients.
    ///
    /// With `localhost_fallback`, a wildcard bind host is replaced by
    /// `localhost`: local health checks need a resolvable loopback address
    /// even when the server is bound for LAN access.
    pub fn connection_url(&self, localhost_fallback: bool) -> String {
        if localhost_fallback && (self.host == "0.0.0.0" || self.host == "::") {
            format!("http://localhost:{}", self.port)
        } else {
            self.base_url()
        }
    }
}

/// Which metrics exporter(s) the deployment writes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExporterKind {
    /// ClickHouse only
    #[default]
    Clickhouse,
    /// PostgreSQL only
    Postgres,
    /// Both engines; ClickHouse is preferred for reads
    Both,
    /// Monitoring disabled; every query returns its empty value
    Disabled,
}

impl ExporterKind {
    /// Parse an `EXPORTER_TYPE` value; unrecognized input disables export.
    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "clickhouse" => Self::Clickhouse,
            "postgres" => Self::Postgres,
            "both" => Self::Both,
            "none" | "disabled" => Self::Disabled,
            other => {
                warn!("Unknown EXPORTER_TYPE '{other}'; disabling metrics export");
                Self::Disabled
            }
        }
    }

    /// Whether reads may be served from ClickHouse.
    pub fn wants_clickhouse(self) -> bool {
        matches!(self, Self::Clickhouse | Self::Both)
    }

    /// Whether reads may be served from PostgreSQL.
    pub fn wants_postgres(self) -> bool {
        matches!(self, Self::Postgres | Self::Both)
    }
}

impl fmt::Display for ExporterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Clickhouse => "clickhouse",
            Self::Postgres => "postgres",
            Self::Both => "both",
            Self::Disabled => "disabled",
        })
    }
}

/// ClickHouse connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClickHouseConfig {
    /// Host of the ClickHouse server
    pub host: String,
    /// HTTP interface port
    pub port: u16,
    /// Database holding the metrics tables
    pub database: String,
    /// User name
    pub user: String,
    /// Password
    pub password: String,
}

impl Default for ClickHouseConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 8123,
            database: "ollama_metrics".to_string(),
            user: "default".to_string(),
            password: String::new(),
        }
    }
}

impl ClickHouseConfig {
    /// URL of the ClickHouse HTTP interface.
    pub fn url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }
}

/// PostgreSQL connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostgresConfig {
    /// Host of the PostgreSQL server
    pub host: String,
    /// Port of the PostgreSQL server
    pub port: u16,
    /// Database holding the metrics tables
    pub database: String,
    /// User name
    pub user: String,
    /// Password
    pub password: String,
    /// Maximum pool connections
    pub max_connections: u32,
}

impl Default for PostgresConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            database: "ollama_metrics".to_string(),
            user: "postgres".to_string(),
            password: "postgres".to_string(),
            max_connections: 5,
        }
    }
}

impl PostgresConfig {
    /// Connection URL for the pool.
    pub fn url(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}/{}",
            self.user, self.password, self.host, self.port, self.database
        )
    }
}

/// Storage backend configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Active exporter mode
    pub exporter: ExporterKind,
    /// ClickHouse settings
    pub clickhouse: ClickHouseConfig,
    /// PostgreSQL settings
    pub postgres: PostgresConfig,
}

impl BackendConfig {
    /// Load configuration from `EXPORTER_TYPE`, `CLICKHOUSE_*`, and
    /// `POSTGRES_*` environment variables, defaulting anything unset.
    pub fn from_env() -> Self {
        Self {
            exporter: ExporterKind::parse(&env_or("EXPORTER_TYPE", "clickhouse")),
            clickhouse: ClickHouseConfig {
                host: env_or("CLICKHOUSE_HOST", "localhost"),
                port: env_port("CLICKHOUSE_PORT", 8123),
                database: env_or("CLICKHOUSE_DATABASE", "ollama_metrics"),
                user: env_or("CLICKHOUSE_USER", "default"),
                password: env_or("CLICKHOUSE_PASSWORD", ""),
            },
            postgres: PostgresConfig {
                host: env_or("POSTGRES_HOST", "localhost"),
                port: env_port("POSTGRES_PORT", 5432),
                database: env_or("POSTGRES_DATABASE", "ollama_metrics"),
                user: env_or("POSTGRES_USER", "postgres"),
                password: env_or("POSTGRES_PASSWORD", "postgres"),
                max_connections: 5,
            },
        }
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_port(key: &str, default: u16) -> u16 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_port_zero() {
        let err = ConnectionConfig::new("localhost", 0, 30, 3).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn accepts_port_bounds() {
        assert!(ConnectionConfig::new("localhost", 1, 30, 3).is_ok());
        assert!(ConnectionConfig::new("localhost", 65535, 30, 3).is_ok());
    }

    #[test]
    fn rejects_zero_timeout() {
        let err = ConnectionConfig::new("localhost", 11434, 0, 3).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn zero_retries_are_allowed() {
        let config = ConnectionConfig::new("localhost", 11434, 30, 0).unwrap();
        assert_eq!(config.max_retries, 0);
    }

    #[test]
    fn wildcard_host_falls_back_to_localhost() {
        let config = ConnectionConfig::default();
        assert_eq!(config.base_url(), "http://0.0.0.0:11434");
        assert_eq!(config.connection_url(true), "http://localhost:11434");
        assert_eq!(config.connection_url(false), "http://0.0.0.0:11434");

        let v6 = ConnectionConfig::new("::", 11434, 30, 3).unwrap();
        assert_eq!(v6.connection_url(true), "http://localhost:11434");
    }

    #[test]
    fn named_host_is_never_rewritten() {
        let config = ConnectionConfig::new("10.0.0.5", 11434, 30, 3).unwrap();
        assert_eq!(config.connection_url(true), "http://10.0.0.5:11434");
    }

    #[test]
    fn exporter_kind_parsing() {
        assert_eq!(ExporterKind::parse("clickhouse"), ExporterKind::Clickhouse);
        assert_eq!(ExporterKind::parse("POSTGRES"), ExporterKind::Postgres);
        assert_eq!(ExporterKind::parse("both"), ExporterKind::Both);
        assert_eq!(ExporterKind::parse("none"), ExporterKind::Disabled);
        assert_eq!(ExporterKind::parse("mysql"), ExporterKind::Disabled);
    }

    #[test]
    fn backend_config_env_roundtrip() {
        std::env::set_var("EXPORTER_TYPE", "both");
        std::env::set_var("CLICKHOUSE_PORT", "9010");
        std::env::set_var("POSTGRES_PORT", "not-a-port");

        let config = BackendConfig::from_env();
        assert_eq!(config.exporter, ExporterKind::Both);
        assert_eq!(config.clickhouse.port, 9010);
        // Unparseable values fall back to the default.
        assert_eq!(config.postgres.port, 5432);

        std::env::remove_var("EXPORTER_TYPE");
        std::env::remove_var("CLICKHOUSE_PORT");
        std::env::remove_var("POSTGRES_PORT");
    }
}
