//! OllamaServe CLI
//!
//! Command-line interface for supervised local Ollama serving and its
//! monitoring API.

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing::info;

use ollamaserve::api::HttpServer;
use ollamaserve::config::{BackendConfig, ConnectionConfig};
use ollamaserve::db::MetricsRouter;
use ollamaserve::service::{OllamaService, Prober};

/// OllamaServe - supervised local Ollama serving with metrics monitoring
#[derive(Parser)]
#[command(name = "ollamaserve")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Host the Ollama server binds to
    #[arg(long, global = true, default_value = "0.0.0.0", env = "OLLAMASERVE_HOST")]
    host: String,

    /// Port the Ollama server listens on
    #[arg(long, global = true, default_value = "11434", env = "OLLAMASERVE_PORT")]
    port: u16,

    /// Timeout in seconds for health probes and model queries
    #[arg(long, global = true, default_value = "30")]
    timeout: u64,

    /// Health-probe retry budget
    #[arg(long, global = true, default_value = "3")]
    max_retries: u32,

    /// Path to the ollama binary
    #[arg(long, global = true, default_value = "ollama", env = "OLLAMA_BINARY")]
    binary: String,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Supervise a local Ollama server and serve the monitoring API
    Serve {
        /// Bind address for the monitoring API
        #[arg(long, default_value = "0.0.0.0", env = "OLLAMASERVE_API_HOST")]
        api_host: String,

        /// Port for the monitoring API
        #[arg(long, default_value = "8000", env = "OLLAMASERVE_API_PORT")]
        api_port: u16,

        /// Seconds to wait for the server to initialize after spawning
        #[arg(long, default_value = "2")]
        startup_delay: u64,

        /// Seconds to wait for graceful shutdown before escalating
        #[arg(long, default_value = "5")]
        stop_timeout: u64,
    },

    /// Serve the monitoring API against an already-running setup
    Api {
        /// Bind address for the monitoring API
        #[arg(long, default_value = "0.0.0.0", env = "OLLAMASERVE_API_HOST")]
        api_host: String,

        /// Port for the monitoring API
        #[arg(long, default_value = "8000", env = "OLLAMASERVE_API_PORT")]
        api_port: u16,
    },

    /// Probe the Ollama server once and report its health
    Health {
        /// Override the retry budget for this probe
        #[arg(long)]
        retries: Option<u32>,
    },

    /// List the models the Ollama server offers
    Models {
        /// Emit raw JSON instead of one name per line
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .init();

    let config = match ConnectionConfig::new(cli.host, cli.port, cli.timeout, cli.max_retries) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Invalid connection config: {e}");
            return ExitCode::FAILURE;
        }
    };

    let result = match cli.command {
        Commands::Serve {
            api_host,
            api_port,
            startup_delay,
            stop_timeout,
        } => {
            run_serve(
                config,
                cli.binary,
                &api_host,
                api_port,
                Duration::from_secs(startup_delay),
                Duration::from_secs(stop_timeout),
            )
            .await
        }
        Commands::Api { api_host, api_port } => run_api(&api_host, api_port).await,
        Commands::Health { retries } => run_health(config, retries).await,
        Commands::Models { json } => run_models(config, json).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run_serve(
    config: ConnectionConfig,
    binary: String,
    api_host: &str,
    api_port: u16,
    startup_delay: Duration,
    stop_timeout: Duration,
) -> anyhow::Result<()> {
    // Backend connectivity is best-effort: a down metrics store must not
    // keep the inference server from coming up.
    let backend_config = BackendConfig::from_env();
    let router = Arc::new(MetricsRouter::connect(&backend_config).await);

    let server = HttpServer::new(router, backend_config);
    let addr = format!("{api_host}:{api_port}");

    let mut service = OllamaService::with_binary(config, binary);
    service
        .run_scoped(startup_delay, stop_timeout, move |_prober| async move {
            server
                .serve_with_shutdown(&addr, async {
                    let _ = tokio::signal::ctrl_c().await;
                    info!("Shutdown signal received");
                })
                .await
        })
        .await?;

    Ok(())
}

async fn run_api(api_host: &str, api_port: u16) -> anyhow::Result<()> {
    let backend_config = BackendConfig::from_env();
    let router = Arc::new(MetricsRouter::connect(&backend_config).await);

    let server = HttpServer::new(router, backend_config);
    server
        .serve_with_shutdown(&format!("{api_host}:{api_port}"), async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutdown signal received");
        })
        .await?;

    Ok(())
}

async fn run_health(config: ConnectionConfig, retries: Option<u32>) -> anyhow::Result<()> {
    let url = config.connection_url(true);
    let prober = Prober::new(config);
    prober.health_check(retries).await?;
    println!("Ollama service at {url} is healthy");
    Ok(())
}

async fn run_models(config: ConnectionConfig, json: bool) -> anyhow::Result<()> {
    let prober = Prober::new(config);
    let models = prober.list_models().await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&models)?);
    } else if models.is_empty() {
        println!("No models installed");
    } else {
        for name in models.names() {
            println!("{name}");
        }
    }
    Ok(())
}
