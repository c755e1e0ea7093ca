//! Lifecycle supervision for a local Ollama server
//!
//! The supervisor owns the external server process exclusively: it spawns
//! it, verifies it is reachable, and tears it down gracefully (escalating
//! to a forced kill when it must). Start and stop are idempotent: calling
//! them in the "wrong" state warns instead of erroring, because supervisors
//! get driven from restart loops where double invocation has to be safe.

mod probe;
mod process;

pub use probe::Prober;

use std::future::Future;
use std::time::Duration;

use tracing::{error, info, warn};

use crate::config::ConnectionConfig;
use crate::error::{Error, Result};
use crate::models::ModelList;

use process::ProcessTree;

/// Default time to wait for the server to initialize after spawning.
pub const DEFAULT_STARTUP_DELAY: Duration = Duration::from_secs(2);

/// Default time to wait for graceful shutdown before escalating.
pub const DEFAULT_STOP_TIMEOUT: Duration = Duration::from_secs(5);

/// Lifecycle state of the supervised server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ServiceState {
    /// No process exists
    #[default]
    Stopped,
    /// Spawned, not yet confirmed up
    Starting,
    /// Up; a live process handle exists
    Running,
    /// Graceful teardown in progress
    Stopping,
    /// The last start attempt failed; no process exists
    Failed,
}

/// Supervisor for a local Ollama server process.
///
/// Exactly one live process handle exists while the state is `Starting`,
/// `Running`, or `Stopping`, and none otherwise. Lifecycle transitions must
/// be serialized by the caller; the `&mut self` receivers enforce this for
/// a single owner. Observers never block.
pub struct OllamaService {
    config: ConnectionConfig,
    binary: String,
    prober: Prober,
    state: ServiceState,
    process: Option<ProcessTree>,
}

impl OllamaService {
    /// Create a supervisor expecting `ollama` in `PATH`.
    pub fn new(config: ConnectionConfig) -> Self {
        Self::with_binary(config, "ollama")
    }

    /// Create a supervisor that spawns `binary` instead.
    pub fn with_binary(config: ConnectionConfig, binary: impl Into<String>) -> Self {
        let prober = Prober::new(config.clone());
        info!(
            "Initialized OllamaService for {}:{}",
            config.host, config.port
        );
        Self {
            config,
            binary: binary.into(),
            prober,
            state: ServiceState::Stopped,
            process: None,
        }
    }

    /// Start the server and wait `startup_delay` for it to initialize.
    ///
    /// A no-op when already `Running` or `Starting`. A spawn failure or an
    /// immediate exit transitions to `Failed` and surfaces
    /// [`Error::Start`]; a failed health probe after a successful spawn
    /// only warns; the process is up and may simply need more warm-up
    /// time before it answers.
    pub async fn start(&mut self, startup_delay: Duration) -> Result<()> {
        if matches!(self.state, ServiceState::Running | ServiceState::Starting) {
            warn!("Service is already running");
            return Ok(());
        }

        info!(
            "Starting Ollama service on {}:{}",
            self.config.host, self.config.port
        );
        self.state = ServiceState::Starting;

        let host_port = format!("{}:{}", self.config.host, self.config.port);
        let mut process = match ProcessTree::spawn(&self.binary, &host_port) {
            Ok(process) => process,
            Err(e) => {
                error!("Failed to start Ollama service: {e}");
                self.state = ServiceState::Failed;
                return Err(e);
            }
        };

        tokio::time::sleep(startup_delay).await;

        match process.try_wait() {
            Ok(None) => {}
            Ok(Some(status)) => {
                let stderr = process.read_stderr().await;
                self.state = ServiceState::Failed;
                return Err(Error::start(format!(
                    "process terminated immediately ({status}). stderr: {}",
                    stderr.trim()
                )));
            }
            Err(e) => {
                let _ = process.kill();
                let _ = process.wait().await;
                self.state = ServiceState::Failed;
                return Err(e);
            }
        }

        process.drain_stderr();
        self.process = Some(process);

        match self.prober.health_check(None).await {
            Ok(_) => info!("Ollama service started successfully"),
            Err(e) => warn!("Service started but health check failed: {e}"),
        }

        self.state = ServiceState::Running;
        Ok(())
    }

    /// Stop the server, granting `timeout` for a graceful exit.
    ///
    /// A no-op when not `Running`. Sends the graceful signal to the whole
    /// process group, escalates to a forced kill once on timeout, and
    /// always leaves the supervisor in `Stopped` with the handle cleared,
    /// even when signal delivery fails (which is still reported as
    /// [`Error::Stop`]).
    pub async fn stop(&mut self, timeout: Duration) -> Result<()> {
        if self.state != ServiceState::Running || self.process.is_none() {
            warn!("Service is not running");
            return Ok(());
        }

        info!("Stopping Ollama service");
        self.state = ServiceState::Stopping;

        let Some(mut process) = self.process.take() else {
            self.state = ServiceState::Stopped;
            return Ok(());
        };

        if let Err(e) = process.terminate() {
            // Most likely the process is already gone; reap it if so and
            // leave the supervisor reusable.
            let _ = process.try_wait();
            self.state = ServiceState::Stopped;
            return Err(e);
        }

        match tokio::time::timeout(timeout, process.wait()).await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => {
                self.state = ServiceState::Stopped;
                return Err(e);
            }
            Err(_) => {
                warn!("Graceful shutdown timed out, forcing termination");
                if let Err(e) = process.kill() {
                    self.state = ServiceState::Stopped;
                    return Err(e);
                }
                if let Err(e) = process.wait().await {
                    self.state = ServiceState::Stopped;
                    return Err(e);
                }
            }
        }

        self.state = ServiceState::Stopped;
        info!("Ollama service stopped successfully");
        Ok(())
    }

    /// Run `f` against a started service, stopping it on every exit path.
    ///
    /// The closure receives a [`Prober`] bound to the service. Its error
    /// wins over a cleanup error; a cleanup error alone is still surfaced.
    pub async fn run_scoped<T, F, Fut>(
        &mut self,
        startup_delay: Duration,
        stop_timeout: Duration,
        f: F,
    ) -> Result<T>
    where
        F: FnOnce(Prober) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.start(startup_delay).await?;
        let outcome = f(self.prober.clone()).await;
        let stopped = self.stop(stop_timeout).await;

        match (outcome, stopped) {
            (Ok(value), Ok(())) => Ok(value),
            (Ok(_), Err(e)) => Err(e),
            (Err(e), stop_result) => {
                if let Err(stop_err) = stop_result {
                    error!("Cleanup stop failed: {stop_err}");
                }
                Err(e)
            }
        }
    }

    /// Whether the service is currently running.
    pub fn is_running(&self) -> bool {
        self.state == ServiceState::Running
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ServiceState {
        self.state
    }

    /// OS process id of the supervised server, while one exists.
    pub fn pid(&self) -> Option<u32> {
        self.process.as_ref().and_then(ProcessTree::id)
    }

    /// Base URL clients should use to reach the server.
    pub fn base_url(&self) -> String {
        self.config.connection_url(true)
    }

    /// The connection configuration this supervisor was built with.
    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// Probe the server's health (see [`Prober::health_check`]).
    pub async fn health_check(&self, retries: Option<u32>) -> Result<bool> {
        self.prober.health_check(retries).await
    }

    /// List the models the server offers (see [`Prober::list_models`]).
    pub async fn models(&self) -> Result<ModelList> {
        self.prober.list_models().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    // Health probes in these tests point at a port nobody listens on; with
    // a zero retry budget the probe fails fast and start() proceeds to
    // Running regardless, which is the contract under test.
    fn test_config() -> ConnectionConfig {
        ConnectionConfig::new("127.0.0.1", 18434, 1, 0).unwrap()
    }

    #[cfg(unix)]
    fn write_script(dir: &TempDir, name: &str, contents: &str) -> String {
        use std::os::unix::fs::PermissionsExt;

        let path = dir.path().join(name);
        std::fs::write(&path, contents).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path.to_string_lossy().into_owned()
    }

    #[cfg(unix)]
    const SLEEPER: &str = "#!/bin/sh\nsleep 30\n";

    #[cfg(unix)]
    const CRASHER: &str = "#!/bin/sh\necho boom >&2\nexit 1\n";

    #[cfg(unix)]
    const TERM_IGNORER: &str = "#!/bin/sh\ntrap '' TERM\nwhile :; do sleep 1; done\n";

    #[cfg(unix)]
    #[tokio::test]
    async fn start_is_idempotent_while_running() {
        let dir = TempDir::new().unwrap();
        let binary = write_script(&dir, "sleeper", SLEEPER);
        let mut service = OllamaService::with_binary(test_config(), binary);

        service.start(Duration::from_millis(50)).await.unwrap();
        assert!(service.is_running());
        let pid = service.pid().expect("running service has a pid");

        // Second start must not spawn a second process.
        service.start(Duration::from_millis(50)).await.unwrap();
        assert_eq!(service.pid(), Some(pid));
        assert_eq!(service.state(), ServiceState::Running);

        service.stop(Duration::from_secs(2)).await.unwrap();
        assert_eq!(service.state(), ServiceState::Stopped);
        assert!(service.pid().is_none());
    }

    #[tokio::test]
    async fn stop_is_a_noop_when_stopped() {
        let mut service = OllamaService::with_binary(test_config(), "ollama");
        service.stop(Duration::from_secs(1)).await.unwrap();
        assert_eq!(service.state(), ServiceState::Stopped);
    }

    #[tokio::test]
    async fn missing_binary_fails_start() {
        let mut service =
            OllamaService::with_binary(test_config(), "/nonexistent/ollamaserve-test-binary");

        let err = service.start(Duration::from_millis(10)).await.unwrap_err();
        assert!(matches!(err, Error::Start(_)), "got {err:?}");
        assert_eq!(service.state(), ServiceState::Failed);
        assert!(!service.is_running());
        assert!(service.pid().is_none());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn immediate_exit_fails_start_with_captured_stderr() {
        let dir = TempDir::new().unwrap();
        let binary = write_script(&dir, "crasher", CRASHER);
        let mut service = OllamaService::with_binary(test_config(), binary);

        let err = service.start(Duration::from_millis(200)).await.unwrap_err();
        match err {
            Error::Start(msg) => assert!(msg.contains("boom"), "stderr missing from: {msg}"),
            other => panic!("expected Start error, got {other:?}"),
        }
        assert_eq!(service.state(), ServiceState::Failed);
        assert!(service.pid().is_none());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn stop_escalates_to_kill_on_stubborn_process() {
        let dir = TempDir::new().unwrap();
        let binary = write_script(&dir, "stubborn", TERM_IGNORER);
        let mut service = OllamaService::with_binary(test_config(), binary);

        service.start(Duration::from_millis(100)).await.unwrap();
        assert!(service.is_running());

        // Graceful phase is far shorter than the script's lifetime, so
        // stop must escalate and still complete.
        service.stop(Duration::from_millis(300)).await.unwrap();
        assert_eq!(service.state(), ServiceState::Stopped);
        assert!(service.pid().is_none());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn state_machine_survives_rapid_alternation() {
        let dir = TempDir::new().unwrap();
        let binary = write_script(&dir, "sleeper", SLEEPER);
        let mut service = OllamaService::with_binary(test_config(), binary);

        for _ in 0..3 {
            service.start(Duration::from_millis(30)).await.unwrap();
            assert_eq!(service.state(), ServiceState::Running);
            service.stop(Duration::from_secs(2)).await.unwrap();
            assert_eq!(service.state(), ServiceState::Stopped);
            // Redundant transitions in both directions stay no-ops.
            service.stop(Duration::from_secs(1)).await.unwrap();
            assert_eq!(service.state(), ServiceState::Stopped);
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn failed_start_allows_retry() {
        let dir = TempDir::new().unwrap();
        let crasher = write_script(&dir, "crasher", CRASHER);
        let sleeper = write_script(&dir, "sleeper", SLEEPER);

        let mut service = OllamaService::with_binary(test_config(), crasher);
        assert!(service.start(Duration::from_millis(200)).await.is_err());
        assert_eq!(service.state(), ServiceState::Failed);

        // A supervisor in Failed is reusable; restart loops depend on it.
        service.binary = sleeper;
        service.start(Duration::from_millis(50)).await.unwrap();
        assert_eq!(service.state(), ServiceState::Running);
        service.stop(Duration::from_secs(2)).await.unwrap();
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn run_scoped_stops_on_error() {
        let dir = TempDir::new().unwrap();
        let binary = write_script(&dir, "sleeper", SLEEPER);
        let mut service = OllamaService::with_binary(test_config(), binary);

        let result: Result<()> = service
            .run_scoped(
                Duration::from_millis(50),
                Duration::from_secs(2),
                |_prober| async { Err(Error::internal("caller blew up")) },
            )
            .await;

        assert!(result.is_err());
        assert_eq!(service.state(), ServiceState::Stopped);
        assert!(service.pid().is_none());
    }
}
