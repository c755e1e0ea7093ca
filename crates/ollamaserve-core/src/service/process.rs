//! Process-tree handle for the supervised server
//!
//! Owns the spawned child and its process group, and delivers
//! graceful/forced termination that reaches the whole tree: the server may
//! fork workers that would otherwise be orphaned. POSIX targets signal the
//! process group; other targets fall back to killing the direct child.

use std::process::Stdio;

use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::{Child, Command};
use tracing::debug;

use crate::error::{Error, Result};

pub(crate) struct ProcessTree {
    child: Child,
    #[cfg(unix)]
    pgid: Option<nix::unistd::Pid>,
}

impl ProcessTree {
    /// Spawn `<binary> serve` bound to `host_port`, in its own process
    /// group, with stderr captured.
    pub(crate) fn spawn(binary: &str, host_port: &str) -> Result<Self> {
        let mut cmd = Command::new(binary);
        cmd.arg("serve")
            .env("OLLAMA_HOST", host_port)
            .stdout(Stdio::null())
            .stderr(Stdio::piped());
        #[cfg(unix)]
        cmd.process_group(0);

        let child = cmd.spawn().map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => Error::start(format!(
                "binary not found: {binary}. Ensure Ollama is installed and in PATH"
            )),
            _ => Error::start(format!("spawn failed: {e}")),
        })?;

        #[cfg(unix)]
        let pgid = child
            .id()
            .map(|pid| nix::unistd::Pid::from_raw(pid as i32));

        Ok(Self {
            child,
            #[cfg(unix)]
            pgid,
        })
    }

    /// OS process id, while the child has not been reaped.
    pub(crate) fn id(&self) -> Option<u32> {
        self.child.id()
    }

    /// Check whether the child has exited without blocking.
    pub(crate) fn try_wait(&mut self) -> Result<Option<std::process::ExitStatus>> {
        self.child
            .try_wait()
            .map_err(|e| Error::start(format!("liveness check failed: {e}")))
    }

    /// Wait for the child to exit.
    pub(crate) async fn wait(&mut self) -> Result<std::process::ExitStatus> {
        self.child
            .wait()
            .await
            .map_err(|e| Error::stop(format!("wait for exit failed: {e}")))
    }

    /// Read everything the child wrote to stderr. Only meaningful once the
    /// child has exited; returns an empty string if the stream was already
    /// taken.
    pub(crate) async fn read_stderr(&mut self) -> String {
        let mut buf = String::new();
        if let Some(mut stderr) = self.child.stderr.take() {
            let _ = stderr.read_to_string(&mut buf).await;
        }
        buf
    }

    /// Forward the child's stderr to the log, line by line, until EOF.
    ///
    /// Must be called once the child is considered up: an unread pipe
    /// eventually fills and blocks the writer.
    pub(crate) fn drain_stderr(&mut self) {
        if let Some(stderr) = self.child.stderr.take() {
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    debug!(target: "ollama", "{line}");
                }
            });
        }
    }

    /// Deliver the graceful termination signal to the whole tree.
    #[cfg(unix)]
    pub(crate) fn terminate(&mut self) -> Result<()> {
        use nix::sys::signal::{killpg, Signal};

        match self.pgid {
            Some(pgid) => killpg(pgid, Signal::SIGTERM)
                .map_err(|e| Error::stop(format!("SIGTERM delivery failed: {e}"))),
            None => Err(Error::stop("process already reaped")),
        }
    }

    /// Deliver the graceful termination signal.
    #[cfg(not(unix))]
    pub(crate) fn terminate(&mut self) -> Result<()> {
        self.child
            .start_kill()
            .map_err(|e| Error::stop(format!("terminate failed: {e}")))
    }

    /// Deliver the forceful kill signal to the whole tree.
    #[cfg(unix)]
    pub(crate) fn kill(&mut self) -> Result<()> {
        use nix::sys::signal::{killpg, Signal};

        match self.pgid {
            Some(pgid) => killpg(pgid, Signal::SIGKILL)
                .map_err(|e| Error::stop(format!("SIGKILL delivery failed: {e}"))),
            None => Err(Error::stop("process already reaped")),
        }
    }

    /// Deliver the forceful kill signal.
    #[cfg(not(unix))]
    pub(crate) fn kill(&mut self) -> Result<()> {
        self.child
            .start_kill()
            .map_err(|e| Error::stop(format!("kill failed: {e}")))
    }
}
