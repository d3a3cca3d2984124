use crate::captured_output::OutputCapture;
use crate::terminate::kill_tree_now;
use crate::{CapturedOutput, ProcessResult, TerminationSignal, terminate_until};

use std::fmt;
use std::path::{Path, PathBuf};
use std::process::ExitStatus;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use log::{info, warn};
use tokio::process::Child;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// How long to wait for pipes to close after the process exited.
const OUTPUT_DRAIN_TIMEOUT: Duration = Duration::from_millis(500);

/// Lifecycle of one launched server process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    /// Launched, handshake not yet confirmed
    Starting,
    /// Handshake confirmed; owns the port
    Listening,
    /// Termination requested, exit not yet observed
    Draining,
    /// Exit observed
    Terminated,
    /// Never became Listening
    Failed,
}

/// How a process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessExit {
    pub code: Option<i32>,
    pub signal: Option<i32>,
}

impl ProcessExit {
    pub(crate) fn from_status(status: ExitStatus) -> Self {
        #[cfg(unix)]
        let signal = {
            use std::os::unix::process::ExitStatusExt;
            status.signal()
        };
        #[cfg(not(unix))]
        let signal = None;

        Self {
            code: status.code(),
            signal,
        }
    }

    pub(crate) fn unknown() -> Self {
        Self {
            code: None,
            signal: None,
        }
    }

    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

impl fmt::Display for ProcessExit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.code, self.signal) {
            (Some(code), _) => write!(f, "the error code {code}"),
            (None, Some(signal)) => write!(f, "signal {signal}"),
            (None, None) => f.write_str("an unknown status"),
        }
    }
}

/// One running server instance.
///
/// The child handle lives in a monitor task that reaps it and publishes the
/// exit, so the process never lingers as a zombie and every waiter sees the
/// same outcome. Dropping a server that is still alive kills its tree.
pub struct ManagedServer {
    id: u64,
    pid: u32,
    artifact_path: PathBuf,
    bound_port: Option<u16>,
    state: ServerState,
    exit_rx: watch::Receiver<Option<ProcessExit>>,
    expect_running: Arc<AtomicBool>,
    output: OutputCapture,
    _monitor: JoinHandle<()>,
}

impl ManagedServer {
    pub(crate) fn start(
        id: u64,
        pid: u32,
        mut child: Child,
        artifact_path: PathBuf,
        output: OutputCapture,
    ) -> Self {
        let (exit_tx, exit_rx) = watch::channel(None);
        let expect_running = Arc::new(AtomicBool::new(false));
        let monitor_expect = Arc::clone(&expect_running);

        let monitor = tokio::spawn(async move {
            let exit = match child.wait().await {
                Ok(status) => ProcessExit::from_status(status),
                Err(e) => {
                    warn!("Failed to wait for server (pid {pid}): {e}");
                    ProcessExit::unknown()
                }
            };

            if monitor_expect.load(Ordering::SeqCst) {
                warn!("Server (pid {pid}) unexpectedly terminated with {exit}");
            } else {
                info!("Server (pid {pid}) exited with {exit}");
            }

            exit_tx.send_replace(Some(exit));
        });

        Self {
            id,
            pid,
            artifact_path,
            bound_port: None,
            state: ServerState::Starting,
            exit_rx,
            expect_running,
            output,
            _monitor: monitor,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    pub fn artifact_path(&self) -> &Path {
        &self.artifact_path
    }

    /// Port confirmed by the handshake.
    pub fn bound_port(&self) -> Option<u16> {
        self.bound_port
    }

    pub fn state(&self) -> ServerState {
        self.state
    }

    /// Output captured so far.
    pub fn output(&self) -> CapturedOutput {
        self.output.snapshot()
    }

    pub fn exit(&self) -> Option<ProcessExit> {
        *self.exit_rx.borrow()
    }

    pub fn has_exited(&self) -> bool {
        self.exit().is_some()
    }

    /// Listening and its process has not exited.
    pub fn is_running(&self) -> bool {
        self.state == ServerState::Listening && !self.has_exited()
    }

    /// A cheap observer of this server's process exit.
    pub fn exit_watch(&self) -> watch::Receiver<Option<ProcessExit>> {
        self.exit_rx.clone()
    }

    pub async fn wait_for_exit(&self) -> ProcessExit {
        wait_exit(self.exit_rx.clone()).await
    }

    /// Wait for the exit, then for the output pipes to close.
    pub(crate) async fn finish(&mut self) -> (ProcessExit, CapturedOutput) {
        let exit = self.wait_for_exit().await;
        if self.state != ServerState::Listening {
            self.state = ServerState::Failed;
        } else {
            self.state = ServerState::Terminated;
        }
        let output = self.output.drain(OUTPUT_DRAIN_TIMEOUT).await;
        (exit, output)
    }

    pub(crate) fn mark_listening(&mut self, port: u16) {
        self.bound_port = Some(port);
        self.state = ServerState::Listening;
        self.expect_running.store(true, Ordering::SeqCst);
    }

    /// Terminate the process tree and wait until the exit is observed.
    ///
    /// Calling it again after it succeeded does nothing.
    pub async fn shutdown(&mut self, timeout: Duration) -> ProcessResult<()> {
        if self.state == ServerState::Terminated {
            return Ok(());
        }

        let failed = self.state != ServerState::Listening && self.state != ServerState::Draining;
        self.expect_running.store(false, Ordering::SeqCst);
        self.state = ServerState::Draining;

        if !self.has_exited() {
            let exit_rx = self.exit_rx.clone();
            terminate_until(self.pid, timeout, TerminationSignal::Terminate, async move {
                wait_exit(exit_rx).await;
            })
            .await?;
        }

        self.state = if failed {
            ServerState::Failed
        } else {
            ServerState::Terminated
        };
        info!("Server (pid {}) stopped", self.pid);

        Ok(())
    }
}

impl Drop for ManagedServer {
    fn drop(&mut self) {
        if !self.has_exited() {
            warn!("Dropping live server (pid {}), killing its process tree", self.pid);
            kill_tree_now(self.pid);
        }
    }
}

async fn wait_exit(mut exit_rx: watch::Receiver<Option<ProcessExit>>) -> ProcessExit {
    match exit_rx.wait_for(Option::is_some).await {
        Ok(exit) => (*exit).unwrap_or_else(ProcessExit::unknown),
        // Monitor gone without publishing
        Err(_) => ProcessExit::unknown(),
    }
}
