//! Replaces the running server with freshly built artifacts.

use crate::{
    CompiledArtifact, Launcher, ManagedServer, ProcessError, ProcessExit, ProcessResult, SpawnError,
};

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use log::{error, info, warn};
use tokio::sync::{Mutex, watch};

/// Observable phase of the manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManagerState {
    /// No server has been started yet
    Idle,
    /// Waiting for the previous server to exit
    Draining,
    /// Launching a new artifact
    Spawning,
    /// A server owns the port
    Listening { port: u16 },
    /// The new artifact failed; respawning the previous one
    Recovering,
    /// No server could be started
    Failed { error: String },
    /// Closed by the driver
    Closed,
}

impl fmt::Display for ManagerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => f.write_str("idle"),
            Self::Draining => f.write_str("draining"),
            Self::Spawning => f.write_str("spawning"),
            Self::Listening { port } => write!(f, "listening on port {port}"),
            Self::Recovering => f.write_str("recovering"),
            Self::Failed { error } => write!(f, "failed: {error}"),
            Self::Closed => f.write_str("closed"),
        }
    }
}

/// What a cycle owns: the current server and the artifact it runs.
#[derive(Default)]
struct Current {
    server: Option<ManagedServer>,
    artifact: Option<CompiledArtifact>,
}

/// Cheap view of the current server for readers outside a cycle.
#[derive(Clone)]
struct RunningServer {
    pid: u32,
    port: u16,
    exit_rx: watch::Receiver<Option<ProcessExit>>,
}

/// Owns the one server instance of a dev session.
///
/// `manage()` and `close()` run one at a time in arrival order; state
/// getters never wait for an in-flight cycle.
pub struct ServerManager {
    launcher: Launcher,
    port: u16,
    working_dir: PathBuf,
    termination_timeout: Duration,
    current: Mutex<Current>,
    running: std::sync::Mutex<Option<RunningServer>>,
    spawn_errors: std::sync::Mutex<Vec<Arc<SpawnError>>>,
    generation: AtomicU64,
    state_tx: watch::Sender<ManagerState>,
    state_rx: watch::Receiver<ManagerState>,
}

impl ServerManager {
    pub fn new(launcher: Launcher, port: u16, working_dir: impl Into<PathBuf>) -> Self {
        let (state_tx, state_rx) = watch::channel(ManagerState::Idle);
        let termination_timeout = launcher.config().termination_timeout();

        Self {
            launcher,
            port,
            working_dir: working_dir.into(),
            termination_timeout,
            current: Mutex::new(Current::default()),
            running: std::sync::Mutex::new(None),
            spawn_errors: std::sync::Mutex::new(Vec::new()),
            generation: AtomicU64::new(0),
            state_tx,
            state_rx,
        }
    }

    /// Replace the running server with one built from `artifact_bytes`.
    ///
    /// The previous server is fully stopped before the new one starts. If the
    /// new one fails, the previous artifact is respawned and `Ok` is returned;
    /// the failure stays visible through [`last_spawn_errors`](Self::last_spawn_errors).
    pub async fn manage(&self, artifact_bytes: &[u8], bundle_dir: &Path) -> ProcessResult<()> {
        let mut current = self.current.lock().await;

        self.clear_spawn_errors();

        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let mut artifact = CompiledArtifact::persist(bundle_dir, artifact_bytes, generation).await?;
        info!(
            "Managing artifact generation {generation}: {}",
            artifact.path().display()
        );

        if let Err(e) = self.stop_current(&mut current).await {
            artifact.discard().await;
            return Err(e);
        }

        self.set_state(ManagerState::Spawning);
        let error = match self
            .launcher
            .spawn(artifact.path(), &self.working_dir, self.port)
            .await
        {
            Ok(server) => {
                self.adopt(&mut current, server);
                if let Some(mut previous) = current.artifact.replace(artifact) {
                    previous.discard().await;
                }
                return Ok(());
            }
            Err(error) => self.record(error),
        };

        warn!("New server failed to start: {error}");
        artifact.discard().await;

        let Some(previous) = current.artifact.as_ref() else {
            self.set_state(ManagerState::Failed {
                error: error.to_string(),
            });
            return Err(ProcessError::Spawn(error));
        };

        self.set_state(ManagerState::Recovering);
        info!("Respawning previous server from {}", previous.path().display());

        match self
            .launcher
            .spawn(previous.path(), &self.working_dir, self.port)
            .await
        {
            Ok(server) => {
                self.adopt(&mut current, server);
                info!("Keeping previous server running");
                Ok(())
            }
            Err(recovery) => {
                let recovery = self.record(recovery);
                error!("Previous server failed to restart: {recovery}");
                self.set_state(ManagerState::Failed {
                    error: recovery.to_string(),
                });
                Err(ProcessError::Spawn(recovery))
            }
        }
    }

    /// Stop the current server and delete its artifact. Safe to call repeatedly.
    pub async fn close(&self) -> ProcessResult<()> {
        let mut current = self.current.lock().await;

        self.stop_current(&mut current).await?;
        if let Some(mut artifact) = current.artifact.take() {
            artifact.remove().await?;
        }

        self.set_state(ManagerState::Closed);
        Ok(())
    }

    /// A server is adopted, listening, and its process has not exited.
    pub fn is_running(&self) -> bool {
        self.running_server()
            .is_some_and(|running| running.exit_rx.borrow().is_none())
    }

    /// Spawn failures of the latest `manage()` cycle, oldest first.
    pub fn last_spawn_errors(&self) -> Vec<Arc<SpawnError>> {
        self.errors().clone()
    }

    pub fn clear_spawn_errors(&self) {
        self.errors().clear();
    }

    pub fn current_pid(&self) -> Option<u32> {
        self.running_server().map(|running| running.pid)
    }

    /// Port of the current server, if one is adopted.
    pub fn port(&self) -> Option<u16> {
        self.running_server().map(|running| running.port)
    }

    /// Port every server is launched on.
    pub fn target_port(&self) -> u16 {
        self.port
    }

    pub fn subscribe(&self) -> watch::Receiver<ManagerState> {
        self.state_rx.clone()
    }

    pub fn state(&self) -> ManagerState {
        self.state_rx.borrow().clone()
    }

    async fn stop_current(&self, current: &mut Current) -> ProcessResult<()> {
        let Some(mut server) = current.server.take() else {
            return Ok(());
        };

        self.set_state(ManagerState::Draining);
        *self.running_slot() = None;

        info!("Stopping server (pid {})", server.pid());
        server.shutdown(self.termination_timeout).await
    }

    fn adopt(&self, current: &mut Current, server: ManagedServer) {
        let port = server.bound_port().unwrap_or(self.port);

        *self.running_slot() = Some(RunningServer {
            pid: server.pid(),
            port,
            exit_rx: server.exit_watch(),
        });
        current.server = Some(server);

        self.set_state(ManagerState::Listening { port });
    }

    fn record(&self, error: SpawnError) -> Arc<SpawnError> {
        let error = Arc::new(error);
        self.errors().push(Arc::clone(&error));
        error
    }

    fn set_state(&self, state: ManagerState) {
        info!("Server manager {state}");
        let _ = self.state_tx.send(state);
    }

    fn running_server(&self) -> Option<RunningServer> {
        self.running_slot().clone()
    }

    fn running_slot(&self) -> std::sync::MutexGuard<'_, Option<RunningServer>> {
        self.running
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn errors(&self) -> std::sync::MutexGuard<'_, Vec<Arc<SpawnError>>> {
        self.spawn_errors
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}
