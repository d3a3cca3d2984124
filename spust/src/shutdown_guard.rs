use crate::ShutdownCoordinator;

use tokio::sync::broadcast;

/// Receiving end of a [`ShutdownCoordinator`].
pub struct ShutdownGuard {
    shutdown_rx: broadcast::Receiver<()>,
    requested: bool,
}

impl ShutdownGuard {
    pub fn new(coordinator: &ShutdownCoordinator) -> Self {
        Self {
            shutdown_rx: coordinator.subscribe(),
            // Shutdown may have happened before we subscribed
            requested: coordinator.is_shutdown(),
        }
    }

    /// Resolves once shutdown is requested; immediately if it already was.
    pub async fn wait(&mut self) {
        if !self.requested {
            let _ = self.shutdown_rx.recv().await;
            self.requested = true;
        }
    }

    /// Non-blocking check.
    pub fn poll_shutdown(&mut self) -> bool {
        if !self.requested && self.shutdown_rx.try_recv().is_ok() {
            self.requested = true;
        }
        self.requested
    }
}
