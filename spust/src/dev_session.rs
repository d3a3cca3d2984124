//! The `spust start` loop: build, hand the artifact to the server manager,
//! report, and repeat on every source change.

use crate::builder::Builder;
use crate::error::Result as CliResult;
use crate::watcher::SourceWatcher;
use crate::ShutdownCoordinator;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use log::{error, info, warn};
use sp_config::Config;
use sp_process::{Launcher, ServerManager, SpawnError, SystemPortQuery};

/// Environment variable carrying the configured host to launched servers.
pub const HOST_ENV: &str = "HOST";

/// What one build-and-manage cycle left behind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleReport {
    /// A server built from the latest artifact is listening
    Updated { port: u16 },
    /// The build failed; whatever was running keeps running
    BuildFailed { message: String },
    /// The new artifact failed to start; the previous server is still up
    KeptPrevious { errors: Vec<String> },
    /// No server is running. Empty `errors` means the cause is unknown.
    Down { errors: Vec<String> },
}

pub struct DevSession {
    builder: Builder,
    manager: ServerManager,
    src_dir: PathBuf,
    bundle_dir: PathBuf,
    ignore: Vec<String>,
    debounce: Duration,
    shutdown: ShutdownCoordinator,
}

impl DevSession {
    pub fn new(
        config: &Config,
        work_dir: &Path,
        src_dir: &Path,
        shutdown: ShutdownCoordinator,
    ) -> Self {
        let launcher = Launcher::new(config.launcher.clone(), Arc::new(SystemPortQuery))
            .with_env(HOST_ENV, config.server.host.as_str());
        let bundle_dir = config.bundle_dir(work_dir);

        let mut ignore = config.build.ignore.clone();
        // Artifacts land in the bundle dir; never rebuild because of them
        if let Ok(relative) = bundle_dir.strip_prefix(src_dir) {
            ignore.push(relative.to_string_lossy().into_owned());
        }

        Self {
            builder: Builder::from_config(config, work_dir).with_src_dir(src_dir),
            manager: ServerManager::new(launcher, config.server.port, work_dir),
            src_dir: src_dir.to_path_buf(),
            bundle_dir,
            ignore,
            debounce: config.build.debounce(),
            shutdown,
        }
    }

    pub fn manager(&self) -> &ServerManager {
        &self.manager
    }

    pub fn bundle_dir(&self) -> &Path {
        &self.bundle_dir
    }

    /// Run until shutdown is requested, then close the manager.
    ///
    /// Shutdown is only observed between cycles; a cycle in flight always
    /// completes first.
    pub async fn run(&self) -> CliResult<()> {
        self.reset_bundle_dir().await?;

        let mut watcher = SourceWatcher::new(&self.src_dir, self.ignore.clone(), self.debounce)?;
        let mut shutdown = self.shutdown.subscribe_guard();

        self.cycle().await;

        while !shutdown.poll_shutdown() {
            tokio::select! {
                _ = shutdown.wait() => break,
                change = watcher.next_change() => match change {
                    Some(path) => {
                        info!("Change detected in {}, rebuilding", path.display());
                        self.cycle().await;
                    }
                    None => {
                        warn!("File watcher stopped");
                        break;
                    }
                },
            }
        }

        info!("Stopping the development server");
        self.manager.close().await?;
        info!("Development server stopped");

        Ok(())
    }

    /// Build once and hand the result to the manager, then report and clear
    /// the cycle's spawn errors.
    pub async fn cycle(&self) -> CycleReport {
        let output = match self.builder.build().await {
            Ok(output) => output,
            Err(e) => {
                error!("Failed to compile.\n{e}");
                info!("Keeping previous server instance running");
                return CycleReport::BuildFailed {
                    message: e.to_string(),
                };
            }
        };

        if let Err(e) = self.manager.manage(&output.bytes, &self.bundle_dir).await
            && e.spawn_error().is_none()
        {
            // Spawn failures are reported from the manager's error list
            error!("Failed to replace the server: {e}");
        }

        let report = self.report();
        self.manager.clear_spawn_errors();
        report
    }

    fn report(&self) -> CycleReport {
        let errors: Vec<String> = self
            .manager
            .last_spawn_errors()
            .iter()
            .map(|e| describe(e))
            .collect();

        if !self.manager.is_running() {
            if errors.is_empty() {
                error!("Server is not running because of an unknown error!");
            } else {
                error!("Server is not running, see errors:");
                errors.iter().for_each(|e| error!("{e}"));
            }
            return CycleReport::Down { errors };
        }

        if !errors.is_empty() {
            error!("Failed to spawn a new server for your backend, see errors:");
            errors.iter().for_each(|e| error!("{e}"));
            info!("Keeping previous server running.");
            return CycleReport::KeptPrevious { errors };
        }

        let port = self.manager.port().unwrap_or(self.manager.target_port());
        info!("Server is running at http://localhost:{port}");
        CycleReport::Updated { port }
    }

    async fn reset_bundle_dir(&self) -> CliResult<()> {
        match tokio::fs::remove_dir_all(&self.bundle_dir).await {
            Ok(()) => info!("Cleared {}", self.bundle_dir.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        Ok(())
    }
}

/// Message, hint and captured stderr of a spawn failure.
pub fn describe(error: &SpawnError) -> String {
    let mut text = format!("{error}\n{}", error.recovery_hint());
    let stderr = error.stderr().trim_end();
    if !stderr.is_empty() {
        text.push_str("\n\n");
        text.push_str(stderr);
    }
    text
}
