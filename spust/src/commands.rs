use crate::builder::{Builder, write_stats};
use crate::error::{CliError, Result as CliResult};
use crate::{DevSession, ShutdownCoordinator};

use std::path::{Path, PathBuf};

use log::info;
use sp_config::Config;

/// `spust build`: one build, optionally summarized as JSON.
pub async fn build(config: &Config, work_dir: &Path, src_dir: &Path, stats: bool) -> CliResult<()> {
    let src_dir = resolve_src_dir(work_dir, src_dir)?;

    let output = Builder::from_config(config, work_dir)
        .with_src_dir(src_dir)
        .build()
        .await?;
    println!("Successfully built {}", output.artifact_path.display());

    if stats {
        let stats = output.stats();
        let json = serde_json::to_string_pretty(&stats)
            .map_err(|e| CliError::build(format!("cannot serialize build stats: {e}")))?;
        println!("{json}");

        let path = write_stats(work_dir, &stats).await?;
        println!("Build stats written to {}", path.display());
    }

    Ok(())
}

/// `spust start`: serve and rebuild until SIGINT or SIGTERM.
pub async fn start(config: &Config, work_dir: &Path, src_dir: &Path) -> CliResult<()> {
    let src_dir = resolve_src_dir(work_dir, src_dir)?;

    let shutdown = ShutdownCoordinator::new();
    shutdown.listen_for_signals()?;

    let session = DevSession::new(config, work_dir, &src_dir, shutdown);
    info!("Starting the development server on port {}", config.server.port);
    session.run().await
}

fn resolve_src_dir(work_dir: &Path, src_dir: &Path) -> CliResult<PathBuf> {
    let resolved = work_dir.join(src_dir);
    if !resolved.is_dir() {
        return Err(CliError::build(format!(
            "source directory {} does not exist",
            resolved.display()
        )));
    }
    Ok(resolved)
}
