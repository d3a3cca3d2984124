//! Runs the project's build command and picks up the produced artifact.

use crate::error::{CliError, Result as CliResult};

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};

use log::{debug, info, warn};
use serde::Serialize;
use sp_config::Config;
use tokio::process::Command;

/// Environment variable telling the build command which source directory to build.
pub const SRC_DIR_ENV: &str = "SPUST_SRC_DIR";

/// Name of the summary written by `spust build --stats`.
pub const STATS_FILENAME: &str = "server.stats.json";

/// Output of one successful build.
#[derive(Debug)]
pub struct BuildOutput {
    pub artifact_path: PathBuf,
    pub bytes: Vec<u8>,
    pub duration: Duration,
}

impl BuildOutput {
    pub fn stats(&self) -> BuildStats {
        BuildStats {
            artifact: self.artifact_path.display().to_string(),
            size_bytes: self.bytes.len() as u64,
            duration_ms: self.duration.as_millis() as u64,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BuildStats {
    pub artifact: String,
    pub size_bytes: u64,
    pub duration_ms: u64,
}

pub struct Builder {
    command: Vec<String>,
    work_dir: PathBuf,
    artifact: PathBuf,
    src_dir: Option<PathBuf>,
}

impl Builder {
    pub fn new(command: Vec<String>, work_dir: impl Into<PathBuf>, artifact: PathBuf) -> Self {
        Self {
            command,
            work_dir: work_dir.into(),
            artifact,
            src_dir: None,
        }
    }

    /// Export `src_dir` to the build command as `SPUST_SRC_DIR`.
    pub fn with_src_dir(mut self, src_dir: impl Into<PathBuf>) -> Self {
        self.src_dir = Some(src_dir.into());
        self
    }

    pub fn from_config(config: &Config, work_dir: &Path) -> Self {
        Self::new(
            config.build.command.clone(),
            work_dir,
            config.artifact_path(work_dir),
        )
    }

    pub fn artifact_path(&self) -> &Path {
        &self.artifact
    }

    /// Run the build command in the work directory and read the artifact.
    ///
    /// A failing command or a missing artifact is a [`CliError::Build`]
    /// carrying the tail of the command's stderr.
    pub async fn build(&self) -> CliResult<BuildOutput> {
        let Some((program, args)) = self.command.split_first() else {
            return Err(CliError::build("build command is empty"));
        };

        info!("Building: {}", self.command.join(" "));
        let started = Instant::now();

        let mut command = Command::new(program);
        command
            .args(args)
            .current_dir(&self.work_dir)
            .stdin(Stdio::null());
        if let Some(src_dir) = &self.src_dir {
            command.env(SRC_DIR_ENV, src_dir);
        }

        let output = command
            .output()
            .await
            .map_err(|e| CliError::build(format!("cannot run `{program}`: {e}")))?;

        let stderr = String::from_utf8_lossy(&output.stderr);
        for line in String::from_utf8_lossy(&output.stdout).lines() {
            debug!("[build] {line}");
        }

        if !output.status.success() {
            for line in stderr.lines() {
                warn!("[build] {line}");
            }
            return Err(CliError::build(format!(
                "`{}` exited with {}\n{}",
                self.command.join(" "),
                output.status,
                tail(&stderr, 20)
            )));
        }

        let bytes = tokio::fs::read(&self.artifact).await.map_err(|e| {
            CliError::build(format!(
                "artifact {} is not readable: {e}",
                self.artifact.display()
            ))
        })?;

        let duration = started.elapsed();
        info!(
            "Built {} ({} bytes) in {}",
            self.artifact.display(),
            bytes.len(),
            humantime::format_duration(Duration::from_millis(duration.as_millis() as u64))
        );

        Ok(BuildOutput {
            artifact_path: self.artifact.clone(),
            bytes,
            duration,
        })
    }
}

/// Write `stats` as pretty JSON into `dir`, returning the file path.
pub async fn write_stats(dir: &Path, stats: &BuildStats) -> CliResult<PathBuf> {
    let path = dir.join(STATS_FILENAME);
    let json = serde_json::to_string_pretty(stats)
        .map_err(|e| CliError::build(format!("cannot serialize build stats: {e}")))?;
    tokio::fs::write(&path, json).await?;
    Ok(path)
}

/// The last `lines` lines of `text`.
fn tail(text: &str, lines: usize) -> String {
    let all: Vec<&str> = text.lines().collect();
    all[all.len().saturating_sub(lines)..].join("\n")
}
