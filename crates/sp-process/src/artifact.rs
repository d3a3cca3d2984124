use crate::{ProcessError, ProcessResult};

use std::panic::Location;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use error_location::ErrorLocation;
use log::{debug, warn};

/// A compiled server executable persisted in the bundle directory.
#[derive(Debug, Clone)]
pub struct CompiledArtifact {
    path: PathBuf,
    generation: u64,
    created_at: DateTime<Utc>,
    on_disk: bool,
}

impl CompiledArtifact {
    /// Write `bytes` to a fresh `server.<millis>.<generation>` file in `bundle_dir`.
    pub async fn persist(bundle_dir: &Path, bytes: &[u8], generation: u64) -> ProcessResult<Self> {
        let created_at = Utc::now();
        let path = bundle_dir.join(file_name(created_at, generation));

        let artifact_err = |source| ProcessError::Artifact {
            path: path.clone(),
            source,
            location: ErrorLocation::from(Location::caller()),
        };

        tokio::fs::create_dir_all(bundle_dir)
            .await
            .map_err(artifact_err)?;
        tokio::fs::write(&path, bytes).await.map_err(artifact_err)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            tokio::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755))
                .await
                .map_err(artifact_err)?;
        }

        debug!("Persisted artifact {} ({} bytes)", path.display(), bytes.len());

        Ok(Self {
            path,
            generation,
            created_at,
            on_disk: true,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn is_on_disk(&self) -> bool {
        self.on_disk
    }

    /// Delete the file. A file that is already gone is not an error.
    pub async fn remove(&mut self) -> ProcessResult<()> {
        if !self.on_disk {
            return Ok(());
        }

        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => debug!("Removed artifact {}", self.path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(source) => {
                return Err(ProcessError::Artifact {
                    path: self.path.clone(),
                    source,
                    location: ErrorLocation::from(Location::caller()),
                });
            }
        }

        self.on_disk = false;
        Ok(())
    }

    /// Remove, logging instead of failing.
    pub(crate) async fn discard(&mut self) {
        if let Err(e) = self.remove().await {
            warn!("Failed to remove artifact: {e}");
        }
    }
}

fn file_name(created_at: DateTime<Utc>, generation: u64) -> String {
    let millis = created_at.timestamp_millis();
    if cfg!(windows) {
        format!("server.{millis}.{generation}.exe")
    } else {
        format!("server.{millis}.{generation}")
    }
}
