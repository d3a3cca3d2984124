use crate::{
    ConfigError, ConfigErrorResult, DEFAULT_ARTIFACT, DEFAULT_BUILD_COMMAND, DEFAULT_BUNDLE_DIR,
    DEFAULT_DEBOUNCE_MS, DEFAULT_IGNORE, MAX_DEBOUNCE_MS,
};

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

/// How the server artifact is produced and where managed copies live.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BuildConfig {
    /// Program and arguments run in the work directory for every build
    pub command: Vec<String>,
    /// Path of the produced server executable, relative to the work directory
    pub artifact: String,
    /// Directory (relative to the work directory) receiving managed artifact copies
    pub bundle_dir: String,
    /// Changes closer together than this collapse into one rebuild
    pub debounce_ms: u64,
    /// Path components under the source directory that never trigger a rebuild
    pub ignore: Vec<String>,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            command: DEFAULT_BUILD_COMMAND.iter().map(|s| s.to_string()).collect(),
            artifact: String::from(DEFAULT_ARTIFACT),
            bundle_dir: String::from(DEFAULT_BUNDLE_DIR),
            debounce_ms: DEFAULT_DEBOUNCE_MS,
            ignore: DEFAULT_IGNORE.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl BuildConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    /// Parse a whitespace separated command line (used for env overrides).
    pub fn parse_command(raw: &str) -> Vec<String> {
        raw.split_whitespace().map(String::from).collect()
    }

    pub fn validate(&self) -> ConfigErrorResult<()> {
        if self.command.is_empty() || self.command[0].trim().is_empty() {
            return Err(ConfigError::build("build.command cannot be empty"));
        }

        if self.artifact.trim().is_empty() {
            return Err(ConfigError::build("build.artifact cannot be empty"));
        }

        let bundle = Path::new(&self.bundle_dir);
        if self.bundle_dir.trim().is_empty() || bundle.is_absolute() || self.bundle_dir.contains("..")
        {
            return Err(ConfigError::build(
                "build.bundle_dir must be a non-empty relative path without '..'",
            ));
        }

        if self.debounce_ms > MAX_DEBOUNCE_MS {
            return Err(ConfigError::build(format!(
                "build.debounce_ms must be <= {}, got {}",
                MAX_DEBOUNCE_MS, self.debounce_ms
            )));
        }

        Ok(())
    }
}
