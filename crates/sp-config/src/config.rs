use crate::{
    BuildConfig, ConfigError, ConfigErrorResult, LauncherConfig, LoggingConfig, ServerConfig,
};

use std::path::{Path, PathBuf};

use log::info;
use serde::Deserialize;

/// Name of the optional project configuration file inside the work directory.
pub const CONFIG_FILENAME: &str = "spust.toml";

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub launcher: LauncherConfig,
    pub build: BuildConfig,
    pub logging: LoggingConfig,
}

impl Config {
    /// Load config for a project work directory.
    ///
    /// Loading order:
    /// 1. Load `<work_dir>/spust.toml` if it exists, else use defaults
    /// 2. Apply `PORT` and `SPUST_*` environment variable overrides
    ///
    /// Does NOT validate - call validate() after load().
    pub fn load(work_dir: &Path) -> ConfigErrorResult<Self> {
        let config_path = work_dir.join(CONFIG_FILENAME);

        let mut config = if config_path.exists() {
            Self::load_toml(&config_path)?
        } else {
            Config::default()
        };

        config.apply_env_overrides();

        Ok(config)
    }

    /// Load and parse TOML file with detailed error context.
    fn load_toml(path: &Path) -> ConfigErrorResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;

        toml::from_str(&contents).map_err(|e| ConfigError::Toml {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Validate all configuration.
    /// Call after load() to catch all errors at startup.
    pub fn validate(&self) -> ConfigErrorResult<()> {
        self.server.validate()?;
        self.launcher.validate()?;
        self.build.validate()?;

        if let Some(ref file) = self.logging.file
            && file.trim().is_empty()
        {
            return Err(ConfigError::logging("logging.file cannot be empty"));
        }

        Ok(())
    }

    /// Absolute path of the directory receiving managed artifact copies.
    pub fn bundle_dir(&self, work_dir: &Path) -> PathBuf {
        work_dir.join(&self.build.bundle_dir)
    }

    /// Absolute path of the executable produced by the build command.
    pub fn artifact_path(&self, work_dir: &Path) -> PathBuf {
        let artifact = Path::new(&self.build.artifact);
        if artifact.is_absolute() {
            artifact.to_path_buf()
        } else {
            work_dir.join(artifact)
        }
    }

    /// Log configuration summary.
    pub fn log_summary(&self) {
        info!("Configuration loaded:");
        info!("  server: {}:{}", self.server.host, self.server.port);
        info!(
            "  launcher: retries={}, poll={}ms, termination timeout={}s",
            self.launcher.retry_limit,
            self.launcher.poll_interval_ms,
            self.launcher.termination_timeout_secs
        );
        info!(
            "  build: `{}` -> {} (bundle: {}, debounce: {}ms)",
            self.build.command.join(" "),
            self.build.artifact,
            self.build.bundle_dir,
            self.build.debounce_ms
        );
        info!(
            "  logging: {} (colored: {})",
            *self.logging.level, self.logging.colored
        );
    }

    fn apply_env_overrides(&mut self) {
        let var = |name: &str| std::env::var(name).ok();

        if let Some(host) = var("SPUST_HOST") {
            self.server.host = host;
        }
        parse_into(var("PORT"), &mut self.server.port);

        parse_into(var("SPUST_RETRY_LIMIT"), &mut self.launcher.retry_limit);
        parse_into(var("SPUST_POLL_INTERVAL_MS"), &mut self.launcher.poll_interval_ms);
        parse_into(
            var("SPUST_TERMINATION_TIMEOUT_SECS"),
            &mut self.launcher.termination_timeout_secs,
        );

        if let Some(raw) = var("SPUST_BUILD_COMMAND") {
            self.build.command = BuildConfig::parse_command(&raw);
        }
        if let Some(artifact) = var("SPUST_ARTIFACT") {
            self.build.artifact = artifact;
        }
        if let Some(bundle_dir) = var("SPUST_BUNDLE_DIR") {
            self.build.bundle_dir = bundle_dir;
        }

        parse_into(var("SPUST_LOG_LEVEL"), &mut self.logging.level);
        if let Some(colored) = var("SPUST_LOG_COLORED") {
            self.logging.colored = matches!(colored.as_str(), "true" | "1");
        }
        if let Some(file) = var("SPUST_LOG_FILE") {
            self.logging.file = Some(file);
        }
    }
}

/// Overwrite `target` when `raw` is present and parses; otherwise keep it.
fn parse_into<T: std::str::FromStr>(raw: Option<String>, target: &mut T) {
    if let Some(parsed) = raw.and_then(|raw| raw.trim().parse().ok()) {
        *target = parsed;
    }
}
