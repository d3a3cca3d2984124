use crate::{
    ConfigError, ConfigErrorResult, DEFAULT_POLL_INTERVAL_MS, DEFAULT_RETRY_LIMIT,
    DEFAULT_TERMINATION_TIMEOUT_SECS, MAX_POLL_INTERVAL_MS, MAX_RETRY_LIMIT,
    MAX_TERMINATION_TIMEOUT_SECS, MIN_POLL_INTERVAL_MS, MIN_RETRY_LIMIT,
    MIN_TERMINATION_TIMEOUT_SECS,
};

use std::time::Duration;

use serde::Deserialize;

/// Handshake polling and termination settings for spawned servers.
///
/// The handshake gives up after `retry_limit * poll_interval_ms`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LauncherConfig {
    /// Number of port-ownership polls before the handshake times out
    pub retry_limit: u32,
    /// Delay between two port-ownership polls in milliseconds
    pub poll_interval_ms: u64,
    /// Grace period between the termination signal and the forced kill
    pub termination_timeout_secs: u64,
}

impl Default for LauncherConfig {
    fn default() -> Self {
        Self {
            retry_limit: DEFAULT_RETRY_LIMIT,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            termination_timeout_secs: DEFAULT_TERMINATION_TIMEOUT_SECS,
        }
    }
}

impl LauncherConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn termination_timeout(&self) -> Duration {
        Duration::from_secs(self.termination_timeout_secs)
    }

    pub fn validate(&self) -> ConfigErrorResult<()> {
        if self.retry_limit < MIN_RETRY_LIMIT || self.retry_limit > MAX_RETRY_LIMIT {
            return Err(ConfigError::launcher(format!(
                "launcher.retry_limit must be {}-{}, got {}",
                MIN_RETRY_LIMIT, MAX_RETRY_LIMIT, self.retry_limit
            )));
        }

        if self.poll_interval_ms < MIN_POLL_INTERVAL_MS
            || self.poll_interval_ms > MAX_POLL_INTERVAL_MS
        {
            return Err(ConfigError::launcher(format!(
                "launcher.poll_interval_ms must be {}-{}, got {}",
                MIN_POLL_INTERVAL_MS, MAX_POLL_INTERVAL_MS, self.poll_interval_ms
            )));
        }

        if self.termination_timeout_secs < MIN_TERMINATION_TIMEOUT_SECS
            || self.termination_timeout_secs > MAX_TERMINATION_TIMEOUT_SECS
        {
            return Err(ConfigError::launcher(format!(
                "launcher.termination_timeout_secs must be {}-{}, got {}",
                MIN_TERMINATION_TIMEOUT_SECS,
                MAX_TERMINATION_TIMEOUT_SECS,
                self.termination_timeout_secs
            )));
        }

        Ok(())
    }
}
