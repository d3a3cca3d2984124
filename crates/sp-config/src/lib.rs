mod build_config;
mod config;
mod error;
mod launcher_config;
mod log_level;
mod logging_config;
mod server_config;

#[cfg(test)]
mod tests;

pub use build_config::BuildConfig;
pub use config::{CONFIG_FILENAME, Config};
pub use error::{ConfigError, ConfigErrorResult};
pub use launcher_config::LauncherConfig;
pub use log_level::LogLevel;
pub use logging_config::LoggingConfig;
pub use server_config::ServerConfig;

const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 3000;
const MIN_PORT: u16 = 1024;

const DEFAULT_RETRY_LIMIT: u32 = 10;
const MIN_RETRY_LIMIT: u32 = 1;
const MAX_RETRY_LIMIT: u32 = 600;

const DEFAULT_POLL_INTERVAL_MS: u64 = 1000;
const MIN_POLL_INTERVAL_MS: u64 = 10;
const MAX_POLL_INTERVAL_MS: u64 = 60_000;

const DEFAULT_TERMINATION_TIMEOUT_SECS: u64 = 30;
const MIN_TERMINATION_TIMEOUT_SECS: u64 = 1;
const MAX_TERMINATION_TIMEOUT_SECS: u64 = 600;

const DEFAULT_BUILD_COMMAND: &[&str] = &["cargo", "build"];
const DEFAULT_ARTIFACT: &str = "target/debug/server";
const DEFAULT_BUNDLE_DIR: &str = "bundle";
const DEFAULT_DEBOUNCE_MS: u64 = 200;
const MAX_DEBOUNCE_MS: u64 = 10_000;
const DEFAULT_IGNORE: &[&str] = &["target", "bundle", ".git"];

const DEFAULT_LOG_LEVEL: log::LevelFilter = log::LevelFilter::Info;
const DEFAULT_LOG_COLORED: bool = true;
