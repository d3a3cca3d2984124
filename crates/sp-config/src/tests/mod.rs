mod build;

use std::env;

use tempfile::TempDir;

const OVERRIDE_VARS: &[&str] = &[
    "PORT",
    "SPUST_HOST",
    "SPUST_RETRY_LIMIT",
    "SPUST_POLL_INTERVAL_MS",
    "SPUST_TERMINATION_TIMEOUT_SECS",
    "SPUST_BUILD_COMMAND",
    "SPUST_ARTIFACT",
    "SPUST_BUNDLE_DIR",
    "SPUST_LOG_LEVEL",
    "SPUST_LOG_COLORED",
    "SPUST_LOG_FILE",
];

/// RAII guard for environment variables - automatically restores on drop
pub(crate) struct EnvGuard {
    key: &'static str,
    original: Option<String>,
}

impl EnvGuard {
    pub(crate) fn set(key: &'static str, value: &str) -> Self {
        unsafe {
            let original = env::var(key).ok();
            env::set_var(key, value);
            Self { key, original }
        }
    }

    pub(crate) fn remove(key: &'static str) -> Self {
        unsafe {
            let original = env::var(key).ok();
            env::remove_var(key);
            Self { key, original }
        }
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        unsafe {
            match &self.original {
                Some(val) => env::set_var(self.key, val),
                None => env::remove_var(self.key),
            }
        }
    }
}

/// Create a temp work directory with every override variable cleared
pub(crate) fn setup_work_dir() -> (TempDir, Vec<EnvGuard>) {
    let temp = TempDir::new().unwrap();
    let guards = OVERRIDE_VARS.iter().map(|key| EnvGuard::remove(key)).collect();
    (temp, guards)
}
