mod cli;


use sp_config::Config;

use std::path::Path;

/// Defaults with a shell build command producing `artifact` in the work dir.
pub(crate) fn shell_build_config(script: &str, artifact: &str) -> Config {
    let mut config = Config::default();
    config.build.command = vec![String::from("sh"), String::from("-c"), String::from(script)];
    config.build.artifact = String::from(artifact);
    config.launcher.retry_limit = 20;
    config.launcher.poll_interval_ms = 50;
    config.launcher.termination_timeout_secs = 2;
    config
}

pub(crate) fn touch(path: &Path, contents: &str) {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(path, contents).unwrap();
}
