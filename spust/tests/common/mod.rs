//! Helpers shared by the integration tests.

#![allow(dead_code)]

use sp_config::{Config, LauncherConfig};
use sp_process::{Launcher, ServerManager, SystemPortQuery};

use std::net::TcpListener as StdTcpListener;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

pub const DEMO_SERVER: &str = env!("CARGO_BIN_EXE_spust-demo-server");

pub const CRASHING_ARTIFACT: &str = "#!/bin/sh\necho starting\necho boom >&2\nexit 2\n";

/// A port nothing listens on right now.
pub fn free_port() -> u16 {
    let listener = StdTcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

/// Shell wrapper that execs the demo server answering with `body`.
pub fn demo_artifact(body: &str) -> String {
    format!("#!/bin/sh\nSPUST_DEMO_BODY='{body}' exec '{DEMO_SERVER}'\n")
}

/// Demo server that binds `bind_port` regardless of `PORT`.
pub fn wrong_port_artifact(bind_port: u16) -> String {
    format!("#!/bin/sh\nSPUST_DEMO_BIND_PORT={bind_port} exec '{DEMO_SERVER}'\n")
}

pub fn launcher_config() -> LauncherConfig {
    LauncherConfig {
        retry_limit: 100,
        poll_interval_ms: 50,
        termination_timeout_secs: 5,
    }
}

pub fn manager(work_dir: &Path, port: u16) -> ServerManager {
    let launcher = Launcher::new(launcher_config(), Arc::new(SystemPortQuery))
        .with_env("HOST", "127.0.0.1");
    ServerManager::new(launcher, port, work_dir)
}

/// Config whose build copies `next_server` over `server` in the work dir.
pub fn copy_build_config(port: u16) -> Config {
    let mut config = Config::default();
    config.server.port = port;
    config.launcher = launcher_config();
    config.build.command = ["cp", "next_server", "server"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    config.build.artifact = String::from("server");
    config.build.debounce_ms = 100;
    config
}

pub async fn get(port: u16) -> reqwest::Result<String> {
    reqwest::get(format!("http://127.0.0.1:{port}/"))
        .await?
        .text()
        .await
}

/// Poll `cond` every 50ms until it holds or `timeout` passes.
pub async fn eventually<F, Fut>(timeout: Duration, mut cond: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if cond().await {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}

pub fn port_is_free(port: u16) -> bool {
    StdTcpListener::bind(("127.0.0.1", port)).is_ok()
}

pub fn files_in(dir: &Path) -> Vec<PathBuf> {
    match std::fs::read_dir(dir) {
        Ok(entries) => entries.flatten().map(|e| e.path()).collect(),
        Err(_) => Vec::new(),
    }
}
