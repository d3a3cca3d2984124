mod captured_output;


use crate::{PortOwners, PortQuery, is_process_running};

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use sp_config::LauncherConfig;

pub(crate) const TEST_PORT: u16 = 39_123;

/// Writes its pid where [`PidFileOwner`] looks, then stays alive.
pub(crate) const LISTENING_SCRIPT: &str = "#!/bin/sh\necho $$ > owner.pid\nexec sleep 30\n";

/// Never reports itself as listening.
pub(crate) const SILENT_SCRIPT: &str = "#!/bin/sh\necho $$ > silent.pid\nexec sleep 30\n";

pub(crate) const CRASHING_SCRIPT: &str = "#!/bin/sh\necho starting\necho boom >&2\nexit 2\n";

pub(crate) const FINISHING_SCRIPT: &str = "#!/bin/sh\necho done\nexit 0\n";

pub(crate) fn fast_config(retry_limit: u32) -> LauncherConfig {
    LauncherConfig {
        retry_limit,
        poll_interval_ms: 50,
        termination_timeout_secs: 2,
    }
}

#[cfg(unix)]
pub(crate) fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join(name);
    std::fs::write(&path, body).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

pub(crate) fn read_pid(path: &Path) -> Option<u32> {
    std::fs::read_to_string(path).ok()?.trim().parse().ok()
}

/// Nothing ever listens.
pub(crate) struct Unbound;

#[async_trait]
impl PortQuery for Unbound {
    async fn query_port(&self, _port: u16) -> PortOwners {
        PortOwners::default()
    }
}

/// Some other process always owns the port.
pub(crate) struct ForeignOwner(pub u32);

#[async_trait]
impl PortQuery for ForeignOwner {
    async fn query_port(&self, _port: u16) -> PortOwners {
        let mut owners = PortOwners::default();
        owners.tcp.insert(self.0);
        owners
    }
}

/// The live process whose pid is in `<dir>/owner.pid` owns the port.
pub(crate) struct PidFileOwner(pub PathBuf);

#[async_trait]
impl PortQuery for PidFileOwner {
    async fn query_port(&self, _port: u16) -> PortOwners {
        let mut owners = PortOwners::default();
        if let Some(pid) = read_pid(&self.0.join("owner.pid"))
            && is_process_running(pid)
        {
            owners.tcp.insert(pid);
        }
        owners
    }
}

pub(crate) fn files_in(dir: &Path) -> Vec<PathBuf> {
    match std::fs::read_dir(dir) {
        Ok(entries) => entries.flatten().map(|e| e.path()).collect(),
        Err(_) => Vec::new(),
    }
}
