//! Which processes own a local port.
//!
//! Every failure (missing tool, unreadable `/proc`, unparsable output) is
//! reported as "nothing bound" so the launcher simply keeps waiting.

use std::collections::BTreeSet;

use async_trait::async_trait;
#[cfg(not(target_os = "linux"))]
use log::debug;

/// Pids owning a port, split by protocol.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PortOwners {
    pub tcp: BTreeSet<u32>,
    pub udp: BTreeSet<u32>,
}

impl PortOwners {
    pub fn all(&self) -> BTreeSet<u32> {
        self.tcp.union(&self.udp).copied().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.tcp.is_empty() && self.udp.is_empty()
    }
}

#[async_trait]
pub trait PortQuery: Send + Sync {
    async fn query_port(&self, port: u16) -> PortOwners;
}

/// Asks the operating system.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemPortQuery;

#[async_trait]
impl PortQuery for SystemPortQuery {
    #[cfg(target_os = "linux")]
    async fn query_port(&self, port: u16) -> PortOwners {
        tokio::task::spawn_blocking(move || procfs::query(port))
            .await
            .unwrap_or_default()
    }

    #[cfg(all(unix, not(target_os = "linux")))]
    async fn query_port(&self, port: u16) -> PortOwners {
        let output = tokio::process::Command::new("lsof")
            .args(["-n", "-P", "-i", &format!(":{port}")])
            .output()
            .await;

        match output {
            Ok(output) => parse_lsof(&String::from_utf8_lossy(&output.stdout), port),
            Err(e) => {
                debug!("lsof unavailable: {e}");
                PortOwners::default()
            }
        }
    }

    #[cfg(windows)]
    async fn query_port(&self, port: u16) -> PortOwners {
        let output = tokio::process::Command::new("netstat")
            .args(["-a", "-n", "-o"])
            .output()
            .await;

        match output {
            Ok(output) => parse_netstat(&String::from_utf8_lossy(&output.stdout), port),
            Err(e) => {
                debug!("netstat unavailable: {e}");
                PortOwners::default()
            }
        }
    }
}

/// Socket inodes bound to `port` in a `/proc/net/{tcp,tcp6,udp,udp6}` table.
///
/// TCP sockets only count while in LISTEN state; any UDP socket counts.
pub fn parse_proc_net(table: &str, port: u16, tcp: bool) -> Vec<u64> {
    const TCP_LISTEN: &str = "0A";

    table
        .lines()
        .skip(1)
        .filter_map(|line| {
            let fields: Vec<&str> = line.split_whitespace().collect();
            if fields.len() < 10 {
                return None;
            }

            let (_, local_port) = fields[1].rsplit_once(':')?;
            if u16::from_str_radix(local_port, 16).ok()? != port {
                return None;
            }
            if tcp && fields[3] != TCP_LISTEN {
                return None;
            }

            fields[9].parse().ok().filter(|inode| *inode != 0)
        })
        .collect()
}

/// Owners of `port` in `lsof -n -P -i :<port>` output.
pub fn parse_lsof(output: &str, port: u16) -> PortOwners {
    let mut owners = PortOwners::default();
    let suffix = format!(":{port}");

    for line in output.lines().skip(1) {
        let fields: Vec<&str> = line.split_whitespace().collect();
        // COMMAND PID USER FD TYPE DEVICE SIZE/OFF NODE NAME [STATE]
        if fields.len() < 9 {
            continue;
        }
        let Ok(pid) = fields[1].parse::<u32>() else {
            continue;
        };

        let local = fields[8].split("->").next().unwrap_or_default();
        if !local.ends_with(&suffix) {
            continue;
        }

        match fields[7] {
            "TCP" if line.contains("(LISTEN)") => {
                owners.tcp.insert(pid);
            }
            "UDP" => {
                owners.udp.insert(pid);
            }
            _ => {}
        }
    }

    owners
}

/// Owners of `port` in `netstat -a -n -o` output.
pub fn parse_netstat(output: &str, port: u16) -> PortOwners {
    let mut owners = PortOwners::default();
    let suffix = format!(":{port}");

    for line in output.lines() {
        let fields: Vec<&str> = line.split_whitespace().collect();
        let Some(protocol) = fields.first() else {
            continue;
        };

        match (protocol.to_ascii_uppercase().as_str(), fields.as_slice()) {
            ("TCP", [_, local, _, state, pid]) if local.ends_with(&suffix) && *state == "LISTENING" => {
                if let Ok(pid) = pid.parse() {
                    owners.tcp.insert(pid);
                }
            }
            ("UDP", [_, local, _, pid]) if local.ends_with(&suffix) => {
                if let Ok(pid) = pid.parse() {
                    owners.udp.insert(pid);
                }
            }
            _ => {}
        }
    }

    owners
}

#[cfg(target_os = "linux")]
mod procfs {
    use super::{PortOwners, parse_proc_net};

    use std::collections::HashMap;
    use std::fs;

    use log::debug;

    #[derive(Clone, Copy)]
    enum Protocol {
        Tcp,
        Udp,
    }

    pub(super) fn query(port: u16) -> PortOwners {
        let mut inodes: HashMap<u64, Protocol> = HashMap::new();

        for (table, protocol) in [
            ("/proc/net/tcp", Protocol::Tcp),
            ("/proc/net/tcp6", Protocol::Tcp),
            ("/proc/net/udp", Protocol::Udp),
            ("/proc/net/udp6", Protocol::Udp),
        ] {
            let Ok(contents) = fs::read_to_string(table) else {
                debug!("Cannot read {table}");
                continue;
            };
            let tcp = matches!(protocol, Protocol::Tcp);
            for inode in parse_proc_net(&contents, port, tcp) {
                inodes.insert(inode, protocol);
            }
        }

        let mut owners = PortOwners::default();
        if inodes.is_empty() {
            return owners;
        }

        let Ok(processes) = fs::read_dir("/proc") else {
            return owners;
        };

        for entry in processes.flatten() {
            let Some(pid) = entry.file_name().to_str().and_then(|n| n.parse::<u32>().ok()) else {
                continue;
            };
            // Other users' fds are unreadable; skip them
            let Ok(fds) = fs::read_dir(entry.path().join("fd")) else {
                continue;
            };

            for fd in fds.flatten() {
                let Ok(target) = fs::read_link(fd.path()) else {
                    continue;
                };
                let Some(inode) = socket_inode(&target.to_string_lossy()) else {
                    continue;
                };

                match inodes.get(&inode) {
                    Some(Protocol::Tcp) => {
                        owners.tcp.insert(pid);
                    }
                    Some(Protocol::Udp) => {
                        owners.udp.insert(pid);
                    }
                    None => {}
                }
            }
        }

        owners
    }

    /// `socket:[12345]` -> 12345
    pub(super) fn socket_inode(link: &str) -> Option<u64> {
        link.strip_prefix("socket:[")?.strip_suffix(']')?.parse().ok()
    }
}
