//! Launches an artifact and confirms it listens on the expected port.
//!
//! The child is started exactly once. Readiness is established by polling
//! port ownership every `poll_interval`, up to `retry_limit` times, while
//! also watching for the child's exit and its handshake line.

use crate::captured_output::{CapturedOutput, OutputCapture};
use crate::terminate::belongs_to;
use crate::{ManagedServer, PortOwners, PortQuery, SpawnError};

use std::panic::Location;
use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use error_location::ErrorLocation;
use log::{debug, info, warn};
use sp_config::LauncherConfig;
use sp_listener::{HANDSHAKE_ADDR_ENV, HandshakeMessage, PORT_ENV};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::net::TcpListener;
use tokio::process::Command;

/// Longest handshake line accepted from a child.
const MAX_HANDSHAKE_LINE: u64 = 1024;

pub struct Launcher {
    config: LauncherConfig,
    port_query: Arc<dyn PortQuery>,
    envs: Vec<(String, String)>,
    next_id: AtomicU64,
}

enum Ownership {
    Unbound,
    Child,
    Foreign(u32),
}

impl Launcher {
    pub fn new(config: LauncherConfig, port_query: Arc<dyn PortQuery>) -> Self {
        Self {
            config,
            port_query,
            envs: Vec::new(),
            next_id: AtomicU64::new(1),
        }
    }

    /// Extra environment passed to every launched server.
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }

    pub fn config(&self) -> &LauncherConfig {
        &self.config
    }

    /// Start `artifact` in `working_dir` and wait until it owns `expected_port`.
    ///
    /// Failures that leave the child alive terminate it before returning.
    pub async fn spawn(
        &self,
        artifact: &Path,
        working_dir: &Path,
        expected_port: u16,
    ) -> Result<ManagedServer, SpawnError> {
        let launch_err = |source| SpawnError::Launch {
            path: artifact.to_path_buf(),
            source,
            location: ErrorLocation::from(Location::caller()),
        };

        let handshake = TcpListener::bind(("127.0.0.1", 0))
            .await
            .map_err(launch_err)?;
        let handshake_addr = handshake.local_addr().map_err(launch_err)?;

        let mut command = Command::new(artifact);
        command
            .current_dir(working_dir)
            .envs(self.envs.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .env(PORT_ENV, expected_port.to_string())
            .env(HANDSHAKE_ADDR_ENV, handshake_addr.to_string())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        // Own process group so termination reaches the whole tree
        #[cfg(unix)]
        command.process_group(0);

        #[cfg(windows)]
        {
            const CREATE_NEW_PROCESS_GROUP: u32 = 0x0000_0200;
            command.creation_flags(CREATE_NEW_PROCESS_GROUP);
        }

        let mut child = command.spawn().map_err(launch_err)?;
        let Some(pid) = child.id() else {
            return Err(launch_err(std::io::Error::other(
                "process exited before its pid was read",
            )));
        };

        info!("Spawned server {} with PID: {pid}", artifact.display());

        let output = OutputCapture::attach(pid, child.stdout.take(), child.stderr.take());
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let mut server = ManagedServer::start(id, pid, child, artifact.to_path_buf(), output);

        let interval = self.config.poll_interval();
        let handshake_line = read_handshake(handshake);
        tokio::pin!(handshake_line);
        let mut handshake_open = true;

        for attempt in 1..=self.config.retry_limit {
            match ownership(&self.port_query.query_port(expected_port).await, pid) {
                Ownership::Unbound => {
                    debug!("Attempt {attempt}: nothing listening on port {expected_port} yet");
                }
                Ownership::Child => {
                    return Ok(self.confirm(server, expected_port));
                }
                Ownership::Foreign(owner) => {
                    let output = self.abort(&mut server).await;
                    return Err(SpawnError::PortConflict {
                        port: expected_port,
                        pid: owner,
                        output,
                        location: ErrorLocation::from(Location::caller()),
                    });
                }
            }

            tokio::select! {
                _ = server.wait_for_exit() => {
                    let (exit, output) = server.finish().await;
                    return Err(if exit.success() {
                        SpawnError::UnexpectedExit {
                            output,
                            location: ErrorLocation::from(Location::caller()),
                        }
                    } else {
                        SpawnError::CrashNonZero {
                            exit,
                            output,
                            location: ErrorLocation::from(Location::caller()),
                        }
                    });
                }
                line = &mut handshake_line, if handshake_open => match line {
                    Ok(line) => match HandshakeMessage::parse(&line) {
                        HandshakeMessage::Listening => {
                            return Ok(self.confirm(server, expected_port));
                        }
                        message => {
                            let output = self.abort(&mut server).await;
                            return Err(SpawnError::ProtocolViolation {
                                message: message.to_string(),
                                output,
                                location: ErrorLocation::from(Location::caller()),
                            });
                        }
                    },
                    Err(e) => {
                        debug!("Handshake channel closed without a message: {e}");
                        handshake_open = false;
                    }
                },
                _ = tokio::time::sleep(interval) => {}
            }
        }

        let output = self.abort(&mut server).await;
        Err(SpawnError::HandshakeTimeout {
            port: expected_port,
            attempts: self.config.retry_limit,
            output,
            location: ErrorLocation::from(Location::caller()),
        })
    }

    fn confirm(&self, mut server: ManagedServer, port: u16) -> ManagedServer {
        server.mark_listening(port);
        info!("Server (pid {}) is listening on port {port}", server.pid());
        server
    }

    /// Terminate a child that failed the handshake and collect its output.
    async fn abort(&self, server: &mut ManagedServer) -> CapturedOutput {
        if let Err(e) = server.shutdown(self.config.termination_timeout()).await {
            warn!("Failed to terminate server (pid {}): {e}", server.pid());
            return server.output();
        }
        server.finish().await.1
    }
}

fn ownership(owners: &PortOwners, child: u32) -> Ownership {
    let all = owners.all();

    if all.iter().any(|owner| belongs_to(*owner, child)) {
        return Ownership::Child;
    }

    match all.into_iter().next() {
        Some(foreign) => Ownership::Foreign(foreign),
        None => Ownership::Unbound,
    }
}

/// Accept one connection on the handshake listener and read one line.
async fn read_handshake(listener: TcpListener) -> std::io::Result<String> {
    let (stream, peer) = listener.accept().await?;
    debug!("Handshake connection from {peer}");

    let mut line = String::new();
    let read = BufReader::new(stream)
        .take(MAX_HANDSHAKE_LINE)
        .read_line(&mut line)
        .await?;

    if read == 0 {
        return Err(std::io::Error::new(
            std::io::ErrorKind::UnexpectedEof,
            "handshake connection closed before a message",
        ));
    }

    Ok(line)
}
