//! One-line readiness report from a managed server back to its launcher.

use crate::{ListenerError, ListenerResult};

use std::fmt;
use std::panic::Location;

use error_location::ErrorLocation;
use log::{debug, warn};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;

/// Loopback address of the launcher's handshake listener.
pub const HANDSHAKE_ADDR_ENV: &str = "SPUST_HANDSHAKE_ADDR";

/// Port the launcher expects the server to bind.
pub const PORT_ENV: &str = "PORT";

/// The only message the launcher accepts as a successful handshake.
pub const LISTENING_MESSAGE: &str = "spust: server listening";

const WRONG_PORT_PREFIX: &str = "spust: server is listening on port ";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandshakeMessage {
    /// Bound on the expected port
    Listening,
    /// Bound, but not where the launcher is watching
    WrongPort { actual: u16, expected: u16 },
    /// Anything else a server might write
    Other(String),
}

impl HandshakeMessage {
    /// Build the message a server bound on `bound` should send.
    pub fn for_ports(bound: u16, expected: u16) -> Self {
        if bound == expected {
            Self::Listening
        } else {
            Self::WrongPort {
                actual: bound,
                expected,
            }
        }
    }

    /// Parse one received line. Never fails: unknown text becomes `Other`.
    pub fn parse(line: &str) -> Self {
        let line = line.trim_end_matches(['\r', '\n']);

        if line == LISTENING_MESSAGE {
            return Self::Listening;
        }

        if let Some(rest) = line.strip_prefix(WRONG_PORT_PREFIX)
            && let Some((actual, expected)) = rest.split_once(" and not ")
            && let (Ok(actual), Ok(expected)) = (actual.parse(), expected.parse())
        {
            return Self::WrongPort { actual, expected };
        }

        Self::Other(line.to_string())
    }

    pub fn is_listening(&self) -> bool {
        matches!(self, Self::Listening)
    }
}

impl fmt::Display for HandshakeMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Listening => f.write_str(LISTENING_MESSAGE),
            Self::WrongPort { actual, expected } => {
                write!(f, "{WRONG_PORT_PREFIX}{actual} and not {expected}")
            }
            Self::Other(text) => f.write_str(text),
        }
    }
}

/// Port from `PORT`, if set and numeric.
pub fn expected_port() -> Option<u16> {
    std::env::var(PORT_ENV).ok()?.trim().parse().ok()
}

/// Write `message` as a single line to the launcher at `addr`.
pub async fn send_handshake(addr: &str, message: &HandshakeMessage) -> ListenerResult<()> {
    let handshake_err = |source| ListenerError::Handshake {
        addr: addr.to_string(),
        source,
        location: ErrorLocation::from(Location::caller()),
    };

    let mut stream = TcpStream::connect(addr).await.map_err(handshake_err)?;
    let line = format!("{message}\n");
    stream
        .write_all(line.as_bytes())
        .await
        .map_err(handshake_err)?;
    stream.flush().await.map_err(handshake_err)?;
    stream.shutdown().await.map_err(handshake_err)?;

    debug!("Handshake sent to {addr}: {message}");
    Ok(())
}

/// Tell the launcher this server is bound on `bound_port`.
///
/// Returns `Ok(false)` without doing anything when the process was not
/// started by a launcher.
pub async fn notify_listening(bound_port: u16) -> ListenerResult<bool> {
    let Ok(addr) = std::env::var(HANDSHAKE_ADDR_ENV) else {
        return Ok(false);
    };

    let message = match expected_port() {
        Some(expected) => HandshakeMessage::for_ports(bound_port, expected),
        None => {
            warn!("{HANDSHAKE_ADDR_ENV} is set but {PORT_ENV} is not; reporting as listening");
            HandshakeMessage::Listening
        }
    };

    send_handshake(&addr, &message).await?;
    Ok(true)
}
