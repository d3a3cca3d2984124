use crate::{CapturedOutput, ProcessExit};

use std::panic::Location;
use std::path::PathBuf;
use std::sync::Arc;

use error_location::ErrorLocation;
use thiserror::Error;

/// Why a launched artifact never became a listening server.
#[derive(Error, Debug)]
pub enum SpawnError {
    #[error("Server exited with {exit} {location}")]
    CrashNonZero {
        exit: ProcessExit,
        output: CapturedOutput,
        location: ErrorLocation,
    },

    #[error("Unexpected server termination: exited with code 0 before listening {location}")]
    UnexpectedExit {
        output: CapturedOutput,
        location: ErrorLocation,
    },

    #[error("Unknown process (pid {pid}) is listening on port {port} {location}")]
    PortConflict {
        port: u16,
        pid: u32,
        output: CapturedOutput,
        location: ErrorLocation,
    },

    #[error("Server is not listening on port {port} after {attempts} attempts {location}")]
    HandshakeTimeout {
        port: u16,
        attempts: u32,
        output: CapturedOutput,
        location: ErrorLocation,
    },

    #[error("Unexpected handshake message: {message} {location}")]
    ProtocolViolation {
        message: String,
        output: CapturedOutput,
        location: ErrorLocation,
    },

    #[error("Failed to launch {path}: {source} {location}")]
    Launch {
        path: PathBuf,
        #[source]
        source: std::io::Error,
        location: ErrorLocation,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpawnErrorKind {
    CrashNonZero,
    UnexpectedExit,
    PortConflict,
    HandshakeTimeout,
    ProtocolViolation,
    Launch,
}

impl SpawnError {
    pub fn kind(&self) -> SpawnErrorKind {
        match self {
            Self::CrashNonZero { .. } => SpawnErrorKind::CrashNonZero,
            Self::UnexpectedExit { .. } => SpawnErrorKind::UnexpectedExit,
            Self::PortConflict { .. } => SpawnErrorKind::PortConflict,
            Self::HandshakeTimeout { .. } => SpawnErrorKind::HandshakeTimeout,
            Self::ProtocolViolation { .. } => SpawnErrorKind::ProtocolViolation,
            Self::Launch { .. } => SpawnErrorKind::Launch,
        }
    }

    /// Everything the child wrote before it failed, if it ever ran.
    pub fn output(&self) -> Option<&CapturedOutput> {
        match self {
            Self::CrashNonZero { output, .. }
            | Self::UnexpectedExit { output, .. }
            | Self::PortConflict { output, .. }
            | Self::HandshakeTimeout { output, .. }
            | Self::ProtocolViolation { output, .. } => Some(output),
            Self::Launch { .. } => None,
        }
    }

    pub fn stdout(&self) -> &str {
        self.output().map_or("", |o| o.stdout.as_str())
    }

    pub fn stderr(&self) -> &str {
        self.output().map_or("", |o| o.stderr.as_str())
    }

    pub fn conflicting_pid(&self) -> Option<u32> {
        match self {
            Self::PortConflict { pid, .. } => Some(*pid),
            _ => None,
        }
    }

    pub fn exit_code(&self) -> Option<i32> {
        match self {
            Self::CrashNonZero { exit, .. } => exit.code,
            Self::UnexpectedExit { .. } => Some(0),
            _ => None,
        }
    }

    pub fn recovery_hint(&self) -> &'static str {
        match self.kind() {
            SpawnErrorKind::CrashNonZero => "The server crashed during startup. See its stderr.",
            SpawnErrorKind::UnexpectedExit => {
                "The server ran to completion. Make sure it binds a listener and keeps running."
            }
            SpawnErrorKind::PortConflict => {
                "Another process owns the port. Stop it or choose a different PORT."
            }
            SpawnErrorKind::HandshakeTimeout => {
                "The server never listened on PORT. Make sure it binds the port from the environment."
            }
            SpawnErrorKind::ProtocolViolation => {
                "The server reported a listener on the wrong port. Bind the port from PORT."
            }
            SpawnErrorKind::Launch => {
                "The artifact could not be executed. Check that the build produces an executable."
            }
        }
    }
}

#[derive(Error, Debug)]
pub enum ProcessError {
    #[error(transparent)]
    Spawn(Arc<SpawnError>),

    #[error("Failed to terminate process {pid}: {source} {location}")]
    Termination {
        pid: u32,
        #[source]
        source: std::io::Error,
        location: ErrorLocation,
    },

    #[error("Failed to write artifact {path}: {source} {location}")]
    Artifact {
        path: PathBuf,
        #[source]
        source: std::io::Error,
        location: ErrorLocation,
    },

    #[error("IO error: {source} {location}")]
    Io {
        #[source]
        source: std::io::Error,
        location: ErrorLocation,
    },
}

impl ProcessError {
    /// The spawn failure behind this error, if any.
    pub fn spawn_error(&self) -> Option<&SpawnError> {
        match self {
            Self::Spawn(error) => Some(error),
            _ => None,
        }
    }
}

impl From<std::io::Error> for ProcessError {
    #[track_caller]
    fn from(source: std::io::Error) -> Self {
        Self::Io {
            source,
            location: ErrorLocation::from(Location::caller()),
        }
    }
}

pub type Result<T> = std::result::Result<T, ProcessError>;
