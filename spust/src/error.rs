use std::panic::Location;
use std::path::PathBuf;

use error_location::ErrorLocation;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CliError {
    #[error("Config error: {0}")]
    Config(#[from] sp_config::ConfigError),

    #[error("Server error: {0}")]
    Process(#[from] sp_process::ProcessError),

    #[error("Listener error: {0}")]
    Listener(#[from] sp_listener::ListenerError),

    #[error("Build failed: {message} {location}")]
    Build {
        message: String,
        location: ErrorLocation,
    },

    #[error("Cannot watch {path}: {source} {location}")]
    Watch {
        path: PathBuf,
        #[source]
        source: notify::Error,
        location: ErrorLocation,
    },

    #[error("Logger error: {message}")]
    Logger { message: String },

    #[error("IO error: {source} {location}")]
    Io {
        #[source]
        source: std::io::Error,
        location: ErrorLocation,
    },
}

impl CliError {
    #[track_caller]
    pub fn build<S: Into<String>>(message: S) -> Self {
        Self::Build {
            message: message.into(),
            location: ErrorLocation::from(Location::caller()),
        }
    }
}

impl From<std::io::Error> for CliError {
    #[track_caller]
    fn from(source: std::io::Error) -> Self {
        Self::Io {
            source,
            location: ErrorLocation::from(Location::caller()),
        }
    }
}

pub type Result<T> = std::result::Result<T, CliError>;
