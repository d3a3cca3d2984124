use std::net::SocketAddr;
use std::panic::Location;

use error_location::ErrorLocation;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ListenerError {
    #[error("Listener is already bound {location}")]
    AlreadyListening { location: ErrorLocation },

    #[error("Listener is not bound; call listen() first {location}")]
    NotListening { location: ErrorLocation },

    #[error("Listener has been shut down {location}")]
    Closed { location: ErrorLocation },

    #[error("Failed to bind {addr}: {source} {location}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
        location: ErrorLocation,
    },

    #[error("Handshake with launcher at {addr} failed: {source} {location}")]
    Handshake {
        addr: String,
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

impl From<std::io::Error> for ListenerError {
    #[track_caller]
    fn from(source: std::io::Error) -> Self {
        Self::Io {
            source,
            location: ErrorLocation::from(Location::caller()),
        }
    }
}

pub type Result<T> = std::result::Result<T, ListenerError>;
