//! Listener-side half of spust.
//!
//! A managed server wraps its listener in [`ShutdownableListener`] so the
//! bind-in-progress state is observable and shutdown drops every open
//! connection at once. Once bound, it reports back to the launcher with
//! [`notify_listening`].

pub mod connection_registry;
pub mod error;
pub mod handshake;
pub mod shutdownable_listener;

pub use connection_registry::ConnectionRegistry;
pub use error::{ListenerError, Result as ListenerResult};
pub use handshake::{
    HANDSHAKE_ADDR_ENV, HandshakeMessage, LISTENING_MESSAGE, PORT_ENV, expected_port,
    notify_listening, send_handshake,
};
pub use shutdownable_listener::{IntoShutdownable, ShutdownableListener};

#[cfg(test)]
mod tests;
