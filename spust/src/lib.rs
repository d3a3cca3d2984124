//! Development driver for spust: builds the server, watches the sources,
//! and keeps exactly one healthy server instance on the configured port.

pub mod builder;
pub mod cli;
pub mod commands;
pub mod dev_session;
pub mod error;
pub mod logger;
pub mod shutdown_coordinator;
pub mod shutdown_guard;
pub mod watcher;

pub use builder::{BuildOutput, BuildStats, Builder};
pub use cli::{Cli, Commands};
pub use dev_session::{CycleReport, DevSession};
pub use error::{CliError, Result as CliResult};
pub use shutdown_coordinator::ShutdownCoordinator;
pub use shutdown_guard::ShutdownGuard;
pub use watcher::SourceWatcher;

#[cfg(test)]
mod tests;
