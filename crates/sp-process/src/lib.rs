//! Process side of spust: launching compiled server artifacts, confirming
//! they listen, and replacing them without ever leaving two owners of the
//! port or an orphaned child behind.

pub mod artifact;
pub mod captured_output;
pub mod error;
pub mod launcher;
pub mod managed_server;
pub mod manager;
pub mod port_query;
pub mod terminate;

pub use artifact::CompiledArtifact;
pub use captured_output::CapturedOutput;
pub use error::{ProcessError, Result as ProcessResult, SpawnError, SpawnErrorKind};
pub use launcher::Launcher;
pub use managed_server::{ManagedServer, ProcessExit, ServerState};
pub use manager::{ManagerState, ServerManager};
pub use port_query::{PortOwners, PortQuery, SystemPortQuery};
pub use terminate::{TerminationSignal, is_process_running, terminate, terminate_until};

#[cfg(test)]
mod tests;
