//! Data Relay Module
//!
//! Runs one paired inbound+outbound connection: two directional copiers
//! under a single shutdown signal, guaranteed to terminate together.

pub mod copier;
pub mod session;
pub mod signal;

pub use copier::{CopyOutcome, CopyReport, DirectionalCopier};
pub use session::{RelaySession, SessionStats};
pub use signal::ShutdownSignal;
