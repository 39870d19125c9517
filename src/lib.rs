//! portfwd Library
//!
//! A small TCP port forwarder: every connection accepted on the local port
//! is paired with a fresh outbound connection to a fixed remote host:port,
//! and bytes are relayed in both directions until either side closes.

pub mod config;
pub mod forwarder;
pub mod relay;
pub mod resolver;

pub use config::Config;
pub use forwarder::Forwarder;
pub use relay::{RelaySession, SessionStats};
pub use resolver::Destination;

/// Common error type for the forwarder
pub type Result<T> = anyhow::Result<T>;
