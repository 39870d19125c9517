//! Process Configuration
//!
//! Configuration priority (highest to lowest): CLI arguments, environment
//! variables, built-in defaults. There is no config file and no reloading;
//! the configuration is fixed for the lifetime of the process.

use std::env;
use std::time::Duration;

use anyhow::{bail, Context};

use crate::Result;

/// Transfer chunk size used by each directional copier, in bytes.
pub const DEFAULT_BUFFER_SIZE: usize = 1024;

/// How long an outbound dial may take before the session is abandoned.
pub const DEFAULT_DIAL_TIMEOUT: Duration = Duration::from_secs(10);

/// Environment variable overriding the copier buffer size.
pub const ENV_BUFFER_SIZE: &str = "PORTFWD_BUFFER_SIZE";

/// Environment variable overriding the dial timeout (humantime format, e.g. "5s").
pub const ENV_DIAL_TIMEOUT: &str = "PORTFWD_DIAL_TIMEOUT";

/// Runtime configuration, shared read-only by every session
#[derive(Debug, Clone)]
pub struct Config {
    /// Local TCP port to listen on
    pub local_port: u16,
    /// Remote host every inbound connection is forwarded to
    pub remote_host: String,
    /// Remote TCP port
    pub remote_port: u16,
    /// Copier transfer buffer size in bytes
    pub buffer_size: usize,
    /// Timeout for dialing the destination
    pub dial_timeout: Duration,
    /// Log relayed payload chunks (best-effort UTF-8 decode)
    pub log_payload: bool,
}

impl Config {
    /// Create a configuration from the required CLI arguments, with defaults
    /// for everything else
    pub fn new(local_port: u16, remote_host: String, remote_port: u16, log_payload: bool) -> Self {
        Self {
            local_port,
            remote_host,
            remote_port,
            buffer_size: DEFAULT_BUFFER_SIZE,
            dial_timeout: DEFAULT_DIAL_TIMEOUT,
            log_payload,
        }
    }

    /// Apply environment variable overrides
    pub fn apply_env(&mut self) -> Result<()> {
        if let Ok(raw) = env::var(ENV_BUFFER_SIZE) {
            self.buffer_size = raw
                .parse()
                .with_context(|| format!("{ENV_BUFFER_SIZE} must be an integer, got {raw:?}"))?;
        }

        if let Ok(raw) = env::var(ENV_DIAL_TIMEOUT) {
            self.dial_timeout = humantime::parse_duration(&raw)
                .with_context(|| format!("{ENV_DIAL_TIMEOUT} must be a duration like \"5s\", got {raw:?}"))?;
        }

        Ok(())
    }

    /// Validate the final configuration
    pub fn validate(&self) -> Result<()> {
        if self.buffer_size == 0 {
            bail!("buffer size must be at least 1 byte");
        }

        if self.remote_host.is_empty() {
            bail!("remote host must not be empty");
        }

        Ok(())
    }
}
