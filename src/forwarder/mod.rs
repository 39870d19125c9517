//! Connection Pairer
//!
//! Accepts inbound connections indefinitely and pairs each one with a fresh
//! outbound connection to the fixed destination. Sessions are launched
//! fire-and-forget into a task group owned by the forwarder, so accepting
//! never waits on a session and dropping the forwarder cancels everything
//! still in flight.

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;

use anyhow::Context;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinSet;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::relay::RelaySession;
use crate::resolver::Destination;
use crate::Result;

/// Accepts inbound connections and pairs each with an outbound dial
pub struct Forwarder {
    listener: TcpListener,
    destination: Destination,
    config: Arc<Config>,
    // Task group owning every live session; aborted wholesale on drop.
    sessions: JoinSet<()>,
}

impl Forwarder {
    /// Bind the local listener. Failure to bind is fatal to the process.
    pub async fn bind(config: Arc<Config>, destination: Destination) -> Result<Self> {
        let bind_addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, config.local_port));

        let listener = TcpListener::bind(bind_addr)
            .await
            .with_context(|| format!("failed to bind local listener on {bind_addr}"))?;

        info!("Listening on {}", listener.local_addr()?);

        Ok(Self {
            listener,
            destination,
            config,
            sessions: JoinSet::new(),
        })
    }

    /// The address the listener actually bound to
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Number of sessions currently tracked by the task group
    pub fn active_sessions(&self) -> usize {
        self.sessions.len()
    }

    /// Accept connections until the listener fails.
    ///
    /// Accept-time errors propagate upward and are fatal: the listener
    /// cannot self-heal. Everything downstream of an accepted connection
    /// (dial failure, relay errors) stays per-session.
    pub async fn run(&mut self) -> Result<()> {
        loop {
            tokio::select! {
                accept_result = self.listener.accept() => {
                    let (inbound, _) = accept_result.context("listener accept failed")?;
                    self.launch_session(inbound);
                }
                // Reap finished session tasks as they complete, even while
                // the listener sits idle. When the set is empty this branch
                // is disabled and the loop just waits to accept.
                Some(result) = self.sessions.join_next() => {
                    if let Err(e) = result {
                        if e.is_panic() {
                            error!("Session task panicked: {e}");
                        }
                    }
                }
            }
        }
    }

    /// Pair one accepted connection with a dial and spawn it into the group
    fn launch_session(&mut self, inbound: TcpStream) {
        // Observability only: a connection with no reportable peer address
        // still gets a session.
        let peer_addr = match inbound.peer_addr() {
            Ok(addr) => Some(addr),
            Err(e) => {
                warn!("Could not resolve peer address of accepted connection: {e}");
                None
            }
        };

        let destination = self.destination.clone();
        let config = Arc::clone(&self.config);
        self.sessions
            .spawn(Self::pair_and_relay(inbound, peer_addr, destination, config));
    }

    /// Dial the destination and run the relay for one accepted connection.
    ///
    /// A dial failure closes the inbound socket (by drop) and never affects
    /// the listener or other sessions.
    async fn pair_and_relay(
        inbound: TcpStream,
        peer_addr: Option<SocketAddr>,
        destination: Destination,
        config: Arc<Config>,
    ) {
        debug!(peer_addr = ?peer_addr, "Dialing {destination}");

        let outbound = match timeout(config.dial_timeout, TcpStream::connect(destination.addr()))
            .await
        {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                warn!(peer_addr = ?peer_addr, "Failed to dial {destination}: {e}");
                return;
            }
            Err(_) => {
                warn!(
                    peer_addr = ?peer_addr,
                    "Dial to {destination} timed out after {}",
                    humantime::format_duration(config.dial_timeout)
                );
                return;
            }
        };

        let session = RelaySession::new(peer_addr, destination.addr());
        info!(
            session_id = %session.session_id,
            client_addr = ?peer_addr,
            target_addr = %destination.addr(),
            "Session started"
        );

        let stats = session
            .run(inbound, outbound, config.buffer_size, config.log_payload)
            .await;

        info!(
            session_id = %stats.session_id,
            bytes_up = stats.bytes_up,
            bytes_down = stats.bytes_down,
            duration_ms = stats.duration_ms,
            outcome = %stats.outcome,
            "Session closed"
        );
    }
}
