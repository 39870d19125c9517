//! Relay Session

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tokio::net::TcpStream;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::copier::{CopyOutcome, CopyReport, DirectionalCopier};
use super::signal::ShutdownSignal;

/// One accepted client paired with one outbound connection.
///
/// The session exclusively owns both sockets for its lifetime: each half is
/// read by exactly one copier and written by exactly one copier, and both
/// halves of a socket are dropped (closing it exactly once) when the session
/// completes. Completion is reported only after both directions have stopped.
#[derive(Debug)]
pub struct RelaySession {
    pub session_id: String,
    /// Peer address of the inbound socket, when the OS reported one
    pub client_addr: Option<SocketAddr>,
    pub target_addr: SocketAddr,
    pub start_time: Instant,
    bytes_up: AtomicU64,
    bytes_down: AtomicU64,
}

/// Statistics for a completed session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionStats {
    pub session_id: String,
    pub client_addr: Option<SocketAddr>,
    pub target_addr: SocketAddr,
    pub duration_ms: u64,
    pub bytes_up: u64,
    pub bytes_down: u64,
    pub total_bytes: u64,
    /// Terminal condition of the first direction to stop
    pub outcome: String,
}

impl RelaySession {
    /// Create a new relay session with a fresh unique identifier
    pub fn new(client_addr: Option<SocketAddr>, target_addr: SocketAddr) -> Self {
        let session_id = Uuid::new_v4().to_string();

        debug!(
            session_id = %session_id,
            client_addr = ?client_addr,
            target_addr = %target_addr,
            "Creating relay session"
        );

        Self {
            session_id,
            client_addr,
            target_addr,
            start_time: Instant::now(),
            bytes_up: AtomicU64::new(0),
            bytes_down: AtomicU64::new(0),
        }
    }

    /// Bytes relayed client to target
    pub fn bytes_up(&self) -> u64 {
        self.bytes_up.load(Ordering::Relaxed)
    }

    /// Bytes relayed target to client
    pub fn bytes_down(&self) -> u64 {
        self.bytes_down.load(Ordering::Relaxed)
    }

    pub fn total_bytes(&self) -> u64 {
        self.bytes_up() + self.bytes_down()
    }

    pub fn duration(&self) -> std::time::Duration {
        self.start_time.elapsed()
    }

    /// Relay bytes between the two sockets until either direction terminates.
    ///
    /// Both directions run concurrently under one shutdown signal: whichever
    /// terminates first (end-of-stream, read error, or write error) fires the
    /// signal, the sibling unwinds as cancelled, and both sockets are closed.
    /// The first direction to terminate determines the reported outcome;
    /// nothing here is ever escalated past the session and broken relays are
    /// not reconnected.
    pub async fn run(
        &self,
        client: TcpStream,
        target: TcpStream,
        buffer_size: usize,
        log_payload: bool,
    ) -> SessionStats {
        let (client_read, client_write) = client.into_split();
        let (target_read, target_write) = target.into_split();
        let signal = Arc::new(ShutdownSignal::new());

        let up = DirectionalCopier::new(
            client_read,
            target_write,
            "client->target",
            buffer_size,
            log_payload,
            Arc::clone(&signal),
        );
        let down = DirectionalCopier::new(
            target_read,
            client_write,
            "target->client",
            buffer_size,
            log_payload,
            signal,
        );

        let (up_report, down_report) = tokio::join!(up.run(), down.run());

        self.bytes_up.store(up_report.bytes, Ordering::Relaxed);
        self.bytes_down.store(down_report.bytes, Ordering::Relaxed);

        let outcome = self.surface_outcome(&up_report, &down_report);

        self.to_stats(outcome)
    }

    /// Log and describe the outcome of the first direction to terminate.
    ///
    /// Exactly one direction wins the signal's compare-and-set; the other
    /// reports either `Cancelled` or, when both peers closed at once, its own
    /// terminal condition without being first.
    fn surface_outcome(&self, up: &CopyReport, down: &CopyReport) -> String {
        let (direction, report) = if up.first {
            ("client->target", up)
        } else {
            ("target->client", down)
        };

        match &report.outcome {
            CopyOutcome::EndOfStream => {
                info!(
                    session_id = %self.session_id,
                    direction,
                    "Peer disconnected"
                );
            }
            CopyOutcome::TransportError(e) => {
                warn!(
                    session_id = %self.session_id,
                    direction,
                    error = %e,
                    "Relay terminated by I/O error"
                );
            }
            // Unreachable in practice: the winner of the signal never
            // observed cancellation. Not an error either way.
            CopyOutcome::Cancelled => {}
        }

        report.outcome.describe()
    }

    /// Generate completion statistics
    pub fn to_stats(&self, outcome: String) -> SessionStats {
        SessionStats {
            session_id: self.session_id.clone(),
            client_addr: self.client_addr,
            target_addr: self.target_addr,
            duration_ms: self.duration().as_millis() as u64,
            bytes_up: self.bytes_up(),
            bytes_down: self.bytes_down(),
            total_bytes: self.total_bytes(),
            outcome,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    async fn socket_pair() -> (TcpStream, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let near = TcpStream::connect(addr).await.unwrap();
        let (far, _) = listener.accept().await.unwrap();
        (near, far)
    }

    #[tokio::test]
    async fn relays_both_directions_and_counts_bytes() {
        let (client_near, client_far) = socket_pair().await;
        let (target_near, target_far) = socket_pair().await;

        let session = RelaySession::new(
            client_far.peer_addr().ok(),
            target_far.peer_addr().unwrap(),
        );
        let session_task = tokio::spawn(async move {
            let session = session;
            session.run(client_far, target_near, 1024, false).await
        });

        // Drive both directions from the outside ends of the pairing.
        let mut client = client_near;
        let mut target = target_far;

        client.write_all(b"hello").await.unwrap();
        let mut buf = [0u8; 5];
        target.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"hello");

        target.write_all(b"world!").await.unwrap();
        let mut buf = [0u8; 6];
        client.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"world!");

        drop(client);
        let stats = session_task.await.unwrap();

        assert_eq!(stats.bytes_up, 5);
        assert_eq!(stats.bytes_down, 6);
        assert_eq!(stats.total_bytes, 11);
        assert_eq!(stats.outcome, "end of stream");
    }

    #[tokio::test]
    async fn target_close_tears_down_the_session() {
        let (mut client_near, client_far) = socket_pair().await;
        let (target_near, target_far) = socket_pair().await;

        let session = RelaySession::new(None, target_far.peer_addr().unwrap());
        let session_task = tokio::spawn(async move {
            let session = session;
            session.run(client_far, target_near, 1024, false).await
        });

        // Remote side closes immediately after accepting.
        drop(target_far);

        let stats = tokio::time::timeout(std::time::Duration::from_secs(2), session_task)
            .await
            .expect("session must terminate once the target closes")
            .unwrap();
        assert_eq!(stats.outcome, "end of stream");

        // The inbound socket was closed too.
        let mut buf = [0u8; 1];
        let n = tokio::time::timeout(
            std::time::Duration::from_secs(2),
            client_near.read(&mut buf),
        )
        .await
        .expect("client read must unblock")
        .unwrap();
        assert_eq!(n, 0);
    }

    #[test]
    fn stats_serialize_for_external_consumers() {
        let session = RelaySession::new(
            Some("127.0.0.1:12345".parse().unwrap()),
            "127.0.0.1:54321".parse().unwrap(),
        );
        let stats = session.to_stats("end of stream".to_string());

        let json = serde_json::to_string(&stats).unwrap();
        let parsed: SessionStats = serde_json::from_str(&json).unwrap();

        assert_eq!(parsed.session_id, stats.session_id);
        assert_eq!(parsed.client_addr, stats.client_addr);
        assert_eq!(parsed.target_addr, stats.target_addr);
        assert_eq!(parsed.total_bytes, stats.total_bytes);
        assert_eq!(parsed.outcome, "end of stream");
    }

    #[tokio::test]
    async fn simultaneous_close_from_both_ends_completes() {
        let (client_near, client_far) = socket_pair().await;
        let (target_near, target_far) = socket_pair().await;

        let session = RelaySession::new(None, target_far.peer_addr().unwrap());
        let session_task = tokio::spawn(async move {
            let session = session;
            session.run(client_far, target_near, 1024, false).await
        });

        drop(client_near);
        drop(target_far);

        let stats = tokio::time::timeout(std::time::Duration::from_secs(2), session_task)
            .await
            .expect("racing shutdown from both directions must not deadlock")
            .unwrap();
        assert_eq!(stats.total_bytes, 0);
    }
}
