//! Directional Copier
//!
//! The unit of work run twice per session, once per direction: repeatedly
//! read a bounded chunk from the source half and write it to the destination
//! half, until end-of-stream, an I/O error, or cancellation from the sibling
//! direction.

use std::io;
use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::debug;

use super::signal::ShutdownSignal;

/// Terminal condition of one direction of a relay.
///
/// Cancellation is represented explicitly: it is the expected way the
/// sibling direction unwinds after the first direction terminated, and is
/// never reported as a fresh error.
#[derive(Debug)]
pub enum CopyOutcome {
    /// Clean disconnect: the source peer closed its write side
    EndOfStream,
    /// Read or write failed
    TransportError(io::Error),
    /// The sibling direction terminated first
    Cancelled,
}

impl CopyOutcome {
    /// Short human-readable description for session logs and stats
    pub fn describe(&self) -> String {
        match self {
            CopyOutcome::EndOfStream => "end of stream".to_string(),
            CopyOutcome::TransportError(e) => format!("transport error: {e}"),
            CopyOutcome::Cancelled => "cancelled".to_string(),
        }
    }
}

/// What a finished copier hands back to its session
#[derive(Debug)]
pub struct CopyReport {
    pub outcome: CopyOutcome,
    /// Bytes successfully relayed by this direction
    pub bytes: u64,
    /// Whether this direction was the first in its session to terminate
    pub first: bool,
}

/// Copies bytes one way between two stream halves until a terminal condition
pub struct DirectionalCopier<R, W> {
    reader: R,
    writer: W,
    label: &'static str,
    buffer_size: usize,
    log_payload: bool,
    signal: Arc<ShutdownSignal>,
}

impl<R, W> DirectionalCopier<R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    pub fn new(
        reader: R,
        writer: W,
        label: &'static str,
        buffer_size: usize,
        log_payload: bool,
        signal: Arc<ShutdownSignal>,
    ) -> Self {
        Self {
            reader,
            writer,
            label,
            buffer_size,
            log_payload,
            signal,
        }
    }

    /// Run the copy loop to completion.
    ///
    /// Terminal conditions other than cancellation fire the session signal
    /// so the sibling direction stops too. The stream halves are dropped on
    /// return, which closes each underlying socket once both directions of
    /// the session have finished with it.
    pub async fn run(mut self) -> CopyReport {
        // One transfer buffer for the lifetime of the task.
        let mut buf = vec![0u8; self.buffer_size];
        let mut total: u64 = 0;

        loop {
            let n = tokio::select! {
                _ = self.signal.cancelled() => {
                    return self.report(CopyOutcome::Cancelled, total, false);
                }
                read = self.reader.read(&mut buf) => match read {
                    Ok(0) => {
                        let first = self.signal.fire();
                        return self.report(CopyOutcome::EndOfStream, total, first);
                    }
                    Ok(n) => n,
                    Err(e) => {
                        let first = self.signal.fire();
                        return self.report(CopyOutcome::TransportError(e), total, first);
                    }
                }
            };

            if self.log_payload {
                self.log_chunk(&buf[..n]);
            }

            // Write the exact chunk just read, still racing the signal so a
            // session torn down by the other direction unwinds promptly even
            // under write backpressure.
            let written = tokio::select! {
                _ = self.signal.cancelled() => {
                    return self.report(CopyOutcome::Cancelled, total, false);
                }
                res = self.writer.write_all(&buf[..n]) => res,
            };

            if let Err(e) = written {
                let first = self.signal.fire();
                return self.report(CopyOutcome::TransportError(e), total, first);
            }

            total += n as u64;
        }
    }

    fn report(&self, outcome: CopyOutcome, bytes: u64, first: bool) -> CopyReport {
        debug!(
            direction = self.label,
            bytes,
            outcome = %outcome.describe(),
            "copier finished"
        );

        CopyReport {
            outcome,
            bytes,
            first,
        }
    }

    /// Best-effort UTF-8 payload trace; binary chunks log byte count only
    fn log_chunk(&self, chunk: &[u8]) {
        match std::str::from_utf8(chunk) {
            Ok(text) => debug!(
                direction = self.label,
                bytes = chunk.len(),
                payload = %text,
                "relayed chunk"
            ),
            Err(_) => debug!(
                direction = self.label,
                bytes = chunk.len(),
                "relayed non-text chunk"
            ),
        }
    }
}
