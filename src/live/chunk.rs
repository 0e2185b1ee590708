//! Bounded-size transmission of large collections.

use std::num::NonZeroUsize;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::protocol::Envelope;
use super::writer::Outbox;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transmit {
    /// Every chunk was attempted; `failed` of them could not be written.
    Completed { sent: usize, failed: usize },
    Cancelled,
}

/// Number of messages [`send_chunked`] emits for `len` records.
pub fn chunk_count(len: usize, chunk_size: NonZeroUsize) -> usize {
    len.div_ceil(chunk_size.get())
}

/// Sleeps for `pacing` unless the session is cancelled first.
///
/// Returns `false` on cancellation.
pub async fn pace(pacing: Duration, cancel: &CancellationToken) -> bool {
    tokio::select! {
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(pacing) => true,
    }
}

/// Sends `records` as consecutive slices of at most `chunk_size` elements,
/// pausing `pacing` between messages.
///
/// Each message carries exactly its own slice of `records`, in order. A
/// failed write is logged and the next chunk is still attempted.
pub async fn send_chunked<'a, T>(
    outbox: &Outbox,
    records: &'a [T],
    chunk_size: NonZeroUsize,
    pacing: Duration,
    cancel: &CancellationToken,
    wrap: impl Fn(&'a [T]) -> Envelope<'a>,
) -> Transmit {
    let mut sent = 0;
    let mut failed = 0;

    for (index, chunk) in records.chunks(chunk_size.get()).enumerate() {
        if index > 0 && !pace(pacing, cancel).await {
            return Transmit::Cancelled;
        }
        if cancel.is_cancelled() {
            return Transmit::Cancelled;
        }

        let envelope = wrap(chunk);
        match outbox.send(&envelope).await {
            Ok(()) => sent += 1,
            Err(e) => {
                warn!(kind = envelope.kind(), chunk = index, error = %e, "Chunk write failed");
                failed += 1;
            }
        }
    }

    debug!(records = records.len(), sent, failed, "Chunked transmission finished");
    Transmit::Completed { sent, failed }
}
