//! The single writer that owns a session's outbound transport.
//!
//! The socket sink is not safe to share, so every message goes through one
//! task. Callers get an [`Outbox`] that enqueues a frame and waits for the
//! writer to report how the write went.

use std::fmt::Display;

use axum::extract::ws::Message;
use futures::{Sink, SinkExt};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::protocol::Envelope;

#[derive(Debug, Error)]
pub enum WriteError {
    #[error("failed to encode message: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("transport write failed: {0}")]
    Transport(String),
    #[error("session writer has shut down")]
    Closed,
}

struct WriteRequest {
    text: String,
    ack: oneshot::Sender<Result<(), WriteError>>,
}

/// Handle for queueing messages onto a session's writer task.
#[derive(Clone)]
pub struct Outbox {
    tx: mpsc::Sender<WriteRequest>,
}

impl Outbox {
    /// Encodes `envelope` and waits until the writer has written it.
    pub async fn send(&self, envelope: &Envelope<'_>) -> Result<(), WriteError> {
        let text = envelope.to_json()?;
        let (ack, done) = oneshot::channel();
        self.tx
            .send(WriteRequest { text, ack })
            .await
            .map_err(|_| WriteError::Closed)?;
        done.await.map_err(|_| WriteError::Closed)?
    }
}

/// Spawns the writer task for `sink`.
///
/// The task stops taking requests once `cancel` fires or every [`Outbox`] is
/// dropped, then closes the sink. It is the only place the transport is
/// closed.
pub fn spawn_writer<W>(sink: W, cancel: CancellationToken) -> (Outbox, JoinHandle<()>)
where
    W: Sink<Message> + Unpin + Send + 'static,
    W::Error: Display,
{
    let (tx, rx) = mpsc::channel(16);
    let handle = tokio::spawn(run_writer(sink, rx, cancel));
    (Outbox { tx }, handle)
}

async fn run_writer<W>(
    mut sink: W,
    mut rx: mpsc::Receiver<WriteRequest>,
    cancel: CancellationToken,
) where
    W: Sink<Message> + Unpin,
    W::Error: Display,
{
    loop {
        let request = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            request = rx.recv() => match request {
                Some(request) => request,
                None => break,
            },
        };

        let result = sink
            .send(Message::Text(request.text.into()))
            .await
            .map_err(|e| WriteError::Transport(e.to_string()));

        if let Err(e) = &result {
            if cancel.is_cancelled() {
                // Teardown is already under way.
                debug!(error = %e, "Write failed after cancellation");
            }
        }
        let _ = request.ack.send(result);
    }

    if let Err(e) = sink.close().await {
        debug!(error = %e, "Transport close failed");
    }
    info!("Session writer closed");
}
