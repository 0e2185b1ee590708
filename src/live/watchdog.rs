//! Read-side watchdog.
//!
//! Clients never send anything meaningful on the live channel; the socket is
//! read only to notice when the peer goes away.

use std::fmt::Display;

use axum::extract::ws::Message;
use futures::{Stream, StreamExt};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Spawns a task that drains `stream` and cancels the session when the peer
/// closes, the stream ends, or a read fails.
pub fn spawn_watchdog<R, E>(mut stream: R, cancel: CancellationToken) -> JoinHandle<()>
where
    R: Stream<Item = Result<Message, E>> + Unpin + Send + 'static,
    E: Display + Send,
{
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                frame = stream.next() => match frame {
                    Some(Ok(Message::Close(_))) => {
                        info!("Client closed connection");
                        break;
                    }
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => {
                        info!(error = %e, "Client read failed");
                        break;
                    }
                    None => {
                        info!("Client stream ended");
                        break;
                    }
                },
            }
        }
        cancel.cancel();
        debug!("Watchdog exited");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::channel::mpsc;

    #[tokio::test]
    async fn test_close_frame_cancels() {
        let (tx, rx) = mpsc::unbounded::<Result<Message, String>>();
        let cancel = CancellationToken::new();
        let handle = spawn_watchdog(rx, cancel.clone());

        tx.unbounded_send(Ok(Message::Text("hello".into()))).unwrap();
        tx.unbounded_send(Ok(Message::Close(None))).unwrap();

        handle.await.unwrap();
        assert!(cancel.is_cancelled());
    }

    #[tokio::test]
    async fn test_read_error_cancels() {
        let (tx, rx) = mpsc::unbounded::<Result<Message, String>>();
        let cancel = CancellationToken::new();
        let handle = spawn_watchdog(rx, cancel.clone());

        tx.unbounded_send(Err("connection reset".to_string())).unwrap();

        handle.await.unwrap();
        assert!(cancel.is_cancelled());
    }

    #[tokio::test]
    async fn test_exits_on_external_cancel() {
        let (_tx, rx) = mpsc::unbounded::<Result<Message, String>>();
        let cancel = CancellationToken::new();
        let handle = spawn_watchdog(rx, cancel.clone());

        cancel.cancel();
        handle.await.unwrap();
    }
}
