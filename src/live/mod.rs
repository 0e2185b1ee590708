//! Live push channel.
//!
//! One [`Session`] per connected map client:
//!
//! | Module | Role |
//! |--------|------|
//! | `options` | `version` / `chunkify` / `static` negotiation |
//! | `aggregator` | parallel fetch of the initial snapshot |
//! | `scheduler` | initial burst, then periodic vehicle refresh |
//! | `chunk` | bounded-size `stops` messages with pacing |
//! | `writer` | the only task that writes to the socket |
//! | `watchdog` | reads the socket to notice disconnects |
//! | `protocol` | `{"type", "data"}` envelope |
//!
//! Every task of a session shares one cancellation token. The watchdog, a
//! failed fetch, a fatal write or the end of the scheduler all cancel it, and
//! the session waits for its tasks before returning.

pub mod aggregator;
pub mod chunk;
pub mod options;
pub mod protocol;
pub mod scheduler;
pub mod watchdog;
pub mod writer;

#[cfg(test)]
pub(crate) mod testing;

pub use options::{OptionsError, SessionOptions};
pub use protocol::{Envelope, Totals};

use std::fmt::Display;
use std::sync::Arc;

use axum::extract::ws::Message;
use futures::{Sink, Stream};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::LiveConfig;
use crate::dataset::Datasets;
use aggregator::aggregate;
use scheduler::PushScheduler;
use watchdog::spawn_watchdog;
use writer::spawn_writer;

/// Server-side state of one client connection.
pub struct Session {
    id: u64,
    options: SessionOptions,
    config: Arc<LiveConfig>,
    datasets: Datasets,
    cancel: CancellationToken,
}

impl Session {
    /// `cancel` is usually a child of the server's shutdown token.
    pub fn new(
        id: u64,
        options: SessionOptions,
        config: Arc<LiveConfig>,
        datasets: Datasets,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            id,
            options,
            config,
            datasets,
            cancel,
        }
    }

    /// Runs the session over an already upgraded transport.
    ///
    /// Returns once every session task has exited and the sink is closed.
    #[tracing::instrument(
        name = "session",
        skip_all,
        fields(
            session_id = self.id,
            version = self.options.version,
            chunkify = self.options.chunkify,
            send_static = self.options.send_static,
        )
    )]
    pub async fn run<W, R, E>(self, sink: W, stream: R)
    where
        W: Sink<Message> + Unpin + Send + 'static,
        W::Error: Display,
        R: Stream<Item = Result<Message, E>> + Unpin + Send + 'static,
        E: Display + Send,
    {
        info!("Client connected");
        let cancel = self.cancel;

        let watchdog = spawn_watchdog(stream, cancel.clone());
        let (outbox, writer) = spawn_writer(sink, cancel.clone());

        match aggregate(&self.datasets, self.config.fetch_timeout, &cancel).await {
            Some(aggregated) => {
                let mut scheduler = PushScheduler::new(
                    outbox,
                    self.datasets.vehicles.clone(),
                    self.options,
                    self.config,
                    cancel.clone(),
                    aggregated,
                );
                scheduler.run().await;
            }
            None => {
                warn!("Initial snapshot unavailable, closing session");
                drop(outbox);
            }
        }

        cancel.cancel();
        let (watchdog, writer) = tokio::join!(watchdog, writer);
        if let Err(e) = watchdog {
            warn!(error = %e, "Watchdog task failed");
        }
        if let Err(e) = writer {
            warn!(error = %e, "Writer task failed");
        }
        info!("Client disconnected");
    }
}
