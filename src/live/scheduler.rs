//! Push cadence for one live session.
//!
//! After the initial delay the scheduler sends the full snapshot burst, then
//! refreshes vehicles on a fixed interval until the session is cancelled.

use std::sync::Arc;

use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::aggregator::{Aggregated, Snapshot};
use super::chunk::{Transmit, pace, send_chunked};
use super::options::SessionOptions;
use super::protocol::Envelope;
use super::writer::{Outbox, WriteError};
use crate::config::LiveConfig;
use crate::dataset::{ALL_RECORDS, VehicleDataset};
use crate::model::{VehiclePosition, high_water_mark};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    AwaitingInitial,
    SteadyState,
    Terminated,
}

/// Why a push cycle stopped the session.
#[derive(Debug)]
enum Halt {
    Cancelled,
    Fatal(WriteError),
}

pub struct PushScheduler {
    outbox: Outbox,
    vehicles: Arc<dyn VehicleDataset>,
    options: SessionOptions,
    config: Arc<LiveConfig>,
    cancel: CancellationToken,
    snapshot: Snapshot,
    since: u64,
    phase: Phase,
}

impl PushScheduler {
    pub fn new(
        outbox: Outbox,
        vehicles: Arc<dyn VehicleDataset>,
        options: SessionOptions,
        config: Arc<LiveConfig>,
        cancel: CancellationToken,
        aggregated: Aggregated,
    ) -> Self {
        Self {
            outbox,
            vehicles,
            options,
            config,
            cancel,
            snapshot: aggregated.snapshot,
            since: aggregated.since,
            phase: Phase::AwaitingInitial,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Newest vehicle timestamp seen so far.
    pub fn since(&self) -> u64 {
        self.since
    }

    /// Drives the session until cancellation or a fatal write failure.
    pub async fn run(&mut self) {
        let initial = tokio::time::sleep(self.config.initial_delay);
        tokio::pin!(initial);

        let period = self.config.refresh_interval;
        let mut refresh = tokio::time::interval_at(Instant::now() + period, period);
        refresh.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            let outcome = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => Err(Halt::Cancelled),
                _ = &mut initial, if self.phase == Phase::AwaitingInitial => {
                    let outcome = self.initial_burst().await;
                    if outcome.is_ok() {
                        self.phase = Phase::SteadyState;
                        debug!("Entered steady state");
                    }
                    outcome
                }
                _ = refresh.tick(), if self.phase == Phase::SteadyState => self.refresh().await,
            };

            match outcome.map_err(|halt| self.settle(halt)) {
                Ok(()) => {}
                Err(Halt::Cancelled) => break,
                Err(Halt::Fatal(e)) => {
                    error!(error = %e, "Live push failed, closing session");
                    self.cancel.cancel();
                    break;
                }
            }
        }

        self.phase = Phase::Terminated;
        info!(since = self.since, "Push scheduler stopped");
    }

    /// A write that fails once the session is already cancelled is part of
    /// the teardown, not a push failure.
    fn settle(&self, halt: Halt) -> Halt {
        match halt {
            Halt::Fatal(e) if self.cancel.is_cancelled() => {
                debug!(error = %e, "Write failed during teardown");
                Halt::Cancelled
            }
            halt => halt,
        }
    }

    /// `totals`, then the static collections if requested, then `vehicles`.
    async fn initial_burst(&self) -> Result<(), Halt> {
        let totals = self.snapshot.totals();
        self.outbox
            .send(&Envelope::Totals(totals))
            .await
            .map_err(Halt::Fatal)?;
        info!(?totals, "Sent totals");

        if self.options.send_static {
            if self.options.chunkify {
                let outcome = send_chunked(
                    &self.outbox,
                    &self.snapshot.stops,
                    self.config.chunk_size,
                    self.config.pacing,
                    &self.cancel,
                    Envelope::Stops,
                )
                .await;
                if outcome == Transmit::Cancelled {
                    return Err(Halt::Cancelled);
                }
            } else {
                self.send_secondary(&Envelope::Stops(&self.snapshot.stops))
                    .await;
            }
            self.pace().await?;

            self.send_secondary(&Envelope::Routes(&self.snapshot.routes))
                .await;
            self.pace().await?;

            self.send_secondary(&Envelope::RouteShapes(&self.snapshot.route_shapes))
                .await;
            self.pace().await?;
        }

        self.send_secondary(&Envelope::Vehicles(&self.snapshot.vehicles))
            .await;
        Ok(())
    }

    /// A lost burst message is logged; only a dead stream ends the session.
    async fn send_secondary(&self, envelope: &Envelope<'_>) {
        if let Err(e) = self.outbox.send(envelope).await {
            warn!(kind = envelope.kind(), error = %e, "Burst write failed");
        }
    }

    async fn pace(&self) -> Result<(), Halt> {
        if pace(self.config.pacing, &self.cancel).await {
            Ok(())
        } else {
            Err(Halt::Cancelled)
        }
    }

    /// Re-fetches every vehicle and pushes them unless the feed is empty.
    ///
    /// A fetch failure skips this tick; the next tick retries.
    async fn refresh(&mut self) -> Result<(), Halt> {
        let vehicles = tokio::select! {
            _ = self.cancel.cancelled() => return Err(Halt::Cancelled),
            fetched = self.fetch_vehicles() => fetched,
        };
        let vehicles = match vehicles {
            Ok(vehicles) => vehicles,
            Err(e) => {
                warn!(error = %e, "Vehicle refresh failed, retrying next tick");
                return Ok(());
            }
        };

        self.since = high_water_mark(self.since, &vehicles);
        if vehicles.is_empty() {
            debug!("No vehicles to report");
            return Ok(());
        }

        self.snapshot.vehicles = vehicles;
        self.outbox
            .send(&Envelope::Vehicles(&self.snapshot.vehicles))
            .await
            .map_err(Halt::Fatal)?;
        debug!(vehicles = self.snapshot.vehicles.len(), since = self.since, "Pushed vehicles");
        Ok(())
    }

    async fn fetch_vehicles(&self) -> anyhow::Result<Vec<VehiclePosition>> {
        // Full snapshots every cycle: clients replace their vehicle layer
        // wholesale, so `since` is tracked but not sent upstream.
        let fetch = self.vehicles.fetch_vehicle_positions(ALL_RECORDS);
        match self.config.fetch_timeout {
            Some(limit) => tokio::time::timeout(limit, fetch)
                .await
                .unwrap_or_else(|_| Err(anyhow::anyhow!("fetch timed out after {limit:?}"))),
            None => fetch.await,
        }
    }
}
