//! Driver spawns and manages one race's event task

use std::fmt;

use futures::future::BoxFuture;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace};

use crate::Timestamp;
use crate::race::{Race, RaceSummary};

/// Closure run against a race inside its task.
pub type RaceJob = Box<dyn for<'a> FnOnce(&'a mut Race) -> BoxFuture<'a, ()> + Send>;

/// Box a closure as a [`RaceJob`].
pub fn job<F>(f: F) -> RaceJob
where
    F: for<'a> FnOnce(&'a mut Race) -> BoxFuture<'a, ()> + Send + 'static,
{
    Box::new(f)
}

/// Everything that can happen to a race, in arrival order.
pub enum RaceEvent {
    /// Split reported by a runner on the livesplit relay.
    Split { runner: String, timestamp: Timestamp },
    /// Finish reported by a runner on the livesplit relay.
    Finish { runner: String, timestamp: Timestamp },
    /// Pull the roster from the discovery source.
    Refresh,
    /// Deferred refresh of the posted results.
    RefreshComments,
    /// Command queued by the tracker.
    Run(RaceJob),
}

impl fmt::Debug for RaceEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RaceEvent::Split { runner, timestamp } => {
                f.debug_struct("Split").field("runner", runner).field("timestamp", timestamp).finish()
            }
            RaceEvent::Finish { runner, timestamp } => {
                f.debug_struct("Finish").field("runner", runner).field("timestamp", timestamp).finish()
            }
            RaceEvent::Refresh => f.write_str("Refresh"),
            RaceEvent::RefreshComments => f.write_str("RefreshComments"),
            RaceEvent::Run(_) => f.write_str("Run(..)"),
        }
    }
}

/// Result of spawning a race task
pub struct RaceChannels {
    /// Sender for race events
    pub events: mpsc::Sender<RaceEvent>,
    /// Receiver for race summary updates
    pub summary: watch::Receiver<RaceSummary>,
    /// Cancellation token for shutdown
    pub cancel: CancellationToken,
}

/// Driver spawns and manages race tasks
///
/// Each race gets one task that owns the [`Race`] and applies its events one
/// at a time, so a race never sees two events concurrently while different
/// races run in parallel.
pub struct RaceDriver;

impl RaceDriver {
    /// Spawn the event task for `race`
    ///
    /// Returns the event sender, a summary receiver updated after every
    /// event, and the race's cancellation token.
    pub fn spawn(mut race: Race, capacity: usize) -> RaceChannels {
        let (event_tx, event_rx) = mpsc::channel(capacity.max(1));
        let (summary_tx, summary_rx) = watch::channel(race.summary());
        race.set_mailbox(event_tx.downgrade());
        let cancel = race.cancel_token();

        let cancel_task = cancel.clone();
        tokio::spawn(async move {
            Self::event_task(race, event_rx, summary_tx, cancel_task).await;
        });

        RaceChannels { events: event_tx, summary: summary_rx, cancel }
    }

    /// Event task - applies events until cancelled or every sender is gone
    async fn event_task(
        mut race: Race,
        mut events: mpsc::Receiver<RaceEvent>,
        summary_tx: watch::Sender<RaceSummary>,
        cancel: CancellationToken,
    ) {
        info!(race_id = %race.id(), "Race task started");
        let mut processed = 0u64;

        loop {
            let event = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    info!(race_id = %race.id(), "Race task cancelled");
                    break;
                }
                event = events.recv() => event,
            };

            let Some(event) = event else {
                debug!(race_id = %race.id(), "All event senders dropped, shutting down");
                break;
            };

            processed += 1;
            trace!(race_id = %race.id(), event = ?event, "Event {}", processed);
            Self::apply(&mut race, event).await;

            summary_tx.send_replace(race.summary());
        }

        info!(race_id = %race.id(), "Race task ended (processed {} events)", processed);
    }

    async fn apply(race: &mut Race, event: RaceEvent) {
        match event {
            RaceEvent::Split { runner, timestamp } => race.ingest_split(&runner, timestamp).await,
            RaceEvent::Finish { runner, timestamp } => race.ingest_finish(&runner, timestamp).await,
            RaceEvent::Refresh => race.update_race().await,
            RaceEvent::RefreshComments => race.refresh_comments().await,
            RaceEvent::Run(job) => job(race).await,
        }
    }
}
