//! Periodic connection-info refresh.
//!
//! Polls `/get-connection-info` immediately and then on a fixed interval.
//! Subscribers always see the most recent successful snapshot; a failed poll
//! is logged and leaves the previous snapshot in place.

use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::api::{ApiClient, ApiResult, Connection};
use crate::session::Session;

/// One successful poll result.
#[derive(Debug, Clone)]
pub struct Snapshot {
    /// Monotonic counter of successful polls, starting at 1
    pub sequence: u64,
    pub fetched_at: DateTime<Utc>,
    pub connections: Vec<Connection>,
}

impl Snapshot {
    pub fn unread_total(&self) -> u32 {
        self.connections
            .iter()
            .map(|c| c.unread_message_count)
            .sum()
    }

    pub fn pending(&self) -> impl Iterator<Item = &Connection> {
        self.connections.iter().filter(|c| c.status.is_pending())
    }
}

#[derive(Debug)]
pub struct ConnectionPoller {
    api: ApiClient,
    session: Session,
    interval: Duration,
}

impl ConnectionPoller {
    pub fn new(api: ApiClient, session: Session, interval: Duration) -> Self {
        Self {
            api,
            session,
            interval,
        }
    }

    /// Fetches connection info once.
    ///
    /// # Errors
    /// Returns an error if the backend call fails.
    pub async fn poll_once(&self) -> ApiResult<Vec<Connection>> {
        self.api.get_connection_info(&self.session).await
    }

    /// Starts polling in the background.
    pub fn start(self) -> PollerHandle {
        let (tx, rx) = watch::channel(None);
        let cancel = CancellationToken::new();
        let task_cancel = cancel.clone();

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut sequence = 0u64;

            tracing::info!(interval_secs = self.interval.as_secs(), "connection poller started");
            loop {
                tokio::select! {
                    () = task_cancel.cancelled() => break,
                    _ = ticker.tick() => {}
                }

                let result = tokio::select! {
                    () = task_cancel.cancelled() => break,
                    result = self.poll_once() => result,
                };

                match result {
                    Ok(connections) => {
                        sequence += 1;
                        tracing::debug!(sequence, count = connections.len(), "connection info refreshed");
                        tx.send_replace(Some(Snapshot {
                            sequence,
                            fetched_at: Utc::now(),
                            connections,
                        }));
                    }
                    Err(err) => {
                        tracing::warn!(error = %err, "connection info refresh failed");
                    }
                }
            }
            tracing::info!("connection poller stopped");
        });

        PollerHandle {
            snapshots: rx,
            cancel,
            task,
        }
    }
}

/// Handle to a running poller. Dropping it does not stop the poller;
/// call [`PollerHandle::stop`].
#[derive(Debug)]
pub struct PollerHandle {
    snapshots: watch::Receiver<Option<Snapshot>>,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl PollerHandle {
    /// Returns a receiver that is notified on every new snapshot.
    pub fn subscribe(&self) -> watch::Receiver<Option<Snapshot>> {
        self.snapshots.clone()
    }

    pub fn latest(&self) -> Option<Snapshot> {
        self.snapshots.borrow().clone()
    }

    /// Cancels the poller and waits for it to finish.
    pub async fn stop(self) {
        self.cancel.cancel();
        if let Err(err) = self.task.await {
            tracing::warn!(error = %err, "connection poller task failed");
        }
    }
}
