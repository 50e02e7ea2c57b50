//! Dwell-to-read tracking.
//!
//! Focusing a message arms a single timer. If focus stays on the message
//! until the timer fires, the message is marked read on the backend and the
//! unread badge of its connection goes down by one. Moving focus elsewhere
//! (or to another message) cancels the armed timer.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::api::{ApiClient, Connection};
use crate::feed::MessageFeed;
use crate::session::Session;

/// What happened to one armed timer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadOutcome {
    /// Marked read; `remaining` is the connection's new unread count
    Marked { remaining: u32 },
    /// Focus moved before the delay elapsed
    Cancelled,
    /// The backend call failed (already logged)
    Failed,
}

type UnreadCounts = Arc<Mutex<HashMap<String, u32>>>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Decrements a connection's unread count. A count of one (or none) clears it.
fn decrement_unread(counts: &mut HashMap<String, u32>, connection_id: &str) -> u32 {
    match counts.get_mut(connection_id) {
        Some(count) if *count > 1 => {
            *count -= 1;
            *count
        }
        _ => {
            counts.remove(connection_id);
            0
        }
    }
}

#[derive(Debug)]
pub struct ReadTracker {
    api: ApiClient,
    session: Session,
    delay: Duration,
    armed: Mutex<Option<CancellationToken>>,
    unread: UnreadCounts,
}

impl ReadTracker {
    pub fn new(api: ApiClient, session: Session, delay: Duration) -> Self {
        Self {
            api,
            session,
            delay,
            armed: Mutex::new(None),
            unread: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Replaces the known unread counts with a fresh connection snapshot.
    pub fn sync_counts(&self, connections: &[Connection]) {
        let mut counts = lock(&self.unread);
        counts.clear();
        for conn in connections {
            if conn.unread_message_count > 0 {
                counts.insert(conn.id.clone(), conn.unread_message_count);
            }
        }
    }

    pub fn unread(&self, connection_id: &str) -> u32 {
        lock(&self.unread)
            .get(connection_id)
            .copied()
            .unwrap_or(0)
    }

    /// Focus moved onto a message: arm the dwell timer for it.
    ///
    /// The message's connection comes from the feed it was displayed
    /// through. Own messages (no connection) have nothing to mark and
    /// return `None`, but still disarm any previous timer.
    ///
    /// Any previously armed timer is cancelled. The returned handle resolves
    /// once the timer fires or is cancelled; dropping it does not cancel.
    pub fn hover(&self, feed: &MessageFeed, message_id: &str) -> Option<JoinHandle<ReadOutcome>> {
        let Some(connection_id) = feed.connection_for(message_id) else {
            self.leave();
            return None;
        };
        let token = CancellationToken::new();
        if let Some(previous) = lock(&self.armed).replace(token.clone()) {
            previous.cancel();
        }

        let api = self.api.clone();
        let session = self.session.clone();
        let unread = Arc::clone(&self.unread);
        let delay = self.delay;
        let message_id = message_id.to_string();
        let connection_id = connection_id.to_string();

        Some(tokio::spawn(async move {
            tokio::select! {
                () = token.cancelled() => ReadOutcome::Cancelled,
                () = tokio::time::sleep(delay) => {
                    match api.mark_message_read(&session, &message_id).await {
                        Ok(()) => {
                            let remaining = decrement_unread(&mut lock(&unread), &connection_id);
                            tracing::debug!(%message_id, %connection_id, remaining, "message marked read");
                            ReadOutcome::Marked { remaining }
                        }
                        Err(err) => {
                            tracing::warn!(%message_id, error = %err, "mark read failed");
                            ReadOutcome::Failed
                        }
                    }
                }
            }
        }))
    }

    /// Focus left the message: cancel the armed timer, if any.
    pub fn leave(&self) {
        if let Some(token) = lock(&self.armed).take() {
            token.cancel();
        }
    }
}
