//! Event fanout
//!
//! Ordered multicast of session events to whoever is currently subscribed to
//! a session id. Every subscriber owns a bounded buffer: when one is full the
//! event is dropped for that subscriber only, and a subscriber whose receiver
//! has gone away is pruned on the next publish. Each channel keeps one slot
//! in reserve for the final event handed to [`Fanout::close`], so even a
//! saturated subscriber learns that its stream is ending. There is no
//! replay; late subscribers start from a registry snapshot.

use crate::session::SessionEvent;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

/// Per-subscriber buffer size
pub const DEFAULT_BUFFER: usize = 256;

struct Subscriber {
    id: u64,
    tx: mpsc::Sender<SessionEvent>,
}

/// Identifies one subscription for [`Fanout::unsubscribe`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionHandle {
    pub session_id: String,
    pub id: u64,
}

/// Receiving end of one subscription
#[derive(Debug)]
pub struct Subscription {
    pub handle: SubscriptionHandle,
    pub rx: mpsc::Receiver<SessionEvent>,
}

pub struct Fanout {
    buffer: usize,
    next_id: AtomicU64,
    subscribers: Mutex<HashMap<String, Vec<Subscriber>>>,
}

impl Default for Fanout {
    fn default() -> Self {
        Self::with_buffer(DEFAULT_BUFFER)
    }
}

impl Fanout {
    pub fn with_buffer(buffer: usize) -> Self {
        Self {
            buffer: buffer.max(1),
            next_id: AtomicU64::new(1),
            subscribers: Mutex::new(HashMap::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Vec<Subscriber>>> {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub fn subscribe(&self, session_id: &str) -> Subscription {
        let (tx, rx) = mpsc::channel(self.buffer + 1);
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.lock()
            .entry(session_id.to_string())
            .or_default()
            .push(Subscriber { id, tx });
        tracing::debug!(session_id = %session_id, subscriber = id, "Subscribed");
        Subscription {
            handle: SubscriptionHandle {
                session_id: session_id.to_string(),
                id,
            },
            rx,
        }
    }

    pub fn unsubscribe(&self, handle: &SubscriptionHandle) {
        let mut subscribers = self.lock();
        if let Some(list) = subscribers.get_mut(&handle.session_id) {
            list.retain(|s| s.id != handle.id);
            if list.is_empty() {
                subscribers.remove(&handle.session_id);
            }
        }
    }

    /// Deliver `event` to every current subscriber of `session_id`.
    ///
    /// Returns the number of subscribers that accepted the event.
    pub fn publish(&self, session_id: &str, event: &SessionEvent) -> usize {
        let mut subscribers = self.lock();
        let Some(list) = subscribers.get_mut(session_id) else {
            return 0;
        };

        let mut delivered = 0;
        list.retain(|subscriber| {
            if subscriber.tx.is_closed() {
                return false;
            }
            // Last slot belongs to the closing event
            if subscriber.tx.capacity() > 1 && subscriber.tx.try_send(event.clone()).is_ok() {
                delivered += 1;
            } else {
                tracing::warn!(
                    session_id = %session_id,
                    subscriber = subscriber.id,
                    event = event.kind(),
                    "Subscriber buffer full, dropping event"
                );
            }
            true
        });

        if list.is_empty() {
            subscribers.remove(session_id);
        }
        delivered
    }

    /// Deliver `last` to every subscriber, using the reserved slot if the
    /// buffer is full, then drop them all so their streams end
    pub fn close(&self, session_id: &str, last: &SessionEvent) {
        let Some(list) = self.lock().remove(session_id) else {
            return;
        };
        for subscriber in &list {
            if let Err(TrySendError::Full(_)) = subscriber.tx.try_send(last.clone()) {
                tracing::warn!(
                    session_id = %session_id,
                    subscriber = subscriber.id,
                    event = last.kind(),
                    "Reserved slot already used, final event dropped"
                );
            }
        }
        tracing::debug!(session_id = %session_id, count = list.len(), "Closed subscribers");
    }

    #[cfg(test)]
    pub fn subscriber_count(&self, session_id: &str) -> usize {
        self.lock().get(session_id).map_or(0, Vec::len)
    }
}
