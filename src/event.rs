//! Typed publish/subscribe channel.
//!
//! An [`EventChannel`] decouples a producer (a transport that just framed an
//! incoming message, or changed connection state) from whatever consumes the
//! event. Each subscriber gets its own unbounded inbox; `publish` clones the
//! event into every current inbox synchronously and in subscription order.
//! There is no backpressure.
//!
//! Consumers read their inbox from their own task, so a consumer reacting to
//! an event (for example by sending another message) never re-enters the
//! producer.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

use tokio::sync::mpsc;

/// Identifies one subscription on one channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(u64);

/// Handle returned from [`EventChannel::subscribe`].
///
/// Dropping the handle closes the inbox; the channel prunes closed inboxes
/// on the next publish.
pub struct EventSubscription<T> {
    pub id: SubscriberId,

    /// Receiver for events published after the subscription was made.
    pub inbox: mpsc::UnboundedReceiver<T>,
}

pub struct EventChannel<T> {
    subscribers: Mutex<Vec<(SubscriberId, mpsc::UnboundedSender<T>)>>,
    next_id: AtomicU64,
}

/// Acquire mutex guard, ignoring poisoning
pub(crate) fn lock_ignore_poison<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    match m.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

impl<T: Clone> EventChannel<T> {
    // ---
    pub fn new() -> Self {
        Self {
            subscribers: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Register a new subscriber.
    ///
    /// Events published after this returns are delivered to the inbox.
    pub fn subscribe(&self) -> EventSubscription<T> {
        // ---
        let (tx, rx) = mpsc::unbounded_channel();
        let id = SubscriberId(self.next_id.fetch_add(1, Ordering::Relaxed));

        lock_ignore_poison(&self.subscribers).push((id, tx));

        EventSubscription { id, inbox: rx }
    }

    /// Deliver `event` to every current subscriber.
    ///
    /// Returns how many subscribers received it.
    pub fn publish(&self, event: T) -> usize {
        // ---
        let mut subs = lock_ignore_poison(&self.subscribers);

        // A closed inbox means the subscription handle was dropped.
        subs.retain(|(_, tx)| tx.send(event.clone()).is_ok());
        subs.len()
    }

    /// Remove one subscriber. Returns false if it was not registered.
    pub fn unsubscribe(&self, id: SubscriberId) -> bool {
        // ---
        let mut subs = lock_ignore_poison(&self.subscribers);
        let before = subs.len();
        subs.retain(|(sub_id, _)| *sub_id != id);
        subs.len() != before
    }

    /// Remove every subscriber, returning how many were removed.
    pub fn unsubscribe_all(&self) -> usize {
        let mut subs = lock_ignore_poison(&self.subscribers);
        let removed = subs.len();
        subs.clear();
        removed
    }

    pub fn subscriber_count(&self) -> usize {
        lock_ignore_poison(&self.subscribers).len()
    }
}

impl<T: Clone> Default for EventChannel<T> {
    fn default() -> Self {
        Self::new()
    }
}
