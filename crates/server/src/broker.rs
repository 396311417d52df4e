//! In-process event fan-out.
//!
//! [`EventBroker`] delivers live watch events to subscribed watchers.
//! Each subscription owns a bounded buffer; publishing never blocks —
//! when a subscriber's buffer is full the event is dropped for that
//! subscriber and recovered later from the durable log by its watch
//! bridge. The broker is a latency optimizer, not the source of truth.
//!
//! Lock discipline: `subscribe`/`unsubscribe` take the write lock,
//! `publish` takes the read lock and performs non-blocking sends only.

use std::collections::HashMap;
use std::task::{Context, Poll};

use nodewatch_proto::proto::WatchEventsResponse;
use parking_lot::RwLock;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::debug;

/// Pending-event buffer capacity per subscription.
pub const SUBSCRIPTION_BUFFER: usize = 100;

/// Fan-out hub for live watch events.
#[derive(Debug, Default)]
pub struct EventBroker {
    subscribers: RwLock<HashMap<String, mpsc::Sender<WatchEventsResponse>>>,
}

/// Receiving half of one subscription, owned by the watcher stream.
///
/// Dropping the subscription (or the stream wrapping it) makes further
/// publishes to it fail, which is how the broker learns the watcher is
/// gone between explicit unsubscribes.
#[derive(Debug)]
pub struct Subscription {
    id: String,
    rx: mpsc::Receiver<WatchEventsResponse>,
}

impl Subscription {
    /// Subscriber id this handle belongs to.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Waits for the next buffered event; `None` once the broker has
    /// closed this subscription (overwrite or shutdown).
    pub async fn recv(&mut self) -> Option<WatchEventsResponse> {
        self.rx.recv().await
    }

    /// Poll-based variant of [`recv`](Self::recv) for stream impls.
    pub fn poll_recv(&mut self, cx: &mut Context<'_>) -> Poll<Option<WatchEventsResponse>> {
        self.rx.poll_recv(cx)
    }
}

impl EventBroker {
    /// Creates a broker with no subscribers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a subscriber under `id` with a fresh buffer.
    ///
    /// A duplicate id overwrites the prior handle; the prior
    /// subscription's buffer closes and its `recv` returns `None`.
    pub fn subscribe(&self, id: &str) -> Subscription {
        let (tx, rx) = mpsc::channel(SUBSCRIPTION_BUFFER);
        self.subscribers.write().insert(id.to_string(), tx);
        Subscription { id: id.to_string(), rx }
    }

    /// Removes a subscriber, closing its buffer.
    pub fn unsubscribe(&self, id: &str) {
        self.subscribers.write().remove(id);
    }

    /// Whether `id` currently has a live subscription.
    pub fn is_subscribed(&self, id: &str) -> bool {
        self.subscribers.read().contains_key(id)
    }

    /// Number of live subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }

    /// Enqueues `event` on every subscription without blocking.
    /// Returns how many subscribers accepted it; full buffers drop the
    /// event for that subscriber.
    pub fn publish(&self, event: &WatchEventsResponse) -> usize {
        let subscribers = self.subscribers.read();
        let mut delivered = 0;
        for (id, tx) in subscribers.iter() {
            match tx.try_send(event.clone()) {
                Ok(()) => delivered += 1,
                Err(TrySendError::Full(_)) => {
                    debug!(subscriber_id = %id, "subscriber buffer full, dropping event");
                },
                // Receiver already dropped; its Drop unsubscribes
                Err(TrySendError::Closed(_)) => {},
            }
        }
        delivered
    }
}
