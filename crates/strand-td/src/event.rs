//! Event types emitted by trade sessions to downstream consumers.
//!
//! A session owns one [`EventHub`]. Consumers call
//! [`TradeSession::subscribe`](crate::TradeSession::subscribe) and get their
//! own [`EventSubscription`], an unbounded queue that sees every event
//! published after it was created, in publication order. Dropping or
//! cancelling the subscription unregisters it.
//!
//! [`SessionEvent::Ready`] is published at most once per hub, even if the
//! session re-authenticates after a reconnect.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

use strand_core::{ConnState, MarketId};
use tokio::sync::mpsc;
use tracing::debug;

/// A typed event emitted by a [`TradeSession`](crate::TradeSession).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// The connection state changed.
    StateChanged {
        from: ConnState,
        to: ConnState,
        /// Transport-level cause, when the change was caused by a failure.
        cause: Option<String>,
    },

    /// The session finished its handshake and accepts trading requests.
    Ready,

    /// An error reported by the service or the transport.
    Error {
        /// Market the error refers to, if any.
        market_id: Option<MarketId>,
        /// Human-readable description.
        message: String,
        /// Whether the connection is going down because of it.
        disconnecting: bool,
    },

    /// Result of the per-market subscriptions requested during auth.
    SubscriptionResult {
        /// Subscriptions the service refused.
        failed: Vec<String>,
    },
}

type Subscribers = Vec<(u64, mpsc::UnboundedSender<SessionEvent>)>;

/// Fan-out point for [`SessionEvent`]s.
#[derive(Default)]
pub struct EventHub {
    subscribers: Mutex<Subscribers>,
    next_id: AtomicU64,
    ready_fired: AtomicBool,
}

impl EventHub {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Register a new subscriber.
    pub fn subscribe(self: &Arc<Self>) -> EventSubscription {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.lock().push((id, tx));
        EventSubscription {
            id,
            rx,
            hub: Arc::downgrade(self),
        }
    }

    /// Deliver `event` to every live subscriber.
    ///
    /// A second `Ready` is dropped. Returns whether the event was delivered.
    pub fn publish(&self, event: SessionEvent) -> bool {
        if event == SessionEvent::Ready && self.ready_fired.swap(true, Ordering::SeqCst) {
            debug!("[event-hub] duplicate ready suppressed");
            return false;
        }
        let mut subs = self.lock();
        subs.retain(|(_, tx)| tx.send(event.clone()).is_ok());
        true
    }

    /// Whether `Ready` has been published.
    pub fn has_been_ready(&self) -> bool {
        self.ready_fired.load(Ordering::SeqCst)
    }

    /// Number of registered subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.lock().len()
    }

    /// Drop every subscriber, ending their streams.
    pub fn close(&self) {
        self.lock().clear();
    }

    fn unsubscribe(&self, id: u64) {
        self.lock().retain(|(sid, _)| *sid != id);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Subscribers> {
        self.subscribers.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Cancellable handle over one subscriber's event queue.
pub struct EventSubscription {
    id: u64,
    rx: mpsc::UnboundedReceiver<SessionEvent>,
    hub: Weak<EventHub>,
}

impl EventSubscription {
    /// Wait for the next event. `None` once the hub is closed or dropped.
    pub async fn recv(&mut self) -> Option<SessionEvent> {
        self.rx.recv().await
    }

    /// Take the next queued event without waiting.
    pub fn try_recv(&mut self) -> Option<SessionEvent> {
        self.rx.try_recv().ok()
    }

    /// Unregister from the hub. Equivalent to dropping the handle.
    pub fn cancel(self) {}
}

impl Drop for EventSubscription {
    fn drop(&mut self) {
        if let Some(hub) = self.hub.upgrade() {
            hub.unsubscribe(self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn every_subscriber_sees_events_in_order() {
        let hub = EventHub::new();
        let mut a = hub.subscribe();
        let mut b = hub.subscribe();

        hub.publish(SessionEvent::StateChanged {
            from: ConnState::Disconnected,
            to: ConnState::Connecting,
            cause: None,
        });
        hub.publish(SessionEvent::Ready);

        for sub in [&mut a, &mut b] {
            assert!(matches!(sub.recv().await, Some(SessionEvent::StateChanged { .. })));
            assert_eq!(sub.recv().await, Some(SessionEvent::Ready));
        }
    }

    #[tokio::test]
    async fn ready_is_published_at_most_once() {
        let hub = EventHub::new();
        let mut sub = hub.subscribe();
        assert!(hub.publish(SessionEvent::Ready));
        assert!(!hub.publish(SessionEvent::Ready));
        assert!(hub.has_been_ready());

        hub.close();
        assert_eq!(sub.recv().await, Some(SessionEvent::Ready));
        assert_eq!(sub.recv().await, None);
    }

    #[test]
    fn cancel_and_drop_unregister() {
        let hub = EventHub::new();
        let a = hub.subscribe();
        let b = hub.subscribe();
        assert_eq!(hub.subscriber_count(), 2);
        a.cancel();
        assert_eq!(hub.subscriber_count(), 1);
        drop(b);
        assert_eq!(hub.subscriber_count(), 0);
    }
}
