//! The gossip bus abstraction and the in-memory hub.
//!
//! The concrete transport/multiplexer/discovery stack is out of scope; the
//! coordinator only needs publish/subscribe over named topics. [`MemoryHub`]
//! implements the trait for tests and single-machine simulations by
//! fanning every published message out to every subscriber synchronously.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::message::GossipMessage;
use crate::P2pError;

// ---------------------------------------------------------------------------
// GossipBus
// ---------------------------------------------------------------------------

/// Handler invoked for each message on a subscribed topic.
pub type GossipHandler = Arc<dyn Fn(&str, &GossipMessage) + Send + Sync>;

/// Opaque handle returned by [`GossipBus::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub u64);

/// Topic-based publish/subscribe. Publishes are fire-and-forget.
pub trait GossipBus: Send + Sync {
    fn publish(&self, topic: &str, message: &GossipMessage) -> Result<(), P2pError>;
    fn subscribe(&self, topic: &str, handler: GossipHandler) -> SubscriptionId;
    fn unsubscribe(&self, topic: &str, id: SubscriptionId);
}

// ---------------------------------------------------------------------------
// MemoryHub
// ---------------------------------------------------------------------------

/// In-memory bus connecting every endpoint in this process.
///
/// Delivery is synchronous and in subscription order. Subscribers see their
/// own publishes too; the self-filter is the receiver's job, mirroring the
/// real gossip transport.
#[derive(Default)]
pub struct MemoryHub {
    next_id: AtomicU64,
    subscribers: Mutex<HashMap<String, Vec<(SubscriptionId, GossipHandler)>>>,
}

impl MemoryHub {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

impl GossipBus for MemoryHub {
    fn publish(&self, topic: &str, message: &GossipMessage) -> Result<(), P2pError> {
        // Clone the handler list out of the lock so handlers may publish
        // without re-entering it.
        let handlers: Vec<GossipHandler> = {
            let subs = self.subscribers.lock();
            subs.get(topic)
                .map(|list| list.iter().map(|(_, h)| Arc::clone(h)).collect())
                .unwrap_or_default()
        };
        for handler in handlers {
            handler(topic, message);
        }
        Ok(())
    }

    fn subscribe(&self, topic: &str, handler: GossipHandler) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::SeqCst));
        self.subscribers
            .lock()
            .entry(topic.to_owned())
            .or_default()
            .push((id, handler));
        id
    }

    fn unsubscribe(&self, topic: &str, id: SubscriptionId) {
        let mut subs = self.subscribers.lock();
        if let Some(list) = subs.get_mut(topic) {
            list.retain(|(sub_id, _)| *sub_id != id);
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::MessageType;
    use std::sync::atomic::AtomicUsize;

    fn message(sender: &str) -> GossipMessage {
        GossipMessage::new(MessageType::Announce, sender, 1, serde_json::json!({})).unwrap()
    }

    #[test]
    fn publish_reaches_topic_subscribers_only() {
        let hub = MemoryHub::new();
        let count = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&count);
        hub.subscribe(
            "announce",
            Arc::new(move |_, _| {
                c.fetch_add(1, Ordering::SeqCst);
            }),
        );

        hub.publish("announce", &message("p1")).unwrap();
        hub.publish("commands", &message("p1")).unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn unsubscribe_stops_delivery() {
        let hub = MemoryHub::new();
        let count = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&count);
        let id = hub.subscribe(
            "announce",
            Arc::new(move |_, _| {
                c.fetch_add(1, Ordering::SeqCst);
            }),
        );
        hub.publish("announce", &message("p1")).unwrap();
        hub.unsubscribe("announce", id);
        hub.publish("announce", &message("p1")).unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn handlers_may_publish_reentrantly() {
        let hub = MemoryHub::new();
        let count = Arc::new(AtomicUsize::new(0));

        let c = Arc::clone(&count);
        hub.subscribe(
            "second",
            Arc::new(move |_, _| {
                c.fetch_add(1, Ordering::SeqCst);
            }),
        );

        let hub_for_handler = Arc::clone(&hub);
        hub.subscribe(
            "first",
            Arc::new(move |_, msg| {
                hub_for_handler.publish("second", msg).unwrap();
            }),
        );

        hub.publish("first", &message("p1")).unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn multiple_subscribers_all_fire() {
        let hub = MemoryHub::new();
        let count = Arc::new(AtomicUsize::new(0));
        for _ in 0..3 {
            let c = Arc::clone(&count);
            hub.subscribe(
                "commands",
                Arc::new(move |_, _| {
                    c.fetch_add(1, Ordering::SeqCst);
                }),
            );
        }
        hub.publish("commands", &message("p1")).unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 3);
    }
}
