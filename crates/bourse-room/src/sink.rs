//! Where room notifications go.
//!
//! A room never talks to sockets. It hands each notification to an
//! [`EventSink`] together with the player it is meant for; the transport
//! decides what delivery means.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use bourse_engine::Notification;
use bourse_protocol::PlayerId;
use dashmap::DashMap;
use tokio::sync::mpsc;

/// Receiver of room notifications.
///
/// Called from inside room actors, so it must not block.
pub trait EventSink: Send + Sync + 'static {
    fn deliver(&self, player: PlayerId, notification: Arc<Notification>);
}

/// Drops everything. For rooms nobody is watching.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl EventSink for NullSink {
    fn deliver(&self, _player: PlayerId, _notification: Arc<Notification>) {}
}

/// Receiving end of a subscription.
pub type NotificationReceiver = mpsc::UnboundedReceiver<Arc<Notification>>;

/// Identifies one subscription, so a stale connection cannot unsubscribe
/// the one that replaced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

#[derive(Debug)]
struct Subscription {
    id: SubscriptionId,
    sender: mpsc::UnboundedSender<Arc<Notification>>,
}

/// One channel per connected player, shared by every room.
#[derive(Debug, Default)]
pub struct Subscribers {
    channels: DashMap<PlayerId, Subscription>,
    next_id: AtomicU64,
}

impl Subscribers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens a channel for `player`, replacing any earlier one. The earlier
    /// receiver sees its channel close.
    pub fn subscribe(&self, player: PlayerId) -> (SubscriptionId, NotificationReceiver) {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let (sender, receiver) = mpsc::unbounded_channel();
        if self
            .channels
            .insert(player, Subscription { id, sender })
            .is_some()
        {
            tracing::debug!(%player, "subscription replaced");
        }
        (id, receiver)
    }

    /// Closes `player`'s channel if it is still the one `id` opened.
    pub fn unsubscribe(&self, player: PlayerId, id: SubscriptionId) -> bool {
        self.channels.remove_if(&player, |_, sub| sub.id == id).is_some()
    }

    pub fn is_subscribed(&self, player: PlayerId) -> bool {
        self.channels.contains_key(&player)
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }
}

impl EventSink for Subscribers {
    fn deliver(&self, player: PlayerId, notification: Arc<Notification>) {
        let closed = match self.channels.get(&player) {
            Some(sub) => sub.sender.send(notification).is_err(),
            None => return,
        };
        if closed {
            self.channels.remove_if(&player, |_, sub| sub.sender.is_closed());
        }
    }
}
