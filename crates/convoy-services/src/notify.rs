//! Notification system — per-client subscriptions and message fan-out.
//!
//! Outbound delivery is decoupled from the transport: the system pushes
//! fully-formed wire messages into the daemon's send queue and never blocks
//! on a socket.

use std::collections::HashSet;
use std::sync::Arc;

use dashmap::DashMap;
use serde_json::json;
use tokio::sync::mpsc;

use convoy_core::wire::{AlertKind, MessageType, NotificationKind, WireMessage};

/// Categories every client starts subscribed to.
pub const DEFAULT_SUBSCRIPTIONS: [NotificationKind; 3] = [
    NotificationKind::OnRoute,
    NotificationKind::Received,
    NotificationKind::NoStock,
];

/// Subscription registry plus alert/notification fan-out.
#[derive(Clone)]
pub struct NotificationSystem {
    /// clientID -> subscribed categories. Presence in the map means
    /// "registered" — an empty set is a registered client with everything
    /// unsubscribed, which is not the same as absence.
    subscriptions: Arc<DashMap<i64, HashSet<NotificationKind>>>,
    outbound: mpsc::UnboundedSender<WireMessage>,
}

impl NotificationSystem {
    pub fn new(outbound: mpsc::UnboundedSender<WireMessage>) -> Self {
        Self {
            subscriptions: Arc::new(DashMap::new()),
            outbound,
        }
    }

    /// Register a client with the default category set.
    pub fn register_client(&self, client_id: i64) {
        self.subscriptions
            .insert(client_id, DEFAULT_SUBSCRIPTIONS.into_iter().collect());
    }

    /// Remove a client and all their subscriptions.
    pub fn remove_client(&self, client_id: i64) {
        self.subscriptions.remove(&client_id);
    }

    pub fn is_subscribed(&self, client_id: i64, kind: NotificationKind) -> bool {
        self.subscriptions
            .get(&client_id)
            .map(|set| set.contains(&kind))
            .unwrap_or(false)
    }

    /// Idempotent set insert. Registers the client with an empty set first
    /// if they were unknown.
    pub fn subscribe(&self, client_id: i64, kind: NotificationKind) {
        self.subscriptions.entry(client_id).or_default().insert(kind);
    }

    /// Idempotent set erase. Unknown clients are left unregistered.
    pub fn unsubscribe(&self, client_id: i64, kind: NotificationKind) {
        if let Some(mut set) = self.subscriptions.get_mut(&client_id) {
            set.remove(&kind);
        }
    }

    /// Queue one alert per registered client.
    ///
    /// Alerts deliberately bypass the subscription check — they are
    /// safety-critical and go to everyone, unlike notifications.
    pub fn broadcast_alert(&self, kind: AlertKind, text: &str) {
        for entry in self.subscriptions.iter() {
            let msg = WireMessage::addressed(
                *entry.key(),
                MessageType::Alert,
                kind,
                json!({ "message": text }),
            );
            self.queue(msg);
        }
    }

    /// Queue a notification for one client, only if they are subscribed to
    /// the category. Returns whether a send was attempted; an unsubscribed
    /// or unregistered client reports false, not an error.
    pub fn notify(&self, client_id: i64, kind: NotificationKind, text: &str) -> bool {
        if !self.is_subscribed(client_id, kind) {
            return false;
        }
        self.queue(WireMessage::addressed(
            client_id,
            MessageType::Notification,
            kind,
            json!({ "message": text }),
        ));
        true
    }

    fn queue(&self, msg: WireMessage) {
        // Only fails when the send worker is gone, i.e. during shutdown.
        if self.outbound.send(msg).is_err() {
            tracing::debug!("outbound queue closed, dropping message");
        }
    }
}
