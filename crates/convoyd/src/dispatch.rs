//! Dispatch router — classifies decoded messages and drives the
//! collaborators.
//!
//! Classification is a one-shot step, not a state machine: a message either
//! maps onto a `Routed` action or it is dropped. Unroutable traffic is
//! expected (future protocol extensions) and is never an error.

use serde_json::{json, Value};
use tokio::sync::mpsc;

use convoy_core::wire::{
    AlertKind, CredentialKind, InventoryKind, MessageType, NotificationKind, WireMessage,
};
use convoy_services::{Authentication, EventLog, InventoryManager, LogLevel, NotificationSystem};

/// One validated line item of an INVENTORY/REQUEST.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProductRequest {
    pub id: i64,
    pub quantity: i64,
}

/// The routable actions, with their payloads already validated.
///
/// Replacing the (type, subType) switch ladder with a sum type makes the
/// drop-unknown fallback an exhaustiveness-checked `None` instead of a
/// scattering of default arms.
#[derive(Debug, Clone, PartialEq)]
pub enum Routed {
    Alert(AlertKind),
    Login {
        password: String,
    },
    Logout,
    Subscription {
        subscribe: Vec<NotificationKind>,
        unsubscribe: Vec<NotificationKind>,
    },
    InventoryRequest(Vec<ProductRequest>),
    InventoryInfo,
    TransactionHistory,
}

/// Map a decoded message onto a routed action. `None` means unroutable:
/// unknown type, unknown/unhandled subtype, or content missing the fields
/// the action requires.
pub fn classify(msg: &WireMessage) -> Option<Routed> {
    match MessageType::try_from(msg.kind).ok()? {
        MessageType::Alert => AlertKind::try_from(msg.sub_kind).ok().map(Routed::Alert),

        // Notifications are server-to-client only; inbound ones are dropped.
        MessageType::Notification => None,

        MessageType::Inventory => match InventoryKind::try_from(msg.sub_kind).ok()? {
            InventoryKind::Request => parse_products(msg.content()).map(Routed::InventoryRequest),
            InventoryKind::Info => Some(Routed::InventoryInfo),
            InventoryKind::History => Some(Routed::TransactionHistory),
            InventoryKind::Cancel | InventoryKind::Update => None,
        },

        MessageType::Credentials => match CredentialKind::try_from(msg.sub_kind).ok()? {
            CredentialKind::Login => msg
                .content()
                .get("password")
                .and_then(Value::as_str)
                .map(|password| Routed::Login {
                    password: password.to_string(),
                }),
            CredentialKind::Logout => Some(Routed::Logout),
            CredentialKind::Subscription => Some(Routed::Subscription {
                subscribe: parse_categories(msg.content().get("subscribe")),
                unsubscribe: parse_categories(msg.content().get("unsubscribe")),
            }),
        },
    }
}

/// Parse the `products` array of an inventory request. The array itself is
/// required; entries with non-numeric id or quantity are skipped, not fatal.
fn parse_products(content: &Value) -> Option<Vec<ProductRequest>> {
    let products = content.get("products")?.as_array()?;
    Some(
        products
            .iter()
            .filter_map(|product| {
                let id = product.get("id")?.as_i64()?;
                let quantity = product.get("quantity")?.as_i64()?;
                Some(ProductRequest { id, quantity })
            })
            .collect(),
    )
}

/// Parse a subscribe/unsubscribe string array. Unknown category names and
/// non-string entries are ignored; a missing field is an empty list.
fn parse_categories(field: Option<&Value>) -> Vec<NotificationKind> {
    field
        .and_then(Value::as_array)
        .map(|entries| {
            entries
                .iter()
                .filter_map(Value::as_str)
                .filter_map(NotificationKind::from_name)
                .collect()
        })
        .unwrap_or_default()
}

/// Owns the collaborator handles and consumes inbound messages.
pub struct Dispatcher {
    auth: Authentication,
    inventory: InventoryManager,
    notifications: NotificationSystem,
    event_log: EventLog,
    outbound: mpsc::UnboundedSender<WireMessage>,
}

impl Dispatcher {
    pub fn new(
        auth: Authentication,
        inventory: InventoryManager,
        notifications: NotificationSystem,
        event_log: EventLog,
        outbound: mpsc::UnboundedSender<WireMessage>,
    ) -> Self {
        Self {
            auth,
            inventory,
            notifications,
            event_log,
            outbound,
        }
    }

    /// Consume one message: forward a derived request to a collaborator or
    /// drop it. Each message takes exactly one of these paths.
    pub fn dispatch(&self, msg: WireMessage) {
        let sender = msg.client_id;
        let routed = match classify(&msg) {
            Some(r) => r,
            None => {
                tracing::debug!(
                    client_id = sender,
                    kind = msg.kind,
                    sub_kind = msg.sub_kind,
                    "unroutable message dropped"
                );
                return;
            }
        };

        match routed {
            Routed::Alert(kind) => self.handle_alert(sender, kind, &msg),
            Routed::Login { password } => self.handle_login(sender, &password),
            Routed::Logout => self.handle_logout(sender),
            Routed::Subscription {
                subscribe,
                unsubscribe,
            } => self.handle_subscription(sender, &subscribe, &unsubscribe),
            Routed::InventoryRequest(products) => self.handle_inventory_request(sender, &products),
            Routed::InventoryInfo => self.handle_inventory_info(sender),
            Routed::TransactionHistory => self.handle_transaction_history(sender),
        }
    }

    fn handle_alert(&self, sender: i64, kind: AlertKind, msg: &WireMessage) {
        let text = msg
            .content()
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("");
        self.event_log.log_event(
            "Dispatcher",
            LogLevel::Warning,
            &format!("client {sender} raised {kind:?} alert"),
        );
        self.notifications.broadcast_alert(kind, text);
    }

    fn handle_login(&self, sender: i64, password: &str) {
        if self.auth.authenticate(sender, password) {
            self.event_log.log_event(
                "Dispatcher",
                LogLevel::Info,
                &format!("client {sender} logged in"),
            );
        } else {
            self.event_log.log_event(
                "Dispatcher",
                LogLevel::Warning,
                &format!("client {sender} failed login"),
            );
        }
    }

    fn handle_logout(&self, sender: i64) {
        self.auth.set_logged_out(sender);
        self.event_log.log_event(
            "Dispatcher",
            LogLevel::Info,
            &format!("client {sender} logged out"),
        );
    }

    fn handle_subscription(
        &self,
        sender: i64,
        subscribe: &[NotificationKind],
        unsubscribe: &[NotificationKind],
    ) {
        for &kind in subscribe {
            self.notifications.subscribe(sender, kind);
        }
        for &kind in unsubscribe {
            self.notifications.unsubscribe(sender, kind);
        }
        self.event_log.log_event(
            "Dispatcher",
            LogLevel::Info,
            &format!(
                "client {sender} updated subscriptions (+{} -{})",
                subscribe.len(),
                unsubscribe.len()
            ),
        );
    }

    fn handle_inventory_request(&self, sender: i64, products: &[ProductRequest]) {
        for product in products {
            if self.inventory.decrease_stock(product.id, product.quantity) {
                self.inventory
                    .log_transaction(sender, product.id, product.quantity);
            } else {
                self.notifications.notify(
                    sender,
                    NotificationKind::NoStock,
                    &format!("Item {} out of stock", product.id),
                );
            }
        }
        self.event_log.log_event(
            "Dispatcher",
            LogLevel::Info,
            &format!(
                "client {sender} requested {} inventory line(s)",
                products.len()
            ),
        );
    }

    fn handle_inventory_info(&self, sender: i64) {
        let snapshot = self.inventory.client_inventory(sender).unwrap_or(json!({}));
        self.queue_reply(WireMessage::addressed(
            sender,
            MessageType::Inventory,
            InventoryKind::Info,
            json!({ "inventory": snapshot }),
        ));
    }

    fn handle_transaction_history(&self, sender: i64) {
        let history = self.inventory.transaction_history(sender);
        let transactions = serde_json::to_value(&history).unwrap_or_else(|_| json!([]));
        self.queue_reply(WireMessage::addressed(
            sender,
            MessageType::Inventory,
            InventoryKind::History,
            json!({ "transactions": transactions }),
        ));
    }

    fn queue_reply(&self, msg: WireMessage) {
        if self.outbound.send(msg).is_err() {
            tracing::debug!("outbound queue closed, reply dropped");
        }
    }
}
