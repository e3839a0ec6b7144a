//! Convoy wire format — the JSON envelope exchanged between server and clients.
//!
//! Every message on the wire is one UTF-8 JSON object with exactly four
//! fields: `clientID`, `type`, `subType`, and `content`. There is no length
//! framing — one write is one message. Changing field names or numeric enum
//! values here is a breaking protocol change.

use serde_json::{json, Map, Value};

// ── Constants ─────────────────────────────────────────────────────────────────

/// Client id for a message that is not addressed to anyone yet.
/// The transport stamps the real id when the sender is known.
pub const UNADDRESSED: i64 = -1;

/// Maximum frame size read off a socket in one call.
pub const MAX_FRAME_BYTES: usize = 4096;

/// Liveness acknowledgment sent for every successfully decoded UDP datagram.
/// Raw bytes, not a wire message.
pub const UDP_ACK: &[u8] = b"Acknowledged";

// ── Message types ─────────────────────────────────────────────────────────────

/// Top-level message category. The numeric values are the wire encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i64)]
pub enum MessageType {
    Alert = 0,
    Notification = 1,
    Inventory = 2,
    Credentials = 3,
}

impl TryFrom<i64> for MessageType {
    type Error = WireError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(MessageType::Alert),
            1 => Ok(MessageType::Notification),
            2 => Ok(MessageType::Inventory),
            3 => Ok(MessageType::Credentials),
            other => Err(WireError::UnknownType(other)),
        }
    }
}

impl From<MessageType> for i64 {
    fn from(t: MessageType) -> i64 {
        t as i64
    }
}

/// Alert subtypes. Broadcast to every connected client regardless of
/// subscriptions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i64)]
pub enum AlertKind {
    Weather = 0,
    EnemyThreat = 1,
    Infection = 2,
}

impl TryFrom<i64> for AlertKind {
    type Error = WireError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(AlertKind::Weather),
            1 => Ok(AlertKind::EnemyThreat),
            2 => Ok(AlertKind::Infection),
            value => Err(WireError::UnknownSubType {
                kind: "alert",
                value,
            }),
        }
    }
}

impl From<AlertKind> for i64 {
    fn from(k: AlertKind) -> i64 {
        k as i64
    }
}

/// Notification categories a client can subscribe to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i64)]
pub enum NotificationKind {
    OnRoute = 0,
    Received = 1,
    NoStock = 2,
    Discarded = 3,
}

impl NotificationKind {
    /// Parse the category name used in SUBSCRIPTION message content.
    /// Unknown names are not an error — callers skip them.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "ON_ROUTE" => Some(NotificationKind::OnRoute),
            "RECEIVED" => Some(NotificationKind::Received),
            "NO_STOCK" => Some(NotificationKind::NoStock),
            "DISCARDED" => Some(NotificationKind::Discarded),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            NotificationKind::OnRoute => "ON_ROUTE",
            NotificationKind::Received => "RECEIVED",
            NotificationKind::NoStock => "NO_STOCK",
            NotificationKind::Discarded => "DISCARDED",
        }
    }
}

impl TryFrom<i64> for NotificationKind {
    type Error = WireError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(NotificationKind::OnRoute),
            1 => Ok(NotificationKind::Received),
            2 => Ok(NotificationKind::NoStock),
            3 => Ok(NotificationKind::Discarded),
            value => Err(WireError::UnknownSubType {
                kind: "notification",
                value,
            }),
        }
    }
}

impl From<NotificationKind> for i64 {
    fn from(k: NotificationKind) -> i64 {
        k as i64
    }
}

/// Inventory operation subtypes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i64)]
pub enum InventoryKind {
    Request = 0,
    Cancel = 1,
    Update = 2,
    Info = 3,
    History = 4,
}

impl TryFrom<i64> for InventoryKind {
    type Error = WireError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(InventoryKind::Request),
            1 => Ok(InventoryKind::Cancel),
            2 => Ok(InventoryKind::Update),
            3 => Ok(InventoryKind::Info),
            4 => Ok(InventoryKind::History),
            value => Err(WireError::UnknownSubType {
                kind: "inventory",
                value,
            }),
        }
    }
}

impl From<InventoryKind> for i64 {
    fn from(k: InventoryKind) -> i64 {
        k as i64
    }
}

/// Credential action subtypes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i64)]
pub enum CredentialKind {
    Login = 0,
    Logout = 1,
    Subscription = 2,
}

impl TryFrom<i64> for CredentialKind {
    type Error = WireError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(CredentialKind::Login),
            1 => Ok(CredentialKind::Logout),
            2 => Ok(CredentialKind::Subscription),
            value => Err(WireError::UnknownSubType {
                kind: "credential",
                value,
            }),
        }
    }
}

impl From<CredentialKind> for i64 {
    fn from(k: CredentialKind) -> i64 {
        k as i64
    }
}

// ── Wire message ──────────────────────────────────────────────────────────────

/// One decoded wire message.
///
/// `kind` and `sub_kind` stay raw integers: decoding checks shape only, and
/// the router is the one place that rejects out-of-range values. `content` is
/// an owned JSON tree — cloning a message deep-copies it, so no two messages
/// ever alias the same content.
#[derive(Debug, Clone, PartialEq)]
pub struct WireMessage {
    pub client_id: i64,
    pub kind: i64,
    pub sub_kind: i64,
    content: Value,
}

impl WireMessage {
    /// Build an unaddressed message. `content` must be a JSON object; anything
    /// else is replaced with an empty object so content is never null.
    pub fn new(kind: MessageType, sub_kind: impl Into<i64>, content: Value) -> Self {
        Self::addressed(UNADDRESSED, kind, sub_kind, content)
    }

    /// Build a message addressed to a specific client.
    pub fn addressed(
        client_id: i64,
        kind: MessageType,
        sub_kind: impl Into<i64>,
        content: Value,
    ) -> Self {
        let content = match content {
            Value::Object(map) => Value::Object(map),
            _ => Value::Object(Map::new()),
        };
        Self {
            client_id,
            kind: kind.into(),
            sub_kind: sub_kind.into(),
            content,
        }
    }

    pub fn content(&self) -> &Value {
        &self.content
    }

    /// Encode into the flat wire object. Lossless; `decode` round-trips it.
    pub fn encode(&self) -> Vec<u8> {
        json!({
            "clientID": self.client_id,
            "type": self.kind,
            "subType": self.sub_kind,
            "content": self.content,
        })
        .to_string()
        .into_bytes()
    }

    /// Decode a frame. All-or-nothing: either all four fields have the right
    /// shape and a message is produced, or a `WireError` and nothing else.
    ///
    /// Shape check only — a numeric `type` outside the known enum range still
    /// decodes; the router drops it later.
    pub fn decode(bytes: &[u8]) -> Result<Self, WireError> {
        let root: Value = serde_json::from_slice(bytes).map_err(WireError::InvalidJson)?;
        let obj = root.as_object().ok_or(WireError::NotAnObject)?;

        let client_id = number_field(obj, "clientID")?;
        let kind = number_field(obj, "type")?;
        let sub_kind = number_field(obj, "subType")?;
        let content = match obj.get("content") {
            Some(Value::Object(map)) => Value::Object(map.clone()),
            _ => return Err(WireError::BadContent),
        };

        Ok(Self {
            client_id,
            kind,
            sub_kind,
            content,
        })
    }
}

/// Extract a required numeric field. Accepts integer or float; floats are
/// truncated.
fn number_field(obj: &Map<String, Value>, name: &'static str) -> Result<i64, WireError> {
    let value = obj.get(name).ok_or(WireError::BadField(name))?;
    value
        .as_i64()
        .or_else(|| value.as_f64().map(|f| f as i64))
        .ok_or(WireError::BadField(name))
}

// ── Errors ────────────────────────────────────────────────────────────────────

/// Errors that can arise when interpreting wire-format data.
#[derive(Debug, thiserror::Error)]
pub enum WireError {
    #[error("invalid JSON: {0}")]
    InvalidJson(#[source] serde_json::Error),

    #[error("message is not a JSON object")]
    NotAnObject,

    #[error("field `{0}` missing or not a number")]
    BadField(&'static str),

    #[error("field `content` missing or not an object")]
    BadContent,

    #[error("unknown message type: {0}")]
    UnknownType(i64),

    #[error("unknown {kind} subtype: {value}")]
    UnknownSubType { kind: &'static str, value: i64 },
}

impl WireError {
    /// True for the decode-time shape failures (as opposed to the
    /// routing-time unknown type/subtype rejections).
    pub fn is_malformed(&self) -> bool {
        matches!(
            self,
            WireError::InvalidJson(_)
                | WireError::NotAnObject
                | WireError::BadField(_)
                | WireError::BadContent
        )
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
