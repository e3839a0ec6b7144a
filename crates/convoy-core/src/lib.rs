//! convoy-core — wire message format and configuration.
//! All other Convoy crates depend on this one.

pub mod config;
pub mod wire;

pub use wire::{
    AlertKind, CredentialKind, InventoryKind, MessageType, NotificationKind, WireError,
    WireMessage,
};
