//! convoy-services — shared server state and collaborators.
//!
//! Everything here is owned behind `Arc`ed maps so the daemon's tasks can
//! share one handle per service. The services never touch sockets directly;
//! outbound messages go through the daemon's send queue.

pub mod auth;
pub mod event_log;
pub mod inventory;
pub mod notify;
pub mod registry;

pub use auth::Authentication;
pub use event_log::{EventLog, LogLevel};
pub use inventory::{InventoryManager, Transaction};
pub use notify::NotificationSystem;
pub use registry::{ClientConnection, ClientTransport, ConnectionRegistry, Protocol};
