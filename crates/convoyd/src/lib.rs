//! convoyd — logistics/alert network daemon.
//!
//! Library target so the integration tests can drive the server
//! in-process; `main.rs` is a thin wrapper that starts a
//! `server::Server` and waits on it.

pub mod dispatch;
pub mod send_worker;
pub mod server;
pub mod transport;
