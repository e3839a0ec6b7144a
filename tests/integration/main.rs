//! Convoy integration test harness.
//!
//! Tests run a full server in-process on loopback with ephemeral ports
//! and talk to it over real sockets. Each test starts its own server, so
//! client ids always count from 1 and tests never share state.

mod infra;
mod tcp_flow;
mod udp_flow;
