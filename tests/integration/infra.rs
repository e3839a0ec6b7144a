//! Shared harness: an in-process server plus frame helpers.

use std::net::SocketAddr;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use convoy_core::config::ConvoyConfig;
use convoy_core::wire::{WireMessage, MAX_FRAME_BYTES};
use convoy_services::EventLog;
use convoyd::server::Server;

pub const RECV_TIMEOUT: Duration = Duration::from_secs(2);

pub struct TestServer {
    pub server: Server,
    _log_dir: tempfile::TempDir,
}

impl TestServer {
    /// Start a server on ephemeral ports with its event log in a
    /// temporary directory.
    pub fn start() -> Result<Self> {
        let log_dir = tempfile::tempdir()?;
        let mut config = ConvoyConfig::default();
        config.network.port = 0;
        let event_log = EventLog::open(&log_dir.path().join("system.log"))?;
        let server = Server::start(&config, event_log)?;
        Ok(Self {
            server,
            _log_dir: log_dir,
        })
    }

    pub fn tcp_v4_addr(&self) -> Result<SocketAddr> {
        self.server.transport().tcp_v4_addr()
    }

    pub fn udp_v4_addr(&self) -> Result<SocketAddr> {
        self.server.transport().udp_v4_addr()
    }

    /// Wait for the registry to reach the expected client count — accept
    /// and registration happen on server tasks, after the client's
    /// connect returns.
    pub async fn wait_for_clients(&self, count: usize) -> Result<()> {
        wait_until(|| self.server.transport().registry().len() == count).await
    }
}

/// Poll a condition until it holds or the timeout elapses.
pub async fn wait_until(mut condition: impl FnMut() -> bool) -> Result<()> {
    let deadline = Instant::now() + RECV_TIMEOUT;
    while Instant::now() < deadline {
        if condition() {
            return Ok(());
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    bail!("condition not met within {:?}", RECV_TIMEOUT)
}

pub async fn send_frame(stream: &mut TcpStream, msg: &WireMessage) -> Result<()> {
    stream
        .write_all(&msg.encode())
        .await
        .context("tcp write failed")
}

/// Read one frame and decode it, with a timeout so a missing reply fails
/// the test instead of hanging it.
pub async fn recv_frame(stream: &mut TcpStream) -> Result<WireMessage> {
    let mut buf = [0u8; MAX_FRAME_BYTES];
    let n = tokio::time::timeout(RECV_TIMEOUT, stream.read(&mut buf))
        .await
        .context("timed out waiting for a frame")?
        .context("tcp read failed")?;
    if n == 0 {
        bail!("server closed the connection");
    }
    WireMessage::decode(&buf[..n]).context("undecodable frame from server")
}
