//! Transport manager — the four listening/receiving endpoints
//! (TCP/UDP × IPv4/IPv6) and everything that moves frames for a client.
//!
//! The v6 sockets run with IPV6_V6ONLY so the two address families never
//! collide on the shared port. All four binds are fatal at startup: the
//! server does not come up with part of its announced protocol surface
//! missing.

use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::Arc;

use anyhow::{Context, Result};
use socket2::{Domain, Socket, Type};
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::OwnedReadHalf;
use tokio::net::{TcpListener, UdpSocket};

use convoy_core::wire::{WireMessage, MAX_FRAME_BYTES, UDP_ACK};
use convoy_services::registry::{ClientTransport, ConnectionRegistry};

const TCP_BACKLOG: i32 = 10;

/// Result of one UDP poll: the decoded messages plus the ids of clients
/// the poll registered on first contact, so the caller can finish their
/// registration (default subscriptions) before dispatching.
#[derive(Default)]
pub struct UdpPoll {
    pub messages: Vec<WireMessage>,
    pub new_clients: Vec<i64>,
}

pub struct TransportManager {
    tcp_v4: TcpListener,
    tcp_v6: TcpListener,
    udp_v4: Arc<UdpSocket>,
    udp_v6: Arc<UdpSocket>,
    registry: ConnectionRegistry,
}

impl TransportManager {
    /// Bind all four endpoints on the wildcard address.
    ///
    /// Any socket that fails to create, bind, or listen aborts startup.
    pub fn bind(port: u16, registry: ConnectionRegistry) -> Result<Self> {
        let tcp_v4 = bind_socket(Domain::IPV4, Type::STREAM, port)?;
        let udp_v4 = bind_socket(Domain::IPV4, Type::DGRAM, port)?;
        let tcp_v6 = bind_socket(Domain::IPV6, Type::STREAM, port)?;
        let udp_v6 = bind_socket(Domain::IPV6, Type::DGRAM, port)?;

        let manager = Self {
            tcp_v4: TcpListener::from_std(tcp_v4.into())
                .context("failed to adopt TCP/IPv4 listener")?,
            tcp_v6: TcpListener::from_std(tcp_v6.into())
                .context("failed to adopt TCP/IPv6 listener")?,
            udp_v4: Arc::new(
                UdpSocket::from_std(udp_v4.into()).context("failed to adopt UDP/IPv4 socket")?,
            ),
            udp_v6: Arc::new(
                UdpSocket::from_std(udp_v6.into()).context("failed to adopt UDP/IPv6 socket")?,
            ),
            registry,
        };
        tracing::info!(port, "transport endpoints bound (IPv4/IPv6, TCP/UDP)");
        Ok(manager)
    }

    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    pub fn tcp_v4_addr(&self) -> Result<SocketAddr> {
        Ok(self.tcp_v4.local_addr()?)
    }

    pub fn tcp_v6_addr(&self) -> Result<SocketAddr> {
        Ok(self.tcp_v6.local_addr()?)
    }

    pub fn udp_v4_addr(&self) -> Result<SocketAddr> {
        Ok(self.udp_v4.local_addr()?)
    }

    pub fn udp_v6_addr(&self) -> Result<SocketAddr> {
        Ok(self.udp_v6.local_addr()?)
    }

    /// Accept one pending IPv4 TCP connection and register it.
    /// Returns the assigned client id and the read half for the caller's
    /// per-connection task; the write half goes into the registry.
    pub async fn accept_tcp_v4(&self) -> Result<(i64, OwnedReadHalf)> {
        self.accept_on(&self.tcp_v4).await
    }

    /// Accept one pending IPv6 TCP connection and register it.
    pub async fn accept_tcp_v6(&self) -> Result<(i64, OwnedReadHalf)> {
        self.accept_on(&self.tcp_v6).await
    }

    async fn accept_on(&self, listener: &TcpListener) -> Result<(i64, OwnedReadHalf)> {
        let (stream, peer_addr) = listener.accept().await.context("tcp accept failed")?;
        let (read_half, write_half) = stream.into_split();
        let client_id = self.registry.register_tcp(write_half, peer_addr);
        tracing::info!(client_id, peer = %peer_addr, "tcp client connected");
        Ok((client_id, read_half))
    }

    /// Wait until either UDP socket has a datagram pending.
    pub async fn udp_readable(&self) {
        tokio::select! {
            r = self.udp_v4.readable() => {
                if let Err(e) = r {
                    tracing::warn!(error = %e, "udp/v4 readiness failed");
                }
            }
            r = self.udp_v6.readable() => {
                if let Err(e) = r {
                    tracing::warn!(error = %e, "udp/v6 readiness failed");
                }
            }
        }
    }

    /// Non-blocking poll of both UDP sockets: at most one datagram per
    /// socket per call, so a poll returns 0–2 messages and never waits.
    ///
    /// For every successfully decoded datagram the sender gets the literal
    /// `Acknowledged` reply; a malformed datagram gets nothing and creates
    /// no registry entry. Unseen (address, port) tuples are registered on
    /// first contact, mirroring the TCP accept path.
    pub fn poll_udp(&self) -> UdpPoll {
        let mut poll = UdpPoll::default();
        for socket in [&self.udp_v4, &self.udp_v6] {
            self.poll_udp_socket(socket, &mut poll);
        }
        poll
    }

    fn poll_udp_socket(&self, socket: &Arc<UdpSocket>, poll: &mut UdpPoll) {
        let mut buf = [0u8; MAX_FRAME_BYTES];
        let (len, peer_addr) = match socket.try_recv_from(&mut buf) {
            Ok(r) => r,
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => return,
            Err(e) => {
                tracing::warn!(error = %e, "udp recv failed");
                return;
            }
        };

        let mut msg = match WireMessage::decode(&buf[..len]) {
            Ok(m) => m,
            Err(e) => {
                tracing::warn!(peer = %peer_addr, error = %e, "malformed udp datagram dropped");
                return;
            }
        };

        let client_id = match self.registry.find_udp_peer(&peer_addr) {
            Some(id) => id,
            None => {
                let id = self.registry.register_udp(socket.clone(), peer_addr);
                tracing::info!(client_id = id, peer = %peer_addr, "udp client registered");
                poll.new_clients.push(id);
                id
            }
        };
        msg.client_id = client_id;

        if let Err(e) = socket.try_send_to(UDP_ACK, peer_addr) {
            tracing::debug!(client_id, error = %e, "udp ack not sent");
        }

        poll.messages.push(msg);
    }

    /// Read the next well-formed frame from a TCP client.
    ///
    /// Malformed frames are logged and skipped; the connection survives
    /// them. `None` means EOF or an I/O error, and the caller tears the
    /// connection down. The message's clientID is stamped with the
    /// registry id; the server trusts its own table, not the field the
    /// peer sent.
    pub async fn recv_message(
        &self,
        client_id: i64,
        reader: &mut OwnedReadHalf,
    ) -> Option<WireMessage> {
        use tokio::io::AsyncReadExt;

        let mut buf = [0u8; MAX_FRAME_BYTES];
        loop {
            let len = match reader.read(&mut buf).await {
                Ok(0) => {
                    tracing::info!(client_id, "tcp client disconnected");
                    return None;
                }
                Ok(n) => n,
                Err(e) => {
                    tracing::warn!(client_id, error = %e, "tcp read failed");
                    return None;
                }
            };

            match WireMessage::decode(&buf[..len]) {
                Ok(mut msg) => {
                    msg.client_id = client_id;
                    return Some(msg);
                }
                Err(e) => {
                    tracing::warn!(client_id, error = %e, "malformed tcp frame dropped");
                }
            }
        }
    }

    /// Send one message to a client over its recorded transport.
    ///
    /// An unknown or disconnected client id is a silent no-op — the client
    /// may have legitimately disconnected between the routing decision and
    /// this call.
    pub async fn send(&self, client_id: i64, msg: &WireMessage) {
        let transport = match self.registry.transport(client_id) {
            Some(t) => t,
            None => {
                tracing::debug!(client_id, "send to unknown client dropped");
                return;
            }
        };

        let frame = msg.encode();
        let result = match transport {
            ClientTransport::Tcp { writer } => {
                let mut writer = writer.lock().await;
                writer.write_all(&frame).await
            }
            ClientTransport::Udp { socket, peer } => {
                socket.send_to(&frame, peer).await.map(|_| ())
            }
        };

        if let Err(e) = result {
            tracing::warn!(client_id, error = %e, "send failed");
        }
    }

    /// Close a client's connection and drop it from the registry.
    /// Idempotent; closing an absent id is a no-op.
    pub async fn close(&self, client_id: i64) {
        self.registry.disconnect(client_id);
        if let Some(conn) = self.registry.remove(client_id) {
            if let ClientTransport::Tcp { writer } = conn.transport {
                let mut writer = writer.lock().await;
                let _ = writer.shutdown().await;
            }
            tracing::info!(client_id, "connection closed");
        }
    }
}

/// Create, configure, and bind one socket. The single factory replaces
/// per-family setup branching: the only family-specific step is
/// IPV6_V6ONLY.
fn bind_socket(family: Domain, transport: Type, port: u16) -> Result<Socket> {
    let label = socket_label(family, transport);
    let socket =
        Socket::new(family, transport, None).with_context(|| format!("{label}: create failed"))?;
    socket
        .set_reuse_address(true)
        .with_context(|| format!("{label}: SO_REUSEADDR failed"))?;
    if family == Domain::IPV6 {
        socket
            .set_only_v6(true)
            .with_context(|| format!("{label}: IPV6_V6ONLY failed"))?;
    }
    socket
        .set_nonblocking(true)
        .with_context(|| format!("{label}: set_nonblocking failed"))?;

    let addr: SocketAddr = if family == Domain::IPV4 {
        (Ipv4Addr::UNSPECIFIED, port).into()
    } else {
        (Ipv6Addr::UNSPECIFIED, port).into()
    };
    socket
        .bind(&addr.into())
        .with_context(|| format!("{label}: bind to port {port} failed"))?;

    if transport == Type::STREAM {
        socket
            .listen(TCP_BACKLOG)
            .with_context(|| format!("{label}: listen failed"))?;
    }
    Ok(socket)
}

fn socket_label(family: Domain, transport: Type) -> &'static str {
    let stream = transport == Type::STREAM;
    if family == Domain::IPV4 {
        if stream {
            "tcp/v4"
        } else {
            "udp/v4"
        }
    } else if stream {
        "tcp/v6"
    } else {
        "udp/v6"
    }
}
