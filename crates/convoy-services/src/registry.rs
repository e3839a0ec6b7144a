//! Connection registry — the server's table of active clients.
//!
//! One entry per client, created on TCP accept or on the first UDP datagram
//! from an unseen peer. The registry exclusively owns the entries; the send
//! path clones out the transport handle it needs and never holds a map
//! reference across an await.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::UdpSocket;
use tokio::sync::Mutex;

/// Transport protocol of a registered client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    Tcp,
    Udp,
}

/// The handle used to reach a client.
///
/// TCP clients own the write half of their stream behind a mutex, which
/// gives per-client FIFO ordering for successive sends. UDP clients share
/// the server's receiving socket and are addressed by their stored peer
/// address.
#[derive(Clone)]
pub enum ClientTransport {
    Tcp { writer: Arc<Mutex<OwnedWriteHalf>> },
    Udp { socket: Arc<UdpSocket>, peer: SocketAddr },
}

impl ClientTransport {
    pub fn protocol(&self) -> Protocol {
        match self {
            ClientTransport::Tcp { .. } => Protocol::Tcp,
            ClientTransport::Udp { .. } => Protocol::Udp,
        }
    }
}

/// One registry entry. `client_id` never changes after creation;
/// `connected` flips true → false exactly once.
pub struct ClientConnection {
    pub client_id: i64,
    pub peer_addr: SocketAddr,
    pub transport: ClientTransport,
    pub connected: bool,
}

impl ClientConnection {
    pub fn protocol(&self) -> Protocol {
        self.transport.protocol()
    }
}

/// The connection table — shared across all tasks.
#[derive(Clone)]
pub struct ConnectionRegistry {
    clients: Arc<DashMap<i64, ClientConnection>>,
    next_id: Arc<AtomicI64>,
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self {
            clients: Arc::new(DashMap::new()),
            // Client ids are monotonic starting at 1.
            next_id: Arc::new(AtomicI64::new(1)),
        }
    }

    /// Register a freshly accepted TCP client. Returns the assigned id.
    pub fn register_tcp(&self, writer: OwnedWriteHalf, peer_addr: SocketAddr) -> i64 {
        self.register(
            ClientTransport::Tcp {
                writer: Arc::new(Mutex::new(writer)),
            },
            peer_addr,
        )
    }

    /// Register a UDP client on first contact. Returns the assigned id.
    pub fn register_udp(&self, socket: Arc<UdpSocket>, peer_addr: SocketAddr) -> i64 {
        self.register(
            ClientTransport::Udp {
                socket,
                peer: peer_addr,
            },
            peer_addr,
        )
    }

    fn register(&self, transport: ClientTransport, peer_addr: SocketAddr) -> i64 {
        let client_id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.clients.insert(
            client_id,
            ClientConnection {
                client_id,
                peer_addr,
                transport,
                connected: true,
            },
        );
        client_id
    }

    /// Find a connected UDP client by exact socket address.
    ///
    /// Matching is on the full (family, address, port) tuple — clients behind
    /// the same NAT share an IP but never a full tuple. A peer that rebinds
    /// to a new source port is indistinguishable from a new client; that is a
    /// known limitation, not something this lookup papers over.
    pub fn find_udp_peer(&self, peer_addr: &SocketAddr) -> Option<i64> {
        self.clients.iter().find_map(|entry| {
            let conn = entry.value();
            match &conn.transport {
                ClientTransport::Udp { peer, .. } if peer == peer_addr && conn.connected => {
                    Some(conn.client_id)
                }
                _ => None,
            }
        })
    }

    /// Clone out the transport handle for a client, if present and connected.
    pub fn transport(&self, client_id: i64) -> Option<ClientTransport> {
        self.clients
            .get(&client_id)
            .filter(|c| c.connected)
            .map(|c| c.transport.clone())
    }

    /// Mark a client disconnected. Idempotent.
    pub fn disconnect(&self, client_id: i64) {
        if let Some(mut conn) = self.clients.get_mut(&client_id) {
            conn.connected = false;
        }
    }

    /// Remove a client entry. Dropping the entry drops the last transport
    /// handle the registry holds; an in-flight send keeps its own clone and
    /// fails on the closed socket instead of touching freed state.
    pub fn remove(&self, client_id: i64) -> Option<ClientConnection> {
        self.clients.remove(&client_id).map(|(_, conn)| conn)
    }

    pub fn contains(&self, client_id: i64) -> bool {
        self.clients.contains_key(&client_id)
    }

    pub fn client_ids(&self) -> Vec<i64> {
        self.clients.iter().map(|e| *e.key()).collect()
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn loopback_udp() -> Arc<UdpSocket> {
        Arc::new(UdpSocket::bind("127.0.0.1:0").await.unwrap())
    }

    #[tokio::test]
    async fn ids_are_monotonic_from_one() {
        let registry = ConnectionRegistry::new();
        let socket = loopback_udp().await;

        let mut ids = Vec::new();
        for port in 5000..5005 {
            let peer: SocketAddr = format!("127.0.0.1:{port}").parse().unwrap();
            ids.push(registry.register_udp(socket.clone(), peer));
        }

        assert_eq!(ids, vec![1, 2, 3, 4, 5]);
        assert_eq!(registry.len(), 5);
    }

    #[tokio::test]
    async fn udp_lookup_requires_full_tuple_match() {
        let registry = ConnectionRegistry::new();
        let socket = loopback_udp().await;

        let peer: SocketAddr = "10.0.0.1:7000".parse().unwrap();
        let id = registry.register_udp(socket.clone(), peer);

        assert_eq!(registry.find_udp_peer(&peer), Some(id));
        // Same IP, different port — a different client.
        assert_eq!(registry.find_udp_peer(&"10.0.0.1:7001".parse().unwrap()), None);
        // Different family entirely.
        assert_eq!(registry.find_udp_peer(&"[::1]:7000".parse().unwrap()), None);
    }

    #[tokio::test]
    async fn disconnect_is_idempotent_and_hides_from_lookup() {
        let registry = ConnectionRegistry::new();
        let socket = loopback_udp().await;
        let peer: SocketAddr = "127.0.0.1:6000".parse().unwrap();
        let id = registry.register_udp(socket, peer);

        registry.disconnect(id);
        registry.disconnect(id);

        assert!(registry.contains(id));
        assert_eq!(registry.find_udp_peer(&peer), None);
        assert!(registry.transport(id).is_none());
    }

    #[tokio::test]
    async fn remove_is_idempotent() {
        let registry = ConnectionRegistry::new();
        let socket = loopback_udp().await;
        let id = registry.register_udp(socket, "127.0.0.1:6001".parse().unwrap());

        assert!(registry.remove(id).is_some());
        assert!(registry.remove(id).is_none());
        assert!(registry.is_empty());
    }
}
