//! UDP client flows: first-contact registration, acks, and replies.

use serde_json::json;
use tokio::net::UdpSocket;

use convoy_core::wire::{
    InventoryKind, MessageType, WireMessage, MAX_FRAME_BYTES, UDP_ACK,
};

use crate::infra::{wait_until, TestServer, RECV_TIMEOUT};

async fn recv_datagram(socket: &UdpSocket) -> Vec<u8> {
    let mut buf = [0u8; MAX_FRAME_BYTES];
    let n = tokio::time::timeout(RECV_TIMEOUT, socket.recv(&mut buf))
        .await
        .expect("timed out waiting for a datagram")
        .expect("udp recv failed");
    buf[..n].to_vec()
}

#[tokio::test]
async fn first_contact_registers_once_and_every_frame_is_acked() {
    let ts = TestServer::start().unwrap();
    let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    socket.connect(ts.udp_v4_addr().unwrap()).await.unwrap();

    let frame = WireMessage::new(MessageType::Inventory, InventoryKind::Info, json!({})).encode();
    socket.send(&frame).await.unwrap();
    assert_eq!(recv_datagram(&socket).await, UDP_ACK);
    ts.wait_for_clients(1).await.unwrap();

    // Same (address, port): same registry entry, but still acked.
    socket.send(&frame).await.unwrap();
    assert_eq!(recv_datagram(&socket).await, UDP_ACK);
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    assert_eq!(ts.server.transport().registry().len(), 1);
}

#[tokio::test]
async fn distinct_source_ports_are_distinct_clients() {
    let ts = TestServer::start().unwrap();
    let addr = ts.udp_v4_addr().unwrap();
    let frame = WireMessage::new(MessageType::Inventory, InventoryKind::Info, json!({})).encode();

    let a = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let b = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    a.send_to(&frame, addr).await.unwrap();
    b.send_to(&frame, addr).await.unwrap();

    ts.wait_for_clients(2).await.unwrap();
    let mut ids = ts.server.transport().registry().client_ids();
    ids.sort_unstable();
    assert_eq!(ids, vec![1, 2]);
}

#[tokio::test]
async fn udp_client_receives_inventory_reply_after_the_ack() {
    let ts = TestServer::start().unwrap();
    let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    socket.connect(ts.udp_v4_addr().unwrap()).await.unwrap();

    let frame = WireMessage::new(MessageType::Inventory, InventoryKind::Info, json!({})).encode();
    socket.send(&frame).await.unwrap();
    assert_eq!(recv_datagram(&socket).await, UDP_ACK);

    let reply = WireMessage::decode(&recv_datagram(&socket).await).unwrap();
    assert_eq!(reply.client_id, 1);
    assert_eq!(reply.kind, i64::from(MessageType::Inventory));
    assert_eq!(reply.sub_kind, i64::from(InventoryKind::Info));

    // The registered entry answers for gated notifications too.
    wait_until(|| {
        ts.server
            .notifications()
            .is_subscribed(1, convoy_core::wire::NotificationKind::NoStock)
    })
    .await
    .unwrap();
}

#[tokio::test]
async fn malformed_datagram_gets_no_ack_and_no_registration() {
    let ts = TestServer::start().unwrap();
    let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    socket.connect(ts.udp_v4_addr().unwrap()).await.unwrap();

    socket.send(b"definitely not json").await.unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    assert!(ts.server.transport().registry().is_empty());

    // A well-formed frame from the same socket still registers normally.
    let frame = WireMessage::new(MessageType::Inventory, InventoryKind::Info, json!({})).encode();
    socket.send(&frame).await.unwrap();
    assert_eq!(recv_datagram(&socket).await, UDP_ACK);
    ts.wait_for_clients(1).await.unwrap();
}
