//! TCP client flows against a live server.

use serde_json::json;
use tokio::net::TcpStream;

use convoy_core::wire::{
    CredentialKind, InventoryKind, MessageType, NotificationKind, WireMessage,
};

use crate::infra::{recv_frame, send_frame, wait_until, TestServer};

#[tokio::test]
async fn first_client_gets_id_one_and_decodes_a_pushed_notification() {
    let ts = TestServer::start().unwrap();
    let mut client = TcpStream::connect(ts.tcp_v4_addr().unwrap()).await.unwrap();
    ts.wait_for_clients(1).await.unwrap();

    let ids = ts.server.transport().registry().client_ids();
    assert_eq!(ids, vec![1]);

    ts.server
        .transport()
        .send(
            1,
            &WireMessage::addressed(
                1,
                MessageType::Notification,
                NotificationKind::NoStock,
                json!({"message": "Out of stock"}),
            ),
        )
        .await;

    let msg = recv_frame(&mut client).await.unwrap();
    assert_eq!(msg.client_id, 1);
    assert_eq!(msg.kind, 1);
    assert_eq!(msg.sub_kind, 2);
    assert_eq!(msg.content(), &json!({"message": "Out of stock"}));
}

#[tokio::test]
async fn unfulfillable_request_comes_back_as_no_stock() {
    let ts = TestServer::start().unwrap();
    let mut client = TcpStream::connect(ts.tcp_v4_addr().unwrap()).await.unwrap();
    ts.wait_for_clients(1).await.unwrap();

    send_frame(
        &mut client,
        &WireMessage::new(
            MessageType::Inventory,
            InventoryKind::Request,
            json!({"products": [{"id": 7, "quantity": 1}]}),
        ),
    )
    .await
    .unwrap();

    let reply = recv_frame(&mut client).await.unwrap();
    assert_eq!(reply.client_id, 1);
    assert_eq!(reply.kind, i64::from(MessageType::Notification));
    assert_eq!(reply.sub_kind, i64::from(NotificationKind::NoStock));
}

#[tokio::test]
async fn fulfilled_request_depletes_stock_and_shows_in_history() {
    let ts = TestServer::start().unwrap();
    ts.server.inventory().increase_stock(5, 10);

    let mut client = TcpStream::connect(ts.tcp_v4_addr().unwrap()).await.unwrap();
    ts.wait_for_clients(1).await.unwrap();

    send_frame(
        &mut client,
        &WireMessage::new(
            MessageType::Inventory,
            InventoryKind::Request,
            json!({"products": [{"id": 5, "quantity": 4}]}),
        ),
    )
    .await
    .unwrap();
    wait_until(|| ts.server.inventory().stock_level(5) == 6)
        .await
        .unwrap();

    send_frame(
        &mut client,
        &WireMessage::new(MessageType::Inventory, InventoryKind::History, json!({})),
    )
    .await
    .unwrap();

    let reply = recv_frame(&mut client).await.unwrap();
    assert_eq!(reply.kind, i64::from(MessageType::Inventory));
    assert_eq!(reply.sub_kind, i64::from(InventoryKind::History));
    let transactions = reply.content()["transactions"].as_array().unwrap().clone();
    assert_eq!(transactions.len(), 1);
    assert_eq!(transactions[0]["item_id"], 5);
    assert_eq!(transactions[0]["quantity"], 4);
}

#[tokio::test]
async fn login_over_the_wire_authorizes_the_session() {
    let ts = TestServer::start().unwrap();
    let mut client = TcpStream::connect(ts.tcp_v4_addr().unwrap()).await.unwrap();
    ts.wait_for_clients(1).await.unwrap();
    ts.server.auth().add_credentials(1, "hunter2");

    send_frame(
        &mut client,
        &WireMessage::new(
            MessageType::Credentials,
            CredentialKind::Login,
            json!({"password": "hunter2"}),
        ),
    )
    .await
    .unwrap();
    wait_until(|| ts.server.auth().is_authorized(1)).await.unwrap();

    send_frame(
        &mut client,
        &WireMessage::new(MessageType::Credentials, CredentialKind::Logout, json!({})),
    )
    .await
    .unwrap();
    wait_until(|| !ts.server.auth().is_authorized(1))
        .await
        .unwrap();
}

#[tokio::test]
async fn disconnect_removes_registration_and_subscriptions() {
    let ts = TestServer::start().unwrap();
    let client = TcpStream::connect(ts.tcp_v4_addr().unwrap()).await.unwrap();
    ts.wait_for_clients(1).await.unwrap();
    assert!(ts
        .server
        .notifications()
        .is_subscribed(1, NotificationKind::OnRoute));

    drop(client);

    ts.wait_for_clients(0).await.unwrap();
    assert!(!ts
        .server
        .notifications()
        .is_subscribed(1, NotificationKind::OnRoute));
}

#[tokio::test]
async fn alert_from_one_client_reaches_the_other() {
    let ts = TestServer::start().unwrap();
    let mut raiser = TcpStream::connect(ts.tcp_v4_addr().unwrap()).await.unwrap();
    ts.wait_for_clients(1).await.unwrap();
    let mut observer = TcpStream::connect(ts.tcp_v4_addr().unwrap()).await.unwrap();
    ts.wait_for_clients(2).await.unwrap();

    send_frame(
        &mut raiser,
        &WireMessage::new(
            MessageType::Alert,
            convoy_core::wire::AlertKind::Weather,
            json!({"message": "storm front incoming"}),
        ),
    )
    .await
    .unwrap();

    // Both clients get the fan-out, including the raiser.
    for stream in [&mut raiser, &mut observer] {
        let msg = recv_frame(stream).await.unwrap();
        assert_eq!(msg.kind, i64::from(MessageType::Alert));
        assert_eq!(msg.content()["message"], "storm front incoming");
    }
}

#[tokio::test]
async fn malformed_frame_is_ignored_and_the_connection_survives() {
    use tokio::io::AsyncWriteExt;

    let ts = TestServer::start().unwrap();
    let mut client = TcpStream::connect(ts.tcp_v4_addr().unwrap()).await.unwrap();
    ts.wait_for_clients(1).await.unwrap();

    client.write_all(b"{\"type\": \"invalid\"}").await.unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;

    send_frame(
        &mut client,
        &WireMessage::new(MessageType::Inventory, InventoryKind::Info, json!({})),
    )
    .await
    .unwrap();

    let reply = recv_frame(&mut client).await.unwrap();
    assert_eq!(reply.sub_kind, i64::from(InventoryKind::Info));
}
