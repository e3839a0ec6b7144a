//! convoy-ctl — command-line client for the convoy daemon.
//!
//! Speaks the wire protocol directly: one JSON frame per command, over
//! TCP by default or UDP with `--udp`. Commands that expect a reply wait
//! briefly for it and print what came back.

use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde_json::json;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpStream, UdpSocket};

use convoy_core::wire::{
    AlertKind, CredentialKind, InventoryKind, MessageType, WireMessage, MAX_FRAME_BYTES, UDP_ACK,
};

const DEFAULT_PORT: u16 = 4950;
const REPLY_TIMEOUT: Duration = Duration::from_secs(3);

// ── Transport ─────────────────────────────────────────────────────────────────

enum Connection {
    Tcp(TcpStream),
    Udp(UdpSocket),
}

impl Connection {
    async fn open(host: &str, port: u16, udp: bool) -> Result<Self> {
        let target = format!("{host}:{port}");
        if udp {
            let socket = UdpSocket::bind("0.0.0.0:0")
                .await
                .context("failed to bind local udp socket")?;
            socket
                .connect(&target)
                .await
                .with_context(|| format!("failed to reach convoyd at {target}"))?;
            Ok(Connection::Udp(socket))
        } else {
            let stream = TcpStream::connect(&target)
                .await
                .with_context(|| format!("failed to connect to convoyd at {target} — is it running?"))?;
            Ok(Connection::Tcp(stream))
        }
    }

    async fn send(&mut self, msg: &WireMessage) -> Result<()> {
        let frame = msg.encode();
        match self {
            Connection::Tcp(stream) => stream.write_all(&frame).await?,
            Connection::Udp(socket) => {
                socket.send(&frame).await?;
                // The daemon acks every UDP frame; consume it so later
                // reads see actual replies.
                let mut buf = [0u8; MAX_FRAME_BYTES];
                let n = socket.recv(&mut buf).await?;
                if &buf[..n] != UDP_ACK {
                    bail!("expected ack, got {} unexpected bytes", n);
                }
            }
        }
        Ok(())
    }

    async fn recv(&mut self) -> Result<WireMessage> {
        let mut buf = [0u8; MAX_FRAME_BYTES];
        let n = match self {
            Connection::Tcp(stream) => {
                let n = stream.read(&mut buf).await?;
                if n == 0 {
                    bail!("server closed the connection");
                }
                n
            }
            Connection::Udp(socket) => socket.recv(&mut buf).await?,
        };
        WireMessage::decode(&buf[..n]).context("server sent an undecodable frame")
    }

    async fn recv_reply(&mut self) -> Result<WireMessage> {
        tokio::time::timeout(REPLY_TIMEOUT, self.recv())
            .await
            .context("timed out waiting for a reply")?
    }
}

// ── Subcommand handlers ───────────────────────────────────────────────────────

async fn cmd_login(conn: &mut Connection, password: &str) -> Result<()> {
    conn.send(&WireMessage::new(
        MessageType::Credentials,
        CredentialKind::Login,
        json!({ "password": password }),
    ))
    .await?;
    println!("Login sent.");
    Ok(())
}

async fn cmd_logout(conn: &mut Connection) -> Result<()> {
    conn.send(&WireMessage::new(
        MessageType::Credentials,
        CredentialKind::Logout,
        json!({}),
    ))
    .await?;
    println!("Logout sent.");
    Ok(())
}

async fn cmd_subscription(
    conn: &mut Connection,
    subscribe: &[&str],
    unsubscribe: &[&str],
) -> Result<()> {
    conn.send(&WireMessage::new(
        MessageType::Credentials,
        CredentialKind::Subscription,
        json!({ "subscribe": subscribe, "unsubscribe": unsubscribe }),
    ))
    .await?;
    println!(
        "Subscription update sent (+{} -{}).",
        subscribe.len(),
        unsubscribe.len()
    );
    Ok(())
}

async fn cmd_alert(conn: &mut Connection, kind: &str, message: &str) -> Result<()> {
    let kind = match kind {
        "weather" => AlertKind::Weather,
        "enemy" => AlertKind::EnemyThreat,
        "infection" => AlertKind::Infection,
        other => bail!("unknown alert kind '{other}' (weather, enemy, infection)"),
    };
    conn.send(&WireMessage::new(
        MessageType::Alert,
        kind,
        json!({ "message": message }),
    ))
    .await?;
    println!("Alert sent.");
    Ok(())
}

async fn cmd_request(conn: &mut Connection, items: &[&str]) -> Result<()> {
    let mut products = Vec::new();
    for item in items {
        let (id, quantity) = item
            .split_once(':')
            .with_context(|| format!("'{item}' is not id:quantity"))?;
        let id: i64 = id.parse().with_context(|| format!("bad item id in '{item}'"))?;
        let quantity: i64 = quantity
            .parse()
            .with_context(|| format!("bad quantity in '{item}'"))?;
        products.push(json!({ "id": id, "quantity": quantity }));
    }
    if products.is_empty() {
        bail!("request needs at least one id:quantity item");
    }
    conn.send(&WireMessage::new(
        MessageType::Inventory,
        InventoryKind::Request,
        json!({ "products": products }),
    ))
    .await?;
    println!("Request sent ({} line(s)).", products.len());
    Ok(())
}

async fn cmd_info(conn: &mut Connection) -> Result<()> {
    conn.send(&WireMessage::new(
        MessageType::Inventory,
        InventoryKind::Info,
        json!({}),
    ))
    .await?;
    let reply = conn.recv_reply().await?;
    println!("{}", serde_json::to_string_pretty(&reply.content()["inventory"])?);
    Ok(())
}

async fn cmd_history(conn: &mut Connection) -> Result<()> {
    conn.send(&WireMessage::new(
        MessageType::Inventory,
        InventoryKind::History,
        json!({}),
    ))
    .await?;
    let reply = conn.recv_reply().await?;
    println!(
        "{}",
        serde_json::to_string_pretty(&reply.content()["transactions"])?
    );
    Ok(())
}

async fn cmd_listen(conn: &mut Connection) -> Result<()> {
    println!("Listening for server messages (ctrl-c to stop)...");
    loop {
        let msg = conn.recv().await?;
        let label = match MessageType::try_from(msg.kind) {
            Ok(MessageType::Alert) => "ALERT",
            Ok(MessageType::Notification) => "NOTIFICATION",
            Ok(MessageType::Inventory) => "INVENTORY",
            Ok(MessageType::Credentials) => "CREDENTIALS",
            Err(_) => "UNKNOWN",
        };
        println!(
            "[{label}/{}] {}",
            msg.sub_kind,
            msg.content()
                .get("message")
                .and_then(serde_json::Value::as_str)
                .unwrap_or(&msg.content().to_string())
        );
    }
}

fn print_usage() {
    println!("Usage: convoy-ctl [--host <host>] [--port <port>] [--udp] <command>");
    println!();
    println!("Commands:");
    println!("  login <password>          Authenticate this connection");
    println!("  logout                    End the authenticated session");
    println!("  subscribe <names...>      Subscribe to notification categories");
    println!("  unsubscribe <names...>    Unsubscribe from notification categories");
    println!("  alert <kind> <message>    Raise an alert (weather, enemy, infection)");
    println!("  request <id:qty>...       Request inventory items");
    println!("  info                      Print this client's inventory snapshot");
    println!("  history                   Print this client's transaction history");
    println!("  listen                    Stay connected and print incoming messages");
    println!();
    println!("Options:");
    println!("  --host <host>   Daemon host (default: 127.0.0.1)");
    println!("  --port <port>   Daemon port (default: {DEFAULT_PORT})");
    println!("  --udp           Use UDP instead of TCP");
    println!();
    println!("Categories: ON_ROUTE, RECEIVED, NO_STOCK, DISCARDED");
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();

    let mut host = "127.0.0.1".to_string();
    let mut port = DEFAULT_PORT;
    let mut udp = false;
    let mut remaining: Vec<&str> = Vec::new();
    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--host" => {
                i += 1;
                host = args.get(i).context("--host requires a value")?.clone();
            }
            "--port" => {
                i += 1;
                port = args
                    .get(i)
                    .context("--port requires a value")?
                    .parse()
                    .context("--port must be a number")?;
            }
            "--udp" => udp = true,
            arg => remaining.push(arg),
        }
        i += 1;
    }

    if matches!(remaining.as_slice(), [] | ["help"] | ["--help"] | ["-h"]) {
        print_usage();
        return Ok(());
    }

    let mut conn = Connection::open(&host, port, udp).await?;

    match remaining.as_slice() {
        ["login", password] => cmd_login(&mut conn, password).await,
        ["logout"] => cmd_logout(&mut conn).await,
        ["subscribe", names @ ..] if !names.is_empty() => {
            cmd_subscription(&mut conn, names, &[]).await
        }
        ["unsubscribe", names @ ..] if !names.is_empty() => {
            cmd_subscription(&mut conn, &[], names).await
        }
        ["alert", kind, message] => cmd_alert(&mut conn, kind, message).await,
        ["request", items @ ..] => cmd_request(&mut conn, items).await,
        ["info"] => cmd_info(&mut conn).await,
        ["history"] => cmd_history(&mut conn).await,
        ["listen"] => cmd_listen(&mut conn).await,
        other => {
            eprintln!("Unknown command: {}", other.join(" "));
            eprintln!();
            print_usage();
            std::process::exit(1);
        }
    }
}
