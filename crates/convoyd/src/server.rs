//! Server assembly — binds the transports, wires the collaborators
//! together, and owns the long-running tasks.

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

use convoy_core::config::ConvoyConfig;
use convoy_core::wire::WireMessage;
use convoy_services::{
    Authentication, ConnectionRegistry, EventLog, InventoryManager, LogLevel, NotificationSystem,
};

use crate::dispatch::Dispatcher;
use crate::send_worker::SendWorker;
use crate::transport::TransportManager;

/// A running server: the spawned task handles plus the shared state the
/// owner may still want to reach (seeding credentials, shutdown).
pub struct Server {
    transport: Arc<TransportManager>,
    auth: Authentication,
    inventory: InventoryManager,
    notifications: NotificationSystem,
    shutdown_tx: broadcast::Sender<()>,
    accept_v4_task: JoinHandle<()>,
    accept_v6_task: JoinHandle<()>,
    udp_task: JoinHandle<()>,
    send_worker_task: JoinHandle<anyhow::Result<()>>,
}

impl Server {
    /// Bind every endpoint and spawn the accept, UDP, and send-worker
    /// tasks. Returns once the server is reachable.
    pub fn start(config: &ConvoyConfig, event_log: EventLog) -> Result<Self> {
        let registry = ConnectionRegistry::new();
        let transport = Arc::new(
            TransportManager::bind(config.network.port, registry)
                .context("failed to bind network endpoints")?,
        );

        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel::<WireMessage>();
        let (shutdown_tx, _) = broadcast::channel::<()>(1);

        let auth = Authentication::new(
            config.auth.max_failed_attempts,
            &config.auth.emergency_secret_phrase,
        );
        let inventory = InventoryManager::new();
        let notifications = NotificationSystem::new(outbound_tx.clone());

        let dispatcher = Arc::new(Dispatcher::new(
            auth.clone(),
            inventory.clone(),
            notifications.clone(),
            event_log.clone(),
            outbound_tx,
        ));

        event_log.log_event("Server", LogLevel::Info, "server starting");

        let accept_v4_task = tokio::spawn(accept_loop(
            transport.clone(),
            dispatcher.clone(),
            notifications.clone(),
            auth.clone(),
            event_log.clone(),
            shutdown_tx.subscribe(),
            false,
        ));
        let accept_v6_task = tokio::spawn(accept_loop(
            transport.clone(),
            dispatcher.clone(),
            notifications.clone(),
            auth.clone(),
            event_log.clone(),
            shutdown_tx.subscribe(),
            true,
        ));
        let udp_task = tokio::spawn(udp_loop(
            transport.clone(),
            dispatcher,
            notifications.clone(),
            shutdown_tx.subscribe(),
        ));
        let send_worker_task = tokio::spawn(
            SendWorker::new(transport.clone(), outbound_rx, shutdown_tx.subscribe()).run(),
        );

        Ok(Self {
            transport,
            auth,
            inventory,
            notifications,
            shutdown_tx,
            accept_v4_task,
            accept_v6_task,
            udp_task,
            send_worker_task,
        })
    }

    pub fn transport(&self) -> &TransportManager {
        &self.transport
    }

    pub fn auth(&self) -> &Authentication {
        &self.auth
    }

    pub fn inventory(&self) -> &InventoryManager {
        &self.inventory
    }

    pub fn notifications(&self) -> &NotificationSystem {
        &self.notifications
    }

    /// Ask every task to stop. Safe to call more than once.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }

    /// A sender the owner can trigger shutdown from after `wait` has
    /// consumed the server.
    pub fn shutdown_handle(&self) -> broadcast::Sender<()> {
        self.shutdown_tx.clone()
    }

    /// Block until shutdown is signalled or a task exits on its own —
    /// the latter is always a failure worth logging.
    pub async fn wait(self) -> Result<()> {
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        tokio::select! {
            _ = shutdown_rx.recv()     => tracing::info!("shutting down"),
            r = self.accept_v4_task    => tracing::error!("tcp/v4 accept loop exited: {:?}", r),
            r = self.accept_v6_task    => tracing::error!("tcp/v6 accept loop exited: {:?}", r),
            r = self.udp_task          => tracing::error!("udp loop exited: {:?}", r),
            r = self.send_worker_task  => tracing::error!("send worker exited: {:?}", r),
        }

        Ok(())
    }
}

/// Accept TCP clients on one family and spawn a per-connection read task
/// for each.
async fn accept_loop(
    transport: Arc<TransportManager>,
    dispatcher: Arc<Dispatcher>,
    notifications: NotificationSystem,
    auth: Authentication,
    event_log: EventLog,
    mut shutdown: broadcast::Receiver<()>,
    ipv6: bool,
) {
    loop {
        let accepted = tokio::select! {
            _ = shutdown.recv() => {
                tracing::info!(ipv6, "accept loop shutting down");
                return;
            }
            r = async {
                if ipv6 {
                    transport.accept_tcp_v6().await
                } else {
                    transport.accept_tcp_v4().await
                }
            } => r,
        };

        let (client_id, reader) = match accepted {
            Ok(pair) => pair,
            Err(e) => {
                tracing::warn!(ipv6, error = %e, "accept failed");
                continue;
            }
        };

        notifications.register_client(client_id);
        event_log.log_event(
            "Server",
            LogLevel::Info,
            &format!("client {client_id} connected"),
        );

        tokio::spawn(client_loop(
            transport.clone(),
            dispatcher.clone(),
            notifications.clone(),
            auth.clone(),
            event_log.clone(),
            client_id,
            reader,
        ));
    }
}

/// Read frames from one TCP client until it goes away, then tear its
/// state down.
async fn client_loop(
    transport: Arc<TransportManager>,
    dispatcher: Arc<Dispatcher>,
    notifications: NotificationSystem,
    auth: Authentication,
    event_log: EventLog,
    client_id: i64,
    mut reader: tokio::net::tcp::OwnedReadHalf,
) {
    while let Some(msg) = transport.recv_message(client_id, &mut reader).await {
        dispatcher.dispatch(msg);
    }

    notifications.remove_client(client_id);
    auth.set_logged_out(client_id);
    transport.close(client_id).await;
    event_log.log_event(
        "Server",
        LogLevel::Info,
        &format!("client {client_id} disconnected"),
    );
}

/// Service both UDP sockets: wait for readiness, drain with the
/// non-blocking poll, finish registering first-contact clients, dispatch.
async fn udp_loop(
    transport: Arc<TransportManager>,
    dispatcher: Arc<Dispatcher>,
    notifications: NotificationSystem,
    mut shutdown: broadcast::Receiver<()>,
) {
    loop {
        tokio::select! {
            _ = shutdown.recv() => {
                tracing::info!("udp loop shutting down");
                return;
            }
            _ = transport.udp_readable() => {}
        }

        let poll = transport.poll_udp();
        for client_id in poll.new_clients {
            notifications.register_client(client_id);
        }
        for msg in poll.messages {
            dispatcher.dispatch(msg);
        }
    }
}
