//! Send worker — drains the outbound queue and hands each message to the
//! transport layer for delivery.

use std::sync::Arc;

use tokio::sync::{broadcast, mpsc};

use convoy_core::wire::WireMessage;

use crate::transport::TransportManager;

pub struct SendWorker {
    transport: Arc<TransportManager>,
    outbound_rx: mpsc::UnboundedReceiver<WireMessage>,
    shutdown: broadcast::Receiver<()>,
}

impl SendWorker {
    pub fn new(
        transport: Arc<TransportManager>,
        outbound_rx: mpsc::UnboundedReceiver<WireMessage>,
        shutdown: broadcast::Receiver<()>,
    ) -> Self {
        Self {
            transport,
            outbound_rx,
            shutdown,
        }
    }

    pub async fn run(mut self) -> anyhow::Result<()> {
        loop {
            tokio::select! {
                _ = self.shutdown.recv() => {
                    tracing::info!("send worker shutting down");
                    return Ok(());
                }

                msg = self.outbound_rx.recv() => {
                    let msg = match msg {
                        Some(m) => m,
                        None => {
                            tracing::info!("outbound queue dropped, send worker exiting");
                            return Ok(());
                        }
                    };
                    // Delivery to a departed client is a silent no-op;
                    // per-client ordering comes from the single queue.
                    self.transport.send(msg.client_id, &msg).await;
                }
            }
        }
    }
}
