//! WebSocket observer server
//!
//! Each connection registers a channel observer with the engine (which
//! delivers `initial_state` first) and may send commands. Broadcast events
//! and command replies share the connection's single writer.

use std::net::SocketAddr;
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use shelf_engine::{ChannelObserver, ShelfEngine};
use shelf_gateway::{GatewaySync, HttpGateway};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;

use crate::commands::{self, Handled};

/// Shared by every connection task
#[derive(Clone)]
pub struct ServerContext {
    pub engine: Arc<ShelfEngine>,
    pub gateway: Option<Arc<GatewaySync<HttpGateway>>>,
}

impl ServerContext {
    /// Report a completed job and write the inventory back, in the background
    pub fn publish_completion(&self, job: shelf_core::Job) {
        if let Some(gateway) = &self.gateway {
            let gateway = Arc::clone(gateway);
            tokio::spawn(async move {
                gateway.publish_completion(&job).await;
            });
        }
    }

    /// Write the inventory back in the background
    pub fn push_state(&self) {
        if let Some(gateway) = &self.gateway {
            let gateway = Arc::clone(gateway);
            tokio::spawn(async move {
                // failures are logged by the sync layer
                let _ = gateway.push_state().await;
            });
        }
    }
}

/// Accept connections until the listener fails
pub async fn serve(listener: TcpListener, context: ServerContext) -> std::io::Result<()> {
    log::info!("[Daemon] WebSocket server on {}", listener.local_addr()?);
    loop {
        let (stream, peer) = listener.accept().await?;
        let context = context.clone();
        tokio::spawn(async move {
            handle_connection(stream, peer, context).await;
        });
    }
}

async fn handle_connection(stream: TcpStream, peer: SocketAddr, context: ServerContext) {
    let ws = match accept_async(stream).await {
        Ok(ws) => ws,
        Err(e) => {
            log::warn!("[Daemon] Handshake with {} failed: {}", peer, e);
            return;
        }
    };
    let (mut write, mut read) = ws.split();

    let (observer, mut events) = ChannelObserver::channel();
    let Some(observer_id) = context.engine.register_observer(Box::new(observer)) else {
        return;
    };
    log::info!("[Daemon] Client {} connected as observer {}", peer, observer_id);

    loop {
        tokio::select! {
            event = events.recv() => {
                let Some(event) = event else { break };
                if write.send(Message::Text(event.into())).await.is_err() {
                    break;
                }
            }

            msg = read.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        let engine = Arc::clone(&context.engine);
                        let text = text.as_str().to_string();
                        // LED writes and batch pauses block
                        let handled = tokio::task::spawn_blocking(move || {
                            commands::handle_text(&engine, &text)
                        })
                        .await;
                        let Handled { reply, completed, inventory_changed } = match handled {
                            Ok(handled) => handled,
                            Err(e) => {
                                log::error!("[Daemon] Command task failed: {}", e);
                                break;
                            }
                        };
                        if let Some(job) = completed {
                            context.publish_completion(job);
                        } else if inventory_changed {
                            context.push_state();
                        }
                        if write.send(Message::Text(reply.to_text().into())).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        log::warn!("[Daemon] Client {} error: {}", peer, e);
                        break;
                    }
                    _ => {} // ping/pong/binary
                }
            }
        }
    }

    context.engine.unregister_observer(observer_id);
    log::info!("[Daemon] Client {} disconnected", peer);
}
