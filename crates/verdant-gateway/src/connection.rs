use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::ws::{CloseFrame, Message, WebSocket};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tracing::{debug, info, warn};
use uuid::Uuid;

use verdant_presence::{Channel, Outbound};
use verdant_types::events::GatewayEvent;

use crate::dispatcher::Gateway;

/// Close code for a missing, malformed or expired token.
pub const CLOSE_AUTH_FAILED: u16 = 4001;

/// Server-side liveness check. A Ping goes out every `interval`; after
/// `max_missed` consecutive intervals without a Pong the connection is dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Heartbeat {
    pub interval: Duration,
    pub max_missed: u8,
}

impl Default for Heartbeat {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(15),
            max_missed: 2,
        }
    }
}

/// Handle an upgraded WebSocket. The token comes from the upgrade request;
/// if it does not resolve, the socket is closed with 4001 before anything
/// else is exchanged.
pub async fn handle_connection(mut socket: WebSocket, gateway: Gateway, token: Option<String>) {
    let claims = match gateway.identity.resolve(token.as_deref().unwrap_or_default()) {
        Ok(claims) => claims,
        Err(e) => {
            warn!("Gateway authentication failed: {}", e);
            let _ = socket
                .send(Message::Close(Some(CloseFrame {
                    code: CLOSE_AUTH_FAILED,
                    reason: "authentication failed".into(),
                })))
                .await;
            return;
        }
    };

    info!("{} ({}) connected to gateway", claims.username, claims.sub);

    let (sender, receiver) = socket.split();
    run_connection_loop(sender, receiver, gateway, claims.sub, claims.username).await;
}

async fn run_connection_loop(
    mut sender: SplitSink<WebSocket, Message>,
    mut receiver: SplitStream<WebSocket>,
    gateway: Gateway,
    user_id: Uuid,
    username: String,
) {
    let (channel, mut outbound) = Channel::open();
    let conn_id = channel.id();
    let reply = channel.replier();

    if gateway.registry.connect(user_id, channel).await {
        debug!("{} ({}) displaced an older session", username, user_id);
    }

    let pong_received = Arc::new(AtomicBool::new(true));
    let pong_flag_send = pong_received.clone();
    let pong_flag_recv = pong_received.clone();

    // Drain the channel queue to the socket, with heartbeat
    let Heartbeat {
        interval,
        max_missed,
    } = gateway.heartbeat;
    let mut send_task = tokio::spawn(async move {
        let mut heartbeat = tokio::time::interval(interval);
        heartbeat.tick().await;
        let mut missed_heartbeats: u8 = 0;

        loop {
            tokio::select! {
                item = outbound.recv() => {
                    match item {
                        Some(Outbound::Event(event)) => {
                            let text = match serde_json::to_string(&event) {
                                Ok(text) => text,
                                Err(e) => {
                                    warn!("Failed to encode {} event: {}", event.kind(), e);
                                    continue;
                                }
                            };
                            if sender.send(Message::Text(text.into())).await.is_err() {
                                break;
                            }
                        }
                        Some(Outbound::Close { code, reason }) => {
                            let _ = sender
                                .send(Message::Close(Some(CloseFrame {
                                    code,
                                    reason: reason.into(),
                                })))
                                .await;
                            break;
                        }
                        None => break,
                    }
                }
                _ = heartbeat.tick() => {
                    if pong_flag_send.swap(false, Ordering::Acquire) {
                        missed_heartbeats = 0;
                    } else {
                        missed_heartbeats = missed_heartbeats.saturating_add(1);
                        if missed_heartbeats >= max_missed {
                            warn!("Heartbeat timeout (missed {} pongs), dropping connection", missed_heartbeats);
                            break;
                        }
                    }
                    if sender.send(Message::Ping(Bytes::new())).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    // Read frames from client
    let gateway_recv = gateway.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => {
                    gateway_recv
                        .handle_frame(user_id, &reply, text.as_str())
                        .await;
                }
                Message::Binary(data) => {
                    debug!("{} sent a {} byte binary frame", user_id, data.len());
                    reply.send(GatewayEvent::error("binary frames are not supported"));
                }
                Message::Pong(_) => {
                    pong_flag_recv.store(true, Ordering::Release);
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    // Wait for either task to finish
    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    gateway.registry.release(user_id, conn_id).await;
    info!("{} ({}) disconnected from gateway", username, user_id);
}
