use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use tracing::{info, warn};
use uuid::Uuid;

use campus_types::events::{GatewayCommand, GatewayEvent};
use campus_types::models::Role;

use crate::registry::Registry;

/// Heartbeat interval: server sends a Ping every 15 seconds.
/// If 2 consecutive Pongs are missed (~30s), the connection is dropped.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

/// Byte cap when logging raw client frames.
const LOG_PREVIEW_BYTES: usize = 200;

/// Truncate client-supplied text for logging. Backs off to the nearest char
/// boundary so a multi-byte character straddling the cap cannot panic.
fn log_preview(text: &str) -> &str {
    if text.len() <= LOG_PREVIEW_BYTES {
        return text;
    }
    let mut end = LOG_PREVIEW_BYTES;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

/// Handle a pre-authenticated WebSocket connection.
///
/// The JWT was validated at the HTTP upgrade layer, so the session is bound
/// to the verified identity before the socket opens. The client-side `Join`
/// command is untrusted input: it is only accepted when it names the same
/// identity, otherwise it is logged and ignored.
pub async fn handle_connection(
    socket: WebSocket,
    registry: Registry,
    user_id: Uuid,
    username: String,
    role: Role,
) {
    let (mut sender, mut receiver) = socket.split();

    info!("{} ({}) connected to gateway", username, user_id);

    let ready = GatewayEvent::Ready {
        user_id,
        username: username.clone(),
        role,
    };
    let ready_json = match serde_json::to_string(&ready) {
        Ok(json) => json,
        Err(e) => {
            warn!("Failed to serialize Ready event: {}", e);
            return;
        }
    };
    if sender.send(Message::Text(ready_json.into())).await.is_err() {
        return;
    }

    // Bind the session to the authenticated identity
    let (session_id, mut user_rx) = registry.register(user_id).await;
    let mut broadcast_rx = registry.subscribe();

    // Shared flag for heartbeat: set by the recv task on Pong, cleared by
    // the send task on each tick.
    let pong_received = Arc::new(AtomicBool::new(true));
    let pong_flag_send = pong_received.clone();
    let pong_flag_recv = pong_received.clone();

    // Forward system-wide + targeted events to the client, with heartbeat
    let send_username = username.clone();
    let mut send_task = tokio::spawn(async move {
        let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
        heartbeat.tick().await;
        let mut missed_heartbeats: u8 = 0;

        loop {
            tokio::select! {
                result = broadcast_rx.recv() => {
                    let event = match result {
                        Ok(event) => event,
                        Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                            warn!("{} broadcast receiver lagged by {} events", send_username, n);
                            continue;
                        }
                        Err(_) => break,
                    };

                    let Ok(text) = serde_json::to_string(&event) else { continue };
                    if sender.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                result = user_rx.recv() => {
                    let event = match result {
                        Some(event) => event,
                        None => break,
                    };

                    let Ok(text) = serde_json::to_string(&event) else { continue };
                    if sender.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                _ = heartbeat.tick() => {
                    if pong_flag_send.swap(false, Ordering::Acquire) {
                        missed_heartbeats = 0;
                    } else {
                        missed_heartbeats += 1;
                        if missed_heartbeats >= 2 {
                            warn!("Heartbeat timeout (missed {} pongs), dropping connection", missed_heartbeats);
                            break;
                        }
                    }
                    if sender.send(Message::Ping(vec![].into())).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    // Read commands from the client
    let recv_username = username.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => match serde_json::from_str::<GatewayCommand>(&text) {
                    Ok(cmd) => handle_command(user_id, &recv_username, cmd),
                    Err(e) => {
                        warn!(
                            "{} ({}) bad command: {} -- raw: {}",
                            recv_username,
                            user_id,
                            e,
                            log_preview(&text)
                        );
                    }
                },
                Message::Pong(_) => {
                    pong_flag_recv.store(true, Ordering::Release);
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    registry.unregister(user_id, session_id).await;
    info!("{} ({}) disconnected from gateway", username, user_id);
}

fn handle_command(user_id: Uuid, username: &str, cmd: GatewayCommand) {
    match cmd {
        GatewayCommand::Join { user_id: claimed } => {
            // The session was already bound at upgrade time. A matching Join
            // is a harmless echo; a mismatched one is rejected.
            if claimed != user_id {
                warn!(
                    "{} ({}) sent Join for foreign identity {}, ignoring",
                    username, user_id, claimed
                );
            }
        }
    }
}
