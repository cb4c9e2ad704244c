use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use futures_util::stream::{SplitSink, SplitStream};
use tracing::{info, warn};

use reclaim_db::Database;
use reclaim_types::events::GatewayEvent;

use crate::dispatcher::Dispatcher;

/// Heartbeat interval: server sends a Ping every 15 seconds.
/// If 2 consecutive Pongs are missed (~30s), the connection is dropped.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

/// At most this many unread notifications are replayed on (re)connect,
/// newest first.
const REPLAY_LIMIT: u32 = 20;

/// Handle one notification socket. The user id comes from the upgrade
/// path; a reconnect for the same user replaces the registry entry.
pub async fn handle_connection(
    socket: WebSocket,
    dispatcher: Dispatcher,
    db: Arc<Database>,
    user_id: String,
) {
    let (mut sender, receiver) = socket.split();

    info!("{} connected to gateway", user_id);

    let (conn_id, user_rx) = dispatcher.register(&user_id).await;

    let ready = GatewayEvent::Ready {
        user_id: user_id.clone(),
    };
    if send_event(&mut sender, &ready).await.is_err() {
        dispatcher.unregister(&user_id, conn_id).await;
        return;
    }

    // The durable store is the replay log: whatever the user missed while
    // offline goes out before any live event.
    if replay_unread(&mut sender, &db, &user_id).await.is_err() {
        dispatcher.unregister(&user_id, conn_id).await;
        return;
    }

    run_connection_loop(sender, receiver, &user_id, user_rx).await;

    dispatcher.unregister(&user_id, conn_id).await;
    info!("{} disconnected from gateway", user_id);
}

async fn send_event(
    sender: &mut SplitSink<WebSocket, Message>,
    event: &GatewayEvent,
) -> Result<(), axum::Error> {
    let text = serde_json::to_string(event).unwrap();
    sender.send(Message::Text(text.into())).await
}

/// Replay unread notifications into a fresh channel. A store read failure
/// is logged and tolerated (the socket stays up, live-only); a socket send
/// failure ends the connection.
async fn replay_unread(
    sender: &mut SplitSink<WebSocket, Message>,
    db: &Arc<Database>,
    user_id: &str,
) -> Result<(), axum::Error> {
    let db = db.clone();
    let uid = user_id.to_string();
    let rows = tokio::task::spawn_blocking(move || db.unread_notifications(&uid, REPLAY_LIMIT)).await;

    let rows = match rows {
        Ok(Ok(rows)) => rows,
        Ok(Err(e)) => {
            warn!("Unread replay query failed for {}: {}", user_id, e);
            return Ok(());
        }
        Err(e) => {
            warn!("Unread replay join error for {}: {}", user_id, e);
            return Ok(());
        }
    };

    for row in rows {
        let n = row.into_notification();
        let event = GatewayEvent::Notification {
            id: n.id,
            kind: n.kind,
            title: n.title,
            message: n.message,
            post_link: n.post_link,
            created_at: n.created_at,
        };
        send_event(sender, &event).await?;
    }

    Ok(())
}

async fn run_connection_loop(
    mut sender: SplitSink<WebSocket, Message>,
    mut receiver: SplitStream<WebSocket>,
    user_id: &str,
    mut user_rx: tokio::sync::mpsc::UnboundedReceiver<GatewayEvent>,
) {
    let pong_received = Arc::new(AtomicBool::new(true));
    let pong_flag_send = pong_received.clone();
    let pong_flag_recv = pong_received.clone();

    let send_user_id = user_id.to_string();

    // Forward targeted events -> client, with heartbeat
    let mut send_task = tokio::spawn(async move {
        let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
        heartbeat.tick().await;
        let mut missed_heartbeats: u8 = 0;

        loop {
            tokio::select! {
                result = user_rx.recv() => {
                    let event = match result {
                        Some(event) => event,
                        None => break,
                    };
                    if send_event(&mut sender, &event).await.is_err() {
                        warn!("Push failed for {}, dropping connection", send_user_id);
                        break;
                    }
                }
                _ = heartbeat.tick() => {
                    if pong_flag_send.swap(false, Ordering::Acquire) {
                        missed_heartbeats = 0;
                    } else {
                        missed_heartbeats += 1;
                        if missed_heartbeats >= 2 {
                            warn!("Heartbeat timeout for {} (missed {} pongs), dropping connection",
                                send_user_id, missed_heartbeats);
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

    // The client has nothing to say on this socket: text frames are
    // keep-alives and are dropped on the floor.
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(_) => {}
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
}
