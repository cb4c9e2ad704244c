use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{RwLock, mpsc};
use uuid::Uuid;

use reclaim_types::events::GatewayEvent;

/// Live channel registry: tracks which users hold an open notification
/// socket. Process-local only — the durable notification store is the
/// cross-process source of truth.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

struct DispatcherInner {
    /// user_id -> (conn_id, sender). At most one entry per user; a
    /// reconnect replaces the old entry without closing its handle (the old
    /// connection is assumed dead or superseded).
    channels: RwLock<HashMap<String, (Uuid, mpsc::UnboundedSender<GatewayEvent>)>>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(DispatcherInner {
                channels: RwLock::new(HashMap::new()),
            }),
        }
    }

    /// Register a user's live channel. Returns (conn_id, receiver).
    pub async fn register(&self, user_id: &str) -> (Uuid, mpsc::UnboundedReceiver<GatewayEvent>) {
        let conn_id = Uuid::new_v4();
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner
            .channels
            .write()
            .await
            .insert(user_id.to_string(), (conn_id, tx));
        (conn_id, rx)
    }

    /// Drop a user's live channel, but only if conn_id still owns the
    /// entry — a newer connection may have taken over.
    pub async fn unregister(&self, user_id: &str, conn_id: Uuid) {
        let mut channels = self.inner.channels.write().await;
        if let Some((stored_conn_id, _)) = channels.get(user_id) {
            if *stored_conn_id == conn_id {
                channels.remove(user_id);
            }
        }
    }

    /// Push an event to a connected user. A miss just means the user is
    /// offline; a dead channel is deregistered. Returns whether the event
    /// was handed to a live connection.
    pub async fn send_to_user(&self, user_id: &str, event: GatewayEvent) -> bool {
        let stale_conn_id = {
            let channels = self.inner.channels.read().await;
            match channels.get(user_id) {
                Some((conn_id, tx)) => match tx.send(event) {
                    Ok(()) => return true,
                    Err(_) => *conn_id,
                },
                None => return false,
            }
        };

        // The connection task is gone but never cleaned up after itself.
        self.unregister(user_id, stale_conn_id).await;
        false
    }

    pub async fn is_connected(&self, user_id: &str) -> bool {
        self.inner.channels.read().await.contains_key(user_id)
    }
}
