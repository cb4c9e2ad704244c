use std::sync::Arc;

use anyhow::Result;
use tracing::{debug, warn};
use uuid::Uuid;

use reclaim_db::models::NotificationRow;
use reclaim_db::{Database, now_timestamp};
use reclaim_gateway::dispatcher::Dispatcher;
use reclaim_types::events::GatewayEvent;

use crate::mailer::Mailer;

#[derive(Debug, Clone)]
pub struct NotificationPayload {
    pub title: String,
    pub message: String,
    pub kind: String,
    pub post_link: Option<String>,
}

impl NotificationPayload {
    pub fn new(title: impl Into<String>, message: impl Into<String>, post_link: Option<String>) -> Self {
        Self {
            title: title.into(),
            message: message.into(),
            kind: "notification".to_string(),
            post_link,
        }
    }
}

/// Notification fan-out with a durability backbone: if `notify` returns Ok,
/// the stored record exists and the user can discover it on next connect,
/// whatever happened to the live and mail legs.
pub struct Notifier {
    db: Arc<Database>,
    dispatcher: Dispatcher,
    mailer: Arc<dyn Mailer>,
}

impl Notifier {
    pub fn new(db: Arc<Database>, dispatcher: Dispatcher, mailer: Arc<dyn Mailer>) -> Self {
        Self {
            db,
            dispatcher,
            mailer,
        }
    }

    /// Deliver one notification. Ordering is the contract:
    /// (a) durable insert — the only failure that surfaces;
    /// (b) live push — a registry miss means offline, a dead channel is
    ///     deregistered, neither is an error;
    /// (c) email — logged on failure, never rolls back (a).
    pub async fn notify(&self, user_id: &str, payload: NotificationPayload) -> Result<()> {
        let row = NotificationRow {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            title: payload.title.clone(),
            message: payload.message.clone(),
            kind: payload.kind.clone(),
            post_link: payload.post_link.clone(),
            read: false,
            created_at: now_timestamp(),
        };
        self.db.insert_notification(&row)?;

        let stored = row.into_notification();
        let event = GatewayEvent::Notification {
            id: stored.id.clone(),
            kind: stored.kind,
            title: stored.title,
            message: stored.message,
            post_link: stored.post_link,
            created_at: stored.created_at,
        };
        if !self.dispatcher.send_to_user(user_id, event).await {
            debug!("{} is offline, notification {} waits in the store", user_id, stored.id);
        }

        let body = match &payload.post_link {
            Some(link) => format!("{}\n\nLink: {}", payload.message, link),
            None => format!("{}\n\nLink: N/A", payload.message),
        };
        if let Err(e) = self.mailer.send(user_id, &payload.title, &body).await {
            warn!("Failed to send email to {}: {}", user_id, e);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct RecordingMailer {
        sent: Mutex<Vec<(String, String)>>,
    }

    #[async_trait]
    impl Mailer for RecordingMailer {
        async fn send(&self, to: &str, subject: &str, _body: &str) -> Result<()> {
            self.sent
                .lock()
                .unwrap()
                .push((to.to_string(), subject.to_string()));
            Ok(())
        }
    }

    struct RejectingMailer;

    #[async_trait]
    impl Mailer for RejectingMailer {
        async fn send(&self, _to: &str, _subject: &str, _body: &str) -> Result<()> {
            anyhow::bail!("mail server rejected the message")
        }
    }

    fn payload() -> NotificationPayload {
        NotificationPayload::new(
            "Match Found!",
            "Found a match for your lost post: Black wallet",
            Some("https://reclaim.example/index/post/f-1".to_string()),
        )
    }

    #[tokio::test]
    async fn durable_record_exists_even_when_user_is_offline() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let notifier = Notifier::new(
            db.clone(),
            Dispatcher::new(),
            Arc::new(RecordingMailer { sent: Mutex::new(Vec::new()) }),
        );

        notifier.notify("owner@example.com", payload()).await.unwrap();

        let unread = db.unread_notifications("owner@example.com", 20).unwrap();
        assert_eq!(unread.len(), 1);
        assert_eq!(unread[0].title, "Match Found!");
        assert!(!unread[0].read);
    }

    #[tokio::test]
    async fn connected_user_receives_the_live_push() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let dispatcher = Dispatcher::new();
        let (_conn_id, mut rx) = dispatcher.register("owner@example.com").await;

        let notifier = Notifier::new(
            db.clone(),
            dispatcher,
            Arc::new(RecordingMailer { sent: Mutex::new(Vec::new()) }),
        );
        notifier.notify("owner@example.com", payload()).await.unwrap();

        match rx.recv().await {
            Some(GatewayEvent::Notification { title, .. }) => assert_eq!(title, "Match Found!"),
            other => panic!("expected a notification event, got {:?}", other),
        }
        // Live push does not replace the durable record.
        assert_eq!(db.unread_notifications("owner@example.com", 20).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn mail_rejection_does_not_roll_back_the_durable_record() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let notifier = Notifier::new(db.clone(), Dispatcher::new(), Arc::new(RejectingMailer));

        notifier.notify("owner@example.com", payload()).await.unwrap();

        assert_eq!(db.unread_notifications("owner@example.com", 20).unwrap().len(), 1);
    }
}
