use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Events sent over the notification websocket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum GatewayEvent {
    /// Server confirms the connection is registered
    Ready { user_id: String },

    /// A notification for this user — pushed live on creation, and replayed
    /// from the durable store on (re)connect
    Notification {
        id: String,
        kind: String,
        title: String,
        message: String,
        post_link: Option<String>,
        created_at: DateTime<Utc>,
    },
}
