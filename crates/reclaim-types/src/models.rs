use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Report kinds recognized by the classifier. Posts carry the kind as
/// free-form text ("LOST"/"FOUND"); anything else never reaches the
/// lost/found stores.
pub const KIND_LOST: &str = "LOST";
pub const KIND_FOUND: &str = "FOUND";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Location {
    pub place: String,
    pub area: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Submitter {
    pub uid: String,
    pub email: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
}

/// A raw item report exactly as submitted. This is the system of record;
/// the lost/found stores hold trimmed snapshots of it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Post {
    pub id: String,
    pub kind: String,
    pub title: String,
    pub description: String,
    pub images: Vec<String>,
    pub location: Location,
    pub tags: Vec<String>,
    pub submitter: Submitter,
    pub created_at: DateTime<Utc>,
    pub is_solved: bool,
}

/// A lost or found report as the matcher sees it: the submitted post minus
/// the revision-of-record fields (timestamps, image payloads, avatar).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportSnapshot {
    pub id: String,
    pub title: String,
    pub description: String,
    pub tags: Vec<String>,
    pub location: Location,
    pub submitter: Submitter,
    pub is_solved: bool,
}

/// One candidate pairing returned by the similarity oracle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchCandidate {
    pub found_post_id: String,
    pub user_email: String,
    pub score: f64,
}

/// The persisted outcome of comparing one lost report against the found
/// store. At most one exists per lost report; its presence is what marks a
/// lost report as processed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchRecord {
    pub lost_report_id: String,
    pub matches: Vec<MatchCandidate>,
    pub created_at: DateTime<Utc>,
}

/// Durable notification record. `user_id` is the recipient's email — the
/// same string the oracle reports and the websocket path carries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub message: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub post_link: Option<String>,
    pub read: bool,
    pub created_at: DateTime<Utc>,
}
