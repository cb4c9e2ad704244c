//! Database row types — these map directly to SQLite rows.
//! Distinct from reclaim-types API models to keep the DB layer independent;
//! list-shaped columns (tags, images, match candidates) are JSON text.

use chrono::{DateTime, Utc};
use tracing::warn;

use reclaim_types::models::{
    Location, MatchCandidate, MatchRecord, Notification, Post, ReportSnapshot, Submitter,
};

pub struct PostRow {
    pub id: String,
    pub kind: String,
    pub title: String,
    pub description: String,
    pub images: String,
    pub place: String,
    pub area: String,
    pub tags: String,
    pub submitter_uid: String,
    pub submitter_email: String,
    pub submitter_name: String,
    pub submitter_avatar: Option<String>,
    pub is_solved: bool,
    pub created_at: String,
}

pub struct ReportRow {
    pub id: String,
    pub title: String,
    pub description: String,
    pub tags: String,
    pub place: String,
    pub area: String,
    pub submitter_uid: String,
    pub submitter_email: String,
    pub submitter_name: String,
    pub is_solved: bool,
}

pub struct MatchRecordRow {
    pub lost_report_id: String,
    pub matches: String,
    pub created_at: String,
}

pub struct NotificationRow {
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub message: String,
    pub kind: String,
    pub post_link: Option<String>,
    pub read: bool,
    pub created_at: String,
}

impl PostRow {
    pub fn from_post(post: &Post) -> Self {
        Self {
            id: post.id.clone(),
            kind: post.kind.clone(),
            title: post.title.clone(),
            description: post.description.clone(),
            images: encode_list(&post.images),
            place: post.location.place.clone(),
            area: post.location.area.clone(),
            tags: encode_list(&post.tags),
            submitter_uid: post.submitter.uid.clone(),
            submitter_email: post.submitter.email.clone(),
            submitter_name: post.submitter.name.clone(),
            submitter_avatar: post.submitter.avatar.clone(),
            is_solved: post.is_solved,
            created_at: post
                .created_at
                .to_rfc3339_opts(chrono::SecondsFormat::Micros, true),
        }
    }

    pub fn into_post(self) -> Post {
        Post {
            created_at: parse_timestamp(&self.created_at, &self.id),
            kind: self.kind,
            title: self.title,
            description: self.description,
            images: decode_list(&self.images, &self.id),
            location: Location {
                place: self.place,
                area: self.area,
            },
            tags: decode_list(&self.tags, &self.id),
            submitter: Submitter {
                uid: self.submitter_uid,
                email: self.submitter_email,
                name: self.submitter_name,
                avatar: self.submitter_avatar,
            },
            is_solved: self.is_solved,
            id: self.id,
        }
    }
}

impl ReportRow {
    pub fn into_snapshot(self) -> ReportSnapshot {
        ReportSnapshot {
            title: self.title,
            description: self.description,
            tags: decode_list(&self.tags, &self.id),
            location: Location {
                place: self.place,
                area: self.area,
            },
            submitter: Submitter {
                uid: self.submitter_uid,
                email: self.submitter_email,
                name: self.submitter_name,
                avatar: None,
            },
            is_solved: self.is_solved,
            id: self.id,
        }
    }

    pub fn from_snapshot(snapshot: &ReportSnapshot) -> Self {
        Self {
            id: snapshot.id.clone(),
            title: snapshot.title.clone(),
            description: snapshot.description.clone(),
            tags: encode_list(&snapshot.tags),
            place: snapshot.location.place.clone(),
            area: snapshot.location.area.clone(),
            submitter_uid: snapshot.submitter.uid.clone(),
            submitter_email: snapshot.submitter.email.clone(),
            submitter_name: snapshot.submitter.name.clone(),
            is_solved: snapshot.is_solved,
        }
    }
}

impl MatchRecordRow {
    pub fn into_record(self) -> MatchRecord {
        let matches: Vec<MatchCandidate> =
            serde_json::from_str(&self.matches).unwrap_or_else(|e| {
                warn!(
                    "Corrupt matches column on record '{}': {}",
                    self.lost_report_id, e
                );
                Vec::new()
            });
        MatchRecord {
            created_at: parse_timestamp(&self.created_at, &self.lost_report_id),
            lost_report_id: self.lost_report_id,
            matches,
        }
    }
}

impl NotificationRow {
    pub fn into_notification(self) -> Notification {
        Notification {
            created_at: parse_timestamp(&self.created_at, &self.id),
            user_id: self.user_id,
            title: self.title,
            message: self.message,
            kind: self.kind,
            post_link: self.post_link,
            read: self.read,
            id: self.id,
        }
    }
}

fn encode_list(items: &[String]) -> String {
    serde_json::to_string(items).unwrap_or_else(|_| "[]".to_string())
}

fn decode_list(raw: &str, row_id: &str) -> Vec<String> {
    serde_json::from_str(raw).unwrap_or_else(|e| {
        warn!("Corrupt list column on row '{}': {}", row_id, e);
        Vec::new()
    })
}

fn parse_timestamp(raw: &str, row_id: &str) -> DateTime<Utc> {
    raw.parse::<DateTime<Utc>>()
        .or_else(|_| {
            // SQLite's datetime('now') writes "YYYY-MM-DD HH:MM:SS" without
            // a timezone. Parse as naive UTC and convert.
            chrono::NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S").map(|ndt| ndt.and_utc())
        })
        .unwrap_or_else(|e| {
            warn!("Corrupt created_at '{}' on row '{}': {}", raw, row_id, e);
            DateTime::default()
        })
}
