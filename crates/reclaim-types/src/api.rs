use serde::{Deserialize, Serialize};

use crate::models::Submitter;

// -- Posts --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreatePostRequest {
    pub kind: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub images: Vec<String>,
    pub place: String,
    pub area: String,
    #[serde(default)]
    pub tags: Vec<String>,
    pub submitter: Submitter,
}

// -- Matching trigger --

#[derive(Debug, Serialize, Deserialize)]
pub struct RunMatchingResponse {
    pub inserted_lost: usize,
    pub inserted_found: usize,
    pub lost_considered: usize,
    pub records_written: usize,
    pub notifications_sent: usize,
}

// -- Notifications --

#[derive(Debug, Serialize, Deserialize)]
pub struct MarkReadResponse {
    pub id: String,
    pub read: bool,
}
