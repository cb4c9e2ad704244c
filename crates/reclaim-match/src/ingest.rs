use anyhow::Result;
use serde::Serialize;
use tracing::{debug, info};

use reclaim_db::Database;
use reclaim_db::models::{PostRow, ReportRow};
use reclaim_types::models::{KIND_FOUND, KIND_LOST};

/// Buffered snapshots are flushed to their store once this many accumulate.
pub const FLUSH_THRESHOLD: usize = 50;

#[derive(Debug, Default, Clone, Serialize)]
pub struct IngestSummary {
    pub inserted_lost: usize,
    pub inserted_found: usize,
    pub skipped: usize,
}

/// Route every raw post into the lost or found store, deduplicating by post
/// id. Re-running over the same posts inserts nothing, so the classifier is
/// safe to trigger from a timer.
pub fn classify_and_store(db: &Database) -> Result<IngestSummary> {
    let posts = db.scan_posts()?;

    let mut summary = IngestSummary::default();
    let mut lost_buffer: Vec<ReportRow> = Vec::new();
    let mut found_buffer: Vec<ReportRow> = Vec::new();

    for post in posts {
        let kind = post.kind.trim();
        if kind.eq_ignore_ascii_case(KIND_LOST) {
            lost_buffer.push(snapshot(post));
        } else if kind.eq_ignore_ascii_case(KIND_FOUND) {
            found_buffer.push(snapshot(post));
        } else {
            // Unknown or missing kinds never reach the matching stores.
            debug!("Skipping post {} with unrecognized kind '{}'", post.id, post.kind);
            summary.skipped += 1;
            continue;
        }

        if lost_buffer.len() >= FLUSH_THRESHOLD {
            summary.inserted_lost += flush_lost(db, &mut lost_buffer)?;
        }
        if found_buffer.len() >= FLUSH_THRESHOLD {
            summary.inserted_found += flush_found(db, &mut found_buffer)?;
        }
    }

    summary.inserted_lost += flush_lost(db, &mut lost_buffer)?;
    summary.inserted_found += flush_found(db, &mut found_buffer)?;

    info!(
        "Ingest pass complete: {} lost and {} found inserted, {} skipped",
        summary.inserted_lost, summary.inserted_found, summary.skipped
    );
    Ok(summary)
}

/// The matching snapshot drops the revision-of-record fields: timestamps,
/// image payloads and the submitter avatar stay behind in `posts`.
fn snapshot(post: PostRow) -> ReportRow {
    ReportRow {
        id: post.id,
        title: post.title,
        description: post.description,
        tags: post.tags,
        place: post.place,
        area: post.area,
        submitter_uid: post.submitter_uid,
        submitter_email: post.submitter_email,
        submitter_name: post.submitter_name,
        is_solved: post.is_solved,
    }
}

fn flush_lost(db: &Database, buffer: &mut Vec<ReportRow>) -> Result<usize> {
    if buffer.is_empty() {
        return Ok(0);
    }
    let ids: Vec<String> = buffer.iter().map(|r| r.id.clone()).collect();
    let present = db.lost_ids_present(&ids)?;
    let fresh: Vec<ReportRow> = buffer.drain(..).filter(|r| !present.contains(&r.id)).collect();
    db.insert_lost_if_absent(&fresh)
}

fn flush_found(db: &Database, buffer: &mut Vec<ReportRow>) -> Result<usize> {
    if buffer.is_empty() {
        return Ok(0);
    }
    let ids: Vec<String> = buffer.iter().map(|r| r.id.clone()).collect();
    let present = db.found_ids_present(&ids)?;
    let fresh: Vec<ReportRow> = buffer.drain(..).filter(|r| !present.contains(&r.id)).collect();
    db.insert_found_if_absent(&fresh)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn post(id: &str, kind: &str) -> PostRow {
        PostRow {
            id: id.to_string(),
            kind: kind.to_string(),
            title: format!("Item {}", id),
            description: "left on a bench".to_string(),
            images: "[\"https://img.example/1.jpg\"]".to_string(),
            place: "Cafeteria".to_string(),
            area: "Block B".to_string(),
            tags: "[\"WALLET\"]".to_string(),
            submitter_uid: "u-1".to_string(),
            submitter_email: "owner@example.com".to_string(),
            submitter_name: "Owner".to_string(),
            submitter_avatar: Some("https://img.example/a.png".to_string()),
            is_solved: false,
            created_at: "2026-08-01T09:00:00.000000Z".to_string(),
        }
    }

    #[test]
    fn routes_by_kind_case_insensitively() {
        let db = Database::open_in_memory().unwrap();
        db.insert_post(&post("a", "LOST")).unwrap();
        db.insert_post(&post("b", "found")).unwrap();
        db.insert_post(&post("c", "Lost")).unwrap();

        let summary = classify_and_store(&db).unwrap();
        assert_eq!(summary.inserted_lost, 2);
        assert_eq!(summary.inserted_found, 1);
        assert_eq!(summary.skipped, 0);
    }

    #[test]
    fn unknown_kinds_are_dropped_not_fatal() {
        let db = Database::open_in_memory().unwrap();
        db.insert_post(&post("a", "LOST")).unwrap();
        db.insert_post(&post("b", "stolen")).unwrap();
        db.insert_post(&post("c", "")).unwrap();

        let summary = classify_and_store(&db).unwrap();
        assert_eq!(summary.inserted_lost, 1);
        assert_eq!(summary.inserted_found, 0);
        assert_eq!(summary.skipped, 2);
    }

    #[test]
    fn reingesting_the_same_posts_is_idempotent() {
        let db = Database::open_in_memory().unwrap();
        for i in 0..60 {
            let kind = if i % 2 == 0 { "LOST" } else { "FOUND" };
            db.insert_post(&post(&format!("p-{}", i), kind)).unwrap();
        }

        let first = classify_and_store(&db).unwrap();
        assert_eq!(first.inserted_lost, 30);
        assert_eq!(first.inserted_found, 30);

        let second = classify_and_store(&db).unwrap();
        assert_eq!(second.inserted_lost, 0);
        assert_eq!(second.inserted_found, 0);

        assert_eq!(db.all_lost_reports().unwrap().len(), 30);
        assert_eq!(db.all_found_reports().unwrap().len(), 30);
    }

    #[test]
    fn snapshot_strips_revision_of_record_fields() {
        let db = Database::open_in_memory().unwrap();
        db.insert_post(&post("a", "LOST")).unwrap();
        classify_and_store(&db).unwrap();

        let stored = db.all_lost_reports().unwrap().remove(0).into_snapshot();
        assert_eq!(stored.id, "a");
        assert!(stored.submitter.avatar.is_none());
        assert_eq!(stored.tags, vec!["WALLET".to_string()]);
    }
}
