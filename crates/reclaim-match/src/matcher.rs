use std::sync::Arc;

use anyhow::Result;
use serde::Serialize;
use tracing::{debug, info};

use reclaim_db::{Database, now_timestamp};
use reclaim_types::models::{MatchCandidate, ReportSnapshot};

use crate::notifier::{NotificationPayload, Notifier};
use crate::oracle::{MatchOracle, ORACLE_BATCH_SIZE};

/// A candidate fans out as a notification only above this score. Strictly
/// greater: 0.60 itself does not qualify.
pub const NOTIFY_THRESHOLD: f64 = 0.60;

#[derive(Debug, Default, Clone, Serialize)]
pub struct MatchPassSummary {
    pub lost_considered: usize,
    pub records_written: usize,
    pub notifications_sent: usize,
}

pub struct Matcher {
    db: Arc<Database>,
    oracle: Arc<dyn MatchOracle>,
    notifier: Arc<Notifier>,
    post_link_base: String,
}

impl Matcher {
    pub fn new(
        db: Arc<Database>,
        oracle: Arc<dyn MatchOracle>,
        notifier: Arc<Notifier>,
        post_link_base: impl Into<String>,
    ) -> Self {
        Self {
            db,
            oracle,
            notifier,
            post_link_base: post_link_base.into(),
        }
    }

    /// One full matching pass. Safe to invoke repeatedly: a lost report
    /// with an existing MatchRecord is skipped up front, and the record's
    /// primary key wins any race the pre-check misses.
    pub async fn run_pass(&self) -> Result<MatchPassSummary> {
        let lost_reports: Vec<ReportSnapshot> = self
            .db
            .all_lost_reports()?
            .into_iter()
            .map(|r| r.into_snapshot())
            .collect();
        let found_reports: Vec<ReportSnapshot> = self
            .db
            .all_found_reports()?
            .into_iter()
            .map(|r| r.into_snapshot())
            .collect();
        let matched = self.db.matched_lost_ids()?;

        info!(
            "Matching {} lost posts against {} found posts",
            lost_reports.len(),
            found_reports.len()
        );

        let mut summary = MatchPassSummary::default();
        for lost in lost_reports {
            if matched.contains(&lost.id) {
                debug!("Skipping already matched lost report {}", lost.id);
                continue;
            }
            summary.lost_considered += 1;

            let candidates = self.judge_against_all(&lost, &found_reports).await;
            if candidates.is_empty() {
                debug!("No matches for lost report {}", lost.id);
                continue;
            }

            // Every batch's result is merged into this single record —
            // one MatchRecord per lost report, never one per batch.
            let matches_json = serde_json::to_string(&candidates)?;
            let inserted =
                self.db
                    .insert_match_record_if_absent(&lost.id, &matches_json, &now_timestamp())?;
            if !inserted {
                // A concurrent pass won the write; the fan-out is its job.
                debug!("Match record for {} already present, skipping fan-out", lost.id);
                continue;
            }
            summary.records_written += 1;
            summary.notifications_sent += self.fan_out(&lost, &candidates).await?;
        }

        info!(
            "Matching pass complete: {} lost considered, {} records written, {} notifications",
            summary.lost_considered, summary.records_written, summary.notifications_sent
        );
        Ok(summary)
    }

    /// Judge one lost report against the whole found store in consecutive
    /// batches, strictly sequentially. A failed batch is skipped; whatever
    /// the remaining batches return still accumulates.
    async fn judge_against_all(
        &self,
        lost: &ReportSnapshot,
        found_reports: &[ReportSnapshot],
    ) -> Vec<MatchCandidate> {
        let mut merged = Vec::new();
        for batch in found_reports.chunks(ORACLE_BATCH_SIZE) {
            match self.oracle.judge(lost, batch).await {
                Some(candidates) => merged.extend(candidates),
                None => debug!("Oracle batch skipped for lost report {}", lost.id),
            }
        }
        merged
    }

    async fn fan_out(
        &self,
        lost: &ReportSnapshot,
        candidates: &[MatchCandidate],
    ) -> Result<usize> {
        let mut sent = 0;
        for candidate in candidates {
            if candidate.score <= NOTIFY_THRESHOLD {
                continue;
            }
            let post_link = format!(
                "{}/index/post/{}",
                self.post_link_base.trim_end_matches('/'),
                candidate.found_post_id
            );
            let payload = NotificationPayload::new(
                "Match Found!",
                format!("Found a match for your lost post: {}", lost.title),
                Some(post_link),
            );
            self.notifier.notify(&candidate.user_email, payload).await?;
            sent += 1;
        }
        Ok(sent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mailer::{LogMailer, Mailer};
    use crate::oracle::MatchOracle;
    use async_trait::async_trait;
    use reclaim_db::models::ReportRow;
    use reclaim_gateway::dispatcher::Dispatcher;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn report(id: &str, title: &str, email: &str) -> ReportRow {
        ReportRow {
            id: id.to_string(),
            title: title.to_string(),
            description: String::new(),
            tags: "[]".to_string(),
            place: "Gym".to_string(),
            area: "East".to_string(),
            submitter_uid: "u-1".to_string(),
            submitter_email: email.to_string(),
            submitter_name: "Someone".to_string(),
            is_solved: false,
        }
    }

    fn candidate(found_id: &str, email: &str, score: f64) -> MatchCandidate {
        MatchCandidate {
            found_post_id: found_id.to_string(),
            user_email: email.to_string(),
            score,
        }
    }

    /// Answers per leading found-report id of the batch; ids not scripted
    /// behave as an oracle failure (None).
    struct ScriptedOracle {
        by_batch_head: HashMap<String, Option<Vec<MatchCandidate>>>,
        calls: AtomicUsize,
    }

    impl ScriptedOracle {
        fn new(scripts: Vec<(&str, Option<Vec<MatchCandidate>>)>) -> Self {
            Self {
                by_batch_head: scripts
                    .into_iter()
                    .map(|(id, v)| (id.to_string(), v))
                    .collect(),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl MatchOracle for ScriptedOracle {
        async fn judge(
            &self,
            _lost: &ReportSnapshot,
            found_batch: &[ReportSnapshot],
        ) -> Option<Vec<MatchCandidate>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let head = found_batch.first().map(|r| r.id.clone())?;
            self.by_batch_head.get(&head).cloned().flatten()
        }
    }

    fn matcher_with(
        db: Arc<Database>,
        oracle: Arc<dyn MatchOracle>,
        mailer: Arc<dyn Mailer>,
    ) -> Matcher {
        let notifier = Arc::new(Notifier::new(db.clone(), Dispatcher::new(), mailer));
        Matcher::new(db, oracle, notifier, "https://reclaim.example")
    }

    fn seed_found(db: &Database, count: usize) {
        let rows: Vec<ReportRow> = (0..count)
            .map(|i| report(&format!("f-{}", i), "Blue backpack", "finder@example.com"))
            .collect();
        db.insert_found_if_absent(&rows).unwrap();
    }

    #[tokio::test]
    async fn merges_all_batches_into_one_record() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        db.insert_lost_if_absent(&[report("l-1", "Blue backpack", "owner@example.com")])
            .unwrap();
        seed_found(&db, 12);

        // Batches lead with f-0, f-5, f-10: first and last return one
        // candidate each, the middle one returns nothing.
        let oracle = Arc::new(ScriptedOracle::new(vec![
            ("f-0", Some(vec![candidate("f-2", "a@example.com", 0.9)])),
            ("f-5", Some(vec![])),
            ("f-10", Some(vec![candidate("f-11", "b@example.com", 0.8)])),
        ]));
        let matcher = matcher_with(db.clone(), oracle, Arc::new(LogMailer));

        let summary = matcher.run_pass().await.unwrap();
        assert_eq!(summary.records_written, 1);

        let record = db.get_match_record("l-1").unwrap().unwrap().into_record();
        assert_eq!(record.matches.len(), 2);
        assert_eq!(record.matches[0].found_post_id, "f-2");
        assert_eq!(record.matches[1].found_post_id, "f-11");
    }

    #[tokio::test]
    async fn failed_batches_are_skipped_not_fatal() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        db.insert_lost_if_absent(&[report("l-1", "Blue backpack", "owner@example.com")])
            .unwrap();
        seed_found(&db, 12);

        // The middle batch errors out; the other two still land.
        let oracle = Arc::new(ScriptedOracle::new(vec![
            ("f-0", Some(vec![candidate("f-1", "a@example.com", 0.9)])),
            ("f-5", None),
            ("f-10", Some(vec![candidate("f-10", "b@example.com", 0.7)])),
        ]));
        let matcher = matcher_with(db.clone(), oracle, Arc::new(LogMailer));

        matcher.run_pass().await.unwrap();
        let record = db.get_match_record("l-1").unwrap().unwrap().into_record();
        assert_eq!(record.matches.len(), 2);
    }

    #[tokio::test]
    async fn repeated_passes_write_at_most_one_record() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        db.insert_lost_if_absent(&[report("l-1", "Blue backpack", "owner@example.com")])
            .unwrap();
        seed_found(&db, 3);

        let oracle = Arc::new(ScriptedOracle::new(vec![(
            "f-0",
            Some(vec![candidate("f-0", "a@example.com", 0.95)]),
        )]));
        let matcher = matcher_with(db.clone(), oracle.clone(), Arc::new(LogMailer));

        let first = matcher.run_pass().await.unwrap();
        assert_eq!(first.records_written, 1);
        let calls_after_first = oracle.calls.load(Ordering::SeqCst);

        let second = matcher.run_pass().await.unwrap();
        assert_eq!(second.lost_considered, 0);
        assert_eq!(second.records_written, 0);
        // The skip set keeps the oracle out of it entirely.
        assert_eq!(oracle.calls.load(Ordering::SeqCst), calls_after_first);
    }

    #[tokio::test]
    async fn unmatched_lost_reports_retry_on_the_next_pass() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        db.insert_lost_if_absent(&[report("l-1", "Blue backpack", "owner@example.com")])
            .unwrap();
        seed_found(&db, 3);

        // Total oracle failure: no record may be written...
        let failing = Arc::new(ScriptedOracle::new(vec![("f-0", None)]));
        let matcher = matcher_with(db.clone(), failing, Arc::new(LogMailer));
        matcher.run_pass().await.unwrap();
        assert!(db.get_match_record("l-1").unwrap().is_none());

        // ...so the next pass considers the same lost report again.
        let working = Arc::new(ScriptedOracle::new(vec![(
            "f-0",
            Some(vec![candidate("f-0", "a@example.com", 0.9)]),
        )]));
        let matcher = matcher_with(db.clone(), working, Arc::new(LogMailer));
        let summary = matcher.run_pass().await.unwrap();
        assert_eq!(summary.lost_considered, 1);
        assert_eq!(summary.records_written, 1);
    }

    #[tokio::test]
    async fn threshold_is_strictly_greater_than() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        db.insert_lost_if_absent(&[report("l-1", "Blue backpack", "owner@example.com")])
            .unwrap();
        seed_found(&db, 2);

        let oracle = Arc::new(ScriptedOracle::new(vec![(
            "f-0",
            Some(vec![
                candidate("f-0", "at-threshold@example.com", 0.60),
                candidate("f-1", "above-threshold@example.com", 0.61),
            ]),
        )]));
        let matcher = matcher_with(db.clone(), oracle, Arc::new(LogMailer));

        let summary = matcher.run_pass().await.unwrap();
        assert_eq!(summary.notifications_sent, 1);
        assert!(db.unread_notifications("at-threshold@example.com", 20).unwrap().is_empty());

        let delivered = db
            .unread_notifications("above-threshold@example.com", 20)
            .unwrap();
        assert_eq!(delivered.len(), 1);
        assert_eq!(
            delivered[0].post_link.as_deref(),
            Some("https://reclaim.example/index/post/f-1")
        );
        // The record itself keeps every candidate, threshold or not.
        let record = db.get_match_record("l-1").unwrap().unwrap().into_record();
        assert_eq!(record.matches.len(), 2);
    }
}
