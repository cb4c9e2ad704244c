use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tracing::{debug, info, warn};

use reclaim_db::Database;

use crate::ingest;
use crate::matcher::Matcher;

/// Polls the found store and kicks one ingest + matching cycle whenever it
/// grew since the previous tick. Coarse-grained polling: the store has no
/// push channel.
pub struct ChangeMonitor {
    db: Arc<Database>,
    matcher: Arc<Matcher>,
    /// Count observed on the previous tick. The first tick only
    /// establishes this; comparing against anything older re-triggers
    /// spuriously on every tick after the first growth.
    baseline: Option<i64>,
}

impl ChangeMonitor {
    pub fn new(db: Arc<Database>, matcher: Arc<Matcher>) -> Self {
        Self {
            db,
            matcher,
            baseline: None,
        }
    }

    /// One observation. Returns whether a pipeline cycle ran.
    pub async fn tick(&mut self) -> Result<bool> {
        let count = self.db.count_found()?;

        let Some(baseline) = self.baseline else {
            debug!("Change monitor baseline established at {}", count);
            self.baseline = Some(count);
            return Ok(false);
        };

        if count <= baseline {
            debug!("No new found posts ({} observed, baseline {})", count, baseline);
            return Ok(false);
        }

        info!("Found store grew {} -> {}, running ingest + matching", baseline, count);
        ingest::classify_and_store(&self.db)?;
        self.matcher.run_pass().await?;

        // Advance only after a successful cycle so a failed tick retries.
        self.baseline = Some(count);
        Ok(true)
    }

    /// Recurring loop. Per-tick failures are logged and the loop survives;
    /// the next tick naturally retries.
    pub async fn run(mut self, interval: Duration) {
        let mut timer = tokio::time::interval(interval);
        info!("Change monitor running every {:?}", interval);

        loop {
            timer.tick().await;
            if let Err(e) = self.tick().await {
                warn!("Change monitor tick failed: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mailer::LogMailer;
    use crate::matcher::Matcher;
    use crate::notifier::Notifier;
    use crate::oracle::MatchOracle;
    use async_trait::async_trait;
    use reclaim_db::models::ReportRow;
    use reclaim_gateway::dispatcher::Dispatcher;
    use reclaim_types::models::{MatchCandidate, ReportSnapshot};

    struct SilentOracle;

    #[async_trait]
    impl MatchOracle for SilentOracle {
        async fn judge(
            &self,
            _lost: &ReportSnapshot,
            _found_batch: &[ReportSnapshot],
        ) -> Option<Vec<MatchCandidate>> {
            Some(vec![])
        }
    }

    fn monitor_over(db: Arc<Database>) -> ChangeMonitor {
        let notifier = Arc::new(Notifier::new(db.clone(), Dispatcher::new(), Arc::new(LogMailer)));
        let matcher = Arc::new(Matcher::new(
            db.clone(),
            Arc::new(SilentOracle),
            notifier,
            "https://reclaim.example",
        ));
        ChangeMonitor::new(db, matcher)
    }

    fn found_rows(range: std::ops::Range<usize>) -> Vec<ReportRow> {
        range
            .map(|i| ReportRow {
                id: format!("f-{}", i),
                title: "Umbrella".to_string(),
                description: String::new(),
                tags: "[]".to_string(),
                place: "Lobby".to_string(),
                area: "Main".to_string(),
                submitter_uid: "u-2".to_string(),
                submitter_email: "finder@example.com".to_string(),
                submitter_name: "Finder".to_string(),
                is_solved: false,
            })
            .collect()
    }

    #[tokio::test]
    async fn first_tick_only_establishes_the_baseline() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        db.insert_found_if_absent(&found_rows(0..10)).unwrap();

        let mut monitor = monitor_over(db);
        assert!(!monitor.tick().await.unwrap());
        assert_eq!(monitor.baseline, Some(10));
    }

    #[tokio::test]
    async fn growth_between_ticks_triggers_exactly_once() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        db.insert_found_if_absent(&found_rows(0..10)).unwrap();

        let mut monitor = monitor_over(db.clone());
        monitor.tick().await.unwrap();

        db.insert_found_if_absent(&found_rows(10..15)).unwrap();
        assert!(monitor.tick().await.unwrap());
        assert_eq!(monitor.baseline, Some(15));

        // Count parked at 15: nothing more fires.
        assert!(!monitor.tick().await.unwrap());
        assert!(!monitor.tick().await.unwrap());
    }

    #[tokio::test]
    async fn shrinking_count_never_triggers() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        db.insert_found_if_absent(&found_rows(0..5)).unwrap();

        let mut monitor = monitor_over(db.clone());
        monitor.tick().await.unwrap();

        db.with_conn_mut(|conn| {
            conn.execute("DELETE FROM found_reports WHERE id = 'f-0'", [])?;
            Ok(())
        })
        .unwrap();
        assert!(!monitor.tick().await.unwrap());
        assert_eq!(monitor.baseline, Some(5));
    }
}
