use std::collections::HashSet;

use crate::Database;
use crate::models::{MatchRecordRow, NotificationRow, PostRow, ReportRow};
use anyhow::Result;
use rusqlite::Connection;

const LOST_TABLE: &str = "lost_reports";
const FOUND_TABLE: &str = "found_reports";

impl Database {
    // -- Posts (ingestion source) --

    pub fn insert_post(&self, row: &PostRow) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO posts (id, kind, title, description, images, place, area, tags,
                                    submitter_uid, submitter_email, submitter_name,
                                    submitter_avatar, is_solved, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
                rusqlite::params![
                    row.id,
                    row.kind,
                    row.title,
                    row.description,
                    row.images,
                    row.place,
                    row.area,
                    row.tags,
                    row.submitter_uid,
                    row.submitter_email,
                    row.submitter_name,
                    row.submitter_avatar,
                    row.is_solved,
                    row.created_at,
                ],
            )?;
            Ok(())
        })
    }

    pub fn get_post(&self, id: &str) -> Result<Option<PostRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!("{} WHERE id = ?1", POST_SELECT))?;
            let row = stmt.query_row([id], post_from_row).optional()?;
            Ok(row)
        })
    }

    /// Newest first, for the listing API.
    pub fn list_posts(&self) -> Result<Vec<PostRow>> {
        self.with_conn(|conn| {
            let mut stmt =
                conn.prepare(&format!("{} ORDER BY created_at DESC, rowid DESC", POST_SELECT))?;
            let rows = stmt
                .query_map([], post_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Arrival order, for the classifier scan.
    pub fn scan_posts(&self) -> Result<Vec<PostRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!("{} ORDER BY rowid", POST_SELECT))?;
            let rows = stmt
                .query_map([], post_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    // -- Lost / Found snapshots --

    pub fn lost_ids_present(&self, ids: &[String]) -> Result<HashSet<String>> {
        self.with_conn(|conn| ids_present(conn, LOST_TABLE, ids))
    }

    pub fn found_ids_present(&self, ids: &[String]) -> Result<HashSet<String>> {
        self.with_conn(|conn| ids_present(conn, FOUND_TABLE, ids))
    }

    /// Bulk insert, skipping ids already stored. Returns how many rows
    /// actually landed.
    pub fn insert_lost_if_absent(&self, rows: &[ReportRow]) -> Result<usize> {
        self.with_conn_mut(|conn| insert_reports(conn, LOST_TABLE, rows))
    }

    pub fn insert_found_if_absent(&self, rows: &[ReportRow]) -> Result<usize> {
        self.with_conn_mut(|conn| insert_reports(conn, FOUND_TABLE, rows))
    }

    pub fn all_lost_reports(&self) -> Result<Vec<ReportRow>> {
        self.with_conn(|conn| query_reports(conn, LOST_TABLE))
    }

    pub fn all_found_reports(&self) -> Result<Vec<ReportRow>> {
        self.with_conn(|conn| query_reports(conn, FOUND_TABLE))
    }

    pub fn count_found(&self) -> Result<i64> {
        self.with_conn(|conn| {
            let count =
                conn.query_row("SELECT COUNT(*) FROM found_reports", [], |row| row.get(0))?;
            Ok(count)
        })
    }

    // -- Match records --

    /// Append-only: the PRIMARY KEY on lost_report_id makes a second write
    /// for the same lost report a no-op. Returns whether the row landed.
    pub fn insert_match_record_if_absent(
        &self,
        lost_report_id: &str,
        matches_json: &str,
        created_at: &str,
    ) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let inserted = conn.execute(
                "INSERT OR IGNORE INTO match_records (lost_report_id, matches, created_at)
                 VALUES (?1, ?2, ?3)",
                rusqlite::params![lost_report_id, matches_json, created_at],
            )?;
            Ok(inserted == 1)
        })
    }

    /// The matcher's skip set: every lost report that already has a record.
    pub fn matched_lost_ids(&self) -> Result<HashSet<String>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT lost_report_id FROM match_records")?;
            let ids = stmt
                .query_map([], |row| row.get::<_, String>(0))?
                .collect::<std::result::Result<HashSet<_>, _>>()?;
            Ok(ids)
        })
    }

    pub fn get_match_record(&self, lost_report_id: &str) -> Result<Option<MatchRecordRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT lost_report_id, matches, created_at FROM match_records
                 WHERE lost_report_id = ?1",
            )?;
            let row = stmt
                .query_row([lost_report_id], |row| {
                    Ok(MatchRecordRow {
                        lost_report_id: row.get(0)?,
                        matches: row.get(1)?,
                        created_at: row.get(2)?,
                    })
                })
                .optional()?;
            Ok(row)
        })
    }

    // -- Notifications --

    pub fn insert_notification(&self, row: &NotificationRow) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO notifications (id, user_id, title, message, kind, post_link, read, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                rusqlite::params![
                    row.id,
                    row.user_id,
                    row.title,
                    row.message,
                    row.kind,
                    row.post_link,
                    row.read,
                    row.created_at,
                ],
            )?;
            Ok(())
        })
    }

    /// Unread notifications for one user, newest first. This is both the
    /// inbox query and the replay source on websocket (re)connect.
    pub fn unread_notifications(&self, user_id: &str, limit: u32) -> Result<Vec<NotificationRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, user_id, title, message, kind, post_link, read, created_at
                 FROM notifications
                 WHERE user_id = ?1 AND read = 0
                 ORDER BY created_at DESC, rowid DESC
                 LIMIT ?2",
            )?;
            let rows = stmt
                .query_map(rusqlite::params![user_id, limit], notification_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn mark_notification_read(&self, id: &str) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let updated = conn.execute("UPDATE notifications SET read = 1 WHERE id = ?1", [id])?;
            Ok(updated == 1)
        })
    }
}

const POST_SELECT: &str = "SELECT id, kind, title, description, images, place, area, tags,
        submitter_uid, submitter_email, submitter_name, submitter_avatar, is_solved, created_at
 FROM posts";

fn post_from_row(row: &rusqlite::Row<'_>) -> std::result::Result<PostRow, rusqlite::Error> {
    Ok(PostRow {
        id: row.get(0)?,
        kind: row.get(1)?,
        title: row.get(2)?,
        description: row.get(3)?,
        images: row.get(4)?,
        place: row.get(5)?,
        area: row.get(6)?,
        tags: row.get(7)?,
        submitter_uid: row.get(8)?,
        submitter_email: row.get(9)?,
        submitter_name: row.get(10)?,
        submitter_avatar: row.get(11)?,
        is_solved: row.get(12)?,
        created_at: row.get(13)?,
    })
}

fn notification_from_row(
    row: &rusqlite::Row<'_>,
) -> std::result::Result<NotificationRow, rusqlite::Error> {
    Ok(NotificationRow {
        id: row.get(0)?,
        user_id: row.get(1)?,
        title: row.get(2)?,
        message: row.get(3)?,
        kind: row.get(4)?,
        post_link: row.get(5)?,
        read: row.get(6)?,
        created_at: row.get(7)?,
    })
}

fn report_from_row(row: &rusqlite::Row<'_>) -> std::result::Result<ReportRow, rusqlite::Error> {
    Ok(ReportRow {
        id: row.get(0)?,
        title: row.get(1)?,
        description: row.get(2)?,
        tags: row.get(3)?,
        place: row.get(4)?,
        area: row.get(5)?,
        submitter_uid: row.get(6)?,
        submitter_email: row.get(7)?,
        submitter_name: row.get(8)?,
        is_solved: row.get(9)?,
    })
}

fn query_reports(conn: &Connection, table: &str) -> Result<Vec<ReportRow>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT id, title, description, tags, place, area,
                submitter_uid, submitter_email, submitter_name, is_solved
         FROM {} ORDER BY rowid",
        table
    ))?;
    let rows = stmt
        .query_map([], report_from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Which of `ids` already exist in `table`. IN-list built from numbered
/// placeholders, same as the batched reaction lookup this is adapted from.
fn ids_present(conn: &Connection, table: &str, ids: &[String]) -> Result<HashSet<String>> {
    if ids.is_empty() {
        return Ok(HashSet::new());
    }

    let placeholders: Vec<String> = (1..=ids.len()).map(|i| format!("?{}", i)).collect();
    let sql = format!(
        "SELECT id FROM {} WHERE id IN ({})",
        table,
        placeholders.join(", ")
    );

    let mut stmt = conn.prepare(&sql)?;
    let params: Vec<&dyn rusqlite::types::ToSql> =
        ids.iter().map(|id| id as &dyn rusqlite::types::ToSql).collect();

    let present = stmt
        .query_map(params.as_slice(), |row| row.get::<_, String>(0))?
        .collect::<std::result::Result<HashSet<_>, _>>()?;

    Ok(present)
}

fn insert_reports(conn: &Connection, table: &str, rows: &[ReportRow]) -> Result<usize> {
    let mut stmt = conn.prepare(&format!(
        "INSERT OR IGNORE INTO {} (id, title, description, tags, place, area,
                                   submitter_uid, submitter_email, submitter_name, is_solved)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        table
    ))?;

    let mut inserted = 0;
    for row in rows {
        inserted += stmt.execute(rusqlite::params![
            row.id,
            row.title,
            row.description,
            row.tags,
            row.place,
            row.area,
            row.submitter_uid,
            row.submitter_email,
            row.submitter_name,
            row.is_solved,
        ])?;
    }

    Ok(inserted)
}

/// Extension trait for optional query results
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
