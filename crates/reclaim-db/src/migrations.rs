use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS posts (
            id               TEXT PRIMARY KEY,
            kind             TEXT NOT NULL,
            title            TEXT NOT NULL,
            description      TEXT NOT NULL DEFAULT '',
            images           TEXT NOT NULL DEFAULT '[]',
            place            TEXT NOT NULL,
            area             TEXT NOT NULL,
            tags             TEXT NOT NULL DEFAULT '[]',
            submitter_uid    TEXT NOT NULL,
            submitter_email  TEXT NOT NULL,
            submitter_name   TEXT NOT NULL,
            submitter_avatar TEXT,
            is_solved        INTEGER NOT NULL DEFAULT 0,
            created_at       TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_posts_created
            ON posts(created_at);

        -- Matching snapshots: posts minus revision-of-record fields.
        -- Identity is the post id; INSERT OR IGNORE keeps ingestion
        -- idempotent even if the pre-check races another writer.
        CREATE TABLE IF NOT EXISTS lost_reports (
            id               TEXT PRIMARY KEY,
            title            TEXT NOT NULL,
            description      TEXT NOT NULL DEFAULT '',
            tags             TEXT NOT NULL DEFAULT '[]',
            place            TEXT NOT NULL,
            area             TEXT NOT NULL,
            submitter_uid    TEXT NOT NULL,
            submitter_email  TEXT NOT NULL,
            submitter_name   TEXT NOT NULL,
            is_solved        INTEGER NOT NULL DEFAULT 0
        );

        CREATE TABLE IF NOT EXISTS found_reports (
            id               TEXT PRIMARY KEY,
            title            TEXT NOT NULL,
            description      TEXT NOT NULL DEFAULT '',
            tags             TEXT NOT NULL DEFAULT '[]',
            place            TEXT NOT NULL,
            area             TEXT NOT NULL,
            submitter_uid    TEXT NOT NULL,
            submitter_email  TEXT NOT NULL,
            submitter_name   TEXT NOT NULL,
            is_solved        INTEGER NOT NULL DEFAULT 0
        );

        -- The PRIMARY KEY is the at-most-one-match-per-lost-report
        -- invariant; the matcher's skip-set check is only an optimization.
        CREATE TABLE IF NOT EXISTS match_records (
            lost_report_id   TEXT PRIMARY KEY,
            matches          TEXT NOT NULL,
            created_at       TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS notifications (
            id               TEXT PRIMARY KEY,
            user_id          TEXT NOT NULL,
            title            TEXT NOT NULL,
            message          TEXT NOT NULL,
            kind             TEXT NOT NULL DEFAULT 'notification',
            post_link        TEXT,
            read             INTEGER NOT NULL DEFAULT 0,
            created_at       TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_notifications_unread
            ON notifications(user_id, read, created_at);
        ",
    )?;

    info!("Database migrations complete");
    Ok(())
}
