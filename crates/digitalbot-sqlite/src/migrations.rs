use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS members (
            chat_id         INTEGER NOT NULL,
            user_id         INTEGER NOT NULL,
            username        TEXT,
            full_name       TEXT NOT NULL DEFAULT '',
            total_messages  INTEGER NOT NULL DEFAULT 0,
            day_messages    INTEGER NOT NULL DEFAULT 0,
            day_key         TEXT NOT NULL DEFAULT '',
            week_messages   INTEGER NOT NULL DEFAULT 0,
            week_key        TEXT NOT NULL DEFAULT '',
            month_messages  INTEGER NOT NULL DEFAULT 0,
            month_key       TEXT NOT NULL DEFAULT '',
            warnings        INTEGER NOT NULL DEFAULT 0,
            is_special      INTEGER NOT NULL DEFAULT 0,
            last_activity   TEXT,
            PRIMARY KEY (chat_id, user_id)
        );

        CREATE INDEX IF NOT EXISTS idx_members_activity
            ON members(chat_id, total_messages DESC);

        CREATE TABLE IF NOT EXISTS daily_activity (
            chat_id         INTEGER NOT NULL,
            user_id         INTEGER NOT NULL,
            activity_date   TEXT NOT NULL,
            message_count   INTEGER NOT NULL DEFAULT 0,
            PRIMARY KEY (chat_id, user_id, activity_date)
        );

        CREATE TABLE IF NOT EXISTS chat_settings (
            chat_id             INTEGER PRIMARY KEY,
            welcome_text        TEXT,
            welcome_media_kind  TEXT,
            welcome_media_id    TEXT,
            warning_limit       INTEGER NOT NULL
        );

        -- Single row, replaced on reassignment
        CREATE TABLE IF NOT EXISTS bot_owner (
            id          INTEGER PRIMARY KEY CHECK (id = 1),
            user_id     INTEGER NOT NULL,
            updated_at  TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS notes (
            chat_id     INTEGER NOT NULL,
            name        TEXT NOT NULL,
            body        TEXT NOT NULL,
            author_id   INTEGER NOT NULL,
            created_at  TEXT NOT NULL,
            PRIMARY KEY (chat_id, name)
        );
        ",
    )?;

    info!("Database migrations complete");
    Ok(())
}
