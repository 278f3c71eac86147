//! SQLite-backed implementation of the core `Store` port.

pub mod migrations;

use std::{
    path::Path,
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use chrono::NaiveDate;
use digitalbot_core::{
    domain::{ChatId, UserId, UserProfile},
    stats::{BucketKeys, MessageCounters},
    store::{ChatSettings, ChatSummary, MediaKind, MemberRecord, Note, Store, WelcomeMedia},
    Error, Result,
};
use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::info;

const MEMBER_COLUMNS: &str = "chat_id, user_id, username, full_name, total_messages,
    day_messages, day_key, week_messages, week_key, month_messages, month_key,
    warnings, is_special, last_activity";

pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
    default_warning_limit: u32,
}

fn storage(e: rusqlite::Error) -> Error {
    Error::Storage(e.to_string())
}

impl SqliteStore {
    pub fn open(path: &Path, default_warning_limit: u32) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path).map_err(storage)?;

        // WAL mode for concurrent reads
        conn.pragma_update(None, "journal_mode", "WAL")
            .map_err(storage)?;

        let store = Self::with_connection(conn, default_warning_limit)?;
        info!("Database opened at {}", path.display());
        Ok(store)
    }

    pub fn open_in_memory(default_warning_limit: u32) -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(storage)?;
        Self::with_connection(conn, default_warning_limit)
    }

    fn with_connection(conn: Connection, default_warning_limit: u32) -> Result<Self> {
        migrations::run(&conn).map_err(storage)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            default_warning_limit,
        })
    }

    /// Run `f` against the connection on the blocking pool.
    async fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> rusqlite::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut conn = conn
                .lock()
                .map_err(|e| Error::Storage(format!("database lock poisoned: {e}")))?;
            f(&mut conn).map_err(storage)
        })
        .await
        .map_err(|e| Error::Storage(format!("database task failed: {e}")))?
    }
}

fn ensure_settings(conn: &Connection, chat_id: ChatId, default_limit: u32) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT OR IGNORE INTO chat_settings (chat_id, warning_limit) VALUES (?1, ?2)",
        params![chat_id.0, default_limit],
    )?;
    Ok(())
}

fn member_from_row(row: &Row<'_>) -> rusqlite::Result<MemberRecord> {
    let count = |idx: usize| -> rusqlite::Result<u64> { Ok(row.get::<_, i64>(idx)?.max(0) as u64) };
    Ok(MemberRecord {
        chat_id: row.get(0)?,
        user_id: row.get(1)?,
        profile: UserProfile {
            username: row.get(2)?,
            full_name: row.get(3)?,
        },
        counters: MessageCounters {
            total: count(4)?,
            day: count(5)?,
            day_key: row.get(6)?,
            week: count(7)?,
            week_key: row.get(8)?,
            month: count(9)?,
            month_key: row.get(10)?,
        },
        warnings: row.get(11)?,
        is_special: row.get(12)?,
        last_activity: row.get(13)?,
    })
}

fn query_member(conn: &Connection, chat_id: ChatId, user_id: UserId) -> rusqlite::Result<Option<MemberRecord>> {
    conn.query_row(
        &format!("SELECT {MEMBER_COLUMNS} FROM members WHERE chat_id = ?1 AND user_id = ?2"),
        params![chat_id.0, user_id.0],
        member_from_row,
    )
    .optional()
}

fn upsert_member(conn: &Connection, m: &MemberRecord) -> rusqlite::Result<()> {
    conn.execute(
        &format!(
            "INSERT INTO members ({MEMBER_COLUMNS})
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
             ON CONFLICT(chat_id, user_id) DO UPDATE SET
                username = excluded.username,
                full_name = excluded.full_name,
                total_messages = excluded.total_messages,
                day_messages = excluded.day_messages,
                day_key = excluded.day_key,
                week_messages = excluded.week_messages,
                week_key = excluded.week_key,
                month_messages = excluded.month_messages,
                month_key = excluded.month_key,
                warnings = excluded.warnings,
                is_special = excluded.is_special,
                last_activity = excluded.last_activity"
        ),
        params![
            m.chat_id,
            m.user_id,
            m.profile.username,
            m.profile.full_name,
            m.counters.total as i64,
            m.counters.day as i64,
            m.counters.day_key,
            m.counters.week as i64,
            m.counters.week_key,
            m.counters.month as i64,
            m.counters.month_key,
            m.warnings,
            m.is_special,
            m.last_activity,
        ],
    )?;
    Ok(())
}

/// Make sure a member row exists so column updates have something to hit.
fn touch_member(conn: &Connection, chat_id: ChatId, user_id: UserId) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT OR IGNORE INTO members (chat_id, user_id) VALUES (?1, ?2)",
        params![chat_id.0, user_id.0],
    )?;
    Ok(())
}

fn settings_from_row(row: &Row<'_>) -> rusqlite::Result<ChatSettings> {
    let kind: Option<String> = row.get(2)?;
    let file_id: Option<String> = row.get(3)?;
    let welcome_media = match (kind.as_deref().and_then(MediaKind::parse), file_id) {
        (Some(kind), Some(file_id)) => Some(WelcomeMedia { kind, file_id }),
        _ => None,
    };
    Ok(ChatSettings {
        chat_id: row.get(0)?,
        welcome_text: row.get(1)?,
        welcome_media,
        warning_limit: row.get(4)?,
    })
}

#[async_trait]
impl Store for SqliteStore {
    async fn record_message(
        &self,
        chat_id: ChatId,
        user_id: UserId,
        profile: &UserProfile,
        date: NaiveDate,
    ) -> Result<MemberRecord> {
        let profile = profile.clone();
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            let mut member = query_member(&tx, chat_id, user_id)?
                .unwrap_or_else(|| MemberRecord::empty(chat_id, user_id));
            let day = BucketKeys::for_date(date).day;

            member.profile = profile;
            member.counters.record(date);
            member.last_activity = Some(day.clone());
            upsert_member(&tx, &member)?;

            tx.execute(
                "INSERT INTO daily_activity (chat_id, user_id, activity_date, message_count)
                 VALUES (?1, ?2, ?3, 1)
                 ON CONFLICT(chat_id, user_id, activity_date)
                 DO UPDATE SET message_count = message_count + 1",
                params![chat_id.0, user_id.0, day],
            )?;
            tx.commit()?;
            Ok(member)
        })
        .await
    }

    async fn member(&self, chat_id: ChatId, user_id: UserId) -> Result<Option<MemberRecord>> {
        self.with_conn(move |conn| query_member(conn, chat_id, user_id)).await
    }

    async fn top_members(&self, chat_id: ChatId, limit: usize) -> Result<Vec<MemberRecord>> {
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {MEMBER_COLUMNS} FROM members
                 WHERE chat_id = ?1 AND total_messages > 0
                 ORDER BY total_messages DESC, user_id ASC
                 LIMIT ?2"
            ))?;
            let rows = stmt.query_map(params![chat_id.0, limit as i64], member_from_row)?;
            rows.collect()
        })
        .await
    }

    async fn chat_summary(&self, chat_id: ChatId, date: NaiveDate) -> Result<ChatSummary> {
        let today = BucketKeys::for_date(date).day;
        self.with_conn(move |conn| {
            conn.query_row(
                "SELECT COUNT(*),
                        COALESCE(SUM(total_messages), 0),
                        COALESCE(SUM(CASE WHEN day_key = ?2 THEN day_messages ELSE 0 END), 0)
                 FROM members WHERE chat_id = ?1 AND total_messages > 0",
                params![chat_id.0, today],
                |row| {
                    Ok(ChatSummary {
                        members: row.get::<_, i64>(0)? as u64,
                        total_messages: row.get::<_, i64>(1)? as u64,
                        today_messages: row.get::<_, i64>(2)? as u64,
                    })
                },
            )
        })
        .await
    }

    async fn active_days(&self, chat_id: ChatId, user_id: UserId) -> Result<u32> {
        self.with_conn(move |conn| {
            conn.query_row(
                "SELECT COUNT(*) FROM daily_activity WHERE chat_id = ?1 AND user_id = ?2",
                params![chat_id.0, user_id.0],
                |row| row.get(0),
            )
        })
        .await
    }

    async fn increment_warnings(&self, chat_id: ChatId, user_id: UserId) -> Result<u32> {
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            touch_member(&tx, chat_id, user_id)?;
            let count = tx.query_row(
                "UPDATE members SET warnings = warnings + 1
                 WHERE chat_id = ?1 AND user_id = ?2
                 RETURNING warnings",
                params![chat_id.0, user_id.0],
                |row| row.get(0),
            )?;
            tx.commit()?;
            Ok(count)
        })
        .await
    }

    async fn set_warnings(&self, chat_id: ChatId, user_id: UserId, warnings: u32) -> Result<()> {
        self.with_conn(move |conn| {
            touch_member(conn, chat_id, user_id)?;
            conn.execute(
                "UPDATE members SET warnings = ?3 WHERE chat_id = ?1 AND user_id = ?2",
                params![chat_id.0, user_id.0, warnings],
            )?;
            Ok(())
        })
        .await
    }

    async fn set_special(&self, chat_id: ChatId, user_id: UserId, special: bool) -> Result<()> {
        self.with_conn(move |conn| {
            touch_member(conn, chat_id, user_id)?;
            conn.execute(
                "UPDATE members SET is_special = ?3 WHERE chat_id = ?1 AND user_id = ?2",
                params![chat_id.0, user_id.0, special],
            )?;
            Ok(())
        })
        .await
    }

    async fn is_special(&self, chat_id: ChatId, user_id: UserId) -> Result<bool> {
        self.with_conn(move |conn| {
            let flag: Option<bool> = conn
                .query_row(
                    "SELECT is_special FROM members WHERE chat_id = ?1 AND user_id = ?2",
                    params![chat_id.0, user_id.0],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(flag.unwrap_or(false))
        })
        .await
    }

    async fn chat_settings(&self, chat_id: ChatId) -> Result<ChatSettings> {
        let limit = self.default_warning_limit;
        self.with_conn(move |conn| {
            ensure_settings(conn, chat_id, limit)?;
            conn.query_row(
                "SELECT chat_id, welcome_text, welcome_media_kind, welcome_media_id, warning_limit
                 FROM chat_settings WHERE chat_id = ?1",
                [chat_id.0],
                settings_from_row,
            )
        })
        .await
    }

    async fn set_welcome_text(&self, chat_id: ChatId, text: Option<String>) -> Result<()> {
        let limit = self.default_warning_limit;
        self.with_conn(move |conn| {
            ensure_settings(conn, chat_id, limit)?;
            conn.execute(
                "UPDATE chat_settings SET welcome_text = ?2 WHERE chat_id = ?1",
                params![chat_id.0, text],
            )?;
            Ok(())
        })
        .await
    }

    async fn set_welcome_media(
        &self,
        chat_id: ChatId,
        media: Option<WelcomeMedia>,
    ) -> Result<()> {
        let (kind, file_id) = match media {
            Some(m) => (Some(m.kind.as_str()), Some(m.file_id)),
            None => (None, None),
        };
        let limit = self.default_warning_limit;
        self.with_conn(move |conn| {
            ensure_settings(conn, chat_id, limit)?;
            conn.execute(
                "UPDATE chat_settings SET welcome_media_kind = ?2, welcome_media_id = ?3
                 WHERE chat_id = ?1",
                params![chat_id.0, kind, file_id],
            )?;
            Ok(())
        })
        .await
    }

    async fn set_warning_limit(&self, chat_id: ChatId, limit: u32) -> Result<()> {
        let limit = self.default_warning_limit;
        self.with_conn(move |conn| {
            ensure_settings(conn, chat_id, limit)?;
            conn.execute(
                "UPDATE chat_settings SET warning_limit = ?2 WHERE chat_id = ?1",
                params![chat_id.0, limit],
            )?;
            Ok(())
        })
        .await
    }

    async fn bot_owner(&self) -> Result<Option<UserId>> {
        self.with_conn(move |conn| {
            conn.query_row("SELECT user_id FROM bot_owner WHERE id = 1", [], |row| {
                row.get(0).map(UserId)
            })
            .optional()
        })
        .await
    }

    async fn set_bot_owner(&self, user_id: UserId) -> Result<()> {
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO bot_owner (id, user_id) VALUES (1, ?1)
                 ON CONFLICT(id) DO UPDATE SET
                    user_id = excluded.user_id,
                    updated_at = datetime('now')",
                [user_id.0],
            )?;
            Ok(())
        })
        .await
    }

    async fn save_note(&self, chat_id: ChatId, note: Note) -> Result<()> {
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO notes (chat_id, name, body, author_id, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(chat_id, name) DO UPDATE SET
                    body = excluded.body,
                    author_id = excluded.author_id,
                    created_at = excluded.created_at",
                params![chat_id.0, note.name, note.body, note.author_id, note.created_at],
            )?;
            Ok(())
        })
        .await
    }

    async fn note(&self, chat_id: ChatId, name: &str) -> Result<Option<Note>> {
        let name = name.to_string();
        self.with_conn(move |conn| {
            conn.query_row(
                "SELECT name, body, author_id, created_at FROM notes
                 WHERE chat_id = ?1 AND name = ?2",
                params![chat_id.0, name],
                |row| {
                    Ok(Note {
                        name: row.get(0)?,
                        body: row.get(1)?,
                        author_id: row.get(2)?,
                        created_at: row.get(3)?,
                    })
                },
            )
            .optional()
        })
        .await
    }

    async fn note_names(&self, chat_id: ChatId) -> Result<Vec<String>> {
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare("SELECT name FROM notes WHERE chat_id = ?1 ORDER BY name")?;
            let rows = stmt.query_map([chat_id.0], |row| row.get(0))?;
            rows.collect()
        })
        .await
    }

    async fn delete_note(&self, chat_id: ChatId, name: &str) -> Result<bool> {
        let name = name.to_string();
        self.with_conn(move |conn| {
            let n = conn.execute(
                "DELETE FROM notes WHERE chat_id = ?1 AND name = ?2",
                params![chat_id.0, name],
            )?;
            Ok(n > 0)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CHAT: ChatId = ChatId(-1001);

    fn day(m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, m, d).unwrap()
    }

    fn profile(name: &str) -> UserProfile {
        UserProfile::new(Some(name.to_lowercase()), name)
    }

    #[tokio::test]
    async fn record_message_buckets_by_calendar() {
        let store = SqliteStore::open_in_memory(5).unwrap();
        let p = profile("Sara");
        store.record_message(CHAT, UserId(7), &p, day(9, 29)).await.unwrap();
        store.record_message(CHAT, UserId(7), &p, day(9, 30)).await.unwrap();
        let m = store.record_message(CHAT, UserId(7), &p, day(10, 1)).await.unwrap();

        assert_eq!(m.counters.total, 3);
        assert_eq!(m.counters.day, 1);
        assert_eq!(m.counters.week, 3);
        assert_eq!(m.counters.month, 1);
        assert_eq!(m.counters.month_key, "2026-10");
        assert_eq!(m.profile.username.as_deref(), Some("sara"));

        let stored = store.member(CHAT, UserId(7)).await.unwrap().unwrap();
        assert_eq!(stored, m);
        assert_eq!(store.active_days(CHAT, UserId(7)).await.unwrap(), 3);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_writers_do_not_lose_updates() {
        let store = Arc::new(SqliteStore::open_in_memory(100).unwrap());
        let mut tasks = Vec::new();
        for _ in 0..20 {
            let store = Arc::clone(&store);
            tasks.push(tokio::spawn(async move {
                store
                    .record_message(CHAT, UserId(9), &UserProfile::default(), day(10, 18))
                    .await
                    .unwrap();
                store.increment_warnings(CHAT, UserId(9)).await.unwrap()
            }));
        }
        let mut counts = Vec::new();
        for task in tasks {
            counts.push(task.await.unwrap());
        }
        counts.sort_unstable();
        assert_eq!(counts, (1..=20).collect::<Vec<u32>>());

        let m = store.member(CHAT, UserId(9)).await.unwrap().unwrap();
        assert_eq!(m.counters.total, 20);
        assert_eq!(m.warnings, 20);
    }

    #[tokio::test]
    async fn profile_is_refreshed_on_each_message() {
        let store = SqliteStore::open_in_memory(5).unwrap();
        store.record_message(CHAT, UserId(1), &profile("Old"), day(1, 1)).await.unwrap();
        let m = store.record_message(CHAT, UserId(1), &profile("New"), day(1, 1)).await.unwrap();
        assert_eq!(m.profile.full_name, "New");
    }

    #[tokio::test]
    async fn warnings_increment_and_reset() {
        let store = SqliteStore::open_in_memory(5).unwrap();
        assert_eq!(store.increment_warnings(CHAT, UserId(2)).await.unwrap(), 1);
        assert_eq!(store.increment_warnings(CHAT, UserId(2)).await.unwrap(), 2);
        // Warnings are per chat.
        assert_eq!(store.increment_warnings(ChatId(-2), UserId(2)).await.unwrap(), 1);

        store.set_warnings(CHAT, UserId(2), 0).await.unwrap();
        let m = store.member(CHAT, UserId(2)).await.unwrap().unwrap();
        assert_eq!(m.warnings, 0);
        assert_eq!(m.counters.total, 0);
    }

    #[tokio::test]
    async fn stats_ignore_silent_members() {
        let store = SqliteStore::open_in_memory(5).unwrap();
        let p = UserProfile::default();
        for _ in 0..3 {
            store.record_message(CHAT, UserId(2), &p, day(10, 17)).await.unwrap();
        }
        store.record_message(CHAT, UserId(1), &p, day(10, 18)).await.unwrap();
        store.set_special(CHAT, UserId(9), true).await.unwrap();

        let top = store.top_members(CHAT, 10).await.unwrap();
        let ids: Vec<i64> = top.iter().map(|m| m.user_id).collect();
        assert_eq!(ids, vec![2, 1]);

        let summary = store.chat_summary(CHAT, day(10, 18)).await.unwrap();
        assert_eq!(
            summary,
            ChatSummary {
                members: 2,
                total_messages: 4,
                today_messages: 1,
            }
        );
    }

    #[tokio::test]
    async fn special_flag() {
        let store = SqliteStore::open_in_memory(5).unwrap();
        assert!(!store.is_special(CHAT, UserId(3)).await.unwrap());
        store.set_special(CHAT, UserId(3), true).await.unwrap();
        assert!(store.is_special(CHAT, UserId(3)).await.unwrap());
        assert!(!store.is_special(ChatId(-5), UserId(3)).await.unwrap());
        store.set_special(CHAT, UserId(3), false).await.unwrap();
        assert!(!store.is_special(CHAT, UserId(3)).await.unwrap());
    }

    #[tokio::test]
    async fn chat_settings_defaults_and_updates() {
        let store = SqliteStore::open_in_memory(4).unwrap();
        let s = store.chat_settings(CHAT).await.unwrap();
        assert_eq!(s, ChatSettings::new(CHAT, 4));

        store.set_warning_limit(CHAT, 2).await.unwrap();
        store
            .set_welcome_text(CHAT, Some("سلام {name}".to_string()))
            .await
            .unwrap();
        store
            .set_welcome_media(
                CHAT,
                Some(WelcomeMedia {
                    kind: MediaKind::Animation,
                    file_id: "CgAD".to_string(),
                }),
            )
            .await
            .unwrap();

        let s = store.chat_settings(CHAT).await.unwrap();
        assert_eq!(s.warning_limit, 2);
        assert_eq!(s.welcome_text.as_deref(), Some("سلام {name}"));
        assert_eq!(s.welcome_media.map(|m| m.kind), Some(MediaKind::Animation));

        store.set_welcome_media(CHAT, None).await.unwrap();
        assert_eq!(store.chat_settings(CHAT).await.unwrap().welcome_media, None);
    }

    #[tokio::test]
    async fn bot_owner_is_replaced() {
        let store = SqliteStore::open_in_memory(5).unwrap();
        assert_eq!(store.bot_owner().await.unwrap(), None);
        store.set_bot_owner(UserId(10)).await.unwrap();
        store.set_bot_owner(UserId(11)).await.unwrap();
        assert_eq!(store.bot_owner().await.unwrap(), Some(UserId(11)));
    }

    #[tokio::test]
    async fn notes_are_scoped_and_overwritten() {
        let store = SqliteStore::open_in_memory(5).unwrap();
        let note = |body: &str| Note {
            name: "rules".to_string(),
            body: body.to_string(),
            author_id: 1,
            created_at: "2026-10-18".to_string(),
        };
        store.save_note(CHAT, note("v1")).await.unwrap();
        store.save_note(CHAT, note("v2")).await.unwrap();
        assert_eq!(store.note(CHAT, "rules").await.unwrap().map(|n| n.body), Some("v2".to_string()));
        assert_eq!(store.note(ChatId(-9), "rules").await.unwrap(), None);
        assert_eq!(store.note_names(CHAT).await.unwrap(), vec!["rules".to_string()]);
        assert!(store.delete_note(CHAT, "rules").await.unwrap());
        assert!(store.note_names(CHAT).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn data_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("bot.db");
        {
            let store = SqliteStore::open(&path, 5).unwrap();
            store
                .record_message(CHAT, UserId(1), &profile("Ali"), day(10, 18))
                .await
                .unwrap();
            store.set_bot_owner(UserId(1)).await.unwrap();
        }
        let store = SqliteStore::open(&path, 5).unwrap();
        let m = store.member(CHAT, UserId(1)).await.unwrap().unwrap();
        assert_eq!(m.counters.total, 1);
        assert_eq!(store.bot_owner().await.unwrap(), Some(UserId(1)));
    }
}
