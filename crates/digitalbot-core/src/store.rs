//! Persistence port for members, chat settings, the bot owner and notes.
//!
//! `MemoryStore` backs tests; the SQLite adapter lives in `digitalbot-sqlite`.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::NaiveDate;
use tokio::sync::Mutex;

use crate::{
    domain::{ChatId, UserId, UserProfile},
    stats::{BucketKeys, MessageCounters},
    Result,
};

/// Per-chat record of one user.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MemberRecord {
    pub chat_id: i64,
    pub user_id: i64,
    pub profile: UserProfile,
    pub counters: MessageCounters,
    pub warnings: u32,
    pub is_special: bool,
    /// `YYYY-MM-DD` of the last recorded message.
    pub last_activity: Option<String>,
}

impl MemberRecord {
    pub fn empty(chat_id: ChatId, user_id: UserId) -> Self {
        Self {
            chat_id: chat_id.0,
            user_id: user_id.0,
            ..Self::default()
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MediaKind {
    Photo,
    Video,
    Animation,
}

impl MediaKind {
    pub fn as_str(self) -> &'static str {
        match self {
            MediaKind::Photo => "photo",
            MediaKind::Video => "video",
            MediaKind::Animation => "animation",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "photo" => Some(MediaKind::Photo),
            "video" => Some(MediaKind::Video),
            "animation" => Some(MediaKind::Animation),
            _ => None,
        }
    }
}

/// Welcome media, referenced by Telegram file id.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WelcomeMedia {
    pub kind: MediaKind,
    pub file_id: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChatSettings {
    pub chat_id: i64,
    pub welcome_text: Option<String>,
    pub welcome_media: Option<WelcomeMedia>,
    pub warning_limit: u32,
}

impl ChatSettings {
    pub fn new(chat_id: ChatId, warning_limit: u32) -> Self {
        Self {
            chat_id: chat_id.0,
            welcome_text: None,
            welcome_media: None,
            warning_limit,
        }
    }
}

/// Aggregate message numbers of one chat.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ChatSummary {
    pub members: u64,
    pub total_messages: u64,
    pub today_messages: u64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Note {
    pub name: String,
    pub body: String,
    pub author_id: i64,
    pub created_at: String,
}

#[async_trait]
pub trait Store: Send + Sync {
    /// Refresh the member's names and count one message sent on `date`.
    async fn record_message(
        &self,
        chat_id: ChatId,
        user_id: UserId,
        profile: &UserProfile,
        date: NaiveDate,
    ) -> Result<MemberRecord>;

    async fn member(&self, chat_id: ChatId, user_id: UserId) -> Result<Option<MemberRecord>>;

    /// Members ordered by total messages, most active first.
    async fn top_members(&self, chat_id: ChatId, limit: usize) -> Result<Vec<MemberRecord>>;

    async fn chat_summary(&self, chat_id: ChatId, date: NaiveDate) -> Result<ChatSummary>;

    /// Number of distinct days the member has been active in the chat.
    async fn active_days(&self, chat_id: ChatId, user_id: UserId) -> Result<u32>;

    /// Add one warning and return the new count.
    async fn increment_warnings(&self, chat_id: ChatId, user_id: UserId) -> Result<u32>;

    async fn set_warnings(&self, chat_id: ChatId, user_id: UserId, warnings: u32) -> Result<()>;

    async fn set_special(&self, chat_id: ChatId, user_id: UserId, special: bool) -> Result<()>;

    async fn is_special(&self, chat_id: ChatId, user_id: UserId) -> Result<bool>;

    /// Settings of the chat, created with defaults on first access.
    async fn chat_settings(&self, chat_id: ChatId) -> Result<ChatSettings>;

    async fn set_welcome_text(&self, chat_id: ChatId, text: Option<String>) -> Result<()>;

    async fn set_welcome_media(&self, chat_id: ChatId, media: Option<WelcomeMedia>)
        -> Result<()>;

    async fn set_warning_limit(&self, chat_id: ChatId, limit: u32) -> Result<()>;

    async fn bot_owner(&self) -> Result<Option<UserId>>;

    async fn set_bot_owner(&self, user_id: UserId) -> Result<()>;

    async fn save_note(&self, chat_id: ChatId, note: Note) -> Result<()>;

    async fn note(&self, chat_id: ChatId, name: &str) -> Result<Option<Note>>;

    /// Note names of the chat, alphabetically.
    async fn note_names(&self, chat_id: ChatId) -> Result<Vec<String>>;

    /// Returns whether a note was removed.
    async fn delete_note(&self, chat_id: ChatId, name: &str) -> Result<bool>;
}

#[derive(Default)]
struct MemoryState {
    members: HashMap<(i64, i64), MemberRecord>,
    daily: HashMap<(i64, i64), BTreeMap<String, u64>>,
    settings: HashMap<i64, ChatSettings>,
    owner: Option<UserId>,
    notes: HashMap<i64, BTreeMap<String, Note>>,
}

/// In-process store; state is lost on restart.
pub struct MemoryStore {
    default_warning_limit: u32,
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new(default_warning_limit: u32) -> Self {
        Self {
            default_warning_limit,
            state: Mutex::new(MemoryState::default()),
        }
    }
}

impl MemoryState {
    fn member_mut(&mut self, chat_id: ChatId, user_id: UserId) -> &mut MemberRecord {
        self.members
            .entry((chat_id.0, user_id.0))
            .or_insert_with(|| MemberRecord::empty(chat_id, user_id))
    }

    fn settings_mut(&mut self, chat_id: ChatId, default_limit: u32) -> &mut ChatSettings {
        self.settings
            .entry(chat_id.0)
            .or_insert_with(|| ChatSettings::new(chat_id, default_limit))
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn record_message(
        &self,
        chat_id: ChatId,
        user_id: UserId,
        profile: &UserProfile,
        date: NaiveDate,
    ) -> Result<MemberRecord> {
        let mut st = self.state.lock().await;
        let day = BucketKeys::for_date(date).day;
        *st.daily
            .entry((chat_id.0, user_id.0))
            .or_default()
            .entry(day.clone())
            .or_insert(0) += 1;

        let member = st.member_mut(chat_id, user_id);
        member.profile = profile.clone();
        member.counters.record(date);
        member.last_activity = Some(day);
        Ok(member.clone())
    }

    async fn member(&self, chat_id: ChatId, user_id: UserId) -> Result<Option<MemberRecord>> {
        let st = self.state.lock().await;
        Ok(st.members.get(&(chat_id.0, user_id.0)).cloned())
    }

    async fn top_members(&self, chat_id: ChatId, limit: usize) -> Result<Vec<MemberRecord>> {
        let st = self.state.lock().await;
        let mut out: Vec<MemberRecord> = st
            .members
            .values()
            .filter(|m| m.chat_id == chat_id.0 && m.counters.total > 0)
            .cloned()
            .collect();
        out.sort_by(|a, b| {
            b.counters
                .total
                .cmp(&a.counters.total)
                .then(a.user_id.cmp(&b.user_id))
        });
        out.truncate(limit);
        Ok(out)
    }

    async fn chat_summary(&self, chat_id: ChatId, date: NaiveDate) -> Result<ChatSummary> {
        let st = self.state.lock().await;
        let mut summary = ChatSummary::default();
        for m in st.members.values().filter(|m| m.chat_id == chat_id.0) {
            if m.counters.total == 0 {
                continue;
            }
            let seen = m.counters.as_of(date);
            summary.members += 1;
            summary.total_messages += seen.total;
            summary.today_messages += seen.day;
        }
        Ok(summary)
    }

    async fn active_days(&self, chat_id: ChatId, user_id: UserId) -> Result<u32> {
        let st = self.state.lock().await;
        Ok(st
            .daily
            .get(&(chat_id.0, user_id.0))
            .map(|days| days.len() as u32)
            .unwrap_or(0))
    }

    async fn increment_warnings(&self, chat_id: ChatId, user_id: UserId) -> Result<u32> {
        let mut st = self.state.lock().await;
        let member = st.member_mut(chat_id, user_id);
        member.warnings += 1;
        Ok(member.warnings)
    }

    async fn set_warnings(&self, chat_id: ChatId, user_id: UserId, warnings: u32) -> Result<()> {
        let mut st = self.state.lock().await;
        st.member_mut(chat_id, user_id).warnings = warnings;
        Ok(())
    }

    async fn set_special(&self, chat_id: ChatId, user_id: UserId, special: bool) -> Result<()> {
        let mut st = self.state.lock().await;
        st.member_mut(chat_id, user_id).is_special = special;
        Ok(())
    }

    async fn is_special(&self, chat_id: ChatId, user_id: UserId) -> Result<bool> {
        let st = self.state.lock().await;
        Ok(st
            .members
            .get(&(chat_id.0, user_id.0))
            .map(|m| m.is_special)
            .unwrap_or(false))
    }

    async fn chat_settings(&self, chat_id: ChatId) -> Result<ChatSettings> {
        let mut st = self.state.lock().await;
        Ok(st.settings_mut(chat_id, self.default_warning_limit).clone())
    }

    async fn set_welcome_text(&self, chat_id: ChatId, text: Option<String>) -> Result<()> {
        let mut st = self.state.lock().await;
        st.settings_mut(chat_id, self.default_warning_limit)
            .welcome_text = text;
        Ok(())
    }

    async fn set_welcome_media(
        &self,
        chat_id: ChatId,
        media: Option<WelcomeMedia>,
    ) -> Result<()> {
        let mut st = self.state.lock().await;
        st.settings_mut(chat_id, self.default_warning_limit)
            .welcome_media = media;
        Ok(())
    }

    async fn set_warning_limit(&self, chat_id: ChatId, limit: u32) -> Result<()> {
        let mut st = self.state.lock().await;
        st.settings_mut(chat_id, self.default_warning_limit)
            .warning_limit = limit;
        Ok(())
    }

    async fn bot_owner(&self) -> Result<Option<UserId>> {
        Ok(self.state.lock().await.owner)
    }

    async fn set_bot_owner(&self, user_id: UserId) -> Result<()> {
        self.state.lock().await.owner = Some(user_id);
        Ok(())
    }

    async fn save_note(&self, chat_id: ChatId, note: Note) -> Result<()> {
        let mut st = self.state.lock().await;
        st.notes
            .entry(chat_id.0)
            .or_default()
            .insert(note.name.clone(), note);
        Ok(())
    }

    async fn note(&self, chat_id: ChatId, name: &str) -> Result<Option<Note>> {
        let st = self.state.lock().await;
        Ok(st
            .notes
            .get(&chat_id.0)
            .and_then(|notes| notes.get(name))
            .cloned())
    }

    async fn note_names(&self, chat_id: ChatId) -> Result<Vec<String>> {
        let st = self.state.lock().await;
        Ok(st
            .notes
            .get(&chat_id.0)
            .map(|notes| notes.keys().cloned().collect())
            .unwrap_or_default())
    }

    async fn delete_note(&self, chat_id: ChatId, name: &str) -> Result<bool> {
        let mut st = self.state.lock().await;
        Ok(st
            .notes
            .get_mut(&chat_id.0)
            .map(|notes| notes.remove(name).is_some())
            .unwrap_or(false))
    }
}
