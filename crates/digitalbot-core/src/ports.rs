//! Hexagonal ports for the external systems the bot drives.
//!
//! Telegram, the translation service and yt-dlp are implemented in adapter
//! crates; the core only sees these traits.

use std::path::PathBuf;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{
    authz::MemberStatus,
    domain::{ChatId, MessageRef, UserId},
    Result,
};

/// Chat-administration calls against the messenger.
#[async_trait]
pub trait ChatModerator: Send + Sync {
    async fn member_status(&self, chat_id: ChatId, user_id: UserId) -> Result<MemberStatus>;

    async fn ban(&self, chat_id: ChatId, user_id: UserId) -> Result<()>;
    async fn unban(&self, chat_id: ChatId, user_id: UserId) -> Result<()>;

    /// Remove send permissions until `until`.
    async fn mute(&self, chat_id: ChatId, user_id: UserId, until: DateTime<Utc>) -> Result<()>;
    async fn unmute(&self, chat_id: ChatId, user_id: UserId) -> Result<()>;

    async fn pin(&self, msg: MessageRef) -> Result<()>;
    async fn promote(&self, chat_id: ChatId, user_id: UserId) -> Result<()>;
    async fn delete_message(&self, msg: MessageRef) -> Result<()>;
}

/// A finished translation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Translation {
    pub original: String,
    /// Detected source language code (e.g. `en`).
    pub source_lang: String,
    pub text: String,
}

#[async_trait]
pub trait Translator: Send + Sync {
    /// Translate `text` into `target` (language code), auto-detecting the source.
    async fn translate(&self, text: &str, target: &str) -> Result<Translation>;
}

/// A media file fetched by the extractor into a scratch directory.
#[derive(Clone, Debug)]
pub struct DownloadedMedia {
    pub path: PathBuf,
    pub title: Option<String>,
    pub size_bytes: u64,
    /// Scratch directory owned by this download; removed by `cleanup`.
    pub workdir: PathBuf,
}

#[async_trait]
pub trait MediaExtractor: Send + Sync {
    async fn download(&self, url: &str) -> Result<DownloadedMedia>;

    /// Remove everything the download left on disk.
    async fn cleanup(&self, media: &DownloadedMedia) -> Result<()>;
}
