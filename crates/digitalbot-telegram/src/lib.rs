//! Telegram adapter (teloxide).
//!
//! This crate implements the `digitalbot-core` `ChatModerator` port over the
//! Telegram Bot API and hosts the update dispatcher.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use teloxide::{
    prelude::*,
    types::{ChatMemberKind, ChatPermissions},
};
use tokio::time::sleep;

pub mod handlers;
pub mod health;
pub mod router;
pub mod texts;

use digitalbot_core::{
    authz::MemberStatus,
    domain::{ChatId, MessageId, MessageRef, UserId},
    errors::Error,
    ports::ChatModerator,
    Result,
};

#[derive(Clone)]
pub struct TelegramModerator {
    bot: Bot,
}

impl TelegramModerator {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }

    fn tg_chat(chat_id: ChatId) -> teloxide::types::ChatId {
        teloxide::types::ChatId(chat_id.0)
    }

    fn tg_user(user_id: UserId) -> teloxide::types::UserId {
        teloxide::types::UserId(user_id.0 as u64)
    }

    fn tg_msg_id(message_id: MessageId) -> teloxide::types::MessageId {
        teloxide::types::MessageId(message_id.0)
    }

    fn map_err(e: teloxide::RequestError) -> Error {
        Error::External(format!("telegram error: {e}"))
    }

    async fn with_retry<T, Fut>(&self, mut op: impl FnMut() -> Fut) -> Result<T>
    where
        Fut: std::future::IntoFuture<Output = std::result::Result<T, teloxide::RequestError>>,
        Fut::IntoFuture: Send,
    {
        const MAX_RETRIES: usize = 1;
        let mut attempts = 0usize;
        loop {
            match op().await {
                Ok(v) => return Ok(v),
                Err(e) => match e {
                    teloxide::RequestError::RetryAfter(d) if attempts < MAX_RETRIES => {
                        attempts += 1;
                        sleep(d).await;
                        continue;
                    }
                    other => return Err(Self::map_err(other)),
                },
            }
        }
    }
}

pub(crate) fn member_status(kind: &ChatMemberKind) -> MemberStatus {
    match kind {
        ChatMemberKind::Owner(_) => MemberStatus::Creator,
        ChatMemberKind::Administrator(_) => MemberStatus::Administrator,
        ChatMemberKind::Member => MemberStatus::Member,
        ChatMemberKind::Restricted(_) => MemberStatus::Restricted,
        ChatMemberKind::Left => MemberStatus::Left,
        ChatMemberKind::Banned(_) => MemberStatus::Banned,
    }
}

#[async_trait]
impl ChatModerator for TelegramModerator {
    async fn member_status(&self, chat_id: ChatId, user_id: UserId) -> Result<MemberStatus> {
        let member = self
            .with_retry(|| {
                self.bot
                    .get_chat_member(Self::tg_chat(chat_id), Self::tg_user(user_id))
            })
            .await?;
        Ok(member_status(&member.kind))
    }

    async fn ban(&self, chat_id: ChatId, user_id: UserId) -> Result<()> {
        self.with_retry(|| {
            self.bot
                .ban_chat_member(Self::tg_chat(chat_id), Self::tg_user(user_id))
        })
        .await?;
        Ok(())
    }

    async fn unban(&self, chat_id: ChatId, user_id: UserId) -> Result<()> {
        self.with_retry(|| {
            self.bot
                .unban_chat_member(Self::tg_chat(chat_id), Self::tg_user(user_id))
                .only_if_banned(true)
        })
        .await?;
        Ok(())
    }

    async fn mute(&self, chat_id: ChatId, user_id: UserId, until: DateTime<Utc>) -> Result<()> {
        self.with_retry(|| {
            self.bot
                .restrict_chat_member(
                    Self::tg_chat(chat_id),
                    Self::tg_user(user_id),
                    ChatPermissions::empty(),
                )
                .until_date(until)
        })
        .await?;
        Ok(())
    }

    async fn unmute(&self, chat_id: ChatId, user_id: UserId) -> Result<()> {
        // Restore the chat's default permissions rather than granting everything.
        let chat = self
            .with_retry(|| self.bot.get_chat(Self::tg_chat(chat_id)))
            .await?;
        let permissions = chat.permissions().unwrap_or_else(ChatPermissions::all);
        self.with_retry(|| {
            self.bot.restrict_chat_member(
                Self::tg_chat(chat_id),
                Self::tg_user(user_id),
                permissions,
            )
        })
        .await?;
        Ok(())
    }

    async fn pin(&self, msg: MessageRef) -> Result<()> {
        self.with_retry(|| {
            self.bot
                .pin_chat_message(Self::tg_chat(msg.chat_id), Self::tg_msg_id(msg.message_id))
        })
        .await?;
        Ok(())
    }

    async fn promote(&self, chat_id: ChatId, user_id: UserId) -> Result<()> {
        self.with_retry(|| {
            self.bot
                .promote_chat_member(Self::tg_chat(chat_id), Self::tg_user(user_id))
                .can_delete_messages(true)
                .can_restrict_members(true)
                .can_pin_messages(true)
                .can_invite_users(true)
        })
        .await?;
        Ok(())
    }

    async fn delete_message(&self, msg: MessageRef) -> Result<()> {
        self.with_retry(|| {
            self.bot
                .delete_message(Self::tg_chat(msg.chat_id), Self::tg_msg_id(msg.message_id))
        })
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_member_kinds() {
        assert_eq!(member_status(&ChatMemberKind::Member), MemberStatus::Member);
        assert_eq!(member_status(&ChatMemberKind::Left), MemberStatus::Left);
    }

    #[test]
    fn converts_ids() {
        assert_eq!(TelegramModerator::tg_chat(ChatId(-100123)).0, -100123);
        assert_eq!(TelegramModerator::tg_user(UserId(42)).0, 42);
        assert_eq!(TelegramModerator::tg_msg_id(MessageId(7)).0, 7);
    }
}
