//! Moderation service: authorization cascade, warning escalation and link
//! admission on top of the `Store` and `ChatModerator` ports.

use std::sync::Arc;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use tracing::{info, warn};
use url::Url;

use crate::{
    authz::{authorize, resolve_role, Action, Role, RoleInputs},
    config::MAX_WARNING_LIMIT,
    domain::{ChatId, MessageRef, UserId},
    errors::Error,
    links::{self, LinkVerdict},
    ports::ChatModerator,
    store::{Store, WelcomeMedia},
    Result,
};

/// Result of one warning escalation step.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WarnOutcome {
    /// Counter incremented, still below the limit.
    Warned { count: u32, limit: u32 },
    /// Counter reached the limit: a ban was requested and the counter reset.
    /// `ban_error` holds the messenger error if the ban request failed.
    Banned {
        limit: u32,
        ban_error: Option<String>,
    },
}

/// Result of screening one message's links.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LinkOutcome {
    NoLinks,
    /// Message kept; allow-listed URLs may go to the download pathway.
    Admitted { downloadable: Vec<Url> },
    /// Message deleted and the sender warned.
    Rejected { warning: WarnOutcome },
}

pub struct Moderation {
    store: Arc<dyn Store>,
    moderator: Arc<dyn ChatModerator>,
    bot_owner_seed: Option<UserId>,
    allowlist: Vec<String>,
}

impl Moderation {
    pub fn new(
        store: Arc<dyn Store>,
        moderator: Arc<dyn ChatModerator>,
        bot_owner_seed: Option<UserId>,
        allowlist: Vec<String>,
    ) -> Self {
        Self {
            store,
            moderator,
            bot_owner_seed,
            allowlist,
        }
    }

    /// Stored bot owner, falling back to the configured seed.
    pub async fn bot_owner(&self) -> Result<Option<UserId>> {
        Ok(self.store.bot_owner().await?.or(self.bot_owner_seed))
    }

    pub async fn role_of(&self, chat_id: ChatId, user_id: UserId) -> Result<Role> {
        let bot_owner = self.bot_owner().await?;
        if bot_owner == Some(user_id) {
            return Ok(Role::BotOwner);
        }
        let status = self.moderator.member_status(chat_id, user_id).await?;
        let is_special = self.store.is_special(chat_id, user_id).await?;
        Ok(resolve_role(RoleInputs {
            user_id,
            bot_owner,
            status,
            is_special,
        }))
    }

    async fn check(
        &self,
        action: Action,
        chat_id: ChatId,
        actor: UserId,
        target: Option<UserId>,
    ) -> Result<()> {
        let actor_role = self.role_of(chat_id, actor).await?;
        let target = match target {
            Some(t) => Some((t, self.role_of(chat_id, t).await?)),
            None => None,
        };
        let owner_is_set = self.bot_owner().await?.is_some();
        authorize(action, (actor, actor_role), target, owner_is_set).map_err(|denial| {
            info!(
                chat_id = chat_id.0,
                actor = actor.0,
                ?action,
                %denial,
                "moderation request denied"
            );
            Error::Denied(denial)
        })
    }

    /// Admin-triggered warning.
    pub async fn warn(&self, chat_id: ChatId, actor: UserId, target: UserId) -> Result<WarnOutcome> {
        self.check(Action::Warn, chat_id, actor, Some(target)).await?;
        self.apply_warning(chat_id, target).await
    }

    /// Warning escalation without an invoker check (bot-initiated triggers).
    pub async fn apply_warning(&self, chat_id: ChatId, target: UserId) -> Result<WarnOutcome> {
        let count = self.store.increment_warnings(chat_id, target).await?;
        let limit = self.store.chat_settings(chat_id).await?.warning_limit;

        if count < limit {
            info!(chat_id = chat_id.0, user_id = target.0, count, limit, "warning issued");
            return Ok(WarnOutcome::Warned { count, limit });
        }

        let ban_error = match self.moderator.ban(chat_id, target).await {
            Ok(()) => None,
            Err(e) => {
                warn!(chat_id = chat_id.0, user_id = target.0, error = %e, "auto-ban failed");
                Some(e.to_string())
            }
        };
        self.store.set_warnings(chat_id, target, 0).await?;
        info!(chat_id = chat_id.0, user_id = target.0, limit, "warning limit reached, banned");
        Ok(WarnOutcome::Banned { limit, ban_error })
    }

    pub async fn clear_warnings(&self, chat_id: ChatId, actor: UserId, target: UserId) -> Result<()> {
        self.check(Action::ClearWarnings, chat_id, actor, Some(target))
            .await?;
        self.store.set_warnings(chat_id, target, 0).await
    }

    pub async fn ban(&self, chat_id: ChatId, actor: UserId, target: UserId) -> Result<()> {
        self.check(Action::Ban, chat_id, actor, Some(target)).await?;
        self.moderator.ban(chat_id, target).await?;
        self.store.set_warnings(chat_id, target, 0).await
    }

    pub async fn unban(&self, chat_id: ChatId, actor: UserId, target: UserId) -> Result<()> {
        self.check(Action::Unban, chat_id, actor, Some(target)).await?;
        self.moderator.unban(chat_id, target).await
    }

    /// Mute `target` for `minutes`, returning the deadline.
    pub async fn mute(
        &self,
        chat_id: ChatId,
        actor: UserId,
        target: UserId,
        minutes: u32,
        now: DateTime<Utc>,
    ) -> Result<DateTime<Utc>> {
        self.check(Action::Mute, chat_id, actor, Some(target)).await?;
        let until = now + ChronoDuration::minutes(i64::from(minutes));
        self.moderator.mute(chat_id, target, until).await?;
        Ok(until)
    }

    pub async fn unmute(&self, chat_id: ChatId, actor: UserId, target: UserId) -> Result<()> {
        self.check(Action::Unmute, chat_id, actor, Some(target)).await?;
        self.moderator.unmute(chat_id, target).await
    }

    pub async fn pin(&self, actor: UserId, msg: MessageRef) -> Result<()> {
        self.check(Action::Pin, msg.chat_id, actor, None).await?;
        self.moderator.pin(msg).await
    }

    pub async fn promote(&self, chat_id: ChatId, actor: UserId, target: UserId) -> Result<()> {
        self.check(Action::Promote, chat_id, actor, Some(target))
            .await?;
        self.moderator.promote(chat_id, target).await
    }

    pub async fn set_special(
        &self,
        chat_id: ChatId,
        actor: UserId,
        target: UserId,
        special: bool,
    ) -> Result<()> {
        let action = if special {
            Action::SetSpecial
        } else {
            Action::ClearSpecial
        };
        self.check(action, chat_id, actor, Some(target)).await?;
        self.store.set_special(chat_id, target, special).await
    }

    pub async fn set_bot_owner(&self, chat_id: ChatId, actor: UserId, target: UserId) -> Result<()> {
        self.check(Action::SetBotOwner, chat_id, actor, Some(target))
            .await?;
        self.store.set_bot_owner(target).await?;
        info!(chat_id = chat_id.0, actor = actor.0, owner = target.0, "bot owner reassigned");
        Ok(())
    }

    pub async fn set_welcome_text(&self, chat_id: ChatId, actor: UserId, text: String) -> Result<()> {
        self.check(Action::ConfigureChat, chat_id, actor, None).await?;
        self.store.set_welcome_text(chat_id, Some(text)).await
    }

    /// Set welcome media; a caption, when given, replaces the welcome text.
    pub async fn set_welcome_media(
        &self,
        chat_id: ChatId,
        actor: UserId,
        media: WelcomeMedia,
        caption: Option<String>,
    ) -> Result<()> {
        self.check(Action::ConfigureChat, chat_id, actor, None).await?;
        self.store.set_welcome_media(chat_id, Some(media)).await?;
        if let Some(caption) = caption.filter(|c| !c.trim().is_empty()) {
            self.store.set_welcome_text(chat_id, Some(caption)).await?;
        }
        Ok(())
    }

    /// Set the chat's warning limit; it must lie in `1..=MAX_WARNING_LIMIT`.
    pub async fn set_warning_limit(&self, chat_id: ChatId, actor: UserId, limit: u32) -> Result<()> {
        self.check(Action::ConfigureChat, chat_id, actor, None).await?;
        if !(1..=MAX_WARNING_LIMIT).contains(&limit) {
            return Err(Error::InvalidInput(format!(
                "warning limit {limit} outside 1..={MAX_WARNING_LIMIT}"
            )));
        }
        self.store.set_warning_limit(chat_id, limit).await
    }

    /// Authorize note edits (save/delete) for `actor`.
    pub async fn check_note_editor(&self, chat_id: ChatId, actor: UserId) -> Result<()> {
        self.check(Action::EditNotes, chat_id, actor, None).await
    }

    /// Apply the link admission rule to a message sent by `sender`.
    pub async fn screen_links(&self, sender: UserId, msg: MessageRef, text: &str) -> Result<LinkOutcome> {
        if links::extract_urls(text).is_empty() {
            return Ok(LinkOutcome::NoLinks);
        }

        let role = self.role_of(msg.chat_id, sender).await?;
        match links::admit(text, role, &self.allowlist) {
            LinkVerdict::NoLinks => Ok(LinkOutcome::NoLinks),
            LinkVerdict::Admit { downloadable } => Ok(LinkOutcome::Admitted { downloadable }),
            LinkVerdict::Reject { offending } => {
                info!(
                    chat_id = msg.chat_id.0,
                    user_id = sender.0,
                    links = offending.len(),
                    "rejecting message with foreign links"
                );
                if let Err(e) = self.moderator.delete_message(msg).await {
                    warn!(chat_id = msg.chat_id.0, error = %e, "failed to delete rejected message");
                }
                let warning = self.apply_warning(msg.chat_id, sender).await?;
                Ok(LinkOutcome::Rejected { warning })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{collections::HashMap, sync::Mutex as StdMutex};

    use async_trait::async_trait;

    use super::*;
    use crate::{
        authz::{Denial, MemberStatus},
        domain::MessageId,
        store::{MediaKind, MemoryStore},
    };

    const CHAT: ChatId = ChatId(-1001);
    const CREATOR: UserId = UserId(1);
    const ADMIN: UserId = UserId(2);
    const MEMBER: UserId = UserId(3);
    const OTHER: UserId = UserId(4);

    #[derive(Clone, Debug, PartialEq, Eq)]
    enum Call {
        Ban(i64),
        Unban(i64),
        Mute(i64),
        Unmute(i64),
        Pin(i32),
        Promote(i64),
        Delete(i32),
    }

    #[derive(Default)]
    struct FakeModerator {
        statuses: HashMap<i64, MemberStatus>,
        calls: StdMutex<Vec<Call>>,
        fail_ban: bool,
    }

    impl FakeModerator {
        fn group() -> Self {
            let mut statuses = HashMap::new();
            statuses.insert(CREATOR.0, MemberStatus::Creator);
            statuses.insert(ADMIN.0, MemberStatus::Administrator);
            Self {
                statuses,
                ..Self::default()
            }
        }

        fn calls(&self) -> Vec<Call> {
            self.calls.lock().unwrap().clone()
        }

        fn push(&self, call: Call) {
            self.calls.lock().unwrap().push(call);
        }
    }

    #[async_trait]
    impl ChatModerator for FakeModerator {
        async fn member_status(&self, _chat_id: ChatId, user_id: UserId) -> Result<MemberStatus> {
            Ok(self
                .statuses
                .get(&user_id.0)
                .copied()
                .unwrap_or(MemberStatus::Member))
        }

        async fn ban(&self, _chat_id: ChatId, user_id: UserId) -> Result<()> {
            if self.fail_ban {
                return Err(Error::External("not enough rights".to_string()));
            }
            self.push(Call::Ban(user_id.0));
            Ok(())
        }

        async fn unban(&self, _chat_id: ChatId, user_id: UserId) -> Result<()> {
            self.push(Call::Unban(user_id.0));
            Ok(())
        }

        async fn mute(&self, _chat_id: ChatId, user_id: UserId, _until: DateTime<Utc>) -> Result<()> {
            self.push(Call::Mute(user_id.0));
            Ok(())
        }

        async fn unmute(&self, _chat_id: ChatId, user_id: UserId) -> Result<()> {
            self.push(Call::Unmute(user_id.0));
            Ok(())
        }

        async fn pin(&self, msg: MessageRef) -> Result<()> {
            self.push(Call::Pin(msg.message_id.0));
            Ok(())
        }

        async fn promote(&self, _chat_id: ChatId, user_id: UserId) -> Result<()> {
            self.push(Call::Promote(user_id.0));
            Ok(())
        }

        async fn delete_message(&self, msg: MessageRef) -> Result<()> {
            self.push(Call::Delete(msg.message_id.0));
            Ok(())
        }
    }

    struct Fixture {
        store: Arc<MemoryStore>,
        moderator: Arc<FakeModerator>,
        service: Moderation,
    }

    fn fixture_with(moderator: FakeModerator) -> Fixture {
        let store = Arc::new(MemoryStore::new(5));
        let moderator = Arc::new(moderator);
        let allowlist = links::DEFAULT_ALLOWED_HOSTS
            .iter()
            .map(|s| s.to_string())
            .collect();
        let service = Moderation::new(store.clone(), moderator.clone(), None, allowlist);
        Fixture {
            store,
            moderator,
            service,
        }
    }

    fn fixture() -> Fixture {
        fixture_with(FakeModerator::group())
    }

    fn msg(id: i32) -> MessageRef {
        MessageRef {
            chat_id: CHAT,
            message_id: MessageId(id),
        }
    }

    async fn warnings(f: &Fixture, user: UserId) -> u32 {
        f.store
            .member(CHAT, user)
            .await
            .unwrap()
            .map(|m| m.warnings)
            .unwrap_or(0)
    }

    #[tokio::test]
    async fn each_warning_increments_by_one() {
        let f = fixture();
        for expected in 1..=4 {
            let before = warnings(&f, MEMBER).await;
            let out = f.service.warn(CHAT, ADMIN, MEMBER).await.unwrap();
            assert_eq!(out, WarnOutcome::Warned { count: expected, limit: 5 });
            assert_eq!(warnings(&f, MEMBER).await, before + 1);
        }
        assert!(f.moderator.calls().is_empty());
    }

    #[tokio::test]
    async fn fifth_warning_bans_and_resets() {
        let f = fixture();
        for _ in 0..4 {
            f.service.warn(CHAT, ADMIN, MEMBER).await.unwrap();
        }
        let out = f.service.warn(CHAT, ADMIN, MEMBER).await.unwrap();
        assert_eq!(
            out,
            WarnOutcome::Banned {
                limit: 5,
                ban_error: None
            }
        );
        assert_eq!(f.moderator.calls(), vec![Call::Ban(MEMBER.0)]);
        assert_eq!(warnings(&f, MEMBER).await, 0);

        // Counting starts over after the reset.
        let out = f.service.warn(CHAT, ADMIN, MEMBER).await.unwrap();
        assert_eq!(out, WarnOutcome::Warned { count: 1, limit: 5 });
    }

    #[tokio::test]
    async fn failed_ban_still_resets_counter() {
        let f = fixture_with(FakeModerator {
            fail_ban: true,
            ..FakeModerator::group()
        });
        f.store.set_warning_limit(CHAT, 1).await.unwrap();
        let out = f.service.warn(CHAT, ADMIN, MEMBER).await.unwrap();
        assert!(matches!(out, WarnOutcome::Banned { ban_error: Some(_), .. }));
        assert_eq!(warnings(&f, MEMBER).await, 0);
    }

    #[tokio::test]
    async fn custom_limit_is_respected() {
        let f = fixture();
        f.service.set_warning_limit(CHAT, CREATOR, 2).await.unwrap();
        assert!(matches!(
            f.service.warn(CHAT, ADMIN, MEMBER).await.unwrap(),
            WarnOutcome::Warned { count: 1, limit: 2 }
        ));
        assert!(matches!(
            f.service.warn(CHAT, ADMIN, MEMBER).await.unwrap(),
            WarnOutcome::Banned { limit: 2, .. }
        ));
    }

    #[tokio::test]
    async fn out_of_range_limits_are_rejected() {
        let f = fixture();
        for limit in [0, MAX_WARNING_LIMIT + 1] {
            let err = f.service.set_warning_limit(CHAT, ADMIN, limit).await.unwrap_err();
            assert!(matches!(err, Error::InvalidInput(_)), "{limit}: {err:?}");
        }
        // Members are denied before the range is looked at.
        let err = f.service.set_warning_limit(CHAT, MEMBER, 0).await.unwrap_err();
        assert!(matches!(err, Error::Denied(_)));
        assert_eq!(f.store.chat_settings(CHAT).await.unwrap().warning_limit, 5);
    }

    #[tokio::test]
    async fn unauthorized_moderation_mutates_nothing() {
        let f = fixture();
        f.store.set_warnings(CHAT, OTHER, 2).await.unwrap();

        let results = vec![
            f.service.warn(CHAT, MEMBER, OTHER).await.map(|_| ()),
            f.service.ban(CHAT, MEMBER, OTHER).await,
            f.service.unban(CHAT, MEMBER, OTHER).await,
            f.service.clear_warnings(CHAT, MEMBER, OTHER).await,
            f.service
                .mute(CHAT, MEMBER, OTHER, 10, Utc::now())
                .await
                .map(|_| ()),
            f.service.unmute(CHAT, MEMBER, OTHER).await,
            f.service.pin(MEMBER, msg(10)).await,
            f.service.promote(CHAT, MEMBER, OTHER).await,
            f.service.set_special(CHAT, MEMBER, OTHER, true).await,
            f.service.set_bot_owner(CHAT, MEMBER, OTHER).await,
            f.service
                .set_welcome_text(CHAT, MEMBER, "hi".to_string())
                .await,
            f.service.set_warning_limit(CHAT, MEMBER, 1).await,
        ];
        for r in results {
            assert!(matches!(r, Err(Error::Denied(_))), "expected denial, got {r:?}");
        }

        assert!(f.moderator.calls().is_empty());
        assert_eq!(warnings(&f, OTHER).await, 2);
        assert!(!f.store.is_special(CHAT, OTHER).await.unwrap());
        assert_eq!(f.store.bot_owner().await.unwrap(), None);
        let settings = f.store.chat_settings(CHAT).await.unwrap();
        assert_eq!(settings.welcome_text, None);
        assert_eq!(settings.warning_limit, 5);
    }

    #[tokio::test]
    async fn admins_cannot_warn_other_admins() {
        let f = fixture();
        let err = f.service.warn(CHAT, ADMIN, CREATOR).await.unwrap_err();
        assert!(matches!(err, Error::Denied(Denial::ProtectedTarget)));
        assert_eq!(warnings(&f, CREATOR).await, 0);
    }

    #[tokio::test]
    async fn admins_cannot_undo_each_others_state() {
        let mut moderator = FakeModerator::group();
        moderator.statuses.insert(OTHER.0, MemberStatus::Administrator);
        let f = fixture_with(moderator);
        f.store.set_warnings(CHAT, OTHER, 3).await.unwrap();

        let err = f.service.clear_warnings(CHAT, ADMIN, OTHER).await.unwrap_err();
        assert!(matches!(err, Error::Denied(Denial::ProtectedTarget)));
        let err = f.service.unban(CHAT, ADMIN, OTHER).await.unwrap_err();
        assert!(matches!(err, Error::Denied(Denial::ProtectedTarget)));
        assert!(f.service.set_special(CHAT, ADMIN, OTHER, true).await.is_err());

        assert_eq!(warnings(&f, OTHER).await, 3);
        assert!(f.moderator.calls().is_empty());
        // The creator outranks both.
        f.service.clear_warnings(CHAT, CREATOR, OTHER).await.unwrap();
        assert_eq!(warnings(&f, OTHER).await, 0);
    }

    #[tokio::test]
    async fn promote_requires_creator() {
        let f = fixture();
        assert!(f.service.promote(CHAT, ADMIN, MEMBER).await.is_err());
        f.service.promote(CHAT, CREATOR, MEMBER).await.unwrap();
        assert_eq!(f.moderator.calls(), vec![Call::Promote(MEMBER.0)]);
    }

    #[tokio::test]
    async fn bot_owner_outranks_creator() {
        let f = fixture();
        f.service.set_bot_owner(CHAT, CREATOR, OTHER).await.unwrap();
        assert_eq!(f.service.role_of(CHAT, OTHER).await.unwrap(), Role::BotOwner);
        // Now only the owner may reassign.
        assert!(f.service.set_bot_owner(CHAT, CREATOR, MEMBER).await.is_err());
        // And the owner may promote in any chat.
        f.service.promote(CHAT, OTHER, MEMBER).await.unwrap();
    }

    #[tokio::test]
    async fn seeded_owner_is_used_until_one_is_stored() {
        let store = Arc::new(MemoryStore::new(5));
        let moderator = Arc::new(FakeModerator::group());
        let service = Moderation::new(store.clone(), moderator, Some(OTHER), vec![]);
        assert_eq!(service.role_of(CHAT, OTHER).await.unwrap(), Role::BotOwner);
        service.set_bot_owner(CHAT, OTHER, MEMBER).await.unwrap();
        assert_eq!(service.role_of(CHAT, OTHER).await.unwrap(), Role::Member);
        assert_eq!(service.role_of(CHAT, MEMBER).await.unwrap(), Role::BotOwner);
    }

    #[tokio::test]
    async fn mute_deadline_is_relative_to_now() {
        let f = fixture();
        let now = Utc::now();
        let until = f.service.mute(CHAT, ADMIN, MEMBER, 30, now).await.unwrap();
        assert_eq!(until - now, ChronoDuration::minutes(30));
        assert_eq!(f.moderator.calls(), vec![Call::Mute(MEMBER.0)]);
    }

    #[tokio::test]
    async fn youtube_link_is_never_deleted() {
        let f = fixture();
        let out = f
            .service
            .screen_links(MEMBER, msg(5), "https://youtu.be/abc")
            .await
            .unwrap();
        assert!(matches!(out, LinkOutcome::Admitted { ref downloadable } if downloadable.len() == 1));
        assert!(f.moderator.calls().is_empty());
        assert_eq!(warnings(&f, MEMBER).await, 0);
    }

    #[tokio::test]
    async fn foreign_link_is_deleted_and_warned() {
        let f = fixture();
        let out = f
            .service
            .screen_links(MEMBER, msg(6), "https://example.com")
            .await
            .unwrap();
        assert_eq!(
            out,
            LinkOutcome::Rejected {
                warning: WarnOutcome::Warned { count: 1, limit: 5 }
            }
        );
        assert_eq!(f.moderator.calls(), vec![Call::Delete(6)]);
    }

    #[tokio::test]
    async fn special_users_may_post_foreign_links() {
        let f = fixture();
        f.service.set_special(CHAT, ADMIN, MEMBER, true).await.unwrap();
        let out = f
            .service
            .screen_links(MEMBER, msg(7), "https://example.com")
            .await
            .unwrap();
        assert_eq!(
            out,
            LinkOutcome::Admitted {
                downloadable: vec![]
            }
        );
        assert!(f.moderator.calls().is_empty());
    }

    #[tokio::test]
    async fn repeated_foreign_links_escalate_to_ban() {
        let f = fixture();
        for id in 0..5 {
            f.service
                .screen_links(MEMBER, msg(id), "see http://spam.example/offer")
                .await
                .unwrap();
        }
        let calls = f.moderator.calls();
        assert_eq!(calls.iter().filter(|c| matches!(c, Call::Delete(_))).count(), 5);
        assert_eq!(calls.last(), Some(&Call::Ban(MEMBER.0)));
        assert_eq!(warnings(&f, MEMBER).await, 0);
    }

    #[tokio::test]
    async fn welcome_media_caption_replaces_text() {
        let f = fixture();
        f.service
            .set_welcome_media(
                CHAT,
                ADMIN,
                WelcomeMedia {
                    kind: MediaKind::Photo,
                    file_id: "AgAD".to_string(),
                },
                Some("welcome {name}".to_string()),
            )
            .await
            .unwrap();
        let s = f.store.chat_settings(CHAT).await.unwrap();
        assert_eq!(s.welcome_text.as_deref(), Some("welcome {name}"));
        assert_eq!(s.welcome_media.map(|m| m.file_id), Some("AgAD".to_string()));
    }
}
