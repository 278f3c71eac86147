use chrono::Utc;
use teloxide::{
    prelude::*,
    types::{Message, User},
};
use tracing::debug;

use digitalbot_core::{
    domain::UserId,
    errors::Error,
    keywords::Keyword,
    store::{MediaKind, WelcomeMedia},
    Result,
};

use super::{chat_of, is_group, message_ref, reply_html, report, translate_and_reply, user_of};
use crate::{router::AppState, texts};

/// Run a parsed keyword sent as `msg`.
///
/// Moderation keywords only act in groups and, except for the inline forms
/// of the welcome text and warning limit, only as replies.
pub(super) async fn handle_keyword(bot: &Bot, msg: &Message, state: &AppState, keyword: Keyword) {
    let reply = msg.reply_to_message();

    if keyword == Keyword::Translate {
        let Some(text) = reply.and_then(|r| r.text().or_else(|| r.caption())) else {
            if reply.is_some() {
                reply_html(bot, msg, texts::NOTHING_TO_TRANSLATE).await;
            }
            return;
        };
        translate_and_reply(bot, msg, state, text).await;
        return;
    }

    if !is_group(msg) {
        return;
    }
    let Some(actor) = msg.from() else {
        return;
    };
    let actor = user_of(actor);
    let fallback = match keyword {
        Keyword::SetWarningLimit(_) => texts::INVALID_LIMIT,
        _ => texts::GENERIC_FAILURE,
    };

    let outcome = match (keyword, reply) {
        (Keyword::SetWarningLimit(limit), _) => {
            let chat = chat_of(msg);
            state
                .moderation
                .set_warning_limit(chat, actor, limit)
                .await
                .map(|()| texts::warning_limit_set(limit))
        }
        (Keyword::SetWelcomeText(Some(text)), _) => set_welcome_text(state, msg, actor, text).await,
        (Keyword::SetWelcomeText(None), Some(reply)) => {
            match reply.text().or_else(|| reply.caption()) {
                Some(text) => set_welcome_text(state, msg, actor, text.to_string()).await,
                None => Ok(texts::NO_WELCOME_TEXT.to_string()),
            }
        }
        (Keyword::SetWelcomeMedia, Some(reply)) => set_welcome_media(state, msg, actor, reply).await,
        (Keyword::Pin, Some(reply)) => state
            .moderation
            .pin(actor, message_ref(reply))
            .await
            .map(|()| texts::PINNED.to_string()),
        (keyword, Some(reply)) => {
            let Some(target) = reply.from() else {
                return;
            };
            targeted(state, msg, actor, target, keyword).await
        }
        (keyword, None) => {
            debug!(?keyword, "keyword without reply");
            Ok(texts::NEED_REPLY.to_string())
        }
    };

    match outcome {
        Ok(html) => reply_html(bot, msg, &html).await,
        Err(e) => report(bot, msg, &e, "keyword", fallback).await,
    }
}

/// Keywords aimed at the author of the replied-to message.
async fn targeted(
    state: &AppState,
    msg: &Message,
    actor: UserId,
    target_user: &User,
    keyword: Keyword,
) -> Result<String> {
    let chat = chat_of(msg);
    let target = user_of(target_user);
    let name = target_user.full_name();
    let m = &state.moderation;

    match keyword {
        Keyword::Ban => m.ban(chat, actor, target).await.map(|()| texts::banned(target, &name)),
        Keyword::Unban => m
            .unban(chat, actor, target)
            .await
            .map(|()| texts::unbanned(target, &name)),
        Keyword::Warn => m
            .warn(chat, actor, target)
            .await
            .map(|out| texts::warn_outcome(target, &name, &out)),
        Keyword::ClearWarnings => m
            .clear_warnings(chat, actor, target)
            .await
            .map(|()| texts::warnings_cleared(target, &name)),
        Keyword::Mute { minutes } => m
            .mute(chat, actor, target, minutes, Utc::now())
            .await
            .map(|_| texts::muted(target, &name, minutes)),
        Keyword::Unmute => m
            .unmute(chat, actor, target)
            .await
            .map(|()| texts::unmuted(target, &name)),
        Keyword::Promote => m
            .promote(chat, actor, target)
            .await
            .map(|()| texts::promoted(target, &name)),
        Keyword::SetSpecial => m
            .set_special(chat, actor, target, true)
            .await
            .map(|()| texts::special_set(target, &name, true)),
        Keyword::ClearSpecial => m
            .set_special(chat, actor, target, false)
            .await
            .map(|()| texts::special_set(target, &name, false)),
        Keyword::SetBotOwner => m
            .set_bot_owner(chat, actor, target)
            .await
            .map(|()| texts::bot_owner_set(target, &name)),
        other => Err(Error::InvalidInput(format!(
            "{other:?} does not target a member"
        ))),
    }
}

async fn set_welcome_text(
    state: &AppState,
    msg: &Message,
    actor: UserId,
    text: String,
) -> Result<String> {
    if text.trim().is_empty() {
        return Ok(texts::NO_WELCOME_TEXT.to_string());
    }
    state
        .moderation
        .set_welcome_text(chat_of(msg), actor, text)
        .await
        .map(|()| texts::WELCOME_TEXT_SET.to_string())
}

async fn set_welcome_media(
    state: &AppState,
    msg: &Message,
    actor: UserId,
    reply: &Message,
) -> Result<String> {
    let Some(media) = welcome_media_of(reply) else {
        return Ok(texts::NO_MEDIA.to_string());
    };
    let caption = reply.caption().map(str::to_string);
    state
        .moderation
        .set_welcome_media(chat_of(msg), actor, media, caption)
        .await
        .map(|()| texts::WELCOME_MEDIA_SET.to_string())
}

fn welcome_media_of(msg: &Message) -> Option<WelcomeMedia> {
    if let Some(sizes) = msg.photo() {
        // Largest size comes last.
        let photo = sizes.last()?;
        return Some(WelcomeMedia {
            kind: MediaKind::Photo,
            file_id: photo.file.id.clone(),
        });
    }
    // Animations also carry a document; check them before videos.
    if let Some(anim) = msg.animation() {
        return Some(WelcomeMedia {
            kind: MediaKind::Animation,
            file_id: anim.file.id.clone(),
        });
    }
    msg.video().map(|v| WelcomeMedia {
        kind: MediaKind::Video,
        file_id: v.file.id.clone(),
    })
}
