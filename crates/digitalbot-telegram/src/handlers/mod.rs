//! Telegram update handlers.
//!
//! Handlers never fail the dispatcher: errors are logged and answered with a
//! Persian message. Each handler is a thin adapter that:
//! - records activity and screens links in groups
//! - parses commands and reply keywords
//! - calls into the `digitalbot-core` moderation service and ports

use std::sync::Arc;

use teloxide::{
    prelude::*,
    types::{Message, ParseMode, User},
};
use tracing::{error, info, warn};

use digitalbot_core::{
    domain::{ChatId, MessageId, MessageRef, UserId, UserProfile},
    errors::Error,
    keywords::Keyword,
    moderation::LinkOutcome,
};

use crate::{router::AppState, texts};

mod commands;
mod download;
mod keywords;
mod welcome;

/// Whether an update is a new message or an edit of an earlier one.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Origin {
    New,
    Edited,
}

/// Which steps run for one incoming message.
///
/// Links are screened for every group message, commands included, and before
/// anything else acts on it. Edits are only screened.
#[derive(Debug, Default, PartialEq, Eq)]
struct Route {
    record_activity: bool,
    screen_links: bool,
    auto_download: bool,
    command: bool,
    keywords: bool,
}

impl Route {
    fn plan(
        origin: Origin,
        in_group: bool,
        text: Option<&str>,
        caption: Option<&str>,
        auto_download: bool,
    ) -> Self {
        let fresh = origin == Origin::New;
        let has_body = text.or(caption).is_some_and(|b| !b.trim().is_empty());
        let command = fresh && text.is_some_and(|t| t.starts_with('/'));
        let screen_links = in_group && has_body;

        Route {
            record_activity: fresh && in_group && has_body && !command,
            screen_links,
            // `/download` delivers on its own.
            auto_download: fresh && screen_links && auto_download && !command,
            command,
            keywords: fresh && !command && text.is_some(),
        }
    }

    fn of(msg: &Message, origin: Origin, state: &AppState) -> Self {
        Self::plan(
            origin,
            is_group(msg),
            msg.text(),
            msg.caption(),
            state.cfg.auto_download,
        )
    }
}

pub async fn handle_message(bot: Bot, msg: Message, state: Arc<AppState>) -> ResponseResult<()> {
    if let Some(members) = msg.new_chat_members() {
        welcome::greet(&bot, &msg, members, &state).await;
        return Ok(());
    }

    let Some(user) = msg.from() else {
        return Ok(());
    };
    if user.is_bot {
        return Ok(());
    }

    let route = Route::of(&msg, Origin::New, &state);

    if route.record_activity {
        record_activity(&msg, user, &state).await;
    }

    if route.screen_links {
        let body = msg.text().or_else(|| msg.caption()).unwrap_or("");
        match screen_links(&bot, &msg, user, body, &state).await {
            Screened::Removed => return Ok(()),
            Screened::Kept(urls) if route.auto_download => {
                for url in urls {
                    download::spawn_delivery(bot.clone(), &msg, url, state.clone());
                }
            }
            Screened::Kept(_) => {}
        }
    }

    if route.command {
        if let Some(text) = msg.text() {
            commands::handle_command(&bot, &msg, &state, text).await;
        }
        return Ok(());
    }

    if route.keywords {
        if let Some(keyword) = msg.text().and_then(Keyword::parse) {
            keywords::handle_keyword(&bot, &msg, &state, keyword).await;
        }
    }

    Ok(())
}

/// Edited messages only go through link screening.
pub async fn handle_edited_message(
    bot: Bot,
    msg: Message,
    state: Arc<AppState>,
) -> ResponseResult<()> {
    let Some(user) = msg.from() else {
        return Ok(());
    };
    if user.is_bot {
        return Ok(());
    }

    if Route::of(&msg, Origin::Edited, &state).screen_links {
        let body = msg.text().or_else(|| msg.caption()).unwrap_or("");
        screen_links(&bot, &msg, user, body, &state).await;
    }
    Ok(())
}

pub(crate) fn is_group(msg: &Message) -> bool {
    msg.chat.is_group() || msg.chat.is_supergroup()
}

pub(crate) fn chat_of(msg: &Message) -> ChatId {
    ChatId(msg.chat.id.0)
}

pub(crate) fn user_of(user: &User) -> UserId {
    UserId(user.id.0 as i64)
}

pub(crate) fn message_ref(msg: &Message) -> MessageRef {
    MessageRef {
        chat_id: chat_of(msg),
        message_id: MessageId(msg.id.0),
    }
}

pub(crate) fn profile_of(user: &User) -> UserProfile {
    UserProfile::new(user.username.clone(), user.full_name())
}

/// Reply to `msg` in HTML mode. Failures are logged, never propagated.
pub(crate) async fn reply_html(bot: &Bot, msg: &Message, html: &str) {
    if let Err(e) = bot
        .send_message(msg.chat.id, html.to_string())
        .parse_mode(ParseMode::Html)
        .reply_to_message_id(msg.id)
        .disable_web_page_preview(true)
        .await
    {
        warn!(chat_id = msg.chat.id.0, "failed to send reply: {e}");
    }
}

/// Answer a failed operation: denials get their reason, everything else is
/// logged and answered with `fallback`.
pub(crate) async fn report(bot: &Bot, msg: &Message, err: &Error, what: &str, fallback: &str) {
    match err {
        Error::Denied(denial) => reply_html(bot, msg, &texts::denial(*denial)).await,
        Error::InvalidInput(_) => reply_html(bot, msg, fallback).await,
        other => {
            error!(chat_id = msg.chat.id.0, error = %other, "{what} failed");
            reply_html(bot, msg, fallback).await;
        }
    }
}

/// Translate `text` and reply with the source/translation layout.
pub(crate) async fn translate_and_reply(bot: &Bot, msg: &Message, state: &AppState, text: &str) {
    let target = state.cfg.translate_target.as_str();
    match state.translator.translate(text, target).await {
        Ok(t) => reply_html(bot, msg, &texts::translation(&t, target)).await,
        Err(e) => report(bot, msg, &e, "translation", texts::TRANSLATE_FAILED).await,
    }
}

async fn record_activity(msg: &Message, user: &User, state: &AppState) {
    let date = msg.date.date_naive();
    if let Err(e) = state
        .store
        .record_message(chat_of(msg), user_of(user), &profile_of(user), date)
        .await
    {
        error!(chat_id = msg.chat.id.0, user_id = user.id.0, error = %e, "failed to record activity");
    }
}

enum Screened {
    Removed,
    Kept(Vec<String>),
}

async fn screen_links(bot: &Bot, msg: &Message, user: &User, body: &str, state: &AppState) -> Screened {
    let outcome = state
        .moderation
        .screen_links(user_of(user), message_ref(msg), body)
        .await;

    match outcome {
        Ok(LinkOutcome::NoLinks) => Screened::Kept(Vec::new()),
        Ok(LinkOutcome::Admitted { downloadable }) => {
            Screened::Kept(downloadable.into_iter().map(String::from).collect())
        }
        Ok(LinkOutcome::Rejected { warning }) => {
            info!(chat_id = msg.chat.id.0, user_id = user.id.0, ?warning, "foreign link removed");
            let notice = texts::link_rejected(user_of(user), &user.full_name(), &warning);
            if let Err(e) = bot
                .send_message(msg.chat.id, notice)
                .parse_mode(ParseMode::Html)
                .await
            {
                warn!(chat_id = msg.chat.id.0, "failed to send link notice: {e}");
            }
            Screened::Removed
        }
        Err(e) => {
            // Fail open.
            error!(chat_id = msg.chat.id.0, error = %e, "link screening failed");
            Screened::Kept(Vec::new())
        }
    }
}
