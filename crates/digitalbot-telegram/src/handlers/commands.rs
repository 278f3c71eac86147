use std::sync::Arc;

use chrono::Utc;
use teloxide::{prelude::*, types::Message};
use tracing::debug;

use digitalbot_core::{
    domain::{ChatId, UserId},
    errors::Error,
    formatting::{escape_html, normalize_digits},
    store::{MemberRecord, Note},
    Result,
};

use super::{
    chat_of, download, is_group, profile_of, reply_html, report, translate_and_reply, user_of,
};
use crate::{
    router::AppState,
    texts::{self, ProfileView},
};

const STATS_TOP: usize = 10;

/// A slash command split into its parts.
#[derive(Debug, PartialEq, Eq)]
struct ParsedCommand<'a> {
    name: String,
    /// Bot named in `/cmd@bot`, if any.
    mention: Option<&'a str>,
    args: &'a str,
}

fn parse_command(text: &str) -> ParsedCommand<'_> {
    // Telegram may send `/cmd@botname arg1 ...`
    let text = text.trim();
    let (first, rest) = match text.find(char::is_whitespace) {
        Some(idx) => (&text[..idx], text[idx..].trim()),
        None => (text, ""),
    };
    let first = first.trim_start_matches('/');
    let (name, mention) = match first.split_once('@') {
        Some((name, bot)) => (name, Some(bot)),
        None => (first, None),
    };
    ParsedCommand {
        name: name.to_lowercase(),
        mention,
        args: rest,
    }
}

pub(super) async fn handle_command(bot: &Bot, msg: &Message, state: &Arc<AppState>, text: &str) {
    let cmd = parse_command(text);

    if let (Some(mention), Some(me)) = (cmd.mention, state.bot_username.as_deref()) {
        if !mention.eq_ignore_ascii_case(me) {
            debug!(command = %cmd.name, mention, "command for another bot");
            return;
        }
    }

    match cmd.name.as_str() {
        "start" => reply_html(bot, msg, &escape_html(texts::START)).await,
        "help" => reply_html(bot, msg, texts::HELP).await,
        "translate" => handle_translate(bot, msg, state, cmd.args).await,
        "download" => handle_download(bot, msg, state, cmd.args).await,
        "myprofile" => handle_profile(bot, msg, state, false).await,
        "profile" => handle_profile(bot, msg, state, true).await,
        "stats" => handle_stats(bot, msg, state).await,
        "ban" => handle_ban(bot, msg, state, cmd.args).await,
        "note" | "notes" => handle_note(bot, msg, state, cmd.args).await,
        _ if msg.chat.is_private() => reply_html(bot, msg, texts::UNKNOWN_COMMAND).await,
        _ => {}
    }
}

async fn handle_translate(bot: &Bot, msg: &Message, state: &AppState, args: &str) {
    let text = if args.is_empty() {
        msg.reply_to_message()
            .and_then(|r| r.text().or_else(|| r.caption()))
            .unwrap_or("")
    } else {
        args
    };
    if text.trim().is_empty() {
        reply_html(bot, msg, &escape_html(texts::TRANSLATE_USAGE)).await;
        return;
    }
    translate_and_reply(bot, msg, state, text).await;
}

async fn handle_download(bot: &Bot, msg: &Message, state: &Arc<AppState>, args: &str) {
    let Some(url) = args.split_whitespace().next() else {
        reply_html(bot, msg, &escape_html(texts::DOWNLOAD_USAGE)).await;
        return;
    };
    download::spawn_delivery(bot.clone(), msg, url.to_string(), state.clone());
}

async fn handle_profile(bot: &Bot, msg: &Message, state: &AppState, allow_reply: bool) {
    if !is_group(msg) {
        reply_html(bot, msg, texts::GROUP_ONLY).await;
        return;
    }
    let subject = allow_reply
        .then(|| msg.reply_to_message().and_then(|r| r.from()))
        .flatten()
        .or_else(|| msg.from());
    let Some(subject) = subject else {
        return;
    };

    match render_profile(state, msg, subject).await {
        Ok(html) => reply_html(bot, msg, &html).await,
        Err(e) => report(bot, msg, &e, "profile", texts::GENERIC_FAILURE).await,
    }
}

async fn render_profile(
    state: &AppState,
    msg: &Message,
    subject: &teloxide::types::User,
) -> Result<String> {
    let chat = chat_of(msg);
    let user = user_of(subject);
    let member = match state.store.member(chat, user).await? {
        Some(m) => m,
        None => MemberRecord {
            profile: profile_of(subject),
            ..MemberRecord::empty(chat, user)
        },
    };
    let role = state.moderation.role_of(chat, user).await?;
    let settings = state.store.chat_settings(chat).await?;
    let active_days = state.store.active_days(chat, user).await?;

    Ok(texts::profile(&ProfileView {
        member: &member,
        role,
        warning_limit: settings.warning_limit,
        active_days,
        today: Utc::now().date_naive(),
    }))
}

async fn handle_stats(bot: &Bot, msg: &Message, state: &AppState) {
    if !is_group(msg) {
        reply_html(bot, msg, texts::GROUP_ONLY).await;
        return;
    }
    let chat = chat_of(msg);
    let today = Utc::now().date_naive();
    let result = async {
        let top = state.store.top_members(chat, STATS_TOP).await?;
        let summary = state.store.chat_summary(chat, today).await?;
        Ok::<_, Error>(texts::stats(&top, &summary, today))
    }
    .await;

    match result {
        Ok(html) => reply_html(bot, msg, &html).await,
        Err(e) => report(bot, msg, &e, "stats", texts::GENERIC_FAILURE).await,
    }
}

async fn handle_ban(bot: &Bot, msg: &Message, state: &AppState, args: &str) {
    if !is_group(msg) {
        reply_html(bot, msg, texts::GROUP_ONLY).await;
        return;
    }
    let Some(actor) = msg.from().map(user_of) else {
        return;
    };

    let target = match parse_user_id(args) {
        Some(id) => Some((id, id.0.to_string())),
        None => msg
            .reply_to_message()
            .and_then(|r| r.from())
            .map(|u| (user_of(u), u.full_name())),
    };
    let Some((target, name)) = target else {
        reply_html(bot, msg, &escape_html(texts::BAN_USAGE)).await;
        return;
    };

    match state.moderation.ban(chat_of(msg), actor, target).await {
        Ok(()) => reply_html(bot, msg, &texts::banned(target, &name)).await,
        Err(e) => report(bot, msg, &e, "ban", texts::GENERIC_FAILURE).await,
    }
}

fn parse_user_id(args: &str) -> Option<UserId> {
    let first = args.split_whitespace().next()?;
    normalize_digits(first).parse::<i64>().ok().filter(|id| *id > 0).map(UserId)
}

/// What a `/note` invocation asks for.
#[derive(Debug, PartialEq, Eq)]
enum NoteRequest<'a> {
    List,
    Show(String),
    Save(String, &'a str),
    Delete(String),
}

fn parse_note(args: &str) -> NoteRequest<'_> {
    let args = args.trim();
    if args.is_empty() {
        return NoteRequest::List;
    }
    let (name, body) = match args.find(char::is_whitespace) {
        Some(idx) => (&args[..idx], args[idx..].trim()),
        None => (args, ""),
    };
    if let Some(name) = name.strip_prefix('-') {
        return NoteRequest::Delete(name.to_lowercase());
    }
    let name = name.to_lowercase();
    if body.is_empty() {
        NoteRequest::Show(name)
    } else {
        NoteRequest::Save(name, body)
    }
}

async fn handle_note(bot: &Bot, msg: &Message, state: &AppState, args: &str) {
    if !is_group(msg) {
        reply_html(bot, msg, texts::GROUP_ONLY).await;
        return;
    }
    let Some(actor) = msg.from().map(user_of) else {
        return;
    };

    let mut request = parse_note(args);
    // `/note name` as a reply saves the replied text.
    let replied = msg
        .reply_to_message()
        .and_then(|r| r.text().or_else(|| r.caption()));
    if let (NoteRequest::Show(name), Some(body)) = (&request, replied) {
        request = NoteRequest::Save(name.clone(), body);
    }

    let result = run_note(state, chat_of(msg), actor, request).await;

    match result {
        Ok(html) => reply_html(bot, msg, &html).await,
        Err(e) => report(bot, msg, &e, "note", texts::GENERIC_FAILURE).await,
    }
}

async fn run_note(
    state: &AppState,
    chat: ChatId,
    actor: UserId,
    request: NoteRequest<'_>,
) -> Result<String> {
    match request {
        NoteRequest::List => Ok(texts::note_list(&state.store.note_names(chat).await?)),
        NoteRequest::Show(name) => Ok(match state.store.note(chat, &name).await? {
            Some(note) => escape_html(&note.body),
            None => texts::note_missing(&name),
        }),
        NoteRequest::Save(name, body) => {
            if name.is_empty() {
                return Ok(escape_html(texts::NOTE_USAGE));
            }
            state.moderation.check_note_editor(chat, actor).await?;
            let note = Note {
                name: name.clone(),
                body: body.to_string(),
                author_id: actor.0,
                created_at: Utc::now().format("%Y-%m-%d %H:%M").to_string(),
            };
            state.store.save_note(chat, note).await?;
            Ok(texts::note_saved(&name))
        }
        NoteRequest::Delete(name) => {
            state.moderation.check_note_editor(chat, actor).await?;
            Ok(if state.store.delete_note(chat, &name).await? {
                texts::note_deleted(&name)
            } else {
                texts::note_missing(&name)
            })
        }
    }
}
