use teloxide::{
    prelude::*,
    types::{InputFile, Message, ParseMode, User},
};
use tracing::{error, warn};

use digitalbot_core::{
    formatting::truncate_chars,
    store::{MediaKind, WelcomeMedia},
};

use super::chat_of;
use crate::{router::AppState, texts};

/// Telegram's caption limit.
const MAX_CAPTION_CHARS: usize = 1024;

/// Greet every human in `members` with the chat's welcome.
pub(super) async fn greet(bot: &Bot, msg: &Message, members: &[User], state: &AppState) {
    let settings = match state.store.chat_settings(chat_of(msg)).await {
        Ok(s) => s,
        Err(e) => {
            error!(chat_id = msg.chat.id.0, error = %e, "failed to load chat settings");
            return;
        }
    };
    let chat_title = msg.chat.title().unwrap_or("");

    for user in members.iter().filter(|u| !u.is_bot) {
        let text = texts::welcome(settings.welcome_text.as_deref(), &user.first_name, chat_title);

        if let Some(media) = &settings.welcome_media {
            match send_media(bot, msg, media, &text).await {
                Ok(()) => continue,
                Err(e) => warn!(
                    chat_id = msg.chat.id.0,
                    "welcome media failed, falling back to text: {e}"
                ),
            }
        }

        if let Err(e) = bot
            .send_message(msg.chat.id, text)
            .parse_mode(ParseMode::Html)
            .await
        {
            warn!(chat_id = msg.chat.id.0, "failed to send welcome: {e}");
        }
    }
}

async fn send_media(
    bot: &Bot,
    msg: &Message,
    media: &WelcomeMedia,
    text: &str,
) -> Result<(), teloxide::RequestError> {
    let file = InputFile::file_id(media.file_id.clone());
    let caption = truncate_chars(text, MAX_CAPTION_CHARS);
    match media.kind {
        MediaKind::Photo => {
            bot.send_photo(msg.chat.id, file)
                .caption(caption)
                .parse_mode(ParseMode::Html)
                .await?;
        }
        MediaKind::Video => {
            bot.send_video(msg.chat.id, file)
                .caption(caption)
                .parse_mode(ParseMode::Html)
                .await?;
        }
        MediaKind::Animation => {
            bot.send_animation(msg.chat.id, file)
                .caption(caption)
                .parse_mode(ParseMode::Html)
                .await?;
        }
    }
    Ok(())
}
