//! Download pathway: extract with yt-dlp, upload as a document, clean up.

use std::sync::Arc;

use teloxide::{
    prelude::*,
    types::{ChatAction, ChatId, InputFile, Message, MessageId},
};
use tracing::{error, info, warn};

use crate::{router::AppState, texts};

/// Run a delivery in the background so the chat's update queue keeps moving.
pub(super) fn spawn_delivery(bot: Bot, msg: &Message, url: String, state: Arc<AppState>) {
    let chat_id = msg.chat.id;
    let reply_to = msg.id;
    tokio::spawn(async move {
        deliver(&bot, chat_id, reply_to, &url, &state).await;
    });
}

async fn deliver(
    bot: &Bot,
    chat_id: ChatId,
    reply_to: MessageId,
    url: &str,
    state: &AppState,
) {
    let status = bot
        .send_message(chat_id, texts::DOWNLOAD_STARTED)
        .reply_to_message_id(reply_to)
        .await
        .ok();
    let _ = bot.send_chat_action(chat_id, ChatAction::UploadDocument).await;

    let outcome = match state.extractor.download(url).await {
        Ok(media) => {
            let max = state.cfg.max_upload_bytes;
            let result = if media.size_bytes > max {
                info!(url, bytes = media.size_bytes, max, "download too large to upload");
                bot.send_message(chat_id, texts::file_too_large(media.size_bytes, max))
                    .reply_to_message_id(reply_to)
                    .await
                    .map(|_| ())
            } else {
                bot.send_document(chat_id, InputFile::file(media.path.clone()))
                    .caption(texts::DOWNLOAD_DONE)
                    .reply_to_message_id(reply_to)
                    .await
                    .map(|_| ())
            };
            if let Err(e) = state.extractor.cleanup(&media).await {
                warn!(dir = %media.workdir.display(), error = %e, "download cleanup failed");
            }
            result.map_err(|e| format!("upload failed: {e}"))
        }
        Err(e) => Err(e.to_string()),
    };

    if let Err(reason) = outcome {
        error!(chat_id = chat_id.0, url, "download failed: {reason}");
        let _ = bot
            .send_message(chat_id, texts::DOWNLOAD_FAILED)
            .reply_to_message_id(reply_to)
            .await;
    }

    if let Some(status) = status {
        let _ = bot.delete_message(chat_id, status.id).await;
    }
}
