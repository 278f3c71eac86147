use std::sync::Arc;

use teloxide::{dispatching::Dispatcher, dptree, error_handlers::LoggingErrorHandler, prelude::*};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use digitalbot_core::{
    config::Config,
    moderation::Moderation,
    ports::{ChatModerator, MediaExtractor, Translator},
    store::Store,
};

use crate::{handlers, health, TelegramModerator};

#[derive(Clone)]
pub struct AppState {
    pub cfg: Arc<Config>,
    pub store: Arc<dyn Store>,
    pub moderation: Arc<Moderation>,
    pub translator: Arc<dyn Translator>,
    pub extractor: Arc<dyn MediaExtractor>,
    /// Our own username, to ignore `/cmd@otherbot`.
    pub bot_username: Option<String>,
}

impl AppState {
    pub fn new(
        cfg: Arc<Config>,
        store: Arc<dyn Store>,
        moderator: Arc<dyn ChatModerator>,
        translator: Arc<dyn Translator>,
        extractor: Arc<dyn MediaExtractor>,
        bot_username: Option<String>,
    ) -> Self {
        let moderation = Arc::new(Moderation::new(
            store.clone(),
            moderator,
            cfg.bot_owner_seed,
            cfg.link_allowlist.clone(),
        ));
        Self {
            cfg,
            store,
            moderation,
            translator,
            extractor,
            bot_username,
        }
    }
}

pub async fn run_polling(
    cfg: Arc<Config>,
    store: Arc<dyn Store>,
    translator: Arc<dyn Translator>,
    extractor: Arc<dyn MediaExtractor>,
) -> anyhow::Result<()> {
    let bot = Bot::new(cfg.telegram_bot_token.clone());

    let bot_username = match bot.get_me().await {
        Ok(me) => {
            info!("DigitalBot started: @{}", me.username());
            Some(me.username().to_string())
        }
        Err(e) => {
            warn!("getMe failed, continuing: {e}");
            None
        }
    };
    info!("Database: {}", cfg.database_path.display());
    info!("Download dir: {}", cfg.download_dir.display());
    info!("Link allow-list: {} hosts", cfg.link_allowlist.len());

    let shutdown = CancellationToken::new();
    let health_task = cfg.health_port.map(|port| {
        let token = shutdown.clone();
        tokio::spawn(async move {
            if let Err(e) = health::serve(port, token).await {
                error!("health server failed: {e}");
            }
        })
    });

    let moderator = Arc::new(TelegramModerator::new(bot.clone()));
    let state = Arc::new(AppState::new(
        cfg.clone(),
        store,
        moderator,
        translator,
        extractor,
        bot_username,
    ));

    let handler = dptree::entry()
        .branch(Update::filter_message().endpoint(handlers::handle_message))
        .branch(Update::filter_edited_message().endpoint(handlers::handle_edited_message));

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![state])
        .default_handler(|_| async {})
        .error_handler(LoggingErrorHandler::with_custom_text(
            "An error from the update listener",
        ))
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    info!("Dispatcher stopped, shutting down");
    shutdown.cancel();
    if let Some(task) = health_task {
        task.await?;
    }
    Ok(())
}
