use std::sync::Arc;

use digitalbot_core::{
    config::Config,
    ports::{MediaExtractor, Translator},
    store::Store,
};
use digitalbot_sqlite::SqliteStore;
use digitalbot_translate::GoogleTranslateClient;
use digitalbot_ytdlp::{YtDlpConfig, YtDlpExtractor};
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    digitalbot_core::logging::init("digitalbot")?;

    let cfg = Arc::new(Config::load()?);

    let store: Arc<dyn Store> = Arc::new(SqliteStore::open(
        &cfg.database_path,
        cfg.default_warning_limit,
    )?);

    let translator: Arc<dyn Translator> =
        Arc::new(GoogleTranslateClient::new(cfg.translate_timeout)?);

    std::fs::create_dir_all(&cfg.download_dir)?;
    let extractor: Arc<dyn MediaExtractor> = Arc::new(YtDlpExtractor::new(YtDlpConfig {
        program: cfg.ytdlp_path.clone(),
        download_dir: cfg.download_dir.clone(),
        retries: cfg.ytdlp_retries,
        timeout: cfg.download_timeout,
    }));
    info!(
        "yt-dlp: {} (timeout {}s)",
        cfg.ytdlp_path.display(),
        cfg.download_timeout.as_secs()
    );

    digitalbot_telegram::router::run_polling(cfg, store, translator, extractor).await
}
