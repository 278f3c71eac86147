use crate::authz::Denial;

/// Core error type for DigitalBot.
///
/// Adapter crates (SQLite, translation, yt-dlp, Telegram) map their specific
/// errors into this type so handlers can log and answer uniformly.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("external error: {0}")]
    External(String),

    #[error("not authorized: {0}")]
    Denied(Denial),

    #[error("invalid input: {0}")]
    InvalidInput(String),
}

pub type Result<T> = std::result::Result<T, Error>;
