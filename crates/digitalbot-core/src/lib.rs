//! Core domain and application logic for the group-management bot.
//!
//! Framework-agnostic: Telegram, SQLite, the translation service and yt-dlp
//! live behind ports implemented in adapter crates.

pub mod authz;
pub mod config;
pub mod domain;
pub mod errors;
pub mod formatting;
pub mod keywords;
pub mod links;
pub mod logging;
pub mod moderation;
pub mod ports;
pub mod stats;
pub mod store;

pub use errors::{Error, Result};
