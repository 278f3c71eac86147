use std::{
    env,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::{domain::UserId, errors::Error, links::DEFAULT_ALLOWED_HOSTS, Result};

pub const DEFAULT_WARNING_LIMIT: u32 = 5;
pub const MAX_WARNING_LIMIT: u32 = 100;

/// Typed configuration for the bot, read from the environment.
#[derive(Clone, Debug)]
pub struct Config {
    // Core
    pub telegram_bot_token: String,
    pub database_path: PathBuf,
    pub health_port: Option<u16>,
    pub bot_owner_seed: Option<UserId>,

    // Moderation
    pub default_warning_limit: u32,
    pub link_allowlist: Vec<String>,

    // Downloads
    pub auto_download: bool,
    pub download_dir: PathBuf,
    pub ytdlp_path: PathBuf,
    pub ytdlp_retries: u32,
    pub download_timeout: Duration,
    pub max_upload_bytes: u64,

    // Translation
    pub translate_target: String,
    pub translate_timeout: Duration,
}

impl Config {
    /// Load `.env` (when present, never overriding the real environment) and
    /// build the config from process environment variables.
    pub fn load() -> Result<Self> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build the config from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let env = EnvReader { lookup: &lookup };

        let telegram_bot_token = env
            .string("TELEGRAM_TOKEN")
            .or_else(|| env.string("TELEGRAM_BOT_TOKEN"))
            .and_then(non_empty)
            .ok_or_else(|| {
                Error::Config("TELEGRAM_TOKEN environment variable is required".to_string())
            })?;

        let database_path = env
            .path("DATABASE_PATH")
            .unwrap_or_else(|| PathBuf::from("digitalbot.db"));

        let health_port = match env.string("PORT").and_then(non_empty) {
            Some(raw) => Some(
                raw.trim()
                    .parse::<u16>()
                    .map_err(|_| Error::Config(format!("PORT is not a valid port: {raw}")))?,
            ),
            None => None,
        };

        let bot_owner_seed = env.parse::<i64>("BOT_OWNER_ID").map(UserId);

        let default_warning_limit = env
            .parse::<u32>("DEFAULT_WARNING_LIMIT")
            .unwrap_or(DEFAULT_WARNING_LIMIT)
            .clamp(1, MAX_WARNING_LIMIT);

        let link_allowlist = parse_csv_lower(env.string("LINK_ALLOWLIST"))
            .filter(|hosts| !hosts.is_empty())
            .unwrap_or_else(|| {
                DEFAULT_ALLOWED_HOSTS
                    .iter()
                    .map(|h| h.to_string())
                    .collect()
            });

        let auto_download = env.bool("AUTO_DOWNLOAD").unwrap_or(true);
        let download_dir = env
            .path("DOWNLOAD_PATH")
            .unwrap_or_else(|| PathBuf::from("downloads"));
        let ytdlp_path = env
            .path("YTDLP_PATH")
            .or_else(|| which_in_path("yt-dlp"))
            .unwrap_or_else(|| PathBuf::from("yt-dlp"));
        let ytdlp_retries = env.parse::<u32>("YTDLP_RETRIES").unwrap_or(3);
        let download_timeout =
            Duration::from_secs(env.parse::<u64>("DOWNLOAD_TIMEOUT_SECS").unwrap_or(300));
        let max_upload_bytes = env
            .parse::<u64>("MAX_UPLOAD_BYTES")
            .unwrap_or(50 * 1024 * 1024);

        let translate_target = env
            .string("TRANSLATE_TARGET")
            .and_then(non_empty)
            .map(|s| s.trim().to_lowercase())
            .unwrap_or_else(|| "fa".to_string());
        let translate_timeout =
            Duration::from_secs(env.parse::<u64>("TRANSLATE_TIMEOUT_SECS").unwrap_or(10));

        Ok(Self {
            telegram_bot_token,
            database_path,
            health_port,
            bot_owner_seed,
            default_warning_limit,
            link_allowlist,
            auto_download,
            download_dir,
            ytdlp_path,
            ytdlp_retries,
            download_timeout,
            max_upload_bytes,
            translate_target,
            translate_timeout,
        })
    }
}

struct EnvReader<'a, F: Fn(&str) -> Option<String>> {
    lookup: &'a F,
}

impl<F: Fn(&str) -> Option<String>> EnvReader<'_, F> {
    fn string(&self, key: &str) -> Option<String> {
        (self.lookup)(key)
    }

    fn bool(&self, key: &str) -> Option<bool> {
        self.string(key).map(|s| {
            matches!(
                s.trim().to_lowercase().as_str(),
                "1" | "true" | "yes" | "on"
            )
        })
    }

    fn parse<T: std::str::FromStr>(&self, key: &str) -> Option<T> {
        self.string(key).and_then(|s| s.trim().parse::<T>().ok())
    }

    fn path(&self, key: &str) -> Option<PathBuf> {
        self.string(key).and_then(non_empty).map(PathBuf::from)
    }
}

fn parse_csv_lower(v: Option<String>) -> Option<Vec<String>> {
    v.map(|v| {
        v.split(',')
            .map(|s| s.trim().trim_start_matches("www.").to_lowercase())
            .filter(|s| !s.is_empty())
            .collect()
    })
}

fn which_in_path(binary: &str) -> Option<PathBuf> {
    let path = env::var_os("PATH")?;
    env::split_paths(&path)
        .map(|dir| dir.join(binary))
        .find(|candidate| is_executable_file(candidate))
}

fn is_executable_file(p: &Path) -> bool {
    if !p.is_file() {
        return false;
    }
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if let Ok(md) = std::fs::metadata(p) {
            return (md.permissions().mode() & 0o111) != 0;
        }
    }
    true
}

fn non_empty(s: String) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s)
    }
}
