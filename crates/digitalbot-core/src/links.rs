//! Link admission: classify URLs in a message against the host allow-list.

use std::sync::OnceLock;

use regex::Regex;
use url::Url;

use crate::authz::Role;

/// Video/social platforms whose links are always admitted.
pub const DEFAULT_ALLOWED_HOSTS: &[&str] = &[
    "youtube.com",
    "youtu.be",
    "instagram.com",
    "tiktok.com",
    "twitter.com",
    "x.com",
    "facebook.com",
    "fb.watch",
    "aparat.com",
    "vimeo.com",
    "soundcloud.com",
    "pinterest.com",
    "pin.it",
    "reddit.com",
    "twitch.tv",
    "dailymotion.com",
];

fn url_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\b(?:https?://|www\.)[^\s<>()\[\]{}]+").expect("valid url regex")
    })
}

/// Extract every URL in `text`, in order of appearance.
///
/// Bare `www.` links are given an `https://` scheme. Trailing punctuation
/// that usually ends a sentence is not part of the URL.
pub fn extract_urls(text: &str) -> Vec<Url> {
    url_regex()
        .find_iter(text)
        .filter_map(|m| {
            let raw = m
                .as_str()
                .trim_end_matches(['.', ',', '!', '?', ';', ':', '\'', '"', '،', '؛', '؟']);
            let candidate = if raw.to_ascii_lowercase().starts_with("www.") {
                format!("https://{raw}")
            } else {
                raw.to_string()
            };
            Url::parse(&candidate).ok()
        })
        .filter(|u| u.host_str().is_some())
        .collect()
}

/// True when the URL's host is an allow-listed host or one of its sub-domains.
pub fn host_allowed(url: &Url, allowlist: &[String]) -> bool {
    let Some(host) = url.host_str() else {
        return false;
    };
    let host = host.trim_end_matches('.').to_ascii_lowercase();
    allowlist.iter().any(|allowed| {
        let allowed = allowed.as_str();
        host == allowed
            || host
                .strip_suffix(allowed)
                .is_some_and(|prefix| prefix.ends_with('.'))
    })
}

/// Outcome of the link admission rule for one message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LinkVerdict {
    /// The message has no links.
    NoLinks,
    /// Keep the message; `downloadable` lists the allow-listed URLs.
    Admit { downloadable: Vec<Url> },
    /// Delete the message and warn the sender.
    Reject { offending: Vec<Url> },
}

/// Apply the admission rule to `text` sent by a user with `sender_role`.
///
/// Any allow-listed URL admits the whole message; special users (and every
/// role above them) are exempt from the filter.
pub fn admit(text: &str, sender_role: Role, allowlist: &[String]) -> LinkVerdict {
    let urls = extract_urls(text);
    if urls.is_empty() {
        return LinkVerdict::NoLinks;
    }

    let (downloadable, offending): (Vec<Url>, Vec<Url>) =
        urls.into_iter().partition(|u| host_allowed(u, allowlist));

    if !downloadable.is_empty() || sender_role >= Role::Special {
        return LinkVerdict::Admit { downloadable };
    }
    LinkVerdict::Reject { offending }
}
