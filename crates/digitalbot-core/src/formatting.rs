//! Formatting utilities for Telegram HTML replies.

use crate::domain::UserId;

/// Escape HTML special characters for Telegram HTML parse mode.
pub fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Inline mention that works even for users without a username.
pub fn mention_html(user_id: UserId, name: &str) -> String {
    let name = if name.trim().is_empty() {
        user_id.0.to_string()
    } else {
        name.to_string()
    };
    format!(
        "<a href=\"tg://user?id={}\">{}</a>",
        user_id.0,
        escape_html(&name)
    )
}

/// Render ASCII digits with Persian (Extended Arabic-Indic) digits.
pub fn persian_digits(value: impl ToString) -> String {
    value
        .to_string()
        .chars()
        .map(|c| match c.to_digit(10) {
            Some(d) if c.is_ascii_digit() => char::from_u32(0x06F0 + d).unwrap_or(c),
            _ => c,
        })
        .collect()
}

/// Map Persian and Arabic-Indic digits to ASCII so they can be parsed.
pub fn normalize_digits(text: &str) -> String {
    text.chars()
        .map(|c| match c as u32 {
            0x06F0..=0x06F9 => char::from_u32(c as u32 - 0x06F0 + '0' as u32).unwrap_or(c),
            0x0660..=0x0669 => char::from_u32(c as u32 - 0x0660 + '0' as u32).unwrap_or(c),
            _ => c,
        })
        .collect()
}

/// Truncate to `max_chars` characters, appending `...` when something was cut.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    format!("{}...", text.chars().take(max_chars).collect::<String>())
}
