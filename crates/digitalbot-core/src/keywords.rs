//! Persian keyword triggers sent in reply to a message.

use crate::formatting::normalize_digits;

pub const DEFAULT_MUTE_MINUTES: u32 = 60;
pub const MAX_MUTE_MINUTES: u32 = 365 * 24 * 60;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Keyword {
    Translate,
    Pin,
    Ban,
    Unban,
    Warn,
    ClearWarnings,
    Mute { minutes: u32 },
    Unmute,
    Promote,
    SetSpecial,
    ClearSpecial,
    SetBotOwner,
    /// `None` means "use the replied-to message's text".
    SetWelcomeText(Option<String>),
    SetWelcomeMedia,
    SetWarningLimit(u32),
}

impl Keyword {
    /// Parse a trigger from the full message text.
    ///
    /// Returns `None` for ordinary chatter and for non-numeric arguments
    /// (e.g. `سکوت abc`), so a typo never triggers a moderation action.
    pub fn parse(text: &str) -> Option<Self> {
        let text = collapse_whitespace(text);
        let text = text.as_str();

        // Longer phrases first: "رفع بن" must not be read as "بن".
        let exact = match text {
            "ترجمه" => Some(Keyword::Translate),
            "پین" => Some(Keyword::Pin),
            "رفع بن" => Some(Keyword::Unban),
            "بن" => Some(Keyword::Ban),
            "حذف اخطار" => Some(Keyword::ClearWarnings),
            "اخطار" => Some(Keyword::Warn),
            "رفع سکوت" => Some(Keyword::Unmute),
            "سکوت" => Some(Keyword::Mute {
                minutes: DEFAULT_MUTE_MINUTES,
            }),
            "ادمین" => Some(Keyword::Promote),
            "حذف کاربر ویژه" => Some(Keyword::ClearSpecial),
            "کاربر ویژه" => Some(Keyword::SetSpecial),
            "مالک ربات" => Some(Keyword::SetBotOwner),
            "تنظیم خوشامد متن" => Some(Keyword::SetWelcomeText(None)),
            "تنظیم خوشامد رسانه" => Some(Keyword::SetWelcomeMedia),
            _ => None,
        };
        if exact.is_some() {
            return exact;
        }

        if let Some(rest) = text.strip_prefix("سکوت ") {
            let minutes = parse_number(rest)?;
            if !(1..=MAX_MUTE_MINUTES).contains(&minutes) {
                return None;
            }
            return Some(Keyword::Mute { minutes });
        }

        // Range is checked by `Moderation::set_warning_limit`.
        if let Some(rest) = text.strip_prefix("تنظیم اخطار ") {
            return parse_number(rest).map(Keyword::SetWarningLimit);
        }

        if let Some(rest) = text.strip_prefix("تنظیم خوشامد متن ") {
            return Some(Keyword::SetWelcomeText(Some(rest.to_string())));
        }

        None
    }
}

fn parse_number(raw: &str) -> Option<u32> {
    let raw = normalize_digits(raw.trim());
    let raw = raw.strip_suffix("دقیقه").unwrap_or(&raw).trim();
    raw.parse::<u32>().ok()
}

/// Trim and collapse whitespace on the first line; later lines are kept as-is
/// so multi-line welcome text survives.
fn collapse_whitespace(text: &str) -> String {
    let text = text.trim();
    let (head, tail) = match text.find('\n') {
        Some(idx) => (&text[..idx], Some(&text[idx..])),
        None => (text, None),
    };
    let mut out = head.split_whitespace().collect::<Vec<_>>().join(" ");
    match tail {
        // Welcome text may start on the line after the keyword.
        Some(tail) if out == "تنظیم خوشامد متن" => {
            out.push(' ');
            out.push_str(tail.trim_start());
        }
        Some(tail) => out.push_str(tail),
        None => {}
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_exact_keywords() {
        assert_eq!(Keyword::parse("بن"), Some(Keyword::Ban));
        assert_eq!(Keyword::parse("  رفع بن "), Some(Keyword::Unban));
        assert_eq!(Keyword::parse("اخطار"), Some(Keyword::Warn));
        assert_eq!(Keyword::parse("پین"), Some(Keyword::Pin));
        assert_eq!(Keyword::parse("ادمین"), Some(Keyword::Promote));
        assert_eq!(Keyword::parse("کاربر  ویژه"), Some(Keyword::SetSpecial));
        assert_eq!(Keyword::parse("مالک ربات"), Some(Keyword::SetBotOwner));
        assert_eq!(Keyword::parse("ترجمه"), Some(Keyword::Translate));
    }

    #[test]
    fn ignores_chatter() {
        assert_eq!(Keyword::parse("بنظرم خوبه"), None);
        assert_eq!(Keyword::parse("اخطار بده لطفا"), None);
        assert_eq!(Keyword::parse(""), None);
    }

    #[test]
    fn parses_mute_minutes_in_any_digits() {
        assert_eq!(Keyword::parse("سکوت"), Some(Keyword::Mute { minutes: 60 }));
        assert_eq!(Keyword::parse("سکوت 10"), Some(Keyword::Mute { minutes: 10 }));
        assert_eq!(Keyword::parse("سکوت ۱۵"), Some(Keyword::Mute { minutes: 15 }));
        assert_eq!(
            Keyword::parse("سکوت ٣٠ دقیقه"),
            Some(Keyword::Mute { minutes: 30 })
        );
        assert_eq!(Keyword::parse("سکوت 0"), None);
        assert_eq!(Keyword::parse("سکوت abc"), None);
    }

    #[test]
    fn parses_warning_limit() {
        assert_eq!(Keyword::parse("تنظیم اخطار ۳"), Some(Keyword::SetWarningLimit(3)));
        assert_eq!(Keyword::parse("تنظیم اخطار 0"), Some(Keyword::SetWarningLimit(0)));
        assert_eq!(
            Keyword::parse("تنظیم اخطار 1000"),
            Some(Keyword::SetWarningLimit(1000))
        );
        assert_eq!(Keyword::parse("تنظیم اخطار زیاد"), None);
    }

    #[test]
    fn parses_welcome_text_inline_and_by_reply() {
        assert_eq!(
            Keyword::parse("تنظیم خوشامد متن"),
            Some(Keyword::SetWelcomeText(None))
        );
        assert_eq!(
            Keyword::parse("تنظیم خوشامد متن سلام {name}\nخوش اومدی"),
            Some(Keyword::SetWelcomeText(Some(
                "سلام {name}\nخوش اومدی".to_string()
            )))
        );
        assert_eq!(
            Keyword::parse("تنظیم خوشامد متن\nسلام {name}"),
            Some(Keyword::SetWelcomeText(Some("سلام {name}".to_string())))
        );
        assert_eq!(Keyword::parse("تنظیم خوشامد رسانه"), Some(Keyword::SetWelcomeMedia));
    }

    #[test]
    fn multi_line_text_is_not_a_trigger() {
        assert_eq!(Keyword::parse("بن\nلطفا"), None);
    }
}
