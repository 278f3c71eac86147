//! User-facing Persian strings and reply renderers (Telegram HTML).

use chrono::NaiveDate;

use digitalbot_core::{
    authz::{Denial, Role},
    domain::UserId,
    formatting::{escape_html, mention_html, persian_digits},
    moderation::WarnOutcome,
    ports::Translation,
    store::{ChatSummary, MemberRecord},
};
use digitalbot_translate::language_name_fa;

pub const DEFAULT_WELCOME: &str = "سلام {name}! به گروه {chat} خوش آمدی 🌹";

pub const START: &str = "سلام! من DigitalBot هستم. می‌تونم گروهت رو مدیریت کنم، متن‌ها رو به فارسی ترجمه کنم و ویدیو از یوتیوب، اینستاگرام و تیک‌تاک دانلود کنم.\n\
برای دیدن همه‌ی دستورات /help رو بزن.";

pub const HELP: &str = "<b>دستورات:</b>\n\
/start - شروع ربات\n\
/translate &lt;متن&gt; - ترجمه متن به فارسی (زبان مبدا خودکار تشخیص داده می‌شه)\n\
/download &lt;لینک&gt; - دانلود ویدیو از یوتیوب، اینستاگرام یا تیک‌تاک\n\
/myprofile - پروفایل من در این گروه\n\
/profile - پروفایل کاربر (با ریپلای)\n\
/stats - آمار فعال‌ترین اعضا\n\
/ban [آیدی] - بن کاربر (ادمین)\n\
/note [نام] [متن] - یادداشت‌های گروه\n\n\
<b>کلمات کلیدی (با ریپلای روی پیام):</b>\n\
ترجمه، پین، بن، رفع بن، اخطار، حذف اخطار، سکوت [دقیقه]، رفع سکوت، ادمین، کاربر ویژه، حذف کاربر ویژه، مالک ربات، تنظیم خوشامد متن، تنظیم خوشامد رسانه، تنظیم اخطار [عدد]\n\n\
<b>مثال:</b>\n\
/translate Hello, how are you?\n\
/download https://www.youtube.com/watch?v=example";

pub const TRANSLATE_USAGE: &str = "لطفاً متنی برای ترجمه وارد کنید. مثال:\n/translate Hello";
pub const TRANSLATE_FAILED: &str = "خطایی در ترجمه رخ داد. لطفاً دوباره امتحان کنید.";
pub const NOTHING_TO_TRANSLATE: &str = "پیامی که ریپلای کردی متنی برای ترجمه نداره.";

pub const DOWNLOAD_USAGE: &str =
    "لطفاً لینک ویدیو رو وارد کنید. مثال:\n/download https://www.youtube.com/watch?v=example";
pub const DOWNLOAD_DONE: &str = "ویدیو دانلود شد!";
pub const DOWNLOAD_FAILED: &str =
    "خطایی در دانلود رخ داد. مطمئن بشید لینک معتبره و دوباره امتحان کنید.";
pub const DOWNLOAD_STARTED: &str = "⏳ در حال دانلود...";

pub const GENERIC_FAILURE: &str = "یه مشکلی پیش اومد! لطفاً دوباره امتحان کنید.";
pub const UNKNOWN_COMMAND: &str = "دستور ناشناخته است. برای راهنما /help رو بزن.";
pub const GROUP_ONLY: &str = "این دستور فقط داخل گروه کار می‌کنه.";
pub const NEED_REPLY: &str = "این دستور باید روی پیام کاربر ریپلای بشه.";
pub const BAN_USAGE: &str = "روی پیام کاربر ریپلای کن یا آیدی عددیش رو بنویس. مثال:\n/ban 123456789";
pub const NO_MEDIA: &str = "پیامی که ریپلای کردی عکس، ویدیو یا گیف نداره.";
pub const NO_WELCOME_TEXT: &str = "متن خوشامد خالیه. روی یک پیام متنی ریپلای کن یا متن رو بعد از دستور بنویس.";
pub const WELCOME_TEXT_SET: &str = "✅ متن خوشامد ذخیره شد.";
pub const WELCOME_MEDIA_SET: &str = "✅ رسانه‌ی خوشامد ذخیره شد.";
pub const PINNED: &str = "📌 پیام پین شد.";
pub const INVALID_LIMIT: &str = "تعداد اخطار باید عددی بین ۱ تا ۱۰۰ باشه.";

pub const NO_NOTES: &str = "هنوز یادداشتی ذخیره نشده.";
pub const NOTE_USAGE: &str = "برای ذخیره: /note نام متن\nبرای حذف: /note -نام";

/// Persian explanation of an authorization denial.
pub fn denial(d: Denial) -> String {
    match d {
        Denial::InsufficientRole { required } => format!(
            "⛔️ این کار فقط از {} به بالا ساخته است.",
            required.label_fa()
        ),
        Denial::ProtectedTarget => "⛔️ روی این کاربر نمی‌تونی این کار رو انجام بدی.".to_string(),
        Denial::SelfTarget => "⛔️ نمی‌تونی این کار رو روی خودت انجام بدی.".to_string(),
    }
}

pub fn translation(t: &Translation, target: &str) -> String {
    let source = language_name_fa(&t.source_lang).unwrap_or("ناشناخته");
    let label = if target == "fa" {
        "ترجمه به فارسی".to_string()
    } else {
        format!(
            "ترجمه به {}",
            language_name_fa(target).unwrap_or(target)
        )
    };
    format!(
        "متن: {}\nزبان مبدا: {}\n{}: {}",
        escape_html(&t.original),
        source,
        label,
        escape_html(&t.text)
    )
}

pub fn warn_outcome(user: UserId, name: &str, outcome: &WarnOutcome) -> String {
    let who = mention_html(user, name);
    match outcome {
        WarnOutcome::Warned { count, limit } => format!(
            "⚠️ {who} اخطار گرفت ({}/{}).",
            persian_digits(count),
            persian_digits(limit)
        ),
        WarnOutcome::Banned {
            limit,
            ban_error: None,
        } => format!(
            "🚫 {who} به {} اخطار رسید و از گروه بن شد.",
            persian_digits(limit)
        ),
        WarnOutcome::Banned {
            limit,
            ban_error: Some(_),
        } => format!(
            "⚠️ {who} به {} اخطار رسید ولی بن کردنش ممکن نشد. اخطارها صفر شد.",
            persian_digits(limit)
        ),
    }
}

pub fn link_rejected(user: UserId, name: &str, outcome: &WarnOutcome) -> String {
    format!(
        "🔗 ارسال لینک در این گروه مجاز نیست.\n{}",
        warn_outcome(user, name, outcome)
    )
}

pub fn banned(user: UserId, name: &str) -> String {
    format!("🚫 {} از گروه بن شد.", mention_html(user, name))
}

pub fn unbanned(user: UserId, name: &str) -> String {
    format!("✅ {} از بن خارج شد.", mention_html(user, name))
}

pub fn warnings_cleared(user: UserId, name: &str) -> String {
    format!("✅ اخطارهای {} پاک شد.", mention_html(user, name))
}

pub fn muted(user: UserId, name: &str, minutes: u32) -> String {
    format!(
        "🔇 {} برای {} دقیقه سکوت شد.",
        mention_html(user, name),
        persian_digits(minutes)
    )
}

pub fn unmuted(user: UserId, name: &str) -> String {
    format!("🔊 سکوت {} برداشته شد.", mention_html(user, name))
}

pub fn promoted(user: UserId, name: &str) -> String {
    format!("⭐️ {} ادمین شد.", mention_html(user, name))
}

pub fn special_set(user: UserId, name: &str, special: bool) -> String {
    if special {
        format!("💎 {} کاربر ویژه شد.", mention_html(user, name))
    } else {
        format!("{} دیگه کاربر ویژه نیست.", mention_html(user, name))
    }
}

pub fn bot_owner_set(user: UserId, name: &str) -> String {
    format!("👑 {} مالک ربات شد.", mention_html(user, name))
}

pub fn warning_limit_set(limit: u32) -> String {
    format!("✅ حد اخطار روی {} تنظیم شد.", persian_digits(limit))
}

pub fn file_too_large(size: u64, max: u64) -> String {
    format!(
        "حجم فایل ({} مگابایت) بیشتر از حد مجاز ({} مگابایت) است.",
        persian_digits(size / (1024 * 1024)),
        persian_digits(max / (1024 * 1024))
    )
}

/// Fill `{name}` and `{chat}` in a welcome template. The template and both
/// values are escaped.
pub fn welcome(template: Option<&str>, first_name: &str, chat_title: &str) -> String {
    let template = template
        .filter(|t| !t.trim().is_empty())
        .unwrap_or(DEFAULT_WELCOME);
    escape_html(template)
        .replace("{name}", &escape_html(first_name))
        .replace("{chat}", &escape_html(chat_title))
}

/// Everything shown by `/myprofile` and `/profile`.
pub struct ProfileView<'a> {
    pub member: &'a MemberRecord,
    pub role: Role,
    pub warning_limit: u32,
    pub active_days: u32,
    pub today: NaiveDate,
}

pub fn profile(view: &ProfileView<'_>) -> String {
    let m = view.member;
    let seen = m.counters.as_of(view.today);
    let name = if m.profile.full_name.trim().is_empty() {
        m.profile.display()
    } else {
        m.profile.full_name.clone()
    };
    let username = m
        .profile
        .username
        .as_deref()
        .filter(|u| !u.is_empty())
        .map(|u| format!("@{}", escape_html(u)))
        .unwrap_or_else(|| "ندارد".to_string());

    let mut out = format!("👤 <b>پروفایل {}</b>\n", mention_html(UserId(m.user_id), &name));
    out.push_str(&format!("نام کاربری: {username}\n"));
    out.push_str(&format!("آیدی: <code>{}</code>\n", m.user_id));
    out.push_str(&format!("نقش: {}\n", view.role.label_fa()));
    out.push_str(&format!(
        "پیام‌های امروز: {}\nپیام‌های این هفته: {}\nپیام‌های این ماه: {}\nکل پیام‌ها: {}\n",
        persian_digits(seen.day),
        persian_digits(seen.week),
        persian_digits(seen.month),
        persian_digits(seen.total)
    ));
    out.push_str(&format!("روزهای فعال: {}\n", persian_digits(view.active_days)));
    out.push_str(&format!(
        "آخرین فعالیت: {}\n",
        m.last_activity
            .as_deref()
            .map(persian_digits)
            .unwrap_or_else(|| "ثبت نشده".to_string())
    ));
    out.push_str(&format!(
        "اخطارها: {}/{}\n",
        persian_digits(m.warnings),
        persian_digits(view.warning_limit)
    ));
    out.push_str(&format!(
        "کاربر ویژه: {}",
        if m.is_special { "بله" } else { "خیر" }
    ));
    out
}

pub fn stats(top: &[MemberRecord], summary: &ChatSummary, today: NaiveDate) -> String {
    if top.is_empty() {
        return "هنوز آماری ثبت نشده.".to_string();
    }

    let mut out = String::from("📊 <b>فعال‌ترین اعضا</b>\n\n");
    for (i, m) in top.iter().enumerate() {
        let seen = m.counters.as_of(today);
        let name = m.profile.display();
        out.push_str(&format!(
            "{}. {} | کل: {} | امروز: {} | هفته: {} | ماه: {}\n",
            persian_digits(i + 1),
            mention_html(UserId(m.user_id), &name),
            persian_digits(seen.total),
            persian_digits(seen.day),
            persian_digits(seen.week),
            persian_digits(seen.month)
        ));
    }
    out.push_str(&format!(
        "\nاعضای فعال: {}\nکل پیام‌ها: {}\nپیام‌های امروز: {}",
        persian_digits(summary.members),
        persian_digits(summary.total_messages),
        persian_digits(summary.today_messages)
    ));
    out
}

pub fn note_list(names: &[String]) -> String {
    if names.is_empty() {
        return NO_NOTES.to_string();
    }
    let mut out = String::from("📝 <b>یادداشت‌ها:</b>\n");
    for name in names {
        out.push_str(&format!("• <code>{}</code>\n", escape_html(name)));
    }
    out.push_str("\nبرای دیدن هر کدوم: /note نام");
    out
}

pub fn note_missing(name: &str) -> String {
    format!("یادداشتی با نام «{}» پیدا نشد.", escape_html(name))
}

pub fn note_saved(name: &str) -> String {
    format!("✅ یادداشت «{}» ذخیره شد.", escape_html(name))
}

pub fn note_deleted(name: &str) -> String {
    format!("🗑 یادداشت «{}» حذف شد.", escape_html(name))
}

#[cfg(test)]
mod tests {
    use digitalbot_core::domain::{ChatId, UserProfile};

    use super::*;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 18).unwrap()
    }

    #[test]
    fn welcome_fills_placeholders_and_escapes() {
        let text = welcome(None, "<Ali>", "Rust & Co");
        assert_eq!(text, "سلام &lt;Ali&gt;! به گروه Rust &amp; Co خوش آمدی 🌹");
        assert_eq!(welcome(Some("hi {name}"), "Sara", "g"), "hi Sara");
        assert_eq!(welcome(Some("  "), "Sara", "g"), welcome(None, "Sara", "g"));
    }

    #[test]
    fn welcome_template_markup_is_escaped() {
        assert_eq!(
            welcome(Some("Q&A <3 {name} in {chat}"), "Sara", "<b>g</b>"),
            "Q&amp;A &lt;3 Sara in &lt;b&gt;g&lt;/b&gt;"
        );
    }

    #[test]
    fn translation_reply_layout() {
        let t = Translation {
            original: "Hello".to_string(),
            source_lang: "en".to_string(),
            text: "سلام".to_string(),
        };
        assert_eq!(
            translation(&t, "fa"),
            "متن: Hello\nزبان مبدا: انگلیسی\nترجمه به فارسی: سلام"
        );
    }

    #[test]
    fn warn_outcome_uses_persian_counts() {
        let s = warn_outcome(
            UserId(5),
            "Ali",
            &WarnOutcome::Warned { count: 2, limit: 5 },
        );
        assert!(s.contains("(۲/۵)"));
        assert!(s.contains("tg://user?id=5"));
    }

    #[test]
    fn profile_shows_stale_buckets_as_zero() {
        let mut member = MemberRecord::empty(ChatId(-1), UserId(9));
        member.profile = UserProfile::new(Some("sara".to_string()), "Sara");
        member
            .counters
            .record(NaiveDate::from_ymd_opt(2026, 9, 1).unwrap());
        member.warnings = 1;
        let text = profile(&ProfileView {
            member: &member,
            role: Role::Special,
            warning_limit: 5,
            active_days: 1,
            today: today(),
        });
        assert!(text.contains("پیام‌های امروز: ۰"));
        assert!(text.contains("کل پیام‌ها: ۱"));
        assert!(text.contains("اخطارها: ۱/۵"));
        assert!(text.contains("کاربر ویژه"));
        assert!(text.contains("@sara"));
    }

    #[test]
    fn stats_lists_members_in_order() {
        let mut a = MemberRecord::empty(ChatId(-1), UserId(1));
        a.profile = UserProfile::new(None, "A");
        a.counters.record(today());
        let text = stats(
            &[a],
            &ChatSummary {
                members: 1,
                total_messages: 1,
                today_messages: 1,
            },
            today(),
        );
        assert!(text.contains("۱. "));
        assert!(text.contains("پیام‌های امروز: ۱"));
        assert_eq!(stats(&[], &ChatSummary::default(), today()), "هنوز آماری ثبت نشده.");
    }

    #[test]
    fn denial_messages_name_the_required_role() {
        assert!(denial(Denial::InsufficientRole {
            required: Role::Creator
        })
        .contains("سازنده گروه"));
    }
}
