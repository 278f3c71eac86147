/// Telegram user id (numeric).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UserId(pub i64);

/// Telegram chat id (numeric).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChatId(pub i64);

/// Telegram message id (numeric).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MessageId(pub i32);

/// A stable reference to a Telegram message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MessageRef {
    pub chat_id: ChatId,
    pub message_id: MessageId,
}

/// Display fields of a Telegram user, refreshed on every recorded message.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct UserProfile {
    pub username: Option<String>,
    pub full_name: String,
}

impl UserProfile {
    pub fn new(username: Option<String>, full_name: impl Into<String>) -> Self {
        Self {
            username,
            full_name: full_name.into(),
        }
    }

    /// `@username` when present, otherwise the full name.
    pub fn display(&self) -> String {
        match &self.username {
            Some(u) if !u.is_empty() => format!("@{u}"),
            _ => self.full_name.clone(),
        }
    }
}
