//! Authorization cascade: bot owner > group creator > administrator > special > member.

use crate::domain::UserId;

/// Telegram-side membership status, as reported by `getChatMember`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MemberStatus {
    Creator,
    Administrator,
    Member,
    Restricted,
    Left,
    Banned,
}

/// Effective privilege level of a user inside one chat.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Role {
    Member,
    Special,
    Administrator,
    Creator,
    BotOwner,
}

impl Role {
    pub fn is_privileged(self) -> bool {
        self >= Role::Administrator
    }

    pub fn label_fa(self) -> &'static str {
        match self {
            Role::Member => "کاربر عادی",
            Role::Special => "کاربر ویژه",
            Role::Administrator => "ادمین",
            Role::Creator => "سازنده گروه",
            Role::BotOwner => "مالک ربات",
        }
    }
}

/// Everything that feeds into a role decision for one (chat, user) pair.
#[derive(Clone, Copy, Debug)]
pub struct RoleInputs {
    pub user_id: UserId,
    pub bot_owner: Option<UserId>,
    pub status: MemberStatus,
    pub is_special: bool,
}

pub fn resolve_role(inputs: RoleInputs) -> Role {
    if inputs.bot_owner == Some(inputs.user_id) {
        return Role::BotOwner;
    }
    match inputs.status {
        MemberStatus::Creator => Role::Creator,
        MemberStatus::Administrator => Role::Administrator,
        _ if inputs.is_special => Role::Special,
        _ => Role::Member,
    }
}

/// Moderation actions gated by the cascade.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Action {
    Ban,
    Unban,
    Warn,
    ClearWarnings,
    Mute,
    Unmute,
    Pin,
    Promote,
    SetSpecial,
    ClearSpecial,
    SetBotOwner,
    ConfigureChat,
    EditNotes,
}

impl Action {
    /// Actions that act against a member and must not hit privileged users.
    fn punishes_target(self) -> bool {
        matches!(self, Action::Ban | Action::Warn | Action::Mute)
    }
}

/// Why an action was refused.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Denial {
    /// The actor's role is below what the action needs.
    InsufficientRole { required: Role },
    /// The target is privileged (or outranks the actor).
    ProtectedTarget,
    /// Actor and target are the same user.
    SelfTarget,
}

impl std::fmt::Display for Denial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Denial::InsufficientRole { required } => write!(f, "requires {required:?}"),
            Denial::ProtectedTarget => f.write_str("target is protected"),
            Denial::SelfTarget => f.write_str("cannot target yourself"),
        }
    }
}

/// Minimal role needed to perform `action`.
pub fn required_role(action: Action, owner_is_set: bool) -> Role {
    match action {
        Action::Promote => Role::Creator,
        Action::SetBotOwner if owner_is_set => Role::BotOwner,
        Action::SetBotOwner => Role::Creator,
        _ => Role::Administrator,
    }
}

/// Check `actor` may perform `action`, optionally against `target`.
///
/// `target` carries the target's id and resolved role when the action is aimed
/// at a member.
pub fn authorize(
    action: Action,
    actor: (UserId, Role),
    target: Option<(UserId, Role)>,
    owner_is_set: bool,
) -> Result<(), Denial> {
    let required = required_role(action, owner_is_set);
    if actor.1 < required {
        return Err(Denial::InsufficientRole { required });
    }

    let Some((target_id, target_role)) = target else {
        return Ok(());
    };

    if target_id == actor.0 && action != Action::SetBotOwner {
        return Err(Denial::SelfTarget);
    }
    if action.punishes_target() && target_role.is_privileged() {
        return Err(Denial::ProtectedTarget);
    }
    // Everything else needs a strictly lower-ranked target; owner hand-over
    // may go to anyone.
    if !action.punishes_target() && action != Action::SetBotOwner && target_role >= actor.1 {
        return Err(Denial::ProtectedTarget);
    }
    Ok(())
}
