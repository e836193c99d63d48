//! Protocol flag sets and the internal flag bitmask.

use std::collections::BTreeSet;

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

bitflags! {
    /// Internal flag bitmask: the protocol system flags plus the custom
    /// semantic flags carried as user flags on the wire.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct MailFlags: u32 {
        const ANSWERED = 1;
        const DELETED = 1 << 1;
        const DRAFT = 1 << 2;
        const FLAGGED = 1 << 3;
        const RECENT = 1 << 4;
        const SEEN = 1 << 5;
        /// The folder accepts arbitrary user flags.
        const USER = 1 << 6;
        const FORWARDED = 1 << 8;
        const READ_ACK = 1 << 9;
    }
}

/// A protocol-standard (system) flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SystemFlag {
    Answered,
    Deleted,
    Draft,
    Flagged,
    Recent,
    Seen,
    User,
}

impl SystemFlag {
    pub const ALL: [SystemFlag; 7] = [
        SystemFlag::Answered,
        SystemFlag::Deleted,
        SystemFlag::Draft,
        SystemFlag::Flagged,
        SystemFlag::Recent,
        SystemFlag::Seen,
        SystemFlag::User,
    ];

    /// The corresponding bit in [`MailFlags`].
    pub fn bit(self) -> MailFlags {
        match self {
            SystemFlag::Answered => MailFlags::ANSWERED,
            SystemFlag::Deleted => MailFlags::DELETED,
            SystemFlag::Draft => MailFlags::DRAFT,
            SystemFlag::Flagged => MailFlags::FLAGGED,
            SystemFlag::Recent => MailFlags::RECENT,
            SystemFlag::Seen => MailFlags::SEEN,
            SystemFlag::User => MailFlags::USER,
        }
    }

    /// IMAP wire token, e.g. `\Seen`. `User` is the `\*` permanent-flag token.
    pub fn imap_token(self) -> &'static str {
        match self {
            SystemFlag::Answered => "\\Answered",
            SystemFlag::Deleted => "\\Deleted",
            SystemFlag::Draft => "\\Draft",
            SystemFlag::Flagged => "\\Flagged",
            SystemFlag::Recent => "\\Recent",
            SystemFlag::Seen => "\\Seen",
            SystemFlag::User => "\\*",
        }
    }

    pub fn from_imap_token(token: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|f| f.imap_token().eq_ignore_ascii_case(token))
    }
}

/// System flags plus an open set of user flags, as carried by the protocol.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlagSet {
    pub system: BTreeSet<SystemFlag>,
    pub user: BTreeSet<String>,
}

impl FlagSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_system(mut self, flag: SystemFlag) -> Self {
        self.system.insert(flag);
        self
    }

    pub fn with_user(mut self, flag: impl Into<String>) -> Self {
        self.user.insert(flag.into());
        self
    }

    pub fn contains(&self, flag: SystemFlag) -> bool {
        self.system.contains(&flag)
    }

    pub fn is_empty(&self) -> bool {
        self.system.is_empty() && self.user.is_empty()
    }

    /// Build from IMAP `FLAGS` tokens. Anything that is not a backslash
    /// system flag becomes a user flag; unknown backslash tokens are dropped.
    pub fn from_imap<S: AsRef<str>>(tokens: &[S]) -> Self {
        let mut set = Self::new();
        for token in tokens {
            let token = token.as_ref().trim();
            if token.is_empty() {
                continue;
            }
            match SystemFlag::from_imap_token(token) {
                Some(flag) => {
                    set.system.insert(flag);
                }
                None if token.starts_with('\\') => {
                    tracing::debug!(token, "Ignoring unknown system flag");
                }
                None => {
                    set.user.insert(token.to_string());
                }
            }
        }
        set
    }

    /// Render as IMAP `FLAGS` tokens: system flags first, then user flags.
    pub fn to_imap(&self) -> Vec<String> {
        self.system
            .iter()
            .map(|f| f.imap_token().to_string())
            .chain(self.user.iter().cloned())
            .collect()
    }
}

/// Tri-state has-attachment knowledge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttachmentState {
    #[default]
    Unknown,
    Present,
    Absent,
}

impl AttachmentState {
    pub fn as_bool(self) -> Option<bool> {
        match self {
            AttachmentState::Unknown => None,
            AttachmentState::Present => Some(true),
            AttachmentState::Absent => Some(false),
        }
    }
}

impl From<bool> for AttachmentState {
    fn from(has: bool) -> Self {
        if has {
            AttachmentState::Present
        } else {
            AttachmentState::Absent
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_imap_tokens() {
        let set = FlagSet::from_imap(&["\\Seen", "\\flagged", "$Forwarded", "\\Bogus", ""]);
        assert!(set.contains(SystemFlag::Seen));
        assert!(set.contains(SystemFlag::Flagged));
        assert_eq!(set.user.len(), 1);
        assert!(set.user.contains("$Forwarded"));
    }

    #[test]
    fn test_to_imap_lists_system_first() {
        let set = FlagSet::new()
            .with_user("$label1")
            .with_system(SystemFlag::Answered);
        assert_eq!(set.to_imap(), vec!["\\Answered", "$label1"]);
    }

    #[test]
    fn test_attachment_state_from_bool() {
        assert_eq!(AttachmentState::from(true), AttachmentState::Present);
        assert_eq!(AttachmentState::from(false).as_bool(), Some(false));
        assert_eq!(AttachmentState::default().as_bool(), None);
    }
}
