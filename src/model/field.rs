//! Logical mail fields a caller may request, and presence sets over them.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ConvertError;

/// A logical field of a [`MailRecord`](super::record::MailRecord).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MailField {
    Id,
    FolderId,
    ContentType,
    From,
    To,
    Cc,
    Bcc,
    ReplyTo,
    Subject,
    Size,
    SentDate,
    ReceivedDate,
    Flags,
    ThreadLevel,
    DispositionNotificationTo,
    Priority,
    ColorLabel,
    Headers,
    Attachment,
    /// Message body; produced by the caller, never by a filler.
    Body,
    /// The full message; produced by the caller, never by a filler.
    Full,
    /// Account display name; produced by the caller, never by a filler.
    AccountName,
    /// Sentinel expanding to [`MailField::CANONICAL`].
    All,
}

impl MailField {
    /// The fields `All` expands to: everything a filler can produce.
    pub const CANONICAL: [MailField; 19] = [
        MailField::Id,
        MailField::FolderId,
        MailField::ContentType,
        MailField::From,
        MailField::To,
        MailField::Cc,
        MailField::Bcc,
        MailField::ReplyTo,
        MailField::Subject,
        MailField::Size,
        MailField::SentDate,
        MailField::ReceivedDate,
        MailField::Flags,
        MailField::ThreadLevel,
        MailField::DispositionNotificationTo,
        MailField::Priority,
        MailField::ColorLabel,
        MailField::Headers,
        MailField::Attachment,
    ];

    /// Fields the caller fills itself; fillers skip them without error.
    pub fn is_caller_filled(self) -> bool {
        matches!(self, MailField::Body | MailField::Full | MailField::AccountName)
    }

    pub fn name(self) -> &'static str {
        match self {
            MailField::Id => "id",
            MailField::FolderId => "folder_id",
            MailField::ContentType => "content_type",
            MailField::From => "from",
            MailField::To => "to",
            MailField::Cc => "cc",
            MailField::Bcc => "bcc",
            MailField::ReplyTo => "reply_to",
            MailField::Subject => "subject",
            MailField::Size => "size",
            MailField::SentDate => "sent_date",
            MailField::ReceivedDate => "received_date",
            MailField::Flags => "flags",
            MailField::ThreadLevel => "thread_level",
            MailField::DispositionNotificationTo => "disposition_notification_to",
            MailField::Priority => "priority",
            MailField::ColorLabel => "color_label",
            MailField::Headers => "headers",
            MailField::Attachment => "attachment",
            MailField::Body => "body",
            MailField::Full => "full",
            MailField::AccountName => "account_name",
            MailField::All => "all",
        }
    }

    fn bit(self) -> u32 {
        1 << (self as u32)
    }
}

impl fmt::Display for MailField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for MailField {
    type Err = ConvertError;

    /// Accepts the snake-case names plus `-` separated and upper-case forms.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('-', "_");
        Self::CANONICAL
            .iter()
            .chain(&[MailField::Body, MailField::Full, MailField::AccountName, MailField::All])
            .copied()
            .find(|f| f.name() == normalized)
            .ok_or_else(|| ConvertError::InvalidField(s.trim().to_string()))
    }
}

/// Parse a list of field names, failing on the first unknown one.
pub fn fields_from_names<S: AsRef<str>>(names: &[S]) -> Result<Vec<MailField>, ConvertError> {
    names.iter().map(|n| n.as_ref().parse()).collect()
}

/// A set of [`MailField`]s, used as the per-record presence mask.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct FieldSet(u32);

impl FieldSet {
    pub const fn empty() -> Self {
        Self(0)
    }

    pub fn insert(&mut self, field: MailField) {
        self.0 |= field.bit();
    }

    pub fn remove(&mut self, field: MailField) {
        self.0 &= !field.bit();
    }

    pub fn contains(&self, field: MailField) -> bool {
        self.0 & field.bit() != 0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn len(&self) -> usize {
        self.0.count_ones() as usize
    }

    /// Members in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = MailField> + '_ {
        MailField::CANONICAL
            .into_iter()
            .chain([MailField::Body, MailField::Full, MailField::AccountName, MailField::All])
            .filter(move |f| self.contains(*f))
    }
}

impl FromIterator<MailField> for FieldSet {
    fn from_iter<I: IntoIterator<Item = MailField>>(iter: I) -> Self {
        let mut set = Self::empty();
        for field in iter {
            set.insert(field);
        }
        set
    }
}

impl Serialize for FieldSet {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.iter())
    }
}
