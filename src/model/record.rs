//! The internal message record produced and consumed by conversion.

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::address::MailAddress;
use super::content_type::{ContentDisposition, ContentType};
use super::field::{FieldSet, MailField};
use super::flags::{AttachmentState, MailFlags};
use super::headers::HeaderCollection;

/// Message priority as carried by `X-Priority` (1 = highest … 5 = lowest).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Highest = 1,
    High = 2,
    #[default]
    Normal = 3,
    Low = 4,
    Lowest = 5,
}

impl Priority {
    /// Parse an `X-Priority` value such as `"1 (Highest)"` or `"2"`.
    pub fn from_x_priority(value: &str) -> Option<Self> {
        let digits: String = value
            .trim()
            .chars()
            .take_while(|c| c.is_ascii_digit())
            .collect();
        match digits.parse::<u32>().ok()? {
            1 => Some(Priority::Highest),
            2 => Some(Priority::High),
            3 => Some(Priority::Normal),
            4 => Some(Priority::Low),
            5 => Some(Priority::Lowest),
            _ => None,
        }
    }

    /// Parse an `Importance` value (`high`, `normal`, `low`).
    pub fn from_importance(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "high" => Some(Priority::High),
            "normal" | "medium" => Some(Priority::Normal),
            "low" => Some(Priority::Low),
            _ => None,
        }
    }

    /// `X-Priority` header value for outbound messages.
    pub fn x_priority(self) -> &'static str {
        match self {
            Priority::Highest => "1 (Highest)",
            Priority::High => "2 (High)",
            Priority::Normal => "3 (Normal)",
            Priority::Low => "4 (Low)",
            Priority::Lowest => "5 (Lowest)",
        }
    }

    /// `Importance` header value for outbound messages.
    pub fn importance(self) -> &'static str {
        match self {
            Priority::Highest | Priority::High => "high",
            Priority::Normal => "normal",
            Priority::Low | Priority::Lowest => "low",
        }
    }
}

/// A partially or fully populated message record.
///
/// Only fields whose [`MailField`] is in [`MailRecord::present`] carry
/// meaningful values; everything else holds its default. Callers check
/// [`MailRecord::contains`] before reading a field.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MailRecord {
    pub mail_id: Option<String>,
    pub folder_id: Option<String>,

    pub from: Vec<MailAddress>,
    pub to: Vec<MailAddress>,
    pub cc: Vec<MailAddress>,
    pub bcc: Vec<MailAddress>,
    pub reply_to: Vec<MailAddress>,
    pub subject: Option<String>,
    pub sent_date: Option<DateTime<Utc>>,
    pub received_date: Option<DateTime<Utc>>,

    pub content_type: Option<ContentType>,
    pub content_id: Option<String>,
    pub content_disposition: Option<ContentDisposition>,
    /// Size in bytes; `-1` when unknown.
    pub size: i64,
    pub has_attachment: bool,
    pub priority: Priority,
    pub thread_level: u32,
    pub disposition_notification_to: Option<MailAddress>,

    pub flags: MailFlags,
    /// Color label, `0` for none.
    pub color_label: u32,
    /// Unrecognised user flags. `None` when the message carried no user
    /// flags at all, `Some(vec![])` when every user flag was recognised.
    pub user_flags: Option<Vec<String>>,
    /// Has-attachment knowledge carried by (or destined for) marker flags.
    pub attachment_state: AttachmentState,

    /// Decoded header block, present only when headers were requested.
    pub headers: Option<HeaderCollection>,
    /// Raw (undecoded) values of explicitly captured headers.
    pub captured_headers: Option<HeaderCollection>,

    present: FieldSet,
}

impl MailRecord {
    pub fn new() -> Self {
        Self {
            size: -1,
            ..Self::default()
        }
    }

    pub fn contains(&self, field: MailField) -> bool {
        self.present.contains(field)
    }

    pub fn mark(&mut self, field: MailField) {
        self.present.insert(field);
    }

    /// The presence mask.
    pub fn present(&self) -> FieldSet {
        self.present
    }

    /// `true` if the message carried any user flag.
    pub fn has_user_flags(&self) -> bool {
        self.user_flags.is_some()
    }
}
