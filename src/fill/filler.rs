//! Field fillers.

use tracing::{debug, trace};

use super::FillContext;
use crate::attachment;
use crate::model::address::MailAddress;
use crate::model::content_type::{ContentDisposition, ContentType};
use crate::model::field::MailField;
use crate::model::flags::AttachmentState;
use crate::model::record::{MailRecord, Priority};
use crate::parser::date::parse_date;
use crate::wire::WireError;

/// Where identifiers come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdSource {
    /// Precomputed UID and folder fullname of a fetch session.
    Fetched,
    /// The injected [`FolderInfo`](super::FolderInfo) strategy.
    FolderInfo,
}

/// The strategy that fills one [`MailField`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Filler {
    MailId(IdSource),
    FolderId(IdSource),
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
}

impl Filler {
    /// The field this filler marks present.
    pub fn field(self) -> MailField {
        match self {
            Filler::MailId(_) => MailField::Id,
            Filler::FolderId(_) => MailField::FolderId,
            Filler::ContentType => MailField::ContentType,
            Filler::From => MailField::From,
            Filler::To => MailField::To,
            Filler::Cc => MailField::Cc,
            Filler::Bcc => MailField::Bcc,
            Filler::ReplyTo => MailField::ReplyTo,
            Filler::Subject => MailField::Subject,
            Filler::Size => MailField::Size,
            Filler::SentDate => MailField::SentDate,
            Filler::ReceivedDate => MailField::ReceivedDate,
            Filler::Flags => MailField::Flags,
            Filler::ThreadLevel => MailField::ThreadLevel,
            Filler::DispositionNotificationTo => MailField::DispositionNotificationTo,
            Filler::Priority => MailField::Priority,
            Filler::ColorLabel => MailField::ColorLabel,
            Filler::Headers => MailField::Headers,
            Filler::Attachment => MailField::Attachment,
        }
    }

    /// Whether this filler reads the header block.
    pub fn needs_headers(self) -> bool {
        matches!(
            self,
            Filler::ContentType
                | Filler::From
                | Filler::To
                | Filler::Cc
                | Filler::Bcc
                | Filler::ReplyTo
                | Filler::Subject
                | Filler::SentDate
                | Filler::DispositionNotificationTo
                | Filler::Priority
                | Filler::Headers
        )
    }

    /// Write this filler's field into `record` and mark it present. On error
    /// the field is left untouched.
    pub fn fill(self, ctx: &FillContext<'_>, record: &mut MailRecord) -> Result<(), WireError> {
        trace!(field = %self.field(), "Filling");
        let message = ctx.message();
        match self {
            Filler::MailId(IdSource::Fetched) => {
                record.mail_id = message.mail_id();
            }
            Filler::MailId(IdSource::FolderInfo) => {
                record.mail_id = ctx.folder_info().mail_id(message);
            }
            Filler::FolderId(IdSource::Fetched) => {
                record.folder_id = message.fetch_metadata().map(|m| m.folder.fullname.clone());
            }
            Filler::FolderId(IdSource::FolderInfo) => {
                record.folder_id = ctx.folder_info().folder_id(message);
            }
            Filler::ContentType => {
                let headers = ctx.headers()?;
                record.content_type = Some(
                    headers
                        .get("content-type")
                        .map(ContentType::parse)
                        .unwrap_or_default(),
                );
                record.content_id = headers
                    .get("content-id")
                    .map(|id| id.trim().trim_start_matches('<').trim_end_matches('>').to_string())
                    .filter(|id| !id.is_empty());
                record.content_disposition = headers.get("content-disposition").map(ContentDisposition::parse);
            }
            Filler::From => record.from = addresses(ctx, "from")?,
            Filler::To => record.to = addresses(ctx, "to")?,
            Filler::Cc => record.cc = addresses(ctx, "cc")?,
            Filler::Bcc => record.bcc = addresses(ctx, "bcc")?,
            Filler::ReplyTo => record.reply_to = addresses(ctx, "reply-to")?,
            Filler::Subject => {
                record.subject = ctx.header("subject")?.map(str::to_string);
            }
            Filler::Size => {
                record.size = size(ctx)?;
            }
            Filler::SentDate => {
                record.sent_date = ctx.header("date")?.and_then(parse_date);
            }
            Filler::ReceivedDate => {
                record.received_date = match message.received_date() {
                    Some(date) => Some(date),
                    // Parsed messages: the newest Received trace field.
                    None => ctx
                        .header("received")?
                        .and_then(|r| r.rsplit_once(';'))
                        .and_then(|(_, date)| parse_date(date)),
                };
            }
            Filler::Flags => {
                let decoded = ctx.decoded_flags()?;
                record.flags = decoded.flags;
                record.user_flags = decoded.user_flags.clone();
                if decoded.attachment != AttachmentState::Unknown {
                    record.attachment_state = decoded.attachment;
                }
            }
            Filler::ColorLabel => {
                record.color_label = ctx.decoded_flags()?.color_label;
            }
            Filler::ThreadLevel => {
                record.thread_level = message.fetch_metadata().map_or(0, |m| m.thread_level);
            }
            Filler::DispositionNotificationTo => {
                record.disposition_notification_to = ctx
                    .header("disposition-notification-to")?
                    .filter(|v| !v.trim().is_empty())
                    .map(MailAddress::parse);
            }
            Filler::Priority => {
                record.priority = priority(ctx)?;
            }
            Filler::Headers => {
                record.headers = Some(ctx.headers()?.clone());
            }
            Filler::Attachment => {
                record.has_attachment = has_attachment(ctx)?;
            }
        }
        record.mark(self.field());
        Ok(())
    }
}

fn addresses(ctx: &FillContext<'_>, name: &str) -> Result<Vec<MailAddress>, WireError> {
    Ok(ctx
        .header_joined(name)?
        .map(|v| MailAddress::parse_list(&v))
        .unwrap_or_default())
}

/// `Importance` first, then `X-Priority`, else normal.
fn priority(ctx: &FillContext<'_>) -> Result<Priority, WireError> {
    if let Some(p) = ctx.header("importance")?.and_then(Priority::from_importance) {
        return Ok(p);
    }
    Ok(ctx
        .header("x-priority")?
        .and_then(Priority::from_x_priority)
        .unwrap_or_default())
}

/// Known size, else estimated from the `BODYSTRUCTURE`, else `-1`.
fn size(ctx: &FillContext<'_>) -> Result<i64, WireError> {
    let message = ctx.message();
    if let Some(size) = message.size()? {
        return Ok(i64::try_from(size).unwrap_or(i64::MAX));
    }
    Ok(message
        .body_structure()
        .and_then(|bs| bs.estimated_size())
        .and_then(|s| i64::try_from(s).ok())
        .unwrap_or(-1))
}

/// Marker flags are a cheap override when the store maintains them. Flags
/// that cannot be read only skip the override.
fn has_attachment(ctx: &FillContext<'_>) -> Result<bool, WireError> {
    if ctx.caps().has_attachment_marker() {
        match ctx.decoded_flags() {
            Ok(decoded) => {
                if let Some(found) = decoded.attachment.as_bool() {
                    return Ok(found);
                }
            }
            Err(WireError::Gone) => return Err(WireError::Gone),
            Err(e) => debug!(error = %e, "Flags unreadable, resolving attachment from content"),
        }
    }
    attachment::has_attachment(ctx.message(), ctx.caps())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MailConfig;
    use crate::model::flags::{FlagSet, MailFlags, SystemFlag};
    use crate::wire::bodystructure::BodyStructure;
    use crate::wire::fetched::FetchedMessage;
    use crate::wire::parsed::ParsedMessage;
    use crate::wire::{FetchMetadata, FolderRef, MimePart, RawHeader, WireMessage};

    fn fill_one(filler: Filler, msg: &dyn WireMessage, caps: &MailConfig) -> MailRecord {
        let ctx = FillContext::new(msg, caps);
        let mut record = MailRecord::new();
        filler.fill(&ctx, &mut record).unwrap();
        assert!(record.contains(filler.field()));
        record
    }

    fn parsed(raw: &str) -> ParsedMessage {
        ParsedMessage::from_bytes(raw.as_bytes())
    }

    #[test]
    fn test_priority_importance_wins() {
        let caps = MailConfig::default();
        let msg = parsed("Importance: low\r\nX-Priority: 1 (Highest)\r\n\r\n");
        assert_eq!(fill_one(Filler::Priority, &msg, &caps).priority, Priority::Low);

        let msg = parsed("Importance: bogus\r\nX-Priority: 1 (Highest)\r\n\r\n");
        assert_eq!(fill_one(Filler::Priority, &msg, &caps).priority, Priority::Highest);

        let msg = parsed("Subject: none\r\n\r\n");
        assert_eq!(fill_one(Filler::Priority, &msg, &caps).priority, Priority::Normal);
    }

    #[test]
    fn test_addresses_across_repeated_headers() {
        let caps = MailConfig::default();
        let msg = parsed("To: \"Doe, Jane\" <jane@example.com>\r\nTo: bob@example.com\r\n\r\n");
        let record = fill_one(Filler::To, &msg, &caps);
        assert_eq!(
            record.to,
            vec![
                MailAddress::new("Doe, Jane", "jane@example.com"),
                MailAddress::new("", "bob@example.com"),
            ]
        );
    }

    #[test]
    fn test_missing_address_header_is_empty_but_present() {
        let caps = MailConfig::default();
        let record = fill_one(Filler::Cc, &parsed("Subject: x\r\n\r\n"), &caps);
        assert!(record.cc.is_empty());
    }

    #[test]
    fn test_content_type_fields() {
        let caps = MailConfig::default();
        let msg = parsed(
            "Content-Type: text/html; charset=\"utf-8\"\r\nContent-ID: <part1@x>\r\nContent-Disposition: inline\r\n\r\n",
        );
        let record = fill_one(Filler::ContentType, &msg, &caps);
        let ct = record.content_type.unwrap();
        assert_eq!(ct.base_type(), "text/html");
        assert_eq!(ct.param("charset"), Some("utf-8"));
        assert_eq!(record.content_id.as_deref(), Some("part1@x"));
        assert_eq!(record.content_disposition.map(|d| d.kind().to_string()).as_deref(), Some("inline"));
    }

    #[test]
    fn test_sent_and_received_dates() {
        let caps = MailConfig::default();
        let msg = parsed(
            "Received: from mx by host; Thu, 04 Jan 2024 10:05:00 +0000\r\nDate: Thu, 04 Jan 2024 10:00:00 +0000\r\n\r\n",
        );
        let sent = fill_one(Filler::SentDate, &msg, &caps).sent_date.unwrap();
        let received = fill_one(Filler::ReceivedDate, &msg, &caps).received_date.unwrap();
        assert_eq!((received - sent).num_minutes(), 5);
    }

    #[test]
    fn test_size_estimated_from_body_structure() {
        let caps = MailConfig::default();
        let summary = BodyStructure::multipart(
            "mixed",
            vec![
                BodyStructure::leaf("text", "plain").with_encoding("7bit", 100),
                BodyStructure::leaf("image", "png").with_encoding("base64", 400),
            ],
        );
        let msg = FetchedMessage::new(FetchMetadata::new(1, FolderRef::new(0, "INBOX"))).with_body_structure(summary);
        assert_eq!(fill_one(Filler::Size, &msg, &caps).size, 400);

        let bare = FetchedMessage::new(FetchMetadata::new(2, FolderRef::new(0, "INBOX")));
        assert_eq!(fill_one(Filler::Size, &bare, &caps).size, -1);
    }

    #[test]
    fn test_flags_and_color_label_share_decode() {
        let caps = MailConfig::default();
        let flags = FlagSet::new()
            .with_system(SystemFlag::Seen)
            .with_user("$cl_5")
            .with_user("$Forwarded")
            .with_user("todo");
        let msg = parsed("Subject: x\r\n\r\n").with_flags(flags);
        let ctx = FillContext::new(&msg, &caps);
        let mut record = MailRecord::new();
        Filler::Flags.fill(&ctx, &mut record).unwrap();
        Filler::ColorLabel.fill(&ctx, &mut record).unwrap();
        assert_eq!(record.flags, MailFlags::SEEN | MailFlags::FORWARDED);
        assert_eq!(record.color_label, 5);
        assert_eq!(record.user_flags, Some(vec!["todo".to_string()]));
    }

    #[test]
    fn test_attachment_marker_override() {
        let mut caps = MailConfig::default();
        caps.attachment_marker = true;
        let msg = parsed("Content-Type: text/plain\r\n\r\nhello").with_flags(FlagSet::new().with_user("$HasAttachment"));
        assert!(fill_one(Filler::Attachment, &msg, &caps).has_attachment);

        caps.attachment_marker = false;
        assert!(!fill_one(Filler::Attachment, &msg, &caps).has_attachment);
    }

    /// Parsed message whose flag store fails to answer.
    struct FlaglessMessage(ParsedMessage);

    impl WireMessage for FlaglessMessage {
        fn header_entries(&self) -> Result<Vec<RawHeader>, WireError> {
            self.0.header_entries()
        }

        fn write_to(&self, sink: &mut dyn std::io::Write) -> Result<(), WireError> {
            self.0.write_to(sink)
        }

        fn content(&self) -> Result<&dyn MimePart, WireError> {
            self.0.content()
        }

        fn flags(&self) -> Result<FlagSet, WireError> {
            Err(WireError::Io("flag store offline".into()))
        }

        fn size(&self) -> Result<Option<u64>, WireError> {
            self.0.size()
        }
    }

    #[test]
    fn test_unreadable_flags_fall_back_to_content() {
        let mut caps = MailConfig::default();
        caps.attachment_marker = true;
        let msg = FlaglessMessage(parsed(
            "MIME-Version: 1.0\r\nContent-Type: multipart/mixed; boundary=\"b\"\r\n\r\n\
--b\r\nContent-Type: text/plain\r\n\r\nhi\r\n\
--b\r\nContent-Type: application/pdf\r\nContent-Disposition: attachment; filename=\"a.pdf\"\r\n\r\n%PDF\r\n\
--b--\r\n",
        ));
        assert!(fill_one(Filler::Attachment, &msg, &caps).has_attachment);
    }

    #[test]
    fn test_fetched_ids() {
        let caps = MailConfig::default();
        let msg = FetchedMessage::new(FetchMetadata::new(77, FolderRef::new(1, "Sent")));
        assert_eq!(fill_one(Filler::MailId(IdSource::Fetched), &msg, &caps).mail_id.as_deref(), Some("77"));
        assert_eq!(
            fill_one(Filler::FolderId(IdSource::Fetched), &msg, &caps).folder_id.as_deref(),
            Some("Sent")
        );
    }

    #[test]
    fn test_gone_leaves_field_unset() {
        let caps = MailConfig::default();
        let msg = FetchedMessage::new(FetchMetadata::new(1, FolderRef::new(0, "INBOX")))
            .with_headers(&b"Subject: x\r\n\r\n"[..]);
        msg.mark_expunged();
        let ctx = FillContext::new(&msg, &caps);
        let mut record = MailRecord::new();
        assert_eq!(Filler::Subject.fill(&ctx, &mut record), Err(WireError::Gone));
        assert!(!record.contains(MailField::Subject));
        assert!(record.subject.is_none());
    }
}
