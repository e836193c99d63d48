//! Wire message → [`MailRecord`].

use tracing::{trace, warn};

use crate::config::Capabilities;
use crate::error::{ConvertError, Result};
use crate::fill::{FillContext, Filler, FillerRegistry, FolderInfo, LiveFolder};
use crate::model::field::MailField;
use crate::model::flags::AttachmentState;
use crate::model::headers::HeaderCollection;
use crate::model::record::MailRecord;
use crate::parser::header::{unfold, HeaderBlockLoader, DEFAULT_MAX_HEADER_BYTES};
use crate::wire::parsed::ParsedMessage;
use crate::wire::{WireError, WireMessage};

/// Steps of one conversion call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConvertState {
    Start,
    /// Decide whether the header block is loaded up front.
    CloneOrReference,
    HeaderLoad,
    FieldFill,
    FlagApply,
    Done,
    /// The message disappeared mid-read. Terminal.
    Gone,
}

struct Progress {
    state: ConvertState,
}

impl Progress {
    fn new() -> Self {
        Self {
            state: ConvertState::Start,
        }
    }

    fn enter(&mut self, next: ConvertState) {
        trace!(from = ?self.state, to = ?next, "Conversion step");
        self.state = next;
    }
}

/// Converts wire messages into partially populated records.
pub struct MessageConverter<'a> {
    caps: &'a dyn Capabilities,
    folder_info: &'a dyn FolderInfo,
    max_header_bytes: usize,
}

impl<'a> MessageConverter<'a> {
    pub fn new(caps: &'a dyn Capabilities) -> Self {
        Self {
            caps,
            folder_info: &LiveFolder,
            max_header_bytes: DEFAULT_MAX_HEADER_BYTES,
        }
    }

    /// Identifier strategy for messages that are not from a fetch session.
    pub fn with_folder_info(mut self, folder_info: &'a dyn FolderInfo) -> Self {
        self.folder_info = folder_info;
        self
    }

    pub fn with_max_header_bytes(mut self, max_header_bytes: usize) -> Self {
        self.max_header_bytes = max_header_bytes;
        self
    }

    /// Populate exactly `fields` from `message`.
    pub fn convert(&self, message: &dyn WireMessage, fields: &[MailField]) -> Result<MailRecord> {
        self.convert_capturing::<&str>(message, fields, &[])
    }

    /// Like [`MessageConverter::convert`], also copying the raw values of
    /// the `capture` headers into [`MailRecord::captured_headers`].
    pub fn convert_capturing<S: AsRef<str>>(
        &self,
        message: &dyn WireMessage,
        fields: &[MailField],
        capture: &[S],
    ) -> Result<MailRecord> {
        let fillers = FillerRegistry::for_message(message).build_fillers(fields)?;

        let mut progress = Progress::new();
        let result = self.run(message, &fillers, capture, &mut progress);
        match result {
            Ok(record) => Ok(record),
            Err(WireError::Gone) => {
                progress.enter(ConvertState::Gone);
                Err(not_found(message))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Parse `bytes` and convert.
    pub fn convert_bytes(&self, bytes: &[u8], fields: &[MailField]) -> Result<MailRecord> {
        self.convert(&ParsedMessage::from_bytes(bytes), fields)
    }

    /// Convert each message independently; a failure is logged and reported
    /// for that message only.
    pub fn convert_batch<'m, I>(&self, messages: I, fields: &[MailField]) -> Vec<Result<MailRecord>>
    where
        I: IntoIterator<Item = &'m dyn WireMessage>,
    {
        messages
            .into_iter()
            .map(|message| {
                let result = self.convert(message, fields);
                if let Err(ref e) = result {
                    warn!(error = %e, mail_id = ?message.mail_id(), "Skipping message");
                }
                result
            })
            .collect()
    }

    fn run<S: AsRef<str>>(
        &self,
        message: &dyn WireMessage,
        fillers: &[Filler],
        capture: &[S],
        progress: &mut Progress,
    ) -> std::result::Result<MailRecord, WireError> {
        progress.enter(ConvertState::CloneOrReference);
        let ctx = FillContext::new(message, self.caps)
            .with_folder_info(self.folder_info)
            .with_loader(HeaderBlockLoader::new(self.max_header_bytes));
        let preload = fillers.iter().any(|f| f.needs_headers());

        progress.enter(ConvertState::HeaderLoad);
        if preload {
            ctx.headers()?;
        }

        progress.enter(ConvertState::FieldFill);
        let mut record = MailRecord::new();
        for filler in fillers {
            filler.fill(&ctx, &mut record)?;
        }
        if !capture.is_empty() {
            record.captured_headers = Some(capture_raw(message, capture)?);
        }

        progress.enter(ConvertState::FlagApply);
        if record.contains(MailField::Flags)
            && record.contains(MailField::Attachment)
            && record.attachment_state == AttachmentState::Unknown
        {
            record.attachment_state = AttachmentState::from(record.has_attachment);
        }

        progress.enter(ConvertState::Done);
        Ok(record)
    }
}

/// Raw (unfolded, undecoded) values of the named headers.
fn capture_raw<S: AsRef<str>>(
    message: &dyn WireMessage,
    names: &[S],
) -> std::result::Result<HeaderCollection, WireError> {
    let entries = match message.header_entries() {
        Ok(entries) => entries,
        Err(WireError::Gone) => return Err(WireError::Gone),
        Err(e) => {
            warn!(error = %e, "Cannot capture raw headers");
            return Ok(HeaderCollection::new());
        }
    };
    let mut captured = HeaderCollection::new();
    for entry in entries {
        if names.iter().any(|n| n.as_ref().eq_ignore_ascii_case(&entry.name)) {
            captured.add(&entry.name, unfold(&entry.value).trim());
        }
    }
    Ok(captured)
}

fn not_found(message: &dyn WireMessage) -> ConvertError {
    match (message.folder(), message.mail_id()) {
        (Some(folder), Some(mail_id)) => ConvertError::MailNotFound {
            folder: folder.fullname.clone(),
            mail_id,
        },
        _ => ConvertError::NotFound,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MailConfig;
    use crate::fill::StaticFolder;
    use crate::model::flags::FlagSet;
    use crate::wire::fetched::FetchedMessage;
    use crate::wire::{FetchMetadata, FolderRef};

    const SIMPLE: &[u8] = b"From: Alice <alice@example.com>\r\n\
To: bob@example.com\r\n\
Subject: Lunch\r\n\
Date: Thu, 04 Jan 2024 10:00:00 +0000\r\n\
X-Mailer: test\r\n\
\r\n\
Noon?\r\n";

    #[test]
    fn test_presence_equals_request() {
        let caps = MailConfig::default();
        let converter = MessageConverter::new(&caps);
        let fields = [MailField::Subject, MailField::From, MailField::Body];
        let record = converter.convert_bytes(SIMPLE, &fields).unwrap();
        let present: Vec<_> = record.present().iter().collect();
        assert_eq!(present, vec![MailField::From, MailField::Subject]);
        assert_eq!(record.subject.as_deref(), Some("Lunch"));
        assert!(record.headers.is_none());
    }

    #[test]
    fn test_idempotent() {
        let caps = MailConfig::default();
        let converter = MessageConverter::new(&caps);
        let msg = ParsedMessage::from_bytes(SIMPLE);
        let first = converter.convert(&msg, &[MailField::All]).unwrap();
        let second = converter.convert(&msg, &[MailField::All]).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_gone_surfaces_only_when_read() {
        let caps = MailConfig::default();
        let converter = MessageConverter::new(&caps);
        let msg = FetchedMessage::new(FetchMetadata::new(1, FolderRef::new(0, "INBOX")));
        msg.mark_expunged();
        let fields: Vec<MailField> = crate::model::field::fields_from_names(&["subject"]).unwrap();
        assert!(converter.convert(&msg, &[]).is_ok());
        assert!(converter.convert(&msg, &fields).unwrap_err().is_not_found());
    }

    #[test]
    fn test_gone_enriched_with_location() {
        let caps = MailConfig::default();
        let converter = MessageConverter::new(&caps);
        let msg = FetchedMessage::new(FetchMetadata::new(42, FolderRef::new(0, "INBOX")))
            .with_headers(&b"Subject: x\r\n\r\n"[..]);
        msg.mark_expunged();
        let err = converter.convert(&msg, &[MailField::Subject]).unwrap_err();
        assert!(matches!(
            err,
            ConvertError::MailNotFound { ref folder, ref mail_id } if folder == "INBOX" && mail_id == "42"
        ));
    }

    #[test]
    fn test_capture_raw_headers() {
        let caps = MailConfig::default();
        let converter = MessageConverter::new(&caps);
        let msg = ParsedMessage::from_bytes(
            &b"Subject: =?UTF-8?B?SG9sYQ==?=\r\nX-Spam-Score: 1.5\r\n\r\n"[..],
        );
        let record = converter
            .convert_capturing(&msg, &[MailField::Subject], &["subject", "x-spam-score"])
            .unwrap();
        let captured = record.captured_headers.unwrap();
        assert_eq!(captured.get("subject"), Some("=?UTF-8?B?SG9sYQ==?="));
        assert_eq!(captured.get("X-Spam-Score"), Some("1.5"));
        assert_eq!(record.subject.as_deref(), Some("Hola"));
    }

    #[test]
    fn test_flag_apply_records_computed_attachment() {
        let caps = MailConfig::default();
        let converter = MessageConverter::new(&caps);
        let msg = ParsedMessage::from_bytes(SIMPLE).with_flags(FlagSet::new().with_user("x"));
        let record = converter
            .convert(&msg, &[MailField::Flags, MailField::Attachment])
            .unwrap();
        assert!(!record.has_attachment);
        assert_eq!(record.attachment_state, AttachmentState::Absent);
    }

    #[test]
    fn test_static_folder_ids() {
        let caps = MailConfig::default();
        let folder = StaticFolder::new("default0/Archive");
        let converter = MessageConverter::new(&caps).with_folder_info(&folder);
        let record = converter.convert_bytes(SIMPLE, &[MailField::FolderId]).unwrap();
        assert_eq!(record.folder_id.as_deref(), Some("default0/Archive"));
    }

    #[test]
    fn test_batch_isolates_failures() {
        let caps = MailConfig::default();
        let converter = MessageConverter::new(&caps);
        let good = ParsedMessage::from_bytes(SIMPLE);
        let gone = FetchedMessage::new(FetchMetadata::new(9, FolderRef::new(0, "INBOX")));
        gone.mark_expunged();
        let messages: Vec<&dyn WireMessage> = vec![&good, &gone, &good];
        let results = converter.convert_batch(messages, &[MailField::Subject, MailField::Size]);
        assert_eq!(results.len(), 3);
        assert!(results[0].is_ok());
        assert!(results[1].as_ref().unwrap_err().is_not_found());
        assert!(results[2].is_ok());
    }
}
