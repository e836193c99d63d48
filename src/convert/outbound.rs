//! [`ComposedMessage`] → wire message.

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::error::{ConvertError, Result};
use crate::flags::DecodedFlags;
use crate::model::address::MailAddress;
use crate::model::content_type::ContentType;
use crate::model::flags::{AttachmentState, FlagSet, MailFlags};
use crate::model::headers::HeaderCollection;
use crate::model::record::{MailRecord, Priority};
use crate::parser::encoded::encode_header_text;
use crate::parser::header::ORIGINAL_HEADERS;
use crate::wire::parsed::ParsedMessage;

static MESSAGE_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Headers written from [`ComposedMessage`] fields. Extra headers with these
/// names are ignored.
const MANAGED_HEADERS: &[&str] = &[
    "date",
    "from",
    "reply-to",
    "to",
    "cc",
    "bcc",
    "subject",
    "mime-version",
    "content-type",
    "content-transfer-encoding",
    "x-priority",
    "importance",
    "disposition-notification-to",
    "user-agent",
];

/// A message being composed by the caller.
#[derive(Debug, Clone, Default)]
pub struct ComposedMessage {
    pub from: Option<MailAddress>,
    pub to: Vec<MailAddress>,
    pub cc: Vec<MailAddress>,
    pub bcc: Vec<MailAddress>,
    pub reply_to: Vec<MailAddress>,
    pub subject: Option<String>,
    pub sent_date: Option<DateTime<Utc>>,
    pub priority: Priority,
    pub disposition_notification_to: Option<MailAddress>,
    pub flags: MailFlags,
    pub color_label: u32,
    pub user_flags: Vec<String>,
    pub attachment_state: AttachmentState,
    /// Overrides the Content-Type produced by the body filler.
    pub content_type: Option<String>,
    /// Additional headers, written after the standard ones.
    pub headers: HeaderCollection,
    pub text: String,
}

impl ComposedMessage {
    /// Seed a composition from a converted record, e.g. to re-store an
    /// edited draft.
    pub fn from_record(record: &MailRecord) -> Self {
        Self {
            from: record.from.first().cloned(),
            to: record.to.clone(),
            cc: record.cc.clone(),
            bcc: record.bcc.clone(),
            reply_to: record.reply_to.clone(),
            subject: record.subject.clone(),
            sent_date: record.sent_date,
            priority: record.priority,
            disposition_notification_to: record.disposition_notification_to.clone(),
            flags: record.flags,
            color_label: record.color_label,
            user_flags: record.user_flags.clone().unwrap_or_default(),
            attachment_state: record.attachment_state,
            content_type: record.content_type.as_ref().map(ToString::to_string),
            headers: HeaderCollection::new(),
            text: String::new(),
        }
    }
}

/// Options for [`compose`].
#[derive(Debug, Clone)]
pub struct ComposeParams {
    /// Right-hand side of generated `Message-ID`s.
    pub host_name: String,
    /// Overrides both the composed sent date and the current time.
    pub date: Option<DateTime<Utc>>,
    /// Write a `Bcc` header (only for messages stored locally, never sent).
    pub keep_bcc: bool,
    pub user_agent: Option<String>,
}

impl Default for ComposeParams {
    fn default() -> Self {
        Self {
            host_name: "localhost".to_string(),
            date: None,
            keep_bcc: false,
            user_agent: Some(concat!("mailconv/", env!("CARGO_PKG_VERSION")).to_string()),
        }
    }
}

/// A rendered message body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Body {
    pub content_type: String,
    pub transfer_encoding: String,
    pub content: Vec<u8>,
}

/// Produces the body of an outbound message.
pub trait BodyFiller {
    fn fill_body(&self, message: &ComposedMessage) -> Result<Body>;
}

/// Single `text/plain` part from [`ComposedMessage::text`].
#[derive(Debug, Clone, Copy, Default)]
pub struct TextBody;

impl BodyFiller for TextBody {
    fn fill_body(&self, message: &ComposedMessage) -> Result<Body> {
        let (charset, encoding) = if message.text.is_ascii() {
            ("us-ascii", "7bit")
        } else {
            ("utf-8", "8bit")
        };
        let mut content = String::with_capacity(message.text.len() + 2);
        for line in message.text.lines() {
            content.push_str(line);
            content.push_str("\r\n");
        }
        Ok(Body {
            content_type: format!("text/plain; charset={charset}"),
            transfer_encoding: encoding.to_string(),
            content: content.into_bytes(),
        })
    }
}

/// A composed message ready to be committed to a store.
#[derive(Debug, Clone)]
pub struct OutboundMessage {
    headers: Vec<(String, String)>,
    body: Vec<u8>,
    flags: FlagSet,
}

impl OutboundMessage {
    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    /// First value of `name`, case-insensitive.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Replace the first `name` header, or append it.
    pub fn set_header(&mut self, name: &str, value: impl Into<String>) {
        let value = value.into();
        match self.headers.iter_mut().find(|(n, _)| n.eq_ignore_ascii_case(name)) {
            Some(entry) => entry.1 = value,
            None => self.headers.push((name.to_string(), value)),
        }
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub fn flags(&self) -> &FlagSet {
        &self.flags
    }

    /// RFC 5322 wire form with CRLF line endings.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.body.len() + 64 * self.headers.len());
        for (name, value) in &self.headers {
            out.extend_from_slice(name.as_bytes());
            out.extend_from_slice(b": ");
            out.extend_from_slice(value.as_bytes());
            out.extend_from_slice(b"\r\n");
        }
        out.extend_from_slice(b"\r\n");
        out.extend_from_slice(&self.body);
        out
    }

    /// Commit to a stored message. A Content-Type the strict parser rejects
    /// is rewritten once and the commit retried; a second failure is
    /// returned.
    pub fn save(mut self) -> Result<ParsedMessage> {
        match self.commit() {
            Err(ConvertError::ContentType(reason)) => {
                warn!(%reason, "Sanitizing Content-Type and retrying");
                if let Some(value) = self.header("content-type") {
                    let cleaned = ContentType::sanitize(value);
                    self.set_header("Content-Type", cleaned);
                }
                self.commit()
            }
            other => other,
        }
    }

    fn commit(&self) -> Result<ParsedMessage> {
        if let Some(value) = self.header("content-type") {
            ContentType::parse_strict(value).map_err(|e| ConvertError::ContentType(e.to_string()))?;
        }
        let mut message = ParsedMessage::from_bytes(self.to_bytes()).with_flags(self.flags.clone());
        if message.remove_header(ORIGINAL_HEADERS) {
            debug!("Dropped {ORIGINAL_HEADERS} header");
        }
        Ok(message)
    }
}

/// Render `message` into an [`OutboundMessage`]. The body comes from
/// `body_filler`; the flags are the protocol encoding of the composed flags,
/// color label, user flags and attachment state.
///
/// Header text containing CR or LF is a [`ConvertError::Compose`] error, as
/// is an extra header whose name is not a valid field name.
pub fn compose(
    message: &ComposedMessage,
    params: &ComposeParams,
    body_filler: &dyn BodyFiller,
) -> Result<OutboundMessage> {
    let from = message
        .from
        .as_ref()
        .filter(|a| !a.address.is_empty())
        .ok_or_else(|| ConvertError::Compose("missing From address".to_string()))?;
    check_fields(message, params)?;
    let body = body_filler.fill_body(message)?;

    let mut headers: Vec<(String, String)> = Vec::new();
    let date = params.date.or(message.sent_date).unwrap_or_else(Utc::now);
    headers.push(("Date".into(), date.to_rfc2822()));
    headers.push(("From".into(), format_address(from)));
    push_addresses(&mut headers, "Reply-To", &message.reply_to);
    push_addresses(&mut headers, "To", &message.to);
    push_addresses(&mut headers, "Cc", &message.cc);
    if params.keep_bcc {
        push_addresses(&mut headers, "Bcc", &message.bcc);
    }
    if let Some(subject) = &message.subject {
        headers.push(("Subject".into(), encode_header_text(subject)));
    }
    if !message.headers.contains("message-id") {
        headers.push(("Message-ID".into(), message_id(&params.host_name)));
    }
    if message.priority != Priority::Normal {
        headers.push(("X-Priority".into(), message.priority.x_priority().to_string()));
        headers.push(("Importance".into(), message.priority.importance().to_string()));
    }
    if let Some(notify) = &message.disposition_notification_to {
        headers.push(("Disposition-Notification-To".into(), format_address(notify)));
    }
    if let Some(agent) = &params.user_agent {
        headers.push(("User-Agent".into(), agent.clone()));
    }

    for (name, value) in message.headers.iter() {
        if MANAGED_HEADERS.iter().any(|m| m.eq_ignore_ascii_case(name)) {
            debug!(header = name, "Ignoring extra header written from message fields");
            continue;
        }
        headers.push((name.to_string(), encode_header_text(value)));
    }

    headers.push(("MIME-Version".into(), "1.0".into()));
    let content_type = message.content_type.clone().unwrap_or(body.content_type);
    headers.push(("Content-Type".into(), content_type));
    headers.push(("Content-Transfer-Encoding".into(), body.transfer_encoding));

    let flags = DecodedFlags {
        flags: message.flags,
        color_label: message.color_label,
        user_flags: Some(message.user_flags.clone()),
        attachment: message.attachment_state,
        spellings: Vec::new(),
    }
    .to_flag_set();

    Ok(OutboundMessage {
        headers,
        body: body.content,
        flags,
    })
}

/// Everything that ends up on a header line.
fn check_fields(message: &ComposedMessage, params: &ComposeParams) -> Result<()> {
    let addresses = message
        .from
        .iter()
        .chain(&message.reply_to)
        .chain(&message.to)
        .chain(&message.cc)
        .chain(&message.bcc)
        .chain(&message.disposition_notification_to);
    for address in addresses {
        check_line("address", &address.personal)?;
        check_line("address", &address.address)?;
    }
    if let Some(subject) = &message.subject {
        check_line("Subject", subject)?;
    }
    if let Some(content_type) = &message.content_type {
        check_line("Content-Type", content_type)?;
    }
    if let Some(agent) = &params.user_agent {
        check_line("User-Agent", agent)?;
    }
    check_line("host name", &params.host_name)?;

    for (name, value) in message.headers.iter() {
        let valid_name = !name.is_empty()
            && name.bytes().all(|b| b.is_ascii_graphic() && b != b':');
        if !valid_name {
            return Err(ConvertError::Compose(format!("invalid header name {name:?}")));
        }
        check_line(name, value)?;
    }
    Ok(())
}

fn check_line(what: &str, value: &str) -> Result<()> {
    if value.contains(['\r', '\n']) {
        return Err(ConvertError::Compose(format!("line break in {what}")));
    }
    Ok(())
}

fn push_addresses(headers: &mut Vec<(String, String)>, name: &str, addresses: &[MailAddress]) {
    if addresses.is_empty() {
        return;
    }
    let value = addresses
        .iter()
        .map(format_address)
        .collect::<Vec<_>>()
        .join(", ");
    headers.push((name.to_string(), value));
}

/// `address`, `Personal <address>`, `"Quoted, Personal" <address>` or an
/// encoded word for non-ASCII names.
fn format_address(address: &MailAddress) -> String {
    let personal = address.personal.trim();
    if personal.is_empty() {
        return address.address.clone();
    }
    let name = if !personal.is_ascii() {
        encode_header_text(personal)
    } else if personal.chars().any(|c| "()<>[]:;@\\,.\"".contains(c)) {
        format!("\"{}\"", personal.replace('\\', "\\\\").replace('"', "\\\""))
    } else {
        personal.to_string()
    };
    format!("{name} <{}>", address.address)
}

fn message_id(host_name: &str) -> String {
    let counter = MESSAGE_COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("<{}.{counter}@{host_name}>", Utc::now().timestamp_millis())
}
