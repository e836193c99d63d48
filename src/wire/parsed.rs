//! Messages parsed from raw RFC 822 bytes.
//!
//! `mail-parser` does the MIME work; its borrowed parse tree is converted
//! once into an owned [`ParsedPart`] tree the first time anything asks for
//! headers or content, and cached for the lifetime of the message.

use std::cell::OnceCell;
use std::io::{self, Read};

use chrono::{DateTime, Utc};
use mail_parser::{Message, MessageParser, MessagePart, MimeHeaders, PartType};

use super::{write_all, FolderRef, MimePart, RawHeader, WireError, WireMessage};
use crate::model::content_type::{ContentDisposition, ContentType};
use crate::model::flags::FlagSet;
use crate::parser::boundary::HeaderBoundaryScanner;
use crate::parser::encoded::decode_header_bytes;

/// Maximum depth for recursive multipart descent (adversarial input guard).
const MAX_DEPTH: usize = 10;

/// Content-Type parameters carried into the owned tree.
const CONTENT_TYPE_PARAMS: [&str; 6] = ["charset", "name", "boundary", "protocol", "micalg", "format"];

/// Content-Disposition parameters carried into the owned tree.
const DISPOSITION_PARAMS: [&str; 4] = ["filename", "size", "creation-date", "modification-date"];

#[derive(Debug)]
enum PartBody {
    Leaf,
    Multipart(Vec<ParsedPart>),
    Unreadable(WireError),
}

/// One node of a parsed MIME tree.
#[derive(Debug)]
pub struct ParsedPart {
    content_type: ContentType,
    disposition: Option<ContentDisposition>,
    body: PartBody,
}

impl MimePart for ParsedPart {
    fn content_type(&self) -> Result<ContentType, WireError> {
        Ok(self.content_type.clone())
    }

    fn disposition(&self) -> Result<Option<ContentDisposition>, WireError> {
        Ok(self.disposition.clone())
    }

    fn children(&self) -> Result<Vec<&dyn MimePart>, WireError> {
        match &self.body {
            PartBody::Multipart(parts) => Ok(parts.iter().map(|p| p as &dyn MimePart).collect()),
            PartBody::Unreadable(e) => Err(e.clone()),
            PartBody::Leaf if self.content_type.is_multipart() => Err(WireError::Cast(format!(
                "{} body is not multipart",
                self.content_type.base_type()
            ))),
            PartBody::Leaf => Ok(Vec::new()),
        }
    }
}

#[derive(Debug)]
struct Parsed {
    headers: Vec<RawHeader>,
    root: ParsedPart,
}

/// A message held as raw bytes, parsed lazily.
///
/// Not `Sync`: the parse tree is materialised on first access through a
/// [`OnceCell`].
#[derive(Debug)]
pub struct ParsedMessage {
    raw: Vec<u8>,
    flags: FlagSet,
    received_date: Option<DateTime<Utc>>,
    folder: Option<FolderRef>,
    mail_id: Option<String>,
    parsed: OnceCell<Result<Parsed, WireError>>,
}

impl ParsedMessage {
    /// Wrap raw message bytes. A leading mbox `From ` separator line is
    /// dropped.
    pub fn from_bytes(raw: impl Into<Vec<u8>>) -> Self {
        let mut raw = raw.into();
        let skip = mbox_separator_len(&raw);
        raw.drain(..skip);
        Self {
            raw,
            flags: FlagSet::default(),
            received_date: None,
            folder: None,
            mail_id: None,
            parsed: OnceCell::new(),
        }
    }

    pub fn from_reader<R: Read>(mut reader: R) -> io::Result<Self> {
        let mut raw = Vec::new();
        reader.read_to_end(&mut raw)?;
        Ok(Self::from_bytes(raw))
    }

    pub fn with_flags(mut self, flags: FlagSet) -> Self {
        self.flags = flags;
        self
    }

    pub fn with_received_date(mut self, date: DateTime<Utc>) -> Self {
        self.received_date = Some(date);
        self
    }

    /// Attach the store location, used to enrich not-found errors.
    pub fn with_location(mut self, folder: FolderRef, mail_id: impl Into<String>) -> Self {
        self.folder = Some(folder);
        self.mail_id = Some(mail_id.into());
        self
    }

    pub fn set_flags(&mut self, flags: FlagSet) {
        self.flags = flags;
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.raw
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.raw
    }

    /// Remove every occurrence of a top-level header, continuation lines
    /// included. Returns `true` if anything was removed.
    pub fn remove_header(&mut self, name: &str) -> bool {
        let mut scanner = HeaderBoundaryScanner::new();
        scanner.feed(&self.raw);
        let header_len = scanner.header_len().unwrap_or(self.raw.len());

        let mut out = Vec::with_capacity(self.raw.len());
        let mut removed = false;
        let mut skipping = false;
        for line in self.raw[..header_len].split_inclusive(|&b| b == b'\n') {
            if !matches!(line.first(), Some(b' ' | b'\t')) {
                skipping = header_name(line).is_some_and(|n| n.eq_ignore_ascii_case(name.as_bytes()));
                removed |= skipping;
            }
            if !skipping {
                out.extend_from_slice(line);
            }
        }
        if !removed {
            return false;
        }

        out.extend_from_slice(&self.raw[header_len..]);
        self.raw = out;
        self.parsed = OnceCell::new();
        true
    }

    fn parsed(&self) -> Result<&Parsed, WireError> {
        self.parsed
            .get_or_init(|| parse(&self.raw))
            .as_ref()
            .map_err(Clone::clone)
    }
}

impl WireMessage for ParsedMessage {
    fn header_entries(&self) -> Result<Vec<RawHeader>, WireError> {
        Ok(self.parsed()?.headers.clone())
    }

    fn write_to(&self, sink: &mut dyn io::Write) -> Result<(), WireError> {
        write_all(sink, &self.raw)
    }

    fn content(&self) -> Result<&dyn MimePart, WireError> {
        Ok(&self.parsed()?.root)
    }

    fn flags(&self) -> Result<FlagSet, WireError> {
        Ok(self.flags.clone())
    }

    fn size(&self) -> Result<Option<u64>, WireError> {
        Ok(Some(self.raw.len() as u64))
    }

    fn received_date(&self) -> Option<DateTime<Utc>> {
        self.received_date
    }

    fn folder(&self) -> Option<&FolderRef> {
        self.folder.as_ref()
    }

    fn mail_id(&self) -> Option<String> {
        self.mail_id.clone()
    }
}

fn parse(raw: &[u8]) -> Result<Parsed, WireError> {
    let message = MessageParser::default()
        .parse(raw)
        .ok_or_else(|| WireError::Malformed("not an RFC 822 message".into()))?;

    let headers = message
        .headers()
        .iter()
        .map(|h| {
            let value = raw
                .get(h.offset_start as usize..h.offset_end as usize)
                .map(decode_header_bytes)
                .unwrap_or_default();
            RawHeader::new(h.name.as_str(), value)
        })
        .collect();

    let root = build_part(&message, message.root_part(), 0);
    Ok(Parsed { headers, root })
}

fn build_part(message: &Message<'_>, part: &MessagePart<'_>, depth: usize) -> ParsedPart {
    let content_type = part
        .content_type()
        .map(|ct| {
            let mut out = ContentType::new(ct.ctype(), ct.subtype().unwrap_or("octet-stream"));
            for name in CONTENT_TYPE_PARAMS {
                if let Some(value) = ct.attribute(name) {
                    out.set_param(name, value);
                }
            }
            out
        })
        .unwrap_or_default();

    let disposition = part.content_disposition().map(|d| {
        DISPOSITION_PARAMS
            .iter()
            .filter_map(|name| d.attribute(name).map(|v| (*name, v)))
            .fold(ContentDisposition::new(d.ctype()), |acc, (k, v)| acc.with_param(k, v))
    });

    let body = match &part.body {
        PartType::Multipart(_) if depth >= MAX_DEPTH => PartBody::Unreadable(WireError::Malformed(
            format!("multipart nesting deeper than {MAX_DEPTH}"),
        )),
        PartType::Multipart(ids) => PartBody::Multipart(
            ids.iter()
                .filter_map(|id| message.parts.get(*id as usize))
                .map(|child| build_part(message, child, depth + 1))
                .collect(),
        ),
        _ => PartBody::Leaf,
    };

    ParsedPart {
        content_type,
        disposition,
        body,
    }
}

fn header_name(line: &[u8]) -> Option<&[u8]> {
    let colon = line.iter().position(|&b| b == b':')?;
    Some(line[..colon].trim_ascii())
}

/// Length of a leading mbox `From ` separator line (BOM included), or 0.
fn mbox_separator_len(data: &[u8]) -> usize {
    let bom = if data.starts_with(&[0xEF, 0xBB, 0xBF]) { 3 } else { 0 };
    if !data[bom..].starts_with(b"From ") {
        return 0;
    }
    match data[bom..].iter().position(|&b| b == b'\n') {
        Some(pos) => bom + pos + 1,
        None => 0,
    }
}
