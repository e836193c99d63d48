//! Wire-message handles consumed by the engine.
//!
//! A [`WireMessage`] is whatever the transport produced: a message parsed
//! from bytes ([`parsed::ParsedMessage`]), a fetch-session message carrying
//! server-computed metadata ([`fetched::FetchedMessage`]), optionally with
//! only an IMAP `BODYSTRUCTURE` summary ([`bodystructure::BodyStructure`]).
//! Every accessor may fail with [`WireError::Gone`] if the message vanished
//! from its store mid-read.

pub mod bodystructure;
pub mod fetched;
pub mod parsed;

use std::io;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::content_type::{ContentDisposition, ContentType};
use crate::model::flags::FlagSet;

use self::bodystructure::BodyStructure;

/// Errors raised by wire-message adapters.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WireError {
    /// The message was expunged or deleted from its store.
    #[error("message no longer exists")]
    Gone,

    /// The message (or one of its parts) could not be parsed.
    #[error("malformed message: {0}")]
    Malformed(String),

    /// Content did not have the shape its headers announced, e.g. a
    /// `multipart/*` part whose body is not a multipart body.
    #[error("unexpected content: {0}")]
    Cast(String),

    /// Reading the underlying bytes failed.
    #[error("I/O failure: {0}")]
    Io(String),

    /// The requested data was never fetched from the server.
    #[error("content not resident")]
    NotResident,
}

impl From<io::Error> for WireError {
    fn from(e: io::Error) -> Self {
        WireError::Io(e.to_string())
    }
}

/// One header as enumerated by the message: name and raw, undecoded value
/// (folding and encoded words intact).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawHeader {
    pub name: String,
    pub value: String,
}

impl RawHeader {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// The folder a message lives in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FolderRef {
    pub account_id: u32,
    pub fullname: String,
}

impl FolderRef {
    pub fn new(account_id: u32, fullname: impl Into<String>) -> Self {
        Self {
            account_id,
            fullname: fullname.into(),
        }
    }
}

/// Server-precomputed metadata from a fetch session.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchMetadata {
    pub uid: u64,
    pub folder: FolderRef,
    pub size: Option<u64>,
    pub flags: FlagSet,
    pub thread_level: u32,
    /// Attachment bit computed server-side (e.g. from a `BODYSTRUCTURE` scan).
    pub has_attachment: Option<bool>,
    pub received_date: Option<DateTime<Utc>>,
}

impl FetchMetadata {
    pub fn new(uid: u64, folder: FolderRef) -> Self {
        Self {
            uid,
            folder,
            size: None,
            flags: FlagSet::default(),
            thread_level: 0,
            has_attachment: None,
            received_date: None,
        }
    }
}

/// The structural view of one MIME part, shared by live parse trees and
/// `BODYSTRUCTURE` summaries so that tree walks are written once.
pub trait MimePart {
    fn content_type(&self) -> Result<ContentType, WireError>;

    fn disposition(&self) -> Result<Option<ContentDisposition>, WireError>;

    /// Child parts of a `multipart/*` part. Fails with [`WireError::Cast`]
    /// when a part announced as multipart has no readable multipart body.
    fn children(&self) -> Result<Vec<&dyn MimePart>, WireError>;
}

/// A message handle supplied by the transport.
///
/// Implementations may materialise their parse tree lazily and need not be
/// `Sync`; callers serialise access per instance.
pub trait WireMessage {
    /// Enumerate the top-level headers in wire order.
    fn header_entries(&self) -> Result<Vec<RawHeader>, WireError>;

    /// Serialize the message as RFC 822 bytes.
    fn write_to(&self, sink: &mut dyn io::Write) -> Result<(), WireError>;

    /// Root of the live MIME tree. [`WireError::NotResident`] when only
    /// server metadata is available.
    fn content(&self) -> Result<&dyn MimePart, WireError>;

    fn flags(&self) -> Result<FlagSet, WireError>;

    /// Size in bytes, if known.
    fn size(&self) -> Result<Option<u64>, WireError>;

    fn received_date(&self) -> Option<DateTime<Utc>> {
        self.fetch_metadata().and_then(|m| m.received_date)
    }

    fn body_structure(&self) -> Option<&BodyStructure> {
        None
    }

    fn fetch_metadata(&self) -> Option<&FetchMetadata> {
        None
    }

    /// Folder context, used to enrich not-found errors.
    fn folder(&self) -> Option<&FolderRef> {
        self.fetch_metadata().map(|m| &m.folder)
    }

    /// Mail identifier within [`WireMessage::folder`].
    fn mail_id(&self) -> Option<String> {
        self.fetch_metadata().map(|m| m.uid.to_string())
    }
}

/// Adapts an [`io::Write`] failure inside [`WireMessage::write_to`].
pub(crate) fn write_all(sink: &mut dyn io::Write, bytes: &[u8]) -> Result<(), WireError> {
    sink.write_all(bytes).map_err(WireError::from)
}
