//! Messages backed by a fetch session.
//!
//! The server has already computed UID, size, flags, thread level and
//! possibly an attachment bit. Headers and body are only available if the
//! session fetched them; a `BODYSTRUCTURE` summary may stand in for the body.

use std::cell::Cell;
use std::io;

use super::bodystructure::BodyStructure;
use super::parsed::ParsedMessage;
use super::{FetchMetadata, MimePart, RawHeader, WireError, WireMessage};
use crate::model::flags::FlagSet;

#[derive(Debug)]
enum Resident {
    Nothing,
    Headers(ParsedMessage),
    Full(ParsedMessage),
}

/// A message handle from a fetch session.
#[derive(Debug)]
pub struct FetchedMessage {
    meta: FetchMetadata,
    resident: Resident,
    body_structure: Option<BodyStructure>,
    expunged: Cell<bool>,
}

impl FetchedMessage {
    pub fn new(meta: FetchMetadata) -> Self {
        Self {
            meta,
            resident: Resident::Nothing,
            body_structure: None,
            expunged: Cell::new(false),
        }
    }

    /// Only the header block was fetched (`BODY.PEEK[HEADER]`).
    pub fn with_headers(mut self, header_bytes: impl Into<Vec<u8>>) -> Self {
        self.resident = Resident::Headers(ParsedMessage::from_bytes(header_bytes));
        self
    }

    /// The full message was fetched (`BODY.PEEK[]`).
    pub fn with_body(mut self, raw: impl Into<Vec<u8>>) -> Self {
        self.resident = Resident::Full(ParsedMessage::from_bytes(raw));
        self
    }

    pub fn with_body_structure(mut self, body_structure: BodyStructure) -> Self {
        self.body_structure = Some(body_structure);
        self
    }

    /// Mark the message as expunged by another session. Every later access
    /// fails with [`WireError::Gone`].
    pub fn mark_expunged(&self) {
        self.expunged.set(true);
    }

    pub fn metadata(&self) -> &FetchMetadata {
        &self.meta
    }

    fn check(&self) -> Result<(), WireError> {
        if self.expunged.get() {
            Err(WireError::Gone)
        } else {
            Ok(())
        }
    }

    fn resident(&self) -> Option<&ParsedMessage> {
        match &self.resident {
            Resident::Nothing => None,
            Resident::Headers(msg) | Resident::Full(msg) => Some(msg),
        }
    }
}

impl WireMessage for FetchedMessage {
    fn header_entries(&self) -> Result<Vec<RawHeader>, WireError> {
        self.check()?;
        self.resident()
            .ok_or(WireError::NotResident)?
            .header_entries()
    }

    fn write_to(&self, sink: &mut dyn io::Write) -> Result<(), WireError> {
        self.check()?;
        self.resident().ok_or(WireError::NotResident)?.write_to(sink)
    }

    fn content(&self) -> Result<&dyn MimePart, WireError> {
        self.check()?;
        match &self.resident {
            Resident::Full(msg) => msg.content(),
            _ => Err(WireError::NotResident),
        }
    }

    fn flags(&self) -> Result<FlagSet, WireError> {
        self.check()?;
        Ok(self.meta.flags.clone())
    }

    fn size(&self) -> Result<Option<u64>, WireError> {
        self.check()?;
        match (&self.meta.size, &self.resident) {
            (Some(size), _) => Ok(Some(*size)),
            (None, Resident::Full(msg)) => msg.size(),
            _ => Ok(None),
        }
    }

    fn body_structure(&self) -> Option<&BodyStructure> {
        if self.expunged.get() {
            return None;
        }
        self.body_structure.as_ref()
    }

    fn fetch_metadata(&self) -> Option<&FetchMetadata> {
        Some(&self.meta)
    }
}
