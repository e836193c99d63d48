//! Per-field population of a [`MailRecord`](crate::model::record::MailRecord).
//!
//! [`registry::FillerRegistry`] resolves requested fields to [`Filler`]s;
//! each filler writes one field from a [`FillContext`], which shares the
//! header block and flag decode between fillers of the same call.

pub mod filler;
pub mod registry;

use std::cell::OnceCell;

pub use filler::{Filler, IdSource};
pub use registry::FillerRegistry;

use crate::config::Capabilities;
use crate::flags::{self, DecodedFlags};
use crate::model::headers::HeaderCollection;
use crate::parser::header::HeaderBlockLoader;
use crate::wire::{WireError, WireMessage};

/// Derives mail and folder identifiers for messages that do not carry them
/// from a fetch session.
pub trait FolderInfo {
    fn folder_id(&self, message: &dyn WireMessage) -> Option<String>;

    fn mail_id(&self, message: &dyn WireMessage) -> Option<String> {
        message.mail_id()
    }
}

/// A folder known up front, e.g. the source folder of an export.
#[derive(Debug, Clone)]
pub struct StaticFolder {
    folder_id: String,
}

impl StaticFolder {
    pub fn new(folder_id: impl Into<String>) -> Self {
        Self {
            folder_id: folder_id.into(),
        }
    }
}

impl FolderInfo for StaticFolder {
    fn folder_id(&self, _message: &dyn WireMessage) -> Option<String> {
        Some(self.folder_id.clone())
    }
}

/// Reads the folder from the message's own store location.
#[derive(Debug, Clone, Copy, Default)]
pub struct LiveFolder;

impl FolderInfo for LiveFolder {
    fn folder_id(&self, message: &dyn WireMessage) -> Option<String> {
        message.folder().map(|f| f.fullname.clone())
    }
}

/// Everything fillers read during one conversion call.
///
/// The header block and the flag decode are computed at most once and then
/// shared by every filler.
pub struct FillContext<'a> {
    message: &'a dyn WireMessage,
    caps: &'a dyn Capabilities,
    folder_info: &'a dyn FolderInfo,
    loader: HeaderBlockLoader,
    headers: OnceCell<HeaderCollection>,
    flags: OnceCell<DecodedFlags>,
}

impl<'a> FillContext<'a> {
    pub fn new(message: &'a dyn WireMessage, caps: &'a dyn Capabilities) -> Self {
        Self {
            message,
            caps,
            folder_info: &LiveFolder,
            loader: HeaderBlockLoader::default(),
            headers: OnceCell::new(),
            flags: OnceCell::new(),
        }
    }

    pub fn with_folder_info(mut self, folder_info: &'a dyn FolderInfo) -> Self {
        self.folder_info = folder_info;
        self
    }

    pub fn with_loader(mut self, loader: HeaderBlockLoader) -> Self {
        self.loader = loader;
        self
    }

    pub fn message(&self) -> &'a dyn WireMessage {
        self.message
    }

    pub fn caps(&self) -> &'a dyn Capabilities {
        self.caps
    }

    pub fn folder_info(&self) -> &'a dyn FolderInfo {
        self.folder_info
    }

    /// The decoded header block, loaded on first use.
    pub fn headers(&self) -> Result<&HeaderCollection, WireError> {
        if let Some(headers) = self.headers.get() {
            return Ok(headers);
        }
        let loaded = self.loader.load(self.message)?;
        Ok(self.headers.get_or_init(|| loaded))
    }

    pub fn header(&self, name: &str) -> Result<Option<&str>, WireError> {
        Ok(self.headers()?.get(name))
    }

    /// Every value of `name`, joined with `", "`; `None` if absent.
    pub fn header_joined(&self, name: &str) -> Result<Option<String>, WireError> {
        let values = self.headers()?.get_all(name);
        Ok((!values.is_empty()).then(|| values.join(", ")))
    }

    pub fn headers_loaded(&self) -> bool {
        self.headers.get().is_some()
    }

    /// The flag decode. Attachment markers are examined when the store
    /// maintains them.
    pub fn decoded_flags(&self) -> Result<&DecodedFlags, WireError> {
        if let Some(decoded) = self.flags.get() {
            return Ok(decoded);
        }
        let decoded = flags::decode(&self.message.flags()?, self.caps.has_attachment_marker());
        Ok(self.flags.get_or_init(|| decoded))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MailConfig;
    use crate::wire::parsed::ParsedMessage;
    use crate::wire::FolderRef;

    #[test]
    fn test_headers_loaded_once() {
        let msg = ParsedMessage::from_bytes(&b"To: a@b.c\r\nTo: d@e.f\r\n\r\nbody"[..]);
        let caps = MailConfig::default();
        let ctx = FillContext::new(&msg, &caps);
        assert!(!ctx.headers_loaded());
        assert_eq!(ctx.header_joined("to").unwrap().as_deref(), Some("a@b.c, d@e.f"));
        assert!(ctx.headers_loaded());
        assert_eq!(ctx.header("cc").unwrap(), None);
    }

    #[test]
    fn test_folder_strategies() {
        let msg = ParsedMessage::from_bytes(&b"Subject: x\r\n\r\n"[..])
            .with_location(FolderRef::new(3, "Archive/2024"), "991");
        assert_eq!(LiveFolder.folder_id(&msg).as_deref(), Some("Archive/2024"));
        assert_eq!(LiveFolder.mail_id(&msg).as_deref(), Some("991"));

        let fixed = StaticFolder::new("default0/INBOX");
        assert_eq!(fixed.folder_id(&msg).as_deref(), Some("default0/INBOX"));
    }
}
