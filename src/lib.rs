//! `mailconv`: MIME field-mapping and attachment-detection engine.
//!
//! Converts wire-format messages (raw RFC 822 bytes, fetch-session messages
//! carrying server metadata, or IMAP `BODYSTRUCTURE` summaries) into
//! partially populated [`model::record::MailRecord`]s, and composed records
//! back into wire messages.

pub mod attachment;
pub mod config;
pub mod convert;
pub mod error;
pub mod fill;
pub mod flags;
pub mod model;
pub mod parser;
pub mod wire;
