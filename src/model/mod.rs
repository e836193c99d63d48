//! Core data model: addresses, content types, fields, flags, headers and records.

pub mod address;
pub mod content_type;
pub mod field;
pub mod flags;
pub mod headers;
pub mod record;
