//! Byte- and text-level parsing: header boundaries, header blocks, encoded
//! words and dates.

pub mod boundary;
pub mod date;
pub mod encoded;
pub mod header;
