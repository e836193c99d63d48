//! Header block loading: structured enumeration with a byte-level fallback.
//!
//! The structured path walks the message's own header enumeration. If that
//! fails for any reason other than the message being gone, the message is
//! re-serialized through a [`HeaderBoundaryScanner`] and the bounded header
//! text is parsed line by line.

use std::io::Read;

use lazy_static::lazy_static;
use regex::Regex;
use tracing::{debug, warn};

use crate::error::Result;
use crate::model::headers::HeaderCollection;
use crate::parser::boundary::HeaderBoundaryScanner;
use crate::parser::encoded::{decode_encoded_words, decode_header_bytes};
use crate::wire::{WireError, WireMessage};

/// Default bound on bytes scanned by the fallback parser.
pub const DEFAULT_MAX_HEADER_BYTES: usize = 256 * 1024;

/// Internal bookkeeping header, never surfaced.
pub const ORIGINAL_HEADERS: &str = "x-original-headers";

lazy_static! {
    static ref RX_FOLD: Regex = Regex::new(r"\r?\n[ \t]+").unwrap();
    static ref RX_HEADER_LINE: Regex =
        Regex::new(r"(?m)^([^:\s]+):[ \t]*(.*?)[ \t]*\r?$").unwrap();
}

/// Loads a message's header block into a [`HeaderCollection`].
#[derive(Debug, Clone, Copy)]
pub struct HeaderBlockLoader {
    max_header_bytes: usize,
}

impl Default for HeaderBlockLoader {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_HEADER_BYTES)
    }
}

impl HeaderBlockLoader {
    pub fn new(max_header_bytes: usize) -> Self {
        Self { max_header_bytes }
    }

    /// Load the headers of `message`.
    ///
    /// Only [`WireError::Gone`] is returned as an error. Any other failure
    /// switches to the fallback parser, and a failing fallback yields an
    /// empty collection.
    pub fn load(&self, message: &dyn WireMessage) -> std::result::Result<HeaderCollection, WireError> {
        match message.header_entries() {
            Ok(entries) => {
                let mut headers = HeaderCollection::new();
                for entry in entries {
                    if entry.name.eq_ignore_ascii_case(ORIGINAL_HEADERS) {
                        continue;
                    }
                    headers.add(&entry.name, decode_value(&entry.value));
                }
                Ok(headers)
            }
            Err(WireError::Gone) => Err(WireError::Gone),
            Err(e) => {
                debug!(error = %e, "Structured header read failed, using fallback parser");
                self.load_fallback(message)
            }
        }
    }

    fn load_fallback(&self, message: &dyn WireMessage) -> std::result::Result<HeaderCollection, WireError> {
        let mut scanner = HeaderBoundaryScanner::with_limit(self.max_header_bytes);
        match message.write_to(&mut scanner) {
            Ok(()) => Ok(parse_header_text(&decode_header_bytes(scanner.header_bytes()))),
            Err(WireError::Gone) => Err(WireError::Gone),
            Err(e) => {
                warn!(error = %e, "Fallback header parse failed, continuing without headers");
                Ok(HeaderCollection::new())
            }
        }
    }
}

/// Parse the header block at the start of `bytes`.
///
/// Scanning stops at the first blank line; without one, all of `bytes` is
/// treated as header text.
pub fn load_headers(bytes: &[u8]) -> HeaderCollection {
    let mut scanner = HeaderBoundaryScanner::new();
    scanner.feed(bytes);
    parse_header_text(&decode_header_bytes(scanner.header_bytes()))
}

/// Parse the header block from a stream, reading no further than the blank
/// line that ends it.
pub fn load_headers_from_reader<R: Read>(mut reader: R) -> Result<HeaderCollection> {
    let mut scanner = HeaderBoundaryScanner::new();
    let mut buf = [0u8; 8192];
    while !scanner.is_complete() {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        scanner.feed(&buf[..n]);
    }
    Ok(parse_header_text(&decode_header_bytes(scanner.header_bytes())))
}

/// Line-oriented parse of unfolded `NAME: VALUE` lines.
fn parse_header_text(text: &str) -> HeaderCollection {
    let unfolded = RX_FOLD.replace_all(text, " ");
    let mut headers = HeaderCollection::new();
    for caps in RX_HEADER_LINE.captures_iter(&unfolded) {
        let name = &caps[1];
        if name.eq_ignore_ascii_case(ORIGINAL_HEADERS) {
            continue;
        }
        headers.add(name, decode_encoded_words(caps[2].trim()));
    }
    headers
}

/// Remove folding line breaks; each break and its leading whitespace
/// collapse into a single space.
pub fn unfold(value: &str) -> String {
    RX_FOLD.replace_all(value, " ").into_owned()
}

/// A blank raw value becomes `""`; anything else is unfolded and decoded.
fn decode_value(raw: &str) -> String {
    if raw.trim().is_empty() {
        return String::new();
    }
    decode_encoded_words(unfold(raw).trim())
}
