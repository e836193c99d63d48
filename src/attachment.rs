//! Attachment presence: does a message carry a real (file) attachment?
//!
//! Evidence is tried cheapest first:
//!
//! 1. marker flags, if the store supports attachment search;
//! 2. a has-attachment bit precomputed by the fetch session;
//! 3. a walk over the live MIME tree, or over the `BODYSTRUCTURE` summary
//!    when the body is not resident;
//! 4. when the walk breaks down, the top-level content type: only
//!    `multipart/mixed` counts.
//!
//! Only [`WireError::Gone`] escapes; every other failure degrades to the
//! content-type heuristic.

use tracing::{debug, trace};

use crate::config::Capabilities;
use crate::flags::marker_state;
use crate::model::content_type::ContentType;
use crate::parser::header::unfold;
use crate::wire::bodystructure::BodyStructure;
use crate::wire::{MimePart, WireError, WireMessage};

/// Multipart nesting beyond this depth is not inspected.
pub const MAX_DEPTH: usize = 10;

/// Which strategy produced the answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Evidence {
    MarkerFlag,
    ServerField,
    ContentWalk,
    BodyStructure,
    ContentTypeFallback,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct Resolution {
    pub has_attachment: bool,
    pub evidence: Evidence,
}

impl Resolution {
    fn new(has_attachment: bool, evidence: Evidence) -> Self {
        Self {
            has_attachment,
            evidence,
        }
    }
}

/// `true` if `message` contains a file attachment.
pub fn has_attachment(message: &dyn WireMessage, caps: &dyn Capabilities) -> Result<bool, WireError> {
    resolve(message, caps).map(|r| r.has_attachment)
}

/// Like [`has_attachment`], also reporting which evidence decided.
pub fn resolve(message: &dyn WireMessage, caps: &dyn Capabilities) -> Result<Resolution, WireError> {
    if caps.has_attachment_search() {
        match message.flags() {
            Ok(flags) => {
                if let Some(found) = marker_state(&flags).as_bool() {
                    return Ok(Resolution::new(found, Evidence::MarkerFlag));
                }
            }
            Err(WireError::Gone) => return Err(WireError::Gone),
            Err(e) => debug!(error = %e, "Could not read flags for attachment markers"),
        }
    }

    if let Some(found) = message.fetch_metadata().and_then(|m| m.has_attachment) {
        return Ok(Resolution::new(found, Evidence::ServerField));
    }

    match message.content() {
        Ok(root) => walk(root, caps).map(|found| Resolution::new(found, Evidence::ContentWalk)),
        Err(WireError::Gone) => Err(WireError::Gone),
        Err(e) => {
            if let Some(summary) = message.body_structure() {
                trace!(error = %e, "Content not available, walking BODYSTRUCTURE");
                return walk(summary, caps).map(|found| Resolution::new(found, Evidence::BodyStructure));
            }
            debug!(error = %e, "Content not available, judging by Content-Type");
            let found = top_level_type(message)?.is_some_and(|ct| is_mixed(&ct));
            Ok(Resolution::new(found, Evidence::ContentTypeFallback))
        }
    }
}

/// Attachment walk over a `BODYSTRUCTURE` summary alone.
pub fn body_structure_has_attachment(summary: &BodyStructure, caps: &dyn Capabilities) -> bool {
    walk(summary, caps).unwrap_or_else(|_| summary.is_multipart() && summary.subtype.eq_ignore_ascii_case("mixed"))
}

/// Walk a MIME tree from its root.
///
/// A non-multipart root is tested as a single part. A multipart root has its
/// children searched last-part-first; attachments are usually appended, so
/// this tends to stop early. Every multipart level is unwrapped, but its
/// subtype decides how its leaves are judged: the leaves of a
/// `multipart/alternative` are renditions of one body, so there only an
/// explicit `attachment` disposition counts. If the children cannot be
/// read, the answer is whether the root is `multipart/mixed`.
pub fn walk(root: &dyn MimePart, caps: &dyn Capabilities) -> Result<bool, WireError> {
    let ct = match root.content_type() {
        Ok(ct) => ct,
        Err(WireError::Gone) => return Err(WireError::Gone),
        Err(e) => {
            debug!(error = %e, "Unreadable top-level Content-Type");
            return Ok(false);
        }
    };
    if !ct.is_multipart() {
        return Ok(is_attachment_part(root, &ct, caps));
    }

    match walk_children(root, &ct, caps, 1) {
        Ok(found) => Ok(found),
        Err(WireError::Gone) => Err(WireError::Gone),
        Err(e) => {
            debug!(error = %e, content_type = %ct.base_type(), "Multipart walk failed, judging by Content-Type");
            Ok(is_mixed(&ct))
        }
    }
}

fn walk_children(
    part: &dyn MimePart,
    part_ct: &ContentType,
    caps: &dyn Capabilities,
    depth: usize,
) -> Result<bool, WireError> {
    let renditions = part_ct.sub_type() == "alternative";
    for child in part.children()?.into_iter().rev() {
        let ct = child.content_type()?;
        if ct.is_multipart() {
            if depth >= MAX_DEPTH {
                debug!(depth, "Multipart nesting too deep, not descending");
                continue;
            }
            if walk_children(child, &ct, caps, depth + 1)? {
                return Ok(true);
            }
        } else if renditions {
            if is_disposed_attachment(child, &ct) {
                return Ok(true);
            }
        } else if is_attachment_part(child, &ct, caps) {
            return Ok(true);
        }
    }
    Ok(false)
}

/// A single part is an attachment if it is not a detached signature and it
/// is disposed as `attachment`, names a filename, or has a type configured
/// as always being an attachment.
pub fn is_attachment_part(part: &dyn MimePart, ct: &ContentType, caps: &dyn Capabilities) -> bool {
    if ct.is_signature() {
        return false;
    }
    let disposed = match part.disposition() {
        Ok(Some(d)) => d.is_attachment() || d.filename().is_some(),
        _ => false,
    };
    disposed || caps.always_attachment(ct)
}

/// Strict test for alternative renditions: `Content-Disposition: attachment`
/// on a non-signature part.
fn is_disposed_attachment(part: &dyn MimePart, ct: &ContentType) -> bool {
    !ct.is_signature() && matches!(part.disposition(), Ok(Some(d)) if d.is_attachment())
}

fn is_mixed(ct: &ContentType) -> bool {
    ct.is_multipart() && ct.sub_type() == "mixed"
}

/// Content-Type from the header enumeration, for messages without
/// resident content.
fn top_level_type(message: &dyn WireMessage) -> Result<Option<ContentType>, WireError> {
    match message.header_entries() {
        Ok(entries) => Ok(entries
            .iter()
            .find(|h| h.name.eq_ignore_ascii_case("content-type"))
            .map(|h| ContentType::parse(unfold(&h.value).trim()))),
        Err(WireError::Gone) => Err(WireError::Gone),
        Err(_) => Ok(None),
    }
}
