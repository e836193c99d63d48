//! Content-Type and Content-Disposition header values (RFC 2045, RFC 2183).

use serde::{Deserialize, Serialize};

use crate::parser::encoded::decode_encoded_words;

/// Default type for a part without a Content-Type header (RFC 2045 §5.2).
pub const DEFAULT_CONTENT_TYPE: &str = "text/plain; charset=us-ascii";

/// A parsed `type/subtype; name=value` header value.
///
/// Type and subtype are stored lower-cased; parameter names are lower-cased
/// and parameter order is preserved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentType {
    primary_type: String,
    sub_type: String,
    params: Vec<(String, String)>,
}

/// Returned by [`ContentType::parse_strict`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid Content-Type '{value}': {reason}")]
pub struct ContentTypeError {
    pub value: String,
    pub reason: &'static str,
}

impl ContentType {
    pub fn new(primary_type: &str, sub_type: &str) -> Self {
        Self {
            primary_type: primary_type.trim().to_ascii_lowercase(),
            sub_type: sub_type.trim().to_ascii_lowercase(),
            params: Vec::new(),
        }
    }

    /// Lenient parse: never fails. Missing or unreadable types fall back to
    /// `text/plain`, a missing subtype to `octet-stream`, and malformed
    /// parameters are dropped.
    pub fn parse(value: &str) -> Self {
        let (type_part, params_part) = split_params(value);
        let (primary, sub) = match type_part.split_once('/') {
            Some((p, s)) if is_token(p.trim()) && is_token(s.trim()) => (p, s),
            Some((p, _)) if is_token(p.trim()) => (p, "octet-stream"),
            _ => ("text", "plain"),
        };
        let mut ct = Self::new(primary, sub);
        ct.params = parse_params(params_part).0;
        ct
    }

    /// Strict parse: type, subtype and every parameter must be well formed.
    pub fn parse_strict(value: &str) -> Result<Self, ContentTypeError> {
        let err = |reason| ContentTypeError {
            value: value.to_string(),
            reason,
        };
        let (type_part, params_part) = split_params(value);
        let (primary, sub) = type_part.split_once('/').ok_or_else(|| err("missing '/'"))?;
        if !is_token(primary.trim()) || !is_token(sub.trim()) {
            return Err(err("type or subtype is not a token"));
        }
        let (params, clean) = parse_params(params_part);
        if !clean {
            return Err(err("malformed parameter list"));
        }
        let mut ct = Self::new(primary, sub);
        ct.params = params;
        Ok(ct)
    }

    /// Re-parse a possibly malformed header value and render it cleanly.
    pub fn sanitize(value: &str) -> String {
        Self::parse(value).to_string()
    }

    pub fn primary_type(&self) -> &str {
        &self.primary_type
    }

    pub fn sub_type(&self) -> &str {
        &self.sub_type
    }

    /// `type/subtype` without parameters.
    pub fn base_type(&self) -> String {
        format!("{}/{}", self.primary_type, self.sub_type)
    }

    pub fn is_primary_type(&self, t: &str) -> bool {
        self.primary_type.eq_ignore_ascii_case(t)
    }

    pub fn is_multipart(&self) -> bool {
        self.is_primary_type("multipart")
    }

    /// Match against `type/subtype`, where subtype may be `*`.
    pub fn is_mime_type(&self, pattern: &str) -> bool {
        match pattern.split_once('/') {
            Some((p, "*")) => self.is_primary_type(p),
            Some((p, s)) => self.is_primary_type(p) && self.sub_type.eq_ignore_ascii_case(s),
            None => self.is_primary_type(pattern),
        }
    }

    /// Detached signature parts: `application/pgp-signature`,
    /// `application/pkcs7-signature` and friends.
    pub fn is_signature(&self) -> bool {
        self.is_primary_type("application") && self.sub_type.ends_with("signature")
    }

    pub fn param(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn set_param(&mut self, name: &str, value: impl Into<String>) {
        let value = value.into();
        match self.params.iter_mut().find(|(k, _)| k.eq_ignore_ascii_case(name)) {
            Some(slot) => slot.1 = value,
            None => self.params.push((name.to_ascii_lowercase(), value)),
        }
    }

    pub fn params(&self) -> &[(String, String)] {
        &self.params
    }
}

impl Default for ContentType {
    fn default() -> Self {
        Self::parse(DEFAULT_CONTENT_TYPE)
    }
}

impl std::fmt::Display for ContentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.primary_type, self.sub_type)?;
        write_params(f, &self.params)
    }
}

/// A parsed Content-Disposition value (`attachment; filename="a.pdf"`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentDisposition {
    kind: String,
    params: Vec<(String, String)>,
}

impl ContentDisposition {
    pub fn new(kind: &str) -> Self {
        Self {
            kind: kind.trim().to_ascii_lowercase(),
            params: Vec::new(),
        }
    }

    pub fn parse(value: &str) -> Self {
        let (kind, params_part) = split_params(value);
        let mut disposition = Self::new(kind);
        disposition.params = parse_params(params_part).0;
        disposition
    }

    pub fn with_param(mut self, name: &str, value: impl Into<String>) -> Self {
        self.params.push((name.to_ascii_lowercase(), value.into()));
        self
    }

    /// Lower-cased disposition type, e.g. `attachment` or `inline`.
    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn is_attachment(&self) -> bool {
        self.kind == "attachment"
    }

    pub fn param(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// The suggested filename, including RFC 2231 `filename*` forms.
    pub fn filename(&self) -> Option<&str> {
        self.param("filename")
            .or_else(|| self.param("filename*"))
            .or_else(|| self.param("filename*0"))
            .or_else(|| self.param("filename*0*"))
            .filter(|f| !f.trim().is_empty())
    }
}

impl std::fmt::Display for ContentDisposition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.kind)?;
        write_params(f, &self.params)
    }
}

/// Split `value` at the first `;` outside quotes.
fn split_params(value: &str) -> (&str, &str) {
    let mut in_quotes = false;
    for (i, b) in value.bytes().enumerate() {
        match b {
            b'"' => in_quotes = !in_quotes,
            b';' if !in_quotes => return (value[..i].trim(), &value[i + 1..]),
            _ => {}
        }
    }
    (value.trim(), "")
}

/// Parse `name=value; name="quoted value"`. The flag is `false` when any
/// malformed segment had to be skipped.
fn parse_params(input: &str) -> (Vec<(String, String)>, bool) {
    let mut params = Vec::new();
    let mut clean = true;
    let bytes = input.as_bytes();
    let len = bytes.len();
    let mut pos = 0;

    while pos < len {
        while pos < len && (bytes[pos] == b';' || bytes[pos].is_ascii_whitespace()) {
            pos += 1;
        }
        if pos >= len {
            break;
        }
        let eq = match bytes[pos..].iter().position(|&b| b == b'=' || b == b';') {
            Some(i) if bytes[pos + i] == b'=' => i,
            Some(i) => {
                // "name" without a value
                clean = false;
                pos += i + 1;
                continue;
            }
            None => {
                clean = false;
                break;
            }
        };
        let name = input[pos..pos + eq].trim();
        pos += eq + 1;
        while pos < len && bytes[pos].is_ascii_whitespace() {
            pos += 1;
        }

        let value = if pos < len && bytes[pos] == b'"' {
            pos += 1;
            let mut v = Vec::new();
            let mut closed = false;
            while pos < len {
                match bytes[pos] {
                    b'\\' if pos + 1 < len => {
                        v.push(bytes[pos + 1]);
                        pos += 2;
                    }
                    b'"' => {
                        pos += 1;
                        closed = true;
                        break;
                    }
                    c => {
                        v.push(c);
                        pos += 1;
                    }
                }
            }
            if !closed {
                clean = false;
            }
            String::from_utf8_lossy(&v).into_owned()
        } else {
            let end = bytes[pos..]
                .iter()
                .position(|&b| b == b';')
                .map_or(len, |i| pos + i);
            let v = input[pos..end].trim().to_string();
            pos = end;
            v
        };

        if !is_token(name) {
            clean = false;
            continue;
        }
        params.push((name.to_ascii_lowercase(), decode_encoded_words(&value)));
    }

    (params, clean)
}

fn write_params(f: &mut std::fmt::Formatter<'_>, params: &[(String, String)]) -> std::fmt::Result {
    for (name, value) in params {
        if is_token(value) {
            write!(f, "; {name}={value}")?;
        } else {
            write!(f, "; {name}=\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))?;
        }
    }
    Ok(())
}

/// RFC 2045 token: non-empty, printable ASCII without specials.
fn is_token(s: &str) -> bool {
    !s.is_empty()
        && s.bytes().all(|b| {
            b.is_ascii_graphic() && !b"()<>@,;:\\\"/[]?=".contains(&b)
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_with_quoted_boundary() {
        let ct = ContentType::parse("Multipart/Mixed; boundary=\"=_a;b\"; charset=utf-8");
        assert_eq!(ct.base_type(), "multipart/mixed");
        assert_eq!(ct.param("boundary"), Some("=_a;b"));
        assert_eq!(ct.param("CHARSET"), Some("utf-8"));
        assert!(ct.is_multipart());
    }

    #[test]
    fn test_lenient_parse_defaults() {
        assert_eq!(ContentType::parse("").base_type(), "text/plain");
        assert_eq!(ContentType::parse("garbage").base_type(), "text/plain");
        assert_eq!(ContentType::parse("image/").base_type(), "image/octet-stream");
    }

    #[test]
    fn test_strict_parse_rejects_broken_params() {
        assert!(ContentType::parse_strict("text/plain; charset").is_err());
        assert!(ContentType::parse_strict("text/plain; name=\"unterminated").is_err());
        assert!(ContentType::parse_strict("text plain").is_err());
        assert!(ContentType::parse_strict("text/plain; charset=utf-8").is_ok());
    }

    #[test]
    fn test_sanitize_rewrites_malformed_value() {
        let cleaned = ContentType::sanitize("text/html; charset=utf-8; broken; name=\"a b.html\"");
        assert_eq!(cleaned, "text/html; charset=utf-8; name=\"a b.html\"");
        assert!(ContentType::parse_strict(&cleaned).is_ok());
    }

    #[test]
    fn test_mime_type_patterns() {
        let ct = ContentType::parse("application/pkcs7-signature; name=smime.p7s");
        assert!(ct.is_mime_type("application/*"));
        assert!(ct.is_mime_type("application/pkcs7-signature"));
        assert!(!ct.is_mime_type("multipart/*"));
        assert!(ct.is_signature());
    }

    #[test]
    fn test_disposition_filename() {
        let d = ContentDisposition::parse("ATTACHMENT; filename=\"report.pdf\"");
        assert!(d.is_attachment());
        assert_eq!(d.filename(), Some("report.pdf"));

        let inline = ContentDisposition::parse("inline");
        assert!(!inline.is_attachment());
        assert_eq!(inline.filename(), None);
    }

    #[test]
    fn test_encoded_filename_is_decoded() {
        let d = ContentDisposition::parse("attachment; filename=\"=?UTF-8?B?w7xiZXIucGRm?=\"");
        assert_eq!(d.filename(), Some("über.pdf"));
    }
}
