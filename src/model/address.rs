//! Mail address parsing (RFC 5322 §3.4), including group syntax.

use serde::{Deserialize, Serialize};

use crate::parser::encoded::decode_encoded_words;

/// A parsed mail address.
///
/// # Examples
/// - `"Juan García <juan@ejemplo.com>"` → `personal = "Juan García"`, `address = "juan@ejemplo.com"`
/// - `"user@example.com"` → `personal = ""`, `address = "user@example.com"`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MailAddress {
    /// Decoded personal (display) name; may be empty.
    pub personal: String,
    /// The bare address (`user@domain`).
    pub address: String,
}

impl MailAddress {
    pub fn new(personal: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            personal: personal.into(),
            address: address.into(),
        }
    }

    /// Parse a single address. Encoded words in the personal name are decoded.
    ///
    /// If no address syntax is recognised the trimmed input becomes `address`.
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();

        if let (Some(open), Some(close)) = (trimmed.rfind('<'), trimmed.rfind('>')) {
            if close > open {
                let address = trimmed[open + 1..close].trim();
                // Strip an obsolete source route: <@relay:user@host>
                let address = match address.strip_prefix('@') {
                    Some(route) => route.split_once(':').map_or(address, |(_, a)| a),
                    None => address,
                };
                let personal = unquote(trimmed[..open].trim());
                return Self::new(decode_encoded_words(&personal), address);
            }
        }

        // "user@host (Comment Name)"
        if let (Some(open), true) = (trimmed.find('('), trimmed.ends_with(')')) {
            let address = trimmed[..open].trim();
            if address.contains('@') {
                let personal = &trimmed[open + 1..trimmed.len() - 1];
                return Self::new(decode_encoded_words(personal.trim()), address);
            }
        }

        Self::new(String::new(), trimmed)
    }

    /// Parse an address list. Quoted commas, angle brackets and group
    /// syntax (`Team: a@b.com, c@d.com;`) are honoured; group members are
    /// flattened into the result and empty entries dropped.
    pub fn parse_list(raw: &str) -> Vec<Self> {
        let mut results = Vec::new();
        let mut current = String::new();
        let mut in_quotes = false;
        let mut in_angle = false;
        let mut escaped = false;

        let flush = |current: &mut String, results: &mut Vec<Self>| {
            let addr = Self::parse(current);
            if !addr.address.is_empty() {
                results.push(addr);
            }
            current.clear();
        };

        for ch in raw.chars() {
            if escaped {
                escaped = false;
                current.push(ch);
                continue;
            }
            match ch {
                '\\' if in_quotes => {
                    escaped = true;
                    current.push(ch);
                }
                '"' => {
                    in_quotes = !in_quotes;
                    current.push(ch);
                }
                '<' if !in_quotes => {
                    in_angle = true;
                    current.push(ch);
                }
                '>' if !in_quotes => {
                    in_angle = false;
                    current.push(ch);
                }
                // Group name: everything before the colon is discarded
                ':' if !in_quotes && !in_angle => current.clear(),
                ',' | ';' if !in_quotes && !in_angle => flush(&mut current, &mut results),
                _ => current.push(ch),
            }
        }
        flush(&mut current, &mut results);

        results
    }

    /// `"Personal <address>"` or just `"address"`.
    pub fn display(&self) -> String {
        if self.personal.is_empty() {
            self.address.clone()
        } else {
            format!("{} <{}>", self.personal, self.address)
        }
    }
}

/// Strip surrounding double-quotes and quoted-pair escapes.
fn unquote(s: &str) -> String {
    let trimmed = s.trim();
    if trimmed.len() >= 2 && trimmed.starts_with('"') && trimmed.ends_with('"') {
        let inner = &trimmed[1..trimmed.len() - 1];
        let mut out = String::with_capacity(inner.len());
        let mut chars = inner.chars();
        while let Some(c) = chars.next() {
            if c == '\\' {
                if let Some(next) = chars.next() {
                    out.push(next);
                }
            } else {
                out.push(c);
            }
        }
        out.trim().to_string()
    } else {
        trimmed.to_string()
    }
}

impl std::fmt::Display for MailAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display())
    }
}
