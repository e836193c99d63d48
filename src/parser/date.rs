//! Lenient parsing of `Date:` header values.

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use tracing::debug;

const FORMATS: [&str; 8] = [
    "%d %b %Y %H:%M:%S %z",
    "%d %b %Y %H:%M %z",
    "%d %b %Y %H:%M:%S",
    "%b %d %H:%M:%S %Y",
    "%Y-%m-%d %H:%M:%S %z",
    "%Y-%m-%d %H:%M:%S",
    "%d-%b-%Y %H:%M:%S %z",
    "%d-%b-%Y %H:%M:%S",
];

const NAMED_ZONES: [(&str, &str); 13] = [
    ("EST", "-0500"),
    ("EDT", "-0400"),
    ("CST", "-0600"),
    ("CDT", "-0500"),
    ("MST", "-0700"),
    ("MDT", "-0600"),
    ("PST", "-0800"),
    ("PDT", "-0700"),
    ("GMT", "+0000"),
    ("UTC", "+0000"),
    ("UT", "+0000"),
    ("CEST", "+0200"),
    ("CET", "+0100"),
];

/// Parse a mail date in RFC 2822, RFC 3339, IMAP `INTERNALDATE` or one of
/// the common broken variants. Returns `None` if nothing matches.
pub fn parse_date(value: &str) -> Option<DateTime<Utc>> {
    let trimmed = strip_comment(value.trim());
    if trimmed.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc2822(trimmed) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(dt.with_timezone(&Utc));
    }

    let candidate = replace_named_zone(&title_case_month(strip_day_of_week(trimmed)));
    for fmt in FORMATS {
        if let Ok(dt) = DateTime::parse_from_str(&candidate, fmt) {
            return Some(dt.with_timezone(&Utc));
        }
        if let Ok(ndt) = NaiveDateTime::parse_from_str(&candidate, fmt) {
            return Some(Utc.from_utc_datetime(&ndt));
        }
    }

    let parsed = mail_parser_date(trimmed);
    if parsed.is_none() {
        debug!(date = trimmed, "Could not parse date");
    }
    parsed
}

/// Last resort: let `mail-parser` try its own date grammar.
fn mail_parser_date(input: &str) -> Option<DateTime<Utc>> {
    let wrapped = format!("Date: {input}\r\n\r\n");
    let message = mail_parser::MessageParser::default().parse(wrapped.as_bytes())?;
    let date = message.date()?;
    DateTime::parse_from_rfc3339(&date.to_rfc3339())
        .ok()
        .map(|d| d.with_timezone(&Utc))
}

/// Drop a trailing `(comment)` such as `+0100 (CET)`.
fn strip_comment(s: &str) -> &str {
    match s.rfind('(') {
        Some(pos) if s.ends_with(')') => s[..pos].trim_end(),
        _ => s,
    }
}

fn strip_day_of_week(s: &str) -> &str {
    match s.split_once(',') {
        Some((day, rest)) if day.len() <= 9 && day.chars().all(|c| c.is_ascii_alphabetic()) => {
            rest.trim()
        }
        _ => {
            let day = s.split(' ').next().unwrap_or("");
            if day.len() == 3 && day.chars().all(|c| c.is_ascii_alphabetic()) {
                s[3..].trim()
            } else {
                s
            }
        }
    }
}

/// `16-JUL-2025` → `16-Jul-2025`; chrono's `%b` wants title case.
fn title_case_month(s: &str) -> String {
    s.split(' ')
        .map(|word| {
            word.split('-')
                .map(|part| {
                    if part.len() == 3 && part.chars().all(|c| c.is_ascii_alphabetic()) {
                        let lower = part.to_ascii_lowercase();
                        lower[..1].to_ascii_uppercase() + &lower[1..]
                    } else {
                        part.to_string()
                    }
                })
                .collect::<Vec<_>>()
                .join("-")
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn replace_named_zone(s: &str) -> String {
    let upper = s.to_ascii_uppercase();
    for (name, offset) in NAMED_ZONES {
        if upper.ends_with(&format!(" {name}")) {
            return format!("{}{offset}", &s[..s.len() - name.len()]);
        }
    }
    s.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ymd(dt: Option<DateTime<Utc>>) -> String {
        dt.expect("date should parse").format("%Y-%m-%d %H:%M").to_string()
    }

    #[test]
    fn test_rfc2822() {
        assert_eq!(ymd(parse_date("Thu, 04 Jan 2024 10:00:00 +0000")), "2024-01-04 10:00");
    }

    #[test]
    fn test_trailing_comment() {
        assert_eq!(ymd(parse_date("Thu, 04 Jan 2024 11:00:00 +0100 (CET)")), "2024-01-04 10:00");
    }

    #[test]
    fn test_named_zone() {
        assert_eq!(ymd(parse_date("Thu, 04 Jan 2024 10:00:00 EST")), "2024-01-04 15:00");
    }

    #[test]
    fn test_imap_internaldate() {
        assert_eq!(ymd(parse_date("16-JUL-2025 03:01:03 +0000")), "2025-07-16 03:01");
        assert_eq!(ymd(parse_date("16-JUL-2025 03:01:03")), "2025-07-16 03:01");
    }

    #[test]
    fn test_iso8601() {
        assert_eq!(ymd(parse_date("2024-01-04T10:00:00Z")), "2024-01-04 10:00");
    }

    #[test]
    fn test_empty() {
        assert!(parse_date("").is_none());
        assert!(parse_date("   ").is_none());
    }
}
