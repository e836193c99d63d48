//! Integration tests for header loading, attachment detection and message
//! conversion over `.eml` fixtures.

use std::path::{Path, PathBuf};

use chrono::{TimeZone, Utc};

use mailconv::attachment::{self, Evidence};
use mailconv::config::MailConfig;
use mailconv::convert::{compose, ComposeParams, ComposedMessage, MessageConverter, TextBody};
use mailconv::error::ConvertError;
use mailconv::model::address::MailAddress;
use mailconv::model::field::{fields_from_names, MailField};
use mailconv::model::flags::{AttachmentState, FlagSet, MailFlags};
use mailconv::model::record::Priority;
use mailconv::parser::header::{load_headers_from_reader, HeaderBlockLoader};
use mailconv::wire::bodystructure::BodyStructure;
use mailconv::wire::fetched::FetchedMessage;
use mailconv::wire::parsed::ParsedMessage;
use mailconv::wire::{FetchMetadata, FolderRef, WireMessage};

fn fixture(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

fn load(name: &str) -> ParsedMessage {
    ParsedMessage::from_bytes(std::fs::read(fixture(name)).unwrap())
}

fn header_block(name: &str) -> Vec<u8> {
    let raw = std::fs::read(fixture(name)).unwrap();
    let end = mailconv::parser::boundary::find_body_offset(&raw).unwrap();
    raw[..end].to_vec()
}

// ─── Full conversion ────────────────────────────────────────────────

#[test]
fn test_simple_message_all_fields() {
    let caps = MailConfig::default();
    let msg = load("simple.eml");
    let record = MessageConverter::new(&caps)
        .convert(&msg, &[MailField::All])
        .unwrap();

    assert_eq!(record.subject.as_deref(), Some("Hello World"));
    assert_eq!(record.from, vec![MailAddress::new("User One", "user1@example.com")]);
    assert_eq!(
        record.to,
        vec![
            MailAddress::new("", "user2@example.com"),
            MailAddress::new("Three, User", "user3@example.com"),
        ]
    );
    assert_eq!(
        record.sent_date,
        Some(Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 0).unwrap())
    );
    assert_eq!(record.size, msg.as_bytes().len() as i64);
    assert_eq!(record.priority, Priority::Normal);
    assert!(!record.has_attachment);
    assert_eq!(
        record.headers.as_ref().unwrap().get("x-mailer"),
        Some("fixture")
    );
    for field in MailField::CANONICAL {
        assert!(record.contains(field), "{field} missing");
    }
}

#[test]
fn test_encoded_and_folded_headers() {
    let caps = MailConfig::default();
    let record = MessageConverter::new(&caps)
        .convert(&load("encoded.eml"), &[MailField::All])
        .unwrap();

    assert_eq!(record.subject.as_deref(), Some("Résumé du projet"));
    assert_eq!(record.from[0].personal, "José García");
    assert_eq!(record.cc.len(), 2);
    assert_eq!(record.priority, Priority::Highest);
    assert_eq!(
        record.disposition_notification_to,
        Some(MailAddress::new("", "jose@example.com"))
    );
    assert_eq!(
        record.received_date,
        Some(Utc.with_ymd_and_hms(2024, 1, 5, 9, 30, 0).unwrap())
    );
    let headers = record.headers.unwrap();
    assert!(!headers.contains("x-original-headers"));
    assert_eq!(headers.get_all("received").len(), 2);
}

#[test]
fn test_partial_request_by_name() {
    let caps = MailConfig::default();
    let fields = fields_from_names(&["subject", "flags", "body"]).unwrap();
    let msg = load("simple.eml").with_flags(FlagSet::from_imap(&["\\Seen", "$Forwarded", "$cl_3", "work"]));
    let record = MessageConverter::new(&caps).convert(&msg, &fields).unwrap();

    assert!(record.contains(MailField::Subject));
    assert!(record.contains(MailField::Flags));
    assert!(!record.contains(MailField::From));
    assert!(!record.contains(MailField::ColorLabel));
    assert!(record.from.is_empty());
    assert_eq!(record.flags, MailFlags::SEEN | MailFlags::FORWARDED);
    assert_eq!(record.user_flags, Some(vec!["work".to_string()]));
}

#[test]
fn test_unknown_field_name() {
    let err = fields_from_names(&["subject", "nonsense"]).unwrap_err();
    assert!(matches!(err, ConvertError::InvalidField(name) if name == "nonsense"));
}

#[test]
fn test_malformed_content_type_is_tolerated() {
    let caps = MailConfig::default();
    let record = MessageConverter::new(&caps)
        .convert(&load("malformed_content_type.eml"), &[MailField::ContentType, MailField::Subject])
        .unwrap();
    let ct = record.content_type.unwrap();
    assert_eq!(ct.base_type(), "text/plain");
    assert_eq!(ct.param("format"), Some("flowed"));
    assert_eq!(record.subject.as_deref(), Some("Broken type"));
}

// ─── Header loading ─────────────────────────────────────────────────

#[test]
fn test_reader_and_structured_paths_agree() {
    let from_reader =
        load_headers_from_reader(std::fs::File::open(fixture("encoded.eml")).unwrap()).unwrap();
    let structured = HeaderBlockLoader::default().load(&load("encoded.eml")).unwrap();

    assert_eq!(from_reader.get("subject"), structured.get("subject"));
    assert_eq!(from_reader.get("from"), structured.get("from"));
    assert_eq!(from_reader.get_all("received"), structured.get_all("received"));
    assert!(!from_reader.contains("x-original-headers"));
}

// ─── Attachment detection ───────────────────────────────────────────

#[test]
fn test_attachment_fixtures() {
    let caps = MailConfig::default();
    let cases = [
        ("simple.eml", false),
        ("attachment.eml", true),
        ("signed.eml", false),
        ("nested.eml", true),
        ("alternative.eml", false),
    ];
    for (name, expected) in cases {
        let resolution = attachment::resolve(&load(name), &caps).unwrap();
        assert_eq!(resolution.has_attachment, expected, "{name}");
        assert_eq!(resolution.evidence, Evidence::ContentWalk, "{name}");
    }
}

#[test]
fn test_marker_flags_short_circuit_when_supported() {
    let caps = MailConfig {
        attachment_search: true,
        attachment_marker: true,
        ..MailConfig::default()
    };
    let msg = load("attachment.eml").with_flags(FlagSet::new().with_user("$HasNoAttachment"));
    let record = MessageConverter::new(&caps)
        .convert(&msg, &[MailField::Attachment, MailField::Flags])
        .unwrap();
    assert!(!record.has_attachment);
    assert_eq!(record.attachment_state, AttachmentState::Absent);
    assert_eq!(record.user_flags, Some(vec![]));
}

// ─── Fetch sessions ─────────────────────────────────────────────────

fn fetched_report() -> FetchedMessage {
    let mut meta = FetchMetadata::new(7, FolderRef::new(0, "INBOX"));
    meta.thread_level = 2;
    let structure = BodyStructure::multipart(
        "mixed",
        vec![
            BodyStructure::leaf("text", "plain").with_encoding("7bit", 17),
            BodyStructure::leaf("application", "pdf")
                .with_disposition("attachment", &[("filename", "report.pdf")])
                .with_encoding("base64", 144),
        ],
    );
    FetchedMessage::new(meta)
        .with_headers(header_block("attachment.eml"))
        .with_body_structure(structure)
}

#[test]
fn test_fetched_headers_and_body_structure() {
    let caps = MailConfig::default();
    let msg = fetched_report();
    let record = MessageConverter::new(&caps)
        .convert(&msg, &[MailField::All])
        .unwrap();

    assert_eq!(record.mail_id.as_deref(), Some("7"));
    assert_eq!(record.folder_id.as_deref(), Some("INBOX"));
    assert_eq!(record.thread_level, 2);
    assert_eq!(record.subject.as_deref(), Some("Quarterly report"));
    assert!(record.has_attachment);
    assert_eq!(record.size, 17 + 108);
    assert_eq!(
        attachment::resolve(&msg, &caps).unwrap().evidence,
        Evidence::BodyStructure
    );
}

#[test]
fn test_expunged_fetch_is_mail_not_found() {
    let caps = MailConfig::default();
    let msg = fetched_report();
    msg.mark_expunged();
    let err = MessageConverter::new(&caps)
        .convert(&msg, &[MailField::Subject])
        .unwrap_err();
    match err {
        ConvertError::MailNotFound { folder, mail_id } => {
            assert_eq!(folder, "INBOX");
            assert_eq!(mail_id, "7");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_body_structure_from_json() {
    let caps = MailConfig::default();
    let json = r#"{
        "type": "multipart", "subtype": "mixed",
        "bodies": [
            {"type": "text", "subtype": "plain", "size": 10},
            {"type": "message", "subtype": "rfc822", "size": 500}
        ]
    }"#;
    let structure: BodyStructure = serde_json::from_str(json).unwrap();
    assert!(attachment::body_structure_has_attachment(&structure, &caps));
}

// ─── Outbound ───────────────────────────────────────────────────────

#[test]
fn test_compose_save_convert() {
    let composed = ComposedMessage {
        from: Some(MailAddress::new("José García", "jose@example.com")),
        to: vec![MailAddress::new("Team", "team@example.com")],
        subject: Some("Résumé du projet".to_string()),
        flags: MailFlags::SEEN | MailFlags::READ_ACK,
        color_label: 4,
        content_type: Some("text/plain; charset=utf-8; broken".to_string()),
        text: "¡Hola!".to_string(),
        ..Default::default()
    };
    let params = ComposeParams {
        date: Some(Utc.with_ymd_and_hms(2024, 2, 1, 12, 0, 0).unwrap()),
        ..ComposeParams::default()
    };
    let saved = compose(&composed, &params, &TextBody).unwrap().save().unwrap();
    let flags = saved.flags().unwrap();
    assert!(flags.user.contains("$MDNSent"));
    assert!(flags.user.contains("$cl_4"));

    let caps = MailConfig::default();
    let record = MessageConverter::new(&caps)
        .convert(&saved, &[MailField::All])
        .unwrap();
    assert_eq!(record.subject.as_deref(), Some("Résumé du projet"));
    assert_eq!(record.from[0].personal, "José García");
    assert_eq!(record.flags, MailFlags::SEEN | MailFlags::READ_ACK);
    assert_eq!(record.color_label, 4);
    assert_eq!(
        record.content_type.map(|ct| ct.to_string()).as_deref(),
        Some("text/plain; charset=utf-8")
    );
}
