//! Translation between protocol flag sets and the internal flag model.
//!
//! System flags map one-to-one onto [`MailFlags`] bits. A handful of user
//! flags carry extra meaning and are lifted out of the free-form list:
//!
//! | user flag                             | internal                    |
//! |---------------------------------------|-----------------------------|
//! | `$cl_N` (legacy `cl_N`), `N >= 1`     | color label `N`             |
//! | `$Forwarded`                          | [`MailFlags::FORWARDED`]    |
//! | `$MDNSent`                            | [`MailFlags::READ_ACK`]     |
//! | `$HasAttachment` / `$HasNoAttachment` | [`AttachmentState`] markers |
//!
//! Keyword matching is case-insensitive. [`decode`] remembers how each
//! recognised keyword was spelled, so [`DecodedFlags::to_flag_set`] gives
//! back the original set when nothing changed in between; [`encode`] always
//! writes the canonical spellings.

use tracing::debug;

use crate::model::flags::{AttachmentState, FlagSet, MailFlags, SystemFlag};

pub const COLOR_LABEL_PREFIX: &str = "$cl_";
pub const LEGACY_COLOR_LABEL_PREFIX: &str = "cl_";
pub const FORWARDED: &str = "$Forwarded";
pub const READ_ACK: &str = "$MDNSent";
pub const HAS_ATTACHMENT: &str = "$HasAttachment";
pub const HAS_NO_ATTACHMENT: &str = "$HasNoAttachment";

/// The internal view of a [`FlagSet`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DecodedFlags {
    pub flags: MailFlags,
    /// `0` for none.
    pub color_label: u32,
    /// Unrecognised user flags, verbatim. `None` if the set had no user
    /// flags at all.
    pub user_flags: Option<Vec<String>>,
    /// Set only when markers were examined and one was present.
    pub attachment: AttachmentState,
    /// Recognised user flags as they appeared on the wire, in sorted order.
    pub spellings: Vec<String>,
}

impl DecodedFlags {
    /// Re-encode, attachment marker included. Semantic flags whose state is
    /// unchanged keep their original spelling.
    pub fn to_flag_set(&self) -> FlagSet {
        let extra = self.user_flags.as_deref().unwrap_or_default();
        let mut set = encode(self.flags, self.color_label, extra);
        if let Some(marker) = attachment_marker(self.attachment) {
            set.user.insert(marker.to_string());
        }

        for keyword in [FORWARDED, READ_ACK, HAS_ATTACHMENT, HAS_NO_ATTACHMENT] {
            if set.user.contains(keyword) {
                self.respell(&mut set, keyword, |s| s.eq_ignore_ascii_case(keyword));
            }
        }
        let labels: Vec<&String> = self
            .spellings
            .iter()
            .filter(|s| parse_color_label(s).is_some())
            .collect();
        // Only while the winning label is still the current one.
        if let Some(first) = labels.first() {
            if parse_color_label(first) == Some(self.color_label) {
                let canonical = format!("{COLOR_LABEL_PREFIX}{}", self.color_label);
                self.respell(&mut set, &canonical, |s| parse_color_label(s).is_some());
            }
        }
        set
    }

    fn respell(&self, set: &mut FlagSet, canonical: &str, matches: impl Fn(&str) -> bool) {
        let originals: Vec<&String> = self.spellings.iter().filter(|s| matches(s)).collect();
        if originals.is_empty() {
            return;
        }
        set.user.remove(canonical);
        set.user.extend(originals.into_iter().cloned());
    }
}

/// Decode a protocol flag set.
///
/// With `examine_markers`, `$HasAttachment` / `$HasNoAttachment` set
/// [`DecodedFlags::attachment`]; without it they are retained like any other
/// unrecognised flag. If several color labels are present the first in
/// sorted order wins.
pub fn decode(flags: &FlagSet, examine_markers: bool) -> DecodedFlags {
    let mut decoded = DecodedFlags::default();
    for flag in &flags.system {
        decoded.flags |= flag.bit();
    }

    if flags.user.is_empty() {
        return decoded;
    }

    let mut retained = Vec::new();
    for flag in &flags.user {
        if let Some(label) = parse_color_label(flag) {
            if decoded.color_label == 0 {
                decoded.color_label = label;
            } else {
                debug!(flag = %flag, kept = decoded.color_label, "Ignoring extra color label");
            }
        } else if flag.eq_ignore_ascii_case(FORWARDED) {
            decoded.flags |= MailFlags::FORWARDED;
        } else if flag.eq_ignore_ascii_case(READ_ACK) {
            decoded.flags |= MailFlags::READ_ACK;
        } else if examine_markers && flag.eq_ignore_ascii_case(HAS_ATTACHMENT) {
            decoded.attachment = AttachmentState::Present;
        } else if examine_markers && flag.eq_ignore_ascii_case(HAS_NO_ATTACHMENT) {
            decoded.attachment = AttachmentState::Absent;
        } else {
            retained.push(flag.clone());
            continue;
        }
        decoded.spellings.push(flag.clone());
    }
    decoded.user_flags = Some(retained);
    decoded
}

/// Encode internal flags back into a protocol flag set. Semantic bits and
/// the color label become their canonical user flags; `extra_user_flags`
/// are added verbatim.
pub fn encode(flags: MailFlags, color_label: u32, extra_user_flags: &[String]) -> FlagSet {
    let mut set = FlagSet::new();
    for flag in SystemFlag::ALL {
        if flags.contains(flag.bit()) {
            set.system.insert(flag);
        }
    }
    if flags.contains(MailFlags::FORWARDED) {
        set.user.insert(FORWARDED.to_string());
    }
    if flags.contains(MailFlags::READ_ACK) {
        set.user.insert(READ_ACK.to_string());
    }
    if color_label > 0 {
        set.user.insert(format!("{COLOR_LABEL_PREFIX}{color_label}"));
    }
    set.user.extend(extra_user_flags.iter().cloned());
    set
}

/// The marker flag for a known attachment state.
pub fn attachment_marker(state: AttachmentState) -> Option<&'static str> {
    match state {
        AttachmentState::Present => Some(HAS_ATTACHMENT),
        AttachmentState::Absent => Some(HAS_NO_ATTACHMENT),
        AttachmentState::Unknown => None,
    }
}

/// Attachment state carried by marker flags alone.
pub fn marker_state(flags: &FlagSet) -> AttachmentState {
    let mut state = AttachmentState::Unknown;
    for flag in &flags.user {
        if flag.eq_ignore_ascii_case(HAS_ATTACHMENT) {
            state = AttachmentState::Present;
        } else if flag.eq_ignore_ascii_case(HAS_NO_ATTACHMENT) {
            state = AttachmentState::Absent;
        }
    }
    state
}

/// `$cl_N` or `cl_N` with `N >= 1`.
fn parse_color_label(flag: &str) -> Option<u32> {
    let digits = strip_prefix_ignore_case(flag, COLOR_LABEL_PREFIX)
        .or_else(|| strip_prefix_ignore_case(flag, LEGACY_COLOR_LABEL_PREFIX))?;
    match digits.parse::<u32>() {
        Ok(n) if n > 0 => Some(n),
        _ => None,
    }
}

fn strip_prefix_ignore_case<'a>(s: &'a str, prefix: &str) -> Option<&'a str> {
    let head = s.get(..prefix.len())?;
    head.eq_ignore_ascii_case(prefix).then(|| &s[prefix.len()..])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forwarded_and_legacy_color_label() {
        let set = FlagSet::new().with_user("$Forwarded").with_user("cl_3");
        let decoded = decode(&set, true);
        assert_eq!(decoded.flags, MailFlags::FORWARDED);
        assert_eq!(decoded.color_label, 3);
        assert_eq!(decoded.user_flags, Some(vec![]));
        assert_eq!(decoded.attachment, AttachmentState::Unknown);
    }

    #[test]
    fn test_system_flags() {
        let set = FlagSet::new()
            .with_system(SystemFlag::Seen)
            .with_system(SystemFlag::Answered)
            .with_system(SystemFlag::Deleted);
        let decoded = decode(&set, false);
        assert_eq!(
            decoded.flags,
            MailFlags::SEEN | MailFlags::ANSWERED | MailFlags::DELETED
        );
        assert_eq!(decoded.user_flags, None);
    }

    #[test]
    fn test_unrecognised_flags_retained() {
        let set = FlagSet::new().with_user("$Junk").with_user("project-x").with_user("$mdnsent");
        let decoded = decode(&set, false);
        assert_eq!(decoded.flags, MailFlags::READ_ACK);
        assert_eq!(
            decoded.user_flags,
            Some(vec!["$Junk".to_string(), "project-x".to_string()])
        );
    }

    #[test]
    fn test_markers_only_when_examined() {
        let set = FlagSet::new().with_user("$HasAttachment");
        let examined = decode(&set, true);
        assert_eq!(examined.attachment, AttachmentState::Present);
        assert_eq!(examined.user_flags, Some(vec![]));

        let ignored = decode(&set, false);
        assert_eq!(ignored.attachment, AttachmentState::Unknown);
        assert_eq!(ignored.user_flags, Some(vec!["$HasAttachment".to_string()]));

        let absent = decode(&FlagSet::new().with_user("$hasnoattachment"), true);
        assert_eq!(absent.attachment, AttachmentState::Absent);
    }

    #[test]
    fn test_first_color_label_wins() {
        let set = FlagSet::new().with_user("$cl_7").with_user("$cl_2");
        // sorted order: "$cl_2" < "$cl_7"
        assert_eq!(decode(&set, false).color_label, 2);
    }

    #[test]
    fn test_zero_color_label_is_not_a_label() {
        let decoded = decode(&FlagSet::new().with_user("$cl_0"), false);
        assert_eq!(decoded.color_label, 0);
        assert_eq!(decoded.user_flags, Some(vec!["$cl_0".to_string()]));
    }

    #[test]
    fn test_round_trip_canonical() {
        let original = FlagSet::new()
            .with_system(SystemFlag::Seen)
            .with_system(SystemFlag::Flagged)
            .with_user(FORWARDED)
            .with_user(READ_ACK)
            .with_user("$cl_4")
            .with_user(HAS_NO_ATTACHMENT)
            .with_user("Important")
            .with_user("$Junk");
        let decoded = decode(&original, true);
        assert_eq!(decoded.to_flag_set(), original);

        let extra = decoded.user_flags.clone().unwrap_or_default();
        let without_marker = encode(decoded.flags, decoded.color_label, &extra);
        assert!(!without_marker.user.contains(HAS_NO_ATTACHMENT));
        assert!(without_marker.user.contains("Important"));
    }

    #[test]
    fn test_round_trip_keeps_original_spellings() {
        let legacy = FlagSet::new().with_user("$Forwarded").with_user("cl_3");
        assert_eq!(decode(&legacy, true).to_flag_set(), legacy);

        let lower = FlagSet::new().with_user("$forwarded").with_user("$mdnsent");
        assert_eq!(decode(&lower, false).to_flag_set(), lower);

        let markers = FlagSet::new().with_user("$hasattachment").with_user("x");
        assert_eq!(decode(&markers, true).to_flag_set(), markers);

        let two_labels = FlagSet::new().with_user("$cl_2").with_user("cl_7");
        assert_eq!(decode(&two_labels, false).to_flag_set(), two_labels);
    }

    #[test]
    fn test_changed_state_uses_canonical_spelling() {
        let mut decoded = decode(&FlagSet::new().with_user("cl_3").with_user("$forwarded"), false);
        decoded.color_label = 5;
        decoded.flags.remove(MailFlags::FORWARDED);
        let set = decoded.to_flag_set();
        assert_eq!(set, FlagSet::new().with_user("$cl_5"));

        decoded.flags.insert(MailFlags::FORWARDED);
        assert!(decoded.to_flag_set().user.contains("$forwarded"));
    }

    #[test]
    fn test_encode_is_canonical() {
        let decoded = decode(&FlagSet::new().with_user("$forwarded").with_user("cl_3"), false);
        let set = encode(decoded.flags, decoded.color_label, &[]);
        assert_eq!(set, FlagSet::new().with_user(FORWARDED).with_user("$cl_3"));
    }

    #[test]
    fn test_marker_state() {
        assert_eq!(marker_state(&FlagSet::new().with_user("x")), AttachmentState::Unknown);
        assert_eq!(
            marker_state(&FlagSet::new().with_user("$HASATTACHMENT")),
            AttachmentState::Present
        );
    }
}
