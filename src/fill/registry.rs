//! Field → filler dispatch tables.

use std::collections::HashMap;

use lazy_static::lazy_static;
use tracing::debug;

use super::filler::{Filler, IdSource};
use crate::error::{ConvertError, Result};
use crate::model::field::MailField;
use crate::wire::WireMessage;

lazy_static! {
    static ref FETCHED_FILLERS: HashMap<MailField, Filler> = table(IdSource::Fetched);
    static ref FOLDER_INFO_FILLERS: HashMap<MailField, Filler> = table(IdSource::FolderInfo);
}

fn table(ids: IdSource) -> HashMap<MailField, Filler> {
    let fillers = [
        Filler::MailId(ids),
        Filler::FolderId(ids),
        Filler::ContentType,
        Filler::From,
        Filler::To,
        Filler::Cc,
        Filler::Bcc,
        Filler::ReplyTo,
        Filler::Subject,
        Filler::Size,
        Filler::SentDate,
        Filler::ReceivedDate,
        Filler::Flags,
        Filler::ThreadLevel,
        Filler::DispositionNotificationTo,
        Filler::Priority,
        Filler::ColorLabel,
        Filler::Headers,
        Filler::Attachment,
    ];
    fillers.into_iter().map(|f| (f.field(), f)).collect()
}

/// Which dispatch table to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FillerRegistry {
    /// Identifiers come precomputed from a fetch session.
    Fetched,
    /// Identifiers come from an injected folder-info strategy.
    FolderInfo,
}

impl FillerRegistry {
    /// [`FillerRegistry::Fetched`] for fetch-session messages, otherwise
    /// [`FillerRegistry::FolderInfo`].
    pub fn for_message(message: &dyn WireMessage) -> Self {
        if message.fetch_metadata().is_some() {
            FillerRegistry::Fetched
        } else {
            FillerRegistry::FolderInfo
        }
    }

    fn table(self) -> &'static HashMap<MailField, Filler> {
        match self {
            FillerRegistry::Fetched => &*FETCHED_FILLERS,
            FillerRegistry::FolderInfo => &*FOLDER_INFO_FILLERS,
        }
    }

    /// Resolve requested fields to fillers, in request order and without
    /// duplicates. [`MailField::All`] expands to [`MailField::CANONICAL`];
    /// caller-filled fields are skipped.
    pub fn build_fillers(self, fields: &[MailField]) -> Result<Vec<Filler>> {
        let table = self.table();
        let mut fillers: Vec<Filler> = Vec::with_capacity(fields.len());
        for &field in fields {
            let expanded: &[MailField] = match field {
                MailField::All => &MailField::CANONICAL,
                _ => std::slice::from_ref(&field),
            };
            for &field in expanded {
                if field.is_caller_filled() {
                    debug!(field = %field, "Ignoring field filled by the caller");
                    continue;
                }
                let filler = *table
                    .get(&field)
                    .ok_or_else(|| ConvertError::InvalidField(field.to_string()))?;
                if !fillers.contains(&filler) {
                    fillers.push(filler);
                }
            }
        }
        Ok(fillers)
    }

    /// Like [`FillerRegistry::build_fillers`], from field names.
    pub fn build_fillers_from_names<S: AsRef<str>>(self, names: &[S]) -> Result<Vec<Filler>> {
        let mut fields = Vec::with_capacity(names.len());
        for name in names {
            fields.push(name.as_ref().parse::<MailField>()?);
        }
        self.build_fillers(&fields)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_expands_to_canonical() {
        let fillers = FillerRegistry::Fetched.build_fillers(&[MailField::All]).unwrap();
        let fields: Vec<_> = fillers.iter().map(|f| f.field()).collect();
        assert_eq!(fields, MailField::CANONICAL.to_vec());
    }

    #[test]
    fn test_id_source_follows_registry() {
        let fetched = FillerRegistry::Fetched.build_fillers(&[MailField::Id]).unwrap();
        assert_eq!(fetched, vec![Filler::MailId(IdSource::Fetched)]);
        let info = FillerRegistry::FolderInfo.build_fillers(&[MailField::FolderId]).unwrap();
        assert_eq!(info, vec![Filler::FolderId(IdSource::FolderInfo)]);
    }

    #[test]
    fn test_caller_filled_fields_ignored() {
        let fillers = FillerRegistry::FolderInfo
            .build_fillers(&[MailField::Body, MailField::Subject, MailField::Full, MailField::AccountName])
            .unwrap();
        assert_eq!(fillers, vec![Filler::Subject]);
    }

    #[test]
    fn test_duplicates_collapse_in_request_order() {
        let fillers = FillerRegistry::Fetched
            .build_fillers(&[MailField::Subject, MailField::From, MailField::Subject])
            .unwrap();
        assert_eq!(fillers, vec![Filler::Subject, Filler::From]);
    }

    #[test]
    fn test_unknown_name_is_invalid_field() {
        let err = FillerRegistry::Fetched
            .build_fillers_from_names(&["subject", "x-bogus"])
            .unwrap_err();
        assert!(matches!(err, ConvertError::InvalidField(name) if name == "x-bogus"));
    }

    #[test]
    fn test_names_with_dashes() {
        let fillers = FillerRegistry::Fetched
            .build_fillers_from_names(&["reply-to", "COLOR_LABEL", "body"])
            .unwrap();
        assert_eq!(fillers, vec![Filler::ReplyTo, Filler::ColorLabel]);
    }
}
