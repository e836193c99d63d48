//! Centralized error types for mailconv.

use thiserror::Error;

use crate::wire::WireError;

/// All errors produced by the conversion engine.
#[derive(Error, Debug)]
pub enum ConvertError {
    /// The message was removed from its folder while it was being read.
    #[error("Mail {mail_id} not found in folder '{folder}'")]
    MailNotFound { folder: String, mail_id: String },

    /// The message was removed and no folder context could be recovered.
    #[error("Mail not found")]
    NotFound,

    /// A requested field name is not known to the filler registry.
    #[error("Invalid mail field: {0}")]
    InvalidField(String),

    /// Low-level I/O failure unrelated to message removal.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A messaging error that left no computable answer.
    #[error("Messaging error: {0}")]
    Messaging(WireError),

    /// The Content-Type header could not be parsed, even after sanitizing.
    #[error("Malformed Content-Type: {0}")]
    ContentType(String),

    /// The outbound message could not be assembled.
    #[error("Compose error: {0}")]
    Compose(String),
}

/// Convenience alias for `Result<T, ConvertError>`.
pub type Result<T> = std::result::Result<T, ConvertError>;

impl ConvertError {
    /// `true` for both flavours of the "message is gone" error.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::MailNotFound { .. } | Self::NotFound)
    }
}

/// `Gone` becomes a bare [`ConvertError::NotFound`]; the converter enriches
/// it with folder and mail id when it can. Transport I/O failures surface as
/// [`ConvertError::Io`].
impl From<WireError> for ConvertError {
    fn from(source: WireError) -> Self {
        match source {
            WireError::Gone => Self::NotFound,
            WireError::Io(message) => Self::Io(std::io::Error::other(message)),
            other => Self::Messaging(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gone_maps_to_not_found() {
        let err: ConvertError = WireError::Gone.into();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_other_wire_errors_stay_messaging() {
        let err: ConvertError = WireError::Malformed("bad".into()).into();
        assert!(matches!(err, ConvertError::Messaging(WireError::Malformed(_))));
        assert!(!err.is_not_found());
    }

    #[test]
    fn test_mail_not_found_message() {
        let err = ConvertError::MailNotFound {
            folder: "INBOX".into(),
            mail_id: "42".into(),
        };
        assert_eq!(err.to_string(), "Mail 42 not found in folder 'INBOX'");
    }
}
