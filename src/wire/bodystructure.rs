//! IMAP `BODYSTRUCTURE` summaries.
//!
//! A summary describes a message's MIME tree without its content, so the
//! attachment walk can run before (or instead of) fetching the body.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::{MimePart, WireError};
use crate::model::content_type::{ContentDisposition, ContentType};

/// One node of a `BODYSTRUCTURE` tree.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BodyStructure {
    #[serde(rename = "type")]
    pub primary_type: String,
    pub subtype: String,
    pub params: BTreeMap<String, String>,
    pub disposition: Option<String>,
    pub disposition_params: BTreeMap<String, String>,
    /// Content-Transfer-Encoding of a leaf.
    pub encoding: Option<String>,
    /// Encoded size of a leaf in octets.
    pub size: Option<u64>,
    pub bodies: Vec<BodyStructure>,
}

impl BodyStructure {
    pub fn leaf(primary_type: &str, subtype: &str) -> Self {
        Self {
            primary_type: primary_type.to_string(),
            subtype: subtype.to_string(),
            ..Self::default()
        }
    }

    pub fn multipart(subtype: &str, bodies: Vec<BodyStructure>) -> Self {
        Self {
            primary_type: "multipart".to_string(),
            subtype: subtype.to_string(),
            bodies,
            ..Self::default()
        }
    }

    pub fn with_disposition(mut self, disposition: &str, params: &[(&str, &str)]) -> Self {
        self.disposition = Some(disposition.to_string());
        self.disposition_params = params
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        self
    }

    pub fn with_param(mut self, name: &str, value: &str) -> Self {
        self.params.insert(name.to_string(), value.to_string());
        self
    }

    pub fn with_encoding(mut self, encoding: &str, size: u64) -> Self {
        self.encoding = Some(encoding.to_string());
        self.size = Some(size);
        self
    }

    pub fn is_multipart(&self) -> bool {
        self.primary_type.eq_ignore_ascii_case("multipart")
    }

    /// Estimated decoded size of all leaves. Base64 leaves count 3/4 of
    /// their encoded size. `None` if any leaf lacks a size.
    pub fn estimated_size(&self) -> Option<u64> {
        if self.is_multipart() {
            return self
                .bodies
                .iter()
                .try_fold(0u64, |acc, b| Some(acc + b.estimated_size()?));
        }
        let size = self.size?;
        match self.encoding.as_deref() {
            Some(enc) if enc.eq_ignore_ascii_case("base64") => Some(size / 4 * 3),
            _ => Some(size),
        }
    }
}

impl MimePart for BodyStructure {
    fn content_type(&self) -> Result<ContentType, WireError> {
        let mut ct = ContentType::new(&self.primary_type, &self.subtype);
        for (name, value) in &self.params {
            ct.set_param(name, value.as_str());
        }
        Ok(ct)
    }

    fn disposition(&self) -> Result<Option<ContentDisposition>, WireError> {
        Ok(self.disposition.as_deref().map(|kind| {
            self.disposition_params
                .iter()
                .fold(ContentDisposition::new(kind), |d, (k, v)| d.with_param(k, v.as_str()))
        }))
    }

    fn children(&self) -> Result<Vec<&dyn MimePart>, WireError> {
        if !self.is_multipart() {
            return Err(WireError::Cast(format!(
                "{}/{} has no child parts",
                self.primary_type, self.subtype
            )));
        }
        Ok(self.bodies.iter().map(|b| b as &dyn MimePart).collect())
    }
}
