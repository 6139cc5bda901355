use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{CdropError, CdropResult};
use crate::ENCRYPTED_SUFFIX;

/// Content identifier issued by the object store for an uploaded envelope.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Cid(String);

impl Cid {
    pub fn new(raw: impl Into<String>) -> CdropResult<Self> {
        let raw = raw.into();
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(CdropError::validation("cid", "content identifier is empty"));
        }
        if trimmed.contains('/') || trimmed.chars().any(char::is_whitespace) {
            return Err(CdropError::validation(
                "cid",
                format!("content identifier contains a path separator or whitespace: {trimmed:?}"),
            ));
        }
        Ok(Cid(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Cid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Cid {
    type Error = CdropError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Cid::new(value)
    }
}

impl From<Cid> for String {
    fn from(cid: Cid) -> Self {
        cid.0
    }
}

/// A local file about to be encrypted, with its cleartext attributes.
#[derive(Clone)]
pub struct PlaintextFile {
    pub original_name: String,
    pub original_type: String,
    pub bytes: Vec<u8>,
}

impl PlaintextFile {
    pub fn new(
        original_name: impl Into<String>,
        original_type: impl Into<String>,
        bytes: Vec<u8>,
    ) -> Self {
        Self {
            original_name: original_name.into(),
            original_type: original_type.into(),
            bytes,
        }
    }

    pub fn original_size(&self) -> u64 {
        self.bytes.len() as u64
    }
}

impl fmt::Debug for PlaintextFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlaintextFile")
            .field("original_name", &self.original_name)
            .field("original_type", &self.original_type)
            .field("original_size", &self.bytes.len())
            .finish()
    }
}

/// An encrypted wrapper artifact plus the cleartext metadata that travels
/// beside it. The envelope itself carries no metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedUpload {
    pub envelope: String,
    /// `<original_name>.encrypted`
    pub wrapper_name: String,
    /// Always `application/encrypted`
    pub wrapper_type: String,
    pub original_name: String,
    pub original_type: String,
    pub original_size: u64,
}

/// Response body of the upload and delete endpoints.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// A file listing row as returned by the application's file index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileRef {
    pub cid: Cid,
    /// Stored (wrapper) name, e.g. `photo.jpg.encrypted`
    pub name: String,
    #[serde(default)]
    pub original_name: Option<String>,
    #[serde(default)]
    pub original_type: Option<String>,
    #[serde(default)]
    pub original_size: Option<u64>,
    #[serde(default)]
    pub is_encrypted: bool,
}

impl FileRef {
    /// Encrypted either by explicit flag or by the wrapper naming convention.
    pub fn is_encrypted(&self) -> bool {
        self.is_encrypted || self.name.ends_with(ENCRYPTED_SUFFIX)
    }

    /// The name to show the user: the recorded original name, or the stored
    /// name with the wrapper suffix removed.
    pub fn display_name(&self) -> &str {
        match self.original_name.as_deref() {
            Some(name) if !name.is_empty() => name,
            _ => self
                .name
                .strip_suffix(ENCRYPTED_SUFFIX)
                .unwrap_or(&self.name),
        }
    }
}
