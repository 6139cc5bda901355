use thiserror::Error;

use crate::types::Cid;

pub type CdropResult<T> = Result<T, CdropError>;

/// Failures surfaced by the encryption pipeline.
///
/// Every variant carries owned, cloneable context so a single in-flight
/// outcome can be handed to several waiters on the same CID.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CdropError {
    /// The recovery phrase could not be parsed into a wallet credential.
    #[error("recovery phrase is not a valid wallet mnemonic: {reason}")]
    KeyDerivationFallback { reason: String },

    #[error("fetch failed for {cid}: {reason}")]
    Fetch {
        cid: Cid,
        reason: String,
        retryable: bool,
    },

    #[error("encryption failed: {reason}")]
    Encryption { reason: String },

    /// Wrong key or corrupt envelope.
    #[error(
        "decryption failed{}: {reason}",
        .cid.as_ref().map(|c| format!(" for {c}")).unwrap_or_default()
    )]
    Decryption { cid: Option<Cid>, reason: String },

    /// A required identifying field was missing or malformed.
    #[error("invalid {field}: {reason}")]
    Validation { field: &'static str, reason: String },

    #[error("upload failed: {reason}")]
    Upload { reason: String },

    #[error("request for {cid} was cancelled")]
    Cancelled { cid: Cid },

    #[error("config error: {0}")]
    Config(String),
}

impl CdropError {
    pub fn decryption(reason: impl Into<String>) -> Self {
        CdropError::Decryption {
            cid: None,
            reason: reason.into(),
        }
    }

    pub fn validation(field: &'static str, reason: impl Into<String>) -> Self {
        CdropError::Validation {
            field,
            reason: reason.into(),
        }
    }

    /// Attach a CID to a decryption failure raised below the orchestrator.
    pub fn with_cid(self, cid: &Cid) -> Self {
        match self {
            CdropError::Decryption { cid: None, reason } => CdropError::Decryption {
                cid: Some(cid.clone()),
                reason,
            },
            other => other,
        }
    }

    /// Whether retrying the same request could succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            CdropError::Fetch { retryable, .. } => *retryable,
            CdropError::Cancelled { .. } => true,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decryption_message_includes_cid_when_known() {
        let cid = Cid::new("bafyexample").unwrap();
        let err = CdropError::decryption("authentication tag mismatch").with_cid(&cid);
        assert_eq!(
            err.to_string(),
            "decryption failed for bafyexample: authentication tag mismatch"
        );

        let bare = CdropError::decryption("bad base64");
        assert_eq!(bare.to_string(), "decryption failed: bad base64");
    }

    #[test]
    fn with_cid_leaves_other_variants_alone() {
        let cid = Cid::new("bafy1").unwrap();
        let err = CdropError::validation("originalName", "empty").with_cid(&cid);
        assert!(matches!(err, CdropError::Validation { field: "originalName", .. }));
    }

    #[test]
    fn retryable_classification() {
        let cid = Cid::new("bafy2").unwrap();
        let transient = CdropError::Fetch {
            cid: cid.clone(),
            reason: "connection reset".into(),
            retryable: true,
        };
        assert!(transient.is_retryable());
        assert!(!CdropError::decryption("wrong key").is_retryable());
        assert!(CdropError::Cancelled { cid }.is_retryable());
    }
}
