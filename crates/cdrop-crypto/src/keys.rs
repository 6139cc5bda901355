//! Encryption key material

use zeroize::Zeroize;

/// The per-user symmetric key handed to the envelope codec.
///
/// Keys derived by this crate are 64 lowercase hex characters, but the codec
/// accepts any non-empty string. Zeroized on drop.
#[derive(Clone, PartialEq, Eq)]
pub struct EncryptionKey {
    text: String,
}

impl EncryptionKey {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.text.as_bytes()
    }

    /// Short non-secret identifier for logs and CLI output.
    pub fn fingerprint(&self) -> String {
        use sha2::{Digest, Sha256};
        let digest = Sha256::digest(self.text.as_bytes());
        crate::hex::encode(&digest[..4])
    }
}

impl Drop for EncryptionKey {
    fn drop(&mut self) {
        self.text.zeroize();
    }
}

impl std::fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncryptionKey")
            .field("text", &"[REDACTED]")
            .finish()
    }
}

/// How a key from a recovery phrase was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeySource {
    /// Phrase parsed as a BIP-39 mnemonic; key hashed from the wallet's private key.
    Wallet,
    /// Phrase did not parse; key hashed from the raw phrase text (lower assurance).
    PhraseFallback,
}

/// A key derived from a recovery phrase, tagged with its assurance level.
#[derive(Debug, Clone)]
pub struct DerivedKey {
    pub key: EncryptionKey,
    pub source: KeySource,
}

impl DerivedKey {
    pub fn is_fallback(&self) -> bool {
        self.source == KeySource::PhraseFallback
    }

    pub fn into_key(self) -> EncryptionKey {
        self.key
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_redacts_key_text() {
        let key = EncryptionKey::new("super-secret");
        let rendered = format!("{key:?}");
        assert!(!rendered.contains("super-secret"));
        assert!(rendered.contains("REDACTED"));
    }

    #[test]
    fn fingerprint_is_stable_and_short() {
        let a = EncryptionKey::new("abc");
        let b = EncryptionKey::new("abc");
        assert_eq!(a.fingerprint(), b.fingerprint());
        assert_eq!(a.fingerprint().len(), 8);
        assert_ne!(a.fingerprint(), EncryptionKey::new("abd").fingerprint());
    }
}
