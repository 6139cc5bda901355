//! Key derivation: recovery phrase / private key → encryption key
//!
//! Both entry points are pure: no I/O, no shared state, safe to call from any
//! thread. Identical input always yields the identical key.

use secrecy::ExposeSecret;
use sha2::{Digest, Sha256};
use tracing::warn;

use cdrop_core::{CdropError, CdropResult};

use crate::keys::{DerivedKey, EncryptionKey, KeySource};
use crate::recovery::wallet_private_key;

/// Hash a raw private key string into an encryption key.
///
/// The key is the lowercase hex SHA-256 digest of the string's UTF-8 bytes,
/// so it is always 64 characters long.
pub fn derive_key_from_private_key(private_key: &str) -> EncryptionKey {
    EncryptionKey::new(sha256_hex(private_key.as_bytes()))
}

/// Derive an encryption key from a recovery phrase, failing if the phrase is
/// not a valid BIP-39 mnemonic.
pub fn try_derive_key_from_recovery_phrase(phrase: &str) -> CdropResult<EncryptionKey> {
    let private_key = wallet_private_key(phrase.trim()).map_err(|e| {
        CdropError::KeyDerivationFallback {
            reason: e.to_string(),
        }
    })?;
    Ok(derive_key_from_private_key(private_key.expose_secret()))
}

/// Derive an encryption key from a recovery phrase. Never fails.
///
/// If the phrase cannot be reconstructed into a wallet credential the key is
/// hashed from the trimmed phrase text instead. That path is lower assurance:
/// it is logged and reported as [`KeySource::PhraseFallback`].
pub fn derive_key_from_recovery_phrase(phrase: &str) -> DerivedKey {
    let normalized = phrase.trim();
    match try_derive_key_from_recovery_phrase(normalized) {
        Ok(key) => DerivedKey {
            key,
            source: KeySource::Wallet,
        },
        Err(e) => {
            warn!(
                error = %e,
                "recovery phrase did not reconstruct a wallet; hashing raw phrase (lower assurance)"
            );
            DerivedKey {
                key: EncryptionKey::new(sha256_hex(normalized.as_bytes())),
                source: KeySource::PhraseFallback,
            }
        }
    }
}

fn sha256_hex(data: &[u8]) -> String {
    crate::hex::encode(&Sha256::digest(data))
}
