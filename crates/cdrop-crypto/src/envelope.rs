//! AES-256-GCM ciphertext envelopes
//!
//! Envelope format (base64, standard alphabet, padded):
//! ```text
//! ["CDROPgcm" (8)][salt (8)][nonce (12)][ciphertext (N)][GCM tag (16)]
//! ```
//!
//! The AES key for each envelope is HKDF-SHA256 over the encryption key text
//! with the envelope's random salt, so two envelopes of the same plaintext
//! under the same key never share key/nonce pairs. The envelope carries no
//! file metadata.
//!
//! OpenSSL `EVP_BytesToKey` envelopes (`Salted__` header, as written by
//! CryptoJS) are a different format and are rejected as unsupported.

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use hkdf::Hkdf;
use rand::RngCore;
use sha2::Sha256;
use zeroize::Zeroize;

use cdrop_core::{CdropError, CdropResult};

use crate::keys::EncryptionKey;
use crate::{KEY_SIZE, NONCE_SIZE, SALT_SIZE, TAG_SIZE};

/// Leading marker of every envelope.
pub const MAGIC: &[u8; 8] = b"CDROPgcm";

const OPENSSL_MAGIC: &[u8; 8] = b"Salted__";

const HEADER_SIZE: usize = MAGIC.len() + SALT_SIZE + NONCE_SIZE;

const HKDF_INFO: &[u8] = b"cdrop-envelope-v1";

/// Encrypt `plaintext` under `key` into a self-contained text envelope.
pub fn encrypt(plaintext: &[u8], key: &EncryptionKey) -> CdropResult<String> {
    if key.as_str().is_empty() {
        return Err(CdropError::validation("key", "encryption key is empty"));
    }

    let mut salt = [0u8; SALT_SIZE];
    let mut nonce_bytes = [0u8; NONCE_SIZE];
    let mut rng = rand::thread_rng();
    rng.fill_bytes(&mut salt);
    rng.fill_bytes(&mut nonce_bytes);

    let cipher = envelope_cipher(key, &salt).map_err(|reason| CdropError::Encryption { reason })?;
    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&nonce_bytes), plaintext)
        .map_err(|e| CdropError::Encryption {
            reason: format!("AES-GCM encryption failed: {e}"),
        })?;

    let mut raw = Vec::with_capacity(HEADER_SIZE + ciphertext.len());
    raw.extend_from_slice(MAGIC);
    raw.extend_from_slice(&salt);
    raw.extend_from_slice(&nonce_bytes);
    raw.extend_from_slice(&ciphertext);

    Ok(STANDARD.encode(raw))
}

/// Decrypt an envelope produced by [`encrypt`].
///
/// Returns exactly the original bytes. Any malformed input or key mismatch
/// is a [`CdropError::Decryption`]; an empty result always means an empty
/// plaintext.
pub fn decrypt(envelope: &str, key: &EncryptionKey) -> CdropResult<Vec<u8>> {
    if key.as_str().is_empty() {
        return Err(CdropError::validation("key", "encryption key is empty"));
    }

    let raw = STANDARD
        .decode(envelope.trim())
        .map_err(|e| CdropError::decryption(format!("envelope is not valid base64: {e}")))?;

    if raw.starts_with(OPENSSL_MAGIC) {
        return Err(CdropError::decryption(
            "OpenSSL-format (Salted__) envelopes are not supported",
        ));
    }
    if raw.len() < HEADER_SIZE + TAG_SIZE {
        return Err(CdropError::decryption(format!(
            "envelope too short: {} bytes (minimum {})",
            raw.len(),
            HEADER_SIZE + TAG_SIZE
        )));
    }

    let (magic, rest) = raw.split_at(MAGIC.len());
    if magic != MAGIC {
        return Err(CdropError::decryption("envelope header missing"));
    }
    let (salt, rest) = rest.split_at(SALT_SIZE);
    let (nonce_bytes, ciphertext) = rest.split_at(NONCE_SIZE);

    let cipher = envelope_cipher(key, salt).map_err(CdropError::decryption)?;
    cipher
        .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
        .map_err(|_| CdropError::decryption("wrong key or corrupted envelope"))
}

/// [`encrypt`] on the blocking thread pool, for large payloads.
pub async fn encrypt_blocking(plaintext: Vec<u8>, key: EncryptionKey) -> CdropResult<String> {
    tokio::task::spawn_blocking(move || encrypt(&plaintext, &key))
        .await
        .map_err(|e| CdropError::Encryption {
            reason: format!("encryption task failed: {e}"),
        })?
}

/// [`decrypt`] on the blocking thread pool, for large payloads.
pub async fn decrypt_blocking(envelope: String, key: EncryptionKey) -> CdropResult<Vec<u8>> {
    tokio::task::spawn_blocking(move || decrypt(&envelope, &key))
        .await
        .map_err(|e| CdropError::decryption(format!("decryption task failed: {e}")))?
}

fn envelope_cipher(key: &EncryptionKey, salt: &[u8]) -> Result<Aes256Gcm, String> {
    let hkdf = Hkdf::<Sha256>::new(Some(salt), key.as_bytes());
    let mut okm = [0u8; KEY_SIZE];
    hkdf.expand(HKDF_INFO, &mut okm)
        .map_err(|e| format!("HKDF expand failed: {e}"))?;

    let cipher = Aes256Gcm::new_from_slice(&okm).map_err(|e| format!("AES key setup: {e}"));
    okm.zeroize();
    cipher
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn key(s: &str) -> EncryptionKey {
        EncryptionKey::new(s)
    }

    #[test]
    fn test_ten_byte_roundtrip() {
        let plaintext: Vec<u8> = (1..=10).collect();

        let envelope = encrypt(&plaintext, &key("abc")).unwrap();
        let decrypted = decrypt(&envelope, &key("abc")).unwrap();
        assert_eq!(decrypted, plaintext);

        let wrong = decrypt(&envelope, &key("xyz"));
        assert!(matches!(wrong, Err(CdropError::Decryption { .. })));
    }

    #[test]
    fn test_empty_plaintext() {
        let envelope = encrypt(b"", &key("abc")).unwrap();
        let decrypted = decrypt(&envelope, &key("abc")).unwrap();
        assert!(decrypted.is_empty());
    }

    #[test]
    fn test_lengths_not_multiple_of_four() {
        let k = key("word-boundary");
        for len in [1usize, 2, 3, 5, 6, 7, 13, 1021, 4099] {
            let data: Vec<u8> = (0..len).map(|i| (i * 31 % 251) as u8).collect();
            let envelope = encrypt(&data, &k).unwrap();
            let out = decrypt(&envelope, &k).unwrap();
            assert_eq!(out.len(), len, "no trailing padding for length {len}");
            assert_eq!(out, data);
        }
    }

    #[test]
    fn test_envelope_is_single_base64_string() {
        let envelope = encrypt(b"payload", &key("abc")).unwrap();
        assert!(!envelope.contains(char::is_whitespace));

        let raw = STANDARD.decode(&envelope).unwrap();
        assert_eq!(&raw[..8], MAGIC);
        assert_eq!(raw.len(), HEADER_SIZE + 7 + TAG_SIZE);
    }

    #[test]
    fn test_encryption_is_randomized() {
        let k = key("abc");
        let a = encrypt(b"same input", &k).unwrap();
        let b = encrypt(b"same input", &k).unwrap();
        assert_ne!(a, b, "fresh salt and nonce per envelope");
    }

    #[test]
    fn test_surrounding_whitespace_ignored() {
        let k = key("abc");
        let envelope = encrypt(b"gateway text", &k).unwrap();
        let padded = format!("{envelope}\n");
        assert_eq!(decrypt(&padded, &k).unwrap(), b"gateway text");
    }

    #[test]
    fn test_tampered_envelope() {
        let k = key("abc");
        let envelope = encrypt(b"secret data", &k).unwrap();
        let mut raw = STANDARD.decode(&envelope).unwrap();
        let last = raw.len() - 1;
        raw[last] ^= 0xFF;

        let result = decrypt(&STANDARD.encode(raw), &k);
        assert!(matches!(result, Err(CdropError::Decryption { .. })));
    }

    #[test]
    fn test_malformed_envelopes() {
        let k = key("abc");
        let zeros = STANDARD.encode([0u8; 64]);
        for bad in ["", "not base64!!", "U2FsdGVkX18=", zeros.as_str()] {
            let result = decrypt(bad, &k);
            assert!(
                matches!(result, Err(CdropError::Decryption { .. })),
                "{bad:?} must be rejected"
            );
        }
    }

    #[test]
    fn test_openssl_envelope_reported_unsupported() {
        let mut raw = b"Salted__".to_vec();
        raw.extend_from_slice(&[0x5a; 40]);

        match decrypt(&STANDARD.encode(raw), &key("abc")) {
            Err(CdropError::Decryption { reason, .. }) => {
                assert!(reason.contains("not supported"), "{reason}")
            }
            other => panic!("expected unsupported-format error, got {other:?}"),
        }
    }

    #[test]
    fn test_empty_key_rejected() {
        assert!(matches!(
            encrypt(b"x", &key("")),
            Err(CdropError::Validation { field: "key", .. })
        ));
    }

    #[tokio::test]
    async fn test_blocking_helpers_roundtrip() {
        let k = key("offloaded");
        let data = vec![7u8; 300_001];
        let envelope = encrypt_blocking(data.clone(), k.clone()).await.unwrap();
        let out = decrypt_blocking(envelope, k).await.unwrap();
        assert_eq!(out, data);
    }

    proptest! {
        #[test]
        fn prop_roundtrip(data in proptest::collection::vec(any::<u8>(), 0..2048), k in "[ -~]{1,64}") {
            let k = EncryptionKey::new(k);
            let envelope = encrypt(&data, &k).unwrap();
            prop_assert_eq!(decrypt(&envelope, &k).unwrap(), data);
        }

        #[test]
        fn prop_wrong_key_never_yields_plaintext(
            data in proptest::collection::vec(any::<u8>(), 0..256),
            k1 in "[a-z]{1,16}",
            k2 in "[a-z]{1,16}",
        ) {
            prop_assume!(k1 != k2);
            let envelope = encrypt(&data, &EncryptionKey::new(k1)).unwrap();
            match decrypt(&envelope, &EncryptionKey::new(k2)) {
                Err(CdropError::Decryption { .. }) => {}
                Ok(out) => prop_assert_ne!(out, data),
                Err(other) => prop_assert!(false, "unexpected error: {other}"),
            }
        }
    }
}
