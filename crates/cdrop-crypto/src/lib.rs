//! cdrop-crypto: client-side envelope encryption for CipherDrop
//!
//! Pipeline: recovery phrase → wallet private key → SHA-256 → encryption key
//!
//! ```text
//! Recovery phrase (BIP-39)
//!   └── seed (PBKDF2-HMAC-SHA512, empty passphrase)
//!       └── m/44'/60'/0'/0/0 secp256k1 private key ("0x…" hex)
//!           └── EncryptionKey = hex(SHA-256(private key text))
//!               └── per-envelope AES-256-GCM key = HKDF-SHA256(key, random salt)
//! ```
//!
//! Envelopes are single base64 strings and carry everything needed to
//! decrypt except the key. File metadata is never embedded.

pub mod envelope;
pub mod hd;
pub mod kdf;
pub mod keys;
pub mod recovery;

pub use envelope::{decrypt, decrypt_blocking, encrypt, encrypt_blocking};
pub use kdf::{
    derive_key_from_private_key, derive_key_from_recovery_phrase,
    try_derive_key_from_recovery_phrase,
};
pub use keys::{DerivedKey, EncryptionKey, KeySource};
pub use recovery::{generate_recovery_phrase, PhraseLength};

/// Size of the AES-256 key in bytes
pub const KEY_SIZE: usize = 32;

/// Size of the per-envelope HKDF salt
pub const SALT_SIZE: usize = 8;

/// Size of an AES-GCM nonce (96-bit)
pub const NONCE_SIZE: usize = 12;

/// Size of a GCM authentication tag
pub const TAG_SIZE: usize = 16;

/// Lowercase hex helpers
pub(crate) mod hex {
    pub fn encode(data: &[u8]) -> String {
        let mut s = String::with_capacity(data.len() * 2);
        for byte in data {
            s.push_str(&format!("{:02x}", byte));
        }
        s
    }
}
