//! BIP-39 recovery phrases and wallet credential reconstruction
//!
//! A recovery phrase deterministically reconstructs the wallet's first
//! Ethereum account. The phrase is never stored digitally by this crate.

use bip39::Mnemonic;
use rand::RngCore;
use secrecy::SecretString;
use zeroize::Zeroize;

use crate::hd::{ExtendedKey, ETHEREUM_ACCOUNT_0};

/// Supported phrase lengths
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PhraseLength {
    /// 12 words = 128 bits of entropy
    #[default]
    Words12,
    /// 24 words = 256 bits of entropy
    Words24,
}

impl PhraseLength {
    fn entropy_bytes(self) -> usize {
        match self {
            PhraseLength::Words12 => 16,
            PhraseLength::Words24 => 32,
        }
    }
}

/// Generate a new BIP-39 English recovery phrase.
///
/// The phrase should be displayed once and never stored digitally.
pub fn generate_recovery_phrase(length: PhraseLength) -> anyhow::Result<SecretString> {
    let mut entropy = [0u8; 32];
    let entropy = &mut entropy[..length.entropy_bytes()];
    rand::thread_rng().fill_bytes(entropy);

    let mnemonic = Mnemonic::from_entropy(entropy)
        .map_err(|e| anyhow::anyhow!("BIP-39 mnemonic generation failed: {e}"));
    entropy.zeroize();

    Ok(SecretString::from(mnemonic?.to_string()))
}

/// Reconstruct the wallet private key (`0x`-prefixed lowercase hex) for the
/// account at m/44'/60'/0'/0/0 of a recovery phrase.
///
/// Whitespace around and between words is normalized. The BIP-39 seed uses
/// an empty passphrase.
pub fn wallet_private_key(phrase: &str) -> anyhow::Result<SecretString> {
    let mnemonic: Mnemonic = phrase
        .trim()
        .parse()
        .map_err(|e| anyhow::anyhow!("invalid BIP-39 mnemonic: {e}"))?;

    let mut seed = mnemonic.to_seed_normalized("");
    let master = ExtendedKey::master(&seed);
    seed.zeroize();

    let account = master?.derive_path(&ETHEREUM_ACCOUNT_0)?;
    let hex = crate::hex::encode(account.secret_bytes());

    Ok(SecretString::from(format!("0x{hex}")))
}
