//! BIP-32 private-key derivation over secp256k1
//!
//! Only what wallet recovery needs: master key from a BIP-39 seed and private
//! (parent secret → child secret) derivation along a fixed path.

use hmac::{Hmac, Mac};
use k256::elliptic_curve::sec1::ToEncodedPoint;
use k256::elliptic_curve::PrimeField;
use k256::{FieldBytes, Scalar, SecretKey};
use sha2::Sha512;
use zeroize::Zeroize;

use crate::KEY_SIZE;

type HmacSha512 = Hmac<Sha512>;

/// Offset marking a hardened child index.
pub const HARDENED: u32 = 0x8000_0000;

/// First Ethereum account: m/44'/60'/0'/0/0
pub const ETHEREUM_ACCOUNT_0: [u32; 5] = [44 | HARDENED, 60 | HARDENED, HARDENED, 0, 0];

/// An extended private key (secret scalar + chain code). Zeroized on drop.
pub struct ExtendedKey {
    secret: [u8; KEY_SIZE],
    chain_code: [u8; 32],
}

impl ExtendedKey {
    /// Master key: HMAC-SHA512(key = "Bitcoin seed", data = seed).
    pub fn master(seed: &[u8]) -> anyhow::Result<Self> {
        let mut mac = HmacSha512::new_from_slice(b"Bitcoin seed")
            .map_err(|e| anyhow::anyhow!("HMAC init failed: {e}"))?;
        mac.update(seed);
        let mut out = mac.finalize().into_bytes();
        let key = Self::from_hmac_output(&out, None);
        out.as_mut_slice().zeroize();
        key
    }

    /// Derive one child. Indices at or above [`HARDENED`] are hardened.
    pub fn child(&self, index: u32) -> anyhow::Result<Self> {
        let mut mac = HmacSha512::new_from_slice(&self.chain_code)
            .map_err(|e| anyhow::anyhow!("HMAC init failed: {e}"))?;

        if index >= HARDENED {
            mac.update(&[0u8]);
            mac.update(&self.secret);
        } else {
            let secret = SecretKey::from_slice(&self.secret)
                .map_err(|e| anyhow::anyhow!("invalid parent secret: {e}"))?;
            let point = secret.public_key().to_encoded_point(true);
            mac.update(point.as_bytes());
        }
        mac.update(&index.to_be_bytes());

        let mut out = mac.finalize().into_bytes();
        let key = Self::from_hmac_output(&out, Some(&self.secret));
        out.as_mut_slice().zeroize();
        key
    }

    /// Walk a full derivation path from this key.
    pub fn derive_path(&self, path: &[u32]) -> anyhow::Result<Self> {
        let mut current = Self {
            secret: self.secret,
            chain_code: self.chain_code,
        };
        for &index in path {
            current = current.child(index)?;
        }
        Ok(current)
    }

    pub fn secret_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.secret
    }

    /// Split I = I_L || I_R; the new secret is I_L (+ parent secret mod n).
    fn from_hmac_output(out: &[u8], parent: Option<&[u8; KEY_SIZE]>) -> anyhow::Result<Self> {
        let (il, ir) = out.split_at(KEY_SIZE);

        let tweak = parse_scalar(il)
            .ok_or_else(|| anyhow::anyhow!("derived key material out of range"))?;
        let scalar = match parent {
            Some(parent) => {
                let parent = parse_scalar(parent)
                    .ok_or_else(|| anyhow::anyhow!("parent secret out of range"))?;
                tweak + parent
            }
            None => tweak,
        };
        if scalar == Scalar::ZERO {
            anyhow::bail!("derived key is zero");
        }

        let mut secret = [0u8; KEY_SIZE];
        secret.copy_from_slice(&scalar.to_bytes());
        let mut chain_code = [0u8; 32];
        chain_code.copy_from_slice(ir);

        Ok(Self { secret, chain_code })
    }
}

impl Drop for ExtendedKey {
    fn drop(&mut self) {
        self.secret.zeroize();
        self.chain_code.zeroize();
    }
}

impl std::fmt::Debug for ExtendedKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExtendedKey")
            .field("secret", &"[REDACTED]")
            .finish()
    }
}

/// Big-endian bytes → scalar, rejecting values >= n.
fn parse_scalar(bytes: &[u8]) -> Option<Scalar> {
    Option::from(Scalar::from_repr(*FieldBytes::from_slice(bytes)))
}
