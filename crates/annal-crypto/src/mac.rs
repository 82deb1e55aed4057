//! Keyed record signatures (HMAC-SHA256).
//!
//! A [`RecordSignature`] proves the writer held the configured secret when
//! the record was appended. It is computed over the raw 32 bytes of the
//! record's [`ContentHash`], never over the record itself, so a signature
//! can be re-checked from the stored hash alone.

use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::fmt;
use subtle::ConstantTimeEq;
use zeroize::Zeroizing;

use crate::error::{CryptoError, CryptoResult};
use crate::hash::ContentHash;

type HmacSha256 = Hmac<Sha256>;

/// Secret key used to sign record hashes.
///
/// The secret is wiped from memory on drop. `Debug` prints a short
/// fingerprint, never the secret.
#[derive(Clone)]
pub struct SigningKey {
    secret: Zeroizing<Vec<u8>>,
}

impl SigningKey {
    /// Create a signing key from a secret.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::EmptyKey`] if the secret is empty.
    pub fn new(secret: impl AsRef<[u8]>) -> CryptoResult<Self> {
        let secret = secret.as_ref();
        if secret.is_empty() {
            return Err(CryptoError::EmptyKey);
        }
        Ok(Self {
            secret: Zeroizing::new(secret.to_vec()),
        })
    }

    fn mac(&self) -> CryptoResult<HmacSha256> {
        HmacSha256::new_from_slice(&self.secret).map_err(|e| CryptoError::InvalidKey(e.to_string()))
    }

    /// Sign a record hash.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::InvalidKey`] if the MAC rejects the key.
    pub fn sign(&self, hash: &ContentHash) -> CryptoResult<RecordSignature> {
        let mut mac = self.mac()?;
        mac.update(hash.as_bytes());
        let digest = mac.finalize().into_bytes();
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(&digest);
        Ok(RecordSignature(bytes))
    }

    /// Verify a signature over a record hash in constant time.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::SignatureVerificationFailed`] on mismatch.
    pub fn verify(&self, hash: &ContentHash, signature: &RecordSignature) -> CryptoResult<()> {
        let expected = self.sign(hash)?;
        if bool::from(expected.0[..].ct_eq(&signature.0[..])) {
            Ok(())
        } else {
            Err(CryptoError::SignatureVerificationFailed)
        }
    }

    /// Short non-secret identifier of this key.
    #[must_use]
    pub fn fingerprint(&self) -> String {
        ContentHash::hash_with_domain("annal signing key fingerprint", &self.secret).short()
    }
}

impl fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningKey")
            .field("fingerprint", &self.fingerprint())
            .finish_non_exhaustive()
    }
}

/// An HMAC-SHA256 signature (32 bytes).
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct RecordSignature([u8; 32]);

impl RecordSignature {
    /// Create from raw bytes.
    #[must_use]
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Get the raw bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Encode as lowercase hex.
    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Decode from hex.
    ///
    /// # Errors
    ///
    /// Returns an error if the string is not valid hex or not 32 bytes.
    pub fn from_hex(s: &str) -> CryptoResult<Self> {
        let bytes = hex::decode(s).map_err(|_| CryptoError::InvalidHexEncoding)?;
        let actual = bytes.len();
        let bytes: [u8; 32] = bytes
            .try_into()
            .map_err(|_| CryptoError::InvalidLength {
                expected: 32,
                actual,
            })?;
        Ok(Self(bytes))
    }
}

impl fmt::Debug for RecordSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RecordSignature({})", &self.to_hex()[..16])
    }
}

impl fmt::Display for RecordSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl Serialize for RecordSignature {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for RecordSignature {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(serde::de::Error::custom)
    }
}
