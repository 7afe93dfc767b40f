//! Salted keyed hashing for redaction.
//!
//! Uses HMAC-SHA256 keyed with the per-deployment salt. Output is the full
//! 32-byte digest, hex encoded and labelled with the salt's key id so hashes
//! produced under different salt generations are distinguishable.

use crate::error::{RedactionError, Result};
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use std::fmt;

/// Algorithm label recorded in policy summaries.
pub const HASH_ALGORITHM: &str = "hmac-sha256";

/// Size of a generated salt in bytes.
pub const SALT_BYTES: usize = 32;

/// Prefix of every hashed value.
pub const HASH_PREFIX: &str = "[HASH:";

type HmacSha256 = Hmac<Sha256>;

/// The per-deployment hashing salt.
///
/// Can be read from configuration but never serialized; `Debug` and
/// `Display` print a placeholder.
#[derive(Clone, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct HashSalt(String);

impl HashSalt {
    pub fn new(salt: impl Into<String>) -> Self {
        Self(salt.into())
    }

    /// Generate a random salt (hex encoded).
    pub fn generate() -> Result<Self> {
        let mut bytes = [0u8; SALT_BYTES];
        getrandom::getrandom(&mut bytes).map_err(|e| {
            RedactionError::configuration(format!("failed to generate random salt: {}", e))
        })?;
        Ok(Self(hex::encode(bytes)))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The secret itself. Only for handing a freshly generated salt to an operator.
    pub fn reveal(&self) -> &str {
        &self.0
    }

    fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl fmt::Debug for HashSalt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("HashSalt([REDACTED])")
    }
}

impl fmt::Display for HashSalt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[REDACTED]")
    }
}

/// HMAC-SHA256 keyed with a [`HashSalt`].
#[derive(Clone, Debug)]
pub struct KeyedHasher {
    salt: HashSalt,
    key_id: String,
}

impl KeyedHasher {
    pub fn new(salt: HashSalt, key_id: impl Into<String>) -> Self {
        Self {
            salt,
            key_id: key_id.into(),
        }
    }

    pub fn key_id(&self) -> &str {
        &self.key_id
    }

    pub fn has_salt(&self) -> bool {
        !self.salt.is_empty()
    }

    /// Hex HMAC-SHA256 digest of `input`.
    pub fn digest_hex(&self, input: &str) -> String {
        let mut mac =
            HmacSha256::new_from_slice(self.salt.as_bytes()).expect("HMAC can take key of any size");
        mac.update(input.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    /// Labelled hash: `[HASH:<key_id>:<64 hex chars>]`.
    pub fn hash(&self, input: &str) -> String {
        format!("{}{}:{}]", HASH_PREFIX, self.key_id, self.digest_hex(input))
    }

    /// Length of every value produced by [`KeyedHasher::hash`].
    pub fn hash_len(&self) -> usize {
        HASH_PREFIX.len() + self.key_id.len() + 1 + 64 + 1
    }
}

/// Whether a string looks like a value produced by [`KeyedHasher::hash`].
pub fn is_hashed(value: &str) -> bool {
    value.starts_with(HASH_PREFIX) && value.ends_with(']')
}
