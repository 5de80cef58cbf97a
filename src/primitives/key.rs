//! Public keys as they appear in PSBT records.

use crate::{HwiError, Result};
use std::cmp::Ordering;
use std::fmt;

/// A secp256k1 public key together with the encoding it was read in.
///
/// Legacy scripts commit to the exact key bytes, so a key that arrived
/// uncompressed must be written back uncompressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PublicKey {
    pub compressed: bool,
    pub inner: secp256k1::PublicKey,
}

impl PublicKey {
    /// Compressed (33-byte) form.
    pub fn new(inner: secp256k1::PublicKey) -> Self {
        PublicKey { compressed: true, inner }
    }

    pub fn new_uncompressed(inner: secp256k1::PublicKey) -> Self {
        PublicKey { compressed: false, inner }
    }

    /// Parses a 33-byte compressed or 65-byte uncompressed key.
    pub fn from_slice(data: &[u8]) -> Result<Self> {
        let compressed = match data.len() {
            33 => true,
            65 => false,
            len => return Err(HwiError::invalid_input(format!("Invalid public key length {}", len))),
        };
        let inner = secp256k1::PublicKey::from_slice(data)
            .map_err(|e| HwiError::invalid_input(format!("Invalid public key: {}", e)))?;
        Ok(PublicKey { compressed, inner })
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        if self.compressed {
            self.inner.serialize().to_vec()
        } else {
            self.inner.serialize_uncompressed().to_vec()
        }
    }
}

impl From<secp256k1::PublicKey> for PublicKey {
    fn from(inner: secp256k1::PublicKey) -> Self {
        PublicKey::new(inner)
    }
}

// Ordered by serialized bytes, the order PSBT writers emit records in.
impl Ord for PublicKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.to_bytes().cmp(&other.to_bytes())
    }
}

impl PartialOrd for PublicKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.to_bytes()))
    }
}
