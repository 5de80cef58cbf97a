//! Hash helpers used for txids, key fingerprints and address payloads.

use ripemd::Ripemd160;
use sha2::{Digest, Sha256};

pub type Hash160 = [u8; 20];
pub type Hash256 = [u8; 32];

/// RIPEMD160(SHA256(data)).
pub fn hash160(data: &[u8]) -> Hash160 {
    Ripemd160::digest(Sha256::digest(data)).into()
}

/// SHA256(SHA256(data)).
pub fn sha256d(data: &[u8]) -> Hash256 {
    Sha256::digest(Sha256::digest(data)).into()
}

/// Flips a 32-byte hash between wire order and display order.
pub fn reversed(hash: &Hash256) -> Hash256 {
    let mut out = *hash;
    out.reverse();
    out
}

/// Hex in display order, the way block explorers print txids.
pub fn to_display_hex(hash: &Hash256) -> String {
    hex::encode(reversed(hash))
}
