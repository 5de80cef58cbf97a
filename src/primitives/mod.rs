//! Bitcoin primitives needed to read a PSBT and describe it to a signer.

pub mod address;
pub mod bip32;
pub mod encode;
pub mod hash;
pub mod key;
pub mod psbt;
pub mod script;
pub mod transaction;
