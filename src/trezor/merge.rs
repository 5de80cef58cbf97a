//! Writes device signatures back into a PSBT.

use super::request::sole_key;
use crate::primitives::bip32::Fingerprint;
use crate::primitives::psbt::PartiallySignedTransaction;
use crate::{HwiError, Result};

/// Sighash byte appended to every device signature.
pub const SIGHASH_ALL: u8 = 0x01;

#[derive(Debug, Clone, Copy)]
pub struct SignatureMerger {
    master_fingerprint: Fingerprint,
}

impl SignatureMerger {
    pub fn new(master_fingerprint: Fingerprint) -> Self {
        Self { master_fingerprint }
    }

    /// Stores `signatures[i]` under the key of input `i` when that key
    /// belongs to this device. Returns how many signatures were written.
    ///
    /// The PSBT is only touched once every input has been checked, so an
    /// error leaves it as it was.
    pub fn merge(&self, psbt: &mut PartiallySignedTransaction, signatures: &[Vec<u8>]) -> Result<usize> {
        if signatures.len() != psbt.inputs.len() {
            return Err(HwiError::SignatureCountMismatch {
                expected: psbt.inputs.len(),
                actual: signatures.len(),
            });
        }

        let mut updates = Vec::with_capacity(signatures.len());
        for (index, (input, signature)) in psbt.inputs.iter().zip(signatures).enumerate() {
            let (pubkey, origin) = sole_key(index, input)?;
            if origin.fingerprint != self.master_fingerprint {
                continue;
            }
            if signature.is_empty() {
                return Err(HwiError::invalid_input(format!("Device returned an empty signature for input {}", index)));
            }
            let mut with_sighash = Vec::with_capacity(signature.len() + 1);
            with_sighash.extend_from_slice(signature);
            with_sighash.push(SIGHASH_ALL);
            updates.push((index, *pubkey, with_sighash));
        }

        let written = updates.len();
        for (index, pubkey, signature) in updates {
            psbt.add_signature(index, pubkey, signature)?;
        }
        log::debug!("Merged {} of {} signatures", written, signatures.len());
        Ok(written)
    }
}
