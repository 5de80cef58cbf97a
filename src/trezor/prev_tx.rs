//! Serves previous transactions out of the PSBT being signed.

use super::messages::{PrevTxInput, PrevTxOutput, TransactionType};
use super::transport::PrevTxSource;
use crate::primitives::hash::{reversed, to_display_hex, Hash256};
use crate::primitives::psbt::PartiallySignedTransaction;
use crate::primitives::transaction::Transaction;
use crate::{HwiError, Result};

/// Answers the device's previous-transaction requests from the
/// `non_witness_utxo` records of a PSBT. No network lookups are made.
pub struct PsbtPrevTxResolver<'a> {
    psbt: &'a PartiallySignedTransaction,
}

impl<'a> PsbtPrevTxResolver<'a> {
    pub fn new(psbt: &'a PartiallySignedTransaction) -> Self {
        Self { psbt }
    }

    /// Finds the embedded transaction whose txid matches `txhash`
    /// (display order) and converts it for the device.
    pub fn resolve(&self, txhash: &Hash256) -> Result<TransactionType> {
        let wanted = reversed(txhash);
        for tx in self.psbt.inputs.iter().filter_map(|i| i.non_witness_utxo.as_ref()) {
            if tx.txid()? == wanted {
                log::debug!("Serving previous transaction {}", hex::encode(txhash));
                return Ok(describe(tx));
            }
        }
        Err(HwiError::PrevTxNotFound(to_display_hex(&wanted)))
    }
}

impl PrevTxSource for PsbtPrevTxResolver<'_> {
    fn get_tx(&self, txhash: &Hash256) -> Result<TransactionType> {
        self.resolve(txhash)
    }
}

fn describe(tx: &Transaction) -> TransactionType {
    TransactionType {
        version: tx.version,
        lock_time: tx.lock_time,
        inputs: tx
            .input
            .iter()
            .map(|txin| PrevTxInput {
                prev_hash: reversed(&txin.previous_output.txid),
                prev_index: txin.previous_output.vout,
                script_sig: txin.script_sig.as_bytes().to_vec(),
                sequence: txin.sequence,
            })
            .collect(),
        bin_outputs: tx
            .output
            .iter()
            .map(|out| PrevTxOutput {
                amount: out.value,
                script_pubkey: out.script_pubkey.as_bytes().to_vec(),
            })
            .collect(),
    }
}
