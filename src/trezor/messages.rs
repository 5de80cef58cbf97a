//! Request and response shapes of the Trezor signing protocol.
//!
//! Hashes in these messages are in display order (the reverse of the
//! consensus serialization), which is what the device expects.

use crate::primitives::bip32::DerivationPath;
use crate::primitives::hash::Hash256;

/// How the device should spend an input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputScriptType {
    /// Legacy P2PKH
    SpendAddress,
    /// P2WPKH nested in P2SH
    SpendP2shWitness,
    /// Native P2WPKH
    SpendWitness,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputScriptType {
    PayToAddress,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxInputType {
    pub prev_hash: Hash256,
    pub prev_index: u32,
    pub sequence: u32,
    /// Only set when the input's key belongs to this device.
    pub address_n: Option<DerivationPath>,
    pub script_type: InputScriptType,
    pub amount: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxOutputType {
    pub amount: u64,
    pub address: String,
    pub script_type: OutputScriptType,
}

/// Everything the device needs to sign a transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignTxRequest {
    /// "Bitcoin" or "Testnet"
    pub coin_name: String,
    pub inputs: Vec<TxInputType>,
    pub outputs: Vec<TxOutputType>,
    pub version: i32,
    pub lock_time: u32,
}

/// Input of a previous transaction, as streamed back to the device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrevTxInput {
    pub prev_hash: Hash256,
    pub prev_index: u32,
    pub script_sig: Vec<u8>,
    pub sequence: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrevTxOutput {
    pub amount: u64,
    pub script_pubkey: Vec<u8>,
}

/// A previous transaction the device asked for while signing a legacy input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionType {
    pub version: i32,
    pub lock_time: u32,
    pub inputs: Vec<PrevTxInput>,
    pub bin_outputs: Vec<PrevTxOutput>,
}
