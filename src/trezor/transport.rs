//! The boundary to the physical device.
//!
//! USB/HID framing and the protobuf wire codec live behind these traits;
//! this crate only drives the protocol.

use super::messages::{SignTxRequest, TransactionType};
use crate::hw::Transport;
use crate::primitives::bip32::DerivationPath;
use crate::primitives::hash::Hash256;
use crate::Result;

/// Supplies previous transactions on demand during signing.
pub trait PrevTxSource: Send + Sync {
    /// `txhash` is in display order, as the device sends it.
    fn get_tx(&self, txhash: &Hash256) -> Result<TransactionType>;
}

/// An open Trezor session.
#[async_trait::async_trait]
pub trait DeviceTransport: Transport {
    /// Serialized extended public key at `path`, always mainnet-versioned.
    async fn get_public_node(&mut self, path: &DerivationPath) -> Result<String>;

    /// Runs the signing exchange and returns one DER signature per request
    /// input, in request order. `prev_txs` is consulted for legacy inputs.
    async fn sign_tx(&mut self, request: &SignTxRequest, prev_txs: &dyn PrevTxSource) -> Result<Vec<Vec<u8>>>;
}

/// Finds attached devices and opens sessions on them by path.
pub trait TransportFactory: Send + Sync {
    /// Paths of the attached devices this factory can open.
    fn enumerate(&self) -> Result<Vec<String>>;

    /// `passphrase` applies to this session only.
    fn open(&self, path: &str, passphrase: Option<&str>) -> Result<Box<dyn DeviceTransport>>;
}
