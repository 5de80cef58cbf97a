#![allow(dead_code)]

use hwi_rs::hw::Transport;
use hwi_rs::primitives::bip32::{DerivationPath, ExtendedPublicKey, Fingerprint, Network};
use hwi_rs::primitives::hash::Hash256;
use hwi_rs::primitives::key::PublicKey;
use hwi_rs::primitives::psbt::{Bip32Derivation, PartiallySignedTransaction};
use hwi_rs::primitives::script::Script;
use hwi_rs::primitives::transaction::{OutPoint, Transaction, TxIn, TxOut};
use hwi_rs::trezor::{
    DeviceTransport, InputScriptType, PrevTxSource, SignTxRequest, TransactionType, TransportFactory,
};
use hwi_rs::{HwiConfig, HwiError, Result, TrezorClient};
use secp256k1::{Secp256k1, SecretKey};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Master fingerprint of the mock device.
pub const DEVICE_FP: Fingerprint = Fingerprint([0xd3, 0x4d, 0xb3, 0x3f]);
pub const OTHER_FP: Fingerprint = Fingerprint([0x12, 0x34, 0x56, 0x78]);

pub fn pubkey(seed: u8) -> PublicKey {
    let secp = Secp256k1::new();
    PublicKey::new(secp256k1::PublicKey::from_secret_key(
        &secp,
        &SecretKey::from_slice(&[seed; 32]).unwrap(),
    ))
}

/// The mainnet xpub the default mock device reports for `path`.
pub fn mock_xpub(path: &DerivationPath) -> String {
    mock_xpub_for(DEVICE_FP, path)
}

/// The xpub a mock device whose master fingerprint is `fingerprint`
/// reports for `path`. The fingerprint is stored as the parent field.
pub fn mock_xpub_for(fingerprint: Fingerprint, path: &DerivationPath) -> String {
    let seed = 1 + (path.path().iter().fold(0u32, |acc, c| acc.wrapping_add(*c & 0xff)) % 200) as u8;
    ExtendedPublicKey {
        network: Network::Bitcoin,
        depth: path.path().len() as u8,
        parent_fingerprint: fingerprint,
        child_number: path.path().last().copied().unwrap_or(0),
        public_key: pubkey(seed).inner,
        chain_code: [seed; 32],
    }
    .to_string()
}

/// Deterministic DER-ish signature for request input `index`.
pub fn mock_signature(index: usize) -> Vec<u8> {
    vec![0x30, 0x44, 0x02, 0x20, index as u8, 0xee]
}

/// What the device should do when asked to sign.
#[derive(Clone, Default)]
pub struct MockBehavior {
    /// Returned instead of one `mock_signature` per input
    pub signatures: Option<Vec<Vec<u8>>>,
    /// Slept before answering
    pub delay: Option<Duration>,
    /// Extra previous transaction the device asks for
    pub extra_prev_request: Option<Hash256>,
    /// Paths reported by `enumerate`
    pub attached: Vec<String>,
    /// Master fingerprint per path, `DEVICE_FP` when absent
    pub fingerprints: HashMap<String, Fingerprint>,
    /// Paths that fail to open
    pub unreachable: Vec<String>,
}

/// Everything the mock saw.
#[derive(Default)]
pub struct Recorded {
    pub pubkey_queries: Vec<DerivationPath>,
    pub requests: Vec<SignTxRequest>,
    pub prev_txs: Vec<TransactionType>,
    pub opened: Vec<(String, Option<String>)>,
}

#[derive(Clone, Default)]
pub struct MockDevice {
    pub behavior: MockBehavior,
    pub closes: Arc<AtomicUsize>,
    pub recorded: Arc<Mutex<Recorded>>,
}

impl MockDevice {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_behavior(behavior: MockBehavior) -> Self {
        Self {
            behavior,
            ..Default::default()
        }
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<SignTxRequest> {
        self.recorded.lock().unwrap().requests.clone()
    }

    pub fn prev_txs(&self) -> Vec<TransactionType> {
        self.recorded.lock().unwrap().prev_txs.clone()
    }

    pub fn pubkey_queries(&self) -> Vec<DerivationPath> {
        self.recorded.lock().unwrap().pubkey_queries.clone()
    }

    pub fn opened(&self) -> Vec<(String, Option<String>)> {
        self.recorded.lock().unwrap().opened.clone()
    }

    pub fn client(&self, config: &HwiConfig) -> TrezorClient {
        TrezorClient::open(self, "hid:mock", None, config).unwrap()
    }
}

pub struct MockTransport {
    device: MockDevice,
    path: String,
}

impl Transport for MockTransport {
    fn close(&mut self) {
        self.device.closes.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait::async_trait]
impl DeviceTransport for MockTransport {
    async fn get_public_node(&mut self, path: &DerivationPath) -> Result<String> {
        self.device.recorded.lock().unwrap().pubkey_queries.push(path.clone());
        let fingerprint = self
            .device
            .behavior
            .fingerprints
            .get(&self.path)
            .copied()
            .unwrap_or(DEVICE_FP);
        Ok(mock_xpub_for(fingerprint, path))
    }

    async fn sign_tx(&mut self, request: &SignTxRequest, prev_txs: &dyn PrevTxSource) -> Result<Vec<Vec<u8>>> {
        let mut fetched = Vec::new();
        for input in &request.inputs {
            if input.script_type == InputScriptType::SpendAddress {
                fetched.push(prev_txs.get_tx(&input.prev_hash)?);
            }
        }
        if let Some(hash) = &self.device.behavior.extra_prev_request {
            fetched.push(prev_txs.get_tx(hash)?);
        }
        {
            let mut recorded = self.device.recorded.lock().unwrap();
            recorded.requests.push(request.clone());
            recorded.prev_txs.extend(fetched);
        }

        if let Some(delay) = self.device.behavior.delay {
            tokio::time::sleep(delay).await;
        }

        Ok(match &self.device.behavior.signatures {
            Some(signatures) => signatures.clone(),
            None => (0..request.inputs.len()).map(mock_signature).collect(),
        })
    }
}

impl TransportFactory for MockDevice {
    fn enumerate(&self) -> Result<Vec<String>> {
        Ok(self.behavior.attached.clone())
    }

    fn open(&self, path: &str, passphrase: Option<&str>) -> Result<Box<dyn DeviceTransport>> {
        if self.behavior.unreachable.iter().any(|p| p == path) {
            return Err(HwiError::DeviceUnavailable(format!("{} is busy", path)));
        }
        self.recorded
            .lock()
            .unwrap()
            .opened
            .push((path.to_string(), passphrase.map(str::to_string)));
        Ok(Box::new(MockTransport {
            device: self.clone(),
            path: path.to_string(),
        }))
    }
}

pub fn origin(fingerprint: Fingerprint, path: &str) -> Bip32Derivation {
    Bip32Derivation {
        fingerprint,
        path: path.parse().unwrap(),
    }
}

/// A transaction with two P2PKH outputs of 1 000 and 75 000 sats.
pub fn funding_tx(marker: u8) -> Transaction {
    Transaction {
        version: 1,
        lock_time: 0,
        input: vec![TxIn {
            previous_output: OutPoint { txid: [marker; 32], vout: 0 },
            script_sig: Script(vec![0x47, 0x30, 0x44]),
            sequence: 0xffffffff,
            witness: Vec::new(),
        }],
        output: vec![
            TxOut { value: 1_000, script_pubkey: Script::new_p2pkh(&[marker; 20]) },
            TxOut { value: 75_000, script_pubkey: Script::new_p2pkh(&[marker.wrapping_add(1); 20]) },
        ],
    }
}

pub fn unsigned_spend(outpoints: Vec<OutPoint>, outputs: Vec<TxOut>) -> PartiallySignedTransaction {
    let tx = Transaction {
        version: 2,
        lock_time: 0,
        input: outpoints
            .into_iter()
            .map(|previous_output| TxIn {
                previous_output,
                script_sig: Script::new(),
                sequence: 0xfffffffd,
                witness: Vec::new(),
            })
            .collect(),
        output: outputs,
    };
    PartiallySignedTransaction::new(tx).unwrap()
}

/// One legacy input keyed by `fingerprint` paying 50 000 sats to a P2PKH output.
pub fn legacy_psbt(fingerprint: Fingerprint) -> PartiallySignedTransaction {
    let prev = funding_tx(0x21);
    let mut psbt = unsigned_spend(
        vec![OutPoint { txid: prev.txid().unwrap(), vout: 1 }],
        vec![TxOut { value: 50_000, script_pubkey: Script::new_p2pkh(&[0x77; 20]) }],
    );
    psbt.inputs[0].non_witness_utxo = Some(prev);
    psbt.inputs[0]
        .bip32_derivation
        .insert(pubkey(1), origin(fingerprint, "m/44'/0'/0'/0/0"));
    psbt
}

/// `count` native segwit inputs owned by the device.
pub fn segwit_psbt(count: usize) -> PartiallySignedTransaction {
    let mut psbt = unsigned_spend(
        (0..count)
            .map(|i| OutPoint { txid: [0x50 + i as u8; 32], vout: i as u32 })
            .collect(),
        vec![TxOut { value: 40_000, script_pubkey: Script::new_p2wpkh(&[0x88; 20]) }],
    );
    for (i, input) in psbt.inputs.iter_mut().enumerate() {
        input.witness_utxo = Some(TxOut {
            value: 10_000 * (i as u64 + 1),
            script_pubkey: Script::new_p2wpkh(&[0x60 + i as u8; 20]),
        });
        input.bip32_derivation.insert(
            pubkey(10 + i as u8),
            origin(DEVICE_FP, &format!("m/84'/0'/0'/0/{}", i)),
        );
    }
    psbt
}
