//! Partially Signed Bitcoin Transactions (BIP 174).
//!
//! Maps are parsed into typed fields where the signer needs them; every
//! other record is preserved byte-for-byte in `unknown` so a round trip
//! through this module never drops data another signer added.

use crate::primitives::bip32::{DerivationPath, Fingerprint};
use crate::primitives::encode::{read_var_bytes, read_varint, write_var_bytes, Decodable, Encodable};
use crate::primitives::key::PublicKey;
use crate::primitives::script::Script;
use crate::primitives::transaction::{Transaction, TxOut};
use crate::{HwiError, Result};
use base64::{engine::general_purpose, Engine as _};
use std::collections::{BTreeMap, BTreeSet};
use std::io::{Cursor, Read};

// PSBT key type constants as defined in BIP 174
const PSBT_GLOBAL_UNSIGNED_TX: u8 = 0x00;
const PSBT_GLOBAL_XPUB: u8 = 0x01;
const PSBT_GLOBAL_VERSION: u8 = 0xfb;

const PSBT_IN_NON_WITNESS_UTXO: u8 = 0x00;
const PSBT_IN_WITNESS_UTXO: u8 = 0x01;
const PSBT_IN_PARTIAL_SIG: u8 = 0x02;
const PSBT_IN_SIGHASH_TYPE: u8 = 0x03;
const PSBT_IN_REDEEM_SCRIPT: u8 = 0x04;
const PSBT_IN_WITNESS_SCRIPT: u8 = 0x05;
const PSBT_IN_BIP32_DERIVATION: u8 = 0x06;
const PSBT_IN_FINAL_SCRIPTSIG: u8 = 0x07;

const PSBT_OUT_REDEEM_SCRIPT: u8 = 0x00;
const PSBT_OUT_WITNESS_SCRIPT: u8 = 0x01;
const PSBT_OUT_BIP32_DERIVATION: u8 = 0x02;

const PSBT_MAGIC: &[u8] = b"psbt";
const PSBT_SEPARATOR: u8 = 0xff;

/// BIP32 origin of a key: master fingerprint plus path from the master.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bip32Derivation {
    pub fingerprint: Fingerprint,
    pub path: DerivationPath,
}

impl Bip32Derivation {
    fn encode(&self) -> Vec<u8> {
        let mut value = Vec::with_capacity(4 + 4 * self.path.path().len());
        value.extend_from_slice(self.fingerprint.as_bytes());
        for &component in self.path.path() {
            value.extend_from_slice(&component.to_le_bytes());
        }
        value
    }

    fn decode(value: &[u8]) -> Result<Self> {
        if value.len() < 4 || value.len() % 4 != 0 {
            return Err(HwiError::invalid_psbt(format!(
                "Invalid BIP32 derivation value length {}",
                value.len()
            )));
        }
        let mut fingerprint = [0u8; 4];
        fingerprint.copy_from_slice(&value[0..4]);
        let path = value[4..]
            .chunks_exact(4)
            .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect::<Vec<_>>();
        Ok(Bip32Derivation {
            fingerprint: Fingerprint(fingerprint),
            path: DerivationPath::new(path),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PsbtGlobal {
    pub unsigned_tx: Option<Transaction>,
    /// Serialized 78-byte extended key to its origin.
    pub xpub: BTreeMap<Vec<u8>, Bip32Derivation>,
    pub version: Option<u32>,
    pub unknown: BTreeMap<Vec<u8>, Vec<u8>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PsbtInput {
    pub non_witness_utxo: Option<Transaction>,
    pub witness_utxo: Option<TxOut>,
    pub partial_sigs: BTreeMap<PublicKey, Vec<u8>>,
    pub sighash_type: Option<u32>,
    pub redeem_script: Option<Script>,
    pub witness_script: Option<Script>,
    pub bip32_derivation: BTreeMap<PublicKey, Bip32Derivation>,
    pub final_script_sig: Option<Script>,
    pub unknown: BTreeMap<Vec<u8>, Vec<u8>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PsbtOutput {
    pub redeem_script: Option<Script>,
    pub witness_script: Option<Script>,
    pub bip32_derivation: BTreeMap<PublicKey, Bip32Derivation>,
    pub unknown: BTreeMap<Vec<u8>, Vec<u8>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartiallySignedTransaction {
    pub global: PsbtGlobal,
    pub inputs: Vec<PsbtInput>,
    pub outputs: Vec<PsbtOutput>,
}

impl PartiallySignedTransaction {
    /// Wraps an unsigned transaction with empty per-input and per-output maps.
    pub fn new(unsigned_tx: Transaction) -> Result<Self> {
        let inputs = vec![PsbtInput::default(); unsigned_tx.input.len()];
        let outputs = vec![PsbtOutput::default(); unsigned_tx.output.len()];
        let psbt = PartiallySignedTransaction {
            global: PsbtGlobal {
                unsigned_tx: Some(unsigned_tx),
                ..Default::default()
            },
            inputs,
            outputs,
        };
        psbt.validate()?;
        Ok(psbt)
    }

    pub fn unsigned_tx(&self) -> Result<&Transaction> {
        self.global
            .unsigned_tx
            .as_ref()
            .ok_or_else(|| HwiError::invalid_psbt("PSBT missing unsigned transaction"))
    }

    pub fn add_signature(&mut self, input_index: usize, pubkey: PublicKey, signature: Vec<u8>) -> Result<()> {
        let input = self
            .inputs
            .get_mut(input_index)
            .ok_or_else(|| HwiError::invalid_input(format!("Input index {} out of bounds", input_index)))?;
        input.partial_sigs.insert(pubkey, signature);
        Ok(())
    }

    /// Checks the structural invariants a signer relies on.
    pub fn validate(&self) -> Result<()> {
        let unsigned_tx = self.unsigned_tx()?;

        if self.inputs.len() != unsigned_tx.input.len() {
            return Err(HwiError::invalid_psbt(format!(
                "PSBT has {} input maps for {} transaction inputs",
                self.inputs.len(),
                unsigned_tx.input.len()
            )));
        }

        if self.outputs.len() != unsigned_tx.output.len() {
            return Err(HwiError::invalid_psbt(format!(
                "PSBT has {} output maps for {} transaction outputs",
                self.outputs.len(),
                unsigned_tx.output.len()
            )));
        }

        for input in &unsigned_tx.input {
            if !input.script_sig.is_empty() || !input.witness.is_empty() {
                return Err(HwiError::invalid_psbt("Unsigned transaction must have empty scriptSigs and witnesses"));
            }
        }

        Ok(())
    }

    pub fn from_base64(s: &str) -> Result<Self> {
        let bytes = general_purpose::STANDARD.decode(s.trim())?;
        Self::deserialize(&bytes)
    }

    pub fn to_base64(&self) -> Result<String> {
        Ok(general_purpose::STANDARD.encode(self.serialize()?))
    }

    pub fn serialize(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        buf.extend_from_slice(PSBT_MAGIC);
        buf.push(PSBT_SEPARATOR);

        self.serialize_global(&mut buf)?;
        for input in &self.inputs {
            Self::serialize_input(input, &mut buf)?;
        }
        for output in &self.outputs {
            Self::serialize_output(output, &mut buf)?;
        }

        Ok(buf)
    }

    /// Parses the binary form. Every failure is reported as `InvalidPsbt`.
    pub fn deserialize(data: &[u8]) -> Result<Self> {
        Self::parse(data).map_err(|e| match e {
            HwiError::InvalidPsbt(_) => e,
            other => HwiError::invalid_psbt(other.to_string()),
        })
    }

    fn parse(data: &[u8]) -> Result<Self> {
        let mut cursor = Cursor::new(data);

        let mut magic = [0u8; 5];
        cursor
            .read_exact(&mut magic)
            .map_err(|_| HwiError::invalid_psbt("Truncated PSBT header"))?;
        if &magic[..4] != PSBT_MAGIC || magic[4] != PSBT_SEPARATOR {
            return Err(HwiError::invalid_psbt("Invalid PSBT magic bytes"));
        }

        let global = Self::deserialize_global(&mut cursor)?;
        let unsigned_tx = global
            .unsigned_tx
            .as_ref()
            .ok_or_else(|| HwiError::invalid_psbt("PSBT missing unsigned transaction"))?;
        let (n_in, n_out) = (unsigned_tx.input.len(), unsigned_tx.output.len());

        let mut inputs = Vec::with_capacity(n_in);
        for _ in 0..n_in {
            inputs.push(Self::deserialize_input(&mut cursor)?);
        }

        let mut outputs = Vec::with_capacity(n_out);
        for _ in 0..n_out {
            outputs.push(Self::deserialize_output(&mut cursor)?);
        }

        let psbt = PartiallySignedTransaction { global, inputs, outputs };
        psbt.validate()?;
        Ok(psbt)
    }

    fn serialize_global(&self, buf: &mut Vec<u8>) -> Result<()> {
        if let Some(ref tx) = self.global.unsigned_tx {
            Self::write_key_value(buf, &[PSBT_GLOBAL_UNSIGNED_TX], &tx.serialize_no_witness()?)?;
        }

        for (xpub_bytes, derivation) in &self.global.xpub {
            let mut key = vec![PSBT_GLOBAL_XPUB];
            key.extend_from_slice(xpub_bytes);
            Self::write_key_value(buf, &key, &derivation.encode())?;
        }

        if let Some(version) = self.global.version {
            Self::write_key_value(buf, &[PSBT_GLOBAL_VERSION], &version.to_le_bytes())?;
        }

        for (key, value) in &self.global.unknown {
            Self::write_key_value(buf, key, value)?;
        }

        buf.push(0x00);
        Ok(())
    }

    fn serialize_input(input: &PsbtInput, buf: &mut Vec<u8>) -> Result<()> {
        if let Some(ref tx) = input.non_witness_utxo {
            Self::write_key_value(buf, &[PSBT_IN_NON_WITNESS_UTXO], &tx.consensus_encode_to_vec()?)?;
        }

        if let Some(ref utxo) = input.witness_utxo {
            Self::write_key_value(buf, &[PSBT_IN_WITNESS_UTXO], &utxo.consensus_encode_to_vec()?)?;
        }

        for (pubkey, sig) in &input.partial_sigs {
            let mut key = vec![PSBT_IN_PARTIAL_SIG];
            key.extend_from_slice(&pubkey.to_bytes());
            Self::write_key_value(buf, &key, sig)?;
        }

        if let Some(sighash_type) = input.sighash_type {
            Self::write_key_value(buf, &[PSBT_IN_SIGHASH_TYPE], &sighash_type.to_le_bytes())?;
        }

        if let Some(ref script) = input.redeem_script {
            Self::write_key_value(buf, &[PSBT_IN_REDEEM_SCRIPT], script.as_bytes())?;
        }

        if let Some(ref script) = input.witness_script {
            Self::write_key_value(buf, &[PSBT_IN_WITNESS_SCRIPT], script.as_bytes())?;
        }

        for (pubkey, derivation) in &input.bip32_derivation {
            let mut key = vec![PSBT_IN_BIP32_DERIVATION];
            key.extend_from_slice(&pubkey.to_bytes());
            Self::write_key_value(buf, &key, &derivation.encode())?;
        }

        if let Some(ref script) = input.final_script_sig {
            Self::write_key_value(buf, &[PSBT_IN_FINAL_SCRIPTSIG], script.as_bytes())?;
        }

        for (key, value) in &input.unknown {
            Self::write_key_value(buf, key, value)?;
        }

        buf.push(0x00);
        Ok(())
    }

    fn serialize_output(output: &PsbtOutput, buf: &mut Vec<u8>) -> Result<()> {
        if let Some(ref script) = output.redeem_script {
            Self::write_key_value(buf, &[PSBT_OUT_REDEEM_SCRIPT], script.as_bytes())?;
        }

        if let Some(ref script) = output.witness_script {
            Self::write_key_value(buf, &[PSBT_OUT_WITNESS_SCRIPT], script.as_bytes())?;
        }

        for (pubkey, derivation) in &output.bip32_derivation {
            let mut key = vec![PSBT_OUT_BIP32_DERIVATION];
            key.extend_from_slice(&pubkey.to_bytes());
            Self::write_key_value(buf, &key, &derivation.encode())?;
        }

        for (key, value) in &output.unknown {
            Self::write_key_value(buf, key, value)?;
        }

        buf.push(0x00);
        Ok(())
    }

    fn write_key_value(buf: &mut Vec<u8>, key: &[u8], value: &[u8]) -> Result<()> {
        write_var_bytes(buf, key)?;
        write_var_bytes(buf, value)?;
        Ok(())
    }

    /// Reads the next record of a map, or `None` at the map separator.
    fn read_key_value(cursor: &mut Cursor<&[u8]>) -> Result<Option<(Vec<u8>, Vec<u8>)>> {
        let key_len = read_varint(cursor).map_err(|_| HwiError::invalid_psbt("Truncated PSBT map"))?;
        if key_len == 0 {
            return Ok(None);
        }
        let mut key = Vec::new();
        cursor
            .by_ref()
            .take(key_len)
            .read_to_end(&mut key)
            .map_err(|_| HwiError::invalid_psbt("Truncated PSBT key"))?;
        if key.len() as u64 != key_len {
            return Err(HwiError::invalid_psbt("Truncated PSBT key"));
        }
        let value = read_var_bytes(cursor).map_err(|_| HwiError::invalid_psbt("Truncated PSBT value"))?;
        Ok(Some((key, value)))
    }

    /// Reads one map up to its separator. A key may appear only once.
    fn read_map(cursor: &mut Cursor<&[u8]>) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        let mut seen = BTreeSet::new();
        let mut records = Vec::new();
        while let Some((key, value)) = Self::read_key_value(cursor)? {
            if !seen.insert(key.clone()) {
                return Err(HwiError::invalid_psbt(format!("Duplicate key {}", hex::encode(&key))));
            }
            records.push((key, value));
        }
        Ok(records)
    }

    fn key_pubkey(key: &[u8]) -> Result<PublicKey> {
        if key.len() != 34 && key.len() != 66 {
            return Err(HwiError::invalid_psbt(format!("Invalid public key length {} in PSBT key", key.len() - 1)));
        }
        PublicKey::from_slice(&key[1..]).map_err(|e| HwiError::invalid_psbt(e.to_string()))
    }

    fn expect_bare_key(key: &[u8], what: &str) -> Result<()> {
        if key.len() != 1 {
            return Err(HwiError::invalid_psbt(format!("Invalid PSBT {} key", what)));
        }
        Ok(())
    }

    fn deserialize_global(cursor: &mut Cursor<&[u8]>) -> Result<PsbtGlobal> {
        let mut global = PsbtGlobal::default();

        for (key, value) in Self::read_map(cursor)? {
            match key[0] {
                PSBT_GLOBAL_UNSIGNED_TX => {
                    Self::expect_bare_key(&key, "global unsigned tx")?;
                    global.unsigned_tx = Some(Transaction::consensus_decode_from_slice(&value)?);
                }
                PSBT_GLOBAL_XPUB => {
                    if key.len() != 79 {
                        return Err(HwiError::invalid_psbt("Invalid PSBT global xpub key length"));
                    }
                    global.xpub.insert(key[1..].to_vec(), Bip32Derivation::decode(&value)?);
                }
                PSBT_GLOBAL_VERSION => {
                    if key.len() != 1 || value.len() != 4 {
                        return Err(HwiError::invalid_psbt("Invalid PSBT version field"));
                    }
                    global.version = Some(u32::from_le_bytes([value[0], value[1], value[2], value[3]]));
                }
                _ => {
                    global.unknown.insert(key, value);
                }
            }
        }

        Ok(global)
    }

    fn deserialize_input(cursor: &mut Cursor<&[u8]>) -> Result<PsbtInput> {
        let mut input = PsbtInput::default();

        for (key, value) in Self::read_map(cursor)? {
            match key[0] {
                PSBT_IN_NON_WITNESS_UTXO => {
                    Self::expect_bare_key(&key, "input non-witness UTXO")?;
                    input.non_witness_utxo = Some(Transaction::consensus_decode_from_slice(&value)?);
                }
                PSBT_IN_WITNESS_UTXO => {
                    Self::expect_bare_key(&key, "input witness UTXO")?;
                    input.witness_utxo = Some(TxOut::consensus_decode_from_slice(&value)?);
                }
                PSBT_IN_PARTIAL_SIG => {
                    input.partial_sigs.insert(Self::key_pubkey(&key)?, value);
                }
                PSBT_IN_SIGHASH_TYPE => {
                    if key.len() != 1 || value.len() != 4 {
                        return Err(HwiError::invalid_psbt("Invalid PSBT sighash type field"));
                    }
                    input.sighash_type = Some(u32::from_le_bytes([value[0], value[1], value[2], value[3]]));
                }
                PSBT_IN_REDEEM_SCRIPT => {
                    Self::expect_bare_key(&key, "input redeem script")?;
                    input.redeem_script = Some(Script::from_bytes(value));
                }
                PSBT_IN_WITNESS_SCRIPT => {
                    Self::expect_bare_key(&key, "input witness script")?;
                    input.witness_script = Some(Script::from_bytes(value));
                }
                PSBT_IN_BIP32_DERIVATION => {
                    input
                        .bip32_derivation
                        .insert(Self::key_pubkey(&key)?, Bip32Derivation::decode(&value)?);
                }
                PSBT_IN_FINAL_SCRIPTSIG => {
                    Self::expect_bare_key(&key, "input final scriptSig")?;
                    input.final_script_sig = Some(Script::from_bytes(value));
                }
                _ => {
                    input.unknown.insert(key, value);
                }
            }
        }

        Ok(input)
    }

    fn deserialize_output(cursor: &mut Cursor<&[u8]>) -> Result<PsbtOutput> {
        let mut output = PsbtOutput::default();

        for (key, value) in Self::read_map(cursor)? {
            match key[0] {
                PSBT_OUT_REDEEM_SCRIPT => {
                    Self::expect_bare_key(&key, "output redeem script")?;
                    output.redeem_script = Some(Script::from_bytes(value));
                }
                PSBT_OUT_WITNESS_SCRIPT => {
                    Self::expect_bare_key(&key, "output witness script")?;
                    output.witness_script = Some(Script::from_bytes(value));
                }
                PSBT_OUT_BIP32_DERIVATION => {
                    output
                        .bip32_derivation
                        .insert(Self::key_pubkey(&key)?, Bip32Derivation::decode(&value)?);
                }
                _ => {
                    output.unknown.insert(key, value);
                }
            }
        }

        Ok(output)
    }
}
