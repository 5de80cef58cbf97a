//! Translates a PSBT into the device's signing request.

use super::messages::{InputScriptType, OutputScriptType, SignTxRequest, TxInputType, TxOutputType};
use crate::primitives::address::{address_for_script, NetworkParams};
use crate::primitives::bip32::Fingerprint;
use crate::primitives::hash::{reversed, to_display_hex};
use crate::primitives::key::PublicKey;
use crate::primitives::psbt::{Bip32Derivation, PartiallySignedTransaction, PsbtInput};
use crate::primitives::transaction::{TxIn, TxOut};
use crate::{HwiError, Result};

/// The single key an input is locked to.
///
/// Zero keys and more than one key are both rejected; only single-key
/// inputs can be signed.
pub(crate) fn sole_key(index: usize, input: &PsbtInput) -> Result<(&PublicKey, &Bip32Derivation)> {
    let mut keys = input.bip32_derivation.iter();
    match (keys.next(), keys.next()) {
        (Some(entry), None) => Ok(entry),
        (None, _) => Err(HwiError::MissingKeyForInput { input: index }),
        (Some(_), Some(_)) => Err(HwiError::UnsupportedMultisig { input: index }),
    }
}

/// Builds [`SignTxRequest`]s for one device.
#[derive(Debug, Clone)]
pub struct SigningRequestBuilder {
    master_fingerprint: Fingerprint,
    params: NetworkParams,
    strict_key_ownership: bool,
}

impl SigningRequestBuilder {
    pub fn new(master_fingerprint: Fingerprint, params: NetworkParams) -> Self {
        Self {
            master_fingerprint,
            params,
            strict_key_ownership: false,
        }
    }

    /// Fail with `ForeignKey` on inputs keyed by another master key
    /// instead of sending them without a derivation path.
    pub fn strict_key_ownership(mut self, strict: bool) -> Self {
        self.strict_key_ownership = strict;
        self
    }

    pub fn build(&self, psbt: &PartiallySignedTransaction) -> Result<SignTxRequest> {
        psbt.validate()?;
        let tx = psbt.unsigned_tx()?;

        let inputs = tx
            .input
            .iter()
            .zip(&psbt.inputs)
            .enumerate()
            .map(|(index, (txin, input))| self.build_input(index, txin, input))
            .collect::<Result<Vec<_>>>()?;

        let outputs = tx
            .output
            .iter()
            .enumerate()
            .map(|(index, txout)| self.build_output(index, txout))
            .collect::<Result<Vec<_>>>()?;

        log::debug!(
            "Built signing request: {} inputs, {} outputs for {}",
            inputs.len(),
            outputs.len(),
            self.params.coin_name
        );

        Ok(SignTxRequest {
            coin_name: self.params.coin_name.to_string(),
            inputs,
            outputs,
            version: tx.version,
            lock_time: tx.lock_time,
        })
    }

    fn build_input(&self, index: usize, txin: &TxIn, input: &PsbtInput) -> Result<TxInputType> {
        let outpoint = &txin.previous_output;

        let (script_type, amount) = if let Some(prev_tx) = &input.non_witness_utxo {
            if prev_tx.txid()? != outpoint.txid {
                return Err(HwiError::invalid_psbt(format!(
                    "Input {} previous transaction does not match outpoint {}",
                    index,
                    to_display_hex(&outpoint.txid)
                )));
            }
            let prev_out = prev_tx.output.get(outpoint.vout as usize).ok_or_else(|| {
                HwiError::invalid_psbt(format!(
                    "Input {} spends output {} of a transaction with {} outputs",
                    index,
                    outpoint.vout,
                    prev_tx.output.len()
                ))
            })?;
            (InputScriptType::SpendAddress, prev_out.value)
        } else if let Some(utxo) = &input.witness_utxo {
            if utxo.script_pubkey.is_p2sh() {
                (InputScriptType::SpendP2shWitness, utxo.value)
            } else {
                (InputScriptType::SpendWitness, utxo.value)
            }
        } else {
            return Err(HwiError::NoUtxoInfo { input: index });
        };

        let (pubkey, origin) = sole_key(index, input)?;
        let address_n = if origin.fingerprint == self.master_fingerprint {
            Some(origin.path.clone())
        } else if self.strict_key_ownership {
            return Err(HwiError::ForeignKey { input: index });
        } else {
            log::debug!(
                "Input {} key {} belongs to {}, not {}",
                index,
                pubkey,
                origin.fingerprint,
                self.master_fingerprint
            );
            None
        };

        Ok(TxInputType {
            prev_hash: reversed(&outpoint.txid),
            prev_index: outpoint.vout,
            sequence: txin.sequence,
            address_n,
            script_type,
            amount,
        })
    }

    fn build_output(&self, index: usize, txout: &TxOut) -> Result<TxOutputType> {
        let address = match address_for_script(&txout.script_pubkey, &self.params) {
            Some(Ok(address)) => address,
            Some(Err(e)) => {
                log::debug!("Output {} has no valid address: {}", index, e);
                return Err(HwiError::UnsupportedOutputType { output: index });
            }
            None => return Err(HwiError::UnsupportedOutputType { output: index }),
        };
        Ok(TxOutputType {
            amount: txout.value,
            address,
            script_type: OutputScriptType::PayToAddress,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::primitives::bip32::DerivationPath;
    use crate::primitives::script::Script;
    use crate::primitives::transaction::{OutPoint, Transaction};
    use secp256k1::{Secp256k1, SecretKey};

    const DEVICE_FP: Fingerprint = Fingerprint([0xd3, 0x4d, 0xb3, 0x3f]);
    const OTHER_FP: Fingerprint = Fingerprint([0x01, 0x02, 0x03, 0x04]);

    fn pubkey(seed: u8) -> PublicKey {
        let secp = Secp256k1::new();
        let sk = SecretKey::from_slice(&[seed; 32]).unwrap();
        PublicKey::new(secp256k1::PublicKey::from_secret_key(&secp, &sk))
    }

    fn origin(fingerprint: Fingerprint, path: &str) -> Bip32Derivation {
        Bip32Derivation {
            fingerprint,
            path: path.parse().unwrap(),
        }
    }

    fn prev_tx() -> Transaction {
        Transaction {
            version: 1,
            lock_time: 0,
            input: vec![TxIn {
                previous_output: OutPoint { txid: [0x42; 32], vout: 0 },
                script_sig: Script(vec![0x00]),
                sequence: 0xffffffff,
                witness: Vec::new(),
            }],
            output: vec![
                TxOut { value: 1_000, script_pubkey: Script::new_p2pkh(&[0x01; 20]) },
                TxOut { value: 75_000, script_pubkey: Script::new_p2pkh(&[0x02; 20]) },
            ],
        }
    }

    fn spend(inputs: Vec<OutPoint>, outputs: Vec<TxOut>) -> PartiallySignedTransaction {
        let tx = Transaction {
            version: 2,
            lock_time: 650_000,
            input: inputs
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

    fn legacy_psbt() -> PartiallySignedTransaction {
        let prev = prev_tx();
        let mut psbt = spend(
            vec![OutPoint { txid: prev.txid().unwrap(), vout: 1 }],
            vec![TxOut { value: 50_000, script_pubkey: Script::new_p2pkh(&[0x33; 20]) }],
        );
        psbt.inputs[0].non_witness_utxo = Some(prev);
        psbt.inputs[0]
            .bip32_derivation
            .insert(pubkey(1), origin(DEVICE_FP, "m/44'/0'/0'/0/3"));
        psbt
    }

    fn builder() -> SigningRequestBuilder {
        SigningRequestBuilder::new(DEVICE_FP, NetworkParams::MAINNET)
    }

    #[test]
    fn test_legacy_input_and_p2pkh_output() {
        let psbt = legacy_psbt();
        let request = builder().build(&psbt).unwrap();

        assert_eq!(request.coin_name, "Bitcoin");
        assert_eq!(request.version, 2);
        assert_eq!(request.lock_time, 650_000);

        assert_eq!(request.inputs.len(), 1);
        let input = &request.inputs[0];
        assert_eq!(input.script_type, InputScriptType::SpendAddress);
        assert_eq!(input.amount, 75_000);
        assert_eq!(input.prev_index, 1);
        assert_eq!(input.sequence, 0xfffffffd);
        assert_eq!(input.prev_hash, reversed(&prev_tx().txid().unwrap()));
        assert_eq!(input.address_n, Some("m/44'/0'/0'/0/3".parse::<DerivationPath>().unwrap()));

        assert_eq!(request.outputs.len(), 1);
        assert_eq!(request.outputs[0].amount, 50_000);
        assert!(request.outputs[0].address.starts_with('1'));
        assert_eq!(request.outputs[0].script_type, OutputScriptType::PayToAddress);
    }

    #[test]
    fn test_segwit_classification() {
        let mut psbt = spend(
            vec![
                OutPoint { txid: [0x10; 32], vout: 0 },
                OutPoint { txid: [0x11; 32], vout: 2 },
            ],
            vec![TxOut { value: 10_000, script_pubkey: Script::new_p2wpkh(&[0x44; 20]) }],
        );
        psbt.inputs[0].witness_utxo = Some(TxOut { value: 20_000, script_pubkey: Script::new_p2sh(&[0x55; 20]) });
        psbt.inputs[0]
            .bip32_derivation
            .insert(pubkey(2), origin(DEVICE_FP, "m/49'/0'/0'/0/0"));
        psbt.inputs[1].witness_utxo = Some(TxOut { value: 30_000, script_pubkey: Script::new_p2wpkh(&[0x66; 20]) });
        psbt.inputs[1]
            .bip32_derivation
            .insert(pubkey(3), origin(DEVICE_FP, "m/84'/0'/0'/1/7"));

        let request = builder().build(&psbt).unwrap();
        assert_eq!(request.inputs[0].script_type, InputScriptType::SpendP2shWitness);
        assert_eq!(request.inputs[0].amount, 20_000);
        assert_eq!(request.inputs[1].script_type, InputScriptType::SpendWitness);
        assert_eq!(request.inputs[1].amount, 30_000);
        assert_eq!(request.inputs[1].prev_index, 2);
        assert!(request.outputs[0].address.starts_with("bc1q"));
    }

    #[test]
    fn test_testnet_addresses() {
        let psbt = legacy_psbt();
        let request = SigningRequestBuilder::new(DEVICE_FP, NetworkParams::TESTNET)
            .build(&psbt)
            .unwrap();
        assert_eq!(request.coin_name, "Testnet");
        let first = request.outputs[0].address.chars().next().unwrap();
        assert!(first == 'm' || first == 'n');
    }

    #[test]
    fn test_foreign_key_gets_no_path() {
        let mut psbt = legacy_psbt();
        psbt.inputs[0].bip32_derivation.clear();
        psbt.inputs[0]
            .bip32_derivation
            .insert(pubkey(1), origin(OTHER_FP, "m/44'/0'/0'/0/3"));

        let request = builder().build(&psbt).unwrap();
        assert_eq!(request.inputs[0].address_n, None);

        let err = builder().strict_key_ownership(true).build(&psbt).unwrap_err();
        assert!(matches!(err, HwiError::ForeignKey { input: 0 }));
    }

    #[test]
    fn test_key_count_errors() {
        let mut psbt = legacy_psbt();
        psbt.inputs[0]
            .bip32_derivation
            .insert(pubkey(9), origin(DEVICE_FP, "m/44'/0'/0'/0/4"));
        assert!(matches!(
            builder().build(&psbt),
            Err(HwiError::UnsupportedMultisig { input: 0 })
        ));

        psbt.inputs[0].bip32_derivation.clear();
        assert!(matches!(
            builder().build(&psbt),
            Err(HwiError::MissingKeyForInput { input: 0 })
        ));
    }

    #[test]
    fn test_input_without_utxo() {
        let mut psbt = legacy_psbt();
        psbt.inputs[0].non_witness_utxo = None;
        assert!(matches!(builder().build(&psbt), Err(HwiError::NoUtxoInfo { input: 0 })));
    }

    #[test]
    fn test_mismatched_prev_tx_is_invalid() {
        let mut psbt = legacy_psbt();
        let mut other = prev_tx();
        other.lock_time = 1;
        psbt.inputs[0].non_witness_utxo = Some(other);
        assert!(matches!(builder().build(&psbt), Err(HwiError::InvalidPsbt(_))));
    }

    #[test]
    fn test_missing_prev_output_is_invalid() {
        let prev = prev_tx();
        let mut psbt = spend(
            vec![OutPoint { txid: prev.txid().unwrap(), vout: 5 }],
            vec![],
        );
        psbt.inputs[0].non_witness_utxo = Some(prev);
        psbt.inputs[0]
            .bip32_derivation
            .insert(pubkey(1), origin(DEVICE_FP, "m/44'/0'/0'/0/0"));
        assert!(matches!(builder().build(&psbt), Err(HwiError::InvalidPsbt(_))));
    }

    #[test]
    fn test_unsupported_output() {
        let mut psbt = legacy_psbt();
        let tx = psbt.global.unsigned_tx.as_mut().unwrap();
        tx.output.push(TxOut { value: 0, script_pubkey: Script(vec![0x6a, 0x01, 0x00]) });
        psbt.outputs.push(Default::default());

        assert!(matches!(
            builder().build(&psbt),
            Err(HwiError::UnsupportedOutputType { output: 1 })
        ));
    }

    #[test]
    fn test_malformed_witness_output_is_unsupported() {
        let mut psbt = legacy_psbt();
        let tx = psbt.global.unsigned_tx.as_mut().unwrap();
        // v0 programs must be 20 or 32 bytes
        tx.output.push(TxOut { value: 500, script_pubkey: Script::new_witness_program(0, &[0x11; 25]) });
        psbt.outputs.push(Default::default());

        let err = builder().build(&psbt).unwrap_err();
        assert!(matches!(err, HwiError::UnsupportedOutputType { output: 1 }));
        assert_eq!(err.code(), crate::ErrorCode::InvalidTx);
    }
}
