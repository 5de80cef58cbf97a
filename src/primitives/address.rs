//! Address encoding for transaction outputs.
//!
//! Three encodings are supported: base58check P2PKH, base58check P2SH and
//! segwit (bech32 for v0, bech32m for v1+). The network parameters are
//! chosen once per session and passed in explicitly.

use super::bip32::{ExtendedPublicKey, Fingerprint};
use super::script::Script;
use crate::{HwiError, Result};
use base58check::{FromBase58Check, ToBase58Check};
use bech32::{FromBase32, ToBase32, Variant};

/// Per-network address prefixes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NetworkParams {
    pub p2pkh_version: u8,
    pub p2sh_version: u8,
    pub bech32_hrp: &'static str,
    /// Coin name understood by the signing device.
    pub coin_name: &'static str,
}

impl NetworkParams {
    pub const MAINNET: NetworkParams = NetworkParams {
        p2pkh_version: 0x00,
        p2sh_version: 0x05,
        bech32_hrp: "bc",
        coin_name: "Bitcoin",
    };

    pub const TESTNET: NetworkParams = NetworkParams {
        p2pkh_version: 0x6f,
        p2sh_version: 0xc4,
        bech32_hrp: "tb",
        coin_name: "Testnet",
    };

    pub fn for_testnet(testnet: bool) -> Self {
        if testnet {
            Self::TESTNET
        } else {
            Self::MAINNET
        }
    }
}

fn check_payload(payload: &[u8]) -> Result<()> {
    if payload.len() != 20 {
        return Err(HwiError::invalid_input(format!(
            "Address payload must be 20 bytes, got {}",
            payload.len()
        )));
    }
    Ok(())
}

/// base58check(version || hash160).
pub fn encode_p2pkh(payload: &[u8], version: u8) -> Result<String> {
    check_payload(payload)?;
    Ok(payload.to_base58check(version))
}

/// Same construction as P2PKH under the script-hash version byte.
pub fn encode_p2sh(payload: &[u8], version: u8) -> Result<String> {
    check_payload(payload)?;
    Ok(payload.to_base58check(version))
}

/// Encodes a witness program (BIP173 for v0, BIP350 for v1..=16).
pub fn encode_segwit(hrp: &str, witness_version: u8, program: &[u8]) -> Result<String> {
    if witness_version > 16 {
        return Err(HwiError::invalid_input(format!("Invalid witness version {}", witness_version)));
    }
    if program.len() < 2 || program.len() > 40 {
        return Err(HwiError::invalid_input(format!("Invalid witness program length {}", program.len())));
    }
    if witness_version == 0 && program.len() != 20 && program.len() != 32 {
        return Err(HwiError::invalid_input(format!(
            "Witness v0 program must be 20 or 32 bytes, got {}",
            program.len()
        )));
    }

    let version = bech32::u5::try_from_u8(witness_version)
        .map_err(|e| HwiError::invalid_input(format!("Invalid witness version: {}", e)))?;
    let mut data = vec![version];
    data.extend(program.to_base32());

    let variant = if witness_version == 0 { Variant::Bech32 } else { Variant::Bech32m };
    bech32::encode(hrp, data, variant).map_err(|e| HwiError::invalid_input(format!("Bech32 encoding failed: {}", e)))
}

/// Splits a base58check address into its version byte and payload.
pub fn decode_base58(address: &str) -> Result<(u8, Vec<u8>)> {
    address
        .from_base58check()
        .map_err(|e| HwiError::invalid_input(format!("Invalid base58check address {}: {:?}", address, e)))
}

/// Splits a segwit address into hrp, witness version and program.
pub fn decode_segwit(address: &str) -> Result<(String, u8, Vec<u8>)> {
    let (hrp, data, variant) =
        bech32::decode(address).map_err(|e| HwiError::invalid_input(format!("Invalid bech32 address: {}", e)))?;
    let (version, program) = data
        .split_first()
        .ok_or_else(|| HwiError::invalid_input("Empty bech32 data"))?;
    let version = version.to_u8();
    let expected = if version == 0 { Variant::Bech32 } else { Variant::Bech32m };
    if variant != expected {
        return Err(HwiError::invalid_input(format!("Wrong checksum variant for witness v{}", version)));
    }
    let program = Vec::<u8>::from_base32(program)
        .map_err(|e| HwiError::invalid_input(format!("Invalid witness program: {}", e)))?;
    Ok((hrp, version, program))
}

/// Resolves the address an output script pays to.
///
/// Precedence is P2PKH, then P2SH, then witness program. Anything else
/// (bare multisig, OP_RETURN, non-standard) has no address.
pub fn address_for_script(script: &Script, params: &NetworkParams) -> Option<Result<String>> {
    if let Some(hash) = script.p2pkh_hash() {
        return Some(encode_p2pkh(hash, params.p2pkh_version));
    }
    if let Some(hash) = script.p2sh_hash() {
        return Some(encode_p2sh(hash, params.p2sh_version));
    }
    if let Some((version, program)) = script.witness_program() {
        return Some(encode_segwit(params.bech32_hrp, version, program));
    }
    None
}

/// The master fingerprint recorded in an extended public key.
///
/// The device is queried for a depth-1 key, so the parent fingerprint
/// stored in it is the fingerprint of the master key.
pub fn fingerprint_of(extended_pubkey: &str) -> Result<Fingerprint> {
    let key: ExtendedPublicKey = extended_pubkey.parse()?;
    Ok(key.parent_fingerprint)
}
