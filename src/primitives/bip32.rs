//! BIP32 key metadata: fingerprints, derivation paths and extended public keys.
//!
//! Only the public half is modelled. Keys are never derived locally; the
//! device derives them and reports the serialized xpub/tpub.

use super::hash::hash160;
use crate::{HwiError, Result};
use base58check::{FromBase58Check, ToBase58Check};
use secp256k1::PublicKey;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

const BIP32_HARDENED_KEY_LIMIT: u32 = 0x80000000;

const MAINNET_PUBLIC_VERSION: [u8; 4] = [0x04, 0x88, 0xB2, 0x1E]; // xpub
const TESTNET_PUBLIC_VERSION: [u8; 4] = [0x04, 0x35, 0x87, 0xCF]; // tpub

/// Length of a serialized extended key without the checksum.
const EXTENDED_KEY_LEN: usize = 78;

/// Network an extended public key is versioned for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Network {
    Bitcoin,
    Testnet,
}

impl Network {
    pub fn public_version_bytes(&self) -> [u8; 4] {
        match self {
            Network::Bitcoin => MAINNET_PUBLIC_VERSION,
            Network::Testnet => TESTNET_PUBLIC_VERSION,
        }
    }

    pub fn from_testnet(testnet: bool) -> Self {
        if testnet {
            Network::Testnet
        } else {
            Network::Bitcoin
        }
    }
}

/// Key fingerprint (first 4 bytes of HASH160 of a public key).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Fingerprint(pub [u8; 4]);

impl Fingerprint {
    pub fn as_bytes(&self) -> &[u8; 4] {
        &self.0
    }

    pub fn from_public_key(public_key: &PublicKey) -> Self {
        let hash = hash160(&public_key.serialize());
        Fingerprint([hash[0], hash[1], hash[2], hash[3]])
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl FromStr for Fingerprint {
    type Err = HwiError;

    fn from_str(s: &str) -> Result<Self> {
        let bytes = hex::decode(s)?;
        let arr: [u8; 4] = bytes
            .try_into()
            .map_err(|_| HwiError::invalid_input(format!("Fingerprint must be 4 bytes: {}", s)))?;
        Ok(Fingerprint(arr))
    }
}

/// Derivation path for BIP32 key derivation
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct DerivationPath {
    path: Vec<u32>,
}

impl DerivationPath {
    pub fn new(path: Vec<u32>) -> Self {
        DerivationPath { path }
    }

    pub fn master() -> Self {
        DerivationPath { path: Vec::new() }
    }

    pub fn path(&self) -> &[u32] {
        &self.path
    }

    pub fn is_empty(&self) -> bool {
        self.path.is_empty()
    }

    pub fn is_hardened(child_number: u32) -> bool {
        child_number >= BIP32_HARDENED_KEY_LIMIT
    }

    pub fn hardened(index: u32) -> u32 {
        index | BIP32_HARDENED_KEY_LIMIT
    }

    pub fn child(&self, child_number: u32) -> DerivationPath {
        let mut new_path = self.path.clone();
        new_path.push(child_number);
        DerivationPath::new(new_path)
    }

    /// Renders the path with `h` as the hardened marker, as output
    /// descriptors expect.
    pub fn to_descriptor_string(&self) -> String {
        self.render('h')
    }

    fn render(&self, marker: char) -> String {
        let mut out = String::from("m");
        for &child in &self.path {
            if DerivationPath::is_hardened(child) {
                out.push_str(&format!("/{}{}", child - BIP32_HARDENED_KEY_LIMIT, marker));
            } else {
                out.push_str(&format!("/{}", child));
            }
        }
        out
    }
}

impl From<Vec<u32>> for DerivationPath {
    fn from(path: Vec<u32>) -> Self {
        DerivationPath::new(path)
    }
}

impl FromStr for DerivationPath {
    type Err = HwiError;

    fn from_str(s: &str) -> Result<Self> {
        if s == "m" || s == "m/" {
            return Ok(DerivationPath::master());
        }

        let path_str = s.strip_prefix("m/").ok_or_else(|| {
            HwiError::invalid_input("Derivation path must start with 'm' or 'm/'")
        })?;

        let mut path = Vec::new();
        for component in path_str.split('/') {
            if component.is_empty() {
                return Err(HwiError::invalid_input("Empty path component"));
            }

            let (index_str, is_hardened) = match component.strip_suffix(&['\'', 'h', 'H'][..]) {
                Some(stripped) => (stripped, true),
                None => (component, false),
            };

            let index: u32 = index_str
                .parse()
                .map_err(|_| HwiError::invalid_input(format!("Invalid path component: {}", component)))?;

            if index >= BIP32_HARDENED_KEY_LIMIT {
                return Err(HwiError::invalid_input(format!("Path component index too large: {}", index)));
            }

            path.push(if is_hardened { DerivationPath::hardened(index) } else { index });
        }

        Ok(DerivationPath::new(path))
    }
}

impl fmt::Display for DerivationPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render('\''))
    }
}

/// Extended public key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtendedPublicKey {
    pub network: Network,
    pub depth: u8,
    pub parent_fingerprint: Fingerprint,
    pub child_number: u32,
    pub public_key: PublicKey,
    pub chain_code: [u8; 32],
}

impl ExtendedPublicKey {
    /// Fingerprint of this key itself.
    pub fn fingerprint(&self) -> Fingerprint {
        Fingerprint::from_public_key(&self.public_key)
    }

    /// Serializes to the 78-byte BIP32 layout (no checksum).
    pub fn encode(&self) -> [u8; EXTENDED_KEY_LEN] {
        let mut data = [0u8; EXTENDED_KEY_LEN];
        data[0..4].copy_from_slice(&self.network.public_version_bytes());
        data[4] = self.depth;
        data[5..9].copy_from_slice(self.parent_fingerprint.as_bytes());
        data[9..13].copy_from_slice(&self.child_number.to_be_bytes());
        data[13..45].copy_from_slice(&self.chain_code);
        data[45..78].copy_from_slice(&self.public_key.serialize());
        data
    }

    pub fn decode(data: &[u8]) -> Result<Self> {
        if data.len() != EXTENDED_KEY_LEN {
            return Err(HwiError::UnrecognizedKeyFormat(format!(
                "extended key is {} bytes, expected {}",
                data.len(),
                EXTENDED_KEY_LEN
            )));
        }

        let network = match [data[0], data[1], data[2], data[3]] {
            MAINNET_PUBLIC_VERSION => Network::Bitcoin,
            TESTNET_PUBLIC_VERSION => Network::Testnet,
            other => {
                return Err(HwiError::UnrecognizedKeyFormat(format!(
                    "unknown version bytes {}",
                    hex::encode(other)
                )))
            }
        };

        let mut parent_fingerprint = [0u8; 4];
        parent_fingerprint.copy_from_slice(&data[5..9]);
        let mut chain_code = [0u8; 32];
        chain_code.copy_from_slice(&data[13..45]);
        let public_key = PublicKey::from_slice(&data[45..78])
            .map_err(|e| HwiError::UnrecognizedKeyFormat(format!("invalid public key: {}", e)))?;

        Ok(ExtendedPublicKey {
            network,
            depth: data[4],
            parent_fingerprint: Fingerprint(parent_fingerprint),
            child_number: u32::from_be_bytes([data[9], data[10], data[11], data[12]]),
            public_key,
            chain_code,
        })
    }

    /// The same key re-versioned for another network.
    pub fn with_network(&self, network: Network) -> Self {
        ExtendedPublicKey { network, ..self.clone() }
    }
}

impl FromStr for ExtendedPublicKey {
    type Err = HwiError;

    fn from_str(s: &str) -> Result<Self> {
        let (version, payload) = s
            .from_base58check()
            .map_err(|e| HwiError::UnrecognizedKeyFormat(format!("{:?}", e)))?;
        // base58check splits off the first byte as a version; xpub versions are 4 bytes
        let mut data = Vec::with_capacity(EXTENDED_KEY_LEN);
        data.push(version);
        data.extend_from_slice(&payload);
        ExtendedPublicKey::decode(&data)
    }
}

impl fmt::Display for ExtendedPublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let data = self.encode();
        write!(f, "{}", data[1..].to_base58check(data[0]))
    }
}

/// Re-encodes a mainnet `xpub` with testnet version bytes.
///
/// Keys that already carry testnet versions are returned unchanged.
pub fn xpub_main_to_test(xpub: &str) -> Result<String> {
    let key: ExtendedPublicKey = xpub.parse()?;
    Ok(key.with_network(Network::Testnet).to_string())
}
