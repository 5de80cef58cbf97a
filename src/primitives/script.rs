//! Locking-script pattern matching.
//!
//! Only the standard templates that map onto an address are recognised:
//! P2PKH, P2SH and witness programs (v0 through v16).

use super::encode::{read_var_bytes, write_var_bytes, Decodable, Encodable};
use super::hash::{Hash160, Hash256};
use crate::Result;
use std::io::{Read, Write};

pub const OP_0: u8 = 0x00;
pub const OP_PUSHBYTES_20: u8 = 0x14;
pub const OP_PUSHBYTES_32: u8 = 0x20;
pub const OP_1: u8 = 0x51;
pub const OP_16: u8 = 0x60;
pub const OP_DUP: u8 = 0x76;
pub const OP_EQUAL: u8 = 0x87;
pub const OP_EQUALVERIFY: u8 = 0x88;
pub const OP_HASH160: u8 = 0xa9;
pub const OP_CHECKSIG: u8 = 0xac;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Script(pub Vec<u8>);

impl Script {
    pub fn new() -> Self {
        Script(Vec::new())
    }

    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Script(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// `OP_DUP OP_HASH160 <20> OP_EQUALVERIFY OP_CHECKSIG`
    pub fn is_p2pkh(&self) -> bool {
        self.0.len() == 25
            && self.0[0] == OP_DUP
            && self.0[1] == OP_HASH160
            && self.0[2] == OP_PUSHBYTES_20
            && self.0[23] == OP_EQUALVERIFY
            && self.0[24] == OP_CHECKSIG
    }

    /// `OP_HASH160 <20> OP_EQUAL`
    pub fn is_p2sh(&self) -> bool {
        self.0.len() == 23
            && self.0[0] == OP_HASH160
            && self.0[1] == OP_PUSHBYTES_20
            && self.0[22] == OP_EQUAL
    }

    pub fn is_witness_program(&self) -> bool {
        self.witness_program().is_some()
    }

    pub fn is_p2wpkh(&self) -> bool {
        matches!(self.witness_program(), Some((0, p)) if p.len() == 20)
    }

    pub fn is_p2wsh(&self) -> bool {
        matches!(self.witness_program(), Some((0, p)) if p.len() == 32)
    }

    /// The 20-byte key hash of a P2PKH script.
    pub fn p2pkh_hash(&self) -> Option<&[u8]> {
        self.is_p2pkh().then(|| &self.0[3..23])
    }

    /// The 20-byte script hash of a P2SH script.
    pub fn p2sh_hash(&self) -> Option<&[u8]> {
        self.is_p2sh().then(|| &self.0[2..22])
    }

    /// Splits a witness output into its version and program.
    ///
    /// A witness output is 4 to 42 bytes: a version opcode (`OP_0` or
    /// `OP_1`..`OP_16`) followed by a single direct push of 2 to 40 bytes.
    pub fn witness_program(&self) -> Option<(u8, &[u8])> {
        let bytes = &self.0;
        if bytes.len() < 4 || bytes.len() > 42 {
            return None;
        }
        let version = match bytes[0] {
            OP_0 => 0,
            op @ OP_1..=OP_16 => op - (OP_1 - 1),
            _ => return None,
        };
        if bytes[1] as usize != bytes.len() - 2 {
            return None;
        }
        Some((version, &bytes[2..]))
    }

    pub fn new_p2pkh(hash: &Hash160) -> Self {
        let mut script = Vec::with_capacity(25);
        script.extend_from_slice(&[OP_DUP, OP_HASH160, OP_PUSHBYTES_20]);
        script.extend_from_slice(hash);
        script.extend_from_slice(&[OP_EQUALVERIFY, OP_CHECKSIG]);
        Script(script)
    }

    pub fn new_p2sh(hash: &Hash160) -> Self {
        let mut script = Vec::with_capacity(23);
        script.extend_from_slice(&[OP_HASH160, OP_PUSHBYTES_20]);
        script.extend_from_slice(hash);
        script.push(OP_EQUAL);
        Script(script)
    }

    pub fn new_p2wpkh(hash: &Hash160) -> Self {
        let mut script = Vec::with_capacity(22);
        script.extend_from_slice(&[OP_0, OP_PUSHBYTES_20]);
        script.extend_from_slice(hash);
        Script(script)
    }

    pub fn new_p2wsh(hash: &Hash256) -> Self {
        let mut script = Vec::with_capacity(34);
        script.extend_from_slice(&[OP_0, OP_PUSHBYTES_32]);
        script.extend_from_slice(hash);
        Script(script)
    }

    /// Builds a witness output for an arbitrary version and program.
    pub fn new_witness_program(version: u8, program: &[u8]) -> Self {
        let op = if version == 0 { OP_0 } else { OP_1 - 1 + version };
        let mut script = Vec::with_capacity(program.len() + 2);
        script.push(op);
        script.push(program.len() as u8);
        script.extend_from_slice(program);
        Script(script)
    }
}

impl From<Vec<u8>> for Script {
    fn from(bytes: Vec<u8>) -> Self {
        Script(bytes)
    }
}

impl Encodable for Script {
    fn consensus_encode<W: Write>(&self, writer: &mut W) -> Result<usize> {
        write_var_bytes(writer, &self.0)
    }
}

impl Decodable for Script {
    fn consensus_decode<R: Read>(reader: &mut R) -> Result<Self> {
        Ok(Script(read_var_bytes(reader)?))
    }
}
