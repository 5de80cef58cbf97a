//! Bitcoin transaction data structures.

use super::encode::{read_u8, read_var_bytes, read_varint, write_var_bytes, write_varint, Decodable, Encodable};
use super::hash::{sha256d, Hash256};
use super::script::Script;
use crate::{HwiError, Result};
use std::io::{Read, Write};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutPoint {
    /// Wire byte order.
    pub txid: Hash256,
    pub vout: u32,
}

impl Encodable for OutPoint {
    fn consensus_encode<W: Write>(&self, writer: &mut W) -> Result<usize> {
        let mut written = self.txid.consensus_encode(writer)?;
        written += self.vout.consensus_encode(writer)?;
        Ok(written)
    }
}

impl Decodable for OutPoint {
    fn consensus_decode<R: Read>(reader: &mut R) -> Result<Self> {
        Ok(OutPoint {
            txid: Decodable::consensus_decode(reader)?,
            vout: Decodable::consensus_decode(reader)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxIn {
    pub previous_output: OutPoint,
    pub script_sig: Script,
    pub sequence: u32,
    pub witness: Vec<Vec<u8>>,
}

impl Encodable for TxIn {
    fn consensus_encode<W: Write>(&self, writer: &mut W) -> Result<usize> {
        let mut written = self.previous_output.consensus_encode(writer)?;
        written += self.script_sig.consensus_encode(writer)?;
        written += self.sequence.consensus_encode(writer)?;
        Ok(written)
    }
}

impl Decodable for TxIn {
    fn consensus_decode<R: Read>(reader: &mut R) -> Result<Self> {
        Ok(TxIn {
            previous_output: OutPoint::consensus_decode(reader)?,
            script_sig: Script::consensus_decode(reader)?,
            sequence: u32::consensus_decode(reader)?,
            witness: Vec::new(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxOut {
    pub value: u64,
    pub script_pubkey: Script,
}

impl Encodable for TxOut {
    fn consensus_encode<W: Write>(&self, writer: &mut W) -> Result<usize> {
        let mut written = self.value.consensus_encode(writer)?;
        written += self.script_pubkey.consensus_encode(writer)?;
        Ok(written)
    }
}

impl Decodable for TxOut {
    fn consensus_decode<R: Read>(reader: &mut R) -> Result<Self> {
        Ok(TxOut {
            value: u64::consensus_decode(reader)?,
            script_pubkey: Script::consensus_decode(reader)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    pub version: i32,
    pub lock_time: u32,
    pub input: Vec<TxIn>,
    pub output: Vec<TxOut>,
}

impl Transaction {
    pub fn has_witness(&self) -> bool {
        self.input.iter().any(|i| !i.witness.is_empty())
    }

    /// Serialization without marker, flag or witness data.
    pub fn serialize_no_witness(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        self.encode_inner(&mut buf, false)?;
        Ok(buf)
    }

    /// sha256d of the non-witness serialization, in wire order.
    pub fn txid(&self) -> Result<Hash256> {
        Ok(sha256d(&self.serialize_no_witness()?))
    }

    fn encode_inner<W: Write>(&self, writer: &mut W, with_witness: bool) -> Result<usize> {
        let mut written = self.version.consensus_encode(writer)?;
        if with_witness {
            writer.write_all(&[0x00, 0x01])?;
            written += 2;
        }
        written += write_varint(writer, self.input.len() as u64)?;
        for input in &self.input {
            written += input.consensus_encode(writer)?;
        }
        written += write_varint(writer, self.output.len() as u64)?;
        for output in &self.output {
            written += output.consensus_encode(writer)?;
        }
        if with_witness {
            for input in &self.input {
                written += write_varint(writer, input.witness.len() as u64)?;
                for item in &input.witness {
                    written += write_var_bytes(writer, item)?;
                }
            }
        }
        written += self.lock_time.consensus_encode(writer)?;
        Ok(written)
    }
}

impl Encodable for Transaction {
    fn consensus_encode<W: Write>(&self, writer: &mut W) -> Result<usize> {
        self.encode_inner(writer, self.has_witness())
    }
}

impl Decodable for Transaction {
    fn consensus_decode<R: Read>(reader: &mut R) -> Result<Self> {
        let version = i32::consensus_decode(reader)?;
        let mut input_count = read_varint(reader)?;
        let mut segwit = false;
        // a zero input count is the segwit marker, followed by the flag
        if input_count == 0 {
            let flag = read_u8(reader)?;
            if flag != 0x01 {
                return Err(HwiError::invalid_psbt(format!("Unsupported segwit flag {:#04x}", flag)));
            }
            segwit = true;
            input_count = read_varint(reader)?;
        }

        let mut input = Vec::new();
        for _ in 0..input_count {
            input.push(TxIn::consensus_decode(reader)?);
        }

        let output_count = read_varint(reader)?;
        let mut output = Vec::new();
        for _ in 0..output_count {
            output.push(TxOut::consensus_decode(reader)?);
        }

        if segwit {
            for txin in input.iter_mut() {
                let items = read_varint(reader)?;
                for _ in 0..items {
                    txin.witness.push(read_var_bytes(reader)?);
                }
            }
        }

        let lock_time = u32::consensus_decode(reader)?;
        Ok(Transaction { version, lock_time, input, output })
    }
}
