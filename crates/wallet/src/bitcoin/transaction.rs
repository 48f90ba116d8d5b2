//! Raw transaction parsing and serialization

use tapsign_card::crypto::double_sha256;

use super::encode::{Reader, write_bytes, write_varint};
use crate::{Error, Result};

/// Sequence number of a final input
pub const SEQUENCE_FINAL: u32 = 0xFFFF_FFFF;

/// Reference to a previous output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OutPoint {
    /// Transaction id in internal byte order
    pub txid: [u8; 32],
    /// Output index
    pub vout: u32,
}

impl OutPoint {
    /// Append the 36 byte serialization
    pub fn write(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.txid);
        out.extend_from_slice(&self.vout.to_le_bytes());
    }
}

/// Transaction input
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxIn {
    /// Output being spent
    pub previous_output: OutPoint,
    /// Input script
    pub script_sig: Vec<u8>,
    /// Sequence number
    pub sequence: u32,
    /// Witness stack, empty for legacy inputs
    pub witness: Vec<Vec<u8>>,
}

/// Transaction output
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxOut {
    /// Value in satoshi
    pub value: u64,
    /// Output script
    pub script_pubkey: Vec<u8>,
}

impl TxOut {
    /// Append the serialization
    pub fn write(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.value.to_le_bytes());
        write_bytes(out, &self.script_pubkey);
    }
}

/// A Bitcoin-family transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    /// Version
    pub version: u32,
    /// Inputs
    pub inputs: Vec<TxIn>,
    /// Outputs
    pub outputs: Vec<TxOut>,
    /// Lock time
    pub lock_time: u32,
}

impl Transaction {
    /// Parse a raw transaction, with or without the segwit marker
    pub fn parse(raw: &[u8]) -> Result<Self> {
        let mut reader = Reader::new(raw);
        let version = reader.u32()?;

        let segwit = reader.peek(0) == Some(0x00) && reader.peek(1) == Some(0x01);
        if segwit {
            reader.take(2)?;
        }

        let input_count = reader.varint()?;
        let mut inputs = Vec::new();
        for _ in 0..input_count {
            let txid = reader.array()?;
            let vout = reader.u32()?;
            let script_sig = reader.bytes()?.to_vec();
            let sequence = reader.u32()?;
            inputs.push(TxIn {
                previous_output: OutPoint { txid, vout },
                script_sig,
                sequence,
                witness: Vec::new(),
            });
        }

        let output_count = reader.varint()?;
        let mut outputs = Vec::new();
        for _ in 0..output_count {
            let value = reader.u64()?;
            let script_pubkey = reader.bytes()?.to_vec();
            outputs.push(TxOut {
                value,
                script_pubkey,
            });
        }

        if segwit {
            for input in &mut inputs {
                let items = reader.varint()?;
                for _ in 0..items {
                    input.witness.push(reader.bytes()?.to_vec());
                }
            }
        }

        let lock_time = reader.u32()?;
        if !reader.is_empty() {
            return Err(Error::MalformedTransaction("trailing bytes"));
        }
        if inputs.is_empty() && outputs.is_empty() {
            return Err(Error::MalformedTransaction("no inputs or outputs"));
        }
        tracing::trace!(
            len = reader.position(),
            inputs = inputs.len(),
            outputs = outputs.len(),
            segwit,
            "Parsed transaction"
        );

        Ok(Self {
            version,
            inputs,
            outputs,
            lock_time,
        })
    }

    /// Serialization without witness data
    pub fn serialize(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&self.version.to_le_bytes());
        write_varint(&mut out, self.inputs.len() as u64);
        for input in &self.inputs {
            input.previous_output.write(&mut out);
            write_bytes(&mut out, &input.script_sig);
            out.extend_from_slice(&input.sequence.to_le_bytes());
        }
        write_varint(&mut out, self.outputs.len() as u64);
        for output in &self.outputs {
            output.write(&mut out);
        }
        out.extend_from_slice(&self.lock_time.to_le_bytes());
        out
    }

    /// Transaction id in internal byte order
    pub fn txid(&self) -> [u8; 32] {
        double_sha256(&self.serialize())
    }
}

/// Transaction id as displayed by explorers, byte-reversed hex
pub fn txid_hex(txid: &[u8; 32]) -> String {
    let mut reversed = *txid;
    reversed.reverse();
    hex::encode(reversed)
}
