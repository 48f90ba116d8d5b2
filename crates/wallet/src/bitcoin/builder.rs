//! Preimage construction and final assembly
//!
//! Legacy networks sign one full serialization per input with the claim script
//! standing in for that input's script. Cash-fork networks sign the BIP143
//! digest, which commits to the spent value and hashes the shared parts once.

use k256::ecdsa::Signature;
use serde::{Deserialize, Serialize};
use tapsign_card::crypto::{canonicalize, double_sha256};
use tracing::debug;

use super::{
    Network, SighashScheme,
    encode::{write_bytes, write_varint},
    script::signature_script,
    transaction::{SEQUENCE_FINAL, Transaction, TxIn, TxOut},
    utxo::UnspentOutput,
};
use crate::{Error, Result};

/// Where the script embedded in a legacy preimage comes from
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ClaimScript {
    /// The first (destination) output's script, as issued cards expect
    #[default]
    Destination,
    /// The script of the output being spent
    PreviousOutput,
}

/// Builds preimages for a spend and assembles the signed transaction
#[derive(Debug, Clone)]
pub struct TransactionBuilder {
    network: Network,
    version: u32,
    lock_time: u32,
    inputs: Vec<UnspentOutput>,
    outputs: Vec<TxOut>,
}

impl TransactionBuilder {
    /// Spend `inputs` into `outputs`, claim scripts taken from the destination
    pub fn new(network: Network, inputs: Vec<UnspentOutput>, outputs: Vec<TxOut>) -> Self {
        let mut builder = Self {
            network,
            version: 1,
            lock_time: 0,
            inputs,
            outputs,
        };
        builder.apply_claim_script(ClaimScript::default());
        builder
    }

    /// Choose the claim script source
    pub fn with_claim_script(mut self, source: ClaimScript) -> Self {
        self.apply_claim_script(source);
        self
    }

    /// Set the transaction version
    pub const fn with_version(mut self, version: u32) -> Self {
        self.version = version;
        self
    }

    /// Set the lock time
    pub const fn with_lock_time(mut self, lock_time: u32) -> Self {
        self.lock_time = lock_time;
        self
    }

    fn apply_claim_script(&mut self, source: ClaimScript) {
        let destination = self
            .outputs
            .first()
            .map(|output| output.script_pubkey.clone())
            .unwrap_or_default();
        for input in &mut self.inputs {
            input.claim_script = match source {
                ClaimScript::Destination => destination.clone(),
                ClaimScript::PreviousOutput => input.script_pubkey.clone(),
            };
        }
    }

    /// Inputs with their attached signatures
    pub fn inputs(&self) -> &[UnspentOutput] {
        &self.inputs
    }

    /// Outputs
    pub fn outputs(&self) -> &[TxOut] {
        &self.outputs
    }

    /// Preimage signed for input `index`, or `None` if there is no such input
    pub fn preimage(&self, index: usize) -> Option<Vec<u8>> {
        if index >= self.inputs.len() {
            return None;
        }
        Some(match self.network.sighash_scheme() {
            SighashScheme::Legacy => self.legacy_preimage(index),
            SighashScheme::Bip143ForkId => self.bip143_preimage(index),
        })
    }

    /// Digests to sign, one per input
    pub fn sighashes(&self) -> Vec<[u8; 32]> {
        (0..self.inputs.len())
            .filter_map(|index| self.preimage(index))
            .map(|preimage| double_sha256(&preimage))
            .collect()
    }

    fn write_outputs(&self, out: &mut Vec<u8>) {
        write_varint(out, self.outputs.len() as u64);
        for output in &self.outputs {
            output.write(out);
        }
    }

    fn sighash_type_bytes(&self) -> [u8; 4] {
        u32::from(self.network.sighash_type()).to_le_bytes()
    }

    fn legacy_preimage(&self, index: usize) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&self.version.to_le_bytes());
        write_varint(&mut out, self.inputs.len() as u64);
        for (position, input) in self.inputs.iter().enumerate() {
            input.outpoint.write(&mut out);
            if position == index {
                write_bytes(&mut out, &input.claim_script);
            } else {
                write_varint(&mut out, 0);
            }
            out.extend_from_slice(&SEQUENCE_FINAL.to_le_bytes());
        }
        self.write_outputs(&mut out);
        out.extend_from_slice(&self.lock_time.to_le_bytes());
        out.extend_from_slice(&self.sighash_type_bytes());
        out
    }

    fn bip143_preimage(&self, index: usize) -> Vec<u8> {
        let mut prevouts = Vec::with_capacity(36 * self.inputs.len());
        let mut sequences = Vec::with_capacity(4 * self.inputs.len());
        for input in &self.inputs {
            input.outpoint.write(&mut prevouts);
            sequences.extend_from_slice(&SEQUENCE_FINAL.to_le_bytes());
        }
        let mut outputs = Vec::new();
        for output in &self.outputs {
            output.write(&mut outputs);
        }

        let input = &self.inputs[index];
        let mut out = Vec::with_capacity(156 + input.script_pubkey.len());
        out.extend_from_slice(&self.version.to_le_bytes());
        out.extend_from_slice(&double_sha256(&prevouts));
        out.extend_from_slice(&double_sha256(&sequences));
        input.outpoint.write(&mut out);
        write_bytes(&mut out, &input.script_pubkey);
        out.extend_from_slice(&input.value.to_le_bytes());
        out.extend_from_slice(&SEQUENCE_FINAL.to_le_bytes());
        out.extend_from_slice(&double_sha256(&outputs));
        out.extend_from_slice(&self.lock_time.to_le_bytes());
        out.extend_from_slice(&self.sighash_type_bytes());
        out
    }

    /// Attach one signature per input, in input order
    ///
    /// Signatures are normalized to low S before being DER encoded.
    pub fn attach_signatures(
        &mut self,
        signatures: &[Signature],
        public_key: &[u8],
    ) -> Result<()> {
        if signatures.len() != self.inputs.len() {
            return Err(Error::SignatureCount {
                expected: self.inputs.len(),
                found: signatures.len(),
            });
        }

        let sighash_type = self.network.sighash_type();
        for (input, signature) in self.inputs.iter_mut().zip(signatures) {
            let der = canonicalize(signature).to_der();
            input.signature_script =
                Some(signature_script(der.as_bytes(), sighash_type, public_key));
        }
        debug!(inputs = self.inputs.len(), "Signatures attached");
        Ok(())
    }

    /// Transaction as it stands, unsigned inputs carrying empty scripts
    pub fn transaction(&self) -> Transaction {
        Transaction {
            version: self.version,
            inputs: self
                .inputs
                .iter()
                .map(|input| TxIn {
                    previous_output: input.outpoint,
                    script_sig: input.signature_script.clone().unwrap_or_default(),
                    sequence: SEQUENCE_FINAL,
                    witness: Vec::new(),
                })
                .collect(),
            outputs: self.outputs.clone(),
            lock_time: self.lock_time,
        }
    }

    /// Final transaction bytes, failing if any input is unsigned
    pub fn build(&self) -> Result<Vec<u8>> {
        if let Some(index) = self
            .inputs
            .iter()
            .position(|input| input.signature_script.is_none())
        {
            return Err(Error::MissingSignature(index));
        }
        Ok(self.transaction().serialize())
    }
}
