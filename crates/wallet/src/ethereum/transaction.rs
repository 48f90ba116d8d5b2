//! EIP-155 legacy transactions

use alloy_primitives::{Address, B256, Bytes, U256, keccak256};
use alloy_rlp::{BufMut, Encodable, Header};
use k256::ecdsa::{Signature, VerifyingKey};
use tapsign_card::crypto::{canonicalize, recover_public_key};
use tracing::debug;

use crate::{Error, Result};

/// A legacy transaction replay-protected with EIP-155
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LegacyTransaction {
    /// Sender nonce
    pub nonce: u64,
    /// Gas price in wei
    pub gas_price: u128,
    /// Gas limit
    pub gas_limit: u64,
    /// Recipient, or the token contract for a token transfer
    pub to: Address,
    /// Value in wei
    pub value: U256,
    /// Call data
    pub input: Bytes,
    /// Chain id
    pub chain_id: u64,
}

impl LegacyTransaction {
    fn fields_length(&self) -> usize {
        self.nonce.length()
            + self.gas_price.length()
            + self.gas_limit.length()
            + self.to.length()
            + self.value.length()
            + self.input.length()
    }

    fn encode_fields(&self, out: &mut dyn BufMut) {
        self.nonce.encode(out);
        self.gas_price.encode(out);
        self.gas_limit.encode(out);
        self.to.encode(out);
        self.value.encode(out);
        self.input.encode(out);
    }

    fn encode_list(&self, tail: &[&dyn Encodable]) -> Vec<u8> {
        let payload_length =
            self.fields_length() + tail.iter().map(|field| field.length()).sum::<usize>();
        let mut out = Vec::with_capacity(payload_length + 3);
        Header {
            list: true,
            payload_length,
        }
        .encode(&mut out);
        self.encode_fields(&mut out);
        for field in tail {
            field.encode(&mut out);
        }
        out
    }

    /// RLP of the fields followed by `chain_id, 0, 0`
    pub fn encode_unsigned(&self) -> Vec<u8> {
        self.encode_list(&[&self.chain_id, &0u8, &0u8])
    }

    /// Digest the sender signs
    pub fn signature_hash(&self) -> B256 {
        keccak256(self.encode_unsigned())
    }

    /// `v` for a signature with `recovery_id`
    pub const fn v(&self, recovery_id: u8) -> u64 {
        self.chain_id * 2 + 35 + recovery_id as u64
    }

    /// RLP of the signed transaction, ready to broadcast
    pub fn encode_signed(&self, signature: &Signature, recovery_id: u8) -> Vec<u8> {
        let signature = canonicalize(signature);
        let r = U256::from_be_slice(&signature.r().to_bytes());
        let s = U256::from_be_slice(&signature.s().to_bytes());
        let v = self.v(recovery_id);
        self.encode_list(&[&v, &r, &s])
    }
}

/// Recovery id under which `signature` over `hash` recovers `sender`
///
/// Cards return bare `r ‖ s`, so both candidates are tried.
pub fn recovery_id(hash: &B256, signature: &Signature, sender: &VerifyingKey) -> Result<u8> {
    let signature = canonicalize(signature);
    let recovery_id = (0..=1)
        .find(|id| recover_public_key(&hash.0, &signature, *id).as_ref() == Some(sender))
        .ok_or(Error::RecoveryFailed)?;
    debug!(recovery_id, "Recovered sender key");
    Ok(recovery_id)
}
