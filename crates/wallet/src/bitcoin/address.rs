//! Base58Check addresses

use std::fmt;

use k256::{PublicKey, elliptic_curve::sec1::ToEncodedPoint};
use tapsign_card::crypto::{double_sha256, hash160};

use super::{Network, script};
use crate::{Error, Result};

const CHECKSUM_LEN: usize = 4;
const PAYLOAD_LEN: usize = 21;

/// Script template an address pays to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AddressKind {
    /// Pay to public key hash
    P2pkh,
    /// Pay to script hash
    P2sh,
}

impl AddressKind {
    /// Template selected by a version byte, on any supported network
    pub const fn from_version(version: u8) -> Option<Self> {
        match version {
            0x00 | 0x6F => Some(Self::P2pkh),
            0x05 | 0xC4 => Some(Self::P2sh),
            _ => None,
        }
    }
}

/// A decoded Bitcoin-family address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Address {
    version: u8,
    kind: AddressKind,
    hash: [u8; 20],
}

impl Address {
    /// Decode a Base58Check address, checking checksum and version byte
    pub fn decode(address: &str) -> Result<Self> {
        let invalid = |reason| Error::InvalidAddress {
            address: address.to_string(),
            reason,
        };

        let bytes = bs58::decode(address)
            .into_vec()
            .map_err(|_| invalid("not base58"))?;
        if bytes.len() != PAYLOAD_LEN + CHECKSUM_LEN {
            return Err(invalid("wrong length"));
        }

        let (payload, checksum) = bytes.split_at(PAYLOAD_LEN);
        if double_sha256(payload)[..CHECKSUM_LEN] != *checksum {
            return Err(Error::BadChecksum {
                address: address.to_string(),
            });
        }

        let version = payload[0];
        let kind = AddressKind::from_version(version).ok_or_else(|| Error::UnknownAddressType {
            address: address.to_string(),
            version,
        })?;
        let mut hash = [0u8; 20];
        hash.copy_from_slice(&payload[1..]);

        Ok(Self {
            version,
            kind,
            hash,
        })
    }

    /// Decode an address and check that it belongs to `network`
    pub fn decode_for(address: &str, network: Network) -> Result<Self> {
        let decoded = Self::decode(address)?;
        if decoded.version != network.p2pkh_version() && decoded.version != network.p2sh_version() {
            return Err(Error::WrongNetwork {
                address: address.to_string(),
                chain: network.into(),
            });
        }
        Ok(decoded)
    }

    /// P2PKH address of a public key hash
    pub const fn p2pkh(hash: [u8; 20], network: Network) -> Self {
        Self {
            version: network.p2pkh_version(),
            kind: AddressKind::P2pkh,
            hash,
        }
    }

    /// P2PKH address of the compressed form of `public_key`
    pub fn from_public_key(public_key: &[u8], network: Network) -> Result<Self> {
        let compressed = compressed_public_key(public_key)?;
        Ok(Self::p2pkh(hash160(&compressed), network))
    }

    /// Version byte
    pub const fn version(&self) -> u8 {
        self.version
    }

    /// Script template
    pub const fn kind(&self) -> AddressKind {
        self.kind
    }

    /// Hash160 of the key or script
    pub const fn hash(&self) -> &[u8; 20] {
        &self.hash
    }

    /// Output script paying to this address
    pub fn script_pubkey(&self) -> Vec<u8> {
        match self.kind {
            AddressKind::P2pkh => script::p2pkh(&self.hash),
            AddressKind::P2sh => script::p2sh(&self.hash),
        }
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut bytes = Vec::with_capacity(PAYLOAD_LEN + CHECKSUM_LEN);
        bytes.push(self.version);
        bytes.extend_from_slice(&self.hash);
        let checksum = double_sha256(&bytes);
        bytes.extend_from_slice(&checksum[..CHECKSUM_LEN]);
        f.write_str(&bs58::encode(bytes).into_string())
    }
}

/// Output script for a Base58Check address
pub fn derive_script(address: &str) -> Result<Vec<u8>> {
    Address::decode(address).map(|address| address.script_pubkey())
}

/// SEC1 compressed form of a 33 or 65 byte public key
pub fn compressed_public_key(public_key: &[u8]) -> Result<[u8; 33]> {
    let key = PublicKey::from_sec1_bytes(public_key).map_err(|_| Error::InvalidPublicKey)?;
    let mut out = [0u8; 33];
    out.copy_from_slice(key.to_encoded_point(true).as_bytes());
    Ok(out)
}
