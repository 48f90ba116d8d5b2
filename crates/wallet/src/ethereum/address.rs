//! Account addresses

use alloy_primitives::{Address, keccak256};
use k256::{PublicKey, elliptic_curve::sec1::ToEncodedPoint};

use crate::{Error, Result};

/// Address owned by a secp256k1 public key, compressed or not
pub fn derive_address(public_key: &[u8]) -> Result<Address> {
    let key = PublicKey::from_sec1_bytes(public_key).map_err(|_| Error::InvalidPublicKey)?;
    let point = key.to_encoded_point(false);
    let hash = keccak256(&point.as_bytes()[1..]);
    Ok(Address::from_slice(&hash[12..]))
}

/// Parse a hex address
///
/// Mixed-case input must carry a valid EIP-55 checksum. All-lowercase and
/// all-uppercase input is accepted as is.
pub fn validate_address(address: &str) -> Result<Address> {
    let digits = address.strip_prefix("0x").unwrap_or(address);
    let has_lower = digits.chars().any(|c| c.is_ascii_lowercase());
    let has_upper = digits.chars().any(|c| c.is_ascii_uppercase());

    if has_lower && has_upper {
        let Ok(parsed) = Address::parse_checksummed(address, None) else {
            // Distinguish a bad checksum from input that is not an address
            return match digits.parse::<Address>() {
                Ok(_) => Err(Error::BadChecksum {
                    address: address.to_string(),
                }),
                Err(_) => Err(Error::InvalidAddress {
                    address: address.to_string(),
                    reason: "not a 20 byte hex string",
                }),
            };
        };
        return Ok(parsed);
    }

    digits.parse::<Address>().map_err(|_| Error::InvalidAddress {
        address: address.to_string(),
        reason: "not a 20 byte hex string",
    })
}
