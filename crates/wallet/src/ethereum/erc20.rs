//! ERC-20 call data

use alloy_primitives::{Address, Bytes, U256};

/// First four bytes of `keccak256("transfer(address,uint256)")`
pub const TRANSFER_SELECTOR: [u8; 4] = [0xA9, 0x05, 0x9C, 0xBB];

/// Call data for `transfer(to, amount)`
pub fn transfer_data(to: Address, amount: U256) -> Bytes {
    let mut data = Vec::with_capacity(4 + 32 + 32);
    data.extend_from_slice(&TRANSFER_SELECTOR);
    data.extend_from_slice(&[0u8; 12]);
    data.extend_from_slice(to.as_slice());
    data.extend_from_slice(&amount.to_be_bytes::<32>());
    data.into()
}
