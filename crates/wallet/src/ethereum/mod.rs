//! Ethereum-family transactions
//!
//! EIP-155 legacy transactions carrying either a native value transfer or an
//! ERC-20 `transfer` call.

mod address;
mod erc20;
mod transaction;

pub use address::{derive_address, validate_address};
pub use erc20::{TRANSFER_SELECTOR, transfer_data};
pub use transaction::{LegacyTransaction, recovery_id};
