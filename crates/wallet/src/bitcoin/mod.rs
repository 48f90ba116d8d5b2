//! Bitcoin-family transactions
//!
//! Pay-to-public-key-hash spends for Bitcoin (legacy signature hashes) and
//! Bitcoin Cash (BIP143 digests with the fork id bit).

mod address;
mod builder;
pub(crate) mod encode;
mod network;
pub mod script;
mod transaction;
mod utxo;

pub use address::{Address, AddressKind, compressed_public_key, derive_script};
pub use builder::{ClaimScript, TransactionBuilder};
pub use network::{Network, SIGHASH_ALL, SIGHASH_ALL_FORKID, SighashScheme};
pub use transaction::{OutPoint, SEQUENCE_FINAL, Transaction, TxIn, TxOut, txid_hex};
pub use utxo::{UnspentOutput, scan, select, total};
