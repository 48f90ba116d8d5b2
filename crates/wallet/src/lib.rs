//! Transaction construction for contactless wallet cards
//!
//! Builds the digests a card signs for Bitcoin-family and Ethereum-family
//! transfers and assembles the signed transactions. [`engine`] ties the
//! builders to a [`engine::HashSigner`], which [`tapsign_card::CardProtocol`]
//! implements.
#![cfg_attr(not(test), warn(unused_crate_dependencies))]
#![forbid(unsafe_code)]
#![warn(missing_docs, rustdoc::missing_crate_level_docs)]

pub mod bitcoin;
pub mod engine;
pub mod ethereum;

mod error;

pub use engine::{
    BitcoinEngine, Chain, CoinEngine, EthereumEngine, HashSigner, Spend, TokenEngine,
    compute_change_and_fee, engine_for_card,
};
pub use error::{Error, Result};
