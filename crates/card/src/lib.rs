//! Command protocol for contactless wallet cards
//!
//! Builds on the wire types of `tapsign-apdu-core`:
//!
//! - [`CardProtocol`] runs typed [`commands`] with session negotiation,
//!   security delay polling and status word mapping
//! - [`session`] holds the encryption modes and key agreement
//! - [`crypto`] collects the hashing and ECDSA helpers shared with the wallet layer
//! - [`CardRecord`] is the card state read from the card and kept current by later commands
#![cfg_attr(not(test), warn(unused_crate_dependencies))]
#![forbid(unsafe_code)]
#![warn(missing_docs, rustdoc::missing_crate_level_docs)]

pub mod card;
pub mod commands;
pub mod config;
pub mod crypto;
pub mod delay;
pub mod notifier;
pub mod session;

mod error;
mod protocol;

pub use card::{CardData, CardRecord, CardStatus, ManufactureDate, SigningMethod, SigningMethods};
pub use config::ProtocolConfig;
pub use delay::{CancelToken, SecurityDelayPolicy};
pub use error::{Error, Result};
pub use notifier::{CardNotifier, NoopNotifier, TracingNotifier};
pub use protocol::CardProtocol;
pub use session::{EncryptionMode, SessionPhase, SessionState};

// Re-export the wire layer so callers need a single dependency
pub use tapsign_apdu_core as apdu;
