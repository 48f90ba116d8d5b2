//! Typed card commands
//!
//! A command only knows how to turn itself into request records and how to read
//! the response records. Sending, encryption, security delays and status word
//! handling live in [`crate::CardProtocol`].

mod check_wallet;
mod create_wallet;
mod issuer_data;
mod open_session;
mod purge_wallet;
mod read;
mod set_pin;
mod sign;
mod validate_card;
mod verify_card;
mod verify_code;

pub use check_wallet::{CheckWalletCommand, CheckWalletResponse};
pub use create_wallet::{CreateWalletCommand, CreateWalletResponse};
pub use issuer_data::{
    IssuerDataResponse, MAX_ISSUER_DATA_SIZE, ReadIssuerDataCommand, WriteIssuerDataCommand,
    issuer_data_message,
};
pub use open_session::OpenSessionCommand;
pub use purge_wallet::{PurgeWalletCommand, PurgeWalletResponse};
pub use read::ReadCommand;
pub use set_pin::{SetPinCommand, SetPinResponse};
pub use sign::{
    MAX_HASHES_PER_REQUEST, MAX_RAW_PAYLOAD_SIZE, SignCommand, SignPayload, SignResponse,
    issuer_transaction_message,
};
pub use validate_card::{ValidateCardCommand, ValidateCardResponse};
pub use verify_card::{VerifyCardCommand, VerifyCardResponse};
pub use verify_code::{VerifyCodeCommand, VerifyCodeResponse};

use bytes::Bytes;
use tapsign_apdu_core::{Instruction, Status, Tag, TlvList};

use crate::{CardRecord, Error, Result};

/// Hash of a PIN as sent to the card
pub type PinHash = [u8; 32];

/// What a command may read while building its request or parsing the answer
#[derive(Debug, Clone, Copy)]
pub struct CommandContext<'a> {
    /// Hash of PIN1
    pub pin: &'a PinHash,
    /// Hash of PIN2
    pub pin2: &'a PinHash,
    /// Record from the last Read, if any
    pub card: Option<&'a CardRecord>,
}

impl<'a> CommandContext<'a> {
    /// Card record, failing if Read has not run
    pub fn card(&self) -> Result<&'a CardRecord> {
        self.card.ok_or(Error::CardNotRead)
    }

    /// Card identifier, once known
    pub fn card_id(&self) -> Option<&'a Bytes> {
        self.card.map(|card| &card.card_id)
    }

    /// Request records every PIN1 command starts with
    pub fn pin_tlv(&self) -> TlvList {
        TlvList::new()
            .with(Tag::Pin, self.pin)
            .with_opt(Tag::CardId, self.card_id())
    }

    /// Request records every PIN2 gated command starts with
    pub fn pin2_tlv(&self) -> TlvList {
        self.pin_tlv().with(Tag::Pin2, self.pin2)
    }
}

/// A command the card understands
pub trait CardCommand {
    /// Parsed result
    type Output;

    /// Instruction byte of the command
    const INSTRUCTION: Instruction;

    /// Whether the command is gated by PIN2, so that a rejected PIN maps to
    /// [`Error::InvalidPin2`]
    const REQUIRES_PIN2: bool = false;

    /// Build the request records
    fn serialize(&self, ctx: &CommandContext<'_>) -> Result<TlvList>;

    /// Parse the response records of a successful answer
    fn deserialize(
        &self,
        ctx: &CommandContext<'_>,
        status: Status,
        tlv: TlvList,
    ) -> Result<Self::Output>;

    /// Apply the result to the cached card record
    fn update_card(&self, _output: &Self::Output, _card: &mut Option<CardRecord>) {}
}

/// Check that a response belongs to the card the request was sent to
pub(crate) fn check_card_id(ctx: &CommandContext<'_>, tlv: &TlvList) -> Result<Bytes> {
    let card_id = tlv.required(Tag::CardId)?.clone();
    match ctx.card_id() {
        Some(expected) if *expected != card_id => {
            Err(Error::InvalidResponse("card id does not match the card read"))
        }
        _ => Ok(card_id),
    }
}
