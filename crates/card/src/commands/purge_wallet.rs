use bytes::Bytes;
use tapsign_apdu_core::{Instruction, Status, TlvList};

use super::{CardCommand, CommandContext, check_card_id};
use crate::{
    CardRecord, Error, Result,
    card::CardStatus,
};

/// Destroy the wallet key
#[derive(Debug, Clone, Copy, Default)]
pub struct PurgeWalletCommand;

/// Result of [`PurgeWalletCommand`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PurgeWalletResponse {
    /// Card identifier
    pub card_id: Bytes,
    /// Card status after the command
    pub status: CardStatus,
}

impl CardCommand for PurgeWalletCommand {
    type Output = PurgeWalletResponse;

    const INSTRUCTION: Instruction = Instruction::PurgeWallet;
    const REQUIRES_PIN2: bool = true;

    fn serialize(&self, ctx: &CommandContext<'_>) -> Result<TlvList> {
        let status = ctx.card()?.status;
        if status != CardStatus::Loaded {
            return Err(Error::InvalidCardState {
                expected: CardStatus::Loaded,
                actual: status,
            });
        }
        Ok(ctx.pin2_tlv())
    }

    fn deserialize(
        &self,
        ctx: &CommandContext<'_>,
        _status: Status,
        tlv: TlvList,
    ) -> Result<Self::Output> {
        Ok(PurgeWalletResponse {
            card_id: check_card_id(ctx, &tlv)?,
            status: CardStatus::from_tlv(&tlv)?,
        })
    }

    fn update_card(&self, output: &Self::Output, card: &mut Option<CardRecord>) {
        if let Some(card) = card {
            card.status = output.status;
            card.wallet_public_key = None;
            card.wallet_verified = None;
        }
    }
}
