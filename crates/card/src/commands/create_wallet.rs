use bytes::Bytes;
use tapsign_apdu_core::{Instruction, Status, Tag, TlvList};

use super::{CardCommand, CommandContext, check_card_id};
use crate::{
    CardRecord, Error, Result,
    card::CardStatus,
};

/// Generate the wallet key on the card
#[derive(Debug, Clone, Copy, Default)]
pub struct CreateWalletCommand;

/// Result of [`CreateWalletCommand`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateWalletResponse {
    /// Card identifier
    pub card_id: Bytes,
    /// Card status after the command
    pub status: CardStatus,
    /// The new wallet public key
    pub wallet_public_key: Bytes,
}

impl CardCommand for CreateWalletCommand {
    type Output = CreateWalletResponse;

    const INSTRUCTION: Instruction = Instruction::CreateWallet;
    const REQUIRES_PIN2: bool = true;

    fn serialize(&self, ctx: &CommandContext<'_>) -> Result<TlvList> {
        let status = ctx.card()?.status;
        if status != CardStatus::Empty {
            return Err(Error::InvalidCardState {
                expected: CardStatus::Empty,
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
        Ok(CreateWalletResponse {
            card_id: check_card_id(ctx, &tlv)?,
            status: CardStatus::from_tlv(&tlv)?,
            wallet_public_key: tlv.required(Tag::WalletPublicKey)?.clone(),
        })
    }

    fn update_card(&self, output: &Self::Output, card: &mut Option<CardRecord>) {
        if let Some(card) = card {
            card.status = output.status;
            card.wallet_public_key = Some(output.wallet_public_key.clone());
            card.wallet_verified = None;
        }
    }
}
