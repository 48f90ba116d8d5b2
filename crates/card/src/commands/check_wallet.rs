use bytes::Bytes;
use tapsign_apdu_core::{Instruction, Status, Tag, TlvList};
use tracing::warn;

use super::{CardCommand, CommandContext, check_card_id};
use crate::{
    CardRecord, Error, Result,
    crypto::{self, CHALLENGE_SIZE},
};

/// Prove the card holds the private half of its wallet key
#[derive(Debug, Clone)]
pub struct CheckWalletCommand {
    challenge: [u8; CHALLENGE_SIZE],
}

/// Result of [`CheckWalletCommand`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckWalletResponse {
    /// Card identifier
    pub card_id: Bytes,
    /// Salt chosen by the card
    pub salt: Bytes,
    /// Wallet signature over `challenge ‖ salt`
    pub signature: Bytes,
    /// Whether the signature checks out against the wallet key
    pub verified: bool,
}

impl CheckWalletCommand {
    /// Command with a fresh random challenge
    pub fn new() -> Self {
        Self::with_challenge(crypto::random_challenge())
    }

    /// Command with a fixed challenge
    pub const fn with_challenge(challenge: [u8; CHALLENGE_SIZE]) -> Self {
        Self { challenge }
    }
}

impl Default for CheckWalletCommand {
    fn default() -> Self {
        Self::new()
    }
}

fn wallet_key<'a>(ctx: &CommandContext<'a>) -> Result<&'a Bytes> {
    ctx.card()?
        .wallet_public_key
        .as_ref()
        .ok_or(Error::WalletNotCreated)
}

impl CardCommand for CheckWalletCommand {
    type Output = CheckWalletResponse;

    const INSTRUCTION: Instruction = Instruction::CheckWallet;

    fn serialize(&self, ctx: &CommandContext<'_>) -> Result<TlvList> {
        wallet_key(ctx)?;
        Ok(ctx.pin_tlv().with(Tag::Challenge, self.challenge))
    }

    fn deserialize(
        &self,
        ctx: &CommandContext<'_>,
        _status: Status,
        tlv: TlvList,
    ) -> Result<Self::Output> {
        let card_id = check_card_id(ctx, &tlv)?;
        let salt = tlv.required(Tag::Salt)?.clone();
        let signature = tlv.required(Tag::WalletSignature)?.clone();

        let message = [self.challenge.as_slice(), &salt[..]].concat();
        let verified = crypto::verify_signature(wallet_key(ctx)?, &message, &signature);
        if !verified {
            warn!(card_id = %hex::encode_upper(&card_id), "Wallet signature did not verify");
        }

        Ok(CheckWalletResponse {
            card_id,
            salt,
            signature,
            verified,
        })
    }

    fn update_card(&self, output: &Self::Output, card: &mut Option<CardRecord>) {
        if let Some(card) = card {
            card.wallet_verified = Some(output.verified);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        card::CardStatus,
        commands::test_utils::{card, pins},
    };

    #[test]
    fn test_check_wallet_without_wallet() {
        let (pin, pin2) = pins();
        let record = card(CardStatus::Empty);
        let ctx = CommandContext {
            pin: &pin,
            pin2: &pin2,
            card: Some(&record),
        };
        assert!(matches!(
            CheckWalletCommand::new().serialize(&ctx),
            Err(Error::WalletNotCreated)
        ));
    }

    #[test]
    fn test_check_wallet_rejects_foreign_card() {
        let (pin, pin2) = pins();
        let mut record = card(CardStatus::Loaded);
        record.wallet_public_key = Some(Bytes::from_static(&[0x04; 65]));
        let ctx = CommandContext {
            pin: &pin,
            pin2: &pin2,
            card: Some(&record),
        };
        let response = TlvList::new()
            .with(Tag::CardId, [0xAA; 8])
            .with(Tag::Salt, [0x00; 16])
            .with(Tag::WalletSignature, [0x00; 64]);
        assert!(matches!(
            CheckWalletCommand::new().deserialize(&ctx, Status::ProcessCompleted, response),
            Err(Error::InvalidResponse(_))
        ));
    }
}
