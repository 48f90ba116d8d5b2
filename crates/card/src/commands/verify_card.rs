use bytes::Bytes;
use tapsign_apdu_core::{Instruction, Status, Tag, TlvList};
use tracing::warn;

use super::{CardCommand, CommandContext, check_card_id};
use crate::{
    CardRecord, Error, Result,
    crypto::{self, CHALLENGE_SIZE},
};

/// Prove the card holds the private half of its card key
#[derive(Debug, Clone)]
pub struct VerifyCardCommand {
    challenge: [u8; CHALLENGE_SIZE],
}

/// Result of [`VerifyCardCommand`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifyCardResponse {
    /// Card identifier
    pub card_id: Bytes,
    /// Salt chosen by the card
    pub salt: Bytes,
    /// Card signature over `challenge ‖ salt`
    pub signature: Bytes,
    /// Whether the signature checks out against the card key
    pub verified: bool,
}

impl VerifyCardCommand {
    /// Command with a fresh random challenge
    pub fn new() -> Self {
        Self::with_challenge(crypto::random_challenge())
    }

    /// Command with a fixed challenge
    pub const fn with_challenge(challenge: [u8; CHALLENGE_SIZE]) -> Self {
        Self { challenge }
    }
}

impl Default for VerifyCardCommand {
    fn default() -> Self {
        Self::new()
    }
}

impl CardCommand for VerifyCardCommand {
    type Output = VerifyCardResponse;

    const INSTRUCTION: Instruction = Instruction::VerifyCard;

    fn serialize(&self, ctx: &CommandContext<'_>) -> Result<TlvList> {
        ctx.card()?
            .card_public_key
            .as_ref()
            .ok_or(Error::InvalidResponse("card record has no card public key"))?;
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
        let signature = tlv.required(Tag::CardSignature)?.clone();
        let public_key = ctx
            .card()?
            .card_public_key
            .as_ref()
            .ok_or(Error::InvalidResponse("card record has no card public key"))?;

        let message = [self.challenge.as_slice(), &salt[..]].concat();
        let verified = crypto::verify_signature(public_key, &message, &signature);
        if !verified {
            warn!(card_id = %hex::encode_upper(&card_id), "Card signature did not verify");
        }

        Ok(VerifyCardResponse {
            card_id,
            salt,
            signature,
            verified,
        })
    }

    fn update_card(&self, output: &Self::Output, card: &mut Option<CardRecord>) {
        if let Some(card) = card {
            card.card_verified = Some(output.verified);
        }
    }
}
