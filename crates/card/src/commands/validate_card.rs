use bytes::Bytes;
use tapsign_apdu_core::{Instruction, Status, Tag, TlvList};
use tracing::warn;

use super::{CardCommand, CommandContext, check_card_id};
use crate::{
    CardRecord, Error, Result,
    crypto::{self, CHALLENGE_SIZE},
};

/// Online card validation
///
/// The card signs the challenge together with a counter that increases on
/// every validation, so a backend can detect cloned answers.
#[derive(Debug, Clone)]
pub struct ValidateCardCommand {
    challenge: [u8; CHALLENGE_SIZE],
}

/// Result of [`ValidateCardCommand`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidateCardResponse {
    /// Card identifier
    pub card_id: Bytes,
    /// Validation counter after this validation
    pub counter: u32,
    /// Salt chosen by the card
    pub salt: Bytes,
    /// Card signature over `challenge ‖ salt ‖ counter`
    pub signature: Bytes,
    /// Whether the signature checks out against the card key
    pub valid: bool,
}

impl ValidateCardCommand {
    /// Command with a fresh random challenge
    pub fn new() -> Self {
        Self::with_challenge(crypto::random_challenge())
    }

    /// Command with a fixed challenge
    pub const fn with_challenge(challenge: [u8; CHALLENGE_SIZE]) -> Self {
        Self { challenge }
    }
}

impl Default for ValidateCardCommand {
    fn default() -> Self {
        Self::new()
    }
}

fn card_key<'a>(ctx: &CommandContext<'a>) -> Result<&'a Bytes> {
    ctx.card()?
        .card_public_key
        .as_ref()
        .ok_or(Error::InvalidResponse("card record has no card public key"))
}

impl CardCommand for ValidateCardCommand {
    type Output = ValidateCardResponse;

    const INSTRUCTION: Instruction = Instruction::ValidateCard;

    fn serialize(&self, ctx: &CommandContext<'_>) -> Result<TlvList> {
        card_key(ctx)?;
        Ok(ctx.pin_tlv().with(Tag::Challenge, self.challenge))
    }

    fn deserialize(
        &self,
        ctx: &CommandContext<'_>,
        _status: Status,
        tlv: TlvList,
    ) -> Result<Self::Output> {
        let card_id = check_card_id(ctx, &tlv)?;
        let counter = tlv.required_uint(Tag::ValidationCounter)?;
        let salt = tlv.required(Tag::Salt)?.clone();
        let signature = tlv.required(Tag::CardSignature)?.clone();

        let message = [
            self.challenge.as_slice(),
            &salt[..],
            counter.to_be_bytes().as_slice(),
        ]
        .concat();
        let valid = crypto::verify_signature(card_key(ctx)?, &message, &signature);
        if !valid {
            warn!(counter, "Card validation signature did not verify");
        }

        Ok(ValidateCardResponse {
            card_id,
            counter,
            salt,
            signature,
            valid,
        })
    }

    fn update_card(&self, output: &Self::Output, card: &mut Option<CardRecord>) {
        if let Some(card) = card {
            card.card_validated = Some(output.valid);
        }
    }
}

#[cfg(test)]
mod tests {
    use k256::{ecdsa::SigningKey, elliptic_curve::sec1::ToEncodedPoint};

    use super::*;
    use crate::{
        card::CardStatus,
        commands::test_utils::{card, pins},
    };

    #[test]
    fn test_validate_card_counter_is_signed() {
        let card_key = SigningKey::from_slice(&[0x11; 32]).unwrap();
        let mut record = card(CardStatus::Loaded);
        record.card_public_key = Some(Bytes::copy_from_slice(
            card_key.verifying_key().to_encoded_point(false).as_bytes(),
        ));
        let (pin, pin2) = pins();
        let ctx = CommandContext {
            pin: &pin,
            pin2: &pin2,
            card: Some(&record),
        };

        let challenge = [0x07; CHALLENGE_SIZE];
        let salt = [0x99; 16];
        let mut message = challenge.to_vec();
        message.extend_from_slice(&salt);
        message.extend_from_slice(&5u32.to_be_bytes());
        let signature = crypto::issuer_signature(&card_key, &message);

        let response = |counter: u32| {
            TlvList::new()
                .with(Tag::CardId, &record.card_id)
                .with(Tag::ValidationCounter, counter.to_be_bytes())
                .with(Tag::Salt, salt)
                .with(Tag::CardSignature, signature)
        };

        let command = ValidateCardCommand::with_challenge(challenge);
        let output = command
            .deserialize(&ctx, Status::ProcessCompleted, response(5))
            .unwrap();
        assert!(output.valid);
        assert_eq!(output.counter, 5);

        let replayed = command
            .deserialize(&ctx, Status::ProcessCompleted, response(6))
            .unwrap();
        assert!(!replayed.valid);
    }
}
