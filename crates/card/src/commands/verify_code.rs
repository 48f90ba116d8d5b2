use bytes::Bytes;
use tapsign_apdu_core::{Instruction, Status, Tag, TlvList};
use tracing::warn;

use super::{CardCommand, CommandContext, check_card_id};
use crate::{
    CardRecord, Error, Result,
    crypto::{self, CHALLENGE_SIZE},
};

/// Ask the card to hash a range of its firmware pages and sign the result
#[derive(Debug, Clone)]
pub struct VerifyCodeCommand {
    challenge: [u8; CHALLENGE_SIZE],
    code_page_address: u32,
    code_page_count: u16,
    expected_hash: Option<Bytes>,
}

/// Result of [`VerifyCodeCommand`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifyCodeResponse {
    /// Card identifier
    pub card_id: Bytes,
    /// Hash over the requested pages
    pub code_hash: Bytes,
    /// Card signature over `challenge ‖ code_hash`
    pub signature: Bytes,
    /// Whether the signature checks out against the card key
    pub signature_valid: bool,
    /// Whether the hash matches the expected one, if one was given
    pub hash_matches: Option<bool>,
}

impl VerifyCodeResponse {
    /// Signature valid and no hash mismatch
    pub fn verified(&self) -> bool {
        self.signature_valid && self.hash_matches != Some(false)
    }
}

impl VerifyCodeCommand {
    /// Command for `code_page_count` pages starting at `code_page_address`
    pub fn new(code_page_address: u32, code_page_count: u16) -> Self {
        Self {
            challenge: crypto::random_challenge(),
            code_page_address,
            code_page_count,
            expected_hash: None,
        }
    }

    /// Use a fixed challenge
    pub const fn with_challenge(mut self, challenge: [u8; CHALLENGE_SIZE]) -> Self {
        self.challenge = challenge;
        self
    }

    /// Compare the returned hash against a known good one
    pub fn with_expected_hash(mut self, hash: impl AsRef<[u8]>) -> Self {
        self.expected_hash = Some(Bytes::copy_from_slice(hash.as_ref()));
        self
    }
}

fn card_key<'a>(ctx: &CommandContext<'a>) -> Result<&'a Bytes> {
    ctx.card()?
        .card_public_key
        .as_ref()
        .ok_or(Error::InvalidResponse("card record has no card public key"))
}

impl CardCommand for VerifyCodeCommand {
    type Output = VerifyCodeResponse;

    const INSTRUCTION: Instruction = Instruction::VerifyCode;

    fn serialize(&self, ctx: &CommandContext<'_>) -> Result<TlvList> {
        card_key(ctx)?;
        Ok(ctx
            .pin_tlv()
            .with(Tag::Challenge, self.challenge)
            .with(Tag::CodePageAddress, self.code_page_address.to_be_bytes())
            .with(Tag::CodePageCount, self.code_page_count.to_be_bytes()))
    }

    fn deserialize(
        &self,
        ctx: &CommandContext<'_>,
        _status: Status,
        tlv: TlvList,
    ) -> Result<Self::Output> {
        let card_id = check_card_id(ctx, &tlv)?;
        let code_hash = tlv.required(Tag::CodeHash)?.clone();
        let signature = tlv.required(Tag::CardSignature)?.clone();

        let message = [self.challenge.as_slice(), &code_hash[..]].concat();
        let signature_valid = crypto::verify_signature(card_key(ctx)?, &message, &signature);
        let hash_matches = self
            .expected_hash
            .as_ref()
            .map(|expected| *expected == code_hash);
        if !signature_valid || hash_matches == Some(false) {
            warn!(signature_valid, ?hash_matches, "Code verification failed");
        }

        Ok(VerifyCodeResponse {
            card_id,
            code_hash,
            signature,
            signature_valid,
            hash_matches,
        })
    }

    fn update_card(&self, output: &Self::Output, card: &mut Option<CardRecord>) {
        if let Some(card) = card {
            card.code_verified = Some(output.verified());
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
    fn test_verify_code() {
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

        let challenge = [0x42; CHALLENGE_SIZE];
        let command = VerifyCodeCommand::new(0x0800_0000, 4)
            .with_challenge(challenge)
            .with_expected_hash([0xEE; 32]);
        let request = command.serialize(&ctx).unwrap();
        assert_eq!(request.uint(Tag::CodePageAddress).unwrap(), Some(0x0800_0000));
        assert_eq!(request.uint(Tag::CodePageCount).unwrap(), Some(4));

        let response = |hash: [u8; 32]| {
            let message = [challenge.as_slice(), &hash[..]].concat();
            TlvList::new()
                .with(Tag::CardId, &record.card_id)
                .with(Tag::CodeHash, hash)
                .with(Tag::CardSignature, crypto::issuer_signature(&card_key, &message))
        };

        let good = command
            .deserialize(&ctx, Status::ProcessCompleted, response([0xEE; 32]))
            .unwrap();
        assert!(good.verified());

        let tampered = command
            .deserialize(&ctx, Status::ProcessCompleted, response([0xEF; 32]))
            .unwrap();
        assert!(tampered.signature_valid);
        assert!(!tampered.verified());

        let mut cached = Some(record.clone());
        command.update_card(&tampered, &mut cached);
        assert_eq!(cached.unwrap().code_verified, Some(false));
    }
}
