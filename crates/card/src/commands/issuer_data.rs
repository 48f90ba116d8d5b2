use bytes::Bytes;
use tapsign_apdu_core::{Instruction, Status, Tag, TlvList};
use tracing::warn;

use super::{CardCommand, CommandContext, check_card_id};
use crate::{Error, Result, crypto};

/// Largest issuer data blob the card stores
pub const MAX_ISSUER_DATA_SIZE: usize = 512;

/// Message the issuer signs for an issuer data blob
///
/// `card_id ‖ data`, followed by the big endian counter when one is used.
pub fn issuer_data_message(card_id: &[u8], data: &[u8], counter: Option<u32>) -> Vec<u8> {
    let mut message = Vec::with_capacity(card_id.len() + data.len() + 4);
    message.extend_from_slice(card_id);
    message.extend_from_slice(data);
    if let Some(counter) = counter {
        message.extend_from_slice(&counter.to_be_bytes());
    }
    message
}

fn verify_issuer_data(
    ctx: &CommandContext<'_>,
    data: &[u8],
    signature: &[u8],
    counter: Option<u32>,
) -> Result<bool> {
    let card = ctx.card()?;
    let Some(key) = &card.issuer_data_public_key else {
        return Ok(false);
    };
    let message = issuer_data_message(&card.card_id, data, counter);
    if crypto::verify_signature(key, &message, signature) {
        Ok(true)
    } else {
        warn!(card_id = %card.card_id_hex(), "Issuer data signature did not verify");
        Err(Error::VerificationFailed("issuer data signature"))
    }
}

/// Store an issuer signed data blob on the card
#[derive(Debug, Clone)]
pub struct WriteIssuerDataCommand {
    data: Bytes,
    signature: Bytes,
    counter: Option<u32>,
}

impl WriteIssuerDataCommand {
    /// Command for `data` signed by the issuer over [`issuer_data_message`]
    pub fn new(
        data: impl AsRef<[u8]>,
        signature: impl AsRef<[u8]>,
        counter: Option<u32>,
    ) -> Result<Self> {
        let data = data.as_ref();
        if data.len() > MAX_ISSUER_DATA_SIZE {
            return Err(Error::IssuerDataTooLarge {
                len: data.len(),
                max: MAX_ISSUER_DATA_SIZE,
            });
        }
        Ok(Self {
            data: Bytes::copy_from_slice(data),
            signature: Bytes::copy_from_slice(signature.as_ref()),
            counter,
        })
    }
}

impl CardCommand for WriteIssuerDataCommand {
    type Output = Bytes;

    const INSTRUCTION: Instruction = Instruction::WriteIssuerData;

    fn serialize(&self, ctx: &CommandContext<'_>) -> Result<TlvList> {
        verify_issuer_data(ctx, &self.data, &self.signature, self.counter)?;
        Ok(ctx
            .pin_tlv()
            .with(Tag::IssuerData, &self.data)
            .with(Tag::IssuerDataSignature, &self.signature)
            .with_opt(Tag::IssuerDataCounter, self.counter.map(u32::to_be_bytes)))
    }

    fn deserialize(
        &self,
        ctx: &CommandContext<'_>,
        _status: Status,
        tlv: TlvList,
    ) -> Result<Self::Output> {
        check_card_id(ctx, &tlv)
    }
}

/// Read back the issuer data blob
#[derive(Debug, Clone, Copy, Default)]
pub struct ReadIssuerDataCommand;

/// Result of [`ReadIssuerDataCommand`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuerDataResponse {
    /// Card identifier
    pub card_id: Bytes,
    /// Stored data
    pub data: Bytes,
    /// Issuer signature over the data
    pub signature: Bytes,
    /// Write counter, when the issuer uses one
    pub counter: Option<u32>,
    /// Whether the signature was checked against a known issuer key
    pub verified: bool,
}

impl CardCommand for ReadIssuerDataCommand {
    type Output = IssuerDataResponse;

    const INSTRUCTION: Instruction = Instruction::ReadIssuerData;

    fn serialize(&self, ctx: &CommandContext<'_>) -> Result<TlvList> {
        ctx.card()?;
        Ok(ctx.pin_tlv())
    }

    fn deserialize(
        &self,
        ctx: &CommandContext<'_>,
        _status: Status,
        tlv: TlvList,
    ) -> Result<Self::Output> {
        let card_id = check_card_id(ctx, &tlv)?;
        let data = tlv.value(Tag::IssuerData).cloned().unwrap_or_default();
        let signature = tlv.required(Tag::IssuerDataSignature)?.clone();
        let counter = tlv.uint(Tag::IssuerDataCounter)?;
        let verified = verify_issuer_data(ctx, &data, &signature, counter)?;

        Ok(IssuerDataResponse {
            card_id,
            data,
            signature,
            counter,
            verified,
        })
    }
}
