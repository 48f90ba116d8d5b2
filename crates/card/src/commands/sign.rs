//! Signing with the wallet key
//!
//! The card signs either up to [`MAX_HASHES_PER_REQUEST`] equally sized hashes
//! or one raw payload. Which extra records go along depends on the signing
//! methods the card was personalized with.

use bytes::Bytes;
use k256::ecdsa::Signature;
use tapsign_apdu_core::{Instruction, Status, Tag, TlvList};
use tracing::debug;

use super::{CardCommand, CommandContext, check_card_id, issuer_data_message};
use crate::{
    CardRecord, Error, Result,
    card::{CardStatus, SigningMethod, SigningMethods},
    crypto,
};

/// Most hashes the card signs in one request
pub const MAX_HASHES_PER_REQUEST: usize = 10;

/// Largest raw payload the card accepts
pub const MAX_RAW_PAYLOAD_SIZE: usize = 1024;

/// Size of one wallet signature, `r ‖ s`
const SIGNATURE_SIZE: usize = 64;

/// What the card is asked to sign
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignPayload {
    /// Digests, all of the same length
    Hashes(Vec<Bytes>),
    /// A raw payload the card hashes itself
    Raw(Bytes),
}

impl SignPayload {
    /// Number of signatures the card answers with
    pub fn signature_count(&self) -> usize {
        match self {
            Self::Hashes(hashes) => hashes.len(),
            Self::Raw(_) => 1,
        }
    }

    const fn is_raw(&self) -> bool {
        matches!(self, Self::Raw(_))
    }
}

#[derive(Debug, Clone)]
struct IssuerDataUpdate {
    data: Bytes,
    signature: Bytes,
    counter: Option<u32>,
}

/// Sign hashes or a raw payload with the wallet key
#[derive(Debug, Clone)]
pub struct SignCommand {
    payload: SignPayload,
    issuer_signature: Option<Bytes>,
    issuer_data: Option<IssuerDataUpdate>,
}

/// Result of [`SignCommand`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignResponse {
    /// Card identifier
    pub card_id: Bytes,
    /// Concatenated 64 byte signatures, one per hash, in request order
    pub signature: Bytes,
    /// Signatures the wallet may still produce
    pub remaining_signatures: Option<u32>,
    /// Hashes signed by the wallet so far
    pub signed_hashes: Option<u32>,
}

impl SignResponse {
    /// Raw `r ‖ s` signatures as returned by the card
    pub fn signatures(&self) -> impl Iterator<Item = &[u8]> {
        self.signature.chunks_exact(SIGNATURE_SIZE)
    }

    /// Signatures normalized to low S
    ///
    /// The card does not guarantee low S, so callers that hand signatures to
    /// a network should use these.
    pub fn canonical_signatures(&self) -> Result<Vec<Signature>> {
        self.signatures()
            .map(|raw| crypto::canonical_signature(raw).map_err(Error::from))
            .collect()
    }
}

impl SignCommand {
    /// Sign `hashes`
    ///
    /// All hashes must have the same non-zero length and there may be at most
    /// [`MAX_HASHES_PER_REQUEST`] of them.
    pub fn hashes<I, H>(hashes: I) -> Result<Self>
    where
        I: IntoIterator<Item = H>,
        H: AsRef<[u8]>,
    {
        let hashes: Vec<Bytes> = hashes
            .into_iter()
            .map(|hash| Bytes::copy_from_slice(hash.as_ref()))
            .collect();

        let first = hashes.first().ok_or(Error::NoHashes)?;
        if hashes.len() > MAX_HASHES_PER_REQUEST {
            return Err(Error::TooManyInputs {
                count: hashes.len(),
                max: MAX_HASHES_PER_REQUEST,
            });
        }
        let expected = first.len();
        if expected == 0 || expected > usize::from(u8::MAX) {
            return Err(Error::HashLengthMismatch {
                expected: 32,
                found: expected,
            });
        }
        if let Some(hash) = hashes.iter().find(|hash| hash.len() != expected) {
            return Err(Error::HashLengthMismatch {
                expected,
                found: hash.len(),
            });
        }

        Ok(Self::with_payload(SignPayload::Hashes(hashes)))
    }

    /// Sign a raw payload of at most [`MAX_RAW_PAYLOAD_SIZE`] bytes
    pub fn raw(payload: impl AsRef<[u8]>) -> Result<Self> {
        let payload = payload.as_ref();
        if payload.len() > MAX_RAW_PAYLOAD_SIZE {
            return Err(Error::PayloadTooLarge {
                len: payload.len(),
                max: MAX_RAW_PAYLOAD_SIZE,
            });
        }
        Ok(Self::with_payload(SignPayload::Raw(Bytes::copy_from_slice(
            payload,
        ))))
    }

    const fn with_payload(payload: SignPayload) -> Self {
        Self {
            payload,
            issuer_signature: None,
            issuer_data: None,
        }
    }

    /// Attach the issuer's co-signature over [`issuer_transaction_message`]
    pub fn with_issuer_signature(mut self, signature: impl AsRef<[u8]>) -> Self {
        self.issuer_signature = Some(Bytes::copy_from_slice(signature.as_ref()));
        self
    }

    /// Attach an issuer data update, signed over [`issuer_data_message`]
    pub fn with_issuer_data(
        mut self,
        data: impl AsRef<[u8]>,
        signature: impl AsRef<[u8]>,
        counter: Option<u32>,
    ) -> Self {
        self.issuer_data = Some(IssuerDataUpdate {
            data: Bytes::copy_from_slice(data.as_ref()),
            signature: Bytes::copy_from_slice(signature.as_ref()),
            counter,
        });
        self
    }

    /// What is being signed
    pub const fn payload(&self) -> &SignPayload {
        &self.payload
    }

    /// Pick the signing method that fits the payload and the extras supplied
    ///
    /// Methods needing extras we do not have are skipped, so the error reports
    /// the first extra that is missing.
    pub fn select_method(&self, methods: SigningMethods) -> Result<SigningMethod> {
        let raw = self.payload.is_raw();
        let candidates = methods
            .iter()
            .filter(|method| method.signs_raw() == raw)
            .collect::<Vec<_>>();
        if candidates.is_empty() {
            return Err(Error::UnsupportedSigningMethod);
        }

        if let Some(method) = candidates.iter().copied().find(|method| {
            (!method.requires_issuer_signature() || self.issuer_signature.is_some())
                && (!method.requires_issuer_data() || self.issuer_data.is_some())
        }) {
            return Ok(method);
        }

        if self.issuer_signature.is_none()
            && candidates
                .iter()
                .all(|method| method.requires_issuer_signature())
        {
            Err(Error::IssuerValidationRequired)
        } else {
            Err(Error::IssuerDataRequired)
        }
    }
}

/// Message the issuer co-signs for validated signing: `card_id ‖ payload`
pub fn issuer_transaction_message(card_id: &[u8], payload: &SignPayload) -> Vec<u8> {
    let mut message = card_id.to_vec();
    match payload {
        SignPayload::Hashes(hashes) => {
            for hash in hashes {
                message.extend_from_slice(hash);
            }
        }
        SignPayload::Raw(raw) => message.extend_from_slice(raw),
    }
    message
}

impl CardCommand for SignCommand {
    type Output = SignResponse;

    const INSTRUCTION: Instruction = Instruction::Sign;
    const REQUIRES_PIN2: bool = true;

    fn serialize(&self, ctx: &CommandContext<'_>) -> Result<TlvList> {
        let card = ctx.card()?;
        if card.status != CardStatus::Loaded {
            return Err(Error::InvalidCardState {
                expected: CardStatus::Loaded,
                actual: card.status,
            });
        }
        let methods = card
            .signing_methods
            .ok_or(Error::UnsupportedSigningMethod)?;
        let method = self.select_method(methods)?;
        debug!(?method, count = self.payload.signature_count(), "Signing");

        let mut tlv = ctx.pin2_tlv();
        match &self.payload {
            SignPayload::Hashes(hashes) => {
                let size = hashes.first().map_or(0, |hash| hash.len() as u8);
                tlv.push(Tag::TransactionOutHashSize, [size]);
                tlv.push(Tag::TransactionOutHash, hashes.concat());
            }
            SignPayload::Raw(raw) => tlv.push(Tag::TransactionOutRaw, raw),
        }

        if method.requires_issuer_signature() {
            tlv.push_opt(Tag::IssuerTransactionSignature, self.issuer_signature.as_ref());
        }
        if method.requires_issuer_data() {
            if let Some(update) = &self.issuer_data {
                if let Some(key) = &card.issuer_data_public_key {
                    let message = issuer_data_message(&card.card_id, &update.data, update.counter);
                    if !crypto::verify_signature(key, &message, &update.signature) {
                        return Err(Error::VerificationFailed("issuer data signature"));
                    }
                }
                tlv.push(Tag::IssuerData, &update.data);
                tlv.push(Tag::IssuerDataSignature, &update.signature);
                tlv.push_opt(
                    Tag::IssuerDataCounter,
                    update.counter.map(u32::to_be_bytes),
                );
            }
        }

        Ok(tlv)
    }

    fn deserialize(
        &self,
        ctx: &CommandContext<'_>,
        _status: Status,
        tlv: TlvList,
    ) -> Result<Self::Output> {
        let card_id = check_card_id(ctx, &tlv)?;
        let signature = tlv.required(Tag::WalletSignature)?.clone();
        if signature.len() != SIGNATURE_SIZE * self.payload.signature_count() {
            return Err(Error::InvalidResponse(
                "signature length does not match the number of hashes",
            ));
        }

        Ok(SignResponse {
            card_id,
            signature,
            remaining_signatures: tlv.uint(Tag::WalletRemainingSignatures)?,
            signed_hashes: tlv.uint(Tag::WalletSignedHashes)?,
        })
    }

    fn update_card(&self, output: &Self::Output, card: &mut Option<CardRecord>) {
        if let Some(card) = card {
            if output.remaining_signatures.is_some() {
                card.remaining_signatures = output.remaining_signatures;
            }
            if output.signed_hashes.is_some() {
                card.signed_hashes = output.signed_hashes;
            }
        }
    }
}
