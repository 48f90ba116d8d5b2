//! An in-memory card speaking the wire protocol, for integration tests

#![allow(dead_code)]

use std::time::Duration;

use bytes::Bytes;
use k256::{
    PublicKey, SecretKey,
    ecdsa::{Signature, SigningKey, signature::hazmat::PrehashSigner},
    elliptic_curve::sec1::ToEncodedPoint,
};
use sha2::{Digest, Sha256};
use tapsign_apdu_core::{CardTransport, SessionKey, Tag, TlvList, TransportError};
use tapsign_card::{
    CardStatus,
    crypto::{self, derive_protocol_key, pin_hash},
};

pub const UID: [u8; 7] = [0x04, 0x11, 0x22, 0x33, 0x44, 0x55, 0x66];
pub const CARD_ID: [u8; 8] = [0xCB, 0x22, 0x00, 0x00, 0x00, 0x02, 0x93, 0x89];

const SW_OK: [u8; 2] = [0x90, 0x00];
const SW_INVALID_PARAMS: [u8; 2] = [0x6A, 0x86];
const SW_INVALID_STATE: [u8; 2] = [0x69, 0x85];
const SW_INS_NOT_SUPPORTED: [u8; 2] = [0x6D, 0x00];
const SW_NEED_ENCRYPTION: [u8; 2] = [0x69, 0x82];
const SW_NEED_PAUSE: [u8; 2] = [0x97, 0x89];

/// Emulated card
#[derive(Debug)]
pub struct EmulatedCard {
    pub pin: [u8; 32],
    pub pin2: [u8; 32],
    pub status: CardStatus,
    pub card_key: SigningKey,
    pub wallet_key: Option<SigningKey>,
    /// Lowest encryption mode code the card accepts for regular commands
    pub required_mode: u8,
    /// NeedPause answers still to give before handling PIN2 commands
    pub pause_polls: u16,
    pub remaining_signatures: u32,
    pub signed_hashes: u32,
    /// Every frame received
    pub frames: Vec<Bytes>,
    /// Modes negotiated with OpenSession, in order
    pub sessions: Vec<u8>,
    session: Option<(u8, SessionKey)>,
}

impl EmulatedCard {
    pub fn new() -> Self {
        Self {
            pin: pin_hash("000000"),
            pin2: pin_hash("000"),
            status: CardStatus::Empty,
            card_key: SigningKey::from_slice(&[0x11; 32]).expect("valid key"),
            wallet_key: None,
            required_mode: 0,
            pause_polls: 0,
            remaining_signatures: 100,
            signed_hashes: 0,
            frames: Vec::new(),
            sessions: Vec::new(),
            session: None,
        }
    }

    /// Card with a wallet key already generated
    pub fn loaded() -> Self {
        let mut card = Self::new();
        card.status = CardStatus::Loaded;
        card.wallet_key = Some(SigningKey::from_slice(&[0x46; 32]).expect("valid key"));
        card
    }

    pub fn with_required_mode(mut self, mode: u8) -> Self {
        self.required_mode = mode;
        self
    }

    pub fn with_pause_polls(mut self, polls: u16) -> Self {
        self.pause_polls = polls;
        self
    }

    pub fn wallet_public_key(&self) -> Option<Vec<u8>> {
        self.wallet_key
            .as_ref()
            .map(|key| key.verifying_key().to_encoded_point(false).as_bytes().to_vec())
    }

    fn card_public_key(&self) -> Vec<u8> {
        self.card_key
            .verifying_key()
            .to_encoded_point(false)
            .as_bytes()
            .to_vec()
    }

    fn handle(&mut self, frame: &[u8]) -> Vec<u8> {
        let instruction = frame[1];
        let mode = frame[2];
        let body = frame.get(7..).unwrap_or_default();

        if instruction == 0xFF {
            return self.open_session(mode, body);
        }
        if mode < self.required_mode {
            return SW_NEED_ENCRYPTION.to_vec();
        }

        let plain = if mode == 0 {
            Bytes::copy_from_slice(body)
        } else {
            match &self.session {
                Some((session_mode, key)) if *session_mode == mode => match key.decrypt(body) {
                    Ok(plain) => plain,
                    Err(_) => return SW_INVALID_STATE.to_vec(),
                },
                _ => return SW_INVALID_STATE.to_vec(),
            }
        };
        let Ok(request) = TlvList::decode(&plain) else {
            return SW_INVALID_STATE.to_vec();
        };

        if request.value(Tag::Pin).map(|pin| pin.as_ref()) != Some(self.pin.as_slice()) {
            return SW_INVALID_PARAMS.to_vec();
        }
        let needs_pin2 = matches!(instruction, 0xF8 | 0xFA | 0xFB | 0xFC);
        if needs_pin2 {
            if request.value(Tag::Pin2).map(|pin| pin.as_ref()) != Some(self.pin2.as_slice()) {
                return SW_INVALID_PARAMS.to_vec();
            }
            if self.pause_polls > 0 {
                let remaining = self.pause_polls * 100;
                self.pause_polls -= 1;
                let mut answer = TlvList::new()
                    .with(Tag::Pause, remaining.to_be_bytes())
                    .encode()
                    .expect("pause encodes")
                    .to_vec();
                answer.extend_from_slice(&SW_NEED_PAUSE);
                return answer;
            }
        }

        let (records, sw) = match instruction {
            0xF2 => (self.read(), SW_OK),
            0xF6 => self.verify_card(&request),
            0xF9 => self.check_wallet(&request),
            0xF8 => self.create_wallet(),
            0xFC => self.purge_wallet(),
            0xFA => self.set_pin(&request),
            0xFB => self.sign(&request),
            _ => (TlvList::new(), SW_INS_NOT_SUPPORTED),
        };

        let plain = records.encode().expect("records encode");
        let mut answer = match (&self.session, mode) {
            (Some((_, key)), 1..) if !plain.is_empty() => {
                key.encrypt(&plain).expect("encrypts").to_vec()
            }
            _ => plain.to_vec(),
        };
        answer.extend_from_slice(&sw);
        answer
    }

    fn open_session(&mut self, mode: u8, body: &[u8]) -> Vec<u8> {
        let Ok(request) = TlvList::decode(body) else {
            return SW_INVALID_STATE.to_vec();
        };
        let Some(session_key_a) = request.value(Tag::SessionKeyA) else {
            return SW_INVALID_STATE.to_vec();
        };
        let protocol_key = derive_protocol_key(&self.pin, &UID);

        let mut hasher = Sha256::new();
        let session_key_b = match mode {
            1 => {
                let challenge = crypto::random_challenge();
                hasher.update(session_key_a);
                hasher.update(challenge);
                challenge.to_vec()
            }
            2 => {
                let Ok(host_key) = PublicKey::from_sec1_bytes(session_key_a) else {
                    return SW_INVALID_STATE.to_vec();
                };
                let secret = SecretKey::random(&mut rand_v8::thread_rng());
                hasher.update(crypto::ecdh_secret(&secret, &host_key));
                secret.public_key().to_encoded_point(false).as_bytes().to_vec()
            }
            _ => return SW_INVALID_STATE.to_vec(),
        };
        hasher.update(protocol_key);
        self.session = Some((mode, SessionKey::from_bytes(hasher.finalize().into())));
        self.sessions.push(mode);

        let mut answer = TlvList::new()
            .with(Tag::SessionKeyB, session_key_b)
            .encode()
            .expect("encodes")
            .to_vec();
        answer.extend_from_slice(&SW_OK);
        answer
    }

    fn read(&self) -> TlvList {
        TlvList::new()
            .with(Tag::CardId, CARD_ID)
            .with(Tag::ManufacturerName, "TAPSIGN")
            .with(Tag::Status, [self.status.code()])
            .with(Tag::Firmware, "4.12r")
            .with(Tag::CardPublicKey, self.card_public_key())
            .with(Tag::SigningMethod, [0x00u8])
            .with(Tag::CurveId, "secp256k1")
            .with_opt(Tag::WalletPublicKey, self.wallet_public_key())
            .with(Tag::WalletRemainingSignatures, self.remaining_signatures.to_be_bytes())
            .with(Tag::WalletSignedHashes, self.signed_hashes.to_be_bytes())
    }

    fn challenge_answer(
        &self,
        request: &TlvList,
        key: &SigningKey,
        signature_tag: Tag,
    ) -> (TlvList, [u8; 2]) {
        let Some(challenge) = request.value(Tag::Challenge) else {
            return (TlvList::new(), SW_INVALID_STATE);
        };
        let salt = crypto::random_challenge();
        let message = [&challenge[..], salt.as_slice()].concat();
        let records = TlvList::new()
            .with(Tag::CardId, CARD_ID)
            .with(Tag::Salt, salt)
            .with(signature_tag, crypto::issuer_signature(key, &message));
        (records, SW_OK)
    }

    fn verify_card(&self, request: &TlvList) -> (TlvList, [u8; 2]) {
        self.challenge_answer(request, &self.card_key, Tag::CardSignature)
    }

    fn check_wallet(&self, request: &TlvList) -> (TlvList, [u8; 2]) {
        match &self.wallet_key {
            Some(key) => self.challenge_answer(request, key, Tag::WalletSignature),
            None => (TlvList::new(), SW_INVALID_STATE),
        }
    }

    fn create_wallet(&mut self) -> (TlvList, [u8; 2]) {
        if self.status != CardStatus::Empty {
            return (TlvList::new(), SW_INVALID_STATE);
        }
        self.wallet_key = Some(SigningKey::random(&mut rand_v8::thread_rng()));
        self.status = CardStatus::Loaded;
        let records = TlvList::new()
            .with(Tag::CardId, CARD_ID)
            .with(Tag::Status, [self.status.code()])
            .with_opt(Tag::WalletPublicKey, self.wallet_public_key());
        (records, SW_OK)
    }

    fn purge_wallet(&mut self) -> (TlvList, [u8; 2]) {
        if self.status != CardStatus::Loaded {
            return (TlvList::new(), SW_INVALID_STATE);
        }
        self.wallet_key = None;
        self.status = CardStatus::Purged;
        let records = TlvList::new()
            .with(Tag::CardId, CARD_ID)
            .with(Tag::Status, [self.status.code()]);
        (records, SW_OK)
    }

    fn set_pin(&mut self, request: &TlvList) -> (TlvList, [u8; 2]) {
        let (Some(new_pin), Some(new_pin2)) =
            (request.value(Tag::NewPin), request.value(Tag::NewPin2))
        else {
            return (TlvList::new(), SW_INVALID_STATE);
        };
        let pin_changed = new_pin.as_ref() != self.pin.as_slice();
        let pin2_changed = new_pin2.as_ref() != self.pin2.as_slice();
        self.pin.copy_from_slice(new_pin);
        self.pin2.copy_from_slice(new_pin2);

        let sw = match (pin_changed, pin2_changed) {
            (true, true) => [0x90, 0x03],
            (true, false) => [0x90, 0x01],
            (false, true) => [0x90, 0x02],
            (false, false) => SW_OK,
        };
        (TlvList::new().with(Tag::CardId, CARD_ID), sw)
    }

    fn sign(&mut self, request: &TlvList) -> (TlvList, [u8; 2]) {
        let Some(key) = &self.wallet_key else {
            return (TlvList::new(), SW_INVALID_STATE);
        };
        let (Ok(Some(size)), Some(hashes)) = (
            request.u8(Tag::TransactionOutHashSize),
            request.value(Tag::TransactionOutHash),
        ) else {
            return (TlvList::new(), SW_INVALID_STATE);
        };

        let mut signatures = Vec::new();
        for hash in hashes.chunks(usize::from(size)) {
            let signature: Signature = key.sign_prehash(hash).expect("signs");
            signatures.extend_from_slice(&signature.to_bytes());
        }

        let count = (hashes.len() / usize::from(size)) as u32;
        self.signed_hashes += count;
        self.remaining_signatures -= count;

        let records = TlvList::new()
            .with(Tag::CardId, CARD_ID)
            .with(Tag::WalletSignature, signatures)
            .with(Tag::WalletRemainingSignatures, self.remaining_signatures.to_be_bytes())
            .with(Tag::WalletSignedHashes, self.signed_hashes.to_be_bytes());
        (records, SW_OK)
    }
}

impl CardTransport for EmulatedCard {
    fn do_transceive(&mut self, command: &[u8], _timeout: Duration) -> Result<Bytes, TransportError> {
        self.frames.push(Bytes::copy_from_slice(command));
        Ok(Bytes::from(self.handle(command)))
    }

    fn identifier(&self) -> Option<Bytes> {
        Some(Bytes::from_static(&UID))
    }

    fn connect(&mut self) -> Result<(), TransportError> {
        Ok(())
    }

    fn disconnect(&mut self) -> Result<(), TransportError> {
        Ok(())
    }

    fn is_connected(&self) -> bool {
        true
    }
}
