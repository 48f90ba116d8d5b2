//! The command protocol
//!
//! [`CardProtocol`] runs one typed command at a time. For every command it
//! negotiates a session key when the encryption mode asks for one, frames and
//! encrypts the request, polls through security delays, escalates encryption
//! when the card demands it and maps the final status word.

use std::fmt;

use k256::ecdsa::Signature;
use tapsign_apdu_core::{ApduCommand, CardTransport, Instruction, Response, Status};
use tracing::{debug, info, instrument, trace, warn};

use crate::{
    CardRecord, Error, Result,
    commands::*,
    config::ProtocolConfig,
    crypto::pin_hash,
    delay::{CancelToken, DelayStep, SecurityDelay},
    notifier::{CardNotifier, NoopNotifier},
    session::SessionState,
};

/// Drives typed commands against a card over a transport
pub struct CardProtocol<T: CardTransport, N: CardNotifier = NoopNotifier> {
    transport: T,
    notifier: N,
    config: ProtocolConfig,
    session: SessionState,
    pin: PinHash,
    pin2: PinHash,
    default_pin2: PinHash,
    card: Option<CardRecord>,
    cancel: CancelToken,
}

impl<T: CardTransport> CardProtocol<T> {
    /// Create a protocol without notifications
    pub fn new(transport: T, config: ProtocolConfig) -> Self {
        Self::with_notifier(transport, NoopNotifier, config)
    }
}

impl<T: CardTransport, N: CardNotifier> CardProtocol<T, N> {
    /// Create a protocol reporting to `notifier`
    pub fn with_notifier(transport: T, notifier: N, config: ProtocolConfig) -> Self {
        let default_pin2 = pin_hash(&config.default_pin2);
        Self {
            transport,
            notifier,
            session: SessionState::new(config.encryption),
            pin: pin_hash(&config.default_pin),
            pin2: default_pin2,
            default_pin2,
            card: None,
            cancel: CancelToken::new(),
            config,
        }
    }

    /// Configuration in use
    pub const fn config(&self) -> &ProtocolConfig {
        &self.config
    }

    /// Use `pin` as PIN1 from now on
    ///
    /// The protocol key depends on PIN1, so the session key is dropped.
    pub fn set_pin(&mut self, pin: &str) {
        self.pin = pin_hash(pin);
        self.session.invalidate();
    }

    /// Use `pin2` as PIN2 from now on
    pub fn set_pin2(&mut self, pin2: &str) {
        self.pin2 = pin_hash(pin2);
    }

    /// Token that cancels a pending security delay from another thread
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Record of the card in the field, once read
    pub const fn card(&self) -> Option<&CardRecord> {
        self.card.as_ref()
    }

    /// Replace the cached card record
    pub fn set_card(&mut self, card: Option<CardRecord>) {
        self.card = card;
    }

    /// Session state
    pub const fn session(&self) -> &SessionState {
        &self.session
    }

    /// Underlying transport
    pub const fn transport(&self) -> &T {
        &self.transport
    }

    /// Underlying transport, mutably
    pub const fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Notifier, mutably
    pub const fn notifier_mut(&mut self) -> &mut N {
        &mut self.notifier
    }

    /// Take the transport back
    pub fn into_transport(self) -> T {
        self.transport
    }

    /// Forget the card and the session, for a new card brought into the field
    pub fn reset(&mut self) {
        self.card = None;
        self.session.reset(self.config.encryption);
    }

    /// Run a typed command
    ///
    /// Notifies the start, then either the finish or the cancellation. Errors
    /// that leave the channel in an unknown state drop the session key.
    #[instrument(level = "debug", skip_all, fields(instruction = %C::INSTRUCTION))]
    pub fn run<C: CardCommand>(&mut self, command: &C) -> Result<C::Output> {
        self.notifier.on_read_start();
        let result = self.execute(command);

        match &result {
            Ok(_) => self.notifier.on_read_finish(None),
            Err(error) => {
                if error.invalidates_session() {
                    self.session.invalidate();
                }
                if matches!(error, Error::Cancelled) {
                    self.cancel.reset();
                    self.notifier.on_read_cancel();
                } else {
                    self.notifier.on_read_finish(Some(error));
                }
            }
        }
        result
    }

    fn context(&self) -> CommandContext<'_> {
        CommandContext {
            pin: &self.pin,
            pin2: &self.pin2,
            card: self.card.as_ref(),
        }
    }

    fn execute<C: CardCommand>(&mut self, command: &C) -> Result<C::Output> {
        loop {
            self.ensure_session()?;

            let tlv = command.serialize(&self.context())?;
            let frame = ApduCommand::new(C::INSTRUCTION, tlv)
                .with_p1(self.session.mode().code())
                .build(self.session.session_key())?;
            let response = self.transmit(&frame)?;

            match response.status() {
                Status::NeedEncryption => {
                    let mode = self
                        .session
                        .escalate()
                        .ok_or(Error::EncryptionUnavailable)?;
                    info!(%mode, "Card requires stronger encryption, retrying");
                }
                Status::InvalidParams => {
                    warn!(instruction = %C::INSTRUCTION, "PIN rejected");
                    return Err(if C::REQUIRES_PIN2 {
                        Error::InvalidPin2
                    } else {
                        Error::InvalidPin
                    });
                }
                status if status.is_success() => {
                    let output = command.deserialize(&self.context(), status, response.into_tlv()?)?;
                    if C::REQUIRES_PIN2 {
                        let pin2_default = self.pin2 == self.default_pin2;
                        if let Some(card) = &mut self.card {
                            card.pin2_default = Some(pin2_default);
                        }
                    }
                    command.update_card(&output, &mut self.card);
                    return Ok(output);
                }
                _ => {
                    return Err(Error::Status {
                        instruction: C::INSTRUCTION,
                        status: response.status_word(),
                    });
                }
            }
        }
    }

    /// Negotiate a session key if the mode needs one and none is established
    fn ensure_session(&mut self) -> Result<()> {
        if !self.session.needs_negotiation() {
            return Ok(());
        }
        let result = self.open_session();
        if result.is_err() {
            self.session.invalidate();
        }
        result
    }

    fn open_session(&mut self) -> Result<()> {
        let identifier = self
            .transport
            .identifier()
            .ok_or(Error::MissingIdentifier)?;
        // Derive (or fetch) before starting so a stale key is dropped first
        self.session.protocol_key(&self.pin, &identifier);

        let negotiation = self.session.begin()?;
        let command = OpenSessionCommand::new(negotiation.session_key_a());
        let tlv = command.serialize(&self.context())?;
        let frame = ApduCommand::new(Instruction::OpenSession, tlv)
            .with_p1(negotiation.mode().code())
            .build(None)?;

        let response = self.exchange(&frame)?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::Status {
                instruction: Instruction::OpenSession,
                status: response.status_word(),
            });
        }
        let session_key_b = command.deserialize(&self.context(), status, response.into_tlv()?)?;

        let protocol_key = self.session.protocol_key(&self.pin, &identifier);
        let key = negotiation.finish(&session_key_b, protocol_key)?;
        self.session.establish(key);
        Ok(())
    }

    /// Send `frame`, re-sending it unchanged while the card asks for a pause
    fn transmit(&mut self, frame: &[u8]) -> Result<Response> {
        let cancel = self.cancel.clone();
        let mut delay = SecurityDelay::new(self.config.security_delay, &cancel);

        let mut response = self.exchange(frame)?;
        while let DelayStep::Poll { remaining_ms } = delay.step(&response)? {
            self.notifier.on_security_delay(remaining_ms);
            response = self.exchange(frame)?;
        }
        Ok(response)
    }

    /// One request/response pair
    fn exchange(&mut self, frame: &[u8]) -> Result<Response> {
        let timeout = self.config.timeout();
        self.notifier.on_before_request(timeout);
        let bytes = self.transport.transceive(frame, timeout);
        self.notifier.on_after_request();

        let response = Response::parse(&bytes?, self.session.session_key())?;
        trace!(status = %response.status_word(), "Card answered");
        Ok(response)
    }

    /// Read the card and cache the record
    pub fn read(&mut self) -> Result<CardRecord> {
        self.run(&ReadCommand)
    }

    /// Check the card's key with a random challenge
    pub fn verify_card(&mut self) -> Result<VerifyCardResponse> {
        self.run(&VerifyCardCommand::new())
    }

    /// Check the wallet key with a random challenge
    pub fn check_wallet(&mut self) -> Result<CheckWalletResponse> {
        self.run(&CheckWalletCommand::new())
    }

    /// Generate the wallet key
    pub fn create_wallet(&mut self) -> Result<CreateWalletResponse> {
        self.run(&CreateWalletCommand)
    }

    /// Destroy the wallet key
    pub fn purge_wallet(&mut self) -> Result<PurgeWalletResponse> {
        self.run(&PurgeWalletCommand)
    }

    /// Validate the card online, returning the signed counter
    pub fn validate_card(&mut self) -> Result<ValidateCardResponse> {
        self.run(&ValidateCardCommand::new())
    }

    /// Hash and sign a range of firmware pages
    pub fn verify_code(
        &mut self,
        code_page_address: u32,
        code_page_count: u16,
    ) -> Result<VerifyCodeResponse> {
        self.run(&VerifyCodeCommand::new(code_page_address, code_page_count))
    }

    /// Read the issuer data blob
    pub fn read_issuer_data(&mut self) -> Result<IssuerDataResponse> {
        self.run(&ReadIssuerDataCommand)
    }

    /// Write an issuer data blob
    pub fn write_issuer_data(&mut self, command: &WriteIssuerDataCommand) -> Result<()> {
        self.run(command).map(drop)
    }

    /// Change both PINs, switching to the new values on success
    pub fn change_pins(&mut self, new_pin: &str, new_pin2: &str) -> Result<SetPinResponse> {
        let command = SetPinCommand::new(new_pin, new_pin2);
        let response = self.run(&command)?;

        if *command.new_pin() != self.pin {
            self.pin = *command.new_pin();
            self.session.invalidate();
        }
        self.pin2 = *command.new_pin2();
        let pin2_default = self.pin2 == self.default_pin2;
        if let Some(card) = &mut self.card {
            card.pin2_default = Some(pin2_default);
        }
        debug!(status = %response.status, "PINs changed");
        Ok(response)
    }

    /// Sign up to [`MAX_HASHES_PER_REQUEST`] hashes in a single request
    ///
    /// Longer lists fail with [`Error::TooManyInputs`] before anything is
    /// sent. Signatures are returned low-S normalized, in input order.
    pub fn sign_hashes<H: AsRef<[u8]>>(&mut self, hashes: &[H]) -> Result<Vec<Signature>> {
        let command = SignCommand::hashes(hashes)?;
        let response = self.run(&command)?;
        let signatures = response.canonical_signatures()?;
        self.notifier.on_read_progress(100);
        Ok(signatures)
    }
}

impl<T: CardTransport, N: CardNotifier> fmt::Debug for CardProtocol<T, N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CardProtocol")
            .field("transport", &self.transport)
            .field("config", &self.config)
            .field("session", &self.session)
            .field("card", &self.card.as_ref().map(CardRecord::card_id_hex))
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use tapsign_apdu_core::{MockTransport, Tag, TlvList, TransportError};

    use super::*;
    use crate::{card::CardStatus, session::SessionPhase};

    fn answer(tlv: TlvList, sw: [u8; 2]) -> Bytes {
        let mut bytes = tlv.encode().unwrap().to_vec();
        bytes.extend_from_slice(&sw);
        Bytes::from(bytes)
    }

    fn read_answer(status: CardStatus) -> Bytes {
        answer(
            TlvList::new()
                .with(Tag::CardId, [0xCB, 0x22, 0x00, 0x00, 0x00, 0x02, 0x93, 0x89])
                .with(Tag::Status, [status.code()])
                .with(Tag::SigningMethod, [0x00u8]),
            [0x90, 0x00],
        )
    }

    fn protocol(responses: Vec<Bytes>) -> CardProtocol<MockTransport> {
        CardProtocol::new(MockTransport::new(responses), ProtocolConfig::new())
    }

    #[test]
    fn test_read_caches_record() {
        let mut protocol = protocol(vec![read_answer(CardStatus::Empty)]);
        let record = protocol.read().unwrap();
        assert_eq!(record.card_id_hex(), "CB22000000029389");
        assert_eq!(protocol.card(), Some(&record));

        let sent = &protocol.transport().commands[0];
        assert_eq!(&sent[..4], &[0x00, 0xF2, 0x00, 0x00]);
    }

    #[test]
    fn test_invalid_pin_mapping() {
        let mut protocol = protocol(vec![Bytes::from_static(&[0x6A, 0x86])]);
        assert!(matches!(protocol.read(), Err(Error::InvalidPin)));

        let mut protocol = self::protocol(vec![
            read_answer(CardStatus::Empty),
            Bytes::from_static(&[0x6A, 0x86]),
        ]);
        protocol.read().unwrap();
        assert!(matches!(protocol.create_wallet(), Err(Error::InvalidPin2)));
    }

    #[test]
    fn test_unexpected_status() {
        let mut protocol = protocol(vec![Bytes::from_static(&[0x69, 0x85])]);
        let err = protocol.read().unwrap_err();
        assert!(matches!(err, Error::Status {
            instruction: Instruction::Read,
            ..
        }));
        assert_eq!(err.status_word().unwrap().to_u16(), 0x6985);
    }

    #[test]
    fn test_security_delay_resends_same_frame() {
        let pause = |units: u8| {
            answer(
                TlvList::new().with(Tag::Pause, [0x00, units]),
                [0x97, 0x89],
            )
        };
        let mut protocol = protocol(vec![
            pause(30),
            pause(20),
            pause(10),
            read_answer(CardStatus::Loaded),
        ]);

        protocol.read().unwrap();
        let commands = &protocol.transport().commands;
        assert_eq!(commands.len(), 4);
        assert!(commands.iter().all(|frame| frame == &commands[0]));
    }

    #[test]
    fn test_cancel_during_delay() {
        let pause = answer(TlvList::new().with(Tag::Pause, [0x00, 0x10]), [0x97, 0x89]);
        let mut protocol = protocol(vec![pause.clone(), pause]);
        protocol.cancel_token().cancel();

        assert!(matches!(protocol.read(), Err(Error::Cancelled)));
        assert!(!protocol.cancel_token().is_cancelled());
    }

    #[test]
    fn test_need_encryption_without_identifier() {
        let mut protocol = protocol(vec![Bytes::from_static(&[0x69, 0x82])]);
        assert!(matches!(protocol.read(), Err(Error::MissingIdentifier)));
        assert_eq!(protocol.session().phase(), SessionPhase::Unencrypted);
    }

    #[test]
    fn test_transport_error_surfaces() {
        let mut transport = MockTransport::empty();
        transport.push_error(TransportError::TagLost);
        let mut protocol = CardProtocol::new(transport, ProtocolConfig::new());
        assert!(matches!(
            protocol.read(),
            Err(Error::Apdu(tapsign_apdu_core::Error::Transport(
                TransportError::TagLost
            )))
        ));
    }

    #[test]
    fn test_sign_hashes_rejects_empty() {
        let mut protocol = protocol(Vec::new());
        let hashes: [[u8; 32]; 0] = [];
        assert!(matches!(protocol.sign_hashes(&hashes), Err(Error::NoHashes)));
    }
}
