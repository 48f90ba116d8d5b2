mod common;

use common::{CARD_ID, EmulatedCard};
use k256::ecdsa::{VerifyingKey, signature::hazmat::PrehashVerifier};
use tapsign_card::{
    CardNotifier, CardProtocol, CardStatus, EncryptionMode, Error, ProtocolConfig,
    SecurityDelayPolicy, SessionPhase, commands::SignCommand, crypto,
};

#[derive(Debug, Default)]
struct Recorder {
    starts: usize,
    finishes: usize,
    cancels: usize,
    delays: Vec<u32>,
    progress: Vec<u8>,
    requests: usize,
}

impl CardNotifier for Recorder {
    fn on_read_start(&mut self) {
        self.starts += 1;
    }

    fn on_read_progress(&mut self, percent: u8) {
        self.progress.push(percent);
    }

    fn on_read_finish(&mut self, _error: Option<&Error>) {
        self.finishes += 1;
    }

    fn on_read_cancel(&mut self) {
        self.cancels += 1;
    }

    fn on_security_delay(&mut self, remaining_ms: u32) {
        self.delays.push(remaining_ms);
    }

    fn on_before_request(&mut self, _timeout: std::time::Duration) {
        self.requests += 1;
    }
}

fn protocol(card: EmulatedCard) -> CardProtocol<EmulatedCard, Recorder> {
    CardProtocol::with_notifier(card, Recorder::default(), ProtocolConfig::new())
}

#[test]
fn read_in_the_clear() {
    let mut protocol = protocol(EmulatedCard::loaded());
    let record = protocol.read().unwrap();

    assert_eq!(record.card_id.as_ref(), &CARD_ID);
    assert_eq!(record.status, CardStatus::Loaded);
    assert_eq!(record.firmware.as_deref(), Some("4.12r"));
    assert_eq!(record.curve.as_deref(), Some("secp256k1"));
    assert_eq!(record.remaining_signatures, Some(100));
    assert!(record.wallet_public_key.is_some());

    let frames = &protocol.transport().frames;
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0][2], 0x00);
    assert_eq!(protocol.session().phase(), SessionPhase::Unencrypted);
    assert_eq!(protocol.notifier_mut().starts, 1);
    assert_eq!(protocol.notifier_mut().finishes, 1);
}

#[test]
fn escalates_to_fast_encryption() {
    let mut protocol = protocol(EmulatedCard::loaded().with_required_mode(1));
    protocol.read().unwrap();

    assert_eq!(protocol.session().mode(), EncryptionMode::Fast);
    assert_eq!(protocol.session().phase(), SessionPhase::Established);

    let frames = &protocol.transport().frames;
    // plain Read, OpenSession, encrypted Read
    assert_eq!(frames.len(), 3);
    assert_eq!(frames[1][1], 0xFF);
    assert_eq!(frames[1][2], 0x01);
    assert_eq!(frames[2][1], 0xF2);
    assert_eq!(frames[2][2], 0x01);
    assert_eq!(protocol.transport().sessions, vec![1]);

    // The established session is reused
    protocol.verify_card().unwrap();
    assert_eq!(protocol.transport().sessions, vec![1]);
}

#[test]
fn escalates_to_strong_encryption() {
    let mut protocol = protocol(EmulatedCard::loaded().with_required_mode(2));
    let record = protocol.read().unwrap();
    assert_eq!(record.status, CardStatus::Loaded);

    assert_eq!(protocol.session().mode(), EncryptionMode::Strong);
    assert_eq!(protocol.transport().sessions, vec![1, 2]);
    assert_eq!(protocol.transport().frames.last().unwrap()[2], 0x02);

    let response = protocol.check_wallet().unwrap();
    assert!(response.verified);
}

#[test]
fn starts_in_configured_mode() {
    let card = EmulatedCard::loaded().with_required_mode(2);
    let config = ProtocolConfig::new().with_encryption(EncryptionMode::Strong);
    let mut protocol = CardProtocol::new(card, config);

    protocol.read().unwrap();
    assert_eq!(protocol.transport().sessions, vec![2]);
    assert_eq!(protocol.transport().frames.len(), 2);
}

#[test]
fn polls_through_security_delay() {
    let mut protocol = protocol(EmulatedCard::loaded().with_pause_polls(3));
    protocol.read().unwrap();

    let hash = crypto::sha256(b"delayed");
    let response = protocol.run(&SignCommand::hashes([hash]).unwrap()).unwrap();
    assert_eq!(response.signatures().count(), 1);

    assert_eq!(protocol.notifier_mut().delays, vec![3000, 2000, 1000]);

    // Read, then the same Sign frame four times
    let frames = &protocol.transport().frames;
    assert_eq!(frames.len(), 5);
    assert!(frames[1..].iter().all(|frame| frame == &frames[1]));
}

#[test]
fn polls_through_security_delay_under_encryption() {
    let mut protocol = protocol(
        EmulatedCard::loaded()
            .with_required_mode(1)
            .with_pause_polls(2),
    );
    protocol.read().unwrap();
    protocol
        .run(&SignCommand::hashes([[0x01u8; 32]]).unwrap())
        .unwrap();

    assert_eq!(protocol.notifier_mut().delays.len(), 2);
    assert_eq!(protocol.transport().sessions, vec![1]);
}

#[test]
fn aborts_on_delay_when_asked() {
    let config = ProtocolConfig::new()
        .with_security_delay(SecurityDelayPolicy::new().with_abort_on_delay(true));
    let mut protocol = CardProtocol::new(EmulatedCard::loaded().with_pause_polls(5), config);
    protocol.read().unwrap();

    let result = protocol.run(&SignCommand::hashes([[0x01u8; 32]]).unwrap());
    assert!(matches!(result, Err(Error::SecurityDelay {
        remaining_ms: 5000
    })));
}

#[test]
fn cancels_pending_delay() {
    let mut protocol = protocol(
        EmulatedCard::loaded()
            .with_required_mode(1)
            .with_pause_polls(5),
    );
    protocol.read().unwrap();

    protocol.cancel_token().cancel();
    let result = protocol.run(&SignCommand::hashes([[0x01u8; 32]]).unwrap());
    assert!(matches!(result, Err(Error::Cancelled)));

    assert_eq!(protocol.notifier_mut().cancels, 1);
    assert!(!protocol.cancel_token().is_cancelled());
    assert_eq!(protocol.session().phase(), SessionPhase::Unencrypted);
}

#[test]
fn signs_ten_hashes_in_one_request() {
    let mut protocol = protocol(EmulatedCard::loaded());
    let record = protocol.read().unwrap();
    let wallet_key =
        VerifyingKey::from_sec1_bytes(record.wallet_public_key.as_ref().unwrap()).unwrap();
    let sent_before = protocol.transport().frames.len();

    let hashes: Vec<[u8; 32]> = (0u8..10).map(|i| crypto::sha256(&[i])).collect();
    let signatures = protocol.sign_hashes(&hashes).unwrap();

    assert_eq!(protocol.transport().frames.len(), sent_before + 1);
    assert_eq!(signatures.len(), 10);
    for (hash, signature) in hashes.iter().zip(&signatures) {
        assert!(crypto::is_canonical(signature));
        wallet_key.verify_prehash(hash, signature).unwrap();
    }
    assert_eq!(protocol.notifier_mut().progress, vec![100]);

    let card = protocol.card().unwrap();
    assert_eq!(card.signed_hashes, Some(10));
    assert_eq!(card.remaining_signatures, Some(90));
    assert_eq!(card.pin2_default, Some(true));
}

#[test]
fn rejects_more_than_ten_hashes_before_sending() {
    let mut protocol = protocol(EmulatedCard::loaded());
    protocol.read().unwrap();
    let sent_before = protocol.transport().frames.len();

    let hashes = [[0x01u8; 32]; 11];
    assert!(matches!(
        protocol.sign_hashes(&hashes),
        Err(Error::TooManyInputs { count: 11, max: 10 })
    ));
    assert_eq!(protocol.transport().frames.len(), sent_before);
    assert!(protocol.notifier_mut().progress.is_empty());
    assert_eq!(protocol.card().unwrap().signed_hashes, Some(0));
}

#[test]
fn maps_rejected_pins() {
    let mut protocol = protocol(EmulatedCard::new());
    protocol.set_pin("111111");
    assert!(matches!(protocol.read(), Err(Error::InvalidPin)));

    protocol.set_pin("000000");
    protocol.read().unwrap();
    protocol.set_pin2("999");
    assert!(matches!(protocol.create_wallet(), Err(Error::InvalidPin2)));
    assert_eq!(protocol.card().unwrap().status, CardStatus::Empty);
}

#[test]
fn wallet_lifecycle() {
    let mut protocol = protocol(EmulatedCard::new());
    let record = protocol.read().unwrap();
    assert_eq!(record.status, CardStatus::Empty);
    assert!(matches!(protocol.check_wallet(), Err(Error::WalletNotCreated)));

    let created = protocol.create_wallet().unwrap();
    assert_eq!(created.status, CardStatus::Loaded);
    assert_eq!(
        protocol.card().unwrap().wallet_public_key.as_ref(),
        Some(&created.wallet_public_key)
    );

    assert!(protocol.check_wallet().unwrap().verified);
    assert_eq!(protocol.card().unwrap().wallet_verified, Some(true));

    let purged = protocol.purge_wallet().unwrap();
    assert_eq!(purged.status, CardStatus::Purged);
    assert!(protocol.card().unwrap().wallet_public_key.is_none());
}

#[test]
fn verifies_card_key() {
    let mut protocol = protocol(EmulatedCard::loaded());
    assert!(matches!(protocol.verify_card(), Err(Error::CardNotRead)));

    protocol.read().unwrap();
    let response = protocol.verify_card().unwrap();
    assert!(response.verified);
    assert_eq!(protocol.card().unwrap().card_verified, Some(true));
}

#[test]
fn changing_pin_renegotiates_session() {
    let mut protocol = protocol(EmulatedCard::loaded().with_required_mode(1));
    protocol.read().unwrap();

    let response = protocol.change_pins("123456", "321").unwrap();
    assert!(response.pin_changed());
    assert!(response.pin2_changed());
    assert_eq!(protocol.card().unwrap().pin2_default, Some(false));
    assert_eq!(protocol.session().phase(), SessionPhase::Unencrypted);

    protocol.read().unwrap();
    assert_eq!(protocol.transport().sessions, vec![1, 1]);
    assert_eq!(protocol.transport().pin, crypto::pin_hash("123456"));
}
