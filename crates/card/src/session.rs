//! Session establishment
//!
//! The card announces the encryption it wants by answering NeedEncryption. The
//! host then escalates None → Fast → Strong, negotiates a session key with
//! OpenSession and retries the command.
//!
//! Both modes start from the protocol key, PBKDF2 of the PIN hash salted with
//! the device identifier:
//!
//! - Fast: `SHA256(A ‖ B ‖ protocol_key)` with A and B random challenges.
//! - Strong: `SHA256(ECDH-x(a, B) ‖ protocol_key)` with A and B ephemeral
//!   secp256k1 keys.

use k256::{PublicKey, SecretKey, elliptic_curve::sec1::ToEncodedPoint};
use rand_v8::thread_rng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tapsign_apdu_core::SessionKey;
use tracing::debug;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::{
    Error, Result,
    crypto::{self, CHALLENGE_SIZE},
};

/// Encryption applied to command and response bodies
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    derive_more::Display,
)]
#[serde(rename_all = "lowercase")]
pub enum EncryptionMode {
    /// Bodies travel in the clear
    #[default]
    None,
    /// Session key from exchanged challenges
    Fast,
    /// Session key from an ECDH exchange
    Strong,
}

impl EncryptionMode {
    /// Code carried in P1
    pub const fn code(self) -> u8 {
        match self {
            Self::None => 0,
            Self::Fast => 1,
            Self::Strong => 2,
        }
    }

    /// The next stronger mode
    pub const fn escalate(self) -> Option<Self> {
        match self {
            Self::None => Some(Self::Fast),
            Self::Fast => Some(Self::Strong),
            Self::Strong => None,
        }
    }
}

/// Where the session is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// No session key, bodies in the clear
    Unencrypted,
    /// OpenSession for fast mode in flight
    NegotiatingFast,
    /// OpenSession for strong mode in flight
    NegotiatingStrong,
    /// Session key in place
    Established,
}

/// Stretched PIN shared with the card
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct ProtocolKey([u8; 32]);

impl ProtocolKey {
    /// Derive from a PIN hash and the device identifier
    pub fn derive(pin_hash: &[u8], identifier: &[u8]) -> Self {
        Self(crypto::derive_protocol_key(pin_hash, identifier))
    }

    /// Raw key material
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl std::fmt::Debug for ProtocolKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ProtocolKey(..)")
    }
}

/// Host secret of an OpenSession exchange in flight
#[derive(Debug)]
pub enum Negotiation {
    /// Fast mode with the host challenge
    Fast([u8; CHALLENGE_SIZE]),
    /// Strong mode with the host ephemeral key
    Strong(SecretKey),
}

impl Negotiation {
    /// Start a negotiation for `mode`
    pub fn new(mode: EncryptionMode) -> Result<Self> {
        match mode {
            EncryptionMode::None => Err(Error::SessionNegotiation("no encryption requested")),
            EncryptionMode::Fast => Ok(Self::Fast(crypto::random_challenge())),
            EncryptionMode::Strong => Ok(Self::Strong(SecretKey::random(&mut thread_rng()))),
        }
    }

    /// Mode being negotiated
    pub const fn mode(&self) -> EncryptionMode {
        match self {
            Self::Fast(_) => EncryptionMode::Fast,
            Self::Strong(_) => EncryptionMode::Strong,
        }
    }

    /// Value sent in [`tapsign_apdu_core::Tag::SessionKeyA`]
    pub fn session_key_a(&self) -> Vec<u8> {
        match self {
            Self::Fast(challenge) => challenge.to_vec(),
            Self::Strong(secret) => secret
                .public_key()
                .to_encoded_point(false)
                .as_bytes()
                .to_vec(),
        }
    }

    /// Combine the card's answer with the protocol key into the session key
    pub fn finish(self, session_key_b: &[u8], protocol_key: &ProtocolKey) -> Result<SessionKey> {
        if session_key_b.is_empty() {
            return Err(Error::SessionNegotiation("empty card session data"));
        }

        let mut hasher = Sha256::new();
        match &self {
            Self::Fast(challenge) => {
                hasher.update(challenge);
                hasher.update(session_key_b);
            }
            Self::Strong(secret) => {
                let card_key = PublicKey::from_sec1_bytes(session_key_b)
                    .map_err(|_| Error::SessionNegotiation("invalid card session key"))?;
                let mut shared = crypto::ecdh_secret(secret, &card_key);
                hasher.update(shared);
                shared.zeroize();
            }
        }
        hasher.update(protocol_key.as_bytes());

        Ok(SessionKey::from_bytes(hasher.finalize().into()))
    }
}

/// Session state owned by one command protocol instance
#[derive(Debug)]
pub struct SessionState {
    mode: EncryptionMode,
    phase: SessionPhase,
    protocol_key: Option<CachedProtocolKey>,
    session_key: Option<SessionKey>,
}

#[derive(Debug)]
struct CachedProtocolKey {
    pin_hash: [u8; 32],
    identifier: Vec<u8>,
    key: ProtocolKey,
}

impl SessionState {
    /// New session starting in `mode`
    pub const fn new(mode: EncryptionMode) -> Self {
        Self {
            mode,
            phase: SessionPhase::Unencrypted,
            protocol_key: None,
            session_key: None,
        }
    }

    /// Current encryption mode
    pub const fn mode(&self) -> EncryptionMode {
        self.mode
    }

    /// Lifecycle phase
    pub const fn phase(&self) -> SessionPhase {
        self.phase
    }

    /// Session key, present once established
    pub const fn session_key(&self) -> Option<&SessionKey> {
        self.session_key.as_ref()
    }

    /// Whether a session key must be negotiated before the next command
    pub const fn needs_negotiation(&self) -> bool {
        !matches!(self.mode, EncryptionMode::None) && self.session_key.is_none()
    }

    /// Protocol key for this PIN and identifier, derived once and cached
    ///
    /// A different PIN or identifier replaces the cached key and drops the
    /// session key.
    pub fn protocol_key(&mut self, pin_hash: &[u8; 32], identifier: &[u8]) -> &ProtocolKey {
        let stale = self
            .protocol_key
            .as_ref()
            .is_none_or(|cached| &cached.pin_hash != pin_hash || cached.identifier != identifier);
        if stale && self.protocol_key.take().is_some() {
            debug!("Protocol key changed, dropping session key");
            self.invalidate();
        }

        &self
            .protocol_key
            .get_or_insert_with(|| CachedProtocolKey {
                pin_hash: *pin_hash,
                identifier: identifier.to_vec(),
                key: ProtocolKey::derive(pin_hash, identifier),
            })
            .key
    }

    /// Begin negotiating a session key for the current mode
    pub fn begin(&mut self) -> Result<Negotiation> {
        let negotiation = Negotiation::new(self.mode)?;
        self.phase = match self.mode {
            EncryptionMode::Strong => SessionPhase::NegotiatingStrong,
            _ => SessionPhase::NegotiatingFast,
        };
        debug!(mode = %self.mode, "Negotiating session key");
        Ok(negotiation)
    }

    /// Install the negotiated session key
    pub fn establish(&mut self, key: SessionKey) {
        self.session_key = Some(key);
        self.phase = SessionPhase::Established;
        debug!(mode = %self.mode, "Session established");
    }

    /// Move to the next stronger mode and drop the session key
    ///
    /// Returns the new mode, or `None` when already at the strongest mode.
    pub fn escalate(&mut self) -> Option<EncryptionMode> {
        let next = self.mode.escalate()?;
        debug!(from = %self.mode, to = %next, "Escalating encryption");
        self.mode = next;
        self.invalidate();
        Some(next)
    }

    /// Drop the session key, keeping the mode so the next command renegotiates
    pub fn invalidate(&mut self) {
        if self.session_key.take().is_some() {
            debug!("Session key invalidated");
        }
        self.phase = SessionPhase::Unencrypted;
    }

    /// Forget everything, for a card newly brought into the field
    pub fn reset(&mut self, mode: EncryptionMode) {
        self.invalidate();
        self.protocol_key = None;
        self.mode = mode;
    }
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new(EncryptionMode::None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::{pin_hash, sha256};

    const UID: [u8; 8] = [1, 2, 3, 4, 5, 6, 7, 8];

    #[test]
    fn test_escalation_order() {
        let mut session = SessionState::default();
        assert!(!session.needs_negotiation());
        assert_eq!(session.escalate(), Some(EncryptionMode::Fast));
        assert!(session.needs_negotiation());
        assert_eq!(session.escalate(), Some(EncryptionMode::Strong));
        assert_eq!(session.escalate(), None);
        assert_eq!(session.mode(), EncryptionMode::Strong);
    }

    #[test]
    fn test_protocol_key_is_cached_per_pin_and_identifier() {
        let mut session = SessionState::new(EncryptionMode::Fast);
        let pin = pin_hash("000000");
        let key = session.protocol_key(&pin, &UID).clone();
        assert_eq!(
            hex::encode(key.as_bytes()),
            "1d40db7829ae4aa63e6ccc702a009f43e8903262292ea0c01e0123bc97d6f14d"
        );

        session.establish(SessionKey::from_bytes([7; 32]));
        assert_eq!(session.phase(), SessionPhase::Established);

        // Same inputs keep the session
        let _ = session.protocol_key(&pin, &UID);
        assert!(session.session_key().is_some());

        // A new PIN drops it
        let other = session.protocol_key(&pin_hash("123456"), &UID).clone();
        assert_ne!(other, key);
        assert!(session.session_key().is_none());
        assert_eq!(session.phase(), SessionPhase::Unencrypted);
    }

    #[test]
    fn test_fast_session_key() {
        let protocol_key = ProtocolKey::derive(&pin_hash("000000"), &UID);
        let negotiation = Negotiation::Fast([0xAA; CHALLENGE_SIZE]);
        assert_eq!(negotiation.session_key_a(), vec![0xAA; CHALLENGE_SIZE]);

        let key = negotiation.finish(&[0xBB; 16], &protocol_key).unwrap();

        let mut expected = vec![0xAA; 16];
        expected.extend_from_slice(&[0xBB; 16]);
        expected.extend_from_slice(protocol_key.as_bytes());
        assert_eq!(key.as_bytes(), &sha256(&expected));
    }

    #[test]
    fn test_strong_session_key_agrees_with_card() {
        let protocol_key = ProtocolKey::derive(&pin_hash("000000"), &UID);
        let negotiation = Negotiation::new(EncryptionMode::Strong).unwrap();
        let host_public = negotiation.session_key_a();
        assert_eq!(host_public.len(), 65);

        let card_secret = SecretKey::random(&mut thread_rng());
        let card_public = card_secret.public_key().to_encoded_point(false);
        let host_key = negotiation
            .finish(card_public.as_bytes(), &protocol_key)
            .unwrap();

        // The card's side of the derivation
        let host_public = PublicKey::from_sec1_bytes(&host_public).unwrap();
        let mut material = crypto::ecdh_secret(&card_secret, &host_public).to_vec();
        material.extend_from_slice(protocol_key.as_bytes());
        assert_eq!(host_key.as_bytes(), &sha256(&material));
    }

    #[test]
    fn test_strong_rejects_bad_card_key() {
        let protocol_key = ProtocolKey::derive(&pin_hash("000000"), &UID);
        let negotiation = Negotiation::new(EncryptionMode::Strong).unwrap();
        assert!(matches!(
            negotiation.finish(&[0x04; 65], &protocol_key),
            Err(Error::SessionNegotiation(_))
        ));
        assert!(Negotiation::new(EncryptionMode::None).is_err());
    }
}
