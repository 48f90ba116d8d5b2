//! Error types for the card command protocol

use tapsign_apdu_core::{FrameIntegrityError, Instruction, StatusWord, TlvError, TransportError};

use crate::card::CardStatus;

/// Result type for card operations
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Error type for card operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Framing, TLV or transport errors from the APDU layer
    #[error(transparent)]
    Apdu(#[from] tapsign_apdu_core::Error),

    /// The card rejected PIN1
    #[error("Invalid PIN")]
    InvalidPin,

    /// The card rejected PIN2
    #[error("Invalid PIN2")]
    InvalidPin2,

    /// The card answered with a status word the command does not handle
    #[error("{instruction} failed with status {status}: {}", status.description())]
    Status {
        /// Instruction that failed
        instruction: Instruction,
        /// Status word returned by the card
        status: StatusWord,
    },

    /// Encryption was requested beyond the strongest mode
    #[error("Card requires encryption beyond strong mode")]
    EncryptionUnavailable,

    /// Session negotiation failed
    #[error("Session negotiation failed: {0}")]
    SessionNegotiation(&'static str),

    /// The transport cannot provide the identifier needed to derive the protocol key
    #[error("Transport did not report a card identifier")]
    MissingIdentifier,

    /// The pending wait was cancelled
    #[error("Operation cancelled")]
    Cancelled,

    /// Security delay reported and the policy says to abort
    #[error("Security delay of {remaining_ms} ms required")]
    SecurityDelay {
        /// Remaining delay reported by the card
        remaining_ms: u32,
    },

    /// The card kept asking for a pause beyond the configured number of polls
    #[error("Security delay still running after {polls} polls")]
    SecurityDelayExceeded {
        /// Number of polls made
        polls: u32,
    },

    /// A command needs the card record but Read has not run yet
    #[error("Card has not been read")]
    CardNotRead,

    /// The card is in the wrong state for the command
    #[error("Card status is {actual:?}, expected {expected:?}")]
    InvalidCardState {
        /// Status required by the command
        expected: CardStatus,
        /// Status reported by the card
        actual: CardStatus,
    },

    /// The card has no wallet key
    #[error("Card has no wallet")]
    WalletNotCreated,

    /// The card response is missing data or carries malformed data
    #[error("Invalid response: {0}")]
    InvalidResponse(&'static str),

    /// More than the allowed number of hashes in one request
    #[error("Too many hashes to sign: {count}, at most {max}")]
    TooManyInputs {
        /// Number of hashes requested
        count: usize,
        /// Allowed maximum
        max: usize,
    },

    /// Hashes in one request differ in length
    #[error("Hash lengths differ: expected {expected}, found {found}")]
    HashLengthMismatch {
        /// Length of the first hash
        expected: usize,
        /// Length of the offending hash
        found: usize,
    },

    /// Nothing to sign
    #[error("No hashes to sign")]
    NoHashes,

    /// Raw payload exceeds what the card accepts
    #[error("Payload of {len} bytes exceeds {max} bytes")]
    PayloadTooLarge {
        /// Payload length
        len: usize,
        /// Allowed maximum
        max: usize,
    },

    /// The signing method requires an issuer co-signature
    #[error("Signing method requires an issuer signature")]
    IssuerValidationRequired,

    /// The signing method requires an issuer data update
    #[error("Signing method requires issuer data")]
    IssuerDataRequired,

    /// The card does not allow the requested kind of signing
    #[error("Signing method not supported by the card")]
    UnsupportedSigningMethod,

    /// Issuer data exceeds the card's storage
    #[error("Issuer data of {len} bytes exceeds {max} bytes")]
    IssuerDataTooLarge {
        /// Data length
        len: usize,
        /// Allowed maximum
        max: usize,
    },

    /// A locally verified signature did not match
    #[error("Signature verification failed: {0}")]
    VerificationFailed(&'static str),

    /// Malformed key or signature
    #[error(transparent)]
    Ecdsa(#[from] k256::ecdsa::Error),
}

impl Error {
    /// Whether the session key must be abandoned after this error
    pub const fn invalidates_session(&self) -> bool {
        matches!(
            self,
            Self::Apdu(
                tapsign_apdu_core::Error::Transport(_) | tapsign_apdu_core::Error::FrameIntegrity(_)
            ) | Self::Cancelled
                | Self::SessionNegotiation(_)
        )
    }

    /// Status word carried by this error, if any
    pub const fn status_word(&self) -> Option<StatusWord> {
        match self {
            Self::Status { status, .. } => Some(*status),
            Self::Apdu(err) => err.status_word(),
            _ => None,
        }
    }
}

impl From<TlvError> for Error {
    fn from(error: TlvError) -> Self {
        Self::Apdu(error.into())
    }
}

impl From<TransportError> for Error {
    fn from(error: TransportError) -> Self {
        match error {
            TransportError::Cancelled => Self::Cancelled,
            other => Self::Apdu(other.into()),
        }
    }
}

impl From<FrameIntegrityError> for Error {
    fn from(error: FrameIntegrityError) -> Self {
        Self::Apdu(error.into())
    }
}
