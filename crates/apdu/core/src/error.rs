//! Core error type for all APDU operations
//!
//! Encoding, framing, integrity and transport failures all bubble up through
//! [`Error`] so callers only have to match on one type.

use crate::status::StatusWord;
use crate::tlv::TlvError;
use crate::transport::TransportError;

/// Failures detected while unwrapping a response frame
#[derive(Debug, Clone, Copy, Eq, PartialEq, thiserror::Error)]
pub enum FrameIntegrityError {
    /// Response shorter than the two status bytes
    #[error("Response truncated: {len} bytes")]
    Truncated {
        /// Number of bytes received
        len: usize,
    },

    /// Encrypted body is not a whole number of cipher blocks
    #[error("Encrypted body of {len} bytes is not block aligned")]
    NotBlockAligned {
        /// Length of the encrypted body
        len: usize,
    },

    /// Declared plaintext length exceeds the decrypted data
    #[error("Declared length {declared} exceeds available {available} bytes")]
    LengthMismatch {
        /// Length from the envelope header
        declared: usize,
        /// Bytes available after the header
        available: usize,
    },

    /// CRC16 of the plaintext does not match the envelope header
    #[error("CRC mismatch: expected {expected:#06x}, computed {computed:#06x}")]
    CrcMismatch {
        /// CRC carried in the envelope
        expected: u16,
        /// CRC computed over the plaintext
        computed: u16,
    },
}

/// Core error type that encompasses all possible errors in the crate
#[derive(Debug, Clone, Eq, PartialEq, thiserror::Error)]
pub enum Error {
    /// TLV encoding or decoding failed
    #[error(transparent)]
    Tlv(#[from] TlvError),

    /// Response frame failed an integrity check
    #[error("Frame integrity error: {0}")]
    FrameIntegrity(#[from] FrameIntegrityError),

    /// Transport failure
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Card answered with a status word the caller did not expect
    #[error("Unexpected status word {status}: {}", status.description())]
    UnexpectedStatus {
        /// Status word returned by the card
        status: StatusWord,
    },

    /// Command body is larger than an extended Lc can describe
    #[error("Invalid command length: {0}")]
    InvalidCommandLength(usize),
}

impl Error {
    /// Create an unexpected status error
    pub const fn status(status: StatusWord) -> Self {
        Self::UnexpectedStatus { status }
    }

    /// Status word carried by this error, if any
    pub const fn status_word(&self) -> Option<StatusWord> {
        match self {
            Self::UnexpectedStatus { status } => Some(*status),
            _ => None,
        }
    }
}

/// Result type for APDU operations
pub type Result<T, E = Error> = std::result::Result<T, E>;
