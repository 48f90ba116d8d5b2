//! Response parsing
//!
//! A response is the body followed by the two status bytes. With a session key
//! the body is decrypted first, except for security-delay responses which the
//! card always sends in the clear.

use bytes::Bytes;
use tracing::trace;

use crate::{
    FrameIntegrityError, Result, SessionKey, Status, StatusWord,
    tlv::{TlvError, TlvList},
};

/// Decoded body of a response
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseBody {
    /// No body
    Empty,
    /// Body parsed as a TLV list
    Tlv(TlvList),
    /// Body that could not be parsed as TLV, kept together with the reason
    Raw {
        /// Plaintext body
        data: Bytes,
        /// Why the TLV decode failed
        error: TlvError,
    },
}

/// A parsed card response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    status_word: StatusWord,
    body: ResponseBody,
}

impl Response {
    /// Create a response from parts
    pub const fn new(status_word: StatusWord, body: ResponseBody) -> Self {
        Self { status_word, body }
    }

    /// Parse raw response bytes, decrypting the body under `session_key` if given
    pub fn parse(bytes: &[u8], session_key: Option<&SessionKey>) -> Result<Self> {
        if bytes.len() < 2 {
            return Err(FrameIntegrityError::Truncated { len: bytes.len() }.into());
        }

        let (body, sw) = bytes.split_at(bytes.len() - 2);
        let status_word = StatusWord::new(sw[0], sw[1]);

        let plain = match session_key {
            _ if body.is_empty() => Bytes::new(),
            Some(key) if status_word.status() != Status::NeedPause => key.decrypt(body)?,
            _ => Bytes::copy_from_slice(body),
        };

        let body = if plain.is_empty() {
            ResponseBody::Empty
        } else {
            match TlvList::decode(&plain) {
                Ok(tlv) => ResponseBody::Tlv(tlv),
                Err(error) => {
                    trace!(%error, "Response body is not TLV");
                    ResponseBody::Raw { data: plain, error }
                }
            }
        };

        Ok(Self { status_word, body })
    }

    /// Raw status word
    pub const fn status_word(&self) -> StatusWord {
        self.status_word
    }

    /// Classified status word
    pub const fn status(&self) -> Status {
        self.status_word.status()
    }

    /// Whether the card completed the command
    pub const fn is_success(&self) -> bool {
        self.status_word.is_success()
    }

    /// Decoded body
    pub const fn body(&self) -> &ResponseBody {
        &self.body
    }

    /// TLV records of the body, if it parsed as TLV
    pub const fn tlv(&self) -> Option<&TlvList> {
        match &self.body {
            ResponseBody::Tlv(tlv) => Some(tlv),
            _ => None,
        }
    }

    /// Take the TLV records, treating an empty body as an empty list
    pub fn into_tlv(self) -> Result<TlvList> {
        match self.body {
            ResponseBody::Empty => Ok(TlvList::new()),
            ResponseBody::Tlv(tlv) => Ok(tlv),
            ResponseBody::Raw { error, .. } => Err(error.into()),
        }
    }
}
