//! Core types for talking to contactless wallet cards
//!
//! This crate provides the wire-level building blocks shared by every higher layer:
//!
//! - A tag-length-value codec ([`tlv`]) with a closed tag enumeration
//! - APDU command framing ([`command`]) and response parsing ([`response`])
//! - Status word classification ([`status`])
//! - The session encryption envelope ([`envelope`]): length prefix, CRC16 and AES-256-CBC
//! - A transport abstraction ([`transport`]) for the byte-in/byte-out contactless link
//!
//! Nothing in here performs I/O on its own; the transport is always supplied by the caller.
#![cfg_attr(not(test), warn(unused_crate_dependencies))]
#![forbid(unsafe_code)]
#![warn(missing_docs, rustdoc::missing_crate_level_docs)]

// Re-export bytes for convenience
pub use bytes::{Bytes, BytesMut};

pub mod command;
pub mod envelope;
pub mod response;
pub mod status;
pub mod tlv;
pub mod transport;

mod error;
pub use error::{Error, FrameIntegrityError, Result};

pub use command::{ApduCommand, Instruction};
pub use envelope::SessionKey;
pub use response::{Response, ResponseBody};
pub use status::{Status, StatusWord};
pub use tlv::{Tag, Tlv, TlvError, TlvList};
pub use transport::{CardTransport, TransportError};

#[cfg(any(test, feature = "mock"))]
pub use transport::MockTransport;

/// Prelude module containing commonly used traits and types
pub mod prelude {
    pub use crate::{
        ApduCommand, Bytes, BytesMut, CardTransport, Error, Instruction, Response, Result,
        SessionKey, Status, StatusWord, Tag, Tlv, TlvList, TransportError,
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reexports() {
        let tlv = TlvList::new().with(Tag::CardId, [0xCB, 0x22, 0x00, 0x00]);
        let cmd = ApduCommand::new(Instruction::Read, tlv);
        assert_eq!(cmd.instruction(), Instruction::Read);
        assert_eq!(cmd.p1(), 0x00);

        let resp = Response::parse(&[0x90, 0x00], None).unwrap();
        assert_eq!(resp.status(), Status::ProcessCompleted);
        assert_eq!(resp.status_word(), StatusWord::new(0x90, 0x00));
    }
}
