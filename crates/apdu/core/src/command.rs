//! APDU command definitions
//!
//! Every request to the card is `CLA INS P1 P2`, followed by an extended Lc
//! (`00 hi lo`) and the body when the body is not empty. The body is a TLV list,
//! encrypted when a session key is present.

use std::fmt;

use bytes::{BufMut, Bytes, BytesMut};
use tracing::trace;

use crate::{Error, Result, SessionKey, TlvList};

/// Class byte used for every command
pub const CLA: u8 = 0x00;

/// Instructions understood by the card
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Instruction {
    /// Write issuer data
    WriteIssuerData = 0xF0,
    /// Read the card record
    Read = 0xF2,
    /// Validate the card and bump its validation counter
    ValidateCard = 0xF3,
    /// Hash a range of firmware code pages
    VerifyCode = 0xF4,
    /// Prove possession of the card key
    VerifyCard = 0xF6,
    /// Read issuer data
    ReadIssuerData = 0xF7,
    /// Generate the wallet key
    CreateWallet = 0xF8,
    /// Prove possession of the wallet key
    CheckWallet = 0xF9,
    /// Change PIN and/or PIN2
    SetPin = 0xFA,
    /// Sign hashes or a raw payload
    Sign = 0xFB,
    /// Destroy the wallet key
    PurgeWallet = 0xFC,
    /// Negotiate a session key
    OpenSession = 0xFF,
}

impl Instruction {
    /// Instruction byte
    pub const fn code(self) -> u8 {
        self as u8
    }

    /// Map an instruction byte back to an instruction
    pub const fn from_code(code: u8) -> Option<Self> {
        Some(match code {
            0xF0 => Self::WriteIssuerData,
            0xF2 => Self::Read,
            0xF3 => Self::ValidateCard,
            0xF4 => Self::VerifyCode,
            0xF6 => Self::VerifyCard,
            0xF7 => Self::ReadIssuerData,
            0xF8 => Self::CreateWallet,
            0xF9 => Self::CheckWallet,
            0xFA => Self::SetPin,
            0xFB => Self::Sign,
            0xFC => Self::PurgeWallet,
            0xFF => Self::OpenSession,
            _ => return None,
        })
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?} ({:02X})", self.code())
    }
}

/// A command ready to be framed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApduCommand {
    instruction: Instruction,
    p1: u8,
    p2: u8,
    tlv: TlvList,
}

impl ApduCommand {
    /// Create a command with both parameters set to zero
    pub const fn new(instruction: Instruction, tlv: TlvList) -> Self {
        Self {
            instruction,
            p1: 0,
            p2: 0,
            tlv,
        }
    }

    /// Set P1, which carries the encryption mode of the session
    pub const fn with_p1(mut self, p1: u8) -> Self {
        self.p1 = p1;
        self
    }

    /// Set P2
    pub const fn with_p2(mut self, p2: u8) -> Self {
        self.p2 = p2;
        self
    }

    /// Instruction of the command
    pub const fn instruction(&self) -> Instruction {
        self.instruction
    }

    /// First parameter
    pub const fn p1(&self) -> u8 {
        self.p1
    }

    /// Second parameter
    pub const fn p2(&self) -> u8 {
        self.p2
    }

    /// Request records
    pub const fn tlv(&self) -> &TlvList {
        &self.tlv
    }

    /// Serialize the command, encrypting the body under the session key if given
    pub fn build(&self, session_key: Option<&SessionKey>) -> Result<Bytes> {
        let plain = self.tlv.encode()?;
        let body = match session_key {
            Some(key) if !plain.is_empty() => key.encrypt(&plain)?,
            _ => plain,
        };

        let mut buf = BytesMut::with_capacity(4 + 3 + body.len());
        buf.put_u8(CLA);
        buf.put_u8(self.instruction.code());
        buf.put_u8(self.p1);
        buf.put_u8(self.p2);
        if !body.is_empty() {
            let len =
                u16::try_from(body.len()).map_err(|_| Error::InvalidCommandLength(body.len()))?;
            buf.put_u8(0x00);
            buf.put_u16(len);
            buf.put_slice(&body);
        }

        trace!(
            instruction = %self.instruction,
            p1 = self.p1,
            encrypted = session_key.is_some(),
            "Built command frame"
        );
        Ok(buf.freeze())
    }
}
