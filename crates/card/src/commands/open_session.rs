use bytes::Bytes;
use tapsign_apdu_core::{Instruction, Status, Tag, TlvList};

use super::{CardCommand, CommandContext};
use crate::Result;

/// Send the host half of a session key exchange
///
/// Always sent in the clear. The encryption mode being negotiated travels in P1,
/// which the protocol sets when it frames this command.
#[derive(Debug, Clone)]
pub struct OpenSessionCommand {
    session_key_a: Vec<u8>,
}

impl OpenSessionCommand {
    /// Command carrying the host contribution `A`
    pub const fn new(session_key_a: Vec<u8>) -> Self {
        Self { session_key_a }
    }
}

impl CardCommand for OpenSessionCommand {
    type Output = Bytes;

    const INSTRUCTION: Instruction = Instruction::OpenSession;

    fn serialize(&self, _ctx: &CommandContext<'_>) -> Result<TlvList> {
        Ok(TlvList::new().with(Tag::SessionKeyA, &self.session_key_a))
    }

    fn deserialize(
        &self,
        _ctx: &CommandContext<'_>,
        _status: Status,
        tlv: TlvList,
    ) -> Result<Self::Output> {
        Ok(tlv.required(Tag::SessionKeyB)?.clone())
    }
}
