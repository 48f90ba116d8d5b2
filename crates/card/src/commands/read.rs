use tapsign_apdu_core::{Instruction, Status, Tag, TlvList};

use super::{CardCommand, CommandContext};
use crate::{CardRecord, Result};

/// Read the card record
///
/// Only PIN1 is sent. The card id is not, since any card may be in the field.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReadCommand;

impl CardCommand for ReadCommand {
    type Output = CardRecord;

    const INSTRUCTION: Instruction = Instruction::Read;

    fn serialize(&self, ctx: &CommandContext<'_>) -> Result<TlvList> {
        Ok(TlvList::new().with(Tag::Pin, ctx.pin))
    }

    fn deserialize(
        &self,
        _ctx: &CommandContext<'_>,
        _status: Status,
        tlv: TlvList,
    ) -> Result<Self::Output> {
        Ok(CardRecord::from_tlv(&tlv)?)
    }

    fn update_card(&self, output: &Self::Output, card: &mut Option<CardRecord>) {
        *card = Some(output.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{card::CardStatus, commands::test_utils::pins};

    #[test]
    fn test_read_request_carries_only_pin() {
        let (pin, pin2) = pins();
        let previous = crate::commands::test_utils::card(CardStatus::Loaded);
        let ctx = CommandContext {
            pin: &pin,
            pin2: &pin2,
            card: Some(&previous),
        };
        let tlv = ReadCommand.serialize(&ctx).unwrap();
        assert_eq!(tlv.len(), 1);
        assert_eq!(tlv.value(Tag::Pin).unwrap().as_ref(), &pin);
    }

    #[test]
    fn test_read_replaces_cached_record() {
        let (pin, pin2) = pins();
        let ctx = CommandContext {
            pin: &pin,
            pin2: &pin2,
            card: None,
        };
        let response = TlvList::new()
            .with(Tag::CardId, [0x01; 8])
            .with(Tag::Status, [0x01u8]);
        let record = ReadCommand
            .deserialize(&ctx, Status::ProcessCompleted, response)
            .unwrap();

        let mut cached = Some(crate::commands::test_utils::card(CardStatus::Loaded));
        ReadCommand.update_card(&record, &mut cached);
        assert_eq!(cached.unwrap().status, CardStatus::Empty);
    }
}
