use bytes::Bytes;
use tapsign_apdu_core::{Instruction, Status, Tag, TlvList};

use super::{CardCommand, CommandContext, PinHash, check_card_id};
use crate::{CardRecord, Result, crypto::pin_hash};

/// Replace PIN1 and PIN2
///
/// Both new values are always sent. Passing the current hash for one of them
/// leaves it unchanged.
#[derive(Debug, Clone)]
pub struct SetPinCommand {
    new_pin: PinHash,
    new_pin2: PinHash,
}

/// Result of [`SetPinCommand`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetPinResponse {
    /// Card identifier
    pub card_id: Bytes,
    /// Status the card answered with
    pub status: Status,
}

impl SetPinResponse {
    /// Whether the card reports PIN1 as changed
    pub fn pin_changed(&self) -> bool {
        matches!(self.status, Status::Pin1Changed | Status::Pins12Changed)
    }

    /// Whether the card reports PIN2 as changed
    pub fn pin2_changed(&self) -> bool {
        matches!(self.status, Status::Pin2Changed | Status::Pins12Changed)
    }
}

impl SetPinCommand {
    /// Command from plain PIN values
    pub fn new(new_pin: &str, new_pin2: &str) -> Self {
        Self::from_hashes(pin_hash(new_pin), pin_hash(new_pin2))
    }

    /// Command from already hashed PIN values
    pub const fn from_hashes(new_pin: PinHash, new_pin2: PinHash) -> Self {
        Self { new_pin, new_pin2 }
    }

    /// Hash of the new PIN1
    pub const fn new_pin(&self) -> &PinHash {
        &self.new_pin
    }

    /// Hash of the new PIN2
    pub const fn new_pin2(&self) -> &PinHash {
        &self.new_pin2
    }
}

impl CardCommand for SetPinCommand {
    type Output = SetPinResponse;

    const INSTRUCTION: Instruction = Instruction::SetPin;
    const REQUIRES_PIN2: bool = true;

    fn serialize(&self, ctx: &CommandContext<'_>) -> Result<TlvList> {
        Ok(ctx
            .pin2_tlv()
            .with(Tag::NewPin, self.new_pin)
            .with(Tag::NewPin2, self.new_pin2))
    }

    fn deserialize(
        &self,
        ctx: &CommandContext<'_>,
        status: Status,
        tlv: TlvList,
    ) -> Result<Self::Output> {
        Ok(SetPinResponse {
            card_id: check_card_id(ctx, &tlv)?,
            status,
        })
    }

    fn update_card(&self, output: &Self::Output, card: &mut Option<CardRecord>) {
        if let Some(card) = card {
            if output.pin2_changed() {
                card.pin2_default = Some(false);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        card::CardStatus,
        commands::test_utils::{card, pins},
    };

    #[test]
    fn test_set_pin_request() {
        let (pin, pin2) = pins();
        let record = card(CardStatus::Loaded);
        let ctx = CommandContext {
            pin: &pin,
            pin2: &pin2,
            card: Some(&record),
        };
        let command = SetPinCommand::new("123456", "321");
        let tlv = command.serialize(&ctx).unwrap();
        assert_eq!(tlv.value(Tag::NewPin).unwrap().as_ref(), &pin_hash("123456"));
        assert_eq!(tlv.value(Tag::NewPin2).unwrap().as_ref(), &pin_hash("321"));
        assert_eq!(tlv.value(Tag::Pin2).unwrap().as_ref(), &pin2);
    }

    #[test]
    fn test_set_pin_status_reporting() {
        let (pin, pin2) = pins();
        let record = card(CardStatus::Loaded);
        let ctx = CommandContext {
            pin: &pin,
            pin2: &pin2,
            card: Some(&record),
        };
        let response = || TlvList::new().with(Tag::CardId, &record.card_id);
        let command = SetPinCommand::new("123456", "000");

        let output = command
            .deserialize(&ctx, Status::Pin1Changed, response())
            .unwrap();
        assert!(output.pin_changed());
        assert!(!output.pin2_changed());

        let output = command
            .deserialize(&ctx, Status::Pins12Changed, response())
            .unwrap();
        assert!(output.pin_changed() && output.pin2_changed());

        let mut cached = Some(record.clone());
        command.update_card(&output, &mut cached);
        assert_eq!(cached.unwrap().pin2_default, Some(false));
    }
}
