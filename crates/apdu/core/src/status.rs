//! Status word definitions for card responses

use std::fmt;

use tracing::Level;

/// Status Word (SW1-SW2) from a card response
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StatusWord {
    /// First status byte (SW1)
    pub sw1: u8,
    /// Second status byte (SW2)
    pub sw2: u8,
}

impl StatusWord {
    /// Create a new status word
    pub const fn new(sw1: u8, sw2: u8) -> Self {
        Self { sw1, sw2 }
    }

    /// Create from a u16 value (SW1 | SW2)
    pub const fn from_u16(status: u16) -> Self {
        Self {
            sw1: (status >> 8) as u8,
            sw2: status as u8,
        }
    }

    /// Convert to a u16 value (SW1 | SW2)
    pub const fn to_u16(&self) -> u16 {
        ((self.sw1 as u16) << 8) | (self.sw2 as u16)
    }

    /// Classify the status word
    pub const fn status(&self) -> Status {
        Status::from_u16(self.to_u16())
    }

    /// Check if this status word reports a completed command (90 0X)
    pub const fn is_success(&self) -> bool {
        self.status().is_success()
    }

    /// Get the appropriate tracing level for this status word
    pub const fn tracing_level(&self) -> Level {
        match self.status() {
            Status::NeedPause | Status::NeedEncryption => Level::DEBUG,
            status if status.is_success() => Level::DEBUG,
            _ => Level::WARN,
        }
    }

    /// Get a description of this status word
    pub const fn description(&self) -> &'static str {
        self.status().description()
    }
}

impl From<(u8, u8)> for StatusWord {
    fn from(tuple: (u8, u8)) -> Self {
        Self::new(tuple.0, tuple.1)
    }
}

impl From<u16> for StatusWord {
    fn from(status: u16) -> Self {
        Self::from_u16(status)
    }
}

impl From<StatusWord> for u16 {
    fn from(status: StatusWord) -> Self {
        status.to_u16()
    }
}

impl fmt::Display for StatusWord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02X} {:02X}", self.sw1, self.sw2)
    }
}

/// Status words the card firmware answers with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    /// Command completed (90 00)
    ProcessCompleted,
    /// Command completed and PIN1 was changed (90 01)
    Pin1Changed,
    /// Command completed and PIN2 was changed (90 02)
    Pin2Changed,
    /// Command completed and both PINs were changed (90 03)
    Pins12Changed,
    /// Parameters rejected, which is how a wrong PIN or PIN2 is reported (6A 86)
    InvalidParams,
    /// Command could not be processed (62 86)
    ErrorProcessingCommand,
    /// Card is in the wrong state for this command (69 85)
    InvalidState,
    /// Instruction not supported (6D 00)
    InsNotSupported,
    /// A stronger encryption mode is required (69 82)
    NeedEncryption,
    /// Security delay in progress, poll again (97 89)
    NeedPause,
    /// Any other status word
    Unknown(u16),
}

impl Status {
    /// Classify a raw status word
    pub const fn from_u16(sw: u16) -> Self {
        match sw {
            0x9000 => Self::ProcessCompleted,
            0x9001 => Self::Pin1Changed,
            0x9002 => Self::Pin2Changed,
            0x9003 => Self::Pins12Changed,
            0x6A86 => Self::InvalidParams,
            0x6286 => Self::ErrorProcessingCommand,
            0x6985 => Self::InvalidState,
            0x6D00 => Self::InsNotSupported,
            0x6982 => Self::NeedEncryption,
            0x9789 => Self::NeedPause,
            other => Self::Unknown(other),
        }
    }

    /// Raw status word
    pub const fn code(self) -> u16 {
        match self {
            Self::ProcessCompleted => 0x9000,
            Self::Pin1Changed => 0x9001,
            Self::Pin2Changed => 0x9002,
            Self::Pins12Changed => 0x9003,
            Self::InvalidParams => 0x6A86,
            Self::ErrorProcessingCommand => 0x6286,
            Self::InvalidState => 0x6985,
            Self::InsNotSupported => 0x6D00,
            Self::NeedEncryption => 0x6982,
            Self::NeedPause => 0x9789,
            Self::Unknown(sw) => sw,
        }
    }

    /// Whether the card completed the command
    pub const fn is_success(self) -> bool {
        matches!(
            self,
            Self::ProcessCompleted | Self::Pin1Changed | Self::Pin2Changed | Self::Pins12Changed
        )
    }

    /// Human readable description
    pub const fn description(self) -> &'static str {
        match self {
            Self::ProcessCompleted => "Process completed",
            Self::Pin1Changed => "Process completed, PIN1 changed",
            Self::Pin2Changed => "Process completed, PIN2 changed",
            Self::Pins12Changed => "Process completed, PIN1 and PIN2 changed",
            Self::InvalidParams => "Invalid parameters or PIN",
            Self::ErrorProcessingCommand => "Error processing command",
            Self::InvalidState => "Invalid card state",
            Self::InsNotSupported => "Instruction not supported",
            Self::NeedEncryption => "Encryption required",
            Self::NeedPause => "Security delay in progress",
            Self::Unknown(_) => "Unknown status word",
        }
    }
}

impl From<StatusWord> for Status {
    fn from(sw: StatusWord) -> Self {
        sw.status()
    }
}

impl From<Status> for StatusWord {
    fn from(status: Status) -> Self {
        Self::from_u16(status.code())
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({:04X})", self.description(), self.code())
    }
}
