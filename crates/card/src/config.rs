//! Configuration options for the command protocol

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{delay::SecurityDelayPolicy, session::EncryptionMode};

/// PIN a card ships with
pub const DEFAULT_PIN: &str = "000000";

/// PIN2 a card ships with
pub const DEFAULT_PIN2: &str = "000";

/// Default time to wait for a single answer
pub const DEFAULT_TIMEOUT_MS: u64 = 60_000;

/// Configuration options for [`crate::CardProtocol`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProtocolConfig {
    /// PIN used until the caller supplies another one
    pub default_pin: String,
    /// PIN2 used until the caller supplies another one
    pub default_pin2: String,
    /// Time to wait for a single answer, in milliseconds
    pub timeout_ms: u64,
    /// Encryption mode the first command is sent with
    pub encryption: EncryptionMode,
    /// Security delay handling
    pub security_delay: SecurityDelayPolicy,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            default_pin: DEFAULT_PIN.to_string(),
            default_pin2: DEFAULT_PIN2.to_string(),
            timeout_ms: DEFAULT_TIMEOUT_MS,
            encryption: EncryptionMode::None,
            security_delay: SecurityDelayPolicy::new(),
        }
    }
}

impl ProtocolConfig {
    /// Create a new default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the default PIN
    pub fn with_default_pin(mut self, pin: impl Into<String>) -> Self {
        self.default_pin = pin.into();
        self
    }

    /// Set the default PIN2
    pub fn with_default_pin2(mut self, pin2: impl Into<String>) -> Self {
        self.default_pin2 = pin2.into();
        self
    }

    /// Set the answer timeout
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Set the initial encryption mode
    pub const fn with_encryption(mut self, encryption: EncryptionMode) -> Self {
        self.encryption = encryption;
        self
    }

    /// Set the security delay policy
    pub const fn with_security_delay(mut self, policy: SecurityDelayPolicy) -> Self {
        self.security_delay = policy;
        self
    }

    /// Answer timeout
    pub const fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}
