//! Transport traits for communication with cards
//!
//! The transport is the byte-in/byte-out contactless link. It has no knowledge
//! of TLV, encryption or retry semantics.

use std::fmt;
use std::time::Duration;

use bytes::Bytes;
use tracing::{debug, trace};

/// Transport error type
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// No card in the field or the connection could not be opened
    #[error("Failed to connect to card")]
    Connection,

    /// Transmission failed
    #[error("Failed to transmit data")]
    Transmission,

    /// The card left the field mid-exchange
    #[error("Tag was lost")]
    TagLost,

    /// No answer within the timeout
    #[error("Operation timed out")]
    Timeout,

    /// The exchange was cancelled by the user
    #[error("Operation cancelled")]
    Cancelled,

    /// Other error with message
    #[error("{0}")]
    Other(String),
}

impl TransportError {
    /// Create a general other error
    pub fn other<S: Into<String>>(message: S) -> Self {
        Self::Other(message.into())
    }
}

/// Trait for card transports
///
/// A transport sends a frame and returns the answer. Implementations override
/// [`CardTransport::do_transceive`]; [`CardTransport::transceive`] wraps it
/// with frame logging.
pub trait CardTransport: Send + fmt::Debug {
    /// Send a frame and wait at most `timeout` for the answer
    fn transceive(&mut self, command: &[u8], timeout: Duration) -> Result<Bytes, TransportError> {
        trace!(command = %hex::encode(command), ?timeout, "Transmitting frame");
        let result = self.do_transceive(command, timeout);
        match &result {
            Ok(response) => {
                trace!(response = %hex::encode(response), "Received frame");
            }
            Err(e) => {
                debug!(error = ?e, "Transport error during transmission");
            }
        }
        result
    }

    /// Internal implementation of transceive
    fn do_transceive(&mut self, command: &[u8], timeout: Duration)
    -> Result<Bytes, TransportError>;

    /// Hardware identifier of the card in the field (the chip UID)
    fn identifier(&self) -> Option<Bytes>;

    /// Open the link to a card in the field
    fn connect(&mut self) -> Result<(), TransportError>;

    /// Close the link
    fn disconnect(&mut self) -> Result<(), TransportError>;

    /// Check if a card is connected
    fn is_connected(&self) -> bool;
}

impl<T: CardTransport + ?Sized> CardTransport for Box<T> {
    fn transceive(&mut self, command: &[u8], timeout: Duration) -> Result<Bytes, TransportError> {
        (**self).transceive(command, timeout)
    }

    fn do_transceive(
        &mut self,
        command: &[u8],
        timeout: Duration,
    ) -> Result<Bytes, TransportError> {
        (**self).do_transceive(command, timeout)
    }

    fn identifier(&self) -> Option<Bytes> {
        (**self).identifier()
    }

    fn connect(&mut self) -> Result<(), TransportError> {
        (**self).connect()
    }

    fn disconnect(&mut self) -> Result<(), TransportError> {
        (**self).disconnect()
    }

    fn is_connected(&self) -> bool {
        (**self).is_connected()
    }
}

#[cfg(any(test, feature = "mock"))]
pub use mock::MockTransport;

#[cfg(any(test, feature = "mock"))]
mod mock {
    use std::collections::VecDeque;

    use super::*;

    /// Scripted transport replaying queued answers and recording every frame
    #[derive(Debug, Clone)]
    pub struct MockTransport {
        /// Queued answers, consumed in order
        pub responses: VecDeque<Result<Bytes, TransportError>>,
        /// Frames that were sent
        pub commands: Vec<Bytes>,
        /// Whether a card is connected
        pub connected: bool,
        /// Identifier reported for the card
        pub uid: Option<Bytes>,
    }

    impl MockTransport {
        /// Create a mock transport with the given answers
        pub fn new(responses: impl IntoIterator<Item = Bytes>) -> Self {
            Self {
                responses: responses.into_iter().map(Ok).collect(),
                commands: Vec::new(),
                connected: true,
                uid: None,
            }
        }

        /// Create a mock transport with nothing queued
        pub fn empty() -> Self {
            Self::new(Vec::<Bytes>::new())
        }

        /// Set the identifier reported for the card
        pub fn with_uid(mut self, uid: impl Into<Bytes>) -> Self {
            self.uid = Some(uid.into());
            self
        }

        /// Queue an answer
        pub fn push_response(&mut self, response: impl Into<Bytes>) {
            self.responses.push_back(Ok(response.into()));
        }

        /// Queue a transport failure
        pub fn push_error(&mut self, error: TransportError) {
            self.responses.push_back(Err(error));
        }
    }

    impl CardTransport for MockTransport {
        fn do_transceive(
            &mut self,
            command: &[u8],
            _timeout: Duration,
        ) -> Result<Bytes, TransportError> {
            if !self.connected {
                return Err(TransportError::Connection);
            }

            self.commands.push(Bytes::copy_from_slice(command));
            self.responses
                .pop_front()
                .unwrap_or(Err(TransportError::Transmission))
        }

        fn identifier(&self) -> Option<Bytes> {
            self.uid.clone()
        }

        fn connect(&mut self) -> Result<(), TransportError> {
            self.connected = true;
            Ok(())
        }

        fn disconnect(&mut self) -> Result<(), TransportError> {
            self.connected = false;
            Ok(())
        }

        fn is_connected(&self) -> bool {
            self.connected
        }
    }
}
