//! Notification boundary towards the presentation layer

use std::time::Duration;

use tracing::{debug, info, warn};

use crate::Error;

/// Callbacks invoked by the command protocol while it talks to the card
///
/// Every method has an empty default so implementors only override what they
/// display.
pub trait CardNotifier: Send {
    /// A command is about to start
    fn on_read_start(&mut self) {}

    /// Progress of a multi-exchange operation, in percent
    fn on_read_progress(&mut self, _percent: u8) {}

    /// The command finished, with the error if it failed
    fn on_read_finish(&mut self, _error: Option<&Error>) {}

    /// The command was cancelled
    fn on_read_cancel(&mut self) {}

    /// The card is enforcing a security delay
    fn on_security_delay(&mut self, _remaining_ms: u32) {}

    /// A frame is about to be sent
    fn on_before_request(&mut self, _timeout: Duration) {}

    /// The answer to a frame arrived, or the exchange failed
    fn on_after_request(&mut self) {}
}

impl<N: CardNotifier + ?Sized> CardNotifier for &mut N {
    fn on_read_start(&mut self) {
        (**self).on_read_start()
    }

    fn on_read_progress(&mut self, percent: u8) {
        (**self).on_read_progress(percent)
    }

    fn on_read_finish(&mut self, error: Option<&Error>) {
        (**self).on_read_finish(error)
    }

    fn on_read_cancel(&mut self) {
        (**self).on_read_cancel()
    }

    fn on_security_delay(&mut self, remaining_ms: u32) {
        (**self).on_security_delay(remaining_ms)
    }

    fn on_before_request(&mut self, timeout: Duration) {
        (**self).on_before_request(timeout)
    }

    fn on_after_request(&mut self) {
        (**self).on_after_request()
    }
}

/// Notifier that ignores everything
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopNotifier;

impl CardNotifier for NoopNotifier {}

/// Notifier that forwards every notification to `tracing`
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingNotifier;

impl CardNotifier for TracingNotifier {
    fn on_read_start(&mut self) {
        debug!("Card operation started");
    }

    fn on_read_progress(&mut self, percent: u8) {
        debug!(percent, "Card operation progress");
    }

    fn on_read_finish(&mut self, error: Option<&Error>) {
        match error {
            Some(error) => warn!(%error, "Card operation failed"),
            None => debug!("Card operation finished"),
        }
    }

    fn on_read_cancel(&mut self) {
        warn!("Card operation cancelled");
    }

    fn on_security_delay(&mut self, remaining_ms: u32) {
        info!(remaining_ms, "Security delay");
    }

    fn on_before_request(&mut self, timeout: Duration) {
        debug!(?timeout, "Sending request");
    }

    fn on_after_request(&mut self) {
        debug!("Request complete");
    }
}
