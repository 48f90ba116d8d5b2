//! Security delay polling
//!
//! While a card enforces a security delay it answers NeedPause with the
//! remaining time. The host re-sends the same frame until the card answers with
//! anything else. This module holds the policy for that loop; the framing lives
//! in the protocol.

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use serde::{Deserialize, Serialize};
use tapsign_apdu_core::{Response, Status, Tag};
use tracing::{debug, warn};

use crate::{Error, Result};

/// Unit of the Pause tag in milliseconds
pub const PAUSE_UNIT_MS: u32 = 10;

/// How to react to NeedPause
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityDelayPolicy {
    /// Fail with [`Error::SecurityDelay`] instead of waiting
    pub abort_on_delay: bool,
    /// Give up after this many polls
    pub max_polls: Option<u32>,
}

impl SecurityDelayPolicy {
    /// Wait for as long as the card asks
    pub const fn new() -> Self {
        Self {
            abort_on_delay: false,
            max_polls: None,
        }
    }

    /// Set whether to abort as soon as a delay is reported
    pub const fn with_abort_on_delay(mut self, abort_on_delay: bool) -> Self {
        self.abort_on_delay = abort_on_delay;
        self
    }

    /// Limit the number of polls
    pub const fn with_max_polls(mut self, max_polls: Option<u32>) -> Self {
        self.max_polls = max_polls;
        self
    }
}

/// Shared flag used to cancel a pending wait
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// New token, not cancelled
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation was requested
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Clear a handled cancellation
    pub fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// What to do after a response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DelayStep {
    /// The card is done waiting, handle the response
    Done,
    /// Notify the remaining delay and re-send the same frame
    Poll {
        /// Remaining delay in milliseconds
        remaining_ms: u32,
    },
}

/// Polling state for one command
#[derive(Debug)]
pub struct SecurityDelay<'a> {
    policy: SecurityDelayPolicy,
    cancel: &'a CancelToken,
    polls: u32,
}

impl<'a> SecurityDelay<'a> {
    /// Start polling under `policy`
    pub const fn new(policy: SecurityDelayPolicy, cancel: &'a CancelToken) -> Self {
        Self {
            policy,
            cancel,
            polls: 0,
        }
    }

    /// Number of polls so far
    pub const fn polls(&self) -> u32 {
        self.polls
    }

    /// Decide what to do with `response`
    pub fn step(&mut self, response: &Response) -> Result<DelayStep> {
        if response.status() != Status::NeedPause {
            if self.polls > 0 {
                debug!(polls = self.polls, "Security delay finished");
            }
            return Ok(DelayStep::Done);
        }

        let remaining_ms = remaining_ms(response);
        if self.policy.abort_on_delay {
            return Err(Error::SecurityDelay { remaining_ms });
        }
        if self.cancel.is_cancelled() {
            warn!(remaining_ms, "Security delay cancelled");
            return Err(Error::Cancelled);
        }
        if self.policy.max_polls.is_some_and(|max| self.polls >= max) {
            return Err(Error::SecurityDelayExceeded { polls: self.polls });
        }

        self.polls += 1;
        Ok(DelayStep::Poll { remaining_ms })
    }
}

/// Remaining delay reported in a NeedPause response
pub fn remaining_ms(response: &Response) -> u32 {
    response
        .tlv()
        .and_then(|tlv| tlv.uint(Tag::Pause).ok().flatten())
        .map_or(0, |units| units.saturating_mul(PAUSE_UNIT_MS))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pause(units: u16) -> Response {
        let mut frame = vec![Tag::Pause.code(), 0x02];
        frame.extend_from_slice(&units.to_be_bytes());
        frame.extend_from_slice(&[0x97, 0x89]);
        Response::parse(&frame, None).unwrap()
    }

    fn done() -> Response {
        Response::parse(&[0x90, 0x00], None).unwrap()
    }

    #[test]
    fn test_polls_until_done() {
        let cancel = CancelToken::new();
        let mut delay = SecurityDelay::new(SecurityDelayPolicy::new(), &cancel);

        assert_eq!(
            delay.step(&pause(300)).unwrap(),
            DelayStep::Poll { remaining_ms: 3000 }
        );
        assert_eq!(
            delay.step(&pause(200)).unwrap(),
            DelayStep::Poll { remaining_ms: 2000 }
        );
        assert_eq!(delay.step(&done()).unwrap(), DelayStep::Done);
        assert_eq!(delay.polls(), 2);
    }

    #[test]
    fn test_abort_on_delay() {
        let cancel = CancelToken::new();
        let policy = SecurityDelayPolicy::new().with_abort_on_delay(true);
        let mut delay = SecurityDelay::new(policy, &cancel);
        assert!(matches!(
            delay.step(&pause(50)),
            Err(Error::SecurityDelay { remaining_ms: 500 })
        ));
        // Responses without a pause pass through
        assert_eq!(delay.step(&done()).unwrap(), DelayStep::Done);
    }

    #[test]
    fn test_max_polls() {
        let cancel = CancelToken::new();
        let policy = SecurityDelayPolicy::new().with_max_polls(Some(2));
        let mut delay = SecurityDelay::new(policy, &cancel);
        assert!(delay.step(&pause(3)).is_ok());
        assert!(delay.step(&pause(2)).is_ok());
        assert!(matches!(
            delay.step(&pause(1)),
            Err(Error::SecurityDelayExceeded { polls: 2 })
        ));
    }

    #[test]
    fn test_cancel() {
        let cancel = CancelToken::new();
        let mut delay = SecurityDelay::new(SecurityDelayPolicy::new(), &cancel);
        assert!(delay.step(&pause(3)).is_ok());

        cancel.clone().cancel();
        assert!(matches!(delay.step(&pause(2)), Err(Error::Cancelled)));
        cancel.reset();
        assert!(!cancel.is_cancelled());
    }

    #[test]
    fn test_missing_pause_tag() {
        let response = Response::parse(&[0x97, 0x89], None).unwrap();
        assert_eq!(remaining_ms(&response), 0);
    }
}
