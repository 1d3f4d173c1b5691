#![forbid(unsafe_code)]

//! Failure classification, retry, and backend escalation.
//!
//! I/O failures fall into three classes:
//!
//! - **Transient** (`EINTR`, `EAGAIN`, short writes): retried in place
//!   with exponential backoff.
//! - **Capability mismatch**: the terminal rejected something we
//!   believed it supported; the remedy is renegotiation (drop the color
//!   depth), not a retry.
//! - **Fatal**: the backend is done; escalate along
//!   `Ansi → TermiosRaw → CursesFallback`, then give up.

use std::time::Duration;

use weft_core::capabilities::BackendKind;
use weft_core::error::WeftError;

/// How a failure should be handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Retry the same operation after a backoff.
    Transient,
    /// Renegotiate capabilities downward, then retry.
    CapabilityMismatch,
    /// Escalate to the next fallback backend.
    Fatal,
}

/// Classify a surfaced error.
#[must_use]
pub fn classify(err: &WeftError) -> ErrorClass {
    match err {
        WeftError::TransientIo(_) => ErrorClass::Transient,
        WeftError::CapabilityMissing { .. } => ErrorClass::CapabilityMismatch,
        WeftError::NotATerminal | WeftError::FatalIo(_) => ErrorClass::Fatal,
        // Parser and resize problems are handled at their source and
        // never abort a backend; treat a stray one as retryable.
        WeftError::ParseOverflow | WeftError::ResizeOutOfRange { .. } => ErrorClass::Transient,
    }
}

/// Exponential-backoff retry policy.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Attempts before giving up (including the first).
    pub max_attempts: u32,
    /// Delay before the second attempt.
    pub base_delay: Duration,
    /// Ceiling on any single delay.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    /// Delay after the given zero-based failed attempt: `base × 2^n`,
    /// capped.
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 1u32 << attempt.min(16);
        (self.base_delay * factor).min(self.max_delay)
    }

    /// Run `op`, retrying transient failures with backoff. Anything
    /// else surfaces immediately.
    pub fn run<T, F>(&self, mut op: F) -> Result<T, WeftError>
    where
        F: FnMut() -> Result<T, WeftError>,
    {
        let mut attempt = 0;
        loop {
            match op() {
                Ok(value) => return Ok(value),
                Err(err) if err.is_transient() && attempt + 1 < self.max_attempts => {
                    let delay = self.delay_for(attempt);
                    tracing::debug!(attempt, ?delay, %err, "transient failure, retrying");
                    std::thread::sleep(delay);
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

/// The next backend to try after `kind` failed fatally.
#[must_use]
pub fn escalate(kind: BackendKind) -> Option<BackendKind> {
    kind.fallback()
}
