#![forbid(unsafe_code)]

//! Error taxonomy for the I/O core.
//!
//! Buffer mutations never fail (they clip and clamp); only `flush` and
//! `poll` are I/O-fallible, and they surface one of these kinds. Transient
//! failures are retried by the recovery layer; fatal failures trigger
//! backend escalation.

use std::io;

/// A failure surfaced by the terminal I/O core.
#[derive(Debug, thiserror::Error)]
pub enum WeftError {
    /// stdin or stdout is not a terminal; backends that require raw mode
    /// refuse to initialize.
    #[error("not a terminal")]
    NotATerminal,

    /// A requested capability is unsupported by the active terminal. The
    /// core downgrades and records a warning; this surfaces only when a
    /// caller demands the capability explicitly.
    #[error("terminal capability missing: {what}")]
    CapabilityMissing {
        /// Human-readable name of the missing capability.
        what: &'static str,
    },

    /// Short write, `EINTR`, or `EAGAIN`. Retried with backoff.
    #[error("transient I/O error: {0}")]
    TransientIo(#[source] io::Error),

    /// Unrecoverable read or write failure. The backend shuts down and the
    /// caller escalates to the next fallback.
    #[error("fatal I/O error: {0}")]
    FatalIo(#[source] io::Error),

    /// Malformed or over-long escape sequence. The parser discards the
    /// sequence and returns to ground; this kind exists for diagnostics.
    #[error("escape sequence overflow")]
    ParseOverflow,

    /// Requested dimensions were zero or beyond implementation bounds;
    /// the value was clamped.
    #[error("resize out of range: {cols}x{rows}")]
    ResizeOutOfRange {
        /// Requested columns.
        cols: u16,
        /// Requested rows.
        rows: u16,
    },
}

impl WeftError {
    /// Whether retrying the failed operation may succeed.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::TransientIo(_))
    }

    /// Wrap an `io::Error`, splitting transient kinds from fatal ones.
    #[must_use]
    pub fn from_io(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::Interrupted | io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut => {
                Self::TransientIo(err)
            }
            _ => Self::FatalIo(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn eintr_is_transient() {
        let e = WeftError::from_io(io::Error::from(io::ErrorKind::Interrupted));
        assert!(e.is_transient());
    }

    #[test]
    fn broken_pipe_is_fatal() {
        let e = WeftError::from_io(io::Error::from(io::ErrorKind::BrokenPipe));
        assert!(!e.is_transient());
        assert!(matches!(e, WeftError::FatalIo(_)));
    }
}
