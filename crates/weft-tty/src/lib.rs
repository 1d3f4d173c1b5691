#![forbid(unsafe_code)]

//! Terminal lifecycle and platform backends.
//!
//! This crate owns everything that touches the real terminal device:
//! raw-mode entry and guaranteed restoration, the display backends that
//! realize the output contract, the input backends that feed bytes to
//! the parser, and the factory that picks a backend pair for the
//! environment it finds itself in.

pub mod cleanup;
pub mod display;
pub mod input;
pub mod platform;
pub mod recovery;

pub use cleanup::CleanupStack;
pub use display::{AnyDisplay, DisplayBackend, FlushOutcome};
pub use input::{AnyInput, InputBackend};
pub use platform::{PlatformOptions, Terminal};
pub use recovery::{classify, ErrorClass, RetryPolicy};
