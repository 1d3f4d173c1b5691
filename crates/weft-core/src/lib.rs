#![forbid(unsafe_code)]

//! Core: event model, input parsing, event coalescing, and capability
//! detection for the weft terminal I/O engine.

pub mod capabilities;
pub mod caps_probe;
pub mod channel;
pub mod error;
pub mod event;
pub mod event_coalescer;
pub mod geometry;
pub mod input_parser;

pub use capabilities::{BackendKind, Capabilities, ColorDepth, MouseProtocol};
pub use error::WeftError;
pub use event::{Event, KeyCode, KeyEvent, Modifiers, MouseButton, MouseEvent, MouseKind, SignalKind};
