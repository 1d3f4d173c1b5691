#![forbid(unsafe_code)]

//! Canonical input event types.
//!
//! Mouse coordinates are 0-indexed (the wire protocols are 1-indexed; the
//! parser converts). All events derive `Clone` and `PartialEq` for use in
//! tests and pattern matching.

use bitflags::bitflags;

/// A normalized input event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// A keyboard event.
    Key(KeyEvent),

    /// A mouse event.
    Mouse(MouseEvent),

    /// Terminal was resized.
    Resize {
        /// New width in columns.
        cols: u16,
        /// New height in rows.
        rows: u16,
    },

    /// Text delivered atomically via bracketed paste.
    Paste(String),

    /// A process signal surfaced as an event.
    Signal(SignalKind),
}

/// A keyboard event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyEvent {
    /// The key that was pressed.
    pub code: KeyCode,

    /// Modifier keys held during the event.
    pub modifiers: Modifiers,

    /// The grapheme produced by a printable key, when there is one.
    pub text: Option<String>,
}

impl KeyEvent {
    /// Create a key event with no modifiers and no text.
    #[must_use]
    pub const fn new(code: KeyCode) -> Self {
        Self {
            code,
            modifiers: Modifiers::NONE,
            text: None,
        }
    }

    /// Attach modifiers.
    #[must_use]
    pub fn with_modifiers(mut self, modifiers: Modifiers) -> Self {
        self.modifiers = modifiers;
        self
    }

    /// Attach the produced text.
    #[must_use]
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    /// Create a printable-key event carrying its grapheme.
    #[must_use]
    pub fn printable(c: char) -> Self {
        Self::new(KeyCode::Char(c)).with_text(c.to_string())
    }
}

/// Key identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyCode {
    /// A printable character key.
    Char(char),
    /// Function key F1..F24.
    F(u8),
    /// Up arrow.
    Up,
    /// Down arrow.
    Down,
    /// Left arrow.
    Left,
    /// Right arrow.
    Right,
    /// Home.
    Home,
    /// End.
    End,
    /// Page Up.
    PageUp,
    /// Page Down.
    PageDown,
    /// Insert.
    Insert,
    /// Delete.
    Delete,
    /// Backspace.
    Backspace,
    /// Tab.
    Tab,
    /// Shift+Tab.
    BackTab,
    /// Enter / Return.
    Enter,
    /// Escape.
    Escape,
    /// NUL (Ctrl+Space / Ctrl+@).
    Null,
}

bitflags! {
    /// Modifier keys held during an event.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Modifiers: u8 {
        /// No modifiers.
        const NONE  = 0b0000;
        /// Shift.
        const SHIFT = 0b0001;
        /// Alt / Option.
        const ALT   = 0b0010;
        /// Control.
        const CTRL  = 0b0100;
        /// Super / Command / Windows key.
        const META  = 0b1000;
    }
}

impl Default for Modifiers {
    fn default() -> Self {
        Self::NONE
    }
}

/// A mouse event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MouseEvent {
    /// Column, 0-indexed.
    pub x: u16,
    /// Row, 0-indexed.
    pub y: u16,
    /// The button involved, if any.
    pub button: MouseButton,
    /// What happened.
    pub kind: MouseKind,
    /// Modifier keys held during the event.
    pub modifiers: Modifiers,
}

impl MouseEvent {
    /// Create a mouse event with no modifiers.
    #[must_use]
    pub const fn new(kind: MouseKind, button: MouseButton, x: u16, y: u16) -> Self {
        Self {
            x,
            y,
            button,
            kind,
            modifiers: Modifiers::NONE,
        }
    }

    /// Attach modifiers.
    #[must_use]
    pub const fn with_modifiers(mut self, modifiers: Modifiers) -> Self {
        self.modifiers = modifiers;
        self
    }
}

/// Mouse button identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MouseButton {
    /// Left button.
    Left,
    /// Middle button.
    Middle,
    /// Right button.
    Right,
    /// Wheel rotated away from the user.
    WheelUp,
    /// Wheel rotated toward the user.
    WheelDown,
    /// No button (motion without a press, or an X10 release which does
    /// not identify the button).
    None,
}

/// What a mouse event reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MouseKind {
    /// Button pressed (wheel steps also arrive as presses).
    Press,
    /// Button released.
    Release,
    /// Motion with no button held.
    Move,
    /// Motion with a button held.
    Drag,
}

/// Signals the backend surfaces as events rather than handling itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SignalKind {
    /// SIGTSTP: the user asked to suspend.
    Suspend,
    /// SIGCONT: resumed after a suspend.
    Continue,
    /// SIGINT: interrupt request.
    Interrupt,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn printable_carries_text() {
        let ev = KeyEvent::printable('é');
        assert_eq!(ev.code, KeyCode::Char('é'));
        assert_eq!(ev.text.as_deref(), Some("é"));
        assert_eq!(ev.modifiers, Modifiers::NONE);
    }

    #[test]
    fn modifiers_combine() {
        let m = Modifiers::CTRL | Modifiers::SHIFT;
        assert!(m.contains(Modifiers::CTRL));
        assert!(m.contains(Modifiers::SHIFT));
        assert!(!m.contains(Modifiers::ALT));
    }

    #[test]
    fn mouse_event_builder() {
        let ev = MouseEvent::new(MouseKind::Press, MouseButton::Left, 3, 7)
            .with_modifiers(Modifiers::CTRL);
        assert_eq!((ev.x, ev.y), (3, 7));
        assert_eq!(ev.kind, MouseKind::Press);
        assert!(ev.modifiers.contains(Modifiers::CTRL));
    }
}
