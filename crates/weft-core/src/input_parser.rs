#![forbid(unsafe_code)]

//! Escape-sequence parser: terminal bytes in, [`Event`]s out.
//!
//! The parser is a byte-at-a-time state machine following the ECMA-48 /
//! DEC conventions. It handles:
//!
//! - ASCII and control codes
//! - UTF-8 multi-byte sequences
//! - CSI sequences (arrows, editing keys, function keys, modifiers)
//! - SS3 sequences (F1..F4, application-mode arrows)
//! - SGR and X10 mouse reports
//! - Bracketed paste
//! - OSC and DCS strings (consumed and discarded)
//!
//! Partial sequences are retained across feeds; any ill-formed byte
//! returns the machine to ground and the sequence is dropped.
//!
//! # Length limits
//!
//! All collecting states enforce caps so hostile input cannot exhaust
//! memory: CSI 256 bytes, OSC/DCS 4 KB, paste payload 1 MB. Overflowing
//! sequences are discarded.
//!
//! # The lone-escape problem
//!
//! A bare `ESC` byte is indistinguishable from the start of a sequence
//! until either more bytes arrive or time passes. The machine itself is
//! time-free: the input backend calls [`EscapeParser::idle_flush`] once
//! [`ParserConfig::esc_timeout`] elapses with a pending prefix, which
//! resolves `ESC` to a standalone Escape key.

use std::time::Duration;

use crate::event::{Event, KeyCode, KeyEvent, Modifiers, MouseButton, MouseEvent, MouseKind};

/// Maximum CSI sequence length.
const MAX_CSI_LEN: usize = 256;

/// Maximum OSC/DCS string length.
const MAX_STRING_LEN: usize = 4096;

/// Maximum bracketed-paste payload.
const MAX_PASTE_LEN: usize = 1024 * 1024;

/// Parser tuning knobs.
#[derive(Debug, Clone, Copy)]
pub struct ParserConfig {
    /// How long a lone `ESC` may sit before it is delivered as a
    /// standalone Escape key. Some terminals need more than the 50 ms
    /// default; the backend honors whatever is configured here.
    pub esc_timeout: Duration,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            esc_timeout: Duration::from_millis(50),
        }
    }
}

/// State machine states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum State {
    /// Plain input.
    #[default]
    Ground,
    /// After `ESC`.
    Escape,
    /// After `ESC [`, no bytes collected yet.
    CsiEntry,
    /// Collecting CSI parameter bytes.
    CsiParam,
    /// Collecting CSI intermediate bytes (0x20-0x2F after params).
    CsiIntermediate,
    /// Swallowing an oversized or malformed CSI sequence.
    CsiIgnore,
    /// After `ESC O`.
    Ss3,
    /// Collecting an OSC string.
    OscString,
    /// `ESC` seen inside an OSC string (possible ST).
    OscEscape,
    /// Swallowing an oversized OSC string.
    OscIgnore,
    /// Collecting a DCS string (discarded at ST).
    DcsPassthrough,
    /// `ESC` seen inside a DCS string.
    DcsEscape,
    /// Collecting the three payload bytes of an X10 mouse report.
    MouseX10 {
        /// Payload bytes received so far (0..3).
        collected: u8,
    },
    /// Collecting a UTF-8 multi-byte sequence.
    Utf8 {
        /// Bytes collected so far.
        collected: u8,
        /// Total bytes expected.
        expected: u8,
    },
}

/// Terminal input parser.
///
/// ```
/// use weft_core::input_parser::EscapeParser;
/// use weft_core::event::{Event, KeyCode};
///
/// let mut parser = EscapeParser::new();
/// let events = parser.parse(b"\x1b[A");
/// assert!(matches!(&events[0], Event::Key(k) if k.code == KeyCode::Up));
/// ```
#[derive(Debug)]
pub struct EscapeParser {
    config: ParserConfig,
    state: State,
    /// Accumulator for CSI/OSC/DCS bytes.
    buffer: Vec<u8>,
    /// Accumulator for bracketed-paste content.
    paste_buffer: Vec<u8>,
    /// UTF-8 bytes collected so far.
    utf8_buffer: [u8; 4],
    /// X10 mouse payload bytes.
    mouse_buffer: [u8; 3],
    /// True between `CSI 200~` and `CSI 201~`.
    in_paste: bool,
    /// Count of discarded over-long or malformed sequences.
    overflow_count: u64,
}

impl Default for EscapeParser {
    fn default() -> Self {
        Self::new()
    }
}

impl EscapeParser {
    /// Create a parser with default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(ParserConfig::default())
    }

    /// Create a parser with explicit configuration.
    #[must_use]
    pub fn with_config(config: ParserConfig) -> Self {
        Self {
            config,
            state: State::Ground,
            buffer: Vec::with_capacity(64),
            paste_buffer: Vec::new(),
            utf8_buffer: [0; 4],
            mouse_buffer: [0; 3],
            in_paste: false,
            overflow_count: 0,
        }
    }

    /// The configured escape-disambiguation timeout.
    #[must_use]
    pub fn esc_timeout(&self) -> Duration {
        self.config.esc_timeout
    }

    /// Whether a partial sequence is pending across feeds.
    #[must_use]
    pub fn has_partial(&self) -> bool {
        self.state != State::Ground
    }

    /// Number of sequences dropped for being malformed or over-long.
    #[must_use]
    pub fn overflow_count(&self) -> u64 {
        self.overflow_count
    }

    /// Feed bytes and collect completed events.
    pub fn parse(&mut self, input: &[u8]) -> Vec<Event> {
        let mut events = Vec::new();
        for &byte in input {
            if let Some(event) = self.process_byte(byte) {
                events.push(event);
            }
        }
        events
    }

    /// Resolve a pending prefix after the escape timeout expired with no
    /// further bytes.
    ///
    /// A lone `ESC` becomes a standalone Escape key. Any other partial
    /// sequence is discarded; real terminals deliver whole sequences in
    /// one burst, so a stalled partial is line noise.
    pub fn idle_flush(&mut self) -> Option<Event> {
        match self.state {
            State::Ground => None,
            State::Escape => {
                self.state = State::Ground;
                Some(Event::Key(KeyEvent::new(KeyCode::Escape)))
            }
            _ => {
                self.state = State::Ground;
                self.buffer.clear();
                self.overflow_count += 1;
                None
            }
        }
    }

    fn process_byte(&mut self, byte: u8) -> Option<Event> {
        if self.in_paste {
            return self.process_paste_byte(byte);
        }

        match self.state {
            State::Ground => self.process_ground(byte),
            State::Escape => self.process_escape(byte),
            State::CsiEntry | State::CsiParam => self.process_csi(byte),
            State::CsiIntermediate => self.process_csi_intermediate(byte),
            State::CsiIgnore => self.process_csi_ignore(byte),
            State::Ss3 => self.process_ss3(byte),
            State::OscString => self.process_osc(byte),
            State::OscEscape => self.process_osc_escape(byte),
            State::OscIgnore => self.process_osc_ignore(byte),
            State::DcsPassthrough => self.process_dcs(byte),
            State::DcsEscape => self.process_dcs_escape(byte),
            State::MouseX10 { collected } => self.process_mouse_x10(byte, collected),
            State::Utf8 {
                collected,
                expected,
            } => self.process_utf8(byte, collected, expected),
        }
    }

    // ── Ground ───────────────────────────────────────────────────────────

    fn process_ground(&mut self, byte: u8) -> Option<Event> {
        match byte {
            0x1B => {
                self.state = State::Escape;
                None
            }
            0x00 => Some(Event::Key(KeyEvent::new(KeyCode::Null))),
            0x08 => Some(Event::Key(KeyEvent::new(KeyCode::Backspace))),
            0x09 => Some(Event::Key(KeyEvent::new(KeyCode::Tab))),
            0x0D => Some(Event::Key(KeyEvent::new(KeyCode::Enter))),
            // Remaining C0 controls map to Ctrl+letter.
            0x01..=0x07 | 0x0A..=0x0C | 0x0E..=0x1A => {
                let c = (byte + b'a' - 1) as char;
                Some(Event::Key(
                    KeyEvent::new(KeyCode::Char(c)).with_modifiers(Modifiers::CTRL),
                ))
            }
            0x7F => Some(Event::Key(KeyEvent::new(KeyCode::Backspace))),
            0x20..=0x7E => Some(Event::Key(KeyEvent::printable(byte as char))),
            0xC0..=0xDF => self.start_utf8(byte, 2),
            0xE0..=0xEF => self.start_utf8(byte, 3),
            0xF0..=0xF7 => self.start_utf8(byte, 4),
            // Stray continuation bytes and invalid lead bytes.
            _ => None,
        }
    }

    fn start_utf8(&mut self, byte: u8, expected: u8) -> Option<Event> {
        self.utf8_buffer[0] = byte;
        self.state = State::Utf8 {
            collected: 1,
            expected,
        };
        None
    }

    fn process_utf8(&mut self, byte: u8, collected: u8, expected: u8) -> Option<Event> {
        // A non-continuation byte aborts the sequence; reprocess it fresh.
        if byte & 0xC0 != 0x80 {
            self.state = State::Ground;
            return self.process_byte(byte);
        }

        self.utf8_buffer[collected as usize] = byte;
        let collected = collected + 1;

        if collected < expected {
            self.state = State::Utf8 {
                collected,
                expected,
            };
            return None;
        }

        self.state = State::Ground;
        match std::str::from_utf8(&self.utf8_buffer[..expected as usize]) {
            Ok(s) => {
                let c = s.chars().next()?;
                Some(Event::Key(KeyEvent::new(KeyCode::Char(c)).with_text(s)))
            }
            Err(_) => None,
        }
    }

    // ── Escape prefix ────────────────────────────────────────────────────

    fn process_escape(&mut self, byte: u8) -> Option<Event> {
        match byte {
            b'[' => {
                self.state = State::CsiEntry;
                self.buffer.clear();
                None
            }
            b'O' => {
                self.state = State::Ss3;
                None
            }
            b']' => {
                self.state = State::OscString;
                self.buffer.clear();
                None
            }
            b'P' => {
                self.state = State::DcsPassthrough;
                self.buffer.clear();
                None
            }
            0x1B => {
                // ESC ESC: deliver Alt+Escape, stay out of sequence mode.
                self.state = State::Ground;
                Some(Event::Key(
                    KeyEvent::new(KeyCode::Escape).with_modifiers(Modifiers::ALT),
                ))
            }
            0x20..=0x7E => {
                // Alt-prefixed printable.
                self.state = State::Ground;
                Some(Event::Key(
                    KeyEvent::new(KeyCode::Char(byte as char)).with_modifiers(Modifiers::ALT),
                ))
            }
            _ => {
                self.state = State::Ground;
                None
            }
        }
    }

    // ── CSI ──────────────────────────────────────────────────────────────

    fn process_csi(&mut self, byte: u8) -> Option<Event> {
        if byte == 0x1B {
            self.state = State::Escape;
            self.buffer.clear();
            return None;
        }

        if self.buffer.len() >= MAX_CSI_LEN {
            self.state = State::CsiIgnore;
            self.buffer.clear();
            self.overflow_count += 1;
            return None;
        }

        match byte {
            // Parameter bytes.
            0x30..=0x3F => {
                self.buffer.push(byte);
                self.state = State::CsiParam;
                None
            }
            // Intermediate bytes.
            0x20..=0x2F => {
                self.buffer.push(byte);
                self.state = State::CsiIntermediate;
                None
            }
            // Final byte: dispatch.
            0x40..=0x7E => {
                self.state = State::Ground;
                self.dispatch_csi(byte)
            }
            _ => {
                self.state = State::Ground;
                self.buffer.clear();
                None
            }
        }
    }

    fn process_csi_intermediate(&mut self, byte: u8) -> Option<Event> {
        if byte == 0x1B {
            self.state = State::Escape;
            self.buffer.clear();
            return None;
        }
        match byte {
            0x20..=0x2F => {
                if self.buffer.len() >= MAX_CSI_LEN {
                    self.state = State::CsiIgnore;
                    self.buffer.clear();
                    self.overflow_count += 1;
                } else {
                    self.buffer.push(byte);
                }
                None
            }
            0x40..=0x7E => {
                // Sequences with intermediates carry nothing we decode.
                self.state = State::Ground;
                self.buffer.clear();
                None
            }
            _ => {
                self.state = State::Ground;
                self.buffer.clear();
                None
            }
        }
    }

    fn process_csi_ignore(&mut self, byte: u8) -> Option<Event> {
        if byte == 0x1B {
            self.state = State::Escape;
            return None;
        }
        if let 0x40..=0x7E = byte {
            self.state = State::Ground;
        }
        None
    }

    fn dispatch_csi(&mut self, final_byte: u8) -> Option<Event> {
        let params = std::mem::take(&mut self.buffer);

        match (params.as_slice(), final_byte) {
            // Bracketed paste delimiters.
            (b"200", b'~') => {
                self.in_paste = true;
                self.paste_buffer.clear();
                return None;
            }
            (b"201", b'~') => {
                // Stray end marker outside a paste; drop it.
                return None;
            }
            // X10 mouse: three payload bytes follow the final 'M'.
            ([], b'M') => {
                self.state = State::MouseX10 { collected: 0 };
                return None;
            }
            // SGR mouse.
            _ if params.starts_with(b"<") && (final_byte == b'M' || final_byte == b'm') => {
                return parse_sgr_mouse(&params[1..], final_byte);
            }
            _ => {}
        }

        let mods = modifier_param(&params);
        match final_byte {
            b'A' => Some(key(KeyCode::Up, mods)),
            b'B' => Some(key(KeyCode::Down, mods)),
            b'C' => Some(key(KeyCode::Right, mods)),
            b'D' => Some(key(KeyCode::Left, mods)),
            b'H' => Some(key(KeyCode::Home, mods)),
            b'F' => Some(key(KeyCode::End, mods)),
            b'Z' => Some(key(KeyCode::BackTab, mods)),
            b'~' => dispatch_csi_tilde(&params),
            _ => None,
        }
    }

    // ── SS3 ──────────────────────────────────────────────────────────────

    fn process_ss3(&mut self, byte: u8) -> Option<Event> {
        if byte == 0x1B {
            self.state = State::Escape;
            return None;
        }
        self.state = State::Ground;

        let code = match byte {
            b'P' => KeyCode::F(1),
            b'Q' => KeyCode::F(2),
            b'R' => KeyCode::F(3),
            b'S' => KeyCode::F(4),
            b'A' => KeyCode::Up,
            b'B' => KeyCode::Down,
            b'C' => KeyCode::Right,
            b'D' => KeyCode::Left,
            b'H' => KeyCode::Home,
            b'F' => KeyCode::End,
            _ => return None,
        };
        Some(Event::Key(KeyEvent::new(code)))
    }

    // ── OSC / DCS strings (consumed, not decoded) ────────────────────────

    fn process_osc(&mut self, byte: u8) -> Option<Event> {
        match byte {
            0x1B => {
                self.state = State::OscEscape;
                None
            }
            0x07 => {
                self.state = State::Ground;
                self.buffer.clear();
                None
            }
            _ => {
                if self.buffer.len() >= MAX_STRING_LEN {
                    self.state = State::OscIgnore;
                    self.buffer.clear();
                    self.overflow_count += 1;
                } else {
                    self.buffer.push(byte);
                }
                None
            }
        }
    }

    fn process_osc_escape(&mut self, byte: u8) -> Option<Event> {
        self.buffer.clear();
        if byte == b'\\' {
            self.state = State::Ground;
            None
        } else if byte == 0x1B {
            self.state = State::Escape;
            None
        } else {
            self.state = State::Ground;
            None
        }
    }

    fn process_osc_ignore(&mut self, byte: u8) -> Option<Event> {
        match byte {
            0x07 => {
                self.state = State::Ground;
                None
            }
            0x1B => {
                self.state = State::OscEscape;
                None
            }
            _ => None,
        }
    }

    fn process_dcs(&mut self, byte: u8) -> Option<Event> {
        if byte == 0x1B {
            self.state = State::DcsEscape;
            return None;
        }
        if self.buffer.len() >= MAX_STRING_LEN {
            // Stop accumulating; keep swallowing until ST.
            self.buffer.clear();
            self.overflow_count += 1;
        } else {
            self.buffer.push(byte);
        }
        None
    }

    fn process_dcs_escape(&mut self, byte: u8) -> Option<Event> {
        self.buffer.clear();
        if byte == b'\\' {
            self.state = State::Ground;
        } else if byte == 0x1B {
            self.state = State::DcsEscape;
        } else {
            self.state = State::DcsPassthrough;
        }
        None
    }

    // ── Mouse ────────────────────────────────────────────────────────────

    fn process_mouse_x10(&mut self, byte: u8, collected: u8) -> Option<Event> {
        self.mouse_buffer[collected as usize] = byte;
        let collected = collected + 1;
        if collected < 3 {
            self.state = State::MouseX10 { collected };
            return None;
        }
        self.state = State::Ground;
        parse_x10_mouse(self.mouse_buffer)
    }

    // ── Bracketed paste ──────────────────────────────────────────────────

    fn process_paste_byte(&mut self, byte: u8) -> Option<Event> {
        const END_MARKER: &[u8] = b"\x1b[201~";

        self.paste_buffer.push(byte);

        if self.paste_buffer.ends_with(END_MARKER) {
            self.in_paste = false;
            self.paste_buffer
                .truncate(self.paste_buffer.len() - END_MARKER.len());
            let content = String::from_utf8_lossy(&self.paste_buffer).into_owned();
            self.paste_buffer.clear();
            return Some(Event::Paste(content));
        }

        if self.paste_buffer.len() > MAX_PASTE_LEN {
            // Hostile or broken paste; drop everything and resync.
            self.in_paste = false;
            self.paste_buffer.clear();
            self.overflow_count += 1;
        }
        None
    }
}

// ── Shared decode helpers ────────────────────────────────────────────────

fn key(code: KeyCode, mods: Modifiers) -> Event {
    Event::Key(KeyEvent::new(code).with_modifiers(mods))
}

/// Decode the xterm modifier parameter: `value = 1 + bitmask`,
/// Shift=1, Alt=2, Ctrl=4, Meta=8.
fn modifiers_from_xterm(value: u32) -> Modifiers {
    let bits = value.saturating_sub(1);
    let mut mods = Modifiers::NONE;
    if bits & 1 != 0 {
        mods |= Modifiers::SHIFT;
    }
    if bits & 2 != 0 {
        mods |= Modifiers::ALT;
    }
    if bits & 4 != 0 {
        mods |= Modifiers::CTRL;
    }
    if bits & 8 != 0 {
        mods |= Modifiers::META;
    }
    mods
}

/// First numeric parameter of a CSI parameter string.
fn first_param(params: &[u8]) -> Option<u32> {
    let s = std::str::from_utf8(params).ok()?;
    s.split(';').next()?.parse().ok()
}

/// Second numeric parameter, interpreted as an xterm modifier value.
fn modifier_param(params: &[u8]) -> Modifiers {
    let Ok(s) = std::str::from_utf8(params) else {
        return Modifiers::NONE;
    };
    let value: u32 = s
        .split(';')
        .nth(1)
        .and_then(|p| p.parse().ok())
        .unwrap_or(1);
    modifiers_from_xterm(value)
}

fn dispatch_csi_tilde(params: &[u8]) -> Option<Event> {
    let num = first_param(params)?;
    let mods = modifier_param(params);

    let code = match num {
        1 | 7 => KeyCode::Home,
        2 => KeyCode::Insert,
        3 => KeyCode::Delete,
        4 | 8 => KeyCode::End,
        5 => KeyCode::PageUp,
        6 => KeyCode::PageDown,
        11..=14 => KeyCode::F((num - 10) as u8),
        15 => KeyCode::F(5),
        17..=21 => KeyCode::F((num - 11) as u8),
        23 | 24 => KeyCode::F((num - 12) as u8),
        25 | 26 => KeyCode::F((num - 12) as u8),
        28 | 29 => KeyCode::F((num - 13) as u8),
        31..=34 => KeyCode::F((num - 14) as u8),
        _ => return None,
    };
    Some(key(code, mods))
}

/// Decode an SGR mouse report: `CSI < b ; x ; y (M|m)`.
///
/// Coordinates are 1-indexed on the wire and 0-indexed in events.
fn parse_sgr_mouse(params: &[u8], final_byte: u8) -> Option<Event> {
    let s = std::str::from_utf8(params).ok()?;
    let mut parts = s.split(';');
    let code: u16 = parts.next()?.parse().ok()?;
    let x: u16 = parts.next()?.parse().ok()?;
    let y: u16 = parts.next()?.parse().ok()?;

    let mods = mouse_modifiers(code);
    let (button, kind) = decode_button_bits(code, final_byte == b'm');

    Some(Event::Mouse(
        MouseEvent::new(kind, button, x.saturating_sub(1), y.saturating_sub(1))
            .with_modifiers(mods),
    ))
}

/// Decode an X10 mouse report payload: `b cx cy`, each offset by 32.
///
/// Unlike SGR, the payload bytes may exceed 0x7F, which is why they are
/// collected in a dedicated state rather than fed through ground.
fn parse_x10_mouse(payload: [u8; 3]) -> Option<Event> {
    let b = payload[0].checked_sub(32)? as u16;
    let x = (payload[1] as u16).checked_sub(33)?;
    let y = (payload[2] as u16).checked_sub(33)?;

    let mods = mouse_modifiers(b);

    // X10 encodes release as button bits 0b11 without the motion or wheel
    // bits and does not say which button went up.
    if b & 0x60 == 0 && b & 3 == 3 {
        return Some(Event::Mouse(
            MouseEvent::new(MouseKind::Release, MouseButton::None, x, y).with_modifiers(mods),
        ));
    }

    let (button, kind) = decode_button_bits(b, false);
    Some(Event::Mouse(
        MouseEvent::new(kind, button, x, y).with_modifiers(mods),
    ))
}

/// Modifier bits shared by X10 and SGR encodings (bits 2-4).
fn mouse_modifiers(code: u16) -> Modifiers {
    let mut mods = Modifiers::NONE;
    if code & 4 != 0 {
        mods |= Modifiers::SHIFT;
    }
    if code & 8 != 0 {
        mods |= Modifiers::ALT;
    }
    if code & 16 != 0 {
        mods |= Modifiers::CTRL;
    }
    mods
}

/// Decode the button/kind from the shared button-bit layout:
/// low 2 bits select the button, bit 5 marks motion, bit 6 marks wheel.
fn decode_button_bits(code: u16, is_release: bool) -> (MouseButton, MouseKind) {
    if code & 64 != 0 {
        let button = if code & 3 == 0 {
            MouseButton::WheelUp
        } else {
            MouseButton::WheelDown
        };
        return (button, MouseKind::Press);
    }

    let motion = code & 32 != 0;
    let button = match code & 3 {
        0 => MouseButton::Left,
        1 => MouseButton::Middle,
        2 => MouseButton::Right,
        _ => MouseButton::None,
    };

    let kind = if motion {
        if button == MouseButton::None {
            MouseKind::Move
        } else {
            MouseKind::Drag
        }
    } else if is_release {
        MouseKind::Release
    } else {
        MouseKind::Press
    };

    (button, kind)
}
