#![forbid(unsafe_code)]

//! ANSI/VT escape-sequence generation.
//!
//! Pure byte-writing helpers with no state of their own; the presenter
//! owns all state tracking. Color emission is depth-aware: a cell color
//! richer than the negotiated [`ColorDepth`] degrades (rgb → 256-palette
//! cube → nearest base color) instead of being dropped.
//!
//! | Category | Sequence |
//! |----------|----------|
//! | SGR      | `CSI n ; ... m` |
//! | Cursor   | `CSI n A/B/C/D`, `CSI y;x H`, `CSI x G`, `ESC 7`/`ESC 8` |
//! | Erase    | `CSI K`, `CSI 2 J` |
//! | Modes    | `CSI ? 1049 h/l`, `CSI ? 25 h/l`, `CSI ? 2004 h/l`, mouse `CSI ? 1000/1002/1006 h/l` |
//! | Shape    | `CSI n SP q` (DECSCUSR) |
//! | Title    | `OSC 2 ; text BEL` |

use std::io::{self, Write};

use weft_core::capabilities::{ColorDepth, MouseProtocol};

use crate::cell::{Color, StyleFlags};

// ── Fixed sequences ──────────────────────────────────────────────────────

/// SGR reset: `CSI 0 m`.
pub const SGR_RESET: &[u8] = b"\x1b[0m";

/// Enter the alternate screen.
pub const ALT_SCREEN_ENTER: &[u8] = b"\x1b[?1049h";
/// Leave the alternate screen.
pub const ALT_SCREEN_LEAVE: &[u8] = b"\x1b[?1049l";

/// Hide the cursor.
pub const CURSOR_HIDE: &[u8] = b"\x1b[?25l";
/// Show the cursor.
pub const CURSOR_SHOW: &[u8] = b"\x1b[?25h";

/// DEC cursor save.
pub const CURSOR_SAVE: &[u8] = b"\x1b7";
/// DEC cursor restore.
pub const CURSOR_RESTORE: &[u8] = b"\x1b8";

/// Enable bracketed paste.
pub const BRACKETED_PASTE_ENABLE: &[u8] = b"\x1b[?2004h";
/// Disable bracketed paste.
pub const BRACKETED_PASTE_DISABLE: &[u8] = b"\x1b[?2004l";

/// Erase to end of line.
pub const ERASE_TO_EOL: &[u8] = b"\x1b[K";
/// Erase the whole screen.
pub const CLEAR_SCREEN: &[u8] = b"\x1b[2J";
/// Cursor to home position.
pub const CURSOR_HOME: &[u8] = b"\x1b[H";

/// Mouse enable sequence for a protocol, if it has one.
#[must_use]
pub const fn mouse_enable(proto: MouseProtocol) -> Option<&'static [u8]> {
    match proto {
        MouseProtocol::None => None,
        MouseProtocol::X10 => Some(b"\x1b[?9h"),
        MouseProtocol::X11 => Some(b"\x1b[?1000;1002h"),
        MouseProtocol::Sgr => Some(b"\x1b[?1000;1002;1006h"),
    }
}

/// Mouse disable sequence for a protocol, if it has one.
#[must_use]
pub const fn mouse_disable(proto: MouseProtocol) -> Option<&'static [u8]> {
    match proto {
        MouseProtocol::None => None,
        MouseProtocol::X10 => Some(b"\x1b[?9l"),
        MouseProtocol::X11 => Some(b"\x1b[?1000;1002l"),
        MouseProtocol::Sgr => Some(b"\x1b[?1000;1002;1006l"),
    }
}

// ── Cursor movement ──────────────────────────────────────────────────────

/// CUP: absolute position, 0-indexed in, 1-indexed on the wire.
pub fn cup<W: Write>(w: &mut W, row: u16, col: u16) -> io::Result<()> {
    write!(w, "\x1b[{};{}H", row + 1, col + 1)
}

/// CHA: column on the current row.
pub fn cha<W: Write>(w: &mut W, col: u16) -> io::Result<()> {
    write!(w, "\x1b[{}G", col + 1)
}

/// CUU: up `n`.
pub fn cuu<W: Write>(w: &mut W, n: u16) -> io::Result<()> {
    match n {
        0 => Ok(()),
        1 => w.write_all(b"\x1b[A"),
        _ => write!(w, "\x1b[{n}A"),
    }
}

/// CUD: down `n`.
pub fn cud<W: Write>(w: &mut W, n: u16) -> io::Result<()> {
    match n {
        0 => Ok(()),
        1 => w.write_all(b"\x1b[B"),
        _ => write!(w, "\x1b[{n}B"),
    }
}

/// CUF: forward `n`.
pub fn cuf<W: Write>(w: &mut W, n: u16) -> io::Result<()> {
    match n {
        0 => Ok(()),
        1 => w.write_all(b"\x1b[C"),
        _ => write!(w, "\x1b[{n}C"),
    }
}

/// CUB: back `n`.
pub fn cub<W: Write>(w: &mut W, n: u16) -> io::Result<()> {
    match n {
        0 => Ok(()),
        1 => w.write_all(b"\x1b[D"),
        _ => write!(w, "\x1b[{n}D"),
    }
}

// ── SGR ──────────────────────────────────────────────────────────────────

/// Write the SGR reset.
#[inline]
pub fn sgr_reset<W: Write>(w: &mut W) -> io::Result<()> {
    w.write_all(SGR_RESET)
}

/// Style on-codes for all set flags: `CSI n ; ... m`.
pub fn sgr_style_on<W: Write>(w: &mut W, flags: StyleFlags) -> io::Result<()> {
    if flags.is_empty() {
        return Ok(());
    }
    w.write_all(b"\x1b[")?;
    let mut first = true;
    for (flag, code) in [
        (StyleFlags::BOLD, 1u8),
        (StyleFlags::UNDERLINE, 4),
        (StyleFlags::REVERSE, 7),
        (StyleFlags::ITALIC, 3),
        (StyleFlags::STRIKETHROUGH, 9),
    ] {
        if flags.contains(flag) {
            if !first {
                w.write_all(b";")?;
            }
            write!(w, "{code}")?;
            first = false;
        }
    }
    w.write_all(b"m")
}

/// Foreground color at the given depth.
pub fn sgr_fg<W: Write>(w: &mut W, color: Color, depth: ColorDepth) -> io::Result<()> {
    match resolve(color, depth) {
        Resolved::Skip => Ok(()),
        Resolved::Default => w.write_all(b"\x1b[39m"),
        Resolved::Base(n) => {
            let code = if n < 8 { 30 + n as u16 } else { 82 + n as u16 };
            write!(w, "\x1b[{code}m")
        }
        Resolved::Indexed(n) => write!(w, "\x1b[38;5;{n}m"),
        Resolved::Rgb(r, g, b) => write!(w, "\x1b[38;2;{r};{g};{b}m"),
    }
}

/// Background color at the given depth.
pub fn sgr_bg<W: Write>(w: &mut W, color: Color, depth: ColorDepth) -> io::Result<()> {
    match resolve(color, depth) {
        Resolved::Skip => Ok(()),
        Resolved::Default => w.write_all(b"\x1b[49m"),
        Resolved::Base(n) => {
            let code = if n < 8 { 40 + n as u16 } else { 92 + n as u16 };
            write!(w, "\x1b[{code}m")
        }
        Resolved::Indexed(n) => write!(w, "\x1b[48;5;{n}m"),
        Resolved::Rgb(r, g, b) => write!(w, "\x1b[48;2;{r};{g};{b}m"),
    }
}

/// A color after depth degradation.
enum Resolved {
    /// Mono terminals get no color sequences at all.
    Skip,
    Default,
    /// One of the 16 base colors.
    Base(u8),
    Indexed(u8),
    Rgb(u8, u8, u8),
}

fn resolve(color: Color, depth: ColorDepth) -> Resolved {
    match depth {
        ColorDepth::Mono => match color {
            Color::Default => Resolved::Default,
            _ => Resolved::Skip,
        },
        ColorDepth::Ansi16 => match color {
            Color::Default => Resolved::Default,
            Color::Ansi(n) => Resolved::Base(n & 0x0F),
            Color::Indexed(n) => Resolved::Base(index256_to_16(n)),
            Color::Rgb(r, g, b) => Resolved::Base(rgb_to_16(r, g, b)),
        },
        ColorDepth::Ansi256 => match color {
            Color::Default => Resolved::Default,
            Color::Ansi(n) => Resolved::Base(n & 0x0F),
            Color::Indexed(n) => Resolved::Indexed(n),
            Color::Rgb(r, g, b) => Resolved::Indexed(rgb_to_256(r, g, b)),
        },
        ColorDepth::Rgb => match color {
            Color::Default => Resolved::Default,
            Color::Ansi(n) => Resolved::Base(n & 0x0F),
            Color::Indexed(n) => Resolved::Indexed(n),
            Color::Rgb(r, g, b) => Resolved::Rgb(r, g, b),
        },
    }
}

// ── Color quantization ───────────────────────────────────────────────────

/// RGB values of the 16 base colors (the xterm defaults).
const BASE16: [(u8, u8, u8); 16] = [
    (0, 0, 0),
    (205, 0, 0),
    (0, 205, 0),
    (205, 205, 0),
    (0, 0, 238),
    (205, 0, 205),
    (0, 205, 205),
    (229, 229, 229),
    (127, 127, 127),
    (255, 0, 0),
    (0, 255, 0),
    (255, 255, 0),
    (92, 92, 255),
    (255, 0, 255),
    (0, 255, 255),
    (255, 255, 255),
];

/// Quantize RGB onto the 256-color palette (6×6×6 cube plus grayscale
/// ramp, whichever is closer).
#[must_use]
pub fn rgb_to_256(r: u8, g: u8, b: u8) -> u8 {
    fn cube_index(v: u8) -> u8 {
        if v < 48 {
            0
        } else if v < 115 {
            1
        } else {
            (u16::from(v) - 35).min(255) as u8 / 40
        }
    }
    fn cube_value(i: u8) -> u8 {
        if i == 0 {
            0
        } else {
            55 + 40 * i
        }
    }

    let (ci, cg, cb) = (cube_index(r), cube_index(g), cube_index(b));
    let cube = (
        cube_value(ci),
        cube_value(cg),
        cube_value(cb),
    );
    let cube_dist = dist((r, g, b), cube);

    // Grayscale ramp: indices 232..=255 cover 8..=238 in steps of 10.
    let avg = (u16::from(r) + u16::from(g) + u16::from(b)) / 3;
    let gray_i = if avg < 8 {
        0
    } else {
        ((avg - 8) / 10).min(23) as u8
    };
    let gray_v = 8 + 10 * gray_i;
    let gray_dist = dist((r, g, b), (gray_v, gray_v, gray_v));

    if gray_dist < cube_dist {
        232 + gray_i
    } else {
        16 + 36 * ci + 6 * cg + cb
    }
}

/// Quantize RGB onto the 16 base colors.
#[must_use]
pub fn rgb_to_16(r: u8, g: u8, b: u8) -> u8 {
    let mut best = 0u8;
    let mut best_dist = u32::MAX;
    for (i, &c) in BASE16.iter().enumerate() {
        let d = dist((r, g, b), c);
        if d < best_dist {
            best = i as u8;
            best_dist = d;
        }
    }
    best
}

/// Map a 256-palette index onto the 16 base colors.
#[must_use]
pub fn index256_to_16(n: u8) -> u8 {
    if n < 16 {
        return n;
    }
    let (r, g, b) = palette256_rgb(n);
    rgb_to_16(r, g, b)
}

/// RGB value of a 256-palette entry.
fn palette256_rgb(n: u8) -> (u8, u8, u8) {
    if n < 16 {
        return BASE16[n as usize];
    }
    if n >= 232 {
        let v = 8 + 10 * (n - 232);
        return (v, v, v);
    }
    let n = n - 16;
    let value = |i: u8| if i == 0 { 0 } else { 55 + 40 * i };
    (value(n / 36), value((n / 6) % 6), value(n % 6))
}

fn dist(a: (u8, u8, u8), b: (u8, u8, u8)) -> u32 {
    let dr = i32::from(a.0) - i32::from(b.0);
    let dg = i32::from(a.1) - i32::from(b.1);
    let db = i32::from(a.2) - i32::from(b.2);
    (dr * dr + dg * dg + db * db) as u32
}

// ── Cursor shape & title ─────────────────────────────────────────────────

/// DECSCUSR cursor shape codes (steady variants).
pub fn cursor_shape<W: Write>(w: &mut W, code: u8) -> io::Result<()> {
    write!(w, "\x1b[{code} q")
}

/// Set the window title via OSC 2.
pub fn set_title<W: Write>(w: &mut W, title: &str) -> io::Result<()> {
    write!(w, "\x1b]2;{title}\x07")
}
