#![forbid(unsafe_code)]

//! Terminal capability detection and backend selection.
//!
//! Detection is environment-driven and deterministic: given the same
//! environment variables, [`Capabilities::detect`] always produces the
//! same result. Runtime refinement via device-attribute queries lives in
//! [`crate::caps_probe`] and is strictly additive.
//!
//! # Detection inputs, in priority order
//!
//! 1. Explicit overrides: `NO_COLOR` forces mono; `COLORTERM=truecolor`
//!    or `24bit` forces RGB.
//! 2. `TERM` suffix rules (`*-256color`, `*-direct`, `dumb`, ...).
//! 3. `TERM_PROGRAM` for known modern terminals.
//! 4. Locale (`LC_ALL`/`LC_CTYPE`/`LANG`) for UTF-8.
//!
//! Unknown means conservative: false negatives (a feature disabled that
//! would have worked) are preferred over false positives that corrupt
//! output.

use std::env;

/// Color resolution the terminal accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ColorDepth {
    /// No color sequences at all.
    Mono,
    /// The 16 base colors (SGR 30-37 / 90-97).
    Ansi16,
    /// 256-color palette (SGR 38;5;n).
    Ansi256,
    /// 24-bit truecolor (SGR 38;2;r;g;b).
    Rgb,
}

/// Mouse reporting protocol the terminal speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MouseProtocol {
    /// No mouse reporting.
    None,
    /// X10 compatibility mode (coordinates capped at 223).
    X10,
    /// X11 normal tracking with button events.
    X11,
    /// SGR extended coordinates.
    Sgr,
}

/// The backend families the platform can select between.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendKind {
    /// Full escape-sequence backend for modern terminals.
    Ansi,
    /// Raw termios backend with a conservative VT subset.
    TermiosRaw,
    /// Last-resort backend: plain row repaints, no optional modes.
    CursesFallback,
}

impl BackendKind {
    /// The escalation order: each backend's next fallback.
    #[must_use]
    pub const fn fallback(self) -> Option<Self> {
        match self {
            Self::Ansi => Some(Self::TermiosRaw),
            Self::TermiosRaw => Some(Self::CursesFallback),
            Self::CursesFallback => None,
        }
    }
}

/// Environment variable naming a preferred backend
/// (`ansi | termios | curses | auto`).
pub const BACKEND_OVERRIDE_VAR: &str = "WEFT_BACKEND";

/// What the active terminal can do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Capabilities {
    /// Best color resolution.
    pub color_depth: ColorDepth,
    /// Best mouse protocol.
    pub mouse: MouseProtocol,
    /// Bracketed paste mode supported.
    pub bracketed_paste: bool,
    /// Locale is UTF-8.
    pub utf8: bool,
    /// Alternate screen buffer supported.
    pub alt_screen: bool,
    /// Window title changes supported (OSC 2).
    pub title: bool,
    /// Cursor shape control supported (DECSCUSR).
    pub cursor_shapes: bool,
    /// Terminal identification string (from `TERM_PROGRAM`, `TERM`, or a
    /// device-attribute probe).
    pub terminal_id: String,
}

#[derive(Debug, Clone)]
struct DetectInputs {
    no_color: bool,
    term: String,
    term_program: String,
    colorterm: String,
    lang: String,
}

impl DetectInputs {
    fn from_env() -> Self {
        Self {
            no_color: env::var_os("NO_COLOR").is_some(),
            term: env::var("TERM").unwrap_or_default(),
            term_program: env::var("TERM_PROGRAM").unwrap_or_default(),
            colorterm: env::var("COLORTERM").unwrap_or_default(),
            lang: env::var("LC_ALL")
                .or_else(|_| env::var("LC_CTYPE"))
                .or_else(|_| env::var("LANG"))
                .unwrap_or_default(),
        }
    }
}

/// Terminal programs known to support the full modern feature set.
const MODERN_TERMINALS: &[&str] = &[
    "iTerm.app",
    "WezTerm",
    "Alacritty",
    "Ghostty",
    "kitty",
    "Rio",
    "Contour",
    "vscode",
];

impl Default for Capabilities {
    fn default() -> Self {
        Self::basic()
    }
}

impl Capabilities {
    /// Minimal safe capabilities: 16 colors, no mouse, no optional modes.
    #[must_use]
    pub fn basic() -> Self {
        Self {
            color_depth: ColorDepth::Ansi16,
            mouse: MouseProtocol::None,
            bracketed_paste: false,
            utf8: true,
            alt_screen: false,
            title: false,
            cursor_shapes: false,
            terminal_id: String::new(),
        }
    }

    /// Detect capabilities from the environment.
    #[must_use]
    pub fn detect() -> Self {
        Self::from_inputs(&DetectInputs::from_env())
    }

    fn from_inputs(inputs: &DetectInputs) -> Self {
        let term = inputs.term.as_str();

        if term == "dumb" || term.is_empty() {
            return Self {
                color_depth: ColorDepth::Mono,
                utf8: locale_is_utf8(&inputs.lang),
                terminal_id: term.to_string(),
                ..Self::basic()
            };
        }

        let modern = MODERN_TERMINALS
            .iter()
            .any(|t| inputs.term_program.eq_ignore_ascii_case(t))
            || term.starts_with("xterm-kitty")
            || term.contains("ghostty")
            || term.contains("wezterm")
            || term.contains("alacritty");

        let color_depth = if inputs.no_color {
            ColorDepth::Mono
        } else if inputs.colorterm.eq_ignore_ascii_case("truecolor")
            || inputs.colorterm.eq_ignore_ascii_case("24bit")
            || term.ends_with("-direct")
            || modern
        {
            ColorDepth::Rgb
        } else if term.ends_with("-256color") {
            ColorDepth::Ansi256
        } else {
            ColorDepth::Ansi16
        };

        // Anything xterm-ish speaks SGR mouse; the bare linux console
        // does not report mice at all.
        let mouse = if term == "linux" {
            MouseProtocol::None
        } else if modern || term.starts_with("xterm") || term.starts_with("screen")
            || term.starts_with("tmux") || term.starts_with("rxvt")
        {
            MouseProtocol::Sgr
        } else {
            MouseProtocol::X11
        };

        let alt_screen = term != "linux";

        let terminal_id = if !inputs.term_program.is_empty() {
            inputs.term_program.clone()
        } else {
            term.to_string()
        };

        Self {
            color_depth,
            mouse,
            bracketed_paste: term != "linux",
            utf8: locale_is_utf8(&inputs.lang),
            alt_screen,
            title: alt_screen,
            cursor_shapes: modern || term.starts_with("xterm"),
            terminal_id,
        }
    }

    /// Clamp this capability set to the most another depth allows.
    ///
    /// Used when the recovery layer renegotiates after a
    /// capability-mismatch failure (e.g. RGB output rejected).
    #[must_use]
    pub fn downgraded_to(&self, depth: ColorDepth) -> Self {
        let mut caps = self.clone();
        caps.color_depth = caps.color_depth.min(depth);
        caps
    }

    // ── Predefined profiles for tests and simulation ────────────────────

    /// Modern truecolor terminal, everything on.
    #[must_use]
    pub fn modern() -> Self {
        Self {
            color_depth: ColorDepth::Rgb,
            mouse: MouseProtocol::Sgr,
            bracketed_paste: true,
            utf8: true,
            alt_screen: true,
            title: true,
            cursor_shapes: true,
            terminal_id: "modern".to_string(),
        }
    }

    /// Standard xterm-256color.
    #[must_use]
    pub fn xterm_256color() -> Self {
        Self {
            color_depth: ColorDepth::Ansi256,
            mouse: MouseProtocol::Sgr,
            bracketed_paste: true,
            utf8: true,
            alt_screen: true,
            title: true,
            cursor_shapes: true,
            terminal_id: "xterm-256color".to_string(),
        }
    }

    /// The Linux virtual console.
    #[must_use]
    pub fn linux_console() -> Self {
        Self {
            color_depth: ColorDepth::Ansi16,
            mouse: MouseProtocol::None,
            bracketed_paste: false,
            utf8: true,
            alt_screen: false,
            title: false,
            cursor_shapes: false,
            terminal_id: "linux".to_string(),
        }
    }

    /// A terminal we know nothing about.
    #[must_use]
    pub fn dumb() -> Self {
        Self {
            color_depth: ColorDepth::Mono,
            mouse: MouseProtocol::None,
            bracketed_paste: false,
            utf8: false,
            alt_screen: false,
            title: false,
            cursor_shapes: false,
            terminal_id: "dumb".to_string(),
        }
    }
}

fn locale_is_utf8(lang: &str) -> bool {
    let lower = lang.to_ascii_lowercase();
    lower.contains("utf-8") || lower.contains("utf8")
}

/// Terminal size hint from `LINES`/`COLUMNS`.
///
/// Only meaningful before the first winsize ioctl succeeds; the ioctl is
/// authoritative afterwards.
#[must_use]
pub fn size_hint_from_env() -> Option<(u16, u16)> {
    let cols = env::var("COLUMNS").ok()?.parse().ok()?;
    let rows = env::var("LINES").ok()?.parse().ok()?;
    if cols > 0 && rows > 0 {
        Some((cols, rows))
    } else {
        None
    }
}

/// Parse the backend-override environment value.
///
/// Returns `None` for `auto`, unset, or unrecognized values.
#[must_use]
pub fn backend_override(value: Option<&str>) -> Option<BackendKind> {
    match value?.to_ascii_lowercase().as_str() {
        "ansi" => Some(BackendKind::Ansi),
        "termios" => Some(BackendKind::TermiosRaw),
        "curses" => Some(BackendKind::CursesFallback),
        _ => None,
    }
}

// ── Backend scoring ──────────────────────────────────────────────────────

const WEIGHT_COLOR: i32 = 10;
const WEIGHT_MOUSE: i32 = 6;
const WEIGHT_PASTE: i32 = 4;

fn depth_rank(depth: ColorDepth) -> i32 {
    match depth {
        ColorDepth::Mono => 0,
        ColorDepth::Ansi16 => 1,
        ColorDepth::Ansi256 => 2,
        ColorDepth::Rgb => 3,
    }
}

fn mouse_rank(proto: MouseProtocol) -> i32 {
    match proto {
        MouseProtocol::None => 0,
        MouseProtocol::X10 => 1,
        MouseProtocol::X11 => 2,
        MouseProtocol::Sgr => 3,
    }
}

/// Score a candidate backend against the detected capabilities.
///
/// Higher is better. The score weighs what the backend would actually
/// deliver on this terminal minus a fixed setup cost.
#[must_use]
pub fn score_backend(kind: BackendKind, caps: &Capabilities, is_tty: bool) -> i32 {
    match kind {
        BackendKind::Ansi => {
            if !is_tty {
                return i32::MIN / 2;
            }
            depth_rank(caps.color_depth) * WEIGHT_COLOR
                + mouse_rank(caps.mouse) * WEIGHT_MOUSE
                + i32::from(caps.bracketed_paste) * WEIGHT_PASTE
                - 2
        }
        BackendKind::TermiosRaw => {
            if !is_tty {
                return i32::MIN / 2;
            }
            // Delivers at most 16 colors and keeps the mouse, with the
            // cheapest setup.
            depth_rank(caps.color_depth.min(ColorDepth::Ansi16)) * WEIGHT_COLOR
                + mouse_rank(caps.mouse) * WEIGHT_MOUSE
                + i32::from(caps.bracketed_paste) * WEIGHT_PASTE
                - 1
        }
        // Always works, never well.
        BackendKind::CursesFallback => depth_rank(caps.color_depth.min(ColorDepth::Ansi16)) - 4,
    }
}

/// Choose the best backend for the detected capabilities.
#[must_use]
pub fn choose_backend(caps: &Capabilities, is_tty: bool) -> BackendKind {
    let candidates = [
        BackendKind::Ansi,
        BackendKind::TermiosRaw,
        BackendKind::CursesFallback,
    ];
    // Ties go to the earlier candidate, which puts Ansi first on modern
    // terminals and leaves CursesFallback for non-ttys.
    let mut best = BackendKind::CursesFallback;
    let mut best_score = i32::MIN;
    for kind in candidates {
        let s = score_backend(kind, caps, is_tty);
        if s > best_score {
            best = kind;
            best_score = s;
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inputs() -> DetectInputs {
        DetectInputs {
            no_color: false,
            term: String::new(),
            term_program: String::new(),
            colorterm: String::new(),
            lang: "en_US.UTF-8".to_string(),
        }
    }

    #[test]
    fn truecolor_from_colorterm() {
        let caps = Capabilities::from_inputs(&DetectInputs {
            term: "xterm-256color".into(),
            colorterm: "truecolor".into(),
            ..inputs()
        });
        assert_eq!(caps.color_depth, ColorDepth::Rgb);
        assert_eq!(caps.mouse, MouseProtocol::Sgr);
        assert!(caps.bracketed_paste);
    }

    #[test]
    fn colorterm_24bit_also_counts() {
        let caps = Capabilities::from_inputs(&DetectInputs {
            term: "xterm".into(),
            colorterm: "24bit".into(),
            ..inputs()
        });
        assert_eq!(caps.color_depth, ColorDepth::Rgb);
    }

    #[test]
    fn term_suffix_gives_256() {
        let caps = Capabilities::from_inputs(&DetectInputs {
            term: "screen-256color".into(),
            ..inputs()
        });
        assert_eq!(caps.color_depth, ColorDepth::Ansi256);
    }

    #[test]
    fn no_color_forces_mono() {
        let caps = Capabilities::from_inputs(&DetectInputs {
            term: "xterm-256color".into(),
            colorterm: "truecolor".into(),
            no_color: true,
            ..inputs()
        });
        assert_eq!(caps.color_depth, ColorDepth::Mono);
    }

    #[test]
    fn dumb_terminal_has_nothing() {
        let caps = Capabilities::from_inputs(&DetectInputs {
            term: "dumb".into(),
            ..inputs()
        });
        assert_eq!(caps.color_depth, ColorDepth::Mono);
        assert_eq!(caps.mouse, MouseProtocol::None);
        assert!(!caps.alt_screen);
    }

    #[test]
    fn linux_console_limits() {
        let caps = Capabilities::from_inputs(&DetectInputs {
            term: "linux".into(),
            ..inputs()
        });
        assert_eq!(caps.color_depth, ColorDepth::Ansi16);
        assert_eq!(caps.mouse, MouseProtocol::None);
        assert!(!caps.alt_screen);
    }

    #[test]
    fn utf8_from_locale() {
        assert!(locale_is_utf8("en_US.UTF-8"));
        assert!(locale_is_utf8("C.utf8"));
        assert!(!locale_is_utf8("C"));
        assert!(!locale_is_utf8(""));
    }

    #[test]
    fn term_program_detection() {
        let caps = Capabilities::from_inputs(&DetectInputs {
            term: "xterm-256color".into(),
            term_program: "WezTerm".into(),
            ..inputs()
        });
        assert_eq!(caps.color_depth, ColorDepth::Rgb);
        assert_eq!(caps.terminal_id, "WezTerm");
        assert!(caps.cursor_shapes);
    }

    #[test]
    fn override_parsing() {
        assert_eq!(backend_override(Some("ansi")), Some(BackendKind::Ansi));
        assert_eq!(
            backend_override(Some("termios")),
            Some(BackendKind::TermiosRaw)
        );
        assert_eq!(
            backend_override(Some("CURSES")),
            Some(BackendKind::CursesFallback)
        );
        assert_eq!(backend_override(Some("auto")), None);
        assert_eq!(backend_override(None), None);
    }

    #[test]
    fn ansi_wins_on_modern_tty() {
        let caps = Capabilities::modern();
        assert_eq!(choose_backend(&caps, true), BackendKind::Ansi);
    }

    #[test]
    fn curses_fallback_off_tty() {
        let caps = Capabilities::modern();
        assert_eq!(choose_backend(&caps, false), BackendKind::CursesFallback);
    }

    #[test]
    fn fallback_chain_terminates() {
        let mut kind = BackendKind::Ansi;
        let mut hops = 0;
        while let Some(next) = kind.fallback() {
            kind = next;
            hops += 1;
        }
        assert_eq!(kind, BackendKind::CursesFallback);
        assert_eq!(hops, 2);
    }

    #[test]
    fn downgrade_clamps_depth() {
        let caps = Capabilities::modern().downgraded_to(ColorDepth::Ansi256);
        assert_eq!(caps.color_depth, ColorDepth::Ansi256);
        // Downgrading never upgrades.
        let caps = Capabilities::linux_console().downgraded_to(ColorDepth::Rgb);
        assert_eq!(caps.color_depth, ColorDepth::Ansi16);
    }
}
