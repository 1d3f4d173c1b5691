#![forbid(unsafe_code)]

//! Cell types and invariants.
//!
//! A [`Cell`] is one character position on the terminal grid: a grapheme
//! cluster stored inline, its cached display width, and a packed 64-bit
//! attribute word.
//!
//! # Wide characters
//!
//! A cluster of display width 2 occupies two cells: the *leading* cell
//! holds the cluster, the cell to its right is a *trailing* marker
//! (width 0, empty cluster, same attribute). The pairing invariant — a
//! trailing cell never stands alone, a leading cell is never missing its
//! trailer — is maintained by the buffer on every write.
//!
//! # Attribute packing (64 bits)
//!
//! ```text
//! [63..60: unused][59..52: style][51..50: bg_kind][49..48: fg_kind]
//! [47..24: bg_value][23..0: fg_value]
//! ```
//!
//! Kinds: 0 = default, 1 = indexed-16, 2 = indexed-256, 3 = rgb24.

use std::cell::RefCell;
use std::collections::HashMap;

use unicode_width::UnicodeWidthStr;

/// Maximum UTF-8 bytes a cluster stores inline.
pub const MAX_CLUSTER_BYTES: usize = 15;

/// A grapheme cluster stored inline (16 bytes, `Copy`).
///
/// The empty cluster renders as a space.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Cluster {
    len: u8,
    bytes: [u8; MAX_CLUSTER_BYTES],
}

impl Cluster {
    /// The empty cluster.
    pub const EMPTY: Self = Self {
        len: 0,
        bytes: [0; MAX_CLUSTER_BYTES],
    };

    /// Store a cluster, truncating at a character boundary if it exceeds
    /// the inline capacity. Oversized clusters are rare enough (long ZWJ
    /// emoji chains) that truncation beats heap storage here.
    #[must_use]
    pub fn new(s: &str) -> Self {
        let mut end = s.len().min(MAX_CLUSTER_BYTES);
        while end > 0 && !s.is_char_boundary(end) {
            end -= 1;
        }
        let mut bytes = [0u8; MAX_CLUSTER_BYTES];
        bytes[..end].copy_from_slice(&s.as_bytes()[..end]);
        Self {
            len: end as u8,
            bytes,
        }
    }

    /// Store a single character.
    #[must_use]
    pub fn from_char(c: char) -> Self {
        let mut buf = [0u8; 4];
        let s = c.encode_utf8(&mut buf);
        let mut bytes = [0u8; MAX_CLUSTER_BYTES];
        bytes[..s.len()].copy_from_slice(s.as_bytes());
        Self {
            len: s.len() as u8,
            bytes,
        }
    }

    /// The stored text. Empty for the empty cluster.
    #[must_use]
    pub fn as_str(&self) -> &str {
        std::str::from_utf8(&self.bytes[..self.len as usize]).unwrap_or("")
    }

    /// Whether nothing is stored.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl Default for Cluster {
    fn default() -> Self {
        Self::EMPTY
    }
}

impl std::fmt::Debug for Cluster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Cluster({:?})", self.as_str())
    }
}

// ── Display width with memoization ──────────────────────────────────────

const WIDTH_CACHE_CAP: usize = 1024;

thread_local! {
    static WIDTH_CACHE: RefCell<HashMap<Cluster, u8>> =
        RefCell::new(HashMap::with_capacity(64));
}

/// Display width of a grapheme cluster.
///
/// ASCII takes a constant-time path; other clusters go through a bounded
/// per-thread memo keyed by the cluster bytes. The cache is wiped when
/// full rather than evicted — the working set of distinct non-ASCII
/// clusters on a screen is tiny.
#[must_use]
pub fn cluster_width(s: &str) -> usize {
    let bytes = s.as_bytes();
    if bytes.len() == 1 {
        let b = bytes[0];
        if (0x20..0x7F).contains(&b) {
            return 1;
        }
        if b < 0x20 || b == 0x7F {
            return 0;
        }
    }
    if bytes.is_empty() {
        return 0;
    }

    let key = Cluster::new(s);
    WIDTH_CACHE.with(|cache| {
        let mut cache = cache.borrow_mut();
        if let Some(&w) = cache.get(&key) {
            return w as usize;
        }
        let w = s.width();
        if cache.len() >= WIDTH_CACHE_CAP {
            cache.clear();
        }
        cache.insert(key, w.min(u8::MAX as usize) as u8);
        w
    })
}

// ── Colors ───────────────────────────────────────────────────────────────

/// A cell color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Color {
    /// The terminal's default foreground or background.
    #[default]
    Default,
    /// One of the 16 base colors (0-15).
    Ansi(u8),
    /// 256-color palette index.
    Indexed(u8),
    /// 24-bit RGB.
    Rgb(u8, u8, u8),
}

const KIND_DEFAULT: u64 = 0;
const KIND_ANSI: u64 = 1;
const KIND_INDEXED: u64 = 2;
const KIND_RGB: u64 = 3;

impl Color {
    fn pack(self) -> (u64, u64) {
        match self {
            Color::Default => (KIND_DEFAULT, 0),
            Color::Ansi(n) => (KIND_ANSI, u64::from(n & 0x0F)),
            Color::Indexed(n) => (KIND_INDEXED, u64::from(n)),
            Color::Rgb(r, g, b) => (
                KIND_RGB,
                (u64::from(r) << 16) | (u64::from(g) << 8) | u64::from(b),
            ),
        }
    }

    fn unpack(kind: u64, value: u64) -> Self {
        match kind {
            KIND_ANSI => Color::Ansi((value & 0x0F) as u8),
            KIND_INDEXED => Color::Indexed((value & 0xFF) as u8),
            KIND_RGB => Color::Rgb(
                ((value >> 16) & 0xFF) as u8,
                ((value >> 8) & 0xFF) as u8,
                (value & 0xFF) as u8,
            ),
            _ => Color::Default,
        }
    }
}

bitflags::bitflags! {
    /// Text style flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct StyleFlags: u8 {
        /// Bold / increased intensity.
        const BOLD          = 0b0000_0001;
        /// Underlined.
        const UNDERLINE     = 0b0000_0010;
        /// Reverse video.
        const REVERSE       = 0b0000_0100;
        /// Italic.
        const ITALIC        = 0b0000_1000;
        /// Struck through.
        const STRIKETHROUGH = 0b0001_0000;
    }
}

/// Packed cell attribute: colors and style in one 64-bit word.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(transparent)]
pub struct CellAttr(u64);

const FG_VALUE_SHIFT: u64 = 0;
const BG_VALUE_SHIFT: u64 = 24;
const FG_KIND_SHIFT: u64 = 48;
const BG_KIND_SHIFT: u64 = 50;
const STYLE_SHIFT: u64 = 52;

impl CellAttr {
    /// Default colors, no styles.
    pub const DEFAULT: Self = Self(0);

    /// Build an attribute.
    #[must_use]
    pub fn new(fg: Color, bg: Color, style: StyleFlags) -> Self {
        let (fk, fv) = fg.pack();
        let (bk, bv) = bg.pack();
        Self(
            (fv << FG_VALUE_SHIFT)
                | (bv << BG_VALUE_SHIFT)
                | (fk << FG_KIND_SHIFT)
                | (bk << BG_KIND_SHIFT)
                | (u64::from(style.bits()) << STYLE_SHIFT),
        )
    }

    /// Foreground color.
    #[must_use]
    pub fn fg(self) -> Color {
        Color::unpack((self.0 >> FG_KIND_SHIFT) & 0x3, (self.0 >> FG_VALUE_SHIFT) & 0xFF_FFFF)
    }

    /// Background color.
    #[must_use]
    pub fn bg(self) -> Color {
        Color::unpack((self.0 >> BG_KIND_SHIFT) & 0x3, (self.0 >> BG_VALUE_SHIFT) & 0xFF_FFFF)
    }

    /// Style flags.
    #[must_use]
    pub fn style(self) -> StyleFlags {
        StyleFlags::from_bits_truncate(((self.0 >> STYLE_SHIFT) & 0xFF) as u8)
    }

    /// Replace the foreground.
    #[must_use]
    pub fn with_fg(self, fg: Color) -> Self {
        Self::new(fg, self.bg(), self.style())
    }

    /// Replace the background.
    #[must_use]
    pub fn with_bg(self, bg: Color) -> Self {
        Self::new(self.fg(), bg, self.style())
    }

    /// Replace the style flags.
    #[must_use]
    pub fn with_style(self, style: StyleFlags) -> Self {
        Self::new(self.fg(), self.bg(), style)
    }
}

// ── Cell ─────────────────────────────────────────────────────────────────

/// One grid cell.
///
/// Equality compares content (cluster, width, attribute) and ignores the
/// transient dirty flag, so diffing and tests see through bookkeeping.
#[derive(Debug, Clone, Copy)]
pub struct Cell {
    /// The grapheme cluster. Empty renders as a space.
    pub cluster: Cluster,
    /// Cached display width: 1 or 2, or 0 for a trailing marker.
    pub width: u8,
    /// Colors and style.
    pub attr: CellAttr,
    /// Set by buffer writes, cleared when the cell reaches the terminal.
    pub(crate) dirty: bool,
}

impl Cell {
    /// A blank cell (space) with the given attribute.
    #[must_use]
    pub fn blank(attr: CellAttr) -> Self {
        Self {
            cluster: Cluster::EMPTY,
            width: 1,
            attr,
            dirty: false,
        }
    }

    /// The trailing half of a wide pair; carries the leader's attribute.
    #[must_use]
    pub fn trailing(attr: CellAttr) -> Self {
        Self {
            cluster: Cluster::EMPTY,
            width: 0,
            attr,
            dirty: false,
        }
    }

    /// A content cell.
    #[must_use]
    pub fn new(cluster: Cluster, width: u8, attr: CellAttr) -> Self {
        Self {
            cluster,
            width,
            attr,
            dirty: false,
        }
    }

    /// Whether this is the trailing half of a wide pair.
    #[must_use]
    pub const fn is_trailing(&self) -> bool {
        self.width == 0
    }

    /// Whether this is the leading half of a wide pair.
    #[must_use]
    pub const fn is_wide(&self) -> bool {
        self.width == 2
    }

    /// Whether this cell shows a plain space.
    #[must_use]
    pub const fn is_blank(&self) -> bool {
        self.cluster.is_empty() && self.width == 1
    }
}

impl Default for Cell {
    fn default() -> Self {
        Self::blank(CellAttr::DEFAULT)
    }
}

impl PartialEq for Cell {
    fn eq(&self, other: &Self) -> bool {
        self.cluster == other.cluster && self.width == other.width && self.attr == other.attr
    }
}

impl Eq for Cell {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cluster_roundtrip() {
        let c = Cluster::new("漢");
        assert_eq!(c.as_str(), "漢");
        assert!(!c.is_empty());
        assert_eq!(Cluster::EMPTY.as_str(), "");
    }

    #[test]
    fn cluster_truncates_at_char_boundary() {
        // 6 four-byte characters exceed the inline capacity; the stored
        // prefix must still be valid UTF-8.
        let long = "𝄞𝄞𝄞𝄞𝄞𝄞";
        let c = Cluster::new(long);
        assert!(c.as_str().len() <= MAX_CLUSTER_BYTES);
        assert!(long.starts_with(c.as_str()));
        assert!(!c.as_str().is_empty());
    }

    #[test]
    fn width_ascii_fast_path() {
        assert_eq!(cluster_width("a"), 1);
        assert_eq!(cluster_width(" "), 1);
        assert_eq!(cluster_width(""), 0);
        assert_eq!(cluster_width("\u{7}"), 0);
    }

    #[test]
    fn width_wide_chars() {
        assert_eq!(cluster_width("漢"), 2);
        assert_eq!(cluster_width("字"), 2);
        // Cached second lookup returns the same.
        assert_eq!(cluster_width("漢"), 2);
    }

    #[test]
    fn attr_packs_rgb() {
        let attr = CellAttr::new(
            Color::Rgb(255, 128, 0),
            Color::Default,
            StyleFlags::BOLD | StyleFlags::UNDERLINE,
        );
        assert_eq!(attr.fg(), Color::Rgb(255, 128, 0));
        assert_eq!(attr.bg(), Color::Default);
        assert_eq!(attr.style(), StyleFlags::BOLD | StyleFlags::UNDERLINE);
    }

    #[test]
    fn attr_packs_indexed() {
        let attr = CellAttr::new(Color::Ansi(9), Color::Indexed(232), StyleFlags::empty());
        assert_eq!(attr.fg(), Color::Ansi(9));
        assert_eq!(attr.bg(), Color::Indexed(232));
    }

    #[test]
    fn attr_builders() {
        let attr = CellAttr::DEFAULT
            .with_fg(Color::Ansi(1))
            .with_bg(Color::Ansi(4))
            .with_style(StyleFlags::REVERSE);
        assert_eq!(attr.fg(), Color::Ansi(1));
        assert_eq!(attr.bg(), Color::Ansi(4));
        assert_eq!(attr.style(), StyleFlags::REVERSE);
    }

    #[test]
    fn attr_default_is_zero() {
        assert_eq!(
            CellAttr::new(Color::Default, Color::Default, StyleFlags::empty()),
            CellAttr::DEFAULT
        );
    }

    #[test]
    fn cell_equality_ignores_dirty() {
        let mut a = Cell::blank(CellAttr::DEFAULT);
        let b = Cell::blank(CellAttr::DEFAULT);
        a.dirty = true;
        assert_eq!(a, b);
    }

    #[test]
    fn trailing_marker_shape() {
        let attr = CellAttr::DEFAULT.with_fg(Color::Ansi(2));
        let t = Cell::trailing(attr);
        assert!(t.is_trailing());
        assert!(!t.is_wide());
        assert!(t.cluster.is_empty());
        assert_eq!(t.attr, attr);
    }

    mod property {
        use super::*;
        use proptest::prelude::*;

        fn any_color() -> impl Strategy<Value = Color> {
            prop_oneof![
                Just(Color::Default),
                (0u8..16).prop_map(Color::Ansi),
                any::<u8>().prop_map(Color::Indexed),
                (any::<u8>(), any::<u8>(), any::<u8>()).prop_map(|(r, g, b)| Color::Rgb(r, g, b)),
            ]
        }

        proptest! {
            #[test]
            fn attr_pack_unpack_roundtrip(
                fg in any_color(),
                bg in any_color(),
                bits in 0u8..32,
            ) {
                let style = StyleFlags::from_bits_truncate(bits);
                let attr = CellAttr::new(fg, bg, style);
                prop_assert_eq!(attr.fg(), fg);
                prop_assert_eq!(attr.bg(), bg);
                prop_assert_eq!(attr.style(), style);
            }

            #[test]
            fn cluster_storage_is_valid_utf8(s in "\\PC{0,8}") {
                let c = Cluster::new(&s);
                // as_str never returns broken UTF-8 and is a prefix.
                prop_assert!(s.starts_with(c.as_str()));
            }
        }
    }
}
