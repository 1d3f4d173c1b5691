#![forbid(unsafe_code)]

//! The damage-tracked double buffer.
//!
//! [`DisplayBuffer`] holds two cell grids: `front` mirrors what the
//! terminal is believed to show after the last successful flush, `back`
//! is the pending next frame. Every mutation lands in `back` and expands
//! the affected row's damage interval, so the reconciler only ever scans
//! inside damage.
//!
//! # Invariants
//!
//! 1. For every row, cells differing between front and back lie inside
//!    that row's damage interval.
//! 2. The wide-pair invariant holds in both grids: a width-2 leading
//!    cell is always followed by a trailing marker, and a trailing
//!    marker never stands alone. Writes that would split a pair blank
//!    the orphaned half (and damage it).
//! 3. Grid dimensions are equal for front and back and stay within
//!    implementation bounds.

use unicode_segmentation::UnicodeSegmentation;

use weft_core::geometry::Rect;

use crate::cell::{cluster_width, Cell, CellAttr, Cluster};
use crate::damage::DamageRegion;
use crate::fps::FpsLimiter;

/// Largest accepted dimension; beyond this a resize is clamped.
pub const MAX_DIM: u16 = 4096;

/// Double-buffered cell grid with per-row damage and frame pacing.
#[derive(Debug, Clone)]
pub struct DisplayBuffer {
    width: u16,
    height: u16,
    pub(crate) front: Vec<Cell>,
    pub(crate) back: Vec<Cell>,
    pub(crate) damage: Vec<DamageRegion>,
    limiter: FpsLimiter,
    frame_depth: u32,
}

impl DisplayBuffer {
    /// Create a buffer. Dimensions are clamped into `1..=MAX_DIM`; a
    /// clamp is logged, never an error.
    #[must_use]
    pub fn new(width: u16, height: u16) -> Self {
        Self::with_limiter(width, height, FpsLimiter::default())
    }

    /// Create a buffer with an explicit frame limiter.
    #[must_use]
    pub fn with_limiter(width: u16, height: u16, limiter: FpsLimiter) -> Self {
        let (width, height) = clamp_dims(width, height);
        let size = width as usize * height as usize;
        Self {
            width,
            height,
            front: vec![Cell::default(); size],
            back: vec![Cell::default(); size],
            damage: vec![DamageRegion::CLEAN; height as usize],
            limiter,
            frame_depth: 0,
        }
    }

    /// Grid width in cells.
    #[inline]
    #[must_use]
    pub const fn width(&self) -> u16 {
        self.width
    }

    /// Grid height in cells.
    #[inline]
    #[must_use]
    pub const fn height(&self) -> u16 {
        self.height
    }

    /// The frame limiter guarding flushes.
    #[inline]
    pub fn limiter(&self) -> &FpsLimiter {
        &self.limiter
    }

    /// Mutable access to the frame limiter.
    #[inline]
    pub fn limiter_mut(&mut self) -> &mut FpsLimiter {
        &mut self.limiter
    }

    #[inline]
    fn index(&self, x: u16, y: u16) -> usize {
        y as usize * self.width as usize + x as usize
    }

    /// The pending (back) cell at `(x, y)`.
    #[must_use]
    pub fn back_cell(&self, x: u16, y: u16) -> Option<&Cell> {
        if x < self.width && y < self.height {
            Some(&self.back[self.index(x, y)])
        } else {
            None
        }
    }

    /// The believed-on-screen (front) cell at `(x, y)`.
    #[must_use]
    pub fn front_cell(&self, x: u16, y: u16) -> Option<&Cell> {
        if x < self.width && y < self.height {
            Some(&self.front[self.index(x, y)])
        } else {
            None
        }
    }

    pub(crate) fn back_row(&self, y: u16) -> &[Cell] {
        let start = y as usize * self.width as usize;
        &self.back[start..start + self.width as usize]
    }

    pub(crate) fn front_row(&self, y: u16) -> &[Cell] {
        let start = y as usize * self.width as usize;
        &self.front[start..start + self.width as usize]
    }

    // ── Mutation ─────────────────────────────────────────────────────────

    /// Place one grapheme cluster at `(x, y)`.
    ///
    /// A width-2 cluster writes the leading cell plus a trailing marker;
    /// if only the last column is left, a space is substituted. A write
    /// that would split an existing wide pair blanks the orphaned half
    /// and damages it. Out-of-bounds writes are ignored.
    pub fn put_char(&mut self, x: u16, y: u16, cluster: &str, attr: CellAttr) {
        if x >= self.width || y >= self.height {
            return;
        }

        let w = cluster_width(cluster).clamp(1, 2) as u16;

        if w == 2 && x + 1 >= self.width {
            // No room for the trailing half.
            self.write_cell(x, y, Cell::blank(attr));
            return;
        }

        if w == 2 {
            // Repair both target cells before either write lands, so the
            // second repair cannot see the freshly written leader as a
            // pair to break.
            self.repair_pair_at(x, y);
            self.repair_pair_at(x + 1, y);
            self.set_back_raw(x, y, Cell::new(Cluster::new(cluster), 2, attr));
            self.set_back_raw(x + 1, y, Cell::trailing(attr));
        } else {
            self.write_cell(x, y, Cell::new(Cluster::new(cluster), 1, attr));
        }
    }

    /// Write text starting at `(x, y)`, advancing by cluster width.
    /// Clusters that would overflow the row are dropped, not wrapped.
    pub fn put_text(&mut self, x: u16, y: u16, text: &str, attr: CellAttr) {
        if y >= self.height {
            return;
        }
        let mut cx = x;
        for cluster in text.graphemes(true) {
            if cx >= self.width {
                break;
            }
            let w = cluster_width(cluster).clamp(1, 2) as u16;
            self.put_char(cx, y, cluster, attr);
            cx = cx.saturating_add(w);
        }
    }

    /// Fill a rectangle with one cluster.
    pub fn fill_rect(&mut self, rect: Rect, cluster: &str, attr: CellAttr) {
        let clipped = rect.intersection(&Rect::from_size(self.width, self.height));
        if clipped.is_empty() {
            return;
        }
        let w = cluster_width(cluster).clamp(1, 2) as u16;
        for y in clipped.y..clipped.bottom() {
            let mut x = clipped.x;
            while x < clipped.right() {
                if x + w > clipped.right() {
                    // A wide cluster would spill past the rect; pad.
                    self.write_cell(x, y, Cell::blank(attr));
                    x += 1;
                } else {
                    self.put_char(x, y, cluster, attr);
                    x = x.saturating_add(w);
                }
            }
        }
    }

    /// Clear a rectangle to spaces with the given attribute.
    pub fn clear_rect(&mut self, rect: Rect, attr: CellAttr) {
        let clipped = rect.intersection(&Rect::from_size(self.width, self.height));
        for y in clipped.y..clipped.bottom() {
            for x in clipped.x..clipped.right() {
                self.write_cell(x, y, Cell::blank(attr));
            }
        }
    }

    /// Scroll the contents of `rect` vertically by `dy` rows (positive
    /// is down). The exposed band is filled with spaces in `attr`, and
    /// the whole rect is damaged.
    pub fn scroll(&mut self, rect: Rect, dy: i32, attr: CellAttr) {
        let clipped = rect.intersection(&Rect::from_size(self.width, self.height));
        if clipped.is_empty() || dy == 0 {
            return;
        }
        let h = i32::from(clipped.height);
        if dy.abs() >= h {
            self.clear_rect(clipped, attr);
            return;
        }

        let copy_row = |buf: &mut Self, dst: u16, src: u16| {
            for x in clipped.x..clipped.right() {
                let cell = buf.back[buf.index(x, src)];
                let idx = buf.index(x, dst);
                buf.back[idx] = cell;
            }
        };

        if dy > 0 {
            // Content moves down; copy bottom-up.
            let dy = dy as u16;
            for dst in (clipped.y..clipped.bottom()).rev() {
                if dst >= clipped.y + dy {
                    copy_row(self, dst, dst - dy);
                } else {
                    for x in clipped.x..clipped.right() {
                        let idx = self.index(x, dst);
                        self.back[idx] = Cell::blank(attr);
                    }
                }
            }
        } else {
            let dy = (-dy) as u16;
            for dst in clipped.y..clipped.bottom() {
                if dst + dy < clipped.bottom() {
                    copy_row(self, dst, dst + dy);
                } else {
                    for x in clipped.x..clipped.right() {
                        let idx = self.index(x, dst);
                        self.back[idx] = Cell::blank(attr);
                    }
                }
            }
        }

        for y in clipped.y..clipped.bottom() {
            // Copying a column range can split wide pairs at the rect
            // edges; repair before damaging.
            self.repair_row_edges(y, clipped.x, clipped.right());
            self.damage[y as usize].expand(clipped.x, clipped.width);
        }
    }

    /// Resize the grids. The top-left overlap of both grids is kept;
    /// growth damages every row, a pure shrink adds no damage beyond
    /// what pair-splitting at the new right edge requires.
    pub fn resize(&mut self, new_width: u16, new_height: u16) {
        let (new_width, new_height) = clamp_dims(new_width, new_height);
        if new_width == self.width && new_height == self.height {
            return;
        }

        let grew = new_width > self.width || new_height > self.height;
        let copy_w = self.width.min(new_width);
        let copy_h = self.height.min(new_height);

        let remap = |grid: &Vec<Cell>, old_w: u16| -> Vec<Cell> {
            let mut out = vec![Cell::default(); new_width as usize * new_height as usize];
            for y in 0..copy_h {
                let src = y as usize * old_w as usize;
                let dst = y as usize * new_width as usize;
                out[dst..dst + copy_w as usize]
                    .copy_from_slice(&grid[src..src + copy_w as usize]);
            }
            out
        };

        self.front = remap(&self.front, self.width);
        self.back = remap(&self.back, self.width);
        self.width = new_width;
        self.height = new_height;

        let mut damage = vec![DamageRegion::CLEAN; new_height as usize];
        if grew {
            for region in &mut damage {
                region.expand(0, new_width);
            }
        } else {
            for (y, region) in self.damage.iter().take(new_height as usize).enumerate() {
                let mut r = *region;
                r.clamp(new_width);
                damage[y] = r;
            }
        }
        self.damage = damage;

        // A leading cell whose trailer was cut off at the new right edge
        // must not survive in either grid.
        for y in 0..self.height {
            let last = self.width - 1;
            let idx = self.index(last, y);
            if self.back[idx].is_wide() {
                let attr = self.back[idx].attr;
                self.back[idx] = Cell::blank(attr);
                self.damage[y as usize].expand(last, 1);
            }
            if self.front[idx].is_wide() {
                let attr = self.front[idx].attr;
                self.front[idx] = Cell::blank(attr);
                self.damage[y as usize].expand(last, 1);
            }
            // A trailing marker stranded in the first column likewise.
            let first = self.index(0, y);
            if self.back[first].is_trailing() {
                let attr = self.back[first].attr;
                self.back[first] = Cell::blank(attr);
                self.damage[y as usize].expand(0, 1);
            }
            if self.front[first].is_trailing() {
                let attr = self.front[first].attr;
                self.front[first] = Cell::blank(attr);
                self.damage[y as usize].expand(0, 1);
            }
        }
    }

    // ── Frame scoping ────────────────────────────────────────────────────

    /// Open a frame scope. While any scope is open, flushes are deferred
    /// so a half-written frame is never observed.
    pub fn begin_frame(&mut self) {
        self.frame_depth = self.frame_depth.saturating_add(1);
    }

    /// Close a frame scope.
    pub fn end_frame(&mut self) {
        self.frame_depth = self.frame_depth.saturating_sub(1);
    }

    /// Whether a frame scope is currently open.
    #[must_use]
    pub const fn frame_open(&self) -> bool {
        self.frame_depth > 0
    }

    // ── Damage ───────────────────────────────────────────────────────────

    /// Return each row's damage interval and clear all damage.
    ///
    /// For callers implementing their own output path; the built-in
    /// reconciler manages damage itself.
    pub fn damage_snapshot(&mut self) -> Vec<DamageRegion> {
        let mut out = vec![DamageRegion::CLEAN; self.height as usize];
        for (y, region) in self.damage.iter_mut().enumerate() {
            region.clamp(self.width);
            out[y] = *region;
            region.reset();
        }
        for cell in &mut self.back {
            cell.dirty = false;
        }
        out
    }

    /// Whether any row carries damage.
    #[must_use]
    pub fn has_damage(&self) -> bool {
        self.damage.iter().any(|d| !d.is_empty())
    }

    // ── Internals ────────────────────────────────────────────────────────

    /// Write one cell into the back grid, repairing any wide pair the
    /// write splits and expanding damage for everything touched.
    fn write_cell(&mut self, x: u16, y: u16, cell: Cell) {
        self.repair_pair_at(x, y);
        self.set_back_raw(x, y, cell);
    }

    /// Write without pair repair; damage and the dirty flag still apply.
    fn set_back_raw(&mut self, x: u16, y: u16, mut cell: Cell) {
        cell.dirty = true;
        let idx = self.index(x, y);
        self.back[idx] = cell;
        self.damage[y as usize].expand(x, 1);
    }

    /// If `(x, y)` currently holds half of a wide pair, blank the other
    /// half (keeping its attribute) and damage it.
    fn repair_pair_at(&mut self, x: u16, y: u16) {
        let idx = self.index(x, y);
        let current = self.back[idx];

        if current.is_wide() && x + 1 < self.width {
            let t = self.index(x + 1, y);
            if self.back[t].is_trailing() {
                let attr = self.back[t].attr;
                self.back[t] = Cell::blank(attr);
                self.back[t].dirty = true;
                self.damage[y as usize].expand(x + 1, 1);
            }
        } else if current.is_trailing() && x > 0 {
            let l = self.index(x - 1, y);
            if self.back[l].is_wide() {
                let attr = self.back[l].attr;
                self.back[l] = Cell::blank(attr);
                self.back[l].dirty = true;
                self.damage[y as usize].expand(x - 1, 1);
            }
        }
    }

    /// Repair pairs split at the column boundaries `[left, right)` of a
    /// region copy.
    fn repair_row_edges(&mut self, y: u16, left: u16, right: u16) {
        let li = self.index(left, y);
        if self.back[li].is_trailing() {
            let attr = self.back[li].attr;
            self.back[li] = Cell::blank(attr);
            if left > 0 {
                let prev = self.index(left - 1, y);
                if self.back[prev].is_wide() {
                    let attr = self.back[prev].attr;
                    self.back[prev] = Cell::blank(attr);
                    self.damage[y as usize].expand(left - 1, 1);
                }
            }
        }
        if right > 0 && right <= self.width {
            let last = self.index(right - 1, y);
            if self.back[last].is_wide() {
                let attr = self.back[last].attr;
                self.back[last] = Cell::blank(attr);
                if right < self.width {
                    let next = self.index(right, y);
                    if self.back[next].is_trailing() {
                        let attr = self.back[next].attr;
                        self.back[next] = Cell::blank(attr);
                        self.damage[y as usize].expand(right, 1);
                    }
                }
            }
        }
    }
}

fn clamp_dims(width: u16, height: u16) -> (u16, u16) {
    let w = width.clamp(1, MAX_DIM);
    let h = height.clamp(1, MAX_DIM);
    if w != width || h != height {
        tracing::warn!(
            requested_cols = width,
            requested_rows = height,
            cols = w,
            rows = h,
            "display dimensions out of range, clamped"
        );
    }
    (w, h)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell::Color;

    fn attr() -> CellAttr {
        CellAttr::DEFAULT.with_fg(Color::Ansi(7))
    }

    /// Every cell differing between front and back must lie inside the
    /// row's damage interval.
    fn assert_damage_covers(buf: &DisplayBuffer) {
        for y in 0..buf.height() {
            let d = buf.damage[y as usize];
            for x in 0..buf.width() {
                let front = buf.front_cell(x, y).unwrap();
                let back = buf.back_cell(x, y).unwrap();
                if front != back {
                    assert!(
                        x >= d.start() && x < d.end(),
                        "undamaged difference at ({x},{y}): damage [{},{})",
                        d.start(),
                        d.end()
                    );
                }
            }
        }
    }

    /// No orphan leading or trailing halves in either grid.
    fn assert_pairs_intact(buf: &DisplayBuffer) {
        for grid in [&buf.front, &buf.back] {
            for y in 0..buf.height() {
                for x in 0..buf.width() {
                    let cell = &grid[y as usize * buf.width() as usize + x as usize];
                    if cell.is_wide() {
                        assert!(x + 1 < buf.width(), "wide leader at right edge ({x},{y})");
                        let next = &grid[y as usize * buf.width() as usize + x as usize + 1];
                        assert!(next.is_trailing(), "leader without trailer at ({x},{y})");
                    }
                    if cell.is_trailing() {
                        assert!(x > 0, "trailing at column 0 ({x},{y})");
                        let prev = &grid[y as usize * buf.width() as usize + x as usize - 1];
                        assert!(prev.is_wide(), "trailer without leader at ({x},{y})");
                    }
                }
            }
        }
    }

    #[test]
    fn put_char_damages_cell() {
        let mut buf = DisplayBuffer::new(10, 4);
        buf.put_char(3, 1, "x", attr());
        assert_eq!(buf.back_cell(3, 1).unwrap().cluster.as_str(), "x");
        let d = buf.damage[1];
        assert_eq!((d.start(), d.end()), (3, 4));
        assert_damage_covers(&buf);
    }

    #[test]
    fn put_text_advances_by_width() {
        let mut buf = DisplayBuffer::new(10, 2);
        buf.put_text(0, 0, "a漢b", attr());
        assert_eq!(buf.back_cell(0, 0).unwrap().cluster.as_str(), "a");
        assert_eq!(buf.back_cell(1, 0).unwrap().cluster.as_str(), "漢");
        assert!(buf.back_cell(2, 0).unwrap().is_trailing());
        assert_eq!(buf.back_cell(3, 0).unwrap().cluster.as_str(), "b");
        assert_pairs_intact(&buf);
    }

    #[test]
    fn put_text_drops_overflow() {
        let mut buf = DisplayBuffer::new(4, 1);
        buf.put_text(0, 0, "abcdef", attr());
        assert_eq!(buf.back_cell(3, 0).unwrap().cluster.as_str(), "d");
        // Nothing wrapped to a second row (there is none to check), and
        // no panic occurred.
    }

    #[test]
    fn wide_at_last_column_becomes_space() {
        let mut buf = DisplayBuffer::new(4, 1);
        buf.put_char(3, 0, "漢", attr());
        let cell = buf.back_cell(3, 0).unwrap();
        assert!(cell.is_blank());
        assert_pairs_intact(&buf);
    }

    #[test]
    fn overwriting_trailing_blanks_leader() {
        let mut buf = DisplayBuffer::new(10, 1);
        buf.put_text(0, 0, "漢", attr());
        assert!(buf.back_cell(1, 0).unwrap().is_trailing());

        // Writing over the trailer replaces the leader with a space.
        buf.put_char(1, 0, "x", attr());
        assert!(buf.back_cell(0, 0).unwrap().is_blank());
        assert_eq!(buf.back_cell(1, 0).unwrap().cluster.as_str(), "x");
        let d = buf.damage[0];
        assert!(d.start() == 0 && d.end() >= 2);
        assert_pairs_intact(&buf);
        assert_damage_covers(&buf);
    }

    #[test]
    fn overwriting_leader_blanks_trailer() {
        let mut buf = DisplayBuffer::new(10, 1);
        buf.put_text(2, 0, "漢", attr());
        buf.put_char(2, 0, "x", attr());
        assert_eq!(buf.back_cell(2, 0).unwrap().cluster.as_str(), "x");
        assert!(buf.back_cell(3, 0).unwrap().is_blank());
        assert_pairs_intact(&buf);
    }

    #[test]
    fn fill_and_clear_rect() {
        let mut buf = DisplayBuffer::new(8, 4);
        buf.fill_rect(Rect::new(1, 1, 3, 2), "#", attr());
        assert_eq!(buf.back_cell(1, 1).unwrap().cluster.as_str(), "#");
        assert_eq!(buf.back_cell(3, 2).unwrap().cluster.as_str(), "#");
        assert!(buf.back_cell(0, 0).unwrap().is_blank());

        buf.clear_rect(Rect::new(1, 1, 3, 2), attr());
        assert!(buf.back_cell(1, 1).unwrap().is_blank());
        assert_damage_covers(&buf);
    }

    #[test]
    fn scroll_up_moves_rows() {
        let mut buf = DisplayBuffer::new(6, 4);
        buf.put_text(0, 1, "one", attr());
        buf.put_text(0, 2, "two", attr());
        buf.scroll(Rect::new(0, 0, 6, 4), -1, attr());

        assert_eq!(buf.back_cell(0, 0).unwrap().cluster.as_str(), "o");
        assert_eq!(buf.back_cell(0, 1).unwrap().cluster.as_str(), "t");
        // Exposed bottom row is blank.
        assert!(buf.back_cell(0, 3).unwrap().is_blank());
        assert_damage_covers(&buf);
    }

    #[test]
    fn scroll_down_moves_rows() {
        let mut buf = DisplayBuffer::new(6, 3);
        buf.put_text(0, 0, "top", attr());
        buf.scroll(Rect::new(0, 0, 6, 3), 1, attr());
        assert!(buf.back_cell(0, 0).unwrap().is_blank());
        assert_eq!(buf.back_cell(0, 1).unwrap().cluster.as_str(), "t");
        assert_damage_covers(&buf);
    }

    #[test]
    fn scroll_full_height_clears() {
        let mut buf = DisplayBuffer::new(4, 2);
        buf.put_text(0, 0, "ab", attr());
        buf.scroll(Rect::new(0, 0, 4, 2), 5, attr());
        assert!(buf.back_cell(0, 0).unwrap().is_blank());
        assert!(buf.back_cell(0, 1).unwrap().is_blank());
    }

    #[test]
    fn resize_grow_damages_everything() {
        let mut buf = DisplayBuffer::new(4, 2);
        buf.damage_snapshot(); // start clean
        buf.resize(8, 4);
        assert_eq!(buf.width(), 8);
        assert_eq!(buf.height(), 4);
        for y in 0..4u16 {
            let d = buf.damage[y as usize];
            assert_eq!((d.start(), d.end()), (0, 8), "row {y}");
        }
    }

    #[test]
    fn resize_preserves_overlap() {
        let mut buf = DisplayBuffer::new(6, 3);
        buf.put_text(0, 0, "keep", attr());
        buf.resize(10, 5);
        assert_eq!(buf.back_cell(0, 0).unwrap().cluster.as_str(), "k");
        assert_eq!(buf.back_cell(3, 0).unwrap().cluster.as_str(), "p");
    }

    #[test]
    fn resize_shrink_adds_no_damage_when_clean() {
        let mut buf = DisplayBuffer::new(8, 4);
        buf.damage_snapshot();
        buf.resize(5, 3);
        assert!(!buf.has_damage());
    }

    #[test]
    fn resize_shrink_splitting_pair_blanks_leader() {
        let mut buf = DisplayBuffer::new(6, 1);
        buf.put_char(4, 0, "漢", attr());
        // Shrinking to 5 columns cuts the trailer at column 5.
        buf.resize(5, 1);
        assert!(buf.back_cell(4, 0).unwrap().is_blank());
        assert_pairs_intact(&buf);
    }

    #[test]
    fn resize_zero_clamps() {
        let mut buf = DisplayBuffer::new(4, 4);
        buf.resize(0, 0);
        assert_eq!(buf.width(), 1);
        assert_eq!(buf.height(), 1);
    }

    #[test]
    fn damage_snapshot_clears() {
        let mut buf = DisplayBuffer::new(6, 2);
        buf.put_text(1, 0, "hi", attr());
        let snap = buf.damage_snapshot();
        assert_eq!((snap[0].start(), snap[0].end()), (1, 3));
        assert!(!buf.has_damage());
    }

    #[test]
    fn frame_scope_nesting() {
        let mut buf = DisplayBuffer::new(4, 1);
        assert!(!buf.frame_open());
        buf.begin_frame();
        buf.begin_frame();
        buf.end_frame();
        assert!(buf.frame_open());
        buf.end_frame();
        assert!(!buf.frame_open());
        buf.end_frame(); // extra end is harmless
        assert!(!buf.frame_open());
    }

    mod property {
        use super::*;
        use proptest::prelude::*;

        #[derive(Debug, Clone)]
        enum Op {
            PutChar(u16, u16, char),
            PutWide(u16, u16),
            PutText(u16, u16, String),
            Fill(u16, u16, u16, u16),
            Clear(u16, u16, u16, u16),
            Scroll(i32),
            Resize(u16, u16),
        }

        fn op_strategy() -> impl Strategy<Value = Op> {
            prop_oneof![
                (0u16..24, 0u16..10, proptest::char::range('a', 'z'))
                    .prop_map(|(x, y, c)| Op::PutChar(x, y, c)),
                (0u16..24, 0u16..10).prop_map(|(x, y)| Op::PutWide(x, y)),
                (0u16..24, 0u16..10, "[a-z漢字 ]{0,12}")
                    .prop_map(|(x, y, s)| Op::PutText(x, y, s)),
                (0u16..24, 0u16..10, 1u16..8, 1u16..4)
                    .prop_map(|(x, y, w, h)| Op::Fill(x, y, w, h)),
                (0u16..24, 0u16..10, 1u16..8, 1u16..4)
                    .prop_map(|(x, y, w, h)| Op::Clear(x, y, w, h)),
                (-3i32..4).prop_map(Op::Scroll),
                (1u16..30, 1u16..12).prop_map(|(w, h)| Op::Resize(w, h)),
            ]
        }

        fn apply(buf: &mut DisplayBuffer, op: &Op) {
            let a = attr();
            match op {
                Op::PutChar(x, y, c) => buf.put_char(*x, *y, &c.to_string(), a),
                Op::PutWide(x, y) => buf.put_char(*x, *y, "漢", a),
                Op::PutText(x, y, s) => buf.put_text(*x, *y, s, a),
                Op::Fill(x, y, w, h) => buf.fill_rect(Rect::new(*x, *y, *w, *h), "#", a),
                Op::Clear(x, y, w, h) => buf.clear_rect(Rect::new(*x, *y, *w, *h), a),
                Op::Scroll(dy) => {
                    let r = Rect::from_size(buf.width(), buf.height());
                    buf.scroll(r, *dy, a);
                }
                Op::Resize(w, h) => buf.resize(*w, *h),
            }
        }

        proptest! {
            /// Damage always covers the front/back difference.
            #[test]
            fn damage_covers_all_differences(
                ops in proptest::collection::vec(op_strategy(), 1..40),
            ) {
                let mut buf = DisplayBuffer::new(20, 8);
                for op in &ops {
                    apply(&mut buf, op);
                    assert_damage_covers(&buf);
                }
            }

            /// No reachable state contains an orphan wide-pair half.
            #[test]
            fn wide_pairs_never_split(
                ops in proptest::collection::vec(op_strategy(), 1..40),
            ) {
                let mut buf = DisplayBuffer::new(20, 8);
                for op in &ops {
                    apply(&mut buf, op);
                    assert_pairs_intact(&buf);
                }
            }
        }
    }
}
