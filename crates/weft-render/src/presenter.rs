#![forbid(unsafe_code)]

//! State-tracked reconciliation: damage in, minimal bytes out.
//!
//! The presenter walks each damaged row, splits it into maximal dirty
//! runs (absorbing clean gaps cheaper to overwrite than to jump), and for
//! each run emits the smallest combination of attribute changes, cursor
//! movement, and character payload that brings the terminal in line with
//! the back grid. Emitted cells are copied into the front grid, so after
//! a successful present the front mirrors the terminal again.
//!
//! All output is accumulated in one buffered writer and flushed once at
//! the end of the frame; a frame with nothing to say writes zero bytes.

use std::io::{self, BufWriter, Write};

use weft_core::capabilities::Capabilities;

use crate::ansi;
use crate::buffer::DisplayBuffer;
use crate::cell::{Cell, CellAttr, Color};
use crate::cursor_path::{self, MovePlan};

/// Internal write-buffer capacity.
const BUFFER_CAPACITY: usize = 32 * 1024;

/// Minimum run length for the erase-to-end-of-line shortcut to pay off.
const EL_MIN_RUN: u16 = 4;

/// Requested cursor placement applied at the end of a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CursorRequest {
    /// Column, 0-indexed.
    pub x: u16,
    /// Row, 0-indexed.
    pub y: u16,
    /// Whether the hardware cursor should be visible.
    pub visible: bool,
    /// Optional shape change.
    pub shape: Option<CursorShape>,
}

/// Hardware cursor shapes (DECSCUSR, steady variants).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorShape {
    /// Full-cell block.
    Block,
    /// Underline.
    Underline,
    /// Vertical bar.
    Bar,
}

impl CursorShape {
    const fn decscusr(self) -> u8 {
        match self {
            Self::Block => 2,
            Self::Underline => 4,
            Self::Bar => 6,
        }
    }
}

/// Byte and run counts for one present call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PresentStats {
    /// Bytes written for this frame.
    pub bytes: u64,
    /// Dirty runs emitted.
    pub runs: usize,
    /// Cells emitted.
    pub cells: usize,
}

/// Byte-counting writer wrapper.
#[derive(Debug)]
struct CountWriter<W> {
    inner: W,
    count: u64,
}

impl<W: Write> Write for CountWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.count += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// State-tracked terminal presenter.
///
/// Tracks the attribute and cursor position last sent to the terminal so
/// redundant sequences are never emitted. The tracked state survives
/// across frames; `None` means unknown and forces a full re-emit.
pub struct Presenter<W: Write> {
    writer: CountWriter<BufWriter<W>>,
    caps: Capabilities,
    /// Attribute the terminal currently has active, if known.
    last_attr: Option<CellAttr>,
    cursor_x: Option<u16>,
    cursor_y: Option<u16>,
    cursor_visible: Option<bool>,
    cursor_shape: Option<CursorShape>,
    /// Repaint whole dirty rows instead of computing runs; the fallback
    /// backend uses this against terminals whose cursor addressing we do
    /// not trust.
    full_row_repaint: bool,
}

impl<W: Write> Presenter<W> {
    /// Create a presenter over a writer.
    pub fn new(writer: W, caps: Capabilities) -> Self {
        Self {
            writer: CountWriter {
                inner: BufWriter::with_capacity(BUFFER_CAPACITY, writer),
                count: 0,
            },
            caps,
            last_attr: None,
            cursor_x: None,
            cursor_y: None,
            cursor_visible: None,
            cursor_shape: None,
            full_row_repaint: false,
        }
    }

    /// The capability set output is shaped for.
    pub fn capabilities(&self) -> &Capabilities {
        &self.caps
    }

    /// Replace the capability set (used when recovery renegotiates).
    pub fn set_capabilities(&mut self, caps: Capabilities) {
        self.caps = caps;
        // Colors already on screen may have been emitted at the old
        // depth; forget the tracked attribute so the next frame re-sends.
        self.last_attr = None;
    }

    /// Switch between run-based and whole-row emission.
    pub fn set_full_row_repaint(&mut self, on: bool) {
        self.full_row_repaint = on;
    }

    /// Forget all tracked terminal state (e.g. after the terminal was
    /// touched behind our back).
    pub fn invalidate(&mut self) {
        self.last_attr = None;
        self.cursor_x = None;
        self.cursor_y = None;
        self.cursor_visible = None;
        self.cursor_shape = None;
    }

    /// Write raw bytes (mode switches, queries) through the frame
    /// buffer. Callers that change visible state this way should also
    /// call [`Presenter::invalidate`].
    pub fn raw_write(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.writer.write_all(bytes)
    }

    /// Flush buffered output to the device immediately.
    pub fn raw_flush(&mut self) -> io::Result<()> {
        self.writer.flush()
    }

    /// Emit a window-title change (OSC 2).
    pub fn raw_write_title(&mut self, title: &str) -> io::Result<()> {
        ansi::set_title(&mut self.writer, title)?;
        self.writer.flush()
    }

    /// Recover the inner writer, flushing buffered output.
    pub fn into_writer(self) -> io::Result<W> {
        self.writer
            .inner
            .into_inner()
            .map_err(io::IntoInnerError::into_error)
    }

    /// Reconcile the buffer's back grid into the terminal.
    ///
    /// Emits only damaged cells that actually differ, copies them into
    /// the front grid, resets damage, and leaves the cursor where
    /// `cursor` asks (when given). Writes nothing at all when there is
    /// nothing to do.
    pub fn present(
        &mut self,
        buf: &mut DisplayBuffer,
        cursor: Option<CursorRequest>,
    ) -> io::Result<PresentStats> {
        let before = self.writer.count;
        let mut stats = PresentStats::default();

        let runs = self.collect_runs(buf);

        let cursor_work = cursor.is_some_and(|req| {
            self.cursor_visible != Some(req.visible)
                || (req.visible
                    && (self.cursor_x != Some(req.x) || self.cursor_y != Some(req.y)))
                || (req.shape.is_some() && self.cursor_shape != req.shape)
        });

        if runs.is_empty() && !cursor_work {
            // Zero work must mean zero bytes.
            for region in &mut buf.damage {
                region.reset();
            }
            return Ok(stats);
        }

        // Unknown attribute state: start the frame from a clean slate.
        if self.last_attr.is_none() {
            ansi::sgr_reset(&mut self.writer)?;
            self.last_attr = Some(CellAttr::DEFAULT);
        }

        for run in &runs {
            stats.cells += self.emit_run(buf, run)?;
        }
        stats.runs = runs.len();

        if let Some(req) = cursor {
            self.apply_cursor_request(req)?;
        }

        for region in &mut buf.damage {
            region.reset();
        }
        for cell in &mut buf.back {
            cell.dirty = false;
        }

        self.writer.flush()?;
        stats.bytes = self.writer.count - before;

        tracing::trace!(
            bytes = stats.bytes,
            runs = stats.runs,
            cells = stats.cells,
            "frame presented"
        );

        Ok(stats)
    }

    // ── Run collection ───────────────────────────────────────────────────

    /// Build the dirty-run list from damage, re-checking cell equality
    /// and absorbing clean gaps that cost less to overwrite than the
    /// absolute move needed to skip them.
    fn collect_runs(&self, buf: &DisplayBuffer) -> Vec<Run> {
        let mut runs = Vec::new();

        for y in 0..buf.height() {
            let mut region = buf.damage[y as usize];
            region.clamp(buf.width());
            if region.is_empty() {
                continue;
            }
            let (s, e) = if self.full_row_repaint {
                (0, buf.width())
            } else {
                (region.start(), region.end())
            };

            let front = buf.front_row(y);
            let back = buf.back_row(y);

            let mut x = s;
            while x < e {
                // Find the next differing cell.
                while x < e && front[x as usize] == back[x as usize] && !self.full_row_repaint {
                    x += 1;
                }
                if x >= e {
                    break;
                }
                let start = x;
                let mut end = x + 1;
                let mut gap_start;
                loop {
                    // Extend through differing cells.
                    while end < e && front[end as usize] != back[end as usize] {
                        end += 1;
                    }
                    if self.full_row_repaint {
                        end = e;
                        break;
                    }
                    // Measure the clean gap that follows.
                    gap_start = end;
                    let mut gap_end = end;
                    while gap_end < e && front[gap_end as usize] == back[gap_end as usize] {
                        gap_end += 1;
                    }
                    if gap_end >= e {
                        break;
                    }
                    // Absorb the gap when rewriting it is cheaper than
                    // the absolute move that skipping it would need.
                    let gap = (gap_end - gap_start) as usize;
                    if gap < cursor_path::cup_cost(y, gap_end) {
                        end = gap_end + 1;
                    } else {
                        break;
                    }
                }
                runs.push(Run { y, start, end });
                x = end;
            }
        }

        runs
    }

    // ── Emission ─────────────────────────────────────────────────────────

    fn emit_run(&mut self, buf: &mut DisplayBuffer, run: &Run) -> io::Result<usize> {
        let mut start = run.start;

        // Never start on the trailing half of a pair.
        if start > 0 && buf.back_row(run.y)[start as usize].is_trailing() {
            start -= 1;
        }

        // Erase-to-end shortcut: a long blank tail run with default
        // background is one short sequence instead of a wall of spaces.
        if self.try_erase_tail(buf, run.y, start, run.end)? {
            return Ok((run.end - start) as usize);
        }

        // Attribute first, then position: the attribute change is
        // position-independent and leading with it keeps the head of the
        // frame stable for terminals that buffer badly mid-sequence.
        let first_attr = buf.back_row(run.y)[start as usize].attr;
        self.emit_attr(first_attr)?;

        self.move_to(buf, start, run.y)?;

        let mut emitted = 0usize;
        let mut x = start;
        while x < run.end {
            let cell = buf.back_row(run.y)[x as usize];

            if cell.is_trailing() {
                // Covered by the leader we just wrote.
                self.sync_front(buf, x, run.y);
                x += 1;
                continue;
            }

            self.emit_attr(cell.attr)?;
            self.write_cell_text(&cell)?;

            self.sync_front(buf, x, run.y);
            if cell.is_wide() && x + 1 < buf.width() {
                self.sync_front(buf, x + 1, run.y);
            }

            let advance = u16::from(cell.width.max(1));
            self.cursor_x = self.cursor_x.map(|cx| cx.saturating_add(advance));
            emitted += 1;
            x += advance;
        }

        Ok(emitted)
    }

    /// Emit `CSI K` when a run of blanks effectively clears the rest of
    /// its row. Legal when the run's cells are blank with the default
    /// background and everything from the run to the right edge is
    /// already a clean default-background blank (erasing it again is a
    /// no-op). Returns true when it handled the run.
    fn try_erase_tail(
        &mut self,
        buf: &mut DisplayBuffer,
        y: u16,
        start: u16,
        end: u16,
    ) -> io::Result<bool> {
        if end - start < EL_MIN_RUN {
            return Ok(false);
        }

        let attr = {
            let back = buf.back_row(y);
            let front = buf.front_row(y);

            let run_ok = back[start as usize..end as usize]
                .iter()
                .all(|c| c.is_blank() && c.attr.bg() == Color::Default);
            if !run_ok {
                return Ok(false);
            }
            let tail_clean = (end..buf.width()).all(|x| {
                let b = back[x as usize];
                b.is_blank() && b.attr.bg() == Color::Default && front[x as usize] == b
            });
            if !tail_clean {
                return Ok(false);
            }
            back[start as usize].attr
        };

        self.emit_attr(attr)?;
        self.move_to(buf, start, y)?;
        self.writer.write_all(ansi::ERASE_TO_EOL)?;
        for x in start..end {
            self.sync_front(buf, x, y);
        }
        // EL does not move the cursor.
        Ok(true)
    }

    fn sync_front(&mut self, buf: &mut DisplayBuffer, x: u16, y: u16) {
        let idx = y as usize * buf.width() as usize + x as usize;
        let mut cell = buf.back[idx];
        cell.dirty = false;
        buf.front[idx] = cell;
    }

    /// Move the terminal cursor to `(x, y)` by the cheapest route.
    fn move_to(&mut self, buf: &DisplayBuffer, x: u16, y: u16) -> io::Result<()> {
        let clearance = self.space_walk_clearance(buf, x, y);
        let plan = cursor_path::plan((self.cursor_x, self.cursor_y), (x, y), clearance);
        if plan == MovePlan::None {
            return Ok(());
        }
        cursor_path::emit(&mut self.writer, plan, (x, y))?;
        self.cursor_x = Some(x);
        self.cursor_y = Some(y);
        Ok(())
    }

    /// How many columns forward of the cursor may be crossed by writing
    /// spaces: both grids must agree on a blank with the attribute the
    /// terminal currently has active.
    fn space_walk_clearance(&self, buf: &DisplayBuffer, tx: u16, ty: u16) -> u16 {
        let (Some(cx), Some(cy)) = (self.cursor_x, self.cursor_y) else {
            return 0;
        };
        if cy != ty || tx <= cx || tx > buf.width() {
            return 0;
        }
        let Some(last) = self.last_attr else {
            return 0;
        };
        let front = buf.front_row(ty);
        let back = buf.back_row(ty);
        for x in cx..tx {
            let f = &front[x as usize];
            let b = &back[x as usize];
            if !(f.is_blank() && b.is_blank() && f.attr == last && b.attr == last) {
                return 0;
            }
        }
        tx - cx
    }

    /// Bring the terminal's active attribute to `attr`, emitting only
    /// the parts that differ from the tracked state.
    fn emit_attr(&mut self, attr: CellAttr) -> io::Result<()> {
        if self.last_attr == Some(attr) {
            return Ok(());
        }
        let depth = self.caps.color_depth;

        match self.last_attr {
            Some(old) if old.style() == attr.style() => {
                // Colors only.
                if old.fg() != attr.fg() {
                    ansi::sgr_fg(&mut self.writer, attr.fg(), depth)?;
                }
                if old.bg() != attr.bg() {
                    ansi::sgr_bg(&mut self.writer, attr.bg(), depth)?;
                }
            }
            Some(old) if attr.style().contains(old.style()) => {
                // Only additions: no flag needs turning off.
                let added = attr.style() & !old.style();
                ansi::sgr_style_on(&mut self.writer, added)?;
                if old.fg() != attr.fg() {
                    ansi::sgr_fg(&mut self.writer, attr.fg(), depth)?;
                }
                if old.bg() != attr.bg() {
                    ansi::sgr_bg(&mut self.writer, attr.bg(), depth)?;
                }
            }
            _ => {
                // A flag must be dropped (or state is unknown): reset and
                // rebuild. Off-codes would be marginally shorter but the
                // reset path is always correct.
                ansi::sgr_reset(&mut self.writer)?;
                ansi::sgr_style_on(&mut self.writer, attr.style())?;
                if attr.fg() != Color::Default {
                    ansi::sgr_fg(&mut self.writer, attr.fg(), depth)?;
                }
                if attr.bg() != Color::Default {
                    ansi::sgr_bg(&mut self.writer, attr.bg(), depth)?;
                }
            }
        }

        self.last_attr = Some(attr);
        Ok(())
    }

    fn write_cell_text(&mut self, cell: &Cell) -> io::Result<()> {
        let s = cell.cluster.as_str();
        if s.is_empty() {
            self.writer.write_all(b" ")
        } else {
            self.writer.write_all(s.as_bytes())
        }
    }

    fn apply_cursor_request(&mut self, req: CursorRequest) -> io::Result<()> {
        if let Some(shape) = req.shape {
            if self.caps.cursor_shapes && self.cursor_shape != Some(shape) {
                ansi::cursor_shape(&mut self.writer, shape.decscusr())?;
                self.cursor_shape = Some(shape);
            }
        }

        if req.visible {
            // Position before revealing, so the cursor never flashes at
            // a stale location.
            let plan = cursor_path::plan((self.cursor_x, self.cursor_y), (req.x, req.y), 0);
            cursor_path::emit(&mut self.writer, plan, (req.x, req.y))?;
            self.cursor_x = Some(req.x);
            self.cursor_y = Some(req.y);
            if self.cursor_visible != Some(true) {
                self.writer.write_all(ansi::CURSOR_SHOW)?;
                self.cursor_visible = Some(true);
            }
        } else if self.cursor_visible != Some(false) {
            self.writer.write_all(ansi::CURSOR_HIDE)?;
            self.cursor_visible = Some(false);
        }

        Ok(())
    }
}

/// One contiguous dirty run on a row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Run {
    y: u16,
    start: u16,
    /// Exclusive end.
    end: u16,
}
