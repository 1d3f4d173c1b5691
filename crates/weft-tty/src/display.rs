#![forbid(unsafe_code)]

//! Display backends: the output contract realized three ways.
//!
//! - [`AnsiDisplay`] drives modern terminals with the full escape
//!   repertoire the capability set allows.
//! - [`TermiosDisplay`] is the conservative Unix path: same
//!   reconciliation, but capped at 16 colors and without the alternate
//!   screen or title changes.
//! - [`CursesDisplay`] is the last resort for terminals we know least
//!   about: whole dirty rows are repainted, no optional modes are
//!   touched, and mouse reporting stays off.
//!
//! All three register their undo actions with a shared [`CleanupStack`]
//! during `init`, so the terminal is restored on any exit path.

use std::io::Write;
use std::sync::Arc;

use weft_core::capabilities::{Capabilities, ColorDepth, MouseProtocol};
use weft_core::error::WeftError;
use weft_render::buffer::DisplayBuffer;
use weft_render::presenter::{CursorRequest, CursorShape, PresentStats, Presenter};
use weft_render::ansi;

use crate::cleanup::CleanupStack;
use crate::recovery::RetryPolicy;

/// Result of a flush call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushOutcome {
    /// The frame was written.
    Flushed(PresentStats),
    /// Too soon for the frame budget; damage rides to the next tick.
    Throttled,
    /// A frame scope is open; nothing may be observed yet.
    Deferred,
}

/// The output contract.
pub trait DisplayBackend {
    /// Enter the terminal modes the capability set allows and register
    /// their undo actions. Must be called exactly once before `flush`.
    fn init(&mut self, caps: &Capabilities) -> Result<(), WeftError>;

    /// Reconcile the buffer into the terminal, honoring the buffer's
    /// frame limiter and frame scopes.
    fn flush(&mut self, buf: &mut DisplayBuffer) -> Result<FlushOutcome, WeftError>;

    /// Request cursor placement for the end of the next flush.
    fn set_cursor(&mut self, x: u16, y: u16, visible: bool, shape: Option<CursorShape>);

    /// Set the terminal title when supported; silently ignored otherwise.
    fn set_title(&mut self, title: &str) -> Result<(), WeftError>;

    /// Idempotent inverse of `init`.
    fn shutdown(&mut self) -> Result<(), WeftError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    New,
    Ready,
    Down,
}

/// Full-featured escape-sequence backend.
pub struct AnsiDisplay<W: Write> {
    presenter: Presenter<W>,
    cleanup: Arc<CleanupStack>,
    caps: Capabilities,
    cursor_req: Option<CursorRequest>,
    retry: RetryPolicy,
    phase: Phase,
}

impl<W: Write> AnsiDisplay<W> {
    /// Create a backend over a writer. `init` performs the terminal
    /// mode changes.
    pub fn new(writer: W, cleanup: Arc<CleanupStack>) -> Self {
        Self {
            presenter: Presenter::new(writer, Capabilities::basic()),
            cleanup,
            caps: Capabilities::basic(),
            cursor_req: None,
            retry: RetryPolicy::default(),
            phase: Phase::New,
        }
    }

    /// The capability set negotiated at init.
    pub fn capabilities(&self) -> &Capabilities {
        &self.caps
    }

    /// Renegotiate down to a lower color depth after the terminal
    /// rejected richer output.
    pub fn downgrade_colors(&mut self, depth: ColorDepth) {
        let caps = self.caps.downgraded_to(depth);
        tracing::warn!(?depth, "downgrading color output");
        self.caps = caps.clone();
        self.presenter.set_capabilities(caps);
    }

    fn init_with(&mut self, caps: Capabilities, full_row_repaint: bool) -> Result<(), WeftError> {
        if self.phase != Phase::New {
            return Ok(());
        }

        self.presenter.set_capabilities(caps.clone());
        self.presenter.set_full_row_repaint(full_row_repaint);

        // Enable order is mirrored by cleanup push order: the last
        // pushed undo runs first, so teardown is the exact reverse.
        if caps.alt_screen {
            self.presenter.raw_write(ansi::ALT_SCREEN_ENTER).map_err(WeftError::from_io)?;
            self.cleanup.push_bytes(ansi::ALT_SCREEN_LEAVE);
        }

        self.presenter.raw_write(ansi::CURSOR_HIDE).map_err(WeftError::from_io)?;
        self.cleanup.push_bytes(ansi::CURSOR_SHOW);

        self.presenter.raw_write(ansi::SGR_RESET).map_err(WeftError::from_io)?;
        self.cleanup.push_bytes(ansi::SGR_RESET);

        if let Some(seq) = ansi::mouse_enable(caps.mouse) {
            self.presenter.raw_write(seq).map_err(WeftError::from_io)?;
            if let Some(off) = ansi::mouse_disable(caps.mouse) {
                self.cleanup.push_bytes(off);
            }
        }

        if caps.bracketed_paste {
            self.presenter.raw_write(ansi::BRACKETED_PASTE_ENABLE).map_err(WeftError::from_io)?;
            self.cleanup.push_bytes(ansi::BRACKETED_PASTE_DISABLE);
        }

        self.presenter.raw_write(ansi::CLEAR_SCREEN).map_err(WeftError::from_io)?;
        self.presenter.raw_write(ansi::CURSOR_HOME).map_err(WeftError::from_io)?;
        self.presenter.raw_flush().map_err(WeftError::from_io)?;
        self.presenter.invalidate();

        tracing::info!(
            terminal = %caps.terminal_id,
            depth = ?caps.color_depth,
            mouse = ?caps.mouse,
            "display backend initialized"
        );

        self.caps = caps;
        self.phase = Phase::Ready;
        Ok(())
    }

    fn flush_impl(&mut self, buf: &mut DisplayBuffer) -> Result<FlushOutcome, WeftError> {
        if self.phase != Phase::Ready {
            return Err(WeftError::FatalIo(std::io::Error::other(
                "flush on uninitialized or shut-down backend",
            )));
        }
        if self.cleanup.fatal_requested() {
            self.cleanup.run();
            self.phase = Phase::Down;
            return Err(WeftError::FatalIo(std::io::Error::other(
                "fatal signal observed",
            )));
        }

        if buf.frame_open() {
            return Ok(FlushOutcome::Deferred);
        }
        if !buf.limiter().ready() {
            return Ok(FlushOutcome::Throttled);
        }

        let stats = match self.presenter.present(buf, self.cursor_req) {
            Ok(stats) => stats,
            Err(err)
                if matches!(
                    err.kind(),
                    std::io::ErrorKind::Interrupted | std::io::ErrorKind::WouldBlock
                ) =>
            {
                // The frame is composed in the write buffer; drive the
                // remainder out with backoff instead of abandoning it
                // mid-sequence.
                let presenter = &mut self.presenter;
                self.retry
                    .run(|| presenter.raw_flush().map_err(WeftError::from_io))?;
                PresentStats::default()
            }
            Err(err) => return Err(WeftError::from_io(err)),
        };
        buf.limiter_mut().mark_frame();
        Ok(FlushOutcome::Flushed(stats))
    }

    fn shutdown_impl(&mut self) -> Result<(), WeftError> {
        if self.phase == Phase::Down {
            return Ok(());
        }
        self.phase = Phase::Down;
        self.cleanup.run();
        Ok(())
    }
}

impl<W: Write> DisplayBackend for AnsiDisplay<W> {
    fn init(&mut self, caps: &Capabilities) -> Result<(), WeftError> {
        self.init_with(caps.clone(), false)
    }

    fn flush(&mut self, buf: &mut DisplayBuffer) -> Result<FlushOutcome, WeftError> {
        self.flush_impl(buf)
    }

    fn set_cursor(&mut self, x: u16, y: u16, visible: bool, shape: Option<CursorShape>) {
        self.cursor_req = Some(CursorRequest {
            x,
            y,
            visible,
            shape,
        });
    }

    fn set_title(&mut self, title: &str) -> Result<(), WeftError> {
        if !self.caps.title {
            return Ok(());
        }
        self.presenter
            .raw_write_title(title)
            .map_err(WeftError::from_io)
    }

    fn shutdown(&mut self) -> Result<(), WeftError> {
        self.shutdown_impl()
    }
}

/// Conservative raw-termios backend: the same reconciliation engine
/// against a restricted VT subset.
pub struct TermiosDisplay<W: Write> {
    inner: AnsiDisplay<W>,
}

impl<W: Write> TermiosDisplay<W> {
    /// Create a termios backend over a writer.
    pub fn new(writer: W, cleanup: Arc<CleanupStack>) -> Self {
        Self {
            inner: AnsiDisplay::new(writer, cleanup),
        }
    }

    fn restrict(caps: &Capabilities) -> Capabilities {
        let mut caps = caps.downgraded_to(ColorDepth::Ansi16);
        caps.alt_screen = false;
        caps.title = false;
        caps.cursor_shapes = false;
        caps
    }
}

impl<W: Write> DisplayBackend for TermiosDisplay<W> {
    fn init(&mut self, caps: &Capabilities) -> Result<(), WeftError> {
        self.inner.init_with(Self::restrict(caps), false)
    }

    fn flush(&mut self, buf: &mut DisplayBuffer) -> Result<FlushOutcome, WeftError> {
        self.inner.flush_impl(buf)
    }

    fn set_cursor(&mut self, x: u16, y: u16, visible: bool, _shape: Option<CursorShape>) {
        // Shapes are outside the restricted subset.
        self.inner.set_cursor(x, y, visible, None);
    }

    fn set_title(&mut self, _title: &str) -> Result<(), WeftError> {
        Ok(())
    }

    fn shutdown(&mut self) -> Result<(), WeftError> {
        self.inner.shutdown_impl()
    }
}

/// Last-resort backend: whole-dirty-row repaints, no optional modes,
/// and no mouse. Tolerates not having a terminal at all.
pub struct CursesDisplay<W: Write> {
    inner: AnsiDisplay<W>,
}

impl<W: Write> CursesDisplay<W> {
    /// Create a fallback backend over a writer.
    pub fn new(writer: W, cleanup: Arc<CleanupStack>) -> Self {
        Self {
            inner: AnsiDisplay::new(writer, cleanup),
        }
    }

    fn restrict(caps: &Capabilities) -> Capabilities {
        let mut caps = caps.downgraded_to(ColorDepth::Ansi16);
        caps.alt_screen = false;
        caps.title = false;
        caps.cursor_shapes = false;
        caps.bracketed_paste = false;
        caps.mouse = MouseProtocol::None;
        caps
    }
}

impl<W: Write> DisplayBackend for CursesDisplay<W> {
    fn init(&mut self, caps: &Capabilities) -> Result<(), WeftError> {
        self.inner.init_with(Self::restrict(caps), true)
    }

    fn flush(&mut self, buf: &mut DisplayBuffer) -> Result<FlushOutcome, WeftError> {
        self.inner.flush_impl(buf)
    }

    fn set_cursor(&mut self, x: u16, y: u16, visible: bool, _shape: Option<CursorShape>) {
        self.inner.set_cursor(x, y, visible, None);
    }

    fn set_title(&mut self, _title: &str) -> Result<(), WeftError> {
        Ok(())
    }

    fn shutdown(&mut self) -> Result<(), WeftError> {
        self.inner.shutdown_impl()
    }
}

/// Tagged backend selected at runtime.
///
/// Static dispatch everywhere a backend is known at construction; this
/// enum is the one seam where the fallback chain needs to swap
/// implementations behind a single type.
pub enum AnyDisplay<W: Write> {
    /// Full escape-sequence backend.
    Ansi(AnsiDisplay<W>),
    /// Restricted raw-termios backend.
    Termios(TermiosDisplay<W>),
    /// Last-resort fallback.
    Curses(CursesDisplay<W>),
}

impl<W: Write> DisplayBackend for AnyDisplay<W> {
    fn init(&mut self, caps: &Capabilities) -> Result<(), WeftError> {
        match self {
            Self::Ansi(d) => d.init(caps),
            Self::Termios(d) => d.init(caps),
            Self::Curses(d) => d.init(caps),
        }
    }

    fn flush(&mut self, buf: &mut DisplayBuffer) -> Result<FlushOutcome, WeftError> {
        match self {
            Self::Ansi(d) => d.flush(buf),
            Self::Termios(d) => d.flush(buf),
            Self::Curses(d) => d.flush(buf),
        }
    }

    fn set_cursor(&mut self, x: u16, y: u16, visible: bool, shape: Option<CursorShape>) {
        match self {
            Self::Ansi(d) => d.set_cursor(x, y, visible, shape),
            Self::Termios(d) => d.set_cursor(x, y, visible, shape),
            Self::Curses(d) => d.set_cursor(x, y, visible, shape),
        }
    }

    fn set_title(&mut self, title: &str) -> Result<(), WeftError> {
        match self {
            Self::Ansi(d) => d.set_title(title),
            Self::Termios(d) => d.set_title(title),
            Self::Curses(d) => d.set_title(title),
        }
    }

    fn shutdown(&mut self) -> Result<(), WeftError> {
        match self {
            Self::Ansi(d) => d.shutdown(),
            Self::Termios(d) => d.shutdown(),
            Self::Curses(d) => d.shutdown(),
        }
    }
}
