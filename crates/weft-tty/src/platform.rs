#![forbid(unsafe_code)]

//! Platform selection and terminal construction.
//!
//! [`Terminal::open`] is the embedding entry point: it detects
//! capabilities, scores and selects a backend family (honoring the
//! `WEFT_BACKEND` override and any caller hint), enters raw mode with
//! the restore registered on a shared [`CleanupStack`], and returns the
//! wired display/input pair plus the initial size.
//!
//! The terminal is a single owned value. Dropping it restores the
//! terminal; so does a panic or a fatal signal observed by the owner.

use std::io::{self, IsTerminal};
use std::sync::Arc;
use std::time::Duration;

use weft_core::capabilities::{
    backend_override, choose_backend, BackendKind, Capabilities, BACKEND_OVERRIDE_VAR,
};
use weft_core::caps_probe::{probe_capabilities, ProbeConfig};
use weft_core::error::WeftError;
use weft_render::buffer::DisplayBuffer;
use weft_render::fps::FpsLimiter;

use crate::cleanup::{self, CleanupStack};
use crate::display::{AnsiDisplay, AnyDisplay, CursesDisplay, DisplayBackend, TermiosDisplay};
use crate::input::{AnyInput, InputBackend, InputConfig, TtyInput};

/// Options for constructing a platform.
#[derive(Debug, Clone)]
pub struct PlatformOptions {
    /// Preferred backend; `None` selects by score. The `WEFT_BACKEND`
    /// environment override beats both.
    pub backend: Option<BackendKind>,
    /// Capability overrides; `None` detects from the environment.
    pub capabilities: Option<Capabilities>,
    /// Refine detection with device-attribute queries after raw mode.
    pub probe: bool,
    /// Frame budget for buffers created by [`Terminal::create_buffer`].
    pub fps: u32,
    /// Lone-ESC disambiguation timeout.
    pub esc_timeout: Duration,
    /// Surface SIGTSTP/SIGCONT/SIGINT as events.
    pub deliver_signals: bool,
}

impl Default for PlatformOptions {
    fn default() -> Self {
        Self {
            backend: None,
            capabilities: None,
            probe: false,
            fps: 60,
            esc_timeout: Duration::from_millis(50),
            deliver_signals: true,
        }
    }
}

/// The owned terminal: a display backend, an input backend, and the
/// cleanup scope they share.
pub struct Terminal {
    /// Output path.
    pub display: AnyDisplay<io::Stdout>,
    /// Input path.
    pub input: AnyInput,
    kind: BackendKind,
    caps: Capabilities,
    cols: u16,
    rows: u16,
    fps: u32,
    cleanup: Arc<CleanupStack>,
}

impl Terminal {
    /// Open the platform with default options.
    pub fn open() -> Result<Self, WeftError> {
        Self::open_with(PlatformOptions::default())
    }

    /// Open the platform.
    pub fn open_with(options: PlatformOptions) -> Result<Self, WeftError> {
        let is_tty = io::stdin().is_terminal() && io::stdout().is_terminal();

        let mut caps = options
            .capabilities
            .clone()
            .unwrap_or_else(Capabilities::detect);

        let env_value = std::env::var(BACKEND_OVERRIDE_VAR).ok();
        let kind = backend_override(env_value.as_deref())
            .or(options.backend)
            .unwrap_or_else(|| choose_backend(&caps, is_tty));

        if kind != BackendKind::CursesFallback && !is_tty {
            return Err(WeftError::NotATerminal);
        }

        let cleanup = CleanupStack::new();
        cleanup::install_panic_hook(&cleanup);
        #[cfg(unix)]
        cleanup::install_fatal_signal_flags(&cleanup).map_err(WeftError::from_io)?;

        #[cfg(unix)]
        if is_tty {
            enter_raw_mode(&cleanup)?;
        }

        if options.probe && is_tty {
            let result = probe_capabilities(&ProbeConfig::default());
            result.refine(&mut caps);
        }

        let input_config = InputConfig {
            esc_timeout: options.esc_timeout,
            coalesce_window: Duration::from_millis(16),
            deliver_signals: options.deliver_signals,
        };

        let (mut display, mut input) = match kind {
            BackendKind::Ansi => (
                AnyDisplay::Ansi(AnsiDisplay::new(io::stdout(), Arc::clone(&cleanup))),
                AnyInput::Ansi(TtyInput::open(input_config)?),
            ),
            BackendKind::TermiosRaw => (
                AnyDisplay::Termios(TermiosDisplay::new(io::stdout(), Arc::clone(&cleanup))),
                AnyInput::Termios(TtyInput::open(input_config)?),
            ),
            BackendKind::CursesFallback => {
                let input = if is_tty {
                    TtyInput::open(input_config)?
                } else {
                    TtyInput::detached(input_config, 80, 24)
                };
                (
                    AnyDisplay::Curses(CursesDisplay::new(io::stdout(), Arc::clone(&cleanup))),
                    AnyInput::Curses(input),
                )
            }
        };

        display.init(&caps)?;
        input.init(&caps)?;

        let (cols, rows) = input.size();
        tracing::info!(?kind, cols, rows, terminal = %caps.terminal_id, "platform ready");

        Ok(Self {
            display,
            input,
            kind,
            caps,
            cols,
            rows,
            fps: options.fps,
            cleanup,
        })
    }

    /// The selected backend family.
    #[must_use]
    pub fn backend_kind(&self) -> BackendKind {
        self.kind
    }

    /// The negotiated capability set.
    #[must_use]
    pub fn capabilities(&self) -> &Capabilities {
        &self.caps
    }

    /// Initial terminal size in cells.
    #[must_use]
    pub fn size(&self) -> (u16, u16) {
        (self.cols, self.rows)
    }

    /// A display buffer sized to the terminal, paced to the configured
    /// frame rate.
    #[must_use]
    pub fn create_buffer(&self) -> DisplayBuffer {
        DisplayBuffer::with_limiter(self.cols, self.rows, FpsLimiter::new(self.fps))
    }

    /// Whether a fatal signal has been observed; the owner should shut
    /// down promptly when this turns true.
    #[must_use]
    pub fn fatal_requested(&self) -> bool {
        self.cleanup.fatal_requested()
    }

    /// Tear the platform down, restoring the terminal. Idempotent.
    pub fn shutdown(&mut self) -> Result<(), WeftError> {
        self.input.shutdown()?;
        self.display.shutdown()?;
        self.cleanup.run();
        Ok(())
    }
}

impl Drop for Terminal {
    fn drop(&mut self) {
        self.cleanup.run();
    }
}

/// Switch the controlling terminal into raw mode, registering the
/// restore on the cleanup stack (pushed first, so it runs last — after
/// every escape-sequence undo has been flushed).
#[cfg(unix)]
fn enter_raw_mode(cleanup: &Arc<CleanupStack>) -> Result<(), WeftError> {
    use nix::sys::termios;

    let tty = std::fs::File::open("/dev/tty").map_err(|_| WeftError::NotATerminal)?;
    let original = termios::tcgetattr(&tty).map_err(|e| {
        WeftError::FatalIo(io::Error::other(e))
    })?;

    cleanup.push_termios_restore(original.clone());

    let mut raw = original;
    termios::cfmakeraw(&mut raw);
    termios::tcsetattr(&tty, termios::SetArg::TCSAFLUSH, &raw)
        .map_err(|e| WeftError::FatalIo(io::Error::other(e)))?;

    tracing::info!("raw mode entered");
    Ok(())
}
