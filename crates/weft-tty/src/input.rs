#![forbid(unsafe_code)]

//! Input backends: raw terminal bytes to normalized events.
//!
//! [`TtyInput`] polls the tty file descriptor with a deadline, feeds
//! whatever arrives through the escape parser, routes the results
//! through the event coalescer, and serves them from a bounded queue.
//! Resizes arrive via SIGWINCH: a dedicated signal thread forwards a
//! notification through a one-slot channel (storms collapse there), and
//! the authoritative size is re-read with the winsize ioctl when the
//! event is generated.
//!
//! `EINTR` never shortens a caller's deadline, and a lone `ESC` is
//! resolved into a standalone Escape key once the configured timeout
//! passes without further bytes.

use std::collections::VecDeque;
use std::io::Read;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::time::{Duration, Instant};

use weft_core::capabilities::Capabilities;
use weft_core::error::WeftError;
use weft_core::event::{Event, MouseKind, SignalKind};
use weft_core::event_coalescer::{CoalescerConfig, EventCoalescer};
use weft_core::input_parser::{EscapeParser, ParserConfig};

/// Bound on the buffered event queue. When full, the oldest plain mouse
/// move is evicted; moves are the only event class allowed to drop —
/// drags carry selection state and are delivered like any other event.
const MAX_QUEUE: usize = 1024;

/// Read chunk size.
const READ_BUF: usize = 1024;

/// The input contract.
pub trait InputBackend {
    /// Arm signal delivery and resize tracking. Idempotent.
    fn init(&mut self, caps: &Capabilities) -> Result<(), WeftError>;

    /// Wait up to `timeout` for the next event.
    fn poll(&mut self, timeout: Duration) -> Result<Option<Event>, WeftError>;

    /// Whether an event is ready without waiting.
    fn peek(&mut self) -> bool;

    /// Release the input source. Idempotent.
    fn shutdown(&mut self) -> Result<(), WeftError>;
}

/// Input tuning knobs.
#[derive(Debug, Clone, Copy)]
pub struct InputConfig {
    /// Lone-ESC disambiguation timeout.
    pub esc_timeout: Duration,
    /// Coalescing window for plain mouse moves and resizes.
    pub coalesce_window: Duration,
    /// Surface SIGTSTP/SIGCONT/SIGINT as [`Event::Signal`].
    pub deliver_signals: bool,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            esc_timeout: Duration::from_millis(50),
            coalesce_window: Duration::from_millis(16),
            deliver_signals: true,
        }
    }
}

/// Flags set from signal-handler context; the poll loop drains them.
#[derive(Debug, Default)]
struct SignalFlags {
    interrupt: Arc<AtomicBool>,
    suspend: Arc<AtomicBool>,
    resume: Arc<AtomicBool>,
}

/// SIGWINCH listener: a signal-hook iterator thread forwarding into a
/// one-slot channel. Dropping the guard stops the thread.
#[cfg(unix)]
#[derive(Debug)]
struct ResizeSignalGuard {
    handle: signal_hook::iterator::Handle,
    thread: Option<std::thread::JoinHandle<()>>,
}

#[cfg(unix)]
impl ResizeSignalGuard {
    fn new(tx: mpsc::SyncSender<()>) -> std::io::Result<Self> {
        use signal_hook::consts::signal::SIGWINCH;
        use signal_hook::iterator::Signals;

        let mut signals = Signals::new([SIGWINCH])?;
        let handle = signals.handle();
        let thread = std::thread::Builder::new()
            .name("weft-winch".into())
            .spawn(move || {
                for _ in signals.forever() {
                    // One pending notification is enough: the receiver
                    // asks the kernel for the real size anyway.
                    let _ = tx.try_send(());
                }
            })?;

        Ok(Self {
            handle,
            thread: Some(thread),
        })
    }
}

#[cfg(unix)]
impl Drop for ResizeSignalGuard {
    fn drop(&mut self) {
        self.handle.close();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

/// Polling input backend over the controlling terminal (or any reader).
pub struct TtyInput {
    config: InputConfig,
    reader: Option<std::fs::File>,
    /// True when reading the real controlling terminal.
    live: bool,
    parser: EscapeParser,
    coalescer: EventCoalescer,
    queue: VecDeque<Event>,
    /// When the currently pending escape prefix started.
    esc_since: Option<Instant>,
    #[cfg(unix)]
    resize_rx: Option<mpsc::Receiver<()>>,
    #[cfg(unix)]
    _resize_guard: Option<ResizeSignalGuard>,
    signals: Option<SignalFlags>,
    cols: u16,
    rows: u16,
    initialized: bool,
}

impl TtyInput {
    /// Open the controlling terminal for input.
    #[cfg(unix)]
    pub fn open(config: InputConfig) -> Result<Self, WeftError> {
        let reader = std::fs::File::open("/dev/tty").map_err(|_| WeftError::NotATerminal)?;
        let (cols, rows) = read_winsize(&reader)
            .or_else(weft_core::capabilities::size_hint_from_env)
            .unwrap_or((80, 24));

        Ok(Self::build(config, Some(reader), true, cols, rows))
    }

    /// Opening the controlling terminal is a Unix facility; elsewhere
    /// the platform falls back to a detached backend.
    #[cfg(not(unix))]
    pub fn open(_config: InputConfig) -> Result<Self, WeftError> {
        Err(WeftError::NotATerminal)
    }

    /// Headless backend reading from an arbitrary file (used by tests
    /// and for driving the parser from recorded input).
    pub fn from_reader(config: InputConfig, reader: std::fs::File, cols: u16, rows: u16) -> Self {
        Self::build(config, Some(reader), false, cols, rows)
    }

    /// Backend with no input source at all.
    pub fn detached(config: InputConfig, cols: u16, rows: u16) -> Self {
        Self::build(config, None, false, cols, rows)
    }

    fn build(
        config: InputConfig,
        reader: Option<std::fs::File>,
        live: bool,
        cols: u16,
        rows: u16,
    ) -> Self {
        Self {
            config,
            reader,
            live,
            parser: EscapeParser::with_config(ParserConfig {
                esc_timeout: config.esc_timeout,
            }),
            coalescer: EventCoalescer::with_config(CoalescerConfig {
                window: config.coalesce_window,
            }),
            queue: VecDeque::new(),
            esc_since: None,
            #[cfg(unix)]
            resize_rx: None,
            #[cfg(unix)]
            _resize_guard: None,
            signals: None,
            cols,
            rows,
            initialized: false,
        }
    }

    /// Last known terminal size.
    #[must_use]
    pub fn size(&self) -> (u16, u16) {
        (self.cols, self.rows)
    }

    // ── Queue plumbing ───────────────────────────────────────────────────

    fn push_queue(&mut self, event: Event) {
        if self.queue.len() >= MAX_QUEUE {
            let droppable =
                |e: &Event| matches!(e, Event::Mouse(m) if m.kind == MouseKind::Move);
            if let Some(pos) = self.queue.iter().position(droppable) {
                self.queue.remove(pos);
            } else if droppable(&event) {
                return;
            }
        }
        self.queue.push_back(event);
    }

    fn route(&mut self, event: Event, now: Instant) {
        for ready in self.coalescer.push(event, now) {
            self.push_queue(ready);
        }
    }

    fn drain_coalescer_due(&mut self, now: Instant) {
        for ready in self.coalescer.flush_due(now) {
            self.push_queue(ready);
        }
    }

    fn drain_signal_flags(&mut self) {
        let Some(flags) = &self.signals else {
            return;
        };
        let interrupt = flags.interrupt.swap(false, Ordering::SeqCst);
        let suspend = flags.suspend.swap(false, Ordering::SeqCst);
        let resume = flags.resume.swap(false, Ordering::SeqCst);
        if interrupt {
            self.push_queue(Event::Signal(SignalKind::Interrupt));
        }
        if suspend {
            self.push_queue(Event::Signal(SignalKind::Suspend));
        }
        if resume {
            self.push_queue(Event::Signal(SignalKind::Continue));
        }
    }

    #[cfg(unix)]
    fn drain_resize(&mut self, now: Instant) {
        let mut saw = false;
        if let Some(rx) = &self.resize_rx {
            while rx.try_recv().is_ok() {
                saw = true;
            }
        }
        if saw {
            if let Some(reader) = &self.reader {
                if let Some((cols, rows)) = read_winsize(reader) {
                    self.cols = cols;
                    self.rows = rows;
                }
            }
            let (cols, rows) = (self.cols, self.rows);
            self.note_resize(cols, rows, now);
        }
    }

    #[cfg(not(unix))]
    fn drain_resize(&mut self, _now: Instant) {}

    /// Record a resize observation; coalescing applies.
    fn note_resize(&mut self, cols: u16, rows: u16, now: Instant) {
        self.cols = cols;
        self.rows = rows;
        self.route(Event::Resize { cols, rows }, now);
    }

    fn feed_bytes(&mut self, bytes: &[u8], now: Instant) {
        let events = self.parser.parse(bytes);
        for event in events {
            self.route(event, now);
        }
        self.esc_since = if self.parser.has_partial() {
            Some(now)
        } else {
            None
        };
    }

    fn idle_flush_if_due(&mut self, now: Instant) {
        let Some(since) = self.esc_since else {
            return;
        };
        if now.duration_since(since) >= self.parser.esc_timeout() {
            if let Some(event) = self.parser.idle_flush() {
                self.route(event, now);
            }
            self.esc_since = None;
        }
    }

    /// Read whatever is available on the fd.
    fn drain_available(&mut self, now: Instant) -> Result<(), WeftError> {
        let Some(reader) = &mut self.reader else {
            return Ok(());
        };
        let mut buf = [0u8; READ_BUF];
        match reader.read(&mut buf) {
            Ok(0) => {
                // EOF: stop polling a dead source.
                self.reader = None;
                Ok(())
            }
            Ok(n) => {
                let bytes = buf[..n].to_vec();
                self.feed_bytes(&bytes, now);
                Ok(())
            }
            Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => Ok(()),
            Err(ref e) if e.kind() == std::io::ErrorKind::Interrupted => Ok(()),
            Err(e) => Err(WeftError::from_io(e)),
        }
    }

    /// Wait on the fd until `wait_until`. Returns whether it became
    /// readable. `EINTR` is absorbed; the caller's deadline math is
    /// unaffected.
    #[cfg(unix)]
    fn wait_readable(&mut self, wait_until: Instant) -> Result<bool, WeftError> {
        use std::os::fd::AsFd;

        let Some(reader) = &self.reader else {
            let now = Instant::now();
            if wait_until > now {
                std::thread::sleep(wait_until - now);
            }
            return Ok(false);
        };

        let now = Instant::now();
        let remaining = wait_until.saturating_duration_since(now);
        let ms: u16 = remaining.as_millis().try_into().unwrap_or(u16::MAX);

        let mut fds = [nix::poll::PollFd::new(
            reader.as_fd(),
            nix::poll::PollFlags::POLLIN,
        )];
        match nix::poll::poll(&mut fds, nix::poll::PollTimeout::from(ms)) {
            Ok(n) => Ok(n > 0),
            Err(nix::errno::Errno::EINTR) => Ok(false),
            Err(e) => Err(WeftError::FatalIo(std::io::Error::other(e))),
        }
    }

    #[cfg(not(unix))]
    fn wait_readable(&mut self, wait_until: Instant) -> Result<bool, WeftError> {
        let now = Instant::now();
        if wait_until > now {
            std::thread::sleep(wait_until - now);
        }
        Ok(false)
    }
}

impl InputBackend for TtyInput {
    fn init(&mut self, _caps: &Capabilities) -> Result<(), WeftError> {
        if self.initialized {
            return Ok(());
        }
        self.initialized = true;

        #[cfg(unix)]
        if self.live {
            let (tx, rx) = mpsc::sync_channel(1);
            match ResizeSignalGuard::new(tx) {
                Ok(guard) => {
                    self._resize_guard = Some(guard);
                    self.resize_rx = Some(rx);
                }
                Err(err) => {
                    tracing::warn!(%err, "resize signal tracking unavailable");
                }
            }

            if self.config.deliver_signals {
                use signal_hook::consts::signal::{SIGCONT, SIGINT, SIGTSTP};
                let flags = SignalFlags::default();
                signal_hook::flag::register(SIGINT, Arc::clone(&flags.interrupt))
                    .map_err(WeftError::from_io)?;
                signal_hook::flag::register(SIGTSTP, Arc::clone(&flags.suspend))
                    .map_err(WeftError::from_io)?;
                signal_hook::flag::register(SIGCONT, Arc::clone(&flags.resume))
                    .map_err(WeftError::from_io)?;
                self.signals = Some(flags);
            }
        }

        Ok(())
    }

    fn poll(&mut self, timeout: Duration) -> Result<Option<Event>, WeftError> {
        let deadline = Instant::now() + timeout;

        loop {
            let now = Instant::now();
            self.drain_signal_flags();
            self.drain_resize(now);
            self.drain_coalescer_due(now);
            self.idle_flush_if_due(now);

            if let Some(event) = self.queue.pop_front() {
                return Ok(Some(event));
            }

            if now >= deadline {
                return Ok(None);
            }

            // Wake early for whichever comes first: the caller's
            // deadline, a pending escape prefix, or a held coalesced
            // event.
            let mut wait_until = deadline;
            if let Some(since) = self.esc_since {
                wait_until = wait_until.min(since + self.parser.esc_timeout());
            }
            if let Some(due) = self.coalescer.next_deadline() {
                wait_until = wait_until.min(due);
            }

            if self.wait_readable(wait_until)? {
                self.drain_available(Instant::now())?;
            }
        }
    }

    fn peek(&mut self) -> bool {
        if !self.queue.is_empty() {
            return true;
        }
        match self.poll(Duration::ZERO) {
            Ok(Some(event)) => {
                // Probing must not consume; requeue at the front.
                self.queue.push_front(event);
                true
            }
            _ => false,
        }
    }

    fn shutdown(&mut self) -> Result<(), WeftError> {
        self.reader = None;
        #[cfg(unix)]
        {
            self._resize_guard = None;
            self.resize_rx = None;
        }
        self.signals = None;
        Ok(())
    }
}

#[cfg(unix)]
fn read_winsize(fd: &std::fs::File) -> Option<(u16, u16)> {
    match rustix::termios::tcgetwinsize(fd) {
        Ok(ws) if ws.ws_col > 0 && ws.ws_row > 0 => Some((ws.ws_col, ws.ws_row)),
        _ => None,
    }
}

/// Tagged input backend matching the display selection.
pub enum AnyInput {
    /// Paired with the ANSI display.
    Ansi(TtyInput),
    /// Paired with the raw-termios display.
    Termios(TtyInput),
    /// Paired with the fallback display (no mouse sequences will ever
    /// arrive because the display never enables them).
    Curses(TtyInput),
}

impl AnyInput {
    fn inner(&mut self) -> &mut TtyInput {
        match self {
            Self::Ansi(i) | Self::Termios(i) | Self::Curses(i) => i,
        }
    }

    /// Last known terminal size.
    #[must_use]
    pub fn size(&self) -> (u16, u16) {
        match self {
            Self::Ansi(i) | Self::Termios(i) | Self::Curses(i) => i.size(),
        }
    }
}

impl InputBackend for AnyInput {
    fn init(&mut self, caps: &Capabilities) -> Result<(), WeftError> {
        self.inner().init(caps)
    }

    fn poll(&mut self, timeout: Duration) -> Result<Option<Event>, WeftError> {
        self.inner().poll(timeout)
    }

    fn peek(&mut self) -> bool {
        self.inner().peek()
    }

    fn shutdown(&mut self) -> Result<(), WeftError> {
        self.inner().shutdown()
    }
}
