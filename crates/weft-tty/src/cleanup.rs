#![forbid(unsafe_code)]

//! Guaranteed terminal restoration.
//!
//! [`CleanupStack`] holds the undo actions registered during backend
//! initialization (leave the alternate screen, show the cursor, reset
//! SGR, disable mouse and bracketed paste, restore termios) and replays
//! them in LIFO order exactly once, on whichever exit path comes first:
//!
//! - normal shutdown,
//! - uncaught panic (via the installed hook),
//! - a fatal signal, observed as an atomic flag by the owning thread.
//!
//! Signal handlers never run cleanup themselves: they only set a flag
//! (registered through `signal_hook::flag`), and the owner polls it in
//! `poll`/`flush`. The drain is guarded by an atomic swap, so re-entry
//! after partial execution is a no-op.

use std::io::{self, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock, Weak};

/// One undo step.
#[derive(Debug, Clone)]
enum UndoAction {
    /// Write fixed bytes to the terminal.
    Emit(Vec<u8>),
    /// Restore the saved termios state.
    #[cfg(unix)]
    RestoreTermios(nix::sys::termios::Termios),
}

/// LIFO undo stack, drained at most once.
#[derive(Debug, Default)]
pub struct CleanupStack {
    actions: Mutex<Vec<UndoAction>>,
    ran: AtomicBool,
    fatal: Arc<AtomicBool>,
}

impl CleanupStack {
    /// Create an empty stack behind an `Arc` so backends, the panic
    /// hook, and the owner can share it.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Register an undo step that writes fixed bytes.
    ///
    /// Push order matters: the last pushed action runs first.
    pub fn push_bytes(&self, bytes: impl Into<Vec<u8>>) {
        if let Ok(mut actions) = self.actions.lock() {
            actions.push(UndoAction::Emit(bytes.into()));
        }
    }

    /// Register the termios state to restore. Restoration reopens
    /// `/dev/tty`, so the action stays valid however the original fd
    /// was obtained.
    #[cfg(unix)]
    pub fn push_termios_restore(&self, termios: nix::sys::termios::Termios) {
        if let Ok(mut actions) = self.actions.lock() {
            actions.push(UndoAction::RestoreTermios(termios));
        }
    }

    /// The flag fatal-signal handlers set. The owner polls
    /// [`CleanupStack::fatal_requested`] from `poll`/`flush`.
    #[must_use]
    pub fn fatal_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.fatal)
    }

    /// Whether a fatal signal has been observed.
    #[must_use]
    pub fn fatal_requested(&self) -> bool {
        self.fatal.load(Ordering::SeqCst)
    }

    /// Whether the stack has already been drained.
    #[must_use]
    pub fn has_run(&self) -> bool {
        self.ran.load(Ordering::SeqCst)
    }

    /// Drain the stack into the real terminal.
    pub fn run(&self) {
        let Some(actions) = self.take_actions() else {
            return;
        };

        #[cfg(unix)]
        let mut out: Box<dyn Write> = match std::fs::OpenOptions::new().write(true).open("/dev/tty")
        {
            Ok(tty) => Box::new(tty),
            Err(_) => Box::new(io::stdout()),
        };
        #[cfg(not(unix))]
        let mut out: Box<dyn Write> = Box::new(io::stdout());

        Self::replay(actions, &mut out);
        let _ = out.flush();
        tracing::info!("terminal state restored");
    }

    /// Drain the stack into an arbitrary writer. Byte actions are
    /// written; termios restoration still goes to the real terminal.
    ///
    /// Like [`CleanupStack::run`], at most one drain ever happens.
    pub fn run_to<W: Write>(&self, w: &mut W) {
        let Some(actions) = self.take_actions() else {
            return;
        };
        Self::replay(actions, w);
        let _ = w.flush();
    }

    fn take_actions(&self) -> Option<Vec<UndoAction>> {
        if self.ran.swap(true, Ordering::SeqCst) {
            return None;
        }
        let actions = match self.actions.lock() {
            Ok(mut guard) => std::mem::take(&mut *guard),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        };
        Some(actions)
    }

    fn replay<W: Write + ?Sized>(actions: Vec<UndoAction>, w: &mut W) {
        for action in actions.into_iter().rev() {
            match action {
                UndoAction::Emit(bytes) => {
                    let _ = w.write_all(&bytes);
                }
                #[cfg(unix)]
                UndoAction::RestoreTermios(termios) => {
                    // Flush pending escape bytes before the mode flips back.
                    let _ = w.flush();
                    if let Ok(tty) = std::fs::File::open("/dev/tty") {
                        let _ = nix::sys::termios::tcsetattr(
                            &tty,
                            nix::sys::termios::SetArg::TCSAFLUSH,
                            &termios,
                        );
                    }
                }
            }
        }
    }
}

// ── Panic hook ───────────────────────────────────────────────────────────

static HOOK_INSTALLED: OnceLock<()> = OnceLock::new();
static HOOK_STACKS: Mutex<Vec<Weak<CleanupStack>>> = Mutex::new(Vec::new());

/// Register a stack with the process-wide panic hook, installing the
/// hook on first use. The hook drains every live registered stack and
/// then defers to the previous hook.
pub fn install_panic_hook(stack: &Arc<CleanupStack>) {
    if let Ok(mut stacks) = HOOK_STACKS.lock() {
        stacks.retain(|weak| weak.strong_count() > 0);
        stacks.push(Arc::downgrade(stack));
    }

    HOOK_INSTALLED.get_or_init(|| {
        let previous = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            if let Ok(stacks) = HOOK_STACKS.lock() {
                for weak in stacks.iter() {
                    if let Some(stack) = weak.upgrade() {
                        stack.run();
                    }
                }
            }
            previous(info);
        }));
    });
}

/// Register the fatal signals to set the stack's flag. Handlers do no
/// other work; the owning thread observes the flag and shuts down.
#[cfg(unix)]
pub fn install_fatal_signal_flags(stack: &CleanupStack) -> io::Result<()> {
    use signal_hook::consts::signal::{SIGHUP, SIGINT, SIGQUIT, SIGTERM};

    let flag = stack.fatal_flag();
    for sig in [SIGINT, SIGTERM, SIGHUP, SIGQUIT] {
        signal_hook::flag::register(sig, Arc::clone(&flag))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drains_in_lifo_order() {
        let stack = CleanupStack::new();
        stack.push_bytes(b"FIRST".to_vec());
        stack.push_bytes(b"SECOND".to_vec());
        stack.push_bytes(b"THIRD".to_vec());

        let mut out = Vec::new();
        stack.run_to(&mut out);
        assert_eq!(out, b"THIRDSECONDFIRST");
    }

    #[test]
    fn drains_at_most_once() {
        let stack = CleanupStack::new();
        stack.push_bytes(b"\x1b[?1049l".to_vec());
        stack.push_bytes(b"\x1b[?25h".to_vec());

        let mut first = Vec::new();
        stack.run_to(&mut first);
        assert!(!first.is_empty());
        assert!(stack.has_run());

        // Re-entry after partial or full execution is a no-op.
        let mut second = Vec::new();
        stack.run_to(&mut second);
        assert!(second.is_empty());
    }

    #[test]
    fn full_undo_sequence_appears_exactly_once() {
        // Simulate an init that registered the whole undo set, then a
        // fatal signal observed by the owner: the cumulative stream must
        // contain each undo sequence exactly once.
        let stack = CleanupStack::new();
        stack.push_bytes(b"\x1b[?1049l".to_vec()); // leave alt screen
        stack.push_bytes(b"\x1b[?25h".to_vec()); // show cursor
        stack.push_bytes(b"\x1b[0m".to_vec()); // reset SGR
        stack.push_bytes(b"\x1b[?1000;1002;1006l".to_vec()); // mouse off
        stack.push_bytes(b"\x1b[?2004l".to_vec()); // paste off

        stack.fatal_flag().store(true, Ordering::SeqCst);
        assert!(stack.fatal_requested());

        let mut stream = Vec::new();
        stack.run_to(&mut stream);
        stack.run_to(&mut stream); // second observation of the flag
        stack.run_to(&mut stream);

        for needle in [
            b"\x1b[?1049l".as_slice(),
            b"\x1b[?25h",
            b"\x1b[0m",
            b"\x1b[?1000;1002;1006l",
            b"\x1b[?2004l",
        ] {
            let count = stream.windows(needle.len()).filter(|w| *w == needle).count();
            assert_eq!(count, 1, "sequence {needle:?} seen {count} times");
        }

        // Paste off runs first, alt-screen leave last.
        let paste = stream
            .windows(8)
            .position(|w| w == b"\x1b[?2004l")
            .unwrap();
        let alt = stream
            .windows(8)
            .position(|w| w == b"\x1b[?1049l")
            .unwrap();
        assert!(paste < alt);
    }

    #[test]
    fn fatal_flag_starts_clear() {
        let stack = CleanupStack::new();
        assert!(!stack.fatal_requested());
    }
}
