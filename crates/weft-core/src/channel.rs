#![forbid(unsafe_code)]

//! Bounded event channel for hosts that poll input on a second thread.
//!
//! The core itself is single-threaded; when an embedder wants a reader
//! thread, this channel is the seam. It is a thin wrapper over a
//! bounded MPSC queue with one policy added: when the consumer falls
//! behind and the channel fills, plain mouse moves are the only event
//! class that may be dropped — everything else, drags included, applies
//! backpressure.

use std::sync::mpsc;

use crate::event::{Event, MouseKind};

/// Sending half; clone freely across producer threads.
#[derive(Debug, Clone)]
pub struct EventSender {
    tx: mpsc::SyncSender<Event>,
}

/// Receiving half; exactly one consumer.
#[derive(Debug)]
pub struct EventReceiver {
    rx: mpsc::Receiver<Event>,
}

/// Delivery outcome for a send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// The event was enqueued.
    Delivered,
    /// A plain mouse move was dropped because the queue was full.
    DroppedMove,
    /// The receiver is gone.
    Disconnected,
}

/// Create a bounded event channel.
#[must_use]
pub fn event_channel(capacity: usize) -> (EventSender, EventReceiver) {
    let (tx, rx) = mpsc::sync_channel(capacity.max(1));
    (EventSender { tx }, EventReceiver { rx })
}

impl EventSender {
    /// Send an event.
    ///
    /// A plain mouse move is dropped when the queue is full; any other
    /// event blocks until the consumer makes room.
    pub fn send(&self, event: Event) -> SendOutcome {
        let droppable = matches!(
            &event,
            Event::Mouse(m) if m.kind == MouseKind::Move
        );

        if droppable {
            match self.tx.try_send(event) {
                Ok(()) => SendOutcome::Delivered,
                Err(mpsc::TrySendError::Full(_)) => SendOutcome::DroppedMove,
                Err(mpsc::TrySendError::Disconnected(_)) => SendOutcome::Disconnected,
            }
        } else {
            match self.tx.send(event) {
                Ok(()) => SendOutcome::Delivered,
                Err(_) => SendOutcome::Disconnected,
            }
        }
    }
}

impl EventReceiver {
    /// Wait up to `timeout` for the next event.
    #[must_use]
    pub fn recv_timeout(&self, timeout: std::time::Duration) -> Option<Event> {
        self.rx.recv_timeout(timeout).ok()
    }

    /// Take an event if one is ready.
    #[must_use]
    pub fn try_recv(&self) -> Option<Event> {
        self.rx.try_recv().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{KeyCode, KeyEvent, MouseButton, MouseEvent};
    use std::time::Duration;

    fn mv(x: u16) -> Event {
        Event::Mouse(MouseEvent::new(MouseKind::Move, MouseButton::None, x, 0))
    }

    #[test]
    fn delivers_in_order() {
        let (tx, rx) = event_channel(8);
        let a = Event::Key(KeyEvent::new(KeyCode::Enter));
        let b = Event::Key(KeyEvent::new(KeyCode::Tab));
        assert_eq!(tx.send(a.clone()), SendOutcome::Delivered);
        assert_eq!(tx.send(b.clone()), SendOutcome::Delivered);
        assert_eq!(rx.try_recv(), Some(a));
        assert_eq!(rx.try_recv(), Some(b));
        assert_eq!(rx.try_recv(), None);
    }

    #[test]
    fn full_channel_drops_only_moves() {
        let (tx, rx) = event_channel(2);
        assert_eq!(tx.send(mv(0)), SendOutcome::Delivered);
        assert_eq!(tx.send(mv(1)), SendOutcome::Delivered);
        // Queue is full: a plain move drops rather than blocking.
        assert_eq!(tx.send(mv(2)), SendOutcome::DroppedMove);

        // Previously delivered moves are intact.
        assert_eq!(rx.try_recv(), Some(mv(0)));
        assert_eq!(rx.try_recv(), Some(mv(1)));
    }

    #[test]
    fn full_channel_blocks_drag_instead_of_dropping() {
        let (tx, rx) = event_channel(1);
        assert_eq!(tx.send(mv(0)), SendOutcome::Delivered);

        // The consumer drains after a delay; the drag send must block
        // until then rather than report a drop.
        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            let first = rx.recv_timeout(Duration::from_millis(500));
            let second = rx.recv_timeout(Duration::from_millis(500));
            (first, second)
        });

        let d = Event::Mouse(MouseEvent::new(MouseKind::Drag, MouseButton::Left, 1, 0));
        assert_eq!(tx.send(d.clone()), SendOutcome::Delivered);

        let (first, second) = handle.join().unwrap();
        assert_eq!(first, Some(mv(0)));
        assert_eq!(second, Some(d));
    }

    #[test]
    fn disconnect_is_reported() {
        let (tx, rx) = event_channel(1);
        drop(rx);
        assert_eq!(
            tx.send(Event::Key(KeyEvent::new(KeyCode::Enter))),
            SendOutcome::Disconnected
        );
        assert_eq!(tx.send(mv(0)), SendOutcome::Disconnected);
    }

    #[test]
    fn recv_timeout_expires() {
        let (_tx, rx) = event_channel(1);
        assert!(rx.recv_timeout(Duration::from_millis(5)).is_none());
    }

    #[test]
    fn producers_can_be_cloned() {
        let (tx, rx) = event_channel(4);
        let tx2 = tx.clone();
        let handle = std::thread::spawn(move || {
            tx2.send(Event::Key(KeyEvent::new(KeyCode::Escape)));
        });
        tx.send(Event::Key(KeyEvent::new(KeyCode::Enter)));
        handle.join().unwrap();

        let mut got = 0;
        while rx.try_recv().is_some() {
            got += 1;
        }
        assert_eq!(got, 2);
    }
}
