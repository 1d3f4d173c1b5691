#![forbid(unsafe_code)]

//! Coalescing of high-frequency input events.
//!
//! Rapid mouse motion and resize storms can flood the event queue faster
//! than a consumer drains it. The coalescer sits between the input backend
//! and the consumer and applies latest-wins merging:
//!
//! - Consecutive mouse moves with the same button/modifiers replace one
//!   another; only the most recent is delivered.
//! - Consecutive resizes collapse to the final size.
//! - Everything else passes through untouched, and a non-coalescable event
//!   always flushes pending merged events first so ordering is preserved.
//!
//! A pending merged event is held at most [`CoalescerConfig::window`]
//! (default 16 ms); past that it is delivered even if more of its kind
//! keep arriving, bounding added latency.

use std::time::{Duration, Instant};

use crate::event::{Event, MouseKind};

/// Coalescer tuning.
#[derive(Debug, Clone, Copy)]
pub struct CoalescerConfig {
    /// Maximum time a coalescable event may be held back.
    pub window: Duration,
}

impl Default for CoalescerConfig {
    fn default() -> Self {
        Self {
            window: Duration::from_millis(16),
        }
    }
}

/// Pending coalesced state, stamped with when the first merged event of
/// the burst arrived.
#[derive(Debug, Clone)]
struct Pending {
    event: Event,
    since: Instant,
}

/// Latest-wins event coalescer.
///
/// Holds at most one pending mouse move and one pending resize; all
/// operations are O(1), so the coalescer itself can never grow a backlog.
#[derive(Debug, Default)]
pub struct EventCoalescer {
    config: CoalescerConfig,
    pending_move: Option<Pending>,
    pending_resize: Option<Pending>,
}

impl EventCoalescer {
    /// Create a coalescer with the default window.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(CoalescerConfig::default())
    }

    /// Create a coalescer with an explicit window.
    #[must_use]
    pub fn with_config(config: CoalescerConfig) -> Self {
        Self {
            config,
            pending_move: None,
            pending_resize: None,
        }
    }

    /// Feed one event; returns the events that are ready to deliver, in
    /// order.
    ///
    /// Coalescable events (plain mouse moves, resizes) are absorbed into
    /// a pending slot and usually return nothing. Any other event —
    /// drags included, since a drag stream carries selection state the
    /// consumer must see every sample of — first releases the pending
    /// slots so no reordering is observable.
    pub fn push(&mut self, event: Event, now: Instant) -> Vec<Event> {
        let mut out = Vec::new();

        match &event {
            Event::Mouse(mouse) if mouse.kind == MouseKind::Move => {
                let replaces = match &self.pending_move {
                    Some(Pending {
                        event: Event::Mouse(prev),
                        ..
                    }) => {
                        prev.button == mouse.button && prev.modifiers == mouse.modifiers
                    }
                    _ => false,
                };

                if replaces {
                    // Same stream: latest position wins, but never hold a
                    // burst past the window.
                    let since = self.pending_move.as_ref().map(|p| p.since).unwrap_or(now);
                    if now.duration_since(since) >= self.config.window {
                        self.pending_move = None;
                        out.push(event);
                    } else {
                        self.pending_move = Some(Pending { event, since });
                    }
                } else {
                    // Different button/modifier stream: release the old one.
                    if let Some(p) = self.pending_move.take() {
                        out.push(p.event);
                    }
                    self.pending_move = Some(Pending { event, since: now });
                }
            }
            Event::Resize { .. } => {
                let since = self
                    .pending_resize
                    .as_ref()
                    .map(|p| p.since)
                    .unwrap_or(now);
                if now.duration_since(since) >= self.config.window {
                    self.pending_resize = None;
                    out.push(event);
                } else {
                    self.pending_resize = Some(Pending { event, since });
                }
            }
            _ => {
                // Non-coalescable: deliver pending first, then the event.
                out.extend(self.drain());
                out.push(event);
            }
        }

        out
    }

    /// Release all pending coalesced events (resize first, then the move).
    pub fn flush(&mut self) -> Vec<Event> {
        self.drain()
    }

    /// Release pending events whose hold window has expired.
    pub fn flush_due(&mut self, now: Instant) -> Vec<Event> {
        let mut out = Vec::new();
        let window = self.config.window;
        let due = |p: &Pending| now.duration_since(p.since) >= window;
        if self.pending_resize.as_ref().is_some_and(due) {
            if let Some(p) = self.pending_resize.take() {
                out.push(p.event);
            }
        }
        if self.pending_move.as_ref().is_some_and(due) {
            if let Some(p) = self.pending_move.take() {
                out.push(p.event);
            }
        }
        out
    }

    /// The next instant at which a pending event becomes due, if any.
    #[must_use]
    pub fn next_deadline(&self) -> Option<Instant> {
        let d = self.config.window;
        let r = self.pending_resize.as_ref().map(|p| p.since + d);
        let m = self.pending_move.as_ref().map(|p| p.since + d);
        match (r, m) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    /// Whether any coalesced event is pending.
    #[must_use]
    pub fn has_pending(&self) -> bool {
        self.pending_move.is_some() || self.pending_resize.is_some()
    }

    fn drain(&mut self) -> Vec<Event> {
        let mut out = Vec::with_capacity(2);
        if let Some(p) = self.pending_resize.take() {
            out.push(p.event);
        }
        if let Some(p) = self.pending_move.take() {
            out.push(p.event);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{KeyCode, KeyEvent, MouseButton, MouseEvent};

    fn mv(x: u16, y: u16) -> Event {
        Event::Mouse(MouseEvent::new(MouseKind::Move, MouseButton::None, x, y))
    }

    fn drag(x: u16, y: u16) -> Event {
        Event::Mouse(MouseEvent::new(MouseKind::Drag, MouseButton::Left, x, y))
    }

    #[test]
    fn moves_coalesce_to_latest() {
        let mut c = EventCoalescer::new();
        let t = Instant::now();
        assert!(c.push(mv(1, 1), t).is_empty());
        assert!(c.push(mv(2, 2), t).is_empty());
        assert!(c.push(mv(3, 3), t).is_empty());
        assert_eq!(c.flush(), vec![mv(3, 3)]);
        assert!(!c.has_pending());
    }

    #[test]
    fn resizes_coalesce_to_latest() {
        let mut c = EventCoalescer::new();
        let t = Instant::now();
        assert!(c.push(Event::Resize { cols: 90, rows: 28 }, t).is_empty());
        // Second signal 5 ms later collapses into the first.
        let t2 = t + Duration::from_millis(5);
        assert!(c.push(Event::Resize { cols: 100, rows: 30 }, t2).is_empty());
        assert_eq!(c.flush(), vec![Event::Resize {
            cols: 100,
            rows: 30
        }]);
    }

    #[test]
    fn key_flushes_pending_first() {
        let mut c = EventCoalescer::new();
        let t = Instant::now();
        let _ = c.push(mv(5, 5), t);
        let key = Event::Key(KeyEvent::new(KeyCode::Enter));
        let out = c.push(key.clone(), t);
        assert_eq!(out, vec![mv(5, 5), key]);
        assert!(!c.has_pending());
    }

    #[test]
    fn drag_passes_through_and_flushes_pending_move() {
        let mut c = EventCoalescer::new();
        let t = Instant::now();
        let _ = c.push(mv(1, 1), t);
        // Drags are not coalescable: the pending move is released first,
        // then the drag itself, and nothing stays pending.
        let out = c.push(drag(2, 2), t);
        assert_eq!(out, vec![mv(1, 1), drag(2, 2)]);
        assert!(!c.has_pending());
    }

    #[test]
    fn window_bound_forces_delivery() {
        let mut c = EventCoalescer::new();
        let t = Instant::now();
        let _ = c.push(mv(1, 1), t);
        // A move arriving past the window is delivered, not held again.
        let late = t + Duration::from_millis(20);
        let out = c.push(mv(2, 2), late);
        assert_eq!(out, vec![mv(2, 2)]);
    }

    #[test]
    fn flush_due_respects_window() {
        let mut c = EventCoalescer::new();
        let t = Instant::now();
        let _ = c.push(mv(1, 1), t);
        assert!(c.flush_due(t + Duration::from_millis(2)).is_empty());
        assert_eq!(
            c.flush_due(t + Duration::from_millis(17)),
            vec![mv(1, 1)]
        );
    }

    #[test]
    fn at_most_one_move_per_window() {
        // Over one window, many moves of the same stream deliver once.
        let mut c = EventCoalescer::new();
        let t = Instant::now();
        let mut delivered = Vec::new();
        for i in 0..10u16 {
            delivered.extend(c.push(mv(i, i), t + Duration::from_millis(u64::from(i))));
        }
        delivered.extend(c.flush_due(t + Duration::from_millis(16)));
        assert_eq!(delivered.len(), 1);
        assert_eq!(delivered[0], mv(9, 9));
    }

    #[test]
    fn non_move_events_never_dropped() {
        let mut c = EventCoalescer::new();
        let t = Instant::now();
        let presses: Vec<Event> = (0..20)
            .map(|i| {
                Event::Mouse(MouseEvent::new(
                    MouseKind::Press,
                    MouseButton::Left,
                    i,
                    i,
                ))
            })
            .collect();
        let mut delivered = Vec::new();
        for p in &presses {
            delivered.extend(c.push(p.clone(), t));
        }
        assert_eq!(delivered, presses);

        // A drag burst is equally sacrosanct: every sample arrives, in
        // order, even when they all land inside one coalescing window.
        let drags: Vec<Event> = (0..20).map(|i| drag(i, i)).collect();
        let mut delivered = Vec::new();
        for d in &drags {
            delivered.extend(c.push(d.clone(), t + Duration::from_millis(1)));
        }
        assert_eq!(delivered, drags);
    }

    #[test]
    fn next_deadline_tracks_earliest_pending() {
        let mut c = EventCoalescer::new();
        assert!(c.next_deadline().is_none());
        let t = Instant::now();
        let _ = c.push(mv(0, 0), t);
        let dl = c.next_deadline().expect("deadline for pending move");
        assert_eq!(dl, t + Duration::from_millis(16));
    }
}
