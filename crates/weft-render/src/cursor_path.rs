#![forbid(unsafe_code)]

//! Shortest-byte-sequence cursor movement.
//!
//! Given the believed cursor position and a target, pick the cheapest of:
//!
//! - nothing (already there)
//! - same-row relative moves (`CUF`/`CUB`), or `CHA`, or `CR` + `CUF`
//! - literal spaces across cells known to be blank and attribute-compatible
//! - same-column vertical moves (`CUU`/`CUD`)
//! - a newline walk for small downward hops to column 0
//! - absolute `CUP` as the fallback
//!
//! The chosen path never exceeds the absolute-move cost by more than a
//! small constant, and a path that writes characters (spaces) is only
//! legal where the caller proves the cells it crosses would not change.

use std::io::{self, Write};

use crate::ansi;

/// Decimal digits needed to print `n`.
#[inline]
fn digit_count(n: u16) -> usize {
    if n >= 10000 {
        5
    } else if n >= 1000 {
        4
    } else if n >= 100 {
        3
    } else if n >= 10 {
        2
    } else {
        1
    }
}

/// Byte cost of `CSI row+1 ; col+1 H`.
#[inline]
#[must_use]
pub fn cup_cost(row: u16, col: u16) -> usize {
    4 + digit_count(row.saturating_add(1)) + digit_count(col.saturating_add(1))
}

/// Byte cost of `CSI col+1 G`.
#[inline]
fn cha_cost(col: u16) -> usize {
    3 + digit_count(col.saturating_add(1))
}

/// Byte cost of `CSI n C` / `CSI n D` / `CSI n A` / `CSI n B`.
#[inline]
fn rel_cost(n: u16) -> usize {
    match n {
        0 => 0,
        1 => 3,
        _ => 3 + digit_count(n),
    }
}

/// A chosen movement plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MovePlan {
    /// Already at the target.
    None,
    /// Absolute `CUP`.
    Absolute,
    /// `CHA` to a column on the current row.
    Column,
    /// Forward on the current row.
    Forward(u16),
    /// Backward on the current row.
    Back(u16),
    /// Up in the current column.
    Up(u16),
    /// Down in the current column.
    Down(u16),
    /// `CR` then forward.
    CarriageReturnForward(u16),
    /// `\r\n` repeated: down with the column reset to 0.
    NewlineWalk(u16),
    /// Emit literal spaces across clean blank cells.
    SpaceWalk(u16),
}

/// Pick the cheapest plan from `from` (either coordinate may be unknown)
/// to `(tx, ty)`.
///
/// `space_walk_ok` is the number of columns forward from the current
/// position that may legally be crossed by writing spaces: cells where
/// front and back agree on a blank with the currently-emitted attribute.
/// Pass 0 when unknown.
#[must_use]
pub fn plan(
    from: (Option<u16>, Option<u16>),
    to: (u16, u16),
    space_walk_ok: u16,
) -> MovePlan {
    let (fx, fy) = from;
    let (tx, ty) = to;

    if fx == Some(tx) && fy == Some(ty) {
        return MovePlan::None;
    }

    let abs = cup_cost(ty, tx);
    let mut best = MovePlan::Absolute;
    let mut best_cost = abs;

    let mut consider = |plan: MovePlan, cost: usize| {
        if cost < best_cost {
            best = plan;
            best_cost = cost;
        }
    };

    if fy == Some(ty) {
        // Same row.
        if let Some(fx) = fx {
            if tx > fx {
                let n = tx - fx;
                consider(MovePlan::Forward(n), rel_cost(n));
                if n <= space_walk_ok {
                    consider(MovePlan::SpaceWalk(n), n as usize);
                }
            } else if tx < fx {
                consider(MovePlan::Back(fx - tx), rel_cost(fx - tx));
            }
        }
        consider(MovePlan::Column, cha_cost(tx));
        if tx == 0 {
            consider(MovePlan::CarriageReturnForward(0), 1);
        } else {
            consider(MovePlan::CarriageReturnForward(tx), 1 + rel_cost(tx));
        }
    } else if fx == Some(tx) {
        // Same column.
        if let (Some(fy), ty) = (fy, ty) {
            if ty < fy {
                consider(MovePlan::Up(fy - ty), rel_cost(fy - ty));
            } else {
                consider(MovePlan::Down(ty - fy), rel_cost(ty - fy));
            }
        }
    }

    // Newline walk: small hop down to column 0. Only safe inside the
    // scroll region, which holds because the reconciler never walks past
    // the last row.
    if tx == 0 {
        if let Some(fy) = fy {
            if ty > fy {
                let dy = ty - fy;
                consider(MovePlan::NewlineWalk(dy), 2 * dy as usize);
            }
        }
    }

    best
}

/// Emit the plan's bytes.
///
/// `SpaceWalk` is emitted by the presenter (it owns the cell data);
/// asking this function to emit one writes plain spaces.
pub fn emit<W: Write>(w: &mut W, plan: MovePlan, to: (u16, u16)) -> io::Result<()> {
    let (tx, ty) = to;
    match plan {
        MovePlan::None => Ok(()),
        MovePlan::Absolute => ansi::cup(w, ty, tx),
        MovePlan::Column => ansi::cha(w, tx),
        MovePlan::Forward(n) => ansi::cuf(w, n),
        MovePlan::Back(n) => ansi::cub(w, n),
        MovePlan::Up(n) => ansi::cuu(w, n),
        MovePlan::Down(n) => ansi::cud(w, n),
        MovePlan::CarriageReturnForward(n) => {
            w.write_all(b"\r")?;
            ansi::cuf(w, n)
        }
        MovePlan::NewlineWalk(n) => {
            for _ in 0..n {
                w.write_all(b"\r\n")?;
            }
            Ok(())
        }
        MovePlan::SpaceWalk(n) => {
            for _ in 0..n {
                w.write_all(b" ")?;
            }
            Ok(())
        }
    }
}
