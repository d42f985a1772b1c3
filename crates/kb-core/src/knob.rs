//! Quadrature-decoded rotary controls.
//!
//! Each knob splits into two halves: a [`QuadDecoder`] owned by the
//! scanner task (transition history is single-writer state) and the
//! [`Knob`] itself, whose rotation is an atomic read by any task or the
//! audio path without tearing.
//!
//! The encoders emit two counted Gray-code transitions per mechanical
//! detent, so the knob accumulates half-detents internally and exposes
//! whole detents.

use core::sync::atomic::{AtomicI32, Ordering};

/// Number of rotary knobs on the panel.
pub const KNOB_COUNT: usize = 4;

/// K0: chromatic transpose, 0..8, neutral at 4.
pub const KNOB_TRANSPOSE: usize = 0;
/// K1: rotation unused; its switch toggles the module role.
pub const KNOB_ROLE: usize = 1;
/// K2: octave, 0..8.
pub const KNOB_OCTAVE: usize = 2;
/// K3: volume, 0..8; doubles as the PULSE duty control.
pub const KNOB_VOLUME: usize = 3;

/// An integer-valued rotary control with a clamp range.
pub struct Knob {
    /// Travel in half-detents; clamped to `[2*lower, 2*upper]`.
    travel: AtomicI32,
    lower: i32,
    upper: i32,
}

impl Knob {
    pub fn new(lower: i32, upper: i32, initial: i32) -> Self {
        Self {
            travel: AtomicI32::new(initial.clamp(lower, upper) * 2),
            lower,
            upper,
        }
    }

    /// Current rotation in whole detents. Never tears: the value is a
    /// single relaxed atomic load.
    pub fn rotation(&self) -> i32 {
        self.travel.load(Ordering::Relaxed).div_euclid(2)
    }

    pub fn lower(&self) -> i32 {
        self.lower
    }

    pub fn upper(&self) -> i32 {
        self.upper
    }

    /// Apply a decoded transition delta: load, add, clamp, store.
    /// Only the scanner task calls this, so the load/store pair cannot
    /// race with another writer.
    pub fn apply_delta(&self, delta: i32) {
        if delta == 0 {
            return;
        }
        let travel = self.travel.load(Ordering::Relaxed);
        let updated = (travel + delta).clamp(self.lower * 2, self.upper * 2);
        self.travel.store(updated, Ordering::Relaxed);
    }

    /// Jump straight to a rotation value (startup and tests).
    pub fn set_rotation(&self, rotation: i32) {
        self.travel
            .store(rotation.clamp(self.lower, self.upper) * 2, Ordering::Relaxed);
    }
}

/// Per-knob transition decoder: previous 2-bit `{B,A}` state plus the
/// last legal direction, used to ride through illegal transitions.
#[derive(Clone, Copy, Debug, Default)]
pub struct QuadDecoder {
    prev: u8,
    last_delta: i32,
}

impl QuadDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed the current `{B,A}` state and get this tick's delta.
    ///
    /// Legal single-bit transitions follow the table 00→01: +1,
    /// 01→00: −1, 10→11: −1, 11→10: +1; the other single-bit moves are
    /// direction-ambiguous and yield 0. A simultaneous change of both
    /// bits is illegal; the last legal direction is reused (0 if none
    /// has been seen yet).
    pub fn step(&mut self, state: u8) -> i32 {
        let state = state & 0b11;
        let prev = self.prev;
        self.prev = state;

        if prev == state {
            return 0;
        }
        if prev ^ state == 0b11 {
            return self.last_delta;
        }
        let delta = match (prev << 2) | state {
            0b0001 => 1,
            0b0100 => -1,
            0b1011 => -1,
            0b1110 => 1,
            _ => 0,
        };
        if delta != 0 {
            self.last_delta = delta;
        }
        delta
    }
}
