//! Note events and their bus wire encoding.
//!
//! Events travel between modules as fixed 8-byte frames. Only the first
//! three bytes carry meaning: kind, octave, note index. The rest are
//! reserved and transmitted zero.

use crate::note::{NOTES_PER_OCTAVE, OCTAVE_MAX};

/// Bus identifier every module transmits and filters on.
pub const BUS_MESSAGE_ID: u16 = 0x123;

/// Acceptance filter mask (exact-match on the 11-bit identifier).
pub const BUS_FILTER_MASK: u16 = 0x7FF;

/// Length of a bus frame payload in bytes.
pub const WIRE_FRAME_LEN: usize = 8;

/// Raw bus frame payload.
pub type WireFrame = [u8; WIRE_FRAME_LEN];

/// What a note event does.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EventKind {
    /// Key pressed.
    Press,
    /// Key released.
    Release,
}

impl EventKind {
    /// Wire byte for this kind.
    pub const fn code(self) -> u8 {
        match self {
            EventKind::Press => b'P',
            EventKind::Release => b'R',
        }
    }

    /// Decode a wire byte; anything outside {P, R} is malformed.
    pub const fn from_code(code: u8) -> Option<Self> {
        match code {
            b'P' => Some(EventKind::Press),
            b'R' => Some(EventKind::Release),
            _ => None,
        }
    }
}

/// A key press or release, as carried on the bus.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NoteEvent {
    pub kind: EventKind,
    /// Octave the sending module was set to, 0..=8.
    pub octave: u8,
    /// Chromatic note index, 0..=11 (C..B).
    pub note: u8,
}

impl NoteEvent {
    pub const fn press(octave: u8, note: u8) -> Self {
        Self { kind: EventKind::Press, octave, note }
    }

    pub const fn release(octave: u8, note: u8) -> Self {
        Self { kind: EventKind::Release, octave, note }
    }

    /// Encode into an 8-byte frame; reserved bytes are zero.
    pub fn to_wire(self) -> WireFrame {
        let mut frame = [0u8; WIRE_FRAME_LEN];
        frame[0] = self.kind.code();
        frame[1] = self.octave;
        frame[2] = self.note;
        frame
    }

    /// Decode and validate a frame. Returns `None` for malformed frames
    /// (unknown kind, note index out of range, octave out of range),
    /// which the decoder silently discards.
    pub fn from_wire(frame: &WireFrame) -> Option<Self> {
        let kind = EventKind::from_code(frame[0])?;
        let octave = frame[1];
        let note = frame[2];
        if octave > OCTAVE_MAX || note as usize >= NOTES_PER_OCTAVE {
            return None;
        }
        Some(Self { kind, octave, note })
    }
}
