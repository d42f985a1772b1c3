//! Lock-free control block shared between tasks and the audio path.
//!
//! Every field is a single word updated with relaxed atomics: readers
//! (including the sample interrupt) observe either the old or the new
//! value, never a torn intermediate. The composite panel state (input
//! bitmap, RX mirror) lives behind a mutex elsewhere; nothing here may
//! ever block.

use core::sync::atomic::{AtomicU32, AtomicU8, Ordering};

use crate::knob::{Knob, KNOB_COUNT, KNOB_OCTAVE, KNOB_TRANSPOSE, KNOB_VOLUME};
use crate::note::{REFERENCE_OCTAVE, TRANSPOSE_UNITY};
use crate::waveform::Waveform;

/// Whether this module emits note events or synthesizes audio.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum Role {
    Sender = 0,
    Receiver = 1,
}

impl Role {
    pub const fn toggled(self) -> Self {
        match self {
            Role::Sender => Role::Receiver,
            Role::Receiver => Role::Sender,
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            Role::Sender => "SENDER",
            Role::Receiver => "RECEIVER",
        }
    }

    const fn from_u8(value: u8) -> Self {
        match value {
            0 => Role::Sender,
            _ => Role::Receiver,
        }
    }
}

/// Single-word controls read by any task and the sample interrupt.
pub struct Controls {
    role: AtomicU8,
    waveform: AtomicU8,
    /// Module octave, published by the scanner from K2.
    octave: AtomicU8,
    /// Step size of the most recently scanned held key, 0 when none.
    current_step: AtomicU32,
    /// Joystick axes mapped to 0..12, published by the display task.
    joy_x: AtomicU8,
    joy_y: AtomicU8,
    /// Active voice count, published by the audio path for observers.
    active_voices: AtomicU32,
    pub knobs: [Knob; KNOB_COUNT],
}

impl Controls {
    pub fn new(role: Role, waveform: Waveform) -> Self {
        let knobs = [
            Knob::new(0, 8, TRANSPOSE_UNITY as i32),
            Knob::new(0, 8, 0),
            Knob::new(0, 8, REFERENCE_OCTAVE as i32),
            Knob::new(0, 8, 8),
        ];
        Self {
            role: AtomicU8::new(role as u8),
            waveform: AtomicU8::new(waveform.index()),
            octave: AtomicU8::new(REFERENCE_OCTAVE),
            current_step: AtomicU32::new(0),
            joy_x: AtomicU8::new(6),
            joy_y: AtomicU8::new(6),
            active_voices: AtomicU32::new(0),
            knobs,
        }
    }

    pub fn role(&self) -> Role {
        Role::from_u8(self.role.load(Ordering::Relaxed))
    }

    pub fn set_role(&self, role: Role) {
        self.role.store(role as u8, Ordering::Relaxed);
    }

    pub fn waveform(&self) -> Waveform {
        Waveform::from_index(self.waveform.load(Ordering::Relaxed))
    }

    pub fn set_waveform(&self, waveform: Waveform) {
        self.waveform.store(waveform.index(), Ordering::Relaxed);
    }

    pub fn octave(&self) -> u8 {
        self.octave.load(Ordering::Relaxed)
    }

    pub fn set_octave(&self, octave: u8) {
        self.octave.store(octave, Ordering::Relaxed);
    }

    pub fn current_step(&self) -> u32 {
        self.current_step.load(Ordering::Relaxed)
    }

    pub fn set_current_step(&self, step: u32) {
        self.current_step.store(step, Ordering::Relaxed);
    }

    pub fn joystick(&self) -> (u8, u8) {
        (
            self.joy_x.load(Ordering::Relaxed),
            self.joy_y.load(Ordering::Relaxed),
        )
    }

    pub fn set_joystick(&self, x: u8, y: u8) {
        self.joy_x.store(x, Ordering::Relaxed);
        self.joy_y.store(y, Ordering::Relaxed);
    }

    pub fn active_voices(&self) -> u32 {
        self.active_voices.load(Ordering::Relaxed)
    }

    pub fn set_active_voices(&self, count: u32) {
        self.active_voices.store(count, Ordering::Relaxed);
    }

    /// K2 rotation clamped to the legal octave range.
    pub fn octave_knob(&self) -> u8 {
        self.knobs[KNOB_OCTAVE].rotation().clamp(0, 8) as u8
    }

    /// K3 rotation clamped to the volume range.
    pub fn volume_knob(&self) -> i32 {
        self.knobs[KNOB_VOLUME].rotation().clamp(0, 8)
    }

    /// K0 rotation clamped to the transpose table range.
    pub fn transpose_knob(&self) -> usize {
        self.knobs[KNOB_TRANSPOSE].rotation().clamp(0, 8) as usize
    }
}
