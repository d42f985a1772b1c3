//! Core data model for the keybus synthesizer.
//!
//! This crate defines the types shared by the scanner, the bus tasks and
//! the audio render path: the semitone step table, note events and their
//! wire encoding, quadrature-decoded knobs, waveform selection, and the
//! lock-free control block.
//!
//! Designed to be `no_std` compatible (core atomics only).

#![cfg_attr(not(feature = "std"), no_std)]

mod controls;
mod event;
mod knob;
mod note;
mod waveform;

pub use controls::{Controls, Role};
pub use event::{EventKind, NoteEvent, WireFrame, BUS_FILTER_MASK, BUS_MESSAGE_ID, WIRE_FRAME_LEN};
pub use knob::{
    Knob, QuadDecoder, KNOB_COUNT, KNOB_OCTAVE, KNOB_ROLE, KNOB_TRANSPOSE, KNOB_VOLUME,
};
pub use note::{
    bend_step, octave_scale, transpose_step, NOTES_PER_OCTAVE, NOTE_NAMES, OCTAVE_MAX,
    REFERENCE_OCTAVE, SAMPLE_RATE, STEP_SIZES, TRANSPOSE_UNITY,
};
pub use waveform::Waveform;
