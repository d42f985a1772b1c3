//! Audio engine for a keybus module.
//!
//! Owns the voice table and renders one unsigned 8-bit sample per call,
//! the body of the 22050 Hz sample interrupt. The render path never
//! allocates and never blocks; everything it shares with other tasks is
//! read through the lock-free control block.

mod envelope;
mod mixer;
mod voice;
mod voice_table;

pub use envelope::{piano_glide, piano_level, rise_glide, rise_level, VOICE_DEATH_LEVEL};
pub use mixer::{AudioEngine, DAC_SILENCE};
pub use voice::Voice;
pub use voice_table::{VoiceTable, MAX_VOICES};
