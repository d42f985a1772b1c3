//! Packed table of active voices with steal-oldest allocation.

use arrayvec::ArrayVec;
use kb_core::{EventKind, NoteEvent, STEP_SIZES};

use crate::voice::Voice;

/// Maximum simultaneous voices.
pub const MAX_VOICES: usize = 12;

/// An ordered, hole-free table of at most [`MAX_VOICES`] voices.
/// Creation order is preserved; removal shifts later entries down, so
/// the longest-lived voice always sits earliest.
#[derive(Debug, Default)]
pub struct VoiceTable {
    voices: ArrayVec<Voice, MAX_VOICES>,
}

impl VoiceTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.voices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.voices.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Voice> {
        self.voices.get(index)
    }

    pub fn as_slice(&self) -> &[Voice] {
        &self.voices
    }

    pub fn as_mut_slice(&mut self) -> &mut [Voice] {
        &mut self.voices
    }

    pub fn clear(&mut self) {
        self.voices.clear();
    }

    /// Allocate a voice for a press. When the table is full the voice
    /// with the largest `elapsed_samples` (the oldest by heard time,
    /// ties broken by lowest index) is overwritten in place.
    pub fn note_on(&mut self, step_size: u32) {
        let voice = Voice::new(step_size);
        if self.voices.is_full() {
            let victim = self.oldest_index();
            self.voices[victim] = voice;
        } else {
            self.voices.push(voice);
        }
    }

    /// Release: remove the first voice whose step size matches,
    /// shifting later entries down. A release with no matching voice is
    /// silently discarded.
    pub fn note_off(&mut self, step_size: u32) -> bool {
        match self.voices.iter().position(|v| v.step_size == step_size) {
            Some(index) => {
                self.voices.remove(index);
                true
            }
            None => false,
        }
    }

    /// Remove the voice at `index`, shifting later entries down.
    pub fn remove(&mut self, index: usize) -> Voice {
        self.voices.remove(index)
    }

    /// Apply a validated note event.
    pub fn apply(&mut self, event: NoteEvent) {
        let Some(&step) = STEP_SIZES.get(event.note as usize) else {
            return;
        };
        match event.kind {
            EventKind::Press => self.note_on(step),
            EventKind::Release => {
                self.note_off(step);
            }
        }
    }

    fn oldest_index(&self) -> usize {
        let mut oldest = 0;
        for (i, voice) in self.voices.iter().enumerate() {
            if voice.elapsed_samples > self.voices[oldest].elapsed_samples {
                oldest = i;
            }
        }
        oldest
    }
}
