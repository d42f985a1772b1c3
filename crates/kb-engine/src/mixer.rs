//! The audio render path: the body of the 22050 Hz sample interrupt.
//!
//! `render_sample` must stay within the interrupt budget: no blocking,
//! no locking, no allocation. Control inputs arrive through relaxed
//! atomic reads; the voice table is owned here and mutated only between
//! samples (note events are applied by the caller at sample
//! boundaries).

use std::sync::Arc;

use kb_core::{
    bend_step, octave_scale, transpose_step, Controls, NoteEvent, Role, Waveform, SAMPLE_RATE,
};

use crate::envelope::{piano_glide, piano_level, rise_glide, rise_level, VOICE_DEATH_LEVEL};
use crate::voice_table::VoiceTable;

/// DAC code for silence (mid-rail of the 8-bit PWM output).
pub const DAC_SILENCE: u8 = 128;

/// Noise generator constants (numerical-recipes LCG).
const LCG_MUL: u32 = 1664525;
const LCG_ADD: u32 = 1013904223;

/// RISE voices younger than this are never evicted, whatever their
/// level reads as.
const RISE_HOLDOFF_SAMPLES: u32 = SAMPLE_RATE / 10;

/// Polyphonic mixer owning the voice table and the legacy single-voice
/// oscillator state.
pub struct AudioEngine {
    controls: Arc<Controls>,
    voices: VoiceTable,
    /// Process-global phase accumulator for the primary tone.
    primary_phase: u32,
    noise_seed: u32,
}

impl AudioEngine {
    pub fn new(controls: Arc<Controls>) -> Self {
        Self {
            controls,
            voices: VoiceTable::new(),
            primary_phase: 0,
            noise_seed: 0x2F6E_2B1C,
        }
    }

    pub fn controls(&self) -> &Controls {
        &self.controls
    }

    pub fn voices(&self) -> &VoiceTable {
        &self.voices
    }

    pub fn voices_mut(&mut self) -> &mut VoiceTable {
        &mut self.voices
    }

    /// Phase of the legacy primary oscillator.
    pub fn primary_phase(&self) -> u32 {
        self.primary_phase
    }

    /// Apply a validated note event to the voice table. Called at
    /// sample boundaries, never concurrently with `render_sample`.
    pub fn apply_event(&mut self, event: NoteEvent) {
        self.voices.apply(event);
    }

    /// Produce one unsigned 8-bit sample.
    pub fn render_sample(&mut self) -> u8 {
        // A sender module emits silence; role changes take effect on
        // the next sample.
        if self.controls.role() == Role::Sender {
            return DAC_SILENCE;
        }

        let octave = self.controls.octave_knob();
        let waveform = self.controls.waveform();
        let (sum, count) = match waveform {
            Waveform::Piano => self.mix_piano(octave),
            Waveform::Rise => self.mix_rise(octave),
            plain => self.mix_plain(plain, octave),
        };
        self.controls.set_active_voices(self.voices.len() as u32);

        if count == 0 {
            return DAC_SILENCE;
        }
        let mix = sum / count as i32;
        let out = mix * self.controls.volume_knob() / 8 + DAC_SILENCE as i32;
        out.clamp(0, 255) as u8
    }

    /// PIANO: exponential decay with a 50 ms downward pitch glide.
    /// Voices whose level has fallen below the death threshold are
    /// evicted in place.
    fn mix_piano(&mut self, octave: u8) -> (i32, u32) {
        let mut sum = 0;
        let mut count = 0;
        let mut i = 0;
        while i < self.voices.len() {
            let mut voice = self.voices.as_slice()[i];
            voice.elapsed_samples += 1;
            let t = voice.elapsed_seconds();
            let level = piano_level(t);
            if level < VOICE_DEATH_LEVEL {
                self.voices.remove(i);
                continue;
            }
            let step = octave_scale(voice.step_size, octave);
            voice.advance((step as f32 * piano_glide(t)) as u32);
            sum += (sine_sample(voice.phase_index()) as f32 * level) as i32;
            count += 1;
            self.voices.as_mut_slice()[i] = voice;
            i += 1;
        }
        (sum, count)
    }

    /// RISE: 300 ms linear attack with a 50 ms upward pitch glide.
    fn mix_rise(&mut self, octave: u8) -> (i32, u32) {
        let mut sum = 0;
        let mut count = 0;
        let mut i = 0;
        while i < self.voices.len() {
            let mut voice = self.voices.as_slice()[i];
            voice.elapsed_samples += 1;
            let t = voice.elapsed_seconds();
            let level = rise_level(t);
            if voice.elapsed_samples > RISE_HOLDOFF_SAMPLES && level < VOICE_DEATH_LEVEL {
                self.voices.remove(i);
                continue;
            }
            let step = octave_scale(voice.step_size, octave);
            voice.advance((step as f32 * rise_glide(t)) as u32);
            sum += (sine_sample(voice.phase_index()) as f32 * level) as i32;
            count += 1;
            self.voices.as_mut_slice()[i] = voice;
            i += 1;
        }
        (sum, count)
    }

    /// The six stateless waveforms: a primary tone from the most
    /// recently scanned held key (with transpose and pitch bend), plus
    /// every held voice mixed additively at its own phase.
    fn mix_plain(&mut self, waveform: Waveform, octave: u8) -> (i32, u32) {
        let pulse_threshold = (self.controls.volume_knob() * 256 / 9) as i32;
        let mut sum = 0;
        let mut count = 0;

        let base = self.controls.current_step();
        if base != 0 {
            let step = transpose_step(base, self.controls.transpose_knob());
            let (_, joy_y) = self.controls.joystick();
            let step = bend_step(step, joy_y);
            let step = octave_scale(step, octave);
            self.primary_phase = self.primary_phase.wrapping_add(step);
            sum += tone_sample(
                waveform,
                (self.primary_phase >> 24) as u8,
                pulse_threshold,
                &mut self.noise_seed,
            );
            count += 1;
        }

        let seed = &mut self.noise_seed;
        for voice in self.voices.as_mut_slice() {
            let step = octave_scale(voice.step_size, octave);
            voice.advance(step);
            sum += tone_sample(waveform, voice.phase_index(), pulse_threshold, seed);
            count += 1;
        }
        (sum, count)
    }
}

/// `round(127 * sin(2*pi * x / 256))`.
fn sine_sample(x: u8) -> i32 {
    (127.0 * (core::f32::consts::TAU * x as f32 / 256.0).sin()).round() as i32
}

/// One sample of a stateless waveform from the top phase byte.
fn tone_sample(waveform: Waveform, x: u8, pulse_threshold: i32, seed: &mut u32) -> i32 {
    let x = x as i32;
    match waveform {
        Waveform::Sawtooth => x - 128,
        Waveform::Triangle => {
            if x < 128 {
                2 * x - 128
            } else {
                2 * (255 - x) - 128
            }
        }
        Waveform::Sine => sine_sample(x as u8),
        Waveform::Square => {
            if x < 128 {
                127
            } else {
                -127
            }
        }
        Waveform::Pulse => {
            if x < pulse_threshold {
                127
            } else {
                -127
            }
        }
        Waveform::Noise => {
            *seed = seed.wrapping_mul(LCG_MUL).wrapping_add(LCG_ADD);
            (*seed & 0xFF) as i32 - 128
        }
        // Enveloped waveforms never reach the stateless branch.
        Waveform::Piano | Waveform::Rise => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kb_core::{KNOB_VOLUME, STEP_SIZES};

    fn receiver_engine(waveform: Waveform) -> AudioEngine {
        AudioEngine::new(Arc::new(Controls::new(Role::Receiver, waveform)))
    }

    // === Silence and role ===

    #[test]
    fn silent_input_outputs_midrail() {
        let mut engine = receiver_engine(Waveform::Sawtooth);
        for _ in 0..100 {
            assert_eq!(engine.render_sample(), DAC_SILENCE);
        }
    }

    #[test]
    fn sender_role_is_silent_even_with_voices() {
        let mut engine = receiver_engine(Waveform::Square);
        engine.apply_event(NoteEvent::press(4, 9));
        engine.controls().set_current_step(STEP_SIZES[9]);
        engine.controls().set_role(Role::Sender);
        for _ in 0..10 {
            assert_eq!(engine.render_sample(), DAC_SILENCE);
        }
        // Flipping back to receiver takes effect on the next sample.
        engine.controls().set_role(Role::Receiver);
        assert_ne!(engine.render_sample(), DAC_SILENCE);
    }

    #[test]
    fn zero_volume_outputs_midrail() {
        let mut engine = receiver_engine(Waveform::Square);
        engine.controls().set_current_step(STEP_SIZES[9]);
        engine.controls().knobs[KNOB_VOLUME].set_rotation(0);
        for _ in 0..100 {
            assert_eq!(engine.render_sample(), DAC_SILENCE);
        }
    }

    // === Primary oscillator ===

    #[test]
    fn a440_phase_wraps_after_fifty_samples() {
        // 22050 / 440 ≈ 50.11 samples per cycle, so after exactly 50
        // samples the accumulator is within one step of its start.
        let mut engine = receiver_engine(Waveform::Sawtooth);
        engine.controls().set_current_step(STEP_SIZES[9]);
        for _ in 0..50 {
            engine.render_sample();
        }
        let phase = engine.primary_phase();
        let wrap_distance = phase.min(0u32.wrapping_sub(phase));
        assert!(
            wrap_distance <= STEP_SIZES[9],
            "phase {} not within one step of start",
            phase
        );
    }

    #[test]
    fn square_single_note_is_two_valued_at_even_duty() {
        let mut engine = receiver_engine(Waveform::Square);
        engine.controls().set_current_step(STEP_SIZES[9]);
        let mut highs = 0;
        let mut lows = 0;
        for _ in 0..50 {
            match engine.render_sample() {
                255 => highs += 1,
                1 => lows += 1,
                other => panic!("unexpected DAC value {}", other),
            }
        }
        assert_eq!(highs, 25);
        assert_eq!(lows, 25);
    }

    #[test]
    fn pulse_full_volume_is_two_valued() {
        let mut engine = receiver_engine(Waveform::Pulse);
        engine.controls().set_current_step(STEP_SIZES[0]);
        for _ in 0..200 {
            let out = engine.render_sample();
            assert!(out == 1 || out == 255, "unexpected DAC value {}", out);
        }
    }

    #[test]
    fn pulse_duty_follows_volume_knob() {
        // K3 = 8 puts the threshold at 8*256/9 = 227, so roughly 89%
        // of the cycle sits high.
        let mut engine = receiver_engine(Waveform::Pulse);
        engine.controls().set_current_step(STEP_SIZES[0]);
        let mut highs = 0;
        let total = 2000;
        for _ in 0..total {
            if engine.render_sample() == 255 {
                highs += 1;
            }
        }
        let duty = highs as f32 / total as f32;
        assert!((duty - 227.0 / 256.0).abs() < 0.03, "duty {}", duty);
    }

    #[test]
    fn joystick_bend_raises_pitch() {
        let mut engine = receiver_engine(Waveform::Sawtooth);
        engine.controls().set_current_step(STEP_SIZES[0]);
        engine.controls().set_joystick(6, 12);
        engine.render_sample();
        let bent = engine.primary_phase();
        assert_eq!(
            bent as i64,
            STEP_SIZES[0] as i64 + 6 * STEP_SIZES[0] as i64 / 100
        );
    }

    #[test]
    fn noise_output_varies() {
        let mut engine = receiver_engine(Waveform::Noise);
        engine.controls().set_current_step(STEP_SIZES[0]);
        let mut values = std::collections::HashSet::new();
        for _ in 0..64 {
            values.insert(engine.render_sample());
        }
        assert!(values.len() > 8, "noise produced {} distinct values", values.len());
    }

    // === Voice table coupling ===

    #[test]
    fn presses_populate_voice_table_in_order() {
        let mut engine = receiver_engine(Waveform::Sawtooth);
        engine.apply_event(NoteEvent::press(4, 0));
        engine.apply_event(NoteEvent::press(4, 4));
        engine.apply_event(NoteEvent::press(4, 7));
        engine.render_sample();
        assert_eq!(engine.voices().len(), 3);
        assert_eq!(engine.voices().get(0).unwrap().step_size, STEP_SIZES[0]);
        assert_eq!(engine.voices().get(1).unwrap().step_size, STEP_SIZES[4]);
        assert_eq!(engine.voices().get(2).unwrap().step_size, STEP_SIZES[7]);
    }

    #[test]
    fn release_drops_matching_voice_in_order() {
        let mut engine = receiver_engine(Waveform::Sawtooth);
        engine.apply_event(NoteEvent::press(4, 0));
        engine.apply_event(NoteEvent::press(4, 4));
        engine.apply_event(NoteEvent::press(4, 7));
        engine.render_sample();
        engine.apply_event(NoteEvent::release(4, 4));
        assert_eq!(engine.voices().len(), 2);
        assert_eq!(engine.voices().get(0).unwrap().step_size, STEP_SIZES[0]);
        assert_eq!(engine.voices().get(1).unwrap().step_size, STEP_SIZES[7]);
    }

    #[test]
    fn held_voices_mix_into_plain_output() {
        let mut engine = receiver_engine(Waveform::Square);
        engine.apply_event(NoteEvent::press(4, 9));
        let out = engine.render_sample();
        assert!(out == 1 || out == 255);
        assert_eq!(engine.controls().active_voices(), 1);
    }

    // === Enveloped branches ===

    #[test]
    fn piano_voice_decays_over_time() {
        let mut engine = receiver_engine(Waveform::Piano);
        engine.apply_event(NoteEvent::press(4, 9));
        let mut fresh_peak = 0;
        for _ in 0..60 {
            fresh_peak = fresh_peak.max((engine.render_sample() as i32 - 128).abs());
        }
        assert!(fresh_peak > 100, "fresh peak {}", fresh_peak);

        // One second in, exp(-3) ≈ 0.05 of full scale remains.
        engine.voices_mut().as_mut_slice()[0].elapsed_samples = SAMPLE_RATE;
        let mut late_peak = 0;
        for _ in 0..60 {
            late_peak = late_peak.max((engine.render_sample() as i32 - 128).abs());
        }
        assert!(late_peak < 20, "late peak {}", late_peak);
    }

    #[test]
    fn piano_dead_voice_is_evicted() {
        let mut engine = receiver_engine(Waveform::Piano);
        engine.apply_event(NoteEvent::press(4, 0));
        engine.apply_event(NoteEvent::press(4, 7));
        // Age the first voice past the death threshold.
        engine.voices_mut().as_mut_slice()[0].elapsed_samples = SAMPLE_RATE * 2;
        engine.render_sample();
        assert_eq!(engine.voices().len(), 1);
        assert_eq!(engine.voices().get(0).unwrap().step_size, STEP_SIZES[7]);
    }

    #[test]
    fn rise_voice_fades_in() {
        let mut engine = receiver_engine(Waveform::Rise);
        engine.apply_event(NoteEvent::press(4, 9));
        let mut early_peak = 0;
        for _ in 0..40 {
            early_peak = early_peak.max((engine.render_sample() as i32 - 128).abs());
        }
        // 40 samples in, the attack has barely begun.
        assert!(early_peak < 4, "early peak {}", early_peak);

        engine.voices_mut().as_mut_slice()[0].elapsed_samples = SAMPLE_RATE;
        let mut late_peak = 0;
        for _ in 0..60 {
            late_peak = late_peak.max((engine.render_sample() as i32 - 128).abs());
        }
        assert!(late_peak > 100, "late peak {}", late_peak);
    }

    #[test]
    fn rise_voice_survives_until_released() {
        let mut engine = receiver_engine(Waveform::Rise);
        engine.apply_event(NoteEvent::press(4, 3));
        for _ in 0..(SAMPLE_RATE / 4) {
            engine.render_sample();
        }
        assert_eq!(engine.voices().len(), 1);
        engine.apply_event(NoteEvent::release(4, 3));
        assert!(engine.voices().is_empty());
    }

    #[test]
    fn output_stays_in_dac_range() {
        let mut engine = receiver_engine(Waveform::Sawtooth);
        engine.controls().set_current_step(STEP_SIZES[11]);
        for note in 0..12 {
            engine.apply_event(NoteEvent::press(4, note));
        }
        for _ in 0..1000 {
            // u8 return already proves the clamp; exercise anyway.
            let _ = engine.render_sample();
        }
    }
}
