//! Key matrix scanner: matrix sweep, key edge detection, quadrature
//! knob decoding, switch edges.
//!
//! Runs every 20 ms. Emits at most one press-or-release event per key
//! per scan, keeps the shared input bitmap consistent within one
//! period, and updates knob rotations atomically.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::Sender;
use kb_core::{Controls, NoteEvent, QuadDecoder, KNOB_COUNT, STEP_SIZES};

use crate::hw::MatrixIo;
use crate::shared::SharedState;
use crate::time::Ticker;

/// Matrix rows and columns.
const MATRIX_ROWS: u8 = 8;

/// Note keys occupy bits 0..12 of the input vector.
pub const NOTE_KEY_COUNT: usize = 12;

/// Knob `{A,B}` line pairs start at bit 12, knob 3 lowest.
const KNOB_STATE_BASE: u32 = 12;

/// Push switch on knob 2.
pub const SWITCH_KNOB2_BIT: u32 = 20;
/// Push switch on knob 3.
pub const SWITCH_KNOB3_BIT: u32 = 21;
/// Joystick push switch.
pub const SWITCH_JOYSTICK_BIT: u32 = 22;
/// West-side handshake line.
pub const HANDSHAKE_WEST_BIT: u32 = 23;
/// Push switch on knob 0: cycles the waveform.
pub const SWITCH_KNOB0_BIT: u32 = 24;
/// Push switch on knob 1: toggles the module role.
pub const SWITCH_KNOB1_BIT: u32 = 25;
/// East-side handshake line.
pub const HANDSHAKE_EAST_BIT: u32 = 27;

/// The 20 ms input scanner task.
pub struct InputScannerTask {
    matrix: Box<dyn MatrixIo>,
    shared: Arc<SharedState>,
    controls: Arc<Controls>,
    outbound: Sender<NoteEvent>,
    decoders: [QuadDecoder; KNOB_COUNT],
    /// Raw (active low) note key bits from the previous sweep.
    prev_keys: u32,
    prev_wave_switch: bool,
    prev_role_switch: bool,
    period: Duration,
}

impl InputScannerTask {
    pub fn new(
        matrix: Box<dyn MatrixIo>,
        shared: Arc<SharedState>,
        controls: Arc<Controls>,
        outbound: Sender<NoteEvent>,
        period: Duration,
    ) -> Self {
        Self {
            matrix,
            shared,
            controls,
            outbound,
            decoders: [QuadDecoder::new(); KNOB_COUNT],
            // All lines idle high (nothing pressed).
            prev_keys: 0x0FFF,
            prev_wave_switch: false,
            prev_role_switch: false,
            period,
        }
    }

    /// One full scan: sweep, decode, publish, emit.
    pub fn scan_once(&mut self) {
        let inputs = self.sweep_matrix();
        self.decode_knobs(inputs);
        let last_key = self.publish_pitch(inputs);
        self.emit_key_events(inputs);
        self.handle_switches(inputs);

        let mut panel = self.shared.lock();
        panel.inputs = inputs;
        panel.last_key = last_key;
    }

    pub fn run(mut self, stop: Arc<AtomicBool>) {
        log::info!(
            "input scanner running ({} ms period)",
            self.period.as_millis()
        );
        let mut ticker = Ticker::new(self.period);
        while !stop.load(Ordering::Relaxed) {
            ticker.wait();
            self.scan_once();
        }
    }

    /// Sweep all eight rows into the 32-bit input vector. For each row
    /// the enable line is dropped while the row select changes, then
    /// raised and given ≥2 µs to settle before the columns are read.
    fn sweep_matrix(&mut self) -> u32 {
        let mut inputs = 0u32;
        for row in 0..MATRIX_ROWS {
            self.matrix.set_row_enable(false);
            self.matrix.set_row_select(row);
            self.matrix.set_row_enable(true);
            self.matrix.settle();
            let cols = (self.matrix.read_columns() & 0x0F) as u32;
            inputs |= cols << (row * 4);
        }
        self.matrix.set_row_enable(false);
        inputs
    }

    /// Feed each knob's raw `{B,A}` pair through its decoder and apply
    /// the delta atomically.
    fn decode_knobs(&mut self, inputs: u32) {
        for knob in 0..KNOB_COUNT {
            let a_bit = KNOB_STATE_BASE + 2 * (3 - knob as u32);
            let a = (inputs >> a_bit) & 1;
            let b = (inputs >> (a_bit + 1)) & 1;
            let state = ((b << 1) | a) as u8;
            let delta = self.decoders[knob].step(state);
            self.controls.knobs[knob].apply_delta(delta);
        }
    }

    /// Publish the module octave (from K2) and the legacy current step
    /// size (last held key wins). Returns the held key for the
    /// display.
    fn publish_pitch(&mut self, inputs: u32) -> Option<u8> {
        self.controls.set_octave(self.controls.octave_knob());

        let mut last_key = None;
        for note in 0..NOTE_KEY_COUNT {
            if inputs & (1 << note) == 0 {
                last_key = Some(note as u8);
            }
        }
        let step = last_key.map_or(0, |n| STEP_SIZES[n as usize]);
        self.controls.set_current_step(step);
        last_key
    }

    /// Enqueue one event per key whose polarity changed since the last
    /// sweep, in scan order. Blocks when the outbound queue is full;
    /// transitions are never dropped.
    fn emit_key_events(&mut self, inputs: u32) {
        let keys = inputs & 0x0FFF;
        let changed = keys ^ self.prev_keys;
        self.prev_keys = keys;
        if changed == 0 {
            return;
        }

        let octave = self.controls.octave();
        for note in 0..NOTE_KEY_COUNT {
            if changed & (1 << note) == 0 {
                continue;
            }
            let pressed = keys & (1 << note) == 0;
            let event = if pressed {
                NoteEvent::press(octave, note as u8)
            } else {
                NoteEvent::release(octave, note as u8)
            };
            if self.outbound.send(event).is_err() {
                // Queue torn down; the module is shutting down.
                return;
            }
        }
    }

    /// Waveform cycling and role toggling on switch press edges.
    fn handle_switches(&mut self, inputs: u32) {
        let wave_pressed = inputs & (1 << SWITCH_KNOB0_BIT) == 0;
        let role_pressed = inputs & (1 << SWITCH_KNOB1_BIT) == 0;

        if wave_pressed && !self.prev_wave_switch {
            let next = self.controls.waveform().next_switchable();
            self.controls.set_waveform(next);
            log::info!("waveform -> {}", next.name());
        }
        if role_pressed && !self.prev_role_switch {
            // Role writes stay inside the panel critical section;
            // readers take the word lock-free.
            let _panel = self.shared.lock();
            let next = self.controls.role().toggled();
            self.controls.set_role(next);
            log::info!("role -> {}", next.label());
        }

        self.prev_wave_switch = wave_pressed;
        self.prev_role_switch = role_pressed;
    }
}
