//! Simulated hardware for host runs and tests: a scriptable key
//! panel, a fixed joystick, recording/logging displays, and a loopback
//! bus transport.

use std::sync::atomic::{AtomicU32, AtomicU8, Ordering};
use std::sync::{Arc, Mutex};

use kb_core::WireFrame;

use crate::bus::{BusError, BusTransmit, InboundPort, TxCompletion};
use crate::hw::{DisplayDriver, JoystickAdc, MatrixIo};

/// Handle for driving the simulated panel: all 32 matrix lines as one
/// word, idle high (active low, nothing pressed).
#[derive(Clone)]
pub struct SimPanel {
    word: Arc<AtomicU32>,
}

impl SimPanel {
    /// Create the panel and the matrix half the scanner owns.
    pub fn new() -> (SimPanel, SimMatrix) {
        let word = Arc::new(AtomicU32::new(u32::MAX));
        let matrix = SimMatrix {
            word: word.clone(),
            row: 0,
            out_line: false,
            mux_bits: Arc::new(AtomicU8::new(0)),
        };
        (SimPanel { word }, matrix)
    }

    pub fn raw(&self) -> u32 {
        self.word.load(Ordering::Relaxed)
    }

    pub fn set_line(&self, bit: u32, high: bool) {
        if high {
            self.word.fetch_or(1 << bit, Ordering::Relaxed);
        } else {
            self.word.fetch_and(!(1 << bit), Ordering::Relaxed);
        }
    }

    pub fn press_key(&self, note: usize) {
        self.set_line(note as u32, false);
    }

    pub fn release_key(&self, note: usize) {
        self.set_line(note as u32, true);
    }

    pub fn press_switch(&self, bit: u32) {
        self.set_line(bit, false);
    }

    pub fn release_switch(&self, bit: u32) {
        self.set_line(bit, true);
    }

    /// Drive a knob's raw `{B,A}` lines to the given 2-bit state.
    pub fn set_knob_state(&self, knob: usize, state: u8) {
        let a_bit = 12 + 2 * (3 - knob as u32);
        self.set_line(a_bit, state & 0b01 != 0);
        self.set_line(a_bit + 1, state & 0b10 != 0);
    }
}

/// Matrix side of the simulated panel.
pub struct SimMatrix {
    word: Arc<AtomicU32>,
    row: u8,
    out_line: bool,
    /// Output-multiplexer latches, updated on the enable strobe.
    mux_bits: Arc<AtomicU8>,
}

impl SimMatrix {
    /// Latched output-mux bits (display enable/reset and friends).
    pub fn mux_bits(&self) -> Arc<AtomicU8> {
        self.mux_bits.clone()
    }
}

impl MatrixIo for SimMatrix {
    fn set_row_select(&mut self, row: u8) {
        self.row = row & 0x07;
    }

    fn set_row_enable(&mut self, enabled: bool) {
        if enabled {
            // The enable strobe is what latches the OUT line.
            let mask = 1u8 << self.row;
            if self.out_line {
                self.mux_bits.fetch_or(mask, Ordering::Relaxed);
            } else {
                self.mux_bits.fetch_and(!mask, Ordering::Relaxed);
            }
        }
    }

    fn read_columns(&mut self) -> u8 {
        ((self.word.load(Ordering::Relaxed) >> (self.row * 4)) & 0x0F) as u8
    }

    fn write_out(&mut self, value: bool) {
        self.out_line = value;
    }

    fn settle(&mut self) {}
}

/// Joystick stuck at a fixed raw reading.
pub struct FixedJoystick {
    pub x: u16,
    pub y: u16,
}

impl FixedJoystick {
    /// Raw reading that remaps to the center of the 0..12 scale.
    pub fn centered() -> Self {
        Self { x: 459, y: 459 }
    }
}

impl JoystickAdc for FixedJoystick {
    fn read_x(&mut self) -> u16 {
        self.x
    }

    fn read_y(&mut self) -> u16 {
        self.y
    }
}

/// Display driver that records every sent frame as a string.
#[derive(Clone, Default)]
pub struct RecordingDisplay {
    frames: Arc<Mutex<Vec<String>>>,
    current: Arc<Mutex<String>>,
    font: Arc<Mutex<String>>,
}

impl RecordingDisplay {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn frames(&self) -> Vec<String> {
        self.frames.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn font(&self) -> String {
        self.font.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn buffer(&self) -> std::sync::MutexGuard<'_, String> {
        self.current.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl DisplayDriver for RecordingDisplay {
    fn clear_buffer(&mut self) {
        self.buffer().clear();
    }

    fn set_font(&mut self, font: &str) {
        *self.font.lock().unwrap_or_else(|e| e.into_inner()) = font.to_string();
    }

    fn draw_str(&mut self, _x: i32, _y: i32, s: &str) {
        let mut buf = self.buffer();
        if !buf.is_empty() {
            buf.push(' ');
        }
        buf.push_str(s);
    }

    fn set_cursor(&mut self, _x: i32, _y: i32) {
        let mut buf = self.buffer();
        if !buf.is_empty() {
            buf.push(' ');
        }
    }

    fn print(&mut self, s: &str) {
        self.buffer().push_str(s);
    }

    fn send_buffer(&mut self) {
        let frame = self.buffer().clone();
        self.frames
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(frame);
    }
}

/// Display driver that renders each frame as one log line.
#[derive(Default)]
pub struct LogDisplay {
    line: String,
}

impl LogDisplay {
    pub fn new() -> Self {
        Self::default()
    }
}

impl DisplayDriver for LogDisplay {
    fn clear_buffer(&mut self) {
        self.line.clear();
    }

    fn set_font(&mut self, _font: &str) {}

    fn draw_str(&mut self, _x: i32, _y: i32, s: &str) {
        if !self.line.is_empty() {
            self.line.push(' ');
        }
        self.line.push_str(s);
    }

    fn set_cursor(&mut self, _x: i32, _y: i32) {
        if !self.line.is_empty() {
            self.line.push(' ');
        }
    }

    fn print(&mut self, s: &str) {
        self.line.push_str(s);
    }

    fn send_buffer(&mut self) {
        log::info!("[display] {}", self.line);
    }
}

/// Transport whose wire is its own inbound queue: every transmitted
/// frame arrives back immediately and the completion fires at once.
pub struct LoopbackBus {
    inbound: InboundPort,
    completion: TxCompletion,
}

impl LoopbackBus {
    pub fn new(completion: TxCompletion, inbound: InboundPort) -> Self {
        Self {
            inbound,
            completion,
        }
    }
}

impl BusTransmit for LoopbackBus {
    fn load_mailbox(&mut self, frame: WireFrame) -> Result<(), BusError> {
        self.inbound.push(frame);
        self.completion.complete_one();
        Ok(())
    }
}
