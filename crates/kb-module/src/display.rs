//! Status display refresher.
//!
//! Every 100 ms: sample the joystick ADCs, snapshot the panel under
//! its mutex, and redraw role, joystick position, waveform, volume,
//! octave, held note and the last received bus frame.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use kb_core::{Controls, NOTE_NAMES};

use crate::hw::{set_out_mux_bit, DisplayDriver, JoystickAdc, MatrixIo, DEN_BIT, DRST_BIT};
use crate::shared::SharedState;
use crate::time::Ticker;

/// Font the status screen renders with.
pub const DISPLAY_FONT: &str = "ncenB08";

/// Joystick axes are remapped onto this range, center 6.
const JOY_SCALE_MAX: i32 = 12;

/// Arduino-style linear remap with clamping; the source range may be
/// inverted (the board's ADC reads high at the low end of travel).
pub fn map_adc(value: u16, from_low: u16, from_high: u16, to_low: i32, to_high: i32) -> u8 {
    let span = from_high as i32 - from_low as i32;
    if span == 0 {
        return to_low as u8;
    }
    let mapped = (value as i32 - from_low as i32) * (to_high - to_low) / span + to_low;
    mapped.clamp(to_low.min(to_high), to_low.max(to_high)) as u8
}

/// Pulse the display logic reset and enable its power rail through the
/// output multiplexer, then select the status font.
pub fn init_display(matrix: &mut dyn MatrixIo, display: &mut dyn DisplayDriver) {
    set_out_mux_bit(matrix, DRST_BIT, false);
    matrix.settle();
    set_out_mux_bit(matrix, DRST_BIT, true);
    set_out_mux_bit(matrix, DEN_BIT, true);
    display.set_font(DISPLAY_FONT);
}

/// The 100 ms display task.
pub struct DisplayTask {
    display: Box<dyn DisplayDriver>,
    joystick: Box<dyn JoystickAdc>,
    shared: Arc<SharedState>,
    controls: Arc<Controls>,
    joy_raw_low: u16,
    joy_raw_high: u16,
    period: Duration,
}

impl DisplayTask {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        display: Box<dyn DisplayDriver>,
        joystick: Box<dyn JoystickAdc>,
        shared: Arc<SharedState>,
        controls: Arc<Controls>,
        joy_raw_low: u16,
        joy_raw_high: u16,
        period: Duration,
    ) -> Self {
        Self {
            display,
            joystick,
            shared,
            controls,
            joy_raw_low,
            joy_raw_high,
            period,
        }
    }

    pub fn refresh_once(&mut self) {
        let joy_x = map_adc(
            self.joystick.read_x(),
            self.joy_raw_low,
            self.joy_raw_high,
            0,
            JOY_SCALE_MAX,
        );
        let joy_y = map_adc(
            self.joystick.read_y(),
            self.joy_raw_low,
            self.joy_raw_high,
            0,
            JOY_SCALE_MAX,
        );
        self.controls.set_joystick(joy_x, joy_y);

        let panel = self.shared.snapshot();
        let role = self.controls.role();
        let waveform = self.controls.waveform();
        let volume = self.controls.volume_knob();
        let octave = self.controls.octave();

        self.display.clear_buffer();

        self.display.set_cursor(2, 10);
        self.display
            .print(&format!("{} ({},{})", role.label(), joy_x, joy_y));

        self.display.set_cursor(2, 20);
        self.display.print(&format!(
            "{} Volume: {} Pitch: {}",
            waveform.name(),
            volume,
            octave
        ));

        self.display.set_cursor(2, 30);
        match panel.last_key {
            Some(note) => self
                .display
                .print(&format!("Note: {}", NOTE_NAMES[note as usize])),
            None => self.display.print("No Key Pressed"),
        }
        self.display
            .draw_str(80, 30, &format_rx(&panel.rx_message));

        self.display.send_buffer();
    }

    pub fn run(mut self, stop: Arc<AtomicBool>) {
        log::info!(
            "display refresher running ({} ms period)",
            self.period.as_millis()
        );
        let mut ticker = Ticker::new(self.period);
        while !stop.load(Ordering::Relaxed) {
            ticker.wait();
            self.refresh_once();
        }
    }
}

/// Last RX event as `kind|octave|note`, or a dash before anything has
/// arrived.
fn format_rx(frame: &[u8; 8]) -> String {
    if frame[0] == 0 {
        return "-".to_string();
    }
    format!("{}|{}|{}", frame[0] as char, frame[1], frame[2])
}
