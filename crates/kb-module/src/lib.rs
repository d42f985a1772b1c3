//! Task fabric for a keybus synthesizer module.
//!
//! Wires the scanner, decoder, bus sender, display refresher, debug
//! monitor and audio render loop over bounded queues and shared state,
//! and defines the hardware collaborator interfaces the tasks drive.

mod bus;
mod config;
mod decoder;
mod display;
mod hw;
mod module;
mod monitor;
mod scanner;
mod shared;
pub mod sim;
mod time;

pub use bus::{BusError, BusSenderTask, BusTransmit, InboundPort, TxCompletion, TxMailboxes};
pub use config::ModuleConfig;
pub use decoder::EventDecoderTask;
pub use display::{init_display, map_adc, DisplayTask, DISPLAY_FONT};
pub use hw::{set_out_mux_bit, DisplayDriver, JoystickAdc, MatrixIo, DEN_BIT, DRST_BIT};
pub use module::{ModuleError, ModuleHardware, SynthModule};
pub use monitor::DebugMonitorTask;
pub use scanner::{
    InputScannerTask, HANDSHAKE_EAST_BIT, HANDSHAKE_WEST_BIT, NOTE_KEY_COUNT, SWITCH_JOYSTICK_BIT,
    SWITCH_KNOB0_BIT, SWITCH_KNOB1_BIT, SWITCH_KNOB2_BIT, SWITCH_KNOB3_BIT,
};
pub use shared::{PanelState, SharedState};
pub use time::Ticker;
