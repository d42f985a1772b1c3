//! Module configuration.

use std::time::Duration;

use kb_core::{Role, Waveform};

/// How long blocked queue receives wait before rechecking the stop
/// flag.
pub(crate) const QUEUE_POLL: Duration = Duration::from_millis(50);

/// Startup configuration for a module. Board-specific calibration
/// (joystick ADC endpoints) lives here rather than in code.
#[derive(Clone, Debug)]
pub struct ModuleConfig {
    pub role: Role,
    pub waveform: Waveform,
    /// Key matrix sweep period.
    pub scan_period: Duration,
    /// Status display refresh period.
    pub display_period: Duration,
    /// Debug monitor period.
    pub monitor_period: Duration,
    /// Inbound event queue depth (frames dropped beyond this).
    pub inbound_depth: usize,
    /// Outbound event queue depth (scanner blocks beyond this).
    pub outbound_depth: usize,
    /// Decoder-to-engine command ring depth.
    pub command_depth: usize,
    /// Hardware transmit mailboxes.
    pub tx_mailboxes: u8,
    /// Joystick ADC reading that maps to 0.
    pub joy_raw_low: u16,
    /// Joystick ADC reading that maps to 12.
    pub joy_raw_high: u16,
}

impl Default for ModuleConfig {
    fn default() -> Self {
        Self {
            role: Role::Receiver,
            waveform: Waveform::Sawtooth,
            scan_period: Duration::from_millis(20),
            display_period: Duration::from_millis(100),
            monitor_period: Duration::from_secs(1),
            inbound_depth: 36,
            outbound_depth: 36,
            command_depth: 64,
            tx_mailboxes: 3,
            joy_raw_low: 800,
            joy_raw_high: 119,
        }
    }
}
