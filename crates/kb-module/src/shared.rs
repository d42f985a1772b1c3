//! Mutex-guarded composite panel state.
//!
//! Holds the fields too wide for a single atomic word: the 32-bit
//! input bitmap, the last received bus frame, and the last held key.
//! The lock is held for microseconds and never taken on the audio
//! path.

use std::sync::{Mutex, MutexGuard};

use kb_core::WireFrame;

/// Snapshot of the panel: raw input bitmap (active low), RX mirror,
/// and the most recently scanned held key.
#[derive(Clone, Copy, Debug, Default)]
pub struct PanelState {
    /// Raw matrix bitmap, one bit per logical input, active low.
    pub inputs: u32,
    /// Raw copy of the last inbound bus frame.
    pub rx_message: WireFrame,
    /// Note index of the most recently scanned held key.
    pub last_key: Option<u8>,
}

/// The shared panel state behind its mutex.
#[derive(Debug, Default)]
pub struct SharedState {
    panel: Mutex<PanelState>,
}

impl SharedState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the panel lock. A poisoned lock is recovered rather than
    /// propagated; the state is plain data and stays usable.
    pub fn lock(&self) -> MutexGuard<'_, PanelState> {
        self.panel.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Copy the current panel state out under the lock.
    pub fn snapshot(&self) -> PanelState {
        *self.lock()
    }

    pub fn set_rx_message(&self, frame: WireFrame) {
        self.lock().rx_message = frame;
    }
}
