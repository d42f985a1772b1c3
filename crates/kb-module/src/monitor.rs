//! Debug monitor: periodic state digest on the log.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use kb_core::{Controls, KNOB_TRANSPOSE, KNOB_VOLUME};

use crate::bus::InboundPort;
use crate::shared::SharedState;
use crate::time::Ticker;

pub struct DebugMonitorTask {
    shared: Arc<SharedState>,
    controls: Arc<Controls>,
    inbound: InboundPort,
    period: Duration,
}

impl DebugMonitorTask {
    pub fn new(
        shared: Arc<SharedState>,
        controls: Arc<Controls>,
        inbound: InboundPort,
        period: Duration,
    ) -> Self {
        Self {
            shared,
            controls,
            inbound,
            period,
        }
    }

    pub fn log_digest(&self) {
        let panel = self.shared.snapshot();
        log::debug!(
            "role={} wf={} oct={} vol={} transpose={} voices={} inputs={:07x} rx_dropped={}",
            self.controls.role().label(),
            self.controls.waveform().name(),
            self.controls.octave(),
            self.controls.knobs[KNOB_VOLUME].rotation(),
            self.controls.knobs[KNOB_TRANSPOSE].rotation(),
            self.controls.active_voices(),
            panel.inputs,
            self.inbound.dropped(),
        );
    }

    pub fn run(self, stop: Arc<AtomicBool>) {
        let mut ticker = Ticker::new(self.period);
        while !stop.load(Ordering::Relaxed) {
            ticker.wait();
            self.log_digest();
        }
    }
}
