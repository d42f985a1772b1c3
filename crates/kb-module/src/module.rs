//! Module bring-up: owns the queues and spawns the task set.
//!
//! Task priorities on the target are fixed: the audio render loop
//! stands in for the sample interrupt (paced by sink backpressure),
//! the scanner runs at priority 2 on its 20 ms tick, and the decoder,
//! sender, display and monitor run at priority 1, the first two
//! event-driven on their queues.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::bounded;
use kb_audio::{AudioError, AudioSink};
use kb_core::{Controls, NoteEvent};
use kb_engine::AudioEngine;
use ringbuf::traits::{Consumer, Split};
use ringbuf::HeapRb;

use crate::bus::{BusSenderTask, BusTransmit, InboundPort, TxCompletion, TxMailboxes};
use crate::config::ModuleConfig;
use crate::decoder::EventDecoderTask;
use crate::display::{init_display, DisplayTask};
use crate::hw::{DisplayDriver, JoystickAdc, MatrixIo};
use crate::monitor::DebugMonitorTask;
use crate::scanner::InputScannerTask;
use crate::shared::SharedState;

/// Fatal startup errors. The module either comes up whole or not at
/// all; there is no partial recovery.
#[derive(Debug)]
pub enum ModuleError {
    /// Audio sink failed to initialize or start
    Audio(AudioError),
}

impl std::fmt::Display for ModuleError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ModuleError::Audio(e) => write!(f, "Audio startup error: {}", e),
        }
    }
}

impl std::error::Error for ModuleError {}

impl From<AudioError> for ModuleError {
    fn from(e: AudioError) -> Self {
        ModuleError::Audio(e)
    }
}

/// The physical collaborators a module is wired to.
pub struct ModuleHardware {
    pub matrix: Box<dyn MatrixIo>,
    pub joystick: Box<dyn JoystickAdc>,
    pub display: Box<dyn DisplayDriver>,
    pub sink: Box<dyn AudioSink>,
}

/// A running synthesizer module: six tasks over shared state.
pub struct SynthModule {
    controls: Arc<Controls>,
    shared: Arc<SharedState>,
    inbound: InboundPort,
    stop: Arc<AtomicBool>,
    threads: Vec<JoinHandle<()>>,
}

impl SynthModule {
    /// Bring the module up. `make_bus` builds the transport driver
    /// around the completion handle (for its transmit interrupt) and
    /// the inbound port (for its receive interrupt).
    pub fn start<F>(
        config: ModuleConfig,
        mut hw: ModuleHardware,
        make_bus: F,
    ) -> Result<Self, ModuleError>
    where
        F: FnOnce(TxCompletion, InboundPort) -> Box<dyn BusTransmit>,
    {
        let controls = Arc::new(Controls::new(config.role, config.waveform));
        let shared = Arc::new(SharedState::new());
        let stop = Arc::new(AtomicBool::new(false));

        let (outbound_tx, outbound_rx) = bounded::<NoteEvent>(config.outbound_depth);
        let (inbound_tx, inbound_rx) = bounded(config.inbound_depth);
        let inbound = InboundPort::new(inbound_tx);
        let mailboxes = Arc::new(TxMailboxes::new(config.tx_mailboxes));
        let transport = make_bus(TxCompletion::new(mailboxes.clone()), inbound.clone());
        let (command_tx, mut command_rx) = HeapRb::<NoteEvent>::new(config.command_depth).split();

        init_display(hw.matrix.as_mut(), hw.display.as_mut());
        hw.sink.start()?;
        log::info!(
            "keybus module up: role={} waveform={}",
            config.role.label(),
            config.waveform.name()
        );

        let mut threads = Vec::new();

        // Audio render loop: the sample interrupt stand-in. Sink
        // backpressure paces it to the sample rate.
        {
            let mut engine = AudioEngine::new(controls.clone());
            let mut sink = hw.sink;
            let stop = stop.clone();
            threads.push(thread::spawn(move || {
                while !stop.load(Ordering::Relaxed) {
                    while let Some(event) = command_rx.try_pop() {
                        engine.apply_event(event);
                    }
                    let sample = engine.render_sample();
                    sink.write_spin(sample);
                }
                if let Err(e) = sink.stop() {
                    log::warn!("audio sink stop failed: {}", e);
                }
            }));
        }

        let scanner = InputScannerTask::new(
            hw.matrix,
            shared.clone(),
            controls.clone(),
            outbound_tx,
            config.scan_period,
        );
        {
            let stop = stop.clone();
            threads.push(thread::spawn(move || scanner.run(stop)));
        }

        let decoder = EventDecoderTask::new(inbound_rx, shared.clone(), command_tx);
        {
            let stop = stop.clone();
            threads.push(thread::spawn(move || decoder.run(stop)));
        }

        let sender = BusSenderTask::new(
            outbound_rx,
            transport,
            mailboxes,
            controls.clone(),
            inbound.clone(),
        );
        {
            let stop = stop.clone();
            threads.push(thread::spawn(move || sender.run(stop)));
        }

        let display = DisplayTask::new(
            hw.display,
            hw.joystick,
            shared.clone(),
            controls.clone(),
            config.joy_raw_low,
            config.joy_raw_high,
            config.display_period,
        );
        {
            let stop = stop.clone();
            threads.push(thread::spawn(move || display.run(stop)));
        }

        let monitor = DebugMonitorTask::new(
            shared.clone(),
            controls.clone(),
            inbound.clone(),
            config.monitor_period,
        );
        {
            let stop = stop.clone();
            threads.push(thread::spawn(move || monitor.run(stop)));
        }

        Ok(Self {
            controls,
            shared,
            inbound,
            stop,
            threads,
        })
    }

    pub fn controls(&self) -> &Arc<Controls> {
        &self.controls
    }

    pub fn shared(&self) -> &Arc<SharedState> {
        &self.shared
    }

    /// Where an external bus receive interrupt hands frames in.
    pub fn inbound_port(&self) -> InboundPort {
        self.inbound.clone()
    }

    /// Stop all tasks and wait for them.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        for handle in self.threads.drain(..) {
            let _ = handle.join();
        }
    }
}

impl Drop for SynthModule {
    fn drop(&mut self) {
        self.shutdown();
    }
}
