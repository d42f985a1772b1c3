//! End-to-end event path: scanner → outbound queue → bus → inbound
//! queue → decoder → voice table. The tasks are pumped synchronously
//! so the ordering assertions are deterministic.

use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver};
use kb_core::{Controls, NoteEvent, Role, Waveform, WireFrame, STEP_SIZES};
use kb_engine::{AudioEngine, DAC_SILENCE};
use kb_module::sim::{LoopbackBus, SimPanel};
use kb_module::{
    BusSenderTask, EventDecoderTask, InboundPort, InputScannerTask, SharedState, TxCompletion,
    TxMailboxes,
};
use ringbuf::traits::{Consumer, Split};
use ringbuf::{HeapCons, HeapRb};

struct Rig {
    panel: SimPanel,
    scanner: InputScannerTask,
    sender: BusSenderTask,
    decoder: EventDecoderTask,
    engine: AudioEngine,
    controls: Arc<Controls>,
    shared: Arc<SharedState>,
    outbound_rx: Receiver<NoteEvent>,
    inbound_rx: Receiver<WireFrame>,
    commands: HeapCons<NoteEvent>,
}

fn rig(role: Role) -> Rig {
    let (panel, matrix) = SimPanel::new();
    let controls = Arc::new(Controls::new(role, Waveform::Sawtooth));
    let shared = Arc::new(SharedState::new());

    let (outbound_tx, outbound_rx) = bounded(36);
    let (inbound_tx, inbound_rx) = bounded(36);
    let inbound = InboundPort::new(inbound_tx);
    let mailboxes = Arc::new(TxMailboxes::new(3));
    let transport = Box::new(LoopbackBus::new(
        TxCompletion::new(mailboxes.clone()),
        inbound.clone(),
    ));
    let (command_tx, commands) = HeapRb::<NoteEvent>::new(64).split();

    let scanner = InputScannerTask::new(
        Box::new(matrix),
        shared.clone(),
        controls.clone(),
        outbound_tx,
        Duration::from_millis(20),
    );
    let sender = BusSenderTask::new(
        outbound_rx.clone(),
        transport,
        mailboxes,
        controls.clone(),
        inbound,
    );
    let decoder = EventDecoderTask::new(inbound_rx.clone(), shared.clone(), command_tx);
    let engine = AudioEngine::new(controls.clone());

    Rig {
        panel,
        scanner,
        sender,
        decoder,
        engine,
        controls,
        shared,
        outbound_rx,
        inbound_rx,
        commands,
    }
}

impl Rig {
    /// Run one scan and push everything it produced all the way into
    /// the voice table.
    fn scan_and_pump(&mut self) {
        self.scanner.scan_once();
        while let Ok(event) = self.outbound_rx.try_recv() {
            self.sender.forward_one(event);
        }
        while let Ok(frame) = self.inbound_rx.try_recv() {
            self.decoder.decode_one(frame);
        }
        while let Some(event) = self.commands.try_pop() {
            self.engine.apply_event(event);
        }
    }

    fn voice_steps(&self) -> Vec<u32> {
        self.engine
            .voices()
            .as_slice()
            .iter()
            .map(|v| v.step_size)
            .collect()
    }
}

#[test]
fn local_presses_reach_voice_table_in_order() {
    let mut rig = rig(Role::Receiver);

    rig.panel.press_key(0);
    rig.panel.press_key(4);
    rig.panel.press_key(7);
    rig.scan_and_pump();

    assert_eq!(
        rig.voice_steps(),
        vec![STEP_SIZES[0], STEP_SIZES[4], STEP_SIZES[7]]
    );
}

#[test]
fn release_travels_the_same_path() {
    let mut rig = rig(Role::Receiver);

    rig.panel.press_key(0);
    rig.panel.press_key(4);
    rig.panel.press_key(7);
    rig.scan_and_pump();

    rig.panel.release_key(4);
    rig.scan_and_pump();

    assert_eq!(rig.voice_steps(), vec![STEP_SIZES[0], STEP_SIZES[7]]);
}

#[test]
fn press_release_sequence_is_preserved_across_scans() {
    let mut rig = rig(Role::Receiver);

    for note in [2usize, 5, 9] {
        rig.panel.press_key(note);
        rig.scan_and_pump();
        rig.panel.release_key(note);
        rig.scan_and_pump();
    }

    assert!(rig.voice_steps().is_empty());
    // The last frame through the wire was the final release.
    let rx = rig.shared.snapshot().rx_message;
    assert_eq!(rx[0], b'R');
    assert_eq!(rx[2], 9);
}

#[test]
fn receiver_module_renders_its_own_keys() {
    let mut rig = rig(Role::Receiver);

    rig.panel.press_key(9);
    rig.scan_and_pump();

    assert_eq!(rig.engine.voices().len(), 1);
    assert_ne!(rig.engine.render_sample(), DAC_SILENCE);
}

#[test]
fn sender_module_fills_the_table_but_stays_silent() {
    // With the transport in loopback, a sender hears its own frames on
    // the wire; the voice table fills but the DAC stays at mid-rail.
    let mut rig = rig(Role::Sender);

    rig.panel.press_key(9);
    rig.scan_and_pump();

    assert_eq!(rig.engine.voices().len(), 1);
    for _ in 0..10 {
        assert_eq!(rig.engine.render_sample(), DAC_SILENCE);
    }
}

#[test]
fn events_carry_the_scanned_octave_on_the_wire() {
    let mut rig = rig(Role::Receiver);
    rig.controls.knobs[kb_core::KNOB_OCTAVE].set_rotation(6);

    rig.panel.press_key(3);
    rig.scan_and_pump();

    let rx = rig.shared.snapshot().rx_message;
    assert_eq!(rx[1], 6);
}

#[test]
fn retrigger_after_release_leaves_one_voice() {
    let mut rig = rig(Role::Receiver);

    rig.panel.press_key(9);
    rig.scan_and_pump();
    rig.panel.release_key(9);
    rig.scan_and_pump();
    rig.panel.press_key(9);
    rig.scan_and_pump();

    assert_eq!(rig.voice_steps(), vec![STEP_SIZES[9]]);
}

#[test]
fn remote_frames_and_local_keys_share_the_inbound_path() {
    // A frame arriving from another module lands in the same queue the
    // local loopback uses; both end up as voices.
    let mut rig = rig(Role::Receiver);

    rig.panel.press_key(0);
    rig.scan_and_pump();

    rig.decoder.decode_one(NoteEvent::press(5, 7).to_wire());
    while let Some(event) = rig.commands.try_pop() {
        rig.engine.apply_event(event);
    }

    assert_eq!(rig.voice_steps(), vec![STEP_SIZES[0], STEP_SIZES[7]]);
}
