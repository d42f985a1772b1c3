//! Inbound event decoder.
//!
//! Blocks on the inbound frame queue, mirrors the raw frame for the
//! display, validates it, and forwards the note event to the audio
//! engine through a wait-free command ring. Malformed frames are
//! discarded. The single decoder task is what guarantees frames are
//! processed in receive order.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crossbeam_channel::{Receiver, RecvTimeoutError};
use kb_core::{NoteEvent, WireFrame};
use ringbuf::traits::Producer;
use ringbuf::HeapProd;

use crate::config::QUEUE_POLL;
use crate::shared::SharedState;

pub struct EventDecoderTask {
    inbound: Receiver<WireFrame>,
    shared: Arc<SharedState>,
    commands: HeapProd<NoteEvent>,
}

impl EventDecoderTask {
    pub fn new(
        inbound: Receiver<WireFrame>,
        shared: Arc<SharedState>,
        commands: HeapProd<NoteEvent>,
    ) -> Self {
        Self {
            inbound,
            shared,
            commands,
        }
    }

    /// Mirror, validate and forward one frame.
    pub fn decode_one(&mut self, frame: WireFrame) {
        self.shared.set_rx_message(frame);

        let Some(event) = NoteEvent::from_wire(&frame) else {
            log::debug!("malformed bus frame {:02x?}", frame);
            return;
        };

        // The ring drains at the sample rate; spin through the rare
        // burst that outruns it rather than dropping a note.
        let mut pending = event;
        while let Err(rejected) = self.commands.try_push(pending) {
            pending = rejected;
            std::hint::spin_loop();
        }
    }

    pub fn run(mut self, stop: Arc<AtomicBool>) {
        log::info!("event decoder running");
        while !stop.load(Ordering::Relaxed) {
            match self.inbound.recv_timeout(QUEUE_POLL) {
                Ok(frame) => self.decode_one(frame),
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
    }
}
