//! Bus plumbing: transmit mailboxes, the inbound port, and the sender
//! task.
//!
//! The transport driver itself is external; the core hands it 8-byte
//! frames one hardware mailbox at a time. Three mailboxes exist, so a
//! counting semaphore gates the sender and the driver's completion
//! interrupt releases a unit.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Condvar, Mutex};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use kb_core::{Controls, NoteEvent, Role, WireFrame};

use crate::config::QUEUE_POLL;

/// Error type for bus operations.
#[derive(Debug)]
pub enum BusError {
    /// The transport rejected a mailbox load
    MailboxLoad(String),
    /// The transport is not available
    Offline,
}

impl std::fmt::Display for BusError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BusError::MailboxLoad(msg) => write!(f, "Mailbox load error: {}", msg),
            BusError::Offline => write!(f, "Bus transport offline"),
        }
    }
}

impl std::error::Error for BusError {}

/// Low-level frame transmission, implemented by the transport driver.
pub trait BusTransmit: Send {
    /// Load a frame into a free hardware mailbox. Only called while a
    /// mailbox permit is held; the driver signals its completion
    /// interrupt through [`TxCompletion`].
    fn load_mailbox(&mut self, frame: WireFrame) -> Result<(), BusError>;
}

/// Counting semaphore over the hardware transmit mailboxes.
#[derive(Debug)]
pub struct TxMailboxes {
    free: Mutex<u8>,
    available: Condvar,
}

impl TxMailboxes {
    pub fn new(count: u8) -> Self {
        Self {
            free: Mutex::new(count),
            available: Condvar::new(),
        }
    }

    /// Take one mailbox, blocking until one is free.
    pub fn acquire(&self) {
        let mut free = self.free.lock().unwrap_or_else(|e| e.into_inner());
        while *free == 0 {
            free = self
                .available
                .wait(free)
                .unwrap_or_else(|e| e.into_inner());
        }
        *free -= 1;
    }

    /// Return one mailbox and wake a waiting sender.
    pub fn release(&self) {
        let mut free = self.free.lock().unwrap_or_else(|e| e.into_inner());
        *free += 1;
        self.available.notify_one();
    }

    pub fn free_count(&self) -> u8 {
        *self.free.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Handle the transport driver uses to signal a finished transmission
/// (typically from its completion interrupt).
#[derive(Clone)]
pub struct TxCompletion {
    mailboxes: Arc<TxMailboxes>,
}

impl TxCompletion {
    pub fn new(mailboxes: Arc<TxMailboxes>) -> Self {
        Self { mailboxes }
    }

    pub fn complete_one(&self) {
        self.mailboxes.release();
    }
}

/// Where the bus receive interrupt pushes inbound frames.
///
/// The push never blocks; when the inbound queue is full the frame is
/// dropped and counted. A missed note is preferable to stalling the
/// interrupt.
#[derive(Clone)]
pub struct InboundPort {
    tx: Sender<WireFrame>,
    dropped: Arc<AtomicU32>,
}

impl InboundPort {
    pub fn new(tx: Sender<WireFrame>) -> Self {
        Self {
            tx,
            dropped: Arc::new(AtomicU32::new(0)),
        }
    }

    /// Non-blocking enqueue, safe from interrupt context.
    pub fn push(&self, frame: WireFrame) {
        if self.tx.try_send(frame).is_err() {
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Frames dropped on overflow since startup.
    pub fn dropped(&self) -> u32 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// Drains the outbound event queue to the wire.
pub struct BusSenderTask {
    outbound: Receiver<NoteEvent>,
    transport: Box<dyn BusTransmit>,
    mailboxes: Arc<TxMailboxes>,
    controls: Arc<Controls>,
    loopback: InboundPort,
}

impl BusSenderTask {
    pub fn new(
        outbound: Receiver<NoteEvent>,
        transport: Box<dyn BusTransmit>,
        mailboxes: Arc<TxMailboxes>,
        controls: Arc<Controls>,
        loopback: InboundPort,
    ) -> Self {
        Self {
            outbound,
            transport,
            mailboxes,
            controls,
            loopback,
        }
    }

    /// Route one dequeued event. In SENDER role the frame goes to a
    /// hardware mailbox; in RECEIVER role it is looped back into the
    /// inbound queue so local keys reach the voice table through the
    /// same path as remote ones. The queue is drained in both roles,
    /// which is what keeps the scanner's blocking send from wedging.
    pub fn forward_one(&mut self, event: NoteEvent) {
        if self.controls.role() == Role::Sender {
            self.mailboxes.acquire();
            if let Err(e) = self.transport.load_mailbox(event.to_wire()) {
                log::warn!("bus transmit failed: {}", e);
                self.mailboxes.release();
            }
        } else {
            self.loopback.push(event.to_wire());
        }
    }

    pub fn run(mut self, stop: Arc<AtomicBool>) {
        log::info!("bus sender running");
        while !stop.load(Ordering::Relaxed) {
            match self.outbound.recv_timeout(QUEUE_POLL) {
                Ok(event) => self.forward_one(event),
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::bounded;
    use kb_core::Waveform;
    use std::sync::Mutex as StdMutex;

    /// Transport that records frames and completes on demand.
    struct RecordingBus {
        frames: Arc<StdMutex<Vec<WireFrame>>>,
    }

    impl BusTransmit for RecordingBus {
        fn load_mailbox(&mut self, frame: WireFrame) -> Result<(), BusError> {
            self.frames
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .push(frame);
            Ok(())
        }
    }

    fn sender_fixture(
        role: Role,
    ) -> (
        BusSenderTask,
        Sender<NoteEvent>,
        Receiver<WireFrame>,
        Arc<StdMutex<Vec<WireFrame>>>,
        Arc<TxMailboxes>,
    ) {
        let (out_tx, out_rx) = bounded(8);
        let (in_tx, in_rx) = bounded(8);
        let frames = Arc::new(StdMutex::new(Vec::new()));
        let mailboxes = Arc::new(TxMailboxes::new(3));
        let task = BusSenderTask::new(
            out_rx,
            Box::new(RecordingBus { frames: frames.clone() }),
            mailboxes.clone(),
            Arc::new(Controls::new(role, Waveform::Sawtooth)),
            InboundPort::new(in_tx),
        );
        (task, out_tx, in_rx, frames, mailboxes)
    }

    #[test]
    fn sender_role_loads_mailbox() {
        let (mut task, _out, _in, frames, mailboxes) = sender_fixture(Role::Sender);
        task.forward_one(NoteEvent::press(4, 9));
        let sent = frames.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0][0], b'P');
        // Completion has not fired yet, so one mailbox is in flight.
        assert_eq!(mailboxes.free_count(), 2);
    }

    #[test]
    fn receiver_role_loops_back_locally() {
        let (mut task, _out, inbound, frames, mailboxes) = sender_fixture(Role::Receiver);
        task.forward_one(NoteEvent::press(4, 0));
        assert!(frames.lock().unwrap().is_empty());
        assert_eq!(mailboxes.free_count(), 3);
        let frame = inbound.try_recv().unwrap();
        assert_eq!(frame[2], 0);
    }

    #[test]
    fn completion_releases_mailbox() {
        let mailboxes = Arc::new(TxMailboxes::new(3));
        let completion = TxCompletion::new(mailboxes.clone());
        mailboxes.acquire();
        mailboxes.acquire();
        assert_eq!(mailboxes.free_count(), 1);
        completion.complete_one();
        assert_eq!(mailboxes.free_count(), 2);
    }

    #[test]
    fn inbound_port_drops_on_overflow() {
        let (tx, rx) = bounded(2);
        let port = InboundPort::new(tx);
        port.push([1; 8]);
        port.push([2; 8]);
        port.push([3; 8]);
        assert_eq!(port.dropped(), 1);
        assert_eq!(rx.try_recv().unwrap(), [1; 8]);
        assert_eq!(rx.try_recv().unwrap(), [2; 8]);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn mailboxes_block_at_zero_until_released() {
        let mailboxes = Arc::new(TxMailboxes::new(1));
        mailboxes.acquire();

        let remote = mailboxes.clone();
        let waiter = std::thread::spawn(move || {
            remote.acquire();
        });
        // Give the waiter time to park, then free the mailbox.
        std::thread::sleep(std::time::Duration::from_millis(20));
        mailboxes.release();
        waiter.join().unwrap();
        assert_eq!(mailboxes.free_count(), 0);
    }
}
