//! Bounded control command queue.
//!
//! Any thread may post [`ControlCommand`]s through a [`ControlHandle`].
//! The executive drains the queue at frame boundaries only, so a command
//! never takes effect mid-frame. Each command receives a monotonic
//! sequence number at submission; receipts carry it back.
//!
//! Once the executive terminates the queue is closed: anything still
//! queued is rejected with [`ControlError::ShuttingDown`] and later
//! posts fail immediately.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError, TrySendError};

use cadence_core::{ControlCommand, ControlError, Receipt};

/// A queued command with its sequence number and optional reply slot.
pub(crate) struct Envelope {
    pub seq: u64,
    pub command: ControlCommand,
    pub reply: Option<Sender<Receipt>>,
}

impl Envelope {
    /// Deliver the receipt to a waiting submitter, if any.
    pub fn answer(self, receipt: Receipt) {
        if let Some(reply) = self.reply {
            // The submitter may have given up waiting.
            let _ = reply.send(receipt);
        }
    }
}

/// How often a blocked [`ControlHandle::submit`] looks for a closed queue.
const CLOSE_POLL: Duration = Duration::from_millis(20);

/// Sending side of the control queue. Cheap to clone.
#[derive(Clone)]
pub struct ControlHandle {
    tx: Sender<Envelope>,
    seq: Arc<AtomicU64>,
    closed: Arc<AtomicBool>,
}

impl ControlHandle {
    /// Queue a command without waiting for it to apply.
    ///
    /// Returns the command's sequence number. Fails with
    /// [`ControlError::QueueFull`] when the queue is at capacity and
    /// [`ControlError::ShuttingDown`] once the executive is gone.
    pub fn post(&self, command: ControlCommand) -> Result<u64, ControlError> {
        self.send(command, None)
    }

    /// Queue a command and block until the executive applies or
    /// rejects it at the next frame boundary.
    ///
    /// Returns [`ControlError::ShuttingDown`] if the executive terminates
    /// before the command is seen.
    pub fn submit(&self, command: ControlCommand) -> Result<Receipt, ControlError> {
        let (reply_tx, reply_rx) = crossbeam_channel::bounded(1);
        self.send(command, Some(reply_tx))?;
        loop {
            match reply_rx.recv_timeout(CLOSE_POLL) {
                Ok(receipt) => return Ok(receipt),
                Err(RecvTimeoutError::Disconnected) => return Err(ControlError::ShuttingDown),
                Err(RecvTimeoutError::Timeout) if self.is_closed() => {
                    // A command sent while the queue was closing is never drained.
                    return reply_rx.try_recv().map_err(|_| ControlError::ShuttingDown);
                }
                Err(RecvTimeoutError::Timeout) => {}
            }
        }
    }

    /// Whether the executive has terminated and stopped taking commands.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn send(
        &self,
        command: ControlCommand,
        reply: Option<Sender<Receipt>>,
    ) -> Result<u64, ControlError> {
        if self.is_closed() {
            return Err(ControlError::ShuttingDown);
        }
        let seq = self.seq.fetch_add(1, Ordering::Relaxed);
        self.tx
            .try_send(Envelope {
                seq,
                command,
                reply,
            })
            .map_err(|e| match e {
                TrySendError::Full(_) => ControlError::QueueFull,
                TrySendError::Disconnected(_) => ControlError::ShuttingDown,
            })?;
        Ok(seq)
    }
}

/// Receiving side, owned by the executive.
pub(crate) struct ControlQueue {
    tx: Sender<Envelope>,
    rx: Receiver<Envelope>,
    seq: Arc<AtomicU64>,
    closed: Arc<AtomicBool>,
    held: VecDeque<Envelope>,
}

impl ControlQueue {
    pub fn new(capacity: usize) -> Self {
        let (tx, rx) = crossbeam_channel::bounded(capacity.max(1));
        Self {
            tx,
            rx,
            seq: Arc::new(AtomicU64::new(0)),
            closed: Arc::new(AtomicBool::new(false)),
            held: VecDeque::new(),
        }
    }

    pub fn handle(&self) -> ControlHandle {
        ControlHandle {
            tx: self.tx.clone(),
            seq: Arc::clone(&self.seq),
            closed: Arc::clone(&self.closed),
        }
    }

    /// Block for up to `timeout` until a command is available. Returns
    /// whether one is.
    pub fn wait(&mut self, timeout: Duration) -> bool {
        if !self.held.is_empty() {
            return true;
        }
        match self.rx.recv_timeout(timeout) {
            Ok(envelope) => {
                self.held.push_back(envelope);
                true
            }
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => false,
        }
    }

    /// Everything queued so far, in submission order.
    pub fn drain(&mut self) -> Vec<Envelope> {
        let mut out: Vec<Envelope> = self.held.drain(..).collect();
        out.extend(self.rx.try_iter());
        out.sort_by_key(|e| e.seq);
        out
    }

    /// Stop taking commands and reject everything still queued. Returns
    /// the number of commands rejected.
    pub fn close(&mut self) -> usize {
        let mut rejected = self.reject_queued();
        self.closed.store(true, Ordering::Release);
        // Commands that passed the closed check just before the store.
        rejected += self.reject_queued();
        rejected
    }

    fn reject_queued(&mut self) -> usize {
        let mut count = 0;
        loop {
            let envelope = match self.held.pop_front() {
                Some(e) => e,
                None => match self.rx.try_recv() {
                    Ok(e) => e,
                    Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
                },
            };
            let seq = envelope.seq;
            envelope.answer(Receipt::rejected(seq, ControlError::ShuttingDown));
            count += 1;
        }
        count
    }
}
