use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender, TrySendError};
use std::time::Duration;

/// Bounded FIFO of outbound wire lines.
///
/// Producers never block: `push` fails immediately once `capacity` lines are
/// pending. Handles are cheap clones sharing the same buffer.
#[derive(Debug, Clone)]
pub struct OutboundQueue {
    sender: Sender<String>,
    receiver: Receiver<String>,
    capacity: usize,
}

impl OutboundQueue {
    pub fn new(capacity: usize) -> Self {
        let (sender, receiver) = channel::bounded(capacity);
        Self {
            sender,
            receiver,
            capacity,
        }
    }

    /// Enqueue without blocking. Returns false when the queue is full.
    pub fn push(&self, line: String) -> bool {
        match self.sender.try_send(line) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => false,
            // Both ends live in `self`, so the channel cannot be disconnected.
            Err(TrySendError::Disconnected(_)) => false,
        }
    }

    /// Wait up to `timeout` for the next line.
    pub fn pop_timeout(&self, timeout: Duration) -> Option<String> {
        match self.receiver.recv_timeout(timeout) {
            Ok(line) => Some(line),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
        }
    }

    /// Discard everything pending and return how many lines were dropped.
    pub fn drain(&self) -> usize {
        self.receiver.try_iter().count()
    }

    pub fn len(&self) -> usize {
        self.receiver.len()
    }

    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
