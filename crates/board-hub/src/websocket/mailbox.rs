//! Bounded per-connection outbound queue.
//!
//! The sending half lives inside the shared [`Connection`](super::connection::Connection)
//! and is only ever used with non-blocking `try_send`. The receiving half is
//! owned by the outbound pump. Closing drops the sender, so the pump drains
//! whatever is already queued and then observes end-of-stream.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::{TryRecvError, TrySendError};

/// One encoded chat frame, shared across every recipient of a broadcast.
pub type Payload = Arc<str>;

/// Why an enqueue was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum EnqueueError {
    /// Every slot is occupied. The recipient is too slow.
    #[error("mailbox full")]
    Full,
    /// The mailbox was closed or its reader is gone.
    #[error("mailbox closed")]
    Closed,
}

/// Create a mailbox with `capacity` slots (at least one).
pub fn mailbox(capacity: usize) -> (MailboxSender, Mailbox) {
    let capacity = capacity.max(1);
    let (tx, rx) = mpsc::channel(capacity);
    (
        MailboxSender {
            tx: Mutex::new(Some(tx)),
        },
        Mailbox { rx, capacity },
    )
}

/// Write side of a mailbox. Never blocks.
pub struct MailboxSender {
    tx: Mutex<Option<mpsc::Sender<Payload>>>,
}

impl MailboxSender {
    /// Queue a payload if a slot is free.
    pub fn try_enqueue(&self, payload: Payload) -> Result<(), EnqueueError> {
        let guard = self.tx.lock();
        let Some(tx) = guard.as_ref() else {
            return Err(EnqueueError::Closed);
        };
        tx.try_send(payload).map_err(|e| match e {
            TrySendError::Full(_) => EnqueueError::Full,
            TrySendError::Closed(_) => EnqueueError::Closed,
        })
    }

    /// Close the mailbox. Returns `true` only for the call that closed it.
    pub fn close(&self) -> bool {
        self.tx.lock().take().is_some()
    }

    /// Whether [`close`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.tx.lock().is_none()
    }
}

/// Read side of a mailbox, owned by the outbound pump.
pub struct Mailbox {
    rx: mpsc::Receiver<Payload>,
    capacity: usize,
}

impl Mailbox {
    /// Wait for the next payload. `None` once closed and drained.
    pub async fn take(&mut self) -> Option<Payload> {
        self.rx.recv().await
    }

    /// Take a payload only if one is already queued.
    pub fn take_ready(&mut self) -> Option<Payload> {
        match self.rx.try_recv() {
            Ok(payload) => Some(payload),
            Err(TryRecvError::Empty | TryRecvError::Disconnected) => None,
        }
    }

    /// Number of payloads waiting.
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    /// Whether nothing is waiting.
    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    /// Slot count this mailbox was created with.
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
