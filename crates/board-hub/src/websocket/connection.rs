//! One live chat session.
//!
//! A [`Connection`] is shared (`Arc`) between the registry and the two pumps
//! serving its socket. Its state only moves forward:
//! `Connecting -> Active -> Closing -> Closed`.

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use board_core::{ConnectionId, ProjectId};
use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};

use super::mailbox::{self, EnqueueError, Mailbox, MailboxSender, Payload};

/// Lifecycle of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum ConnectionState {
    /// Upgraded but not yet registered.
    Connecting = 0,
    /// Registered and receiving broadcasts.
    Active = 1,
    /// Removed from the registry; mailbox closed; pumps winding down.
    Closing = 2,
    /// Both pumps have exited.
    Closed = 3,
}

impl ConnectionState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => Self::Connecting,
            1 => Self::Active,
            2 => Self::Closing,
            _ => Self::Closed,
        }
    }

    /// Lowercase label for logs and JSON.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Connecting => "connecting",
            Self::Active => "active",
            Self::Closing => "closing",
            Self::Closed => "closed",
        }
    }
}

/// A connected chat client.
pub struct Connection {
    id: ConnectionId,
    project_id: ProjectId,
    state: AtomicU8,
    outbox: MailboxSender,
    closing: CancellationToken,
    /// When this connection was established.
    pub connected_at: Instant,
    is_alive: AtomicBool,
}

impl Connection {
    /// Create a connection for `project_id` with a fresh id and a mailbox of
    /// `capacity` slots. The returned [`Mailbox`] belongs to the outbound pump.
    pub fn new(project_id: ProjectId, capacity: usize) -> (Arc<Self>, Mailbox) {
        Self::with_id(ConnectionId::new(), project_id, capacity)
    }

    /// Like [`new`](Self::new) with a caller-chosen id.
    pub fn with_id(id: ConnectionId, project_id: ProjectId, capacity: usize) -> (Arc<Self>, Mailbox) {
        let (outbox, inbox) = mailbox::mailbox(capacity);
        let conn = Arc::new(Self {
            id,
            project_id,
            state: AtomicU8::new(ConnectionState::Connecting as u8),
            outbox,
            closing: CancellationToken::new(),
            connected_at: Instant::now(),
            is_alive: AtomicBool::new(true),
        });
        (conn, inbox)
    }

    /// Connection id.
    pub fn id(&self) -> &ConnectionId {
        &self.id
    }

    /// Channel this connection belongs to. Fixed for its lifetime.
    pub fn project_id(&self) -> ProjectId {
        self.project_id
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Advance to `next` if that moves forward. Returns `true` on change.
    fn advance(&self, next: ConnectionState) -> bool {
        self.state
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |cur| {
                (cur < next as u8).then_some(next as u8)
            })
            .is_ok()
    }

    /// `Connecting -> Active`. Fails for any other starting state.
    pub(crate) fn activate(&self) -> bool {
        self.state
            .compare_exchange(
                ConnectionState::Connecting as u8,
                ConnectionState::Active as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    /// Move to `Closing`: close the mailbox and wake the inbound pump.
    /// Idempotent.
    pub(crate) fn begin_closing(&self) -> bool {
        let changed = self.advance(ConnectionState::Closing);
        let _ = self.outbox.close();
        self.closing.cancel();
        changed
    }

    /// Final transition once both pumps have exited.
    pub fn mark_closed(&self) {
        let _ = self.begin_closing();
        let _ = self.advance(ConnectionState::Closed);
    }

    /// Queue an encoded frame without waiting.
    pub(crate) fn enqueue(&self, payload: Payload) -> Result<(), EnqueueError> {
        self.outbox.try_enqueue(payload)
    }

    /// Resolves once the connection starts closing.
    pub fn closing(&self) -> WaitForCancellationFuture<'_> {
        self.closing.cancelled()
    }

    /// Whether the connection has started closing.
    pub fn is_closing(&self) -> bool {
        self.closing.is_cancelled()
    }

    /// Record peer activity.
    pub fn mark_alive(&self) {
        self.is_alive.store(true, Ordering::Relaxed);
    }

    /// Read and reset the alive flag.
    ///
    /// Returns `true` if the peer was heard from since the last check.
    pub fn check_alive(&self) -> bool {
        self.is_alive.swap(false, Ordering::Relaxed)
    }

    /// Connection age.
    pub fn age(&self) -> Duration {
        self.connected_at.elapsed()
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("project_id", &self.project_id)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}
