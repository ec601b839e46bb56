//! Channel membership and fan-out.
//!
//! All mutations and broadcasts are serialized by one lock. Nothing done
//! under the lock can suspend: delivery is a non-blocking enqueue into each
//! member's mailbox, and a member whose mailbox is full is evicted on the
//! spot. Socket I/O only ever happens in the pumps.
//!
//! Invariants held at every lock release:
//! - a connection is listed under exactly one project, its own
//! - a listed connection is `Active`
//! - no project maps to an empty member set

use std::collections::HashMap;
use std::sync::Arc;

use board_core::{ConnectionId, ProjectId};
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use super::connection::Connection;
use super::mailbox::{EnqueueError, Payload};
use crate::metrics as m;

type Members = HashMap<ConnectionId, Arc<Connection>>;

#[derive(Default)]
struct Channels {
    by_project: HashMap<ProjectId, Members>,
    members: usize,
    /// Set by `close_all`; no connection joins afterwards.
    sealed: bool,
}

impl Channels {
    fn detach(&mut self, project_id: ProjectId, id: &ConnectionId) -> Option<Arc<Connection>> {
        let members = self.by_project.get_mut(&project_id)?;
        let removed = members.remove(id);
        if members.is_empty() {
            let _ = self.by_project.remove(&project_id);
        }
        if removed.is_some() {
            self.members -= 1;
        }
        removed
    }

    #[allow(clippy::cast_precision_loss)]
    fn publish_gauges(&self) {
        metrics::gauge!(m::WS_CONNECTIONS_ACTIVE).set(self.members as f64);
        metrics::gauge!(m::CHAT_CHANNELS_ACTIVE).set(self.by_project.len() as f64);
    }
}

/// Outcome of one [`Registry::broadcast`].
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BroadcastReport {
    /// Members whose mailbox accepted the payload.
    pub delivered: usize,
    /// Members removed because their mailbox was full.
    pub evicted: Vec<ConnectionId>,
    /// Members removed because their mailbox was already closed.
    pub reaped: usize,
}

/// Maps each project to its live connections.
#[derive(Default)]
pub struct Registry {
    channels: Mutex<Channels>,
}

impl Registry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `conn` to its project's channel and mark it `Active`.
    ///
    /// Returns `false` (and changes nothing) if the connection is not in the
    /// `Connecting` state, e.g. it was closed before registration, or if the
    /// registry has been shut by [`close_all`](Self::close_all).
    pub fn register(&self, conn: &Arc<Connection>) -> bool {
        let project_id = conn.project_id();
        let mut channels = self.channels.lock();
        if channels.sealed || !conn.activate() {
            return false;
        }
        let previous = channels
            .by_project
            .entry(project_id)
            .or_default()
            .insert(conn.id().clone(), Arc::clone(conn));
        if previous.is_none() {
            channels.members += 1;
        }
        channels.publish_gauges();
        drop(channels);

        debug!(conn_id = %conn.id(), project_id = %project_id, "registered");
        true
    }

    /// Remove `conn` from its channel and close its mailbox.
    ///
    /// Idempotent. Returns `true` only if this call removed the member.
    pub fn unregister(&self, conn: &Connection) -> bool {
        let project_id = conn.project_id();
        let mut channels = self.channels.lock();
        let removed = channels.detach(project_id, conn.id()).is_some();
        let _ = conn.begin_closing();
        if removed {
            channels.publish_gauges();
        }
        drop(channels);

        if removed {
            debug!(conn_id = %conn.id(), project_id = %project_id, "unregistered");
        }
        removed
    }

    /// Deliver `payload` to every current member of `project_id`.
    ///
    /// Members whose mailbox is full are evicted: unregistered, with their
    /// mailbox closed so their outbound pump ends the session. Delivery to
    /// the remaining members is unaffected. An unknown channel is a no-op.
    pub fn broadcast(&self, project_id: ProjectId, payload: &Payload) -> BroadcastReport {
        let mut report = BroadcastReport::default();
        let mut channels = self.channels.lock();

        let Some(members) = channels.by_project.get_mut(&project_id) else {
            return report;
        };
        members.retain(|id, conn| match conn.enqueue(Arc::clone(payload)) {
            Ok(()) => {
                report.delivered += 1;
                true
            }
            Err(EnqueueError::Full) => {
                let _ = conn.begin_closing();
                report.evicted.push(id.clone());
                false
            }
            Err(EnqueueError::Closed) => {
                let _ = conn.begin_closing();
                report.reaped += 1;
                false
            }
        });
        let emptied = members.is_empty();
        let removed = report.evicted.len() + report.reaped;
        if emptied {
            let _ = channels.by_project.remove(&project_id);
        }
        if removed > 0 {
            channels.members -= removed;
            channels.publish_gauges();
        }
        drop(channels);

        metrics::counter!(m::CHAT_MESSAGES_BROADCAST_TOTAL).increment(1);
        if !report.evicted.is_empty() {
            metrics::counter!(m::WS_BROADCAST_EVICTIONS_TOTAL)
                .increment(report.evicted.len() as u64);
            for id in &report.evicted {
                warn!(conn_id = %id, project_id = %project_id, "mailbox full, evicting slow consumer");
            }
        }
        report
    }

    /// Close every connection and refuse any later registration. Used at
    /// shutdown.
    pub fn close_all(&self) -> usize {
        let mut channels = self.channels.lock();
        channels.sealed = true;
        let drained = std::mem::take(&mut channels.by_project);
        channels.members = 0;
        let mut closed = 0;
        for conn in drained.into_values().flat_map(HashMap::into_values) {
            let _ = conn.begin_closing();
            closed += 1;
        }
        channels.publish_gauges();
        drop(channels);

        if closed > 0 {
            info!(closed, "closed all chat connections");
        }
        closed
    }

    /// Members currently in `project_id`'s channel.
    pub fn member_count(&self, project_id: ProjectId) -> usize {
        self.channels
            .lock()
            .by_project
            .get(&project_id)
            .map_or(0, HashMap::len)
    }

    /// Ids of the members of `project_id`, sorted.
    pub fn member_ids(&self, project_id: ProjectId) -> Vec<ConnectionId> {
        let mut ids: Vec<ConnectionId> = self
            .channels
            .lock()
            .by_project
            .get(&project_id)
            .map(|members| members.keys().cloned().collect())
            .unwrap_or_default();
        ids.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        ids
    }

    /// Whether `conn` is currently a member of its channel.
    pub fn contains(&self, conn: &Connection) -> bool {
        self.channels
            .lock()
            .by_project
            .get(&conn.project_id())
            .is_some_and(|members| members.contains_key(conn.id()))
    }

    /// Total registered connections across all channels.
    pub fn connection_count(&self) -> usize {
        self.channels.lock().members
    }

    /// Channels with at least one member.
    pub fn channel_count(&self) -> usize {
        self.channels.lock().by_project.len()
    }
}
