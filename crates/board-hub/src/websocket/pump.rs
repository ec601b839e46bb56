//! The two tasks that serve one socket.
//!
//! The inbound pump reads frames, validates them as chat messages, and hands
//! them to the registry for fan-out. The outbound pump drains the mailbox to
//! the socket and sends heartbeat pings. Either pump ending unregisters the
//! connection, which in turn stops the other: unregistering closes the
//! mailbox (outbound drains and sends a close frame) and cancels the
//! connection's closing token (inbound stops reading).
//!
//! Both pumps are generic over the socket halves so they can be driven by
//! in-memory channels in tests.

use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::Message;
use board_core::{ChatMessage, FrameError};
use futures::{Sink, SinkExt, Stream, StreamExt};
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, warn};

use super::connection::Connection;
use super::heartbeat::{Beat, Heartbeat};
use super::mailbox::{Mailbox, Payload};
use super::registry::Registry;
use crate::metrics as m;

/// Upper bound on any single socket write.
pub const WRITE_WAIT: Duration = Duration::from_secs(10);

/// Separator between payloads coalesced into one text frame.
pub const COALESCE_SEPARATOR: char = '\n';

/// Why the inbound pump stopped.
#[derive(Debug)]
pub enum InboundExit {
    /// Peer sent a close frame or the stream ended.
    PeerClosed,
    /// A frame was not a valid chat message.
    Framing(FrameError),
    /// The socket reported an error (includes oversize frames).
    Transport(String),
    /// The connection was unregistered elsewhere (eviction, heartbeat, shutdown).
    Closing,
}

/// Why the outbound pump stopped.
#[derive(Debug, PartialEq, Eq)]
pub enum OutboundExit {
    /// Mailbox closed and drained; close frame sent.
    Drained,
    /// A write failed or timed out.
    Transport(String),
    /// Peer was silent for longer than the heartbeat budget.
    HeartbeatExpired,
}

/// Read frames until the peer leaves, a frame is malformed, the transport
/// fails, or the connection starts closing. Always unregisters on exit.
pub async fn run_inbound<S, E>(mut stream: S, conn: Arc<Connection>, registry: Arc<Registry>) -> InboundExit
where
    S: Stream<Item = Result<Message, E>> + Unpin,
    E: Display,
{
    let exit = loop {
        let frame = tokio::select! {
            biased;
            () = conn.closing() => break InboundExit::Closing,
            frame = stream.next() => frame,
        };

        let result = match frame {
            None | Some(Ok(Message::Close(_))) => break InboundExit::PeerClosed,
            Some(Err(e)) => break InboundExit::Transport(e.to_string()),
            Some(Ok(Message::Ping(_) | Message::Pong(_))) => {
                conn.mark_alive();
                continue;
            }
            Some(Ok(Message::Text(text))) => {
                conn.mark_alive();
                relay(&conn, &registry, text.as_str().as_bytes())
            }
            Some(Ok(Message::Binary(bytes))) => {
                conn.mark_alive();
                relay(&conn, &registry, &bytes)
            }
        };

        if let Err(e) = result {
            metrics::counter!(m::WS_FRAMING_ERRORS_TOTAL).increment(1);
            break InboundExit::Framing(e);
        }
    };

    match &exit {
        InboundExit::Framing(e) => {
            warn!(conn_id = %conn.id(), project_id = %conn.project_id(), error = %e, "dropping connection on malformed frame");
        }
        InboundExit::Transport(e) => {
            warn!(conn_id = %conn.id(), project_id = %conn.project_id(), error = %e, "read failed");
        }
        InboundExit::PeerClosed | InboundExit::Closing => {
            debug!(conn_id = %conn.id(), exit = ?exit, "inbound pump done");
        }
    }
    let _ = registry.unregister(&conn);
    exit
}

/// Validate one frame and fan it out in canonical form.
fn relay(conn: &Connection, registry: &Registry, frame: &[u8]) -> Result<(), FrameError> {
    let message = ChatMessage::decode(frame)?;
    let payload: Payload = Arc::from(message.encode()?);
    let report = registry.broadcast(conn.project_id(), &payload);
    debug!(
        conn_id = %conn.id(),
        project_id = %conn.project_id(),
        members = report.delivered,
        evicted = report.evicted.len(),
        "broadcast"
    );
    Ok(())
}

/// Write mailbox payloads and heartbeat pings until the mailbox closes, a
/// write fails, or the peer goes silent. Unregisters on every exit path.
pub async fn run_outbound<S>(
    mut sink: S,
    mut mailbox: Mailbox,
    conn: Arc<Connection>,
    registry: Arc<Registry>,
    mut heartbeat: Heartbeat,
) -> OutboundExit
where
    S: Sink<Message> + Unpin,
    S::Error: Display,
{
    let period = heartbeat.interval();
    let mut ticker = time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let exit = loop {
        tokio::select! {
            payload = mailbox.take() => {
                let Some(first) = payload else {
                    let _ = write(sink.send(Message::Close(None))).await;
                    break OutboundExit::Drained;
                };
                let frame = coalesce(&first, &mut mailbox);
                if let Err(e) = write(sink.send(Message::Text(frame.into()))).await {
                    break OutboundExit::Transport(e);
                }
            }
            _ = ticker.tick() => {
                match heartbeat.tick(conn.check_alive()) {
                    Beat::Expired => break OutboundExit::HeartbeatExpired,
                    Beat::Missed(n) => debug!(conn_id = %conn.id(), missed = n, "peer silent"),
                    Beat::Alive => {}
                }
                if let Err(e) = write(sink.send(Message::Ping(Vec::new().into()))).await {
                    break OutboundExit::Transport(e);
                }
            }
        }
    };

    match &exit {
        OutboundExit::Drained => debug!(conn_id = %conn.id(), "outbound pump done"),
        OutboundExit::HeartbeatExpired => {
            warn!(conn_id = %conn.id(), project_id = %conn.project_id(), "heartbeat timeout");
        }
        OutboundExit::Transport(e) => {
            warn!(conn_id = %conn.id(), project_id = %conn.project_id(), error = %e, "write failed");
        }
    }
    let _ = registry.unregister(&conn);
    let _ = time::timeout(WRITE_WAIT, sink.close()).await;
    exit
}

/// Join `first` with everything already queued behind it.
///
/// Takes at most one mailbox's worth so a steady stream cannot grow a frame
/// without bound.
pub fn coalesce(first: &str, mailbox: &mut Mailbox) -> String {
    let mut frame = String::from(first);
    for _ in 0..mailbox.capacity() {
        let Some(next) = mailbox.take_ready() else {
            break;
        };
        frame.push(COALESCE_SEPARATOR);
        frame.push_str(&next);
    }
    frame
}

async fn write<F, E>(send: F) -> Result<(), String>
where
    F: Future<Output = Result<(), E>>,
    E: Display,
{
    match time::timeout(WRITE_WAIT, send).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(e.to_string()),
        Err(_) => Err(format!("write timed out after {}s", WRITE_WAIT.as_secs())),
    }
}
