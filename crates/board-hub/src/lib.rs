//! # board-hub
//!
//! Live chat fan-out for project boards.
//!
//! - `WebSocket` entrypoint at `/ws/{project_id}`: one channel per project
//! - [`Registry`](websocket::registry::Registry): lock-serialized membership and broadcast
//! - Per-connection inbound/outbound pumps with bounded mailboxes
//! - Slow consumers are evicted instead of stalling the broadcaster
//! - HTTP extras: `/health`, `/metrics`, `/ws/{project_id}/members`
//! - Graceful shutdown via `CancellationToken`

#![deny(unsafe_code)]

pub mod config;
pub mod cors;
pub mod error;
pub mod health;
pub mod metrics;
pub mod server;
pub mod shutdown;
pub mod websocket;

pub use config::HubConfig;
pub use error::HubError;
pub use server::{AppState, HubServer, ServerHandle};
pub use websocket::registry::Registry;
