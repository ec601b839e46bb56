//! WebSocket membership, mailboxes, pumps, heartbeat, and the upgrade handler.

pub mod connection;
pub mod heartbeat;
pub mod mailbox;
pub mod pump;
pub mod registry;
pub mod upgrade;
