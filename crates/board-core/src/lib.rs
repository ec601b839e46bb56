//! # board-core
//!
//! Shared vocabulary for the board chat hub.
//!
//! - **Identifiers**: [`ProjectId`] (the channel key) and [`ConnectionId`]
//! - **Wire format**: [`ChatMessage`] and the frame codec used by the hub

#![deny(unsafe_code)]

pub mod ids;
pub mod message;

pub use ids::{ConnectionId, InvalidProjectId, ProjectId};
pub use message::{ChatMessage, FrameError};
