//! Splitcast signaling protocol
//!
//! JSON messages exchanged over each client's control channel. Every message
//! is an object carrying a `type` tag.

mod messages;
mod types;

pub use messages::{ClientMessage, ServerMessage};
pub use types::{ClientId, IceCandidate, IceServer, IceTarget};
