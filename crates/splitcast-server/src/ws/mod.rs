//! Signaling over WebSocket
//!
//! Each socket is one client's control channel. Inbound text frames are
//! decoded into [`splitcast_protocol::ClientMessage`] and dispatched to the
//! session manager; outbound messages are encoded as JSON text frames.

pub mod handler;
