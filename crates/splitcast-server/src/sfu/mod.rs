//! SFU (Selective Forwarding Unit)
//!
//! Every client holds two peer connections: a publisher connection the client
//! sends media on, and a subscriber connection the server sends everyone
//! else's media on. Published tracks are forwarded packet by packet without
//! any processing or transcoding.

mod client;
mod forward;
mod manager;
mod registry;

pub use client::{ClientSession, ControlChannel};
pub use forward::forward;
pub use manager::SessionManager;
pub use registry::{TrackEntry, TrackRegistry, TrackSnapshot};
