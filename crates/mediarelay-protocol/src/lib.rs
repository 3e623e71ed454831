//! Shared protocol definitions for the media relay
//!
//! Value types that cross the boundary between a peer transport and the
//! forwarding logic that routes media between peers.

pub mod messages;
pub mod types;

pub use messages::*;
pub use types::*;
