//! Media relay server library
//!
//! The session-level transport of an SFU: one [`transport::Transport`] per
//! peer connection, pumping RTP and RTCP between the network engine and
//! the relay's forwarding logic.

pub mod config;
pub mod data;
pub mod engine;
pub mod error;
pub mod factory;
pub mod http;
pub mod metrics;
pub mod signalling;
pub mod transport;

pub use error::{Result, TransportError};
pub use transport::{SessionState, Transport, TransportOptions, WriteOutcome};
