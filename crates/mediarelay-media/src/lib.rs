//! Media utilities for the relay
//!
//! This crate decides which codecs a peer connection may negotiate.
//! The relay forwards RTP untouched, so there is no encoding or decoding here.

pub mod codec;

pub use codec::*;
