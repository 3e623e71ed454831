//! Network engine capabilities
//!
//! The transport drives ICE/DTLS/SRTP only through these traits. [`rtc`]
//! implements them on top of a webrtc-rs peer connection; tests plug in a
//! simulated engine.

pub mod rtc;

use async_trait::async_trait;
use futures_util::future::BoxFuture;
use std::sync::Arc;
use thiserror::Error;
use webrtc::rtp_transceiver::rtp_codec::RTCRtpCodecCapability;

use mediarelay_protocol::TrackKind;

pub use rtc::RtcEngine;

pub type RtpPacket = webrtc::rtp::packet::Packet;
pub type RtcpPacket = Box<dyn webrtc::rtcp::packet::Packet + Send + Sync>;

#[derive(Error, Debug)]
pub enum EngineError {
    /// The send path exists but nobody is bound to it yet
    #[error("no subscribers on send path")]
    NoSubscriber,

    /// The read path was closed cleanly
    #[error("end of stream")]
    EndOfStream,

    #[error(transparent)]
    Rtc(#[from] webrtc::Error),

    #[error("{0}")]
    Other(String),
}

/// A negotiated media line; its mid appears once negotiation completes
pub trait MediaLine: Send + Sync {
    fn mid(&self) -> Option<String>;
}

/// Send side of an outbound track
#[async_trait]
pub trait OutboundTrack: Send + Sync {
    fn id(&self) -> String;
    fn stream_id(&self) -> String;
    fn kind(&self) -> TrackKind;

    /// Returns [`EngineError::NoSubscriber`] when no remote peer is bound yet
    async fn write_rtp(&self, packet: &RtpPacket) -> Result<usize, EngineError>;
}

/// Sender handle of an outbound track, the source of its feedback packets
#[async_trait]
pub trait FeedbackSource: Send + Sync {
    /// Blocks until feedback arrives; fails once the sender is gone.
    async fn read_rtcp(&self) -> Result<Vec<RtcpPacket>, EngineError>;
}

/// Receive handle of an inbound track
#[async_trait]
pub trait InboundTrack: Send + Sync {
    fn ssrc(&self) -> u32;
    fn id(&self) -> String;
    fn stream_id(&self) -> String;
    fn kind(&self) -> TrackKind;

    /// Blocks until a packet arrives. Clean shutdown of the read path
    /// surfaces as [`EngineError::EndOfStream`].
    async fn read_rtp(&self) -> Result<RtpPacket, EngineError>;
}

/// Invoked once per remote track the peer starts sending
pub type TrackHandler<T, M> =
    Box<dyn Fn(Arc<T>, Option<Arc<M>>) -> BoxFuture<'static, ()> + Send + Sync>;

pub type IceGatheringHandler = Box<dyn Fn(String) + Send + Sync>;

/// One peer connection of the underlying network engine
#[async_trait]
pub trait PeerEngine: Send + Sync + 'static {
    type Outbound: OutboundTrack + 'static;
    type Sender: FeedbackSource + 'static;
    type Inbound: InboundTrack + 'static;
    type MediaLine: MediaLine + 'static;

    async fn new_outbound_track(
        &self,
        capability: RTCRtpCodecCapability,
        id: &str,
        stream_id: &str,
    ) -> Result<Arc<Self::Outbound>, EngineError>;

    async fn add_track(&self, track: Arc<Self::Outbound>)
        -> Result<Arc<Self::Sender>, EngineError>;

    async fn remove_track(&self, sender: &Arc<Self::Sender>) -> Result<(), EngineError>;

    /// Finds the transceiver a sender was attached to
    async fn sender_media_line(&self, sender: &Arc<Self::Sender>) -> Option<Arc<Self::MediaLine>>;

    /// Feedback for the whole connection, not a single track
    async fn write_rtcp(&self, packets: &[RtcpPacket]) -> Result<usize, EngineError>;

    /// Replaces any previously registered handler
    fn on_track(&self, handler: TrackHandler<Self::Inbound, Self::MediaLine>);

    fn on_ice_gathering_state_change(&self, handler: IceGatheringHandler);

    /// Severs every read path of the connection
    async fn close(&self) -> Result<(), EngineError>;
}
