//! webrtc-rs implementation of the engine capabilities

use async_trait::async_trait;
use std::sync::Arc;
use webrtc::ice_transport::ice_gatherer_state::RTCIceGathererState;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtp_transceiver::rtp_codec::{RTCRtpCodecCapability, RTPCodecType};
use webrtc::rtp_transceiver::rtp_sender::RTCRtpSender;
use webrtc::rtp_transceiver::RTCRtpTransceiver;
use webrtc::track::track_local::track_local_static_rtp::TrackLocalStaticRTP;
use webrtc::track::track_local::{TrackLocal, TrackLocalWriter};
use webrtc::track::track_remote::TrackRemote;

use mediarelay_protocol::TrackKind;

use super::{
    EngineError, FeedbackSource, IceGatheringHandler, InboundTrack, MediaLine, OutboundTrack,
    PeerEngine, RtcpPacket, RtpPacket, TrackHandler,
};

/// Tracks only report an unspecified codec type before negotiation
fn track_kind(codec_type: RTPCodecType) -> TrackKind {
    match codec_type {
        RTPCodecType::Audio => TrackKind::Audio,
        _ => TrackKind::Video,
    }
}

/// Read paths report shutdown as a closed pipe or buffer, not a dedicated EOF
fn read_error(err: webrtc::Error) -> EngineError {
    let message = err.to_string();
    if message.contains("EOF") || message.contains("closed") {
        EngineError::EndOfStream
    } else {
        EngineError::Rtc(err)
    }
}

pub struct RtcOutboundTrack {
    track: Arc<TrackLocalStaticRTP>,
}

#[async_trait]
impl OutboundTrack for RtcOutboundTrack {
    fn id(&self) -> String {
        self.track.id().to_string()
    }

    fn stream_id(&self) -> String {
        self.track.stream_id().to_string()
    }

    fn kind(&self) -> TrackKind {
        track_kind(self.track.kind())
    }

    async fn write_rtp(&self, packet: &RtpPacket) -> Result<usize, EngineError> {
        // An unbound track writes nowhere and reports zero bytes
        match self.track.write_rtp(packet).await {
            Ok(0) => Err(EngineError::NoSubscriber),
            Ok(n) => Ok(n),
            Err(e) if e.to_string().contains("closed pipe") => Err(EngineError::NoSubscriber),
            Err(e) => Err(e.into()),
        }
    }
}

pub struct RtcSender {
    sender: Arc<RTCRtpSender>,
}

#[async_trait]
impl FeedbackSource for RtcSender {
    async fn read_rtcp(&self) -> Result<Vec<RtcpPacket>, EngineError> {
        let (packets, _attributes) = self.sender.read_rtcp().await.map_err(read_error)?;
        Ok(packets)
    }
}

pub struct RtcInboundTrack {
    track: Arc<TrackRemote>,
}

#[async_trait]
impl InboundTrack for RtcInboundTrack {
    fn ssrc(&self) -> u32 {
        self.track.ssrc()
    }

    fn id(&self) -> String {
        self.track.id()
    }

    fn stream_id(&self) -> String {
        self.track.stream_id()
    }

    fn kind(&self) -> TrackKind {
        track_kind(self.track.kind())
    }

    async fn read_rtp(&self) -> Result<RtpPacket, EngineError> {
        let (packet, _attributes) = self.track.read_rtp().await.map_err(read_error)?;
        Ok(packet)
    }
}

impl MediaLine for RTCRtpTransceiver {
    fn mid(&self) -> Option<String> {
        RTCRtpTransceiver::mid(self).map(|mid| mid.to_string())
    }
}

/// A webrtc-rs peer connection seen through [`PeerEngine`]
pub struct RtcEngine {
    peer_connection: Arc<RTCPeerConnection>,
}

impl RtcEngine {
    pub fn new(peer_connection: Arc<RTCPeerConnection>) -> Self {
        Self { peer_connection }
    }

    pub fn peer_connection(&self) -> &Arc<RTCPeerConnection> {
        &self.peer_connection
    }
}

#[async_trait]
impl PeerEngine for RtcEngine {
    type Outbound = RtcOutboundTrack;
    type Sender = RtcSender;
    type Inbound = RtcInboundTrack;
    type MediaLine = RTCRtpTransceiver;

    async fn new_outbound_track(
        &self,
        capability: RTCRtpCodecCapability,
        id: &str,
        stream_id: &str,
    ) -> Result<Arc<RtcOutboundTrack>, EngineError> {
        if capability.mime_type.is_empty() {
            return Err(EngineError::Other("codec capability without mime type".to_string()));
        }

        let track = Arc::new(TrackLocalStaticRTP::new(
            capability,
            id.to_string(),
            stream_id.to_string(),
        ));

        Ok(Arc::new(RtcOutboundTrack { track }))
    }

    async fn add_track(&self, track: Arc<RtcOutboundTrack>) -> Result<Arc<RtcSender>, EngineError> {
        let local: Arc<dyn TrackLocal + Send + Sync> = Arc::clone(&track.track) as _;
        let sender = self.peer_connection.add_track(local).await?;

        Ok(Arc::new(RtcSender { sender }))
    }

    async fn remove_track(&self, sender: &Arc<RtcSender>) -> Result<(), EngineError> {
        self.peer_connection.remove_track(&sender.sender).await?;
        Ok(())
    }

    async fn sender_media_line(&self, sender: &Arc<RtcSender>) -> Option<Arc<RTCRtpTransceiver>> {
        for transceiver in self.peer_connection.get_transceivers().await {
            if Arc::ptr_eq(&transceiver.sender().await, &sender.sender) {
                return Some(transceiver);
            }
        }

        None
    }

    async fn write_rtcp(&self, packets: &[RtcpPacket]) -> Result<usize, EngineError> {
        Ok(self.peer_connection.write_rtcp(packets).await?)
    }

    fn on_track(&self, handler: TrackHandler<RtcInboundTrack, RTCRtpTransceiver>) {
        self.peer_connection
            .on_track(Box::new(move |track, _receiver, transceiver| {
                handler(Arc::new(RtcInboundTrack { track }), Some(transceiver))
            }));
    }

    fn on_ice_gathering_state_change(&self, handler: IceGatheringHandler) {
        self.peer_connection
            .on_ice_gathering_state_change(Box::new(move |state: RTCIceGathererState| {
                handler(state.to_string());
                Box::pin(async {})
            }));
    }

    async fn close(&self) -> Result<(), EngineError> {
        self.peer_connection.close().await?;
        Ok(())
    }
}
