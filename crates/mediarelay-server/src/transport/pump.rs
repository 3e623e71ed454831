//! Packet pumps
//!
//! One task per track moves packets between the engine and the shared
//! channels. Pumps are the only publishers on those channels, so per-track
//! publication order is arrival order.

use std::sync::Arc;
use std::time::Instant;
use webrtc::util::MarshalSize;

use mediarelay_protocol::{TrackEvent, TrackInfo};

use crate::engine::{EngineError, FeedbackSource, InboundTrack, PeerEngine};
use crate::metrics::{self, MetricsSink};

use super::registry::{RemoteTrack, TrackRegistry};
use super::shutdown::PumpChannels;

/// Forwards feedback read from a local track's sender.
///
/// Ends for good on the first read failure: the sender is gone. A dropped
/// consumer only stops publishing; reads go on so the engine keeps
/// processing the track's feedback.
pub async fn feedback_pump<S: FeedbackSource>(
    client_id: String,
    ssrc: u32,
    sender: Arc<S>,
    channels: PumpChannels,
    metrics: Arc<dyn MetricsSink>,
) {
    let mut publishing = true;

    loop {
        let packets = match sender.read_rtcp().await {
            Ok(packets) => packets,
            Err(e) => {
                tracing::debug!("[{}] Feedback path of track {} ended: {}", client_id, ssrc, e);
                return;
            }
        };

        for packet in packets {
            tracing::trace!("[{}] ReadRTCP: {:?}", client_id, packet);
            metrics.increment_counter(metrics::RTCP_PACKETS_RECEIVED);

            if publishing && channels.rtcp.send(packet).await.is_err() {
                tracing::debug!("[{}] RTCP reader is gone, discarding feedback of track {}", client_id, ssrc);
                publishing = false;
            }
        }
    }
}

/// Forwards media of one remote track, bracketed by its Added and
/// Removed events. Only the engine ends the loop; the exit bookkeeping
/// runs whatever the cause.
pub async fn receive_pump<E: PeerEngine>(
    client_id: String,
    remote: RemoteTrack<E>,
    registry: Arc<TrackRegistry<E>>,
    channels: PumpChannels,
    metrics: Arc<dyn MetricsSink>,
) {
    let start = Instant::now();
    let info: TrackInfo = remote.info.clone();
    let track = Arc::clone(&remote.track);

    metrics.increment_counter(metrics::TRACKS_TOTAL);
    metrics.add_to_gauge(metrics::TRACKS_ACTIVE, 1.0);

    registry.add_remote(info.ssrc, remote).await;
    tracing::info!("[{}] Remote track: {}", client_id, info.ssrc);

    if channels.events.send(TrackEvent::added(info.clone())).await.is_err() {
        tracing::debug!("[{}] Track event reader is gone, Added for {} dropped", client_id, info.ssrc);
    }

    forward_media(&client_id, info.ssrc, track.as_ref(), &channels, metrics.as_ref()).await;

    registry.remove_remote(info.ssrc).await;
    if channels.events.send(TrackEvent::removed(info.clone())).await.is_err() {
        tracing::debug!("[{}] Track event reader is gone, Removed for {} dropped", client_id, info.ssrc);
    }

    metrics.add_to_gauge(metrics::TRACKS_ACTIVE, -1.0);
    metrics.observe(metrics::TRACKS_DURATION_SECONDS, start.elapsed().as_secs_f64());
}

async fn forward_media<T: InboundTrack + ?Sized>(
    client_id: &str,
    ssrc: u32,
    track: &T,
    channels: &PumpChannels,
    metrics: &dyn MetricsSink,
) {
    let mut publishing = true;

    loop {
        let packet = match track.read_rtp().await {
            Ok(packet) => packet,
            Err(EngineError::EndOfStream) => {
                tracing::debug!("[{}] Remote track has ended: {}", client_id, ssrc);
                return;
            }
            Err(e) => {
                tracing::warn!("[{}] Remote track has ended: {}: read rtp: {}", client_id, ssrc, e);
                return;
            }
        };

        metrics.increment_counter(metrics::RTP_PACKETS_RECEIVED);
        metrics.add_to_counter(metrics::RTP_PACKETS_RECEIVED_BYTES, packet.marshal_size() as f64);

        tracing::trace!(
            "[{}] ReadRTP: ssrc={} seq={} ts={} payload={}",
            client_id,
            packet.header.ssrc,
            packet.header.sequence_number,
            packet.header.timestamp,
            packet.payload.len()
        );

        if publishing && channels.rtp.send(packet).await.is_err() {
            tracing::debug!("[{}] RTP reader is gone, discarding media of track {}", client_id, ssrc);
            publishing = false;
        }
    }
}
