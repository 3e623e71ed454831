//! Session-level transport controller
//!
//! A [`Transport`] owns every sending and receiving track of one peer
//! connection. Media and feedback read from the engine are published on
//! shared channels for the relay to route; the relay writes outbound
//! packets back through [`Transport::write_rtp`].
//!
//! The shared channels are bounded. A consumer that stops reading stalls
//! the pumps feeding it, which in turn lets the engine's receive buffers
//! fill up. Nothing is dropped on the way.

mod pump;
pub mod registry;
pub mod shutdown;

use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{mpsc, watch};
use webrtc::rtp_transceiver::rtp_codec::RTCRtpCodecCapability;
use webrtc::util::MarshalSize;

use mediarelay_protocol::{TrackEvent, TrackInfo, TransceiverRequest};

use crate::data::{DataChannelMessage, DataTransceiver};
use crate::engine::{
    EngineError, InboundTrack, OutboundTrack, PeerEngine, RtcpPacket, RtpPacket,
};
use crate::error::{EngineContext, Result, TransportError};
use crate::metrics::{self, MetricsSink};
use crate::signalling::{CloseSignal, Signaller};

use registry::{LocalTrack, RemoteTrack, TrackRegistry};
use shutdown::{pump_channels, ConsumerChannels, Lifecycle};

pub use shutdown::SessionState;

pub const DEFAULT_CHANNEL_CAPACITY: usize = 1;

/// What happened to a packet handed to [`Transport::write_rtp_outcome`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Delivered(usize),
    /// The track exists but no remote peer is bound to it yet
    NoSubscriber,
}

impl WriteOutcome {
    pub fn bytes(&self) -> usize {
        match self {
            WriteOutcome::Delivered(bytes) => *bytes,
            WriteOutcome::NoSubscriber => 0,
        }
    }
}

pub struct TransportOptions {
    pub channel_capacity: usize,
    /// Codec used by [`Transport::add_local_track`]
    pub default_capability: RTCRtpCodecCapability,
}

impl Default for TransportOptions {
    fn default() -> Self {
        Self {
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            default_capability: mediarelay_media::vp8_capability(false),
        }
    }
}

struct Inner<E: PeerEngine> {
    client_id: String,
    engine: Arc<E>,
    signaller: Arc<dyn Signaller>,
    data: Arc<dyn DataTransceiver>,
    metrics: Arc<dyn MetricsSink>,
    registry: Arc<TrackRegistry<E>>,
    lifecycle: Lifecycle,
    rtp_rx: Mutex<Option<mpsc::Receiver<RtpPacket>>>,
    rtcp_rx: Mutex<Option<mpsc::Receiver<RtcpPacket>>>,
    events_rx: Mutex<Option<mpsc::Receiver<TrackEvent>>>,
    default_capability: RTCRtpCodecCapability,
}

/// Transport of one peer connection
pub struct Transport<E: PeerEngine> {
    inner: Arc<Inner<E>>,
}

impl<E: PeerEngine> Clone for Transport<E> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<E: PeerEngine> Transport<E> {
    /// Wires the transport into the engine and starts waiting for the
    /// signaller's close notification. Must be called within a tokio runtime.
    pub fn new(
        client_id: &str,
        engine: Arc<E>,
        signaller: Arc<dyn Signaller>,
        data: Arc<dyn DataTransceiver>,
        metrics: Arc<dyn MetricsSink>,
        options: TransportOptions,
    ) -> Self {
        let (pump_tx, ConsumerChannels { rtp, rtcp, events }) =
            pump_channels(options.channel_capacity);

        let inner = Arc::new(Inner {
            client_id: client_id.to_string(),
            engine,
            signaller,
            data,
            metrics,
            registry: Arc::new(TrackRegistry::new()),
            lifecycle: Lifecycle::new(pump_tx),
            rtp_rx: Mutex::new(Some(rtp)),
            rtcp_rx: Mutex::new(Some(rtcp)),
            events_rx: Mutex::new(Some(events)),
            default_capability: options.default_capability,
        });

        let log_id = inner.client_id.clone();
        inner
            .engine
            .on_ice_gathering_state_change(Box::new(move |state| {
                tracing::info!("[{}] ICE gathering state changed: {}", log_id, state);
            }));

        let weak = Arc::downgrade(&inner);
        inner.engine.on_track(Box::new(move |track, media_line| {
            let weak = weak.clone();
            Box::pin(async move {
                if let Some(inner) = weak.upgrade() {
                    inner.handle_track(track, media_line);
                }
            })
        }));

        let mut close_signal = inner.signaller.close_signal();
        let coordinator = Arc::clone(&inner);
        tokio::spawn(async move {
            close_signal.closed().await;
            coordinator.shutdown().await;
        });

        Self { inner }
    }

    pub fn client_id(&self) -> &str {
        &self.inner.client_id
    }

    pub fn initiator(&self) -> bool {
        self.inner.signaller.initiator()
    }

    pub fn state(&self) -> SessionState {
        self.inner.lifecycle.state()
    }

    pub fn state_changes(&self) -> watch::Receiver<SessionState> {
        self.inner.lifecycle.subscribe()
    }

    /// Closing goes through the signaller; its close notification drives
    /// the actual teardown.
    pub async fn close(&self) -> Result<()> {
        self.inner
            .signaller
            .close()
            .await
            .map_err(TransportError::Signaller)
    }

    pub fn close_channel(&self) -> CloseSignal {
        self.inner.signaller.close_signal()
    }

    /// Adds a sending track using the default video codec
    pub async fn add_local_track(&self, ssrc: u32, id: &str, stream_id: &str) -> Result<()> {
        let capability = self.inner.default_capability.clone();
        self.add_local_track_with_capability(ssrc, id, stream_id, capability)
            .await
    }

    pub async fn add_local_track_with_capability(
        &self,
        ssrc: u32,
        id: &str,
        stream_id: &str,
        capability: RTCRtpCodecCapability,
    ) -> Result<()> {
        let inner = &self.inner;
        if inner.lifecycle.state() != SessionState::Open {
            return Err(TransportError::Closed(inner.client_id.clone()));
        }

        let track = inner
            .engine
            .new_outbound_track(capability, id, stream_id)
            .await
            .context("new track")?;
        let sender = inner
            .engine
            .add_track(Arc::clone(&track))
            .await
            .context("add track")?;

        let kind = track.kind();
        let media_line = inner.engine.sender_media_line(&sender).await;

        let started = inner.lifecycle.spawn_pump(|channels| {
            pump::feedback_pump(
                inner.client_id.clone(),
                ssrc,
                Arc::clone(&sender),
                channels,
                Arc::clone(&inner.metrics),
            )
        });
        if !started {
            inner.discard_sender(ssrc, &sender).await;
            return Err(TransportError::Closed(inner.client_id.clone()));
        }

        if inner.signaller.initiator() {
            inner.signaller.negotiate();
        } else {
            inner
                .signaller
                .request_transceiver(TransceiverRequest::recv_only(kind));
        }

        let info = TrackInfo {
            ssrc,
            id: track.id(),
            stream_id: track.stream_id(),
            kind,
            mid: None,
        };

        inner
            .registry
            .add_local(
                ssrc,
                LocalTrack {
                    info,
                    media_line,
                    sender: Arc::clone(&sender),
                    track,
                },
            )
            .await;

        // Shutdown may have cleared the registry before the insert landed
        if inner.lifecycle.state() != SessionState::Open {
            inner.registry.remove_local(ssrc).await;
            inner.discard_sender(ssrc, &sender).await;
            return Err(TransportError::Closed(inner.client_id.clone()));
        }

        tracing::info!("[{}] Added local {} track {} ({}/{})", inner.client_id, kind, ssrc, stream_id, id);

        Ok(())
    }

    /// The feedback pump of the track ends by itself once the engine
    /// drops the sender.
    pub async fn remove_local_track(&self, ssrc: u32) -> Result<()> {
        let inner = &self.inner;

        let local = inner
            .registry
            .remove_local(ssrc)
            .await
            .ok_or(TransportError::TrackNotFound(ssrc))?;

        inner
            .engine
            .remove_track(&local.sender)
            .await
            .context("remove track")?;

        inner.signaller.negotiate();

        tracing::info!("[{}] Removed local track {}", inner.client_id, ssrc);

        Ok(())
    }

    /// Bytes written, or zero when the track has no subscriber yet
    pub async fn write_rtp(&self, packet: &RtpPacket) -> Result<usize> {
        self.write_rtp_outcome(packet)
            .await
            .map(|outcome| outcome.bytes())
    }

    pub async fn write_rtp_outcome(&self, packet: &RtpPacket) -> Result<WriteOutcome> {
        let inner = &self.inner;
        let ssrc = packet.header.ssrc;

        tracing::trace!(
            "[{}] WriteRTP: ssrc={} seq={} ts={} payload={}",
            inner.client_id,
            ssrc,
            packet.header.sequence_number,
            packet.header.timestamp,
            packet.payload.len()
        );

        let track = inner
            .registry
            .outbound(ssrc)
            .await
            .ok_or(TransportError::TrackNotFound(ssrc))?;

        match track.write_rtp(packet).await {
            Ok(_) => {}
            Err(EngineError::NoSubscriber) => {
                inner
                    .metrics
                    .increment_counter(metrics::RTP_PACKETS_NO_SUBSCRIBER);
                return Ok(WriteOutcome::NoSubscriber);
            }
            Err(e) => return Err(TransportError::engine("write rtp", e)),
        }

        let size = packet.marshal_size();
        inner.metrics.increment_counter(metrics::RTP_PACKETS_SENT);
        inner
            .metrics
            .add_to_counter(metrics::RTP_PACKETS_SENT_BYTES, size as f64);

        Ok(WriteOutcome::Delivered(size))
    }

    /// Feedback for the whole connection
    pub async fn write_rtcp(&self, packets: &[RtcpPacket]) -> Result<()> {
        let inner = &self.inner;

        tracing::trace!("[{}] WriteRTCP: {:?}", inner.client_id, packets);

        inner
            .engine
            .write_rtcp(packets)
            .await
            .context("write rtcp")?;

        inner
            .metrics
            .add_to_counter(metrics::RTCP_PACKETS_SENT, packets.len() as f64);

        Ok(())
    }

    pub async fn local_tracks(&self) -> Vec<TrackInfo> {
        self.inner.registry.list_local().await
    }

    pub async fn remote_tracks(&self) -> Vec<TrackInfo> {
        self.inner.registry.list_remote().await
    }

    /// Inbound media of every remote track; handed out once
    pub fn rtp_channel(&self) -> Option<mpsc::Receiver<RtpPacket>> {
        take(&self.inner.rtp_rx)
    }

    /// Inbound feedback of every local track; handed out once
    pub fn rtcp_channel(&self) -> Option<mpsc::Receiver<RtcpPacket>> {
        take(&self.inner.rtcp_rx)
    }

    /// Added and Removed events of remote tracks; handed out once
    pub fn track_events_channel(&self) -> Option<mpsc::Receiver<TrackEvent>> {
        take(&self.inner.events_rx)
    }

    pub fn messages_channel(&self) -> Option<mpsc::Receiver<DataChannelMessage>> {
        self.inner.data.take_messages()
    }
}

fn take<T>(slot: &Mutex<Option<T>>) -> Option<T> {
    slot.lock().unwrap_or_else(PoisonError::into_inner).take()
}

impl<E: PeerEngine> Inner<E> {
    async fn discard_sender(&self, ssrc: u32, sender: &Arc<E::Sender>) {
        if let Err(e) = self.engine.remove_track(sender).await {
            tracing::warn!("[{}] Error removing track {} after close: {}", self.client_id, ssrc, e);
        }
    }

    /// Entry point for every remote track the engine discovers
    fn handle_track(&self, track: Arc<E::Inbound>, media_line: Option<Arc<E::MediaLine>>) {
        let info = TrackInfo {
            ssrc: track.ssrc(),
            id: track.id(),
            stream_id: track.stream_id(),
            kind: track.kind(),
            mid: None,
        };
        let ssrc = info.ssrc;

        let remote = RemoteTrack {
            info,
            media_line,
            track,
        };

        let started = self.lifecycle.spawn_pump(|channels| {
            pump::receive_pump(
                self.client_id.clone(),
                remote,
                Arc::clone(&self.registry),
                channels,
                Arc::clone(&self.metrics),
            )
        });

        if !started {
            tracing::debug!("[{}] Ignoring remote track {}, transport is closing", self.client_id, ssrc);
        }
    }

    async fn shutdown(&self) {
        if !self.lifecycle.begin_close() {
            return;
        }

        tracing::info!(
            "[{}] Transport closing, waiting for {} pumps",
            self.client_id,
            self.lifecycle.active_pumps()
        );

        if let Err(e) = self.engine.close().await {
            tracing::warn!("[{}] Error closing peer connection: {}", self.client_id, e);
        }

        // Channels must outlive every pump that can still publish
        self.lifecycle.join().await;
        self.data.close().await;

        let local = self.registry.clear_local().await;
        self.lifecycle.finish();

        tracing::info!("[{}] Transport closed, dropped {} local tracks", self.client_id, local);
    }
}
