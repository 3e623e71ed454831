//! Simulated engine, signaller and data channel for transport tests
//!
//! The simulated engine keeps every read path under test control: remote
//! tracks are fed through [`RemoteFeed`], feedback through [`SimSender::feed`].

#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use webrtc::rtcp::payload_feedbacks::picture_loss_indication::PictureLossIndication;
use webrtc::rtp::header::Header;
use webrtc::rtp_transceiver::rtp_codec::RTCRtpCodecCapability;
use webrtc::util::MarshalSize;

use mediarelay_protocol::{SignalMessage, TrackKind, TransceiverRequest};
use mediarelay_server::data::{DataChannelMessage, DataTransceiver};
use mediarelay_server::engine::{
    EngineError, FeedbackSource, IceGatheringHandler, InboundTrack, MediaLine, OutboundTrack,
    PeerEngine, RtcpPacket, RtpPacket, TrackHandler,
};
use mediarelay_server::metrics::MetricsSink;
use mediarelay_server::signalling::{close_channel, CloseNotifier, CloseSignal, Signaller};
use mediarelay_server::{Transport, TransportOptions};

pub fn rtp_packet(ssrc: u32, sequence_number: u16, payload_len: usize) -> RtpPacket {
    RtpPacket {
        header: Header {
            version: 2,
            payload_type: 96,
            sequence_number,
            timestamp: u32::from(sequence_number) * 3000,
            ssrc,
            ..Default::default()
        },
        payload: Bytes::from(vec![0xAB; payload_len]),
    }
}

pub fn pli(media_ssrc: u32) -> RtcpPacket {
    Box::new(PictureLossIndication {
        sender_ssrc: 0,
        media_ssrc,
    })
}

#[derive(Default)]
pub struct SimMediaLine {
    mid: Mutex<Option<String>>,
}

impl SimMediaLine {
    pub fn with_mid(mid: &str) -> Self {
        Self {
            mid: Mutex::new(Some(mid.to_string())),
        }
    }

    pub fn set_mid(&self, mid: &str) {
        *self.mid.lock().unwrap() = Some(mid.to_string());
    }
}

impl MediaLine for SimMediaLine {
    fn mid(&self) -> Option<String> {
        self.mid.lock().unwrap().clone()
    }
}

pub struct SimOutbound {
    id: String,
    stream_id: String,
    kind: TrackKind,
    subscribed: Arc<AtomicBool>,
}

#[async_trait]
impl OutboundTrack for SimOutbound {
    fn id(&self) -> String {
        self.id.clone()
    }

    fn stream_id(&self) -> String {
        self.stream_id.clone()
    }

    fn kind(&self) -> TrackKind {
        self.kind
    }

    async fn write_rtp(&self, packet: &RtpPacket) -> Result<usize, EngineError> {
        if !self.subscribed.load(Ordering::SeqCst) {
            return Err(EngineError::NoSubscriber);
        }
        Ok(packet.header.marshal_size() + packet.payload.len())
    }
}

pub struct SimSender {
    pub track: Arc<SimOutbound>,
    pub media_line: Arc<SimMediaLine>,
    feed_tx: mpsc::Sender<RtcpPacket>,
    feed_rx: tokio::sync::Mutex<mpsc::Receiver<RtcpPacket>>,
    stopped: CancellationToken,
}

impl SimSender {
    /// Delivers feedback as if the remote peer had sent it
    pub async fn feed(&self, packet: RtcpPacket) {
        self.feed_tx.send(packet).await.unwrap();
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.is_cancelled()
    }
}

#[async_trait]
impl FeedbackSource for SimSender {
    async fn read_rtcp(&self) -> Result<Vec<RtcpPacket>, EngineError> {
        let mut feed = self.feed_rx.lock().await;
        tokio::select! {
            _ = self.stopped.cancelled() => Err(EngineError::Other("io: read/write on closed pipe".to_string())),
            packet = feed.recv() => packet.map(|p| vec![p]).ok_or(EngineError::EndOfStream),
        }
    }
}

pub struct SimInbound {
    ssrc: u32,
    id: String,
    stream_id: String,
    kind: TrackKind,
    feed: tokio::sync::Mutex<mpsc::Receiver<Result<RtpPacket, EngineError>>>,
    // None for a read path that ignores the engine closing
    closed: Option<CancellationToken>,
}

#[async_trait]
impl InboundTrack for SimInbound {
    fn ssrc(&self) -> u32 {
        self.ssrc
    }

    fn id(&self) -> String {
        self.id.clone()
    }

    fn stream_id(&self) -> String {
        self.stream_id.clone()
    }

    fn kind(&self) -> TrackKind {
        self.kind
    }

    async fn read_rtp(&self) -> Result<RtpPacket, EngineError> {
        let mut feed = self.feed.lock().await;
        match &self.closed {
            Some(closed) => tokio::select! {
                _ = closed.cancelled() => Err(EngineError::EndOfStream),
                item = feed.recv() => item.unwrap_or(Err(EngineError::EndOfStream)),
            },
            None => feed.recv().await.unwrap_or(Err(EngineError::EndOfStream)),
        }
    }
}

/// Test side of a remote track; dropping it ends the track
pub struct RemoteFeed {
    tx: mpsc::Sender<Result<RtpPacket, EngineError>>,
}

impl RemoteFeed {
    pub async fn send(&self, packet: RtpPacket) {
        self.tx.send(Ok(packet)).await.unwrap();
    }

    pub async fn fail(&self, error: EngineError) {
        self.tx.send(Err(error)).await.unwrap();
    }
}

#[derive(Default)]
pub struct SimEngine {
    closed: CancellationToken,
    subscribed: Arc<AtomicBool>,
    pub fail_new_track: AtomicBool,
    pub fail_rtcp: AtomicBool,
    /// Stalls `sender_media_line`, widening the gap between track creation and registration
    pub media_line_delay_ms: AtomicU64,
    on_track: Mutex<Option<TrackHandler<SimInbound, SimMediaLine>>>,
    senders: Mutex<Vec<Arc<SimSender>>>,
    pub rtcp_written: AtomicUsize,
    pub close_calls: AtomicUsize,
}

impl SimEngine {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Binds a remote peer to every outbound track
    pub fn subscribe(&self) {
        self.subscribed.store(true, Ordering::SeqCst);
    }

    pub fn senders(&self) -> Vec<Arc<SimSender>> {
        self.senders.lock().unwrap().clone()
    }

    /// Completes negotiation, assigning a mid to every media line
    pub fn negotiate(&self) {
        for (i, sender) in self.senders.lock().unwrap().iter().enumerate() {
            sender.media_line.set_mid(&i.to_string());
        }
    }

    /// Announces a remote track as the peer connection would
    pub async fn emit_remote_track(
        &self,
        ssrc: u32,
        id: &str,
        stream_id: &str,
        kind: TrackKind,
        follows_close: bool,
    ) -> RemoteFeed {
        let (tx, rx) = mpsc::channel(16);
        let track = Arc::new(SimInbound {
            ssrc,
            id: id.to_string(),
            stream_id: stream_id.to_string(),
            kind,
            feed: tokio::sync::Mutex::new(rx),
            closed: follows_close.then(|| self.closed.clone()),
        });
        let media_line = Arc::new(SimMediaLine::with_mid(&format!("r{ssrc}")));

        let callback = self
            .on_track
            .lock()
            .unwrap()
            .as_ref()
            .map(|handler| handler(track, Some(media_line)));
        if let Some(callback) = callback {
            callback.await;
        }

        RemoteFeed { tx }
    }
}

#[async_trait]
impl PeerEngine for SimEngine {
    type Outbound = SimOutbound;
    type Sender = SimSender;
    type Inbound = SimInbound;
    type MediaLine = SimMediaLine;

    async fn new_outbound_track(
        &self,
        capability: RTCRtpCodecCapability,
        id: &str,
        stream_id: &str,
    ) -> Result<Arc<SimOutbound>, EngineError> {
        if self.fail_new_track.load(Ordering::SeqCst) {
            return Err(EngineError::Other("unsupported codec".to_string()));
        }

        let kind = if capability.mime_type.to_lowercase().starts_with("audio/") {
            TrackKind::Audio
        } else {
            TrackKind::Video
        };

        Ok(Arc::new(SimOutbound {
            id: id.to_string(),
            stream_id: stream_id.to_string(),
            kind,
            subscribed: Arc::clone(&self.subscribed),
        }))
    }

    async fn add_track(&self, track: Arc<SimOutbound>) -> Result<Arc<SimSender>, EngineError> {
        let (feed_tx, feed_rx) = mpsc::channel(16);
        let sender = Arc::new(SimSender {
            track,
            media_line: Arc::new(SimMediaLine::default()),
            feed_tx,
            feed_rx: tokio::sync::Mutex::new(feed_rx),
            stopped: self.closed.child_token(),
        });
        self.senders.lock().unwrap().push(Arc::clone(&sender));
        Ok(sender)
    }

    async fn remove_track(&self, sender: &Arc<SimSender>) -> Result<(), EngineError> {
        sender.stopped.cancel();
        self.senders
            .lock()
            .unwrap()
            .retain(|s| !Arc::ptr_eq(s, sender));
        Ok(())
    }

    async fn sender_media_line(&self, sender: &Arc<SimSender>) -> Option<Arc<SimMediaLine>> {
        let delay = self.media_line_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        Some(Arc::clone(&sender.media_line))
    }

    async fn write_rtcp(&self, packets: &[RtcpPacket]) -> Result<usize, EngineError> {
        if self.fail_rtcp.load(Ordering::SeqCst) {
            return Err(EngineError::Other("dtls transport closed".to_string()));
        }
        self.rtcp_written.fetch_add(packets.len(), Ordering::SeqCst);
        Ok(packets.len())
    }

    fn on_track(&self, handler: TrackHandler<SimInbound, SimMediaLine>) {
        *self.on_track.lock().unwrap() = Some(handler);
    }

    fn on_ice_gathering_state_change(&self, handler: IceGatheringHandler) {
        handler("new".to_string());
    }

    async fn close(&self) -> Result<(), EngineError> {
        self.close_calls.fetch_add(1, Ordering::SeqCst);
        self.closed.cancel();
        Ok(())
    }
}

pub struct SimSignaller {
    initiator: bool,
    notifier: CloseNotifier,
    signal: CloseSignal,
    messages: Mutex<Vec<SignalMessage>>,
}

impl SimSignaller {
    pub fn new(initiator: bool) -> Arc<Self> {
        let (notifier, signal) = close_channel();
        Arc::new(Self {
            initiator,
            notifier,
            signal,
            messages: Mutex::new(Vec::new()),
        })
    }

    pub fn messages(&self) -> Vec<SignalMessage> {
        self.messages.lock().unwrap().clone()
    }
}

#[async_trait]
impl Signaller for SimSignaller {
    fn initiator(&self) -> bool {
        self.initiator
    }

    fn negotiate(&self) {
        self.messages.lock().unwrap().push(SignalMessage::Renegotiate);
    }

    fn request_transceiver(&self, request: TransceiverRequest) {
        self.messages
            .lock()
            .unwrap()
            .push(SignalMessage::from(request));
    }

    fn close_signal(&self) -> CloseSignal {
        self.signal.clone()
    }

    async fn close(&self) -> anyhow::Result<()> {
        self.notifier.notify();
        Ok(())
    }
}

pub struct SimData {
    closed: AtomicBool,
    messages_tx: Mutex<Option<mpsc::Sender<DataChannelMessage>>>,
    messages_rx: Mutex<Option<mpsc::Receiver<DataChannelMessage>>>,
}

impl SimData {
    pub fn new() -> Arc<Self> {
        let (tx, rx) = mpsc::channel(4);
        Arc::new(Self {
            closed: AtomicBool::new(false),
            messages_tx: Mutex::new(Some(tx)),
            messages_rx: Mutex::new(Some(rx)),
        })
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn sender(&self) -> Option<mpsc::Sender<DataChannelMessage>> {
        self.messages_tx.lock().unwrap().clone()
    }
}

#[async_trait]
impl DataTransceiver for SimData {
    fn take_messages(&self) -> Option<mpsc::Receiver<DataChannelMessage>> {
        self.messages_rx.lock().unwrap().take()
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.messages_tx.lock().unwrap().take();
    }
}

#[derive(Default)]
pub struct RecordingMetrics {
    values: Mutex<HashMap<&'static str, f64>>,
    observations: Mutex<Vec<(&'static str, f64)>>,
}

impl RecordingMetrics {
    pub fn value(&self, name: &str) -> f64 {
        self.values.lock().unwrap().get(name).copied().unwrap_or(0.0)
    }

    pub fn observations(&self, name: &str) -> usize {
        self.observations
            .lock()
            .unwrap()
            .iter()
            .filter(|(n, _)| *n == name)
            .count()
    }
}

impl MetricsSink for RecordingMetrics {
    fn add_to_counter(&self, name: &'static str, value: f64) {
        *self.values.lock().unwrap().entry(name).or_default() += value;
    }

    fn add_to_gauge(&self, name: &'static str, delta: f64) {
        *self.values.lock().unwrap().entry(name).or_default() += delta;
    }

    fn observe(&self, histogram: &'static str, value: f64) {
        self.observations.lock().unwrap().push((histogram, value));
    }
}

pub struct Harness {
    pub transport: Transport<SimEngine>,
    pub engine: Arc<SimEngine>,
    pub signaller: Arc<SimSignaller>,
    pub data: Arc<SimData>,
    pub metrics: Arc<RecordingMetrics>,
}

pub fn harness(initiator: bool) -> Harness {
    let engine = SimEngine::new();
    let signaller = SimSignaller::new(initiator);
    let data = SimData::new();
    let metrics = Arc::new(RecordingMetrics::default());

    let transport = Transport::new(
        "client-1",
        Arc::clone(&engine),
        signaller.clone(),
        data.clone(),
        metrics.clone(),
        TransportOptions::default(),
    );

    Harness {
        transport,
        engine,
        signaller,
        data,
        metrics,
    }
}
