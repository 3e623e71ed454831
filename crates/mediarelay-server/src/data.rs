//! Data channel collaborator
//!
//! The transport only needs the message stream and a close that it can
//! sequence into its own shutdown.

use async_trait::async_trait;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::mpsc;
use webrtc::data_channel::RTCDataChannel;
use webrtc::peer_connection::RTCPeerConnection;

pub use webrtc::data_channel::data_channel_message::DataChannelMessage;

pub const DATA_CHANNEL_LABEL: &str = "data";

#[async_trait]
pub trait DataTransceiver: Send + Sync + 'static {
    /// The message stream; handed out once
    fn take_messages(&self) -> Option<mpsc::Receiver<DataChannelMessage>>;

    /// Closes the channel and ends the message stream
    async fn close(&self);
}

#[derive(Default)]
struct Shared {
    channel: Mutex<Option<Arc<RTCDataChannel>>>,
    messages_tx: Mutex<Option<mpsc::Sender<DataChannelMessage>>>,
}

/// Data channel of a webrtc-rs peer connection.
///
/// The initiator creates the channel itself; the other side waits for
/// the remote peer to open it.
pub struct RtcDataTransceiver {
    client_id: String,
    shared: Arc<Shared>,
    messages_rx: Mutex<Option<mpsc::Receiver<DataChannelMessage>>>,
}

impl RtcDataTransceiver {
    pub fn new(
        client_id: &str,
        data_channel: Option<Arc<RTCDataChannel>>,
        peer_connection: &RTCPeerConnection,
        capacity: usize,
    ) -> Self {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let shared = Arc::new(Shared {
            channel: Mutex::new(None),
            messages_tx: Mutex::new(Some(tx)),
        });

        match data_channel {
            Some(channel) => attach(client_id.to_string(), &shared, channel),
            None => {
                let shared = Arc::clone(&shared);
                let client_id = client_id.to_string();
                peer_connection.on_data_channel(Box::new(move |channel| {
                    attach(client_id.clone(), &shared, channel);
                    Box::pin(async {})
                }));
            }
        }

        Self {
            client_id: client_id.to_string(),
            shared,
            messages_rx: Mutex::new(Some(rx)),
        }
    }
}

fn attach(client_id: String, shared: &Arc<Shared>, channel: Arc<RTCDataChannel>) {
    tracing::debug!("[{}] Data channel attached: {}", client_id, channel.label());

    let forward_to = Arc::clone(shared);
    channel.on_message(Box::new(move |message: DataChannelMessage| {
        let tx = forward_to
            .messages_tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        let client_id = client_id.clone();

        Box::pin(async move {
            let Some(tx) = tx else {
                return;
            };
            if tx.send(message).await.is_err() {
                tracing::trace!("[{}] Data channel message dropped, no reader", client_id);
            }
        })
    }));

    *shared.channel.lock().unwrap_or_else(PoisonError::into_inner) = Some(channel);
}

#[async_trait]
impl DataTransceiver for RtcDataTransceiver {
    fn take_messages(&self) -> Option<mpsc::Receiver<DataChannelMessage>> {
        self.messages_rx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    async fn close(&self) {
        self.shared
            .messages_tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        let channel = self
            .shared
            .channel
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        if let Some(channel) = channel {
            if let Err(e) = channel.close().await {
                tracing::warn!("[{}] Error closing data channel: {}", self.client_id, e);
            }
        }
    }
}
