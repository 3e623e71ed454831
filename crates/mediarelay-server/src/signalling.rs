//! Signaling collaborator
//!
//! SDP offer/answer lives outside the transport. The transport only asks
//! for renegotiation and listens for the one-shot close notification.
//! Requests travel to the remote peer as
//! [`SignalMessage`](mediarelay_protocol::SignalMessage)s.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::watch;

use mediarelay_protocol::TransceiverRequest;

#[async_trait]
pub trait Signaller: Send + Sync + 'static {
    /// Whether this side creates the offers
    fn initiator(&self) -> bool;

    /// Fire-and-forget; the signaller owns retries of the handshake.
    /// Without an offer of its own a signaller relays it as
    /// `SignalMessage::Renegotiate`.
    fn negotiate(&self);

    /// Ask the remote peer to add a transceiver, used when not the initiator.
    /// Sent as `SignalMessage::from(request)`.
    fn request_transceiver(&self, request: TransceiverRequest);

    fn close_signal(&self) -> CloseSignal;

    async fn close(&self) -> anyhow::Result<()>;
}

/// Fires the close notification exactly once
#[derive(Debug, Clone)]
pub struct CloseNotifier {
    tx: Arc<watch::Sender<bool>>,
}

/// Receiving end of the close notification; cheap to clone
#[derive(Debug, Clone)]
pub struct CloseSignal {
    rx: watch::Receiver<bool>,
}

pub fn close_channel() -> (CloseNotifier, CloseSignal) {
    let (tx, rx) = watch::channel(false);
    (CloseNotifier { tx: Arc::new(tx) }, CloseSignal { rx })
}

impl CloseNotifier {
    /// Returns false if the notification had already fired
    pub fn notify(&self) -> bool {
        !self.tx.send_replace(true)
    }
}

impl CloseSignal {
    pub fn is_closed(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once closed. A notifier dropped without firing counts as closed.
    pub async fn closed(&mut self) {
        let _ = self.rx.wait_for(|closed| *closed).await;
    }
}
