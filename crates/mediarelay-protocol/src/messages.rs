use serde::{Deserialize, Serialize};

use crate::types::{TrackKind, TransceiverDirection};

/// Asks the remote peer to open a transceiver of the given kind.
///
/// Sent by the side that is not the negotiation initiator, which cannot
/// start an offer itself when it begins sending a new track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransceiverRequest {
    pub kind: TrackKind,
    pub direction: TransceiverDirection,
}

impl TransceiverRequest {
    pub fn recv_only(kind: TrackKind) -> Self {
        Self {
            kind,
            direction: TransceiverDirection::Recvonly,
        }
    }
}

/// Out-of-band messages a signaller exchanges alongside SDP.
///
/// This is the wire form of the transport's renegotiation and transceiver
/// requests; signallers forward them to the remote peer as JSON.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SignalMessage {
    /// Remote peer should renegotiate
    Renegotiate,

    /// Remote peer should add a transceiver
    TransceiverRequest { transceiver_request: TransceiverRequest },
}

impl From<TransceiverRequest> for SignalMessage {
    fn from(transceiver_request: TransceiverRequest) -> Self {
        SignalMessage::TransceiverRequest {
            transceiver_request,
        }
    }
}
