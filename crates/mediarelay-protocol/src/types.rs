use serde::{Deserialize, Serialize};
use std::fmt;

/// Media kind of a track
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackKind {
    Audio,
    Video,
}

impl fmt::Display for TrackKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrackKind::Audio => write!(f, "audio"),
            TrackKind::Video => write!(f, "video"),
        }
    }
}

/// Metadata of a sending or receiving track.
///
/// Always handed out as a copy; the `mid` is `None` until the first
/// negotiation assigned the track a media line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackInfo {
    pub ssrc: u32,
    pub id: String,
    pub stream_id: String,
    pub kind: TrackKind,
    pub mid: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackEventType {
    Added,
    Removed,
}

/// A remote track appeared or went away
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackEvent {
    #[serde(flatten)]
    pub track: TrackInfo,
    #[serde(rename = "type")]
    pub event_type: TrackEventType,
}

impl TrackEvent {
    pub fn added(track: TrackInfo) -> Self {
        Self {
            track,
            event_type: TrackEventType::Added,
        }
    }

    pub fn removed(track: TrackInfo) -> Self {
        Self {
            track,
            event_type: TrackEventType::Removed,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransceiverDirection {
    #[default]
    Sendrecv,
    Sendonly,
    Recvonly,
    Inactive,
}

impl fmt::Display for TransceiverDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TransceiverDirection::Sendrecv => "sendrecv",
            TransceiverDirection::Sendonly => "sendonly",
            TransceiverDirection::Recvonly => "recvonly",
            TransceiverDirection::Inactive => "inactive",
        };
        f.write_str(s)
    }
}
