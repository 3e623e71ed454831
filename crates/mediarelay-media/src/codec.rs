//! Codec registration
//!
//! VP8 for video and Opus for audio, with the RTCP feedback the relay
//! forwards between peers.

use webrtc::api::media_engine::MediaEngine;
use webrtc::rtp_transceiver::rtp_codec::{
    RTCRtpCodecCapability, RTCRtpCodecParameters, RTPCodecType,
};
use webrtc::rtp_transceiver::RTCPFeedback;

pub const MIME_TYPE_VP8: &str = "video/VP8";
pub const MIME_TYPE_OPUS: &str = "audio/opus";

pub const VP8_PAYLOAD_TYPE: u8 = 96;
pub const OPUS_PAYLOAD_TYPE: u8 = 111;

/// RTCP feedback advertised for video
///
/// Generic NACK is only useful when something buffers packets for
/// retransmission, so it is tied to the jitter buffer setting.
pub fn video_feedback(jitter_buffer: bool) -> Vec<RTCPFeedback> {
    let mut feedback = vec![
        RTCPFeedback {
            typ: "goog-remb".to_string(),
            parameter: String::new(),
        },
        // Picture Loss Indication, RFC 4585 section 6.3.1
        RTCPFeedback {
            typ: "nack".to_string(),
            parameter: "pli".to_string(),
        },
    ];

    if jitter_buffer {
        feedback.push(RTCPFeedback {
            typ: "nack".to_string(),
            parameter: String::new(),
        });
    }

    feedback
}

pub fn vp8_capability(jitter_buffer: bool) -> RTCRtpCodecCapability {
    RTCRtpCodecCapability {
        mime_type: MIME_TYPE_VP8.to_string(),
        clock_rate: 90000,
        channels: 0,
        sdp_fmtp_line: String::new(),
        rtcp_feedback: video_feedback(jitter_buffer),
    }
}

pub fn opus_capability() -> RTCRtpCodecCapability {
    RTCRtpCodecCapability {
        mime_type: MIME_TYPE_OPUS.to_string(),
        clock_rate: 48000,
        channels: 2,
        sdp_fmtp_line: "minptime=10;useinbandfec=1".to_string(),
        rtcp_feedback: vec![],
    }
}

/// Register the relay's codecs on a media engine
pub fn register_codecs(
    media_engine: &mut MediaEngine,
    jitter_buffer: bool,
) -> Result<(), webrtc::Error> {
    media_engine.register_codec(
        RTCRtpCodecParameters {
            capability: vp8_capability(jitter_buffer),
            payload_type: VP8_PAYLOAD_TYPE,
            ..Default::default()
        },
        RTPCodecType::Video,
    )?;

    media_engine.register_codec(
        RTCRtpCodecParameters {
            capability: opus_capability(),
            payload_type: OPUS_PAYLOAD_TYPE,
            ..Default::default()
        },
        RTPCodecType::Audio,
    )?;

    tracing::debug!(
        "Registered codecs {} ({}) and {} ({}), jitter buffer: {}",
        MIME_TYPE_VP8,
        VP8_PAYLOAD_TYPE,
        MIME_TYPE_OPUS,
        OPUS_PAYLOAD_TYPE,
        jitter_buffer
    );

    Ok(())
}
