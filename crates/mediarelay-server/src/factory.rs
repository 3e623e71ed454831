//! Builds webrtc-rs transports
//!
//! One API (media engine, interceptors, setting engine) is shared by every
//! peer connection the factory creates.

use std::collections::HashSet;
use std::sync::Arc;
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine;
use webrtc::api::setting_engine::SettingEngine;
use webrtc::api::{APIBuilder, API};
use webrtc::ice::network_type::NetworkType;
use webrtc::ice::udp_network::{EphemeralUDP, UDPNetwork};
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::RTCPeerConnection;

use crate::config::{Config, IceServer, NetworkConfig, NetworkProtocol};
use crate::data::{RtcDataTransceiver, DATA_CHANNEL_LABEL};
use crate::engine::RtcEngine;
use crate::error::{Result, TransportError};
use crate::metrics::MetricsSink;
use crate::signalling::Signaller;
use crate::transport::{Transport, TransportOptions};

pub struct TransportFactory {
    api: Arc<API>,
    ice_servers: Vec<RTCIceServer>,
    network: NetworkConfig,
    channel_capacity: usize,
    metrics: Arc<dyn MetricsSink>,
}

fn setting_engine(network: &NetworkConfig) -> SettingEngine {
    let mut setting_engine = SettingEngine::default();

    let network_types = network
        .protocols
        .iter()
        .map(|protocol| match protocol {
            NetworkProtocol::Udp4 => NetworkType::Udp4,
            NetworkProtocol::Udp6 => NetworkType::Udp6,
        })
        .collect();
    setting_engine.set_network_types(network_types);

    let udp = network.udp;
    if udp.is_set() {
        match EphemeralUDP::new(udp.min, udp.max) {
            Ok(ephemeral) => {
                setting_engine.set_udp_network(UDPNetwork::Ephemeral(ephemeral));
                tracing::info!("Set ephemeral UDP port range to {}-{}", udp.min, udp.max);
            }
            Err(e) => {
                tracing::error!(
                    "Error setting ephemeral UDP port range ({}-{}): {}",
                    udp.min,
                    udp.max,
                    e
                );
            }
        }
    }

    if !network.interfaces.is_empty() {
        let allowed: HashSet<String> = network.interfaces.iter().cloned().collect();
        setting_engine.set_interface_filter(Box::new(move |iface: &str| allowed.contains(iface)));
    }

    setting_engine
}

fn rtc_ice_servers(ice_servers: &[IceServer]) -> Vec<RTCIceServer> {
    ice_servers
        .iter()
        .map(|server| RTCIceServer {
            urls: server.urls.clone(),
            username: server.username.clone(),
            credential: server.credential.clone(),
            ..Default::default()
        })
        .collect()
}

/// Close a partially built peer connection, keeping the original failure
async fn close_peer(peer_connection: &RTCPeerConnection, reason: TransportError) -> TransportError {
    match peer_connection.close().await {
        Ok(()) => reason,
        Err(e) => TransportError::CloseAfterFailure {
            reason: Box::new(reason),
            close_error: e.into(),
        },
    }
}

impl TransportFactory {
    pub fn new(config: &Config, metrics: Arc<dyn MetricsSink>) -> anyhow::Result<Self> {
        let mut media_engine = MediaEngine::default();
        mediarelay_media::register_codecs(&mut media_engine, config.network.jitter_buffer)?;

        let registry = register_default_interceptors(Registry::new(), &mut media_engine)?;

        let api = APIBuilder::new()
            .with_media_engine(media_engine)
            .with_interceptor_registry(registry)
            .with_setting_engine(setting_engine(&config.network))
            .build();

        Ok(Self {
            api: Arc::new(api),
            ice_servers: rtc_ice_servers(&config.ice_servers),
            network: config.network.clone(),
            channel_capacity: config.channel_capacity,
            metrics,
        })
    }

    pub fn ice_servers(&self) -> &[RTCIceServer] {
        &self.ice_servers
    }

    pub fn network(&self) -> &NetworkConfig {
        &self.network
    }

    /// Creates a peer connection and the transport around it.
    ///
    /// The initiator opens the data channel itself. On failure the peer
    /// connection is closed before the error is returned.
    pub async fn new_transport<F>(
        &self,
        client_id: &str,
        initiator: bool,
        build_signaller: F,
    ) -> Result<Transport<RtcEngine>>
    where
        F: FnOnce(Arc<RTCPeerConnection>, bool) -> anyhow::Result<Arc<dyn Signaller>>,
    {
        let config = RTCConfiguration {
            ice_servers: self.ice_servers.clone(),
            ..Default::default()
        };

        let peer_connection = Arc::new(
            self.api
                .new_peer_connection(config)
                .await
                .map_err(|e| TransportError::engine("new peer connection", e.into()))?,
        );

        let data_channel = if initiator {
            match peer_connection
                .create_data_channel(DATA_CHANNEL_LABEL, None)
                .await
            {
                Ok(channel) => Some(channel),
                Err(e) => {
                    let reason = TransportError::engine("create data channel", e.into());
                    return Err(close_peer(&peer_connection, reason).await);
                }
            }
        } else {
            None
        };

        let data = Arc::new(RtcDataTransceiver::new(
            client_id,
            data_channel,
            &peer_connection,
            self.channel_capacity,
        ));

        let signaller = match build_signaller(Arc::clone(&peer_connection), initiator) {
            Ok(signaller) => signaller,
            Err(e) => {
                let reason = TransportError::Signaller(e.context("initialize signaller"));
                return Err(close_peer(&peer_connection, reason).await);
            }
        };

        tracing::info!("[{}] Created transport (initiator: {})", client_id, initiator);

        let options = TransportOptions {
            channel_capacity: self.channel_capacity,
            default_capability: mediarelay_media::vp8_capability(self.network.jitter_buffer),
        };

        Ok(Transport::new(
            client_id,
            Arc::new(RtcEngine::new(peer_connection)),
            signaller,
            data,
            Arc::clone(&self.metrics),
            options,
        ))
    }
}
