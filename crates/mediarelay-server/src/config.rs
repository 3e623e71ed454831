//! Configuration loaded from the environment

use anyhow::{bail, Context};

use crate::transport::DEFAULT_CHANNEL_CAPACITY;

#[derive(Debug, Clone)]
pub struct Config {
    pub bind_address: String,
    pub ice_servers: Vec<IceServer>,
    pub network: NetworkConfig,
    pub channel_capacity: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IceServer {
    pub urls: Vec<String>,
    pub username: String,
    pub credential: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkProtocol {
    Udp4,
    Udp6,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PortRange {
    pub min: u16,
    pub max: u16,
}

impl PortRange {
    /// Both bounds set; zero means "let the OS pick"
    pub fn is_set(&self) -> bool {
        self.min > 0 && self.max > 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkConfig {
    /// Only gather candidates on these interfaces; empty means all
    pub interfaces: Vec<String>,
    pub protocols: Vec<NetworkProtocol>,
    pub udp: PortRange,
    pub jitter_buffer: bool,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            interfaces: vec![],
            protocols: vec![NetworkProtocol::Udp4, NetworkProtocol::Udp6],
            udp: PortRange::default(),
            jitter_buffer: false,
        }
    }
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

fn parse_protocols(value: &str) -> Vec<NetworkProtocol> {
    split_list(value)
        .into_iter()
        .filter_map(|protocol| match protocol.to_ascii_lowercase().as_str() {
            "udp4" => Some(NetworkProtocol::Udp4),
            "udp6" => Some(NetworkProtocol::Udp6),
            other => {
                tracing::warn!("Ignoring unsupported network protocol: {}", other);
                None
            }
        })
        .collect()
}

/// `url|username|credential` triples
fn parse_turn_servers(value: &str) -> anyhow::Result<Vec<IceServer>> {
    split_list(value)
        .into_iter()
        .map(|entry| {
            let mut parts = entry.splitn(3, '|');
            match (parts.next(), parts.next(), parts.next()) {
                (Some(url), Some(username), Some(credential)) => Ok(IceServer {
                    urls: vec![url.to_string()],
                    username: username.to_string(),
                    credential: credential.to_string(),
                }),
                _ => bail!("TURN server must be url|username|credential, got {}", entry),
            }
        })
        .collect()
}

fn parse_bool(key: &str, value: &str) -> anyhow::Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        other => bail!("{} must be a boolean, got {}", key, other),
    }
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        if let Err(e) = dotenvy::dotenv() {
            tracing::debug!("No .env file loaded: {}", e);
        }

        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Parses configuration from any key lookup, usually the environment
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let bind_address = lookup("BIND_ADDRESS").unwrap_or_else(|| "0.0.0.0:8080".to_string());

        let stun_servers = lookup("STUN_SERVERS")
            .map(|s| split_list(&s))
            .unwrap_or_else(|| vec!["stun:stun.l.google.com:19302".to_string()]);

        let mut ice_servers: Vec<IceServer> = stun_servers
            .into_iter()
            .map(|url| IceServer {
                urls: vec![url],
                username: String::new(),
                credential: String::new(),
            })
            .collect();

        if let Some(turn) = lookup("TURN_SERVERS") {
            ice_servers.extend(parse_turn_servers(&turn)?);
        }

        let mut network = NetworkConfig::default();

        if let Some(interfaces) = lookup("NETWORK_INTERFACES") {
            network.interfaces = split_list(&interfaces);
        }

        if let Some(protocols) = lookup("NETWORK_PROTOCOLS") {
            network.protocols = parse_protocols(&protocols);
        }

        if let Some(min) = lookup("UDP_PORT_MIN") {
            network.udp.min = min.trim().parse().context("UDP_PORT_MIN")?;
        }

        if let Some(max) = lookup("UDP_PORT_MAX") {
            network.udp.max = max.trim().parse().context("UDP_PORT_MAX")?;
        }

        if let Some(jitter_buffer) = lookup("JITTER_BUFFER") {
            network.jitter_buffer = parse_bool("JITTER_BUFFER", &jitter_buffer)?;
        }

        let channel_capacity = match lookup("CHANNEL_CAPACITY") {
            Some(capacity) => {
                let capacity: usize = capacity.trim().parse().context("CHANNEL_CAPACITY")?;
                capacity.max(1)
            }
            None => DEFAULT_CHANNEL_CAPACITY,
        };

        Ok(Config {
            bind_address,
            ice_servers,
            network,
            channel_capacity,
        })
    }
}
