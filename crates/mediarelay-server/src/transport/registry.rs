//! Track registry
//!
//! Sending and receiving tracks of one transport, keyed by SSRC. A local
//! and a remote track may share an SSRC; they live in separate maps.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use mediarelay_protocol::TrackInfo;

use crate::engine::{MediaLine, PeerEngine};

pub struct LocalTrack<E: PeerEngine> {
    pub info: TrackInfo,
    pub media_line: Option<Arc<E::MediaLine>>,
    pub sender: Arc<E::Sender>,
    pub track: Arc<E::Outbound>,
}

pub struct RemoteTrack<E: PeerEngine> {
    pub info: TrackInfo,
    pub media_line: Option<Arc<E::MediaLine>>,
    pub track: Arc<E::Inbound>,
}

struct Tracks<E: PeerEngine> {
    local: HashMap<u32, LocalTrack<E>>,
    remote: HashMap<u32, RemoteTrack<E>>,
}

/// Copy of the stored metadata with the mid read from the live transceiver
fn snapshot<M: MediaLine + ?Sized>(info: &TrackInfo, media_line: Option<&Arc<M>>) -> TrackInfo {
    let mut info = info.clone();
    info.mid = media_line.and_then(|line| line.mid());
    info
}

/// Every entry sits behind one lock. Nothing awaits engine or signaling
/// I/O while holding it.
pub struct TrackRegistry<E: PeerEngine> {
    tracks: RwLock<Tracks<E>>,
}

impl<E: PeerEngine> TrackRegistry<E> {
    pub fn new() -> Self {
        Self {
            tracks: RwLock::new(Tracks {
                local: HashMap::new(),
                remote: HashMap::new(),
            }),
        }
    }

    /// Overwrites a stale entry with the same SSRC
    pub async fn add_local(&self, ssrc: u32, track: LocalTrack<E>) {
        self.tracks.write().await.local.insert(ssrc, track);
    }

    pub async fn add_remote(&self, ssrc: u32, track: RemoteTrack<E>) {
        self.tracks.write().await.remote.insert(ssrc, track);
    }

    pub async fn remove_local(&self, ssrc: u32) -> Option<LocalTrack<E>> {
        self.tracks.write().await.local.remove(&ssrc)
    }

    pub async fn remove_remote(&self, ssrc: u32) -> bool {
        self.tracks.write().await.remote.remove(&ssrc).is_some()
    }

    /// Send path of a local track
    pub async fn outbound(&self, ssrc: u32) -> Option<Arc<E::Outbound>> {
        self.tracks
            .read()
            .await
            .local
            .get(&ssrc)
            .map(|local| Arc::clone(&local.track))
    }

    pub async fn list_local(&self) -> Vec<TrackInfo> {
        self.tracks
            .read()
            .await
            .local
            .values()
            .map(|local| snapshot(&local.info, local.media_line.as_ref()))
            .collect()
    }

    pub async fn list_remote(&self) -> Vec<TrackInfo> {
        self.tracks
            .read()
            .await
            .remote
            .values()
            .map(|remote| snapshot(&remote.info, remote.media_line.as_ref()))
            .collect()
    }

    /// Drops every local track, returning how many there were
    pub async fn clear_local(&self) -> usize {
        let mut tracks = self.tracks.write().await;
        let count = tracks.local.len();
        tracks.local.clear();
        count
    }
}

impl<E: PeerEngine> Default for TrackRegistry<E> {
    fn default() -> Self {
        Self::new()
    }
}
