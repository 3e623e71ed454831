//! Shutdown coordination
//!
//! `Open -> Closing -> Closed`. Pumps are spawned only while Open and each
//! one owns clones of the shared senders. The master senders are dropped
//! after every pump has been joined, so consumers see the shared channels
//! end only once nothing can publish on them any more.

use std::future::Future;
use std::sync::{Mutex, PoisonError};
use tokio::sync::{mpsc, watch};
use tokio_util::task::TaskTracker;

use mediarelay_protocol::TrackEvent;

use crate::engine::{RtcpPacket, RtpPacket};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Open,
    Closing,
    Closed,
}

/// Publishing ends of the shared channels, one clone per pump
#[derive(Clone)]
pub struct PumpChannels {
    pub rtp: mpsc::Sender<RtpPacket>,
    pub rtcp: mpsc::Sender<RtcpPacket>,
    pub events: mpsc::Sender<TrackEvent>,
}

/// Receiving ends handed to the relay
pub struct ConsumerChannels {
    pub rtp: mpsc::Receiver<RtpPacket>,
    pub rtcp: mpsc::Receiver<RtcpPacket>,
    pub events: mpsc::Receiver<TrackEvent>,
}

pub fn pump_channels(capacity: usize) -> (PumpChannels, ConsumerChannels) {
    let capacity = capacity.max(1);
    let (rtp_tx, rtp_rx) = mpsc::channel(capacity);
    let (rtcp_tx, rtcp_rx) = mpsc::channel(capacity);
    let (events_tx, events_rx) = mpsc::channel(capacity);

    (
        PumpChannels {
            rtp: rtp_tx,
            rtcp: rtcp_tx,
            events: events_tx,
        },
        ConsumerChannels {
            rtp: rtp_rx,
            rtcp: rtcp_rx,
            events: events_rx,
        },
    )
}

pub struct Lifecycle {
    state: watch::Sender<SessionState>,
    // Also guards the Open check in `spawn_pump` against `begin_close`
    channels: Mutex<Option<PumpChannels>>,
    tracker: TaskTracker,
}

impl Lifecycle {
    pub fn new(channels: PumpChannels) -> Self {
        let (state, _) = watch::channel(SessionState::Open);

        Self {
            state,
            channels: Mutex::new(Some(channels)),
            tracker: TaskTracker::new(),
        }
    }

    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    /// Number of pumps that have not exited yet
    pub fn active_pumps(&self) -> usize {
        self.tracker.len()
    }

    /// Starts a pump with its own handle on the shared channels.
    ///
    /// Returns false without running `pump` once shutdown has begun.
    pub fn spawn_pump<F, Fut>(&self, pump: F) -> bool
    where
        F: FnOnce(PumpChannels) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let channels = self.channels.lock().unwrap_or_else(PoisonError::into_inner);

        match channels.as_ref() {
            Some(channels) if self.state() == SessionState::Open => {
                self.tracker.spawn(pump(channels.clone()));
                true
            }
            _ => false,
        }
    }

    /// Open -> Closing. Returns false if shutdown had already begun.
    pub fn begin_close(&self) -> bool {
        let _channels = self.channels.lock().unwrap_or_else(PoisonError::into_inner);

        let began = self.state.send_if_modified(|state| {
            if *state == SessionState::Open {
                *state = SessionState::Closing;
                true
            } else {
                false
            }
        });

        if began {
            self.tracker.close();
        }

        began
    }

    /// Waits for every pump spawned before `begin_close`
    pub async fn join(&self) {
        self.tracker.wait().await;
    }

    /// Closing -> Closed, ending the shared channels
    pub fn finish(&self) {
        self.channels
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        self.state.send_replace(SessionState::Closed);
    }
}
