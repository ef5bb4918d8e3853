//! Stub collaborators for testing the negotiation state machine without a
//! real device or WebRTC stack.
//!
//! The stubs record every interaction in a shared log so tests can assert on
//! side effects after the negotiator has consumed the boxed trait objects.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::mpsc;

use tandem_shared::protocol::{IceCandidate, SessionDescription};

use crate::capture::{LocalMedia, MediaError, MediaProvider, MediaTrack};
use crate::peer::{IceServers, PeerConnection, PeerConnector, PeerEvent};

/// Media provider handing out a single stub audio track.
pub struct StubMedia {
    fail: Option<MediaError>,
    acquired: Arc<AtomicUsize>,
}

impl StubMedia {
    pub fn new() -> Self {
        Self {
            fail: None,
            acquired: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// A provider whose every acquisition fails with `error`.
    pub fn failing(error: MediaError) -> Self {
        Self {
            fail: Some(error),
            acquired: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Shared acquisition counter, usable after the provider is boxed away.
    pub fn counter(&self) -> Arc<AtomicUsize> {
        self.acquired.clone()
    }
}

impl Default for StubMedia {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MediaProvider for StubMedia {
    async fn acquire_audio(&mut self) -> Result<LocalMedia, MediaError> {
        if let Some(error) = &self.fail {
            return Err(error.clone());
        }
        self.acquired.fetch_add(1, Ordering::SeqCst);
        Ok(LocalMedia::new(vec![MediaTrack::audio("stub-mic")]))
    }
}

/// Everything the stub peer connection was asked to do.
#[derive(Debug, Default)]
pub struct PeerLog {
    pub connects: usize,
    pub local_descriptions: Vec<SessionDescription>,
    pub remote_descriptions: Vec<SessionDescription>,
    pub candidates: Vec<IceCandidate>,
    pub tracks: Vec<MediaTrack>,
    pub closed: usize,
    /// Set by a test to make `set_remote_description` fail.
    pub fail_remote_description: bool,
    /// The event sender handed to the last `connect` call, for driving
    /// `PeerEvent`s from a test.
    pub events_tx: Option<mpsc::Sender<PeerEvent>>,
}

/// Connector producing [`StubConnection`]s that share one [`PeerLog`].
pub struct StubConnector {
    log: Arc<Mutex<PeerLog>>,
    fail: bool,
}

impl StubConnector {
    pub fn new() -> (Self, Arc<Mutex<PeerLog>>) {
        let log = Arc::new(Mutex::new(PeerLog::default()));
        (
            Self {
                log: log.clone(),
                fail: false,
            },
            log,
        )
    }

    pub fn failing() -> Self {
        Self {
            log: Arc::new(Mutex::new(PeerLog::default())),
            fail: true,
        }
    }
}

#[async_trait]
impl PeerConnector for StubConnector {
    async fn connect(
        &mut self,
        _ice_servers: &IceServers,
        events: mpsc::Sender<PeerEvent>,
    ) -> Result<Box<dyn PeerConnection>, MediaError> {
        if self.fail {
            return Err(MediaError::Negotiation("connect refused".into()));
        }
        let mut log = self.log.lock().expect("peer log lock");
        log.connects += 1;
        log.events_tx = Some(events);
        Ok(Box::new(StubConnection {
            log: self.log.clone(),
        }))
    }
}

pub struct StubConnection {
    log: Arc<Mutex<PeerLog>>,
}

#[async_trait]
impl PeerConnection for StubConnection {
    async fn create_offer(&mut self) -> Result<SessionDescription, MediaError> {
        Ok(SessionDescription::offer("v=0 stub offer"))
    }

    async fn create_answer(&mut self) -> Result<SessionDescription, MediaError> {
        Ok(SessionDescription::answer("v=0 stub answer"))
    }

    async fn set_local_description(
        &mut self,
        desc: SessionDescription,
    ) -> Result<(), MediaError> {
        self.log
            .lock()
            .expect("peer log lock")
            .local_descriptions
            .push(desc);
        Ok(())
    }

    async fn set_remote_description(
        &mut self,
        desc: SessionDescription,
    ) -> Result<(), MediaError> {
        let mut log = self.log.lock().expect("peer log lock");
        if log.fail_remote_description {
            return Err(MediaError::Negotiation("remote description refused".into()));
        }
        log.remote_descriptions.push(desc);
        Ok(())
    }

    async fn add_ice_candidate(&mut self, candidate: IceCandidate) -> Result<(), MediaError> {
        self.log
            .lock()
            .expect("peer log lock")
            .candidates
            .push(candidate);
        Ok(())
    }

    fn add_track(&mut self, track: MediaTrack) {
        self.log.lock().expect("peer log lock").tracks.push(track);
    }

    fn close(&mut self) {
        self.log.lock().expect("peer log lock").closed += 1;
    }
}
