//! Call negotiation state machine.
//!
//! Owns the single active call session: offer/answer exchange, the pending
//! ICE queue, local/remote media handles, and teardown. All inbound handlers
//! guard on the current state and silently discard events that no longer
//! apply — the relay gives no ordering guarantee relative to local actions,
//! so a late answer or candidate after teardown is normal, not an error.

use std::collections::VecDeque;

use serde::Serialize;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use tandem_shared::protocol::{IceCandidate, SessionDescription};
use tandem_shared::types::Username;

use crate::capture::{LocalMedia, MediaError, MediaProvider, MediaTrack, RemoteMedia};
use crate::peer::{IceServers, PeerConnection, PeerConnector, PeerEvent};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CallError {
    #[error("You must log in before calling")]
    NotLoggedIn,

    #[error("Already in a call")]
    AlreadyInCall,

    #[error("No incoming call to accept")]
    NoIncomingCall,

    #[error("No active call")]
    NoActiveCall,

    #[error(transparent)]
    Media(#[from] MediaError),
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub enum CallState {
    Idle,
    /// Acquiring local media for an outbound call.
    Requesting,
    /// Local media bound, producing the offer.
    Offering,
    AwaitingAnswer,
    /// An offer arrived and waits for the consumer to accept it.
    OfferReceived,
    /// Offer accepted locally, producing the answer.
    Answering,
    Negotiating,
    Connected,
}

struct CallSession {
    partner: Username,
    state: CallState,
    link: Option<Box<dyn PeerConnection>>,
    local: Option<LocalMedia>,
    remote: Option<RemoteMedia>,
    pending_offer: Option<SessionDescription>,
    pending_ice: VecDeque<IceCandidate>,
    remote_desc_set: bool,
}

impl CallSession {
    fn new(partner: Username, state: CallState) -> Self {
        Self {
            partner,
            state,
            link: None,
            local: None,
            remote: None,
            pending_offer: None,
            pending_ice: VecDeque::new(),
            remote_desc_set: false,
        }
    }
}

/// The call-negotiation state machine. One per client session; holds at most
/// one active [`CallSession`].
pub struct CallNegotiator {
    media: Box<dyn MediaProvider>,
    connector: Box<dyn PeerConnector>,
    ice_servers: IceServers,
    events_tx: mpsc::Sender<PeerEvent>,
    session: Option<CallSession>,
}

impl CallNegotiator {
    pub fn new(
        media: Box<dyn MediaProvider>,
        connector: Box<dyn PeerConnector>,
        ice_servers: IceServers,
        events_tx: mpsc::Sender<PeerEvent>,
    ) -> Self {
        Self {
            media,
            connector,
            ice_servers,
            events_tx,
            session: None,
        }
    }

    pub fn state(&self) -> CallState {
        self.session
            .as_ref()
            .map(|s| s.state)
            .unwrap_or(CallState::Idle)
    }

    pub fn partner(&self) -> Option<&Username> {
        self.session.as_ref().map(|s| &s.partner)
    }

    pub fn remote_media(&self) -> Option<&RemoteMedia> {
        self.session.as_ref().and_then(|s| s.remote.as_ref())
    }

    /// Candidates waiting for the connection to become ready.
    pub fn queued_candidates(&self) -> usize {
        self.session.as_ref().map(|s| s.pending_ice.len()).unwrap_or(0)
    }

    /// Start an outbound call. Rejected while another call is active; the
    /// existing session is kept.
    ///
    /// On success the returned offer must be emitted to the partner. Local
    /// ICE candidates flow separately through the peer event channel.
    pub async fn start_call(&mut self, partner: Username) -> Result<SessionDescription, CallError> {
        if self.session.is_some() {
            warn!("Call attempt while another call is active");
            return Err(CallError::AlreadyInCall);
        }
        info!(partner = %partner, "Starting call");
        self.session = Some(CallSession::new(partner, CallState::Requesting));

        match self.create_offer_flow().await {
            Ok(offer) => Ok(offer),
            Err(e) => {
                warn!(error = %e, "Call setup failed, returning to idle");
                self.teardown();
                Err(e)
            }
        }
    }

    async fn create_offer_flow(&mut self) -> Result<SessionDescription, CallError> {
        let mut local = self.media.acquire_audio().await?;
        if let Some(session) = self.session.as_mut() {
            session.state = CallState::Offering;
        }

        let mut link = match self
            .connector
            .connect(&self.ice_servers, self.events_tx.clone())
            .await
        {
            Ok(link) => link,
            Err(e) => {
                local.release();
                return Err(e.into());
            }
        };
        for track in local.tracks() {
            link.add_track(track.clone());
        }

        let offer = match link.create_offer().await {
            Ok(offer) => offer,
            Err(e) => {
                link.close();
                local.release();
                return Err(e.into());
            }
        };
        if let Err(e) = link.set_local_description(offer.clone()).await {
            link.close();
            local.release();
            return Err(e.into());
        }

        let session = match self.session.as_mut() {
            Some(session) => session,
            None => {
                link.close();
                local.release();
                return Err(CallError::NoActiveCall);
            }
        };
        session.local = Some(local);
        session.link = Some(link);
        session.state = CallState::AwaitingAnswer;
        debug!("SDP offer created, awaiting answer");
        Ok(offer)
    }

    /// Handle an inbound offer. Creates the session in `OfferReceived`;
    /// media is not touched until the consumer explicitly accepts.
    ///
    /// Returns whether the offer was taken up. An offer while a call is
    /// already active is stale and discarded.
    pub fn on_remote_offer(&mut self, from: Username, offer: SessionDescription) -> bool {
        if self.session.is_some() {
            debug!(from = %from, "Ignoring offer while a call is active");
            return false;
        }
        info!(from = %from, "Incoming call offer");
        let mut session = CallSession::new(from, CallState::OfferReceived);
        session.pending_offer = Some(offer);
        self.session = Some(session);
        true
    }

    /// Accept the pending inbound offer: acquire media, apply the remote
    /// offer, flush any early candidates, and produce the answer to emit.
    pub async fn accept_call(&mut self) -> Result<SessionDescription, CallError> {
        match self.state() {
            CallState::OfferReceived => {}
            CallState::Idle => return Err(CallError::NoIncomingCall),
            _ => return Err(CallError::AlreadyInCall),
        }
        info!("Accepting incoming call");
        if let Some(session) = self.session.as_mut() {
            session.state = CallState::Answering;
        }

        match self.create_answer_flow().await {
            Ok(answer) => Ok(answer),
            Err(e) => {
                warn!(error = %e, "Failed to accept call, returning to idle");
                self.teardown();
                Err(e)
            }
        }
    }

    async fn create_answer_flow(&mut self) -> Result<SessionDescription, CallError> {
        let mut local = self.media.acquire_audio().await?;
        let mut link = match self
            .connector
            .connect(&self.ice_servers, self.events_tx.clone())
            .await
        {
            Ok(link) => link,
            Err(e) => {
                local.release();
                return Err(e.into());
            }
        };
        for track in local.tracks() {
            link.add_track(track.clone());
        }

        let session = match self.session.as_mut() {
            Some(session) => session,
            None => {
                link.close();
                local.release();
                return Err(CallError::NoActiveCall);
            }
        };
        let offer = match session.pending_offer.take() {
            Some(offer) => offer,
            None => {
                link.close();
                local.release();
                return Err(CallError::NoIncomingCall);
            }
        };

        if let Err(e) = link.set_remote_description(offer).await {
            link.close();
            local.release();
            return Err(e.into());
        }
        // Candidates that raced ahead of the local accept
        while let Some(candidate) = session.pending_ice.pop_front() {
            if let Err(e) = link.add_ice_candidate(candidate).await {
                warn!(error = %e, "Failed to apply queued ICE candidate");
            }
        }

        let answer = match link.create_answer().await {
            Ok(answer) => answer,
            Err(e) => {
                link.close();
                local.release();
                return Err(e.into());
            }
        };
        if let Err(e) = link.set_local_description(answer.clone()).await {
            link.close();
            local.release();
            return Err(e.into());
        }

        session.remote_desc_set = true;
        session.local = Some(local);
        session.link = Some(link);
        session.state = CallState::Negotiating;
        debug!("SDP answer created");
        Ok(answer)
    }

    /// Handle the partner's answer. Valid only while `AwaitingAnswer`; in
    /// any other state the event is stale and produces no state change, no
    /// emitted event, and no user-facing error.
    ///
    /// Returns `Ok(true)` when the answer advanced the session.
    pub async fn on_remote_answer(
        &mut self,
        answer: SessionDescription,
    ) -> Result<bool, CallError> {
        let result = {
            let Some(session) = self.session.as_mut() else {
                debug!("Ignoring answer: no active call");
                return Ok(false);
            };
            if session.state != CallState::AwaitingAnswer {
                debug!(state = ?session.state, "Ignoring stale answer");
                return Ok(false);
            }
            match session.link.as_mut() {
                Some(link) => link.set_remote_description(answer).await,
                None => return Ok(false),
            }
        };

        match result {
            Ok(()) => {
                if let Some(session) = self.session.as_mut() {
                    session.remote_desc_set = true;
                    session.state = CallState::Negotiating;
                }
                self.flush_pending_ice().await;
                debug!("Remote answer applied, negotiating");
                Ok(true)
            }
            Err(e) => {
                warn!(error = %e, "Failed to apply remote answer, tearing down");
                self.teardown();
                Err(e.into())
            }
        }
    }

    /// Handle a partner candidate. Queued until the connection can accept
    /// it, applied in receipt order afterwards, silently discarded when no
    /// call is active.
    pub async fn on_remote_ice(&mut self, candidate: IceCandidate) {
        let Some(session) = self.session.as_mut() else {
            debug!("Discarding ICE candidate: no active call");
            return;
        };
        if session.remote_desc_set {
            if let Some(link) = session.link.as_mut() {
                if let Err(e) = link.add_ice_candidate(candidate).await {
                    warn!(error = %e, "Failed to apply ICE candidate");
                }
                return;
            }
        }
        debug!("Queueing ICE candidate until the connection is ready");
        session.pending_ice.push_back(candidate);
    }

    async fn flush_pending_ice(&mut self) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        while let Some(candidate) = session.pending_ice.pop_front() {
            if let Some(link) = session.link.as_mut() {
                if let Err(e) = link.add_ice_candidate(candidate).await {
                    warn!(error = %e, "Failed to apply queued ICE candidate");
                }
            }
        }
    }

    /// Record an arriving remote track. Returns `true` when this created the
    /// remote media handle (first track), so the caller can expose it for
    /// playback.
    pub fn on_remote_track(&mut self, track: MediaTrack) -> bool {
        let Some(session) = self.session.as_mut() else {
            debug!("Ignoring remote track: no active call");
            return false;
        };
        let first = session.remote.is_none();
        session
            .remote
            .get_or_insert_with(RemoteMedia::default)
            .push(track);
        if first {
            info!("Remote media available");
        }
        first
    }

    /// The media path is up. Returns `true` on the `Negotiating -> Connected`
    /// transition; anything else is stale.
    pub fn on_peer_connected(&mut self) -> bool {
        let Some(session) = self.session.as_mut() else {
            return false;
        };
        if session.state != CallState::Negotiating {
            debug!(state = ?session.state, "Ignoring connected signal");
            return false;
        }
        session.state = CallState::Connected;
        info!(partner = %session.partner, "Call connected");
        true
    }

    /// Tear down the active call. Idempotent; returns whether a teardown
    /// actually happened, so the caller emits the end-call signal at most
    /// once.
    pub fn end_call(&mut self) -> bool {
        self.teardown()
    }

    /// The partner hung up.
    pub fn on_remote_end(&mut self) -> bool {
        if self.session.is_some() {
            info!("Call ended by partner");
        }
        self.teardown()
    }

    /// The underlying connection failed beyond recovery.
    pub fn on_peer_failed(&mut self, reason: &str) -> bool {
        if self.session.is_some() {
            warn!(reason, "Peer connection failed");
        }
        self.teardown()
    }

    fn teardown(&mut self) -> bool {
        let Some(mut session) = self.session.take() else {
            return false;
        };
        if let Some(mut local) = session.local.take() {
            local.release();
        }
        if let Some(mut link) = session.link.take() {
            link.close();
        }
        session.pending_ice.clear();
        info!("Call torn down");
        true
    }
}
