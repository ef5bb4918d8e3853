//! Client event loop.
//!
//! One tokio task per session, driven by a single `select!` over local
//! commands, relay events, peer-connection events, and the typing deadline.
//! There is exactly one logical thread of control: handlers run to
//! completion in event-arrival order, and every inbound handler re-checks
//! current state before acting, because the relay may deliver events after
//! local state has already moved on.

use chrono::Utc;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use tandem_media::{
    CallError, CallNegotiator, CallState, MediaProvider, PeerConnector, PeerEvent,
};
use tandem_shared::error::LedgerError;
use tandem_shared::protocol::{ClientEvent, RelayEvent};
use tandem_shared::types::{Attachment, MessageBody, MessageId, Username};
use tandem_signal::SignalingChannel;

use crate::config::ClientConfig;
use crate::ledger::{Message, MessageLedger};
use crate::session::{PartnerDirectory, SessionManager};
use crate::typing::TypingDebouncer;

/// Local user actions.
#[derive(Debug)]
pub enum ClientCommand {
    Login { username: String, password: String },
    Logout,
    SendText { text: String },
    SendFiles { files: Vec<Attachment> },
    DeleteMessage { id: MessageId },
    MarkSeen { id: MessageId },
    /// A raw input tick; debounced into typing signals.
    InputActivity,
    StartCall,
    AcceptCall,
    EndCall,
    Shutdown,
}

/// UI-facing notifications. Rendering itself is the embedder's concern.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub enum ClientNotification {
    LoggedIn {
        username: Username,
        partner: Username,
    },
    LoginFailed(String),
    LoggedOut,
    MessageAppended(Message),
    MessageUpdated(Message),
    MessageRemoved(MessageId),
    PresenceChanged {
        online: bool,
        typing: bool,
        status_line: String,
    },
    IncomingCall {
        from: Username,
    },
    CallStateChanged(CallState),
    RemoteMediaReady,
    CallFailed(String),
    Error(String),
}

/// Spawn the client task.
///
/// Returns the command sender and notification receiver; the task runs until
/// `Shutdown`, until all command senders drop, or until the relay closes the
/// inbound event stream.
pub fn spawn_client(
    channel: Box<dyn SignalingChannel>,
    relay_rx: mpsc::Receiver<RelayEvent>,
    media: Box<dyn MediaProvider>,
    connector: Box<dyn PeerConnector>,
    directory: Box<dyn PartnerDirectory>,
    config: ClientConfig,
) -> (
    mpsc::Sender<ClientCommand>,
    mpsc::Receiver<ClientNotification>,
) {
    let (cmd_tx, cmd_rx) = mpsc::channel(config.event_capacity);
    let (notif_tx, notif_rx) = mpsc::channel(config.event_capacity);
    let (peer_tx, peer_rx) = mpsc::channel(config.event_capacity);

    let task = ClientTask {
        channel,
        session: SessionManager::new(directory),
        ledger: None,
        typing: TypingDebouncer::new(config.typing_idle),
        calls: CallNegotiator::new(media, connector, config.ice_servers, peer_tx),
        notif_tx,
    };
    tokio::spawn(task.run(cmd_rx, relay_rx, peer_rx));

    (cmd_tx, notif_rx)
}

struct ClientTask {
    channel: Box<dyn SignalingChannel>,
    session: SessionManager,
    /// Present exactly while the session is authenticated.
    ledger: Option<MessageLedger>,
    typing: TypingDebouncer,
    calls: CallNegotiator,
    notif_tx: mpsc::Sender<ClientNotification>,
}

impl ClientTask {
    async fn run(
        mut self,
        mut cmd_rx: mpsc::Receiver<ClientCommand>,
        mut relay_rx: mpsc::Receiver<RelayEvent>,
        mut peer_rx: mpsc::Receiver<PeerEvent>,
    ) {
        info!("Client event loop started");
        loop {
            let typing_deadline = self.typing.deadline();
            tokio::select! {
                cmd = cmd_rx.recv() => {
                    match cmd {
                        Some(ClientCommand::Shutdown) | None => {
                            self.logout().await;
                            break;
                        }
                        Some(cmd) => self.handle_command(cmd).await,
                    }
                }
                event = relay_rx.recv() => {
                    match event {
                        Some(event) => self.handle_relay_event(event).await,
                        None => {
                            // Channel-level forced disconnect
                            warn!("Relay closed the event stream");
                            self.logout().await;
                            break;
                        }
                    }
                }
                Some(event) = peer_rx.recv() => {
                    self.handle_peer_event(event).await;
                }
                _ = idle_until(typing_deadline), if typing_deadline.is_some() => {
                    self.typing_deadline_fired().await;
                }
            }
        }
        info!("Client event loop stopped");
    }

    async fn handle_command(&mut self, cmd: ClientCommand) {
        match cmd {
            ClientCommand::Login { username, password } => {
                match self.session.login(&username, &password) {
                    Ok(event) => self.emit(event).await,
                    Err(e) => {
                        self.notify(ClientNotification::LoginFailed(e.to_string()))
                            .await
                    }
                }
            }
            ClientCommand::Logout => self.logout().await,
            ClientCommand::SendText { text } => self.send_body(MessageBody::text(text)).await,
            ClientCommand::SendFiles { files } => self.send_body(MessageBody::files(files)).await,
            ClientCommand::DeleteMessage { id } => {
                let result = match self.ledger.as_mut() {
                    Some(ledger) => ledger.delete(id),
                    None => Err(LedgerError::NotLoggedIn),
                };
                match result {
                    Ok((event, id)) => {
                        self.emit(event).await;
                        self.notify(ClientNotification::MessageRemoved(id)).await;
                    }
                    Err(e) => self.notify(ClientNotification::Error(e.to_string())).await,
                }
            }
            ClientCommand::MarkSeen { id } => {
                let result = match self.ledger.as_mut() {
                    Some(ledger) => ledger.mark_seen(id),
                    None => Err(LedgerError::NotLoggedIn),
                };
                match result {
                    Ok(Some((event, message))) => {
                        self.emit(event).await;
                        self.notify(ClientNotification::MessageUpdated(message)).await;
                    }
                    Ok(None) => {}
                    Err(e) => self.notify(ClientNotification::Error(e.to_string())).await,
                }
            }
            ClientCommand::InputActivity => {
                let Some(partner) = self.partner() else {
                    return;
                };
                if self.typing.on_activity(Instant::now()) {
                    self.emit(ClientEvent::Typing {
                        to: partner,
                        is_typing: true,
                    })
                    .await;
                }
            }
            ClientCommand::StartCall => {
                let Some(partner) = self.partner() else {
                    self.notify(ClientNotification::CallFailed(
                        CallError::NotLoggedIn.to_string(),
                    ))
                    .await;
                    return;
                };
                match self.calls.start_call(partner.clone()).await {
                    Ok(offer) => {
                        self.emit(ClientEvent::WebrtcOffer { to: partner, offer }).await;
                        self.notify(ClientNotification::CallStateChanged(self.calls.state()))
                            .await;
                    }
                    Err(e) => {
                        self.notify(ClientNotification::CallFailed(e.to_string()))
                            .await
                    }
                }
            }
            ClientCommand::AcceptCall => match self.calls.accept_call().await {
                Ok(answer) => {
                    if let Some(partner) = self.calls.partner().cloned() {
                        self.emit(ClientEvent::WebrtcAnswer {
                            to: partner,
                            answer,
                        })
                        .await;
                    }
                    self.notify(ClientNotification::CallStateChanged(self.calls.state()))
                        .await;
                }
                Err(e) => {
                    self.notify(ClientNotification::CallFailed(e.to_string()))
                        .await
                }
            },
            ClientCommand::EndCall => {
                let partner = self.calls.partner().cloned();
                if self.calls.end_call() {
                    if let Some(partner) = partner {
                        self.emit(ClientEvent::EndCall { to: partner }).await;
                    }
                    self.notify(ClientNotification::CallStateChanged(CallState::Idle))
                        .await;
                }
            }
            // Handled by the loop before dispatch
            ClientCommand::Shutdown => {}
        }
    }

    async fn handle_relay_event(&mut self, event: RelayEvent) {
        match event {
            RelayEvent::LoginSuccess(username) => {
                match self.session.on_login_success(username) {
                    Ok(identity) => {
                        self.ledger = Some(MessageLedger::new(identity.username.clone()));
                        self.notify(ClientNotification::LoggedIn {
                            username: identity.username,
                            partner: identity.partner,
                        })
                        .await;
                    }
                    Err(e) => {
                        self.notify(ClientNotification::LoginFailed(e.to_string()))
                            .await
                    }
                }
            }
            RelayEvent::ErrorMessage(message) => {
                if self.session.is_active() {
                    self.notify(ClientNotification::Error(message)).await;
                } else {
                    self.notify(ClientNotification::LoginFailed(message)).await;
                }
            }
            RelayEvent::ReceiveMessage(wire) => {
                let appended = match self.ledger.as_mut() {
                    Some(ledger) => ledger.on_receive(wire),
                    None => {
                        debug!("Dropping inbound message: not logged in");
                        None
                    }
                };
                if let Some(message) = appended {
                    self.notify(ClientNotification::MessageAppended(message)).await;
                }
            }
            RelayEvent::MessageSent { message_id } => {
                let updated = self
                    .ledger
                    .as_mut()
                    .and_then(|ledger| ledger.on_delivered(message_id));
                if let Some(message) = updated {
                    self.notify(ClientNotification::MessageUpdated(message)).await;
                }
            }
            RelayEvent::MessageSeen { message_id } => {
                let updated = self
                    .ledger
                    .as_mut()
                    .and_then(|ledger| ledger.on_seen_ack(message_id));
                if let Some(message) = updated {
                    self.notify(ClientNotification::MessageUpdated(message)).await;
                }
            }
            RelayEvent::DeleteMessage { message_id } => {
                let removed = self
                    .ledger
                    .as_mut()
                    .map(|ledger| ledger.on_remote_delete(message_id))
                    .unwrap_or(false);
                if removed {
                    self.notify(ClientNotification::MessageRemoved(message_id))
                        .await;
                }
            }
            RelayEvent::Typing { from, is_typing } => {
                if self.session.on_partner_typing(&from, is_typing) {
                    self.notify_presence().await;
                }
            }
            RelayEvent::PartnerOnlineStatus { username, online } => {
                if self.session.on_partner_status(&username, online) {
                    self.notify_presence().await;
                }
            }
            RelayEvent::WebrtcOffer { from, offer } => {
                if self.partner().as_ref() != Some(&from) {
                    debug!(from = %from, "Ignoring offer from unexpected sender");
                    return;
                }
                if self.calls.on_remote_offer(from.clone(), offer) {
                    self.notify(ClientNotification::IncomingCall { from }).await;
                }
            }
            RelayEvent::WebrtcAnswer { from: _, answer } => {
                match self.calls.on_remote_answer(answer).await {
                    Ok(true) => {
                        self.notify(ClientNotification::CallStateChanged(self.calls.state()))
                            .await
                    }
                    Ok(false) => {}
                    Err(e) => {
                        self.notify(ClientNotification::CallFailed(e.to_string()))
                            .await
                    }
                }
            }
            RelayEvent::WebrtcIceCandidate { from: _, candidate } => {
                self.calls.on_remote_ice(candidate).await;
            }
            RelayEvent::EndCall { from: _ } => {
                if self.calls.on_remote_end() {
                    self.notify(ClientNotification::CallStateChanged(CallState::Idle))
                        .await;
                }
            }
        }
    }

    async fn handle_peer_event(&mut self, event: PeerEvent) {
        match event {
            PeerEvent::IceCandidate(candidate) => {
                // Discovered out-of-band from offer/answer; forward one by one
                match self.calls.partner().cloned() {
                    Some(partner) => {
                        self.emit(ClientEvent::WebrtcIceCandidate {
                            to: partner,
                            candidate,
                        })
                        .await;
                    }
                    None => debug!("Discarding local candidate: no active call"),
                }
            }
            PeerEvent::Track(track) => {
                if self.calls.on_remote_track(track) {
                    self.notify(ClientNotification::RemoteMediaReady).await;
                }
            }
            PeerEvent::Connected => {
                if self.calls.on_peer_connected() {
                    self.notify(ClientNotification::CallStateChanged(CallState::Connected))
                        .await;
                }
            }
            PeerEvent::Failed(reason) => {
                if self.calls.on_peer_failed(&reason) {
                    self.notify(ClientNotification::CallFailed(reason)).await;
                }
            }
        }
    }

    async fn send_body(&mut self, body: MessageBody) {
        let Some(partner) = self.partner() else {
            self.notify(ClientNotification::Error(
                LedgerError::NotLoggedIn.to_string(),
            ))
            .await;
            return;
        };
        let result = match self.ledger.as_mut() {
            Some(ledger) => ledger.send(partner, body, Utc::now()),
            None => Err(LedgerError::NotLoggedIn),
        };
        match result {
            Ok((event, message)) => {
                self.emit(event).await;
                self.notify(ClientNotification::MessageAppended(message)).await;
            }
            Err(e) => self.notify(ClientNotification::Error(e.to_string())).await,
        }
    }

    async fn typing_deadline_fired(&mut self) {
        if self.typing.poll(Instant::now()) {
            if let Some(partner) = self.partner() {
                self.emit(ClientEvent::Typing {
                    to: partner,
                    is_typing: false,
                })
                .await;
            }
        }
    }

    /// Tear everything down and release the identity. Idempotent; used for
    /// user logout, shutdown, and relay loss alike.
    async fn logout(&mut self) {
        let partner = self.calls.partner().cloned();
        if self.calls.end_call() {
            if let Some(partner) = partner {
                self.emit(ClientEvent::EndCall { to: partner }).await;
            }
        }
        self.typing.reset();
        self.ledger = None;
        self.channel.disconnect().await;
        if self.session.logout() {
            self.notify(ClientNotification::LoggedOut).await;
        }
    }

    fn partner(&self) -> Option<Username> {
        self.session.identity().map(|i| i.partner.clone())
    }

    async fn notify_presence(&mut self) {
        let presence = self.session.presence();
        self.notify(ClientNotification::PresenceChanged {
            online: presence.partner_online,
            typing: presence.partner_typing,
            status_line: self.session.status_line().to_string(),
        })
        .await;
    }

    /// Fire-and-forget emission: delivery failures are logged, never
    /// retried and never surfaced.
    async fn emit(&mut self, event: ClientEvent) {
        if let Err(e) = self.channel.emit(event).await {
            warn!(error = %e, "Failed to emit signaling event");
        }
    }

    async fn notify(&mut self, notification: ClientNotification) {
        if self.notif_tx.send(notification).await.is_err() {
            debug!("Notification receiver dropped");
        }
    }
}

async fn idle_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
