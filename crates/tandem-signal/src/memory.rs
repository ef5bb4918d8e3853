//! In-process relay for tests and demos.
//!
//! `pair()` wires two endpoints through a tiny relay task that mimics the
//! production relay's routing: it answers logins, mirrors deletes and read
//! receipts, forwards typing/presence and call signaling to the other party,
//! and acknowledges message delivery.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::debug;

use tandem_shared::constants::EVENT_CHANNEL_CAPACITY;
use tandem_shared::error::SignalError;
use tandem_shared::protocol::{ClientEvent, RelayEvent, WireMessage};
use tandem_shared::types::Username;

use crate::channel::SignalingChannel;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Side {
    A,
    B,
}

impl Side {
    fn index(self) -> usize {
        match self {
            Side::A => 0,
            Side::B => 1,
        }
    }

    fn other(self) -> Side {
        match self {
            Side::A => Side::B,
            Side::B => Side::A,
        }
    }
}

enum Ingress {
    Event(Side, ClientEvent),
    Disconnect(Side),
}

/// One party's connection to the loopback relay.
pub struct LoopbackEndpoint {
    side: Side,
    tx: mpsc::Sender<Ingress>,
    connected: bool,
}

#[async_trait]
impl SignalingChannel for LoopbackEndpoint {
    async fn emit(&mut self, event: ClientEvent) -> Result<(), SignalError> {
        if !self.connected {
            return Err(SignalError::ChannelClosed);
        }
        self.tx
            .send(Ingress::Event(self.side, event))
            .await
            .map_err(|_| SignalError::ChannelClosed)
    }

    async fn disconnect(&mut self) {
        if self.connected {
            self.connected = false;
            let _ = self.tx.send(Ingress::Disconnect(self.side)).await;
        }
    }
}

/// Create two connected endpoints and spawn the relay task between them.
///
/// Returns, per party, the outbound channel endpoint and the inbound
/// relay-event receiver.
pub fn pair() -> (
    (LoopbackEndpoint, mpsc::Receiver<RelayEvent>),
    (LoopbackEndpoint, mpsc::Receiver<RelayEvent>),
) {
    let (ingress_tx, ingress_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
    let (a_tx, a_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
    let (b_tx, b_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);

    tokio::spawn(relay_loop(ingress_rx, [a_tx, b_tx]));

    let a = LoopbackEndpoint {
        side: Side::A,
        tx: ingress_tx.clone(),
        connected: true,
    };
    let b = LoopbackEndpoint {
        side: Side::B,
        tx: ingress_tx,
        connected: true,
    };
    ((a, a_rx), (b, b_rx))
}

async fn relay_loop(mut ingress: mpsc::Receiver<Ingress>, out: [mpsc::Sender<RelayEvent>; 2]) {
    let mut names: [Option<Username>; 2] = [None, None];

    while let Some(msg) = ingress.recv().await {
        match msg {
            Ingress::Event(side, event) => {
                route(side, event, &mut names, &out).await;
            }
            Ingress::Disconnect(side) => {
                if let Some(name) = names[side.index()].take() {
                    debug!(user = %name, "Loopback: party disconnected");
                    deliver(
                        &out,
                        side.other(),
                        RelayEvent::PartnerOnlineStatus {
                            username: name,
                            online: false,
                        },
                    )
                    .await;
                }
            }
        }
    }
}

async fn route(
    side: Side,
    event: ClientEvent,
    names: &mut [Option<Username>; 2],
    out: &[mpsc::Sender<RelayEvent>; 2],
) {
    // Login is the only event accepted from an unauthenticated party.
    if let ClientEvent::Login { username, password } = &event {
        if username.as_str().is_empty() || password.is_empty() {
            deliver(
                out,
                side,
                RelayEvent::ErrorMessage("Invalid username or password".into()),
            )
            .await;
            return;
        }
        names[side.index()] = Some(username.clone());
        deliver(out, side, RelayEvent::LoginSuccess(username.clone())).await;
        deliver(
            out,
            side.other(),
            RelayEvent::PartnerOnlineStatus {
                username: username.clone(),
                online: true,
            },
        )
        .await;
        if let Some(partner) = names[side.other().index()].clone() {
            deliver(
                out,
                side,
                RelayEvent::PartnerOnlineStatus {
                    username: partner,
                    online: true,
                },
            )
            .await;
        }
        return;
    }

    let Some(from) = names[side.index()].clone() else {
        debug!("Loopback: dropping event from unauthenticated party");
        return;
    };

    match event {
        ClientEvent::Login { .. } => unreachable!("handled above"),
        ClientEvent::SendMessage(outbound) => {
            let message_id = outbound.message_id;
            deliver(
                out,
                side.other(),
                RelayEvent::ReceiveMessage(WireMessage {
                    message_id,
                    from,
                    timestamp: outbound.timestamp,
                    body: outbound.body,
                }),
            )
            .await;
            deliver(out, side, RelayEvent::MessageSent { message_id }).await;
        }
        ClientEvent::DeleteMessage { message_id, .. } => {
            deliver(out, side.other(), RelayEvent::DeleteMessage { message_id }).await;
        }
        ClientEvent::MessageSeen { message_id, .. } => {
            deliver(out, side.other(), RelayEvent::MessageSeen { message_id }).await;
        }
        ClientEvent::Typing { is_typing, .. } => {
            deliver(out, side.other(), RelayEvent::Typing { from, is_typing }).await;
        }
        ClientEvent::WebrtcOffer { offer, .. } => {
            deliver(out, side.other(), RelayEvent::WebrtcOffer { from, offer }).await;
        }
        ClientEvent::WebrtcAnswer { answer, .. } => {
            deliver(out, side.other(), RelayEvent::WebrtcAnswer { from, answer }).await;
        }
        ClientEvent::WebrtcIceCandidate { candidate, .. } => {
            deliver(
                out,
                side.other(),
                RelayEvent::WebrtcIceCandidate { from, candidate },
            )
            .await;
        }
        ClientEvent::EndCall { .. } => {
            deliver(out, side.other(), RelayEvent::EndCall { from }).await;
        }
    }
}

async fn deliver(out: &[mpsc::Sender<RelayEvent>; 2], to: Side, event: RelayEvent) {
    // A dropped receiver just means that party went away mid-test.
    let _ = out[to.index()].send(event).await;
}

/// Channel double that records every emitted event instead of routing it.
pub struct RecordingChannel {
    sent: Arc<Mutex<Vec<ClientEvent>>>,
    connected: bool,
}

impl RecordingChannel {
    /// Returns the channel and a shared handle onto its emission log.
    pub fn new() -> (Self, Arc<Mutex<Vec<ClientEvent>>>) {
        let sent = Arc::new(Mutex::new(Vec::new()));
        (
            Self {
                sent: sent.clone(),
                connected: true,
            },
            sent,
        )
    }
}

#[async_trait]
impl SignalingChannel for RecordingChannel {
    async fn emit(&mut self, event: ClientEvent) -> Result<(), SignalError> {
        if !self.connected {
            return Err(SignalError::ChannelClosed);
        }
        self.sent.lock().expect("recording lock").push(event);
        Ok(())
    }

    async fn disconnect(&mut self) {
        self.connected = false;
    }
}
