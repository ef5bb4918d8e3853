//! Two full client sessions wired through the in-process loopback relay.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::timeout;

use tandem_client::client::{spawn_client, ClientCommand, ClientNotification};
use tandem_client::config::ClientConfig;
use tandem_client::session::PairDirectory;
use tandem_media::test_support::{PeerLog, StubConnector, StubMedia};
use tandem_media::{CallState, MediaTrack, PeerEvent};
use tandem_shared::types::{MessageBody, MessageId, Username};
use tandem_signal::memory;

use anyhow::Result;

struct Party {
    cmd_tx: mpsc::Sender<ClientCommand>,
    notif_rx: mpsc::Receiver<ClientNotification>,
    peer_log: std::sync::Arc<std::sync::Mutex<PeerLog>>,
}

fn spawn_pair() -> (Party, Party) {
    let ((endpoint_a, relay_rx_a), (endpoint_b, relay_rx_b)) = memory::pair();
    let mut parties = Vec::new();
    for (endpoint, relay_rx) in [(endpoint_a, relay_rx_a), (endpoint_b, relay_rx_b)] {
        let (connector, peer_log) = StubConnector::new();
        let (cmd_tx, notif_rx) = spawn_client(
            Box::new(endpoint),
            relay_rx,
            Box::new(StubMedia::new()),
            Box::new(connector),
            Box::new(PairDirectory::new("user1", "user2")),
            ClientConfig::default(),
        );
        parties.push(Party {
            cmd_tx,
            notif_rx,
            peer_log,
        });
    }
    let b = parties.pop().expect("party b");
    let a = parties.pop().expect("party a");
    (a, b)
}

/// Receive notifications until one matches, skipping unrelated ones
/// (presence updates interleave freely with everything else).
async fn expect<F>(party: &mut Party, mut pred: F) -> ClientNotification
where
    F: FnMut(&ClientNotification) -> bool,
{
    timeout(Duration::from_secs(5), async {
        loop {
            let notification = party
                .notif_rx
                .recv()
                .await
                .expect("notification stream ended");
            if pred(&notification) {
                return notification;
            }
        }
    })
    .await
    .expect("timed out waiting for notification")
}

async fn login(party: &mut Party, username: &str) -> Result<()> {
    party
        .cmd_tx
        .send(ClientCommand::Login {
            username: username.into(),
            password: "secret".into(),
        })
        .await?;
    expect(party, |n| matches!(n, ClientNotification::LoggedIn { .. })).await;
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_message_lifecycle_across_the_relay() -> Result<()> {
    let (mut a, mut b) = spawn_pair();
    login(&mut a, "user1").await?;
    login(&mut b, "user2").await?;

    a.cmd_tx
        .send(ClientCommand::SendText { text: "hi".into() })
        .await?;

    // Sender: optimistic local echo, then the relay's delivery ack
    let appended = expect(&mut a, |n| {
        matches!(n, ClientNotification::MessageAppended(_))
    })
    .await;
    let ClientNotification::MessageAppended(message) = appended else {
        unreachable!();
    };
    let id = message.id;
    assert_eq!(message.body, MessageBody::text("hi"));

    expect(&mut a, |n| {
        matches!(n, ClientNotification::MessageUpdated(m)
            if m.id == id && m.status == tandem_shared::types::DeliveryStatus::Delivered)
    })
    .await;

    // Receiver: appended, then marked seen, which acks back to the sender
    expect(&mut b, |n| {
        matches!(n, ClientNotification::MessageAppended(m) if m.id == id)
    })
    .await;
    b.cmd_tx
        .send(ClientCommand::MarkSeen { id })
        .await?;
    expect(&mut b, |n| {
        matches!(n, ClientNotification::MessageUpdated(m)
            if m.id == id && m.status == tandem_shared::types::DeliveryStatus::Seen)
    })
    .await;
    expect(&mut a, |n| {
        matches!(n, ClientNotification::MessageUpdated(m)
            if m.id == id && m.status == tandem_shared::types::DeliveryStatus::Seen)
    })
    .await;

    // Deletion mirrors to the other party
    a.cmd_tx
        .send(ClientCommand::DeleteMessage { id })
        .await?;
    expect(&mut a, |n| {
        matches!(n, ClientNotification::MessageRemoved(removed) if *removed == id)
    })
    .await;
    expect(&mut b, |n| {
        matches!(n, ClientNotification::MessageRemoved(removed) if *removed == id)
    })
    .await;

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_typing_indicator_debounces_and_clears() -> Result<()> {
    let (mut a, mut b) = spawn_pair();
    login(&mut a, "user1").await?;
    login(&mut b, "user2").await?;

    for _ in 0..4 {
        a.cmd_tx
            .send(ClientCommand::InputActivity)
            .await?;
    }

    expect(&mut b, |n| {
        matches!(n, ClientNotification::PresenceChanged { typing: true, status_line, .. }
            if status_line.as_str() == "typing...")
    })
    .await;

    // The trailing stop fires on its own once the burst goes quiet
    expect(&mut b, |n| {
        matches!(n, ClientNotification::PresenceChanged { typing: false, online: true, status_line }
            if status_line.as_str() == "online")
    })
    .await;

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_call_negotiation_end_to_end() -> Result<()> {
    let (mut a, mut b) = spawn_pair();
    login(&mut a, "user1").await?;
    login(&mut b, "user2").await?;

    a.cmd_tx
        .send(ClientCommand::StartCall)
        .await?;
    expect(&mut a, |n| {
        matches!(
            n,
            ClientNotification::CallStateChanged(CallState::AwaitingAnswer)
        )
    })
    .await;

    expect(&mut b, |n| {
        matches!(n, ClientNotification::IncomingCall { from }
            if *from == Username::from("user1"))
    })
    .await;
    b.cmd_tx
        .send(ClientCommand::AcceptCall)
        .await?;
    expect(&mut b, |n| {
        matches!(
            n,
            ClientNotification::CallStateChanged(CallState::Negotiating)
        )
    })
    .await;
    expect(&mut a, |n| {
        matches!(
            n,
            ClientNotification::CallStateChanged(CallState::Negotiating)
        )
    })
    .await;

    // Drive the caller's peer connection: remote audio arrives, path connects
    let events_tx = a
        .peer_log
        .lock()
        .expect("peer log")
        .events_tx
        .clone()
        .expect("connection was opened");
    events_tx
        .send(PeerEvent::Track(MediaTrack::audio("remote-audio")))
        .await?;
    events_tx
        .send(PeerEvent::Connected)
        .await?;

    expect(&mut a, |n| matches!(n, ClientNotification::RemoteMediaReady)).await;
    expect(&mut a, |n| {
        matches!(
            n,
            ClientNotification::CallStateChanged(CallState::Connected)
        )
    })
    .await;

    // Hang up: both parties land in idle
    a.cmd_tx.send(ClientCommand::EndCall).await?;
    expect(&mut a, |n| {
        matches!(n, ClientNotification::CallStateChanged(CallState::Idle))
    })
    .await;
    expect(&mut b, |n| {
        matches!(n, ClientNotification::CallStateChanged(CallState::Idle))
    })
    .await;

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_logout_takes_partner_offline() -> Result<()> {
    let (mut a, mut b) = spawn_pair();
    login(&mut a, "user1").await?;
    login(&mut b, "user2").await?;

    expect(&mut a, |n| {
        matches!(n, ClientNotification::PresenceChanged { online: true, .. })
    })
    .await;

    b.cmd_tx.send(ClientCommand::Logout).await?;
    expect(&mut b, |n| matches!(n, ClientNotification::LoggedOut)).await;
    expect(&mut a, |n| {
        matches!(n, ClientNotification::PresenceChanged { online: false, .. })
    })
    .await;

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_unknown_message_operations_surface_errors() -> Result<()> {
    let (mut a, _b) = spawn_pair();
    login(&mut a, "user1").await?;

    a.cmd_tx
        .send(ClientCommand::DeleteMessage {
            id: MessageId::new(),
        })
        .await?;
    expect(&mut a, |n| matches!(n, ClientNotification::Error(_))).await;

    Ok(())
}
