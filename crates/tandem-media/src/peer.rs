use async_trait::async_trait;
use tokio::sync::mpsc;

use tandem_shared::constants::DEFAULT_STUN_SERVERS;
use tandem_shared::protocol::{IceCandidate, SessionDescription};

use crate::capture::{MediaError, MediaTrack};

/// ICE server list handed to the peer-connection layer. Configuration, not
/// logic: NAT traversal itself happens below this interface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IceServers(pub Vec<String>);

impl Default for IceServers {
    fn default() -> Self {
        Self(DEFAULT_STUN_SERVERS.iter().map(|s| s.to_string()).collect())
    }
}

/// Asynchronous events surfaced by an open peer connection.
#[derive(Debug, Clone)]
pub enum PeerEvent {
    /// A local candidate was discovered; emit it to the partner.
    IceCandidate(IceCandidate),
    /// A remote track arrived.
    Track(MediaTrack),
    /// The media path is established.
    Connected,
    /// The connection failed beyond recovery.
    Failed(String),
}

/// Peer-connection abstraction over the actual WebRTC stack.
///
/// Implementations push [`PeerEvent`]s into the sender handed to
/// [`PeerConnector::connect`]; the client loop consumes them alongside relay
/// traffic.
#[async_trait]
pub trait PeerConnection: Send {
    async fn create_offer(&mut self) -> Result<SessionDescription, MediaError>;

    async fn create_answer(&mut self) -> Result<SessionDescription, MediaError>;

    async fn set_local_description(&mut self, desc: SessionDescription)
        -> Result<(), MediaError>;

    async fn set_remote_description(&mut self, desc: SessionDescription)
        -> Result<(), MediaError>;

    async fn add_ice_candidate(&mut self, candidate: IceCandidate) -> Result<(), MediaError>;

    fn add_track(&mut self, track: MediaTrack);

    /// Close the connection. Idempotent.
    fn close(&mut self);
}

/// Factory for peer connections.
#[async_trait]
pub trait PeerConnector: Send {
    async fn connect(
        &mut self,
        ice_servers: &IceServers,
        events: mpsc::Sender<PeerEvent>,
    ) -> Result<Box<dyn PeerConnection>, MediaError>;
}
