use async_trait::async_trait;

use tandem_shared::error::SignalError;
use tandem_shared::protocol::ClientEvent;

/// Outbound half of the relay connection.
///
/// Inbound events arrive on a separate `mpsc::Receiver<RelayEvent>` owned by
/// the client event loop, so the two directions never contend.
///
/// Delivery is best-effort: callers log an emit failure and move on. There is
/// no retry, no backoff, and no acknowledgment at this layer.
#[async_trait]
pub trait SignalingChannel: Send {
    /// Emit a named event towards the other party.
    async fn emit(&mut self, event: ClientEvent) -> Result<(), SignalError>;

    /// Tear down the connection. Idempotent; emits after this fail with
    /// `SignalError::ChannelClosed`.
    async fn disconnect(&mut self);
}
