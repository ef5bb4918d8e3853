use thiserror::Error;

use crate::types::DeliveryStatus;

/// Login failures. Surfaced as user-visible text; the session stays
/// unauthenticated.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("Please enter both username and password")]
    MissingCredentials,

    #[error("Already logged in")]
    AlreadyAuthenticated,

    #[error("No chat partner known for '{0}'")]
    UnknownUser(String),

    #[error("{0}")]
    Rejected(String),
}

/// Message ledger failures. All of these are local rejections; nothing has
/// been emitted to the relay when one is returned.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error("Cannot send an empty message")]
    EmptyMessage,

    #[error("You must log in before sending messages")]
    NotLoggedIn,

    #[error("Attachment exceeds the {max} byte limit")]
    AttachmentTooLarge { max: usize },

    #[error("Unknown message id: {0}")]
    UnknownMessage(crate::types::MessageId),

    #[error("Only received messages can be marked seen")]
    NotInbound,

    #[error("Status cannot move from {from} to {to}")]
    StatusRegression {
        from: DeliveryStatus,
        to: DeliveryStatus,
    },
}

/// Signaling channel failures. Outbound delivery is best-effort: the client
/// logs these and moves on, it never retries or surfaces them.
#[derive(Error, Debug)]
pub enum SignalError {
    #[error("Signaling channel closed")]
    ChannelClosed,

    #[error("Event serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}
