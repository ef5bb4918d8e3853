use bytes::Bytes;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::LedgerError;

// Identity is an opaque session label resolved by the relay, not a key
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Username(pub String);

impl Username {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Username {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Username {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Message correlation id, unique per sender session.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct MessageId(pub Uuid);

impl MessageId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Delivery lifecycle of a message.
///
/// Live statuses advance monotonically `Pending -> Sent -> Delivered -> Seen`;
/// `Deleted` is reachable from any live status and terminal.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryStatus {
    Pending,
    Sent,
    Delivered,
    Seen,
    Deleted,
}

impl DeliveryStatus {
    fn rank(self) -> u8 {
        match self {
            Self::Pending => 0,
            Self::Sent => 1,
            Self::Delivered => 2,
            Self::Seen => 3,
            Self::Deleted => 4,
        }
    }

    /// Validate a transition to `next`.
    ///
    /// Returns the new status, `StatusRegression` if the transition would
    /// move backwards or leave the terminal `Deleted` state.
    pub fn advance(self, next: DeliveryStatus) -> Result<DeliveryStatus, LedgerError> {
        if self == Self::Deleted && next != Self::Deleted {
            return Err(LedgerError::StatusRegression {
                from: self,
                to: next,
            });
        }
        if next == Self::Deleted {
            return Ok(Self::Deleted);
        }
        if next.rank() < self.rank() {
            return Err(LedgerError::StatusRegression {
                from: self,
                to: next,
            });
        }
        Ok(next)
    }
}

impl std::fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Sent => "sent",
            Self::Delivered => "delivered",
            Self::Seen => "seen",
            Self::Deleted => "deleted",
        };
        write!(f, "{s}")
    }
}

/// A file attachment. The blob travels base64-encoded on the wire, the way
/// the relay expects file payloads.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Attachment {
    #[serde(rename = "type")]
    pub mime_type: String,
    #[serde(rename = "name")]
    pub filename: String,
    #[serde(with = "base64_bytes")]
    pub data: Bytes,
}

impl Attachment {
    pub fn new(mime_type: impl Into<String>, filename: impl Into<String>, data: Bytes) -> Self {
        Self {
            mime_type: mime_type.into(),
            filename: filename.into(),
            data,
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Content of a message: plain text or an ordered list of attachments.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum MessageBody {
    Text { message: String },
    Files { files: Vec<Attachment> },
}

impl MessageBody {
    pub fn text(message: impl Into<String>) -> Self {
        Self::Text {
            message: message.into(),
        }
    }

    pub fn files(files: Vec<Attachment>) -> Self {
        Self::Files { files }
    }

    /// Empty bodies are rejected locally before anything is emitted.
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Text { message } => message.trim().is_empty(),
            Self::Files { files } => files.is_empty(),
        }
    }

    /// Size of the largest attachment, 0 for text bodies.
    pub fn largest_attachment(&self) -> usize {
        match self {
            Self::Text { .. } => 0,
            Self::Files { files } => files.iter().map(Attachment::len).max().unwrap_or(0),
        }
    }
}

mod base64_bytes {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine as _;
    use bytes::Bytes;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(data: &Bytes, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(data))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Bytes, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded.as_bytes())
            .map(Bytes::from)
            .map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_advances_monotonically() {
        let status = DeliveryStatus::Pending;
        let status = status.advance(DeliveryStatus::Sent).unwrap();
        let status = status.advance(DeliveryStatus::Delivered).unwrap();
        let status = status.advance(DeliveryStatus::Seen).unwrap();
        assert_eq!(status, DeliveryStatus::Seen);
    }

    #[test]
    fn test_status_regression_refused() {
        let result = DeliveryStatus::Seen.advance(DeliveryStatus::Sent);
        assert!(matches!(result, Err(LedgerError::StatusRegression { .. })));

        let result = DeliveryStatus::Delivered.advance(DeliveryStatus::Pending);
        assert!(matches!(result, Err(LedgerError::StatusRegression { .. })));
    }

    #[test]
    fn test_deleted_reachable_from_any_live_status() {
        for status in [
            DeliveryStatus::Pending,
            DeliveryStatus::Sent,
            DeliveryStatus::Delivered,
            DeliveryStatus::Seen,
        ] {
            assert_eq!(
                status.advance(DeliveryStatus::Deleted).unwrap(),
                DeliveryStatus::Deleted
            );
        }
    }

    #[test]
    fn test_deleted_is_terminal() {
        assert!(DeliveryStatus::Deleted
            .advance(DeliveryStatus::Sent)
            .is_err());
        // Deleting twice stays deleted
        assert_eq!(
            DeliveryStatus::Deleted
                .advance(DeliveryStatus::Deleted)
                .unwrap(),
            DeliveryStatus::Deleted
        );
    }

    #[test]
    fn test_same_status_is_noop_advance() {
        assert_eq!(
            DeliveryStatus::Sent.advance(DeliveryStatus::Sent).unwrap(),
            DeliveryStatus::Sent
        );
    }

    #[test]
    fn test_attachment_base64_roundtrip() {
        let attachment = Attachment::new("image/png", "pic.png", Bytes::from_static(&[1, 2, 3]));
        let json = serde_json::to_string(&attachment).unwrap();
        assert!(json.contains("\"type\":\"image/png\""));
        assert!(json.contains("\"name\":\"pic.png\""));
        assert!(json.contains("AQID")); // base64 of [1, 2, 3]

        let restored: Attachment = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, attachment);
    }

    #[test]
    fn test_body_is_empty() {
        assert!(MessageBody::text("").is_empty());
        assert!(MessageBody::text("   ").is_empty());
        assert!(!MessageBody::text("hi").is_empty());
        assert!(MessageBody::files(vec![]).is_empty());
        assert!(!MessageBody::files(vec![Attachment::new(
            "text/plain",
            "a.txt",
            Bytes::from_static(b"x"),
        )])
        .is_empty());
    }
}
