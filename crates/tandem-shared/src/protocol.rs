//! Relay event vocabulary.
//!
//! The relay is a named-event pub/sub channel between exactly two parties.
//! Event names and payload shapes below are the wire contract, serialized as
//! `{"event": <name>, "data": <payload>}` JSON envelopes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{MessageBody, MessageId, Username};

/// Events emitted by this client towards the relay.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event", content = "data")]
pub enum ClientEvent {
    #[serde(rename = "login")]
    Login { username: Username, password: String },

    #[serde(rename = "sendMessage")]
    SendMessage(OutboundMessage),

    #[serde(rename = "deleteMessage", rename_all = "camelCase")]
    DeleteMessage { message_id: MessageId, to: Username },

    #[serde(rename = "messageSeen", rename_all = "camelCase")]
    MessageSeen { message_id: MessageId, to: Username },

    #[serde(rename = "typing", rename_all = "camelCase")]
    Typing { to: Username, is_typing: bool },

    #[serde(rename = "webrtc-offer")]
    WebrtcOffer {
        to: Username,
        offer: SessionDescription,
    },

    #[serde(rename = "webrtc-answer")]
    WebrtcAnswer {
        to: Username,
        answer: SessionDescription,
    },

    #[serde(rename = "webrtc-ice-candidate")]
    WebrtcIceCandidate { to: Username, candidate: IceCandidate },

    #[serde(rename = "endCall")]
    EndCall { to: Username },
}

/// Events delivered to this client by the relay.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event", content = "data")]
pub enum RelayEvent {
    #[serde(rename = "loginSuccess")]
    LoginSuccess(Username),

    #[serde(rename = "errorMessage")]
    ErrorMessage(String),

    #[serde(rename = "receiveMessage")]
    ReceiveMessage(WireMessage),

    /// Delivery acknowledgment for a message this party sent.
    #[serde(rename = "messageSent", rename_all = "camelCase")]
    MessageSent { message_id: MessageId },

    /// Read receipt for a message this party sent.
    #[serde(rename = "messageSeen", rename_all = "camelCase")]
    MessageSeen { message_id: MessageId },

    #[serde(rename = "deleteMessage", rename_all = "camelCase")]
    DeleteMessage { message_id: MessageId },

    #[serde(rename = "typing", rename_all = "camelCase")]
    Typing { from: Username, is_typing: bool },

    #[serde(rename = "partnerOnlineStatus")]
    PartnerOnlineStatus { username: Username, online: bool },

    #[serde(rename = "webrtc-offer")]
    WebrtcOffer {
        from: Username,
        offer: SessionDescription,
    },

    #[serde(rename = "webrtc-answer")]
    WebrtcAnswer {
        from: Username,
        answer: SessionDescription,
    },

    #[serde(rename = "webrtc-ice-candidate")]
    WebrtcIceCandidate {
        from: Username,
        candidate: IceCandidate,
    },

    #[serde(rename = "endCall")]
    EndCall { from: Username },
}

/// An outbound message as this client hands it to the relay. The relay
/// stamps the sender before mirroring it to the other party.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OutboundMessage {
    pub to: Username,
    pub message_id: MessageId,
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub body: MessageBody,
}

/// An inbound message as the relay delivers it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WireMessage {
    pub message_id: MessageId,
    pub from: Username,
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub body: MessageBody,
}

/// One half of the offer/answer exchange. Opaque to this core; produced and
/// consumed by the peer-connection layer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionDescription {
    #[serde(rename = "type")]
    pub kind: SdpKind,
    pub sdp: String,
}

impl SessionDescription {
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self {
            kind: SdpKind::Offer,
            sdp: sdp.into(),
        }
    }

    pub fn answer(sdp: impl Into<String>) -> Self {
        Self {
            kind: SdpKind::Answer,
            sdp: sdp.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SdpKind {
    Offer,
    Answer,
}

/// A network-reachability hint, exchanged out-of-band from offer/answer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IceCandidate {
    pub candidate: String,
    #[serde(rename = "sdpMid")]
    pub sdp_mid: Option<String>,
    #[serde(rename = "sdpMLineIndex")]
    pub sdp_mline_index: Option<u32>,
}

impl IceCandidate {
    pub fn new(candidate: impl Into<String>) -> Self {
        Self {
            candidate: candidate.into(),
            sdp_mid: None,
            sdp_mline_index: None,
        }
    }
}

impl ClientEvent {
    /// Serialize to the JSON envelope sent over the relay.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json(data: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(data)
    }
}

impl RelayEvent {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json(data: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(data)
    }
}
