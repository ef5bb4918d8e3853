//! Message lifecycle tracking.
//!
//! The ledger owns the active message view in event-arrival order. Sending
//! is optimistic: the local copy is projected as `Sent` immediately, then
//! advanced by relay acknowledgments through the monotonic status guard.
//! Deletion is fire-and-forget in both directions.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info};

use tandem_shared::constants::MAX_ATTACHMENT_BYTES;
use tandem_shared::error::LedgerError;
use tandem_shared::protocol::{ClientEvent, OutboundMessage, WireMessage};
use tandem_shared::types::{DeliveryStatus, MessageBody, MessageId, Username};

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Message {
    pub id: MessageId,
    pub from: Username,
    pub to: Username,
    pub body: MessageBody,
    pub timestamp: DateTime<Utc>,
    pub status: DeliveryStatus,
}

pub struct MessageLedger {
    me: Username,
    messages: Vec<Message>,
}

impl MessageLedger {
    pub fn new(me: Username) -> Self {
        Self {
            me,
            messages: Vec::new(),
        }
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn get(&self, id: MessageId) -> Option<&Message> {
        self.messages.iter().find(|m| m.id == id)
    }

    /// Create and record an outbound message, returning the relay event to
    /// emit. Empty and oversized bodies are rejected before anything leaves
    /// this process.
    pub fn send(
        &mut self,
        to: Username,
        body: MessageBody,
        now: DateTime<Utc>,
    ) -> Result<(ClientEvent, Message), LedgerError> {
        if body.is_empty() {
            return Err(LedgerError::EmptyMessage);
        }
        if body.largest_attachment() > MAX_ATTACHMENT_BYTES {
            return Err(LedgerError::AttachmentTooLarge {
                max: MAX_ATTACHMENT_BYTES,
            });
        }

        let mut message = Message {
            id: MessageId::new(),
            from: self.me.clone(),
            to,
            body,
            timestamp: now,
            status: DeliveryStatus::Pending,
        };
        // Optimistic local echo: the sender's own view shows the message as
        // sent without waiting for the relay.
        message.status = message.status.advance(DeliveryStatus::Sent)?;

        let event = ClientEvent::SendMessage(OutboundMessage {
            to: message.to.clone(),
            message_id: message.id,
            timestamp: message.timestamp,
            body: message.body.clone(),
        });
        info!(id = %message.id, to = %message.to, "Message sent");
        self.messages.push(message.clone());
        Ok((event, message))
    }

    /// Record an inbound message. Relay redeliveries with a known id are
    /// dropped.
    pub fn on_receive(&mut self, wire: WireMessage) -> Option<Message> {
        if self.get(wire.message_id).is_some() {
            debug!(id = %wire.message_id, "Dropping duplicate message");
            return None;
        }
        let message = Message {
            id: wire.message_id,
            from: wire.from,
            to: self.me.clone(),
            body: wire.body,
            timestamp: wire.timestamp,
            status: DeliveryStatus::Sent,
        };
        self.messages.push(message.clone());
        Some(message)
    }

    /// Delivery acknowledgment for a message this party sent.
    pub fn on_delivered(&mut self, id: MessageId) -> Option<Message> {
        self.advance_own(id, DeliveryStatus::Delivered)
    }

    /// Read receipt for a message this party sent.
    pub fn on_seen_ack(&mut self, id: MessageId) -> Option<Message> {
        self.advance_own(id, DeliveryStatus::Seen)
    }

    fn advance_own(&mut self, id: MessageId, status: DeliveryStatus) -> Option<Message> {
        let Some(message) = self.messages.iter_mut().find(|m| m.id == id) else {
            debug!(id = %id, "Ignoring ack for unknown message");
            return None;
        };
        if message.from != self.me {
            debug!(id = %id, "Ignoring ack for a message we did not send");
            return None;
        }
        match message.status.advance(status) {
            Ok(next) if next != message.status => {
                message.status = next;
                Some(message.clone())
            }
            Ok(_) => None,
            Err(e) => {
                // Late ack behind a further-advanced status: stale, not an error
                debug!(id = %id, error = %e, "Ignoring stale status ack");
                None
            }
        }
    }

    /// Mark a received message as read: advances the local copy and returns
    /// the read receipt to emit. `Ok(None)` means it was already seen and
    /// nothing needs to go out.
    pub fn mark_seen(
        &mut self,
        id: MessageId,
    ) -> Result<Option<(ClientEvent, Message)>, LedgerError> {
        let Some(message) = self.messages.iter_mut().find(|m| m.id == id) else {
            return Err(LedgerError::UnknownMessage(id));
        };
        if message.from == self.me {
            return Err(LedgerError::NotInbound);
        }
        if message.status == DeliveryStatus::Seen {
            return Ok(None);
        }
        message.status = message.status.advance(DeliveryStatus::Seen)?;
        let event = ClientEvent::MessageSeen {
            message_id: message.id,
            to: message.from.clone(),
        };
        Ok(Some((event, message.clone())))
    }

    /// Remove a message from the local view and produce the mirrored delete
    /// event. Fire-and-forget: there is no rollback if the remote delete
    /// never lands.
    pub fn delete(&mut self, id: MessageId) -> Result<(ClientEvent, MessageId), LedgerError> {
        let Some(index) = self.messages.iter().position(|m| m.id == id) else {
            return Err(LedgerError::UnknownMessage(id));
        };
        let message = self.messages.remove(index);
        // Deletion is terminal from any live status
        message.status.advance(DeliveryStatus::Deleted)?;
        let counterpart = if message.from == self.me {
            message.to
        } else {
            message.from
        };
        info!(id = %id, "Message deleted locally");
        Ok((
            ClientEvent::DeleteMessage {
                message_id: id,
                to: counterpart,
            },
            id,
        ))
    }

    /// The other party deleted a message; mirror the removal. Unknown ids
    /// are stale and ignored.
    pub fn on_remote_delete(&mut self, id: MessageId) -> bool {
        let Some(index) = self.messages.iter().position(|m| m.id == id) else {
            debug!(id = %id, "Ignoring delete for unknown message");
            return false;
        };
        self.messages.remove(index);
        info!(id = %id, "Message deleted by partner");
        true
    }
}
