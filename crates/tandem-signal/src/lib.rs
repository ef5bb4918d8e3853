//! Signaling channel contract.
//!
//! The relay itself is an external collaborator; this crate only defines the
//! interface the client consumes, plus an in-process loopback relay used by
//! tests and demos.

pub mod channel;
pub mod memory;

pub use channel::SignalingChannel;
pub use memory::{pair, LoopbackEndpoint, RecordingChannel};
