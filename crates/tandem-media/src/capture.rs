use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MediaError {
    #[error("Microphone access denied")]
    CaptureDenied,

    #[error("No input device available")]
    NoInputDevice,

    #[error("Media device error: {0}")]
    Device(String),

    #[error("Negotiation failed: {0}")]
    Negotiation(String),
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TrackKind {
    Audio,
    Video,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct MediaTrack {
    pub id: String,
    pub kind: TrackKind,
}

impl MediaTrack {
    pub fn audio(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: TrackKind::Audio,
        }
    }
}

/// Locally captured media, bound to a call for its lifetime.
#[derive(Debug)]
pub struct LocalMedia {
    tracks: Vec<MediaTrack>,
    released: bool,
}

impl LocalMedia {
    pub fn new(tracks: Vec<MediaTrack>) -> Self {
        Self {
            tracks,
            released: false,
        }
    }

    pub fn tracks(&self) -> &[MediaTrack] {
        &self.tracks
    }

    /// Stop all capture tracks. Idempotent; returns whether this call
    /// actually released anything.
    pub fn release(&mut self) -> bool {
        if self.released {
            return false;
        }
        self.released = true;
        debug!(tracks = self.tracks.len(), "Released local media");
        true
    }

    pub fn is_released(&self) -> bool {
        self.released
    }
}

/// The partner's media as it arrives. Created on the first remote track;
/// later tracks append to the same handle.
#[derive(Debug, Default)]
pub struct RemoteMedia {
    tracks: Vec<MediaTrack>,
}

impl RemoteMedia {
    pub fn push(&mut self, track: MediaTrack) {
        self.tracks.push(track);
    }

    pub fn tracks(&self) -> &[MediaTrack] {
        &self.tracks
    }
}

/// Capture device access. Implemented by the embedding application; failure
/// is surfaced to the user and aborts the call attempt.
#[async_trait]
pub trait MediaProvider: Send {
    async fn acquire_audio(&mut self) -> Result<LocalMedia, MediaError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_local_media_release_is_idempotent() {
        let mut media = LocalMedia::new(vec![MediaTrack::audio("mic")]);
        assert!(!media.is_released());
        assert!(media.release());
        assert!(!media.release());
        assert!(media.is_released());
    }

    #[test]
    fn test_remote_media_appends_tracks() {
        let mut remote = RemoteMedia::default();
        remote.push(MediaTrack::audio("a"));
        remote.push(MediaTrack::audio("b"));
        assert_eq!(remote.tracks().len(), 2);
        assert_eq!(remote.tracks()[0].id, "a");
    }
}
