//! Audio playback
//!
//! [`PlaybackController`] turns a `(text, theme)` pair into audible output
//! through a single playback slot:
//!
//! ```text
//! Idle --play--> Loading --fetched, decoded, started--> Playing
//!                   |                                      |
//!                   +--fetch/decode error--> Idle <--------+ stop / play (toggle)
//!                                                          | natural end / engine error
//! ```
//!
//! Mute state lives on a persistent gain node and survives across playbacks.
//! Failures never escape the controller: they come back as a
//! [`PlayOutcome`] and are broadcast as [`Notification`]s for the UI.

mod controller;
pub mod engine;
#[cfg(feature = "output")]
pub mod rodio_backend;

pub use controller::PlaybackController;
pub use engine::{
    ActiveOutput, AudioBackend, DecodedAudio, DecodingContext, GainNode, OutputHandle,
    PlaybackEnd, MUTED_GAIN, UNITY_GAIN,
};
#[cfg(feature = "output")]
pub use rodio_backend::{RodioBackend, RodioContext};

use crate::MemoirError;
use std::fmt;

/// Playback slot status
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PlaybackStatus {
    /// Nothing loading or playing
    #[default]
    Idle,
    /// Fetching and decoding audio
    Loading,
    /// An output is active
    Playing,
}

impl fmt::Display for PlaybackStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PlaybackStatus::Idle => "idle",
            PlaybackStatus::Loading => "loading",
            PlaybackStatus::Playing => "playing",
        })
    }
}

/// State the UI renders from
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PlaybackSnapshot {
    /// Slot status
    pub status: PlaybackStatus,
    /// Sticky mute flag
    pub muted: bool,
}

impl PlaybackSnapshot {
    /// Whether an output is active
    pub fn is_playing(&self) -> bool {
        self.status == PlaybackStatus::Playing
    }

    /// Whether audio is being fetched or decoded
    pub fn is_loading(&self) -> bool {
        self.status == PlaybackStatus::Loading
    }
}

/// Category of a user-visible notification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeKind {
    /// The generation service could not be reached
    Network,
    /// The generation service rejected the request
    Service,
    /// The audio payload could not be decoded
    Decode,
    /// The audio engine failed
    Playback,
    /// Configuration problem
    Config,
}

/// One-shot, user-visible failure report
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    /// Category
    pub kind: NoticeKind,
    /// Text to show
    pub message: String,
}

impl Notification {
    /// Classify an error for display
    pub fn from_error(err: &MemoirError) -> Self {
        let kind = match err {
            MemoirError::Network(_) => NoticeKind::Network,
            MemoirError::Api { .. } | MemoirError::InvalidRequest(_) | MemoirError::Json(_) => {
                NoticeKind::Service
            }
            MemoirError::Decode(_) => NoticeKind::Decode,
            MemoirError::Config(_) | MemoirError::ScriptLoad(_) => NoticeKind::Config,
            MemoirError::AudioDevice(_)
            | MemoirError::Playback(_)
            | MemoirError::Io(_)
            | MemoirError::Other(_) => NoticeKind::Playback,
        };
        Self {
            kind,
            message: err.to_string(),
        }
    }
}

impl fmt::Display for Notification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

/// What a [`PlaybackController::play`] call did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlayOutcome {
    /// New output started
    Started,
    /// Output was playing; this call stopped it (toggle)
    Stopped,
    /// A fetch is already running; the call was ignored
    AlreadyLoading,
    /// Stopped or replaced while loading; the late result was dropped
    Superseded,
    /// Fetch, decode or start failed; the slot is idle again
    Failed(Notification),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_notification_kinds() {
        let cases = [
            (MemoirError::Network("refused".into()), NoticeKind::Network),
            (MemoirError::api(500, "boom"), NoticeKind::Service),
            (MemoirError::decode("garbage"), NoticeKind::Decode),
            (MemoirError::audio_device("no device"), NoticeKind::Playback),
            (MemoirError::Config("bad".into()), NoticeKind::Config),
        ];
        for (err, kind) in cases {
            assert_eq!(Notification::from_error(&err).kind, kind, "{err}");
        }
    }

    #[test]
    fn test_api_message_passes_through() {
        let notice = Notification::from_error(&MemoirError::api(400, "Script is required"));
        assert_eq!(notice.message, "Script is required");
    }

    #[test]
    fn test_snapshot_flags() {
        let snapshot = PlaybackSnapshot::default();
        assert!(!snapshot.is_playing());
        assert!(!snapshot.is_loading());
        assert!(!snapshot.muted);
        assert_eq!(snapshot.status.to_string(), "idle");
    }
}
