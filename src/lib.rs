//! Map Memoir narration core
//!
//! Turns a picked place and a narrative theme into a generated story with
//! optional audio narration. The crate holds the two coordination pieces that
//! sit underneath a presentational UI, plus the service client they talk to.
//!
//! # Features
//! - Client for the story generation service (`/generate_script`,
//!   `/generate_audio`, `/health`)
//! - Single-flight loader for the third-party maps SDK behind a capability
//!   interface, with readiness polling and a bounded load time
//! - Toggle-style audio playback controller with one active output, a lazily
//!   created decoding context and a sticky mute gain
//! - Optional real audio output through `rodio`
//!
//! # Crate feature flags
//! - `output` (opt-in): rodio-backed decoding context and output graph
//!   (`playback::rodio_backend`). Required by the `map-memoir` binary.
//!
//! # Quick start
//! ## Generate a story
//! ```no_run
//! use map_memoir::{AppConfig, HttpStoryService, Place, StoryService, Theme};
//! # async fn run() -> map_memoir::Result<()> {
//! let config = AppConfig::from_env()?;
//! let service = HttpStoryService::new(&config.backend)?;
//! let place = Place::new("Eiffel Tower", "Champ de Mars, Paris");
//! let script = service.generate_script(&place, Theme::Mystery).await?;
//! println!("{script}");
//! # Ok(())
//! # }
//! ```
//!
//! ## Narrate it
//! ```no_run
//! # #[cfg(feature = "output")]
//! # async fn run() -> map_memoir::Result<()> {
//! use map_memoir::playback::{PlayOutcome, PlaybackController, RodioBackend};
//! use map_memoir::{AppConfig, HttpStoryService, Theme};
//! let config = AppConfig::from_env()?;
//! let service = HttpStoryService::new(&config.backend)?;
//! let controller = PlaybackController::new(service, RodioBackend::default());
//! if let PlayOutcome::Started = controller.play("Once upon a time...", Theme::FairyTale).await {
//!     controller.mute();
//! }
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

pub mod config; // Configuration inputs
pub mod logging; // Tracing setup
pub mod maps; // Maps SDK loading
pub mod playback; // Audio playback controller
pub mod story; // Generation service

/// Error types for narration operations
#[derive(thiserror::Error, Debug)]
pub enum MemoirError {
    /// Invalid or missing configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Transport-level failure talking to the generation service
    #[error("Network error: {0}")]
    Network(String),

    /// Generation service answered with a non-success status
    #[error("{message}")]
    Api {
        /// HTTP status code
        status: u16,
        /// User-facing message taken from the response body
        message: String,
    },

    /// Request rejected before reaching the network
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Audio payload could not be decoded
    #[error("Audio decode error: {0}")]
    Decode(String),

    /// Audio device or decoding context error
    #[error("Audio device error: {0}")]
    AudioDevice(String),

    /// Error while driving an active output
    #[error("Playback error: {0}")]
    Playback(String),

    /// Third-party script could not be loaded
    #[error("Script load error: {0}")]
    ScriptLoad(String),

    /// IO error from filesystem or terminal
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed JSON in configuration or payloads
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl MemoirError {
    /// Creates an API error from a status and message
    pub fn api(status: u16, message: impl Into<String>) -> Self {
        MemoirError::Api {
            status,
            message: message.into(),
        }
    }

    /// Creates a decode error
    pub fn decode(reason: impl Into<String>) -> Self {
        MemoirError::Decode(reason.into())
    }

    /// Creates a playback error
    pub fn playback(reason: impl Into<String>) -> Self {
        MemoirError::Playback(reason.into())
    }

    /// Creates an audio device error
    pub fn audio_device(reason: impl Into<String>) -> Self {
        MemoirError::AudioDevice(reason.into())
    }
}

impl From<reqwest::Error> for MemoirError {
    fn from(err: reqwest::Error) -> Self {
        MemoirError::Network(err.to_string())
    }
}

impl From<String> for MemoirError {
    /// Converts a String into `MemoirError::Other`.
    ///
    /// Prefer a specific variant where the failure has a known category, since
    /// notifications are classified from the variant.
    fn from(msg: String) -> Self {
        MemoirError::Other(msg)
    }
}

impl From<&str> for MemoirError {
    fn from(msg: &str) -> Self {
        MemoirError::Other(msg.to_string())
    }
}

/// Result type for narration operations
pub type Result<T> = std::result::Result<T, MemoirError>;

// Public API exports
pub use config::{AppConfig, BackendConfig, FirebaseConfig, MapsConfig};
pub use maps::{
    Capability, CapabilityStatus, Credential, LoadFailure, LoadOutcome, LoaderPhase,
    MapsCapability, ScriptEvent, ScriptHost, ScriptLoader, ScriptTag, SdkObjects,
};
pub use playback::{
    Notification, NoticeKind, PlayOutcome, PlaybackController, PlaybackSnapshot, PlaybackStatus,
};
pub use story::{HttpStoryService, Place, StoryService, Theme};
