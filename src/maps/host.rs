//! Script host seam
//!
//! The maps SDK attaches itself to global page state. [`ScriptHost`] is the
//! only thing allowed to look at or mutate that state; the loader works purely
//! in terms of this trait.

use crate::Result;
use bitflags::bitflags;
use tokio::sync::oneshot;

bitflags! {
    /// SDK sub-objects currently attached to the global namespace
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct SdkObjects: u8 {
        /// Map constructor
        const MAP = 0x01;
        /// Places autocomplete constructor
        const AUTOCOMPLETE = 0x02;
        /// Marker constructor
        const MARKER = 0x04;
        /// Info window constructor
        const INFO_WINDOW = 0x08;
        /// Control position enum
        const CONTROL_POSITION = 0x10;

        /// Everything the readiness predicate requires
        const REQUIRED = Self::MAP.bits()
            | Self::AUTOCOMPLETE.bits()
            | Self::MARKER.bits()
            | Self::INFO_WINDOW.bits()
            | Self::CONTROL_POSITION.bits();
    }
}

impl SdkObjects {
    /// Readiness predicate: every required sub-object is present
    pub fn is_ready(self) -> bool {
        self.contains(SdkObjects::REQUIRED)
    }

    /// Required sub-objects still missing
    pub fn missing(self) -> SdkObjects {
        SdkObjects::REQUIRED.difference(self)
    }
}

/// A script element to inject
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptTag {
    /// Fully built script URL
    pub src: String,
    /// Global callback name the SDK invokes once loaded
    pub callback: String,
    /// `async` attribute
    pub async_load: bool,
    /// `defer` attribute
    pub defer: bool,
}

/// Outcome reported by an injected script
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptEvent {
    /// The SDK invoked the tag's callback
    CallbackFired,
    /// The script failed to load
    Error(String),
}

/// Access to the page's global script state
pub trait ScriptHost: Send + Sync + 'static {
    /// SDK sub-objects present right now
    fn available_objects(&self) -> SdkObjects;

    /// Remove every script tag whose source points at `host`; returns how many
    fn remove_scripts_from(&self, host: &str) -> usize;

    /// Inject `tag` and register its callback.
    ///
    /// The receiver yields exactly one event. Dropping the sender without
    /// sending is treated as a script error.
    fn inject_script(&self, tag: &ScriptTag) -> Result<oneshot::Receiver<ScriptEvent>>;
}

impl<T: ScriptHost + ?Sized> ScriptHost for std::sync::Arc<T> {
    fn available_objects(&self) -> SdkObjects {
        (**self).available_objects()
    }

    fn remove_scripts_from(&self, host: &str) -> usize {
        (**self).remove_scripts_from(host)
    }

    fn inject_script(&self, tag: &ScriptTag) -> Result<oneshot::Receiver<ScriptEvent>> {
        (**self).inject_script(tag)
    }
}
