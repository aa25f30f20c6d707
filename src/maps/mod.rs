//! Maps SDK capability
//!
//! UI consumers only ever ask "is the mapping capability available?". The
//! answer comes from a [`Capability`], which in turn drives the shared
//! [`ScriptLoader`]. Neither touches global page state directly; that is
//! the [`ScriptHost`]'s job.

pub mod credential;
pub mod host;
pub mod loader;

pub use credential::{Credential, PLACEHOLDER_KEYS};
pub use host::{ScriptEvent, ScriptHost, ScriptTag, SdkObjects};
pub use loader::{LoadFailure, LoadOutcome, LoaderPhase, LoaderSettings, ScriptLoader};

use crate::config::MapsConfig;
use async_trait::async_trait;
use std::sync::Arc;

/// What a UI consumer renders for the maps capability
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CapabilityStatus {
    /// Nothing requested yet
    NotLoaded,
    /// Load running
    Loading,
    /// Usable
    Ready,
    /// Persistent configuration problem; retrying will not help
    ConfigError(LoadFailure),
    /// Load failed; a manual retry may succeed
    LoadError(LoadFailure),
}

/// Capability-check interface for an externally loaded feature
#[async_trait]
pub trait Capability: Send + Sync {
    /// Whether the capability is usable right now
    fn is_ready(&self) -> bool;

    /// Make the capability available (joins any load already running)
    async fn load(&self) -> LoadOutcome;

    /// Current status for display
    fn status(&self) -> CapabilityStatus;
}

/// The maps capability, bound to the configured credential
pub struct MapsCapability<H: ScriptHost> {
    loader: Arc<ScriptLoader<H>>,
    key: Option<String>,
}

impl<H: ScriptHost> Clone for MapsCapability<H> {
    fn clone(&self) -> Self {
        Self {
            loader: Arc::clone(&self.loader),
            key: self.key.clone(),
        }
    }
}

impl<H: ScriptHost> MapsCapability<H> {
    /// Bind a shared loader to a credential
    pub fn new(loader: Arc<ScriptLoader<H>>, key: Option<String>) -> Self {
        Self { loader, key }
    }

    /// Bind a shared loader to the configured credential
    pub fn from_config(loader: Arc<ScriptLoader<H>>, config: &MapsConfig) -> Self {
        Self::new(loader, config.api_key.clone())
    }

    /// The shared loader
    pub fn loader(&self) -> &Arc<ScriptLoader<H>> {
        &self.loader
    }

    /// Credential classification
    pub fn credential(&self) -> Credential {
        Credential::classify(self.key.as_deref())
    }

    /// Manual retry after a failed load.
    ///
    /// Only a settled failure resets the loader; a running load is joined
    /// instead so the script is never requested twice concurrently.
    pub async fn retry(&self) -> LoadOutcome {
        if matches!(self.loader.phase(), LoaderPhase::Failed(_)) {
            self.loader.reset();
        }
        self.load().await
    }
}

#[async_trait]
impl<H: ScriptHost> Capability for MapsCapability<H> {
    fn is_ready(&self) -> bool {
        self.credential().is_valid() && self.loader.is_ready()
    }

    async fn load(&self) -> LoadOutcome {
        self.loader
            .ensure_loaded(self.key.as_deref().unwrap_or_default())
            .await
    }

    fn status(&self) -> CapabilityStatus {
        match self.credential() {
            Credential::Missing => {
                return CapabilityStatus::ConfigError(LoadFailure::MissingCredential)
            }
            Credential::Placeholder => {
                return CapabilityStatus::ConfigError(LoadFailure::PlaceholderCredential)
            }
            Credential::Valid => {}
        }
        match self.loader.phase() {
            LoaderPhase::NotStarted if self.loader.is_ready() => CapabilityStatus::Ready,
            LoaderPhase::NotStarted => CapabilityStatus::NotLoaded,
            LoaderPhase::InFlight => CapabilityStatus::Loading,
            LoaderPhase::Ready => CapabilityStatus::Ready,
            LoaderPhase::Failed(_) if self.loader.is_ready() => CapabilityStatus::Ready,
            LoaderPhase::Failed(failure) => CapabilityStatus::LoadError(failure),
        }
    }
}
