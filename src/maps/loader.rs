//! Single-flight maps SDK loader
//!
//! One [`ScriptLoader`] lives for the whole process and is handed to every
//! consumer that needs the maps capability. However many consumers ask at
//! once, the SDK script is injected at most once per attempt and all of them
//! observe the same outcome.
//!
//! # Lifecycle
//!
//! ```text
//! NotStarted --ensure_loaded--> InFlight --callback + predicate--> Ready
//!                                  |  \--script error------------> Failed (until reset)
//!                                  \----timeout------------------> NotStarted
//! ```

use super::credential::Credential;
use super::host::{ScriptEvent, ScriptHost, ScriptTag};
use crate::config::MapsConfig;
use crate::{MemoirError, Result};
use futures_util::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Prefix of the global callback names handed to the SDK
pub const CALLBACK_PREFIX: &str = "__mapMemoirMapsReady";

/// Why the maps capability is unavailable
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum LoadFailure {
    /// No credential configured
    #[error("maps API key is missing")]
    MissingCredential,
    /// Credential is a known placeholder
    #[error("maps API key is a placeholder value")]
    PlaceholderCredential,
    /// Script failed to load or could not be injected
    #[error("maps script failed to load: {0}")]
    ScriptError(String),
    /// No callback or readiness within the load timeout
    #[error("maps SDK did not become ready in time")]
    Timeout,
}

impl LoadFailure {
    /// Configuration problems are persistent; everything else can be retried
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            LoadFailure::MissingCredential | LoadFailure::PlaceholderCredential
        )
    }
}

/// Result of [`ScriptLoader::ensure_loaded`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadOutcome {
    /// The readiness predicate holds
    Ready,
    /// The capability is unavailable
    Failed(LoadFailure),
}

impl LoadOutcome {
    /// Whether the capability is usable
    pub fn is_ready(&self) -> bool {
        matches!(self, LoadOutcome::Ready)
    }
}

/// Observable loader phase
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoaderPhase {
    /// Nothing requested yet, or reset
    NotStarted,
    /// A load is running; new callers join it
    InFlight,
    /// SDK fully attached
    Ready,
    /// Last load failed; call [`ScriptLoader::reset`] to retry
    Failed(LoadFailure),
}

/// Timing and endpoint settings for the loader
#[derive(Debug, Clone, PartialEq)]
pub struct LoaderSettings {
    /// Vendor script endpoint
    pub script_url: String,
    /// Host whose script tags count as stale leftovers
    pub script_host: String,
    /// Libraries requested with the SDK
    pub libraries: Vec<String>,
    /// Upper bound on a single attempt
    pub timeout: Duration,
    /// Readiness poll interval after the callback fired
    pub poll_interval: Duration,
}

impl Default for LoaderSettings {
    fn default() -> Self {
        Self::from_config(&MapsConfig::default())
    }
}

impl LoaderSettings {
    /// Settings from the maps configuration
    pub fn from_config(config: &MapsConfig) -> Self {
        Self {
            script_url: config.script_url.clone(),
            script_host: config
                .script_host()
                .unwrap_or_else(|| config.script_url.clone()),
            libraries: config.libraries.clone(),
            timeout: config.load_timeout(),
            poll_interval: config.poll_interval(),
        }
    }
}

type SharedLoad = Shared<BoxFuture<'static, LoadOutcome>>;

enum Slot {
    NotStarted,
    InFlight(SharedLoad),
    Ready,
    Failed(LoadFailure),
}

struct LoaderState {
    slot: Slot,
    /// Bumped per attempt and per reset; stale attempts may not publish
    epoch: u64,
}

/// Process-wide single-flight coordinator for the maps SDK
pub struct ScriptLoader<H: ScriptHost> {
    host: Arc<H>,
    settings: LoaderSettings,
    state: Arc<Mutex<LoaderState>>,
    callbacks: AtomicU64,
}

impl<H: ScriptHost> ScriptLoader<H> {
    /// Create a loader over a script host
    pub fn new(host: H, settings: LoaderSettings) -> Self {
        Self {
            host: Arc::new(host),
            settings,
            state: Arc::new(Mutex::new(LoaderState {
                slot: Slot::NotStarted,
                epoch: 0,
            })),
            callbacks: AtomicU64::new(0),
        }
    }

    /// Create a loader from the maps configuration
    pub fn from_config(host: H, config: &MapsConfig) -> Self {
        Self::new(host, LoaderSettings::from_config(config))
    }

    /// The underlying script host
    pub fn host(&self) -> &H {
        &self.host
    }

    /// Loader settings
    pub fn settings(&self) -> &LoaderSettings {
        &self.settings
    }

    /// Current phase
    pub fn phase(&self) -> LoaderPhase {
        match &self.state.lock().slot {
            Slot::NotStarted => LoaderPhase::NotStarted,
            Slot::InFlight(_) => LoaderPhase::InFlight,
            Slot::Ready => LoaderPhase::Ready,
            Slot::Failed(failure) => LoaderPhase::Failed(failure.clone()),
        }
    }

    /// Whether the capability is usable right now
    pub fn is_ready(&self) -> bool {
        matches!(self.state.lock().slot, Slot::Ready) || self.host.available_objects().is_ready()
    }

    /// Make the maps SDK available.
    ///
    /// Never returns an error: every failure is folded into the outcome.
    pub async fn ensure_loaded(&self, key: &str) -> LoadOutcome {
        let key = key.trim();
        match Credential::classify(Some(key)) {
            Credential::Missing => {
                tracing::warn!("maps API key missing; not loading the SDK");
                return LoadOutcome::Failed(LoadFailure::MissingCredential);
            }
            Credential::Placeholder => {
                tracing::warn!("maps API key is a placeholder; not loading the SDK");
                return LoadOutcome::Failed(LoadFailure::PlaceholderCredential);
            }
            Credential::Valid => {}
        }

        let pending = {
            let mut state = self.state.lock();
            let attached = self.host.available_objects().is_ready();
            let joined = match &state.slot {
                Slot::Ready => return LoadOutcome::Ready,
                Slot::Failed(failure) if !attached => return LoadOutcome::Failed(failure.clone()),
                Slot::InFlight(load) => Some(load.clone()),
                Slot::Failed(_) | Slot::NotStarted => None,
            };
            match joined {
                Some(load) => {
                    tracing::debug!("joining in-flight maps SDK load");
                    load
                }
                None => {
                    // The readiness predicate overrides an earlier failure.
                    if attached {
                        tracing::debug!("maps SDK already attached; skipping load");
                        state.slot = Slot::Ready;
                        return LoadOutcome::Ready;
                    }
                    match self.start_load(&mut state, key) {
                        Ok(load) => load,
                        Err(e) => {
                            let failure = LoadFailure::ScriptError(e.to_string());
                            state.slot = Slot::Failed(failure.clone());
                            return LoadOutcome::Failed(failure);
                        }
                    }
                }
            }
        };

        pending.await
    }

    /// Forget the current phase so the next call starts from scratch.
    ///
    /// A load still running keeps its global side effects but can no longer
    /// publish its outcome.
    pub fn reset(&self) {
        let mut state = self.state.lock();
        state.epoch += 1;
        state.slot = Slot::NotStarted;
        tracing::debug!(epoch = state.epoch, "maps loader reset");
    }

    /// Build the script tag for one attempt
    pub fn script_tag(&self, key: &str) -> Result<ScriptTag> {
        let callback = format!(
            "{}{}",
            CALLBACK_PREFIX,
            self.callbacks.fetch_add(1, Ordering::Relaxed)
        );
        let libraries = self.settings.libraries.join(",");
        let mut params = vec![("key", key)];
        if !libraries.is_empty() {
            params.push(("libraries", libraries.as_str()));
        }
        params.push(("callback", callback.as_str()));

        let src = reqwest::Url::parse_with_params(&self.settings.script_url, &params)
            .map_err(|e| {
                MemoirError::ScriptLoad(format!(
                    "Invalid script URL '{}': {}",
                    self.settings.script_url, e
                ))
            })?;
        Ok(ScriptTag {
            src: src.into(),
            callback,
            async_load: true,
            defer: true,
        })
    }

    fn start_load(&self, state: &mut LoaderState, key: &str) -> Result<SharedLoad> {
        let tag = self.script_tag(key)?;
        state.epoch += 1;
        let epoch = state.epoch;

        let host = Arc::clone(&self.host);
        let settings = self.settings.clone();
        let task_state = Arc::clone(&self.state);
        // Spawned so the attempt finishes even if every requester goes away.
        let task = tokio::spawn(async move {
            let outcome = run_load(host.as_ref(), &settings, &tag).await;
            publish(&task_state, epoch, &outcome);
            outcome
        });

        let join_state = Arc::clone(&self.state);
        let load = async move {
            match task.await {
                Ok(outcome) => outcome,
                Err(e) => {
                    let outcome =
                        LoadOutcome::Failed(LoadFailure::ScriptError(format!("load task failed: {e}")));
                    publish(&join_state, epoch, &outcome);
                    outcome
                }
            }
        }
        .boxed()
        .shared();

        state.slot = Slot::InFlight(load.clone());
        Ok(load)
    }
}

/// Record an attempt's outcome unless a reset or newer attempt superseded it
fn publish(state: &Mutex<LoaderState>, epoch: u64, outcome: &LoadOutcome) {
    let mut state = state.lock();
    if state.epoch != epoch || !matches!(state.slot, Slot::InFlight(_)) {
        tracing::debug!(epoch, current = state.epoch, "discarding superseded maps load outcome");
        return;
    }
    state.slot = match outcome {
        LoadOutcome::Ready => Slot::Ready,
        LoadOutcome::Failed(LoadFailure::Timeout) => Slot::NotStarted,
        LoadOutcome::Failed(failure) => Slot::Failed(failure.clone()),
    };
}

async fn run_load<H: ScriptHost + ?Sized>(
    host: &H,
    settings: &LoaderSettings,
    tag: &ScriptTag,
) -> LoadOutcome {
    let started = Instant::now();

    let removed = host.remove_scripts_from(&settings.script_host);
    if removed > 0 {
        tracing::debug!(removed, host = %settings.script_host, "removed stale maps script tags");
    }

    let events = match host.inject_script(tag) {
        Ok(events) => events,
        Err(e) => return LoadOutcome::Failed(LoadFailure::ScriptError(e.to_string())),
    };
    tracing::info!(callback = %tag.callback, "maps script injected");

    let wait = async {
        match events.await {
            Ok(ScriptEvent::CallbackFired) => {}
            Ok(ScriptEvent::Error(message)) => {
                return LoadOutcome::Failed(LoadFailure::ScriptError(message));
            }
            Err(_) => {
                return LoadOutcome::Failed(LoadFailure::ScriptError(
                    "script host dropped the load callback".into(),
                ));
            }
        }
        // The callback can fire before every sub-object is attached.
        loop {
            let available = host.available_objects();
            if available.is_ready() {
                return LoadOutcome::Ready;
            }
            tracing::trace!(missing = ?available.missing(), "maps SDK not fully attached yet");
            tokio::time::sleep(settings.poll_interval).await;
        }
    };

    let outcome = tokio::time::timeout(settings.timeout, wait)
        .await
        .unwrap_or(LoadOutcome::Failed(LoadFailure::Timeout));

    let elapsed_ms = started.elapsed().as_millis() as u64;
    match &outcome {
        LoadOutcome::Ready => tracing::info!(elapsed_ms, "maps SDK ready"),
        LoadOutcome::Failed(failure) => {
            tracing::warn!(elapsed_ms, %failure, "maps SDK load failed")
        }
    }
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::maps::host::SdkObjects;
    use tokio::sync::oneshot;

    /// Host whose SDK is already attached
    struct AttachedHost;

    impl ScriptHost for AttachedHost {
        fn available_objects(&self) -> SdkObjects {
            SdkObjects::REQUIRED
        }

        fn remove_scripts_from(&self, _host: &str) -> usize {
            panic!("no cleanup expected when already attached");
        }

        fn inject_script(&self, _tag: &ScriptTag) -> Result<oneshot::Receiver<ScriptEvent>> {
            panic!("no injection expected when already attached");
        }
    }

    /// Host that rejects injection outright
    struct BrokenHost;

    impl ScriptHost for BrokenHost {
        fn available_objects(&self) -> SdkObjects {
            SdkObjects::empty()
        }

        fn remove_scripts_from(&self, _host: &str) -> usize {
            0
        }

        fn inject_script(&self, _tag: &ScriptTag) -> Result<oneshot::Receiver<ScriptEvent>> {
            Err(MemoirError::ScriptLoad("document has no head".into()))
        }
    }

    #[test]
    fn test_script_tag_url() {
        let loader = ScriptLoader::new(BrokenHost, LoaderSettings::default());
        let first = loader.script_tag("key with space").unwrap();
        let second = loader.script_tag("k").unwrap();

        assert!(first.src.starts_with("https://maps.googleapis.com/maps/api/js?"));
        assert!(first.src.contains("key=key+with+space"));
        assert!(first.src.contains("libraries=places"));
        assert!(first.src.contains(&format!("callback={}", first.callback)));
        assert!(first.callback.starts_with(CALLBACK_PREFIX));
        assert_ne!(first.callback, second.callback);
        assert!(first.async_load && first.defer);
    }

    #[test]
    fn test_config_errors() {
        assert!(LoadFailure::MissingCredential.is_config_error());
        assert!(LoadFailure::PlaceholderCredential.is_config_error());
        assert!(!LoadFailure::Timeout.is_config_error());
        assert!(!LoadFailure::ScriptError("x".into()).is_config_error());
    }

    #[tokio::test]
    async fn test_already_attached_resolves_without_network() {
        let loader = ScriptLoader::new(AttachedHost, LoaderSettings::default());
        assert_eq!(loader.ensure_loaded("real-key").await, LoadOutcome::Ready);
        assert_eq!(loader.phase(), LoaderPhase::Ready);
    }

    #[tokio::test]
    async fn test_injection_failure_is_sticky_until_reset() {
        let loader = ScriptLoader::new(BrokenHost, LoaderSettings::default());
        let outcome = loader.ensure_loaded("real-key").await;
        assert!(matches!(
            outcome,
            LoadOutcome::Failed(LoadFailure::ScriptError(_))
        ));
        assert!(matches!(loader.phase(), LoaderPhase::Failed(_)));

        loader.reset();
        assert_eq!(loader.phase(), LoaderPhase::NotStarted);
    }

    #[tokio::test]
    async fn test_credential_checked_before_phase() {
        let loader = ScriptLoader::new(AttachedHost, LoaderSettings::default());
        assert_eq!(
            loader.ensure_loaded("").await,
            LoadOutcome::Failed(LoadFailure::MissingCredential)
        );
        assert_eq!(loader.phase(), LoaderPhase::NotStarted);
    }
}
