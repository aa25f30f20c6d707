//! Configuration inputs
//!
//! Everything here is plain data: the maps credential and script endpoint,
//! the generation service base URL and the backend-as-a-service project
//! identifiers. Values come from an optional JSON file and are then
//! overridden by environment variables.

use crate::{MemoirError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Default generation service base URL
pub const DEFAULT_BACKEND_URL: &str = "http://localhost:8000";
/// Default maps SDK script endpoint
pub const DEFAULT_MAPS_SCRIPT_URL: &str = "https://maps.googleapis.com/maps/api/js";
/// Default bound on a maps SDK load, in milliseconds
pub const DEFAULT_LOAD_TIMEOUT_MS: u64 = 10_000;
/// Default readiness poll interval, in milliseconds
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 100;
/// Default connect timeout for the generation service, in milliseconds
pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 8_000;

/// Complete application configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Maps SDK settings
    pub maps: MapsConfig,
    /// Generation service settings
    pub backend: BackendConfig,
    /// Backend-as-a-service project identifiers
    pub firebase: FirebaseConfig,
}

/// Maps SDK loading settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MapsConfig {
    /// Maps credential; absent or placeholder values fail fast
    pub api_key: Option<String>,
    /// Vendor script endpoint
    pub script_url: String,
    /// Libraries requested alongside the core SDK
    pub libraries: Vec<String>,
    /// Upper bound on a single load attempt
    pub load_timeout_ms: u64,
    /// Readiness predicate poll interval once the callback fired
    pub poll_interval_ms: u64,
}

impl Default for MapsConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            script_url: DEFAULT_MAPS_SCRIPT_URL.to_string(),
            libraries: vec!["places".to_string()],
            load_timeout_ms: DEFAULT_LOAD_TIMEOUT_MS,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
        }
    }
}

impl MapsConfig {
    /// Load timeout as a [`Duration`]
    pub fn load_timeout(&self) -> Duration {
        Duration::from_millis(self.load_timeout_ms)
    }

    /// Poll interval as a [`Duration`]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Host name of the script endpoint, used to find stale script tags
    pub fn script_host(&self) -> Option<String> {
        reqwest::Url::parse(&self.script_url)
            .ok()
            .and_then(|url| url.host_str().map(str::to_string))
    }
}

/// Generation service settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Base URL, without a trailing route
    pub base_url: String,
    /// Connection setup bound
    pub connect_timeout_ms: u64,
    /// Optional bound on a whole request; unset means no limit
    pub request_timeout_ms: Option<u64>,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BACKEND_URL.to_string(),
            connect_timeout_ms: DEFAULT_CONNECT_TIMEOUT_MS,
            request_timeout_ms: None,
        }
    }
}

/// Backend-as-a-service project identifiers
///
/// Carried as opaque inputs; nothing in this crate talks to that service.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FirebaseConfig {
    /// Web API key
    pub api_key: Option<String>,
    /// Auth domain
    pub auth_domain: Option<String>,
    /// Project identifier
    pub project_id: Option<String>,
    /// Blob storage bucket
    pub storage_bucket: Option<String>,
    /// Messaging sender identifier
    pub messaging_sender_id: Option<String>,
    /// App identifier
    pub app_id: Option<String>,
}

impl FirebaseConfig {
    /// Whether every identifier is present and non-blank
    pub fn is_complete(&self) -> bool {
        [
            &self.api_key,
            &self.auth_domain,
            &self.project_id,
            &self.storage_bucket,
            &self.messaging_sender_id,
            &self.app_id,
        ]
        .iter()
        .all(|value| value.as_deref().is_some_and(|v| !v.trim().is_empty()))
    }
}

impl AppConfig {
    /// Defaults overridden by the process environment
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env_with(|name| std::env::var(name).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Read a JSON configuration file (missing fields take defaults)
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let config = Self::read_file(path.as_ref())?;
        config.validate()?;
        Ok(config)
    }

    /// File (if given) first, then environment overrides
    pub fn load(path: Option<&Path>) -> Result<Self> {
        Self::load_with(path, |name| std::env::var(name).ok())
    }

    /// Like [`AppConfig::load`] with an explicit variable lookup.
    ///
    /// Validation runs once on the merged result, so an override can repair
    /// a bad file value.
    pub fn load_with<F>(path: Option<&Path>, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = match path {
            Some(path) => Self::read_file(path)?,
            None => Self::default(),
        };
        config.apply_env_with(lookup)?;
        config.validate()?;
        Ok(config)
    }

    fn read_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            MemoirError::Config(format!("Failed to read '{}': {}", path.display(), e))
        })?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Apply overrides from a variable lookup.
    ///
    /// Blank values are ignored so an exported-but-empty variable does not
    /// clobber a file setting.
    pub fn apply_env_with<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("GOOGLE_MAPS_API_KEY") {
            self.maps.api_key = Some(v);
        }
        if let Some(v) = get("MAPS_SCRIPT_URL") {
            self.maps.script_url = v;
        }
        if let Some(v) = get("BACKEND_URL") {
            self.backend.base_url = v.trim_end_matches('/').to_string();
        }
        if let Some(v) = get("BACKEND_CONNECT_TIMEOUT_MS") {
            self.backend.connect_timeout_ms = parse_millis("BACKEND_CONNECT_TIMEOUT_MS", &v)?;
        }
        if let Some(v) = get("BACKEND_REQUEST_TIMEOUT_MS") {
            self.backend.request_timeout_ms =
                Some(parse_millis("BACKEND_REQUEST_TIMEOUT_MS", &v)?);
        }

        let firebase = &mut self.firebase;
        for (name, slot) in [
            ("FIREBASE_API_KEY", &mut firebase.api_key),
            ("FIREBASE_AUTH_DOMAIN", &mut firebase.auth_domain),
            ("FIREBASE_PROJECT_ID", &mut firebase.project_id),
            ("FIREBASE_STORAGE_BUCKET", &mut firebase.storage_bucket),
            (
                "FIREBASE_MESSAGING_SENDER_ID",
                &mut firebase.messaging_sender_id,
            ),
            ("FIREBASE_APP_ID", &mut firebase.app_id),
        ] {
            if let Some(v) = get(name) {
                *slot = Some(v);
            }
        }
        Ok(())
    }

    /// Reject settings nothing downstream can work with
    pub fn validate(&self) -> Result<()> {
        reqwest::Url::parse(&self.backend.base_url).map_err(|e| {
            MemoirError::Config(format!(
                "Invalid backend URL '{}': {}",
                self.backend.base_url, e
            ))
        })?;
        reqwest::Url::parse(&self.maps.script_url).map_err(|e| {
            MemoirError::Config(format!(
                "Invalid maps script URL '{}': {}",
                self.maps.script_url, e
            ))
        })?;
        if self.maps.poll_interval_ms == 0 {
            return Err(MemoirError::Config(
                "maps.poll_interval_ms must be greater than zero".into(),
            ));
        }
        if self.maps.load_timeout_ms == 0 {
            return Err(MemoirError::Config(
                "maps.load_timeout_ms must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

fn parse_millis(name: &str, value: &str) -> Result<u64> {
    value
        .trim()
        .parse::<u64>()
        .map_err(|_| MemoirError::Config(format!("{name} must be an integer (got '{value}')")))
}
