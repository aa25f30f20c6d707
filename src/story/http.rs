//! HTTP client for the generation service

use super::{Place, StoryService, Theme};
use crate::config::BackendConfig;
use crate::{MemoirError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

#[derive(Serialize)]
struct ScriptRequest<'a> {
    place: &'a Place,
    theme: Theme,
}

#[derive(Deserialize)]
struct ScriptResponse {
    #[serde(default)]
    script: Option<String>,
}

#[derive(Serialize)]
struct AudioRequest<'a> {
    script: &'a str,
    theme: Theme,
}

/// Error body the service may attach to non-2xx responses
#[derive(Deserialize, Default)]
struct ErrorBody {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// `reqwest`-backed [`StoryService`]
#[derive(Debug, Clone)]
pub struct HttpStoryService {
    client: reqwest::Client,
    base_url: reqwest::Url,
}

impl HttpStoryService {
    /// Build a client from backend settings
    pub fn new(config: &BackendConfig) -> Result<Self> {
        let mut builder = reqwest::Client::builder()
            .connect_timeout(Duration::from_millis(config.connect_timeout_ms))
            .pool_idle_timeout(Duration::from_secs(90));
        if let Some(ms) = config.request_timeout_ms {
            builder = builder.timeout(Duration::from_millis(ms));
        }
        let client = builder
            .build()
            .map_err(|e| MemoirError::Config(format!("Failed to build HTTP client: {}", e)))?;
        Self::with_client(client, &config.base_url)
    }

    /// Use an existing client
    pub fn with_client(client: reqwest::Client, base_url: &str) -> Result<Self> {
        // A trailing slash makes `join` append instead of replacing the last segment.
        let normalized = format!("{}/", base_url.trim_end_matches('/'));
        let base_url = reqwest::Url::parse(&normalized)
            .map_err(|e| MemoirError::Config(format!("Invalid backend URL '{}': {}", base_url, e)))?;
        Ok(Self { client, base_url })
    }

    /// Base URL requests are resolved against
    pub fn base_url(&self) -> &reqwest::Url {
        &self.base_url
    }

    fn endpoint(&self, route: &str) -> Result<reqwest::Url> {
        self.base_url
            .join(route)
            .map_err(|e| MemoirError::Config(format!("Invalid route '{}': {}", route, e)))
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<reqwest::Response> {
        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.bytes().await.unwrap_or_default();
        Err(error_from_body(status.as_u16(), &body))
    }
}

/// User-facing error for a non-2xx response
fn error_from_body(status: u16, body: &[u8]) -> MemoirError {
    let parsed: ErrorBody = serde_json::from_slice(body).unwrap_or_default();
    let message = parsed
        .message
        .or(parsed.error)
        .filter(|m| !m.trim().is_empty())
        .unwrap_or_else(|| format!("HTTP error: {}", status));
    MemoirError::api(status, message)
}

#[async_trait]
impl StoryService for HttpStoryService {
    async fn generate_script(&self, place: &Place, theme: Theme) -> Result<String> {
        if place.name.trim().is_empty() {
            return Err(MemoirError::InvalidRequest("Missing place name".into()));
        }
        let url = self.endpoint("generate_script")?;
        let started = Instant::now();
        let response = self
            .send(self.client.post(url).json(&ScriptRequest { place, theme }))
            .await?;
        let body: ScriptResponse = response.json().await?;
        let script = body
            .script
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| MemoirError::api(200, "Service returned an empty script"))?;
        tracing::debug!(
            place = %place.name,
            %theme,
            chars = script.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "script generated"
        );
        Ok(script)
    }

    async fn generate_audio(&self, script: &str, theme: Theme) -> Result<Vec<u8>> {
        if script.trim().is_empty() {
            return Err(MemoirError::InvalidRequest("Script is required".into()));
        }
        let url = self.endpoint("generate_audio")?;
        let started = Instant::now();
        let response = self
            .send(self.client.post(url).json(&AudioRequest { script, theme }))
            .await?;
        let bytes = response.bytes().await?;
        tracing::debug!(
            %theme,
            bytes = bytes.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "audio rendered"
        );
        Ok(bytes.to_vec())
    }

    async fn health(&self) -> Result<()> {
        let url = self.endpoint("health")?;
        self.send(self.client.get(url)).await?;
        Ok(())
    }
}
