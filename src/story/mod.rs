//! Story generation service
//!
//! The remote service turns a place and a theme into a short story script,
//! and a script into a rendered audio payload. [`StoryService`] is the seam
//! the playback controller fetches through; [`HttpStoryService`] is the real
//! client.

pub mod http;
pub mod theme;

pub use http::HttpStoryService;
pub use theme::Theme;

use crate::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A picked geographic place
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Place {
    /// Display name
    pub name: String,
    /// Formatted address
    pub address: String,
    /// Latitude, when the place came from the map
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lat: Option<f64>,
    /// Longitude, when the place came from the map
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lng: Option<f64>,
}

impl Place {
    /// Place without coordinates
    pub fn new(name: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            address: address.into(),
            lat: None,
            lng: None,
        }
    }

    /// Attach coordinates
    pub fn with_coordinates(mut self, lat: f64, lng: f64) -> Self {
        self.lat = Some(lat);
        self.lng = Some(lng);
        self
    }
}

/// Remote story and narration generation
#[async_trait]
pub trait StoryService: Send + Sync + 'static {
    /// Generate a story script for a place
    async fn generate_script(&self, place: &Place, theme: Theme) -> Result<String>;

    /// Render a script to an encoded audio payload
    async fn generate_audio(&self, script: &str, theme: Theme) -> Result<Vec<u8>>;

    /// Succeeds when the service is reachable and healthy
    async fn health(&self) -> Result<()>;
}

#[async_trait]
impl<T: StoryService + ?Sized> StoryService for std::sync::Arc<T> {
    async fn generate_script(&self, place: &Place, theme: Theme) -> Result<String> {
        (**self).generate_script(place, theme).await
    }

    async fn generate_audio(&self, script: &str, theme: Theme) -> Result<Vec<u8>> {
        (**self).generate_audio(script, theme).await
    }

    async fn health(&self) -> Result<()> {
        (**self).health().await
    }
}
