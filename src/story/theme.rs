//! Narrative themes

use crate::MemoirError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Narrative theme understood by the generation service
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum Theme {
    /// Whimsical fairy tale
    FairyTale,
    /// Factual documentary narration (service default)
    #[default]
    Documentary,
    /// Science fiction
    SciFi,
    /// Mystery
    Mystery,
}

impl Theme {
    /// Every theme, in display order
    pub const ALL: [Theme; 4] = [
        Theme::FairyTale,
        Theme::Documentary,
        Theme::SciFi,
        Theme::Mystery,
    ];

    /// Name sent on the wire
    pub fn as_str(&self) -> &'static str {
        match self {
            Theme::FairyTale => "fairy tale",
            Theme::Documentary => "documentary",
            Theme::SciFi => "sci-fi",
            Theme::Mystery => "mystery",
        }
    }
}

impl fmt::Display for Theme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Theme {
    type Err = MemoirError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        // "fairy_tale", "Fairy-Tale", "fairy tale" and "scifi" all collapse
        let key: String = value
            .trim()
            .chars()
            .filter(|c| !matches!(c, ' ' | '_' | '-'))
            .flat_map(char::to_lowercase)
            .collect();
        match key.as_str() {
            "fairytale" => Ok(Theme::FairyTale),
            "documentary" => Ok(Theme::Documentary),
            "scifi" => Ok(Theme::SciFi),
            "mystery" => Ok(Theme::Mystery),
            _ => Err(MemoirError::InvalidRequest(format!(
                "Unknown theme '{}'. Supported: fairy tale, documentary, sci-fi, mystery",
                value
            ))),
        }
    }
}

impl From<Theme> for String {
    fn from(theme: Theme) -> Self {
        theme.as_str().to_string()
    }
}

impl TryFrom<String> for Theme {
    type Error = MemoirError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}
