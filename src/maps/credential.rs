//! Maps credential classification

/// Values shipped in sample env files that are never real keys
pub const PLACEHOLDER_KEYS: &[&str] = &[
    "your_google_maps_api_key_here",
    "your_google_maps_api_key",
    "your_api_key_here",
    "your_api_key",
    "your-api-key",
    "api_key_here",
    "undefined",
    "null",
    "changeme",
];

/// What a configured maps credential looks like
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Credential {
    /// Absent or blank
    Missing,
    /// A known placeholder value
    Placeholder,
    /// Plausibly a real key
    Valid,
}

impl Credential {
    /// Classify a raw credential
    pub fn classify(key: Option<&str>) -> Self {
        let Some(key) = key.map(str::trim).filter(|k| !k.is_empty()) else {
            return Credential::Missing;
        };
        if PLACEHOLDER_KEYS
            .iter()
            .any(|placeholder| placeholder.eq_ignore_ascii_case(key))
        {
            Credential::Placeholder
        } else {
            Credential::Valid
        }
    }

    /// Whether a load may be attempted
    pub fn is_valid(self) -> bool {
        self == Credential::Valid
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify() {
        assert_eq!(Credential::classify(None), Credential::Missing);
        assert_eq!(Credential::classify(Some("   ")), Credential::Missing);
        assert_eq!(
            Credential::classify(Some("YOUR_GOOGLE_MAPS_API_KEY_HERE")),
            Credential::Placeholder
        );
        assert_eq!(Credential::classify(Some("undefined")), Credential::Placeholder);
        assert_eq!(
            Credential::classify(Some("AIzaSyD-real-looking-key")),
            Credential::Valid
        );
    }
}
